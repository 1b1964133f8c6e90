//! Sparse JSON merge.
//!
//! Applies only the fields present in a patch document. Nested objects are
//! merged recursively; every other value (including arrays and `null`)
//! replaces the existing one.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::error::{ProtectError, Result};

/// Merge `patch` into `target` in place.
pub fn merge_value(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(existing), Value::Object(fields)) => {
            for (key, value) in fields {
                match existing.get_mut(key) {
                    Some(slot) if slot.is_object() && value.is_object() => merge_value(slot, value),
                    _ => {
                        existing.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}

/// Produce a patched copy of `entity`.
///
/// The original is not touched, so a failed merge leaves the caller's state
/// exactly as it was.
pub fn merged<T>(entity: &T, patch: &Value) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    if !patch.is_object() {
        return Err(ProtectError::Decode(format!(
            "patch must be a JSON object, got {patch}"
        )));
    }

    let mut current = serde_json::to_value(entity)?;
    merge_value(&mut current, patch);
    Ok(serde_json::from_value(current)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_fields_untouched() {
        let mut target = json!({ "name": "Porch", "isConnected": true, "state": "CONNECTED" });
        merge_value(&mut target, &json!({ "isConnected": false }));
        assert_eq!(
            target,
            json!({ "name": "Porch", "isConnected": false, "state": "CONNECTED" })
        );
    }

    #[test]
    fn test_nested_objects_merge_recursively() {
        let mut target = json!({
            "featureFlags": { "hasChime": true, "hasLedStatus": true },
            "name": "Door"
        });
        merge_value(&mut target, &json!({ "featureFlags": { "hasChime": false } }));
        assert_eq!(
            target,
            json!({ "featureFlags": { "hasChime": false, "hasLedStatus": true }, "name": "Door" })
        );
    }

    #[test]
    fn test_arrays_replace() {
        let mut target = json!({ "smartDetectTypes": ["person", "vehicle"] });
        merge_value(&mut target, &json!({ "smartDetectTypes": ["animal"] }));
        assert_eq!(target, json!({ "smartDetectTypes": ["animal"] }));
    }

    #[test]
    fn test_new_fields_are_added() {
        let mut target = json!({ "name": "Porch" });
        merge_value(&mut target, &json!({ "lastRing": 1_626_580_814_723_i64 }));
        assert_eq!(target["lastRing"], 1_626_580_814_723_i64);
    }

    #[test]
    fn test_non_object_patch_rejected() {
        let entity = json!({ "id": "a" });
        assert!(matches!(merged(&entity, &json!([1, 2])), Err(ProtectError::Decode(_))));
    }
}

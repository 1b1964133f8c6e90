//! Entity types from the controller's bootstrap snapshot.
//!
//! Only the fields the synchronizer and its consumers rely on are typed.
//! Everything else the controller sends is kept verbatim in `extra`, so a
//! sparse merge never loses data it does not understand.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Entity, ModelKey};

/// Protect camera (including doorbells).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Camera {
    /// Stable identifier.
    pub id: String,
    /// Always `"camera"`.
    #[serde(default)]
    pub model_key: String,
    /// User-assigned name.
    #[serde(default)]
    pub name: String,
    /// Hardware model (e.g. `"UVC G4 Doorbell"`).
    #[serde(default, rename = "type")]
    pub device_type: String,
    /// LAN address, used for direct snapshots.
    #[serde(default)]
    pub host: Option<String>,
    /// Hardware address.
    #[serde(default)]
    pub mac: Option<String>,
    /// Adoption/connection state string (e.g. `"CONNECTED"`).
    #[serde(default)]
    pub state: Option<String>,
    /// Whether the camera is connected to the controller.
    #[serde(default)]
    pub is_connected: bool,
    /// Whether motion is currently detected.
    #[serde(default)]
    pub is_motion_detected: bool,
    /// Epoch milliseconds of the last motion event.
    #[serde(default)]
    pub last_motion: Option<i64>,
    /// Epoch milliseconds of the last doorbell ring.
    #[serde(default)]
    pub last_ring: Option<i64>,
    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Protect floodlight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Light {
    /// Stable identifier.
    pub id: String,
    /// Always `"light"`.
    #[serde(default)]
    pub model_key: String,
    /// User-assigned name.
    #[serde(default)]
    pub name: String,
    /// Hardware model.
    #[serde(default, rename = "type")]
    pub device_type: String,
    /// Whether the light is connected to the controller.
    #[serde(default)]
    pub is_connected: bool,
    /// Whether the light is currently on.
    #[serde(default)]
    pub is_light_on: bool,
    /// Whether the PIR sensor currently detects motion.
    #[serde(default)]
    pub is_pir_motion_detected: bool,
    /// Epoch milliseconds of the last motion event.
    #[serde(default)]
    pub last_motion: Option<i64>,
    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Wireless bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bridge {
    /// Stable identifier.
    pub id: String,
    /// Always `"bridge"`.
    #[serde(default)]
    pub model_key: String,
    /// User-assigned name.
    #[serde(default)]
    pub name: String,
    /// Whether the bridge is connected to the controller.
    #[serde(default)]
    pub is_connected: bool,
    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Permission group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    /// Stable identifier.
    pub id: String,
    /// Always `"group"`.
    #[serde(default)]
    pub model_key: String,
    /// Group name.
    #[serde(default)]
    pub name: String,
    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Saved multi-camera live view layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveView {
    /// Stable identifier.
    pub id: String,
    /// Always `"liveview"`.
    #[serde(default)]
    pub model_key: String,
    /// View name.
    #[serde(default)]
    pub name: String,
    /// Whether this is the default view.
    #[serde(default)]
    pub is_default: bool,
    /// Owning user id.
    #[serde(default)]
    pub owner: Option<String>,
    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The network video recorder itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nvr {
    /// Stable identifier.
    pub id: String,
    /// Always `"nvr"`.
    #[serde(default)]
    pub model_key: String,
    /// Console name.
    #[serde(default)]
    pub name: String,
    /// Protect application version.
    #[serde(default)]
    pub version: Option<String>,
    /// Console address.
    #[serde(default)]
    pub host: Option<String>,
    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Controller user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserAccount {
    /// Stable identifier.
    pub id: String,
    /// Always `"user"`.
    #[serde(default)]
    pub model_key: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Fields not modelled above.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

macro_rules! impl_entity {
    ($($ty:ty => $key:expr),* $(,)?) => {
        $(
            impl Entity for $ty {
                const MODEL_KEY: ModelKey = $key;

                fn id(&self) -> &str {
                    &self.id
                }
            }
        )*
    };
}

impl_entity! {
    Camera => ModelKey::Camera,
    Light => ModelKey::Light,
    Bridge => ModelKey::Bridge,
    Group => ModelKey::Group,
    LiveView => ModelKey::LiveView,
    Nvr => ModelKey::Nvr,
    UserAccount => ModelKey::User,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_camera_keeps_unknown_fields() {
        let camera: Camera = serde_json::from_value(json!({
            "id": "cam-1",
            "modelKey": "camera",
            "name": "Front Door",
            "type": "UVC G4 Doorbell",
            "isConnected": true,
            "featureFlags": { "hasChime": true }
        }))
        .unwrap();

        assert_eq!(camera.device_type, "UVC G4 Doorbell");
        assert!(camera.is_connected);
        assert_eq!(camera.extra["featureFlags"]["hasChime"], true);

        let value = serde_json::to_value(&camera).unwrap();
        assert_eq!(value["featureFlags"]["hasChime"], true);
        assert_eq!(value["type"], "UVC G4 Doorbell");
    }

    #[test]
    fn test_light_defaults() {
        let light: Light = serde_json::from_value(json!({ "id": "light-1" })).unwrap();
        assert!(!light.is_light_on);
        assert!(light.name.is_empty());
    }

    #[test]
    fn test_entity_model_keys() {
        assert_eq!(Camera::MODEL_KEY, ModelKey::Camera);
        assert_eq!(LiveView::MODEL_KEY, ModelKey::LiveView);
        assert_eq!(UserAccount::MODEL_KEY, ModelKey::User);
    }
}

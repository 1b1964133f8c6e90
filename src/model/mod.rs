//! In-memory device model.
//!
//! [`SystemStatus`] holds the controller's bootstrap snapshot. Each entity
//! kind lives in an [`EntityCollection`]: an append-only list indexed by id,
//! so the update stream can patch entities in place without scanning.
//!
//! # Modules
//!
//! - [`devices`] - Camera, Light, Bridge, Group, LiveView, Nvr, UserAccount
//! - [`merge`] - Sparse JSON merge used for in-place patches

pub mod devices;
pub mod merge;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub use devices::{Bridge, Camera, Group, Light, LiveView, Nvr, UserAccount};

use crate::error::{ProtectError, Result};

/// Model discriminator carried by action frames (`modelKey`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModelKey {
    /// `camera`
    Camera,
    /// `light`
    Light,
    /// `bridge`
    Bridge,
    /// `group`
    Group,
    /// `liveview`
    LiveView,
    /// `nvr`
    Nvr,
    /// `user`
    User,
    /// `event` (motion, ring, smart detection)
    Event,
    /// Any kind this client does not model (sensor, doorlock, viewer, ...).
    Unknown(String),
}

impl ModelKey {
    /// Wire name of this key.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Camera => "camera",
            Self::Light => "light",
            Self::Bridge => "bridge",
            Self::Group => "group",
            Self::LiveView => "liveview",
            Self::Nvr => "nvr",
            Self::User => "user",
            Self::Event => "event",
            Self::Unknown(key) => key,
        }
    }
}

impl From<&str> for ModelKey {
    fn from(key: &str) -> Self {
        match key {
            "camera" => Self::Camera,
            "light" => Self::Light,
            "bridge" => Self::Bridge,
            "group" => Self::Group,
            "liveview" => Self::LiveView,
            "nvr" => Self::Nvr,
            "user" => Self::User,
            "event" => Self::Event,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An entity addressable by id within its collection.
pub trait Entity: Clone + Serialize + DeserializeOwned {
    /// Collection this entity type belongs to.
    const MODEL_KEY: ModelKey;

    /// Stable identifier.
    fn id(&self) -> &str;
}

/// Append-only, id-indexed list of entities.
///
/// Preserves bootstrap order for iteration. Entities are never removed; the
/// update stream only patches them in place.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityCollection<T> {
    items: Vec<T>,
    index: HashMap<String, usize>,
}

impl<T> Default for EntityCollection<T> {
    fn default() -> Self {
        Self {
            items: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T: Entity> EntityCollection<T> {
    /// Look up an entity by id.
    pub fn get(&self, id: &str) -> Option<&T> {
        self.index.get(id).map(|&i| &self.items[i])
    }

    /// Whether an entity with this id exists.
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Append an entity. Returns `false` (and leaves the collection
    /// unchanged) if the id is already present.
    pub fn push(&mut self, entity: T) -> bool {
        if self.index.contains_key(entity.id()) {
            return false;
        }
        self.index.insert(entity.id().to_string(), self.items.len());
        self.items.push(entity);
        true
    }

    /// Sparse-merge `patch` into the entity with the given id.
    ///
    /// Returns `Ok(None)` for an unknown id. On error the entity is left
    /// exactly as it was.
    pub fn merge(&mut self, id: &str, patch: &serde_json::Value) -> Result<Option<&T>> {
        let Some(&slot) = self.index.get(id) else {
            return Ok(None);
        };

        let updated = merge::merged(&self.items[slot], patch)?;
        if updated.id() != id {
            return Err(ProtectError::Decode(format!(
                "patch for {} {id} changes its id to {}",
                T::MODEL_KEY,
                updated.id()
            )));
        }

        self.items[slot] = updated;
        Ok(Some(&self.items[slot]))
    }

    /// Iterate in bootstrap order.
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: Entity> From<Vec<T>> for EntityCollection<T> {
    fn from(entities: Vec<T>) -> Self {
        let mut collection = Self::default();
        for entity in entities {
            if !collection.push(entity) {
                log::warn!("[Model] Duplicate {} id in snapshot, keeping first", T::MODEL_KEY);
            }
        }
        collection
    }
}

impl<'a, T> IntoIterator for &'a EntityCollection<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<T: Serialize> Serialize for EntityCollection<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.items.serialize(serializer)
    }
}

impl<'de, T: Entity> Deserialize<'de> for EntityCollection<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        Vec::<T>::deserialize(deserializer).map(Self::from)
    }
}

/// Device model shared between the receive loop and readers.
///
/// `None` until the first bootstrap completes.
pub type SharedStatus = Arc<RwLock<Option<SystemStatus>>>;

/// Full controller snapshot, kept in sync by the update stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    /// Cameras and doorbells.
    #[serde(default)]
    pub cameras: EntityCollection<Camera>,
    /// Floodlights.
    #[serde(default)]
    pub lights: EntityCollection<Light>,
    /// Wireless bridges.
    #[serde(default)]
    pub bridges: EntityCollection<Bridge>,
    /// Permission groups.
    #[serde(default)]
    pub groups: EntityCollection<Group>,
    /// Saved live views.
    #[serde(default, rename = "liveviews")]
    pub live_views: EntityCollection<LiveView>,
    /// The recorder itself.
    #[serde(default)]
    pub nvr: Option<Nvr>,
    /// User accounts.
    #[serde(default)]
    pub users: EntityCollection<UserAccount>,
    /// Stream cursor of the most recently applied update.
    #[serde(default)]
    pub last_update_id: String,
}

impl SystemStatus {
    /// Camera by id.
    pub fn camera(&self, id: &str) -> Option<&Camera> {
        self.cameras.get(id)
    }

    /// Light by id.
    pub fn light(&self, id: &str) -> Option<&Light> {
        self.lights.get(id)
    }

    /// Advance the stream cursor. Empty ids are ignored.
    pub fn advance_cursor(&mut self, update_id: &str) {
        if !update_id.is_empty() {
            self.last_update_id = update_id.to_string();
        }
    }

    /// Sparse-merge a patch into the NVR if its id matches.
    pub fn merge_nvr(&mut self, id: &str, patch: &serde_json::Value) -> Result<Option<&Nvr>> {
        let Some(nvr) = self.nvr.as_mut() else {
            return Ok(None);
        };
        if nvr.id != id {
            return Ok(None);
        }

        let updated = merge::merged(&*nvr, patch)?;
        if updated.id != id {
            return Err(ProtectError::Decode(format!("patch for nvr {id} changes its id")));
        }
        *nvr = updated;
        Ok(Some(&*nvr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bootstrap() -> SystemStatus {
        serde_json::from_value(json!({
            "cameras": [
                { "id": "cam-1", "modelKey": "camera", "name": "Front", "isConnected": true },
                { "id": "cam-2", "modelKey": "camera", "name": "Back", "isConnected": false }
            ],
            "lights": [{ "id": "light-1", "modelKey": "light", "isLightOn": false }],
            "liveviews": [{ "id": "view-1", "modelKey": "liveview", "name": "All" }],
            "nvr": { "id": "nvr-1", "modelKey": "nvr", "name": "UNVR", "version": "1.18.0" },
            "users": [{ "id": "user-1", "modelKey": "user", "name": "Admin" }],
            "lastUpdateId": "cursor-0",
            "accountId": "ignored"
        }))
        .unwrap()
    }

    #[test]
    fn test_bootstrap_parses_collections() {
        let status = bootstrap();
        assert_eq!(status.cameras.len(), 2);
        assert_eq!(status.lights.len(), 1);
        assert_eq!(status.live_views.len(), 1);
        assert!(status.bridges.is_empty());
        assert_eq!(status.nvr.as_ref().map(|n| n.name.as_str()), Some("UNVR"));
        assert_eq!(status.last_update_id, "cursor-0");

        let names: Vec<&str> = status.cameras.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["Front", "Back"]);
    }

    #[test]
    fn test_merge_patches_in_place() {
        let mut status = bootstrap();
        let updated = status
            .cameras
            .merge("cam-2", &json!({ "isConnected": true }))
            .unwrap()
            .cloned()
            .unwrap();

        assert!(updated.is_connected);
        assert_eq!(updated.name, "Back");
        assert_eq!(status.cameras.len(), 2);
        assert!(status.camera("cam-2").unwrap().is_connected);
    }

    #[test]
    fn test_merge_unknown_id_is_none() {
        let mut status = bootstrap();
        let before = status.clone();
        assert!(status.cameras.merge("nope", &json!({ "name": "x" })).unwrap().is_none());
        assert_eq!(status, before);
    }

    #[test]
    fn test_failed_merge_leaves_entity_intact() {
        let mut status = bootstrap();
        let before = status.camera("cam-1").cloned();

        let err = status
            .cameras
            .merge("cam-1", &json!({ "isConnected": "definitely" }))
            .unwrap_err();

        assert!(matches!(err, ProtectError::Decode(_)));
        assert_eq!(status.camera("cam-1").cloned(), before);
    }

    #[test]
    fn test_merge_rejects_id_change() {
        let mut status = bootstrap();
        let err = status.cameras.merge("cam-1", &json!({ "id": "cam-9" })).unwrap_err();
        assert!(matches!(err, ProtectError::Decode(_)));
        assert!(status.camera("cam-1").is_some());
        assert!(status.camera("cam-9").is_none());
    }

    #[test]
    fn test_push_is_append_only() {
        let mut status = bootstrap();
        let duplicate = status.camera("cam-1").cloned().unwrap();
        assert!(!status.cameras.push(duplicate));
        assert_eq!(status.cameras.len(), 2);
    }

    #[test]
    fn test_merge_nvr_requires_matching_id() {
        let mut status = bootstrap();
        assert!(status.merge_nvr("other", &json!({ "name": "x" })).unwrap().is_none());
        let nvr = status.merge_nvr("nvr-1", &json!({ "version": "2.0.0" })).unwrap().cloned();
        assert_eq!(nvr.and_then(|n| n.version), Some("2.0.0".to_string()));
        assert_eq!(status.nvr.as_ref().map(|n| n.name.as_str()), Some("UNVR"));
    }

    #[test]
    fn test_advance_cursor_ignores_empty() {
        let mut status = bootstrap();
        status.advance_cursor("");
        assert_eq!(status.last_update_id, "cursor-0");
        status.advance_cursor("cursor-1");
        assert_eq!(status.last_update_id, "cursor-1");
    }

    #[test]
    fn test_model_key_parsing() {
        assert_eq!(ModelKey::from("liveview"), ModelKey::LiveView);
        assert_eq!(ModelKey::from("event"), ModelKey::Event);
        assert_eq!(
            ModelKey::from("doorlock"),
            ModelKey::Unknown("doorlock".to_string())
        );
        assert_eq!(ModelKey::from("sensor").to_string(), "sensor");
    }
}

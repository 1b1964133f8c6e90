//! Applies decoded frame pairs to the device model.
//!
//! An action frame names what happened (`update` or `add`), to which model
//! kind and which id. The data frame carries either a sparse patch (for
//! `update`) or an event descriptor (for `add` on `event`).
//!
//! The synchronizer is the only writer of the shared [`SystemStatus`]. It
//! returns the events a pair produced; the caller delivers them after the
//! write lock is released.

// Rust guideline compliant 2026-02

use serde::Deserialize;
use serde_json::Value;

use crate::codec::{FramePair, PayloadFormat};
use crate::error::Result;
use crate::events::{CameraEvent, EventDescriptor, ProtectEvent};
use crate::model::{ModelKey, SharedStatus, SystemStatus};

/// Parsed action frame.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDescriptor {
    /// `"add"` or `"update"`.
    pub action: String,
    /// Target entity id.
    #[serde(default)]
    pub id: String,
    /// Target model kind.
    #[serde(default)]
    pub model_key: String,
    /// New stream cursor, if this update advances it.
    #[serde(default)]
    pub new_update_id: Option<String>,
}

/// Folds frame pairs into the shared device model.
#[derive(Debug, Clone)]
pub struct UpdateSynchronizer {
    status: SharedStatus,
}

impl UpdateSynchronizer {
    /// Create a synchronizer over the shared model.
    pub fn new(status: SharedStatus) -> Self {
        Self { status }
    }

    /// Apply one frame pair and return the events it raised, in order.
    ///
    /// Non-JSON frames are skipped. Parse and merge failures return
    /// [`crate::ProtectError::Decode`] with the model unchanged.
    pub fn apply(&self, pair: &FramePair) -> Result<Vec<ProtectEvent>> {
        if pair.action.header.payload_format != PayloadFormat::Json {
            log::debug!(
                "[Sync] Skipping {:?} action frame: {}",
                pair.action.header.payload_format,
                pair.action.text_lossy()
            );
            return Ok(Vec::new());
        }

        let action: ActionDescriptor = pair.action.json()?;

        if pair.data.header.payload_format != PayloadFormat::Json {
            log::debug!(
                "[Sync] Skipping {:?} data frame for {} {}",
                pair.data.header.payload_format,
                action.model_key,
                action.id
            );
            return Ok(Vec::new());
        }

        let data: Value = pair.data.json()?;
        log::trace!("[Sync] {:?} -> {}", action, data);

        let mut guard = self
            .status
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let Some(status) = guard.as_mut() else {
            log::warn!("[Sync] Update received before bootstrap, dropping");
            return Ok(Vec::new());
        };

        let key = ModelKey::from(action.model_key.as_str());
        let events = match action.action.as_str() {
            "update" => apply_update(status, &key, &action.id, &data)?,
            "add" => apply_add(status, &key, data)?,
            other => {
                log::trace!("[Sync] Unhandled action '{}' for {}", other, key);
                Vec::new()
            }
        };

        if let Some(update_id) = action.new_update_id.as_deref() {
            status.advance_cursor(update_id);
        }

        Ok(events)
    }
}

/// Sparse-merge `patch` into the entity named by `key`/`id`.
fn apply_update(
    status: &mut SystemStatus,
    key: &ModelKey,
    id: &str,
    patch: &Value,
) -> Result<Vec<ProtectEvent>> {
    let events = match key {
        ModelKey::Camera => status
            .cameras
            .merge(id, patch)?
            .map(|camera| vec![ProtectEvent::CameraUpdated(camera.clone())]),
        ModelKey::Light => {
            let was_on = status.light(id).map(|light| light.is_light_on);
            status.lights.merge(id, patch)?.map(|light| {
                let mut events = vec![ProtectEvent::LightUpdated(light.clone())];
                if was_on != Some(light.is_light_on) {
                    events.push(ProtectEvent::LightToggled(light.clone()));
                }
                events
            })
        }
        ModelKey::Bridge => status
            .bridges
            .merge(id, patch)?
            .map(|bridge| vec![ProtectEvent::BridgeUpdated(bridge.clone())]),
        ModelKey::Group => status
            .groups
            .merge(id, patch)?
            .map(|group| vec![ProtectEvent::GroupUpdated(group.clone())]),
        ModelKey::LiveView => status
            .live_views
            .merge(id, patch)?
            .map(|view| vec![ProtectEvent::LiveViewUpdated(view.clone())]),
        ModelKey::Nvr => status
            .merge_nvr(id, patch)?
            .map(|nvr| vec![ProtectEvent::NvrUpdated(nvr.clone())]),
        ModelKey::User => status
            .users
            .merge(id, patch)?
            .map(|user| vec![ProtectEvent::UserUpdated(user.clone())]),
        ModelKey::Event | ModelKey::Unknown(_) => {
            log::trace!("[Sync] Ignoring update for unmodelled kind '{}'", key);
            return Ok(Vec::new());
        }
    };

    Ok(events.unwrap_or_else(|| {
        log::trace!("[Sync] Update for unknown {} {}, ignoring", key, id);
        Vec::new()
    }))
}

/// Turn an `add` on `event` into a camera event.
fn apply_add(status: &SystemStatus, key: &ModelKey, data: Value) -> Result<Vec<ProtectEvent>> {
    if *key != ModelKey::Event {
        log::trace!("[Sync] Ignoring add for '{}'", key);
        return Ok(Vec::new());
    }

    let descriptor: EventDescriptor = serde_json::from_value(data)?;
    log::debug!(
        "[Sync] Event {} type={} camera={:?}",
        descriptor.id,
        descriptor.event_type,
        descriptor.camera
    );

    let Some(camera) = descriptor
        .camera
        .as_deref()
        .and_then(|id| status.camera(id))
        .cloned()
    else {
        log::debug!("[Sync] Event {} has no known camera, dropping", descriptor.id);
        return Ok(Vec::new());
    };

    let event = match descriptor.event_type.as_str() {
        "ring" => ProtectEvent::Ring(CameraEvent::from_descriptor(descriptor, camera)?),
        "motion" => ProtectEvent::Motion(CameraEvent::from_descriptor(descriptor, camera)?),
        "smartDetectZone" => {
            ProtectEvent::SmartDetectZone(CameraEvent::from_descriptor(descriptor, camera)?)
        }
        other => {
            log::trace!("[Sync] Unhandled event type '{}'", other);
            return Ok(Vec::new());
        }
    };

    Ok(vec![event])
}

//! Events delivered to consumers.
//!
//! The supervisor pushes [`ProtectEvent`]s into a bounded channel in the order
//! they happen. The receive loop waits when the channel is full, so a slow
//! consumer slows frame processing instead of losing events.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::error::{ProtectError, Result};
use crate::model::{Bridge, Camera, Group, Light, LiveView, Nvr, UserAccount};

/// Receiving end of the client's event stream.
pub type EventReceiver = mpsc::Receiver<ProtectEvent>;

/// Event raised by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtectEvent {
    /// Streaming socket is open.
    Connected,
    /// Transport failed; a new connection attempt follows after `delay`.
    Reconnecting {
        /// 1-based reconnect attempt number.
        attempt: u32,
        /// Wait before the attempt.
        delay: Duration,
        /// Failure that triggered the reconnect.
        reason: String,
    },
    /// The supervisor gave up reconnecting. `Disconnected` follows.
    ReconnectFailed {
        /// Attempts made.
        attempts: u32,
        /// Last failure.
        error: String,
    },
    /// Streaming socket is closed and no reconnect is pending.
    Disconnected,
    /// Camera fields changed.
    CameraUpdated(Camera),
    /// Light fields changed.
    LightUpdated(Light),
    /// Light was switched on or off. Follows the matching `LightUpdated`.
    LightToggled(Light),
    /// Bridge fields changed.
    BridgeUpdated(Bridge),
    /// Group fields changed.
    GroupUpdated(Group),
    /// Live view fields changed.
    LiveViewUpdated(LiveView),
    /// NVR fields changed.
    NvrUpdated(Nvr),
    /// User account fields changed.
    UserUpdated(UserAccount),
    /// Doorbell ring.
    Ring(CameraEvent),
    /// Motion detected.
    Motion(CameraEvent),
    /// Smart detection (person, vehicle, ...) inside a zone.
    SmartDetectZone(CameraEvent),
}

/// A motion, ring, or smart-detect event resolved against its camera.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraEvent {
    /// Event id on the controller.
    pub id: String,
    /// Detection confidence (0-100).
    pub score: i32,
    /// Detected object classes for smart detections.
    pub smart_detect_types: Vec<String>,
    /// The camera as known at the time of the event.
    pub camera: Camera,
    /// Event start.
    pub start: DateTime<Utc>,
    /// Event end, if already known.
    pub end: Option<DateTime<Utc>>,
    /// Extra context (e.g. the sensor that triggered it).
    pub metadata: Option<EventMetadata>,
}

impl CameraEvent {
    /// Build from a parsed descriptor and its resolved camera.
    pub(crate) fn from_descriptor(descriptor: EventDescriptor, camera: Camera) -> Result<Self> {
        let start = millis_to_utc(descriptor.start)?;
        let end = descriptor.end.map(millis_to_utc).transpose()?;

        Ok(Self {
            id: descriptor.id,
            score: descriptor.score,
            smart_detect_types: descriptor.smart_detect_types,
            camera,
            start,
            end,
            metadata: descriptor.metadata,
        })
    }
}

fn millis_to_utc(millis: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| ProtectError::Decode(format!("timestamp out of range: {millis}")))
}

/// Context attached to some events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "RawMetadata")]
pub struct EventMetadata {
    /// Triggering sensor id.
    pub sensor_id: Option<String>,
    /// Triggering sensor name.
    pub sensor_name: Option<String>,
    /// Triggering device type (e.g. `"UFP-SENSE"`).
    pub device_type: Option<String>,
    /// Sensor mount type.
    pub mount_type: Option<String>,
    /// Client platform for app-originated events.
    pub client_platform: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMetadata {
    #[serde(default)]
    sensor_id: Option<MetadataText>,
    #[serde(default)]
    sensor_name: Option<MetadataText>,
    #[serde(default, rename = "type")]
    device_type: Option<MetadataText>,
    #[serde(default)]
    mount_type: Option<MetadataText>,
    #[serde(default)]
    client_platform: Option<String>,
}

#[derive(Deserialize)]
struct MetadataText {
    text: String,
}

impl From<RawMetadata> for EventMetadata {
    fn from(raw: RawMetadata) -> Self {
        Self {
            sensor_id: raw.sensor_id.map(|t| t.text),
            sensor_name: raw.sensor_name.map(|t| t.text),
            device_type: raw.device_type.map(|t| t.text),
            mount_type: raw.mount_type.map(|t| t.text),
            client_platform: raw.client_platform,
        }
    }
}

/// Data frame body of an `add` action on model key `event`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EventDescriptor {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub id: String,
    pub start: i64,
    #[serde(default)]
    pub end: Option<i64>,
    #[serde(default)]
    pub score: i32,
    #[serde(default)]
    pub camera: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub smart_detect_types: Vec<String>,
    #[serde(default)]
    pub metadata: Option<EventMetadata>,
}

/// The controller sends `null` for event kinds without smart labels.
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

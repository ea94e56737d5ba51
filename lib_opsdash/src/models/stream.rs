//! # Realtime Stream Frames
//!
//! Every frame on the realtime channel is a JSON envelope `{type, payload}`.
//! Frames are decoded into the closed [`StreamEvent`] enum; a type this client
//! does not know becomes [`StreamEvent::Unknown`], which every consumer treats
//! as an explicit no-op.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::models::system::SystemSnapshot;

/// A frame that could not be decoded. Dropped by the stream client.
#[derive(Debug, Error)]
#[error("malformed stream frame: {0}")]
pub struct DecodeError(String);

/// Payload of an `alert` frame. Shown transiently, never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    #[serde(default)]
    pub severity: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Latest system snapshot pushed by the backend.
    SystemUpdate(SystemSnapshot),
    Alert(AlertPayload),
    /// Something changed in the container set; the payload is not trusted.
    ContainerEvent,
    /// Backend keepalive.
    Ping,
    Unknown(String),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

impl StreamEvent {
    /// Decodes one text frame.
    ///
    /// # Errors
    /// Fails on invalid JSON, a missing `type`, or a recognised type whose
    /// payload does not match its contract.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let envelope: Envelope =
            serde_json::from_str(text).map_err(|e| DecodeError(e.to_string()))?;

        let event = match envelope.kind.as_str() {
            "system_update" => StreamEvent::SystemUpdate(
                serde_json::from_value(envelope.payload).map_err(|e| DecodeError(e.to_string()))?,
            ),
            "alert" => StreamEvent::Alert(
                serde_json::from_value(envelope.payload).map_err(|e| DecodeError(e.to_string()))?,
            ),
            "container_event" => StreamEvent::ContainerEvent,
            "ping" => StreamEvent::Ping,
            other => StreamEvent::Unknown(other.to_string()),
        };
        Ok(event)
    }

    /// The wire `type` of this event.
    pub fn kind(&self) -> &str {
        match self {
            StreamEvent::SystemUpdate(_) => "system_update",
            StreamEvent::Alert(_) => "alert",
            StreamEvent::ContainerEvent => "container_event",
            StreamEvent::Ping => "ping",
            StreamEvent::Unknown(kind) => kind,
        }
    }
}

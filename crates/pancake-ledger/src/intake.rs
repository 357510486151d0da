//! Intake requests: the shapes producers submit before a packet exists.

use std::collections::BTreeMap;

use pancake_ledger_core::{GeoId, PacketId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::geo::CaptureLocation;

/// A generic intake: any packet type with an arbitrary body.
#[derive(Debug, Clone, PartialEq)]
pub struct IntakeRequest {
    pub packet_type: String,
    pub location: CaptureLocation,
    pub body: Value,
    /// Caller-supplied observation time. Ignored unless parseable.
    pub observed_at: Option<String>,
    pub tenant: Option<Value>,
    pub prev: Option<PacketId>,
    pub tags: Vec<String>,
    pub lang: Option<String>,
    /// Additional geoids to index the packet under.
    pub extra_geoids: Vec<GeoId>,
}

impl IntakeRequest {
    pub fn new(packet_type: impl Into<String>, location: CaptureLocation, body: Value) -> Self {
        Self {
            packet_type: packet_type.into(),
            location,
            body,
            observed_at: None,
            tenant: None,
            prev: None,
            tags: Vec::new(),
            lang: None,
            extra_geoids: Vec::new(),
        }
    }
}

/// A field scouting observation, stored as a `note` packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoutingReport {
    pub location: CaptureLocation,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub attachments: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<Value>,
    /// Producer-specific fields, copied into the body.
    #[serde(default, flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ScoutingReport {
    pub fn new(location: CaptureLocation, message: impl Into<String>) -> Self {
        Self {
            location,
            message: message.into(),
            attachments: Vec::new(),
            observed_at: None,
            tenant: None,
            extra: BTreeMap::new(),
        }
    }

    /// `{message, attachments}` plus the extra fields. Extras never replace
    /// the two fixed fields.
    pub fn body(&self) -> Value {
        let mut body = Map::new();
        for (key, value) in &self.extra {
            body.insert(key.clone(), value.clone());
        }
        body.insert("message".into(), Value::String(self.message.clone()));
        body.insert("attachments".into(), Value::Array(self.attachments.clone()));
        Value::Object(body)
    }
}

/// A chat message posted to a thread, stored as a `chat_message` packet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub location: CaptureLocation,
    pub text: String,
    pub thread_id: String,
    #[serde(default)]
    pub attachments: Vec<Value>,
    /// Additional geoids the message is relevant to.
    #[serde(default)]
    pub geoids: Vec<GeoId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<String>,
}

impl ChatMessage {
    pub fn new(
        location: CaptureLocation,
        thread_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            location,
            text: text.into(),
            thread_id: thread_id.into(),
            attachments: Vec::new(),
            geoids: Vec::new(),
            observed_at: None,
        }
    }

    /// Body for already-truncated `text`.
    pub(crate) fn body(&self, text: &str) -> Value {
        let mut body = Map::new();
        body.insert("text".into(), Value::String(text.to_string()));
        body.insert("thread_id".into(), Value::String(self.thread_id.clone()));
        body.insert("attachments".into(), Value::Array(self.attachments.clone()));
        if !self.geoids.is_empty() {
            body.insert(
                "geoids".into(),
                Value::Array(
                    self.geoids
                        .iter()
                        .map(|g| Value::String(g.to_string()))
                        .collect(),
                ),
            );
        }
        if let CaptureLocation::Point { .. } = self.location {
            body.insert("capture_point".into(), self.location.to_value());
        }
        Value::Object(body)
    }
}

//! Packet: an immutable unit of observation or communication.
//!
//! Wire form:
//!
//! ```text
//! {"Header": {id, geoid, timestamp, type, tenant?, prev?},
//!  "Body":   <any JSON value>,
//!  "Footer": {hash, enc, tags?, lang?}}
//! ```
//!
//! `Footer.hash` is `SHA-256(canonical(Header) ++ canonical(Body))`. A packet
//! is built once by [`PacketBuilder`] and never mutated afterwards.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::hash::{packet_hash, Digest};
use crate::types::{format_timestamp, parse_timestamp, GeoId, PacketId};

/// Footer encoding marker for plaintext bodies.
pub const ENC_NONE: &str = "none";

/// Tag added by intake when text was shortened.
pub const TAG_TRUNCATED: &str = "truncated";

fn default_enc() -> String {
    ENC_NONE.to_string()
}

/// A present field is `Some`, even when its value is `null`.
fn present_value<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(deserializer).map(Some)
}

/// The header of a packet. Every field here is covered by the footer hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketHeader {
    pub id: PacketId,

    /// Primary location of the packet.
    pub geoid: GeoId,

    /// Observation time, exactly as hashed.
    pub timestamp: String,

    #[serde(rename = "type")]
    pub packet_type: String,

    /// Absent, or the value as sent. An explicit `null` from a foreign
    /// producer is `Some(Value::Null)` so the header re-hashes identically.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub tenant: Option<Value>,

    /// Predecessor packet, when this packet continues another.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<PacketId>,

    /// Additional header fields supplied by foreign producers. Preserved so
    /// that their hash still verifies.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl PacketHeader {
    /// The header as a JSON object, in the form that is hashed.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        for (key, value) in &self.extra {
            map.insert(key.clone(), value.clone());
        }
        map.insert("id".into(), Value::String(self.id.to_string()));
        map.insert("geoid".into(), Value::String(self.geoid.to_string()));
        map.insert("timestamp".into(), Value::String(self.timestamp.clone()));
        map.insert("type".into(), Value::String(self.packet_type.clone()));
        if let Some(tenant) = &self.tenant {
            map.insert("tenant".into(), tenant.clone());
        }
        if let Some(prev) = &self.prev {
            map.insert("prev".into(), Value::String(prev.to_string()));
        }
        Value::Object(map)
    }
}

/// The footer of a packet. Not covered by the hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketFooter {
    pub hash: Digest,

    #[serde(default = "default_enc")]
    pub enc: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

impl PacketFooter {
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("hash".into(), Value::String(self.hash.to_hex()));
        map.insert("enc".into(), Value::String(self.enc.clone()));
        if !self.tags.is_empty() {
            map.insert(
                "tags".into(),
                Value::Array(self.tags.iter().cloned().map(Value::String).collect()),
            );
        }
        if let Some(lang) = &self.lang {
            map.insert("lang".into(), Value::String(lang.clone()));
        }
        Value::Object(map)
    }
}

/// A complete packet: header + body + footer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Packet {
    #[serde(rename = "Header")]
    pub header: PacketHeader,

    #[serde(rename = "Body")]
    pub body: Value,

    #[serde(rename = "Footer")]
    pub footer: PacketFooter,
}

impl Packet {
    pub fn id(&self) -> PacketId {
        self.header.id
    }

    pub fn geoid(&self) -> &GeoId {
        &self.header.geoid
    }

    pub fn packet_type(&self) -> &str {
        &self.header.packet_type
    }

    pub fn prev(&self) -> Option<PacketId> {
        self.header.prev
    }

    /// Recompute `packet_hash(header, body)`.
    pub fn compute_hash(&self) -> Digest {
        packet_hash(&self.header.to_value(), &self.body)
    }

    /// Parsed observation time, if the header timestamp is well formed.
    pub fn observed_at(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.header.timestamp)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.footer.tags.iter().any(|t| t == tag)
    }

    /// Free text used for keyword search: `Body.text`, else `Body.message`.
    pub fn search_text(&self) -> Option<&str> {
        self.body
            .get("text")
            .and_then(Value::as_str)
            .or_else(|| self.body.get("message").and_then(Value::as_str))
    }

    /// Chat thread the packet was posted to, if any.
    pub fn thread_id(&self) -> Option<&str> {
        self.body.get("thread_id").and_then(Value::as_str)
    }

    /// The wire form as a JSON value.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("Header".into(), self.header.to_value());
        map.insert("Body".into(), self.body.clone());
        map.insert("Footer".into(), self.footer.to_value());
        Value::Object(map)
    }
}

/// Builder for creating packets.
///
/// ```
/// use pancake_ledger_core::{GeoId, PacketBuilder};
/// use serde_json::json;
///
/// let packet = PacketBuilder::new("note", GeoId::new("geo-field-a"), json!({"message": "hi"}))
///     .tag("scouting")
///     .build();
/// assert_eq!(packet.footer.hash, packet.compute_hash());
/// ```
pub struct PacketBuilder {
    packet_type: String,
    geoid: GeoId,
    body: Value,
    id: Option<PacketId>,
    observed_at: Option<String>,
    now: Option<DateTime<Utc>>,
    tenant: Option<Value>,
    prev: Option<PacketId>,
    tags: Vec<String>,
    lang: Option<String>,
}

impl PacketBuilder {
    /// Start building a packet.
    pub fn new(packet_type: impl Into<String>, geoid: GeoId, body: Value) -> Self {
        Self {
            packet_type: packet_type.into(),
            geoid,
            body,
            id: None,
            observed_at: None,
            now: None,
            tenant: None,
            prev: None,
            tags: Vec::new(),
            lang: None,
        }
    }

    /// Use a fixed identifier instead of generating one.
    pub fn id(mut self, id: PacketId) -> Self {
        self.id = Some(id);
        self
    }

    /// Caller-supplied observation time. Ignored unless it parses as an
    /// absolute timestamp.
    pub fn observed_at(mut self, ts: impl Into<String>) -> Self {
        self.observed_at = Some(ts.into());
        self
    }

    /// Clock reading to use instead of `Utc::now()`.
    pub fn now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Set the tenant. `null` leaves the field out of the header.
    pub fn tenant(mut self, tenant: Value) -> Self {
        self.tenant = (!tenant.is_null()).then_some(tenant);
        self
    }

    pub fn prev(mut self, prev: PacketId) -> Self {
        self.prev = Some(prev);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = Some(lang.into());
        self
    }

    /// Assemble the header, compute the footer hash, and return the packet.
    pub fn build(self) -> Packet {
        let now = self.now.unwrap_or_else(Utc::now);
        let observed = self
            .observed_at
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or(now);

        let header = PacketHeader {
            id: self.id.unwrap_or_else(|| PacketId::at(now)),
            geoid: self.geoid,
            timestamp: format_timestamp(observed),
            packet_type: self.packet_type,
            tenant: self.tenant.filter(|t| !is_empty_value(t)),
            prev: self.prev,
            extra: BTreeMap::new(),
        };

        let hash = packet_hash(&header.to_value(), &self.body);

        let mut tags = Vec::with_capacity(self.tags.len());
        for tag in self.tags {
            if !tag.is_empty() && !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        Packet {
            header,
            body: self.body,
            footer: PacketFooter {
                hash,
                enc: default_enc(),
                tags,
                lang: self.lang.filter(|l| !l.is_empty()),
            },
        }
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

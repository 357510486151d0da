//! Packet validation: shape, integrity and size checks, plus text truncation.
//!
//! All functions here are pure; none perform I/O.

use std::borrow::Cow;

use serde_json::{Map, Value};

use crate::canonical::{canonical_len, canonicalize};
use crate::error::ValidationError;
use crate::hash::packet_hash;
use crate::packet::Packet;

/// Default ceiling for the canonical body size (512 KiB).
pub const DEFAULT_MAX_BODY_BYTES: usize = 512 * 1024;

/// Top-level sections every packet must carry, and no others.
pub const PACKET_SECTIONS: [&str; 3] = ["Header", "Body", "Footer"];

/// Header fields every packet must carry.
pub const REQUIRED_HEADER_FIELDS: [&str; 4] = ["id", "geoid", "timestamp", "type"];

/// Validate an untrusted packet document and decode it.
///
/// This performs:
/// - Section check: exactly `Header`, `Body`, `Footer`
/// - Required header fields and a string `Footer.hash`
/// - Hash verification over the sections as given
/// - Typed decoding, which must reproduce the header exactly
pub fn validate_structure(raw: &Value) -> Result<Packet, ValidationError> {
    let (sections, stored_hash) = split_sections(raw)?;
    verify_and_decode(raw, sections, stored_hash)
}

/// Like [`validate_structure`], but rejects an oversized `Body` before
/// anything is hashed.
///
/// Shape problems are reported first, then `SizeViolation`, then
/// `IntegrityViolation`.
pub fn validate_structure_within(
    raw: &Value,
    max_body_bytes: usize,
) -> Result<Packet, ValidationError> {
    let (sections, stored_hash) = split_sections(raw)?;
    validate_size(&sections["Body"], max_body_bytes)?;
    verify_and_decode(raw, sections, stored_hash)
}

/// Section, header-field and footer-hash checks. No hashing.
fn split_sections(raw: &Value) -> Result<(&Map<String, Value>, &str), ValidationError> {
    // 1. Sections
    let sections = raw
        .as_object()
        .ok_or_else(|| ValidationError::shape("packet must be a JSON object"))?;
    for section in PACKET_SECTIONS {
        if !sections.contains_key(section) {
            return Err(ValidationError::shape(format!("missing section '{}'", section)));
        }
    }
    if sections.len() != PACKET_SECTIONS.len() {
        let unexpected: Vec<&str> = sections
            .keys()
            .map(String::as_str)
            .filter(|k| !PACKET_SECTIONS.contains(k))
            .collect();
        return Err(ValidationError::shape(format!(
            "unexpected section(s): {}",
            unexpected.join(", ")
        )));
    }

    // 2. Required header fields
    let header = sections["Header"]
        .as_object()
        .ok_or_else(|| ValidationError::shape("Header must be an object"))?;
    for field in REQUIRED_HEADER_FIELDS {
        if !header.contains_key(field) {
            return Err(ValidationError::shape(format!(
                "Header missing required field '{}'",
                field
            )));
        }
    }

    // 3. Footer hash
    let stored_hash = sections["Footer"]
        .get("hash")
        .and_then(Value::as_str)
        .ok_or_else(|| ValidationError::shape("Footer must contain a string 'hash'"))?;

    Ok((sections, stored_hash))
}

fn verify_and_decode(
    raw: &Value,
    sections: &Map<String, Value>,
    stored_hash: &str,
) -> Result<Packet, ValidationError> {
    // 4. Integrity over the sections exactly as received
    let computed = packet_hash(&sections["Header"], &sections["Body"]);
    if computed.to_hex() != stored_hash {
        return Err(ValidationError::IntegrityViolation {
            expected: stored_hash.to_string(),
            actual: computed.to_hex(),
        });
    }

    // 5. Typed decoding
    let packet: Packet = serde_json::from_value(raw.clone())
        .map_err(|e| ValidationError::shape(format!("malformed packet: {}", e)))?;
    if canonicalize(&packet.header.to_value()) != canonicalize(&sections["Header"]) {
        return Err(ValidationError::shape(
            "Header contains values that do not survive decoding",
        ));
    }
    check_required_values(&packet)?;

    Ok(packet)
}

/// Validate a typed packet: required values present and hash intact.
pub fn validate_packet(packet: &Packet) -> Result<(), ValidationError> {
    check_required_values(packet)?;

    let computed = packet.compute_hash();
    if computed != packet.footer.hash {
        return Err(ValidationError::IntegrityViolation {
            expected: packet.footer.hash.to_hex(),
            actual: computed.to_hex(),
        });
    }
    Ok(())
}

fn check_required_values(packet: &Packet) -> Result<(), ValidationError> {
    if packet.header.geoid.is_empty() {
        return Err(ValidationError::shape("Header.geoid must not be empty"));
    }
    if packet.header.timestamp.trim().is_empty() {
        return Err(ValidationError::shape("Header.timestamp must not be empty"));
    }
    if packet.header.packet_type.trim().is_empty() {
        return Err(ValidationError::shape("Header.type must not be empty"));
    }
    Ok(())
}

/// Check the canonical byte length of `body` against `max_bytes`.
///
/// Returns the measured size on success.
pub fn validate_size(body: &Value, max_bytes: usize) -> Result<usize, ValidationError> {
    let size = canonical_len(body);
    if size > max_bytes {
        return Err(ValidationError::SizeViolation {
            size,
            limit: max_bytes,
        });
    }
    Ok(size)
}

/// Shorten `text` to at most `max_code_points` Unicode scalar values.
///
/// Counts code points, not bytes or grapheme clusters, so a multi-code-point
/// grapheme (e.g. an emoji with a skin-tone modifier) may be split.
pub fn truncate_text(text: &str, max_code_points: usize) -> (Cow<'_, str>, bool) {
    match text.char_indices().nth(max_code_points) {
        Some((cut, _)) => (Cow::Owned(text[..cut].to_string()), true),
        None => (Cow::Borrowed(text), false),
    }
}

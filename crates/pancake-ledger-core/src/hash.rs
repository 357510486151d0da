//! Hashing primitives: 256-bit digests over canonical bytes.
//!
//! Packets are always hashed with SHA-256 (the wire format publishes the
//! footer hash as a bare hex string). Ledgers record the algorithm they were
//! created with in their chain summary, so a ledger may use BLAKE3 instead.

use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest as _, Sha256};

use crate::canonical::canonicalize;

/// A 32-byte digest, rendered as 64 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest(pub [u8; 32]);

impl Digest {
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex form (64 characters).
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex. Upper-case input is accepted.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Digest::from_hex(&s).map_err(de::Error::custom)
    }
}

/// The digest algorithm used for a chain.
///
/// Serialized by its published name so stored records stay verifiable by
/// readers that do not share this code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum HashAlgorithm {
    #[default]
    #[serde(rename = "SHA-256")]
    Sha256,
    #[serde(rename = "BLAKE3")]
    Blake3,
}

impl HashAlgorithm {
    /// Published name, as stored alongside hashes.
    pub fn name(self) -> &'static str {
        match self {
            Self::Sha256 => "SHA-256",
            Self::Blake3 => "BLAKE3",
        }
    }

    /// Look up an algorithm by its published name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "SHA-256" | "SHA256" => Some(Self::Sha256),
            "BLAKE3" => Some(Self::Blake3),
            _ => None,
        }
    }

    /// Hash a single byte string.
    pub fn digest(self, data: &[u8]) -> Digest {
        self.digest_parts(&[data])
    }

    /// Hash the concatenation of several byte strings.
    pub fn digest_parts(self, parts: &[&[u8]]) -> Digest {
        match self {
            Self::Sha256 => {
                let mut hasher = Sha256::new();
                for part in parts {
                    hasher.update(part);
                }
                Digest(hasher.finalize().into())
            }
            Self::Blake3 => {
                let mut hasher = blake3::Hasher::new();
                for part in parts {
                    hasher.update(part);
                }
                Digest(*hasher.finalize().as_bytes())
            }
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// SHA-256 of raw bytes.
pub fn sha256(data: &[u8]) -> Digest {
    HashAlgorithm::Sha256.digest(data)
}

/// `Hash(Canonicalize(payload))` with SHA-256.
pub fn content_hash(payload: &Value) -> Digest {
    content_hash_with(HashAlgorithm::Sha256, payload)
}

/// `Hash(Canonicalize(payload))` with the given algorithm.
pub fn content_hash_with(algorithm: HashAlgorithm, payload: &Value) -> Digest {
    algorithm.digest(&canonicalize(payload))
}

/// `SHA-256(Canonicalize(header) ++ Canonicalize(body))`.
///
/// The two canonical byte strings are concatenated; they are not wrapped in
/// an enclosing structure.
pub fn packet_hash(header: &Value, body: &Value) -> Digest {
    let header_bytes = canonicalize(header);
    let body_bytes = canonicalize(body);
    HashAlgorithm::Sha256.digest_parts(&[header_bytes.as_slice(), body_bytes.as_slice()])
}

//! The geocoding collaborator.
//!
//! Turning a capture point or geometry into a [`GeoId`] is done by an
//! external service. The kernel only depends on this trait and calls it
//! exactly once per intake, under a timeout.

use std::time::Duration;

use async_trait::async_trait;
use pancake_ledger_core::GeoId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Failure reported by, or on behalf of, an external collaborator.
///
/// Carries the collaborator's own message unmasked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    #[error("{collaborator}: {message}")]
    Failed {
        collaborator: &'static str,
        message: String,
    },

    #[error("{collaborator} did not answer within {timeout:?}")]
    Timeout {
        collaborator: &'static str,
        timeout: Duration,
    },
}

impl CollaboratorError {
    pub fn geocoder(message: impl Into<String>) -> Self {
        Self::Failed {
            collaborator: "geo resolver",
            message: message.into(),
        }
    }
}

/// Where an observation was captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CaptureLocation {
    /// A WGS84 point.
    Point { lat: f64, lon: f64 },
    /// A GeoJSON geometry (field boundary, polygon, ...).
    Geometry(Value),
}

impl CaptureLocation {
    pub fn point(lat: f64, lon: f64) -> Self {
        Self::Point { lat, lon }
    }

    /// JSON form, as recorded in packet bodies.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Point { lat, lon } => serde_json::json!({ "lat": lat, "lon": lon }),
            Self::Geometry(geometry) => geometry.clone(),
        }
    }
}

/// Resolves capture locations to geoids.
#[async_trait]
pub trait GeoResolver: Send + Sync {
    async fn resolve(&self, location: &CaptureLocation) -> Result<GeoId, CollaboratorError>;
}

/// Resolver for deployments that only ingest pre-built packets.
///
/// Every resolution fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredResolver;

#[async_trait]
impl GeoResolver for UnconfiguredResolver {
    async fn resolve(&self, _location: &CaptureLocation) -> Result<GeoId, CollaboratorError> {
        Err(CollaboratorError::geocoder("no geo resolver configured"))
    }
}

//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pancake_ledger::{
    CaptureLocation, ChatMessage, CollaboratorError, GeoResolver, Kernel, KernelConfig,
    ScoutingReport,
};
use pancake_ledger_core::{Author, GeoId, Ledger, Location, NewLedger, Packet, PacketBuilder};
use pancake_ledger_store::MemoryStore;
use serde_json::Value;

/// Geoid the default fixture resolves every location to.
pub const FIELD_GEOID: &str = "geo-field-a";

/// Resolves every location to one geoid and counts the calls.
#[derive(Debug)]
pub struct FixedGeoResolver {
    geoid: GeoId,
    calls: AtomicUsize,
}

impl FixedGeoResolver {
    pub fn new(geoid: impl Into<GeoId>) -> Self {
        Self {
            geoid: geoid.into(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `resolve` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GeoResolver for FixedGeoResolver {
    async fn resolve(&self, _location: &CaptureLocation) -> Result<GeoId, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.geoid.clone())
    }
}

/// Fails every resolution with the given message.
#[derive(Debug, Clone)]
pub struct FailingResolver(pub String);

#[async_trait]
impl GeoResolver for FailingResolver {
    async fn resolve(&self, _location: &CaptureLocation) -> Result<GeoId, CollaboratorError> {
        Err(CollaboratorError::geocoder(self.0.clone()))
    }
}

/// Never answers.
#[derive(Debug, Clone, Copy, Default)]
pub struct StalledResolver;

#[async_trait]
impl GeoResolver for StalledResolver {
    async fn resolve(&self, _location: &CaptureLocation) -> Result<GeoId, CollaboratorError> {
        std::future::pending().await
    }
}

pub type TestKernel = Kernel<MemoryStore, FixedGeoResolver>;

/// A kernel over a memory store and a fixed resolver.
pub struct TestFixture {
    pub kernel: TestKernel,
}

impl TestFixture {
    /// Create a fixture resolving to [`FIELD_GEOID`] with default config.
    pub fn new() -> Self {
        Self::with_config(KernelConfig::default())
    }

    pub fn with_config(config: KernelConfig) -> Self {
        Self {
            kernel: Kernel::new(MemoryStore::new(), FixedGeoResolver::new(FIELD_GEOID), config),
        }
    }

    /// A capture point somewhere in the fixture's field.
    pub fn point() -> CaptureLocation {
        CaptureLocation::point(41.5868, -93.625)
    }

    /// Record a scouting note.
    pub async fn note(&self, message: &str) -> Packet {
        self.kernel
            .intake_scouting(ScoutingReport::new(Self::point(), message))
            .await
            .expect("note intake")
    }

    /// Post a chat message to a thread.
    pub async fn chat(&self, thread_id: &str, text: &str) -> Packet {
        self.kernel
            .intake_chat_message(ChatMessage::new(Self::point(), thread_id, text))
            .await
            .expect("chat intake")
    }

    /// Open a field-visit ledger for `user` with an opening message.
    pub async fn field_visit(&self, user: &str) -> Ledger {
        let new = NewLedger::field_visit(
            Location::labeled(FIELD_GEOID, "North 40"),
            Author::inferred(user),
            Some("ai-agronomist"),
            Some("Starting field inspection"),
        );
        let (ledger, _) = self.kernel.create_ledger(new).await.expect("create ledger");
        ledger
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a packet with a fixed observation time, bypassing intake.
pub fn packet_at(packet_type: &str, geoid: &str, observed_at: DateTime<Utc>, body: Value) -> Packet {
    PacketBuilder::new(packet_type, GeoId::new(geoid), body)
        .now(observed_at)
        .build()
}

//! Kernel configuration.

use std::time::Duration;

use pancake_ledger_core::{HashAlgorithm, DEFAULT_MAX_BODY_BYTES};

use crate::error::{KernelError, Result};

pub const ENV_MAX_BODY_KB: &str = "PANCAKE_MAX_BODY_KB";
pub const ENV_CHAT_MAX_CHARS: &str = "PANCAKE_CHAT_MAX_CHARS";
pub const ENV_COLLABORATOR_TIMEOUT_SECS: &str = "PANCAKE_COLLABORATOR_TIMEOUT_SECS";
pub const ENV_LEDGER_ALGORITHM: &str = "PANCAKE_LEDGER_ALGORITHM";

/// Configuration for the Kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelConfig {
    /// Ceiling on the canonical body size.
    pub max_body_bytes: usize,
    /// Chat text is cut to this many code points.
    pub chat_max_chars: usize,
    /// Whether to validate structure and integrity on ingest.
    pub validate_on_ingest: bool,
    /// Whether to re-check integrity when a packet is read back.
    pub verify_on_read: bool,
    /// Upper bound on any single collaborator call.
    pub collaborator_timeout: Duration,
    /// Digest algorithm for new ledgers.
    pub ledger_algorithm: HashAlgorithm,
    /// Retries after a stale-revision conflict on a ledger write.
    pub append_retries: u32,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            chat_max_chars: 250,
            validate_on_ingest: true,
            verify_on_read: true,
            collaborator_timeout: Duration::from_secs(10),
            ledger_algorithm: HashAlgorithm::Sha256,
            append_retries: 3,
        }
    }
}

impl KernelConfig {
    /// Defaults overlaid with `PANCAKE_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(kb) = lookup(ENV_MAX_BODY_KB) {
            config.max_body_bytes = parse_positive(ENV_MAX_BODY_KB, &kb)? * 1024;
        }
        if let Some(chars) = lookup(ENV_CHAT_MAX_CHARS) {
            config.chat_max_chars = parse_positive(ENV_CHAT_MAX_CHARS, &chars)?;
        }
        if let Some(secs) = lookup(ENV_COLLABORATOR_TIMEOUT_SECS) {
            let secs = parse_positive(ENV_COLLABORATOR_TIMEOUT_SECS, &secs)?;
            config.collaborator_timeout = Duration::from_secs(secs as u64);
        }
        if let Some(name) = lookup(ENV_LEDGER_ALGORITHM) {
            config.ledger_algorithm = HashAlgorithm::from_name(&name).ok_or_else(|| {
                KernelError::Config(format!("{}: unknown algorithm '{}'", ENV_LEDGER_ALGORITHM, name))
            })?;
        }

        Ok(config)
    }
}

fn parse_positive(key: &str, value: &str) -> Result<usize> {
    match value.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(KernelError::Config(format!(
            "{}: expected a positive integer, got '{}'",
            key, value
        ))),
    }
}

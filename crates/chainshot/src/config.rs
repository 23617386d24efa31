//! TOML-compatible configuration for the recorder and its RPC provider.
//!
//! Operator-facing primitives (milliseconds, counts, strings) are used so
//! the file stays readable; `to_rpc_config` converts to the domain type.
//!
//! ```toml
//! [recorder]
//! missing_receipt = "drop"
//! record_initial_state = true
//! human_snapshots_dir = "__snapshots__humans__"
//!
//! [rpc]
//! url = "http://127.0.0.1:8545"
//! timeout_ms = 30000
//! receipt_poll_attempts = 20
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::RecorderError;
use crate::provider::RpcConfig;

/// Top-level configuration, loadable from a TOML file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainshotConfig {
    pub recorder: RecorderConfig,
    pub rpc: RpcTomlConfig,
}

/// What to do when a submitted call never yields a receipt.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingReceiptPolicy {
    /// Drop the call from the log with a warning.
    #[default]
    Drop,
    /// Fail scenario finalization.
    Fail,
}

/// Recorder behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Policy for unconfirmed calls (default: drop).
    pub missing_receipt: MissingReceiptPolicy,
    /// Record an `initialState` entry when a scenario starts (default: true).
    pub record_initial_state: bool,
    /// Directory, next to the test source, receiving narrative markdown.
    pub human_snapshots_dir: String,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            missing_receipt: MissingReceiptPolicy::Drop,
            record_initial_state: true,
            human_snapshots_dir: "__snapshots__humans__".to_string(),
        }
    }
}

/// RPC provider settings (TOML-friendly).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcTomlConfig {
    /// Node endpoint (default: local dev node).
    pub url: String,
    /// Per-request timeout in milliseconds (default: 30_000).
    pub timeout_ms: u64,
    /// TCP connect timeout in milliseconds (default: 10_000).
    pub connect_timeout_ms: u64,
    /// Retries for transient errors (default: 3).
    pub max_retries: u32,
    /// Base backoff in milliseconds (default: 1_000).
    pub base_backoff_ms: u64,
    /// Delay between receipt polls in milliseconds (default: 100).
    pub receipt_poll_interval_ms: u64,
    /// Receipt polls before a receipt counts as unavailable (default: 1).
    pub receipt_poll_attempts: u32,
}

impl Default for RpcTomlConfig {
    fn default() -> Self {
        let rc = RpcConfig::default();
        Self {
            url: "http://127.0.0.1:8545".to_string(),
            timeout_ms: rc.timeout.as_millis() as u64,
            connect_timeout_ms: rc.connect_timeout.as_millis() as u64,
            max_retries: rc.max_retries,
            base_backoff_ms: rc.base_backoff.as_millis() as u64,
            receipt_poll_interval_ms: rc.receipt_poll_interval.as_millis() as u64,
            receipt_poll_attempts: rc.receipt_poll_attempts,
        }
    }
}

impl ChainshotConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, RecorderError> {
        let config: ChainshotConfig = toml::from_str(contents)
            .map_err(|e| RecorderError::Config(format!("Failed to parse TOML config: {e}")))?;
        config.validate().map_err(RecorderError::Config)?;
        Ok(config)
    }

    /// Load from an optional TOML file path; `None` yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, RecorderError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let contents = std::fs::read_to_string(path).map_err(|e| RecorderError::Io {
            path: path.display().to_string(),
            cause: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Convert the TOML-facing RPC section into the provider's config.
    pub fn to_rpc_config(&self) -> RpcConfig {
        RpcConfig {
            timeout: Duration::from_millis(self.rpc.timeout_ms),
            connect_timeout: Duration::from_millis(self.rpc.connect_timeout_ms),
            max_retries: self.rpc.max_retries,
            base_backoff: Duration::from_millis(self.rpc.base_backoff_ms),
            receipt_poll_interval: Duration::from_millis(self.rpc.receipt_poll_interval_ms),
            receipt_poll_attempts: self.rpc.receipt_poll_attempts,
        }
    }

    /// Validate configuration values, returning an error message on failure.
    pub fn validate(&self) -> Result<(), String> {
        if self.rpc.url.trim().is_empty() {
            return Err("rpc.url must not be empty".to_string());
        }
        if !self.rpc.url.starts_with("http://") && !self.rpc.url.starts_with("https://") {
            return Err(format!("rpc.url must be an http(s) URL, got {}", self.rpc.url));
        }
        if self.rpc.timeout_ms == 0 {
            return Err("rpc.timeout_ms must be > 0".to_string());
        }
        if self.rpc.receipt_poll_attempts == 0 {
            return Err("rpc.receipt_poll_attempts must be > 0".to_string());
        }
        let dir = self.recorder.human_snapshots_dir.trim();
        if dir.is_empty() || dir.contains(['/', '\\']) {
            return Err(format!(
                "recorder.human_snapshots_dir must be a plain directory name, got '{}'",
                self.recorder.human_snapshots_dir
            ));
        }
        Ok(())
    }
}

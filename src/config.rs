//! Client configuration
//!
//! [`ClientConfig`] is plain serde data, loadable from a JSON file. Every
//! field has a default so a partial file (or `{}`) is valid.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::transport::ServerUrl;

/// Default management server endpoint
pub const DEFAULT_SERVER_URL: &str = "http://localhost:9988/path";
/// Default device id sent in `OMADM-DevID`
pub const DEFAULT_DEVICE_ID: &str = "omadm-device";
/// Default timeout of every network call
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Encoding of P1/P3 bodies on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadEncoding {
    /// Plain JSON text
    #[default]
    Json,
    /// Base64 of the JSON text, replies decoded the same way
    Base64,
}

/// Bounded retry of HGET transport failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, 1 means no retry
    pub max_attempts: u32,
    /// Wait before attempt n+1 is `n * backoff_ms`
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff_ms: 0,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(attempt)))
    }
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Management server endpoint for P1 and P3
    pub server_url: String,
    /// Value of the `OMADM-DevID` header
    pub device_id: String,
    /// Include the full tree dump in P1
    pub dump_tree: bool,
    /// Timeout of every network call
    pub timeout_ms: u64,
    pub payload_encoding: PayloadEncoding,
    /// Answer unrecognized P2 commands with a 501 status instead of dropping them
    pub report_unknown_commands: bool,
    /// Answer failed HGET commands with an error status instead of nothing
    pub report_failed_fetches: bool,
    pub fetch_retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            device_id: DEFAULT_DEVICE_ID.to_string(),
            dump_tree: false,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            payload_encoding: PayloadEncoding::default(),
            report_unknown_commands: false,
            report_failed_fetches: false,
            fetch_retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from JSON text
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check values that serde cannot
    pub fn validate(&self) -> Result<()> {
        ServerUrl::parse(&self.server_url)
            .map_err(|e| Error::Config(format!("server_url: {}", e)))?;
        if self.timeout_ms == 0 {
            return Err(Error::Config("timeout_ms must be positive".into()));
        }
        if self.fetch_retry.max_attempts == 0 {
            return Err(Error::Config(
                "fetch_retry.max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Network timeout as a duration
    ///
    /// A zero `timeout_ms` would fail every request at once, so it falls
    /// back to the default.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        match self.timeout_ms {
            0 => Duration::from_millis(DEFAULT_TIMEOUT_MS),
            ms => Duration::from_millis(ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::from_json("{}").unwrap();
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.server_url, "http://localhost:9988/path");
        assert_eq!(config.timeout(), Duration::from_secs(30));
        assert_eq!(config.fetch_retry.max_attempts, 1);
        assert_eq!(config.payload_encoding, PayloadEncoding::Json);
    }

    #[test]
    fn test_partial_override() {
        let config = ClientConfig::from_json(
            r#"{"device_id": "PlanB", "payload_encoding": "base64",
                "fetch_retry": {"max_attempts": 3}}"#,
        )
        .unwrap();
        assert_eq!(config.device_id, "PlanB");
        assert_eq!(config.payload_encoding, PayloadEncoding::Base64);
        assert_eq!(config.fetch_retry.max_attempts, 3);
        assert_eq!(config.fetch_retry.backoff_ms, 0);
        assert!(!config.dump_tree);
    }

    #[test]
    fn test_validation() {
        for json in [
            r#"{"server_url": "localhost:9988"}"#,
            r#"{"timeout_ms": 0}"#,
            r#"{"fetch_retry": {"max_attempts": 0}}"#,
            r#"{"device_id": 5}"#,
        ] {
            assert!(
                matches!(ClientConfig::from_json(json), Err(Error::Config(_))),
                "{json} should be rejected"
            );
        }
    }

    #[test]
    fn test_zero_timeout_uses_default() {
        let config = ClientConfig {
            timeout_ms: 0,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(config.timeout(), Duration::from_millis(DEFAULT_TIMEOUT_MS));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"dump_tree": true}}"#).unwrap();
        assert!(ClientConfig::from_file(file.path()).unwrap().dump_tree);

        let err = ClientConfig::from_file("/nonexistent/client.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/client.json"));
    }

    #[test]
    fn test_retry_backoff() {
        let retry = RetryPolicy {
            max_attempts: 3,
            backoff_ms: 100,
        };
        assert_eq!(retry.backoff(1), Duration::from_millis(100));
        assert_eq!(retry.backoff(2), Duration::from_millis(200));
    }
}

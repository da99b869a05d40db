//! Engine configuration resolved once by the embedder.
//!
//! The embedding context gathers its settings (embed attributes, remote
//! flags) and resolves them into a single immutable [`EngineConfig`] before
//! the engine starts. The engine never re-reads configuration afterwards.
//!
//! [`EngineConfigBuilder`] validates the required identity and credential
//! fields up front: a misconfigured embed is a hard stop before any tracking
//! begins, not a degraded runtime state.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Default number of events that triggers an immediate flush.
pub const DEFAULT_BATCH_SIZE: usize = 10;
/// Default interval after which a partial batch is flushed anyway.
pub const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_secs(5);
/// Default connection timeout applied when establishing HTTP connections.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default per-request timeout applied to delivery attempts.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Placeholder substituted for secret credentials in any exposed view.
pub(crate) const REDACTED_PLACEHOLDER: &str = "[redacted]";

macro_rules! ensure_positive {
    ($value:expr, $field:expr) => {{
        if $value == 0 {
            Err(ConfigError::InvalidField(format!(
                "{} must be greater than zero",
                $field
            )))
        } else {
            Ok(())
        }
    }};
}

/// Errors that may occur while resolving an engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required identity or credential field is missing or blank.
    #[error("missing required configuration field: {0}")]
    MissingField(&'static str),
    /// A numeric field is outside its permitted range.
    #[error("invalid engine configuration: {0}")]
    InvalidField(String),
}

/// Feature toggles resolved at startup and frozen for the session.
///
/// The flags gate which collectors the embedder wires up; the engine itself
/// only carries them so introspection can report the resolved set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct FeatureFlags {
    flags: BTreeMap<String, bool>,
}

impl FeatureFlags {
    /// Record a resolved flag value.
    pub fn set(&mut self, name: impl Into<String>, enabled: bool) {
        self.flags.insert(name.into(), enabled);
    }

    /// Whether the named feature resolved to enabled. Unknown names are off.
    pub fn is_enabled(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }
}

/// Immutable configuration owned by a [`BatchingEngine`](crate::BatchingEngine).
#[derive(Clone)]
pub struct EngineConfig {
    /// Ingestion tenant identifier, embedded in delivery URLs.
    pub harbor_id: String,
    /// Credential sent with every delivery. Redacted from all exposed views.
    pub api_key: String,
    /// Base URL of the ingestion service, without a trailing slash.
    pub endpoint: String,
    /// Queue length that triggers an immediate flush.
    pub batch_size: usize,
    /// Maximum time a partial batch waits before a timer flush.
    pub batch_interval: Duration,
    /// Timeout for establishing HTTP connections.
    pub connect_timeout: Duration,
    /// Timeout for a single delivery attempt.
    pub request_timeout: Duration,
    /// Resolved feature toggles, frozen for the session.
    pub features: FeatureFlags,
}

impl EngineConfig {
    /// Start building a configuration from the three required fields.
    pub fn builder(
        harbor_id: impl Into<String>,
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> EngineConfigBuilder {
        EngineConfigBuilder::new(harbor_id, api_key, endpoint)
    }
}

// Manual impl so the credential cannot leak through debug logging.
impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("harbor_id", &self.harbor_id)
            .field("api_key", &REDACTED_PLACEHOLDER)
            .field("endpoint", &self.endpoint)
            .field("batch_size", &self.batch_size)
            .field("batch_interval", &self.batch_interval)
            .field("connect_timeout", &self.connect_timeout)
            .field("request_timeout", &self.request_timeout)
            .field("features", &self.features)
            .finish()
    }
}

/// Credential-free view of the configuration exposed by introspection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RedactedConfig {
    pub harbor_id: String,
    pub api_key: String,
    pub endpoint: String,
    pub batch_size: usize,
    pub batch_interval_ms: u64,
    pub features: FeatureFlags,
}

impl From<&EngineConfig> for RedactedConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            harbor_id: config.harbor_id.clone(),
            api_key: REDACTED_PLACEHOLDER.to_string(),
            endpoint: config.endpoint.clone(),
            batch_size: config.batch_size,
            batch_interval_ms: config.batch_interval.as_millis() as u64,
            features: config.features.clone(),
        }
    }
}

/// Builder for [`EngineConfig`] instances.
#[derive(Clone, Debug)]
pub struct EngineConfigBuilder {
    harbor_id: String,
    api_key: String,
    endpoint: String,
    batch_size: Option<usize>,
    batch_interval_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    features: FeatureFlags,
}

impl EngineConfigBuilder {
    /// Create a builder carrying the required identity and credential fields.
    pub fn new(
        harbor_id: impl Into<String>,
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            harbor_id: harbor_id.into(),
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            batch_size: None,
            batch_interval_ms: None,
            connect_timeout_ms: None,
            request_timeout_ms: None,
            features: FeatureFlags::default(),
        }
    }

    /// Set the queue length that triggers an immediate flush.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = Some(batch_size);
        self
    }

    /// Set the timer flush interval in milliseconds.
    pub fn with_batch_interval_ms(mut self, interval_ms: u64) -> Self {
        self.batch_interval_ms = Some(interval_ms);
        self
    }

    /// Set the connect timeout in milliseconds.
    pub fn with_connect_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = Some(timeout_ms);
        self
    }

    /// Set the per-request timeout in milliseconds.
    pub fn with_request_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = Some(timeout_ms);
        self
    }

    /// Record a resolved feature flag.
    pub fn with_feature(mut self, name: impl Into<String>, enabled: bool) -> Self {
        self.features.set(name, enabled);
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.harbor_id.trim().is_empty() {
            return Err(ConfigError::MissingField("harbor_id"));
        }
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingField("api_key"));
        }
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::MissingField("endpoint"));
        }
        if let Some(batch_size) = self.batch_size {
            ensure_positive!(batch_size, "batch_size")?;
        }
        if let Some(interval) = self.batch_interval_ms {
            ensure_positive!(interval, "batch_interval_ms")?;
        }
        if let Some(timeout) = self.connect_timeout_ms {
            ensure_positive!(timeout, "connect_timeout_ms")?;
        }
        if let Some(timeout) = self.request_timeout_ms {
            ensure_positive!(timeout, "request_timeout_ms")?;
        }
        Ok(())
    }

    /// Validate and freeze the configuration.
    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        self.validate()?;
        Ok(EngineConfig {
            harbor_id: self.harbor_id,
            api_key: self.api_key,
            endpoint: self.endpoint.trim_end_matches('/').to_string(),
            batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            batch_interval: self
                .batch_interval_ms
                .map_or(DEFAULT_BATCH_INTERVAL, Duration::from_millis),
            connect_timeout: self
                .connect_timeout_ms
                .map_or(DEFAULT_CONNECT_TIMEOUT, Duration::from_millis),
            request_timeout: self
                .request_timeout_ms
                .map_or(DEFAULT_REQUEST_TIMEOUT, Duration::from_millis),
            features: self.features,
        })
    }
}

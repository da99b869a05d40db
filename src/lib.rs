//! Embedded telemetry client with batched, best-effort event delivery.
//!
//! The crate centres on [`BatchingEngine`]: collectors call
//! [`track`](BatchingEngine::track), events are stamped with a per-session
//! visitor identity and buffered in an ordered queue, and a background worker
//! cuts batches off the queue whenever a size threshold, an interval timer,
//! or session teardown demands it. Failed batches are reinserted at the queue
//! head and retried on the next trigger; the teardown dispatch is a single
//! fire-and-forget attempt.
//!
//! No failure inside this crate propagates to the embedding host. Invalid
//! values are coerced, unavailable session storage degrades to a sentinel
//! identity, and transport failures surface only as `log` output.

mod config;
mod engine;
mod event;
mod identity;
mod rate_limited_warner;
mod transport;

pub use config::{ConfigError, EngineConfig, EngineConfigBuilder, FeatureFlags, RedactedConfig};
pub use engine::{BatchingEngine, EngineSnapshot};
pub use event::{Event, coerce_numeric};
pub use identity::{
    EnvironmentFingerprint, IdentityProvider, MemoryStore, SENTINEL_SESSION_ID, SessionStore,
    StoreError, VisitorIdentity, fnv1a_base36,
};
pub use rate_limited_warner::RateLimitedWarner;
pub use transport::{HttpTransport, Transport, TransportError};

//! The batching engine: public handle and background worker.
//!
//! [`BatchingEngine`] is the single entry point collectors see. It owns a
//! worker thread which in turn owns the event queue, the flush timer, and the
//! transport — no hidden globals, one engine value per session context. The
//! handle enqueues commands over an unbounded channel; the worker applies
//! each one as an uninterrupted synchronous step, so queue mutation (append,
//! batch cut, reinsert on failure) is race-free by construction.
//!
//! Flushes are serialized: the worker performs the delivery attempt itself,
//! so a second flush can never start while one is outstanding. Triggers that
//! fire mid-attempt buffer in the command channel and are applied as soon as
//! the attempt resolves; enqueues are never blocked by a stalled delivery.

mod worker;


use std::collections::BTreeMap;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Sender, bounded};
use log::warn;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;

use crate::config::{EngineConfig, RedactedConfig};
use crate::identity::{
    EnvironmentFingerprint, IdentityProvider, MemoryStore, SessionStore, VisitorIdentity,
};
use crate::rate_limited_warner::RateLimitedWarner;
use crate::transport::{HttpTransport, Transport};

use worker::{EngineCommand, TrackRequest, spawn_worker};

/// Debug view of the running engine.
#[derive(Clone, Debug, Serialize)]
pub struct EngineSnapshot {
    /// Events currently buffered and awaiting delivery.
    pub queue_size: usize,
    /// Seconds since the engine started.
    pub session_duration_seconds: u64,
    /// Resolved configuration with credentials redacted.
    pub config: RedactedConfig,
}

/// Client-embedded telemetry engine.
///
/// Accepts events via [`track`](Self::track), stamps them with the session's
/// visitor identity, and delivers them in batches: immediately once the queue
/// reaches `batch_size`, after `batch_interval` for a partial batch, and in
/// one final best-effort dispatch at teardown. Failed batches return to the
/// queue head and are retried on the next trigger.
///
/// No method panics or returns an error to the host; every failure mode
/// degrades locally with at most a `log` warning.
pub struct BatchingEngine {
    tx: Option<Sender<EngineCommand>>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    visitor_id: String,
    warner: RateLimitedWarner,
    /// Timeout for manual flush, snapshot, and teardown acknowledgements,
    /// derived from the per-request timeout: an engine round trip should
    /// complete within the same bounds as a single delivery attempt.
    control_timeout: Duration,
}

impl BatchingEngine {
    /// Start an engine with the default HTTP transport, an in-process
    /// session store, and an empty environment fingerprint.
    pub fn with_config(config: EngineConfig) -> Self {
        Self::for_environment(
            config,
            &EnvironmentFingerprint::default(),
            Box::new(MemoryStore::default()),
        )
    }

    /// Start an engine for a probed host environment.
    ///
    /// The embedder supplies the fingerprint it observed and the
    /// session-scoped store backing identity persistence.
    pub fn for_environment(
        config: EngineConfig,
        fingerprint: &EnvironmentFingerprint,
        store: Box<dyn SessionStore + Send>,
    ) -> Self {
        let transport = HttpTransport::new(&config);
        let identity = IdentityProvider::new(store, fingerprint).resolve();
        Self::with_parts(config, transport, identity)
    }

    /// Start an engine over an explicit transport and identity.
    pub fn with_parts<T: Transport + 'static>(
        config: EngineConfig,
        transport: T,
        identity: VisitorIdentity,
    ) -> Self {
        let control_timeout = config.request_timeout;
        let visitor_id = identity.visitor_id();
        let (tx, handle) = spawn_worker(config, transport, visitor_id.clone());
        Self {
            tx: Some(tx),
            handle: Mutex::new(Some(handle)),
            visitor_id,
            warner: RateLimitedWarner::default(),
            control_timeout,
        }
    }

    /// Queue an event with an implicit value of `1`.
    pub fn track(&self, cargo_id: &str) {
        self.track_full(cargo_id, 1.0, "", BTreeMap::new());
    }

    /// Queue an event carrying an explicit numeric value.
    pub fn track_value(&self, cargo_id: &str, value: f64) {
        self.track_full(cargo_id, value, "", BTreeMap::new());
    }

    /// Queue an event with a value, a `ship_id` suffix, and metadata.
    ///
    /// The only input that aborts tracking is an empty or blank `cargo_id`,
    /// dropped with a local warning. Non-finite values are coerced to `0`.
    pub fn track_full(
        &self,
        cargo_id: &str,
        value: f64,
        ship_suffix: &str,
        metadata: BTreeMap<String, Value>,
    ) {
        if cargo_id.trim().is_empty() {
            warn!("BatchingEngine: dropping event with empty cargo_id");
            return;
        }
        let Some(tx) = self.tx.as_ref() else {
            self.warn_dropped();
            return;
        };
        let request = TrackRequest {
            cargo_id: cargo_id.to_string(),
            value,
            ship_suffix: ship_suffix.to_string(),
            metadata,
        };
        if tx.send(EngineCommand::Track(request)).is_err() {
            self.warn_dropped();
        }
    }

    /// Cut and deliver one batch immediately, bypassing the timer.
    ///
    /// Returns `true` once the worker has resolved the delivery attempt
    /// (either outcome) within the control timeout. A no-op on an empty
    /// queue.
    pub fn flush(&self) -> bool {
        let Some(tx) = self.tx.as_ref() else {
            return false;
        };
        let deadline = Instant::now() + self.control_timeout;
        let (ack_tx, ack_rx) = bounded(1);
        if tx.send(EngineCommand::Flush(ack_tx)).is_err() {
            return false;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        ack_rx.recv_timeout(remaining).is_ok()
    }

    /// The `ship_id` stamp applied to every event from this engine.
    pub fn visitor_id(&self) -> &str {
        &self.visitor_id
    }

    /// Debug introspection: live queue size, session duration, and the
    /// redacted configuration. `None` once the engine has been torn down or
    /// when the worker does not answer within the control timeout.
    pub fn snapshot(&self) -> Option<EngineSnapshot> {
        let tx = self.tx.as_ref()?;
        let (reply_tx, reply_rx) = bounded(1);
        tx.send(EngineCommand::Snapshot(reply_tx)).ok()?;
        reply_rx.recv_timeout(self.control_timeout).ok()
    }

    /// Session teardown: dispatch the entire remaining queue in one
    /// best-effort attempt and stop the worker.
    ///
    /// The final dispatch is fire-and-forget — no retry, no observed
    /// outcome. Subsequent `track` calls drop their events with a
    /// rate-limited warning.
    pub fn teardown(&mut self) {
        self.request_teardown();
        self.join_worker();
    }

    fn request_teardown(&mut self) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        let (ack_tx, ack_rx) = bounded(1);
        if tx.send(EngineCommand::Teardown(ack_tx)).is_err() {
            return;
        }
        let _ = ack_rx.recv_timeout(self.control_timeout);
    }

    fn join_worker(&mut self) {
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        if handle.join().is_err() {
            warn!("BatchingEngine: worker thread panicked");
        }
    }

    fn warn_dropped(&self) {
        self.warner.record_drop();
        self.warner.warn_if_due(|count| {
            warn!("BatchingEngine: dropped {count} events after teardown");
        });
    }
}

impl Drop for BatchingEngine {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for BatchingEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchingEngine")
            .field("visitor_id", &self.visitor_id)
            .field("control_timeout", &self.control_timeout)
            .finish()
    }
}

//! Visitor identity derivation.
//!
//! Every event carries a `ship_id` derived here: a session-scoped random
//! identifier combined with an environment fingerprint hash. The session part
//! persists in a [`SessionStore`] so it survives reloads within one session;
//! the fingerprint raises uniqueness without retaining identifiable data.
//!
//! Storage failure never surfaces to the caller: the provider degrades to the
//! constant [`SENTINEL_SESSION_ID`], preferring telemetry continuity over
//! identity precision.

mod fingerprint;
mod hash;
mod store;


pub use fingerprint::EnvironmentFingerprint;
pub use hash::fnv1a_base36;
pub use store::{MemoryStore, SessionStore, StoreError};

use std::time::{SystemTime, UNIX_EPOCH};

use log::debug;
use rand::Rng;

/// Session id substituted when the session store is unavailable.
pub const SENTINEL_SESSION_ID: &str = "anonymous";

/// Store key under which the session id persists.
const SESSION_KEY: &str = "harbor_session_id";

/// Stable per-session identity stamped on every event.
///
/// Created once per browsing session and never mutated; regenerated only when
/// the persisted session id is absent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisitorIdentity {
    pub session_id: String,
    pub fingerprint_hash: String,
}

impl VisitorIdentity {
    /// Render the `ship_id` stamp: `"{session_id}.{fingerprint_hash}"`.
    pub fn visitor_id(&self) -> String {
        format!("{}.{}", self.session_id, self.fingerprint_hash)
    }
}

/// Derives and persists the visitor identity for one session.
pub struct IdentityProvider {
    store: Box<dyn SessionStore + Send>,
    fingerprint_hash: String,
}

impl IdentityProvider {
    /// Create a provider over the given store and environment fingerprint.
    pub fn new(store: Box<dyn SessionStore + Send>, fingerprint: &EnvironmentFingerprint) -> Self {
        Self {
            store,
            fingerprint_hash: fingerprint.hash(),
        }
    }

    /// Resolve the identity for this session.
    ///
    /// Loads the persisted session id, generating and saving a fresh one when
    /// absent. Repeated calls against the same store return the same
    /// identity. Any store failure degrades to the sentinel session id.
    pub fn resolve(&self) -> VisitorIdentity {
        let session_id = match self.load_or_create_session() {
            Ok(session_id) => session_id,
            Err(err) => {
                debug!("IdentityProvider: session store unavailable ({err}), using sentinel");
                SENTINEL_SESSION_ID.to_string()
            }
        };
        VisitorIdentity {
            session_id,
            fingerprint_hash: self.fingerprint_hash.clone(),
        }
    }

    fn load_or_create_session(&self) -> Result<String, StoreError> {
        if let Some(existing) = self.store.load(SESSION_KEY)? {
            return Ok(existing);
        }
        let session_id = generate_session_id();
        self.store.save(SESSION_KEY, &session_id)?;
        Ok(session_id)
    }
}

/// Seed a fresh session id from the clock plus a random draw, reduced through
/// the mixing hash so raw timestamps never appear in identifiers.
fn generate_session_id() -> String {
    let now_millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let draw: u64 = rand::thread_rng().r#gen();
    fnv1a_base36(&format!("{now_millis}:{draw}"))
}

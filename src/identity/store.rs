//! Session-scoped key-value storage abstraction.
//!
//! Models the host's session storage: values survive reloads within one
//! session (one store instance) but not across sessions. Hosts with real
//! storage implement [`SessionStore`]; the in-process [`MemoryStore`] is the
//! default and backs tests.

use std::collections::HashMap;

use parking_lot::Mutex;
use thiserror::Error;

/// Error raised when the underlying storage cannot be reached.
#[derive(Debug, Error)]
#[error("session store unavailable: {0}")]
pub struct StoreError(pub String);

/// Session-scoped string storage.
pub trait SessionStore {
    /// Read a previously saved value.
    fn load(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Persist a value for the remainder of the session.
    fn save(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// In-process store; the session lasts as long as the instance.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl SessionStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn round_trips_values() {
        let store = MemoryStore::default();
        assert!(store.load("k").expect("load").is_none());
        store.save("k", "v").expect("save");
        assert_eq!(store.load("k").expect("load").as_deref(), Some("v"));
    }
}

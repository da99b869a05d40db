//! Event records and the wire shape they serialize to.
//!
//! An [`Event`] is immutable once created. The wire body for a delivery is a
//! JSON array of events, each serialized as
//! `{"ship_id": ..., "cargo_id": ..., "value": ..., ...metadata}` with the
//! optional metadata mapping flattened into the object.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// A single telemetry record queued for delivery.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Event {
    /// Per-visitor identity stamp, optionally suffixed by the collector.
    pub ship_id: String,
    /// Event-type discriminator.
    pub cargo_id: String,
    /// Numeric payload; already passed through [`coerce_numeric`].
    pub value: f64,
    /// Collector-supplied context, flattened into the wire object.
    #[serde(flatten)]
    pub metadata: BTreeMap<String, Value>,
}

impl Event {
    /// Build an event stamped with the given visitor identity.
    ///
    /// A non-empty `ship_suffix` distinguishes sub-contexts (for example an
    /// embedded frame) within one visitor: `"{visitor}_{suffix}"`.
    pub fn stamped(
        visitor_id: &str,
        cargo_id: impl Into<String>,
        value: f64,
        ship_suffix: &str,
        metadata: BTreeMap<String, Value>,
    ) -> Self {
        let ship_id = if ship_suffix.is_empty() {
            visitor_id.to_string()
        } else {
            format!("{visitor_id}_{ship_suffix}")
        };
        Self {
            ship_id,
            cargo_id: cargo_id.into(),
            value: coerce_numeric(value),
            metadata,
        }
    }
}

/// Clamp a value to something the wire schema can carry.
///
/// NaN and infinities serialize as `null` in JSON, which the ingestion side
/// rejects, so they collapse to `0.0`. Finite values pass through unchanged.
pub fn coerce_numeric(value: f64) -> f64 {
    if value.is_finite() { value } else { 0.0 }
}

//! HTTP delivery over a pooled ureq agent.

use std::thread;

use log::debug;
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use ureq::{Agent, AgentBuilder};

use crate::config::EngineConfig;
use crate::event::Event;

use super::{Transport, TransportError};

/// Transport posting JSON batches to the harbor ingestion endpoint.
///
/// Regular batches go to `POST {endpoint}/ingest/{harbor_id}/batch` with the
/// credential in an `X-API-Key` header. The teardown dispatch goes to
/// `POST {endpoint}/ingest/{harbor_id}?k={api_key}` — credential in the query
/// because the one-shot path mirrors a beacon-style primitive that cannot
/// carry custom headers.
pub struct HttpTransport {
    agent: Agent,
    batch_url: String,
    teardown_url: String,
    api_key: String,
}

impl HttpTransport {
    /// Build a transport from the engine configuration.
    pub fn new(config: &EngineConfig) -> Self {
        let agent = AgentBuilder::new()
            .timeout_connect(config.connect_timeout)
            .timeout(config.request_timeout)
            .build();
        let ingest_url = format!("{}/ingest/{}", config.endpoint, config.harbor_id);
        let encoded_key = utf8_percent_encode(&config.api_key, NON_ALPHANUMERIC).to_string();
        Self {
            agent,
            batch_url: format!("{ingest_url}/batch"),
            teardown_url: format!("{ingest_url}?k={encoded_key}"),
            api_key: config.api_key.clone(),
        }
    }

    fn post_batch(&self, payload: &str) -> Result<(), TransportError> {
        let response = self
            .agent
            .post(&self.batch_url)
            .set("Content-Type", "application/json")
            .set("X-API-Key", &self.api_key)
            .send_string(payload);
        match response {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(code, _)) => Err(TransportError::Status(code)),
            Err(ureq::Error::Transport(err)) => Err(TransportError::Network(err.to_string())),
        }
    }
}

impl Transport for HttpTransport {
    fn send(&mut self, batch: &[Event]) -> Result<(), TransportError> {
        let payload = serde_json::to_string(batch)
            .map_err(|err| TransportError::Network(format!("serialization failed: {err}")))?;
        self.post_batch(&payload)
    }

    fn send_best_effort(&self, events: Vec<Event>) {
        let Ok(payload) = serde_json::to_string(&events) else {
            return;
        };
        let agent = self.agent.clone();
        let url = self.teardown_url.clone();
        // Detached on purpose: the attempt proceeds while the engine (and
        // possibly the whole host context) is tearing down. Nobody joins this
        // thread and nobody observes the result.
        thread::spawn(move || {
            let outcome = agent
                .post(&url)
                .set("Content-Type", "application/json")
                .send_string(&payload);
            if let Err(err) = outcome {
                debug!("HttpTransport: teardown dispatch did not complete: {err}");
            }
        });
    }
}

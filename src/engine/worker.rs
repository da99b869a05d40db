//! Worker thread owning the queue, the flush timer, and the transport.
//!
//! The scheduler is a three-state machine. Idle: queue empty, no timer.
//! Pending: queue non-empty below `batch_size`, timer armed. Flushing: a
//! delivery attempt outstanding. An enqueue that reaches `batch_size` cuts a
//! batch immediately, bypassing any armed timer; a sub-threshold enqueue into
//! Idle arms the timer; when the timer fires the partial batch is cut. After
//! every flush, either outcome, the timer is re-armed if events remain and
//! cleared otherwise.
//!
//! The timer is a single `Option<Receiver<Instant>>` from
//! `crossbeam_channel::after`; arming replaces any previous receiver, so at
//! most one pending timer exists at any instant.

use std::collections::{BTreeMap, VecDeque};
use std::thread;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, never, select, unbounded};
use log::{debug, warn};
use serde_json::Value;

use crate::config::{EngineConfig, RedactedConfig};
use crate::event::Event;
use crate::transport::Transport;

use super::EngineSnapshot;

/// Commands processed by the worker thread.
pub(super) enum EngineCommand {
    Track(TrackRequest),
    Flush(Sender<()>),
    Snapshot(Sender<EngineSnapshot>),
    Teardown(Sender<()>),
}

/// A raw track call, stamped into an [`Event`] by the worker.
pub(super) struct TrackRequest {
    pub cargo_id: String,
    pub value: f64,
    pub ship_suffix: String,
    pub metadata: BTreeMap<String, Value>,
}

/// Spawn the worker thread and return its command channel.
///
/// The channel is unbounded on purpose: the queue has no eviction policy, and
/// growth under persistent transport failure is an accepted property of the
/// design, not something to cap silently.
pub(super) fn spawn_worker<T: Transport + 'static>(
    config: EngineConfig,
    transport: T,
    visitor_id: String,
) -> (Sender<EngineCommand>, thread::JoinHandle<()>) {
    let (tx, rx) = unbounded();
    let handle = thread::spawn(move || Worker::new(config, transport, visitor_id).run(rx));
    (tx, handle)
}

struct Worker<T> {
    config: EngineConfig,
    transport: T,
    visitor_id: String,
    queue: VecDeque<Event>,
    timer: Option<Receiver<Instant>>,
    started: Instant,
}

impl<T: Transport> Worker<T> {
    fn new(config: EngineConfig, transport: T, visitor_id: String) -> Self {
        Self {
            config,
            transport,
            visitor_id,
            queue: VecDeque::new(),
            timer: None,
            started: Instant::now(),
        }
    }

    fn run(mut self, rx: Receiver<EngineCommand>) {
        let idle = never::<Instant>();
        loop {
            let timer = self.timer.clone().unwrap_or_else(|| idle.clone());
            select! {
                recv(rx) -> cmd => match cmd {
                    Ok(EngineCommand::Track(request)) => self.handle_track(request),
                    Ok(EngineCommand::Flush(ack)) => {
                        self.flush_batch();
                        let _ = ack.send(());
                    }
                    Ok(EngineCommand::Snapshot(reply)) => {
                        let _ = reply.send(self.snapshot());
                    }
                    Ok(EngineCommand::Teardown(ack)) => {
                        self.teardown_flush();
                        let _ = ack.send(());
                        break;
                    }
                    // Handle gone without a teardown command: behave as if
                    // the session ended.
                    Err(_) => {
                        self.teardown_flush();
                        break;
                    }
                },
                recv(timer) -> _ => {
                    self.timer = None;
                    self.flush_batch();
                }
            }
        }
    }

    /// Append an event and evaluate the flush triggers.
    fn handle_track(&mut self, request: TrackRequest) {
        let event = Event::stamped(
            &self.visitor_id,
            request.cargo_id,
            request.value,
            &request.ship_suffix,
            request.metadata,
        );
        self.queue.push_back(event);
        if self.queue.len() >= self.config.batch_size {
            self.flush_batch();
        } else if self.timer.is_none() {
            self.arm_timer();
        }
    }

    /// Cut a batch off the queue head and attempt delivery.
    ///
    /// The batch is removed before the attempt begins, never after. On
    /// failure the exact batch is reinserted at the head, ahead of anything
    /// enqueued during the attempt, preserving its internal order. A failed
    /// reinsertion does not itself re-check the size trigger; the next
    /// enqueue or timer expiry does.
    fn flush_batch(&mut self) {
        self.timer = None;
        let take = self.config.batch_size.min(self.queue.len());
        if take > 0 {
            let batch: Vec<Event> = self.queue.drain(..take).collect();
            match self.transport.send(&batch) {
                Ok(()) => {
                    debug!("BatchingEngine: delivered batch of {} events", batch.len());
                }
                Err(err) => {
                    warn!(
                        "BatchingEngine: delivery failed ({err}); restoring {} events to the queue head",
                        batch.len()
                    );
                    for event in batch.into_iter().rev() {
                        self.queue.push_front(event);
                    }
                }
            }
        }
        if !self.queue.is_empty() {
            self.arm_timer();
        }
    }

    /// Arm the interval timer, replacing any previously armed one.
    fn arm_timer(&mut self) {
        self.timer = Some(crossbeam_channel::after(self.config.batch_interval));
    }

    /// One-shot dispatch of everything still queued, with no observed result.
    fn teardown_flush(&mut self) {
        self.timer = None;
        if self.queue.is_empty() {
            return;
        }
        let remaining: Vec<Event> = self.queue.drain(..).collect();
        debug!(
            "BatchingEngine: teardown dispatch of {} remaining events",
            remaining.len()
        );
        self.transport.send_best_effort(remaining);
    }

    fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            queue_size: self.queue.len(),
            session_duration_seconds: self.started.elapsed().as_secs(),
            config: RedactedConfig::from(&self.config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use rstest::rstest;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct State {
        deliveries: Vec<Vec<Event>>,
        fail_next: usize,
        best_effort: Vec<Vec<Event>>,
    }

    #[derive(Clone, Default)]
    struct FakeTransport(Arc<Mutex<State>>);

    impl Transport for FakeTransport {
        fn send(&mut self, batch: &[Event]) -> Result<(), TransportError> {
            let mut state = self.0.lock().expect("lock");
            state.deliveries.push(batch.to_vec());
            if state.fail_next > 0 {
                state.fail_next -= 1;
                return Err(TransportError::Network("simulated".into()));
            }
            Ok(())
        }

        fn send_best_effort(&self, events: Vec<Event>) {
            self.0.lock().expect("lock").best_effort.push(events);
        }
    }

    fn worker(batch_size: usize) -> (Worker<FakeTransport>, Arc<Mutex<State>>) {
        let config = EngineConfig::builder("h", "k", "https://e")
            .with_batch_size(batch_size)
            .with_batch_interval_ms(60_000)
            .build()
            .expect("config");
        let transport = FakeTransport::default();
        let state = transport.0.clone();
        (Worker::new(config, transport, "v.fp".into()), state)
    }

    fn request(cargo_id: &str) -> TrackRequest {
        TrackRequest {
            cargo_id: cargo_id.to_string(),
            value: 1.0,
            ship_suffix: String::new(),
            metadata: BTreeMap::new(),
        }
    }

    fn cargo_ids(batch: &[Event]) -> Vec<&str> {
        batch.iter().map(|e| e.cargo_id.as_str()).collect()
    }

    #[rstest]
    fn sub_threshold_track_arms_timer_once() {
        let (mut worker, state) = worker(3);
        worker.handle_track(request("a"));
        assert!(worker.timer.is_some());
        worker.handle_track(request("b"));
        assert!(worker.timer.is_some());
        assert!(state.lock().expect("lock").deliveries.is_empty());
        assert_eq!(worker.queue.len(), 2);
    }

    #[rstest]
    fn reaching_batch_size_flushes_immediately() {
        let (mut worker, state) = worker(2);
        worker.handle_track(request("a"));
        worker.handle_track(request("b"));
        let state = state.lock().expect("lock");
        assert_eq!(state.deliveries.len(), 1);
        assert_eq!(cargo_ids(&state.deliveries[0]), ["a", "b"]);
        assert!(worker.queue.is_empty());
        assert!(worker.timer.is_none());
    }

    #[rstest]
    fn works_with_batch_size_one() {
        let (mut worker, state) = worker(1);
        worker.handle_track(request("a"));
        assert_eq!(state.lock().expect("lock").deliveries.len(), 1);
        assert!(worker.timer.is_none());
    }

    #[rstest]
    fn timer_flush_cuts_partial_batch_in_order() {
        let (mut worker, state) = worker(10);
        worker.handle_track(request("a"));
        worker.handle_track(request("b"));
        worker.flush_batch();
        let state = state.lock().expect("lock");
        assert_eq!(cargo_ids(&state.deliveries[0]), ["a", "b"]);
        assert!(worker.timer.is_none());
    }

    #[rstest]
    fn failed_batch_returns_to_queue_head_in_order() {
        let (mut worker, state) = worker(2);
        state.lock().expect("lock").fail_next = 1;
        worker.handle_track(request("a"));
        worker.handle_track(request("b"));

        // Attempt happened, batch restored ahead of later arrivals.
        assert_eq!(state.lock().expect("lock").deliveries.len(), 1);
        assert_eq!(
            worker.queue.iter().map(|e| e.cargo_id.as_str()).collect::<Vec<_>>(),
            ["a", "b"]
        );
        // Queue is non-empty after the failure, so the timer is armed for a
        // retry; the next enqueue re-checks the size trigger immediately.
        assert!(worker.timer.is_some());

        worker.handle_track(request("c"));
        let state = state.lock().expect("lock");
        assert_eq!(state.deliveries.len(), 2);
        assert_eq!(cargo_ids(&state.deliveries[1]), ["a", "b"]);
        assert_eq!(worker.queue.front().expect("c queued").cargo_id, "c");
    }

    #[rstest]
    fn flush_cuts_at_most_batch_size() {
        let (mut worker, state) = worker(2);
        state.lock().expect("lock").fail_next = 1;
        // First two fail and are restored, then one more arrives sub-threshold.
        worker.handle_track(request("a"));
        worker.handle_track(request("b"));
        worker.handle_track(request("c"));
        // The retriggered flush carried exactly [a, b]; c stays queued.
        let state = state.lock().expect("lock");
        assert_eq!(cargo_ids(&state.deliveries[1]), ["a", "b"]);
        assert_eq!(worker.queue.len(), 1);
        assert!(worker.timer.is_some());
    }

    #[rstest]
    fn flush_on_empty_queue_is_a_no_op() {
        let (mut worker, state) = worker(2);
        worker.flush_batch();
        assert!(state.lock().expect("lock").deliveries.is_empty());
        assert!(worker.timer.is_none());
    }

    #[rstest]
    fn teardown_dispatches_entire_queue_best_effort() {
        let (mut worker, state) = worker(2);
        state.lock().expect("lock").fail_next = 2;
        worker.handle_track(request("a"));
        worker.handle_track(request("b"));
        worker.handle_track(request("c"));
        worker.teardown_flush();

        let state = state.lock().expect("lock");
        // Entire queue in one dispatch, not batch-size-limited.
        assert_eq!(state.best_effort.len(), 1);
        assert_eq!(cargo_ids(&state.best_effort[0]), ["a", "b", "c"]);
        assert!(worker.queue.is_empty());
        assert!(worker.timer.is_none());
    }

    #[rstest]
    fn teardown_with_empty_queue_sends_nothing() {
        let (mut worker, state) = worker(2);
        worker.teardown_flush();
        assert!(state.lock().expect("lock").best_effort.is_empty());
    }

    #[rstest]
    fn queue_grows_unbounded_under_persistent_failure() {
        let (mut worker, state) = worker(2);
        state.lock().expect("lock").fail_next = usize::MAX;
        for i in 0..6 {
            worker.handle_track(request(&format!("e{i}")));
        }
        // Every failed batch was restored; nothing is evicted.
        assert_eq!(worker.queue.len(), 6);
        assert_eq!(worker.queue.front().expect("head").cargo_id, "e0");
        // Each attempt re-sent the same restored head batch.
        let state = state.lock().expect("lock");
        for delivery in &state.deliveries {
            assert_eq!(cargo_ids(delivery), ["e0", "e1"]);
        }
    }

    #[rstest]
    fn events_are_stamped_with_visitor_id() {
        let (mut worker, state) = worker(1);
        worker.handle_track(TrackRequest {
            ship_suffix: "frame2".into(),
            ..request("click")
        });
        let state = state.lock().expect("lock");
        assert_eq!(state.deliveries[0][0].ship_id, "v.fp_frame2");
    }

    #[rstest]
    fn snapshot_reports_queue_and_redacted_config() {
        let (mut worker, _state) = worker(10);
        worker.handle_track(request("a"));
        worker.handle_track(request("b"));
        let snapshot = worker.snapshot();
        assert_eq!(snapshot.queue_size, 2);
        assert_eq!(snapshot.config.api_key, "[redacted]");
        assert_eq!(snapshot.config.harbor_id, "h");
    }
}

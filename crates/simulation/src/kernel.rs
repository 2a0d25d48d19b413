//! The simulation kernel.

use qrep_core::{KernelPort, TimerHandle};
use qrep_messages::Message;
use qrep_types::SimTime;
use std::collections::{BTreeMap, HashMap};
use tracing::trace;

/// Key ordering scheduled self-messages: time first, then insertion
/// sequence as the deterministic tie-breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    time: SimTime,
    sequence: u64,
}

/// Counters collected while a kernel runs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SimStats {
    /// Self-messages delivered.
    pub events_delivered: u64,
    /// Messages emitted on output ports.
    pub messages_sent: u64,
    /// Timers scheduled.
    pub timers_set: u64,
    /// Timers cancelled.
    pub timers_cancelled: u64,
}

/// Deterministic single-node kernel.
///
/// The harness owning the node pops due self-messages with
/// [`pop_next`](Self::pop_next) and routes the outbox between nodes itself.
#[derive(Default)]
pub struct SimKernel {
    now: SimTime,
    queue: BTreeMap<QueueKey, (Message, TimerHandle)>,
    handle_index: HashMap<TimerHandle, QueueKey>,
    sequence: u64,
    next_handle: u64,
    event_counter: u64,
    outbox: Vec<(Message, String)>,
    stats: SimStats,
}

impl SimKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pop the earliest scheduled self-message, advancing the clock to its
    /// due time.
    pub fn pop_next(&mut self) -> Option<Message> {
        let (key, (message, handle)) = self.queue.pop_first()?;
        self.handle_index.remove(&handle);
        self.now = key.time;
        self.event_counter += 1;
        self.stats.events_delivered += 1;
        trace!(time = ?key.time, "delivering self-message");
        Some(message)
    }

    /// Next scheduled due time, if any.
    pub fn peek_next_time(&self) -> Option<SimTime> {
        self.queue.keys().next().map(|key| key.time)
    }

    pub fn pending_timers(&self) -> usize {
        self.queue.len()
    }

    /// Drain everything sent on output ports so far.
    pub fn take_outbox(&mut self) -> Vec<(Message, String)> {
        std::mem::take(&mut self.outbox)
    }

    pub fn outbox(&self) -> &[(Message, String)] {
        &self.outbox
    }

    pub fn stats(&self) -> &SimStats {
        &self.stats
    }

    /// Advance the clock directly (external deliveries between nodes).
    pub fn advance_to(&mut self, time: SimTime) {
        if time > self.now {
            self.now = time;
        }
    }

    /// Count an externally delivered message in the event numbering, so
    /// bus tie-breakers stay strictly monotonic across deliveries.
    pub fn note_external_delivery(&mut self) {
        self.event_counter += 1;
        self.stats.events_delivered += 1;
    }
}

impl KernelPort for SimKernel {
    fn now(&self) -> SimTime {
        self.now
    }

    fn schedule_at(&mut self, when: SimTime, message: Message) -> TimerHandle {
        self.sequence += 1;
        self.next_handle += 1;
        let handle = TimerHandle(self.next_handle);
        let key = QueueKey {
            time: when,
            sequence: self.sequence,
        };
        self.queue.insert(key, (message, handle));
        self.handle_index.insert(handle, key);
        self.stats.timers_set += 1;
        handle
    }

    fn cancel(&mut self, handle: TimerHandle) {
        if let Some(key) = self.handle_index.remove(&handle) {
            self.queue.remove(&key);
            self.stats.timers_cancelled += 1;
        }
    }

    fn send(&mut self, message: Message, port: &str) {
        self.stats.messages_sent += 1;
        self.outbox.push((message, port.to_string()));
    }

    fn event_number(&self) -> Option<u64> {
        Some(self.event_counter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qrep_messages::{OtherMessage, RequestRetryTimer};
    use qrep_types::QnicAddr;

    fn msg(name: &str) -> Message {
        Message::Other(OtherMessage {
            class_name: "TestMessage".into(),
            name: name.into(),
        })
    }

    #[test]
    fn pop_order_is_time_then_insertion_sequence() {
        let mut kernel = SimKernel::new();
        kernel.schedule_at(SimTime::from_secs(2), msg("late"));
        kernel.schedule_at(SimTime::from_secs(1), msg("early-a"));
        kernel.schedule_at(SimTime::from_secs(1), msg("early-b"));

        let order: Vec<String> = std::iter::from_fn(|| kernel.pop_next())
            .map(|m| m.display_name().to_string())
            .collect();
        assert_eq!(order, vec!["early-a", "early-b", "late"]);
        assert_eq!(kernel.now(), SimTime::from_secs(2));
    }

    #[test]
    fn cancel_is_idempotent_and_ignores_unknown_handles() {
        let mut kernel = SimKernel::new();
        let handle = kernel.schedule_at(SimTime::from_secs(1), msg("x"));
        kernel.cancel(handle);
        kernel.cancel(handle);
        kernel.cancel(TimerHandle(999));
        assert_eq!(kernel.pop_next(), None);
        assert_eq!(kernel.stats().timers_cancelled, 1);
    }

    #[test]
    fn cancelled_timer_does_not_fire() {
        let mut kernel = SimKernel::new();
        let first = kernel.schedule_at(SimTime::from_secs(1), msg("cancelled"));
        kernel.schedule_at(
            SimTime::from_secs(2),
            Message::RequestRetryTimer(RequestRetryTimer {
                qnic_address: QnicAddr(7),
            }),
        );
        kernel.cancel(first);
        let delivered = kernel.pop_next().unwrap();
        assert!(matches!(delivered, Message::RequestRetryTimer(_)));
        assert_eq!(kernel.pop_next(), None);
    }

    #[test]
    fn event_numbers_are_monotonic_across_deliveries() {
        let mut kernel = SimKernel::new();
        kernel.schedule_at(SimTime::from_secs(1), msg("a"));
        let before = kernel.event_number().unwrap();
        kernel.pop_next();
        let after_pop = kernel.event_number().unwrap();
        kernel.note_external_delivery();
        let after_external = kernel.event_number().unwrap();
        assert!(before < after_pop);
        assert!(after_pop < after_external);
    }
}

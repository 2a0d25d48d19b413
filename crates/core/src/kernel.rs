//! Consumed surface of the discrete-event simulation kernel.

use qrep_messages::Message;
use qrep_types::SimTime;

/// The single logical output port for inter-node protocol messages.
pub const ROUTER_PORT: &str = "RouterPort";

/// Identifies a scheduled self-message for cancellation.
///
/// Handles are kernel-scoped and never reused within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(pub u64);

/// Kernel services injected into every actor on a node.
///
/// The core never suspends inside a handler; waiting is expressed only by
/// scheduling a self-message for a future simulation time.
pub trait KernelPort {
    /// Current simulated time.
    fn now(&self) -> SimTime;

    /// Schedule `message` to be delivered back to this node at `when`.
    fn schedule_at(&mut self, when: SimTime, message: Message) -> TimerHandle;

    /// Unschedule a pending self-message. Idempotent; unknown handles are
    /// ignored.
    fn cancel(&mut self, handle: TimerHandle);

    /// Emit a classical-channel message on the named output port.
    fn send(&mut self, message: Message, port: &str);

    /// Kernel event counter, if the kernel exposes one. The event bus
    /// substitutes a process-local monotonic counter when this returns
    /// `None`.
    fn event_number(&self) -> Option<u64>;
}

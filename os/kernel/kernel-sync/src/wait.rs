use core::hint::spin_loop;
use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// A blocking wait was cut short by an external cancellation signal.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("wait interrupted")]
pub struct Interrupted;

/// The host's blocking-wait primitive.
///
/// Waiters block in process context until a condition stops holding.
/// Wakers (typically interrupt handlers) call [`WaitQueue::wake_all`] after
/// changing the state the condition observes. A wake never carries data; every
/// waiter re-evaluates its condition.
pub trait WaitQueue {
    /// Blocks while `still_waiting()` returns `true`.
    ///
    /// # Errors
    /// Returns [`Interrupted`] if the host signals cancellation before the
    /// condition clears. The observed state is then left untouched.
    fn wait_while(&self, still_waiting: impl FnMut() -> bool) -> Result<(), Interrupted>;

    /// Wakes every waiter so that it re-evaluates its condition. Never blocks.
    fn wake_all(&self);
}

/// Busy-waiting [`WaitQueue`] for early boot and hosted tests.
///
/// Waiters spin on a wake generation counter. [`SpinWaitQueue::interrupt`]
/// plays the role of a pending signal and releases exactly one wait.
#[derive(Debug, Default)]
pub struct SpinWaitQueue {
    generation: AtomicU64,
    interrupted: AtomicBool,
}

impl SpinWaitQueue {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
            interrupted: AtomicBool::new(false),
        }
    }

    /// Raises the cancellation signal for the next (or current) waiter.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
        self.generation.fetch_add(1, Ordering::Release);
    }

    /// Number of wakes issued so far.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl WaitQueue for SpinWaitQueue {
    fn wait_while(&self, mut still_waiting: impl FnMut() -> bool) -> Result<(), Interrupted> {
        loop {
            // Sample before checking so a wake between check and spin is not lost.
            let seen = self.generation.load(Ordering::Acquire);
            if !still_waiting() {
                return Ok(());
            }
            if self.interrupted.swap(false, Ordering::AcqRel) {
                return Err(Interrupted);
            }
            while self.generation.load(Ordering::Acquire) == seen {
                spin_loop();
            }
        }
    }

    fn wake_all(&self) {
        self.generation.fetch_add(1, Ordering::Release);
    }
}

use log::{error, warn};

/// What the interrupt handler does about a hardware fault.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FaultAction {
    /// Reload the trampoline and keep running.
    Recover { attempt: u32 },
    /// Stop the engine and fail everything in flight.
    Offline { faults: u32 },
}

/// Counts consecutive hardware faults; a completed frame resets the count.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FaultPolicy {
    threshold: u32,
    consecutive: u32,
    total: u64,
}

impl FaultPolicy {
    #[must_use]
    pub const fn new(threshold: u32) -> Self {
        Self {
            threshold,
            consecutive: 0,
            total: 0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn consecutive(&self) -> u32 {
        self.consecutive
    }

    #[inline]
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.total
    }

    pub fn record_fault(&mut self, status: u32) -> FaultAction {
        self.consecutive = self.consecutive.saturating_add(1);
        self.total = self.total.saturating_add(1);
        if self.consecutive >= self.threshold {
            error!(
                "capture fault {status:#010x}: {} in a row, going offline",
                self.consecutive
            );
            FaultAction::Offline {
                faults: self.consecutive,
            }
        } else {
            warn!(
                "capture fault {status:#010x}: recovering ({}/{})",
                self.consecutive, self.threshold
            );
            FaultAction::Recover {
                attempt: self.consecutive,
            }
        }
    }

    #[inline]
    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    /// Forgets consecutive faults after a restart.
    #[inline]
    pub fn reset(&mut self) {
        self.consecutive = 0;
    }
}

use bt848_risc::{AreaError, CompileError};
use kernel_sync::Interrupted;

/// Why a slot finished in [`SlotState::Error`](crate::SlotState::Error).
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum SlotFault {
    #[error("capture cancelled")]
    Cancelled,
    #[error("device offline after {faults} consecutive hardware faults (status {status:#010x})")]
    DeviceOffline { faults: u32, status: u32 },
    #[error("device went offline after an interrupt storm")]
    InterruptStorm,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum CaptureError {
    #[error("slot {0} does not exist")]
    InvalidSlot(usize),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("slot or device is busy")]
    Busy,
    #[error("slot has no capture in flight")]
    NotQueued,
    #[error("overlay scan-out owns the capture path")]
    OverlayActive,
    #[error("device is offline and needs an explicit restart")]
    NeedsRestart,
    #[error("capture failed: {0}")]
    Fault(SlotFault),
    #[error(transparent)]
    Interrupted(#[from] Interrupted),
    #[error("sampling PLL did not lock")]
    PllUnlocked,
    #[error(transparent)]
    Area(#[from] AreaError),
    #[error("invalid device configuration: {0}")]
    InvalidConfig(&'static str),
}

impl CaptureError {
    /// Bad request arguments; nothing was changed.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidSlot(_)
                | Self::InvalidConfig(_)
                | Self::Compile(
                    CompileError::InvalidGeometry { .. }
                        | CompileError::UnsupportedFormat(_)
                        | CompileError::BufferTooSmall { .. }
                        | CompileError::LengthOutOfRange(_)
                )
        )
    }

    #[must_use]
    pub const fn is_busy(&self) -> bool {
        matches!(self, Self::Busy | Self::OverlayActive)
    }

    #[must_use]
    pub const fn is_capacity(&self) -> bool {
        matches!(self, Self::Compile(CompileError::CapacityExceeded { .. }))
    }

    /// The device exhausted its fault budget.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NeedsRestart
                | Self::Fault(SlotFault::DeviceOffline { .. } | SlotFault::InterruptStorm)
        )
    }
}

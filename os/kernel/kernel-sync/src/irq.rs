//! Local interrupt masking.
//!
//! An [`IrqMask`] saves the current interrupt state, disables interrupts and
//! later restores exactly the saved state. Nesting is therefore safe: an
//! inner guard created with interrupts already disabled restores "disabled".

/// Saves and restores the local interrupt enable state.
pub trait IrqMask {
    /// Snapshot of the interrupt state taken by [`IrqMask::save_and_disable`].
    type State: Copy;

    /// Disables local interrupts and returns the previous state.
    fn save_and_disable() -> Self::State;

    /// Restores a state previously returned by [`IrqMask::save_and_disable`].
    fn restore(state: Self::State);
}

/// Interrupt mask that does nothing.
///
/// Used for locks that are never taken from interrupt context, for code that
/// already runs with interrupts disabled, and for hosted tests.
#[derive(Debug, Copy, Clone, Default)]
pub struct NoIrqMask;

impl IrqMask for NoIrqMask {
    type State = ();

    #[inline]
    fn save_and_disable() -> Self::State {}

    #[inline]
    fn restore((): Self::State) {}
}

/// Interrupt mask backed by `pushfq`/`cli`/`sti`.
///
/// # Platform / Privilege
///
/// Requires `x86_64` and a privileged execution context where `cli/sti` are
/// permitted. Executing it in user space raises `#GP`.
#[cfg(all(feature = "asm", target_arch = "x86_64"))]
#[derive(Debug, Copy, Clone, Default)]
pub struct CpuIrqMask;

#[cfg(all(feature = "asm", target_arch = "x86_64"))]
impl CpuIrqMask {
    /// `RFLAGS.IF`.
    const INTERRUPT_ENABLE: u64 = 1 << 9;

    #[inline]
    fn rflags() -> u64 {
        let r: u64;
        unsafe { core::arch::asm!("pushfq; pop {}", out(reg) r, options(preserves_flags)) }
        r
    }
}

#[cfg(all(feature = "asm", target_arch = "x86_64"))]
impl IrqMask for CpuIrqMask {
    /// Whether interrupts were enabled (IF=1) before masking.
    type State = bool;

    #[inline]
    fn save_and_disable() -> bool {
        let enabled = Self::rflags() & Self::INTERRUPT_ENABLE != 0;
        if enabled {
            unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
        }
        enabled
    }

    #[inline]
    fn restore(were_enabled: bool) {
        if were_enabled {
            unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
        }
    }
}

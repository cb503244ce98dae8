//! # Kernel synchronization primitives
//!
//! Two building blocks shared between interrupt handlers and process context:
//!
//! - [`IrqSpinLock`]: a spin lock that masks local interrupts for as long as
//!   the guard is alive. The mask is pluggable through [`IrqMask`] so the same
//!   code runs in the kernel ([`CpuIrqMask`], feature `asm`) and in hosted
//!   tests ([`NoIrqMask`]).
//! - [`WaitQueue`]: the host's blocking-wait primitive. Only process context
//!   may block on it; interrupt handlers only ever call [`WaitQueue::wake_all`].

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod critical;
pub mod irq;
mod wait;

pub use critical::{IrqSpinLock, IrqSpinLockGuard};
#[cfg(all(feature = "asm", target_arch = "x86_64"))]
pub use irq::CpuIrqMask;
pub use irq::{IrqMask, NoIrqMask};
pub use wait::{Interrupted, SpinWaitQueue, WaitQueue};

/// A plain spin lock that never touches the interrupt flag.
///
/// Suitable for state that is never accessed from interrupt context.
pub type SpinLock<T> = IrqSpinLock<T, NoIrqMask>;

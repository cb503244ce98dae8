//! # Bt848/878 capture engine
//!
//! Interrupt-driven frame capture on top of [`bt848_risc`] programs:
//!
//! - [`SlotPool`] and [`CaptureQueue`]: reusable capture slots and the
//!   order in which the hardware fills them.
//! - [`Trampoline`]: the always-valid outer program the chip runs every
//!   frame, rewritten in place to splice VBI, overlay and capture programs.
//! - [`CaptureDevice::handle_interrupt`] with [`FaultPolicy`]: completion
//!   handling, soft resets and the offline transition.
//! - [`pll`]: the sampling clock for each
//!   [`VideoStandard`](bt848_risc::VideoStandard).
//! - [`DmaEngine`]: the register seam, implemented by [`MmioEngine`].
//!
//! ## Example
//! ```rust,no_run
//! use bt848_capture::{CaptureDevice, DeviceConfig, MmioEngine};
//! use bt848_risc::{BufferLayout, BusAddress, CaptureRequest, HhdmBusMapper, PixelFormat};
//! use kernel_sync::{NoIrqMask, SpinWaitQueue};
//! use core::ptr::NonNull;
//!
//! # fn spin_ms(_ms: u32) {}
//! # let regs = NonNull::<u8>::dangling();
//! // SAFETY: `regs` is the card's mapped register window.
//! let engine = unsafe { MmioEngine::new(regs, spin_ms) };
//! let mapper = HhdmBusMapper::new(0xFFFF_8000_0000_0000);
//! let device: CaptureDevice<_, NoIrqMask, _> =
//!     CaptureDevice::new(engine, &mapper, DeviceConfig::new(), SpinWaitQueue::new())?;
//!
//! let request = CaptureRequest::new(PixelFormat::Rgb32, 640, 480);
//! let layout = BufferLayout::contiguous(BusAddress::new(0x0400_0000), request.frame_bytes())?;
//! device.request_capture(0, request, &layout)?;
//! let info = device.completion_wait(0)?;
//! # Ok::<(), Box<dyn core::error::Error>>(())
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod config;
mod device;
mod engine;
mod error;
mod fault;
mod irq;
mod mmio;
pub mod pll;
mod queue;
mod slot;
mod trampoline;

pub use config::{DeviceConfig, MAX_SLOTS};
pub use device::{CaptureDevice, CaptureStats};
pub use engine::{CaptureEnable, CaptureGeometry, DmaEngine, InterruptStatus};
pub use error::{CaptureError, SlotFault};
pub use fault::{FaultAction, FaultPolicy};
pub use irq::IrqOutcome;
pub use mmio::MmioEngine;
pub use queue::CaptureQueue;
pub use slot::{FrameInfo, Slot, SlotPool, SlotPrograms, SlotState};
pub use trampoline::{FieldPrograms, Splice, TRAMPOLINE_WORDS, Trampoline, TrampolineLinks};

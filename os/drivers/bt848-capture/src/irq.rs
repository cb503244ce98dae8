//! # Interrupt handling
//!
//! The handler drains `INT_STAT` until no unmasked event is left. The RISC
//! status nibble tells which jump raised `RISCI`. Its bits are sticky until
//! the trampoline clears them, so one interrupt is attributed to the most
//! recent source only:
//!
//! 1. [`START`](risc_status::START), from the trampoline tail while a start
//!    is pending,
//! 2. [`CAPTURE_DONE`](risc_status::CAPTURE_DONE), from the end of the bound
//!    slot's even program,
//! 3. [`VBI_DONE`](risc_status::VBI_DONE), from the end of the even VBI
//!    program.
//!
//! Bus and RISC faults are handled after the RISC event of the same round.

use crate::device::{CaptureDevice, Shared};
use crate::engine::{DmaEngine, InterruptStatus};
use crate::error::SlotFault;
use crate::fault::FaultAction;
use bt848_risc::risc_status;
use kernel_sync::{IrqMask, WaitQueue};
use log::{debug, error, trace};

/// What [`CaptureDevice::handle_interrupt`] found.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum IrqOutcome {
    /// No unmasked event was pending; the interrupt belongs to another
    /// device on the line.
    NotOurs,
    Handled,
    /// Events kept coming; the device masked everything and went offline.
    Storm,
}

impl<D: DmaEngine> Shared<D> {
    pub(crate) fn service(&mut self, loop_limit: u32) -> IrqOutcome {
        let mut outcome = IrqOutcome::NotOurs;
        let mut rounds = 0;
        loop {
            let status = self.engine.read_status();
            let events = status.intersect(self.irq_mask);
            if events.is_empty() {
                return outcome;
            }
            rounds += 1;
            if rounds > loop_limit {
                error!("interrupt storm: status {:#010x}", status.into_bits());
                self.stats.storms += 1;
                self.go_offline(SlotFault::InterruptStorm);
                return IrqOutcome::Storm;
            }

            self.engine.clear_status(events);
            self.stats.interrupts += 1;
            outcome = IrqOutcome::Handled;
            self.dispatch(status, events);
            if self.needs_restart {
                return outcome;
            }
        }
    }

    fn dispatch(&mut self, status: InterruptStatus, events: InterruptStatus) {
        if events.vsync() {
            self.stats.fields += 1;
        }
        if events.has_lock_event() {
            self.stats.lock_events += 1;
            debug!(
                "video lock event (hlock {}, fmtchg {})",
                events.hlock(),
                events.fmtchg()
            );
        }
        if events.risci() {
            let rs = status.risc_status();
            trace!("RISCI status {rs:#x}");
            if rs & risc_status::START != 0 {
                self.on_start();
            } else if rs & risc_status::CAPTURE_DONE != 0 {
                self.on_capture_done();
            } else if rs & risc_status::VBI_DONE != 0 {
                self.vbi.frames += 1;
                self.vbi.ring_offset = 0;
                self.stats.vbi_frames += 1;
            }
        }
        if events.has_fault() {
            self.on_fault(events);
        }
    }

    fn on_fault(&mut self, events: InterruptStatus) {
        let bits = events.intersect(InterruptStatus::FAULTS).into_bits();
        self.stats.faults += 1;
        match self.faults.record_fault(bits) {
            FaultAction::Recover { attempt } => {
                debug!("soft reset #{attempt}");
                self.stats.recoveries += 1;
                self.reload();
            }
            FaultAction::Offline { faults } => {
                self.go_offline(SlotFault::DeviceOffline {
                    faults,
                    status: bits,
                });
            }
        }
    }

    /// Stops all DMA, fails everything in flight and masks the chip until
    /// an explicit restart.
    pub(crate) fn go_offline(&mut self, fault: SlotFault) {
        self.engine.disarm_capture();
        self.take_offline();
        self.fail_in_flight(fault);
        self.splice();
        error!("capture engine offline: {fault}");
    }
}

impl<D: DmaEngine, M: IrqMask, W: WaitQueue> CaptureDevice<D, M, W> {
    /// Services the device's interrupt line.
    ///
    /// Safe to call from interrupt context: it never blocks and never
    /// allocates. Waiters are woken after the device lock is released.
    pub fn handle_interrupt(&self) -> IrqOutcome {
        let outcome = self.shared.lock().service(self.config.irq_loop_limit);
        if outcome != IrqOutcome::NotOurs {
            self.waiters.wake_all();
        }
        outcome
    }
}

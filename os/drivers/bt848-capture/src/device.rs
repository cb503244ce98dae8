//! # The capture device
//!
//! [`CaptureDevice`] ties the slot pool, the capture queue and the
//! trampoline to one chip. State shared with the interrupt handler lives
//! behind a single [`IrqSpinLock`]; the per-slot programs live outside of it
//! because only the request path that reserved a slot ever writes them.
//!
//! ```text
//!  request_capture ──reserve──► compile (unlocked) ──► start + queue ──┐
//!                                                                      ▼
//!  completion_wait ◄──wake── handle_interrupt ◄── RISCI / faults ── hardware
//! ```

use crate::config::DeviceConfig;
use crate::engine::{CaptureEnable, CaptureGeometry, DmaEngine, InterruptStatus};
use crate::error::{CaptureError, SlotFault};
use crate::fault::FaultPolicy;
use crate::pll::{self, PllState};
use crate::queue::CaptureQueue;
use crate::slot::{FrameInfo, Slot, SlotPool, SlotPrograms, SlotState};
use crate::trampoline::{FieldPrograms, Splice, TRAMPOLINE_WORDS, Trampoline, TrampolineLinks};
use alloc::vec::Vec;
use bt848_risc::{BufferLayout, BusMapper, CaptureRequest, CompiledFrame, Compiler, VideoStandard};
use kernel_sync::{IrqMask, IrqSpinLock, SpinLock, WaitQueue};
use log::{debug, info, trace};

/// Running counters, readable at any time through [`CaptureDevice::stats`].
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct CaptureStats {
    /// Vertical syncs seen.
    pub fields: u64,
    /// Frames completed into a slot.
    pub frames: u64,
    /// Hardware faults, recovered or not.
    pub faults: u64,
    /// Soft resets performed by the fault policy.
    pub recoveries: u64,
    pub vbi_frames: u64,
    /// Horizontal lock and format change events.
    pub lock_events: u64,
    /// Status drain rounds that found work.
    pub interrupts: u64,
    pub storms: u64,
}

/// VBI splice and reader position.
#[derive(Copy, Clone, Debug, Default)]
pub(crate) struct VbiState {
    pub programs: Option<FieldPrograms>,
    pub frames: u64,
    /// Bytes of the current VBI frame already consumed.
    pub ring_offset: u32,
}

/// Everything the interrupt handler touches.
#[derive(Debug)]
pub(crate) struct Shared<D> {
    pub engine: D,
    pub pool: SlotPool,
    pub queue: CaptureQueue,
    pub trampoline: Trampoline,
    pub faults: FaultPolicy,
    pub vbi: VbiState,
    pub overlay: Option<FieldPrograms>,
    pub standard: VideoStandard,
    pub needs_restart: bool,
    /// Events currently unmasked on the chip.
    pub irq_mask: InterruptStatus,
    pub stats: CaptureStats,
}

impl<D: DmaEngine> Shared<D> {
    /// The slot whose programs the trampoline currently jumps into.
    pub fn bound_slot(&self) -> Option<&Slot> {
        match (self.queue.active(), self.queue.start_pending()) {
            (Some(i), false) => self.pool.get(i).ok(),
            _ => None,
        }
    }

    fn desired_splice(&self) -> Splice {
        let capture = self
            .bound_slot()
            .and_then(|s| s.frame)
            .map(|f: CompiledFrame| FieldPrograms {
                odd: f.odd,
                even: f.even,
            });
        Splice {
            vbi: self.vbi.programs,
            capture,
            overlay: self.overlay,
            start_pending: self.queue.start_pending(),
        }
    }

    /// Brings the trampoline in line with queue, VBI and overlay state.
    pub fn splice(&mut self) {
        let next = self.desired_splice();
        self.trampoline.splice(&next);
    }

    /// Loads the bound slot's geometry, or the idle one.
    pub fn apply_geometry(&mut self) {
        let geometry = self
            .bound_slot()
            .and_then(|s| s.geometry)
            .unwrap_or_else(|| CaptureGeometry::idle(self.standard.timing()));
        self.engine.set_geometry(&geometry);
    }

    /// Enables exactly the captures something is spliced in for.
    pub fn rearm(&mut self) {
        let frames = self.queue.active().is_some() || self.overlay.is_some();
        let enable = CaptureEnable::fields(frames, self.vbi.programs.is_some());
        if self.needs_restart || enable.is_empty() {
            self.engine.disarm_capture();
        } else {
            self.engine.arm_capture(enable);
        }
    }

    /// Stops DMA and restarts it from the top of a fully rewritten
    /// trampoline.
    pub fn reload(&mut self) {
        self.engine.disarm_capture();
        self.engine.write_program_base(self.trampoline.base());
        self.apply_geometry();
        let next = self.desired_splice();
        self.trampoline.rewrite(&next);
        self.rearm();
    }

    /// Masks every interrupt and refuses new work until the next restart.
    pub fn take_offline(&mut self) {
        self.needs_restart = true;
        self.irq_mask = InterruptStatus::new();
        self.engine.set_interrupt_mask(InterruptStatus::new());
    }

    /// Drops stale events, unmasks interrupts and restarts DMA.
    fn bring_online(&mut self) {
        self.needs_restart = false;
        self.irq_mask = InterruptStatus::ENABLED;
        self.engine.clear_status(InterruptStatus::from_bits(u32::MAX));
        self.engine.set_interrupt_mask(InterruptStatus::ENABLED);
        self.reload();
    }

    /// Fails the active and every queued slot.
    pub fn fail_in_flight(&mut self, fault: SlotFault) {
        if let Some(active) = self.queue.active() {
            self.pool.fail(active, fault);
        }
        while let Some(slot) = self.queue.pop() {
            self.pool.fail(slot, fault);
        }
        self.queue.clear();
    }

    fn complete_active(&mut self, slot: usize) {
        let info = FrameInfo {
            field: self.stats.fields,
            sequence: self.stats.frames,
        };
        self.pool.complete(slot, info);
        self.stats.frames += 1;
        self.faults.record_success();
        trace!("slot {slot} done at field {}", info.field);

        if let Some(next) = self.queue.advance() {
            trace!("binding slot {next}");
        }
        self.apply_geometry();
        self.splice();
        self.rearm();
    }

    /// The start interrupt arrived: the active slot goes live.
    pub fn on_start(&mut self) {
        if !self.queue.start_pending() {
            return;
        }
        self.queue.started();
        self.apply_geometry();
        self.splice();
    }

    /// The bound slot's even program raised its completion interrupt.
    pub fn on_capture_done(&mut self) {
        if let Some(slot) = self.bound_slot().and(self.queue.active()) {
            self.complete_active(slot);
        }
    }
}

/// A Bt848/878 capture engine and its slot pool.
///
/// `D` drives the chip, `M` masks local interrupts while the shared state is
/// locked and `W` is the host's blocking-wait primitive.
pub struct CaptureDevice<D, M: IrqMask, W> {
    pub(crate) shared: IrqSpinLock<Shared<D>, M>,
    programs: Vec<SpinLock<SlotPrograms>>,
    pub(crate) waiters: W,
    pub(crate) config: DeviceConfig,
    links: TrampolineLinks,
    /// Serializes restarts and standard changes.
    reconfigure: SpinLock<()>,
    delay_ms: fn(u32),
}

impl<D: DmaEngine, M: IrqMask, W: WaitQueue> CaptureDevice<D, M, W> {
    /// Allocates all program memory and brings the chip up.
    ///
    /// # Errors
    /// [`CaptureError::InvalidConfig`] for a bad `config`,
    /// [`CaptureError::Area`] if program memory is not bus addressable and
    /// [`CaptureError::PllUnlocked`] if the sampling clock does not lock.
    pub fn new(
        engine: D,
        mapper: &impl BusMapper,
        config: DeviceConfig,
        waiters: W,
    ) -> Result<Self, CaptureError> {
        config.validate()?;
        let trampoline = Trampoline::new(mapper)?;
        let links = trampoline.links();
        let programs = (0..config.slots)
            .map(|_| SlotPrograms::new(config.program_words, mapper).map(SpinLock::new))
            .collect::<Result<Vec<_>, _>>()?;

        let delay_ms = engine.delay();
        let shared = Shared {
            engine,
            pool: SlotPool::new(config.slots),
            queue: CaptureQueue::new(),
            trampoline,
            faults: FaultPolicy::new(config.fault_threshold),
            vbi: VbiState::default(),
            overlay: None,
            standard: config.standard,
            needs_restart: true,
            irq_mask: InterruptStatus::new(),
            stats: CaptureStats::default(),
        };
        let device = Self {
            shared: IrqSpinLock::new(shared),
            programs,
            waiters,
            config,
            links,
            reconfigure: SpinLock::new(()),
            delay_ms,
        };
        device.restart()?;
        info!(
            "capture device up: {} slots, {} words per field program",
            config.slots, config.program_words
        );
        Ok(device)
    }

    #[inline]
    #[must_use]
    pub const fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// The queue blocked waiters sleep on.
    #[inline]
    #[must_use]
    pub const fn wait_queue(&self) -> &W {
        &self.waiters
    }

    /// Where VBI and overlay programs must jump back to.
    #[inline]
    #[must_use]
    pub const fn trampoline_links(&self) -> TrampolineLinks {
        self.links
    }

    /// Compiles `request` for `layout` into `slot` and queues it.
    ///
    /// Compilation runs without the device lock; only the final hand-over
    /// to the queue is serialized with the interrupt handler. If nothing is
    /// bound, the slot becomes active and goes live at the next start
    /// interrupt.
    ///
    /// # Errors
    /// Validation and capacity failures leave all state untouched.
    /// [`CaptureError::Busy`] if the slot is not unused,
    /// [`CaptureError::OverlayActive`] while overlay owns the capture path and
    /// [`CaptureError::NeedsRestart`] after the device went offline.
    pub fn request_capture(
        &self,
        slot: usize,
        request: CaptureRequest,
        layout: &BufferLayout,
    ) -> Result<(), CaptureError> {
        let standard = {
            let mut s = self.shared.lock();
            if s.needs_restart {
                return Err(CaptureError::NeedsRestart);
            }
            s.pool.get(slot)?;
            request.validate(s.standard.timing())?;
            if s.overlay.is_some() {
                return Err(CaptureError::OverlayActive);
            }
            s.pool.reserve(slot)?;
            s.standard
        };

        let compiled = self.compile(slot, standard, &request, layout);

        let mut s = self.shared.lock();
        let frame = match compiled {
            Ok(frame) if !s.needs_restart => frame,
            Ok(_) => {
                s.pool.unreserve(slot);
                return Err(CaptureError::NeedsRestart);
            }
            Err(e) => {
                s.pool.unreserve(slot);
                return Err(e);
            }
        };
        let geometry = CaptureGeometry::new(standard.timing(), &request);
        s.pool.start(slot, request, frame, geometry);
        if s.queue.is_idle() {
            debug!("slot {slot} waits for the start interrupt");
            s.queue.begin(slot);
            s.splice();
            s.rearm();
        } else if !s.queue.push(slot) {
            // Every slot is queued at most once, so the ring never fills.
            s.pool.fail(slot, SlotFault::Cancelled);
        }
        Ok(())
    }

    fn compile(
        &self,
        slot: usize,
        standard: VideoStandard,
        request: &CaptureRequest,
        layout: &BufferLayout,
    ) -> Result<CompiledFrame, CaptureError> {
        let programs = self
            .programs
            .get(slot)
            .ok_or(CaptureError::InvalidSlot(slot))?;
        let mut guard = programs.lock();
        let SlotPrograms { odd, even } = &mut *guard;
        let frame = Compiler::new(standard.timing(), self.links.frame_links())
            .compile(request, layout, odd, even)?;
        trace!(
            "slot {slot}: {} + {} words for {} bytes",
            frame.odd_words, frame.even_words, frame.bytes
        );
        Ok(frame)
    }

    /// Blocks until `slot` finished, then hands it back as unused.
    ///
    /// # Errors
    /// [`CaptureError::NotQueued`] if nothing was requested into the slot,
    /// [`CaptureError::Fault`] if it finished in error and
    /// [`CaptureError::Interrupted`] if the wait was cancelled; the slot then
    /// keeps its state.
    pub fn completion_wait(&self, slot: usize) -> Result<FrameInfo, CaptureError> {
        if self.slot_state(slot)? == SlotState::Unused {
            return Err(CaptureError::NotQueued);
        }
        self.waiters.wait_while(|| {
            self.shared
                .lock()
                .pool
                .get(slot)
                .is_ok_and(|s| s.state() == SlotState::Grabbing)
        })?;
        match self.shared.lock().pool.release(slot) {
            Some(Ok(info)) => Ok(info),
            Some(Err(fault)) => Err(CaptureError::Fault(fault)),
            None => Err(CaptureError::NotQueued),
        }
    }

    /// Cancels one in-flight capture.
    ///
    /// A queued slot is simply dropped from the queue. The active slot is
    /// unbound with DMA stopped, and the next queued slot takes its place.
    ///
    /// # Errors
    /// [`CaptureError::NotQueued`] unless the slot is grabbing.
    pub fn cancel(&self, slot: usize) -> Result<(), CaptureError> {
        {
            let mut s = self.shared.lock();
            if s.pool.get(slot)?.state() != SlotState::Grabbing {
                return Err(CaptureError::NotQueued);
            }
            if s.queue.remove(slot) {
                s.pool.fail(slot, SlotFault::Cancelled);
            } else if s.queue.active() == Some(slot) {
                s.engine.disarm_capture();
                s.pool.fail(slot, SlotFault::Cancelled);
                s.queue.advance();
                s.reload();
            }
            debug!("slot {slot} cancelled");
        }
        self.waiters.wake_all();
        Ok(())
    }

    /// Cancels every in-flight capture.
    pub fn cancel_all(&self) {
        {
            let mut s = self.shared.lock();
            if !s.queue.is_idle() {
                s.engine.disarm_capture();
                s.fail_in_flight(SlotFault::Cancelled);
                s.reload();
                debug!("all captures cancelled");
            }
        }
        self.waiters.wake_all();
    }

    /// Resets the chip and brings it back online.
    ///
    /// Cancels whatever is still in flight, reprograms the PLL, geometry and
    /// trampoline, unmasks interrupts and clears the fault streak. The device
    /// stays offline until the PLL reports lock.
    ///
    /// # Errors
    /// [`CaptureError::PllUnlocked`]; the device then stays offline.
    pub fn restart(&self) -> Result<(), CaptureError> {
        let _reconfiguring = self.reconfigure.lock();
        let standard = {
            let mut s = self.shared.lock();
            s.engine.disarm_capture();
            s.fail_in_flight(SlotFault::Cancelled);
            s.take_offline();
            s.engine.reset();
            s.standard
        };
        self.waiters.wake_all();

        let result = self.lock_pll(standard);
        if result.is_ok() {
            let mut s = self.shared.lock();
            s.faults.reset();
            s.bring_online();
            info!("capture engine online ({standard})");
        }
        result
    }

    /// Switches to another video standard.
    ///
    /// The device is held offline while the new clock settles. The old
    /// standard stays in effect unless the PLL locks.
    ///
    /// # Errors
    /// [`CaptureError::Busy`] while captures are in flight,
    /// [`CaptureError::PllUnlocked`] if the new clock does not lock; the
    /// device then needs a [`restart`](Self::restart).
    pub fn set_standard(&self, standard: VideoStandard) -> Result<(), CaptureError> {
        let _reconfiguring = self.reconfigure.lock();
        let was_offline = {
            let mut s = self.shared.lock();
            if s.pool.any_in_flight() {
                return Err(CaptureError::Busy);
            }
            let was_offline = s.needs_restart;
            s.take_offline();
            s.rearm();
            was_offline
        };

        self.lock_pll(standard)?;

        let mut s = self.shared.lock();
        s.standard = standard;
        if was_offline {
            s.apply_geometry();
        } else {
            s.bring_online();
        }
        info!("video standard set to {standard}");
        Ok(())
    }

    /// Programs the PLL for `standard` and waits for lock, taking the device
    /// lock only around register accesses.
    fn lock_pll(&self, standard: VideoStandard) -> Result<(), CaptureError> {
        let state = pll::program(&mut self.shared.lock().engine, self.config.crystal_hz, standard);
        if state == PllState::Bypassed {
            return Ok(());
        }
        for attempt in 1..=self.config.pll_lock_polls {
            (self.delay_ms)(pll::SETTLE_MS);
            if pll::poll(&mut self.shared.lock().engine, standard, attempt) {
                return Ok(());
            }
        }
        Err(pll::unlocked(standard))
    }

    #[must_use]
    pub fn standard(&self) -> VideoStandard {
        self.shared.lock().standard
    }

    /// Splices VBI programs into both fields.
    ///
    /// The programs must return to [`TrampolineLinks::vbi_odd_return`] and
    /// [`TrampolineLinks::vbi_even_return`]. Only the even program may raise
    /// an interrupt, with [`risc_status::VBI_DONE`](bt848_risc::risc_status::VBI_DONE)
    /// set.
    ///
    /// # Errors
    /// [`CaptureError::NeedsRestart`] while offline.
    pub fn enable_vbi(&self, programs: FieldPrograms) -> Result<(), CaptureError> {
        let mut s = self.shared.lock();
        if s.needs_restart {
            return Err(CaptureError::NeedsRestart);
        }
        s.vbi.programs = Some(programs);
        s.vbi.ring_offset = 0;
        s.splice();
        s.rearm();
        Ok(())
    }

    pub fn disable_vbi(&self) {
        let mut s = self.shared.lock();
        s.vbi.programs = None;
        s.splice();
        s.rearm();
    }

    /// Splices overlay scan-out programs in, or removes them with `None`.
    ///
    /// # Errors
    /// [`CaptureError::Busy`] while captures are in flight,
    /// [`CaptureError::NeedsRestart`] while offline.
    pub fn set_overlay(&self, programs: Option<FieldPrograms>) -> Result<(), CaptureError> {
        let mut s = self.shared.lock();
        if s.needs_restart {
            return Err(CaptureError::NeedsRestart);
        }
        if s.pool.any_in_flight() {
            return Err(CaptureError::Busy);
        }
        s.overlay = programs;
        s.splice();
        s.rearm();
        Ok(())
    }

    /// Blocks until a VBI frame other than `seen` completed and returns the
    /// new VBI frame count.
    ///
    /// # Errors
    /// [`CaptureError::Interrupted`] if the wait was cancelled.
    pub fn vbi_wait(&self, seen: u64) -> Result<u64, CaptureError> {
        self.waiters
            .wait_while(|| self.shared.lock().vbi.frames == seen)?;
        Ok(self.shared.lock().vbi.frames)
    }

    /// Marks `bytes` of the current VBI frame as read and returns the new
    /// read offset. The offset returns to zero with every VBI frame.
    pub fn consume_vbi(&self, bytes: u32) -> u32 {
        let mut s = self.shared.lock();
        s.vbi.ring_offset = s.vbi.ring_offset.saturating_add(bytes);
        s.vbi.ring_offset
    }

    /// # Errors
    /// [`CaptureError::InvalidSlot`] for out-of-range indices.
    pub fn slot_state(&self, slot: usize) -> Result<SlotState, CaptureError> {
        Ok(self.shared.lock().pool.get(slot)?.state())
    }

    /// Slots queued behind the active one.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.shared.lock().queue.len()
    }

    #[must_use]
    pub fn active_slot(&self) -> Option<usize> {
        self.shared.lock().queue.active()
    }

    #[must_use]
    pub fn start_pending(&self) -> bool {
        self.shared.lock().queue.start_pending()
    }

    #[must_use]
    pub fn needs_restart(&self) -> bool {
        self.shared.lock().needs_restart
    }

    #[must_use]
    pub fn stats(&self) -> CaptureStats {
        self.shared.lock().stats
    }

    /// Current trampoline words, for diagnostics.
    #[must_use]
    pub fn trampoline_words(&self) -> [u32; TRAMPOLINE_WORDS] {
        let s = self.shared.lock();
        core::array::from_fn(|i| s.trampoline.area().word(i))
    }
}

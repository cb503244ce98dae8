#![allow(dead_code)]

use bt848_capture::{
    CaptureDevice, CaptureEnable, CaptureGeometry, DeviceConfig, DmaEngine, InterruptStatus,
};
use bt848_risc::{
    BufferLayout, BusAddress, BusMapper, CaptureRequest, PixelFormat, PllCoefficients, risc_status,
};
use kernel_sync::{NoIrqMask, SpinWaitQueue};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

/// Register-level calls, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Arm(CaptureEnable),
    Disarm,
    Geometry(CaptureGeometry),
    ProgramBase(BusAddress),
    Mask(InterruptStatus),
    Pll(Option<PllCoefficients>),
    SelectPll,
    Reset,
}

#[derive(Debug, Default)]
pub struct FakeState {
    /// Latched events, cleared by `clear_status`.
    pub pending: u32,
    /// Events that survive clearing.
    pub sticky: u32,
    pub risc_status: u8,
    pub mask: u32,
    pub pll_unlocked: bool,
    /// Host delay handed to the device; none by default.
    pub delay: Option<fn(u32)>,
    pub calls: Vec<Call>,
}

/// Recording [`DmaEngine`] whose status register the test drives.
#[derive(Debug, Clone, Default)]
pub struct FakeEngine(pub Arc<Mutex<FakeState>>);

impl FakeEngine {
    pub fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.0.lock().unwrap()
    }

    pub fn raise(&self, status: InterruptStatus) {
        self.state().pending |= status.into_bits();
    }

    /// Raises `RISCI` as if a jump set `nibble`.
    pub fn raise_risc(&self, nibble: u8) {
        let mut s = self.state();
        s.pending |= InterruptStatus::new().with_risci(true).into_bits();
        s.risc_status = nibble;
    }

    pub fn take_calls(&self) -> Vec<Call> {
        std::mem::take(&mut self.state().calls)
    }

    pub fn last_arm(&self) -> Option<Call> {
        self.state()
            .calls
            .iter()
            .rev()
            .find(|c| matches!(c, Call::Arm(_) | Call::Disarm))
            .cloned()
    }
}

impl DmaEngine for FakeEngine {
    fn arm_capture(&mut self, enable: CaptureEnable) {
        self.state().calls.push(Call::Arm(enable));
    }

    fn disarm_capture(&mut self) {
        self.state().calls.push(Call::Disarm);
    }

    fn set_geometry(&mut self, geometry: &CaptureGeometry) {
        self.state().calls.push(Call::Geometry(*geometry));
    }

    fn write_program_base(&mut self, addr: BusAddress) {
        self.state().calls.push(Call::ProgramBase(addr));
    }

    fn read_status(&mut self) -> InterruptStatus {
        let s = self.state();
        InterruptStatus::from_bits(s.pending | s.sticky).with_risc_status(s.risc_status)
    }

    fn clear_status(&mut self, status: InterruptStatus) {
        self.state().pending &= !status.into_bits();
    }

    fn set_interrupt_mask(&mut self, mask: InterruptStatus) {
        let mut s = self.state();
        s.mask = mask.into_bits();
        s.calls.push(Call::Mask(mask));
    }

    fn write_pll(&mut self, coefficients: Option<PllCoefficients>) {
        self.state().calls.push(Call::Pll(coefficients));
    }

    fn pll_locked(&mut self) -> bool {
        !self.state().pll_unlocked
    }

    fn select_pll_clock(&mut self) {
        self.state().calls.push(Call::SelectPll);
    }

    fn delay(&self) -> fn(u32) {
        self.state().delay.unwrap_or(|_| {})
    }

    fn reset(&mut self) {
        self.state().calls.push(Call::Reset);
    }
}

/// Hands out distinct, page-aligned bus addresses.
#[derive(Debug)]
pub struct FakeBus(AtomicU32);

impl FakeBus {
    pub const fn new() -> Self {
        Self(AtomicU32::new(0x0100_0000))
    }
}

impl BusMapper for FakeBus {
    fn map_contiguous(&self, _ptr: *const u8, bytes: usize) -> Option<BusAddress> {
        let pages = u32::try_from(bytes.div_ceil(4096)).ok()?;
        Some(BusAddress::new(self.0.fetch_add(pages * 4096, Ordering::Relaxed)))
    }
}

pub type Device = CaptureDevice<FakeEngine, NoIrqMask, SpinWaitQueue>;

pub fn device(config: DeviceConfig) -> (Device, FakeEngine) {
    let engine = FakeEngine::default();
    let device = CaptureDevice::new(engine.clone(), &FakeBus::new(), config, SpinWaitQueue::new())
        .expect("device comes up");
    engine.take_calls();
    (device, engine)
}

pub fn request() -> CaptureRequest {
    CaptureRequest::new(PixelFormat::Yuyv, 320, 240)
}

/// A contiguous buffer for `request()`, placed by slot index.
pub fn layout(slot: usize) -> BufferLayout {
    let base = 0x1000_0000 + u32::try_from(slot).unwrap() * 0x0010_0000;
    BufferLayout::contiguous(BusAddress::new(base), request().frame_bytes()).unwrap()
}

/// One full frame with the bound slot completing.
pub fn complete_frame(device: &Device, engine: &FakeEngine) {
    engine.raise(InterruptStatus::new().with_vsync(true));
    engine.raise_risc(risc_status::CAPTURE_DONE);
    device.handle_interrupt();
}

pub fn start(device: &Device, engine: &FakeEngine) {
    engine.raise_risc(risc_status::START);
    device.handle_interrupt();
}

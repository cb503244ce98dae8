//! # Register and DMA engine seam
//!
//! Everything the capture core needs from the chip goes through
//! [`DmaEngine`]. [`MmioEngine`](crate::MmioEngine) implements it against the
//! memory-mapped registers; tests implement it with a recording fake.

use bitfield_struct::bitfield;
use bt848_risc::{
    BusAddress, CaptureRequest, PixelFormat, PllCoefficients, ScalerGeometry, VideoStandardTiming,
};

/// `INT_STAT` / `INT_MASK` layout.
///
/// Bits 0–19 are latched events (write 1 to clear); bits 24–31 reflect
/// current state, with the top nibble carrying the RISC status set by the
/// last jump that raised `RISCI`.
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct InterruptStatus {
    /// Video format change detected.
    pub fmtchg: bool,
    /// Vertical sync.
    pub vsync: bool,
    pub hsync: bool,
    /// Luma or chroma ADC overflow.
    pub oflow: bool,
    /// Horizontal lock changed.
    pub hlock: bool,
    /// Video presence changed.
    pub vpres: bool,
    #[bits(2, default = 0)]
    _reserved_6_7: u8,
    pub i2cdone: bool,
    pub gpint: bool,
    #[bits(default = false)]
    _reserved_10: bool,
    /// A RISC instruction with the IRQ bit executed.
    pub risci: bool,
    /// FIFO overrun on the bus.
    pub fbus: bool,
    /// Driver FIFO target abort.
    pub ftrgt: bool,
    /// FIFO data stream resync.
    pub fdsr: bool,
    /// Parity error on data transfer.
    pub pperr: bool,
    /// Parity error on RISC instruction fetch.
    pub riperr: bool,
    /// PCI abort.
    pub pabort: bool,
    /// Invalid RISC opcode.
    pub ocerr: bool,
    /// Sync error in the RISC stream.
    pub scerr: bool,
    #[bits(4, default = 0)]
    _reserved_20_23: u8,
    /// Current field: set for odd.
    pub field: bool,
    pub rack: bool,
    #[bits(default = false)]
    _reserved_26: bool,
    /// RISC DMA enabled.
    pub risc_en: bool,
    /// RISC status nibble, see [`bt848_risc::risc_status`].
    #[bits(4)]
    pub risc_status: u8,
}

impl InterruptStatus {
    /// Bus and RISC errors handled by the fault policy.
    pub const FAULTS: Self = Self::new()
        .with_fbus(true)
        .with_ftrgt(true)
        .with_fdsr(true)
        .with_pperr(true)
        .with_riperr(true)
        .with_pabort(true)
        .with_ocerr(true)
        .with_scerr(true);

    /// Events unmasked while the device is online.
    pub const ENABLED: Self = Self::from_bits(
        Self::FAULTS.into_bits()
            | Self::new()
                .with_fmtchg(true)
                .with_vsync(true)
                .with_hlock(true)
                .with_risci(true)
                .into_bits(),
    );

    #[inline]
    #[must_use]
    pub const fn intersect(self, other: Self) -> Self {
        Self::from_bits(self.into_bits() & other.into_bits())
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.into_bits() == 0
    }

    #[inline]
    #[must_use]
    pub const fn has_fault(self) -> bool {
        !self.intersect(Self::FAULTS).is_empty()
    }

    /// Sync-lock related events.
    #[inline]
    #[must_use]
    pub const fn has_lock_event(self) -> bool {
        self.hlock() || self.fmtchg()
    }
}

/// `CAP_CTL` capture enables.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct CaptureEnable {
    pub even: bool,
    pub odd: bool,
    pub vbi_even: bool,
    pub vbi_odd: bool,
    #[bits(4, default = 0)]
    _reserved_4_7: u8,
}

impl CaptureEnable {
    #[must_use]
    pub const fn fields(frames: bool, vbi: bool) -> Self {
        Self::new()
            .with_even(frames)
            .with_odd(frames)
            .with_vbi_even(vbi)
            .with_vbi_odd(vbi)
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.into_bits() == 0
    }
}

/// Everything written to the decoder's format and scaler registers.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CaptureGeometry {
    pub iform: u8,
    pub adelay: u8,
    pub bdelay: u8,
    pub vbi_pack: u8,
    pub scaler: ScalerGeometry,
    pub color_format: u8,
    pub color_control: u8,
}

impl CaptureGeometry {
    #[must_use]
    pub fn new(timing: &VideoStandardTiming, request: &CaptureRequest) -> Self {
        let (width, height) = if request.format == PixelFormat::Raw {
            (timing.swidth, timing.sheight)
        } else {
            (request.width, request.height)
        };
        Self {
            iform: timing.iform,
            adelay: timing.adelay,
            bdelay: timing.bdelay,
            vbi_pack: timing.vbipack,
            scaler: ScalerGeometry::compute(timing, width, height),
            color_format: request.format.color_format(),
            color_control: request.format.color_control(),
        }
    }

    /// Full-size frame used while no slot is bound.
    #[must_use]
    pub fn idle(timing: &VideoStandardTiming) -> Self {
        Self::new(
            timing,
            &CaptureRequest::new(PixelFormat::Yuyv, timing.swidth, timing.sheight),
        )
    }
}

/// The capture chip as seen by the capture core.
///
/// Implementations are only ever called with the device lock held, from
/// process context or from the interrupt handler, and must not block.
/// Waiting goes through [`DmaEngine::delay`] instead.
pub trait DmaEngine {
    /// Enables the RISC engine and FIFO with the given capture enables.
    fn arm_capture(&mut self, enable: CaptureEnable);

    /// Stops RISC fetching and all captures.
    fn disarm_capture(&mut self);

    fn set_geometry(&mut self, geometry: &CaptureGeometry);

    /// Address the RISC engine starts fetching from when armed.
    fn write_program_base(&mut self, addr: BusAddress);

    fn read_status(&mut self) -> InterruptStatus;

    /// Acknowledges latched events.
    fn clear_status(&mut self, status: InterruptStatus);

    fn set_interrupt_mask(&mut self, mask: InterruptStatus);

    /// Programs the sampling PLL, or bypasses it with `None`.
    fn write_pll(&mut self, coefficients: Option<PllCoefficients>);

    /// Whether the PLL held lock since the last check. Clears the latched
    /// lock-loss flag.
    fn pll_locked(&mut self) -> bool;

    /// Switches the decoder clock to the PLL output.
    fn select_pll_clock(&mut self);

    /// The host's millisecond busy-wait. The device copies it out once and
    /// calls it with its lock released.
    fn delay(&self) -> fn(u32);

    /// Soft-resets the chip; all registers return to power-on values.
    fn reset(&mut self);
}

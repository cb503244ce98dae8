//! [`DmaEngine`] backed by the chip's memory-mapped registers.
//!
//! Every register is accessed as an aligned 32-bit volatile word, even the
//! ones that only implement the low byte.

use crate::engine::{CaptureEnable, CaptureGeometry, DmaEngine, InterruptStatus};
use bt848_risc::{BusAddress, PllCoefficients};
use core::ptr::NonNull;

mod reg {
    pub const DSTATUS: usize = 0x000;
    pub const IFORM: usize = 0x004;
    pub const E_CROP: usize = 0x00C;
    pub const E_VDELAY_LO: usize = 0x010;
    pub const E_VACTIVE_LO: usize = 0x014;
    pub const E_HDELAY_LO: usize = 0x018;
    pub const E_HACTIVE_LO: usize = 0x01C;
    pub const E_HSCALE_HI: usize = 0x020;
    pub const E_HSCALE_LO: usize = 0x024;
    pub const E_VSCALE_HI: usize = 0x04C;
    pub const E_VSCALE_LO: usize = 0x050;
    pub const ADELAY: usize = 0x060;
    pub const BDELAY: usize = 0x064;
    pub const E_VTC: usize = 0x06C;
    pub const SRESET: usize = 0x07C;
    pub const TGCTRL: usize = 0x084;
    /// Distance from an even-field geometry register to its odd-field twin.
    pub const ODD_OFFSET: usize = 0x080;
    pub const COLOR_FMT: usize = 0x0D4;
    pub const COLOR_CTL: usize = 0x0D8;
    pub const CAP_CTL: usize = 0x0DC;
    pub const VBI_PACK_SIZE: usize = 0x0E0;
    pub const PLL_F_LO: usize = 0x0F0;
    pub const PLL_F_HI: usize = 0x0F4;
    pub const PLL_XCI: usize = 0x0F8;
    pub const INT_STAT: usize = 0x100;
    pub const INT_MASK: usize = 0x104;
    pub const GPIO_DMA_CTL: usize = 0x10C;
    pub const RISC_STRT_ADD: usize = 0x114;
}

/// `DSTATUS`: PLL lost lock since last cleared.
const DSTATUS_PLOCK: u32 = 1 << 2;
/// `TGCTRL`: clock the decoder from the PLL.
const TGCTRL_TGCKI_PLL: u32 = 0x08;
/// `GPIO_DMA_CTL`: FIFO enable and RISC enable.
const DMA_CTL_ARM: u32 = 0x3;
/// `GPIO_DMA_CTL`: FIFO, RISC and packing enables.
const DMA_CTL_RUN_MASK: u32 = 0xF;

/// Register access to one capture chip.
#[derive(Debug)]
pub struct MmioEngine {
    base: NonNull<u8>,
    delay_ms: fn(u32),
}

// SAFETY: the register window may be driven from any CPU; the device lock
// serializes all accesses.
unsafe impl Send for MmioEngine {}

impl MmioEngine {
    /// # Safety
    /// `base` must point to the chip's 4 KiB register window, mapped
    /// uncached for the lifetime of the engine, and nothing else may access
    /// it concurrently. `delay_ms` waits at least the given milliseconds; it
    /// is only called from process context.
    pub const unsafe fn new(base: NonNull<u8>, delay_ms: fn(u32)) -> Self {
        Self { base, delay_ms }
    }

    #[inline]
    fn read(&self, offset: usize) -> u32 {
        // SAFETY: offsets are register constants inside the mapped window.
        unsafe { self.base.add(offset).cast::<u32>().read_volatile() }
    }

    #[inline]
    fn write(&mut self, offset: usize, value: u32) {
        // SAFETY: as for `read`.
        unsafe { self.base.add(offset).cast::<u32>().write_volatile(value) }
    }

    /// Writes a geometry register for both fields.
    fn write_both(&mut self, even_offset: usize, value: u32) {
        self.write(even_offset, value);
        self.write(even_offset + reg::ODD_OFFSET, value);
    }
}

impl DmaEngine for MmioEngine {
    fn arm_capture(&mut self, enable: CaptureEnable) {
        self.write(reg::CAP_CTL, u32::from(enable.into_bits()));
        let ctl = self.read(reg::GPIO_DMA_CTL);
        self.write(reg::GPIO_DMA_CTL, ctl | DMA_CTL_ARM);
    }

    fn disarm_capture(&mut self) {
        let ctl = self.read(reg::GPIO_DMA_CTL);
        self.write(reg::GPIO_DMA_CTL, ctl & !DMA_CTL_RUN_MASK);
        self.write(reg::CAP_CTL, 0);
    }

    fn set_geometry(&mut self, g: &CaptureGeometry) {
        let s = &g.scaler;
        self.write(reg::IFORM, u32::from(g.iform));
        self.write(reg::ADELAY, u32::from(g.adelay));
        self.write(reg::BDELAY, u32::from(g.bdelay));
        self.write(reg::VBI_PACK_SIZE, u32::from(g.vbi_pack));

        self.write_both(reg::E_VTC, u32::from(s.vtc));
        self.write_both(reg::E_HSCALE_HI, u32::from(s.hscale >> 8));
        self.write_both(reg::E_HSCALE_LO, u32::from(s.hscale & 0xFF));
        self.write_both(reg::E_VSCALE_HI, u32::from(s.vscale >> 8));
        self.write_both(reg::E_VSCALE_LO, u32::from(s.vscale & 0xFF));
        self.write_both(reg::E_HACTIVE_LO, u32::from(s.hactive & 0xFF));
        self.write_both(reg::E_HDELAY_LO, u32::from(s.hdelay & 0xFF));
        self.write_both(reg::E_VACTIVE_LO, u32::from(s.vactive & 0xFF));
        self.write_both(reg::E_VDELAY_LO, u32::from(s.vdelay & 0xFF));
        self.write_both(reg::E_CROP, u32::from(s.crop));

        self.write(reg::COLOR_FMT, u32::from(g.color_format));
        self.write(reg::COLOR_CTL, u32::from(g.color_control));
    }

    fn write_program_base(&mut self, addr: BusAddress) {
        self.write(reg::RISC_STRT_ADD, addr.as_u32());
    }

    fn read_status(&mut self) -> InterruptStatus {
        InterruptStatus::from_bits(self.read(reg::INT_STAT))
    }

    fn clear_status(&mut self, status: InterruptStatus) {
        self.write(reg::INT_STAT, status.into_bits());
    }

    fn set_interrupt_mask(&mut self, mask: InterruptStatus) {
        self.write(reg::INT_MASK, mask.into_bits());
    }

    fn write_pll(&mut self, coefficients: Option<PllCoefficients>) {
        match coefficients {
            Some(c) => {
                self.write(reg::PLL_F_LO, u32::from(c.frac_lo));
                self.write(reg::PLL_F_HI, u32::from(c.frac_hi));
                self.write(reg::PLL_XCI, u32::from(c.xci));
            }
            None => {
                self.write(reg::TGCTRL, 0);
                self.write(reg::PLL_XCI, 0);
            }
        }
    }

    fn pll_locked(&mut self) -> bool {
        if self.read(reg::DSTATUS) & DSTATUS_PLOCK == 0 {
            return true;
        }
        self.write(reg::DSTATUS, 0);
        false
    }

    fn select_pll_clock(&mut self) {
        self.write(reg::TGCTRL, TGCTRL_TGCKI_PLL);
    }

    fn delay(&self) -> fn(u32) {
        self.delay_ms
    }

    fn reset(&mut self) {
        self.write(reg::SRESET, 0);
    }
}

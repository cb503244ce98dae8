//! Per-standard sampling constants, PLL coefficients and scaler geometry.

use core::fmt;

/// Crystal frequency of NTSC-only boards and the NTSC sampling clock.
pub const NTSC_FSC_HZ: u32 = 28_636_363;

/// PAL/SECAM sampling clock (8 × 4.43361875 MHz).
pub const PAL_FSC_HZ: u32 = 35_468_950;

/// `IFORM` crystal selection.
const IFORM_XT0: u8 = 1 << 3;
const IFORM_XT1: u8 = 2 << 3;

/// `PLL_XCI` post-divider enable.
pub const PLL_X: u8 = 0x80;

/// `E_VSCALE_HI` interlace flag (as a 16-bit scale value).
const VSCALE_INT: u16 = 0x2000;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum VideoStandard {
    PalBdghi,
    #[default]
    Ntsc,
    Secam,
    PalNc,
    PalM,
    PalN,
    NtscJapan,
}

impl VideoStandard {
    pub const ALL: [Self; 7] = [
        Self::PalBdghi,
        Self::Ntsc,
        Self::Secam,
        Self::PalNc,
        Self::PalM,
        Self::PalN,
        Self::NtscJapan,
    ];

    #[must_use]
    pub const fn timing(self) -> &'static VideoStandardTiming {
        match self {
            Self::PalBdghi => &TIMINGS[0],
            Self::Ntsc => &TIMINGS[1],
            Self::Secam => &TIMINGS[2],
            Self::PalNc => &TIMINGS[3],
            Self::PalM => &TIMINGS[4],
            Self::PalN => &TIMINGS[5],
            Self::NtscJapan => &TIMINGS[6],
        }
    }
}

impl fmt::Display for VideoStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PalBdghi => "PAL-BDGHI",
            Self::Ntsc => "NTSC",
            Self::Secam => "SECAM",
            Self::PalNc => "PAL-Nc",
            Self::PalM => "PAL-M",
            Self::PalN => "PAL-N",
            Self::NtscJapan => "NTSC-JP",
        })
    }
}

/// Read-only sampling constants of one video standard.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct VideoStandardTiming {
    /// Sampling clock the PLL must produce.
    pub fsc_hz: u32,
    /// Active samples per line at full scale.
    pub swidth: u32,
    /// Active lines per frame (both fields).
    pub sheight: u32,
    /// Total samples per line including blanking.
    pub totalwidth: u32,
    pub adelay: u8,
    pub bdelay: u8,
    /// `IFORM` value: norm code and crystal selection.
    pub iform: u8,
    /// Total line width after scaling to `swidth`.
    pub scaledtwidth: u32,
    /// Horizontal delay at full scale.
    pub hdelayx1: u32,
    pub hactive: u32,
    pub vdelay: u32,
    /// VBI packet size in dwords.
    pub vbipack: u8,
}

/// Per-standard values as in the Linux bttv `tvnorms` table.
static TIMINGS: [VideoStandardTiming; 7] = [
    // PAL-BDGHI
    VideoStandardTiming {
        fsc_hz: PAL_FSC_HZ,
        swidth: 924,
        sheight: 576,
        totalwidth: 1135,
        adelay: 0x7f,
        bdelay: 0x72,
        iform: 3 | IFORM_XT1,
        scaledtwidth: 1135,
        hdelayx1: 186,
        hactive: 924,
        vdelay: 0x20,
        vbipack: 255,
    },
    // NTSC
    VideoStandardTiming {
        fsc_hz: NTSC_FSC_HZ,
        swidth: 768,
        sheight: 480,
        totalwidth: 910,
        adelay: 0x68,
        bdelay: 0x5d,
        iform: 1 | IFORM_XT0,
        scaledtwidth: 910,
        hdelayx1: 128,
        hactive: 910,
        vdelay: 0x1a,
        vbipack: 144,
    },
    // SECAM
    VideoStandardTiming {
        fsc_hz: PAL_FSC_HZ,
        swidth: 924,
        sheight: 576,
        totalwidth: 1135,
        adelay: 0x7f,
        bdelay: 0xb0,
        iform: 6 | IFORM_XT1,
        scaledtwidth: 1135,
        hdelayx1: 186,
        hactive: 922,
        vdelay: 0x20,
        vbipack: 255,
    },
    // PAL-Nc
    VideoStandardTiming {
        fsc_hz: NTSC_FSC_HZ,
        swidth: 640,
        sheight: 576,
        totalwidth: 910,
        adelay: 0x7f,
        bdelay: 0x72,
        iform: 7 | IFORM_XT0,
        scaledtwidth: 780,
        hdelayx1: 130,
        hactive: 734,
        vdelay: 0x1a,
        vbipack: 144,
    },
    // PAL-M
    VideoStandardTiming {
        fsc_hz: NTSC_FSC_HZ,
        swidth: 640,
        sheight: 480,
        totalwidth: 910,
        adelay: 0x68,
        bdelay: 0x5d,
        iform: 4 | IFORM_XT0,
        scaledtwidth: 780,
        hdelayx1: 135,
        hactive: 754,
        vdelay: 0x1a,
        vbipack: 144,
    },
    // PAL-N
    VideoStandardTiming {
        fsc_hz: PAL_FSC_HZ,
        swidth: 768,
        sheight: 576,
        totalwidth: 1135,
        adelay: 0x7f,
        bdelay: 0x72,
        iform: 5 | IFORM_XT1,
        scaledtwidth: 944,
        hdelayx1: 186,
        hactive: 922,
        vdelay: 0x20,
        vbipack: 144,
    },
    // NTSC-Japan
    VideoStandardTiming {
        fsc_hz: NTSC_FSC_HZ,
        swidth: 640,
        sheight: 480,
        totalwidth: 910,
        adelay: 0x68,
        bdelay: 0x5d,
        iform: 2 | IFORM_XT0,
        scaledtwidth: 780,
        hdelayx1: 135,
        hactive: 754,
        vdelay: 0x16,
        vbipack: 144,
    },
];

impl VideoStandardTiming {
    /// Whether a frame of `height` lines needs both fields.
    #[inline]
    #[must_use]
    pub const fn is_interlaced(&self, height: u32) -> bool {
        height > self.sheight / 2
    }
}

/// Integer and fractional PLL multiplier bytes.
///
/// The PLL multiplies the quarter crystal frequency by
/// `xci + (fh / 256) + (fl / 65536)` and divides the result by 6 (post
/// divider enabled) to reach the sampling clock.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PllCoefficients {
    /// `PLL_F_LO`
    pub frac_lo: u8,
    /// `PLL_F_HI`
    pub frac_hi: u8,
    /// `PLL_XCI`, including [`PLL_X`].
    pub xci: u8,
}

impl PllCoefficients {
    /// Coefficients that turn `crystal_hz` into `target_hz`.
    ///
    /// Returns `None` when no PLL is needed because the crystal already runs
    /// at the target frequency.
    ///
    /// ### Examples
    /// ```rust
    /// # use bt848_risc::{PllCoefficients, NTSC_FSC_HZ, PAL_FSC_HZ};
    /// let c = PllCoefficients::compute(NTSC_FSC_HZ, PAL_FSC_HZ).unwrap();
    /// assert_eq!((c.xci, c.frac_hi, c.frac_lo), (0x8E, 0xDC, 0xF9));
    /// assert!(PllCoefficients::compute(NTSC_FSC_HZ, NTSC_FSC_HZ).is_none());
    /// ```
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn compute(crystal_hz: u32, target_hz: u32) -> Option<Self> {
        let fin = crystal_hz as u64 / 4;
        if crystal_hz == target_hz || fin == 0 {
            return None;
        }
        let fout = target_hz as u64 / 4 * 12;

        let fi = fout / fin;
        let mut r = (fout % fin) * 256;
        let fh = r / fin;
        r = (r % fin) * 256;
        let fl = r / fin;

        Some(Self {
            frac_lo: fl as u8,
            frac_hi: fh as u8,
            xci: (fi as u8 & 0x3F) | PLL_X,
        })
    }
}

/// Scaler and cropping register values for one capture geometry.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ScalerGeometry {
    pub hscale: u16,
    pub vscale: u16,
    pub hdelay: u16,
    pub hactive: u16,
    pub vdelay: u16,
    pub vactive: u16,
    /// High bits of delays and active sizes.
    pub crop: u8,
    /// Vertical filter tap control.
    pub vtc: u8,
}

impl ScalerGeometry {
    /// Scales the full active window of `timing` down to `width` × `height`.
    ///
    /// Expects a geometry the compiler accepted; degenerate sizes are
    /// clamped rather than divided by. Delays and active sizes keep their
    /// low ten bits; bits 8 and 9 also go into `crop`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn compute(timing: &VideoStandardTiming, width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let interlaced = timing.is_interlaced(height);

        let xsf = (width * timing.scaledtwidth / timing.swidth).max(1);
        let hscale = (timing.totalwidth * 4096 / xsf)
            .saturating_sub(4096)
            .min(u32::from(u16::MAX));
        let hdelay = (timing.hdelayx1 * width / timing.swidth) & 0x3fe;

        let field_lines = timing.sheight >> u32::from(!interlaced);
        let sr = (field_lines * 512 / height).saturating_sub(512);
        let mut vscale = (0x10000_u32.wrapping_sub(sr) & 0x1fff) as u16;
        if interlaced {
            vscale |= VSCALE_INT;
        }

        let vdelay = timing.vdelay;
        let crop = ((width >> 8) & 0x03)
            | ((hdelay >> 6) & 0x0c)
            | ((timing.sheight >> 4) & 0x30)
            | ((vdelay >> 2) & 0xc0);

        let vtc = if width < 193 {
            2
        } else if width < 385 {
            1
        } else {
            0
        };

        Self {
            hscale: hscale as u16,
            vscale,
            hdelay: hdelay as u16,
            hactive: width as u16,
            vdelay: vdelay as u16,
            vactive: timing.sheight as u16,
            crop: crop as u8,
            vtc,
        }
    }
}

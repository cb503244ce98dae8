//! Pixel formats the capture chip can emit and their memory footprint.

use crate::compiler::CompileError;
use crate::instruction::FifoStatus;

/// Scan lines per field captured in raw mode.
pub const RAW_LINES_PER_FIELD: u32 = 640;

/// Bytes per scan line captured in raw mode.
pub const RAW_BYTES_PER_LINE: u32 = 1024;

/// `COLOR_CTL` byte-swap bits for both fields.
const BSWAP_ODD_EVEN: u8 = 0x0C;

/// Output pixel format of a capture request.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum PixelFormat {
    /// 8-bit luma only.
    Grey,
    Rgb555,
    Rgb565,
    Rgb24,
    Rgb32,
    /// Packed 4:2:2, `Y0 U Y1 V`.
    Yuyv,
    /// Packed 4:2:2, `U Y0 V Y1`.
    Uyvy,
    /// Planar 4:2:2.
    Yuv422P,
    /// Planar 4:1:1.
    Yuv411P,
    /// Planar 4:2:0.
    Yuv420P,
    /// Planar 4:1:0.
    Yuv410P,
    /// Unprocessed composite samples; geometry is fixed.
    Raw,
}

/// How a format's bytes are laid out in the target buffer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FormatLayout {
    Packed {
        bytes_per_pixel: u32,
    },
    /// Full-size luma plane followed by Cb and Cr planes, each subsampled by
    /// `1 << h_shift` horizontally and `1 << v_shift` vertically.
    Planar {
        h_shift: u32,
        v_shift: u32,
    },
    Raw,
}

impl PixelFormat {
    pub const ALL: [Self; 12] = [
        Self::Grey,
        Self::Rgb555,
        Self::Rgb565,
        Self::Rgb24,
        Self::Rgb32,
        Self::Yuyv,
        Self::Uyvy,
        Self::Yuv422P,
        Self::Yuv411P,
        Self::Yuv420P,
        Self::Yuv410P,
        Self::Raw,
    ];

    /// Maps a V4L palette number onto a capture format.
    ///
    /// # Errors
    /// [`CompileError::UnsupportedFormat`] for palettes the chip cannot
    /// produce (HI240, packed 4:2:0 and 4:1:1) and unknown numbers.
    pub const fn from_palette(palette: u16) -> Result<Self, CompileError> {
        Ok(match palette {
            1 => Self::Grey,
            3 => Self::Rgb565,
            4 => Self::Rgb24,
            5 => Self::Rgb32,
            6 => Self::Rgb555,
            7 | 8 => Self::Yuyv,
            9 => Self::Uyvy,
            12 => Self::Raw,
            13 => Self::Yuv422P,
            14 => Self::Yuv411P,
            15 => Self::Yuv420P,
            16 => Self::Yuv410P,
            _ => return Err(CompileError::UnsupportedFormat(palette)),
        })
    }

    #[must_use]
    pub const fn layout(self) -> FormatLayout {
        match self {
            Self::Grey => FormatLayout::Packed { bytes_per_pixel: 1 },
            Self::Rgb555 | Self::Rgb565 | Self::Yuyv | Self::Uyvy => {
                FormatLayout::Packed { bytes_per_pixel: 2 }
            }
            Self::Rgb24 => FormatLayout::Packed { bytes_per_pixel: 3 },
            Self::Rgb32 => FormatLayout::Packed { bytes_per_pixel: 4 },
            Self::Yuv422P => FormatLayout::Planar { h_shift: 1, v_shift: 0 },
            Self::Yuv411P => FormatLayout::Planar { h_shift: 2, v_shift: 0 },
            Self::Yuv420P => FormatLayout::Planar { h_shift: 1, v_shift: 1 },
            Self::Yuv410P => FormatLayout::Planar { h_shift: 2, v_shift: 2 },
            Self::Raw => FormatLayout::Raw,
        }
    }

    #[inline]
    #[must_use]
    pub const fn is_planar(self) -> bool {
        matches!(self.layout(), FormatLayout::Planar { .. })
    }

    /// Value for the `COLOR_FMT` register (same code for both fields).
    #[must_use]
    pub const fn color_format(self) -> u8 {
        match self {
            Self::Rgb32 => 0x00,
            Self::Rgb24 => 0x11,
            Self::Rgb565 => 0x22,
            Self::Rgb555 => 0x33,
            Self::Yuyv | Self::Uyvy => 0x44,
            Self::Grey => 0x66,
            Self::Yuv422P | Self::Yuv420P => 0x88,
            Self::Yuv411P | Self::Yuv410P => 0x99,
            Self::Raw => 0xEE,
        }
    }

    /// Byte-swap bits for the `COLOR_CTL` register.
    #[must_use]
    pub const fn color_control(self) -> u8 {
        match self {
            Self::Uyvy => BSWAP_ODD_EVEN,
            _ => 0,
        }
    }

    /// FIFO tag a field program waits for before its first write.
    #[must_use]
    pub const fn field_start(self) -> FifoStatus {
        if self.is_planar() {
            FifoStatus::Fm3
        } else {
            FifoStatus::Fm1
        }
    }

    /// Bytes a complete `width` × `height` frame occupies in memory.
    ///
    /// Raw frames ignore the requested geometry. Sizes beyond `u32::MAX`
    /// saturate; no layout can hold them.
    ///
    /// ### Examples
    /// ```rust
    /// # use bt848_risc::PixelFormat;
    /// assert_eq!(PixelFormat::Yuyv.frame_bytes(720, 480), 720 * 480 * 2);
    /// assert_eq!(PixelFormat::Yuv420P.frame_bytes(640, 480), 640 * 480 * 3 / 2);
    /// ```
    #[must_use]
    pub const fn frame_bytes(self, width: u32, height: u32) -> u32 {
        match self.layout() {
            FormatLayout::Packed { bytes_per_pixel } => {
                width.saturating_mul(height).saturating_mul(bytes_per_pixel)
            }
            FormatLayout::Planar { h_shift, v_shift } => {
                let chroma = (width >> h_shift).saturating_mul(height >> v_shift);
                width
                    .saturating_mul(height)
                    .saturating_add(chroma.saturating_mul(2))
            }
            FormatLayout::Raw => 2 * RAW_LINES_PER_FIELD * RAW_BYTES_PER_LINE,
        }
    }
}

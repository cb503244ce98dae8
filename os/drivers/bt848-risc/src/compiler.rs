//! # Capture program compiler
//!
//! Turns a capture request (pixel format, width, height) and the scatter list
//! of its target buffer into two field programs: one executed during the odd
//! field, one during the even field.
//!
//! ## Field split
//!
//! A frame taller than half the standard's active height needs both fields:
//! row `r` is written by the odd program when `r` is even and by the even
//! program otherwise. Shorter frames are vertically decimated and written by
//! the odd program alone; the even program then only waits for the field
//! start and raises the completion interrupt.
//!
//! ## Fragmentation
//!
//! Each output row is emitted as one or more writes. A write never crosses a
//! page or run boundary of the target buffer and never exceeds
//! [`MAX_BYTE_COUNT`]:
//!
//! ```text
//!   row 3 ─────────────────────────────────────────────
//!          │ WRITE SOL  2176 │ WRITE EOL 1664 │
//!   page   ────────────────╂──────────────────────────
//!                       page boundary
//! ```
//!
//! Planar rows advance three cursors (Y, Cb, Cr) and cut each write at the
//! first boundary any of them hits. Rows of vertically subsampled formats
//! that carry no chroma use luma-only writes.
//!
//! ## Termination
//!
//! Every program ends in a jump back into the trampoline; the even program's
//! jump also raises `RISCI` with [`risc_status::CAPTURE_DONE`]. Space for that
//! jump is reserved up front, so a program that runs out of room fails with
//! [`CompileError::CapacityExceeded`] instead of being truncated.

use crate::address::BusAddress;
use crate::format::{FormatLayout, PixelFormat, RAW_BYTES_PER_LINE, RAW_LINES_PER_FIELD};
use crate::instruction::{
    FieldOverflow, Instruction, JumpFlags, LineFlags, MAX_BYTE_COUNT, PlanarLengths, risc_status,
};
use crate::layout::{BufferLayout, LayoutCursor};
use crate::program::{ProgramArea, ProgramWriter};
use crate::timing::VideoStandardTiming;
use log::{debug, trace};

/// Smallest capture width the scaler supports.
pub const MIN_WIDTH: u32 = 48;

/// Smallest capture height the scaler supports.
pub const MIN_HEIGHT: u32 = 32;

/// Words kept free at the end of each program for its final jump.
const TERMINATOR_WORDS: usize = 2;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("unsupported capture geometry {width}x{height}")]
    InvalidGeometry { width: u32, height: u32 },
    #[error("unsupported palette {0}")]
    UnsupportedFormat(u16),
    #[error("buffer holds {available} bytes, frame needs {needed}")]
    BufferTooSmall { needed: u32, available: u32 },
    #[error("program does not fit into {capacity} words")]
    CapacityExceeded { capacity: usize },
    #[error(transparent)]
    LengthOutOfRange(#[from] FieldOverflow),
}

/// What to capture.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct CaptureRequest {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
}

impl CaptureRequest {
    #[must_use]
    pub const fn new(format: PixelFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            width,
            height,
        }
    }

    /// Bytes of the captured frame.
    #[inline]
    #[must_use]
    pub const fn frame_bytes(&self) -> u32 {
        self.format.frame_bytes(self.width, self.height)
    }

    /// Checks the request against the active standard without compiling.
    ///
    /// # Errors
    /// [`CompileError::InvalidGeometry`] for sizes outside the scaler's range
    /// or not aligned to the format's chroma subsampling.
    pub const fn validate(&self, timing: &VideoStandardTiming) -> Result<(), CompileError> {
        let (w, h) = (self.width, self.height);
        let err = CompileError::InvalidGeometry {
            width: w,
            height: h,
        };
        match self.format.layout() {
            FormatLayout::Raw => return Ok(()),
            FormatLayout::Packed { .. } => {}
            FormatLayout::Planar { v_shift, .. } => {
                if w % 4 != 0 || h % (1 << v_shift) != 0 {
                    return Err(err);
                }
            }
        }
        if w < MIN_WIDTH || h < MIN_HEIGHT || w > timing.swidth || h > timing.sheight {
            return Err(err);
        }
        Ok(())
    }
}

/// Trampoline addresses compiled programs jump back to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct FieldLinks {
    /// Continuation after the odd-field program.
    pub odd_return: BusAddress,
    /// Continuation after the even-field program.
    pub even_return: BusAddress,
}

/// Result of a successful compilation.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CompiledFrame {
    pub odd: BusAddress,
    pub even: BusAddress,
    pub odd_words: usize,
    pub even_words: usize,
    /// Whether both fields carry image rows.
    pub interlaced: bool,
    /// Bytes the two programs store into the buffer.
    pub bytes: u32,
}

/// Compiles capture programs for one video standard.
#[derive(Copy, Clone, Debug)]
pub struct Compiler<'t> {
    timing: &'t VideoStandardTiming,
    links: FieldLinks,
}

impl<'t> Compiler<'t> {
    #[must_use]
    pub const fn new(timing: &'t VideoStandardTiming, links: FieldLinks) -> Self {
        Self { timing, links }
    }

    /// Compiles `request` into `odd` and `even`.
    ///
    /// Both areas are rewritten from word 0; they must not be reachable by
    /// the hardware while this runs. On error their contents are unspecified
    /// but they are never referenced by a returned [`CompiledFrame`].
    ///
    /// # Errors
    /// See [`CompileError`].
    pub fn compile(
        &self,
        request: &CaptureRequest,
        layout: &BufferLayout,
        odd: &mut ProgramArea,
        even: &mut ProgramArea,
    ) -> Result<CompiledFrame, CompileError> {
        request.validate(self.timing)?;
        let needed = request.frame_bytes();
        if layout.len() < needed {
            return Err(CompileError::BufferTooSmall {
                needed,
                available: layout.len(),
            });
        }

        let (odd_bus, even_bus) = (odd.bus_address(), even.bus_address());
        let mut fields = Fields {
            odd: odd.writer(TERMINATOR_WORDS),
            even: even.writer(TERMINATOR_WORDS),
        };
        let field_start = Instruction::Sync {
            status: request.format.field_start(),
            resync: false,
        };
        fields.odd.push(&field_start)?;
        fields.even.push(&field_start)?;

        let mut bytes = 0;
        let interlaced = match request.format.layout() {
            FormatLayout::Packed { bytes_per_pixel } => {
                let interlaced = self.timing.is_interlaced(request.height);
                let pitch = request.width * bytes_per_pixel;
                for row in 0..request.height {
                    let w = fields.for_row(row, interlaced);
                    bytes += emit_packed_row(w, layout, row * pitch, pitch)?;
                }
                interlaced
            }
            FormatLayout::Planar { h_shift, v_shift } => {
                let interlaced = self.timing.is_interlaced(request.height);
                let planes = PlaneOffsets::new(request.width, request.height, h_shift, v_shift);
                for row in 0..request.height {
                    let w = fields.for_row(row, interlaced);
                    bytes += emit_planar_row(w, layout, &planes, row)?;
                }
                interlaced
            }
            FormatLayout::Raw => {
                let field_bytes = RAW_LINES_PER_FIELD * RAW_BYTES_PER_LINE;
                for line in 0..RAW_LINES_PER_FIELD {
                    let offset = line * RAW_BYTES_PER_LINE;
                    bytes += emit_packed_row(&mut fields.odd, layout, offset, RAW_BYTES_PER_LINE)?;
                    bytes += emit_packed_row(
                        &mut fields.even,
                        layout,
                        field_bytes + offset,
                        RAW_BYTES_PER_LINE,
                    )?;
                }
                true
            }
        };

        let Fields { odd, even } = fields;
        let odd_words = odd.finish(&Instruction::Jump {
            target: self.links.odd_return,
            flags: JumpFlags::PLAIN,
        })?;
        let even_words = even.finish(&Instruction::Jump {
            target: self.links.even_return,
            flags: JumpFlags::irq_with_status(risc_status::CAPTURE_DONE),
        })?;

        debug!(
            "compiled {:?} {}x{}: odd {odd_words} words, even {even_words} words, {bytes} bytes",
            request.format, request.width, request.height
        );

        Ok(CompiledFrame {
            odd: odd_bus,
            even: even_bus,
            odd_words,
            even_words,
            interlaced,
            bytes,
        })
    }
}

struct Fields<'a> {
    odd: ProgramWriter<'a>,
    even: ProgramWriter<'a>,
}

impl<'a> Fields<'a> {
    #[inline]
    fn for_row(&mut self, row: u32, interlaced: bool) -> &mut ProgramWriter<'a> {
        if interlaced && row & 1 == 1 {
            &mut self.even
        } else {
            &mut self.odd
        }
    }
}

/// Buffer offsets of the three planes of a planar frame.
struct PlaneOffsets {
    width: u32,
    h_shift: u32,
    v_shift: u32,
    cb: u32,
    cr: u32,
}

impl PlaneOffsets {
    const fn new(width: u32, height: u32, h_shift: u32, v_shift: u32) -> Self {
        let luma = width * height;
        let chroma = (width >> h_shift) * (height >> v_shift);
        Self {
            width,
            h_shift,
            v_shift,
            cb: luma,
            cr: luma + chroma,
        }
    }

    #[inline]
    const fn has_chroma(&self, row: u32) -> bool {
        row & ((1 << self.v_shift) - 1) == 0
    }

    #[inline]
    const fn chroma_pitch(&self) -> u32 {
        self.width >> self.h_shift
    }
}

/// Cursor at `offset`; the size check up front makes a miss unreachable for
/// well-formed layouts.
fn cursor(layout: &BufferLayout, offset: u32) -> Result<LayoutCursor<'_>, CompileError> {
    layout.cursor_at(offset).ok_or(CompileError::BufferTooSmall {
        needed: offset + 1,
        available: layout.len(),
    })
}

/// Emits the writes of one packed row and returns the bytes they store.
fn emit_packed_row(
    w: &mut ProgramWriter<'_>,
    layout: &BufferLayout,
    offset: u32,
    pitch: u32,
) -> Result<u32, CompileError> {
    let mut at = cursor(layout, offset)?;
    let mut remaining = pitch;
    let mut first = true;
    while remaining > 0 {
        let n = remaining.min(at.contiguous()).min(u32::from(MAX_BYTE_COUNT));
        if n == 0 {
            return Err(CompileError::BufferTooSmall {
                needed: offset + pitch,
                available: layout.len(),
            });
        }
        let last = n == remaining;
        w.push(&Instruction::Write {
            len: byte_count(n)?,
            flags: LineFlags::run(first, last),
            addr: at.address(),
        })?;
        if !(first && last) {
            trace!("row at {offset:#x}: split run of {n} bytes");
        }
        at.advance(n);
        remaining -= n;
        first = false;
    }
    Ok(pitch)
}

/// Narrows a run length already clamped to [`MAX_BYTE_COUNT`].
fn byte_count(n: u32) -> Result<u16, FieldOverflow> {
    u16::try_from(n).map_err(|_| FieldOverflow { value: n, bits: 12 })
}

/// Emits the writes of planar row `row` and returns the bytes they store.
fn emit_planar_row(
    w: &mut ProgramWriter<'_>,
    layout: &BufferLayout,
    planes: &PlaneOffsets,
    row: u32,
) -> Result<u32, CompileError> {
    let hs = planes.h_shift;
    let unit_mask = !((1u32 << hs) - 1);
    let y_offset = row * planes.width;
    let mut y = cursor(layout, y_offset)?;

    let mut chroma = if planes.has_chroma(row) {
        let c_offset = (row >> planes.v_shift) * planes.chroma_pitch();
        Some((
            cursor(layout, planes.cb + c_offset)?,
            cursor(layout, planes.cr + c_offset)?,
        ))
    } else {
        None
    };

    let mut stored = 0;
    let mut remaining = planes.width;
    let mut first = true;
    while remaining > 0 {
        let mut n = remaining.min(y.contiguous()).min(u32::from(MAX_BYTE_COUNT));
        if let Some((cb, cr)) = &chroma {
            n = n.min(cb.contiguous() << hs).min(cr.contiguous() << hs);
        }
        n &= unit_mask;
        if n == 0 {
            return Err(CompileError::BufferTooSmall {
                needed: y_offset + planes.width,
                available: layout.len(),
            });
        }

        let last = n == remaining;
        let flags = LineFlags::run(first, last);
        let lens = PlanarLengths {
            y: byte_count(n)?,
            cb: byte_count(n >> hs)?,
            cr: byte_count(n >> hs)?,
        };
        let insn = match &mut chroma {
            Some((cb, cr)) => {
                let insn = Instruction::WritePlanar {
                    lens,
                    flags,
                    y: y.address(),
                    cb: cb.address(),
                    cr: cr.address(),
                };
                cb.advance(n >> hs);
                cr.advance(n >> hs);
                insn
            }
            None => Instruction::WriteLuma {
                lens,
                flags,
                y: y.address(),
            },
        };
        w.push(&insn)?;
        stored += insn.bytes_stored();
        y.advance(n);
        remaining -= n;
        first = false;
    }
    Ok(stored)
}

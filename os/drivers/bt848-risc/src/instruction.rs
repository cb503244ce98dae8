//! # Bt848 RISC instruction encoding
//!
//! The capture chip's DMA controller executes a tiny instruction set (the
//! "RISC" program) fetched from host memory. Every instruction starts with a
//! command word followed by zero to four operand words:
//!
//! ```text
//!  31    28 27  26  25  24  23   20 19   16 15  14  12 11            0
//! ┌───────┬───┬───┬───┬───┬───────┬───────┬───┬──────┬──────────────┐
//! │opcode │SOL│EOL│ - │IRQ│ reset │  set  │RSY│  -   │  byte count  │
//! └───────┴───┴───┴───┴───┴───────┴───────┴───┴──────┴──────────────┘
//! ```
//!
//! | Opcode | Mnemonic    | Words | Operands                                  |
//! |--------|-------------|-------|-------------------------------------------|
//! | `0x1`  | `WRITE`     | 2     | target address                            |
//! | `0x2`  | `SKIP`      | 1     | –                                         |
//! | `0x7`  | `JUMP`      | 2     | jump target                               |
//! | `0x8`  | `SYNC`      | 2     | reserved zero word                        |
//! | `0x9`  | `WRITE123`  | 5     | Cb/Cr counts, Y/Cb/Cr target addresses    |
//! | `0xA`  | `SKIP123`   | 2     | Cb/Cr counts                              |
//! | `0xB`  | `WRITE1S23` | 3     | Cb/Cr counts, Y target address            |
//!
//! For `SYNC` the low nibble of the byte count field carries the FIFO status
//! tag to wait for and bit 15 requests a resynchronisation. Jumps may set and
//! reset bits of the 4-bit RISC status, which the chip reports in the top
//! nibble of its interrupt status register when `IRQ` is set.
//!
//! Words are stored little-endian in program memory; the types here work on
//! CPU-order `u32` values.

use crate::address::BusAddress;
use bitfield_struct::bitfield;
use core::fmt;

/// Largest byte count a single write or skip can carry (12 bits).
pub const MAX_BYTE_COUNT: u16 = 0xFFF;

/// Most words any single instruction occupies (`WRITE123`).
pub const MAX_INSTRUCTION_WORDS: usize = 5;

/// RISC status bits used by the capture trampoline and its programs.
pub mod risc_status {
    /// Even-field VBI program finished.
    pub const VBI_DONE: u8 = 0x1;
    /// Even-field capture program finished; the bound frame is complete.
    pub const CAPTURE_DONE: u8 = 0x2;
    /// Trampoline wrapped around while a capture start was pending.
    pub const START: u8 = 0x8;
}

/// The command word shared by all instructions.
#[bitfield(u32)]
pub struct RiscCommand {
    /// Bits 0–11 — byte count (FIFO status tag for `SYNC`).
    #[bits(12)]
    pub count: u16,

    /// Bits 12–14 — byte enables, unused by this driver.
    #[bits(3, default = 0)]
    _reserved_12_14: u8,

    /// Bit 15 — `SYNC` only: resynchronise to the FIFO status.
    pub resync: bool,

    /// Bits 16–19 — RISC status bits to set.
    #[bits(4)]
    pub set_status: u8,

    /// Bits 20–23 — RISC status bits to reset.
    #[bits(4)]
    pub reset_status: u8,

    /// Bit 24 — raise `RISCI` when this instruction executes.
    pub irq: bool,

    /// Bit 25 — reserved.
    #[bits(default = false)]
    _reserved_25: bool,

    /// Bit 26 — end of line.
    pub eol: bool,

    /// Bit 27 — start of line.
    pub sol: bool,

    /// Bits 28–31 — opcode, see [`Opcode`].
    #[bits(4)]
    pub opcode: u8,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Write = 0x1,
    Skip = 0x2,
    Jump = 0x7,
    Sync = 0x8,
    Write123 = 0x9,
    Skip123 = 0xA,
    Write1S23 = 0xB,
}

impl Opcode {
    #[inline]
    #[must_use]
    pub const fn into_bits(self) -> u8 {
        self as u8
    }

    #[inline]
    #[must_use]
    pub const fn from_bits(v: u8) -> Option<Self> {
        Some(match v {
            0x1 => Self::Write,
            0x2 => Self::Skip,
            0x7 => Self::Jump,
            0x8 => Self::Sync,
            0x9 => Self::Write123,
            0xA => Self::Skip123,
            0xB => Self::Write1S23,
            _ => return None,
        })
    }

    /// Total words including the command word.
    #[inline]
    #[must_use]
    pub const fn words(self) -> usize {
        match self {
            Self::Skip => 1,
            Self::Write | Self::Jump | Self::Sync | Self::Skip123 => 2,
            Self::Write1S23 => 3,
            Self::Write123 => 5,
        }
    }

    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Write => "WRITE",
            Self::Skip => "SKIP",
            Self::Jump => "JUMP",
            Self::Sync => "SYNC",
            Self::Write123 => "WRITE123",
            Self::Skip123 => "SKIP123",
            Self::Write1S23 => "WRITE1S23",
        }
    }
}

/// FIFO status tags a `SYNC` instruction waits for.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[repr(u8)]
pub enum FifoStatus {
    /// Pixel data valid.
    Pxv = 0x0,
    Eol4 = 0x1,
    Sol = 0x2,
    /// Vertical resync, even field.
    Vre = 0x4,
    Eol1 = 0x5,
    /// Field start, packed formats.
    Fm1 = 0x6,
    Eol2 = 0x9,
    /// Vertical resync, odd field.
    Vro = 0xC,
    Eol3 = 0xD,
    /// Field start, planar formats.
    Fm3 = 0xE,
}

impl FifoStatus {
    #[inline]
    #[must_use]
    pub const fn into_bits(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn from_bits(v: u8) -> Option<Self> {
        Some(match v {
            0x0 => Self::Pxv,
            0x1 => Self::Eol4,
            0x2 => Self::Sol,
            0x4 => Self::Vre,
            0x5 => Self::Eol1,
            0x6 => Self::Fm1,
            0x9 => Self::Eol2,
            0xC => Self::Vro,
            0xD => Self::Eol3,
            0xE => Self::Fm3,
            _ => return None,
        })
    }
}

/// Line framing of a write or skip run.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct LineFlags {
    pub sol: bool,
    pub eol: bool,
}

impl LineFlags {
    /// A run in the middle of a line.
    pub const NONE: Self = Self { sol: false, eol: false };
    /// A run covering a whole line.
    pub const WHOLE: Self = Self { sol: true, eol: true };

    /// Flags for one run of a line split into several runs.
    #[inline]
    #[must_use]
    pub const fn run(first: bool, last: bool) -> Self {
        Self { sol: first, eol: last }
    }
}

/// Control bits carried by a `JUMP`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct JumpFlags {
    pub irq: bool,
    pub set_status: u8,
    pub reset_status: u8,
}

impl JumpFlags {
    pub const PLAIN: Self = Self {
        irq: false,
        set_status: 0,
        reset_status: 0,
    };

    #[inline]
    #[must_use]
    pub const fn irq_with_status(set_status: u8) -> Self {
        Self {
            irq: true,
            set_status,
            reset_status: 0,
        }
    }

    #[inline]
    #[must_use]
    pub const fn resetting(reset_status: u8) -> Self {
        Self {
            irq: false,
            set_status: 0,
            reset_status,
        }
    }
}

/// Byte counts of the three planes moved by one planar instruction.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct PlanarLengths {
    pub y: u16,
    pub cb: u16,
    pub cr: u16,
}

impl PlanarLengths {
    #[inline]
    const fn chroma_word(self) -> u32 {
        ((self.cr as u32) << 16) | self.cb as u32
    }

    #[inline]
    #[allow(clippy::cast_possible_truncation)]
    const fn from_chroma_word(y: u16, w: u32) -> Self {
        Self {
            y,
            cb: (w & 0xFFF) as u16,
            cr: ((w >> 16) & 0xFFF) as u16,
        }
    }
}

/// One decoded RISC operation.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Instruction {
    /// Wait for a FIFO status tag.
    Sync { status: FifoStatus, resync: bool },
    /// Store `len` packed bytes at `addr`.
    Write {
        len: u16,
        flags: LineFlags,
        addr: BusAddress,
    },
    /// Store luma and both chroma runs at three independent addresses.
    WritePlanar {
        lens: PlanarLengths,
        flags: LineFlags,
        y: BusAddress,
        cb: BusAddress,
        cr: BusAddress,
    },
    /// Store the luma run and discard the chroma runs (`WRITE1S23`).
    WriteLuma {
        lens: PlanarLengths,
        flags: LineFlags,
        y: BusAddress,
    },
    /// Discard `len` packed bytes.
    Skip { len: u16, flags: LineFlags },
    /// Discard luma and chroma runs.
    SkipPlanar { lens: PlanarLengths, flags: LineFlags },
    /// Continue fetching at `target`.
    Jump { target: BusAddress, flags: JumpFlags },
}

/// Encoded words of one instruction, CPU order.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Encoded {
    words: [u32; MAX_INSTRUCTION_WORDS],
    len: usize,
}

impl Encoded {
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u32] {
        &self.words[..self.len]
    }
}

/// Operand out of range for the hardware encoding.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
#[error("operand {value:#x} exceeds the {bits}-bit instruction field")]
pub struct FieldOverflow {
    pub value: u32,
    pub bits: u8,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("instruction needs {needed} words, only {available} left")]
    Truncated { needed: usize, available: usize },
    #[error("unknown RISC opcode {0:#x}")]
    UnknownOpcode(u8),
    #[error("unknown FIFO status tag {0:#x}")]
    UnknownFifoStatus(u8),
}

const fn check_count(v: u16) -> Result<u16, FieldOverflow> {
    if v > MAX_BYTE_COUNT {
        Err(FieldOverflow {
            value: v as u32,
            bits: 12,
        })
    } else {
        Ok(v)
    }
}

const fn check_nibble(v: u8) -> Result<u8, FieldOverflow> {
    if v > 0xF {
        Err(FieldOverflow {
            value: v as u32,
            bits: 4,
        })
    } else {
        Ok(v)
    }
}

fn check_planar(lens: PlanarLengths) -> Result<PlanarLengths, FieldOverflow> {
    check_count(lens.y)?;
    check_count(lens.cb)?;
    check_count(lens.cr)?;
    Ok(lens)
}

#[inline]
const fn command(op: Opcode, flags: LineFlags) -> RiscCommand {
    RiscCommand::new()
        .with_opcode(op.into_bits())
        .with_sol(flags.sol)
        .with_eol(flags.eol)
}

impl Instruction {
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::Sync { .. } => Opcode::Sync,
            Self::Write { .. } => Opcode::Write,
            Self::WritePlanar { .. } => Opcode::Write123,
            Self::WriteLuma { .. } => Opcode::Write1S23,
            Self::Skip { .. } => Opcode::Skip,
            Self::SkipPlanar { .. } => Opcode::Skip123,
            Self::Jump { .. } => Opcode::Jump,
        }
    }

    /// Program words this instruction occupies.
    #[inline]
    #[must_use]
    pub const fn words(&self) -> usize {
        self.opcode().words()
    }

    /// Bytes this instruction stores to memory.
    #[must_use]
    pub const fn bytes_stored(&self) -> u32 {
        match *self {
            Self::Write { len, .. } => len as u32,
            Self::WritePlanar { lens, .. } => lens.y as u32 + lens.cb as u32 + lens.cr as u32,
            Self::WriteLuma { lens, .. } => lens.y as u32,
            _ => 0,
        }
    }

    /// Encodes into command and operand words.
    ///
    /// # Errors
    /// Returns [`FieldOverflow`] if a byte count exceeds 12 bits or a status
    /// mask exceeds 4 bits.
    pub fn encode(&self) -> Result<Encoded, FieldOverflow> {
        let mut words = [0u32; MAX_INSTRUCTION_WORDS];
        match *self {
            Self::Sync { status, resync } => {
                words[0] = RiscCommand::new()
                    .with_opcode(Opcode::Sync.into_bits())
                    .with_count(u16::from(status.into_bits()))
                    .with_resync(resync)
                    .into_bits();
            }
            Self::Write { len, flags, addr } => {
                words[0] = command(Opcode::Write, flags)
                    .with_count(check_count(len)?)
                    .into_bits();
                words[1] = addr.as_u32();
            }
            Self::WritePlanar {
                lens,
                flags,
                y,
                cb,
                cr,
            } => {
                let lens = check_planar(lens)?;
                words[0] = command(Opcode::Write123, flags).with_count(lens.y).into_bits();
                words[1] = lens.chroma_word();
                words[2] = y.as_u32();
                words[3] = cb.as_u32();
                words[4] = cr.as_u32();
            }
            Self::WriteLuma { lens, flags, y } => {
                let lens = check_planar(lens)?;
                words[0] = command(Opcode::Write1S23, flags).with_count(lens.y).into_bits();
                words[1] = lens.chroma_word();
                words[2] = y.as_u32();
            }
            Self::Skip { len, flags } => {
                words[0] = command(Opcode::Skip, flags)
                    .with_count(check_count(len)?)
                    .into_bits();
            }
            Self::SkipPlanar { lens, flags } => {
                let lens = check_planar(lens)?;
                words[0] = command(Opcode::Skip123, flags).with_count(lens.y).into_bits();
                words[1] = lens.chroma_word();
            }
            Self::Jump { target, flags } => {
                words[0] = RiscCommand::new()
                    .with_opcode(Opcode::Jump.into_bits())
                    .with_irq(flags.irq)
                    .with_set_status(check_nibble(flags.set_status)?)
                    .with_reset_status(check_nibble(flags.reset_status)?)
                    .into_bits();
                words[1] = target.as_u32();
            }
        }
        Ok(Encoded {
            words,
            len: self.words(),
        })
    }

    /// Decodes the instruction starting at `words[0]`.
    ///
    /// Returns the instruction and the number of words it consumed.
    ///
    /// # Errors
    /// Fails on unknown opcodes or FIFO tags and when `words` ends early.
    pub fn decode(words: &[u32]) -> Result<(Self, usize), DecodeError> {
        let Some(&first) = words.first() else {
            return Err(DecodeError::Truncated {
                needed: 1,
                available: 0,
            });
        };
        let cmd = RiscCommand::from_bits(first);
        let op = Opcode::from_bits(cmd.opcode()).ok_or(DecodeError::UnknownOpcode(cmd.opcode()))?;
        let needed = op.words();
        if words.len() < needed {
            return Err(DecodeError::Truncated {
                needed,
                available: words.len(),
            });
        }

        let flags = LineFlags::run(cmd.sol(), cmd.eol());
        let insn = match op {
            Opcode::Sync => {
                #[allow(clippy::cast_possible_truncation)]
                let tag = (cmd.count() & 0xF) as u8;
                Self::Sync {
                    status: FifoStatus::from_bits(tag).ok_or(DecodeError::UnknownFifoStatus(tag))?,
                    resync: cmd.resync(),
                }
            }
            Opcode::Write => Self::Write {
                len: cmd.count(),
                flags,
                addr: BusAddress::new(words[1]),
            },
            Opcode::Skip => Self::Skip {
                len: cmd.count(),
                flags,
            },
            Opcode::Jump => Self::Jump {
                target: BusAddress::new(words[1]),
                flags: JumpFlags {
                    irq: cmd.irq(),
                    set_status: cmd.set_status(),
                    reset_status: cmd.reset_status(),
                },
            },
            Opcode::Write123 => Self::WritePlanar {
                lens: PlanarLengths::from_chroma_word(cmd.count(), words[1]),
                flags,
                y: BusAddress::new(words[2]),
                cb: BusAddress::new(words[3]),
                cr: BusAddress::new(words[4]),
            },
            Opcode::Skip123 => Self::SkipPlanar {
                lens: PlanarLengths::from_chroma_word(cmd.count(), words[1]),
                flags,
            },
            Opcode::Write1S23 => Self::WriteLuma {
                lens: PlanarLengths::from_chroma_word(cmd.count(), words[1]),
                flags,
                y: BusAddress::new(words[2]),
            },
        };
        Ok((insn, needed))
    }
}

impl fmt::Display for LineFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match (self.sol, self.eol) {
            (true, true) => "SOL|EOL",
            (true, false) => "SOL",
            (false, true) => "EOL",
            (false, false) => "-",
        })
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.opcode().mnemonic();
        match self {
            Self::Sync { status, resync } => {
                write!(f, "{m:<9} {status:?}{}", if *resync { " RESYNC" } else { "" })
            }
            Self::Write { len, flags, addr } => write!(f, "{m:<9} {flags:<7} {len:>4} -> {addr}"),
            Self::WritePlanar {
                lens,
                flags,
                y,
                cb,
                cr,
            } => write!(
                f,
                "{m:<9} {flags:<7} {}/{}/{} -> {y} {cb} {cr}",
                lens.y, lens.cb, lens.cr
            ),
            Self::WriteLuma { lens, flags, y } => {
                write!(f, "{m:<9} {flags:<7} {}/{}/{} -> {y}", lens.y, lens.cb, lens.cr)
            }
            Self::Skip { len, flags } => write!(f, "{m:<9} {flags:<7} {len:>4}"),
            Self::SkipPlanar { lens, flags } => {
                write!(f, "{m:<9} {flags:<7} {}/{}/{}", lens.y, lens.cb, lens.cr)
            }
            Self::Jump { target, flags } => write!(
                f,
                "{m:<9} {target}{} set={:#x} reset={:#x}",
                if flags.irq { " IRQ" } else { "" },
                flags.set_status,
                flags.reset_status
            ),
        }
    }
}

//! # The trampoline
//!
//! A 14-word program the chip executes every frame. It never changes shape;
//! only jump targets and the tail jump's interrupt flags are rewritten to
//! splice sub-programs in and out:
//!
//! ```text
//! word  0  SYNC  VRE resync            ; wait for the odd field
//! word  2  JUMP  → vbi odd   | word 4  ; reset status 0xD
//! word  4  JUMP  → capture odd | overlay odd | word 6   ; reset status 0xE
//! word  6  SYNC  VRO resync            ; wait for the even field
//! word  8  JUMP  → vbi even  | word 10
//! word 10  JUMP  → capture even | overlay even | word 12 ; reset status 0x8
//! word 12  JUMP  → word 0              ; IRQ + START while a start is pending
//! ```
//!
//! Sub-programs return to the word after the jump that entered them: odd
//! VBI to word 4, odd capture or overlay to word 6, even VBI to word 10, even
//! capture or overlay to word 12.
//!
//! ## Live rewriting
//!
//! The chip fetches this program on its own, at any time. A splice therefore
//! only ever replaces single words, each with one aligned store, and every
//! word is valid in its old and its new form: a target word always points at
//! a complete program that ends by jumping back here. Programs are never
//! freed while the device exists, so a target the chip fetched just before a
//! store stays valid too. Odd-field words are written before even-field ones
//! and the tail last.

use bt848_risc::{
    AreaError, BusAddress, BusMapper, FieldLinks, FifoStatus, Instruction, JumpFlags, ProgramArea,
    risc_status,
};
use log::trace;

/// Words in the trampoline program.
pub const TRAMPOLINE_WORDS: usize = 14;

const ODD_SYNC: usize = 0;
const VBI_ODD_JUMP: usize = 2;
const CAPTURE_ODD_JUMP: usize = 4;
const EVEN_SYNC: usize = 6;
const VBI_EVEN_JUMP: usize = 8;
const CAPTURE_EVEN_JUMP: usize = 10;
const TAIL_JUMP: usize = 12;

/// Status bits the odd-field VBI jump clears: VBI done, start and bit 2.
const RESET_AT_ODD_START: u8 = 0xD;
/// Status bits the odd-field capture jump clears: all but VBI done.
const RESET_AT_ODD_CAPTURE: u8 = 0xE;
/// Status bits the even-field capture jump clears: start.
const RESET_AT_EVEN_CAPTURE: u8 = risc_status::START;

/// Entry points of a sub-program pair, one per field.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct FieldPrograms {
    pub odd: BusAddress,
    pub even: BusAddress,
}

/// Where externally built VBI and overlay programs must jump back to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TrampolineLinks {
    pub vbi_odd_return: BusAddress,
    pub vbi_even_return: BusAddress,
    pub frame_odd_return: BusAddress,
    pub frame_even_return: BusAddress,
}

impl TrampolineLinks {
    /// Return addresses for compiled capture programs.
    #[must_use]
    pub const fn frame_links(&self) -> FieldLinks {
        FieldLinks {
            odd_return: self.frame_odd_return,
            even_return: self.frame_even_return,
        }
    }
}

/// The desired routing of one frame.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Splice {
    pub vbi: Option<FieldPrograms>,
    pub capture: Option<FieldPrograms>,
    pub overlay: Option<FieldPrograms>,
    /// Raise `RISCI` with [`risc_status::START`] at the end of each frame.
    pub start_pending: bool,
}

#[derive(Debug)]
pub struct Trampoline {
    area: ProgramArea,
    current: Splice,
}

impl Trampoline {
    /// Allocates the program and routes every jump to its fall-through.
    ///
    /// # Errors
    /// See [`ProgramArea::new`].
    pub fn new(mapper: &impl BusMapper) -> Result<Self, AreaError> {
        let mut area = ProgramArea::new(TRAMPOLINE_WORDS, mapper)?;
        let sync = |status| Instruction::Sync {
            status,
            resync: true,
        };
        let mut put = |at: usize, insn: Instruction| {
            // Static instructions with in-range fields always encode.
            if let Ok(words) = insn.encode() {
                for (i, &w) in words.as_slice().iter().enumerate() {
                    area.store_live(at + i, w);
                }
            }
        };
        put(ODD_SYNC, sync(FifoStatus::Vre));
        put(EVEN_SYNC, sync(FifoStatus::Vro));

        let mut t = Self {
            area,
            current: Splice::default(),
        };
        t.write_jumps(&Splice::default(), true);
        Ok(t)
    }

    #[inline]
    #[must_use]
    pub const fn base(&self) -> BusAddress {
        self.area.bus_address()
    }

    #[must_use]
    pub const fn links(&self) -> TrampolineLinks {
        TrampolineLinks {
            vbi_odd_return: self.area.word_address(CAPTURE_ODD_JUMP),
            vbi_even_return: self.area.word_address(CAPTURE_EVEN_JUMP),
            frame_odd_return: self.area.word_address(EVEN_SYNC),
            frame_even_return: self.area.word_address(TAIL_JUMP),
        }
    }

    #[inline]
    #[must_use]
    pub const fn current(&self) -> &Splice {
        &self.current
    }

    /// Program memory, for inspection.
    #[inline]
    #[must_use]
    pub const fn area(&self) -> &ProgramArea {
        &self.area
    }

    /// Reroutes the live program to `next`, touching only changed words.
    pub fn splice(&mut self, next: &Splice) {
        if *next != self.current {
            trace!("trampoline splice {:?} -> {next:?}", self.current);
            self.write_jumps(next, false);
        }
    }

    /// Rewrites every jump for `next`, e.g. after the chip was reset.
    pub fn rewrite(&mut self, next: &Splice) {
        self.write_jumps(next, true);
    }

    fn write_jumps(&mut self, next: &Splice, force: bool) {
        let fall = |word: usize| self.area.word_address(word);
        let frame = next.capture.or(next.overlay);

        let vbi_odd = next.vbi.map_or(fall(CAPTURE_ODD_JUMP), |p| p.odd);
        let frame_odd = frame.map_or(fall(EVEN_SYNC), |p| p.odd);
        let vbi_even = next.vbi.map_or(fall(CAPTURE_EVEN_JUMP), |p| p.even);
        let frame_even = frame.map_or(fall(TAIL_JUMP), |p| p.even);
        let tail = if next.start_pending {
            JumpFlags::irq_with_status(risc_status::START)
        } else {
            JumpFlags::PLAIN
        };

        let jumps = [
            (VBI_ODD_JUMP, JumpFlags::resetting(RESET_AT_ODD_START), vbi_odd),
            (CAPTURE_ODD_JUMP, JumpFlags::resetting(RESET_AT_ODD_CAPTURE), frame_odd),
            (VBI_EVEN_JUMP, JumpFlags::PLAIN, vbi_even),
            (CAPTURE_EVEN_JUMP, JumpFlags::resetting(RESET_AT_EVEN_CAPTURE), frame_even),
            (TAIL_JUMP, tail, fall(ODD_SYNC)),
        ];
        for (at, flags, target) in jumps {
            let Ok(encoded) = (Instruction::Jump { target, flags }).encode() else {
                continue;
            };
            let [command, target] = [encoded.as_slice()[0], encoded.as_slice()[1]];
            // Target before command: a new flag never pairs with a stale target.
            if force || self.area.word(at + 1) != target {
                self.area.store_live(at + 1, target);
            }
            if force || self.area.word(at) != command {
                self.area.store_live(at, command);
            }
        }
        self.current = *next;
    }
}

//! # Program areas
//!
//! A [`ProgramArea`] is a fixed-capacity block of 32-bit words the capture
//! chip fetches RISC instructions from. The CPU owns the backing allocation;
//! the chip only ever sees its bus address, obtained once through a
//! [`BusMapper`] when the area is created.
//!
//! Two kinds of writes exist:
//!
//! - [`ProgramWriter`] fills an area that the hardware cannot currently
//!   reach (a slot program that is not bound). Plain stores are fine.
//! - [`ProgramArea::store_live`] patches a single word of an area the
//!   hardware may be executing right now. Each store is a single aligned
//!   volatile 32-bit write followed by a fence, so the chip observes either
//!   the old or the new word, and successive live stores land in program
//!   order.

use crate::address::BusAddress;
use crate::compiler::CompileError;
use crate::instruction::{DecodeError, Instruction};
use alloc::boxed::Box;
use alloc::vec;
use core::ptr;
use core::sync::atomic::{Ordering, fence};

/// Words a slot program area holds unless configured otherwise.
pub const DEFAULT_PROGRAM_WORDS: usize = 8192;

/// Converts CPU pointers of DMA-visible memory into bus addresses.
pub trait BusMapper {
    /// Bus address of the `bytes` long region at `ptr`.
    ///
    /// Returns `None` unless the whole region is physically contiguous and
    /// reachable by a 32-bit bus master.
    fn map_contiguous(&self, ptr: *const u8, bytes: usize) -> Option<BusAddress>;
}

/// [`BusMapper`] for kernel memory inside a higher-half direct map.
///
/// Every physical address `pa` is mapped at `hhdm_base + pa`, so any region of
/// the direct map is physically contiguous and its bus address is its offset
/// from the base (PCI bus addresses equal physical addresses on PC hosts).
///
/// # Example
/// ```rust
/// use bt848_risc::{BusAddress, BusMapper, HhdmBusMapper};
/// let mapper = HhdmBusMapper::new(0xFFFF_8000_0000_0000);
/// let ptr = 0xFFFF_8000_0012_3000_u64 as *const u8;
/// assert_eq!(mapper.map_contiguous(ptr, 64), Some(BusAddress::new(0x12_3000)));
/// ```
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct HhdmBusMapper {
    hhdm_base: u64,
}

impl HhdmBusMapper {
    #[must_use]
    pub const fn new(hhdm_base: u64) -> Self {
        Self { hhdm_base }
    }
}

impl BusMapper for HhdmBusMapper {
    fn map_contiguous(&self, ptr: *const u8, bytes: usize) -> Option<BusAddress> {
        let pa = (ptr.addr() as u64).checked_sub(self.hhdm_base)?;
        let end = pa.checked_add(bytes as u64)?;
        if end > 1 << 32 {
            return None;
        }
        BusAddress::from_u64(pa)
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum AreaError {
    #[error("program area must hold at least one instruction")]
    Empty,
    #[error("program area memory is not reachable by the capture chip")]
    NotBusAddressable,
}

/// DMA-visible instruction memory of fixed capacity.
#[derive(Debug)]
pub struct ProgramArea {
    /// Little-endian words.
    words: Box<[u32]>,
    bus: BusAddress,
}

impl ProgramArea {
    /// Allocates a zeroed area of `capacity` words.
    ///
    /// # Errors
    /// Fails if `capacity` is zero or the mapper cannot give the memory a
    /// bus address.
    pub fn new(capacity: usize, mapper: &impl BusMapper) -> Result<Self, AreaError> {
        if capacity < 2 {
            return Err(AreaError::Empty);
        }
        let words = vec![0u32; capacity].into_boxed_slice();
        let bus = mapper
            .map_contiguous(words.as_ptr().cast(), capacity * 4)
            .ok_or(AreaError::NotBusAddressable)?;
        Ok(Self { words, bus })
    }

    #[inline]
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.words.len()
    }

    #[inline]
    #[must_use]
    pub const fn bus_address(&self) -> BusAddress {
        self.bus
    }

    /// Bus address of word `index`.
    #[inline]
    #[must_use]
    pub const fn word_address(&self, index: usize) -> BusAddress {
        self.bus.word(index)
    }

    /// Word `index` in CPU order.
    #[must_use]
    pub fn word(&self, index: usize) -> u32 {
        // SAFETY: in-bounds reference; volatile because the device may write
        // status back into its programs on some boards.
        u32::from_le(unsafe { ptr::read_volatile(&raw const self.words[index]) })
    }

    /// Replaces one word of an area the hardware may be executing.
    ///
    /// The store is a single aligned 32-bit volatile write, published before
    /// any later store by the fence that follows it.
    pub fn store_live(&mut self, index: usize, value: u32) {
        let slot = &raw mut self.words[index];
        // SAFETY: `slot` is an aligned, in-bounds pointer into our allocation.
        unsafe { ptr::write_volatile(slot, value.to_le()) };
        fence(Ordering::SeqCst);
    }

    /// Starts overwriting the area from word 0, keeping `reserve` words for
    /// [`ProgramWriter::finish`].
    pub fn writer(&mut self, reserve: usize) -> ProgramWriter<'_> {
        ProgramWriter {
            area: self,
            len: 0,
            reserve,
        }
    }

    /// Decodes the first `len` words.
    #[must_use]
    pub fn instructions(&self, len: usize) -> Instructions<'_> {
        Instructions {
            area: self,
            pos: 0,
            end: len.min(self.capacity()),
        }
    }
}

/// Sequential instruction emitter for an idle [`ProgramArea`].
#[derive(Debug)]
pub struct ProgramWriter<'a> {
    area: &'a mut ProgramArea,
    len: usize,
    reserve: usize,
}

impl ProgramWriter<'_> {
    /// Words emitted so far.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Appends one instruction.
    ///
    /// # Errors
    /// [`CompileError::CapacityExceeded`] if the instruction would eat into the
    /// reserved tail, [`CompileError::LengthOutOfRange`] if it cannot be
    /// encoded.
    pub fn push(&mut self, insn: &Instruction) -> Result<(), CompileError> {
        let limit = self.area.capacity().saturating_sub(self.reserve);
        self.emit(insn, limit)
    }

    /// Appends the terminating instruction into the reserved tail and returns
    /// the program length in words.
    ///
    /// # Errors
    /// As for [`ProgramWriter::push`].
    pub fn finish(mut self, terminator: &Instruction) -> Result<usize, CompileError> {
        let limit = self.area.capacity();
        self.emit(terminator, limit)?;
        Ok(self.len)
    }

    fn emit(&mut self, insn: &Instruction, limit: usize) -> Result<(), CompileError> {
        let encoded = insn.encode()?;
        let words = encoded.as_slice();
        if self.len + words.len() > limit {
            return Err(CompileError::CapacityExceeded {
                capacity: self.area.capacity(),
            });
        }
        for (dst, w) in self.area.words[self.len..].iter_mut().zip(words) {
            *dst = w.to_le();
        }
        self.len += words.len();
        Ok(())
    }
}

/// Iterator over the decoded instructions of a program area.
#[derive(Debug)]
pub struct Instructions<'a> {
    area: &'a ProgramArea,
    pos: usize,
    end: usize,
}

impl Iterator for Instructions<'_> {
    /// Word index and decoded instruction.
    type Item = Result<(usize, Instruction), DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.end {
            return None;
        }
        let mut buf = [0u32; crate::instruction::MAX_INSTRUCTION_WORDS];
        let avail = (self.end - self.pos).min(buf.len());
        for (i, w) in buf.iter_mut().take(avail).enumerate() {
            *w = self.area.word(self.pos + i);
        }
        match Instruction::decode(&buf[..avail]) {
            Ok((insn, used)) => {
                let at = self.pos;
                self.pos += used;
                Some(Ok((at, insn)))
            }
            Err(e) => {
                self.pos = self.end;
                Some(Err(e))
            }
        }
    }
}

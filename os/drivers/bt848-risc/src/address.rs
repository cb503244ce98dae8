use core::fmt;
use core::ops::{Add, AddAssign};

/// Size of a host page; DMA runs never cross one.
pub const PAGE_SIZE: u32 = 4096;

/// A 32-bit PCI bus address as seen by the capture chip's DMA engine.
///
/// Like the kernel's typed physical addresses, this wrapper carries intent:
/// a `BusAddress` is never dereferenced by the CPU, it is only written into
/// RISC programs and DMA registers.
///
/// ### Examples
/// ```rust
/// # use bt848_risc::{BusAddress, PAGE_SIZE};
/// let a = BusAddress::new(0x0012_3F00);
/// assert_eq!(a.page_offset(), 0xF00);
/// assert_eq!(a.bytes_to_page_end(), PAGE_SIZE - 0xF00);
/// ```
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct BusAddress(u32);

impl BusAddress {
    #[inline]
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }

    #[inline]
    #[must_use]
    pub const fn new(v: u32) -> Self {
        Self(v)
    }

    /// Narrows a 64-bit physical address; `None` above 4 GiB.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn from_u64(v: u64) -> Option<Self> {
        if v >> 32 != 0 {
            None
        } else {
            Some(Self(v as u32))
        }
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Offset within the containing page.
    #[inline]
    #[must_use]
    pub const fn page_offset(self) -> u32 {
        self.0 & (PAGE_SIZE - 1)
    }

    /// Bytes from this address up to (excluding) the next page boundary.
    #[inline]
    #[must_use]
    pub const fn bytes_to_page_end(self) -> u32 {
        PAGE_SIZE - self.page_offset()
    }

    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: u32) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }

    /// Address of the `index`-th 32-bit word after this one.
    ///
    /// `index` is bounded by a program area's capacity.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn word(self, index: usize) -> Self {
        Self(self.0 + (index as u32) * 4)
    }
}

impl fmt::Debug for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BA(0x{:08X})", self.0)
    }
}

impl fmt::Display for BusAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

impl From<u32> for BusAddress {
    #[inline]
    fn from(v: u32) -> Self {
        Self::new(v)
    }
}

impl From<BusAddress> for u32 {
    #[inline]
    fn from(v: BusAddress) -> Self {
        v.0
    }
}

impl Add<u32> for BusAddress {
    type Output = Self;
    #[inline]
    fn add(self, rhs: u32) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u32> for BusAddress {
    #[inline]
    fn add_assign(&mut self, rhs: u32) {
        self.0 += rhs;
    }
}

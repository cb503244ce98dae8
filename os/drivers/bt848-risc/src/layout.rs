//! Physical layout of a capture target buffer.
//!
//! The buffer allocator hands out memory that is virtually contiguous but may
//! be scattered page by page on the bus. A [`BufferLayout`] describes that
//! scatter list; a [`LayoutCursor`] walks it and reports how many bytes can be
//! written at the current position without crossing a run or page boundary.

use crate::address::{BusAddress, PAGE_SIZE};
use alloc::vec::Vec;

/// One physically contiguous piece of a buffer.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct PhysRun {
    pub addr: BusAddress,
    pub len: u32,
}

impl PhysRun {
    #[inline]
    #[must_use]
    pub const fn new(addr: BusAddress, len: u32) -> Self {
        Self { addr, len }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum LayoutError {
    #[error("layout has no bytes")]
    Empty,
    #[error("run {index} at {addr} is not aligned as required")]
    Misaligned { index: usize, addr: BusAddress },
    #[error("run {index} extends past the 32-bit bus address space")]
    AddressOverflow { index: usize },
}

/// Ordered scatter list of a buffer.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BufferLayout {
    runs: Vec<PhysRun>,
    /// Buffer offset at which each run starts.
    starts: Vec<u32>,
    total: u32,
}

impl BufferLayout {
    /// Builds a layout from arbitrary runs.
    ///
    /// Every run must be non-empty and start on a 32-bit boundary; all runs
    /// but the last must also end on one.
    ///
    /// # Errors
    /// See [`LayoutError`].
    pub fn new(runs: Vec<PhysRun>) -> Result<Self, LayoutError> {
        if runs.is_empty() {
            return Err(LayoutError::Empty);
        }

        let mut starts = Vec::with_capacity(runs.len());
        let mut total: u32 = 0;
        for (index, run) in runs.iter().enumerate() {
            if run.len == 0 {
                return Err(LayoutError::Empty);
            }
            let last = index + 1 == runs.len();
            if run.addr.as_u32() & 3 != 0 || (!last && run.len & 3 != 0) {
                return Err(LayoutError::Misaligned {
                    index,
                    addr: run.addr,
                });
            }
            // The last byte must still be addressable.
            if run.addr.checked_add(run.len - 1).is_none() {
                return Err(LayoutError::AddressOverflow { index });
            }
            starts.push(total);
            total = total
                .checked_add(run.len)
                .ok_or(LayoutError::AddressOverflow { index })?;
        }

        Ok(Self { runs, starts, total })
    }

    /// Builds a layout from a list of page frames backing `len` bytes.
    ///
    /// # Errors
    /// Fails if a frame is not page aligned or the pages cannot hold `len`.
    pub fn from_pages(pages: &[BusAddress], len: u32) -> Result<Self, LayoutError> {
        if len == 0 || (pages.len() as u64) * u64::from(PAGE_SIZE) < u64::from(len) {
            return Err(LayoutError::Empty);
        }

        let mut runs = Vec::with_capacity(pages.len());
        let mut remaining = len;
        for (index, &addr) in pages.iter().enumerate() {
            if remaining == 0 {
                break;
            }
            if addr.page_offset() != 0 {
                return Err(LayoutError::Misaligned { index, addr });
            }
            let take = remaining.min(PAGE_SIZE);
            // Merge physically adjacent pages.
            let adjacent = runs
                .last()
                .is_some_and(|r: &PhysRun| r.addr.checked_add(r.len) == Some(addr));
            match runs.last_mut() {
                Some(last) if adjacent => last.len += take,
                _ => runs.push(PhysRun::new(addr, take)),
            }
            remaining -= take;
        }

        Self::new(runs)
    }

    /// A single physically contiguous buffer.
    ///
    /// # Errors
    /// See [`BufferLayout::new`].
    pub fn contiguous(base: BusAddress, len: u32) -> Result<Self, LayoutError> {
        Self::new(alloc::vec![PhysRun::new(base, len)])
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> u32 {
        self.total
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.total == 0
    }

    #[must_use]
    pub fn runs(&self) -> &[PhysRun] {
        &self.runs
    }

    /// Cursor positioned `offset` bytes into the buffer, or `None` past the
    /// end.
    #[must_use]
    pub fn cursor_at(&self, offset: u32) -> Option<LayoutCursor<'_>> {
        if offset >= self.total {
            return None;
        }
        let run = self.starts.partition_point(|&s| s <= offset) - 1;
        Some(LayoutCursor {
            layout: self,
            run,
            within: offset - self.starts[run],
        })
    }
}

/// A position inside a [`BufferLayout`].
#[derive(Copy, Clone, Debug)]
pub struct LayoutCursor<'a> {
    layout: &'a BufferLayout,
    run: usize,
    within: u32,
}

impl LayoutCursor<'_> {
    /// Bus address of the current byte.
    #[inline]
    #[must_use]
    pub fn address(&self) -> BusAddress {
        self.layout.runs[self.run].addr + self.within
    }

    /// Bytes writable from here without crossing a run or page boundary.
    #[must_use]
    pub fn contiguous(&self) -> u32 {
        let run_left = self.layout.runs[self.run].len - self.within;
        run_left.min(self.address().bytes_to_page_end())
    }

    /// Moves forward by `n` bytes.
    ///
    /// Callers never step past [`LayoutCursor::contiguous`], so at most one
    /// run boundary is crossed. Stepping onto the end of the last run leaves
    /// the cursor exhausted with [`LayoutCursor::contiguous`] returning zero.
    pub fn advance(&mut self, n: u32) {
        self.within += n;
        let runs = &self.layout.runs;
        while self.within >= runs[self.run].len && self.run + 1 < runs.len() {
            self.within -= runs[self.run].len;
            self.run += 1;
        }
    }
}

//! Capture slots: one reusable frame buffer descriptor each.
//!
//! ```text
//!   Unused ──request──► Grabbing ──IRQ──► Done ──wait──► Unused
//!                          │                              ▲
//!                          └─cancel/fault─► Error ──wait──┘
//! ```

use crate::engine::CaptureGeometry;
use crate::error::{CaptureError, SlotFault};
use alloc::vec::Vec;
use bt848_risc::{AreaError, BusMapper, CaptureRequest, CompiledFrame, ProgramArea};
use log::error;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum SlotState {
    #[default]
    Unused,
    Grabbing,
    Done,
    Error,
}

impl SlotState {
    /// Whether `self → next` is an edge of the slot life cycle.
    #[must_use]
    pub const fn can_become(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Unused, Self::Grabbing)
                | (Self::Grabbing, Self::Done | Self::Error)
                | (Self::Done | Self::Error, Self::Unused)
        )
    }
}

/// When a frame completed, counted in fields since the device started.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct FrameInfo {
    /// Field counter at completion.
    pub field: u64,
    /// Frames completed before this one.
    pub sequence: u64,
}

/// Bookkeeping of one slot, guarded by the device lock.
#[derive(Copy, Clone, Debug, Default)]
pub struct Slot {
    state: SlotState,
    /// A request is compiling into this slot's programs.
    reserved: bool,
    pub(crate) request: Option<CaptureRequest>,
    pub(crate) frame: Option<CompiledFrame>,
    pub(crate) geometry: Option<CaptureGeometry>,
    info: FrameInfo,
    fault: Option<SlotFault>,
}

impl Slot {
    #[inline]
    #[must_use]
    pub const fn state(&self) -> SlotState {
        self.state
    }

    #[inline]
    #[must_use]
    pub const fn is_reserved(&self) -> bool {
        self.reserved
    }

    fn transition(&mut self, index: usize, next: SlotState) -> bool {
        if self.state.can_become(next) {
            self.state = next;
            true
        } else {
            error!("slot {index}: refusing {:?} -> {next:?}", self.state);
            false
        }
    }
}

/// The fixed set of slots, allocated once.
#[derive(Debug)]
pub struct SlotPool {
    slots: Vec<Slot>,
}

impl SlotPool {
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self {
            slots: alloc::vec![Slot::default(); count],
        }
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// # Errors
    /// [`CaptureError::InvalidSlot`] for out-of-range indices.
    pub fn get(&self, index: usize) -> Result<&Slot, CaptureError> {
        self.slots.get(index).ok_or(CaptureError::InvalidSlot(index))
    }

    fn get_mut(&mut self, index: usize) -> Result<&mut Slot, CaptureError> {
        self.slots
            .get_mut(index)
            .ok_or(CaptureError::InvalidSlot(index))
    }

    /// Claims an unused slot for compilation.
    ///
    /// # Errors
    /// [`CaptureError::Busy`] unless the slot is `Unused` and unclaimed.
    pub fn reserve(&mut self, index: usize) -> Result<(), CaptureError> {
        let slot = self.get_mut(index)?;
        if slot.state != SlotState::Unused || slot.reserved {
            return Err(CaptureError::Busy);
        }
        slot.reserved = true;
        Ok(())
    }

    /// Drops a claim after a failed compilation.
    pub fn unreserve(&mut self, index: usize) {
        if let Ok(slot) = self.get_mut(index) {
            slot.reserved = false;
        }
    }

    /// Turns a claim into a grabbing slot carrying its compiled frame.
    pub fn start(
        &mut self,
        index: usize,
        request: CaptureRequest,
        frame: CompiledFrame,
        geometry: CaptureGeometry,
    ) {
        if let Ok(slot) = self.get_mut(index) {
            slot.reserved = false;
            if slot.transition(index, SlotState::Grabbing) {
                slot.request = Some(request);
                slot.frame = Some(frame);
                slot.geometry = Some(geometry);
                slot.fault = None;
            }
        }
    }

    pub fn complete(&mut self, index: usize, info: FrameInfo) {
        if let Ok(slot) = self.get_mut(index)
            && slot.transition(index, SlotState::Done)
        {
            slot.info = info;
        }
    }

    pub fn fail(&mut self, index: usize, fault: SlotFault) {
        if let Ok(slot) = self.get_mut(index)
            && slot.transition(index, SlotState::Error)
        {
            slot.fault = Some(fault);
        }
    }

    /// Hands a finished slot back to `Unused` and returns its outcome.
    ///
    /// Returns `None` if the slot has not finished.
    pub fn release(&mut self, index: usize) -> Option<Result<FrameInfo, SlotFault>> {
        let slot = self.get_mut(index).ok()?;
        let outcome = match slot.state {
            SlotState::Done => Ok(slot.info),
            SlotState::Error => Err(slot.fault.unwrap_or(SlotFault::Cancelled)),
            SlotState::Unused | SlotState::Grabbing => return None,
        };
        slot.transition(index, SlotState::Unused);
        Some(outcome)
    }

    /// Whether any slot is grabbing or being compiled into.
    #[must_use]
    pub fn any_in_flight(&self) -> bool {
        self.slots
            .iter()
            .any(|s| s.reserved || s.state == SlotState::Grabbing)
    }
}

/// The two field programs of one slot.
///
/// Only the request path touches these, and only while the slot is reserved,
/// so the hardware never fetches from an area being rewritten.
#[derive(Debug)]
pub struct SlotPrograms {
    pub odd: ProgramArea,
    pub even: ProgramArea,
}

impl SlotPrograms {
    /// # Errors
    /// See [`ProgramArea::new`].
    pub fn new(words: usize, mapper: &impl BusMapper) -> Result<Self, AreaError> {
        Ok(Self {
            odd: ProgramArea::new(words, mapper)?,
            even: ProgramArea::new(words, mapper)?,
        })
    }
}

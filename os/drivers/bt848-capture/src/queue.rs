use crate::config::MAX_SLOTS;

/// Ring of pending slot indices plus the slot bound to the hardware.
///
/// `active` is the slot whose programs the trampoline points at (or will,
/// once `start_pending` clears). The ring holds the slots waiting behind it,
/// in request order. Capacity equals the pool limit and every slot is queued
/// at most once, so the ring cannot overflow.
#[derive(Debug, Clone)]
pub struct CaptureQueue {
    entries: [u8; MAX_SLOTS],
    head: usize,
    len: usize,
    active: Option<usize>,
    start_pending: bool,
}

impl Default for CaptureQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureQueue {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: [0; MAX_SLOTS],
            head: 0,
            len: 0,
            active: None,
            start_pending: false,
        }
    }

    /// Pending slots, not counting the active one.
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

    /// Neither pending nor active slots.
    #[inline]
    #[must_use]
    pub const fn is_idle(&self) -> bool {
        self.len == 0 && self.active.is_none()
    }

    #[inline]
    #[must_use]
    pub const fn active(&self) -> Option<usize> {
        self.active
    }

    #[inline]
    #[must_use]
    pub const fn start_pending(&self) -> bool {
        self.start_pending
    }

    #[inline]
    fn slot(&self, i: usize) -> usize {
        usize::from(self.entries[(self.head + i) % MAX_SLOTS])
    }

    /// Appends a slot; `false` if the ring is full.
    pub fn push(&mut self, slot: usize) -> bool {
        if self.len == MAX_SLOTS || slot >= MAX_SLOTS {
            return false;
        }
        let Ok(slot) = u8::try_from(slot) else {
            return false;
        };
        self.entries[(self.head + self.len) % MAX_SLOTS] = slot;
        self.len += 1;
        true
    }

    pub fn pop(&mut self) -> Option<usize> {
        if self.len == 0 {
            return None;
        }
        let slot = self.slot(0);
        self.head = (self.head + 1) % MAX_SLOTS;
        self.len -= 1;
        Some(slot)
    }

    /// Removes a pending slot, keeping the order of the others.
    pub fn remove(&mut self, slot: usize) -> bool {
        let Some(pos) = (0..self.len).find(|&i| self.slot(i) == slot) else {
            return false;
        };
        for i in pos..self.len - 1 {
            self.entries[(self.head + i) % MAX_SLOTS] =
                self.entries[(self.head + i + 1) % MAX_SLOTS];
        }
        self.len -= 1;
        true
    }

    #[must_use]
    pub fn contains(&self, slot: usize) -> bool {
        self.iter().any(|s| s == slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len).map(|i| self.slot(i))
    }

    /// Binds `slot` while idle; the hardware picks it up at the next start
    /// interrupt.
    pub fn begin(&mut self, slot: usize) {
        self.active = Some(slot);
        self.start_pending = true;
    }

    /// The start interrupt arrived; the active slot's programs are live.
    pub fn started(&mut self) {
        self.start_pending = false;
    }

    /// Retires the active slot and binds the next pending one, if any.
    pub fn advance(&mut self) -> Option<usize> {
        self.active = self.pop();
        if self.active.is_none() {
            self.start_pending = false;
        }
        self.active
    }

    /// Forgets every pending and active slot.
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
        self.active = None;
        self.start_pending = false;
    }
}

use crate::CaptureError;
use bt848_risc::{DEFAULT_PROGRAM_WORDS, NTSC_FSC_HZ, VideoStandard};

/// Largest slot pool a device supports.
pub const MAX_SLOTS: usize = 32;

/// Set-up parameters of a [`CaptureDevice`](crate::CaptureDevice).
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DeviceConfig {
    /// Capture slots in the pool, `2..=MAX_SLOTS`.
    pub slots: usize,
    /// Capacity of each field program in words.
    pub program_words: usize,
    /// Consecutive hardware faults tolerated before going offline.
    pub fault_threshold: u32,
    /// Status re-reads per interrupt before declaring a storm.
    pub irq_loop_limit: u32,
    /// Frequency of the crystal feeding the PLL.
    pub crystal_hz: u32,
    pub standard: VideoStandard,
    /// PLL lock checks before giving up.
    pub pll_lock_polls: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: 2,
            program_words: DEFAULT_PROGRAM_WORDS,
            fault_threshold: 5,
            irq_loop_limit: 20,
            crystal_hz: NTSC_FSC_HZ,
            standard: VideoStandard::Ntsc,
            pll_lock_polls: 10,
        }
    }

    #[must_use]
    pub const fn with_slots(mut self, slots: usize) -> Self {
        self.slots = slots;
        self
    }

    #[must_use]
    pub const fn with_program_words(mut self, words: usize) -> Self {
        self.program_words = words;
        self
    }

    #[must_use]
    pub const fn with_fault_threshold(mut self, threshold: u32) -> Self {
        self.fault_threshold = threshold;
        self
    }

    #[must_use]
    pub const fn with_irq_loop_limit(mut self, limit: u32) -> Self {
        self.irq_loop_limit = limit;
        self
    }

    #[must_use]
    pub const fn with_crystal_hz(mut self, hz: u32) -> Self {
        self.crystal_hz = hz;
        self
    }

    #[must_use]
    pub const fn with_standard(mut self, standard: VideoStandard) -> Self {
        self.standard = standard;
        self
    }

    #[must_use]
    pub const fn with_pll_lock_polls(mut self, polls: u32) -> Self {
        self.pll_lock_polls = polls;
        self
    }

    /// # Errors
    /// [`CaptureError::InvalidConfig`] naming the first offending field.
    pub const fn validate(&self) -> Result<(), CaptureError> {
        if self.slots < 2 || self.slots > MAX_SLOTS {
            return Err(CaptureError::InvalidConfig("slots"));
        }
        if self.program_words < 8 {
            return Err(CaptureError::InvalidConfig("program_words"));
        }
        if self.fault_threshold == 0 {
            return Err(CaptureError::InvalidConfig("fault_threshold"));
        }
        if self.irq_loop_limit == 0 {
            return Err(CaptureError::InvalidConfig("irq_loop_limit"));
        }
        if self.crystal_hz == 0 {
            return Err(CaptureError::InvalidConfig("crystal_hz"));
        }
        Ok(())
    }
}

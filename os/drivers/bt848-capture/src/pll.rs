//! Sampling clock set-up.
//!
//! Locking the PLL takes several settling intervals. The steps are split so
//! the caller can hold the device lock for each register access and release
//! it while waiting:
//!
//! ```text
//!  program ──Settling──► (wait SETTLE_MS) ──► poll ──false──► (wait) ──► poll …
//!     └──Bypassed: done                         └──true: decoder runs from the PLL
//! ```

use crate::engine::DmaEngine;
use crate::error::CaptureError;
use bt848_risc::{PllCoefficients, VideoStandard};
use log::{debug, warn};

/// Milliseconds the PLL needs between lock checks.
pub const SETTLE_MS: u32 = 10;

/// What [`program`] left the clock doing.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PllState {
    /// The crystal already runs at the sampling frequency.
    Bypassed,
    /// Coefficients are written; [`poll`] until lock.
    Settling,
}

/// Points the sampling clock at `standard`'s frequency.
///
/// Bypasses the PLL when the crystal already matches, otherwise writes the
/// coefficients. The decoder keeps running from the crystal until [`poll`]
/// reports lock.
#[must_use]
pub fn program(
    engine: &mut impl DmaEngine,
    crystal_hz: u32,
    standard: VideoStandard,
) -> PllState {
    let target = standard.timing().fsc_hz;
    match PllCoefficients::compute(crystal_hz, target) {
        None => {
            debug!("{standard}: crystal matches {target} Hz, PLL bypassed");
            engine.write_pll(None);
            PllState::Bypassed
        }
        Some(coefficients) => {
            engine.write_pll(Some(coefficients));
            PllState::Settling
        }
    }
}

/// One lock check, made after a settling interval. Switches the decoder clock
/// over once the PLL holds lock.
#[must_use]
pub fn poll(engine: &mut impl DmaEngine, standard: VideoStandard, attempt: u32) -> bool {
    if !engine.pll_locked() {
        return false;
    }
    debug!("{standard}: PLL locked after {attempt} checks");
    engine.select_pll_clock();
    true
}

/// The PLL did not lock within the allowed checks.
#[must_use]
pub fn unlocked(standard: VideoStandard) -> CaptureError {
    warn!(
        "{standard}: PLL failed to lock at {} Hz",
        standard.timing().fsc_hz
    );
    CaptureError::PllUnlocked
}

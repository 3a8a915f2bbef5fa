//! S11 evaluation and the running sweep minimum.
//!
//! The reflection coefficient is approximated as the complex ratio of the
//! reflected channel over the forward channel of one [`RawPoint`]:
//!
//! ```text
//! s11 = (rev_re + i*rev_im) / (fwd_re + i*fwd_im)
//! ```
//!
//! Magnitudes come out in dB via `10*log10(re^2 + im^2)`, which equals
//! `20*log10(|s11|)` without ever taking the square root. Two floors guard
//! the logarithms: a degenerate denominator (no measurable forward power)
//! yields `+inf` dB, and a vanishing numerator yields `-inf` dB.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::SweepConfig;
use crate::protocol::RawPoint;

/// Forward power floor below which the ratio is considered unmeasurable.
pub const DENOM_FLOOR: f64 = 1e-12;
/// Squared-magnitude floor below which the result clamps to `-inf` dB.
pub const MAG_SQ_FLOOR: f64 = 1e-18;

/// A complex sample in floating point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComplexSample {
    pub re: f64,
    pub im: f64,
}

impl ComplexSample {
    fn new(re: i32, im: i32) -> Self {
        Self { re: f64::from(re), im: f64::from(im) }
    }
}

/// One evaluated sweep point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct S11Point {
    pub freq_hz: f64,
    /// `+inf` when the forward channel carried no measurable power,
    /// `-inf` when the reflected ratio fell below the representable floor.
    pub magnitude_db: f64,
    /// Undefined (reported as 0) when `magnitude_db` is `+inf`.
    pub phase_deg: f64,
}

/// Aggregated outcome of one sweep: the extremal point seen so far.
///
/// Created at `+inf` minimum when a sweep starts, updated monotonically
/// downward by [`update_minimum`], and frozen when the sweep ends.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SweepResult {
    pub min_magnitude_db: f64,
    pub freq_at_min_hz: f64,
    pub points_processed: u32,
    pub completed: bool,
}

impl SweepResult {
    /// Fresh per-sweep state: no minimum yet, nothing processed.
    pub fn start() -> Self {
        Self {
            min_magnitude_db: f64::INFINITY,
            freq_at_min_hz: 0.0,
            points_processed: 0,
            completed: false,
        }
    }

    /// Whether any point ever replaced the initial `+inf` minimum.
    pub fn has_minimum(&self) -> bool {
        self.min_magnitude_db < f64::INFINITY
    }
}

/// Evaluate one raw sample against the sweep configuration.
///
/// `fallback_index` is the point's position within the overall sweep; it is
/// used when the instrument-reported `freq_index` is out of range, which is
/// logged as a warning and never aborts the sweep.
pub fn evaluate(point: &RawPoint, config: &SweepConfig, fallback_index: u32) -> S11Point {
    let index = if u32::from(point.freq_index) >= config.point_count {
        warn!(
            freq_index = point.freq_index,
            point_count = config.point_count,
            fallback = fallback_index,
            "frequency index out of range, using sweep position"
        );
        fallback_index
    } else {
        u32::from(point.freq_index)
    };
    let freq_hz = config.frequency_at(index);

    let fwd = ComplexSample::new(point.fwd_re, point.fwd_im);
    let rev = ComplexSample::new(point.rev_re, point.rev_im);

    // (a+ib)/(c+id) = (ac+bd)/(c^2+d^2) + i(bc-ad)/(c^2+d^2)
    let denom = fwd.re * fwd.re + fwd.im * fwd.im;
    if denom <= DENOM_FLOOR {
        // No forward power: the ratio is undefined, not zero.
        return S11Point { freq_hz, magnitude_db: f64::INFINITY, phase_deg: 0.0 };
    }

    let re = (rev.re * fwd.re + rev.im * fwd.im) / denom;
    let im = (rev.im * fwd.re - rev.re * fwd.im) / denom;

    let mag_sq = re * re + im * im;
    let magnitude_db =
        if mag_sq <= MAG_SQ_FLOOR { f64::NEG_INFINITY } else { 10.0 * mag_sq.log10() };
    let phase_deg = im.atan2(re).to_degrees();

    S11Point { freq_hz, magnitude_db, phase_deg }
}

/// Fold one evaluated point into the running minimum.
///
/// The minimum moves only when the candidate is strictly lower than the
/// current value; `NaN` and `+inf` candidates never win. A `-inf` candidate
/// *is* allowed to win: the source treats a below-floor reflection as a
/// perfect match, and that quirk is preserved deliberately even though it can
/// mask a genuine resonance behind a numerically degenerate point.
pub fn update_minimum(result: &mut SweepResult, point: &S11Point) {
    if point.magnitude_db.is_nan() || point.magnitude_db == f64::INFINITY {
        return;
    }
    if point.magnitude_db < result.min_magnitude_db {
        result.min_magnitude_db = point.magnitude_db;
        result.freq_at_min_hz = point.freq_hz;
    }
}

//! Trigger filtering and result formatting for the wireless channel.
//!
//! The wireless service is a dumb pipe: a write of one fixed literal starts
//! a sweep, and every sweep answers with one short UTF-8 payload. Successful
//! sweeps report `"<freq_ghz>,<min_db>"` (for example `"2.204238,-18.6421"`);
//! failures report the class and the partial point count. Payloads are
//! clamped to the transport limit on a character boundary.

use tracing::debug;

use crate::sweep::SweepReport;

/// The only wireless write that starts a sweep. Anything else is ignored.
pub const TRIGGER_LITERAL: &str = "MEASURE";

/// Maximum notification payload the transport can carry.
pub const MAX_PAYLOAD_BYTES: usize = 100;

/// Whether an inbound wireless write is the sweep trigger.
///
/// Tolerates surrounding whitespace (some clients append a newline) but
/// nothing else.
pub fn is_trigger(payload: &[u8]) -> bool {
    match std::str::from_utf8(payload) {
        Ok(text) => text.trim() == TRIGGER_LITERAL,
        Err(_) => {
            debug!(len = payload.len(), "non-UTF-8 wireless write ignored");
            false
        }
    }
}

/// Format a frozen sweep report as the outbound notification payload.
pub fn format_report(report: &SweepReport) -> String {
    let text = match &report.failure {
        None => {
            format!(
                "{:.6},{:.4}",
                report.result.freq_at_min_hz / 1e9,
                report.result.min_magnitude_db
            )
        }
        Some(failure) => {
            format!(
                "ERR {}: {}/{} points",
                failure.label(),
                report.result.points_processed,
                report.expected_points
            )
        }
    };
    bounded(text)
}

/// Clamp a payload to [`MAX_PAYLOAD_BYTES`], popping whole characters so the
/// result stays valid UTF-8.
fn bounded(mut text: String) -> String {
    while text.len() > MAX_PAYLOAD_BYTES {
        text.pop();
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::s11::SweepResult;
    use crate::sweep::SweepFailure;

    fn report(result: SweepResult, failure: Option<SweepFailure>) -> SweepReport {
        SweepReport { result, failure, expected_points: 4 }
    }

    #[test]
    fn trigger_literal_matches_exactly() {
        assert!(is_trigger(b"MEASURE"));
        assert!(is_trigger(b"MEASURE\n"));
        assert!(is_trigger(b"  MEASURE "));
        assert!(!is_trigger(b"measure"));
        assert!(!is_trigger(b"MEASURE NOW"));
        assert!(!is_trigger(b""));
        assert!(!is_trigger(&[0xFF, 0xFE]));
    }

    #[test]
    fn success_payload_has_fixed_precision() {
        let result = SweepResult {
            min_magnitude_db: -18.6421,
            freq_at_min_hz: 2_204_238_000.0,
            points_processed: 4,
            completed: true,
        };
        assert_eq!(format_report(&report(result, None)), "2.204238,-18.6421");
    }

    #[test]
    fn failure_payload_names_class_and_partial_count() {
        let result = SweepResult {
            min_magnitude_db: -12.0,
            freq_at_min_hz: 2.1e9,
            points_processed: 2,
            completed: false,
        };
        let text =
            format_report(&report(result, Some(SweepFailure::ChunkTimeout { chunk: 1 })));
        assert_eq!(text, "ERR timeout: 2/4 points");
    }

    #[test]
    fn no_minimum_payload_is_distinct() {
        let result = SweepResult {
            min_magnitude_db: f64::INFINITY,
            freq_at_min_hz: 0.0,
            points_processed: 4,
            completed: true,
        };
        let text = format_report(&report(result, Some(SweepFailure::NoFiniteMinimum)));
        assert_eq!(text, "ERR no-minimum: 4/4 points");
    }

    #[test]
    fn payload_is_bounded_on_char_boundary() {
        let long = "é".repeat(MAX_PAYLOAD_BYTES); // 2 bytes per char
        let clamped = bounded(long);
        assert!(clamped.len() <= MAX_PAYLOAD_BYTES);
        assert!(clamped.chars().all(|c| c == 'é'));
    }
}

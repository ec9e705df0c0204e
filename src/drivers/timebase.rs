//! Oscilloscope time divisions and the time-division selector.
//!
//! The selector keeps between 2 and 5 signal cycles on the 14-division display span: it
//! zooms out while the signal is too fast for the current division and zooms in while it
//! is too slow. The band between the two thresholds is the hysteresis that stops the index
//! from toggling at a boundary.
use crate::drivers::SweepError;
/// A single time-per-division setting, as labelled in the `TDIV` command.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimeDivision {
    pub label: &'static str,
    pub seconds: f64,
}
const fn td(label: &'static str, seconds: f64) -> TimeDivision {
    TimeDivision { label, seconds }
}
/// Supported time divisions, ascending.
pub const TIME_DIVISIONS: [TimeDivision; 33] = [
    td("1NS", 1e-9),
    td("2NS", 2e-9),
    td("5NS", 5e-9),
    td("10NS", 10e-9),
    td("20NS", 20e-9),
    td("50NS", 50e-9),
    td("100NS", 100e-9),
    td("200NS", 200e-9),
    td("500NS", 500e-9),
    td("1US", 1e-6),
    td("2US", 2e-6),
    td("5US", 5e-6),
    td("10US", 10e-6),
    td("20US", 20e-6),
    td("50US", 50e-6),
    td("100US", 100e-6),
    td("200US", 200e-6),
    td("500US", 500e-6),
    td("1MS", 1e-3),
    td("2MS", 2e-3),
    td("5MS", 5e-3),
    td("10MS", 10e-3),
    td("20MS", 20e-3),
    td("50MS", 50e-3),
    td("100MS", 100e-3),
    td("200MS", 200e-3),
    td("500MS", 500e-3),
    td("1S", 1.0),
    td("2S", 2.0),
    td("5S", 5.0),
    td("10S", 10.0),
    td("20S", 20.0),
    td("50S", 50.0),
];
/// Cycles across the display above which the signal is too fast for the division.
const MAX_CYCLES: f64 = 5.0;
/// Cycles across the display below which the signal is too slow for the division.
const MIN_CYCLES: f64 = 2.0;
const DISPLAY_DIVISIONS: f64 = 14.0;
/// Relative distance tolerated between a reported value and a table entry.
const MATCH_TOLERANCE: f64 = 0.01;
pub fn time_division(index: usize) -> Option<&'static TimeDivision> {
    TIME_DIVISIONS.get(index)
}
/// Finds the index of a division by its command label (case-insensitive).
pub fn index_of_label(label: &str) -> Option<usize> {
    TIME_DIVISIONS
        .iter()
        .position(|td| td.label.eq_ignore_ascii_case(label.trim()))
}
/// Resolves a reported seconds-per-division value to the nearest table entry.
///
/// Instruments print the value with limited precision, so the match is done on the ratio
/// to each entry rather than on float equality. Values more than 1% away from every entry
/// are rejected.
pub fn resolve_seconds(reported: f64) -> Result<usize, SweepError> {
    if !reported.is_finite() || reported <= 0.0 {
        return Err(SweepError::UnknownTimebase { reported });
    }
    let (index, distance) = TIME_DIVISIONS
        .iter()
        .enumerate()
        .map(|(i, td)| (i, (reported / td.seconds).ln().abs()))
        .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best });
    if distance.exp() - 1.0 > MATCH_TOLERANCE {
        return Err(SweepError::UnknownTimebase { reported });
    }
    Ok(index)
}
/// Frequency at or above which division `index` shows too many cycles.
pub fn upper_threshold_hz(index: usize) -> f64 {
    (MAX_CYCLES / DISPLAY_DIVISIONS) * (1.0 / TIME_DIVISIONS[index].seconds)
}
/// Frequency at or below which division `index` shows too few cycles.
pub fn lower_threshold_hz(index: usize) -> f64 {
    (MIN_CYCLES / DISPLAY_DIVISIONS) * (1.0 / TIME_DIVISIONS[index].seconds)
}
/// Walks from `current` to the division whose band contains `frequency_hz`.
///
/// Both thresholds are inclusive: a frequency exactly on the upper threshold zooms out and
/// one exactly on the lower threshold zooms in. On a 2-5 step both thresholds of adjacent
/// divisions coincide; the walk stops instead of turning back, so it always terminates.
/// Leaving either end of the table is an error rather than a clamp.
pub fn select_timebase(current: usize, frequency_hz: f64) -> Result<usize, SweepError> {
    if !frequency_hz.is_finite() || frequency_hz <= 0.0 || current >= TIME_DIVISIONS.len() {
        return Err(SweepError::TimebaseOutOfRange { frequency_hz });
    }
    let mut index = current;
    let mut last_move = 0i8;
    loop {
        let step: i8 = if frequency_hz >= upper_threshold_hz(index) {
            -1
        } else if frequency_hz <= lower_threshold_hz(index) {
            1
        } else {
            0
        };
        if step == 0 || step == -last_move {
            return Ok(index);
        }
        index = match step {
            -1 => index.checked_sub(1),
            _ => Some(index + 1).filter(|&i| i < TIME_DIVISIONS.len()),
        }
        .ok_or(SweepError::TimebaseOutOfRange { frequency_hz })?;
        log::trace!("time division -> {} for {frequency_hz} Hz", TIME_DIVISIONS[index].label);
        last_move = step;
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn table_is_strictly_increasing_and_lookups_are_unique() {
        for pair in TIME_DIVISIONS.windows(2) {
            assert!(pair[0].seconds < pair[1].seconds);
        }
        for (i, td) in TIME_DIVISIONS.iter().enumerate() {
            assert_eq!(resolve_seconds(td.seconds).unwrap(), i);
            assert_eq!(index_of_label(td.label), Some(i));
        }
        assert_eq!(TIME_DIVISIONS[16].label, "200US");
    }
    #[test]
    fn resolves_imprecise_readback() {
        assert_eq!(resolve_seconds(1.000_000_1e-3).unwrap(), 18);
        assert_eq!(resolve_seconds(4.99e-6).unwrap(), 11);
        assert!(matches!(
            resolve_seconds(3e-3),
            Err(SweepError::UnknownTimebase { .. })
        ));
        assert!(resolve_seconds(0.0).is_err());
    }
    #[test]
    fn converges_to_band_from_any_start() {
        for k in 1..TIME_DIVISIONS.len() - 1 {
            let lower = lower_threshold_hz(k);
            let upper = upper_threshold_hz(k);
            let frequency = (lower * upper).sqrt();
            for start in 0..TIME_DIVISIONS.len() {
                assert_eq!(
                    select_timebase(start, frequency).unwrap(),
                    k,
                    "start {start}, target {frequency} Hz"
                );
            }
        }
    }
    #[test]
    fn thresholds_are_inclusive() {
        let k = 18; // 1MS
        let at_upper = upper_threshold_hz(k);
        assert!(select_timebase(k, at_upper).unwrap() < k);
        let at_lower = lower_threshold_hz(k);
        assert!(select_timebase(k, at_lower).unwrap() > k);
        let inside = (at_upper + at_lower) / 2.0;
        assert_eq!(select_timebase(k, inside).unwrap(), k);
    }
    #[test]
    fn coincident_thresholds_terminate() {
        // 5MS upper == 2MS lower
        let frequency = upper_threshold_hz(20);
        let index = select_timebase(20, frequency).unwrap();
        assert!(index == 19 || index == 20);
    }
    #[test]
    fn out_of_range_frequencies_fail() {
        assert!(matches!(
            select_timebase(16, 1e10),
            Err(SweepError::TimebaseOutOfRange { .. })
        ));
        assert!(matches!(
            select_timebase(16, 1e-3),
            Err(SweepError::TimebaseOutOfRange { .. })
        ));
        assert!(select_timebase(16, -5.0).is_err());
    }
}

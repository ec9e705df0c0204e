/// Gain of channel 2 relative to channel 1, in dB.
///
/// A zero channel-1 amplitude yields `+inf` (or NaN when both are zero); callers flag such
/// points instead of hiding them.
pub fn magnitude_db(channel1_vpp: f64, channel2_vpp: f64) -> f64 {
    20.0 * (channel2_vpp / channel1_vpp).log10()
}
/// Phase as recorded: the scope reports C1 relative to C2, so a lagging output reads
/// positive and is flipped to read negative.
pub fn recorded_phase(measured_deg: f64) -> f64 {
    -measured_deg
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn unity_and_double_gain() {
        assert_eq!(magnitude_db(1.3, 1.3), 0.0);
        assert!((magnitude_db(1.0, 2.0) - 6.0206).abs() < 1e-4);
        assert!((magnitude_db(5.0, 2.5) + 6.0206).abs() < 1e-4);
    }
    #[test]
    fn zero_reference_is_not_finite() {
        assert_eq!(magnitude_db(0.0, 1.0), f64::INFINITY);
        assert!(magnitude_db(0.0, 0.0).is_nan());
    }
    #[test]
    fn phase_sign_is_flipped() {
        assert_eq!(recorded_phase(45.0), -45.0);
        assert_eq!(recorded_phase(-10.0), 10.0);
    }
}

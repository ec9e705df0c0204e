//! Keeps the oscilloscope's horizontal and vertical scales matched to the signal.
use serde::{Deserialize, Serialize};
use crate::drivers::channel::InstrumentChannel;
use crate::drivers::instruments::{Channel, Oscilloscope};
use crate::drivers::timebase::{self, TIME_DIVISIONS};
use crate::drivers::SweepError;
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoscaleSettings {
    /// Screen height the signal is scaled to fill, in divisions.
    pub vertical_divisions: f64,
    /// Largest relative change between successive scale candidates accepted as settled.
    pub tolerance: f64,
    /// Measure/rescale rounds attempted per channel before giving up.
    pub max_iterations: usize,
    /// Time division set when a session starts.
    pub initial_timebase_index: usize,
}
impl Default for AutoscaleSettings {
    fn default() -> Self {
        Self {
            vertical_divisions: 7.0,
            tolerance: 0.01,
            max_iterations: 40,
            initial_timebase_index: 16,
        }
    }
}
impl AutoscaleSettings {
    pub fn validate(&self) -> Result<(), SweepError> {
        if !(self.vertical_divisions.is_finite() && self.vertical_divisions > 0.0) {
            return Err(SweepError::InvalidConfig(format!(
                "vertical divisions must be positive, got {}",
                self.vertical_divisions
            )));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(SweepError::InvalidConfig(format!(
                "scale tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if self.max_iterations == 0 {
            return Err(SweepError::InvalidConfig(
                "at least one scale iteration is required".into(),
            ));
        }
        if self.initial_timebase_index >= TIME_DIVISIONS.len() {
            return Err(SweepError::InvalidConfig(format!(
                "initial time division index {} outside 0..{}",
                self.initial_timebase_index,
                TIME_DIVISIONS.len()
            )));
        }
        Ok(())
    }
}
/// Outcome of a settled vertical scale.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VerticalScale {
    /// Scale left applied on the instrument (V/div).
    pub applied: f64,
    /// Candidate computed from the reading taken at `applied`.
    pub candidate: f64,
    pub attempts: usize,
}
/// Reads the scope's current time division and moves it to the band that frames
/// `frequency_hz`. The instrument is only touched when the division actually changes.
pub fn apply_timebase<C: InstrumentChannel>(
    scope: &mut Oscilloscope<C>,
    frequency_hz: f64,
) -> Result<usize, SweepError> {
    let current = scope.timebase_index()?;
    let selected = timebase::select_timebase(current, frequency_hz)?;
    if selected != current {
        log::debug!(
            "time division {} -> {} for {frequency_hz:.2} Hz",
            TIME_DIVISIONS[current].label,
            TIME_DIVISIONS[selected].label
        );
        scope.set_timebase(selected)?;
        scope.pacing().dwell();
    }
    Ok(selected)
}
/// Drives the vertical scale of `input` to its fixed point.
///
/// The amplitude reading depends on the scale it is taken at (clipping above the screen,
/// coarse resolution below it), so each round measures, applies `amplitude / divisions`,
/// measures again and stops once the two candidates agree within the tolerance.
pub fn converge_vertical_scale<C: InstrumentChannel>(
    scope: &mut Oscilloscope<C>,
    input: Channel,
    settings: &AutoscaleSettings,
) -> Result<VerticalScale, SweepError> {
    for attempt in 1..=settings.max_iterations {
        let applied = scope.peak_to_peak(input)? / settings.vertical_divisions;
        scope.set_volts_per_division(input, applied)?;
        let candidate = scope.peak_to_peak(input)? / settings.vertical_divisions;
        let change = (1.0 - applied / candidate).abs();
        log::debug!("{input} scale round {attempt}: {applied:.4e} -> {candidate:.4e} V/div");
        if change <= settings.tolerance {
            return Ok(VerticalScale {
                applied,
                candidate,
                attempts: attempt,
            });
        }
    }
    log::warn!(
        "{input} scale still moving after {} rounds",
        settings.max_iterations
    );
    Err(SweepError::Convergence {
        channel: input,
        attempts: settings.max_iterations,
    })
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::channel::{ScriptedChannel, Timing};
    use crate::drivers::instruments::Generator;
    use crate::drivers::simulator::{DeviceModel, SimulatedBench, SimulatedScope};
    fn driven_bench(model: DeviceModel, volts_pp: f64) -> (SimulatedBench, Oscilloscope<SimulatedScope>) {
        let bench = SimulatedBench::new(model);
        let mut generator = Generator::new(bench.generator(), &Timing::immediate());
        generator.outputs_on().unwrap();
        generator.set_amplitude(Channel::One, volts_pp).unwrap();
        let scope = Oscilloscope::new(bench.scope(), &Timing::immediate());
        (bench, scope)
    }
    #[test]
    fn timebase_is_only_written_on_change() {
        let (bench, mut scope) = driven_bench(DeviceModel::Open, 1.0);
        // 200US frames 714 Hz .. 1785 Hz
        assert_eq!(apply_timebase(&mut scope, 1000.0).unwrap(), 16);
        assert!(!bench.history().iter().any(|c| c.starts_with("TDIV")));
        assert_eq!(apply_timebase(&mut scope, 100_000.0).unwrap(), 10);
        assert_eq!(bench.timebase_index(), 10);
        assert!(bench.history().contains(&"TDIV 2US".to_owned()));
    }
    #[test]
    fn timebase_follows_instrument_not_cache() {
        let (bench, mut scope) = driven_bench(DeviceModel::Open, 1.0);
        bench.set_timebase_index(0);
        assert_eq!(apply_timebase(&mut scope, 1000.0).unwrap(), 16);
        assert_eq!(bench.timebase_index(), 16);
    }
    #[test]
    fn unknown_readback_is_reported() {
        let mut scope = Oscilloscope::new(ScriptedChannel::new(["TDIV 3.00E-03S"]), &Timing::immediate());
        assert!(matches!(
            apply_timebase(&mut scope, 1000.0),
            Err(SweepError::UnknownTimebase { .. })
        ));
    }
    #[test]
    fn vertical_scale_converges_from_clipped_start() {
        let settings = AutoscaleSettings::default();
        let (bench, mut scope) = driven_bench(
            DeviceModel::Flat {
                gain: 1.0,
                phase_deg: 0.0,
            },
            5.0,
        );
        bench.set_volts_per_division(0, 0.05);
        let scale = converge_vertical_scale(&mut scope, Channel::One, &settings).unwrap();
        assert!(scale.attempts > 1);
        assert!(scale.attempts <= settings.max_iterations);
        assert!((1.0 - scale.applied / scale.candidate).abs() <= settings.tolerance);
        assert!((scale.candidate - 5.0 / 7.0).abs() < 0.01);
        assert!((bench.volts_per_division(0) - scale.applied).abs() < 1e-12);
    }
    #[test]
    fn vertical_scale_converges_from_coarse_start() {
        let settings = AutoscaleSettings::default();
        let (bench, mut scope) = driven_bench(DeviceModel::LowPass { cutoff_hz: 1000.0 }, 0.2);
        bench.set_volts_per_division(1, 2.0);
        let scale = converge_vertical_scale(&mut scope, Channel::Two, &settings).unwrap();
        assert!((1.0 - scale.applied / scale.candidate).abs() <= settings.tolerance);
        let expected = 0.2 * std::f64::consts::FRAC_1_SQRT_2 / 7.0;
        assert!((scale.candidate / expected - 1.0).abs() < 0.01);
    }
    #[test]
    fn dead_channel_hits_iteration_cap() {
        let settings = AutoscaleSettings {
            max_iterations: 5,
            ..Default::default()
        };
        let (bench, mut scope) = driven_bench(DeviceModel::Open, 1.0);
        let err = converge_vertical_scale(&mut scope, Channel::Two, &settings).unwrap_err();
        assert!(matches!(
            err,
            SweepError::Convergence {
                channel: Channel::Two,
                attempts: 5
            }
        ));
        let reads = bench
            .history()
            .iter()
            .filter(|c| c.as_str() == "C2:PAVA? PKPK")
            .count();
        assert_eq!(reads, 10);
    }
    #[test]
    fn settings_are_validated() {
        assert!(AutoscaleSettings::default().validate().is_ok());
        let bad = AutoscaleSettings {
            tolerance: 0.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad = AutoscaleSettings {
            initial_timebase_index: 99,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}

//! Frequency sweep state machine.
//!
//! ```text
//! Idle -> Initializing -> AwaitingConfirmation -> Stepping(0..n) -> Finalizing -> Done
//! ```
//!
//! `AwaitingConfirmation` is the operator checkpoint: the controller hands control back to
//! its caller and only resumes on [`SweepController::confirm`]. Cancellation is checked
//! between steps, never inside one.
use std::fmt;
use serde::{Deserialize, Serialize};
use crate::drivers::autoscale::{self, AutoscaleSettings};
use crate::drivers::channel::InstrumentChannel;
use crate::drivers::error::Stage;
use crate::drivers::instruments::{Channel, Generator, Oscilloscope};
use crate::drivers::measurement::{self, MeasurementSample};
use crate::drivers::metrics;
use crate::drivers::timebase::TIME_DIVISIONS;
use crate::drivers::SweepError;
/// Lowest frequency the generator can be programmed with at 0.01 Hz resolution.
const MIN_FREQUENCY_HZ: f64 = 0.01;
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub amplitude_vpp: f64,
    pub start_hz: f64,
    pub stop_hz: f64,
    pub points: usize,
}
impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            amplitude_vpp: 1.0,
            start_hz: 100.0,
            stop_hz: 100_000.0,
            points: 31,
        }
    }
}
impl SweepConfig {
    pub fn validate(&self) -> Result<(), SweepError> {
        if !(self.amplitude_vpp.is_finite() && self.amplitude_vpp > 0.0) {
            return Err(SweepError::InvalidConfig(format!(
                "amplitude must be a positive number of volts, got {}",
                self.amplitude_vpp
            )));
        }
        if !(self.start_hz.is_finite() && self.start_hz >= MIN_FREQUENCY_HZ) {
            return Err(SweepError::InvalidConfig(format!(
                "start frequency must be at least {MIN_FREQUENCY_HZ} Hz, got {}",
                self.start_hz
            )));
        }
        if !(self.stop_hz.is_finite() && self.stop_hz >= self.start_hz) {
            return Err(SweepError::InvalidConfig(format!(
                "stop frequency {} is below start frequency {}",
                self.stop_hz, self.start_hz
            )));
        }
        if self.points == 0 {
            return Err(SweepError::InvalidConfig("a sweep needs at least one point".into()));
        }
        Ok(())
    }
}
/// Geometrically spaced frequencies from `start_hz` to `stop_hz` inclusive, rounded to the
/// 0.01 Hz the generator is programmed with.
pub fn frequency_plan(start_hz: f64, stop_hz: f64, points: usize) -> Result<Vec<f64>, SweepError> {
    SweepConfig {
        amplitude_vpp: 1.0,
        start_hz,
        stop_hz,
        points,
    }
    .validate()?;
    if points == 1 {
        return Ok(vec![round_centi(start_hz)]);
    }
    let ratio = stop_hz / start_hz;
    let last = (points - 1) as f64;
    Ok((0..points)
        .map(|i| round_centi(start_hz * ratio.powf(i as f64 / last)))
        .collect())
}
fn round_centi(hz: f64) -> f64 {
    (hz * 100.0).round() / 100.0
}
pub fn frequency_label(hz: f64) -> String {
    format!("{hz:.2}")
}
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SweepState {
    Idle,
    Initializing,
    AwaitingConfirmation,
    Stepping(usize),
    Finalizing,
    Done,
}
impl fmt::Display for SweepState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SweepState::Idle => write!(f, "idle"),
            SweepState::Initializing => write!(f, "initializing"),
            SweepState::AwaitingConfirmation => write!(f, "awaiting confirmation"),
            SweepState::Stepping(i) => write!(f, "stepping ({i})"),
            SweepState::Finalizing => write!(f, "finalizing"),
            SweepState::Done => write!(f, "done"),
        }
    }
}
/// Outcome of one frequency step, phase already in the recorded (lagging negative) sign.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct StepRecord {
    pub index: usize,
    pub frequency_hz: f64,
    pub timebase_index: usize,
    pub channel1_vpp: f64,
    pub channel2_vpp: f64,
    pub phase_deg: f64,
}
/// One row of a finished sweep.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct SweepRecord {
    pub frequency_hz: f64,
    pub channel1_vpp: f64,
    pub channel2_vpp: f64,
    /// `+inf`/NaN when channel 1 read zero; see [`SweepResult::degenerate_steps`].
    pub magnitude_db: f64,
    pub phase_deg: f64,
}
impl SweepRecord {
    pub fn is_degenerate(&self) -> bool {
        !self.magnitude_db.is_finite()
    }
}
/// Collects raw samples while stepping. Only appends; magnitudes are computed in `finish`.
#[derive(Debug, Default)]
pub struct SweepResultBuilder {
    frequencies: Vec<f64>,
    channel1: Vec<f64>,
    channel2: Vec<f64>,
    phase: Vec<f64>,
}
impl SweepResultBuilder {
    pub fn with_capacity(points: usize) -> Self {
        Self {
            frequencies: Vec::with_capacity(points),
            channel1: Vec::with_capacity(points),
            channel2: Vec::with_capacity(points),
            phase: Vec::with_capacity(points),
        }
    }
    pub fn append(&mut self, frequency_hz: f64, sample: &MeasurementSample) {
        self.frequencies.push(frequency_hz);
        self.channel1.push(sample.channel1_vpp);
        self.channel2.push(sample.channel2_vpp);
        self.phase.push(metrics::recorded_phase(sample.phase_deg));
    }
    pub fn len(&self) -> usize {
        self.frequencies.len()
    }
    pub fn finish(self) -> SweepResult {
        let records: Vec<SweepRecord> = self
            .frequencies
            .iter()
            .zip(&self.channel1)
            .zip(&self.channel2)
            .zip(&self.phase)
            .map(|(((&frequency_hz, &c1), &c2), &phase_deg)| SweepRecord {
                frequency_hz,
                channel1_vpp: c1,
                channel2_vpp: c2,
                magnitude_db: metrics::magnitude_db(c1, c2),
                phase_deg,
            })
            .collect();
        for (i, record) in records.iter().enumerate().filter(|(_, r)| r.is_degenerate()) {
            log::warn!(
                "step {i} ({:.2} Hz): channel 1 read {} Vpp, magnitude is {}",
                record.frequency_hz,
                record.channel1_vpp,
                record.magnitude_db
            );
        }
        let frequency_labels = self.frequencies.iter().map(|&f| frequency_label(f)).collect();
        SweepResult {
            records,
            frequency_labels,
        }
    }
}
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SweepResult {
    records: Vec<SweepRecord>,
    frequency_labels: Vec<String>,
}
impl SweepResult {
    pub fn records(&self) -> &[SweepRecord] {
        &self.records
    }
    /// Frequencies as programmed on the generator, e.g. `"3162.28"`.
    pub fn frequency_labels(&self) -> &[String] {
        &self.frequency_labels
    }
    pub fn len(&self) -> usize {
        self.records.len()
    }
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
    pub fn frequencies(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.frequency_hz).collect()
    }
    pub fn magnitudes_db(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.magnitude_db).collect()
    }
    pub fn phases_deg(&self) -> Vec<f64> {
        self.records.iter().map(|r| r.phase_deg).collect()
    }
    /// Indices of steps whose magnitude is not a finite number.
    pub fn degenerate_steps(&self) -> Vec<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_degenerate())
            .map(|(i, _)| i)
            .collect()
    }
}
/// Drives one sweep over exclusively borrowed instruments.
pub struct SweepController<'a, G: InstrumentChannel, S: InstrumentChannel> {
    generator: &'a mut Generator<G>,
    scope: &'a mut Oscilloscope<S>,
    config: SweepConfig,
    settings: AutoscaleSettings,
    frequencies: Vec<f64>,
    state: SweepState,
    builder: SweepResultBuilder,
}
impl<'a, G: InstrumentChannel, S: InstrumentChannel> SweepController<'a, G, S> {
    pub fn new(
        generator: &'a mut Generator<G>,
        scope: &'a mut Oscilloscope<S>,
        config: SweepConfig,
        settings: AutoscaleSettings,
    ) -> Result<Self, SweepError> {
        config.validate()?;
        settings.validate()?;
        let frequencies = frequency_plan(config.start_hz, config.stop_hz, config.points)?;
        Ok(Self {
            generator,
            scope,
            config,
            settings,
            builder: SweepResultBuilder::with_capacity(frequencies.len()),
            frequencies,
            state: SweepState::Idle,
        })
    }
    pub fn state(&self) -> SweepState {
        self.state
    }
    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }
    /// Steps recorded so far.
    pub fn completed(&self) -> usize {
        self.builder.len()
    }
    fn expect_state(&self, expected: &'static str, ok: bool) -> Result<(), SweepError> {
        if ok {
            Ok(())
        } else {
            Err(SweepError::InvalidState {
                expected,
                actual: self.state.to_string(),
            })
        }
    }
    /// Enables outputs and statistics, couples the generator outputs and programs the first
    /// point, then stops at the operator checkpoint.
    pub fn initialize(&mut self) -> Result<(), SweepError> {
        self.expect_state("idle", self.state == SweepState::Idle)?;
        self.state = SweepState::Initializing;
        log::info!(
            "sweep {:.2} Hz .. {:.2} Hz, {} points at {} Vpp",
            self.config.start_hz,
            self.config.stop_hz,
            self.frequencies.len(),
            self.config.amplitude_vpp
        );
        self.generator.outputs_on()?;
        self.scope.register_statistics()?;
        self.generator.couple_outputs()?;
        self.generator
            .set_amplitude(Channel::One, self.config.amplitude_vpp)?;
        self.generator.set_frequency(Channel::One, self.frequencies[0])?;
        self.state = SweepState::AwaitingConfirmation;
        Ok(())
    }
    /// Operator accepted the scope framing; stepping may begin.
    pub fn confirm(&mut self) -> Result<(), SweepError> {
        self.expect_state(
            "awaiting confirmation",
            self.state == SweepState::AwaitingConfirmation,
        )?;
        self.state = SweepState::Stepping(0);
        Ok(())
    }
    /// Runs the next frequency step. Returns `None` once every step is done.
    pub fn step(&mut self) -> Result<Option<StepRecord>, SweepError> {
        let index = match self.state {
            SweepState::Stepping(index) => index,
            SweepState::Finalizing => return Ok(None),
            _ => return self.expect_state("stepping", false).map(|_| None),
        };
        let frequency_hz = self.frequencies[index];
        let record = self.measure_step(index, frequency_hz)?;
        self.state = if index + 1 < self.frequencies.len() {
            SweepState::Stepping(index + 1)
        } else {
            SweepState::Finalizing
        };
        log::info!(
            "step {}/{} at {:.2} Hz: C1 {:.4} Vpp, C2 {:.4} Vpp, phase {:.2} deg",
            index + 1,
            self.frequencies.len(),
            frequency_hz,
            record.channel1_vpp,
            record.channel2_vpp,
            record.phase_deg
        );
        Ok(Some(record))
    }
    fn measure_step(&mut self, index: usize, frequency_hz: f64) -> Result<StepRecord, SweepError> {
        let at = move |stage: Stage| move |e: SweepError| e.at_step(index, frequency_hz, stage);
        self.generator
            .set_frequency(Channel::One, frequency_hz)
            .map_err(at(Stage::Frequency))?;
        let timebase_index =
            autoscale::apply_timebase(self.scope, frequency_hz).map_err(at(Stage::Timebase))?;
        for input in Channel::ALL {
            let scale = autoscale::converge_vertical_scale(self.scope, input, &self.settings)
                .map_err(at(Stage::VerticalScale(input)))?;
            log::debug!(
                "{input} settled at {:.4e} V/div after {} rounds",
                scale.applied,
                scale.attempts
            );
        }
        let sample =
            measurement::read_settled_measurement(self.scope).map_err(at(Stage::Measurement))?;
        self.builder.append(frequency_hz, &sample);
        log::debug!(
            "step {index}: time division {}",
            TIME_DIVISIONS[timebase_index].label
        );
        Ok(StepRecord {
            index,
            frequency_hz,
            timebase_index,
            channel1_vpp: sample.channel1_vpp,
            channel2_vpp: sample.channel2_vpp,
            phase_deg: metrics::recorded_phase(sample.phase_deg),
        })
    }
    /// Computes magnitudes over the collected steps. No instrument I/O.
    pub fn finish(&mut self) -> Result<SweepResult, SweepError> {
        self.expect_state("finalizing", self.state == SweepState::Finalizing)?;
        let result = std::mem::take(&mut self.builder).finish();
        self.state = SweepState::Done;
        log::info!("sweep done, {} points", result.len());
        Ok(result)
    }
    /// Runs the whole sweep. `confirm` is asked once at the checkpoint; `keep_going` is polled
    /// before every step.
    pub fn run<F, K>(&mut self, confirm: F, mut keep_going: K) -> Result<SweepResult, SweepError>
    where
        F: FnOnce(&SweepConfig) -> bool,
        K: FnMut() -> bool,
    {
        self.initialize()?;
        if !confirm(&self.config) {
            return Err(SweepError::ConfirmationDeclined);
        }
        self.confirm()?;
        while let SweepState::Stepping(_) = self.state {
            if !keep_going() {
                log::info!("sweep cancelled after {} steps", self.completed());
                return Err(SweepError::Cancelled {
                    completed: self.completed(),
                });
            }
            self.step()?;
        }
        self.finish()
    }
}
/// Sweeps with the checkpoint confirmed up front and no cancellation.
pub fn run_sweep<G: InstrumentChannel, S: InstrumentChannel>(
    generator: &mut Generator<G>,
    scope: &mut Oscilloscope<S>,
    config: SweepConfig,
    settings: AutoscaleSettings,
) -> Result<SweepResult, SweepError> {
    SweepController::new(generator, scope, config, settings)?.run(|_| true, || true)
}

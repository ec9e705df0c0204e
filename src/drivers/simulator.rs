//! Software stand-in for the generator/oscilloscope pair.
//!
//! Both instruments share one bench state so the scope sees whatever the generator drives
//! through the device under test. The scope shows 8 vertical divisions: amplitudes beyond the
//! screen read back clipped at the screen height and every reading is quantised to an 8-bit
//! step of the current scale, so a badly chosen scale biases the reading the same way it
//! does on real hardware.
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use crate::drivers::channel::InstrumentChannel;
use crate::drivers::timebase::{self, TIME_DIVISIONS};
use crate::drivers::SweepError;
const SCREEN_DIVISIONS: f64 = 8.0;
const ADC_LEVELS: f64 = 256.0;
const MIN_VOLTS_PER_DIV: f64 = 500e-6;
const MAX_VOLTS_PER_DIV: f64 = 10.0;
const STATISTIC_COUNT: u64 = 100;
/// Transfer function of the simulated device under test.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceModel {
    /// Same gain and phase at every frequency.
    Flat { gain: f64, phase_deg: f64 },
    /// First-order RC low-pass.
    LowPass { cutoff_hz: f64 },
    /// Nothing connected to the scope's second input.
    Open,
}
impl DeviceModel {
    pub fn validate(&self) -> Result<(), SweepError> {
        let ok = match *self {
            DeviceModel::Flat { gain, phase_deg } => gain.is_finite() && gain >= 0.0 && phase_deg.is_finite(),
            DeviceModel::LowPass { cutoff_hz } => cutoff_hz.is_finite() && cutoff_hz > 0.0,
            DeviceModel::Open => true,
        };
        if ok {
            Ok(())
        } else {
            Err(SweepError::InvalidConfig(format!("bad simulated device {self:?}")))
        }
    }
    /// Gain (V/V) and phase (degrees, lagging negative) at `frequency_hz`.
    pub fn response(&self, frequency_hz: f64) -> (f64, f64) {
        match *self {
            DeviceModel::Flat { gain, phase_deg } => (gain, phase_deg),
            DeviceModel::LowPass { cutoff_hz } => {
                let ratio = frequency_hz / cutoff_hz;
                (1.0 / (1.0 + ratio * ratio).sqrt(), -ratio.atan().to_degrees())
            }
            DeviceModel::Open => (0.0, 0.0),
        }
    }
}
#[derive(Clone, Copy, Debug, PartialEq)]
enum Parameter {
    PeakToPeak(usize),
    Frequency,
    Phase,
}
struct Fault {
    command: String,
    occurrence: usize,
    /// `None` drops the link instead of answering.
    response: Option<String>,
}
struct BenchState {
    model: DeviceModel,
    outputs: [bool; 2],
    amplitude_vpp: f64,
    frequency_hz: f64,
    tracking: bool,
    traces: [bool; 2],
    timebase_index: usize,
    volts_per_div: [f64; 2],
    registered: Vec<Parameter>,
    statistics: bool,
    noise: f64,
    rng: StdRng,
    faults: Vec<Fault>,
    query_counts: HashMap<String, usize>,
    history: Vec<String>,
}
/// Shared state of a simulated bench; hand out the two instruments with
/// [`SimulatedBench::generator`] and [`SimulatedBench::scope`].
#[derive(Clone)]
pub struct SimulatedBench {
    state: Arc<Mutex<BenchState>>,
}
impl SimulatedBench {
    pub fn new(model: DeviceModel) -> Self {
        Self {
            state: Arc::new(Mutex::new(BenchState {
                model,
                outputs: [false; 2],
                amplitude_vpp: 1.0,
                frequency_hz: 1000.0,
                tracking: false,
                traces: [true; 2],
                timebase_index: 16,
                volts_per_div: [1.0; 2],
                registered: Vec::new(),
                statistics: false,
                noise: 0.0,
                rng: StdRng::seed_from_u64(0),
                faults: Vec::new(),
                query_counts: HashMap::new(),
                history: Vec::new(),
            })),
        }
    }
    /// Adds uniform relative noise of at most `noise` to every reading.
    pub fn with_noise(self, noise: f64, seed: u64) -> Self {
        {
            let mut state = self.lock();
            state.noise = noise.max(0.0);
            state.rng = StdRng::seed_from_u64(seed);
        }
        self
    }
    /// Every command and query received so far, in order.
    pub fn history(&self) -> Vec<String> {
        self.lock().history.clone()
    }
    pub fn generator(&self) -> SimulatedGenerator {
        SimulatedGenerator {
            bench: self.clone(),
        }
    }
    pub fn scope(&self) -> SimulatedScope {
        SimulatedScope {
            bench: self.clone(),
        }
    }
    fn lock(&self) -> MutexGuard<'_, BenchState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
#[cfg(test)]
impl SimulatedBench {
    /// Replaces the `occurrence`-th (0-based) response to `command` with `response`.
    pub fn fail_query(&self, command: &str, occurrence: usize, response: &str) {
        self.lock().faults.push(Fault {
            command: command.to_owned(),
            occurrence,
            response: Some(response.to_owned()),
        });
    }
    /// Makes the `occurrence`-th (0-based) query of `command` fail as a lost link.
    pub fn drop_query(&self, command: &str, occurrence: usize) {
        self.lock().faults.push(Fault {
            command: command.to_owned(),
            occurrence,
            response: None,
        });
    }
    pub fn set_volts_per_division(&self, input: usize, volts: f64) {
        self.lock().volts_per_div[input] = volts.clamp(MIN_VOLTS_PER_DIV, MAX_VOLTS_PER_DIV);
    }
    pub fn set_timebase_index(&self, index: usize) {
        self.lock().timebase_index = index.min(TIME_DIVISIONS.len() - 1);
    }
    pub fn timebase_index(&self) -> usize {
        self.lock().timebase_index
    }
    pub fn volts_per_division(&self, input: usize) -> f64 {
        self.lock().volts_per_div[input]
    }
    pub fn outputs(&self) -> [bool; 2] {
        self.lock().outputs
    }
    pub fn tracking(&self) -> bool {
        self.lock().tracking
    }
}
fn no_response(command: &str) -> SweepError {
    SweepError::transport(
        command,
        io::Error::new(io::ErrorKind::TimedOut, "simulated instrument did not answer"),
    )
}
fn lost_link(command: &str) -> SweepError {
    SweepError::transport(
        command,
        io::Error::new(io::ErrorKind::ConnectionReset, "simulated link dropped"),
    )
}
/// Formats like the instrument does: `5.09E+00`.
fn nr3(value: f64) -> String {
    let formatted = format!("{value:.2E}");
    match formatted.split_once('E') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            format!("{mantissa}E{exponent:+03}")
        }
        None => formatted,
    }
}
fn split_command(command: &str) -> (String, &str) {
    let command = command.trim().trim_start_matches(':');
    let (head, argument) = command.split_once(' ').unwrap_or((command, ""));
    (head.to_ascii_uppercase(), argument.trim())
}
impl BenchState {
    fn record(&mut self, command: &str) {
        log::trace!("simulator <- {command}");
        self.history.push(command.to_owned());
    }
    fn injected(&mut self, command: &str) -> Option<Result<String, SweepError>> {
        let count = self.query_counts.entry(command.to_owned()).or_insert(0);
        let occurrence = *count;
        *count += 1;
        self.faults
            .iter()
            .find(|f| f.command == command && f.occurrence == occurrence)
            .map(|f| f.response.clone().ok_or_else(|| lost_link(command)))
    }
    fn jitter(&mut self) -> f64 {
        if self.noise > 0.0 {
            self.rng.gen_range(-1.0..1.0) * self.noise
        } else {
            0.0
        }
    }
    fn true_amplitude(&self, input: usize) -> f64 {
        let driven = if self.outputs[0] { self.amplitude_vpp } else { 0.0 };
        match input {
            0 => driven,
            _ => driven * self.model.response(self.frequency_hz).0,
        }
    }
    /// What the scope measures on `input` at its current vertical scale.
    fn observed_amplitude(&mut self, input: usize) -> f64 {
        let screen = self.volts_per_div[input] * SCREEN_DIVISIONS;
        let clipped = self.true_amplitude(input).min(screen);
        let step = screen / ADC_LEVELS;
        (clipped / step).round() * step
    }
    fn phase_reading(&self) -> Option<f64> {
        if self.true_amplitude(0) <= 0.0 || self.true_amplitude(1) <= 0.0 {
            return None;
        }
        // C1-C2 phase: the input leads the output by the lag of the device.
        Some(-self.model.response(self.frequency_hz).1)
    }
    fn statistic_response(&mut self, slot: usize) -> String {
        let Some(&parameter) = self.registered.get(slot.wrapping_sub(1)) else {
            return format!("PAVA STAT{slot} OFF");
        };
        if !self.statistics {
            return format!("PAVA STAT{slot} OFF");
        }
        let (header, value, unit) = match parameter {
            Parameter::PeakToPeak(input) => {
                if !self.traces[input] {
                    return format!("PAVA STAT{slot} C{} PKPK:cur,****", input + 1);
                }
                let value = self.observed_amplitude(input);
                (format!("C{} PKPK", input + 1), value, "V")
            }
            Parameter::Frequency => ("C1 FREQ".to_owned(), self.frequency_hz, "Hz"),
            Parameter::Phase => match self.phase_reading() {
                Some(phase) => ("C1-C2 PHA".to_owned(), phase, "degree"),
                None => {
                    return format!(
                        "PAVA STAT{slot} C1-C2 PHA:cur,****,mean,****,min,****,max,****,std-dev,****,count,0"
                    )
                }
            },
        };
        let spread = self.noise;
        let current = value * (1.0 + self.jitter());
        let mean = value * (1.0 + self.jitter() / 10.0);
        let fmt = |v: f64| match unit {
            "degree" => format!("{v:.2}{unit}"),
            _ => format!("{}{unit}", nr3(v)),
        };
        format!(
            "PAVA STAT{slot} {header}:cur,{},mean,{},min,{},max,{},std-dev,{},count,{STATISTIC_COUNT}",
            fmt(current),
            fmt(mean),
            fmt(value * (1.0 - spread)),
            fmt(value * (1.0 + spread)),
            fmt((value * spread / 2.0).abs()),
        )
    }
    fn register(&mut self, argument: &str) {
        let parameter = match argument.to_ascii_uppercase().replace(' ', "").as_str() {
            "PKPK,C1" => Parameter::PeakToPeak(0),
            "PKPK,C2" => Parameter::PeakToPeak(1),
            "FREQ,C1" => Parameter::Frequency,
            "PHA,C1-C2" => Parameter::Phase,
            other => {
                log::warn!("simulator: unsupported statistic parameter {other:?}");
                return;
            }
        };
        self.registered.push(parameter);
    }
}
/// Generator half of a [`SimulatedBench`].
pub struct SimulatedGenerator {
    bench: SimulatedBench,
}
impl InstrumentChannel for SimulatedGenerator {
    fn send(&mut self, command: &str) -> Result<(), SweepError> {
        let mut state = self.bench.lock();
        state.record(command);
        let (head, argument) = split_command(command);
        let value = argument.parse::<f64>().ok();
        match (head.as_str(), value) {
            ("OUTP1", _) => state.outputs[0] = argument.eq_ignore_ascii_case("ON"),
            ("OUTP2", _) => state.outputs[1] = argument.eq_ignore_ascii_case("ON"),
            ("SOUR1:VOLT", Some(v)) => state.amplitude_vpp = v.max(0.0),
            ("SOUR1:FREQ", Some(v)) => state.frequency_hz = v,
            ("SOUR1:TRACK", _) => state.tracking = argument.eq_ignore_ascii_case("ON"),
            ("SOUR1:PHAS:INIT", _) | ("SOUR2:PHAS:SYNC", _) => {}
            (h, _) if h.starts_with("SOUR2:") || h.ends_with(":PHAS") => {}
            _ => log::warn!("simulated generator ignored {command:?}"),
        }
        Ok(())
    }
    fn query(&mut self, command: &str) -> Result<String, SweepError> {
        let mut state = self.bench.lock();
        state.record(command);
        if let Some(response) = state.injected(command) {
            return response;
        }
        match command.trim() {
            "*IDN?" => Ok("SIMULATED,SDG-SIM,0000000001,1.0".to_owned()),
            _ => Err(no_response(command)),
        }
    }
}
/// Oscilloscope half of a [`SimulatedBench`].
pub struct SimulatedScope {
    bench: SimulatedBench,
}
impl InstrumentChannel for SimulatedScope {
    fn send(&mut self, command: &str) -> Result<(), SweepError> {
        let mut state = self.bench.lock();
        state.record(command);
        let (head, argument) = split_command(command);
        match head.as_str() {
            "C1:TRA" => state.traces[0] = argument.eq_ignore_ascii_case("ON"),
            "C2:TRA" => state.traces[1] = argument.eq_ignore_ascii_case("ON"),
            "TDIV" | "TIME_DIV" => match timebase::index_of_label(argument) {
                Some(index) => state.timebase_index = index,
                None => log::warn!("simulated scope rejected time division {argument:?}"),
            },
            "C1:VDIV" | "C2:VDIV" => {
                let input = if head.starts_with("C1") { 0 } else { 1 };
                match argument.parse::<f64>() {
                    Ok(v) if v.is_finite() => {
                        state.volts_per_div[input] = v.clamp(MIN_VOLTS_PER_DIV, MAX_VOLTS_PER_DIV)
                    }
                    _ => log::warn!("simulated scope rejected vertical scale {argument:?}"),
                }
            }
            "PACU" | "MEAD" => state.register(argument),
            "PASTAT" => state.statistics = argument.eq_ignore_ascii_case("ON"),
            _ => log::warn!("simulated scope ignored {command:?}"),
        }
        Ok(())
    }
    fn query(&mut self, command: &str) -> Result<String, SweepError> {
        let mut state = self.bench.lock();
        state.record(command);
        if let Some(response) = state.injected(command) {
            return response;
        }
        let command = command.trim();
        if command == "*IDN?" {
            return Ok("SIMULATED,SDS-SIM,0000000002,1.0".to_owned());
        }
        if command.eq_ignore_ascii_case("TIME_DIV?") || command.eq_ignore_ascii_case("TDIV?") {
            let seconds = TIME_DIVISIONS[state.timebase_index].seconds;
            return Ok(format!("TDIV {}S", nr3(seconds)));
        }
        if let Some(slot) = command.strip_prefix("PAVA? STAT") {
            let slot = slot.trim().parse::<usize>().map_err(|_| no_response(command))?;
            return Ok(state.statistic_response(slot));
        }
        for (input, prefix) in ["C1", "C2"].into_iter().enumerate() {
            if command.eq_ignore_ascii_case(&format!("{prefix}:PAVA? PKPK")) {
                if !state.traces[input] {
                    return Ok(format!("{prefix}:PAVA PKPK,****"));
                }
                let jitter = state.jitter();
                let value = state.observed_amplitude(input) * (1.0 + jitter);
                return Ok(format!("{prefix}:PAVA PKPK,{}V", nr3(value)));
            }
        }
        Err(no_response(command))
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn formats_like_the_instrument() {
        assert_eq!(nr3(5.09), "5.09E+00");
        assert_eq!(nr3(1e-3), "1.00E-03");
        assert_eq!(nr3(12345.0), "1.23E+04");
    }
    #[test]
    fn low_pass_model_is_3db_down_at_cutoff() {
        let (gain, phase) = DeviceModel::LowPass { cutoff_hz: 1000.0 }.response(1000.0);
        assert!((gain - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-12);
        assert!((phase + 45.0).abs() < 1e-9);
    }
    #[test]
    fn scope_reads_clipped_amplitude_until_rescaled() {
        let bench = SimulatedBench::new(DeviceModel::Flat {
            gain: 1.0,
            phase_deg: 0.0,
        });
        let mut generator = bench.generator();
        let mut scope = bench.scope();
        generator.send("OUTP1 ON").unwrap();
        generator.send(":SOUR1:VOLT 5").unwrap();
        scope.send("C1:VDIV 0.1").unwrap();
        assert_eq!(scope.query("C1:PAVA? PKPK").unwrap(), "C1:PAVA PKPK,8.00E-01V");
        scope.send("C1:VDIV 1").unwrap();
        assert_eq!(scope.query("C1:PAVA? PKPK").unwrap(), "C1:PAVA PKPK,5.00E+00V");
        assert_eq!(scope.query("TIME_DIV?").unwrap(), "TDIV 2.00E-04S");
        scope.send("TDIV 1MS").unwrap();
        assert_eq!(bench.timebase_index(), 18);
    }
    #[test]
    fn statistics_need_registration() {
        let bench = SimulatedBench::new(DeviceModel::Flat {
            gain: 0.5,
            phase_deg: -45.0,
        });
        let mut generator = bench.generator();
        let mut scope = bench.scope();
        generator.send("OUTP1 ON").unwrap();
        assert_eq!(scope.query("PAVA? STAT1").unwrap(), "PAVA STAT1 OFF");
        scope.send("PACU PKPK,C1").unwrap();
        scope.send("PACU PKPK,C2").unwrap();
        scope.send("PACU FREQ,C1").unwrap();
        scope.send("MEAD PHA,C1-C2").unwrap();
        scope.send("PASTAT ON").unwrap();
        let phase = scope.query("PAVA? STAT4").unwrap();
        assert!(phase.starts_with("PAVA STAT4 C1-C2 PHA:cur,45.00degree,mean,45.00degree"));
        let frequency = scope.query("PAVA? STAT3").unwrap();
        assert!(frequency.contains("mean,1.00E+03Hz"));
    }
    #[test]
    fn injected_faults_replace_one_response() {
        let bench = SimulatedBench::new(DeviceModel::Open);
        let mut scope = bench.scope();
        bench.fail_query("TIME_DIV?", 1, "garbage");
        assert_eq!(scope.query("TIME_DIV?").unwrap(), "TDIV 2.00E-04S");
        assert_eq!(scope.query("TIME_DIV?").unwrap(), "garbage");
        assert_eq!(scope.query("TIME_DIV?").unwrap(), "TDIV 2.00E-04S");
        assert!(scope.query("BOGUS?").is_err());
    }
}

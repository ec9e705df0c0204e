//! Command vocabulary of the function generator and the oscilloscope.
use std::fmt;
use std::thread::sleep;
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::drivers::channel::{InstrumentChannel, Timing};
use crate::drivers::decode::{self, StatisticReport};
use crate::drivers::timebase::{self, TIME_DIVISIONS};
use crate::drivers::SweepError;
/// Generator output / oscilloscope input. Output N drives input N on the bench.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Channel {
    One,
    Two,
}
impl Channel {
    pub const ALL: [Channel; 2] = [Channel::One, Channel::Two];
    pub fn number(self) -> u8 {
        match self {
            Channel::One => 1,
            Channel::Two => 2,
        }
    }
}
impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "C{}", self.number())
    }
}
/// Statistic slots, in the order `register_statistics` assigns them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatisticSlot {
    PeakToPeak1 = 1,
    PeakToPeak2 = 2,
    // registered for the scope's own display, never read back
    #[allow(dead_code)]
    Frequency1 = 3,
    Phase12 = 4,
}
impl StatisticSlot {
    pub fn peak_to_peak(channel: Channel) -> Self {
        match channel {
            Channel::One => StatisticSlot::PeakToPeak1,
            Channel::Two => StatisticSlot::PeakToPeak2,
        }
    }
}
/// Sleeps for the waits the procedure needs on top of the per-command settle delay.
#[derive(Clone, Copy, Debug)]
pub struct Pacing {
    dwell: Duration,
    statistics_window: Duration,
}
impl Pacing {
    pub fn new(timing: &Timing) -> Self {
        Self {
            dwell: timing.dwell(),
            statistics_window: timing.statistics_window(),
        }
    }
    pub fn dwell(&self) {
        pause(self.dwell)
    }
    pub fn statistics_window(&self) {
        pause(self.statistics_window)
    }
}
fn pause(duration: Duration) {
    if !duration.is_zero() {
        sleep(duration);
    }
}
fn on_off(on: bool) -> &'static str {
    if on {
        "ON"
    } else {
        "OFF"
    }
}
/// Two-output arbitrary function generator.
pub struct Generator<C: InstrumentChannel> {
    channel: C,
    pacing: Pacing,
}
impl<C: InstrumentChannel> Generator<C> {
    pub fn new(channel: C, timing: &Timing) -> Self {
        Self {
            channel,
            pacing: Pacing::new(timing),
        }
    }
    pub fn identify(&mut self) -> Result<String, SweepError> {
        self.channel.query("*IDN?")
    }
    pub fn set_output(&mut self, output: Channel, on: bool) -> Result<(), SweepError> {
        self.channel
            .send(&format!("OUTP{} {}", output.number(), on_off(on)))
    }
    /// Turns both outputs on, one after the other.
    pub fn outputs_on(&mut self) -> Result<(), SweepError> {
        self.set_output(Channel::One, true)?;
        self.pacing.dwell();
        self.set_output(Channel::Two, true)
    }
    pub fn outputs_off(&mut self) -> Result<(), SweepError> {
        self.set_output(Channel::One, false)?;
        self.pacing.dwell();
        self.set_output(Channel::Two, false)
    }
    pub fn set_amplitude(&mut self, output: Channel, volts_pp: f64) -> Result<(), SweepError> {
        self.channel
            .send(&format!(":SOUR{}:VOLT {}", output.number(), volts_pp))
    }
    pub fn set_frequency(&mut self, output: Channel, hz: f64) -> Result<(), SweepError> {
        self.channel
            .send(&format!(":SOUR{}:FREQ {:.2}", output.number(), hz))
    }
    // sweeps rely on `couple_outputs` for phase alignment
    #[allow(dead_code)]
    pub fn set_phase(&mut self, output: Channel, degrees: f64) -> Result<(), SweepError> {
        self.channel
            .send(&format!(":SOUR{}:PHAS {}", output.number(), degrees))
    }
    /// Makes output 2 track output 1 and synchronises their phase.
    pub fn couple_outputs(&mut self) -> Result<(), SweepError> {
        self.channel.send(":SOUR1:TRACK ON")?;
        self.channel.send(":SOUR1:PHAS:INIT")?;
        self.channel.send(":SOUR2:PHAS:SYNC")
    }
    /// Blinks each output so the operator can see the link works.
    pub fn verify(&mut self) -> Result<(), SweepError> {
        for output in Channel::ALL {
            self.set_output(output, true)?;
            self.pacing.dwell();
            self.set_output(output, false)?;
        }
        Ok(())
    }
}
/// Two-channel digital storage oscilloscope.
pub struct Oscilloscope<C: InstrumentChannel> {
    channel: C,
    pacing: Pacing,
}
impl<C: InstrumentChannel> Oscilloscope<C> {
    pub fn new(channel: C, timing: &Timing) -> Self {
        Self {
            channel,
            pacing: Pacing::new(timing),
        }
    }
    pub fn pacing(&self) -> &Pacing {
        &self.pacing
    }
    pub fn identify(&mut self) -> Result<String, SweepError> {
        self.channel.query("*IDN?")
    }
    pub fn set_trace(&mut self, input: Channel, on: bool) -> Result<(), SweepError> {
        self.channel.send(&format!("{input}:TRA {}", on_off(on)))
    }
    pub fn traces_on(&mut self) -> Result<(), SweepError> {
        self.set_trace(Channel::One, true)?;
        self.pacing.dwell();
        self.set_trace(Channel::Two, true)
    }
    pub fn traces_off(&mut self) -> Result<(), SweepError> {
        self.set_trace(Channel::One, false)?;
        self.pacing.dwell();
        self.set_trace(Channel::Two, false)
    }
    pub fn verify(&mut self) -> Result<(), SweepError> {
        for input in Channel::ALL {
            self.set_trace(input, true)?;
            self.pacing.dwell();
            self.set_trace(input, false)?;
        }
        Ok(())
    }
    /// Current time division, as reported by the instrument.
    pub fn timebase_index(&mut self) -> Result<usize, SweepError> {
        const COMMAND: &str = "TIME_DIV?";
        let response = self.channel.query(COMMAND)?;
        let seconds = decode::time_division_seconds(COMMAND, &response)?;
        timebase::resolve_seconds(seconds)
    }
    pub fn set_timebase(&mut self, index: usize) -> Result<(), SweepError> {
        let division = timebase::time_division(index)
            .ok_or_else(|| SweepError::InvalidConfig(format!(
                "time division index {index} outside 0..{}",
                TIME_DIVISIONS.len()
            )))?;
        self.channel.send(&format!("TDIV {}", division.label))
    }
    pub fn peak_to_peak(&mut self, input: Channel) -> Result<f64, SweepError> {
        let command = format!("{input}:PAVA? PKPK");
        let response = self.channel.query(&command)?;
        decode::parameter_value(&command, &response)
    }
    pub fn set_volts_per_division(&mut self, input: Channel, volts: f64) -> Result<(), SweepError> {
        self.channel.send(&format!("{input}:VDIV {volts}"))
    }
    /// Registers the four parameters read back through `statistic`.
    pub fn register_statistics(&mut self) -> Result<(), SweepError> {
        self.channel.send("PACU PKPK,C1")?;
        self.channel.send("PACU PKPK,C2")?;
        self.channel.send("PACU FREQ,C1")?;
        self.channel.send("MEAD PHA,C1-C2")
    }
    /// Restarts statistics accumulation.
    pub fn enable_statistics(&mut self) -> Result<(), SweepError> {
        self.channel.send("PASTAT ON")
    }
    pub fn statistic(&mut self, slot: StatisticSlot) -> Result<StatisticReport, SweepError> {
        let command = format!("PAVA? STAT{}", slot as u8);
        let response = self.channel.query(&command)?;
        decode::statistic(&command, &response)
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::channel::ScriptedChannel;
    #[test]
    fn generator_vocabulary() {
        let mut generator = Generator::new(ScriptedChannel::default(), &Timing::immediate());
        generator.outputs_on().unwrap();
        generator.couple_outputs().unwrap();
        generator.set_amplitude(Channel::One, 2.5).unwrap();
        generator.set_frequency(Channel::One, 3162.2776).unwrap();
        generator.set_phase(Channel::Two, 90.0).unwrap();
        assert_eq!(
            generator.channel.sent,
            vec![
                "OUTP1 ON",
                "OUTP2 ON",
                ":SOUR1:TRACK ON",
                ":SOUR1:PHAS:INIT",
                ":SOUR2:PHAS:SYNC",
                ":SOUR1:VOLT 2.5",
                ":SOUR1:FREQ 3162.28",
                ":SOUR2:PHAS 90",
            ]
        );
    }
    #[test]
    fn oscilloscope_vocabulary() {
        let channel = ScriptedChannel::new([
            "TDIV 5.00E-04S",
            "C2:PAVA PKPK,1.25E+00V",
            "PAVA STAT4 C1-C2 PHA:cur,45.0degree,mean,44.9degree,min,44.0degree,max,46.0degree,std-dev,0.3degree,count,40",
        ]);
        let mut scope = Oscilloscope::new(channel, &Timing::immediate());
        assert_eq!(scope.timebase_index().unwrap(), 17);
        scope.set_timebase(18).unwrap();
        assert_eq!(scope.peak_to_peak(Channel::Two).unwrap(), 1.25);
        scope.set_volts_per_division(Channel::Two, 0.25).unwrap();
        assert_eq!(scope.statistic(StatisticSlot::Phase12).unwrap().mean, 44.9);
        assert!(scope.set_timebase(TIME_DIVISIONS.len()).is_err());
        assert_eq!(
            scope.channel.sent,
            vec![
                "TIME_DIV?",
                "TDIV 1MS",
                "C2:PAVA? PKPK",
                "C2:VDIV 0.25",
                "PAVA? STAT4",
            ]
        );
    }
}

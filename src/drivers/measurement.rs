use serde::Serialize;
use crate::drivers::channel::InstrumentChannel;
use crate::drivers::instruments::{Channel, Oscilloscope, StatisticSlot};
use crate::drivers::SweepError;
/// Settled means for one frequency step.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct MeasurementSample {
    pub channel1_vpp: f64,
    pub channel2_vpp: f64,
    /// C1-C2 phase as reported by the scope.
    pub phase_deg: f64,
}
/// Restarts statistics, waits for the accumulation window and reads back the means.
///
/// Expects `register_statistics` to have run on this scope beforehand.
pub fn read_settled_measurement<C: InstrumentChannel>(
    scope: &mut Oscilloscope<C>,
) -> Result<MeasurementSample, SweepError> {
    scope.enable_statistics()?;
    scope.pacing().statistics_window();
    let channel1 = scope.statistic(StatisticSlot::peak_to_peak(Channel::One))?;
    let channel2 = scope.statistic(StatisticSlot::peak_to_peak(Channel::Two))?;
    let phase = scope.statistic(StatisticSlot::Phase12)?;
    log::debug!(
        "settled: C1 {:.4} V (n={:?}), C2 {:.4} V (n={:?}), phase {:.2} deg",
        channel1.mean,
        channel1.count,
        channel2.mean,
        channel2.count,
        phase.mean
    );
    Ok(MeasurementSample {
        channel1_vpp: channel1.mean,
        channel2_vpp: channel2.mean,
        phase_deg: phase.mean,
    })
}

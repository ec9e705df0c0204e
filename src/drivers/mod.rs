// src/drivers/mod.rs
// Measurement core: instrument links, autoscale and the sweep state machine.
pub mod autoscale;
pub mod channel;
pub mod decode;
pub mod error;
pub mod instruments;
pub mod measurement;
pub mod metrics;
pub mod plot;
pub mod simulator;
pub mod sweep;
pub mod timebase;
// Re-exports used by the application layer.
pub use autoscale::AutoscaleSettings;
pub use channel::{open_channel, BoxedChannel, InstrumentAddress, Timing};
pub use error::SweepError;
pub use instruments::{Generator, Oscilloscope};
pub use plot::{render_bode_png, PlotStyle};
pub use simulator::{DeviceModel, SimulatedBench};
pub use sweep::{run_sweep, StepRecord, SweepConfig, SweepController, SweepResult};

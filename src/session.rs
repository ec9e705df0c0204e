// src/session.rs
use anyhow::{Context, Result};
use crate::config::AppConfig;
use crate::drivers::{
    open_channel, run_sweep, AutoscaleSettings, BoxedChannel, Generator, Oscilloscope,
    SimulatedBench, SweepConfig, SweepController, SweepError, SweepResult, Timing,
};
use crate::types::ConnectionMode;
/// Connected generator/oscilloscope pair.
///
/// Owns both instrument links; a sweep borrows them exclusively for its duration. Outputs
/// and traces are switched off when the session is shut down or dropped.
pub struct BenchSession {
    mode: ConnectionMode,
    generator: Generator<BoxedChannel>,
    scope: Oscilloscope<BoxedChannel>,
    autoscale: AutoscaleSettings,
    generator_id: String,
    scope_id: String,
    bench: Option<SimulatedBench>,
    closed: bool,
}
impl BenchSession {
    /// Opens both instruments, blinks their channels so the operator can check the wiring,
    /// turns the scope traces on and sets the initial time division.
    pub fn connect(mode: ConnectionMode, config: &AppConfig) -> Result<Self> {
        config.validate()?;
        let (generator_link, scope_link, timing, bench): (BoxedChannel, BoxedChannel, Timing, _) =
            match mode {
                ConnectionMode::Hardware => (
                    open_channel("generator", &config.generator, &config.timing)
                        .with_context(|| format!("generator at {} unreachable", config.generator))?,
                    open_channel("scope", &config.scope, &config.timing)
                        .with_context(|| format!("oscilloscope at {} unreachable", config.scope))?,
                    config.timing,
                    None,
                ),
                ConnectionMode::Simulation => {
                    let sim = config.simulation;
                    let bench = SimulatedBench::new(sim.device).with_noise(sim.noise, sim.seed);
                    (
                        Box::new(bench.generator()) as BoxedChannel,
                        Box::new(bench.scope()) as BoxedChannel,
                        Timing::immediate(),
                        Some(bench),
                    )
                }
            };
        let mut generator = Generator::new(generator_link, &timing);
        let mut scope = Oscilloscope::new(scope_link, &timing);
        let generator_id = generator.identify().context("generator did not identify")?;
        let scope_id = scope.identify().context("oscilloscope did not identify")?;
        log::info!("generator: {generator_id}");
        log::info!("oscilloscope: {scope_id}");
        generator.verify().context("generator verification failed")?;
        scope.verify().context("oscilloscope verification failed")?;
        scope.traces_on()?;
        scope.set_timebase(config.autoscale.initial_timebase_index)?;
        Ok(Self {
            mode,
            generator,
            scope,
            autoscale: config.autoscale,
            generator_id,
            scope_id,
            bench,
            closed: false,
        })
    }
    pub fn mode(&self) -> ConnectionMode {
        self.mode
    }
    pub fn generator_id(&self) -> &str {
        &self.generator_id
    }
    pub fn scope_id(&self) -> &str {
        &self.scope_id
    }
    /// The simulated bench behind a `Simulation` session.
    pub fn simulated_bench(&self) -> Option<&SimulatedBench> {
        self.bench.as_ref()
    }
    pub fn sweep(
        &mut self,
        config: SweepConfig,
    ) -> Result<SweepController<'_, BoxedChannel, BoxedChannel>, SweepError> {
        SweepController::new(&mut self.generator, &mut self.scope, config, self.autoscale)
    }
    /// Whole sweep without the operator checkpoint.
    pub fn run_unattended(&mut self, config: SweepConfig) -> Result<SweepResult, SweepError> {
        run_sweep(&mut self.generator, &mut self.scope, config, self.autoscale)
    }
    /// Turns generator outputs and scope traces off. Runs once.
    pub fn shutdown(&mut self) -> Result<(), SweepError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.generator.outputs_off()?;
        self.scope.traces_off()?;
        log::info!("instruments released");
        Ok(())
    }
}
impl Drop for BenchSession {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::warn!("shutdown failed: {e}");
        }
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    fn exact_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.simulation.noise = 0.0;
        config
    }
    #[test]
    fn simulated_session_runs_a_sweep() {
        let mut session = BenchSession::connect(ConnectionMode::Simulation, &exact_config()).unwrap();
        assert!(session.generator_id().starts_with("SIMULATED"));
        assert!(session.scope_id().contains("SDS"));
        let bench = session.simulated_bench().unwrap().clone();
        assert_eq!(bench.timebase_index(), 16);
        let config = SweepConfig {
            amplitude_vpp: 2.0,
            start_hz: 500.0,
            stop_hz: 50_000.0,
            points: 3,
        };
        let result = session.sweep(config).unwrap().run(|_| true, || true).unwrap();
        assert_eq!(result.len(), 3);
        // 5 kHz corner: flat well below it, -3 dB at it, rolling off above
        let magnitudes = result.magnitudes_db();
        assert!(magnitudes[0].abs() < 0.2);
        assert!((magnitudes[1] + 3.01).abs() < 0.2);
        assert!(magnitudes[2] < -19.0);
        let phases = result.phases_deg();
        assert!((phases[1] + 45.0).abs() < 0.5);
        assert!(phases[2] < -80.0);
        session.shutdown().unwrap();
        assert_eq!(bench.outputs(), [false, false]);
    }
    #[test]
    fn drop_releases_outputs() {
        let bench = {
            let mut session = BenchSession::connect(ConnectionMode::Simulation, &exact_config()).unwrap();
            session
                .sweep(SweepConfig {
                    points: 1,
                    ..SweepConfig::default()
                })
                .unwrap()
                .initialize()
                .unwrap();
            let bench = session.simulated_bench().unwrap().clone();
            assert_eq!(bench.outputs(), [true, true]);
            bench
        };
        assert_eq!(bench.outputs(), [false, false]);
        let history = bench.history();
        assert_eq!(history[history.len() - 2..], ["C1:TRA OFF", "C2:TRA OFF"]);
    }
    #[test]
    fn invalid_config_is_rejected_before_connecting() {
        let mut config = exact_config();
        config.autoscale.tolerance = -1.0;
        assert!(BenchSession::connect(ConnectionMode::Simulation, &config).is_err());
    }
}

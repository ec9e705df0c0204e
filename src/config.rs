// src/config.rs
use std::fs;
use std::path::Path;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use crate::drivers::{
    AutoscaleSettings, DeviceModel, InstrumentAddress, SweepConfig, SweepError, Timing,
};
/// Device under test and reading noise of the simulated bench.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub device: DeviceModel,
    /// Relative reading noise, 0 for exact readings.
    pub noise: f64,
    pub seed: u64,
}
impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            device: DeviceModel::LowPass { cutoff_hz: 5000.0 },
            noise: 0.002,
            seed: 7,
        }
    }
}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub generator: InstrumentAddress,
    pub scope: InstrumentAddress,
    pub timing: Timing,
    pub autoscale: AutoscaleSettings,
    pub simulation: SimulationConfig,
    /// Sweep parameters pre-filled in the GUI and used by the CLI when a flag is omitted.
    pub sweep: SweepConfig,
}
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            generator: InstrumentAddress::Tcp {
                host: "192.168.1.90".into(),
                port: crate::drivers::channel::SCPI_RAW_PORT,
            },
            scope: InstrumentAddress::Tcp {
                host: "192.168.1.91".into(),
                port: crate::drivers::channel::SCPI_RAW_PORT,
            },
            timing: Timing::default(),
            autoscale: AutoscaleSettings::default(),
            simulation: SimulationConfig::default(),
            sweep: SweepConfig::default(),
        }
    }
}
impl AppConfig {
    /// Reads a JSON config; missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config: AppConfig = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        config.validate()?;
        log::info!("loaded config from {}", path.display());
        Ok(config)
    }
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
    pub fn validate(&self) -> Result<(), SweepError> {
        self.autoscale.validate()?;
        if self.timing.io_timeout_ms == 0 {
            return Err(SweepError::InvalidConfig("io timeout must be non-zero".into()));
        }
        self.sweep.validate()?;
        self.simulation.device.validate()?;
        if !(0.0..1.0).contains(&self.simulation.noise) {
            return Err(SweepError::InvalidConfig(format!(
                "simulated noise must be in [0, 1), got {}",
                self.simulation.noise
            )));
        }
        Ok(())
    }
}

// src/main.rs
mod config;
mod drivers;
mod engine;
mod gui;
mod recorder;
mod session;
mod types;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use eframe::egui;
use crate::config::AppConfig;
use crate::drivers::{InstrumentAddress, PlotStyle, SweepConfig};
use crate::session::BenchSession;
use crate::types::ConnectionMode;
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// JSON configuration file (instrument addresses, timing, autoscale)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Command>,
}
#[derive(Subcommand, Debug)]
enum Command {
    /// Open the sweep window (default)
    Gui,
    /// Run one sweep from the terminal
    Sweep(SweepArgs),
}
#[derive(Args, Debug)]
struct SweepArgs {
    /// Generator amplitude in Vpp
    #[arg(short, long)]
    amplitude: Option<f64>,
    /// Start frequency in Hz
    #[arg(long)]
    start: Option<f64>,
    /// Stop frequency in Hz
    #[arg(long)]
    stop: Option<f64>,
    /// Number of geometrically spaced points
    #[arg(short, long)]
    points: Option<usize>,
    /// Use the simulated bench instead of real instruments
    #[arg(long)]
    simulate: bool,
    /// Skip the framing checkpoint
    #[arg(short, long)]
    yes: bool,
    /// Generator address: host[:port] or serial:<path>[@baud]
    #[arg(long)]
    generator: Option<InstrumentAddress>,
    /// Oscilloscope address: host[:port] or serial:<path>[@baud]
    #[arg(long)]
    scope: Option<InstrumentAddress>,
    #[arg(long)]
    csv: Option<PathBuf>,
    #[arg(long)]
    json: Option<PathBuf>,
    /// Bode plot image
    #[arg(long)]
    png: Option<PathBuf>,
}
impl SweepArgs {
    fn sweep_config(&self, defaults: SweepConfig) -> SweepConfig {
        SweepConfig {
            amplitude_vpp: self.amplitude.unwrap_or(defaults.amplitude_vpp),
            start_hz: self.start.unwrap_or(defaults.start_hz),
            stop_hz: self.stop.unwrap_or(defaults.stop_hz),
            points: self.points.unwrap_or(defaults.points),
        }
    }
}
/// Blocks until the operator presses ENTER; `n` or `q` declines.
fn prompt_framing(config: &SweepConfig) -> bool {
    println!(
        "Generator is at {:.2} Hz, {} Vpp. Set the scope's vertical and time divisions so both \
         waveforms are clearly visible.",
        config.start_hz, config.amplitude_vpp
    );
    print!("Press ENTER to continue (q to abort): ");
    io::stdout().flush().ok();
    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(0) | Err(_) => false,
        Ok(_) => !matches!(line.trim().to_ascii_lowercase().as_str(), "n" | "q" | "no" | "quit"),
    }
}
fn run_headless(args: SweepArgs, mut config: AppConfig) -> Result<()> {
    if let Some(generator) = args.generator.clone() {
        config.generator = generator;
    }
    if let Some(scope) = args.scope.clone() {
        config.scope = scope;
    }
    let mode = if args.simulate {
        ConnectionMode::Simulation
    } else {
        ConnectionMode::Hardware
    };
    let sweep_config = args.sweep_config(config.sweep);
    let mut session = BenchSession::connect(mode, &config)?;
    let result = if args.yes {
        session.run_unattended(sweep_config)
    } else {
        session.sweep(sweep_config)?.run(prompt_framing, || true)
    }
    .context("sweep aborted")?;
    if let Some(bench) = session.simulated_bench() {
        log::debug!("simulated bench handled {} commands", bench.history().len());
    }
    session.shutdown()?;
    println!("{:>12} {:>12} {:>12} {:>10} {:>10}", "freq (Hz)", "C1 (Vpp)", "C2 (Vpp)", "mag (dB)", "phase");
    for (record, label) in result.records().iter().zip(result.frequency_labels()) {
        println!(
            "{:>12} {:>12.4} {:>12.4} {:>10.2} {:>10.2}",
            label, record.channel1_vpp, record.channel2_vpp, record.magnitude_db, record.phase_deg
        );
    }
    let degenerate = result.degenerate_steps();
    if !degenerate.is_empty() {
        eprintln!("warning: channel 1 read zero at steps {degenerate:?}; magnitude undefined there");
    }
    if let Some(path) = &args.csv {
        recorder::save_csv(&result, path).with_context(|| format!("writing {}", path.display()))?;
    }
    if let Some(path) = &args.json {
        recorder::save_json(&result, path).with_context(|| format!("writing {}", path.display()))?;
    }
    if let Some(path) = &args.png {
        recorder::save_png(&result, path, &PlotStyle::default())
            .with_context(|| format!("writing {}", path.display()))?;
    }
    Ok(())
}
fn run_gui(config: AppConfig) -> Result<()> {
    let viewport = egui::ViewportBuilder::default()
        .with_inner_size([1280.0, 820.0])
        .with_min_inner_size([900.0, 600.0])
        .with_title("Bode Sweep");
    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };
    eframe::run_native(
        "Bode Sweep",
        options,
        Box::new(|_cc| Box::new(gui::BodeApp::new(config))),
    )
    .map_err(|e| anyhow!("window failed: {e}"))
}
// Entry point
fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = AppConfig::load_or_default(cli.config.as_deref())?;
    match cli.command.unwrap_or(Command::Gui) {
        Command::Gui => run_gui(config),
        Command::Sweep(args) => run_headless(args, config),
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn sweep_flags_override_config() {
        let cli = Cli::parse_from([
            "bode-sweep",
            "sweep",
            "--amplitude",
            "2.5",
            "--stop",
            "20000",
            "--simulate",
            "--yes",
            "--scope",
            "serial:/dev/ttyUSB1@115200",
        ]);
        let Some(Command::Sweep(args)) = cli.command else {
            panic!("expected sweep subcommand");
        };
        assert!(args.simulate && args.yes);
        let config = args.sweep_config(SweepConfig::default());
        assert_eq!(config.amplitude_vpp, 2.5);
        assert_eq!(config.start_hz, SweepConfig::default().start_hz);
        assert_eq!(config.stop_hz, 20000.0);
        assert!(matches!(args.scope, Some(InstrumentAddress::Serial { baud_rate: 115200, .. })));
    }
    #[test]
    fn gui_is_the_default() {
        let cli = Cli::parse_from(["bode-sweep", "--config", "bench.json"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.config, Some(PathBuf::from("bench.json")));
    }
    #[test]
    fn headless_simulated_sweep_writes_outputs() {
        let dir = std::env::temp_dir();
        let csv = dir.join(format!("bode-sweep-main-{}.csv", std::process::id()));
        let args = SweepArgs {
            amplitude: Some(1.0),
            start: Some(100.0),
            stop: Some(1000.0),
            points: Some(2),
            simulate: true,
            yes: true,
            generator: None,
            scope: None,
            csv: Some(csv.clone()),
            json: None,
            png: None,
        };
        run_headless(args, AppConfig::default()).unwrap();
        let text = std::fs::read_to_string(&csv).unwrap();
        std::fs::remove_file(&csv).ok();
        assert_eq!(text.lines().count(), 3);
        assert!(text.lines().nth(1).unwrap().starts_with("100.00,"));
    }
}

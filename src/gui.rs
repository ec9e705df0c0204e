// src/gui.rs
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};
use eframe::egui;
use egui::Color32;
use egui_plot::{Line, Plot, PlotPoints};
use crate::config::AppConfig;
use crate::drivers::metrics::magnitude_db;
use crate::drivers::{PlotStyle, SweepConfig, SweepResult};
use crate::engine;
use crate::recorder;
use crate::types::*;
const LOG_LINES: usize = 200;
pub struct BodeApp {
    // System state
    is_connected: bool,
    is_sweeping: bool,
    awaiting_confirmation: bool,
    connection_mode: ConnectionMode,
    // Sweep parameters
    sweep: SweepConfig,
    progress: (usize, usize),
    // Live curves, x = log10(frequency)
    magnitude_points: Vec<[f64; 2]>,
    phase_points: Vec<[f64; 2]>,
    last_result: Option<SweepResult>,
    export_dir: String,
    log_messages: Vec<String>,
    // Engine channels
    rx: Receiver<SweepMessage>,
    tx_cmd: Sender<GuiCommand>,
}
impl BodeApp {
    pub fn new(config: AppConfig) -> Self {
        let (tx, rx) = channel();
        let (tx_cmd, rx_cmd) = channel();
        let sweep = config.sweep;
        // The worker is detached; it exits when `tx_cmd` is dropped with the app.
        engine::spawn_thread(tx, rx_cmd, config);
        Self {
            is_connected: false,
            is_sweeping: false,
            awaiting_confirmation: false,
            connection_mode: ConnectionMode::Simulation,
            sweep,
            progress: (0, 0),
            magnitude_points: Vec::new(),
            phase_points: Vec::new(),
            last_result: None,
            export_dir: ".".to_owned(),
            log_messages: vec!["Bode sweep ready.".to_owned()],
            rx,
            tx_cmd,
        }
    }
    fn log(&mut self, msg: &str) {
        self.log_messages.push(format!("> {}", msg));
        if self.log_messages.len() > LOG_LINES {
            self.log_messages.remove(0);
        }
    }
    fn send(&mut self, cmd: GuiCommand) {
        if self.tx_cmd.send(cmd).is_err() {
            self.log("Engine stopped responding.");
        }
    }
    fn handle(&mut self, msg: SweepMessage) {
        match msg {
            SweepMessage::Log(s) => self.log(&s),
            SweepMessage::Status(b) => {
                self.is_connected = b;
                if !b {
                    self.is_sweeping = false;
                    self.awaiting_confirmation = false;
                }
            }
            SweepMessage::AwaitingConfirmation(config) => {
                self.awaiting_confirmation = true;
                self.log(&format!(
                    "Generator at {:.2} Hz, {} Vpp. Frame both traces on the scope, then confirm.",
                    config.start_hz, config.amplitude_vpp
                ));
            }
            SweepMessage::StepComplete { record, total } => {
                self.progress = (record.index + 1, total);
                let x = record.frequency_hz.log10();
                let magnitude = magnitude_db(record.channel1_vpp, record.channel2_vpp);
                if magnitude.is_finite() {
                    self.magnitude_points.push([x, magnitude]);
                }
                self.phase_points.push([x, record.phase_deg]);
            }
            SweepMessage::Finished(result) => {
                self.is_sweeping = false;
                let degenerate = result.degenerate_steps();
                if !degenerate.is_empty() {
                    self.log(&format!("Channel 1 read zero at steps {degenerate:?}."));
                }
                self.last_result = Some(result);
            }
            SweepMessage::Failed(e) => {
                self.is_sweeping = false;
                self.awaiting_confirmation = false;
                self.log(&format!("Sweep failed: {e}"));
            }
        }
    }
    fn start_sweep(&mut self) {
        if let Err(e) = self.sweep.validate() {
            self.log(&e.to_string());
            return;
        }
        self.magnitude_points.clear();
        self.phase_points.clear();
        self.progress = (0, self.sweep.points);
        self.is_sweeping = true;
        self.send(GuiCommand::StartSweep(self.sweep));
    }
    fn export(&mut self) {
        let Some(result) = self.last_result.clone() else {
            return;
        };
        let dir = PathBuf::from(&self.export_dir);
        let csv = recorder::timestamped_path(&dir, "csv");
        let png = csv.with_extension("png");
        let outcome = recorder::save_csv(&result, &csv)
            .and_then(|_| recorder::save_png(&result, &png, &PlotStyle::default()));
        match outcome {
            Ok(()) => self.log(&format!("Saved {} and {}", csv.display(), png.display())),
            Err(e) => self.log(&format!("Export failed: {e}")),
        }
    }
    fn controls(&mut self, ui: &mut egui::Ui) {
        ui.add_space(10.0);
        ui.heading("Bode Sweep");
        ui.label("Generator + oscilloscope frequency response");
        ui.separator();
        ui.add_enabled_ui(!self.is_connected, |ui| {
            ui.horizontal(|ui| {
                ui.selectable_value(&mut self.connection_mode, ConnectionMode::Simulation, "SIM");
                ui.selectable_value(&mut self.connection_mode, ConnectionMode::Hardware, "REAL");
            });
        });
        let btn_txt = if self.is_connected { "DISCONNECT" } else { "CONNECT" };
        if ui.button(btn_txt).clicked() {
            if self.is_connected {
                self.send(GuiCommand::Disconnect);
            } else {
                self.send(GuiCommand::Connect(self.connection_mode));
            }
        }
        ui.add_space(10.0);
        ui.separator();
        ui.label("SWEEP");
        ui.add_enabled_ui(!self.is_sweeping, |ui| {
            egui::Grid::new("sweep_params").num_columns(2).show(ui, |ui| {
                ui.label("Amplitude (Vpp)");
                ui.add(egui::DragValue::new(&mut self.sweep.amplitude_vpp).speed(0.05).clamp_range(0.001..=20.0));
                ui.end_row();
                ui.label("Start (Hz)");
                ui.add(egui::DragValue::new(&mut self.sweep.start_hz).speed(1.0).clamp_range(0.01..=1e8));
                ui.end_row();
                ui.label("Stop (Hz)");
                ui.add(egui::DragValue::new(&mut self.sweep.stop_hz).speed(10.0).clamp_range(0.01..=1e8));
                ui.end_row();
                ui.label("Points");
                ui.add(egui::DragValue::new(&mut self.sweep.points).clamp_range(1..=1000));
                ui.end_row();
            });
        });
        ui.horizontal(|ui| {
            if ui
                .add_enabled(self.is_connected && !self.is_sweeping, egui::Button::new("START"))
                .clicked()
            {
                self.start_sweep();
            }
            if ui
                .add_enabled(self.awaiting_confirmation, egui::Button::new("FRAMING OK"))
                .clicked()
            {
                self.awaiting_confirmation = false;
                self.send(GuiCommand::ConfirmFraming);
            }
            if ui.add_enabled(self.is_sweeping, egui::Button::new("CANCEL")).clicked() {
                self.awaiting_confirmation = false;
                self.send(GuiCommand::Cancel);
            }
        });
        if self.is_sweeping {
            let (done, total) = self.progress;
            let fraction = if total == 0 { 0.0 } else { done as f32 / total as f32 };
            ui.add(egui::ProgressBar::new(fraction).text(format!("{done}/{total}")));
        }
        if self.awaiting_confirmation {
            ui.label(egui::RichText::new("Waiting for framing confirmation").color(Color32::YELLOW).small());
        }
        ui.add_space(10.0);
        ui.separator();
        ui.label("EXPORT");
        ui.horizontal(|ui| {
            ui.label("Folder");
            ui.text_edit_singleline(&mut self.export_dir);
        });
        if ui
            .add_enabled(self.last_result.is_some(), egui::Button::new("SAVE CSV + PNG"))
            .clicked()
        {
            self.export();
        }
        ui.add_space(10.0);
        egui::ScrollArea::vertical().max_height(200.0).stick_to_bottom(true).show(ui, |ui| {
            for m in &self.log_messages {
                ui.monospace(m);
            }
        });
    }
}
impl eframe::App for BodeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        while let Ok(msg) = self.rx.try_recv() {
            self.handle(msg);
        }
        if self.is_sweeping {
            ctx.request_repaint();
        }
        let mut visuals = egui::Visuals::dark();
        visuals.widgets.noninteractive.bg_fill = Color32::from_rgb(10, 10, 15);
        ctx.set_visuals(visuals);
        egui::SidePanel::left("controls").min_width(300.0).show(ctx, |ui| self.controls(ui));
        egui::CentralPanel::default().show(ctx, |ui| {
            let height = (ui.available_height() / 2.0 - 20.0).max(120.0);
            ui.label("Magnitude (dB) vs log10(frequency / Hz)");
            Plot::new("magnitude_plot").height(height).show(ui, |plot_ui| {
                if !self.magnitude_points.is_empty() {
                    plot_ui.line(
                        Line::new(PlotPoints::new(self.magnitude_points.clone()))
                            .name("Magnitude")
                            .color(Color32::from_rgb(0, 255, 255)),
                    );
                }
            });
            ui.label("Phase (deg) vs log10(frequency / Hz)");
            Plot::new("phase_plot").height(height).show(ui, |plot_ui| {
                if !self.phase_points.is_empty() {
                    plot_ui.line(
                        Line::new(PlotPoints::new(self.phase_points.clone()))
                            .name("Phase")
                            .color(Color32::YELLOW),
                    );
                }
            });
        });
    }
}

// src/engine.rs
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use crate::config::AppConfig;
use crate::drivers::{SweepConfig, SweepError, SweepResult};
use crate::session::BenchSession;
use crate::types::*;
/// Starts the worker that exclusively owns the instrument session.
///
/// The thread exits once the GUI side of the command channel is dropped.
pub fn spawn_thread(
    tx: Sender<SweepMessage>,
    rx_cmd: Receiver<GuiCommand>,
    config: AppConfig,
) -> JoinHandle<()> {
    thread::spawn(move || {
        tx.send(SweepMessage::Log("Sweep engine ready.".to_owned())).ok();
        let mut session: Option<BenchSession> = None;
        while let Ok(cmd) = rx_cmd.recv() {
            match cmd {
                GuiCommand::Connect(mode) => {
                    if session.is_some() {
                        tx.send(SweepMessage::Log("Already connected.".to_owned())).ok();
                        continue;
                    }
                    match BenchSession::connect(mode, &config) {
                        Ok(s) => {
                            tx.send(SweepMessage::Log(format!(
                                "Connected ({:?}): {} / {}",
                                s.mode(),
                                s.generator_id(),
                                s.scope_id()
                            )))
                            .ok();
                            session = Some(s);
                            tx.send(SweepMessage::Status(true)).ok();
                        }
                        Err(e) => {
                            log::error!("connect failed: {e:#}");
                            tx.send(SweepMessage::Log(format!("Connect failed: {e:#}"))).ok();
                        }
                    }
                }
                GuiCommand::Disconnect => disconnect(&mut session, &tx),
                GuiCommand::StartSweep(sweep_config) => {
                    let Some(active) = session.as_mut() else {
                        tx.send(SweepMessage::Failed("Connect before sweeping.".to_owned())).ok();
                        continue;
                    };
                    let mut disconnect_requested = false;
                    match run_job(active, sweep_config, &tx, &rx_cmd, &mut disconnect_requested) {
                        Ok(result) => {
                            tx.send(SweepMessage::Log(format!("Sweep finished, {} points.", result.len()))).ok();
                            tx.send(SweepMessage::Finished(result)).ok();
                        }
                        Err(e) => {
                            match e.step_index() {
                                Some(index) => log::error!("sweep failed at step {index}: {e}"),
                                None => log::error!("sweep failed: {e}"),
                            }
                            tx.send(SweepMessage::Failed(e.to_string())).ok();
                        }
                    }
                    if disconnect_requested {
                        disconnect(&mut session, &tx);
                    }
                }
                GuiCommand::ConfirmFraming | GuiCommand::Cancel => {
                    tx.send(SweepMessage::Log("No sweep is running.".to_owned())).ok();
                }
            }
        }
        log::debug!("command channel closed, engine exiting");
    })
}
fn disconnect(session: &mut Option<BenchSession>, tx: &Sender<SweepMessage>) {
    if let Some(mut s) = session.take() {
        if let Err(e) = s.shutdown() {
            tx.send(SweepMessage::Log(format!("Shutdown failed: {e}"))).ok();
        }
    }
    tx.send(SweepMessage::Status(false)).ok();
}
/// One sweep: initialise, suspend at the framing checkpoint, then step until done. Commands
/// are only looked at between steps.
fn run_job(
    session: &mut BenchSession,
    config: SweepConfig,
    tx: &Sender<SweepMessage>,
    rx_cmd: &Receiver<GuiCommand>,
    disconnect_requested: &mut bool,
) -> Result<SweepResult, SweepError> {
    let mut sweep = session.sweep(config)?;
    sweep.initialize()?;
    tx.send(SweepMessage::AwaitingConfirmation(config)).ok();
    loop {
        match rx_cmd.recv() {
            Ok(GuiCommand::ConfirmFraming) => break,
            Ok(GuiCommand::Cancel) => return Err(SweepError::ConfirmationDeclined),
            Ok(GuiCommand::Disconnect) | Err(_) => {
                *disconnect_requested = true;
                return Err(SweepError::ConfirmationDeclined);
            }
            Ok(other) => {
                tx.send(SweepMessage::Log(format!("Ignored {other:?} while awaiting confirmation."))).ok();
            }
        }
    }
    sweep.confirm()?;
    log::debug!("framing confirmed, {}", sweep.state());
    let total = sweep.frequencies().len();
    loop {
        match rx_cmd.try_recv() {
            Ok(GuiCommand::Cancel) => {
                return Err(SweepError::Cancelled {
                    completed: sweep.completed(),
                })
            }
            Ok(GuiCommand::Disconnect) | Err(TryRecvError::Disconnected) => {
                *disconnect_requested = true;
                return Err(SweepError::Cancelled {
                    completed: sweep.completed(),
                });
            }
            Ok(other) => {
                tx.send(SweepMessage::Log(format!("Ignored {other:?} while sweeping."))).ok();
            }
            Err(TryRecvError::Empty) => {}
        }
        match sweep.step()? {
            Some(record) => {
                tx.send(SweepMessage::StepComplete { record, total }).ok();
            }
            None => break,
        }
    }
    sweep.finish()
}
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::channel;
    use std::time::Duration;
    fn start() -> (Sender<GuiCommand>, Receiver<SweepMessage>, JoinHandle<()>) {
        let (tx, rx) = channel();
        let (tx_cmd, rx_cmd) = channel();
        let mut config = AppConfig::default();
        config.simulation.noise = 0.0;
        let handle = spawn_thread(tx, rx_cmd, config);
        (tx_cmd, rx, handle)
    }
    fn wait_for<F: Fn(&SweepMessage) -> bool>(rx: &Receiver<SweepMessage>, pred: F) -> Vec<SweepMessage> {
        let mut seen = Vec::new();
        loop {
            let msg = rx
                .recv_timeout(Duration::from_secs(10))
                .expect("engine went quiet");
            let done = pred(&msg);
            seen.push(msg);
            if done {
                return seen;
            }
        }
    }
    const SWEEP: SweepConfig = SweepConfig {
        amplitude_vpp: 1.0,
        start_hz: 100.0,
        stop_hz: 10_000.0,
        points: 3,
    };
    #[test]
    fn sweep_waits_for_confirmation_then_reports_each_step() {
        let (tx_cmd, rx, handle) = start();
        tx_cmd.send(GuiCommand::Connect(ConnectionMode::Simulation)).unwrap();
        wait_for(&rx, |m| matches!(m, SweepMessage::Status(true)));
        tx_cmd.send(GuiCommand::StartSweep(SWEEP)).unwrap();
        wait_for(&rx, |m| matches!(m, SweepMessage::AwaitingConfirmation(_)));
        tx_cmd.send(GuiCommand::ConfirmFraming).unwrap();
        let seen = wait_for(&rx, |m| matches!(m, SweepMessage::Finished(_) | SweepMessage::Failed(_)));
        let steps = seen
            .iter()
            .filter(|m| matches!(m, SweepMessage::StepComplete { total: 3, .. }))
            .count();
        assert_eq!(steps, 3);
        let Some(SweepMessage::Finished(result)) = seen.last() else {
            panic!("sweep did not finish: {seen:?}");
        };
        assert_eq!(result.len(), 3);
        drop(tx_cmd);
        handle.join().unwrap();
    }
    #[test]
    fn cancel_at_checkpoint_and_sweep_without_session() {
        let (tx_cmd, rx, handle) = start();
        tx_cmd.send(GuiCommand::StartSweep(SWEEP)).unwrap();
        wait_for(&rx, |m| matches!(m, SweepMessage::Failed(_)));
        tx_cmd.send(GuiCommand::Connect(ConnectionMode::Simulation)).unwrap();
        wait_for(&rx, |m| matches!(m, SweepMessage::Status(true)));
        tx_cmd.send(GuiCommand::StartSweep(SWEEP)).unwrap();
        wait_for(&rx, |m| matches!(m, SweepMessage::AwaitingConfirmation(_)));
        tx_cmd.send(GuiCommand::Cancel).unwrap();
        let seen = wait_for(&rx, |m| matches!(m, SweepMessage::Failed(_)));
        assert!(matches!(seen.last(), Some(SweepMessage::Failed(text)) if text.contains("did not confirm")));
        tx_cmd.send(GuiCommand::Disconnect).unwrap();
        wait_for(&rx, |m| matches!(m, SweepMessage::Status(false)));
        drop(tx_cmd);
        handle.join().unwrap();
    }
}

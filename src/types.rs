// src/types.rs
use crate::drivers::{StepRecord, SweepConfig, SweepResult};
// Connection mode
#[derive(PartialEq, Clone, Copy, Debug)]
pub enum ConnectionMode {
    Simulation,
    Hardware,
}
// Commands from the GUI to the engine
#[derive(Clone, Debug)]
pub enum GuiCommand {
    Connect(ConnectionMode),
    Disconnect,
    StartSweep(SweepConfig),
    // Operator accepted the scope framing at the checkpoint
    ConfirmFraming,
    Cancel,
}
// Messages from the engine to the GUI
#[derive(Clone, Debug)]
pub enum SweepMessage {
    Log(String),
    Status(bool), // connected
    AwaitingConfirmation(SweepConfig),
    StepComplete { record: StepRecord, total: usize },
    Finished(SweepResult),
    Failed(String),
}

use std::fmt;
use thiserror::Error;
use crate::drivers::instruments::Channel;
/// Component of a sweep step that was running when the step failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Frequency,
    Timebase,
    VerticalScale(Channel),
    Measurement,
}
impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Stage::Frequency => write!(f, "frequency programming"),
            Stage::Timebase => write!(f, "time-division selection"),
            Stage::VerticalScale(channel) => write!(f, "{channel} vertical scale convergence"),
            Stage::Measurement => write!(f, "measurement readout"),
        }
    }
}
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("transport error on `{command}`: {source}")]
    Transport {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("unexpected response to `{command}` ({reason}): {response:?}")]
    Parse {
        command: String,
        response: String,
        reason: &'static str,
    },
    #[error("{channel} vertical scale did not settle within {attempts} attempts")]
    Convergence { channel: Channel, attempts: usize },
    #[error("{frequency_hz} Hz cannot be framed by any available time division")]
    TimebaseOutOfRange { frequency_hz: f64 },
    #[error("oscilloscope reported {reported} s/div, which matches no known time division")]
    UnknownTimebase { reported: f64 },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("sweep is {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: String,
    },
    #[error("step {index} ({frequency_hz:.2} Hz) failed during {stage}: {source}")]
    Step {
        index: usize,
        frequency_hz: f64,
        stage: Stage,
        #[source]
        source: Box<SweepError>,
    },
    #[error("sweep cancelled after {completed} completed steps")]
    Cancelled { completed: usize },
    #[error("operator did not confirm the scope framing")]
    ConfirmationDeclined,
    #[error("failed to render plot: {0}")]
    Plot(String),
    #[error("failed to export sweep result: {0}")]
    Export(#[from] std::io::Error),
}
impl SweepError {
    pub(crate) fn parse(command: &str, response: &str, reason: &'static str) -> Self {
        SweepError::Parse {
            command: command.to_owned(),
            response: response.to_owned(),
            reason,
        }
    }
    pub(crate) fn transport(command: &str, source: std::io::Error) -> Self {
        SweepError::Transport {
            command: command.to_owned(),
            source,
        }
    }
    pub(crate) fn at_step(self, index: usize, frequency_hz: f64, stage: Stage) -> Self {
        SweepError::Step {
            index,
            frequency_hz,
            stage,
            source: Box::new(self),
        }
    }
    /// Step index of a step-level failure, if this error carries one.
    pub fn step_index(&self) -> Option<usize> {
        match self {
            SweepError::Step { index, .. } => Some(*index),
            _ => None,
        }
    }
    /// Innermost error, skipping the step wrapper.
    pub fn root_cause(&self) -> &SweepError {
        match self {
            SweepError::Step { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for SweepError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        SweepError::Plot(format!("{value:?}"))
    }
}
impl From<image::ImageError> for SweepError {
    fn from(value: image::ImageError) -> Self {
        SweepError::Plot(value.to_string())
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn step_errors_name_index_and_component() {
        let err = SweepError::parse("PAVA? STAT2", "PAVA STAT2", "missing mean field").at_step(
            3,
            1000.0,
            Stage::Measurement,
        );
        assert_eq!(err.step_index(), Some(3));
        let text = err.to_string();
        assert!(text.contains("step 3"));
        assert!(text.contains("measurement readout"));
        assert!(matches!(err.root_cause(), SweepError::Parse { .. }));
    }
}

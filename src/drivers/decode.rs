//! Decoder for the oscilloscope's textual responses.
//!
//! Grammar (terminators already stripped by the channel):
//!
//! ```text
//! quantity        := number unit          e.g. "5.09E+00V", "92.39degree", "1.00E-03S"
//! parameter-value := header "," quantity  e.g. "C1:PAVA PKPK,5.08E+00V"
//! time-division   := "TDIV " quantity     e.g. "TDIV 1.00E-03S"
//! statistic       := header ":" pairs     e.g. "PAVA STAT1 C1 PKPK:cur,5.08E+00V,mean,5.09E+00V,..."
//! pairs           := "cur," q ",mean," q ",min," q ",max," q ",std-dev," q ",count," integer
//! ```
//!
//! The mean sits at a fixed position: field 3 of the comma-split response, labelled by
//! field 2. Numbers may use scientific notation. Only the mean must be a number; the scope
//! prints `****` for the other fields when it could not measure them, which decodes to `None`.
use serde::Serialize;
use crate::drivers::SweepError;
/// Accumulated statistic for one measurement parameter.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct StatisticReport {
    pub current: Option<f64>,
    pub mean: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub std_dev: Option<f64>,
    pub count: Option<u64>,
}
/// Parses a number with an optional trailing unit, e.g. `5.09E+00V` or `92.39degree`.
pub fn parse_quantity(token: &str) -> Option<f64> {
    let token = token.trim();
    let number = token.trim_end_matches(|c: char| c.is_ascii_alphabetic());
    if number.is_empty() {
        return None;
    }
    number.parse::<f64>().ok().filter(|v| v.is_finite())
}
/// Decodes a `Cn:PAVA? <param>` response into its value.
pub fn parameter_value(command: &str, response: &str) -> Result<f64, SweepError> {
    let (_, value) = response
        .split_once(',')
        .ok_or_else(|| SweepError::parse(command, response, "missing value field"))?;
    parse_quantity(value).ok_or_else(|| SweepError::parse(command, response, "value is not a number"))
}
/// Decodes a `TIME_DIV?` response into seconds per division.
pub fn time_division_seconds(command: &str, response: &str) -> Result<f64, SweepError> {
    let trimmed = response.trim();
    let value = trimmed
        .strip_prefix("TDIV")
        .or_else(|| trimmed.strip_prefix("TIME_DIV"))
        .unwrap_or(trimmed);
    parse_quantity(value).ok_or_else(|| SweepError::parse(command, response, "time division is not a number"))
}
/// Decodes a `PAVA? STATn` response.
pub fn statistic(command: &str, response: &str) -> Result<StatisticReport, SweepError> {
    let fields: Vec<&str> = response.trim().split(',').map(str::trim).collect();
    if fields.len() < 4 {
        return Err(SweepError::parse(command, response, "missing mean field"));
    }
    if !fields[0].ends_with(":cur") {
        return Err(SweepError::parse(command, response, "missing current field"));
    }
    if fields[2] != "mean" {
        return Err(SweepError::parse(command, response, "mean field is not at position 3"));
    }
    let mean = parse_quantity(fields[3])
        .ok_or_else(|| SweepError::parse(command, response, "mean is not a number"))?;
    let mut report = StatisticReport {
        current: parse_quantity(fields[1]),
        mean,
        min: None,
        max: None,
        std_dev: None,
        count: None,
    };
    for pair in fields[4..].chunks(2) {
        let &[key, token] = pair else {
            return Err(SweepError::parse(command, response, "unpaired trailing field"));
        };
        match key {
            "min" => report.min = parse_quantity(token),
            "max" => report.max = parse_quantity(token),
            "std-dev" => report.std_dev = parse_quantity(token),
            "count" => report.count = token.parse().ok(),
            _ => log::debug!("ignoring statistic field {key:?} in {response:?}"),
        }
    }
    Ok(report)
}

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use crate::drivers::{render_bode_png, PlotStyle, SweepError, SweepResult};
pub const CSV_HEADER: &str = "Frequency (Hz),Channel 1 (Vpp),Channel 2 (Vpp),Magnitude (dB),Phase (deg)";
/// `bode_<unix seconds>.<extension>` in `dir`.
pub fn timestamped_path(dir: &Path, extension: &str) -> PathBuf {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    dir.join(format!("bode_{timestamp}.{extension}"))
}
/// One row per step. Frequencies keep the label programmed on the generator; a degenerate
/// magnitude is written as `inf`/`NaN`.
pub fn write_csv<W: Write>(result: &SweepResult, mut w: W) -> std::io::Result<()> {
    writeln!(w, "{CSV_HEADER}")?;
    for (record, label) in result.records().iter().zip(result.frequency_labels()) {
        writeln!(
            w,
            "{},{:.6},{:.6},{:.4},{:.4}",
            label, record.channel1_vpp, record.channel2_vpp, record.magnitude_db, record.phase_deg
        )?;
    }
    w.flush()
}
pub fn save_csv(result: &SweepResult, path: &Path) -> Result<(), SweepError> {
    let file = File::create(path)?;
    write_csv(result, BufWriter::new(file))?;
    log::info!("CSV saved: {}", path.display());
    Ok(())
}
pub fn save_json(result: &SweepResult, path: &Path) -> Result<(), SweepError> {
    let mut w = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut w, result).map_err(std::io::Error::from)?;
    w.flush()?;
    log::info!("JSON saved: {}", path.display());
    Ok(())
}
pub fn save_png(result: &SweepResult, path: &Path, style: &PlotStyle) -> Result<(), SweepError> {
    let png = render_bode_png(result, style)?;
    std::fs::write(path, png)?;
    log::info!("Plot saved: {}", path.display());
    Ok(())
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::measurement::MeasurementSample;
    use crate::drivers::sweep::SweepResultBuilder;
    fn two_points() -> SweepResult {
        let mut builder = SweepResultBuilder::default();
        builder.append(
            3162.28,
            &MeasurementSample {
                channel1_vpp: 5.0,
                channel2_vpp: 2.5,
                phase_deg: 45.0,
            },
        );
        builder.append(
            100_000.0,
            &MeasurementSample {
                channel1_vpp: 0.0,
                channel2_vpp: 0.1,
                phase_deg: 0.0,
            },
        );
        builder.finish()
    }
    #[test]
    fn csv_has_header_and_one_row_per_step() {
        let mut out = Vec::new();
        write_csv(&two_points(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(lines[1], "3162.28,5.000000,2.500000,-6.0206,-45.0000");
        assert!(lines[2].starts_with("100000.00,0.000000,0.100000,inf,"));
    }
    #[test]
    fn json_export_round_trips_through_files() {
        let dir = std::env::temp_dir();
        let path = dir.join(format!("bode-sweep-recorder-{}.json", std::process::id()));
        save_json(&two_points(), &path).unwrap();
        let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(value["frequency_labels"][0], "3162.28");
        assert_eq!(value["records"][0]["channel2_vpp"], 2.5);
        // non-finite numbers have no JSON form
        assert!(value["records"][1]["magnitude_db"].is_null());
    }
    #[test]
    fn timestamped_names() {
        let path = timestamped_path(Path::new("out"), "csv");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("bode_") && name.ends_with(".csv"));
        assert!(path.starts_with("out"));
    }
}

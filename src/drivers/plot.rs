use std::io::Cursor;
use std::ops::Range;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::prelude::LineSeries;
use plotters::prelude::*;
use crate::drivers::sweep::SweepResult;
use crate::drivers::SweepError;
#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub magnitude_color: RGBColor,
    pub phase_color: RGBColor,
}
impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 900,
            height: 700,
            background: RGBColor(10, 10, 10),
            magnitude_color: CYAN,
            phase_color: YELLOW,
        }
    }
}
/// Log-axis frequency span; widened around a single point.
fn frequency_span(frequencies: &[f64]) -> Option<Range<f64>> {
    let lo = frequencies.iter().copied().filter(|f| *f > 0.0).fold(f64::INFINITY, f64::min);
    let hi = frequencies.iter().copied().fold(0.0f64, f64::max);
    if !lo.is_finite() || hi <= 0.0 {
        return None;
    }
    if hi / lo < 1.0 + 1e-9 {
        return Some(lo / 2.0..hi * 2.0);
    }
    Some(lo..hi)
}
/// Padded bounds over the finite values, `-1..1` when there are none.
fn value_span(values: &[f64]) -> Range<f64> {
    let (lo, hi) = values
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() {
        return -1.0..1.0;
    }
    let pad = ((hi - lo) * 0.1).max(1.0);
    lo - pad..hi + pad
}
/// Two stacked panels over a logarithmic frequency axis: magnitude (dB) above phase (deg).
/// Points with a non-finite value are left out of the curve.
pub fn render_bode_png(result: &SweepResult, style: &PlotStyle) -> Result<Vec<u8>, SweepError> {
    if result.is_empty() {
        return Err(SweepError::Plot("sweep result has no points".into()));
    }
    let frequencies = result.frequencies();
    let x_range = frequency_span(&frequencies)
        .ok_or_else(|| SweepError::Plot("no positive frequency to plot".into()))?;
    let panels = [
        ("Magnitude (dB)", result.magnitudes_db(), style.magnitude_color),
        ("Phase (deg)", result.phases_deg(), style.phase_color),
    ];
    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        for (area, (title, values, color)) in root.split_evenly((2, 1)).iter().zip(panels) {
            let mut chart = ChartBuilder::on(area)
                .margin(10)
                .caption(title, ("sans-serif", 20).into_font().color(&WHITE))
                .set_label_area_size(LabelAreaPosition::Left, 55)
                .set_label_area_size(LabelAreaPosition::Bottom, 40)
                .build_cartesian_2d(x_range.clone().log_scale(), value_span(&values))?;
            chart
                .configure_mesh()
                .x_desc("Frequency (Hz)")
                .axis_desc_style(("sans-serif", 14).into_font().color(&WHITE))
                .label_style(("sans-serif", 12).into_font().color(&WHITE))
                .light_line_style(&WHITE.mix(0.1))
                .bold_line_style(&WHITE.mix(0.25))
                .draw()?;
            // A non-finite point splits the curve rather than joining across it.
            let mut segment: Vec<(f64, f64)> = Vec::new();
            for (&f, &v) in frequencies.iter().zip(&values) {
                if v.is_finite() {
                    segment.push((f, v));
                } else if !segment.is_empty() {
                    chart.draw_series(LineSeries::new(std::mem::take(&mut segment), &color))?;
                }
            }
            if !segment.is_empty() {
                chart.draw_series(LineSeries::new(segment, &color))?;
            }
        }
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}
fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, SweepError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| SweepError::Plot("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    let dynamic = DynamicImage::ImageRgb8(image);
    dynamic.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn empty_result_is_rejected() {
        let err = render_bode_png(&SweepResult::default(), &PlotStyle::default()).unwrap_err();
        assert!(matches!(err, SweepError::Plot(_)));
    }
    #[test]
    fn spans_ignore_non_finite_values() {
        assert_eq!(value_span(&[f64::INFINITY, f64::NAN]), -1.0..1.0);
        let span = value_span(&[-6.0, f64::INFINITY, 0.0]);
        assert_eq!(span, -7.0..1.0);
        assert_eq!(frequency_span(&[100.0, 1000.0]), Some(100.0..1000.0));
        assert_eq!(frequency_span(&[50.0]), Some(25.0..100.0));
        assert_eq!(frequency_span(&[]), None);
    }
    #[test]
    fn png_encoding() {
        let buffer = vec![0u8; 4 * 3 * 3];
        let png = encode_png(&buffer, 4, 3).unwrap();
        assert_eq!(&png[1..4], b"PNG");
        assert!(encode_png(&buffer, 5, 3).is_err());
    }
}

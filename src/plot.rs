use crate::capture::Capture;
use crate::writer::CsvTrace;
use anyhow::{anyhow, bail, Result};
use plotters::prelude::*;
use std::ops::Range;
use std::path::{Path, PathBuf};

pub const PLOT_SIZE: (u32, u32) = (1280, 720);

/// Value range over every finite sample, padded by 5 % so flat traces
/// still get a visible band.
fn value_range<'a>(traces: impl IntoIterator<Item = &'a [f64]>) -> Option<Range<f64>> {
    let (lo, hi) = traces
        .into_iter()
        .flatten()
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<(f64, f64)>, &v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })?;
    let pad = if hi > lo { (hi - lo) * 0.05 } else { lo.abs().max(1.0) * 0.05 };
    Some(lo - pad..hi + pad)
}

fn time_range(time: &[f64]) -> Option<Range<f64>> {
    let (first, last) = (*time.first()?, *time.last()?);
    if last > first {
        Some(first..last)
    } else {
        Some(first..first + 1.0)
    }
}

/// Draws each trace against `time` into a PNG at `path`. No text is drawn,
/// so no font is needed.
pub fn plot_traces_png(path: &Path, time: &[f64], traces: &[&[f64]]) -> Result<()> {
    let draw_err = |e: &dyn std::fmt::Display| anyhow!("drawing {}: {e}", path.display());
    let (Some(x), Some(y)) = (time_range(time), value_range(traces.iter().copied())) else {
        bail!("{}: nothing to plot", path.display());
    };

    let root = BitMapBackend::new(path, PLOT_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(|e| draw_err(&e))?;
    let mut chart = ChartBuilder::on(&root)
        .margin(20)
        .build_cartesian_2d(x.clone(), y.clone())
        .map_err(|e| draw_err(&e))?;

    if y.contains(&0.0) {
        chart
            .draw_series(LineSeries::new([(x.start, 0.0), (x.end, 0.0)], &BLACK.mix(0.3)))
            .map_err(|e| draw_err(&e))?;
    }
    for (i, trace) in traces.iter().enumerate() {
        let points = time
            .iter()
            .zip(trace.iter())
            .filter(|(_, v)| v.is_finite())
            .map(|(&t, &v)| (t, v));
        chart
            .draw_series(LineSeries::new(points, Palette99::pick(i).stroke_width(1)))
            .map_err(|e| draw_err(&e))?;
    }
    root.present().map_err(|e| draw_err(&e))?;
    log::debug!("Plotted {} traces to {}", traces.len(), path.display());
    Ok(())
}

/// Every channel of `capture` on one chart.
pub fn plot_capture_png(path: &Path, capture: &Capture) -> Result<()> {
    let time = capture.time_axis().to_vec();
    let rows: Vec<Vec<f64>> = capture.data.rows().into_iter().map(|r| r.to_vec()).collect();
    let traces: Vec<&[f64]> = rows.iter().map(Vec::as_slice).collect();
    plot_traces_png(path, &time, &traces)
}

/// Plots the capture next to its saved data file, with a `.png` extension.
pub fn save_capture_plot(data_path: &Path, capture: &Capture) -> Result<PathBuf> {
    let path = data_path.with_extension("png");
    plot_capture_png(&path, capture)?;
    Ok(path)
}

/// Plots the samples of `trace` with `start < t < end`; `column` picks one
/// value column, `None` plots all of them.
pub fn plot_csv_png(
    path: &Path,
    trace: &CsvTrace,
    column: Option<usize>,
    start: f64,
    end: f64,
) -> Result<()> {
    let keep: Vec<usize> = (0..trace.time.len())
        .filter(|&i| trace.time[i] > start && trace.time[i] < end)
        .collect();
    let time: Vec<f64> = keep.iter().map(|&i| trace.time[i]).collect();
    let columns: Vec<Vec<f64>> = trace
        .columns
        .iter()
        .enumerate()
        .filter(|(c, _)| column.map_or(true, |want| want == *c))
        .map(|(_, values)| keep.iter().map(|&i| values[i]).collect())
        .collect();
    if columns.is_empty() {
        bail!("no column {} in the trace", column.unwrap_or(0));
    }
    let traces: Vec<&[f64]> = columns.iter().map(Vec::as_slice).collect();
    plot_traces_png(path, &time, &traces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    const PNG_MAGIC: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

    #[test]
    fn ranges_skip_nan_and_pad_flat_traces() {
        let a = [1.0, f64::NAN, 3.0];
        let r = value_range([&a[..]]).unwrap();
        assert!((r.start - 0.9).abs() < 1e-12 && (r.end - 3.1).abs() < 1e-12);

        let flat = [2.0, 2.0];
        let r = value_range([&flat[..]]).unwrap();
        assert!(r.start < 2.0 && r.end > 2.0);

        assert!(value_range([&[f64::NAN][..]]).is_none());
        assert_eq!(time_range(&[0.5]), Some(0.5..1.5));
        assert_eq!(time_range(&[]), None);
    }

    #[test]
    fn capture_plot_is_a_png() {
        let dir = tempfile::tempdir().unwrap();
        let capture = Capture {
            sample_rate: 1e3,
            data: array![[0.0, 1.0, 0.0, -1.0], [0.5, 0.5, 0.5, 0.5]],
            time: None,
        };
        let path = save_capture_plot(&dir.path().join("run_0000.csv"), &capture).unwrap();
        assert_eq!(path.extension().unwrap(), "png");
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes[..8], PNG_MAGIC);
    }

    #[test]
    fn csv_plot_needs_samples_in_the_window() {
        let dir = tempfile::tempdir().unwrap();
        let trace = CsvTrace {
            headers: vec!["time".into(), "ch1".into()],
            time: vec![0.0, 1.0, 2.0],
            columns: vec![vec![0.0, 1.0, 4.0]],
        };
        let path = dir.path().join("view.png");
        plot_csv_png(&path, &trace, Some(0), f64::NEG_INFINITY, f64::INFINITY).unwrap();
        assert_eq!(std::fs::read(&path).unwrap()[..8], PNG_MAGIC);

        assert!(plot_csv_png(&path, &trace, Some(0), 5.0, 6.0).is_err());
        assert!(plot_csv_png(&path, &trace, Some(3), f64::NEG_INFINITY, f64::INFINITY).is_err());
    }
}

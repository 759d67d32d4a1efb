use crate::{run_file_path, save_capture_plot, Capture, OutputFormat, OutputSettings};
use anyhow::{anyhow, Context, Result};
use std::{
    fmt::Display,
    path::{Path, PathBuf},
};

/// Column header of one record sample type.
pub trait CsvColumn: Display {
    const HEADER: &'static str;
}

impl CsvColumn for f64 {
    const HEADER: &'static str = "Voltage[V]";
}

macro_rules! dio_column {
    ($($t:ty),*) => {
        $(impl CsvColumn for $t {
            const HEADER: &'static str = "DIO";
        })*
    };
}

dio_column!(u8, u16, u32, u64);

/// Writes `Time[s],CH1[V],CH2[V],...`, one row per sample.
pub fn write_capture_csv(path: impl AsRef<Path>, capture: &Capture) -> Result<()> {
    let path = path.as_ref();
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let mut header = vec![String::from("Time[s]")];
    header.extend((1..=capture.data.nrows()).map(|ch| format!("CH{ch}[V]")));
    wtr.write_record(&header)?;

    let time = capture.time_axis();
    for (i, t) in time.iter().enumerate() {
        let mut row = vec![t.to_string()];
        row.extend(capture.data.column(i).iter().map(|v| v.to_string()));
        wtr.write_record(&row)?;
    }
    wtr.flush()?;
    log::info!("Wrote {} samples to {}", capture.n_samples(), path.display());
    Ok(())
}

/// Writes a record as `Time[s],<column>` at `rate` samples per second.
pub fn write_record_csv<T: CsvColumn>(
    path: impl AsRef<Path>,
    rate: f64,
    samples: &[T],
) -> Result<()> {
    let path = path.as_ref();
    let mut wtr = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    wtr.write_record(["Time[s]", T::HEADER])?;
    for (i, v) in samples.iter().enumerate() {
        wtr.write_record([(i as f64 / rate).to_string(), v.to_string()])?;
    }
    wtr.flush()?;
    log::info!("Wrote {} samples to {}", samples.len(), path.display());
    Ok(())
}

/// A CSV file with a time column followed by value columns.
#[derive(Debug, Clone)]
pub struct CsvTrace {
    pub headers: Vec<String>,
    pub time: Vec<f64>,
    pub columns: Vec<Vec<f64>>,
}

impl CsvTrace {
    /// `(time, value)` points of column `index`.
    pub fn points(&self, index: usize) -> Vec<(f64, f64)> {
        match self.columns.get(index) {
            Some(column) => self.time.iter().copied().zip(column.iter().copied()).collect(),
            None => Vec::new(),
        }
    }
}

pub fn read_capture_csv(path: impl AsRef<Path>) -> Result<CsvTrace> {
    let path = path.as_ref();
    let mut rdr =
        csv::Reader::from_path(path).with_context(|| format!("opening {}", path.display()))?;
    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    if headers.len() < 2 {
        return Err(anyhow!("{}: expected a time column and a value column", path.display()));
    }
    let mut time = Vec::new();
    let mut columns = vec![Vec::new(); headers.len() - 1];
    for (line, record) in rdr.records().enumerate() {
        let record = record?;
        let mut fields = record.iter().map(|f| f.trim().parse::<f64>());
        let parse_err = || anyhow!("{}: bad number on data row {}", path.display(), line + 1);
        time.push(fields.next().ok_or_else(parse_err)?.map_err(|_| parse_err())?);
        for column in columns.iter_mut() {
            column.push(fields.next().ok_or_else(parse_err)?.map_err(|_| parse_err())?);
        }
    }
    Ok(CsvTrace {
        headers,
        time,
        columns,
    })
}

/// Points with `start < t < end`.
pub fn window(points: &[(f64, f64)], start: f64, end: f64) -> Vec<(f64, f64)> {
    points
        .iter()
        .copied()
        .filter(|&(t, _)| t > start && t < end)
        .collect()
}

/// Sample types a record can be saved as.
#[cfg(feature = "hdf5")]
pub trait StoredSample: CsvColumn + hdf5::H5Type {}
#[cfg(feature = "hdf5")]
impl<T: CsvColumn + hdf5::H5Type> StoredSample for T {}

/// Sample types a record can be saved as.
#[cfg(not(feature = "hdf5"))]
pub trait StoredSample: CsvColumn {}
#[cfg(not(feature = "hdf5"))]
impl<T: CsvColumn> StoredSample for T {}

fn extension(format: OutputFormat) -> &'static str {
    match format {
        OutputFormat::Csv => "csv",
        OutputFormat::Hdf5 => "h5",
    }
}

/// Saves one record stream to the next free run file. Returns its path.
pub fn save_samples<T: StoredSample>(
    output: &OutputSettings,
    name: &str,
    rate: f64,
    samples: &[T],
) -> Result<PathBuf> {
    let stem = format!("{}_{name}", output.stem);
    let path = run_file_path(&output.dir, &stem, extension(output.format))?;
    match output.format {
        OutputFormat::Csv => write_record_csv(&path, rate, samples)?,
        #[cfg(feature = "hdf5")]
        OutputFormat::Hdf5 => {
            let writer = Hdf5Writer::create(&path)?;
            writer.write_stream(name, rate, samples)?;
            writer.flush()?;
        }
        #[cfg(not(feature = "hdf5"))]
        OutputFormat::Hdf5 => anyhow::bail!("built without the hdf5 feature"),
    }
    Ok(path)
}

/// Saves one capture to the next free run file, plus a PNG of it when
/// `output.plot` is set. Returns the data file path.
pub fn save_capture(output: &OutputSettings, capture: &Capture) -> Result<PathBuf> {
    let path = run_file_path(&output.dir, &output.stem, extension(output.format))?;
    match output.format {
        OutputFormat::Csv => write_capture_csv(&path, capture)?,
        #[cfg(feature = "hdf5")]
        OutputFormat::Hdf5 => {
            let writer = Hdf5Writer::create(&path)?;
            writer.write_capture("capture", capture)?;
            writer.flush()?;
        }
        #[cfg(not(feature = "hdf5"))]
        OutputFormat::Hdf5 => anyhow::bail!("built without the hdf5 feature"),
    }
    if output.plot {
        let png = save_capture_plot(&path, capture)?;
        log::info!("Plotted capture to {}", png.display());
    }
    Ok(path)
}

#[cfg(feature = "hdf5")]
pub use self::h5::Hdf5Writer;

#[cfg(feature = "hdf5")]
mod h5 {
    use crate::Capture;
    use anyhow::Result;
    use hdf5::{File, H5Type};
    use std::path::Path;

    /// One dataset per record stream, with the sample rate as attribute.
    pub struct Hdf5Writer {
        file: File,
    }

    impl Hdf5Writer {
        pub fn create(path: impl AsRef<Path>) -> Result<Self> {
            let file = File::create(path)?;
            Ok(Self { file })
        }

        pub fn write_stream<T: H5Type>(&self, name: &str, rate: f64, samples: &[T]) -> Result<()> {
            let dataset = self
                .file
                .new_dataset::<T>()
                .shape(samples.len())
                .create(name)?;
            dataset.write(samples)?;
            dataset
                .new_attr::<f64>()
                .create("sample_rate")?
                .write_scalar(&rate)?;
            log::info!("HDF5 dataset {name}: {} samples", samples.len());
            Ok(())
        }

        /// Channel x sample matrix plus its rate.
        pub fn write_capture(&self, name: &str, capture: &Capture) -> Result<()> {
            let dataset = self
                .file
                .new_dataset::<f64>()
                .shape(capture.data.dim())
                .create(name)?;
            dataset.write(&capture.data)?;
            dataset
                .new_attr::<f64>()
                .create("sample_rate")?
                .write_scalar(&capture.sample_rate)?;
            Ok(())
        }

        pub fn flush(&self) -> Result<()> {
            self.file.flush()?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn capture_csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.csv");
        let capture = Capture {
            sample_rate: 1e3,
            data: array![[0.0, 0.5, 1.0], [-1.0, -0.5, 0.0]],
            time: None,
        };
        write_capture_csv(&path, &capture).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("Time[s],CH1[V],CH2[V]\n0,0,-1\n"));

        let trace = read_capture_csv(&path).unwrap();
        assert_eq!(trace.headers, vec!["Time[s]", "CH1[V]", "CH2[V]"]);
        assert_eq!(trace.time, vec![0.0, 0.001, 0.002]);
        assert_eq!(trace.columns[1], vec![-1.0, -0.5, 0.0]);
        assert_eq!(trace.points(0)[2], (0.002, 1.0));
        assert!(trace.points(5).is_empty());
    }

    #[test]
    fn digital_record_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dio.csv");
        write_record_csv(&path, 2.0, &[3u16, 0xffff]).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "Time[s],DIO\n0,3\n0.5,65535\n");
    }

    #[test]
    fn window_is_exclusive() {
        let points: Vec<(f64, f64)> = (0..10).map(|i| (i as f64, i as f64 * 2.0)).collect();
        assert_eq!(window(&points, 2.0, 5.0), vec![(3.0, 6.0), (4.0, 8.0)]);
        assert!(window(&points, 20.0, 30.0).is_empty());
    }

    #[test]
    fn saved_streams_get_numbered_files() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputSettings {
            dir: dir.path().to_string_lossy().into_owned(),
            stem: "run".into(),
            format: OutputFormat::Csv,
            headless: true,
            plot: false,
        };
        let first = save_samples(&output, "analog", 1e3, &[0.25, 0.5]).unwrap();
        let second = save_samples(&output, "analog", 1e3, &[0.75]).unwrap();
        assert_eq!(first, dir.path().join("run_analog0.csv"));
        assert_eq!(second, dir.path().join("run_analog1.csv"));
        let text = std::fs::read_to_string(second).unwrap();
        assert_eq!(text, "Time[s],Voltage[V]\n0,0.75\n");
    }

    #[test]
    fn plotted_capture_sits_next_to_its_data() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputSettings {
            dir: dir.path().to_string_lossy().into_owned(),
            stem: "cap".into(),
            format: OutputFormat::Csv,
            headless: true,
            plot: true,
        };
        let capture = Capture {
            sample_rate: 1e6,
            data: array![[0.0, 1.0, 0.5, 0.0]],
            time: None,
        };
        let path = save_capture(&output, &capture).unwrap();
        assert_eq!(path, dir.path().join("cap0.csv"));
        assert!(dir.path().join("cap0.png").is_file());
    }

    #[test]
    fn malformed_rows_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "Time[s],Voltage[V]\n0,1\n1e-6,abc\n").unwrap();
        let err = read_capture_csv(&path).unwrap_err();
        assert!(err.to_string().contains("data row 2"));
    }
}

#[cfg(all(test, feature = "hdf5"))]
mod h5_tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn hdf5_streams_keep_samples_and_rate() {
        let dir = tempfile::tempdir().unwrap();
        let output = OutputSettings {
            dir: dir.path().to_string_lossy().into_owned(),
            stem: "run".into(),
            format: OutputFormat::Hdf5,
            headless: true,
            plot: false,
        };
        let path = save_samples(&output, "digital", 2e6, &[1u16, 2, 0xffff]).unwrap();
        assert_eq!(path, dir.path().join("run_digital0.h5"));

        let file = hdf5::File::open(&path).unwrap();
        let dataset = file.dataset("digital").unwrap();
        assert_eq!(dataset.read_raw::<u16>().unwrap(), vec![1, 2, 0xffff]);
        let rate: f64 = dataset.attr("sample_rate").unwrap().read_scalar().unwrap();
        assert_eq!(rate, 2e6);
    }

    #[test]
    fn hdf5_capture_is_channel_by_sample() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.h5");
        let capture = Capture {
            sample_rate: 1e3,
            data: array![[0.0, 0.5, 1.0], [-1.0, -0.5, 0.0]],
            time: None,
        };
        let writer = Hdf5Writer::create(&path).unwrap();
        writer.write_capture("capture", &capture).unwrap();
        writer.flush().unwrap();
        drop(writer);

        let file = hdf5::File::open(&path).unwrap();
        let dataset = file.dataset("capture").unwrap();
        let data: Array2<f64> = dataset.read_2d().unwrap();
        assert_eq!(data, capture.data);
        let rate: f64 = dataset.attr("sample_rate").unwrap().read_scalar().unwrap();
        assert_eq!(rate, 1e3);
    }
}

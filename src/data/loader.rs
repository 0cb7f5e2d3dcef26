use crate::data::Frame;
use anyhow::{bail, Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::{debug, info};

/// Supported file formats
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileFormat {
    Csv,
    Tsv,
    GzippedCsv,
    GzippedTsv,
}

impl FileFormat {
    /// Detect file format from path
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let ext = path.extension().and_then(|e| e.to_str());
        let stem = path.file_stem().and_then(|s| s.to_str());

        match (ext, stem) {
            (Some("gz"), Some(stem)) => {
                if stem.ends_with(".csv") {
                    Ok(FileFormat::GzippedCsv)
                } else if stem.ends_with(".tsv") || stem.ends_with(".txt") {
                    Ok(FileFormat::GzippedTsv)
                } else {
                    Err(anyhow::anyhow!("Cannot determine format of gzipped file {:?}", path))
                }
            }
            (Some("csv"), _) => Ok(FileFormat::Csv),
            (Some("tsv"), _) | (Some("txt"), _) => Ok(FileFormat::Tsv),
            _ => Err(anyhow::anyhow!("Unsupported file format: {:?}", path)),
        }
    }

    /// Get delimiter character
    pub fn delimiter(&self) -> u8 {
        match self {
            FileFormat::Csv | FileFormat::GzippedCsv => b',',
            FileFormat::Tsv | FileFormat::GzippedTsv => b'\t',
        }
    }

    /// Check if format is gzipped
    pub fn is_gzipped(&self) -> bool {
        matches!(self, FileFormat::GzippedCsv | FileFormat::GzippedTsv)
    }
}

/// Parse one CSV cell; empty and NA-style markers are missing
pub fn parse_cell(raw: &str) -> Option<f64> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    match s.to_ascii_lowercase().as_str() {
        "na" | "nan" | "null" | "none" | "<na>" => None,
        _ => s.parse::<f64>().ok().filter(|v| v.is_finite()),
    }
}

/// Render one cell; whole numbers are written without a fraction
pub fn format_cell(value: Option<f64>) -> String {
    match value {
        None => String::new(),
        Some(v) if v.fract() == 0.0 && v.abs() < 1e15 => format!("{}", v as i64),
        Some(v) => format!("{}", v),
    }
}

/// Reads and writes pipeline tables
pub struct DataLoader {
    /// Maximum number of rows to load (0 = unlimited)
    pub max_rows: usize,
}

impl DataLoader {
    /// Create new data loader
    pub fn new() -> Self {
        Self { max_rows: 0 }
    }

    /// Load a table from file
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<Frame> {
        let path = path.as_ref();
        info!("Loading table from {:?}", path);

        let format = FileFormat::from_path(path)?;
        debug!("Detected file format: {:?}", format);

        let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        let frame = if format.is_gzipped() {
            self.parse_frame(BufReader::new(GzDecoder::new(file)), format)?
        } else {
            self.parse_frame(BufReader::new(file), format)?
        };

        info!("Loaded {} rows x {} columns", frame.n_rows(), frame.n_cols());
        Ok(frame)
    }

    /// Parse a table from reader
    fn parse_frame<R: Read>(&self, reader: R, format: FileFormat) -> Result<Frame> {
        let mut csv_reader = ReaderBuilder::new()
            .delimiter(format.delimiter())
            .has_headers(true)
            .from_reader(reader);

        let headers: Vec<String> = csv_reader
            .headers()
            .context("Failed to read header row")?
            .iter()
            .map(|s| s.trim().to_string())
            .collect();
        if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
            bail!("Table has no header row");
        }

        let mut columns: Vec<Vec<Option<f64>>> = vec![Vec::new(); headers.len()];
        for (line, result) in csv_reader.records().enumerate() {
            let record = result.with_context(|| format!("Failed to parse record at line {}", line + 2))?;
            for (idx, column) in columns.iter_mut().enumerate() {
                column.push(record.get(idx).and_then(parse_cell));
            }
            if self.max_rows > 0 && line + 1 >= self.max_rows {
                debug!("Reached row limit: {}", self.max_rows);
                break;
            }
        }

        Frame::from_columns(headers.into_iter().zip(columns).collect())
    }

    /// Save a table, creating parent directories
    pub fn save<P: AsRef<Path>>(&self, frame: &Frame, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            crate::utils::ensure_dir(parent)?;
        }
        let format = FileFormat::from_path(path)?;
        let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;

        if format.is_gzipped() {
            let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
            self.write_frame(frame, &mut encoder, format)?;
            encoder.finish().context("Failed to finish gzip stream")?;
        } else {
            let mut writer = BufWriter::new(file);
            self.write_frame(frame, &mut writer, format)?;
            writer.flush()?;
        }

        info!("Saved {} rows x {} columns to {:?}", frame.n_rows(), frame.n_cols(), path);
        Ok(())
    }

    fn write_frame<W: Write>(&self, frame: &Frame, writer: W, format: FileFormat) -> Result<()> {
        let mut csv_writer = WriterBuilder::new()
            .delimiter(format.delimiter())
            .from_writer(writer);

        csv_writer.write_record(frame.column_names())?;
        let columns: Vec<&[Option<f64>]> = frame
            .column_names()
            .iter()
            .filter_map(|name| frame.column(name))
            .collect();
        for row in 0..frame.n_rows() {
            csv_writer.write_record(columns.iter().map(|c| format_cell(c[row])))?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

impl Default for DataLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::TempDir;

    #[test]
    fn test_file_format_detection() {
        assert_eq!(FileFormat::from_path("data.csv").unwrap(), FileFormat::Csv);
        assert_eq!(FileFormat::from_path("data.tsv").unwrap(), FileFormat::Tsv);
        assert_eq!(FileFormat::from_path("data.csv.gz").unwrap(), FileFormat::GzippedCsv);
        assert!(FileFormat::from_path("data.parquet").is_err());
    }

    #[test]
    fn test_parse_cells() {
        assert_eq!(parse_cell("2.5"), Some(2.5));
        assert_eq!(parse_cell(""), None);
        assert_eq!(parse_cell("NaN"), None);
        assert_eq!(parse_cell("NA"), None);
        assert_eq!(parse_cell("abc"), None);
        assert_eq!(format_cell(Some(2.0)), "2");
        assert_eq!(format_cell(Some(27.5)), "27.5");
        assert_eq!(format_cell(None), "");
    }

    #[test]
    fn test_parse_frame_with_gaps() {
        let csv_data = "SEQN,BMXWT,year\n1,80.0,2007\n2,,2007\n3,NaN,2009";
        let loader = DataLoader::new();
        let frame = loader.parse_frame(Cursor::new(csv_data), FileFormat::Csv).unwrap();

        assert_eq!(frame.n_rows(), 3);
        assert_eq!(frame.value("BMXWT", 0), Some(80.0));
        assert_eq!(frame.value("BMXWT", 1), None);
        assert_eq!(frame.value("BMXWT", 2), None);
        assert_eq!(frame.value("year", 2), Some(2009.0));
    }

    #[test]
    fn test_save_and_load_gzipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("table.csv.gz");
        let frame = Frame::from_columns(vec![
            ("SEQN", vec![Some(1.0), Some(2.0)]),
            ("feat_whtr", vec![Some(0.559), None]),
        ])
        .unwrap();

        let loader = DataLoader::new();
        loader.save(&frame, &path).unwrap();
        let loaded = loader.load(&path).unwrap();
        assert_eq!(loaded, frame);
    }

    #[test]
    fn test_written_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.csv");
        let frame = Frame::from_columns(vec![
            ("SEQN", vec![Some(41475.0)]),
            ("target_hypertension", vec![None]),
        ])
        .unwrap();
        DataLoader::new().save(&frame, &path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "SEQN,target_hypertension\n41475,\n");
    }
}

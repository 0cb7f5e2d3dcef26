//! Binary hypertension target from the second blood-pressure reading

use crate::data::loader::DataLoader;
use crate::data::schema::StageSchema;
use crate::data::{Frame, Split, Stage, SEQN_COLUMN, TARGET_COLUMN};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

/// Systolic reading used for labeling
pub const SYSTOLIC_COLUMN: &str = "BPXSY2";

/// Diastolic reading used for labeling
pub const DIASTOLIC_COLUMN: &str = "BPXDI2";

/// Clinical cut-offs in mmHg
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    pub systolic: f64,
    pub diastolic: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            systolic: 130.0,
            diastolic: 80.0,
        }
    }
}

impl Thresholds {
    /// Positive when either reading reaches its cut-off
    pub fn is_positive(&self, systolic: f64, diastolic: f64) -> bool {
        systolic >= self.systolic || diastolic >= self.diastolic
    }
}

/// What the labeler did to one split
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelSummary {
    pub split: Split,
    pub rows_in: usize,
    pub rows_out: usize,
    /// Rows removed for a missing reading
    pub dropped: usize,
    pub positives: usize,
    /// False when the split got the null placeholder
    pub computed: bool,
}

/// Adds the target column to merged tables
#[derive(Debug, Clone, Default)]
pub struct TargetLabeler {
    pub thresholds: Thresholds,
}

impl TargetLabeler {
    /// Create labeler with the default cut-offs
    pub fn new() -> Self {
        Self::default()
    }

    /// Label one split
    ///
    /// The training split requires both readings. The test split is labeled
    /// the same way when both readings happen to be present, and otherwise
    /// receives an all-missing placeholder target.
    pub fn label(&self, mut frame: Frame, split: Split) -> Result<(Frame, LabelSummary)> {
        let rows_in = frame.n_rows();
        let schema = match split {
            Split::Train => StageSchema::new(
                "label",
                &[SEQN_COLUMN, SYSTOLIC_COLUMN, DIASTOLIC_COLUMN],
                &[],
            ),
            Split::Test => StageSchema::new(
                "label",
                &[SEQN_COLUMN],
                &[SYSTOLIC_COLUMN, DIASTOLIC_COLUMN],
            ),
        };
        let report = schema.enforce(&frame)?;

        let both = report.is_available(SYSTOLIC_COLUMN) && report.is_available(DIASTOLIC_COLUMN);
        if !both {
            if report.is_available(SYSTOLIC_COLUMN) || report.is_available(DIASTOLIC_COLUMN) {
                warn!("{} split has only one blood-pressure reading, treating both as absent", split);
            }
            info!("{} split has no blood-pressure readings, target left empty", split);
            frame.push_column(TARGET_COLUMN, vec![None; rows_in])?;
            let summary = LabelSummary {
                split,
                rows_in,
                rows_out: rows_in,
                dropped: 0,
                positives: 0,
                computed: false,
            };
            return Ok((frame, summary));
        }
        if split == Split::Test {
            info!("Blood-pressure readings found in test split, computing real labels");
        }

        let readings: Vec<Option<(f64, f64)>> = {
            let systolic = frame.column(SYSTOLIC_COLUMN).unwrap_or(&[]);
            let diastolic = frame.column(DIASTOLIC_COLUMN).unwrap_or(&[]);
            systolic
                .iter()
                .zip(diastolic)
                .map(|(s, d)| s.zip(*d))
                .collect()
        };
        let keep: Vec<bool> = readings.iter().map(|r| r.is_some()).collect();
        let labels: Vec<Option<f64>> = readings
            .iter()
            .flatten()
            .map(|&(s, d)| Some(if self.thresholds.is_positive(s, d) { 1.0 } else { 0.0 }))
            .collect();

        let dropped = frame.retain_rows(&keep)?;
        let positives = labels.iter().filter(|l| **l == Some(1.0)).count();
        frame.push_column(TARGET_COLUMN, labels)?;

        info!(
            "{} split: dropped {} of {} rows with a missing reading, {} positive of {}",
            split,
            dropped,
            rows_in,
            positives,
            frame.n_rows()
        );
        let summary = LabelSummary {
            split,
            rows_in,
            rows_out: frame.n_rows(),
            dropped,
            positives,
            computed: true,
        };
        Ok((frame, summary))
    }

    /// Label both merged files and write the stage outputs
    pub fn run<P: AsRef<Path>>(&self, processed_dir: P) -> Result<Vec<LabelSummary>> {
        let processed_dir = processed_dir.as_ref();
        let loader = DataLoader::new();
        let mut summaries = Vec::new();
        for split in Split::ALL {
            let merged = loader.load(Stage::Merged.path(processed_dir, split))?;
            let (labeled, summary) = self
                .label(merged, split)
                .with_context(|| format!("Labeling {} split failed", split))?;
            loader.save(&labeled, Stage::Labeled.path(processed_dir, split))?;
            summaries.push(summary);
        }
        Ok(summaries)
    }
}

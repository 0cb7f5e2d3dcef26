use crate::data::Frame;
use anyhow::{bail, Context, Result};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::{debug, info, warn};

/// Median of the observed cells, `None` when nothing was observed
pub fn median(values: &[Option<f64>]) -> Option<f64> {
    let mut observed: Vec<f64> = values.iter().flatten().copied().collect();
    if observed.is_empty() {
        return None;
    }
    observed.sort_by(|a, b| a.total_cmp(b));
    let mid = observed.len() / 2;
    Some(if observed.len() % 2 == 0 {
        (observed[mid - 1] + observed[mid]) / 2.0
    } else {
        observed[mid]
    })
}

/// Per-feature statistics from the training split
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureStats {
    /// Feature name
    pub names: Vec<String>,
    /// Median of each feature, absent when the feature was never observed
    pub medians: Vec<Option<f64>>,
    /// Number of observed cells per feature
    pub observed: Vec<usize>,
    /// Rows the statistics were computed from
    pub n_rows: usize,
}

impl FeatureStats {
    /// Compute statistics for the listed columns that exist in the frame
    pub fn compute(frame: &Frame, columns: &[&str]) -> Self {
        let mut stats = Self {
            names: Vec::new(),
            medians: Vec::new(),
            observed: Vec::new(),
            n_rows: frame.n_rows(),
        };
        for &name in columns {
            if let Some(values) = frame.column(name) {
                stats.names.push(name.to_string());
                stats.medians.push(median(values));
                stats.observed.push(values.iter().filter(|v| v.is_some()).count());
            }
        }
        stats
    }

    /// Median for a feature
    pub fn median(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .and_then(|idx| self.medians[idx])
    }

    /// Save as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            crate::utils::ensure_dir(parent)?;
        }
        let file = File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)?;
        info!("Saved feature medians to {:?}", path);
        Ok(())
    }

    /// Load from JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Failed to open {:?}", path))?;
        let stats = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("Failed to parse {:?}", path))?;
        Ok(stats)
    }
}

/// Count of cells filled per feature
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImputeReport {
    pub filled: Vec<(String, usize)>,
    /// Features left with gaps because no training median exists
    pub unfilled: Vec<String>,
}

/// Median imputation fitted once and then frozen
#[derive(Debug, Clone, Default)]
pub struct MedianImputer {
    stats: Option<FeatureStats>,
}

impl MedianImputer {
    /// Create unfitted imputer
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from previously computed statistics
    pub fn from_stats(stats: FeatureStats) -> Self {
        Self { stats: Some(stats) }
    }

    /// Compute medians on the reference frame
    ///
    /// Refitting an already fitted imputer is rejected so that statistics
    /// from another split can never replace the training medians.
    pub fn fit(&mut self, frame: &Frame, columns: &[&str]) -> Result<&FeatureStats> {
        if self.stats.is_some() {
            bail!("Imputer is already fitted");
        }
        info!("Fitting medians on {} rows", frame.n_rows());
        let stats = FeatureStats::compute(frame, columns);
        for (name, median) in stats.names.iter().zip(&stats.medians) {
            match median {
                Some(m) => debug!("Median {} = {}", name, m),
                None => warn!("{} has no observed training value, no median available", name),
            }
        }
        Ok(self.stats.insert(stats))
    }

    /// Fitted statistics
    pub fn stats(&self) -> Option<&FeatureStats> {
        self.stats.as_ref()
    }

    /// Fill missing cells of every fitted feature present in the frame
    pub fn transform(&self, frame: &mut Frame) -> Result<ImputeReport> {
        let stats = self
            .stats
            .as_ref()
            .context("Imputer must be fitted before transform")?;

        let mut report = ImputeReport::default();
        for (name, median) in stats.names.iter().zip(&stats.medians) {
            let values = match frame.column(name) {
                Some(v) => v,
                None => continue,
            };
            let gaps = values.iter().filter(|v| v.is_none()).count();
            let fill = match median {
                Some(m) => *m,
                None => {
                    if gaps > 0 {
                        report.unfilled.push(name.clone());
                    }
                    continue;
                }
            };
            if gaps > 0 {
                let filled = values.iter().map(|v| Some(v.unwrap_or(fill))).collect();
                frame.push_column(name.clone(), filled)?;
            }
            report.filled.push((name.clone(), gaps));
        }
        Ok(report)
    }
}

/// Row indices of a stratified train/validation split
#[derive(Debug, Clone, PartialEq)]
pub struct StratifiedSplit {
    pub train: Vec<usize>,
    pub val: Vec<usize>,
}

/// Split row indices per class with a seeded shuffle
///
/// Each class contributes `round(count * val_ratio)` rows to validation,
/// clamped so that a class with at least two rows lands on both sides.
pub fn stratified_split(labels: &[u8], val_ratio: f64, seed: u64) -> Result<StratifiedSplit> {
    if !(0.0..1.0).contains(&val_ratio) {
        bail!("Validation ratio must be in [0, 1), got {}", val_ratio);
    }
    info!("Splitting {} rows with seed {}", labels.len(), seed);

    let mut rng = crate::utils::random::seeded_rng(seed);
    let mut split = StratifiedSplit {
        train: Vec::new(),
        val: Vec::new(),
    };

    let mut classes: Vec<u8> = labels.to_vec();
    classes.sort_unstable();
    classes.dedup();

    for class in classes {
        let mut rows: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, &l)| l == class)
            .map(|(i, _)| i)
            .collect();
        rows.shuffle(&mut rng);

        let mut n_val = (rows.len() as f64 * val_ratio).round() as usize;
        if val_ratio > 0.0 && rows.len() >= 2 {
            n_val = n_val.clamp(1, rows.len() - 1);
        }
        split.val.extend_from_slice(&rows[..n_val]);
        split.train.extend_from_slice(&rows[n_val..]);
    }
    split.train.sort_unstable();
    split.val.sort_unstable();

    let log_distribution = |name: &str, rows: &[usize]| {
        let pos = rows.iter().filter(|&&i| labels[i] == 1).count();
        info!(
            "{} distribution: positive={}, negative={}",
            name,
            pos,
            rows.len() - pos
        );
    };
    log_distribution("Train", &split.train);
    log_distribution("Val", &split.val);

    Ok(split)
}

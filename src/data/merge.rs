//! Outer join of the per-instrument tables into one wide table per split

use crate::data::loader::DataLoader;
use crate::data::registry::Instrument;
use crate::data::schema::StageSchema;
use crate::data::{Frame, Split, Stage, SEQN_COLUMN, YEAR_COLUMN};
use anyhow::{bail, Context, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Instrument whose table anchors the join
pub const BASE_INSTRUMENT: Instrument = Instrument::Demographics;

/// Suffix given to an incoming column whose name is already taken
pub const COLLISION_SUFFIX: &str = "_y";

fn key_schema(stage: &'static str) -> StageSchema {
    StageSchema::new(stage, &[SEQN_COLUMN], &[])
}

/// First free name for a colliding column: `X_y`, then `X_y2`, `X_y3`, ...
fn collision_name(frame: &Frame, name: &str) -> String {
    let mut candidate = format!("{}{}", name, COLLISION_SUFFIX);
    let mut n = 2;
    while frame.has_column(&candidate) {
        candidate = format!("{}{}{}", name, COLLISION_SUFFIX, n);
        n += 1;
    }
    candidate
}

/// Drop rows without an identifier; they cannot take part in a join
fn drop_unkeyed(frame: &mut Frame, label: &str) -> Result<()> {
    let keep: Vec<bool> = frame
        .column(SEQN_COLUMN)
        .map(|c| c.iter().map(|v| v.is_some()).collect())
        .unwrap_or_default();
    let removed = frame.retain_rows(&keep)?;
    if removed > 0 {
        warn!("{}: dropped {} rows without {}", label, removed, SEQN_COLUMN);
    }
    Ok(())
}

/// Full outer join on the subject identifier
///
/// Output rows are ordered by identifier. Columns of `right` whose name is
/// already used get [`COLLISION_SUFFIX`], numbered when that name is taken
/// too, so no column is ever overwritten.
pub fn outer_join(left: &Frame, right: &Frame, label: &str) -> Result<Frame> {
    let left_index = left.key_index(SEQN_COLUMN).context("Base table")?;
    let right_index = right
        .key_index(SEQN_COLUMN)
        .with_context(|| format!("Table {}", label))?;

    let ids: BTreeSet<i64> = left_index.keys().chain(right_index.keys()).copied().collect();
    let left_rows: Vec<Option<usize>> = ids.iter().map(|id| left_index.get(id).copied()).collect();
    let right_rows: Vec<Option<usize>> = ids.iter().map(|id| right_index.get(id).copied()).collect();

    let gather = |values: &[Option<f64>], rows: &[Option<usize>]| -> Vec<Option<f64>> {
        rows.iter().map(|r| r.and_then(|idx| values[idx])).collect()
    };

    let mut joined = Frame::with_rows(ids.len());
    joined.push_column(SEQN_COLUMN, ids.iter().map(|&id| Some(id as f64)).collect())?;

    for name in left.column_names().iter().filter(|n| *n != SEQN_COLUMN) {
        if let Some(values) = left.column(name) {
            joined.push_column(name.clone(), gather(values, &left_rows))?;
        }
    }
    for name in right.column_names().iter().filter(|n| *n != SEQN_COLUMN) {
        let values = match right.column(name) {
            Some(v) => v,
            None => continue,
        };
        let mut target = name.clone();
        if joined.has_column(&target) {
            target = collision_name(&joined, name);
            warn!("{}: column {} already present, kept as {}", label, name, target);
        }
        joined.push_column(target, gather(values, &right_rows))?;
    }

    Ok(joined)
}

/// Builds the wide table of one split from raw instrument files
pub struct Merger {
    raw_dir: PathBuf,
    loader: DataLoader,
}

impl Merger {
    /// Create merger reading from a raw directory
    pub fn new<P: AsRef<Path>>(raw_dir: P) -> Self {
        Self {
            raw_dir: raw_dir.as_ref().to_path_buf(),
            loader: DataLoader::new(),
        }
    }

    fn load_instrument(&self, instrument: Instrument, split: Split) -> Result<Option<Frame>> {
        let path = self.raw_dir.join(instrument.output_file(split));
        if !path.is_file() {
            return Ok(None);
        }
        let mut frame = self.loader.load(&path)?;
        key_schema("merge")
            .enforce(&frame)
            .with_context(|| format!("Invalid table {:?}", path))?;
        drop_unkeyed(&mut frame, instrument.output_name())?;
        Ok(Some(frame))
    }

    /// Merge every available instrument table of a split
    pub fn merge(&self, split: Split) -> Result<Frame> {
        info!("Merging {} split from {:?}", split, self.raw_dir);

        let mut merged = match self.load_instrument(BASE_INSTRUMENT, split)? {
            Some(frame) => frame,
            None => bail!(
                "Base table {:?} not found",
                self.raw_dir.join(BASE_INSTRUMENT.output_file(split))
            ),
        };
        info!("Base {}: {} subjects", BASE_INSTRUMENT.output_name(), merged.n_rows());

        for instrument in Instrument::ALL.iter().filter(|i| **i != BASE_INSTRUMENT) {
            let mut table = match self.load_instrument(*instrument, split)? {
                Some(frame) => frame,
                None => {
                    warn!("{} not found for {} split, skipped", instrument.output_file(split), split);
                    continue;
                }
            };
            table.drop_columns(&[YEAR_COLUMN]);
            merged = outer_join(&merged, &table, instrument.output_name())?;
            info!(
                "Joined {} ({} rows): {} subjects, {} columns",
                instrument.output_name(),
                table.n_rows(),
                merged.n_rows(),
                merged.n_cols()
            );
        }

        Ok(merged)
    }

    /// Merge both splits and write the stage files
    pub fn run<P: AsRef<Path>>(&self, processed_dir: P) -> Result<Vec<PathBuf>> {
        let processed_dir = processed_dir.as_ref();
        let mut written = Vec::new();
        for split in Split::ALL {
            let merged = self.merge(split)?;
            let path = Stage::Merged.path(processed_dir, split);
            self.loader.save(&merged, &path)?;
            written.push(path);
        }
        Ok(written)
    }
}

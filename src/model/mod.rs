pub mod booster;
pub mod checkpoint;
pub mod loss;

use crate::data::Frame;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Gradient boosting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoosterConfig {
    /// Number of trees in the ensemble
    pub n_trees: usize,
    /// Shrinkage applied to every tree
    pub learning_rate: f64,
    /// Maximum tree depth
    pub max_depth: usize,
    /// Minimum number of rows in a leaf
    pub min_leaf_size: usize,
    /// Weight of positive examples relative to negatives
    pub scale_pos_weight: f64,
}

impl Default for BoosterConfig {
    fn default() -> Self {
        Self {
            n_trees: 100,
            learning_rate: 0.3,
            max_depth: 6,
            min_leaf_size: 1,
            scale_pos_weight: 1.0,
        }
    }
}

impl BoosterConfig {
    /// Set positive class weight
    pub fn with_scale_pos_weight(mut self, weight: f64) -> Self {
        self.scale_pos_weight = weight;
        self
    }

    /// Set ensemble size
    pub fn with_n_trees(mut self, n_trees: usize) -> Self {
        self.n_trees = n_trees;
        self
    }

    /// Few shallow trees for fast experiments
    pub fn small() -> Self {
        Self {
            n_trees: 15,
            max_depth: 3,
            ..Default::default()
        }
    }

    /// Reject settings the booster cannot train with
    pub fn validate(&self) -> Result<()> {
        if self.n_trees == 0 {
            bail!("Ensemble needs at least one tree");
        }
        if self.max_depth == 0 {
            bail!("max_depth must be positive");
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            bail!("learning_rate must be positive, got {}", self.learning_rate);
        }
        if !(self.scale_pos_weight.is_finite() && self.scale_pos_weight > 0.0) {
            bail!("scale_pos_weight must be positive, got {}", self.scale_pos_weight);
        }
        Ok(())
    }
}

/// Dense row-major matrix with `NaN` marking missing cells
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    n_cols: usize,
    values: Vec<f64>,
}

impl FeatureMatrix {
    /// Create empty matrix
    pub fn new(n_cols: usize) -> Self {
        Self {
            n_cols,
            values: Vec::new(),
        }
    }

    /// Build from frame columns in the given order
    pub fn from_frame(frame: &Frame, columns: &[String]) -> Result<Self> {
        let selected: Vec<&[Option<f64>]> = columns
            .iter()
            .map(|name| match frame.column(name) {
                Some(c) => Ok(c),
                None => bail!("Feature column {} not found", name),
            })
            .collect::<Result<_>>()?;

        let mut matrix = Self::new(columns.len());
        matrix.values.reserve(frame.n_rows() * columns.len());
        for row in 0..frame.n_rows() {
            matrix
                .values
                .extend(selected.iter().map(|c| c[row].unwrap_or(f64::NAN)));
        }
        Ok(matrix)
    }

    /// Append one row
    pub fn push_row(&mut self, row: &[f64]) -> Result<()> {
        if row.len() != self.n_cols {
            bail!("Row has {} values, matrix has {} columns", row.len(), self.n_cols);
        }
        self.values.extend_from_slice(row);
        Ok(())
    }

    /// Number of rows
    pub fn n_rows(&self) -> usize {
        if self.n_cols == 0 {
            0
        } else {
            self.values.len() / self.n_cols
        }
    }

    /// Number of columns
    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    /// Row slice
    pub fn row(&self, idx: usize) -> &[f64] {
        &self.values[idx * self.n_cols..(idx + 1) * self.n_cols]
    }

    /// Single cell
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row * self.n_cols + col]
    }

    /// Copy with one column set to missing
    pub fn with_missing_column(&self, col: usize) -> Self {
        let mut masked = self.clone();
        for row in 0..masked.n_rows() {
            masked.values[row * self.n_cols + col] = f64::NAN;
        }
        masked
    }

    /// Subset of rows in the given order
    pub fn take_rows(&self, rows: &[usize]) -> Self {
        let mut subset = Self::new(self.n_cols);
        subset.values.reserve(rows.len() * self.n_cols);
        for &r in rows {
            subset.values.extend_from_slice(self.row(r));
        }
        subset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matrix_from_frame() {
        let frame = Frame::from_columns(vec![
            ("feat_age", vec![Some(40.0), None]),
            ("feat_imc", vec![Some(22.0), Some(31.0)]),
        ])
        .unwrap();
        let columns = vec!["feat_imc".to_string(), "feat_age".to_string()];
        let matrix = FeatureMatrix::from_frame(&frame, &columns).unwrap();

        assert_eq!(matrix.n_rows(), 2);
        assert_eq!(matrix.row(0), &[22.0, 40.0]);
        assert!(matrix.get(1, 1).is_nan());
        assert_eq!(matrix.take_rows(&[1]).get(0, 0), 31.0);

        let masked = matrix.with_missing_column(0);
        assert!(masked.get(0, 0).is_nan() && masked.get(1, 0).is_nan());
        assert_eq!(masked.get(0, 1), 40.0);
    }

    #[test]
    fn test_config_validation() {
        assert!(BoosterConfig::default().validate().is_ok());
        assert!(BoosterConfig::small().with_n_trees(0).validate().is_err());
        assert!(BoosterConfig::default()
            .with_scale_pos_weight(f64::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn test_matrix_rejects_missing_column() {
        let frame = Frame::from_columns(vec![("feat_age", vec![Some(40.0)])]).unwrap();
        assert!(FeatureMatrix::from_frame(&frame, &["feat_sex".to_string()]).is_err());
    }
}

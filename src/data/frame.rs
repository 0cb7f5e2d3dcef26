//! Column-major numeric table used by every pipeline stage

use anyhow::{bail, Result};
use std::collections::HashMap;

/// Wide table of optional numeric cells
///
/// Every survey value (including coded categorical answers) is numeric, so a
/// single cell type keeps merges and CSV persistence uniform. `None` marks a
/// missing cell.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Frame {
    names: Vec<String>,
    columns: Vec<Vec<Option<f64>>>,
    n_rows: usize,
}

impl Frame {
    /// Create an empty frame
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a frame with the given row count and no columns
    pub fn with_rows(n_rows: usize) -> Self {
        Self {
            names: Vec::new(),
            columns: Vec::new(),
            n_rows,
        }
    }

    /// Build a frame from named columns of equal length
    pub fn from_columns<S: Into<String>>(columns: Vec<(S, Vec<Option<f64>>)>) -> Result<Self> {
        let mut frame = Frame::new();
        let mut first = true;
        for (name, values) in columns {
            if first {
                frame.n_rows = values.len();
                first = false;
            }
            frame.push_column(name, values)?;
        }
        Ok(frame)
    }

    /// Number of rows
    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    /// Number of columns
    pub fn n_cols(&self) -> usize {
        self.names.len()
    }

    /// Column names in order
    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    /// Check if column is present
    pub fn has_column(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Get column values by name
    pub fn column(&self, name: &str) -> Option<&[Option<f64>]> {
        self.position(name).map(|idx| self.columns[idx].as_slice())
    }

    /// Get a single cell
    pub fn value(&self, name: &str, row: usize) -> Option<f64> {
        self.column(name).and_then(|c| c.get(row).copied().flatten())
    }

    /// Append a column, replacing any existing column with the same name
    pub fn push_column<S: Into<String>>(&mut self, name: S, values: Vec<Option<f64>>) -> Result<()> {
        let name = name.into();
        if self.names.is_empty() && self.n_rows == 0 {
            self.n_rows = values.len();
        }
        if values.len() != self.n_rows {
            bail!(
                "Column {} has {} rows, frame has {}",
                name,
                values.len(),
                self.n_rows
            );
        }
        match self.position(&name) {
            Some(idx) => self.columns[idx] = values,
            None => {
                self.names.push(name);
                self.columns.push(values);
            }
        }
        Ok(())
    }

    /// Rename a column; returns false if it was absent
    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        match self.position(from) {
            Some(idx) => {
                self.names[idx] = to.to_string();
                true
            }
            None => false,
        }
    }

    /// Remove columns by name, returning the names actually removed
    pub fn drop_columns(&mut self, names: &[&str]) -> Vec<String> {
        let mut dropped = Vec::new();
        for name in names {
            if let Some(idx) = self.position(name) {
                self.names.remove(idx);
                self.columns.remove(idx);
                dropped.push(name.to_string());
            }
        }
        dropped
    }

    /// New frame with the listed columns that are present, in the listed order
    pub fn select(&self, names: &[&str]) -> Frame {
        let mut selected = Frame::with_rows(self.n_rows);
        for name in names {
            if let Some(idx) = self.position(name) {
                if !selected.has_column(name) {
                    selected.names.push(name.to_string());
                    selected.columns.push(self.columns[idx].clone());
                }
            }
        }
        selected
    }

    /// Keep only rows where `keep` is true
    pub fn retain_rows(&mut self, keep: &[bool]) -> Result<usize> {
        if keep.len() != self.n_rows {
            bail!("Row mask has {} entries, frame has {} rows", keep.len(), self.n_rows);
        }
        for column in &mut self.columns {
            let mut idx = 0;
            column.retain(|_| {
                let k = keep[idx];
                idx += 1;
                k
            });
        }
        let kept = keep.iter().filter(|&&k| k).count();
        let removed = self.n_rows - kept;
        self.n_rows = kept;
        Ok(removed)
    }

    /// Stack another frame below this one, aligning columns by name
    ///
    /// Columns missing on either side are filled with `None`. New columns
    /// keep the order in which they first appear.
    pub fn append(&mut self, other: &Frame) {
        if self.names.is_empty() && self.n_rows == 0 {
            *self = other.clone();
            return;
        }
        let total = self.n_rows + other.n_rows;
        for (name, values) in self.names.iter().zip(self.columns.iter_mut()) {
            match other.column(name) {
                Some(incoming) => values.extend_from_slice(incoming),
                None => values.resize(total, None),
            }
        }
        for (name, incoming) in other.names.iter().zip(&other.columns) {
            if !self.names.contains(name) {
                let mut values = vec![None; self.n_rows];
                values.extend_from_slice(incoming);
                self.names.push(name.clone());
                self.columns.push(values);
            }
        }
        self.n_rows = total;
    }

    /// Row index keyed by an integral column; `None` keys are skipped
    pub fn key_index(&self, key: &str) -> Result<HashMap<i64, usize>> {
        let column = match self.column(key) {
            Some(c) => c,
            None => bail!("Key column {} not found", key),
        };
        let mut index = HashMap::with_capacity(self.n_rows);
        for (row, value) in column.iter().enumerate() {
            if let Some(v) = value {
                let id = *v as i64;
                if index.insert(id, row).is_some() {
                    bail!("Duplicate {} value {}", key, id);
                }
            }
        }
        Ok(index)
    }

    /// Count of missing cells in a column
    pub fn missing_count(&self, name: &str) -> Option<usize> {
        self.column(name).map(|c| c.iter().filter(|v| v.is_none()).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Frame {
        Frame::from_columns(vec![
            ("SEQN", vec![Some(1.0), Some(2.0), Some(3.0)]),
            ("BMXWT", vec![Some(80.0), None, Some(65.5)]),
        ])
        .unwrap()
    }

    #[test]
    fn test_push_column_length_checked() {
        let mut frame = sample();
        assert!(frame.push_column("bad", vec![Some(1.0)]).is_err());
        frame.push_column("BMXHT", vec![Some(170.0); 3]).unwrap();
        assert_eq!(frame.n_cols(), 3);
    }

    #[test]
    fn test_push_column_replaces_existing() {
        let mut frame = sample();
        frame.push_column("BMXWT", vec![None; 3]).unwrap();
        assert_eq!(frame.n_cols(), 2);
        assert_eq!(frame.missing_count("BMXWT"), Some(3));
    }

    #[test]
    fn test_append_aligns_columns() {
        let mut a = sample();
        let b = Frame::from_columns(vec![
            ("SEQN", vec![Some(4.0)]),
            ("BMXHT", vec![Some(160.0)]),
        ])
        .unwrap();
        a.append(&b);

        assert_eq!(a.n_rows(), 4);
        assert_eq!(a.column_names(), &["SEQN", "BMXWT", "BMXHT"]);
        assert_eq!(a.value("BMXWT", 3), None);
        assert_eq!(a.value("BMXHT", 0), None);
        assert_eq!(a.value("BMXHT", 3), Some(160.0));
    }

    #[test]
    fn test_append_into_empty() {
        let mut frame = Frame::new();
        frame.append(&sample());
        assert_eq!(frame, sample());
    }

    #[test]
    fn test_retain_rows() {
        let mut frame = sample();
        let removed = frame.retain_rows(&[true, false, true]).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(frame.column("SEQN").unwrap(), &[Some(1.0), Some(3.0)]);
    }

    #[test]
    fn test_select_and_drop() {
        let mut frame = sample();
        let selected = frame.select(&["BMXWT", "missing"]);
        assert_eq!(selected.column_names(), &["BMXWT"]);
        assert_eq!(selected.n_rows(), 3);

        let dropped = frame.drop_columns(&["BMXWT", "missing"]);
        assert_eq!(dropped, vec!["BMXWT".to_string()]);
        assert!(!frame.has_column("BMXWT"));
    }

    #[test]
    fn test_key_index_rejects_duplicates() {
        let frame = Frame::from_columns(vec![("SEQN", vec![Some(1.0), Some(1.0)])]).unwrap();
        assert!(frame.key_index("SEQN").is_err());
        assert_eq!(sample().key_index("SEQN").unwrap().get(&3), Some(&2));
    }
}

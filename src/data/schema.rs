//! Declared input columns per pipeline stage
//!
//! Each stage lists the columns it cannot run without and the columns whose
//! absence only degrades its output. The check runs once at stage entry and
//! yields a report instead of scattering presence tests through the stage.

use crate::data::Frame;
use anyhow::{bail, Result};
use serde::Serialize;
use tracing::warn;

/// Column requirements of one stage
#[derive(Debug, Clone)]
pub struct StageSchema {
    /// Stage name used in messages
    pub stage: &'static str,
    /// Columns whose absence aborts the stage
    pub required: Vec<&'static str>,
    /// Columns whose absence degrades dependent outputs
    pub optional: Vec<&'static str>,
}

/// Result of checking a frame against a schema
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchemaReport {
    pub stage: String,
    pub missing_required: Vec<String>,
    pub missing_optional: Vec<String>,
    /// Declared columns found in the frame
    pub available: Vec<String>,
}

impl SchemaReport {
    /// Check whether every required column is present
    pub fn is_satisfied(&self) -> bool {
        self.missing_required.is_empty()
    }

    /// Check whether a declared column is present
    ///
    /// Columns the schema never declared are reported as unavailable.
    pub fn is_available(&self, column: &str) -> bool {
        self.available.iter().any(|c| c == column)
    }
}

impl StageSchema {
    /// Create schema
    pub fn new(stage: &'static str, required: &[&'static str], optional: &[&'static str]) -> Self {
        Self {
            stage,
            required: required.to_vec(),
            optional: optional.to_vec(),
        }
    }

    /// Compare against a frame without failing
    pub fn check(&self, frame: &Frame) -> SchemaReport {
        let missing = |columns: &[&'static str]| -> Vec<String> {
            columns
                .iter()
                .filter(|c| !frame.has_column(c))
                .map(|c| c.to_string())
                .collect()
        };
        SchemaReport {
            stage: self.stage.to_string(),
            missing_required: missing(&self.required),
            missing_optional: missing(&self.optional),
            available: self
                .required
                .iter()
                .chain(&self.optional)
                .filter(|c| frame.has_column(c))
                .map(|c| c.to_string())
                .collect(),
        }
    }

    /// Check and abort on missing required columns; warn on optional ones
    pub fn enforce(&self, frame: &Frame) -> Result<SchemaReport> {
        let report = self.check(frame);
        if !report.is_satisfied() {
            bail!(
                "{}: missing required columns {:?}",
                self.stage,
                report.missing_required
            );
        }
        if !report.missing_optional.is_empty() {
            warn!(
                "{}: optional columns not found, dependent outputs will be omitted: {:?}",
                self.stage, report.missing_optional
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Frame {
        Frame::from_columns(vec![
            ("SEQN", vec![Some(1.0)]),
            ("BMXWT", vec![Some(70.0)]),
        ])
        .unwrap()
    }

    #[test]
    fn test_report_lists_missing() {
        let schema = StageSchema::new("features", &["SEQN"], &["BMXWT", "SMQ020"]);
        let report = schema.check(&frame());
        assert!(report.is_satisfied());
        assert_eq!(report.missing_optional, vec!["SMQ020".to_string()]);
        assert!(report.is_available("BMXWT"));
        assert!(report.is_available("SEQN"));
        assert!(!report.is_available("SMQ020"));
    }

    #[test]
    fn test_undeclared_column_is_unavailable() {
        // present in the frame but declared by neither list
        let schema = StageSchema::new("label", &["SEQN"], &["BPXSY2"]);
        let report = schema.check(&frame());
        assert!(!report.is_available("BMXWT"));
        assert!(!report.is_available("BPXDI2"));
        assert_eq!(report.missing_optional, vec!["BPXSY2".to_string()]);
    }

    #[test]
    fn test_enforce_fails_on_required() {
        let schema = StageSchema::new("label", &["SEQN", "BPXSY2", "BPXDI2"], &[]);
        let err = schema.enforce(&frame()).unwrap_err().to_string();
        assert!(err.contains("BPXSY2"));
        assert!(err.contains("BPXDI2"));
    }
}

//! Canonical risk features derived from the labeled survey table

use crate::data::loader::DataLoader;
use crate::data::preprocessing::{FeatureStats, MedianImputer};
use crate::data::registry::SLEEP_HOURS_COLUMN;
use crate::data::schema::StageSchema;
use crate::data::{Frame, Split, Stage, FEATURE_COLUMNS, SEQN_COLUMN, TARGET_COLUMN};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

/// Columns that encode the measured outcome or a clinician-level proxy
pub const LEAKY_COLUMNS: [&str; 10] = [
    "BPXSY1", "BPXSY2", "BPXSY3", "BPXSY4", "BPXDI1", "BPXDI2", "BPXDI3", "BPXDI4", "BPQ020",
    "BPQ030",
];

/// How one feature is computed from its raw columns
#[derive(Debug, Clone, Copy)]
pub struct FeatureDef {
    pub name: &'static str,
    /// Raw columns, in the order `derive` expects them
    pub sources: &'static [&'static str],
    derive: fn(&[f64]) -> Option<f64>,
}

impl FeatureDef {
    /// Compute the feature for one row; missing when any source is missing
    pub fn compute(&self, row: &[Option<f64>]) -> Option<f64> {
        let values: Option<Vec<f64>> = row.iter().copied().collect();
        values.and_then(|v| (self.derive)(&v))
    }
}

fn body_mass_index(v: &[f64]) -> Option<f64> {
    let (weight_kg, height_cm) = (v[0], v[1]);
    if height_cm <= 0.0 {
        return None;
    }
    let height_m = height_cm / 100.0;
    Some(weight_kg / (height_m * height_m))
}

fn waist_to_height(v: &[f64]) -> Option<f64> {
    let (waist_cm, height_cm) = (v[0], v[1]);
    if height_cm <= 0.0 {
        return None;
    }
    Some(waist_cm / height_cm)
}

fn passthrough(v: &[f64]) -> Option<f64> {
    Some(v[0])
}

// 1 = male, 2 = female
fn recode_sex(v: &[f64]) -> Option<f64> {
    match v[0] as i64 {
        1 => Some(0.0),
        2 => Some(1.0),
        _ => None,
    }
}

// smoked at least 100 cigarettes: 1 = yes, 2 = no
fn recode_smoker(v: &[f64]) -> Option<f64> {
    match v[0] as i64 {
        1 => Some(1.0),
        2 => Some(0.0),
        _ => None,
    }
}

// 77 refused, 99 don't know
fn sleep_hours(v: &[f64]) -> Option<f64> {
    match v[0] as i64 {
        77 | 99 => None,
        _ => Some(v[0]),
    }
}

// 7 refused, 9 don't know
fn activity_days(v: &[f64]) -> Option<f64> {
    match v[0] as i64 {
        7 | 9 => None,
        _ => Some(v[0]),
    }
}

/// Feature definitions in model order
pub const FEATURE_DEFS: [FeatureDef; 7] = [
    FeatureDef { name: "feat_imc", sources: &["BMXWT", "BMXHT"], derive: body_mass_index },
    FeatureDef { name: "feat_whtr", sources: &["BMXWAIST", "BMXHT"], derive: waist_to_height },
    FeatureDef { name: "feat_age", sources: &["RIDAGEYR"], derive: passthrough },
    FeatureDef { name: "feat_sex", sources: &["RIAGENDR"], derive: recode_sex },
    FeatureDef { name: "feat_is_smoker", sources: &["SMQ020"], derive: recode_smoker },
    FeatureDef { name: "feat_sleep_hours", sources: &[SLEEP_HOURS_COLUMN], derive: sleep_hours },
    FeatureDef { name: "feat_activity_days", sources: &["PAQ650"], derive: activity_days },
];

/// Raw columns read by any feature, deduplicated
pub fn source_columns() -> Vec<&'static str> {
    let mut columns: Vec<&'static str> = Vec::new();
    for def in &FEATURE_DEFS {
        for source in def.sources {
            if !columns.contains(source) {
                columns.push(source);
            }
        }
    }
    columns
}

/// What was derived for one split
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineerReport {
    pub dropped_leaky: Vec<String>,
    pub derived: Vec<String>,
    /// Features left out because a source column is absent
    pub omitted: Vec<String>,
}

/// Outcome of the features stage for both splits
#[derive(Debug, Clone)]
pub struct FeatureRun {
    pub train: EngineerReport,
    pub test: EngineerReport,
    pub stats: FeatureStats,
}

/// Feature engineer for the labeled survey table
#[derive(Debug, Clone, Default)]
pub struct FeatureEngineer;

impl FeatureEngineer {
    /// Create new feature engineer
    pub fn new() -> Self {
        Self
    }

    /// Derive features without imputation
    ///
    /// The output holds the identifier, the target when present, and every
    /// feature whose sources exist, in model order.
    pub fn transform(&self, mut frame: Frame) -> Result<(Frame, EngineerReport)> {
        let mut report = EngineerReport {
            dropped_leaky: frame.drop_columns(&LEAKY_COLUMNS),
            ..Default::default()
        };
        if !report.dropped_leaky.is_empty() {
            info!("Dropped leakage columns {:?}", report.dropped_leaky);
        }

        let schema = StageSchema::new("features", &[SEQN_COLUMN], &source_columns());
        let checked = schema.enforce(&frame)?;

        let mut output = Frame::with_rows(frame.n_rows());
        for column in [SEQN_COLUMN, TARGET_COLUMN] {
            if let Some(values) = frame.column(column) {
                output.push_column(column, values.to_vec())?;
            }
        }

        for def in &FEATURE_DEFS {
            let missing: Vec<&str> = def
                .sources
                .iter()
                .copied()
                .filter(|s| !checked.is_available(s))
                .collect();
            if !missing.is_empty() {
                warn!("Omitting {}: source columns {:?} not found", def.name, missing);
                report.omitted.push(def.name.to_string());
                continue;
            }

            let sources: Vec<&[Option<f64>]> =
                def.sources.iter().filter_map(|s| frame.column(s)).collect();
            let values = (0..frame.n_rows())
                .map(|row| {
                    let cells: Vec<Option<f64>> = sources.iter().map(|c| c[row]).collect();
                    def.compute(&cells)
                })
                .collect();
            output.push_column(def.name, values)?;
            report.derived.push(def.name.to_string());
        }

        Ok((output, report))
    }

    /// Derive features for both labeled splits, impute with training medians, and write outputs
    pub fn run<P: AsRef<Path>, Q: AsRef<Path>>(&self, processed_dir: P, medians_path: Q) -> Result<FeatureRun> {
        let processed_dir = processed_dir.as_ref();
        let loader = DataLoader::new();

        let load = |split: Split| -> Result<(Frame, EngineerReport)> {
            let labeled = loader.load(Stage::Labeled.path(processed_dir, split))?;
            self.transform(labeled)
                .with_context(|| format!("Feature engineering for {} split failed", split))
        };
        let (mut train, train_report) = load(Split::Train)?;
        let (mut test, test_report) = load(Split::Test)?;

        let mut imputer = MedianImputer::new();
        imputer.fit(&train, &FEATURE_COLUMNS)?;
        for (split, frame) in [(Split::Train, &mut train), (Split::Test, &mut test)] {
            let report = imputer.transform(frame)?;
            let total: usize = report.filled.iter().map(|(_, n)| n).sum();
            info!("{} split: imputed {} cells", split, total);
            if !report.unfilled.is_empty() {
                warn!("{} split: no median for {:?}, gaps kept", split, report.unfilled);
            }
        }

        loader.save(&train, Stage::Features.path(processed_dir, Split::Train))?;
        loader.save(&test, Stage::Features.path(processed_dir, Split::Test))?;

        let stats = imputer
            .stats()
            .cloned()
            .context("Imputer has no statistics after fit")?;
        stats.save(medians_path)?;

        Ok(FeatureRun {
            train: train_report,
            test: test_report,
            stats,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn labeled() -> Frame {
        Frame::from_columns(vec![
            ("SEQN", vec![Some(1.0), Some(2.0), Some(3.0)]),
            ("BPXSY2", vec![Some(128.0), Some(110.0), Some(150.0)]),
            ("BPQ020", vec![Some(1.0), Some(2.0), Some(1.0)]),
            ("BMXWT", vec![Some(80.0), Some(60.0), None]),
            ("BMXHT", vec![Some(170.0), Some(0.0), Some(180.0)]),
            ("BMXWAIST", vec![Some(95.0), Some(70.0), Some(100.0)]),
            ("RIDAGEYR", vec![Some(45.0), Some(30.0), Some(70.0)]),
            ("RIAGENDR", vec![Some(1.0), Some(2.0), Some(3.0)]),
            ("SMQ020", vec![Some(1.0), Some(2.0), Some(7.0)]),
            ("SLD_HOURS", vec![Some(7.5), Some(77.0), Some(99.0)]),
            ("PAQ650", vec![Some(3.0), Some(9.0), Some(7.0)]),
            ("target_hypertension", vec![Some(1.0), Some(0.0), Some(1.0)]),
        ])
        .unwrap()
    }

    #[test]
    fn test_definitions_follow_model_order() {
        let names: Vec<&str> = FEATURE_DEFS.iter().map(|d| d.name).collect();
        assert_eq!(names, FEATURE_COLUMNS);
    }

    #[test]
    fn test_body_ratios() {
        let (out, _) = FeatureEngineer::new().transform(labeled()).unwrap();
        let imc = out.value("feat_imc", 0).unwrap();
        let whtr = out.value("feat_whtr", 0).unwrap();
        assert!((imc - 27.68).abs() < 0.01);
        assert!((whtr - 0.559).abs() < 0.001);
        // zero height and missing weight
        assert_eq!(out.value("feat_imc", 1), None);
        assert_eq!(out.value("feat_whtr", 1), None);
        assert_eq!(out.value("feat_imc", 2), None);
    }

    #[test]
    fn test_recodes_and_sentinels() {
        let (out, _) = FeatureEngineer::new().transform(labeled()).unwrap();
        assert_eq!(out.column("feat_sex").unwrap(), &[Some(0.0), Some(1.0), None]);
        assert_eq!(out.column("feat_is_smoker").unwrap(), &[Some(1.0), Some(0.0), None]);
        assert_eq!(out.column("feat_sleep_hours").unwrap(), &[Some(7.5), None, None]);
        assert_eq!(out.column("feat_activity_days").unwrap(), &[Some(3.0), None, None]);
    }

    #[test]
    fn test_output_has_no_leakage() {
        let (out, report) = FeatureEngineer::new().transform(labeled()).unwrap();
        let mut expected = vec!["SEQN", "target_hypertension"];
        expected.extend(FEATURE_COLUMNS);
        assert_eq!(out.column_names(), expected.as_slice());
        assert_eq!(report.dropped_leaky, vec!["BPXSY2".to_string(), "BPQ020".to_string()]);
    }

    #[test]
    fn test_missing_smoking_column_is_omitted() {
        let mut frame = labeled();
        frame.drop_columns(&["SMQ020"]);
        let (out, report) = FeatureEngineer::new().transform(frame).unwrap();
        assert!(!out.has_column("feat_is_smoker"));
        assert_eq!(report.omitted, vec!["feat_is_smoker".to_string()]);
    }

    #[test]
    fn test_run_imputes_test_with_training_medians() {
        let dir = TempDir::new().unwrap();
        let loader = DataLoader::new();
        loader.save(&labeled(), Stage::Labeled.path(dir.path(), Split::Train)).unwrap();
        let test = Frame::from_columns(vec![
            ("SEQN", vec![Some(10.0), Some(11.0)]),
            ("RIDAGEYR", vec![None, Some(80.0)]),
            ("target_hypertension", vec![None, None]),
        ])
        .unwrap();
        loader.save(&test, Stage::Labeled.path(dir.path(), Split::Test)).unwrap();

        let medians = dir.path().join("medians.json");
        let run = FeatureEngineer::new().run(dir.path(), &medians).unwrap();
        assert_eq!(run.stats.median("feat_age"), Some(45.0));
        assert!(run.test.omitted.contains(&"feat_imc".to_string()));

        let out = loader.load(Stage::Features.path(dir.path(), Split::Test)).unwrap();
        assert_eq!(out.column("feat_age").unwrap(), &[Some(45.0), Some(80.0)]);
        assert!(medians.is_file());

        let train = loader.load(Stage::Features.path(dir.path(), Split::Train)).unwrap();
        assert_eq!(train.missing_count("feat_sex"), Some(0));
    }
}

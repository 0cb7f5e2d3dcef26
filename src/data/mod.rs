pub mod feature_engineering;
pub mod fetcher;
pub mod frame;
pub mod labeler;
pub mod loader;
pub mod merge;
pub mod preprocessing;
pub mod registry;
pub mod schema;
pub mod xpt;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use frame::Frame;

/// Subject identifier shared by every survey instrument
pub const SEQN_COLUMN: &str = "SEQN";

/// Survey cycle the row was downloaded from
pub const YEAR_COLUMN: &str = "year";

/// Binary hypertension label
pub const TARGET_COLUMN: &str = "target_hypertension";

/// Prefix marking model-ready columns
pub const FEATURE_PREFIX: &str = "feat_";

/// Engineered features in model order
pub const FEATURE_COLUMNS: [&str; 7] = [
    "feat_imc",
    "feat_whtr",
    "feat_age",
    "feat_sex",
    "feat_is_smoker",
    "feat_sleep_hours",
    "feat_activity_days",
];

/// Dataset split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    /// Labeled survey cycles used for fitting
    Train,
    /// Blind holdout cycle
    Test,
}

impl Split {
    /// Both splits in processing order
    pub const ALL: [Split; 2] = [Split::Train, Split::Test];

    /// Suffix used by raw instrument files
    pub fn raw_suffix(&self) -> &'static str {
        match self {
            Split::Train => "TRAIN",
            Split::Test => "TEST",
        }
    }

    /// Prefix used by processed stage files
    pub fn stage_prefix(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "test",
        }
    }
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.stage_prefix())
    }
}

/// Pipeline stage outputs under the processed directory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Outer-joined instrument tables
    Merged,
    /// Merged table with the target column
    Labeled,
    /// Identifier, target and imputed features
    Features,
}

impl Stage {
    fn file_suffix(&self) -> &'static str {
        match self {
            Stage::Merged => "dataset",
            Stage::Labeled => "with_target",
            Stage::Features => "final_features",
        }
    }

    /// Path of this stage's CSV for one split
    pub fn path<P: AsRef<Path>>(&self, processed_dir: P, split: Split) -> PathBuf {
        processed_dir
            .as_ref()
            .join(format!("{}_{}.csv", split.stage_prefix(), self.file_suffix()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_paths() {
        assert_eq!(
            Stage::Merged.path("data/processed", Split::Train),
            PathBuf::from("data/processed/train_dataset.csv")
        );
        assert_eq!(
            Stage::Labeled.path("data/processed", Split::Test),
            PathBuf::from("data/processed/test_with_target.csv")
        );
        assert_eq!(
            Stage::Features.path("out", Split::Test),
            PathBuf::from("out/test_final_features.csv")
        );
    }

    #[test]
    fn test_feature_columns_share_prefix() {
        assert!(FEATURE_COLUMNS.iter().all(|c| c.starts_with(FEATURE_PREFIX)));
    }
}

//! Threshold-based explanation of a risk score
//!
//! These rules flag well-known lifestyle risk factors from the request
//! values. They do not read the model and are not a feature attribution.

use crate::predict::RiskFeatures;
use serde::{Deserialize, Serialize};

pub const OBESITY_BMI: f64 = 30.0;
pub const OVERWEIGHT_BMI: f64 = 25.0;
pub const WAIST_TO_HEIGHT_LIMIT: f64 = 0.5;
pub const AGE_LIMIT: i64 = 45;
pub const MIN_SLEEP_HOURS: f64 = 7.0;
pub const MIN_ACTIVE_DAYS: f64 = 3.0;

/// A factor presented to the user as contributing to the score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    /// Feature the factor comes from
    pub feature: String,
    /// Human-readable description
    pub description: String,
}

impl Driver {
    fn new(feature: &str, description: String) -> Self {
        Self {
            feature: feature.to_string(),
            description,
        }
    }
}

impl std::fmt::Display for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description)
    }
}

/// Flag the risk factors present in a request, in feature order
pub fn explain(features: &RiskFeatures) -> Vec<Driver> {
    let mut drivers = Vec::new();

    let bmi = features.feat_imc;
    if bmi >= OBESITY_BMI {
        drivers.push(Driver::new(
            "feat_imc",
            format!("Body-mass index {:.1} is in the obesity range", bmi),
        ));
    } else if bmi >= OVERWEIGHT_BMI {
        drivers.push(Driver::new(
            "feat_imc",
            format!("Body-mass index {:.1} is in the overweight range", bmi),
        ));
    }

    if features.feat_whtr >= WAIST_TO_HEIGHT_LIMIT {
        drivers.push(Driver::new(
            "feat_whtr",
            format!(
                "Waist-to-height ratio {:.2} is at or above {}",
                features.feat_whtr, WAIST_TO_HEIGHT_LIMIT
            ),
        ));
    }

    if features.feat_age >= AGE_LIMIT {
        drivers.push(Driver::new(
            "feat_age",
            format!("Age {} is {} or older", features.feat_age, AGE_LIMIT),
        ));
    }

    if features.feat_is_smoker == 1 {
        drivers.push(Driver::new("feat_is_smoker", "Current smoker".to_string()));
    }

    if features.feat_sleep_hours < MIN_SLEEP_HOURS {
        drivers.push(Driver::new(
            "feat_sleep_hours",
            format!(
                "Sleeps {:.1} hours per night, less than {}",
                features.feat_sleep_hours, MIN_SLEEP_HOURS
            ),
        ));
    }

    if features.feat_activity_days < MIN_ACTIVE_DAYS {
        drivers.push(Driver::new(
            "feat_activity_days",
            format!(
                "Physically active {} days per week, fewer than {}",
                features.feat_activity_days, MIN_ACTIVE_DAYS
            ),
        ));
    }

    drivers
}

/// Bullet list used in prompts and reports
pub fn format_drivers(drivers: &[Driver]) -> String {
    if drivers.is_empty() {
        return "- No lifestyle risk factor flagged".to_string();
    }
    drivers
        .iter()
        .map(|d| format!("- {}", d))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn healthy() -> RiskFeatures {
        RiskFeatures {
            feat_imc: 22.0,
            feat_whtr: 0.42,
            feat_age: 30,
            feat_sex: 1,
            feat_is_smoker: 0,
            feat_sleep_hours: 8.0,
            feat_activity_days: 5.0,
        }
    }

    #[test]
    fn test_healthy_profile_has_no_drivers() {
        assert!(explain(&healthy()).is_empty());
        assert_eq!(format_drivers(&[]), "- No lifestyle risk factor flagged");
    }

    #[test]
    fn test_drivers_in_feature_order() {
        let features = RiskFeatures {
            feat_imc: 27.68,
            feat_whtr: 0.559,
            feat_is_smoker: 1,
            feat_sleep_hours: 5.5,
            ..healthy()
        };
        let drivers = explain(&features);
        let names: Vec<&str> = drivers.iter().map(|d| d.feature.as_str()).collect();
        assert_eq!(
            names,
            vec!["feat_imc", "feat_whtr", "feat_is_smoker", "feat_sleep_hours"]
        );
        assert!(drivers[0].description.contains("overweight"));
        assert!(format_drivers(&drivers).starts_with("- Body-mass index 27.7"));
    }

    #[test]
    fn test_obesity_and_boundaries() {
        let features = RiskFeatures {
            feat_imc: 30.0,
            feat_age: 45,
            feat_activity_days: 3.0,
            feat_sleep_hours: 7.0,
            ..healthy()
        };
        let drivers = explain(&features);
        assert_eq!(drivers.len(), 2);
        assert!(drivers[0].description.contains("obesity"));
        assert_eq!(drivers[1].feature, "feat_age");
    }
}

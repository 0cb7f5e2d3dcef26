/// Probability clipping used by the log-loss
const EPS: f64 = 1e-15;

/// Mean binary cross-entropy
pub fn log_loss(labels: &[f64], probs: &[f64]) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let total: f64 = labels
        .iter()
        .zip(probs)
        .map(|(&y, &p)| {
            let p = p.clamp(EPS, 1.0 - EPS);
            -(y * p.ln() + (1.0 - y) * (1.0 - p).ln())
        })
        .sum();
    total / labels.len() as f64
}

/// Metrics for evaluation
pub mod metrics {
    use serde::{Deserialize, Serialize};
    use std::fmt;

    fn has_both_classes(labels: &[f64]) -> bool {
        labels.iter().any(|&y| y == 1.0) && labels.iter().any(|&y| y != 1.0)
    }

    /// Area under the ROC curve
    ///
    /// `None` when only one class is present.
    pub fn roc_auc(labels: &[f64], scores: &[f64]) -> Option<f64> {
        if !has_both_classes(labels) || labels.len() != scores.len() {
            return None;
        }
        let y_true: Vec<f64> = labels.iter().map(|&y| if y == 1.0 { 1.0 } else { 0.0 }).collect();
        let auc = smartcore::metrics::roc_auc_score(&y_true, &scores.to_vec());
        auc.is_finite().then_some(auc)
    }

    /// Share of predicted labels equal to the true labels
    pub fn accuracy(labels: &[f64], predicted: &[f64]) -> f64 {
        if labels.is_empty() || labels.len() != predicted.len() {
            return 0.0;
        }
        let y_true: Vec<i32> = labels.iter().map(|&y| y as i32).collect();
        let y_pred: Vec<i32> = predicted.iter().map(|&y| y as i32).collect();
        smartcore::metrics::accuracy(&y_true, &y_pred)
    }

    /// Average precision: precision at each threshold weighted by the recall gained
    pub fn average_precision(labels: &[f64], scores: &[f64]) -> Option<f64> {
        let n_pos = labels.iter().filter(|&&y| y == 1.0).count();
        if n_pos == 0 {
            return None;
        }

        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

        let mut ap = 0.0;
        let mut tp = 0usize;
        let mut seen = 0usize;
        let mut prev_recall = 0.0;
        let mut i = 0;
        while i < order.len() {
            let mut j = i;
            while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
                j += 1;
            }
            for &idx in &order[i..=j] {
                seen += 1;
                if labels[idx] == 1.0 {
                    tp += 1;
                }
            }
            let recall = tp as f64 / n_pos as f64;
            let precision = tp as f64 / seen as f64;
            ap += (recall - prev_recall) * precision;
            prev_recall = recall;
            i = j + 1;
        }
        Some(ap)
    }

    /// Precision, recall and F1 of one class
    #[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
    pub struct ClassMetrics {
        pub precision: f64,
        pub recall: f64,
        pub f1: f64,
        pub support: usize,
    }

    fn ratio(num: usize, den: usize) -> f64 {
        if den == 0 {
            0.0
        } else {
            num as f64 / den as f64
        }
    }

    impl ClassMetrics {
        fn from_counts(tp: usize, fp: usize, fn_: usize) -> Self {
            let precision = ratio(tp, tp + fp);
            let recall = ratio(tp, tp + fn_);
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            Self {
                precision,
                recall,
                f1,
                support: tp + fn_,
            }
        }
    }

    /// Per-class report for a binary classifier
    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    pub struct ClassificationReport {
        pub target_names: [String; 2],
        /// Index 0 is the negative class
        pub classes: [ClassMetrics; 2],
        pub accuracy: f64,
        pub macro_avg: ClassMetrics,
        pub weighted_avg: ClassMetrics,
    }

    impl ClassificationReport {
        /// Build from true labels and predicted labels
        pub fn new(labels: &[f64], predicted: &[bool], target_names: [&str; 2]) -> Self {
            let mut counts = [[0usize; 2]; 2];
            for (&y, &p) in labels.iter().zip(predicted) {
                counts[usize::from(y == 1.0)][usize::from(p)] += 1;
            }
            let positive = ClassMetrics::from_counts(counts[1][1], counts[0][1], counts[1][0]);
            let negative = ClassMetrics::from_counts(counts[0][0], counts[1][0], counts[0][1]);
            let classes = [negative, positive];

            let total = labels.len();
            let predicted: Vec<f64> = predicted.iter().map(|&p| f64::from(u8::from(p))).collect();
            let accuracy = accuracy(labels, &predicted);
            let average = |weight: &dyn Fn(&ClassMetrics) -> f64| -> ClassMetrics {
                let w: f64 = classes.iter().map(|c| weight(c)).sum();
                let mean = |f: fn(&ClassMetrics) -> f64| -> f64 {
                    if w == 0.0 {
                        0.0
                    } else {
                        classes.iter().map(|c| f(c) * weight(c)).sum::<f64>() / w
                    }
                };
                ClassMetrics {
                    precision: mean(|c| c.precision),
                    recall: mean(|c| c.recall),
                    f1: mean(|c| c.f1),
                    support: total,
                }
            };

            Self {
                target_names: [target_names[0].to_string(), target_names[1].to_string()],
                classes,
                accuracy,
                macro_avg: average(&|_: &ClassMetrics| 1.0),
                weighted_avg: average(&|c: &ClassMetrics| c.support as f64),
            }
        }
    }

    impl fmt::Display for ClassificationReport {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let width = self
                .target_names
                .iter()
                .map(|n| n.len())
                .max()
                .unwrap_or(0)
                .max("weighted avg".len());
            writeln!(
                f,
                "{:>width$} {:>9} {:>9} {:>9} {:>9}",
                "",
                "precision",
                "recall",
                "f1-score",
                "support",
                width = width
            )?;
            writeln!(f)?;
            for (name, c) in self.target_names.iter().zip(&self.classes) {
                writeln!(
                    f,
                    "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                    name,
                    c.precision,
                    c.recall,
                    c.f1,
                    c.support,
                    width = width
                )?;
            }
            writeln!(f)?;
            writeln!(
                f,
                "{:>width$} {:>9} {:>9} {:>9.2} {:>9}",
                "accuracy",
                "",
                "",
                self.accuracy,
                self.macro_avg.support,
                width = width
            )?;
            for (name, c) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
                writeln!(
                    f,
                    "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                    name,
                    c.precision,
                    c.recall,
                    c.f1,
                    c.support,
                    width = width
                )?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::metrics::*;
    use super::*;

    #[test]
    fn test_log_loss() {
        let loss = log_loss(&[1.0, 0.0], &[0.5, 0.5]);
        assert!((loss - std::f64::consts::LN_2).abs() < 1e-12);
        // clipping keeps confident mistakes finite
        assert!(log_loss(&[1.0], &[0.0]).is_finite());
    }

    #[test]
    fn test_roc_auc() {
        let labels = [0.0, 0.0, 1.0, 1.0];
        let auc = roc_auc(&labels, &[0.1, 0.4, 0.35, 0.8]).unwrap();
        assert!((auc - 0.75).abs() < 1e-9);
        let perfect = roc_auc(&labels, &[0.1, 0.2, 0.7, 0.9]).unwrap();
        assert!((perfect - 1.0).abs() < 1e-9);
        assert_eq!(roc_auc(&[1.0, 1.0], &[0.2, 0.9]), None);
    }

    #[test]
    fn test_accuracy() {
        assert_eq!(accuracy(&[1.0, 0.0, 1.0, 0.0], &[1.0, 0.0, 0.0, 0.0]), 0.75);
        assert_eq!(accuracy(&[], &[]), 0.0);
    }

    #[test]
    fn test_average_precision() {
        let labels = [0.0, 0.0, 1.0, 1.0];
        let ap = average_precision(&labels, &[0.1, 0.4, 0.35, 0.8]).unwrap();
        assert!((ap - 0.8333333333).abs() < 1e-9);
    }

    #[test]
    fn test_classification_report() {
        let labels = [1.0, 0.0, 0.0, 0.0, 1.0];
        let predicted = [true, false, true, false, true];
        let report = ClassificationReport::new(&labels, &predicted, ["No", "Yes"]);

        assert!((report.accuracy - 0.8).abs() < 1e-12);
        assert!((report.classes[1].precision - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(report.classes[1].recall, 1.0);
        assert_eq!(report.classes[0].support, 3);
        assert!((report.classes[1].f1 - 0.8).abs() < 1e-12);

        let text = report.to_string();
        assert!(text.contains("weighted avg"));
        assert!(text.contains("Yes"));
    }
}

//! Paginated plain-text risk report

use crate::predict::drivers::format_drivers;
use crate::predict::RiskScore;
use crate::utils::ensure_dir;
use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::info;

pub const REPORT_TITLE: &str = "NexusByte - Hypertension Risk Report";

/// Closing paragraph of every report
pub const MEDICAL_DISCLAIMER: &str = "This report is produced by a statistical model and an \
automated wellness coach. It is not a diagnosis and does not replace consultation with a \
physician or other qualified health professional. Blood pressure can only be assessed by \
measurement. If you have symptoms or doubts about your health, consult a health professional.";

const PAGE_BREAK: char = '\u{0C}';

/// Page geometry in characters and lines
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLayout {
    pub width: usize,
    /// Body lines per page, header excluded
    pub lines_per_page: usize,
}

impl Default for PageLayout {
    fn default() -> Self {
        Self {
            width: 80,
            lines_per_page: 54,
        }
    }
}

/// Scored subject together with the coach plan
#[derive(Debug, Clone)]
pub struct RiskReport {
    pub score: RiskScore,
    pub plan: String,
}

impl RiskReport {
    pub fn new(score: RiskScore, plan: String) -> Self {
        Self { score, plan }
    }

    fn body(&self, width: usize) -> Vec<String> {
        let mut lines = Vec::new();
        let section = |lines: &mut Vec<String>, heading: &str, text: &str| {
            lines.push(heading.to_string());
            lines.push("-".repeat(heading.chars().count()));
            lines.extend(wrap(text, width));
            lines.push(String::new());
        };

        let level = if self.score.is_positive() {
            "HIGH (hypertension predicted)"
        } else {
            "LOW (no hypertension predicted)"
        };
        let assessment = format!(
            "Risk score: {:.2} ({:.1}%)\nRisk level: {}",
            self.score.risk_score,
            self.score.risk_score * 100.0,
            level
        );
        section(&mut lines, "RISK ASSESSMENT", &assessment);
        section(
            &mut lines,
            "CONTRIBUTING FACTORS",
            &format_drivers(&self.score.drivers),
        );
        section(&mut lines, "PERSONALIZED ACTION PLAN", self.plan.trim());
        section(&mut lines, "MEDICAL DISCLAIMER", MEDICAL_DISCLAIMER);

        while lines.last().is_some_and(|l| l.is_empty()) {
            lines.pop();
        }
        lines
    }

    /// Lay the report out as pages, each starting with the header
    pub fn paginate(&self, layout: PageLayout) -> Result<Vec<String>> {
        if layout.width < 20 || layout.lines_per_page == 0 {
            bail!(
                "Page layout {}x{} is too small",
                layout.width,
                layout.lines_per_page
            );
        }
        let body = self.body(layout.width);
        let total = body.len().div_ceil(layout.lines_per_page).max(1);

        Ok(body
            .chunks(layout.lines_per_page)
            .enumerate()
            .map(|(i, lines)| {
                let mut page = header(i + 1, total, layout.width);
                page.push_str(&lines.join("\n"));
                page.push('\n');
                page
            })
            .collect())
    }

    /// Whole document with form feeds between pages
    pub fn render(&self, layout: PageLayout) -> Result<String> {
        Ok(self.paginate(layout)?.join(&PAGE_BREAK.to_string()))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P, layout: PageLayout) -> Result<usize> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        let pages = self.paginate(layout)?;
        std::fs::write(path, pages.join(&PAGE_BREAK.to_string()))
            .with_context(|| format!("Failed to write report {:?}", path))?;
        info!("Report saved to {:?} ({} pages)", path, pages.len());
        Ok(pages.len())
    }
}

fn header(page: usize, total: usize, width: usize) -> String {
    let counter = format!("Page {} of {}", page, total);
    let gap = width
        .saturating_sub(REPORT_TITLE.chars().count() + counter.chars().count())
        .max(1);
    format!(
        "{}{}{}\n{}\n\n",
        REPORT_TITLE,
        " ".repeat(gap),
        counter,
        "=".repeat(width)
    )
}

/// Greedy word wrap; blank lines are kept and over-long words are cut
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut out = Vec::new();
    for paragraph in text.lines() {
        if paragraph.trim().is_empty() {
            out.push(String::new());
            continue;
        }
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            let mut word = word.to_string();
            while word.chars().count() > width {
                if !line.is_empty() {
                    out.push(std::mem::take(&mut line));
                }
                let head: String = word.chars().take(width).collect();
                word = word.chars().skip(width).collect();
                out.push(head);
            }
            if word.is_empty() {
                continue;
            }
            let needed = if line.is_empty() {
                word.chars().count()
            } else {
                line.chars().count() + 1 + word.chars().count()
            };
            if needed > width {
                out.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(&word);
        }
        if !line.is_empty() {
            out.push(line);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predict::Driver;
    use tempfile::TempDir;

    fn sample() -> RiskReport {
        let score = RiskScore::new(
            0.734,
            vec![Driver {
                feature: "feat_is_smoker".into(),
                description: "Current smoker".into(),
            }],
        );
        let plan = "Week 1: walk 20 minutes a day [Walk daily, source 1].\n\n\
                    Week 2: cut added salt [Keep sodium under 2300 mg, source 2]."
            .to_string();
        RiskReport::new(score, plan)
    }

    #[test]
    fn test_wrap() {
        assert_eq!(
            wrap("one two three four", 9),
            vec!["one two", "three", "four"]
        );
        assert_eq!(wrap("a\n\nb", 10), vec!["a", "", "b"]);
        assert_eq!(wrap("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn test_single_page_contents() {
        let pages = sample().paginate(PageLayout::default()).unwrap();
        assert_eq!(pages.len(), 1);
        let page = &pages[0];
        assert!(page.starts_with(REPORT_TITLE));
        assert!(page.lines().next().unwrap().ends_with("Page 1 of 1"));
        assert!(page.contains("Risk score: 0.73 (73.4%)"));
        assert!(page.contains("Risk level: HIGH"));
        assert!(page.contains("- Current smoker"));
        assert!(page.contains("Week 2: cut added salt"));
        assert!(page.contains("MEDICAL DISCLAIMER"));
    }

    #[test]
    fn test_every_page_has_header() {
        let layout = PageLayout {
            width: 40,
            lines_per_page: 6,
        };
        let pages = sample().paginate(layout).unwrap();
        assert!(pages.len() > 2);
        for (i, page) in pages.iter().enumerate() {
            let first = page.lines().next().unwrap();
            assert!(first.starts_with(REPORT_TITLE));
            assert!(first.ends_with(&format!("Page {} of {}", i + 1, pages.len())));
            assert!(page.lines().skip(1).all(|l| l.chars().count() <= 40));
        }
        assert!(pages.last().unwrap().contains("professional."));
    }

    #[test]
    fn test_save_writes_form_feeds() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reports").join("risk.txt");
        let layout = PageLayout {
            width: 60,
            lines_per_page: 10,
        };
        let count = sample().save(&path, layout).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches(PAGE_BREAK).count(), count - 1);
        assert_eq!(text, sample().render(layout).unwrap());
    }

    #[test]
    fn test_layout_too_small() {
        let layout = PageLayout {
            width: 10,
            lines_per_page: 5,
        };
        assert!(sample().paginate(layout).is_err());
    }
}

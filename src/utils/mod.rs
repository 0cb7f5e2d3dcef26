use anyhow::{Context, Result};
use std::path::Path;

/// Create a directory and its parents if missing
pub fn ensure_dir<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    if !path.as_os_str().is_empty() && !path.exists() {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {:?}", path))?;
    }
    Ok(())
}

/// Format seconds as a short human-readable duration
pub fn format_duration(secs: f64) -> String {
    if secs < 60.0 {
        format!("{:.1}s", secs)
    } else if secs < 3600.0 {
        format!("{:.1}m", secs / 60.0)
    } else {
        format!("{:.1}h", secs / 3600.0)
    }
}

/// Seeded randomness for reproducible splits
pub mod random {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(seed)
    }
}

/// Settings checks
pub mod validation {
    use anyhow::{bail, Result};
    use std::fmt::Display;

    /// Inclusive range check
    pub fn in_range<T: PartialOrd + Display>(value: T, min: T, max: T, name: &str) -> Result<()> {
        if value < min || value > max {
            bail!("{} must be between {} and {}, got {}", name, min, max, value);
        }
        Ok(())
    }

    pub fn positive<T: PartialOrd + Default + Display>(value: T, name: &str) -> Result<()> {
        if value <= T::default() {
            bail!("{} must be positive, got {}", name, value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(12.34), "12.3s");
        assert_eq!(format_duration(90.0), "1.5m");
        assert_eq!(format_duration(7200.0), "2.0h");
    }

    #[test]
    fn test_ensure_dir_nested() {
        let dir = tempfile::TempDir::new().unwrap();
        let nested = dir.path().join("models").join("kb");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
        // existing and empty paths are fine
        ensure_dir(&nested).unwrap();
        ensure_dir("").unwrap();
    }

    #[test]
    fn test_seeded_rng_is_reproducible() {
        let mut first = random::seeded_rng(42);
        let mut second = random::seeded_rng(42);
        let a: Vec<u32> = (0..5).map(|_| first.gen()).collect();
        let b: Vec<u32> = (0..5).map(|_| second.gen()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_validation() {
        assert!(validation::in_range(0.2, 0.0, 0.9, "val_ratio").is_ok());
        assert!(validation::in_range(0.95, 0.0, 0.9, "val_ratio").is_err());
        assert!(validation::positive(100usize, "n_rounds").is_ok());
        let err = validation::positive(0usize, "n_rounds").unwrap_err();
        assert_eq!(err.to_string(), "n_rounds must be positive, got 0");
    }
}

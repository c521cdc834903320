use core::time::Duration;
use std::path::PathBuf;

use crate::{scrape::DEFAULT_BASE_URL, util::default_workers};

/// Cohorts the service only splits at the median.
pub const MEDIAN_SPLIT: [&str; 7] = ["ACC", "CHOL", "DLBC", "KICH", "MESO", "UCS", "UVM"];

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// High/low expression percentiles sent with every survival query.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cutoffs {
    pub high: u8,
    pub low: u8,
}

impl Default for Cutoffs {
    fn default() -> Self {
        Self { high: 67, low: 33 }
    }
}

impl Cutoffs {
    pub const MEDIAN: Self = Self { high: 50, low: 50 };

    pub fn for_dataset(self, dataset: &str) -> Self {
        if MEDIAN_SPLIT.iter().any(|d| d.eq_ignore_ascii_case(dataset)) {
            Self::MEDIAN
        } else {
            self
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub output_dir: PathBuf,
    pub worker_count: usize,
    pub sample_size: Option<usize>,
    pub seed: Option<u64>,
    pub base_url: String,
    pub timeout: Duration,
    pub cutoffs: Cutoffs,
    pub progress: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("output"),
            worker_count: default_workers(),
            sample_size: None,
            seed: None,
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout: DEFAULT_TIMEOUT,
            cutoffs: Cutoffs::default(),
            progress: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_group_uses_half_split() {
        let c = Cutoffs::default();
        assert_eq!(c.for_dataset("UVM"), Cutoffs::MEDIAN);
        assert_eq!(c.for_dataset("kich"), Cutoffs::MEDIAN);
        assert_eq!(c.for_dataset("BRCA"), c);
    }

    #[test]
    fn overridden_cutoffs_survive_for_other_cohorts() {
        let c = Cutoffs { high: 75, low: 25 };
        assert_eq!(c.for_dataset("LUAD"), c);
        assert_eq!(c.for_dataset("ACC"), Cutoffs::MEDIAN);
    }

    #[test]
    fn defaults() {
        let config = Config::default();
        assert!(config.worker_count >= 4);
        assert_eq!(config.output_dir, PathBuf::from("output"));
        assert_eq!(config.cutoffs, Cutoffs { high: 67, low: 33 });
        assert!(config.sample_size.is_none());
    }
}

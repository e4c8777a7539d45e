// src/extractors/config.rs
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Thresholds used by the heuristic stages.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractorConfig {
    /// Minimum non-empty rows of a table of interest.
    pub min_rows: usize,
    /// Minimum non-empty columns of a table of interest.
    pub min_cols: usize,
    /// Minimum distinct vocabulary words of a table of interest.
    pub min_vocabulary: usize,
    /// How far the best candidate must lead the runner-up.
    pub dominance_ratio: f64,
    pub other_min_cols: usize,
    /// Word count an "other significant" table must exceed.
    pub other_min_words: usize,
    /// Characters of serialized table HTML used to locate it in the section.
    pub locate_prefix_chars: usize,
    /// Numbers in this range read as years in period labels.
    pub year_range: RangeInclusive<u32>,
    /// Minimum label-score difference between two programs.
    pub program_score_gap: i32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            min_rows: 4,
            min_cols: 5,
            min_vocabulary: 8,
            dominance_ratio: 1.3,
            other_min_cols: 3,
            other_min_words: 6,
            locate_prefix_chars: 700,
            year_range: 1990..=2025,
            program_score_gap: 2,
        }
    }
}

impl ExtractorConfig {
    /// Defaults, overridden by `REPURCHASE_*` environment variables when set.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(v) = parse_var(&lookup, "REPURCHASE_MIN_VOCABULARY") {
            config.min_vocabulary = v;
        }
        if let Some(v) = parse_var(&lookup, "REPURCHASE_DOMINANCE_RATIO") {
            config.dominance_ratio = v;
        }
        if let Some(v) = parse_var(&lookup, "REPURCHASE_MAX_YEAR") {
            config.year_range = *config.year_range.start()..=v;
        }
        if let Some(v) = parse_var(&lookup, "REPURCHASE_SCORE_GAP") {
            config.program_score_gap = v;
        }
        config
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => {
            tracing::debug!("Using {}={} from environment", key, raw);
            Some(value)
        }
        Err(_) => {
            tracing::warn!("Ignoring unparsable {}={:?}", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_lookup_overrides_and_ignores_garbage() {
        let vars: HashMap<&str, &str> = [
            ("REPURCHASE_MIN_VOCABULARY", "10"),
            ("REPURCHASE_MAX_YEAR", "2030"),
            ("REPURCHASE_DOMINANCE_RATIO", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let config = ExtractorConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.min_vocabulary, 10);
        assert_eq!(config.year_range, 1990..=2030);
        assert_eq!(config.dominance_ratio, 1.3);
        assert_eq!(config.program_score_gap, 2);
    }
}

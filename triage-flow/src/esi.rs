use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use tracing::warn;

/// Mid-severity level used when the nurse text yields no usable number
pub const DEFAULT_ESI_LEVEL: u32 = 3;

static ESI_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:ESI|Level)\s*(\d+)").expect("ESI pattern is valid"));

/// How a level was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EsiSource {
    Matched,
    Defaulted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EsiExtraction {
    pub level: u32,
    pub source: EsiSource,
}

impl EsiExtraction {
    /// Whether the level lies on the 1 (most urgent) to 5 scale
    pub fn in_range(&self) -> bool {
        (1..=5).contains(&self.level)
    }
}

/// Derives an integer severity from free-form nurse text
#[derive(Debug, Clone, Copy, Default)]
pub struct EsiExtractor;

impl EsiExtractor {
    pub fn new() -> Self {
        Self
    }

    /// First integer following "ESI" or "Level", or [`DEFAULT_ESI_LEVEL`].
    /// The result is not clamped to 1–5.
    pub fn extract(&self, text: &str) -> u32 {
        self.extract_detailed(text).level
    }

    pub fn extract_detailed(&self, text: &str) -> EsiExtraction {
        let parsed = ESI_PATTERN
            .captures(text)
            .and_then(|captures| captures.get(1))
            .and_then(|digits| digits.as_str().parse::<u32>().ok());

        match parsed {
            Some(level) => EsiExtraction {
                level,
                source: EsiSource::Matched,
            },
            None => {
                warn!(
                    default_level = DEFAULT_ESI_LEVEL,
                    "No ESI level found in nurse assessment, using default"
                );
                EsiExtraction {
                    level: DEFAULT_ESI_LEVEL,
                    source: EsiSource::Defaulted,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_first_level() {
        let extractor = EsiExtractor::new();
        assert_eq!(extractor.extract("ESI 2, unstable vitals"), 2);
        assert_eq!(extractor.extract("Level4 - urgent"), 4);
        assert_eq!(extractor.extract("assigned esi 1, then revised to ESI 2"), 1);
        assert_eq!(extractor.extract("Triage LEVEL   5"), 5);
    }

    #[test]
    fn test_defaults_when_no_level() {
        let extractor = EsiExtractor::new();
        let result = extractor.extract_detailed("no clear severity stated");
        assert_eq!(result.level, 3);
        assert_eq!(result.source, EsiSource::Defaulted);
        assert_eq!(extractor.extract(""), DEFAULT_ESI_LEVEL);
        // punctuation between keyword and number is not accepted
        assert_eq!(extractor.extract("ESI: 1"), DEFAULT_ESI_LEVEL);
    }

    #[test]
    fn test_overflowing_number_defaults() {
        let extractor = EsiExtractor::new();
        assert_eq!(extractor.extract("ESI 99999999999999999999"), DEFAULT_ESI_LEVEL);
    }

    #[test]
    fn test_out_of_range_is_reported_not_clamped() {
        let result = EsiExtractor::new().extract_detailed("ESI 7");
        assert_eq!(result.level, 7);
        assert_eq!(result.source, EsiSource::Matched);
        assert!(!result.in_range());
    }

    #[test]
    fn test_extract_is_idempotent() {
        let extractor = EsiExtractor::new();
        let text = "Recommend Level 2 given chest pain";
        assert_eq!(extractor.extract(text), extractor.extract(text));
    }
}

//! Prompt-injection screening for patient-supplied text.
//!
//! Matching is done on the lower-cased input against a fixed pattern list. The
//! guard is pure; what to do with a match is decided by
//! [`GuardMode`](crate::conversation::GuardMode) in the conversation controller.

use regex::Regex;
use std::sync::LazyLock;

static INJECTION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"ignore\s+(?:all\s+)?(?:the\s+|your\s+|any\s+)?(?:previous|prior|above)\s+(?:instructions?|rules?|prompts?)",
        r"disregard\s+(?:this|that|everything|all|the\s+above)",
        r"forget\s+(?:.*\s)?(?:previous|prior)",
        r"\bact\s+as\s+(?:a|an|my|the|if)\b",
        r"\b(?:system|you)\s+(?:are|is)\s+now\b",
        r"you\s+are\s+no\s+longer\s+an?\s+(?:ai|assistant|nurse)",
        r"new\s+instructions?\s*:",
        r"<\|im_start\|>|\[inst\]|<<sys>>",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("injection pattern is valid"))
    .collect()
});

/// Stateless classifier over a single text input
#[derive(Debug, Clone, Copy, Default)]
pub struct InjectionGuard;

impl InjectionGuard {
    pub fn new() -> Self {
        Self
    }

    pub fn is_suspicious(&self, text: &str) -> bool {
        self.matched_pattern(text).is_some()
    }

    /// The first pattern that matched, for logging
    pub fn matched_pattern(&self, text: &str) -> Option<&'static str> {
        let lowered = text.to_lowercase();
        INJECTION_PATTERNS
            .iter()
            .find(|pattern| pattern.is_match(&lowered))
            .map(|pattern| pattern.as_str())
    }
}

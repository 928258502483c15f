//! Query Classifier
//!
//! Pure classification of a user query against the registered mode set.
//! Same inputs, same output, always: no side effects, no stored state.

use regex::RegexBuilder;

use crate::models::mode::{ClassificationResult, Mode};

/// Strength of a regex pattern match
const REGEX_MATCH_STRENGTH: f32 = 1.0;

/// Base strength of a keyword match
const KEYWORD_BASE_STRENGTH: f32 = 0.6;

/// Per-keyword increment, counted up to `KEYWORD_COUNT_CAP` matches
const KEYWORD_INCREMENT: f32 = 0.1;

/// Matched keywords beyond this count no longer raise the strength
const KEYWORD_COUNT_CAP: usize = 4;

/// Classify a query against a mode set.
///
/// Modes are evaluated ordered by `priority` descending, ties broken by
/// registry insertion order (the order of the input slice). Per mode, any
/// regex match yields strength 1.0; otherwise case-insensitive substring
/// keyword matches yield `0.6 + 0.1 * min(matched, 4)`. A mode becomes the
/// result only when its strength strictly exceeds the running best, so the
/// highest-priority mode wins ties and a mode with no patterns is never
/// selected.
pub fn classify(query: &str, modes: &[Mode]) -> ClassificationResult {
    let mut ordered: Vec<&Mode> = modes.iter().collect();
    // Stable sort: registry insertion order survives equal priorities
    ordered.sort_by(|a, b| b.query_patterns.priority.cmp(&a.query_patterns.priority));

    let query_lower = query.to_lowercase();
    let mut best = ClassificationResult::none();

    for mode in ordered {
        let (strength, matched_pattern) = match_strength(query, &query_lower, mode);
        if strength > best.confidence {
            best = ClassificationResult {
                mode_id: Some(mode.id.clone()),
                confidence: strength,
                matched_pattern,
            };
        }
    }

    best
}

/// Compute one mode's match strength and the pattern responsible for it.
fn match_strength(query: &str, query_lower: &str, mode: &Mode) -> (f32, Option<String>) {
    for pattern in &mode.query_patterns.regex {
        let compiled = RegexBuilder::new(pattern).case_insensitive(true).build();
        match compiled {
            Ok(re) if re.is_match(query) => {
                return (REGEX_MATCH_STRENGTH, Some(pattern.clone()));
            }
            // Invalid patterns are skipped, never a panic
            _ => {}
        }
    }

    let mut matched_count = 0usize;
    let mut first_match: Option<String> = None;
    for keyword in &mode.query_patterns.keywords {
        if keyword.is_empty() {
            continue;
        }
        if query_lower.contains(&keyword.to_lowercase()) {
            matched_count += 1;
            if first_match.is_none() {
                first_match = Some(keyword.clone());
            }
        }
    }

    if matched_count == 0 {
        return (0.0, None);
    }

    let strength = KEYWORD_BASE_STRENGTH
        + KEYWORD_INCREMENT * matched_count.min(KEYWORD_COUNT_CAP) as f32;
    (strength.min(1.0), first_match)
}

//! Literal anchor lookup.
//!
//! Anchors are plain substrings, matched line by line. The first matching
//! line wins; later duplicates are ignored.

use crate::document::{LineIndex, SourceDocument};
use std::fmt;

/// Minimum similarity for a line to be reported as a near miss.
const NEAREST_LINE_THRESHOLD: f64 = 0.5;

/// Find the first line whose content contains `pattern`.
pub fn locate(document: &SourceDocument, pattern: &str) -> Option<LineIndex> {
    locate_from(document, pattern, 0)
}

/// Find the first line at or after `from` whose content contains `pattern`.
pub fn locate_from(document: &SourceDocument, pattern: &str, from: LineIndex) -> Option<LineIndex> {
    if pattern.is_empty() {
        return None;
    }
    document
        .lines()
        .enumerate()
        .skip(from)
        .find(|(_, line)| line.contains(pattern))
        .map(|(index, _)| index)
}

/// A line that resembles an anchor which could not be found.
#[derive(Debug, Clone, PartialEq)]
pub struct NearestLine {
    pub index: LineIndex,
    pub score: f64,
    pub text: String,
}

impl NearestLine {
    /// One-based line number for display.
    pub fn line_number(&self) -> usize {
        self.index + 1
    }
}

impl fmt::Display for NearestLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line_number(), self.text.trim())
    }
}

/// Best fuzzy candidate for a missing anchor, used for diagnostics only.
///
/// Each trimmed line is compared with the trimmed pattern using normalized
/// Levenshtein similarity. Ties keep the earliest line.
pub fn nearest_line(document: &SourceDocument, pattern: &str) -> Option<NearestLine> {
    let pattern = pattern.trim();
    if pattern.is_empty() {
        return None;
    }

    let mut best: Option<NearestLine> = None;
    for (index, line) in document.lines().enumerate() {
        let candidate = line.trim();
        if candidate.is_empty() {
            continue;
        }
        let score = strsim::normalized_levenshtein(pattern, candidate);
        if score < NEAREST_LINE_THRESHOLD {
            continue;
        }
        if best.as_ref().map_or(true, |b| score > b.score) {
            best = Some(NearestLine {
                index,
                score,
                text: candidate.to_string(),
            });
        }
    }
    best
}

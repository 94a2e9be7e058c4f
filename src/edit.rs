use crate::document::{LineIndex, SourceDocument};
use std::ops::Range;
use thiserror::Error;
use xxhash_rust::xxh3::xxh3_64;

/// The fundamental edit primitive: line-span replacement with verification.
///
/// Insertions and block replacements both compile down to this. An insertion
/// is an empty span; a replacement covers the block's lines.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "LineEdit does nothing until apply() is called"]
pub struct LineEdit {
    /// First line of the span (inclusive)
    pub start: LineIndex,
    /// End of the span (exclusive)
    pub end: LineIndex,
    /// Raw replacement lines, terminators included
    pub new_lines: Vec<String>,
    /// Expected text of the span before applying, if checked
    pub expected_before: Option<EditVerification>,
}

/// Verification strategy for edit safety.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditVerification {
    /// Exact text match required
    ExactMatch(String),
    /// xxh3 hash of expected text (faster for large spans)
    Hash(u64),
}

impl EditVerification {
    /// Check if the provided text matches the verification criteria.
    ///
    /// Trailing line terminators are ignored on both sides.
    pub fn matches(&self, text: &str) -> bool {
        let text = trim_trailing_newlines(text);
        match self {
            EditVerification::ExactMatch(expected) => text == trim_trailing_newlines(expected),
            EditVerification::Hash(expected_hash) => xxh3_64(text.as_bytes()) == *expected_hash,
        }
    }

    /// Create verification from text, using hash for text over 1KB.
    pub fn from_text(text: &str) -> Self {
        if text.len() > 1024 {
            EditVerification::Hash(content_hash(text))
        } else {
            EditVerification::ExactMatch(text.to_string())
        }
    }

    /// Parse a hex hash literal, with or without a `0x` prefix.
    pub fn parse_hash(literal: &str) -> Option<Self> {
        let digits = literal.trim().trim_start_matches("0x");
        if digits.is_empty() {
            return None;
        }
        u64::from_str_radix(digits, 16)
            .ok()
            .map(EditVerification::Hash)
    }
}

/// xxh3 hash of a span's text as used by [`EditVerification::Hash`].
pub fn content_hash(text: &str) -> u64 {
    xxh3_64(trim_trailing_newlines(text).as_bytes())
}

fn trim_trailing_newlines(text: &str) -> &str {
    text.trim_end_matches(['\r', '\n'])
}

#[derive(Error, Debug)]
pub enum EditError {
    #[error("Before-text verification failed at lines {start}..{end}")]
    BeforeTextMismatch {
        start: LineIndex,
        end: LineIndex,
        expected: String,
        found: String,
    },

    #[error("Invalid line range: [{start}, {end}) in document of {len} lines")]
    InvalidLineRange {
        start: LineIndex,
        end: LineIndex,
        len: usize,
    },
}

/// Result of applying an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "EditResult should be checked for success/already-applied"]
pub enum EditResult {
    /// Edit was applied
    Applied {
        lines_removed: usize,
        lines_inserted: usize,
    },
    /// Span already holds the new lines
    AlreadyApplied,
}

impl LineEdit {
    /// Insert lines before `at` without removing anything.
    pub fn insert(at: LineIndex, new_lines: Vec<String>) -> Self {
        Self {
            start: at,
            end: at,
            new_lines,
            expected_before: None,
        }
    }

    /// Replace the half-open line range.
    pub fn replace(range: Range<LineIndex>, new_lines: Vec<String>) -> Self {
        Self {
            start: range.start,
            end: range.end,
            new_lines,
            expected_before: None,
        }
    }

    pub fn with_verification(mut self, verification: EditVerification) -> Self {
        self.expected_before = Some(verification);
        self
    }

    /// Validate the edit against the document.
    ///
    /// Returns the current text of the span if validation succeeds.
    fn validate(&self, document: &SourceDocument) -> Result<String, EditError> {
        if self.start > self.end || self.end > document.len() {
            return Err(EditError::InvalidLineRange {
                start: self.start,
                end: self.end,
                len: document.len(),
            });
        }

        let current = document.slice_text(self.start..self.end);

        // Idempotency wins over verification: the span may already hold the new text
        if self.is_noop_for(&current) {
            return Ok(current);
        }

        if let Some(expected) = &self.expected_before {
            if !expected.matches(&current) {
                return Err(EditError::BeforeTextMismatch {
                    start: self.start,
                    end: self.end,
                    expected: format!("{:?}", expected),
                    found: current,
                });
            }
        }

        Ok(current)
    }

    fn is_noop_for(&self, current: &str) -> bool {
        self.start != self.end && current == self.new_lines.concat()
    }

    /// Apply this edit to an in-memory document.
    pub fn apply(&self, document: &mut SourceDocument) -> Result<EditResult, EditError> {
        let current = self.validate(document)?;

        if self.is_noop_for(&current) {
            return Ok(EditResult::AlreadyApplied);
        }

        document.splice(self.start..self.end, self.new_lines.clone());

        Ok(EditResult::Applied {
            lines_removed: self.end - self.start,
            lines_inserted: self.new_lines.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_edit_verification_exact_match() {
        let verify = EditVerification::ExactMatch("hello\nworld".to_string());
        assert!(verify.matches("hello\nworld\n"));
        assert!(!verify.matches("hello"));
    }

    #[test]
    fn test_edit_verification_hash() {
        let verify = EditVerification::Hash(content_hash("hello world\n"));
        assert!(verify.matches("hello world"));
        assert!(!verify.matches("goodbye world"));
    }

    #[test]
    fn test_edit_verification_from_text_large() {
        let text = "x".repeat(2000);
        assert!(matches!(
            EditVerification::from_text(&text),
            EditVerification::Hash(_)
        ));
        assert!(matches!(
            EditVerification::from_text("small"),
            EditVerification::ExactMatch(_)
        ));
    }

    #[test]
    fn test_parse_hash() {
        assert_eq!(
            EditVerification::parse_hash("0xff"),
            Some(EditVerification::Hash(255))
        );
        assert_eq!(
            EditVerification::parse_hash("FF"),
            Some(EditVerification::Hash(255))
        );
        assert_eq!(EditVerification::parse_hash("0x"), None);
        assert_eq!(EditVerification::parse_hash("xyz"), None);
    }

    #[test]
    fn test_insert_edit() {
        let mut doc = SourceDocument::from_text("a\nb\n");
        let result = LineEdit::insert(1, lines(&["x\n"])).apply(&mut doc).unwrap();
        assert_eq!(
            result,
            EditResult::Applied {
                lines_removed: 0,
                lines_inserted: 1
            }
        );
        assert_eq!(doc.to_text(), "a\nx\nb\n");
    }

    #[test]
    fn test_insert_at_end() {
        let mut doc = SourceDocument::from_text("a\n");
        LineEdit::insert(1, lines(&["b\n"])).apply(&mut doc).unwrap();
        assert_eq!(doc.to_text(), "a\nb\n");
    }

    #[test]
    fn test_replace_edit() {
        let mut doc = SourceDocument::from_text("a\nb\nc\nd\n");
        let result = LineEdit::replace(1..3, lines(&["X\n"]))
            .apply(&mut doc)
            .unwrap();
        assert_eq!(
            result,
            EditResult::Applied {
                lines_removed: 2,
                lines_inserted: 1
            }
        );
        assert_eq!(doc.to_text(), "a\nX\nd\n");
    }

    #[test]
    fn test_replace_idempotency() {
        let mut doc = SourceDocument::from_text("a\nb\nc\n");
        let result = LineEdit::replace(1..2, lines(&["b\n"]))
            .with_verification(EditVerification::ExactMatch("other".into()))
            .apply(&mut doc)
            .unwrap();
        assert_eq!(result, EditResult::AlreadyApplied);
        assert_eq!(doc.to_text(), "a\nb\nc\n");
    }

    #[test]
    fn test_verification_mismatch_leaves_document_untouched() {
        let mut doc = SourceDocument::from_text("a\nb\nc\n");
        let result = LineEdit::replace(0..2, lines(&["z\n"]))
            .with_verification(EditVerification::ExactMatch("a\nB".into()))
            .apply(&mut doc);
        assert!(matches!(result, Err(EditError::BeforeTextMismatch { .. })));
        assert_eq!(doc.to_text(), "a\nb\nc\n");
    }

    #[test]
    fn test_invalid_ranges() {
        let mut doc = SourceDocument::from_text("a\nb\n");
        let out_of_bounds = LineEdit::replace(1..5, Vec::new()).apply(&mut doc);
        assert!(matches!(
            out_of_bounds,
            Err(EditError::InvalidLineRange { .. })
        ));
        let inverted = LineEdit {
            start: 2,
            end: 1,
            new_lines: Vec::new(),
            expected_before: None,
        }
        .apply(&mut doc);
        assert!(matches!(inverted, Err(EditError::InvalidLineRange { .. })));
    }
}

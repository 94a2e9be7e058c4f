//! Sentinel-guarded snippet insertion.

use crate::document::{terminated_lines, LineIndex, SourceDocument};
use crate::edit::LineEdit;

/// Where a snippet goes relative to its anchor line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Before,
    After,
}

/// The sentinel was found; the snippet is already in the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlreadyApplied;

/// Whether a sentinel shows the snippet was inserted by an earlier run.
pub fn is_applied(document: &SourceDocument, sentinel: &str) -> bool {
    document.contains(sentinel)
}

/// Plan the insertion of `snippet` before `anchor_line`.
pub fn insert_before(
    document: &SourceDocument,
    anchor_line: LineIndex,
    snippet: &str,
    sentinel: &str,
) -> Result<LineEdit, AlreadyApplied> {
    plan_insertion(document, anchor_line, snippet, sentinel, Placement::Before)
}

/// Plan the insertion of `snippet` after `anchor_line`.
pub fn insert_after(
    document: &SourceDocument,
    anchor_line: LineIndex,
    snippet: &str,
    sentinel: &str,
) -> Result<LineEdit, AlreadyApplied> {
    plan_insertion(document, anchor_line, snippet, sentinel, Placement::After)
}

/// Build the [`LineEdit`] for an insertion, or report that the sentinel is
/// already present. Nothing in the document changes here.
///
/// Snippet lines take the anchor line's terminator, falling back to the
/// document's line ending when the anchor is an unterminated last line.
pub fn plan_insertion(
    document: &SourceDocument,
    anchor_line: LineIndex,
    snippet: &str,
    sentinel: &str,
    placement: Placement,
) -> Result<LineEdit, AlreadyApplied> {
    if is_applied(document, sentinel) {
        return Err(AlreadyApplied);
    }

    let anchor_ending = document.terminator(anchor_line);
    let ending = if anchor_ending.is_empty() {
        document.line_ending()
    } else {
        anchor_ending
    };

    match placement {
        Placement::Before => {
            let lines = terminated_lines(snippet, ending, ending);
            Ok(LineEdit::insert(anchor_line, lines))
        }
        Placement::After if anchor_ending.is_empty() => {
            // The anchor is the unterminated last line: terminate it and let
            // the snippet end without a newline, like the original file did.
            let anchor_text = document.line(anchor_line).unwrap_or_default();
            let mut lines = vec![format!("{anchor_text}{ending}")];
            lines.extend(terminated_lines(snippet, ending, ""));
            Ok(LineEdit::replace(anchor_line..anchor_line + 1, lines))
        }
        Placement::After => {
            let lines = terminated_lines(snippet, ending, ending);
            Ok(LineEdit::insert(anchor_line + 1, lines))
        }
    }
}

/// Number of lines a snippet contributes once inserted.
pub fn snippet_len(snippet: &str) -> usize {
    snippet.lines().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn twenty_lines_with_mark() -> SourceDocument {
        let text: String = (1..=20)
            .map(|n| {
                if n == 12 {
                    "    // MARK\n".to_string()
                } else {
                    format!("line {n}\n")
                }
            })
            .collect();
        SourceDocument::from_text(&text)
    }

    #[test]
    fn test_insert_before_scenario() {
        let mut doc = twenty_lines_with_mark();
        let original = doc.clone();
        let anchor = crate::anchor::locate(&doc, "MARK").unwrap();
        assert_eq!(anchor, 11);

        let edit = insert_before(&doc, anchor, "// A\n// B", "// A").unwrap();
        let _ = edit.apply(&mut doc).unwrap();

        assert_eq!(doc.len(), 22);
        for i in 0..11 {
            assert_eq!(doc.raw_line(i), original.raw_line(i));
        }
        assert_eq!(doc.line(11), Some("// A"));
        assert_eq!(doc.line(12), Some("// B"));
        assert_eq!(doc.raw_line(13), original.raw_line(11));
        assert_eq!(doc.raw_line(21), original.raw_line(19));
    }

    #[test]
    fn test_sentinel_blocks_second_insert() {
        let mut doc = twenty_lines_with_mark();
        let anchor = crate::anchor::locate(&doc, "MARK").unwrap();
        let _ = insert_before(&doc, anchor, "// A\n// B", "// A")
            .unwrap()
            .apply(&mut doc)
            .unwrap();

        let anchor = crate::anchor::locate(&doc, "MARK").unwrap();
        assert_eq!(
            insert_before(&doc, anchor, "// A\n// B", "// A"),
            Err(AlreadyApplied)
        );
    }

    #[test]
    fn test_snippet_adopts_crlf() {
        let mut doc = SourceDocument::from_text("a\r\nMARK\r\n");
        let _ = insert_before(&doc, 1, "x\ny\n", "x")
            .unwrap()
            .apply(&mut doc)
            .unwrap();
        assert_eq!(doc.to_text(), "a\r\nx\r\ny\r\nMARK\r\n");
    }

    #[test]
    fn test_insert_after() {
        let mut doc = SourceDocument::from_text("a\nMARK\nb\n");
        let _ = insert_after(&doc, 1, "x", "x")
            .unwrap()
            .apply(&mut doc)
            .unwrap();
        assert_eq!(doc.to_text(), "a\nMARK\nx\nb\n");
    }

    #[test]
    fn test_insert_after_unterminated_last_line() {
        let mut doc = SourceDocument::from_text("a\nMARK");
        let _ = insert_after(&doc, 1, "x\ny", "x")
            .unwrap()
            .apply(&mut doc)
            .unwrap();
        assert_eq!(doc.to_text(), "a\nMARK\nx\ny");
    }

    #[test]
    fn test_insert_before_unterminated_last_line() {
        let mut doc = SourceDocument::from_text("a\r\nMARK");
        let _ = insert_before(&doc, 1, "x", "x")
            .unwrap()
            .apply(&mut doc)
            .unwrap();
        assert_eq!(doc.to_text(), "a\r\nx\r\nMARK");
    }

    #[test]
    fn test_leading_blank_line_is_kept() {
        let mut doc = SourceDocument::from_text("MARK\n");
        let _ = insert_before(&doc, 0, "\n    // STEP 2.5\n", "STEP 2.5")
            .unwrap()
            .apply(&mut doc)
            .unwrap();
        assert_eq!(doc.to_text(), "\n    // STEP 2.5\nMARK\n");
        assert_eq!(snippet_len("\n    // STEP 2.5\n"), 2);
    }
}

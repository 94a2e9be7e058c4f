//! Patch applicator - runs an ordered list of operations against one file
//!
//! This module provides high-level patch application that:
//! - Resolves each operation against an in-memory working copy, in order
//! - Treats sentinel hits and unchanged blocks as idempotent no-ops
//! - Aborts the whole run on the first resolution failure
//! - Commits the result with a single atomic write

use crate::anchor::{self, NearestLine};
use crate::block::{self, BlockError, BlockRange, BoundaryFailure};
use crate::config::loader::ConfigError;
use crate::config::schema::{BoundaryKind, PatchConfig, PatchOperation};
use crate::document::{terminated_lines, LineIndex, SourceDocument};
use crate::edit::{content_hash, EditError, EditResult, LineEdit};
use crate::insert::{self, Placement};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

/// What happened to a single operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    /// Snippet inserted; `at` is the first inserted line
    Inserted { at: LineIndex, lines: usize },
    /// Block replaced; `range` is the original block
    Replaced { range: BlockRange, lines: usize },
    /// Sentinel present or block already equal to the replacement
    AlreadyApplied,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedOperation {
    /// Zero-based position in the operation list
    pub index: usize,
    pub kind: &'static str,
    pub status: OperationStatus,
}

impl fmt::Display for AppliedOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} {}: ", self.index + 1, self.kind)?;
        match &self.status {
            OperationStatus::Inserted { at, lines } => {
                write!(f, "inserted {} line(s) at line {}", lines, at + 1)
            }
            OperationStatus::Replaced { range, lines } => {
                write!(f, "replaced {} with {} line(s)", range, lines)
            }
            OperationStatus::AlreadyApplied => write!(f, "already applied"),
        }
    }
}

/// Outcome of a successful run: the patched document and one entry per
/// operation, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use = "PatchResult should be checked for changes"]
pub struct PatchResult {
    pub document: SourceDocument,
    pub operations: Vec<AppliedOperation>,
}

impl PatchResult {
    /// Whether any operation modified the document.
    pub fn changed(&self) -> bool {
        self.operations
            .iter()
            .any(|op| op.status != OperationStatus::AlreadyApplied)
    }

    pub fn applied_count(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| op.status != OperationStatus::AlreadyApplied)
            .count()
    }

    pub fn already_applied_count(&self) -> usize {
        self.operations.len() - self.applied_count()
    }
}

fn nearest_hint(nearest: &Option<NearestLine>) -> String {
    match nearest {
        Some(line) => format!(" (nearest match: {})", line),
        None => String::new(),
    }
}

/// Errors during patch application
#[derive(Error, Debug)]
pub enum ApplicationError {
    #[error("operation #{}: anchor '{anchor}' not found{}", .index + 1, nearest_hint(.nearest))]
    AnchorNotFound {
        index: usize,
        anchor: String,
        nearest: Option<NearestLine>,
    },

    #[error("operation #{}: declaration '{anchor}' not found{}", .index + 1, nearest_hint(.nearest))]
    DeclarationNotFound {
        index: usize,
        anchor: String,
        nearest: Option<NearestLine>,
    },

    #[error("operation #{}: block boundary not found for '{anchor}' declared at line {}: {reason}", .index + 1, .declaration_line + 1)]
    BoundaryNotFound {
        index: usize,
        anchor: String,
        declaration_line: LineIndex,
        reason: BoundaryFailure,
    },

    #[error("operation #{}: block '{anchor}' at {range} does not match the expected content (found xxh3 {found_hash:#018x})", .index + 1)]
    VerificationFailed {
        index: usize,
        anchor: String,
        range: BlockRange,
        found_hash: u64,
    },

    #[error("operation #{}: replacement for '{anchor}' is not exactly one balanced block", .index + 1)]
    MalformedReplacement { index: usize, anchor: String },

    #[error("operation #{}: {message}", .index + 1)]
    InvalidOperation { index: usize, message: String },

    #[error("operation #{}: edit failed: {source}", .index + 1)]
    Edit { index: usize, source: EditError },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ApplicationError {
    /// Stable process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            ApplicationError::AnchorNotFound { .. }
            | ApplicationError::DeclarationNotFound { .. } => 2,
            ApplicationError::BoundaryNotFound { .. }
            | ApplicationError::VerificationFailed { .. }
            | ApplicationError::Edit { .. } => 3,
            ApplicationError::Io { .. } => 4,
            ApplicationError::MalformedReplacement { .. }
            | ApplicationError::InvalidOperation { .. } => 5,
            ApplicationError::Config(e) => e.exit_code(),
        }
    }

    /// Zero-based index of the operation that failed, if any.
    pub fn operation_index(&self) -> Option<usize> {
        match self {
            ApplicationError::AnchorNotFound { index, .. }
            | ApplicationError::DeclarationNotFound { index, .. }
            | ApplicationError::BoundaryNotFound { index, .. }
            | ApplicationError::VerificationFailed { index, .. }
            | ApplicationError::MalformedReplacement { index, .. }
            | ApplicationError::InvalidOperation { index, .. }
            | ApplicationError::Edit { index, .. } => Some(*index),
            ApplicationError::Config(_) | ApplicationError::Io { .. } => None,
        }
    }

    /// One-based line number closest to the failure, when known.
    pub fn nearest_line_number(&self) -> Option<usize> {
        match self {
            ApplicationError::AnchorNotFound { nearest, .. }
            | ApplicationError::DeclarationNotFound { nearest, .. } => {
                nearest.as_ref().map(NearestLine::line_number)
            }
            ApplicationError::BoundaryNotFound {
                declaration_line, ..
            } => Some(declaration_line + 1),
            ApplicationError::VerificationFailed { range, .. } => Some(range.start + 1),
            _ => None,
        }
    }
}

/// Options for [`apply_to_file`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Resolve and apply in memory only; never write
    pub dry_run: bool,
}

/// Result of running operations against a file on disk.
#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    /// File content before the run
    pub original: String,
    pub result: PatchResult,
    /// Whether the file was rewritten
    pub written: bool,
}

/// Apply operations, in order, to a copy of `document`.
///
/// The input document is never modified. The first operation that fails to
/// resolve aborts the run and its error is returned.
pub fn apply(
    document: &SourceDocument,
    operations: &[PatchOperation],
) -> Result<PatchResult, ApplicationError> {
    let mut working = document.clone();
    let mut applied = Vec::with_capacity(operations.len());

    for (index, operation) in operations.iter().enumerate() {
        let status = apply_operation(&mut working, index, operation)?;
        debug!(
            index = index + 1,
            kind = operation.kind(),
            ?status,
            "operation resolved"
        );
        applied.push(AppliedOperation {
            index,
            kind: operation.kind(),
            status,
        });
    }

    Ok(PatchResult {
        document: working,
        operations: applied,
    })
}

fn apply_operation(
    working: &mut SourceDocument,
    index: usize,
    operation: &PatchOperation,
) -> Result<OperationStatus, ApplicationError> {
    match operation {
        PatchOperation::InsertBefore {
            anchor, snippet, ..
        } => apply_insert(working, index, operation, anchor, snippet, Placement::Before),
        PatchOperation::InsertAfter {
            anchor, snippet, ..
        } => apply_insert(working, index, operation, anchor, snippet, Placement::After),
        PatchOperation::ReplaceBlock {
            declaration_anchor,
            next_marker,
            strategy,
            replacement,
            verify,
        } => {
            if !block::is_balanced(replacement) {
                return Err(ApplicationError::MalformedReplacement {
                    index,
                    anchor: declaration_anchor.clone(),
                });
            }
            let boundary = strategy.strategy(next_marker.as_deref()).ok_or_else(|| {
                ApplicationError::InvalidOperation {
                    index,
                    message: format!("{} strategy requires next_marker", strategy),
                }
            })?;

            let range = block::extract_block(working, declaration_anchor, boundary.as_ref())
                .map_err(|error| match error {
                    BlockError::DeclarationNotFound { anchor } => {
                        ApplicationError::DeclarationNotFound {
                            index,
                            nearest: anchor::nearest_line(working, &anchor),
                            anchor,
                        }
                    }
                    BlockError::BoundaryNotFound {
                        anchor,
                        declaration_line,
                        reason,
                    } => ApplicationError::BoundaryNotFound {
                        index,
                        anchor,
                        declaration_line,
                        reason,
                    },
                })?;

            // Anything outside the block would be left behind and duplicated on re-run
            let follower = match strategy {
                BoundaryKind::NextMarker => next_marker.as_deref(),
                BoundaryKind::BraceDepth => None,
            };
            if !block::spans_whole_block(replacement, declaration_anchor, boundary.as_ref(), follower)
            {
                return Err(ApplicationError::MalformedReplacement {
                    index,
                    anchor: declaration_anchor.clone(),
                });
            }

            let end_terminator = working.terminator(range.end);
            let ending = if end_terminator.is_empty() {
                working.line_ending()
            } else {
                end_terminator
            };
            let new_lines = terminated_lines(replacement, ending, end_terminator);
            let lines = new_lines.len();

            let mut edit = LineEdit::replace(range.as_range(), new_lines);
            if let Some(verify) = verify {
                let verification = verify
                    .to_verification()
                    .map_err(|message| ApplicationError::InvalidOperation { index, message })?;
                edit = edit.with_verification(verification);
            }

            match edit.apply(working) {
                Ok(EditResult::Applied { .. }) => Ok(OperationStatus::Replaced { range, lines }),
                Ok(EditResult::AlreadyApplied) => Ok(OperationStatus::AlreadyApplied),
                Err(EditError::BeforeTextMismatch { found, .. }) => {
                    Err(ApplicationError::VerificationFailed {
                        index,
                        anchor: declaration_anchor.clone(),
                        range,
                        found_hash: content_hash(&found),
                    })
                }
                Err(source) => Err(ApplicationError::Edit { index, source }),
            }
        }
    }
}

fn apply_insert(
    working: &mut SourceDocument,
    index: usize,
    operation: &PatchOperation,
    anchor_text: &str,
    snippet: &str,
    placement: Placement,
) -> Result<OperationStatus, ApplicationError> {
    let sentinel = operation
        .sentinel()
        .ok_or_else(|| ApplicationError::InvalidOperation {
            index,
            message: "snippet is empty and no sentinel was given".to_string(),
        })?;

    // Checked before the anchor so a re-run succeeds even if the anchor drifted
    if insert::is_applied(working, &sentinel) {
        debug!(index = index + 1, sentinel = %sentinel, "sentinel present, skipping insert");
        return Ok(OperationStatus::AlreadyApplied);
    }

    let anchor_line =
        anchor::locate(working, anchor_text).ok_or_else(|| ApplicationError::AnchorNotFound {
            index,
            anchor: anchor_text.to_string(),
            nearest: anchor::nearest_line(working, anchor_text),
        })?;

    let edit = match insert::plan_insertion(working, anchor_line, snippet, &sentinel, placement) {
        Ok(edit) => edit,
        Err(insert::AlreadyApplied) => return Ok(OperationStatus::AlreadyApplied),
    };
    match edit.apply(working) {
        Ok(EditResult::Applied { .. }) => {
            let at = match placement {
                Placement::Before => anchor_line,
                Placement::After => anchor_line + 1,
            };
            Ok(OperationStatus::Inserted {
                at,
                lines: insert::snippet_len(snippet),
            })
        }
        Ok(EditResult::AlreadyApplied) => Ok(OperationStatus::AlreadyApplied),
        Err(source) => Err(ApplicationError::Edit { index, source }),
    }
}

/// Load `path`, apply `operations`, and commit atomically when something
/// changed. Nothing is written on failure, in dry-run mode, or when every
/// operation was already applied.
pub fn apply_to_file(
    path: impl AsRef<Path>,
    operations: &[PatchOperation],
    options: ApplyOptions,
) -> Result<FileOutcome, ApplicationError> {
    let path = path.as_ref();
    let io_error = |source| ApplicationError::Io {
        path: path.to_path_buf(),
        source,
    };

    let document = SourceDocument::load(path).map_err(io_error)?;
    let result = apply(&document, operations)?;

    let written = result.changed() && !options.dry_run;
    if written {
        result.document.commit(path).map_err(io_error)?;
        info!(
            path = %path.display(),
            applied = result.applied_count(),
            lines = result.document.len(),
            "committed patched document"
        );
    }

    Ok(FileOutcome {
        path: path.to_path_buf(),
        original: document.to_text(),
        result,
        written,
    })
}

/// Read-only run: reports what `apply_to_file` would do.
pub fn check_file(
    path: impl AsRef<Path>,
    operations: &[PatchOperation],
) -> Result<FileOutcome, ApplicationError> {
    apply_to_file(path, operations, ApplyOptions { dry_run: true })
}

/// Apply a loaded patch configuration to its target file.
pub fn apply_patches(
    config: &PatchConfig,
    target: &Path,
    options: ApplyOptions,
) -> Result<FileOutcome, ApplicationError> {
    apply_to_file(target, &config.operations, options)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_then_replace_in_order() {
        let doc = SourceDocument::from_text(
            "class A {\n    /**\n     * f\n     */\n    function f() {\n        old();\n    }\n\n    /**\n     * g\n     */\n    function g() {\n    }\n}\n",
        );
        let ops = vec![
            PatchOperation::replace_block("function f()", "/**", "    function f() {\n        new();\n    }"),
            PatchOperation::insert_before("function g()", "    // marker-g", "marker-g"),
        ];

        let result = apply(&doc, &ops).unwrap();
        assert!(result.changed());
        assert_eq!(
            result.operations[0].status,
            OperationStatus::Replaced {
                range: BlockRange { start: 4, end: 6 },
                lines: 3
            }
        );
        assert_eq!(
            result.operations[1].status,
            OperationStatus::Inserted { at: 11, lines: 1 }
        );
        let text = result.document.to_text();
        assert!(text.contains("        new();\n"));
        assert!(!text.contains("old();"));
        assert!(text.contains("    // marker-g\n    function g() {\n"));
    }

    #[test]
    fn test_second_run_is_noop() {
        let doc = SourceDocument::from_text("a\nMARK\nfunction f() {\n}\n/**\n");
        let ops = vec![
            PatchOperation::insert_before("MARK", "// A\n// B", "// A"),
            PatchOperation::replace_block("function f", "/**", "function f() {\n    x();\n}"),
        ];
        let first = apply(&doc, &ops).unwrap();
        let second = apply(&first.document, &ops).unwrap();
        assert!(!second.changed());
        assert_eq!(second.already_applied_count(), 2);
        assert_eq!(second.document, first.document);
    }

    #[test]
    fn test_failure_aborts_and_reports_index() {
        let doc = SourceDocument::from_text("a\nMARK\n");
        let ops = vec![
            PatchOperation::insert_before("MARK", "// A", "// A"),
            PatchOperation::insert_before("MISSING", "// B", "// B"),
        ];
        let err = apply(&doc, &ops).unwrap_err();
        assert_eq!(err.operation_index(), Some(1));
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().starts_with("operation #2: anchor 'MISSING' not found"));
    }

    #[test]
    fn test_drifted_anchor_reports_nearest_line() {
        let doc = SourceDocument::from_text("<?php\n// STEP 3: Force regenerate the metadata\n");
        let ops = vec![PatchOperation::insert_before(
            "// STEP 3: Force regenerate metadata",
            "// STEP 2.5",
            "STEP 2.5",
        )];
        let err = apply(&doc, &ops).unwrap_err();
        assert_eq!(err.nearest_line_number(), Some(2));
        assert!(err.to_string().contains("nearest match: line 2"));
    }

    #[test]
    fn test_malformed_replacement() {
        let doc = SourceDocument::from_text("function f() {\n}\n/**\n");
        let ops = vec![PatchOperation::replace_block("function f", "/**", "function f() {")];
        let err = apply(&doc, &ops).unwrap_err();
        assert!(matches!(err, ApplicationError::MalformedReplacement { index: 0, .. }));
        assert_eq!(err.exit_code(), 5);
    }

    #[test]
    fn test_boundary_not_found_exit_code() {
        let doc = SourceDocument::from_text("function f() {\n}\n");
        let ops = vec![PatchOperation::replace_block("function f", "/**", "function f() {\n}")];
        let err = apply(&doc, &ops).unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert_eq!(err.nearest_line_number(), Some(1));
    }

    #[test]
    fn test_verification_failure() {
        let doc = SourceDocument::from_text("function f() {\n    old();\n}\n/**\n");
        let ops = vec![PatchOperation::ReplaceBlock {
            declaration_anchor: "function f".into(),
            next_marker: Some("/**".into()),
            strategy: crate::config::BoundaryKind::NextMarker,
            replacement: "function f() {\n    new();\n}".into(),
            verify: Some(crate::config::Verify::ExactMatch {
                expected_text: "function f() {\n    something_else();\n}".into(),
            }),
        }];
        let err = apply(&doc, &ops).unwrap_err();
        assert!(matches!(err, ApplicationError::VerificationFailed { .. }));
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_identical_replacement_is_already_applied() {
        let text = "x\nfunction f() {\n    body();\n}\n\n/**\n";
        let doc = SourceDocument::from_text(text);
        let ops = vec![PatchOperation::replace_block(
            "function f",
            "/**",
            "function f() {\n    body();\n}\n",
        )];
        let result = apply(&doc, &ops).unwrap();
        assert_eq!(result.operations[0].status, OperationStatus::AlreadyApplied);
        assert_eq!(result.document.to_text(), text);
    }

    #[test]
    fn test_padded_replacement_is_rejected_before_editing() {
        let doc = SourceDocument::from_text("function f() {\n    old();\n}\n\n/**\n");
        for replacement in [
            "function f() {\n    new();\n}\n\n",
            "\nfunction f() {\n    new();\n}\n",
            "function f() {\n    new();\n}\n// end of f\n",
        ] {
            let ops = vec![PatchOperation::replace_block("function f", "/**", replacement)];
            let err = apply(&doc, &ops).unwrap_err();
            assert!(
                matches!(err, ApplicationError::MalformedReplacement { index: 0, .. }),
                "{replacement:?}: {err}"
            );
            assert_eq!(err.exit_code(), 5);
        }
    }

    #[test]
    fn test_replace_block_is_stable_over_repeated_runs() {
        let doc = SourceDocument::from_text("function f() {\n    old();\n}\n\n/**\n");
        let ops = vec![PatchOperation::replace_block(
            "function f",
            "/**",
            "function f() {\n    new();\n}\n",
        )];

        let first = apply(&doc, &ops).unwrap();
        let expected = "function f() {\n    new();\n}\n\n/**\n";
        assert_eq!(first.document.to_text(), expected);

        let mut current = first.document;
        for _ in 0..3 {
            let again = apply(&current, &ops).unwrap();
            assert_eq!(again.operations[0].status, OperationStatus::AlreadyApplied);
            assert_eq!(again.document.to_text(), expected);
            current = again.document;
        }
    }

    #[test]
    fn test_display_of_applied_operation() {
        let op = AppliedOperation {
            index: 0,
            kind: "replace_block",
            status: OperationStatus::Replaced {
                range: BlockRange { start: 9, end: 13 },
                lines: 3,
            },
        };
        assert_eq!(op.to_string(), "#1 replace_block: replaced lines 10-14 with 3 line(s)");
    }
}

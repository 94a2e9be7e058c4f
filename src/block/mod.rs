//! Heuristic block boundary detection.
//!
//! A block starts at the line holding a declaration anchor. Where it ends is
//! decided by a [`BoundaryStrategy`]; none of them parse the language, they
//! only look at lines and braces. Strategies report failure as a value so the
//! caller can abort instead of patching the wrong lines.

pub mod depth;
pub mod marker;
pub mod scanner;

use crate::anchor;
use crate::document::{LineIndex, SourceDocument};
use std::fmt;
use thiserror::Error;
use tracing::debug;

pub use depth::BraceDepthBoundary;
pub use marker::{find_nearest_closing_brace_before, find_upper_bound, NextMarkerBoundary};
pub use scanner::is_balanced;

/// Inclusive line range of a block. `start <= end` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub start: LineIndex,
    pub end: LineIndex,
}

impl BlockRange {
    /// Returns `None` when `end < start`.
    pub fn new(start: LineIndex, end: LineIndex) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// Half-open form for slicing and edits.
    pub fn as_range(&self) -> std::ops::Range<LineIndex> {
        self.start..self.end + 1
    }

    /// Raw text of the block, terminators included.
    pub fn text(&self, document: &SourceDocument) -> String {
        document.slice_text(self.as_range())
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lines {}-{}", self.start + 1, self.end + 1)
    }
}

/// Why a strategy could not settle on an end line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundaryFailure {
    /// No line after the declaration contains the next-member marker
    MarkerNotFound { marker: String },
    /// No lone `}` between the declaration and the marker line
    NoClosingBrace { upper_bound: LineIndex },
    /// The candidate block does not close the braces it opens
    Unbalanced { candidate_end: LineIndex },
    /// No `{` after the declaration
    NeverOpened,
    /// End of document reached before the block closed
    NeverClosed,
    /// The strategy returned a line past the end of the document
    OutOfRange { end: LineIndex, len: usize },
}

impl fmt::Display for BoundaryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundaryFailure::MarkerNotFound { marker } => {
                write!(f, "next-member marker '{}' not found after declaration", marker)
            }
            BoundaryFailure::NoClosingBrace { upper_bound } => write!(
                f,
                "no lone closing brace before marker at line {}",
                upper_bound + 1
            ),
            BoundaryFailure::Unbalanced { candidate_end } => write!(
                f,
                "closing brace at line {} leaves the block unbalanced",
                candidate_end + 1
            ),
            BoundaryFailure::NeverOpened => write!(f, "no opening brace after declaration"),
            BoundaryFailure::NeverClosed => write!(f, "block is never closed"),
            BoundaryFailure::OutOfRange { end, len } => write!(
                f,
                "block end line {} is past the end of the document ({} lines)",
                end + 1,
                len
            ),
        }
    }
}

/// Capability for finding the last line of a block.
///
/// Implementations get the declaration line and return the inclusive end
/// line. Swapping in a lexer-aware detector only requires another impl.
pub trait BoundaryStrategy {
    fn name(&self) -> &'static str;

    fn block_end(
        &self,
        document: &SourceDocument,
        declaration_start: LineIndex,
    ) -> Result<LineIndex, BoundaryFailure>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlockError {
    #[error("declaration not found: '{anchor}'")]
    DeclarationNotFound { anchor: String },

    #[error("block boundary not found for '{anchor}' declared at line {}: {reason}", .declaration_line + 1)]
    BoundaryNotFound {
        anchor: String,
        declaration_line: LineIndex,
        reason: BoundaryFailure,
    },
}

/// Locate a declaration and the block it opens.
pub fn extract_block(
    document: &SourceDocument,
    declaration_anchor: &str,
    strategy: &dyn BoundaryStrategy,
) -> Result<BlockRange, BlockError> {
    let start = anchor::locate(document, declaration_anchor).ok_or_else(|| {
        BlockError::DeclarationNotFound {
            anchor: declaration_anchor.to_string(),
        }
    })?;

    let boundary_error = |reason| BlockError::BoundaryNotFound {
        anchor: declaration_anchor.to_string(),
        declaration_line: start,
        reason,
    };

    let end = strategy
        .block_end(document, start)
        .map_err(&boundary_error)?;
    if end >= document.len() {
        return Err(boundary_error(BoundaryFailure::OutOfRange {
            end,
            len: document.len(),
        }));
    }
    let range = BlockRange::new(start, end).ok_or_else(|| {
        boundary_error(BoundaryFailure::Unbalanced { candidate_end: end })
    })?;

    debug!(
        strategy = strategy.name(),
        anchor = declaration_anchor,
        %range,
        "extracted block"
    );
    Ok(range)
}

/// Whether `replacement`, once written, is found again as exactly one whole
/// block: declaration on its first line, block end on its last.
///
/// `follower` is appended as the line after the replacement, standing in for
/// whatever comes next in the target (the next-member marker).
pub fn spans_whole_block(
    replacement: &str,
    declaration_anchor: &str,
    strategy: &dyn BoundaryStrategy,
    follower: Option<&str>,
) -> bool {
    let len = replacement.lines().count();
    let mut text: String = replacement.lines().map(|line| format!("{line}\n")).collect();
    if let Some(follower) = follower {
        text.push_str(follower);
        text.push('\n');
    }

    let document = SourceDocument::from_text(&text);
    matches!(
        extract_block(&document, declaration_anchor, strategy),
        Ok(range) if range.start == 0 && range.end + 1 == len
    )
}

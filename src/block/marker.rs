//! Next-marker boundary heuristic.
//!
//! The block's window runs from the declaration to the first following line
//! that carries a "next member" marker, typically the `/**` opening the next
//! doc comment. Inside that window the lone `}` closest to the marker is
//! taken as the end of the block.

use super::scanner::is_balanced;
use super::{BoundaryFailure, BoundaryStrategy};
use crate::document::{LineIndex, SourceDocument};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NextMarkerBoundary {
    pub marker: String,
}

impl NextMarkerBoundary {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

impl BoundaryStrategy for NextMarkerBoundary {
    fn name(&self) -> &'static str {
        "next-marker"
    }

    fn block_end(
        &self,
        document: &SourceDocument,
        declaration_start: LineIndex,
    ) -> Result<LineIndex, BoundaryFailure> {
        let upper_bound = find_upper_bound(document, declaration_start, &self.marker).ok_or_else(
            || BoundaryFailure::MarkerNotFound {
                marker: self.marker.clone(),
            },
        )?;

        let end = find_nearest_closing_brace_before(document, declaration_start, upper_bound)
            .ok_or(BoundaryFailure::NoClosingBrace { upper_bound })?;

        // The lone brace may close an inner block; refuse rather than guess
        let block = document.slice_text(declaration_start..end + 1);
        if !is_balanced(&block) {
            debug!(
                candidate_end = end + 1,
                upper_bound = upper_bound + 1,
                "lone closing brace does not balance the block"
            );
            return Err(BoundaryFailure::Unbalanced { candidate_end: end });
        }

        Ok(end)
    }
}

/// First line after `declaration_start` containing `marker`.
pub fn find_upper_bound(
    document: &SourceDocument,
    declaration_start: LineIndex,
    marker: &str,
) -> Option<LineIndex> {
    crate::anchor::locate_from(document, marker, declaration_start + 1)
}

/// Scanning backward from the line before `upper_bound`, the first line
/// whose trimmed content is exactly `}`. The declaration line itself is
/// never a candidate.
pub fn find_nearest_closing_brace_before(
    document: &SourceDocument,
    declaration_start: LineIndex,
    upper_bound: LineIndex,
) -> Option<LineIndex> {
    (declaration_start + 1..upper_bound)
        .rev()
        .find(|&index| document.line(index).map(str::trim) == Some("}"))
}

//! Brace-depth boundary: follow nesting from the declaration line until the
//! first `{` is closed again. Needs no next-member marker.

use super::scanner::BraceScanner;
use super::{BoundaryFailure, BoundaryStrategy};
use crate::document::{LineIndex, SourceDocument};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BraceDepthBoundary;

impl BoundaryStrategy for BraceDepthBoundary {
    fn name(&self) -> &'static str {
        "brace-depth"
    }

    fn block_end(
        &self,
        document: &SourceDocument,
        declaration_start: LineIndex,
    ) -> Result<LineIndex, BoundaryFailure> {
        let mut scanner = BraceScanner::new();

        for (index, line) in document.lines().enumerate().skip(declaration_start) {
            scanner.scan_line(line);
            if scanner.underflowed() {
                return Err(BoundaryFailure::Unbalanced {
                    candidate_end: index,
                });
            }
            if scanner.opened() && scanner.depth() == 0 {
                return Ok(index);
            }
        }

        if scanner.opened() {
            Err(BoundaryFailure::NeverClosed)
        } else {
            Err(BoundaryFailure::NeverOpened)
        }
    }
}

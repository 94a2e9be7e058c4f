//! Anchor Patcher: idempotent anchor-based text patching
//!
//! Patches a single text file by inserting snippets next to anchor lines
//! and replacing whole declaration blocks found by heuristic boundary
//! detection. No parser for the patched language is involved.
//!
//! # Architecture
//!
//! Every operation compiles down to a single primitive: [`LineEdit`], a
//! verified line-span replacement on an in-memory [`SourceDocument`].
//! Intelligence lives in locating the span (anchors, sentinels, block
//! boundaries), not in applying it.
//!
//! # Safety
//!
//! - Operations apply in order to a working copy; the first failure aborts
//!   the run before anything is written
//! - Atomic file writes (tempfile + fsync + rename)
//! - Sentinels make inserts idempotent; unchanged blocks are no-ops
//! - Line terminators are preserved byte-for-byte
//! - Boundary heuristics report failure instead of guessing
//!
//! # Example
//!
//! ```
//! use anchor_patcher::{apply, PatchOperation, SourceDocument};
//!
//! let document = SourceDocument::from_text("setup();\n// STEP 3\nrun();\n");
//! let operations = [PatchOperation::insert_before(
//!     "// STEP 3",
//!     "// STEP 2.5\nextra();",
//!     "STEP 2.5",
//! )];
//!
//! let result = apply(&document, &operations).unwrap();
//! assert_eq!(
//!     result.document.to_text(),
//!     "setup();\n// STEP 2.5\nextra();\n// STEP 3\nrun();\n"
//! );
//!
//! // Running again is a no-op
//! let again = apply(&result.document, &operations).unwrap();
//! assert!(!again.changed());
//! ```

pub mod anchor;
pub mod block;
pub mod config;
pub mod document;
pub mod edit;
pub mod insert;

// Re-exports
pub use anchor::{locate, nearest_line, NearestLine};
pub use block::{
    extract_block, BlockError, BlockRange, BoundaryFailure, BoundaryStrategy, BraceDepthBoundary,
    NextMarkerBoundary,
};
pub use config::{
    apply, apply_patches, apply_to_file, check_file, load_from_path, load_from_str, load_inline,
    AppliedOperation, ApplicationError, ApplyOptions, BoundaryKind, ConfigError, FileOutcome,
    OperationStatus, PatchConfig, PatchOperation, PatchResult,
};
pub use document::{LineIndex, SourceDocument};
pub use edit::{EditError, EditResult, EditVerification, LineEdit};

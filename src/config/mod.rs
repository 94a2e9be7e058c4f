pub mod applicator;
pub mod loader;
pub mod schema;

pub use applicator::{
    apply, apply_patches, apply_to_file, check_file, AppliedOperation, ApplicationError,
    ApplyOptions, FileOutcome, OperationStatus, PatchResult,
};
pub use loader::{
    load_from_json_str, load_from_path, load_from_str, load_inline, resolve_target, ConfigError,
    SpecFormat,
};
pub use schema::{
    BoundaryKind, HashAlgorithm, Metadata, PatchConfig, PatchOperation, ValidationError,
    ValidationIssue, Verify,
};

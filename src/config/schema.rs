use crate::block::{
    is_balanced, spans_whole_block, BoundaryStrategy, BraceDepthBoundary, NextMarkerBoundary,
};
use crate::edit::EditVerification;
use serde::Deserialize;
use std::fmt;

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct PatchConfig {
    #[serde(default)]
    pub meta: Metadata,
    #[serde(default)]
    pub operations: Vec<PatchOperation>,
}

impl PatchConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.operations.is_empty() {
            issues.push(ValidationIssue::EmptyOperationList);
        }

        for (index, operation) in self.operations.iter().enumerate() {
            validate_operation(index, operation, &mut issues);
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { issues })
        }
    }
}

fn validate_operation(index: usize, operation: &PatchOperation, issues: &mut Vec<ValidationIssue>) {
    let missing = |field: &'static str| ValidationIssue::MissingField { index, field };
    let invalid = |message: String| ValidationIssue::InvalidCombo { index, message };

    match operation {
        PatchOperation::InsertBefore {
            anchor,
            snippet,
            sentinel,
        }
        | PatchOperation::InsertAfter {
            anchor,
            snippet,
            sentinel,
        } => {
            if anchor.trim().is_empty() {
                issues.push(missing("anchor"));
            }
            if snippet.trim().is_empty() {
                issues.push(missing("snippet"));
                return;
            }
            if matches!(sentinel, Some(s) if s.trim().is_empty()) {
                issues.push(missing("sentinel"));
                return;
            }
            if let Some(sentinel) = operation.sentinel() {
                if !snippet.contains(sentinel.as_str()) {
                    issues.push(invalid(format!(
                        "sentinel '{sentinel}' does not occur in the snippet, so re-runs would insert it again"
                    )));
                }
            }
        }
        PatchOperation::ReplaceBlock {
            declaration_anchor,
            next_marker,
            strategy,
            replacement,
            verify,
        } => {
            if declaration_anchor.trim().is_empty() {
                issues.push(missing("declaration_anchor"));
            }
            if *strategy == BoundaryKind::NextMarker
                && next_marker.as_deref().unwrap_or("").trim().is_empty()
            {
                issues.push(missing("next_marker"));
            }
            if replacement.trim().is_empty() {
                issues.push(missing("replacement"));
            } else {
                let balanced = is_balanced(replacement);
                if !balanced {
                    issues.push(ValidationIssue::UnbalancedReplacement { index });
                }
                let keeps_anchor = !declaration_anchor.trim().is_empty()
                    && replacement.contains(declaration_anchor.as_str());
                if !declaration_anchor.trim().is_empty() && !keeps_anchor {
                    issues.push(invalid(
                        "replacement does not contain the declaration anchor, so re-runs could not find the block"
                            .to_string(),
                    ));
                }
                if balanced && keeps_anchor {
                    let follower = match strategy {
                        BoundaryKind::NextMarker => next_marker.as_deref(),
                        BoundaryKind::BraceDepth => None,
                    };
                    if let Some(boundary) = strategy.strategy(follower) {
                        if !spans_whole_block(
                            replacement,
                            declaration_anchor,
                            boundary.as_ref(),
                            follower,
                        ) {
                            issues.push(ValidationIssue::ReplacementNotWholeBlock { index });
                        }
                    }
                }
            }
            if let Some(verify) = verify {
                if let Err(message) = verify.to_verification() {
                    issues.push(invalid(message));
                }
            }
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct Metadata {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Target file, relative to the patch file's directory
    #[serde(default)]
    pub target: Option<String>,
}

/// One step of a patch run.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PatchOperation {
    /// Insert `snippet` immediately before the first line containing `anchor`
    InsertBefore {
        anchor: String,
        snippet: String,
        #[serde(default)]
        sentinel: Option<String>,
    },
    /// Insert `snippet` immediately after the first line containing `anchor`
    InsertAfter {
        anchor: String,
        snippet: String,
        #[serde(default)]
        sentinel: Option<String>,
    },
    /// Replace the block opened on the first line containing `declaration_anchor`
    ReplaceBlock {
        declaration_anchor: String,
        #[serde(default)]
        next_marker: Option<String>,
        #[serde(default)]
        strategy: BoundaryKind,
        replacement: String,
        #[serde(default)]
        verify: Option<Verify>,
    },
}

impl PatchOperation {
    pub fn insert_before(
        anchor: impl Into<String>,
        snippet: impl Into<String>,
        sentinel: impl Into<String>,
    ) -> Self {
        PatchOperation::InsertBefore {
            anchor: anchor.into(),
            snippet: snippet.into(),
            sentinel: Some(sentinel.into()),
        }
    }

    pub fn insert_after(
        anchor: impl Into<String>,
        snippet: impl Into<String>,
        sentinel: impl Into<String>,
    ) -> Self {
        PatchOperation::InsertAfter {
            anchor: anchor.into(),
            snippet: snippet.into(),
            sentinel: Some(sentinel.into()),
        }
    }

    /// Replace a block bounded by the next-member marker heuristic.
    pub fn replace_block(
        declaration_anchor: impl Into<String>,
        next_marker: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Self {
        PatchOperation::ReplaceBlock {
            declaration_anchor: declaration_anchor.into(),
            next_marker: Some(next_marker.into()),
            strategy: BoundaryKind::NextMarker,
            replacement: replacement.into(),
            verify: None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PatchOperation::InsertBefore { .. } => "insert_before",
            PatchOperation::InsertAfter { .. } => "insert_after",
            PatchOperation::ReplaceBlock { .. } => "replace_block",
        }
    }

    /// The anchor text this operation resolves against.
    pub fn anchor(&self) -> &str {
        match self {
            PatchOperation::InsertBefore { anchor, .. }
            | PatchOperation::InsertAfter { anchor, .. } => anchor,
            PatchOperation::ReplaceBlock {
                declaration_anchor, ..
            } => declaration_anchor,
        }
    }

    /// Effective sentinel of an insert operation: the explicit one, or the
    /// first non-blank snippet line, trimmed.
    pub fn sentinel(&self) -> Option<String> {
        match self {
            PatchOperation::InsertBefore {
                snippet, sentinel, ..
            }
            | PatchOperation::InsertAfter {
                snippet, sentinel, ..
            } => sentinel.clone().or_else(|| {
                snippet
                    .lines()
                    .map(str::trim)
                    .find(|line| !line.is_empty())
                    .map(str::to_string)
            }),
            PatchOperation::ReplaceBlock { .. } => None,
        }
    }
}

/// Which boundary strategy a `replace_block` uses.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum BoundaryKind {
    /// Lone `}` closest to the next-member marker
    #[default]
    NextMarker,
    /// Follow brace nesting from the declaration line
    BraceDepth,
}

impl BoundaryKind {
    /// Build the strategy. `None` when the next-marker strategy has no marker.
    pub fn strategy(self, next_marker: Option<&str>) -> Option<Box<dyn BoundaryStrategy>> {
        match self {
            BoundaryKind::NextMarker => next_marker
                .filter(|marker| !marker.is_empty())
                .map(|marker| Box::new(NextMarkerBoundary::new(marker)) as Box<dyn BoundaryStrategy>),
            BoundaryKind::BraceDepth => Some(Box::new(BraceDepthBoundary)),
        }
    }
}

impl fmt::Display for BoundaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundaryKind::NextMarker => write!(f, "next-marker"),
            BoundaryKind::BraceDepth => write!(f, "brace-depth"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Verify {
    ExactMatch {
        expected_text: String,
    },
    Hash {
        #[serde(default)]
        algorithm: Option<HashAlgorithm>,
        expected: String,
    },
}

impl Verify {
    pub fn to_verification(&self) -> Result<EditVerification, String> {
        match self {
            Verify::ExactMatch { expected_text } => {
                Ok(EditVerification::ExactMatch(expected_text.clone()))
            }
            Verify::Hash {
                algorithm,
                expected,
            } => match algorithm.unwrap_or_default() {
                HashAlgorithm::Xxh3 => EditVerification::parse_hash(expected)
                    .ok_or_else(|| format!("invalid xxh3 hash value: {}", expected)),
            },
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum HashAlgorithm {
    #[default]
    Xxh3,
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationIssue {
    EmptyOperationList,
    MissingField { index: usize, field: &'static str },
    InvalidCombo { index: usize, message: String },
    UnbalancedReplacement { index: usize },
    /// Blank padding or trailing text outside the block would pile up on re-runs
    ReplacementNotWholeBlock { index: usize },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyOperationList => write!(f, "patch spec contains no operations"),
            ValidationIssue::MissingField { index, field } => {
                write!(f, "operation #{} missing required field '{field}'", index + 1)
            }
            ValidationIssue::InvalidCombo { index, message } => {
                write!(f, "operation #{} has invalid configuration: {message}", index + 1)
            }
            ValidationIssue::UnbalancedReplacement { index } => write!(
                f,
                "operation #{} replacement body has unbalanced braces",
                index + 1
            ),
            ValidationIssue::ReplacementNotWholeBlock { index } => write!(
                f,
                "operation #{} replacement must be exactly one block, from the declaration line to its closing brace",
                index + 1
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issues(config: PatchConfig) -> Vec<ValidationIssue> {
        config.validate().err().map(|e| e.issues).unwrap_or_default()
    }

    #[test]
    fn test_empty_config_is_invalid() {
        assert_eq!(
            issues(PatchConfig::default()),
            vec![ValidationIssue::EmptyOperationList]
        );
    }

    #[test]
    fn test_default_sentinel_is_first_non_blank_line() {
        let op = PatchOperation::InsertBefore {
            anchor: "MARK".into(),
            snippet: "\n    // STEP 2.5\n    try {}\n".into(),
            sentinel: None,
        };
        assert_eq!(op.sentinel().as_deref(), Some("// STEP 2.5"));
    }

    #[test]
    fn test_sentinel_must_occur_in_snippet() {
        let config = PatchConfig {
            meta: Metadata::default(),
            operations: vec![PatchOperation::insert_before("MARK", "// A", "// Z")],
        };
        assert!(matches!(
            issues(config).as_slice(),
            [ValidationIssue::InvalidCombo { index: 0, .. }]
        ));
    }

    #[test]
    fn test_unbalanced_replacement() {
        let config = PatchConfig {
            meta: Metadata::default(),
            operations: vec![PatchOperation::replace_block(
                "function f",
                "/**",
                "function f() {\n",
            )],
        };
        assert_eq!(
            issues(config),
            vec![ValidationIssue::UnbalancedReplacement { index: 0 }]
        );
    }

    #[test]
    fn test_next_marker_required_for_marker_strategy() {
        let mut op = PatchOperation::replace_block("function f", "", "function f() {}");
        let config = PatchConfig {
            meta: Metadata::default(),
            operations: vec![op.clone()],
        };
        assert_eq!(
            issues(config),
            vec![ValidationIssue::MissingField {
                index: 0,
                field: "next_marker"
            }]
        );

        if let PatchOperation::ReplaceBlock { strategy, .. } = &mut op {
            *strategy = BoundaryKind::BraceDepth;
        }
        let config = PatchConfig {
            meta: Metadata::default(),
            operations: vec![op],
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_replacement_must_keep_declaration() {
        let config = PatchConfig {
            meta: Metadata::default(),
            operations: vec![PatchOperation::replace_block(
                "function old_name",
                "/**",
                "function new_name() {}",
            )],
        };
        assert!(matches!(
            issues(config).as_slice(),
            [ValidationIssue::InvalidCombo { index: 0, .. }]
        ));
    }

    #[test]
    fn test_invalid_hash_literal() {
        let op = PatchOperation::ReplaceBlock {
            declaration_anchor: "fn a".into(),
            next_marker: Some("/**".into()),
            strategy: BoundaryKind::NextMarker,
            replacement: "fn a() {\n}".into(),
            verify: Some(Verify::Hash {
                algorithm: Some(HashAlgorithm::Xxh3),
                expected: "not-hex".into(),
            }),
        };
        let config = PatchConfig {
            meta: Metadata::default(),
            operations: vec![op],
        };
        assert!(matches!(
            issues(config).as_slice(),
            [ValidationIssue::InvalidCombo { index: 0, .. }]
        ));
    }

    #[test]
    fn test_replacement_must_be_whole_block() {
        let config = PatchConfig {
            meta: Metadata::default(),
            operations: vec![
                PatchOperation::replace_block("function f", "/**", "function f() {\n}\n"),
                PatchOperation::replace_block("function g", "/**", "function g() {\n}\n\n"),
                PatchOperation::replace_block("function h", "/**", "\nfunction h() {\n}"),
                PatchOperation::replace_block("function k", "/**", "function k() {\n}\n// k"),
            ],
        };
        assert_eq!(
            issues(config),
            vec![
                ValidationIssue::ReplacementNotWholeBlock { index: 1 },
                ValidationIssue::ReplacementNotWholeBlock { index: 2 },
                ValidationIssue::ReplacementNotWholeBlock { index: 3 },
            ]
        );
    }

    #[test]
    fn test_issue_messages_are_one_based() {
        let issue = ValidationIssue::MissingField {
            index: 0,
            field: "anchor",
        };
        assert_eq!(
            issue.to_string(),
            "operation #1 missing required field 'anchor'"
        );
    }
}

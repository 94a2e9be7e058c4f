use crate::config::schema::{PatchConfig, PatchOperation, ValidationError};
use serde::Deserialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Toml {
        path: Option<PathBuf>,
        source: toml_edit::de::Error,
    },
    Json {
        path: Option<PathBuf>,
        source: serde_json::Error,
    },
    Validation {
        path: Option<PathBuf>,
        source: ValidationError,
    },
    /// Neither the command line nor `meta.target` names a file to patch
    MissingTarget,
}

impl ConfigError {
    fn with_path(self, path: &Path) -> Self {
        let path = path.to_path_buf();
        match self {
            ConfigError::Toml { path: None, source } => ConfigError::Toml {
                path: Some(path),
                source,
            },
            ConfigError::Json { path: None, source } => ConfigError::Json {
                path: Some(path),
                source,
            },
            ConfigError::Validation { path: None, source } => ConfigError::Validation {
                path: Some(path),
                source,
            },
            other => other,
        }
    }

    /// Process exit code: `4` for I/O failures, `5` for malformed specs.
    pub fn exit_code(&self) -> u8 {
        match self {
            ConfigError::Io { .. } => 4,
            _ => 5,
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(
                    f,
                    "failed to read patch spec from {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Toml { path, source } => match path {
                Some(path) => write!(
                    f,
                    "failed to parse patch spec TOML ({}): {}",
                    path.display(),
                    source
                ),
                None => write!(f, "failed to parse patch spec TOML: {}", source),
            },
            ConfigError::Json { path, source } => match path {
                Some(path) => write!(
                    f,
                    "failed to parse patch spec JSON ({}): {}",
                    path.display(),
                    source
                ),
                None => write!(f, "failed to parse patch spec JSON: {}", source),
            },
            ConfigError::Validation { path, source } => match path {
                Some(path) => write!(f, "invalid patch spec ({}): {}", path.display(), source),
                None => write!(f, "invalid patch spec: {}", source),
            },
            ConfigError::MissingTarget => write!(
                f,
                "no target file: pass one on the command line or set meta.target"
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Toml { source, .. } => Some(source),
            ConfigError::Json { source, .. } => Some(source),
            ConfigError::Validation { source, .. } => Some(source),
            ConfigError::MissingTarget => None,
        }
    }
}

/// Patch spec serialization format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecFormat {
    Toml,
    Json,
}

impl SpecFormat {
    /// `.json` files are JSON, everything else is TOML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => SpecFormat::Json,
            _ => SpecFormat::Toml,
        }
    }

    /// Guess the format of inline text.
    ///
    /// JSON starts with `{`, or with `[` opening an array of objects. TOML
    /// table headers like `[meta]` and `[[operations]]` stay TOML.
    pub fn sniff(input: &str) -> Self {
        let mut rest = input.trim_start().chars();
        match rest.next() {
            Some('{') => SpecFormat::Json,
            Some('[') => match rest.find(|c: &char| !c.is_whitespace()) {
                Some('{') | Some(']') => SpecFormat::Json,
                _ => SpecFormat::Toml,
            },
            _ => SpecFormat::Toml,
        }
    }
}

/// A JSON spec may be the full object or just the operation list.
#[derive(Deserialize)]
#[serde(untagged)]
enum JsonSpec {
    Operations(Vec<PatchOperation>),
    Full(PatchConfig),
}

/// Parse and validate a TOML patch spec.
pub fn load_from_str(input: &str) -> Result<PatchConfig, ConfigError> {
    let config: PatchConfig = toml_edit::de::from_str(input)
        .map_err(|source| ConfigError::Toml { path: None, source })?;
    validated(config)
}

/// Parse and validate a JSON patch spec.
pub fn load_from_json_str(input: &str) -> Result<PatchConfig, ConfigError> {
    let spec: JsonSpec = serde_json::from_str(input)
        .map_err(|source| ConfigError::Json { path: None, source })?;
    let config = match spec {
        JsonSpec::Operations(operations) => PatchConfig {
            operations,
            ..PatchConfig::default()
        },
        JsonSpec::Full(config) => config,
    };
    validated(config)
}

/// Parse an inline spec given on the command line, TOML or JSON.
pub fn load_inline(input: &str) -> Result<PatchConfig, ConfigError> {
    match SpecFormat::sniff(input) {
        SpecFormat::Json => load_from_json_str(input),
        SpecFormat::Toml => load_from_str(input),
    }
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<PatchConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let loaded = match SpecFormat::from_path(path) {
        SpecFormat::Json => load_from_json_str(&contents),
        SpecFormat::Toml => load_from_str(&contents),
    };
    loaded.map_err(|error| error.with_path(path))
}

/// Pick the file to patch: an explicit path wins, otherwise `meta.target`
/// resolved against `base_dir` (the patch file's directory).
pub fn resolve_target(
    config: &PatchConfig,
    explicit: Option<&Path>,
    base_dir: &Path,
) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    match config.meta.target.as_deref().map(str::trim) {
        Some(target) if !target.is_empty() => Ok(base_dir.join(target)),
        _ => Err(ConfigError::MissingTarget),
    }
}

fn validated(config: PatchConfig) -> Result<PatchConfig, ConfigError> {
    config
        .validate()
        .map_err(|source| ConfigError::Validation { path: None, source })?;
    Ok(config)
}

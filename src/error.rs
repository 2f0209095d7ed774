//! Error taxonomy for the generation pipeline.
//!
//! Every failure is local to one language's run; the orchestrator decides
//! whether it aborts the process or only that language.
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    /// Configuration file, schema source or intermediate schema is absent.
    #[error("{what} not found: {}", path.display())]
    ResourceNotFound { what: &'static str, path: PathBuf },

    #[error("i/o error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode {what}: {source}")]
    Encode {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }
}

/// A required configuration field is absent or malformed.
///
/// Never silently defaulted: every variant names the language and the field.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("'{field}' not set for language '{language}'")]
    MissingField { language: String, field: String },

    #[error("invalid '{field}' for language '{language}': {reason}")]
    InvalidValue {
        language: String,
        field: String,
        reason: String,
    },

    #[error("invalid rule '{field}' for language '{language}': {source}")]
    InvalidRule {
        language: String,
        field: String,
        #[source]
        source: RuleError,
    },

    #[error("target language '{0}' is not configured")]
    UnknownLanguage(String),

    #[error("failed to parse {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },
}

impl ConfigError {
    pub(crate) fn missing(language: &str, field: impl Into<String>) -> Self {
        Self::MissingField {
            language: language.to_string(),
            field: field.into(),
        }
    }
}

/// A JavaScript-flavoured pattern/replacement could not be compiled.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("unsupported regex flag '{0}'")]
    UnsupportedFlag(char),

    #[error("unsupported replacement token '{0}'")]
    UnsupportedReplacement(String),

    #[error(transparent)]
    Pattern(#[from] regex::Error),
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("unsupported schema shape at '{pointer}': {reason}")]
    Shape { pointer: String, reason: String },

    #[error("required property '{name}' at '{pointer}' is not declared in properties")]
    RequiredMismatch { pointer: String, name: String },

    #[error("escaped property '{escaped}' at '{pointer}' restores to '{restored}', which collides with another property")]
    EscapeCollision {
        pointer: String,
        escaped: String,
        restored: String,
    },

    #[error("escaped property '{escaped}' at '{pointer}' restores to '{restored}', which is still reserved")]
    RestoredReserved {
        pointer: String,
        escaped: String,
        restored: String,
    },

    #[error("property '{name}' at '{pointer}' contains the escape marker '{marker}' but is not an escaped reserved word")]
    MarkerInPlainName {
        pointer: String,
        name: String,
        marker: String,
    },

    #[error("escaped property '{escaped}' at '{pointer}' still carries the escape marker after restoration ('{restored}')")]
    RestoreIncomplete {
        pointer: String,
        escaped: String,
        restored: String,
    },
}

impl SchemaError {
    pub(crate) fn shape(pointer: &str, reason: impl Into<String>) -> Self {
        Self::Shape {
            pointer: pointer.to_string(),
            reason: reason.into(),
        }
    }
}

/// The external extraction or generation service failed. Propagated as-is.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("'{program}' exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("'{program}' produced invalid output: {reason}")]
    InvalidOutput { program: String, reason: String },

    #[error("no schema source configured (pass --schema or set 'source' in the configuration)")]
    NoSource,
}

use std::path::PathBuf;
use thiserror::Error;

/// Feature derivation failures. Out-of-bin values and non-finite ratios fail
/// the request instead of producing a missing category.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeriveError {
    #[error("input field '{field}' is not a finite number ({value})")]
    NonFiniteInput { field: &'static str, value: f64 },
    #[error("derived feature '{feature}' is not finite ({value}); check for a zero denominator")]
    NonFiniteRatio { feature: &'static str, value: f64 },
    #[error("{field}={value} is outside every {bucket} bin ({domain})")]
    OutOfRange {
        field: &'static str,
        bucket: &'static str,
        value: f64,
        domain: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("found unknown category '{value}' in column '{column}' during transform")]
    UnknownCategory { column: String, value: String },
    #[error("encoder expects {expected} categorical columns, got {found}")]
    ColumnCount { expected: usize, found: usize },
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AlignError {
    #[error("cannot reindex a row with duplicate column '{0}'")]
    DuplicateColumn(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoreError {
    #[error("row has {found} features, but the model was fit with {expected}")]
    WidthMismatch { expected: usize, found: usize },
    #[error("feature names at position {index} differ: model expects '{expected}', row has '{found}'")]
    FeatureNames {
        index: usize,
        expected: String,
        found: String,
    },
    #[error("model produced a non-finite output ({0})")]
    NonFinite(f64),
}

/// Per-request failure, discriminated by pipeline stage.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictError {
    #[error(transparent)]
    Derive(#[from] DeriveError),
    #[error(transparent)]
    Encode(#[from] EncodeError),
    #[error(transparent)]
    Align(#[from] AlignError),
    #[error(transparent)]
    Score(#[from] ScoreError),
}

impl PredictError {
    pub fn stage(&self) -> &'static str {
        match self {
            PredictError::Derive(_) => "derive",
            PredictError::Encode(_) => "encode",
            PredictError::Align(_) => "align",
            PredictError::Score(_) => "score",
        }
    }
}

/// Startup failures while loading the frozen artifacts.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("missing artifact in {}: expected one of {expected}", dir.display())]
    Missing { dir: PathBuf, expected: &'static str },
    #[error("invalid artifact {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
}

impl ArtifactError {
    pub(crate) fn invalid(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        ArtifactError::Invalid {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

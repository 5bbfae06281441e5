use crate::align::{AlignedRow, ExpectedColumns};
use crate::error::{ArtifactError, ScoreError};
use crate::util::sigmoid;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Opaque scoring function. Loaded once, shared by every request.
pub trait Scorer: Send + Sync {
    /// Scores one aligned row. The result is always a list, even for a single
    /// scalar output.
    fn predict(&self, row: &AlignedRow) -> Result<Vec<f64>, ScoreError>;

    /// Feature names the model was fit with, when the artifact records them.
    fn feature_names(&self) -> Option<&[String]> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// Class label: 1.0 when the probability reaches `threshold`.
    #[default]
    Label,
    /// Positive-class probability.
    Probability,
}

fn default_threshold() -> f64 {
    0.5
}

/// Logistic-regression style model stored as `model.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub bias: f64,
    pub coefficients: Vec<f64>,
    #[serde(default)]
    pub feature_names: Option<Vec<String>>,
    #[serde(default)]
    pub output: OutputKind,
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

impl LinearModel {
    pub const FILE_NAME: &'static str = "model.json";

    pub fn load_from_dir(dir: &Path) -> Result<Self, ArtifactError> {
        let path = dir.join(Self::FILE_NAME);
        if !path.exists() {
            return Err(ArtifactError::Missing {
                dir: dir.to_path_buf(),
                expected: Self::FILE_NAME,
            });
        }
        let s = fs::read_to_string(&path).map_err(|source| ArtifactError::Io {
            path: path.clone(),
            source,
        })?;
        let m: LinearModel = serde_json::from_str(&s).map_err(|source| ArtifactError::Json {
            path: path.clone(),
            source,
        })?;
        m.validate(&path)?;
        Ok(m)
    }

    fn validate(&self, path: &Path) -> Result<(), ArtifactError> {
        if self.coefficients.is_empty() {
            return Err(ArtifactError::invalid(path, "model has no coefficients"));
        }
        if !self.bias.is_finite() || self.coefficients.iter().any(|w| !w.is_finite()) {
            return Err(ArtifactError::invalid(path, "model has non-finite parameters"));
        }
        if let Some(names) = &self.feature_names {
            if names.len() != self.coefficients.len() {
                return Err(ArtifactError::invalid(
                    path,
                    format!(
                        "{} feature names for {} coefficients",
                        names.len(),
                        self.coefficients.len()
                    ),
                ));
            }
        }
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(ArtifactError::invalid(
                path,
                format!("threshold {} outside [0, 1]", self.threshold),
            ));
        }
        Ok(())
    }

    /// Startup check that the model and the expected-column schema agree.
    pub fn check_schema(&self, schema: &ExpectedColumns, origin: &Path) -> Result<(), ArtifactError> {
        if self.coefficients.len() != schema.len() {
            return Err(ArtifactError::invalid(
                origin,
                format!(
                    "model has {} coefficients but the expected column list has {}",
                    self.coefficients.len(),
                    schema.len()
                ),
            ));
        }
        if let Some(names) = &self.feature_names {
            if names.as_slice() != schema.names() {
                return Err(ArtifactError::invalid(
                    origin,
                    "model feature names differ from the expected column list",
                ));
            }
        }
        Ok(())
    }

    pub fn proba(&self, values: &[f64]) -> f64 {
        let z = self.bias
            + self
                .coefficients
                .iter()
                .zip(values)
                .map(|(w, x)| w * x)
                .sum::<f64>();
        sigmoid(z)
    }
}

impl Scorer for LinearModel {
    fn predict(&self, row: &AlignedRow) -> Result<Vec<f64>, ScoreError> {
        if row.len() != self.coefficients.len() {
            return Err(ScoreError::WidthMismatch {
                expected: self.coefficients.len(),
                found: row.len(),
            });
        }
        // 与训练时的列名逐一核对，防止“形状对但列错位”静默出错
        if let Some(names) = &self.feature_names {
            if let Some((index, (expected, found))) = names
                .iter()
                .zip(row.names())
                .enumerate()
                .find(|(_, (a, b))| a != b)
            {
                return Err(ScoreError::FeatureNames {
                    index,
                    expected: expected.clone(),
                    found: found.clone(),
                });
            }
        }

        let p = self.proba(row.values());
        if !p.is_finite() {
            return Err(ScoreError::NonFinite(p));
        }
        let out = match self.output {
            OutputKind::Probability => p,
            OutputKind::Label => {
                if p >= self.threshold {
                    1.0
                } else {
                    0.0
                }
            }
        };
        Ok(vec![out])
    }

    fn feature_names(&self) -> Option<&[String]> {
        self.feature_names.as_deref()
    }
}

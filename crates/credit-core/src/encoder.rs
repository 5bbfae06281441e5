use crate::error::{ArtifactError, EncodeError};
use crate::features::bucket_labels;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Categorical columns fed to the encoder, in transform order. The encoder
/// artifact must have been fit on exactly these columns in this order.
pub const CATEGORICAL_COLUMNS: [&str; 6] = [
    "person_home_ownership",
    "loan_intent",
    "cb_person_default_on_file",
    "age_group",
    "loan_amnt_group",
    "income_group",
];

/// What to do with a value that was not seen at fit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandleUnknown {
    /// Fail the request with `EncodeError::UnknownCategory`.
    #[default]
    Error,
    /// Emit all-zero indicators for the column.
    Ignore,
}

/// Per-column category dropping, applied to the output columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    First,
    IfBinary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodedColumn {
    pub name: String,
    pub categories: Vec<String>,
}

/// 编码器 artifact 的磁盘格式（encoder.json / encoder.json.gz）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderSpec {
    pub columns: Vec<EncodedColumn>,
    #[serde(default)]
    pub handle_unknown: HandleUnknown,
    #[serde(default)]
    pub drop: Option<DropPolicy>,
}

#[derive(Debug, Clone)]
struct FrozenColumn {
    name: String,
    categories: Vec<String>,
    /// category index whose indicator is not emitted
    dropped: Option<usize>,
}

/// Frozen one-hot encoder. Immutable after load; `transform` keeps no state
/// between calls.
#[derive(Debug, Clone)]
pub struct OneHotEncoder {
    columns: Vec<FrozenColumn>,
    handle_unknown: HandleUnknown,
    feature_names: Vec<String>,
}

impl OneHotEncoder {
    /// Validates a spec against `CATEGORICAL_COLUMNS` and freezes it.
    pub fn from_spec(spec: EncoderSpec, origin: &Path) -> Result<Self, ArtifactError> {
        let names: Vec<&str> = spec.columns.iter().map(|c| c.name.as_str()).collect();
        if names != CATEGORICAL_COLUMNS {
            return Err(ArtifactError::invalid(
                origin,
                format!("encoder columns {names:?} do not match {CATEGORICAL_COLUMNS:?}"),
            ));
        }

        let mut columns = Vec::with_capacity(spec.columns.len());
        for col in spec.columns {
            if col.categories.is_empty() {
                return Err(ArtifactError::invalid(
                    origin,
                    format!("column '{}' has no categories", col.name),
                ));
            }
            let mut seen = HashSet::new();
            for c in &col.categories {
                if !seen.insert(c.as_str()) {
                    return Err(ArtifactError::invalid(
                        origin,
                        format!("column '{}' repeats category '{c}'", col.name),
                    ));
                }
            }

            if let Some(labels) = bucket_labels(&col.name) {
                for c in &col.categories {
                    if !labels.iter().any(|l| *l == c.as_str()) {
                        return Err(ArtifactError::invalid(
                            origin,
                            format!("column '{}' has category '{c}' the binning never produces", col.name),
                        ));
                    }
                }
                // 训练集里没出现过的分桶：线上命中时按 handle_unknown 处理
                for l in labels {
                    if !seen.contains(l) {
                        tracing::warn!(column = %col.name, label = l, "bucket label missing from encoder categories");
                    }
                }
            }

            let dropped = match spec.drop {
                None => None,
                Some(DropPolicy::First) => Some(0),
                Some(DropPolicy::IfBinary) => (col.categories.len() == 2).then_some(0),
            };
            columns.push(FrozenColumn {
                name: col.name,
                categories: col.categories,
                dropped,
            });
        }

        let feature_names = columns
            .iter()
            .flat_map(|c| {
                c.categories
                    .iter()
                    .enumerate()
                    .filter(move |(i, _)| Some(*i) != c.dropped)
                    .map(move |(_, cat)| format!("{}_{}", c.name, cat))
            })
            .collect();

        Ok(Self {
            columns,
            handle_unknown: spec.handle_unknown,
            feature_names,
        })
    }

    /// Loads `encoder.json`, or `encoder.json.gz` if the plain file is absent.
    pub fn load_from_dir(dir: &Path) -> Result<Self, ArtifactError> {
        let json_path = dir.join("encoder.json");
        if json_path.exists() {
            let s = fs::read_to_string(&json_path).map_err(|source| ArtifactError::Io {
                path: json_path.clone(),
                source,
            })?;
            let spec: EncoderSpec = serde_json::from_str(&s).map_err(|source| ArtifactError::Json {
                path: json_path.clone(),
                source,
            })?;
            return Self::from_spec(spec, &json_path);
        }

        let gz = dir.join("encoder.json.gz");
        if gz.exists() {
            let f = fs::File::open(&gz).map_err(|source| ArtifactError::Io {
                path: gz.clone(),
                source,
            })?;
            let dec = flate2::read::GzDecoder::new(f);
            let spec: EncoderSpec = serde_json::from_reader(dec).map_err(|source| ArtifactError::Json {
                path: gz.clone(),
                source,
            })?;
            return Self::from_spec(spec, &gz);
        }

        Err(ArtifactError::Missing {
            dir: dir.to_path_buf(),
            expected: "encoder.json or encoder.json.gz",
        })
    }

    pub fn handle_unknown(&self) -> HandleUnknown {
        self.handle_unknown
    }

    /// Output column names, `<column>_<category>`, in transform order.
    pub fn feature_names_out(&self) -> &[String] {
        &self.feature_names
    }

    /// Encodes one row of categorical values given in `CATEGORICAL_COLUMNS`
    /// order.
    pub fn transform(&self, values: &[&str]) -> Result<Vec<(String, f64)>, EncodeError> {
        if values.len() != self.columns.len() {
            return Err(EncodeError::ColumnCount {
                expected: self.columns.len(),
                found: values.len(),
            });
        }

        let mut names = self.feature_names.iter();
        let mut out = Vec::with_capacity(self.feature_names.len());
        for (col, value) in self.columns.iter().zip(values) {
            let hit = col.categories.iter().position(|c| c == value);
            if hit.is_none() {
                if self.handle_unknown == HandleUnknown::Error {
                    return Err(EncodeError::UnknownCategory {
                        column: col.name.clone(),
                        value: (*value).to_string(),
                    });
                }
                // ignore 策略：全 0 编码，但要留痕
                tracing::warn!(column = %col.name, value = %value, "unknown category encoded as all zeros");
                metrics::counter!("encode_unknown_total", "column" => col.name.clone()).increment(1);
            }
            for i in 0..col.categories.len() {
                if Some(i) == col.dropped {
                    continue;
                }
                // feature_names 与这里的迭代顺序一一对应
                if let Some(name) = names.next() {
                    let v = if hit == Some(i) { 1.0 } else { 0.0 };
                    out.push((name.clone(), v));
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
pub(crate) fn sample_spec() -> EncoderSpec {
    let col = |name: &str, cats: &[&str]| EncodedColumn {
        name: name.into(),
        categories: cats.iter().map(|c| c.to_string()).collect(),
    };
    EncoderSpec {
        columns: vec![
            col("person_home_ownership", &["MORTGAGE", "OTHER", "OWN", "RENT"]),
            col(
                "loan_intent",
                &[
                    "DEBTCONSOLIDATION",
                    "EDUCATION",
                    "HOMEIMPROVEMENT",
                    "MEDICAL",
                    "PERSONAL",
                    "VENTURE",
                ],
            ),
            col("cb_person_default_on_file", &["N", "Y"]),
            col("age_group", &["18-30", "30-40", "40-50", "50-60", "60+"]),
            col("loan_amnt_group", &["large", "medium", "small", "very large"]),
            col("income_group", &["high", "high-middle", "low", "low-middle", "middle"]),
        ],
        handle_unknown: HandleUnknown::Error,
        drop: None,
    }
}

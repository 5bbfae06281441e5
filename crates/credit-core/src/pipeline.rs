use crate::{
    align::{AlignedRow, ExpectedColumns, FeatureRow},
    config::Config,
    encoder::OneHotEncoder,
    error::{ArtifactError, PredictError},
    features::{derive, DerivedFeatures},
    model::{LinearModel, Scorer},
    registry::ModelUri,
    schema::ScoreRequest,
    util::now_us,
};

use anyhow::Context;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

/// Request-independent state: loaded once at startup, never mutated, shared
/// by every request without locking.
#[derive(Clone)]
pub struct AppCore {
    pub encoder: Arc<OneHotEncoder>,
    pub columns: Arc<ExpectedColumns>,
    pub model: Arc<dyn Scorer>,
    pub model_uri: String,
}

impl std::fmt::Debug for AppCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppCore")
            .field("model_uri", &self.model_uri)
            .field("columns", &self.columns.len())
            .field("encoded", &self.encoder.feature_names_out().len())
            .finish()
    }
}

impl AppCore {
    pub fn new(
        encoder: OneHotEncoder,
        columns: ExpectedColumns,
        model: Arc<dyn Scorer>,
        model_uri: impl Into<String>,
    ) -> Result<Self, ArtifactError> {
        let model_uri = model_uri.into();
        if let Some(names) = model.feature_names() {
            if names != columns.names() {
                return Err(ArtifactError::invalid(
                    model_uri.as_str(),
                    "model feature names differ from the expected column list",
                ));
            }
        }

        // 启动时检查一次列覆盖：永远为 0 的列通常意味着 encoder 与 schema 不同源
        let produced = produced_columns(&encoder);
        let (never_filled, dropped) = columns.coverage(&produced);
        if !never_filled.is_empty() {
            tracing::warn!(columns = ?never_filled, "expected columns the pipeline never produces; they stay 0");
        }
        if !dropped.is_empty() {
            tracing::info!(columns = ?dropped, "pipeline columns outside the expected list are dropped");
        }

        Ok(Self {
            encoder: Arc::new(encoder),
            columns: Arc::new(columns),
            model,
            model_uri,
        })
    }

    /// Loads encoder, expected columns and model from the configured
    /// locations.
    pub fn load(cfg: &Config) -> anyhow::Result<Self> {
        let encoder = OneHotEncoder::load_from_dir(&cfg.artifact_dir).context("load encoder")?;
        let columns =
            ExpectedColumns::load_from_dir(&cfg.artifact_dir).context("load expected columns")?;

        let uri = ModelUri::parse(&cfg.model_uri).context("parse model uri")?;
        let model_dir = uri
            .resolve(&cfg.model_root)
            .with_context(|| format!("resolve model {uri}"))?;
        let model = LinearModel::load_from_dir(&model_dir).context("load model")?;
        model.check_schema(&columns, &model_dir.join(LinearModel::FILE_NAME))?;

        tracing::info!(
            model = %uri,
            model_dir = %model_dir.display(),
            encoder_columns = encoder.feature_names_out().len(),
            expected_columns = columns.len(),
            handle_unknown = ?encoder.handle_unknown(),
            "artifacts loaded"
        );

        Ok(Self::new(encoder, columns, Arc::new(model), uri.to_string())?)
    }

    /// Derive → encode → align. Returns the row exactly as the model sees it.
    pub fn preprocess(&self, req: &ScoreRequest) -> Result<AlignedRow, PredictError> {
        let t_feat = Instant::now();
        let derived = derive(req)?;
        metrics::histogram!("stage_feature_us").record(now_us(t_feat) as f64);

        let t_enc = Instant::now();
        let encoded = self.encoder.transform(&categorical_values(req, &derived))?;
        metrics::histogram!("stage_encode_us").record(now_us(t_enc) as f64);

        let t_align = Instant::now();
        let row = build_row(req, &derived, encoded);
        let aligned = self.columns.reindex(&row)?;
        metrics::histogram!("stage_align_us").record(now_us(t_align) as f64);

        Ok(aligned)
    }

    pub fn predict(&self, req: &ScoreRequest) -> Result<Vec<f64>, PredictError> {
        let t0 = Instant::now();
        metrics::counter!("predict_requests_total").increment(1);

        let res = self.preprocess(req).and_then(|row| {
            let t_score = Instant::now();
            let out = self.model.predict(&row)?;
            metrics::histogram!("stage_score_us").record(now_us(t_score) as f64);
            Ok(out)
        });

        if let Err(e) = &res {
            metrics::counter!("predict_failed_total", "stage" => e.stage()).increment(1);
        }
        metrics::histogram!("e2e_us").record(now_us(t0) as f64);
        res
    }
}

/// Values for `CATEGORICAL_COLUMNS`, same order.
pub fn categorical_values<'a>(req: &'a ScoreRequest, derived: &DerivedFeatures) -> [&'a str; 6] {
    [
        req.person_home_ownership.as_str(),
        req.loan_intent.as_str(),
        req.cb_person_default_on_file.as_str(),
        derived.age_group.as_str(),
        derived.loan_amnt_group.as_str(),
        derived.income_group.as_str(),
    ]
}

/// Numeric inputs, then ratios, then the one-hot block. The raw categorical
/// columns are not carried over.
pub fn build_row(req: &ScoreRequest, derived: &DerivedFeatures, encoded: Vec<(String, f64)>) -> FeatureRow {
    let mut row = FeatureRow::with_capacity(10 + encoded.len());
    for (name, v) in req.numeric_columns() {
        row.push(name, v);
    }
    for (name, v) in derived.ratio_columns() {
        row.push(name, v);
    }
    row.extend(encoded);
    row
}

fn produced_columns(encoder: &OneHotEncoder) -> Vec<String> {
    let numeric = [
        "person_age",
        "person_income",
        "person_emp_length",
        "loan_amnt",
        "loan_int_rate",
        "loan_percent_income",
        "cb_person_cred_hist_length",
        "loan_to_income",
        "loan_to_emp_length_ratio",
        "int_rate_to_loan_amnt_ratio",
    ];
    numeric
        .iter()
        .map(|s| s.to_string())
        .chain(encoder.feature_names_out().iter().cloned())
        .collect()
}

/// Convenience for tools and tests that hold artifacts in one directory.
pub fn load_from_dir(dir: &Path, model_uri: &str) -> anyhow::Result<AppCore> {
    let cfg = Config {
        model_root: dir.to_path_buf(),
        artifact_dir: dir.to_path_buf(),
        model_uri: model_uri.to_string(),
        ..Config::default()
    };
    AppCore::load(&cfg)
}

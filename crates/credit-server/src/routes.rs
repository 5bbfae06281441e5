// crates/credit-server/src/routes.rs
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use credit_core::{
    error::PredictError,
    pipeline::AppCore,
    schema::{ErrorResponse, PredictResponse, ScoreRequest},
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub core: Arc<AppCore>,
    pub prom: PrometheusHandle,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/predict/", post(predict))
        .route("/predict", post(predict))
        .route("/health", get(health))
        .route("/metrics", get(render_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Client-facing failure: `{"detail": "..."}` with the status below.
#[derive(Debug)]
pub enum ApiError {
    /// body did not match the input shape; never reached the pipeline
    Rejected(JsonRejection),
    /// derive / encode / align / score failure
    Prediction(PredictError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = match self {
            ApiError::Rejected(r) => (r.status(), r.body_text()),
            ApiError::Prediction(e) => (
                StatusCode::BAD_REQUEST,
                format!("prediction failed: {e}"),
            ),
        };
        (status, Json(ErrorResponse { detail })).into_response()
    }
}

async fn predict(
    State(st): State<AppState>,
    payload: Result<Json<ScoreRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    let Json(req) = payload.map_err(|r| {
        metrics::counter!("predict_rejected_total").increment(1);
        tracing::warn!(%request_id, err = %r.body_text(), "rejected request body");
        ApiError::Rejected(r)
    })?;

    score(&st.core, &req, request_id)
}

/// Synchronous scoring section. The outcome logs are emitted inside the
/// request span so they carry `request_id`.
fn score(core: &AppCore, req: &ScoreRequest, request_id: Uuid) -> Result<Json<PredictResponse>, ApiError> {
    let span = tracing::info_span!("predict", %request_id);
    let _guard = span.enter();
    match core.predict(req) {
        Ok(prediction) => {
            tracing::debug!(?prediction, "scored");
            Ok(Json(PredictResponse { prediction }))
        }
        Err(e) => {
            tracing::warn!(stage = e.stage(), err = %e, "prediction failed");
            Err(ApiError::Prediction(e))
        }
    }
}

async fn health(State(st): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "model": st.core.model_uri,
        "columns": st.core.columns.len(),
    }))
}

async fn render_metrics(State(st): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, st.prom.render())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{header, Request};
    use credit_core::{
        align::ExpectedColumns,
        encoder::{EncodedColumn, EncoderSpec, HandleUnknown, OneHotEncoder},
        model::{LinearModel, OutputKind},
    };
    use http_body_util::BodyExt;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::Value;
    use std::path::Path;
    use std::sync::Mutex;
    use tower::ServiceExt;

    fn state() -> AppState {
        let cats: [(&str, &[&str]); 6] = [
            ("person_home_ownership", &["MORTGAGE", "OTHER", "OWN", "RENT"]),
            ("loan_intent", &["DEBTCONSOLIDATION", "EDUCATION", "MEDICAL", "PERSONAL"]),
            ("cb_person_default_on_file", &["N", "Y"]),
            ("age_group", &["18-30", "30-40", "40-50", "50-60", "60+"]),
            ("loan_amnt_group", &["large", "medium", "small", "very large"]),
            ("income_group", &["high", "high-middle", "low", "low-middle", "middle"]),
        ];
        let spec = EncoderSpec {
            columns: cats
                .iter()
                .map(|(name, c)| EncodedColumn {
                    name: name.to_string(),
                    categories: c.iter().map(|s| s.to_string()).collect(),
                })
                .collect(),
            handle_unknown: HandleUnknown::Error,
            drop: None,
        };
        let encoder = OneHotEncoder::from_spec(spec, Path::new("encoder.json")).unwrap();

        let mut names: Vec<String> = vec!["loan_percent_income".into(), "loan_to_income".into()];
        names.extend(encoder.feature_names_out().iter().cloned());
        let columns = ExpectedColumns::new(names, Path::new("expected_columns.json")).unwrap();

        let mut coefficients = vec![0.0; columns.len()];
        coefficients[0] = 5.0;
        let model = LinearModel {
            bias: 0.0,
            coefficients,
            feature_names: Some(columns.names().to_vec()),
            output: OutputKind::Label,
            threshold: 0.5,
        };
        let core = AppCore::new(encoder, columns, Arc::new(model), "models:/credit_scoring/7").unwrap();
        AppState {
            core: Arc::new(core),
            prom: PrometheusBuilder::new().build_recorder().handle(),
        }
    }

    fn body() -> Value {
        json!({
            "person_age": 35.0,
            "person_income": 40000.0,
            "person_home_ownership": "RENT",
            "person_emp_length": 5.0,
            "loan_intent": "EDUCATION",
            "loan_amnt": 8000.0,
            "loan_int_rate": 10.5,
            "loan_percent_income": 0.2,
            "cb_person_default_on_file": "N",
            "cb_person_cred_hist_length": 4.0
        })
    }

    async fn post_json(app: Router, uri: &str, v: &Value) -> (StatusCode, Value) {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(v.to_string()))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn predict_returns_prediction_list() {
        let app = router(state());
        // z = 5 * 0.2 > 0 -> p > 0.5 -> label 1
        let (status, v) = post_json(app.clone(), "/predict/", &body()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v, json!({ "prediction": [1.0] }));

        let (status, _) = post_json(app, "/predict", &body()).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn pipeline_failure_is_bad_request_with_detail() {
        let app = router(state());

        let mut b = body();
        b["person_age"] = json!(17);
        let (status, v) = post_json(app.clone(), "/predict/", &b).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let detail = v["detail"].as_str().unwrap();
        assert!(detail.starts_with("prediction failed:"));
        assert!(detail.contains("person_age"));

        let mut b = body();
        b["loan_intent"] = json!("VENTURE");
        let (status, v) = post_json(app.clone(), "/predict/", &b).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(v["detail"].as_str().unwrap().contains("VENTURE"));

        let mut b = body();
        b["person_income"] = json!(0);
        let (status, _) = post_json(app.clone(), "/predict/", &b).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        // 之前的失败不影响后续请求
        let (status, _) = post_json(app, "/predict/", &body()).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn malformed_body_is_rejected_before_pipeline() {
        let app = router(state());
        let mut b = body();
        b.as_object_mut().unwrap().remove("loan_amnt");
        let (status, v) = post_json(app.clone(), "/predict/", &b).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(v["detail"].as_str().unwrap().contains("loan_amnt"));

        let mut b = body();
        b["person_age"] = json!("thirty-five");
        let (status, _) = post_json(app, "/predict/", &b).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn syntax_error_and_missing_content_type_are_rejected() {
        let app = router(state());

        let req = Request::builder()
            .method("POST")
            .uri("/predict/")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"person_age": 35,"#))
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let v: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(!v["detail"].as_str().unwrap().starts_with("prediction failed"));

        let req = Request::builder()
            .method("POST")
            .uri("/predict/")
            .body(Body::from(body().to_string()))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let v: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(v["detail"].as_str().is_some());
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failure_log_carries_request_id() {
        let st = state();
        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();

        let mut req: ScoreRequest = serde_json::from_value(body()).unwrap();
        req.person_age = 17.0;
        let request_id = Uuid::new_v4();
        tracing::subscriber::with_default(subscriber, || {
            assert!(score(&st.core, &req, request_id).is_err());
        });

        let out = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        let line = out
            .lines()
            .find(|l| l.contains("prediction failed"))
            .expect("failure logged");
        assert!(line.contains(&request_id.to_string()));
    }

    #[tokio::test]
    async fn health_reports_model() {
        let app = router(state());
        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let v: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(v["status"], "ok");
        assert_eq!(v["model"], "models:/credit_scoring/7");
        assert_eq!(v["columns"], 2 + 4 + 4 + 2 + 5 + 4 + 5);
    }
}

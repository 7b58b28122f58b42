use axum::{
    Router,
    extract::{DefaultBodyLimit, Multipart, Request, State, multipart::MultipartRejection},
    http::HeaderValue,
    middleware::{Next, from_fn},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use std::any::Any;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowHeaders, AllowMethods, CorsLayer},
    trace::TraceLayer,
};
use tracing::{Instrument, debug, error, info};
use uuid::Uuid;

use crate::{
    config::ServiceConfig,
    error::{ConfigError, ProcessError},
    extraction::build_chat_model,
    models::{CLINICAL_DOC_FIELD, INSURANCE_CARD_FIELD, ProcessResponse, UploadedFile},
    ocr::build_recognizer,
    pipeline::DocumentPipeline,
};

pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Room for multipart boundaries, part headers and small text fields on top
/// of the two file payloads.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub pipeline: DocumentPipeline,
}

impl AppState {
    pub fn new(config: ServiceConfig, pipeline: DocumentPipeline) -> Self {
        Self {
            config: Arc::new(config),
            pipeline,
        }
    }

    /// State wired to the real OCR engine and LLM provider.
    pub fn from_config(config: ServiceConfig) -> Self {
        let pipeline = DocumentPipeline::new(build_recognizer(&config), build_chat_model(&config));
        Self::new(config, pipeline)
    }
}

pub fn create_app(config: ServiceConfig) -> Result<Router, ConfigError> {
    config.validate()?;
    build_router(AppState::from_config(config))
}

pub fn build_router(app_state: AppState) -> Result<Router, ConfigError> {
    let cors = cors_layer(&app_state.config.cors_origin)?;
    let body_limit = DefaultBodyLimit::max(request_body_limit(app_state.config.max_upload_bytes));

    Ok(Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/api/process-documents", post(process_documents))
        .layer(
            ServiceBuilder::new()
                .layer(from_fn(correlation_id_middleware))
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(body_limit)
                .layer(CatchPanicLayer::custom(panic_response)),
        )
        .with_state(app_state))
}

/// `max_upload_bytes` is a per-file limit; the request carries two files.
fn request_body_limit(max_upload_bytes: usize) -> usize {
    max_upload_bytes
        .saturating_mul(2)
        .saturating_add(MULTIPART_OVERHEAD_BYTES)
}

/// A panic anywhere in the pipeline still yields a 200 failure body.
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else {
        "unknown panic".to_string()
    };

    error!(panic = %detail, "Document processing panicked");
    Json(ProcessResponse::failure(format!("Internal error: {}", detail))).into_response()
}

/// One allowed origin, credentials allowed. Methods and headers are mirrored
/// from the request since wildcards cannot be combined with credentials.
fn cors_layer(origin: &str) -> Result<CorsLayer, ConfigError> {
    let origin = HeaderValue::from_str(origin).map_err(|e| ConfigError::Invalid {
        field: "cors_origin",
        reason: e.to_string(),
    })?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}

/// Tag each request with a correlation id, echoed back in the response.
async fn correlation_id_middleware(mut request: Request, next: Next) -> Response {
    let correlation_id = Uuid::new_v4().to_string();
    let header = HeaderValue::from_str(&correlation_id).ok();

    if let Some(value) = &header {
        request
            .headers_mut()
            .insert(CORRELATION_ID_HEADER, value.clone());
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    let mut response = next.run(request).instrument(span).await;

    if let Some(value) = header {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}

async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "service": "Claim Intake Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "OCR and LLM extraction of insurance card and clinical document data",
        "llm_model": state.config.llm_model,
        "ocr_engine": format!("{:?}", state.config.ocr_engine).to_lowercase(),
        "endpoints": {
            "POST /api/process-documents": "Multipart upload with insurance_card and clinical_doc files",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Always answers 200; failures are reported in the body.
async fn process_documents(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Json<ProcessResponse> {
    match run_processing(&state, multipart).await {
        Ok(response) => Json(response),
        Err(e) => {
            error!(error = %e, "Document processing failed");
            Json(ProcessResponse::failure(e.to_string()))
        }
    }
}

async fn run_processing(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<ProcessResponse, ProcessError> {
    let multipart = multipart.map_err(|e| ProcessError::Multipart(e.body_text()))?;
    let (insurance_card, clinical_doc) =
        read_uploads(multipart, state.config.max_upload_bytes).await?;

    info!(
        insurance_card_bytes = insurance_card.bytes.len(),
        insurance_card_kind = ?insurance_card.kind,
        clinical_doc_bytes = clinical_doc.bytes.len(),
        clinical_doc_kind = ?clinical_doc.kind,
        "Processing uploaded documents"
    );

    let (data, raw_text) = state
        .pipeline
        .process(&insurance_card, &clinical_doc)
        .await
        .into_parts();

    Ok(ProcessResponse::success(data, raw_text))
}

/// Pull both required files out of the multipart body. Unknown fields are
/// skipped; a repeated field keeps the last value. Each file is capped at
/// `max_file_bytes`.
async fn read_uploads(
    mut multipart: Multipart,
    max_file_bytes: usize,
) -> Result<(UploadedFile, UploadedFile), ProcessError> {
    let mut insurance_card = None;
    let mut clinical_doc = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| ProcessError::Multipart(e.body_text()))?
    {
        let (slot, name) = match field.name() {
            Some(INSURANCE_CARD_FIELD) => (&mut insurance_card, INSURANCE_CARD_FIELD),
            Some(CLINICAL_DOC_FIELD) => (&mut clinical_doc, CLINICAL_DOC_FIELD),
            other => {
                debug!(field = ?other, "Ignoring unexpected multipart field");
                continue;
            }
        };

        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);

        let mut bytes = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| ProcessError::Multipart(e.body_text()))?
        {
            if bytes.len() + chunk.len() > max_file_bytes {
                return Err(ProcessError::FileTooLarge {
                    field: name,
                    limit: max_file_bytes,
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        *slot = Some(UploadedFile::new(
            name,
            file_name,
            content_type.as_deref(),
            bytes,
        ));
    }

    let insurance_card = insurance_card.ok_or(ProcessError::MissingField(INSURANCE_CARD_FIELD))?;
    let clinical_doc = clinical_doc.ok_or(ProcessError::MissingField(CLINICAL_DOC_FIELD))?;
    Ok((insurance_card, clinical_doc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::tests::FakeChatModel;
    use crate::ocr::tests::FakeRecognizer;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
    };
    use clap::Parser;
    use tower::ServiceExt;

    fn test_app() -> Router {
        let config = ServiceConfig::try_parse_from([
            "claim-intake-service",
            "--api-key",
            "sk-test",
            "--cors-origin",
            "http://localhost:3000",
        ])
        .unwrap();
        let pipeline = DocumentPipeline::new(
            Arc::new(FakeRecognizer::text("text")),
            Arc::new(FakeChatModel::replying("{}")),
        );
        build_router(AppState::new(config, pipeline)).unwrap()
    }

    #[tokio::test]
    async fn test_health_and_correlation_id() {
        let response = test_app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(CORRELATION_ID_HEADER));

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_cors_preflight_allows_configured_origin() {
        let request = HttpRequest::builder()
            .method("OPTIONS")
            .uri("/api/process-documents")
            .header("origin", "http://localhost:3000")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "content-type")
            .body(Body::empty())
            .unwrap();
        let response = test_app().oneshot(request).await.unwrap();
        let headers = response.headers();

        assert_eq!(
            headers["access-control-allow-origin"],
            "http://localhost:3000"
        );
        assert_eq!(headers["access-control-allow-credentials"], "true");
        assert_eq!(headers["access-control-allow-methods"], "POST");
    }

    #[tokio::test]
    async fn test_non_multipart_request_is_a_failure_body() {
        let request = HttpRequest::builder()
            .method("POST")
            .uri("/api/process-documents")
            .header("content-type", "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = test_app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().starts_with("Invalid multipart request"));
    }

    #[test]
    fn test_request_limit_covers_two_full_files() {
        let per_file = 10 * 1024 * 1024;
        assert!(request_body_limit(per_file) > 2 * per_file);
        assert_eq!(request_body_limit(usize::MAX), usize::MAX);
    }

    #[test]
    fn test_invalid_cors_origin_is_rejected() {
        assert!(cors_layer("http://bad\norigin").is_err());
    }
}

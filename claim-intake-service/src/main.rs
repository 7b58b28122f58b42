use anyhow::Context;
use clap::Parser;
use claim_intake_service::{ServiceConfig, TesseractRecognizer, config::OcrEngineKind, create_app};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing; `LOG_FORMAT=pretty` for development, JSON otherwise.
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "claim_intake_service=debug,tower_http=debug".into());

    match log_format.as_str() {
        "pretty" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true),
                )
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = ServiceConfig::parse();
    let app = create_app(config.clone())?;

    if config.ocr_engine == OcrEngineKind::Tesseract {
        let tesseract = TesseractRecognizer::new(&config.tesseract_cmd, &config.ocr_language);
        match tesseract.probe().await {
            Ok(version) => info!(version = %version, "Tesseract available"),
            // Requests still succeed, with empty OCR text.
            Err(e) => warn!(error = %e, "Tesseract not available, OCR will yield empty text"),
        }
    }

    let addr = config.socket_addr()?;
    info!(
        model = %config.llm_model,
        ocr_engine = ?config.ocr_engine,
        cors_origin = %config.cors_origin,
        "Loaded configuration"
    );

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Claim Intake Service starting on {}", listener.local_addr()?);
    info!("Processing endpoint: POST http://{}/api/process-documents", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

use thiserror::Error;

/// Why an OCR step produced no text.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Failed to decode image: {0}")]
    Decode(String),

    #[error("Failed to render PDF pages: {0}")]
    PdfRender(String),

    #[error("OCR engine unavailable: {0}")]
    EngineUnavailable(String),

    #[error("OCR engine failed: {0}")]
    Engine(String),

    #[error("Vision OCR request failed: {0}")]
    Vision(String),

    #[error("OCR worker did not finish: {0}")]
    Join(String),
}

/// Why the structured extraction step produced no data.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(String),

    #[error("LLM reply is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("LLM reply is JSON but not an object")]
    NotAnObject,
}

/// Failures that escape the pipeline and are reported to the caller.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Missing required upload field: {0}")]
    MissingField(&'static str),

    #[error("Invalid multipart request: {0}")]
    Multipart(String),

    #[error("Upload field {field} exceeds the {limit} byte limit")]
    FileTooLarge { field: &'static str, limit: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("API key is required (set OPENAI_API_KEY or pass --api-key)")]
    MissingApiKey,

    #[error("Invalid configuration value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

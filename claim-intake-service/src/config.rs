use clap::{Parser, ValueEnum};
use std::net::SocketAddr;

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LlmProvider {
    Openai,
    Openrouter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OcrEngineKind {
    /// Local `tesseract` executable
    Tesseract,
    /// Vision-capable chat model behind an OpenAI compatible API
    Vision,
}

/// Runtime configuration, built once at startup and handed to the app state.
#[derive(Debug, Clone, Parser)]
#[command(name = "claim-intake-service", about = "Insurance card and clinical document intake service")]
pub struct ServiceConfig {
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Single origin allowed to call the API from a browser
    #[arg(long, env = "CORS_ORIGIN", default_value = "http://localhost:3000")]
    pub cors_origin: String,

    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = 10 * 1024 * 1024)]
    pub max_upload_bytes: usize,

    #[arg(long, env = "LLM_PROVIDER", value_enum, default_value_t = LlmProvider::Openai)]
    pub llm_provider: LlmProvider,

    #[arg(long, env = "LLM_MODEL", default_value = "gpt-4")]
    pub llm_model: String,

    #[arg(long, env = "LLM_TEMPERATURE", default_value_t = 0.1)]
    pub llm_temperature: f64,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, default_value = "")]
    pub api_key: String,

    #[arg(long, env = "OCR_ENGINE", value_enum, default_value_t = OcrEngineKind::Tesseract)]
    pub ocr_engine: OcrEngineKind,

    #[arg(long, env = "TESSERACT_CMD", default_value = "tesseract")]
    pub tesseract_cmd: String,

    #[arg(long, env = "OCR_LANGUAGE", default_value = "eng")]
    pub ocr_language: String,

    #[arg(long, env = "VISION_MODEL", default_value = "gpt-4o-mini")]
    pub vision_model: String,

    #[arg(long, env = "VISION_BASE_URL", default_value = "https://api.openai.com/v1")]
    pub vision_base_url: String,
}

impl ServiceConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if !(0.0..=2.0).contains(&self.llm_temperature) {
            return Err(ConfigError::Invalid {
                field: "llm_temperature",
                reason: format!("{} is outside [0, 2]", self.llm_temperature),
            });
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid {
                field: "max_upload_bytes",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                field: "host",
                reason: e.to_string(),
            })
    }
}

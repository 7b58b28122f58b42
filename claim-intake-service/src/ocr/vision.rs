use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::DynamicImage;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::info;

use super::{TextRecognizer, encode_png};
use crate::error::OcrError;

const VISION_OCR_PROMPT: &str = "You are an OCR engine for insurance cards and clinical documents. \
Extract ALL text from this image with perfect accuracy, preserving line structure and medical terminology. \
Return ONLY the extracted text without any commentary. If the image contains no text, return an empty reply.";

/// OCR through a vision capable model on an OpenAI compatible chat API.
pub struct VisionRecognizer {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl VisionRecognizer {
    pub fn new(base_url: String, api_key: String, model: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
        }
    }

    fn payload(&self, png: &[u8]) -> Value {
        json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {
                    "role": "user",
                    "content": [
                        { "type": "text", "text": VISION_OCR_PROMPT },
                        {
                            "type": "image_url",
                            "image_url": {
                                "url": format!("data:image/png;base64,{}", STANDARD.encode(png))
                            }
                        }
                    ]
                }
            ]
        })
    }
}

#[async_trait]
impl TextRecognizer for VisionRecognizer {
    fn name(&self) -> &str {
        "vision"
    }

    async fn recognize(&self, page: &DynamicImage) -> Result<String, OcrError> {
        let png = encode_png(page)?;

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&self.payload(&png))
            .send()
            .await
            .map_err(|e| OcrError::Vision(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OcrError::Vision(format!(
                "API request failed: {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| OcrError::Vision(e.to_string()))?;
        let text = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| OcrError::Vision("Invalid response format from LLM".to_string()))?;

        info!(model = %self.model, chars = text.len(), "Vision OCR completed");
        Ok(text.to_string())
    }
}

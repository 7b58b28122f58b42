use std::sync::Arc;
use tracing::info;

use crate::error::OcrError;
use crate::extraction::{ChatModel, StructuredOutcome, extract_structured_data};
use crate::models::{Extraction, StructuredResult, UploadedFile};
use crate::ocr::{OcrOutcome, TextRecognizer, extract_text};

/// Render the two OCR texts into the prompt context handed to the model.
/// The same string is echoed back to the caller as `raw_text`.
pub fn combine_texts(insurance_text: &str, clinical_text: &str) -> String {
    format!(
        "\n        INSURANCE CARD TEXT:\n        {}\n\n        CLINICAL DOCUMENT TEXT:\n        {}\n        ",
        insurance_text, clinical_text
    )
}

pub struct PipelineOutput {
    pub card_text: OcrOutcome,
    pub clinical_text: OcrOutcome,
    pub structured: StructuredOutcome,
    pub raw_text: String,
}

impl PipelineOutput {
    pub fn into_parts(self) -> (StructuredResult, String) {
        (self.structured.into_value(), self.raw_text)
    }
}

/// OCR both uploads, combine the text, ask the model for structured data.
/// Steps run strictly in order.
#[derive(Clone)]
pub struct DocumentPipeline {
    recognizer: Arc<dyn TextRecognizer>,
    chat: Arc<dyn ChatModel>,
}

impl DocumentPipeline {
    pub fn new(recognizer: Arc<dyn TextRecognizer>, chat: Arc<dyn ChatModel>) -> Self {
        Self { recognizer, chat }
    }

    pub async fn process(
        &self,
        insurance_card: &UploadedFile,
        clinical_doc: &UploadedFile,
    ) -> PipelineOutput {
        let card_text = extract_text(self.recognizer.as_ref(), insurance_card).await;
        let clinical_text = extract_text(self.recognizer.as_ref(), clinical_doc).await;

        let raw_text = combine_texts(text_or_empty(&card_text), text_or_empty(&clinical_text));
        let structured = extract_structured_data(self.chat.as_ref(), &raw_text).await;

        info!(
            card_ocr = outcome_label(&card_text),
            clinical_ocr = outcome_label(&clinical_text),
            structured = outcome_label(&structured),
            "Document pipeline finished"
        );

        PipelineOutput {
            card_text,
            clinical_text,
            structured,
            raw_text,
        }
    }
}

fn text_or_empty(outcome: &Extraction<String, OcrError>) -> &str {
    outcome.value().map(String::as_str).unwrap_or("")
}

fn outcome_label<T, E>(outcome: &Extraction<T, E>) -> &'static str {
    match outcome {
        Extraction::Found(_) => "found",
        Extraction::Empty => "empty",
        Extraction::Failed(_) => "failed",
    }
}

//! OCR step: turn an uploaded image (or PDF) into best-effort plain text.
//!
//! Failures never leave this module as errors. [`extract_text`] reports them
//! through [`Extraction::Failed`] and the pipeline falls back to an empty
//! string.

mod tesseract;
mod vision;

pub use tesseract::TesseractRecognizer;
pub use vision::VisionRecognizer;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use pdf2image::{PDF, Pages};
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::{OcrEngineKind, ServiceConfig};
use crate::error::OcrError;
use crate::models::{Extraction, MediaKind, UploadedFile};

pub type OcrOutcome = Extraction<String, OcrError>;

/// Recognizes the text on a single rendered page.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    fn name(&self) -> &str;

    async fn recognize(&self, page: &DynamicImage) -> Result<String, OcrError>;
}

/// Build the recognizer selected by the configuration.
pub fn build_recognizer(config: &ServiceConfig) -> Arc<dyn TextRecognizer> {
    match config.ocr_engine {
        OcrEngineKind::Tesseract => Arc::new(TesseractRecognizer::new(
            config.tesseract_cmd.clone(),
            config.ocr_language.clone(),
        )),
        OcrEngineKind::Vision => Arc::new(VisionRecognizer::new(
            config.vision_base_url.clone(),
            config.api_key.clone(),
            config.vision_model.clone(),
        )),
    }
}

/// Run OCR over one upload.
pub async fn extract_text(recognizer: &dyn TextRecognizer, upload: &UploadedFile) -> OcrOutcome {
    match recognize_upload(recognizer, upload).await {
        Ok(text) if text.trim().is_empty() => {
            info!(field = upload.field, engine = recognizer.name(), "OCR found no text");
            Extraction::Empty
        }
        Ok(text) => {
            info!(
                field = upload.field,
                engine = recognizer.name(),
                chars = text.len(),
                "OCR extracted text"
            );
            Extraction::Found(text)
        }
        Err(e) => {
            warn!(
                field = upload.field,
                file_name = upload.file_name.as_deref().unwrap_or("-"),
                engine = recognizer.name(),
                error = %e,
                "OCR Error"
            );
            Extraction::Failed(e)
        }
    }
}

async fn recognize_upload(
    recognizer: &dyn TextRecognizer,
    upload: &UploadedFile,
) -> Result<String, OcrError> {
    let pages = decode_pages(upload).await?;
    debug!(field = upload.field, pages = pages.len(), "Decoded upload into pages");
    recognize_pages(recognizer, &pages).await
}

/// Page texts in page order, separated by a blank line.
async fn recognize_pages(
    recognizer: &dyn TextRecognizer,
    pages: &[DynamicImage],
) -> Result<String, OcrError> {
    let mut texts = Vec::with_capacity(pages.len());
    for page in pages {
        texts.push(recognizer.recognize(page).await?);
    }
    Ok(texts.join("\n\n"))
}

/// Decode an upload into raster pages. Anything that is not a PDF is assumed
/// to be an image.
pub async fn decode_pages(upload: &UploadedFile) -> Result<Vec<DynamicImage>, OcrError> {
    let bytes = upload.bytes.clone();
    let kind = upload.kind;

    tokio::task::spawn_blocking(move || match kind {
        MediaKind::Pdf => render_pdf(bytes),
        MediaKind::Image | MediaKind::Unknown => image::load_from_memory(&bytes)
            .map(|image| vec![image])
            .map_err(|e| OcrError::Decode(e.to_string())),
    })
    .await
    .map_err(|e| OcrError::Join(e.to_string()))?
}

fn render_pdf(bytes: Vec<u8>) -> Result<Vec<DynamicImage>, OcrError> {
    let pdf = PDF::from_bytes(bytes).map_err(|e| OcrError::PdfRender(e.to_string()))?;
    let pages = pdf
        .render(Pages::All, None)
        .map_err(|e| OcrError::PdfRender(e.to_string()))?;

    if pages.is_empty() {
        return Err(OcrError::PdfRender("PDF has no pages".to_string()));
    }
    Ok(pages)
}

/// PNG encoding shared by the recognizers.
pub(crate) fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, OcrError> {
    let mut buffer = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .map_err(|e| OcrError::Decode(format!("Failed to encode page as PNG: {}", e)))?;
    Ok(buffer)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Recognizer returning a canned answer and counting calls.
    pub(crate) struct FakeRecognizer {
        pub reply: Result<String, String>,
        pub calls: AtomicUsize,
    }

    impl FakeRecognizer {
        pub(crate) fn text(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                calls: AtomicUsize::new(0),
            }
        }

        pub(crate) fn failing(message: &str) -> Self {
            Self {
                reply: Err(message.to_string()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl TextRecognizer for FakeRecognizer {
        fn name(&self) -> &str {
            "fake"
        }

        async fn recognize(&self, _page: &DynamicImage) -> Result<String, OcrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply.clone().map_err(OcrError::Engine)
        }
    }

    pub(crate) fn blank_png() -> Vec<u8> {
        encode_png(&DynamicImage::new_rgb8(64, 32)).unwrap()
    }

    fn upload(bytes: Vec<u8>, content_type: Option<&str>) -> UploadedFile {
        UploadedFile::new("insurance_card", Some("card.png".into()), content_type, bytes)
    }

    #[tokio::test]
    async fn test_extracts_text_from_image() {
        let recognizer = FakeRecognizer::text("MEMBER ID 12345");
        let outcome = extract_text(&recognizer, &upload(blank_png(), Some("image/png"))).await;

        assert_eq!(outcome.value().map(String::as_str), Some("MEMBER ID 12345"));
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_undecodable_bytes_fail_without_calling_engine() {
        let recognizer = FakeRecognizer::text("unused");
        let outcome = extract_text(&recognizer, &upload(b"not an image".to_vec(), None)).await;

        assert!(matches!(outcome, Extraction::Failed(OcrError::Decode(_))));
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 0);
        assert_eq!(outcome.into_value(), "");
    }

    #[tokio::test]
    async fn test_whitespace_only_text_is_empty() {
        let recognizer = FakeRecognizer::text(" \n\x0c");
        let outcome = extract_text(&recognizer, &upload(blank_png(), Some("image/png"))).await;

        assert!(outcome.is_empty());
        assert_eq!(outcome.into_value(), "");
    }

    #[tokio::test]
    async fn test_engine_error_is_absorbed() {
        let recognizer = FakeRecognizer::failing("tesseract crashed");
        let outcome = extract_text(&recognizer, &upload(blank_png(), Some("image/png"))).await;

        assert!(matches!(outcome, Extraction::Failed(OcrError::Engine(_))));
        assert_eq!(outcome.into_value(), "");
    }

    #[tokio::test]
    async fn test_broken_pdf_is_a_render_failure() {
        let recognizer = FakeRecognizer::text("unused");
        let outcome = extract_text(
            &recognizer,
            &upload(b"%PDF-1.4 truncated".to_vec(), Some("application/pdf")),
        )
        .await;

        assert!(matches!(outcome, Extraction::Failed(OcrError::PdfRender(_))));
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 0);
    }

    /// Answers "page 1", "page 2", ... in call order.
    struct PageCounter {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextRecognizer for PageCounter {
        fn name(&self) -> &str {
            "page-counter"
        }

        async fn recognize(&self, _page: &DynamicImage) -> Result<String, OcrError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(format!("page {}", n))
        }
    }

    /// Minimal blank PDF with `count` pages and a valid xref table.
    fn blank_pdf(count: usize) -> Vec<u8> {
        let kids: Vec<String> = (0..count).map(|i| format!("{} 0 R", i + 3)).collect();
        let mut objects = vec![
            "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
            format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids.join(" "), count),
        ];
        for _ in 0..count {
            objects.push("<< /Type /Page /Parent 2 0 R /MediaBox [0 0 200 100] >>".to_string());
        }

        let mut pdf = b"%PDF-1.4\n".to_vec();
        let mut offsets = Vec::with_capacity(objects.len());
        for (i, object) in objects.iter().enumerate() {
            offsets.push(pdf.len());
            pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, object).as_bytes());
        }

        let xref_start = pdf.len();
        pdf.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1).as_bytes());
        for offset in offsets {
            pdf.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
        }
        pdf.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
                objects.len() + 1,
                xref_start
            )
            .as_bytes(),
        );
        pdf
    }

    fn poppler_available() -> bool {
        ["pdfinfo", "pdftoppm"].iter().all(|tool| {
            std::process::Command::new(tool)
                .arg("-v")
                .output()
                .is_ok()
        })
    }

    #[tokio::test]
    async fn test_page_texts_are_joined_with_blank_line() {
        let recognizer = PageCounter {
            calls: AtomicUsize::new(0),
        };
        let pages = vec![DynamicImage::new_rgb8(8, 8), DynamicImage::new_rgb8(8, 8)];

        let text = recognize_pages(&recognizer, &pages).await.unwrap();

        assert_eq!(text, "page 1\n\npage 2");
    }

    #[tokio::test]
    async fn test_multi_page_pdf_is_recognized_page_by_page() {
        if !poppler_available() {
            println!("Skipping test - poppler not available");
            return;
        }

        let recognizer = PageCounter {
            calls: AtomicUsize::new(0),
        };
        let upload = UploadedFile::new(
            "clinical_doc",
            Some("notes.pdf".into()),
            Some("application/pdf"),
            blank_pdf(2),
        );
        let outcome = extract_text(&recognizer, &upload).await;

        assert_eq!(outcome.value().map(String::as_str), Some("page 1\n\npage 2"));
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 2);
    }
}

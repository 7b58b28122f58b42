use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Structured claim record produced by the model. Kept as a raw JSON object:
/// whatever keys the model returned are passed through untouched.
pub type StructuredResult = Map<String, Value>;

/// Keys the system prompt asks the model to fill in.
pub const RECOGNIZED_KEYS: [&str; 8] = [
    "patient_name",
    "date_of_birth",
    "insurance_company",
    "policy_number",
    "group_number",
    "proposed_cpt_codes",
    "proposed_icd_codes",
    "estimated_denial_risk",
];

pub const INSURANCE_CARD_FIELD: &str = "insurance_card";
pub const CLINICAL_DOC_FIELD: &str = "clinical_doc";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Pdf,
    Unknown,
}

impl MediaKind {
    /// Resolve the media kind from the declared content type, falling back to
    /// sniffing the leading bytes when the declaration is missing or generic.
    pub fn detect(content_type: Option<&str>, bytes: &[u8]) -> Self {
        match content_type.map(|ct| ct.trim().to_ascii_lowercase()) {
            Some(ct) if ct == "application/pdf" => MediaKind::Pdf,
            Some(ct) if ct.starts_with("image/") => MediaKind::Image,
            _ if bytes.starts_with(b"%PDF-") => MediaKind::Pdf,
            _ if image::guess_format(bytes).is_ok() => MediaKind::Image,
            _ => MediaKind::Unknown,
        }
    }
}

/// A single file taken from the multipart request. Lives only for the request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub field: &'static str,
    pub file_name: Option<String>,
    pub kind: MediaKind,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(
        field: &'static str,
        file_name: Option<String>,
        content_type: Option<&str>,
        bytes: Vec<u8>,
    ) -> Self {
        let kind = MediaKind::detect(content_type, &bytes);
        Self {
            field,
            file_name,
            kind,
            bytes,
        }
    }
}

/// Outcome of one extraction step.
///
/// `Empty` and `Failed` both collapse to the default value at the HTTP
/// boundary, but stay distinguishable for logging and tests.
#[derive(Debug)]
pub enum Extraction<T, E> {
    Found(T),
    Empty,
    Failed(E),
}

impl<T: Default, E> Extraction<T, E> {
    pub fn into_value(self) -> T {
        match self {
            Extraction::Found(value) => value,
            Extraction::Empty | Extraction::Failed(_) => T::default(),
        }
    }
}

impl<T, E> Extraction<T, E> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Extraction::Found(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Extraction::Failed(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Extraction::Empty)
    }
}

/// Body returned by `POST /api/process-documents`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<StructuredResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessResponse {
    pub fn success(data: StructuredResult, raw_text: String) -> Self {
        Self {
            success: true,
            data: Some(data),
            raw_text: Some(raw_text),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            raw_text: None,
            error: Some(error.into()),
        }
    }
}

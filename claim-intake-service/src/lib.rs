pub mod config;
pub mod error;
pub mod extraction;
pub mod models;
pub mod ocr;
pub mod pipeline;
pub mod service;

pub use config::ServiceConfig;
pub use extraction::{ChatModel, RigChatModel};
pub use models::*;
pub use ocr::{TesseractRecognizer, TextRecognizer, VisionRecognizer};
pub use pipeline::{DocumentPipeline, combine_texts};
pub use service::{AppState, build_router, create_app};

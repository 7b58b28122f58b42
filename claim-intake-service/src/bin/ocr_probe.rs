use anyhow::{Context, Result};
use clap::Parser;
use claim_intake_service::{
    UploadedFile,
    config::OcrEngineKind,
    ocr::{build_recognizer, extract_text},
    Extraction, ServiceConfig, TesseractRecognizer,
};
use std::path::PathBuf;

/// Run the configured OCR engine over a file on disk and print the text.
#[derive(Debug, Parser)]
#[command(name = "ocr_probe")]
struct Args {
    /// Image or PDF to recognize
    file: PathBuf,

    #[command(flatten)]
    service: ServiceConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let args = Args::parse();

    println!("OCR probe");
    println!("=========");
    println!("File:   {}", args.file.display());
    println!("Engine: {:?}", args.service.ocr_engine);

    if args.service.ocr_engine == OcrEngineKind::Tesseract {
        let tesseract =
            TesseractRecognizer::new(&args.service.tesseract_cmd, &args.service.ocr_language);
        match tesseract.probe().await {
            Ok(version) => println!("Version: {}", version),
            Err(e) => {
                eprintln!("{}", e);
                eprintln!("Install tesseract or pass --tesseract-cmd");
                std::process::exit(1);
            }
        }
    } else if args.service.api_key.is_empty() {
        eprintln!("Please set OPENAI_API_KEY environment variable for vision OCR");
        std::process::exit(1);
    }

    let bytes = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let upload = UploadedFile::new(
        "probe",
        args.file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned()),
        None,
        bytes,
    );
    println!("Kind:   {:?}", upload.kind);
    println!();

    let recognizer = build_recognizer(&args.service);
    match extract_text(recognizer.as_ref(), &upload).await {
        Extraction::Found(text) => {
            println!("Extracted {} characters:", text.len());
            println!("{}", text);
        }
        Extraction::Empty => println!("No text found"),
        Extraction::Failed(e) => {
            eprintln!("OCR failed: {}", e);
            std::process::exit(2);
        }
    }

    Ok(())
}

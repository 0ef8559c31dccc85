//! Plain-text extraction from uploaded documents

use lopdf::Document;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse PDF {path}: {message}")]
    Pdf { path: String, message: String },

    #[error("{0} is not valid UTF-8 text")]
    NotText(String),
}

/// Extract the text of a document, dispatching on its extension
///
/// PDFs are read page by page; anything else is read as UTF-8 text.
pub fn extract_text(path: &Path) -> Result<String, ExtractError> {
    if !path.is_file() {
        return Err(ExtractError::NotFound(path.display().to_string()));
    }

    let is_pdf = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);

    if is_pdf {
        extract_pdf(path)
    } else {
        let bytes = std::fs::read(path).map_err(|e| ExtractError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        String::from_utf8(bytes).map_err(|_| ExtractError::NotText(path.display().to_string()))
    }
}

/// Extract the text of every page of a PDF, one page per line block
///
/// Pages whose text cannot be decoded are logged and skipped.
pub fn extract_pdf(path: &Path) -> Result<String, ExtractError> {
    let doc = Document::load(path).map_err(|e| ExtractError::Pdf {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(pdf_text(&doc, &path.display().to_string()))
}

/// Extract the text of an uploaded document held in memory
///
/// Content starting with the PDF signature, or named `*.pdf`, is parsed as a
/// PDF; anything else must be UTF-8 text.
pub fn extract_bytes(name: &str, bytes: &[u8]) -> Result<String, ExtractError> {
    let is_pdf = bytes.starts_with(b"%PDF") || name.to_ascii_lowercase().ends_with(".pdf");
    if is_pdf {
        extract_pdf_bytes(bytes)
    } else {
        String::from_utf8(bytes.to_vec()).map_err(|_| ExtractError::NotText(name.to_string()))
    }
}

/// Extract the text of a PDF held in memory
pub fn extract_pdf_bytes(bytes: &[u8]) -> Result<String, ExtractError> {
    let doc = Document::load_mem(bytes).map_err(|e| ExtractError::Pdf {
        path: "<memory>".to_string(),
        message: e.to_string(),
    })?;
    Ok(pdf_text(&doc, "<memory>"))
}

fn pdf_text(doc: &Document, source: &str) -> String {
    let mut text = String::new();
    let mut failed = 0;

    for page_number in doc.get_pages().keys() {
        match doc.extract_text(&[*page_number]) {
            Ok(page) => {
                text.push_str(page.trim_end());
                text.push('\n');
            }
            Err(e) => {
                failed += 1;
                tracing::warn!("Skipping page {} of {}: {}", page_number, source, e);
            }
        }
    }

    tracing::debug!(
        "Extracted {} bytes of text from {} ({} pages skipped)",
        text.len(),
        source,
        failed
    );

    text
}

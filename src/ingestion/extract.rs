//! PDF text extraction

use crate::error::{Error, Result};

/// PDF magic bytes
const PDF_MAGIC: &[u8] = b"%PDF-";

/// Check whether the uploaded bytes look like a PDF
pub fn is_pdf(data: &[u8]) -> bool {
    data.starts_with(PDF_MAGIC)
}

/// Extract plain text from a PDF byte buffer
///
/// Any parser failure maps to `Error::Extraction`, which aborts ingestion
/// before anything is persisted. Page texts come back whitespace-normalized
/// so the chunker sees a flat character sequence.
pub fn extract_text(filename: &str, data: &[u8]) -> Result<String> {
    if !is_pdf(data) {
        return Err(Error::extraction(filename, "not a PDF file"));
    }

    let raw = pdf_extract::extract_text_from_mem(data)
        .map_err(|e| Error::extraction(filename, e.to_string()))?;

    let text = normalize_whitespace(&raw);
    if text.is_empty() {
        return Err(Error::extraction(filename, "no extractable text"));
    }

    Ok(text)
}

/// Collapse runs of whitespace within lines, keep paragraph breaks
pub fn normalize_whitespace(raw: &str) -> String {
    let mut paragraphs = Vec::new();
    for block in raw.split("\n\n") {
        let collapsed = block.split_whitespace().collect::<Vec<_>>().join(" ");
        if !collapsed.is_empty() {
            paragraphs.push(collapsed);
        }
    }
    paragraphs.join("\n\n")
}

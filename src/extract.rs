//! Text extraction for uploaded documents (PDF, DOCX).
//!
//! Format detection is by file extension and happens before any parsing
//! work. Extraction returns ordered page-level text segments: one entry per
//! PDF page, or a single page 0 for DOCX (which has no fixed pagination).

use std::io::Read;
use std::path::Path;

use crate::models::Page;

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Document formats accepted for ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Pdf,
    Docx,
}

/// Extraction error. Variants distinguish the rejection of unknown formats
/// (before any parsing) from corrupt/unreadable content.
#[derive(Debug)]
pub enum ExtractError {
    UnsupportedFormat(String),
    Io(String),
    Pdf(String),
    Ooxml(String),
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::UnsupportedFormat(name) => {
                write!(f, "unsupported file format: {}", name)
            }
            ExtractError::Io(e) => write!(f, "could not read file: {}", e),
            ExtractError::Pdf(e) => write!(f, "PDF extraction failed: {}", e),
            ExtractError::Ooxml(e) => write!(f, "DOCX extraction failed: {}", e),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Detect the document format from the file extension.
pub fn detect_format(path: &Path) -> Result<Format, ExtractError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => Ok(Format::Pdf),
        "docx" => Ok(Format::Docx),
        _ => Err(ExtractError::UnsupportedFormat(
            path.file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("<unnamed>")
                .to_string(),
        )),
    }
}

/// Extract ordered page-level text from a document on disk.
pub fn extract_pages(path: &Path) -> Result<Vec<Page>, ExtractError> {
    let format = detect_format(path)?;
    let bytes = std::fs::read(path).map_err(|e| ExtractError::Io(e.to_string()))?;
    match format {
        Format::Pdf => extract_pdf(&bytes),
        Format::Docx => extract_docx(&bytes),
    }
}

fn extract_pdf(bytes: &[u8]) -> Result<Vec<Page>, ExtractError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(number, text)| Page { number, text })
        .collect())
}

/// DOCX carries no pagination, so the whole body becomes page 0.
fn extract_docx(bytes: &[u8]) -> Result<Vec<Page>, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let mut doc_xml = Vec::new();
    let mut found = false;
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
        if entry.name() == "word/document.xml" {
            entry
                .take(MAX_XML_ENTRY_BYTES)
                .read_to_end(&mut doc_xml)
                .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
            if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
                return Err(ExtractError::Ooxml(
                    "word/document.xml exceeds size limit".to_string(),
                ));
            }
            found = true;
            break;
        }
    }
    if !found {
        return Err(ExtractError::Ooxml(
            "word/document.xml not found".to_string(),
        ));
    }
    let text = extract_w_t_elements(&doc_xml)?;
    Ok(vec![Page { number: 0, text }])
}

/// Collect `w:t` run text, inserting paragraph breaks at `w:p` boundaries
/// so the chunker sees natural separators.
fn extract_w_t_elements(xml: &[u8]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"p" && !out.is_empty() && !out.ends_with("\n\n") {
                    out.push_str("\n\n");
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(out.trim_end().to_string())
}

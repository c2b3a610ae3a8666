//! services/bot/src/adapters/pdf.rs
//!
//! Best-effort text extraction from uploaded PDF files, used to feed the
//! analysis collaborator. Long documents are sampled from the front.

use lopdf::Document;

/// How many pages a document may have before extraction is sampled.
const FULL_EXTRACTION_PAGE_LIMIT: usize = 50;
/// How many leading pages are read from an oversized document.
const SAMPLED_PAGE_COUNT: usize = 10;

/// The outcome of extracting text from a PDF.
#[derive(Debug)]
pub struct ExtractedText {
    pub text: String,
    pub page_count: usize,
    pub truncated: bool,
}

/// Extracts text from an in-memory PDF. Documents over
/// `FULL_EXTRACTION_PAGE_LIMIT` pages only contribute their first
/// `SAMPLED_PAGE_COUNT` pages, which is plenty for metadata inference.
pub fn extract_text(bytes: &[u8]) -> Result<ExtractedText, lopdf::Error> {
    let document = Document::load_mem(bytes)?;
    let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
    let page_count = page_numbers.len();

    let truncated = page_count > FULL_EXTRACTION_PAGE_LIMIT;
    let selected: Vec<u32> = if truncated {
        page_numbers.into_iter().take(SAMPLED_PAGE_COUNT).collect()
    } else {
        page_numbers
    };

    let text = document.extract_text(&selected)?;
    Ok(ExtractedText {
        text,
        page_count,
        truncated,
    })
}

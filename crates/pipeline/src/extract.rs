//! Local PDF text extraction
//!
//! A lopdf-backed [`ExtractionService`] that parses the acquired binary in
//! memory. Extraction is best effort per page: a page whose content stream
//! cannot be parsed is skipped with a warning, and only a document yielding
//! no text at all fails.

use paperscout_common::errors::{PipelineError, Result};
use paperscout_common::stores::ExtractionService;
use async_trait::async_trait;
use tracing::{debug, warn};

#[derive(Default)]
pub struct PdfTextExtractor;

impl PdfTextExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ExtractionService for PdfTextExtractor {
    async fn extract_text(&self, bytes: &[u8]) -> Result<String> {
        let doc = lopdf::Document::load_mem(bytes).map_err(|e| {
            PipelineError::UnsupportedFormat {
                message: format!("not a parseable PDF: {e}"),
            }
        })?;

        let pages = doc.get_pages();
        debug!(page_count = pages.len(), "Extracting text from PDF");

        let mut text = String::new();
        for (page_num, page_id) in pages.iter() {
            match doc.get_page_content(*page_id) {
                Ok(content) => {
                    text.push_str(&content_stream_text(&content));
                    text.push('\n');
                }
                Err(e) => {
                    warn!(page = page_num, error = %e, "Skipping unreadable page");
                }
            }
        }

        if text.trim().is_empty() {
            return Err(PipelineError::EmptyExtraction);
        }

        let cleaned = clean_text(&text);
        debug!(
            original_len = text.len(),
            cleaned_len = cleaned.len(),
            "Text extraction complete"
        );
        Ok(cleaned)
    }
}

/// Pull shown text out of a page content stream by walking BT/ET blocks.
fn content_stream_text(content: &[u8]) -> String {
    let content_str = String::from_utf8_lossy(content);
    let mut text = String::new();
    let mut in_text_block = false;

    for line in content_str.lines() {
        let trimmed = line.trim();
        match trimmed {
            "BT" => in_text_block = true,
            "ET" => in_text_block = false,
            _ if in_text_block => {
                if let Some(shown) = operator_text(trimmed) {
                    text.push_str(&shown);
                    text.push(' ');
                }
            }
            _ => {}
        }
    }

    text
}

/// Text carried by a Tj / ' / " / TJ operator line, if any.
fn operator_text(line: &str) -> Option<String> {
    if line.ends_with("Tj") || line.ends_with('\'') || line.ends_with('"') {
        let start = line.find('(')?;
        let end = line.rfind(')')?;
        if start < end {
            return Some(decode_pdf_string(&line[start + 1..end]));
        }
        return None;
    }

    // [(text) kern (text)] TJ arrays
    if line.ends_with("TJ") {
        let mut result = String::new();
        let mut current = String::new();
        let mut in_paren = false;
        for ch in line.chars() {
            match ch {
                '(' => in_paren = true,
                ')' => {
                    in_paren = false;
                    result.push_str(&decode_pdf_string(&current));
                    current.clear();
                }
                _ if in_paren => current.push(ch),
                _ => {}
            }
        }
        if !result.is_empty() {
            return Some(result);
        }
    }

    None
}

/// Resolve backslash escapes in a PDF literal string.
fn decode_pdf_string(s: &str) -> String {
    let mut result = String::new();
    let mut chars = s.chars();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some('n') => result.push('\n'),
                Some('r') => result.push('\r'),
                Some('t') => result.push('\t'),
                Some(c) => result.push(c),
                None => {}
            }
        } else {
            result.push(ch);
        }
    }
    result
}

/// Collapse whitespace runs and strip stray byte-order marks.
fn clean_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{FEFF}', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_text_tj() {
        assert_eq!(operator_text("(Hello World) Tj"), Some("Hello World".into()));
        assert_eq!(operator_text("1 0 0 1 50 700 Tm"), None);
    }

    #[test]
    fn test_operator_text_tj_array() {
        assert_eq!(
            operator_text("[(Spar) -10 (se) 5 ( Autoencoders)] TJ"),
            Some("Sparse Autoencoders".into())
        );
    }

    #[test]
    fn test_decode_pdf_string_escapes() {
        assert_eq!(decode_pdf_string("Hello\\nWorld"), "Hello\nWorld");
        assert_eq!(decode_pdf_string("Test\\(paren\\)"), "Test(paren)");
    }

    #[test]
    fn test_clean_text_collapses_whitespace() {
        assert_eq!(clean_text("Hello   World\n\nTest"), "Hello World Test");
    }

    #[test]
    fn test_content_stream_text_walks_bt_et() {
        let stream = b"BT\n(First line) Tj\nET\nnot text\nBT\n(Second) Tj\nET\n";
        assert_eq!(content_stream_text(stream).trim(), "First line Second");
    }

    #[tokio::test]
    async fn test_garbage_bytes_are_unsupported() {
        let extractor = PdfTextExtractor::new();
        let err = extractor.extract_text(b"not a pdf").await.unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat { .. }));
    }
}

//! Plain-text extraction from PDF documents.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::warn;

use crate::error::ParseError;
use crate::html::resolve_url;
use crate::text::{escape_html, tokenize, Budget};

/// Extracted text is capped at this many characters.
pub const MAX_TEXT_CHARS: usize = 1 << 12;
/// Paragraphs with this many tokens or fewer are headers, captions or noise.
pub const MIN_PARAGRAPH_TOKENS: usize = 20;
/// Runs of dots like this mark a table of contents.
const TOC_LEADER: &str = "..........";

/// Text content of a PDF document.
#[derive(Debug, Clone)]
pub struct PdfContent {
    url: String,
    text: String,
}

impl PdfContent {
    /// Extract text from raw PDF bytes.
    ///
    /// The PDF parser can panic on malformed input; that is reported as a
    /// [`ParseError::Pdf`] like any other failure.
    pub fn parse(bytes: &[u8], url: &str) -> Result<Self, ParseError> {
        let extracted = catch_unwind(AssertUnwindSafe(|| pdf_extract::extract_text_from_mem(bytes)))
            .map_err(|_| ParseError::Pdf("pdf parser panicked".to_string()))?
            .map_err(|e| ParseError::Pdf(e.to_string()))?;
        Ok(Self::from_text(&extracted, url))
    }

    /// Build from already extracted text, applying the size cap.
    pub fn from_text(text: &str, url: &str) -> Self {
        let mut kept = String::new();
        let mut chars = 0usize;
        for line in text.lines() {
            if chars > MAX_TEXT_CHARS {
                warn!(url = %url, chars, "PDF text too long, truncating");
                break;
            }
            chars += line.chars().count() + 1;
            kept.push_str(line);
            kept.push('\n');
        }
        Self {
            url: url.to_string(),
            text: kept,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Blank-line separated paragraphs, each joined onto one line.
    pub fn paragraphs(&self) -> Vec<String> {
        let mut paragraphs = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        for line in self.text.lines() {
            let line = line.trim();
            if line.is_empty() {
                if !current.is_empty() {
                    paragraphs.push(current.join(" "));
                    current.clear();
                }
            } else {
                current.push(line);
            }
        }
        if !current.is_empty() {
            paragraphs.push(current.join(" "));
        }
        paragraphs
    }

    /// Bounded, escaped extract built from body paragraphs.
    pub fn get_content(&self, max_length: usize) -> String {
        let mut budget = Budget::new(max_length);
        let mut out = Vec::new();
        for paragraph in self.paragraphs() {
            if tokenize(&paragraph).len() <= MIN_PARAGRAPH_TOKENS || paragraph.contains(TOC_LEADER) {
                continue;
            }
            let escaped = escape_html(&paragraph);
            if budget.fits(&escaped) {
                budget.spend(&escaped);
                out.push(escaped);
            } else if budget.push_tokens(&paragraph, &mut out) {
                break;
            }
        }
        out.concat()
    }

    pub fn favicon_url(&self) -> String {
        resolve_url(&self.url, "/favicon.ico")
    }
}

//! Content-type dispatch: one fetched document becomes one [`Page`].

use tracing::{info, warn};

use crate::embeddable::{is_embeddable, EmbedContent};
use crate::error::{ExtractError, Result};
use crate::fetch::{Fetched, Fetcher};
use crate::html::HtmlContent;
use crate::image::ImageSource;
use crate::pdf::PdfContent;

/// A fetched document ready for extraction.
#[derive(Debug, Clone)]
pub struct Document {
    /// Final URL after redirects
    pub url: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl From<Fetched> for Document {
    fn from(fetched: Fetched) -> Self {
        Self {
            url: fetched.url,
            content_type: fetched.content_type,
            bytes: fetched.body,
        }
    }
}

impl Document {
    /// Body decoded as UTF-8, invalid sequences replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }

    /// Lower-cased content type; a missing header reads as `text`.
    fn content_type(&self) -> String {
        self.content_type
            .as_deref()
            .unwrap_or("text")
            .to_lowercase()
    }
}

/// Fetch `url` (scheme defaults to `http://`) and wrap it as a [`Document`].
pub async fn fetch_document(fetcher: &dyn Fetcher, url: &str) -> Result<Document> {
    let url = if url.starts_with("http") {
        url.to_string()
    } else {
        format!("http://{}", url)
    };
    Ok(fetcher.fetch(&url, None).await?.into())
}

/// Extracted form of a document.
#[derive(Debug, Clone)]
pub enum Page {
    Html(HtmlContent),
    Pdf(PdfContent),
    Embed(EmbedContent),
}

impl Page {
    /// Pick an extractor for the document.
    ///
    /// Embed providers are tried first and fall back to HTML when the URL
    /// names no media. Text-like types are HTML, `application/pdf` is PDF
    /// (an unreadable PDF becomes an empty page), and everything else is
    /// rejected.
    pub fn from_document(doc: &Document) -> Result<Self> {
        if is_embeddable(&doc.url) {
            match EmbedContent::parse(&doc.url, &doc.text()) {
                Ok(embed) => {
                    info!(url = %doc.url, provider = embed.provider().name(), "Parsed embeddable page");
                    return Ok(Self::Embed(embed));
                }
                Err(e) => info!(url = %doc.url, error = %e, "Not an embeddable, trying other extractors"),
            }
        }

        let content_type = doc.content_type();
        if content_type.starts_with("text")
            || content_type.contains("html")
            || content_type.contains("xml")
            || content_type.contains("charset")
        {
            return Ok(Self::Html(HtmlContent::parse(&doc.text(), &doc.url)));
        }
        if content_type.starts_with("application/pdf") {
            let pdf = PdfContent::parse(&doc.bytes, &doc.url).unwrap_or_else(|e| {
                warn!(url = %doc.url, error = %e, "Failed to parse pdf");
                PdfContent::from_text("", &doc.url)
            });
            return Ok(Self::Pdf(pdf));
        }
        Err(ExtractError::UnsupportedContentType {
            url: doc.url.clone(),
            content_type,
        })
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Html(html) => html.url(),
            Self::Pdf(pdf) => pdf.url(),
            Self::Embed(embed) => embed.url(),
        }
    }

    /// Document title; PDFs and embeds have none.
    pub fn title(&self) -> &str {
        match self {
            Self::Html(html) => html.title(),
            _ => "",
        }
    }

    /// Bounded extract, or the full embed markup for embeds.
    pub fn get_content(&self, max_length: usize) -> String {
        match self {
            Self::Html(html) => html.get_content(max_length),
            Self::Pdf(pdf) => pdf.get_content(max_length),
            Self::Embed(embed) => embed.get_content().to_string(),
        }
    }

    pub fn favicon_url(&self) -> String {
        match self {
            Self::Html(html) => html.favicon_url(),
            Self::Pdf(pdf) => pdf.favicon_url(),
            Self::Embed(embed) => embed.favicon_url().to_string(),
        }
    }

    /// Illustration candidates; only HTML pages have any.
    pub fn image_candidates(&self) -> Vec<ImageSource> {
        match self {
            Self::Html(html) => html.image_candidates(),
            _ => Vec::new(),
        }
    }
}

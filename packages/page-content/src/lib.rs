//! Page Content Extraction
//!
//! Turns a fetched web document into a short, HTML-escaped extract and picks
//! an illustration for it.
//!
//! # Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use page_content::{fetch_document, HttpFetcher, FetchConfig, ImageSelector, Page};
//!
//! let fetcher = Arc::new(HttpFetcher::new(FetchConfig::default())?);
//! let doc = fetch_document(fetcher.as_ref(), "https://example.com/post").await?;
//! let page = Page::from_document(&doc)?;
//!
//! let extract = page.get_content(400);
//! let image = ImageSelector::new(fetcher.clone())
//!     .with_referrer(page.url())
//!     .select(&page.image_candidates())
//!     .await;
//! ```
//!
//! # Modules
//!
//! - [`html`] - Article detection and bounded extraction for HTML
//! - [`pdf`] - Paragraph extraction for PDF documents
//! - [`embeddable`] - Embed markup for known video and document hosts
//! - [`image`] - Candidate checks, header sniffing and image selection
//! - [`fetch`] - The [`Fetcher`] seam and its reqwest implementation
//! - [`testing`] - Mock fetcher for tests

pub mod dom;
pub mod embeddable;
pub mod error;
pub mod fetch;
pub mod html;
pub mod image;
pub mod page;
pub mod pdf;
pub mod testing;
pub mod text;

pub use embeddable::{is_embed_markup, is_embeddable, EmbedContent, EmbedProvider, EmbedRegistry};
pub use error::{ExtractError, FetchError, ParseError, Result, SniffError};
pub use fetch::{FetchConfig, Fetched, Fetcher, HttpFetcher};
pub use html::{ExtractOptions, HtmlContent, PageMeta};
pub use image::{sniff, ImageInfo, ImageMeta, ImageSelector, ImageSource, SniffedFormat, WebImage};
pub use page::{fetch_document, Document, Page};
pub use pdf::PdfContent;
pub use testing::MockFetcher;

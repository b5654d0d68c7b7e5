//! Candidate images and the checks that decide whether one can illustrate a
//! story.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, GenericImageView};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::sniff::{sniff, SniffedFormat};
use crate::error::ParseError;

/// Smallest accepted width or height in pixels.
pub const MIN_DIMENSION: u32 = 100;
/// Accepted byte sizes are strictly between these bounds.
pub const MIN_BYTES: usize = 4000;
pub const MAX_BYTES: usize = 10 * 1024 * 1024;
/// Accepted width / height ratios are strictly between these bounds.
pub const MIN_ASPECT_RATIO: f64 = 0.67;
pub const MAX_ASPECT_RATIO: f64 = 3.0;
/// Share of near-white pixels above which an image is considered blank.
pub const WHITE_SHARE: f64 = 0.99;
/// A channel at or above this value counts as white.
pub const WHITE_THRESHOLD: u8 = 245;
/// JPEG quality used when re-encoding.
pub const COMPRESS_QUALITY: u8 = 50;

const MAX_WHITE_SAMPLES: u64 = 1 << 16;

/// An `<img>` reference as found in a page, before anything is fetched.
///
/// Equal sources share one verdict in [`super::ImageSelector`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ImageSource {
    /// Absolute URL
    pub src: String,
    pub width: Option<String>,
    pub height: Option<String>,
    pub class: Option<String>,
    pub id: Option<String>,
    pub alt: Option<String>,
}

impl ImageSource {
    /// A source known only by its URL, e.g. from `og:image`.
    pub fn from_url(src: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            ..Default::default()
        }
    }

    pub fn is_data_uri(&self) -> bool {
        self.src.starts_with("data:")
    }

    /// Avatars and loading spinners, judged by attributes and URL path.
    pub fn looks_decorative(&self) -> bool {
        let path = url::Url::parse(&self.src)
            .map(|u| u.path().to_string())
            .unwrap_or_default();
        let haystack = [
            self.class.as_deref().unwrap_or_default(),
            self.id.as_deref().unwrap_or_default(),
            self.alt.as_deref().unwrap_or_default(),
            path.as_str(),
        ]
        .join(" ")
        .to_lowercase();
        haystack.contains("avatar") || haystack.contains("spinner")
    }

    /// Width and height declared in markup, `px` suffix allowed.
    pub fn declared_size(&self) -> (Option<u32>, Option<u32>) {
        (parse_px(self.width.as_deref()), parse_px(self.height.as_deref()))
    }
}

fn parse_px(value: Option<&str>) -> Option<u32> {
    let value = value?.trim();
    let value = value.strip_suffix("px").unwrap_or(value).trim();
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

/// Why a candidate was turned down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    DataUri,
    Decorative,
    Unfetchable(String),
    UnknownSize,
    TooSmall { width: u32, height: u32 },
    AspectRatio { width: u32, height: u32 },
    ByteSize(usize),
    MostlyWhite,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DataUri => write!(f, "inline data uri"),
            Self::Decorative => write!(f, "avatar or spinner"),
            Self::Unfetchable(reason) => write!(f, "fetch failed: {}", reason),
            Self::UnknownSize => write!(f, "size could not be determined"),
            Self::TooSmall { width, height } => write!(f, "too small: {}x{}", width, height),
            Self::AspectRatio { width, height } => {
                write!(f, "banner-like dimensions: {}x{}", width, height)
            }
            Self::ByteSize(size) => write!(f, "byte size out of range: {}", size),
            Self::MostlyWhite => write!(f, "predominantly white"),
        }
    }
}

/// Check the rendered dimensions.
pub fn check_dimensions(width: u32, height: u32) -> Result<(), Rejection> {
    if width < MIN_DIMENSION || height < MIN_DIMENSION {
        return Err(Rejection::TooSmall { width, height });
    }
    let ratio = width as f64 / height as f64;
    if ratio <= MIN_ASPECT_RATIO || ratio >= MAX_ASPECT_RATIO {
        return Err(Rejection::AspectRatio { width, height });
    }
    Ok(())
}

/// Check the encoded size in bytes.
pub fn check_byte_size(size: usize) -> Result<(), Rejection> {
    if size <= MIN_BYTES || size >= MAX_BYTES {
        return Err(Rejection::ByteSize(size));
    }
    Ok(())
}

/// Whether at least 99% of the (sampled) pixels are near white.
///
/// Undecodable data is never considered white.
pub fn is_predominantly_white(bytes: &[u8]) -> bool {
    let img = match image::load_from_memory(bytes) {
        Ok(img) => img.to_rgb8(),
        Err(e) => {
            debug!(error = %e, "Skipping whiteness check on undecodable image");
            return false;
        }
    };
    let total = img.width() as u64 * img.height() as u64;
    if total == 0 {
        return false;
    }
    let step = (total / MAX_WHITE_SAMPLES).max(1) as usize;
    let mut sampled = 0u64;
    let mut white = 0u64;
    for pixel in img.pixels().step_by(step) {
        sampled += 1;
        if pixel.0.iter().all(|&c| c >= WHITE_THRESHOLD) {
            white += 1;
        }
    }
    white as f64 / sampled as f64 >= WHITE_SHARE
}

/// Pixel size to compare against the thresholds.
///
/// Both declared attributes win outright; a single one scales the intrinsic
/// size proportionally.
pub fn effective_size(
    declared: (Option<u32>, Option<u32>),
    intrinsic: Option<(u32, u32)>,
) -> Option<(u32, u32)> {
    match (declared, intrinsic) {
        ((Some(w), Some(h)), _) => Some((w, h)),
        ((Some(w), None), Some((iw, ih))) if iw > 0 => {
            Some((w, (ih as f64 * w as f64 / iw as f64).round() as u32))
        }
        ((None, Some(h)), Some((iw, ih))) if ih > 0 => {
            Some(((iw as f64 * h as f64 / ih as f64).round() as u32, h))
        }
        ((None, None), Some(size)) => Some(size),
        _ => None,
    }
}

/// Compact JSON form stored next to a summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageMeta {
    pub url: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
}

impl ImageMeta {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Decode stored JSON; an empty string means no image.
    pub fn from_json(json: &str) -> Result<Option<Self>, ParseError> {
        if json.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(json)?))
    }
}

/// An image that passed every check, with its bytes in hand.
#[derive(Debug, Clone)]
pub struct WebImage {
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub content_type: Option<String>,
    pub format: Option<SniffedFormat>,
    bytes: Vec<u8>,
    suffix: Option<String>,
}

impl WebImage {
    pub fn new(
        url: impl Into<String>,
        width: u32,
        height: u32,
        content_type: Option<String>,
        bytes: Vec<u8>,
    ) -> Self {
        let format = sniff(&bytes).ok().map(|info| info.format);
        Self {
            url: url.into(),
            width,
            height,
            content_type,
            format,
            bytes,
            suffix: None,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn byte_size(&self) -> usize {
        self.bytes.len()
    }

    pub fn meta(&self) -> ImageMeta {
        ImageMeta {
            url: self.url.clone(),
            width: self.width,
            height: self.height,
        }
    }

    /// File suffix with leading dot: URL path extension, else MIME type,
    /// else the sniffed format. Empty when nothing is known.
    pub fn suffix(&self) -> String {
        if let Some(suffix) = &self.suffix {
            return suffix.clone();
        }
        url_suffix(&self.url)
            .or_else(|| self.content_type.as_deref().and_then(mime_suffix))
            .or_else(|| self.format.map(|f| f.extension()))
            .unwrap_or_default()
    }

    /// Content-addressed file name: md5 of the bytes plus the suffix.
    pub fn unique_name(&self) -> String {
        format!("{:x}{}", md5::compute(&self.bytes), self.suffix())
    }

    /// Re-encode opaque raster images as JPEG when that is smaller.
    ///
    /// Returns true when the bytes were replaced.
    pub fn try_compress(&mut self) -> bool {
        let suffix = self.suffix().to_lowercase();
        if matches!(suffix.as_str(), ".svg" | ".webp" | ".gif")
            || matches!(
                self.format,
                Some(SniffedFormat::Svg | SniffedFormat::WebP | SniffedFormat::Gif)
            )
        {
            return false;
        }
        let img = match image::load_from_memory(&self.bytes) {
            Ok(img) => img,
            Err(e) => {
                warn!(url = %self.url, error = %e, "Cannot decode image for compression");
                return false;
            }
        };
        if img.color().has_alpha() {
            return false;
        }

        let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
        let mut out = Cursor::new(Vec::new());
        let encoder = JpegEncoder::new_with_quality(&mut out, COMPRESS_QUALITY);
        if let Err(e) = rgb.write_with_encoder(encoder) {
            warn!(url = %self.url, error = %e, "JPEG re-encode failed");
            return false;
        }
        let out = out.into_inner();
        if out.len() >= self.bytes.len() {
            info!(url = %self.url, "Re-encoded image is not smaller, keeping original");
            return false;
        }

        debug!(
            url = %self.url,
            before = self.bytes.len(),
            after = out.len(),
            dimensions = ?img.dimensions(),
            "Compressed image"
        );
        self.bytes = out;
        self.format = Some(SniffedFormat::Jpeg);
        self.content_type = Some("image/jpeg".to_string());
        self.suffix = Some(".jpg".to_string());
        true
    }

    /// Write the bytes to `dir/<unique_name>` and return the path.
    pub fn save(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let path = dir.join(self.unique_name());
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

fn url_suffix(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?.to_string();
    let (stem, ext) = last.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(format!(".{}", ext))
}

fn mime_suffix(content_type: &str) -> Option<String> {
    let mime = content_type.split(';').next()?.trim().to_lowercase();
    let ext = match mime.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => ".jpg",
        "image/png" => ".png",
        "image/gif" => ".gif",
        "image/webp" => ".webp",
        "image/svg+xml" => ".svg",
        "image/bmp" | "image/x-ms-bmp" => ".bmp",
        "image/tiff" => ".tiff",
        "image/x-icon" | "image/vnd.microsoft.icon" => ".ico",
        "image/avif" => ".avif",
        _ => return None,
    };
    Some(ext.to_string())
}

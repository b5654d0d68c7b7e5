use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info};

use super::candidate::{
    check_byte_size, check_dimensions, effective_size, is_predominantly_white, ImageSource,
    Rejection, WebImage,
};
use super::sniff::sniff;
use crate::fetch::{Fetched, Fetcher};

/// Picks the first acceptable illustration from a list of sources.
///
/// Verdicts are remembered per [`ImageSource`], so a logo repeated across
/// pages, or listed twice in one page, is only fetched once per selector.
pub struct ImageSelector {
    fetcher: Arc<dyn Fetcher>,
    referrer: Option<String>,
    verdicts: HashMap<ImageSource, Result<WebImage, Rejection>>,
}

impl ImageSelector {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            referrer: None,
            verdicts: HashMap::new(),
        }
    }

    /// Send `referrer` with every image request.
    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    /// First acceptable image, in the order given.
    pub async fn select(&mut self, sources: &[ImageSource]) -> Option<WebImage> {
        for source in sources {
            match self.evaluate(source).await {
                Ok(image) => {
                    info!(url = %image.url, width = image.width, height = image.height, "Selected image");
                    return Some(image);
                }
                Err(reason) => debug!(url = %source.src, %reason, "Rejected image"),
            }
        }
        None
    }

    /// Decide on one source, consulting the verdict cache first.
    pub async fn evaluate(&mut self, source: &ImageSource) -> Result<WebImage, Rejection> {
        if let Some(verdict) = self.verdicts.get(source) {
            return verdict.clone();
        }
        let verdict = self.judge(source).await;
        self.verdicts.insert(source.clone(), verdict.clone());
        verdict
    }

    /// Cheap attribute checks first; the network is touched only when needed.
    async fn judge(&self, source: &ImageSource) -> Result<WebImage, Rejection> {
        if source.src.is_empty() {
            return Err(Rejection::UnknownSize);
        }
        if source.is_data_uri() {
            return Err(Rejection::DataUri);
        }
        if source.looks_decorative() {
            return Err(Rejection::Decorative);
        }

        let declared = source.declared_size();
        let mut fetched = None;
        let size = match declared {
            (Some(w), Some(h)) => (w, h),
            _ => {
                let body = self.download(source).await?;
                let intrinsic = sniff(&body.body).ok().map(|info| (info.width, info.height));
                fetched = Some(body);
                effective_size(declared, intrinsic).ok_or(Rejection::UnknownSize)?
            }
        };
        check_dimensions(size.0, size.1)?;

        let fetched = match fetched {
            Some(fetched) => fetched,
            None => self.download(source).await?,
        };
        check_byte_size(fetched.body.len())?;
        if is_predominantly_white(&fetched.body) {
            return Err(Rejection::MostlyWhite);
        }

        Ok(WebImage::new(
            fetched.url,
            size.0,
            size.1,
            fetched.content_type,
            fetched.body,
        ))
    }

    async fn download(&self, source: &ImageSource) -> Result<Fetched, Rejection> {
        self.fetcher
            .fetch(&source.src, self.referrer.as_deref())
            .await
            .map_err(|e| Rejection::Unfetchable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockFetcher;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;

    fn noisy_png(width: u32, height: u32) -> Vec<u8> {
        let buf = ImageBuffer::from_fn(width, height, |x, y| {
            let v = (x.wrapping_mul(7919) ^ y.wrapping_mul(104729)).wrapping_mul(2654435761);
            Rgb([(v >> 8) as u8, (v >> 16) as u8, (v >> 24) as u8])
        });
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(buf)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[tokio::test]
    async fn test_select_skips_rejected_and_caches_verdicts() {
        let fetcher = Arc::new(
            MockFetcher::new()
                .with_response("http://a.com/tiny.png", "image/png", noisy_png(10, 10))
                .with_response("http://a.com/good.png", "image/png", noisy_png(300, 200)),
        );
        let mut selector =
            ImageSelector::new(fetcher.clone()).with_referrer("http://a.com/story");

        let sources = vec![
            ImageSource::from_url("data:image/png;base64,AAAA"),
            ImageSource::from_url("http://a.com/tiny.png"),
            ImageSource::from_url("http://a.com/good.png"),
        ];
        let picked = selector.select(&sources).await.unwrap();
        assert_eq!(picked.url, "http://a.com/good.png");
        assert_eq!((picked.width, picked.height), (300, 200));

        selector.select(&sources).await.unwrap();
        assert_eq!(fetcher.fetch_count("http://a.com/good.png"), 1);
        assert_eq!(fetcher.fetch_count("http://a.com/tiny.png"), 1);
        assert_eq!(
            fetcher.referrers("http://a.com/good.png"),
            vec![Some("http://a.com/story".to_string())]
        );
    }

    #[tokio::test]
    async fn test_declared_size_rejects_without_fetch() {
        let fetcher = Arc::new(MockFetcher::new());
        let mut selector = ImageSelector::new(fetcher.clone());
        let source = ImageSource {
            width: Some("16".into()),
            height: Some("16".into()),
            ..ImageSource::from_url("http://a.com/icon.png")
        };
        assert!(matches!(
            selector.evaluate(&source).await,
            Err(Rejection::TooSmall { .. })
        ));
        assert_eq!(fetcher.fetch_count("http://a.com/icon.png"), 0);
    }

    #[tokio::test]
    async fn test_unfetchable_image_is_rejected() {
        let mut selector = ImageSelector::new(Arc::new(MockFetcher::new()));
        let verdict = selector
            .evaluate(&ImageSource::from_url("http://a.com/missing.png"))
            .await;
        assert!(matches!(verdict, Err(Rejection::Unfetchable(_))));
    }
}

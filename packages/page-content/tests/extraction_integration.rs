//! Integration tests for fetching a page, extracting its article and picking
//! an illustration, all against canned responses.

use std::io::Cursor;
use std::sync::Arc;

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use page_content::{
    fetch_document, image::Rejection, testing::MockFetcher, ImageSelector, ImageSource, Page,
};

fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).unwrap();
    out.into_inner()
}

fn noise(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(ImageBuffer::from_fn(width, height, |x, y| {
        let v = (x.wrapping_mul(7919) ^ y.wrapping_mul(104729)).wrapping_mul(2654435761);
        Rgb([(v >> 8) as u8, (v >> 16) as u8, (v >> 24) as u8])
    }))
}

/// A PNG header declaring `width` x `height`, padded to `size` bytes.
fn padded_png(width: u32, height: u32, size: usize) -> Vec<u8> {
    let mut data = b"\x89PNG\r\n\x1a\n\x00\x00\x00\x0dIHDR".to_vec();
    data.extend_from_slice(&width.to_be_bytes());
    data.extend_from_slice(&height.to_be_bytes());
    data.resize(size, 0);
    data
}

async fn verdict(fetcher: MockFetcher, source: ImageSource) -> Result<(), Rejection> {
    let mut selector = ImageSelector::new(Arc::new(fetcher));
    selector.evaluate(&source).await.map(|_| ())
}

#[tokio::test]
async fn test_tiny_image_is_rejected() {
    let url = "http://img.test/tiny.png";
    let fetcher = MockFetcher::new().with_response(url, "image/png", encode(noise(10, 10), ImageFormat::Png));
    assert!(matches!(
        verdict(fetcher, ImageSource::from_url(url)).await,
        Err(Rejection::TooSmall { .. })
    ));
}

#[tokio::test]
async fn test_oversized_image_is_rejected() {
    let url = "http://img.test/huge.png";
    let fetcher = MockFetcher::new().with_response(url, "image/png", padded_png(300, 200, 15 * 1024 * 1024));
    assert!(matches!(
        verdict(fetcher, ImageSource::from_url(url)).await,
        Err(Rejection::ByteSize(_))
    ));
}

#[tokio::test]
async fn test_data_uri_is_rejected_without_fetch() {
    let fetcher = MockFetcher::new();
    let source = ImageSource::from_url("data:image/gif;base64,R0lGODlhAQABAAAAACw=");
    assert_eq!(verdict(fetcher.clone(), source).await, Err(Rejection::DataUri));
    assert!(fetcher.calls().is_empty());
}

#[tokio::test]
async fn test_white_image_is_rejected() {
    let url = "http://img.test/blank.bmp";
    let white = DynamicImage::ImageRgb8(ImageBuffer::from_pixel(300, 200, Rgb([255u8, 255, 255])));
    let fetcher = MockFetcher::new().with_response(url, "image/bmp", encode(white, ImageFormat::Bmp));
    assert_eq!(
        verdict(fetcher, ImageSource::from_url(url)).await,
        Err(Rejection::MostlyWhite)
    );
}

#[tokio::test]
async fn test_noisy_photo_is_accepted() {
    let url = "http://img.test/photo.png";
    let fetcher = MockFetcher::new().with_response(url, "image/png", encode(noise(300, 200), ImageFormat::Png));
    assert_eq!(verdict(fetcher, ImageSource::from_url(url)).await, Ok(()));
}

#[tokio::test]
async fn test_page_to_extract_and_illustration() {
    let paragraph = "The committee published its findings on Tuesday, and the results were \
        broadly in line with what independent researchers had been predicting for months. ";
    let html = format!(
        r#"<html><head><title>Findings published</title>
        <meta name="description" content="short">
        <meta property="og:image" content="/og.png"></head>
        <body>
          <div class="sidebar"><img src="/avatar/me.png" width="300" height="200"></div>
          <div class="article-body">
            <h1>Findings published</h1>
            <img src="/figure.png">
            <p>{p}</p><p>{p}</p><p>{p}</p>
          </div>
        </body></html>"#,
        p = paragraph
    );
    let fetcher = Arc::new(
        MockFetcher::new()
            .with_response("http://news.test/story", "text/html; charset=utf-8", html.into_bytes())
            .with_response("http://news.test/figure.png", "image/png", encode(noise(300, 200), ImageFormat::Png)),
    );

    let doc = fetch_document(fetcher.as_ref(), "http://news.test/story").await.unwrap();
    let page = Page::from_document(&doc).unwrap();
    assert_eq!(page.title(), "Findings published");
    assert_eq!(page.favicon_url(), "http://news.test/favicon.ico");

    let extract = page.get_content(120);
    assert!(extract.starts_with("The committee published"));
    assert!(!extract.contains("Findings published"));
    assert!(extract.chars().count() < 140);

    let candidates = page.image_candidates();
    assert_eq!(candidates[0].src, "http://news.test/figure.png");
    assert_eq!(candidates.last().unwrap().src, "http://news.test/og.png");

    let image = ImageSelector::new(fetcher.clone())
        .with_referrer(page.url())
        .select(&candidates)
        .await
        .unwrap();
    assert_eq!(image.url, "http://news.test/figure.png");
    assert_eq!(fetcher.fetch_count("http://news.test/og.png"), 0);
    assert_eq!(fetcher.fetch_count("http://news.test/avatar/me.png"), 0);
}

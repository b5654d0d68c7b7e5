//! Video and document hosts whose pages are better shown as an embed than
//! summarized.

use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

use crate::error::ParseError;

lazy_static! {
    static ref YOUKU: Regex = Regex::new(r"(?i)v\.youku\.com/v_show/id_(\w+?)\.html").unwrap();
    static ref YOUTUBE: Regex = Regex::new(r"(?i)www\.youtube\.com/watch\?v=([^&]+)").unwrap();
    static ref VIMEO: Regex = Regex::new(r"(?i)vimeo\.com/(\d+)").unwrap();
    static ref DAILYMOTION: Regex =
        Regex::new(r"(?i)www\.dailymotion\.com/video/([a-zA-Z0-9]+)_[-\w]+").unwrap();
    static ref TUDOU_ALBUM: Regex =
        Regex::new(r"(?i)www\.tudou\.com/albumplay/(\w+?)/(\w+?)\.html").unwrap();
    static ref TUDOU_PROGRAM: Regex =
        Regex::new(r"(?i)www\.tudou\.com/programs/view/([^/]+)/").unwrap();
    static ref USTREAM: Regex = Regex::new(r"(?i)www\.ustream\.tv/recorded/(\d+)").unwrap();
    static ref BLOOMBERG: Regex =
        Regex::new(r"(?i)www\.bloomberg\.com/video/[-\w]+?-(\w+)\.").unwrap();
    static ref PDF_YT: Regex = Regex::new(r"(?i)//pdf\.yt/d/\w+").unwrap();
    static ref REGISTRY: Result<EmbedRegistry, ParseError> = EmbedRegistry::new();
}

/// Hosts, without a leading `www.`, and the provider serving each.
const REGISTRATIONS: &[(&str, EmbedProvider)] = &[
    ("youtube.com", EmbedProvider::YouTube),
    ("vimeo.com", EmbedProvider::Vimeo),
    ("dailymotion.com", EmbedProvider::Dailymotion),
    ("v.youku.com", EmbedProvider::Youku),
    ("tudou.com", EmbedProvider::Tudou),
    ("ustream.tv", EmbedProvider::Ustream),
    ("bloomberg.com", EmbedProvider::Bloomberg),
    ("pdf.yt", EmbedProvider::PdfYt),
    ("gist.github.com", EmbedProvider::Gist),
];

/// Hosts with a known embed form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmbedProvider {
    YouTube,
    Vimeo,
    Dailymotion,
    Youku,
    Tudou,
    Ustream,
    Bloomberg,
    PdfYt,
    Gist,
}

impl EmbedProvider {
    pub const ALL: &'static [EmbedProvider] = &[
        Self::YouTube,
        Self::Vimeo,
        Self::Dailymotion,
        Self::Youku,
        Self::Tudou,
        Self::Ustream,
        Self::Bloomberg,
        Self::PdfYt,
        Self::Gist,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::YouTube => "youtube",
            Self::Vimeo => "vimeo",
            Self::Dailymotion => "dailymotion",
            Self::Youku => "youku",
            Self::Tudou => "tudou",
            Self::Ustream => "ustream",
            Self::Bloomberg => "bloomberg",
            Self::PdfYt => "pdf.yt",
            Self::Gist => "gist",
        }
    }

    /// Provider for the URL's host in the built-in registry.
    pub fn for_url(url: &str) -> Option<Self> {
        EmbedRegistry::builtin().ok()?.lookup(url)
    }

    /// Embed markup for `url`, or an error when the URL names no media.
    pub fn embed_html(&self, url: &str) -> Result<String, ParseError> {
        let invalid = || ParseError::NotEmbeddable {
            provider: self.name(),
            url: url.to_string(),
        };
        let capture = |re: &Regex, group: usize| {
            re.captures(url)
                .and_then(|c| c.get(group))
                .map(|m| m.as_str().to_string())
                .ok_or_else(invalid)
        };

        let html = match self {
            Self::YouTube => format!(
                r#"<iframe src="//www.youtube.com/embed/{}" frameborder="0" allowfullscreen loading="lazy"></iframe>"#,
                capture(&YOUTUBE, 1)?
            ),
            Self::Vimeo => format!(
                r#"<iframe src="//player.vimeo.com/video/{}" frameborder="0" allowfullscreen loading="lazy"></iframe>"#,
                capture(&VIMEO, 1)?
            ),
            Self::Dailymotion => format!(
                r#"<iframe src="//www.dailymotion.com/embed/video/{}" frameborder="0" allowfullscreen loading="lazy"></iframe>"#,
                capture(&DAILYMOTION, 1)?
            ),
            Self::Youku => format!(
                r#"<iframe src="http://player.youku.com/embed/{}" frameborder="0" allowfullscreen></iframe>"#,
                capture(&YOUKU, 1)?
            ),
            Self::Tudou => {
                let code = capture(&TUDOU_ALBUM, 2).or_else(|_| capture(&TUDOU_PROGRAM, 1))?;
                format!(
                    r#"<iframe src="http://www.tudou.com/programs/view/html5embed.action?code={}" frameborder="0" allowfullscreen></iframe>"#,
                    code
                )
            }
            Self::Ustream => format!(
                r#"<iframe src="http://www.ustream.tv/embed/recorded/{}?v=3&amp;wmode=direct" frameborder="0" allowfullscreen loading="lazy"></iframe>"#,
                capture(&USTREAM, 1)?
            ),
            Self::Bloomberg => format!(
                r#"<object data='http://www.bloomberg.com/video/embed/{}?height=395&width=640' width=640 height=430 style='overflow:hidden;'></object>"#,
                capture(&BLOOMBERG, 1)?
            ),
            Self::PdfYt => {
                if !PDF_YT.is_match(url) {
                    return Err(invalid());
                }
                format!(
                    r#"<iframe src="{}/embed?sparse=0" allowfullscreen></iframe>"#,
                    url.trim_end_matches('/')
                )
            }
            Self::Gist => {
                let path = Url::parse(url).map_err(|_| invalid())?.path().to_string();
                if path.matches('/').count() < 2 {
                    return Err(invalid());
                }
                format!(
                    r#"<iframe src="https://gist.github.com{}.pibb" style="width: 100%; height: 250px; border: 0;"></iframe>"#,
                    path
                )
            }
        };
        Ok(html)
    }
}

/// Host to provider table.
#[derive(Debug, Clone)]
pub struct EmbedRegistry {
    hosts: HashMap<&'static str, EmbedProvider>,
    duplicates: Vec<&'static str>,
}

impl EmbedRegistry {
    /// The built-in registrations, checked for completeness. Compiles every
    /// URL pattern up front.
    pub fn new() -> Result<Self, ParseError> {
        lazy_static::initialize(&YOUKU);
        lazy_static::initialize(&YOUTUBE);
        lazy_static::initialize(&VIMEO);
        lazy_static::initialize(&DAILYMOTION);
        lazy_static::initialize(&TUDOU_ALBUM);
        lazy_static::initialize(&TUDOU_PROGRAM);
        lazy_static::initialize(&USTREAM);
        lazy_static::initialize(&BLOOMBERG);
        lazy_static::initialize(&PDF_YT);

        let registry = Self::from_registrations(REGISTRATIONS);
        registry.validate()?;
        Ok(registry)
    }

    /// The shared built-in registry. Binaries call this at startup so a bad
    /// registration stops the process instead of disabling embeds.
    pub fn builtin() -> Result<&'static EmbedRegistry, &'static ParseError> {
        REGISTRY.as_ref()
    }

    pub fn from_registrations(registrations: &[(&'static str, EmbedProvider)]) -> Self {
        let mut hosts = HashMap::new();
        let mut duplicates = Vec::new();
        for &(host, provider) in registrations {
            if hosts.insert(host, provider).is_some() {
                duplicates.push(host);
            }
        }
        Self { hosts, duplicates }
    }

    /// Hosts must be unique and every provider variant must be reachable
    /// from at least one host.
    pub fn validate(&self) -> Result<(), ParseError> {
        if let Some(&host) = self.duplicates.first() {
            return Err(ParseError::DuplicateEmbedHost { host });
        }
        for provider in EmbedProvider::ALL {
            if !self.hosts.values().any(|p| p == provider) {
                return Err(ParseError::UnregisteredProvider {
                    provider: provider.name(),
                });
            }
        }
        Ok(())
    }

    /// Provider for the URL's host. Only an exact host match counts;
    /// `music.youtube.com` is not YouTube.
    pub fn lookup(&self, url: &str) -> Option<EmbedProvider> {
        let parsed = Url::parse(url).ok()?;
        let host = parsed.host_str()?.to_lowercase();
        let host = host.strip_prefix("www.").unwrap_or(&host);
        self.hosts.get(host).copied()
    }
}

/// Whether `url` is hosted by a known embed provider.
pub fn is_embeddable(url: &str) -> bool {
    EmbedProvider::for_url(url).is_some()
}

/// Whether extracted content is embed markup rather than text.
pub fn is_embed_markup(content: &str) -> bool {
    content.starts_with("<iframe ") || content.starts_with("<object ")
}

/// A page rendered as its provider's embed.
#[derive(Debug, Clone)]
pub struct EmbedContent {
    url: String,
    provider: EmbedProvider,
    html: String,
    favicon_url: String,
}

impl EmbedContent {
    /// Build the embed for `url`, taking the favicon from the fetched page.
    pub fn parse(url: &str, page_html: &str) -> Result<Self, ParseError> {
        let provider = EmbedProvider::for_url(url).ok_or_else(|| ParseError::NotEmbeddable {
            provider: "unknown",
            url: url.to_string(),
        })?;
        let html = provider.embed_html(url)?;
        let meta = crate::html::PageMeta::capture(&scraper::Html::parse_document(page_html));
        let favicon = meta.favicon_href.as_deref().unwrap_or("/favicon.ico");
        Ok(Self {
            url: url.to_string(),
            provider,
            html,
            favicon_url: crate::html::resolve_url(url, favicon),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn provider(&self) -> EmbedProvider {
        self.provider
    }

    /// The embed markup; never truncated.
    pub fn get_content(&self) -> &str {
        &self.html
    }

    pub fn favicon_url(&self) -> &str {
        &self.favicon_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_lookup() {
        assert_eq!(
            EmbedProvider::for_url("https://www.youtube.com/watch?v=abc"),
            Some(EmbedProvider::YouTube)
        );
        assert_eq!(
            EmbedProvider::for_url("https://gist.github.com/u/123"),
            Some(EmbedProvider::Gist)
        );
        assert_eq!(EmbedProvider::for_url("https://github.com/u/r"), None);
        assert_eq!(EmbedProvider::for_url("https://music.youtube.com/watch?v=a"), None);
        assert!(!is_embeddable("not a url"));
    }

    #[test]
    fn test_registry_is_complete() {
        assert!(EmbedRegistry::new().is_ok());
        let partial = EmbedRegistry::from_registrations(&[("vimeo.com", EmbedProvider::Vimeo)]);
        assert!(matches!(
            partial.validate(),
            Err(ParseError::UnregisteredProvider { provider: "youtube" })
        ));
    }

    #[test]
    fn test_builtin_registry_is_validated() {
        let registry = EmbedRegistry::builtin().unwrap();
        assert!(registry.validate().is_ok());
        assert_eq!(
            registry.lookup("https://vimeo.com/123"),
            Some(EmbedProvider::Vimeo)
        );
    }

    #[test]
    fn test_duplicate_host_is_rejected() {
        let mut registrations = REGISTRATIONS.to_vec();
        registrations.push(("vimeo.com", EmbedProvider::YouTube));
        let registry = EmbedRegistry::from_registrations(&registrations);
        assert!(matches!(
            registry.validate(),
            Err(ParseError::DuplicateEmbedHost { host: "vimeo.com" })
        ));
    }

    #[test]
    fn test_youtube_embed() {
        let html = EmbedProvider::YouTube
            .embed_html("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=10")
            .unwrap();
        assert!(html.starts_with("<iframe "));
        assert!(html.contains("//www.youtube.com/embed/dQw4w9WgXcQ\""));
    }

    #[test]
    fn test_youtube_without_video_is_not_embeddable() {
        let err = EmbedProvider::YouTube
            .embed_html("https://www.youtube.com/channel/xyz")
            .unwrap_err();
        assert!(matches!(err, ParseError::NotEmbeddable { provider: "youtube", .. }));
    }

    #[test]
    fn test_tudou_program_fallback() {
        let html = EmbedProvider::Tudou
            .embed_html("http://www.tudou.com/programs/view/Abc123/")
            .unwrap();
        assert!(html.contains("code=Abc123"));
    }

    #[test]
    fn test_bloomberg_uses_object() {
        let html = EmbedProvider::Bloomberg
            .embed_html("http://www.bloomberg.com/video/some-title-Xy12Z.html")
            .unwrap();
        assert!(is_embed_markup(&html));
        assert!(html.starts_with("<object "));
        assert!(html.contains("/embed/Xy12Z?"));
    }

    #[test]
    fn test_gist_requires_user_and_id() {
        assert!(EmbedProvider::Gist.embed_html("https://gist.github.com/abc").is_err());
        let html = EmbedProvider::Gist
            .embed_html("https://gist.github.com/someone/deadbeef")
            .unwrap();
        assert!(html.contains("https://gist.github.com/someone/deadbeef.pibb"));
    }

    #[test]
    fn test_embed_content_favicon() {
        let page = r#"<html><head><link rel="shortcut icon" href="/yts/fav.ico"></head></html>"#;
        let content = EmbedContent::parse("https://vimeo.com/12345", page).unwrap();
        assert_eq!(content.favicon_url(), "https://vimeo.com/yts/fav.ico");
        assert!(content.get_content().contains("player.vimeo.com/video/12345"));
    }

    #[test]
    fn test_embed_markup_detection() {
        assert!(is_embed_markup("<iframe src=x></iframe>"));
        assert!(!is_embed_markup(" <iframe src=x>"));
        assert!(!is_embed_markup("<p>text</p>"));
    }
}

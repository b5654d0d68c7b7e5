//! Main-content extraction for HTML documents.
//!
//! The extractor converts the parsed page into a [`Dom`] arena, scores every
//! element by its penalised text length and nesting depth, and keeps the single
//! best-scoring node as the article. Per-node data lives in a side table
//! ([`NodeStats`]) indexed by [`NodeId`].
//!
//! # Example
//!
//! ```rust,ignore
//! use page_content::HtmlContent;
//!
//! let page = HtmlContent::parse(html, "https://example.com/post");
//! let extract = page.get_content(400);
//! let favicon = page.favicon_url();
//! ```

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};
use tracing::debug;
use url::Url;

use crate::dom::{Dom, NodeData, NodeId};
use crate::image::ImageSource;
use crate::text::{
    char_len, escape_html, squeeze_spaces, string_inclusion_ratio, tokenize, Budget,
};

lazy_static! {
    static ref NEGATIVE: Regex = Regex::new(
        r"(?i)comment|combx|disqus|foot|header|menu|rss|button|hidden|collaps|toggle|shoutbox|sidebar|sponsor|vote|meta|shar|ad-"
    )
    .unwrap();
    static ref POSITIVE: Regex = Regex::new(
        r"(?i)article|entry|post|abstract|main|content|toptext|section|text|preview|view|story-body"
    )
    .unwrap();
    static ref META_BLOCK: Regex = Regex::new(
        r"(?i)meta|date|time|author|share|caption|attr|title|header|summary|clear|tag|manage|info|social|avatar|small|sidebar|views|download|descriptor|created|name|related|nav|pull"
    )
    .unwrap();
    static ref DESCRIPTION: Regex = Regex::new(r"(?i)description").unwrap();
    static ref OG_IMAGE: Regex = Regex::new(r"(?i)og:image$").unwrap();
    static ref TWITTER_IMAGE: Regex = Regex::new(r"(?i)twitter:image").unwrap();
    static ref ICON_REL: Regex = Regex::new(r"(?i)icon").unwrap();
    static ref BLOCK_TAGS: HashSet<&'static str> = [
        "article", "header", "aside", "hgroup", "blockquote", "hr", "body", "li", "br", "map",
        "button", "object", "canvas", "ol", "caption", "output", "col", "p", "colgroup", "pre",
        "dd", "progress", "div", "section", "dl", "table", "dt", "tbody", "embed", "textarea",
        "fieldset", "tfoot", "figcaption", "th", "figure", "thead", "footer", "tr", "form", "ul",
        "h1", "h2", "h3", "h4", "h5", "h6", "video", "td",
    ]
    .into_iter()
    .collect();
}

/// Multiplier applied to negative-signal containers and anchors.
pub const NEGATIVE_FACTOR: f64 = 0.2;
/// Multiplier applied to positive-signal containers.
pub const POSITIVE_FACTOR: f64 = 2.0;
/// Header text at least this included in the title marks its ancestors.
pub const TITLE_INCLUSION: f64 = 0.85;
/// Blocks carrying this share of the article are kept regardless of shape.
pub const ARTICLE_SHARE: f64 = 0.3;
/// Anchor-text share at which a block counts as navigation.
pub const LINK_DENSITY: f64 = 0.65;
/// Blocks with fewer tokens than this are noise unless they carry the article.
pub const MIN_BLOCK_TOKENS: usize = 15;
/// Square pixels counted as one character when image weighting is enabled.
pub const IMAGE_AREA_PER_CHAR: f64 = 22.0 * 22.0;

const MAX_EXTRACT_DEPTH: usize = 512;

/// Knobs for HTML extraction.
#[derive(Debug, Clone, Default)]
pub struct ExtractOptions {
    /// Count explicitly sized `<img>` children as text when scoring.
    pub weigh_images: bool,
}

impl ExtractOptions {
    pub fn with_image_weight(mut self, enabled: bool) -> Self {
        self.weigh_images = enabled;
        self
    }
}

/// Scoring signals that fired on a node.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NodeFlags {
    pub negative: bool,
    pub positive: bool,
    pub title: bool,
    pub article: bool,
}

/// Memoised per-node scoring data.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeStats {
    /// Text length before this node's own penalty.
    pub raw_len: f64,
    /// Cumulative penalty inherited from ancestors and this node.
    pub factor: f64,
    /// `raw_len * factor`.
    pub effective_len: f64,
    pub depth: f64,
    pub score: f64,
    pub flags: NodeFlags,
}

/// Document metadata captured before purging.
#[derive(Debug, Clone, Default)]
pub struct PageMeta {
    pub title: String,
    /// Longest description meta, HTML-escaped.
    pub description: String,
    pub images: Vec<String>,
    /// `href` of the first icon link, if any.
    pub favicon_href: Option<String>,
}

impl PageMeta {
    /// Capture title, description, meta images and icon link from a parsed page.
    pub fn capture(html: &Html) -> Self {
        let select = |css: &str| Selector::parse(css).ok();

        let title = select("title")
            .and_then(|s| html.select(&s).next())
            .map(|t| t.text().collect::<String>())
            .unwrap_or_default();

        let mut meta = Self {
            title: title.trim().to_string(),
            ..Default::default()
        };

        let metas: Vec<_> = match select("meta") {
            Some(s) => html.select(&s).collect(),
            None => Vec::new(),
        };

        let mut longest = "";
        for el in &metas {
            let is_description = ["name", "property"]
                .iter()
                .any(|k| el.value().attr(k).is_some_and(|v| DESCRIPTION.is_match(v)));
            let content = el.value().attr("content").unwrap_or("");
            if is_description && char_len(content) > char_len(longest) {
                longest = content;
            }
        }
        meta.description = escape_html(longest);

        let mut push_images = |key: &str, patt: &Regex| {
            for el in &metas {
                let matched = el.value().attr(key).is_some_and(|v| patt.is_match(v));
                match el.value().attr("content") {
                    Some(content) if matched && !content.trim().is_empty() => {
                        meta.images.push(content.trim().to_string())
                    }
                    _ => {}
                }
            }
        };
        push_images("property", &OG_IMAGE);
        push_images("name", &TWITTER_IMAGE);

        meta.favicon_href = select("link").and_then(|s| {
            html.select(&s)
                .find(|el| el.value().attr("rel").is_some_and(|r| ICON_REL.is_match(r)))
                .map(|el| el.value().attr("href").unwrap_or("/favicon.ico").to_string())
        });

        meta
    }
}

/// Extraction result for one HTML document.
#[derive(Debug, Clone)]
pub struct HtmlContent {
    url: String,
    dom: Dom,
    stats: Vec<NodeStats>,
    article: NodeId,
    meta: PageMeta,
}

impl HtmlContent {
    /// Parse HTML and select the article.
    pub fn parse(html: &str, url: &str) -> Self {
        Self::parse_with(html, url, &ExtractOptions::default())
    }

    pub fn parse_with(html: &str, url: &str, options: &ExtractOptions) -> Self {
        let doc = Html::parse_document(html);
        let meta = PageMeta::capture(&doc);
        let dom = Dom::from_html(&doc);
        Self::from_dom(dom, url, meta, options)
    }

    /// Score an already-built arena.
    pub fn from_dom(dom: Dom, url: &str, meta: PageMeta, options: &ExtractOptions) -> Self {
        let (stats, article) = score(&dom, &meta.title, options);
        debug!(
            url = %url,
            article = ?dom.identifiers(article),
            score = stats[article].score,
            "selected article"
        );
        Self {
            url: url.to_string(),
            dom,
            stats,
            article,
            meta,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn dom(&self) -> &Dom {
        &self.dom
    }

    pub fn title(&self) -> &str {
        &self.meta.title
    }

    pub fn article(&self) -> NodeId {
        self.article
    }

    pub fn stats(&self, id: NodeId) -> &NodeStats {
        &self.stats[id]
    }

    pub fn effective_text_len(&self, id: NodeId) -> f64 {
        self.stats[id].effective_len
    }

    pub fn meta_description(&self) -> &str {
        &self.meta.description
    }

    pub fn meta_images(&self) -> &[String] {
        &self.meta.images
    }

    /// True when the article holds no visible text.
    pub fn is_empty(&self) -> bool {
        self.dom.text(self.article).trim().is_empty()
    }

    /// Plain article text, one line per block-level child.
    pub fn article_text(&self) -> String {
        let mut lines = Vec::new();
        let mut current = String::new();
        for &child in self.dom.children(self.article) {
            let is_block = self
                .dom
                .tag_name(child)
                .is_some_and(|name| BLOCK_TAGS.contains(name));
            if is_block && !current.trim().is_empty() {
                lines.push(current.trim().to_string());
                current.clear();
            }
            current.push_str(&self.dom.text(child));
            if is_block {
                lines.push(current.trim().to_string());
                current.clear();
            }
        }
        if !current.trim().is_empty() {
            lines.push(current.trim().to_string());
        }
        lines.retain(|l| !l.is_empty());
        lines.join(" ")
    }

    /// Absolute favicon URL.
    pub fn favicon_url(&self) -> String {
        let path = match &self.meta.favicon_href {
            Some(href) => href.as_str(),
            None if self.url.contains("archive.org") => "/_static/images/archive.ico",
            None => "/favicon.ico",
        };
        resolve_url(&self.url, path)
    }

    /// Image sources worth trying as the illustration, in preference order:
    /// article images, then every document image, then meta images.
    pub fn image_candidates(&self) -> Vec<ImageSource> {
        let mut nodes = self.dom.find_all(self.article, "img");
        nodes.extend(self.dom.find_all(Dom::ROOT, "img"));

        let mut sources: Vec<ImageSource> = nodes
            .into_iter()
            .filter_map(|id| {
                let src = self.dom.attr(id, "src").or_else(|| self.dom.attr(id, "data-src"))?;
                Some(ImageSource {
                    src: resolve_url(&self.url, src.trim()),
                    width: self.dom.attr(id, "width").map(str::to_string),
                    height: self.dom.attr(id, "height").map(str::to_string),
                    class: self.dom.attr(id, "class").map(str::to_string),
                    id: self.dom.attr(id, "id").map(str::to_string),
                    alt: self.dom.attr(id, "alt").map(str::to_string),
                })
            })
            .collect();
        sources.extend(
            self.meta
                .images
                .iter()
                .map(|src| ImageSource::from_url(resolve_url(&self.url, src))),
        );
        sources
    }

    /// Bounded, HTML-escaped text extract of the article.
    ///
    /// The result never exceeds `max_length` characters by more than one
    /// token. Falls back to the meta description when that is at least as long.
    pub fn get_content(&self, max_length: usize) -> String {
        let summary = if self.stats[self.article].effective_len > 0.0 {
            self.summarize(self.article, max_length as i64, 0)
                .trim()
                .to_string()
        } else {
            String::new()
        };

        if char_len(&summary) <= char_len(&self.meta.description) {
            let mut budget = Budget::new(max_length);
            if budget.fits(&self.meta.description) {
                return self.meta.description.clone();
            }
            // Already escaped; push raw tokens without escaping twice.
            let mut parts = Vec::new();
            for token in tokenize(&self.meta.description) {
                budget.spend(&token);
                parts.push(token);
                if budget.is_exhausted() {
                    break;
                }
            }
            return parts.concat().trim().to_string();
        }
        summary
    }

    fn is_meta_block(&self, id: NodeId) -> bool {
        self.dom.identifiers(id).iter().any(|i| META_BLOCK.is_match(i))
    }

    fn is_link_intensive(&self, id: NodeId) -> bool {
        let text_len = |node: NodeId| -> usize {
            self.dom
                .preorder(node)
                .into_iter()
                .filter_map(|n| match &self.dom.node(n).data {
                    NodeData::Text(t) => Some(char_len(t.trim())),
                    _ => None,
                })
                .sum()
        };
        let all = text_len(id);
        if all == 0 {
            return false;
        }
        let links: usize = self
            .dom
            .find_all(id, "a")
            .into_iter()
            .map(text_len)
            .sum();
        links as f64 / all as f64 >= LINK_DENSITY
    }

    fn summarize(&self, id: NodeId, max_length: i64, depth: usize) -> String {
        let mut parts: Vec<String> = Vec::new();
        if depth > MAX_EXTRACT_DEPTH {
            return String::new();
        }
        let mut budget = Budget::from_remaining(max_length);
        let article_len = self.stats[self.article].effective_len;

        for &child in self.dom.children(id) {
            match &self.dom.node(child).data {
                NodeData::Element { name, .. } => {
                    let child_len = self.stats[child].effective_len;
                    let share = if article_len > 0.0 {
                        child_len / article_len
                    } else {
                        0.0
                    };
                    if self.is_meta_block(child)
                        && share < ARTICLE_SHARE
                        && child_len < budget.remaining() as f64
                    {
                        continue;
                    }
                    if name == "code" && self.dom.text(child).contains('\n') {
                        continue;
                    }

                    let piece = if BLOCK_TAGS.contains(name.as_str()) {
                        let noisy = self.is_link_intensive(child)
                            || tokenize(&self.dom.text(child)).len() < MIN_BLOCK_TOKENS;
                        if noisy && share < ARTICLE_SHARE {
                            continue;
                        }
                        let text = self
                            .summarize(child, budget.remaining(), depth + 1)
                            .trim()
                            .to_string();
                        if tokenize(&text).len() < MIN_BLOCK_TOKENS && share < ARTICLE_SHARE {
                            continue;
                        }
                        if budget.remaining() > 0 {
                            parts.push(" ".to_string());
                            budget.spend(" ");
                        }
                        text
                    } else {
                        self.summarize(child, budget.remaining(), depth + 1)
                    };
                    budget.spend(&piece);
                    parts.push(piece);
                    if budget.is_exhausted() {
                        break;
                    }
                }
                NodeData::Text(text) => {
                    if self.dom.tag_name(id).is_some_and(is_header_like)
                        && string_inclusion_ratio(text, &self.meta.title) > TITLE_INCLUSION
                    {
                        continue;
                    }
                    let text = squeeze_spaces(text);
                    let escaped = escape_html(&text);
                    if budget.fits(&escaped) {
                        budget.spend(&escaped);
                        parts.push(escaped);
                    } else if budget.push_tokens(&text, &mut parts) {
                        return parts.concat();
                    }
                }
                _ => {}
            }
        }
        parts.concat()
    }
}

/// `h1`..`h6` (any `h` followed by digits) and `td`.
fn is_header_like(name: &str) -> bool {
    name == "td"
        || (name.len() > 1
            && name.starts_with('h')
            && name[1..].chars().all(|c| c.is_ascii_digit()))
}

/// Join `path` against `base`, returning `path` untouched when `base` is not a URL.
pub fn resolve_url(base: &str, path: &str) -> String {
    match Url::parse(base).and_then(|b| b.join(path)) {
        Ok(url) => url.to_string(),
        Err(_) => path.to_string(),
    }
}

fn score(dom: &Dom, title: &str, options: &ExtractOptions) -> (Vec<NodeStats>, NodeId) {
    let order = dom.preorder(Dom::ROOT);
    let mut stats = vec![NodeStats::default(); dom.len()];
    // Penalty each node applies to its own subtree (1.0 or NEGATIVE_FACTOR).
    let mut own_penalty = vec![1.0f64; dom.len()];

    for &id in &order {
        let inherited = dom.parent(id).map_or(1.0, |p| stats[p].factor);
        let negative = dom.identifiers(id).iter().any(|i| NEGATIVE.is_match(i));
        if negative || dom.tag_name(id) == Some("a") {
            own_penalty[id] = NEGATIVE_FACTOR;
        }
        stats[id].factor = inherited * own_penalty[id];
        stats[id].flags.negative = negative;
    }

    for &id in order.iter().rev() {
        let mut raw = 0.0;
        for &child in dom.children(id) {
            match &dom.node(child).data {
                NodeData::Element { .. } => raw += stats[child].raw_len * own_penalty[child],
                NodeData::Text(text) => {
                    let trimmed = text.trim();
                    raw += (char_len(trimmed)
                        + trimmed.matches(',').count()
                        + trimmed.matches('，').count()) as f64;
                }
                _ => {}
            }
        }
        stats[id].raw_len = raw;
        stats[id].effective_len = raw * stats[id].factor;
    }

    // Seeded scores replace the plain text length in the walk below.
    let mut seeded: Vec<Option<f64>> = vec![None; dom.len()];
    for &id in &order {
        let Some(name) = dom.tag_name(id) else {
            continue;
        };
        if is_header_like(name) && string_inclusion_ratio(&dom.text(id), title) > TITLE_INCLUSION {
            let mut parent = dom.parent(id);
            while let Some(p) = parent {
                if p == Dom::ROOT {
                    break;
                }
                seeded[p] = Some(seeded[p].unwrap_or(0.0) + stats[p].effective_len * 2.0);
                stats[p].flags.title = true;
                parent = dom.parent(p);
            }
        }
    }
    for &id in &order {
        if dom.tag_name(id) == Some("article") {
            let seed = seeded[id].filter(|s| *s != 0.0);
            seeded[id] = Some(seed.unwrap_or(stats[id].effective_len * 2.0));
            stats[id].flags.article = true;
        }
    }

    let mut article = Dom::ROOT;
    let mut max_score = -1.0;
    for &id in &order {
        if id != Dom::ROOT && !dom.is_element(id) {
            continue;
        }
        let depth = dom.parent(id).map_or(0.1, |p| stats[p].depth + 0.1);
        let positive = dom.identifiers(id).iter().any(|i| POSITIVE.is_match(i));
        let factor = if positive { POSITIVE_FACTOR } else { 1.0 };
        let base = match seeded[id].filter(|s| *s != 0.0) {
            Some(seed) => seed,
            None => stats[id].effective_len + image_len(dom, id, options),
        };
        let score = base * factor * depth.powf(1.5);

        stats[id].depth = depth;
        stats[id].score = score;
        stats[id].flags.positive = positive;
        if score > max_score {
            max_score = score;
            article = id;
        }
    }
    (stats, article)
}

fn image_len(dom: &Dom, id: NodeId, options: &ExtractOptions) -> f64 {
    if !options.weigh_images {
        return 0.0;
    }
    let dimension = |img: NodeId, key: &str| -> Option<f64> {
        dom.attr(img, key)?.trim().trim_end_matches("px").parse::<f64>().ok()
    };
    dom.children(id)
        .iter()
        .filter(|&&c| dom.tag_name(c) == Some("img"))
        .filter_map(|&img| Some(dimension(img, "width")? * dimension(img, "height")?))
        .map(|area| area / IMAGE_AREA_PER_CHAR)
        .sum()
}

//! Structural extraction from HTML documents.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};

use super::selector::Target;
use crate::utils::url::resolve;
use crate::utils::{collapse_whitespace, visible_text};

static TITLE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("title").expect("title selector should compile"));
static BASE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("base[href]").expect("base selector should compile"));
static META: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("meta").expect("meta selector should compile"));
static LINK: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a[href], area[href]").expect("link selector should compile")
});
static IMAGE: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("img[src]").expect("image selector should compile"));
static SCRIPT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("script[src]").expect("script selector should compile"));
static STYLESHEET: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("link[href][rel]").expect("stylesheet selector should compile")
});
static JSON_LD: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("script[type=\"application/ld+json\"]")
        .expect("json-ld selector should compile")
});

/// A parsed HTML page, with URLs resolved against its base.
///
/// Not `Send`; parse, extract and drop within one synchronous step.
pub struct HtmlDocument<'a> {
    raw: &'a str,
    html: Html,
    base_url: String,
}

impl<'a> HtmlDocument<'a> {
    /// Parse `raw` fetched from `page_url`. A `<base href>` overrides the page URL.
    pub fn parse(raw: &'a str, page_url: &str) -> Self {
        let html = Html::parse_document(raw);
        let base_url = html
            .select(&BASE)
            .next()
            .and_then(|e| e.value().attr("href"))
            .and_then(|href| resolve(href, page_url))
            .unwrap_or_else(|| page_url.to_string());

        Self {
            raw,
            html,
            base_url,
        }
    }

    pub fn raw(&self) -> &str {
        self.raw
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Contents of `<title>`, whitespace-collapsed.
    pub fn title(&self) -> Option<String> {
        self.html
            .select(&TITLE)
            .next()
            .map(|e| collapse_whitespace(&e.text().collect::<String>()))
            .filter(|t| !t.is_empty())
    }

    /// Meta tags keyed by lowercased `name`, `property`, `http-equiv` or
    /// `itemprop`. The first occurrence of a key wins. `<meta charset>` is
    /// reported under `charset`.
    pub fn meta(&self) -> HashMap<String, String> {
        let mut meta = HashMap::new();
        for element in self.html.select(&META) {
            let attrs = element.value();
            if let Some(charset) = attrs.attr("charset") {
                meta.entry("charset".to_string())
                    .or_insert_with(|| charset.trim().to_string());
            }
            if let (Some(key), Some(content)) = (meta_key(&element), attrs.attr("content")) {
                meta.entry(key).or_insert_with(|| content.trim().to_string());
            }
        }
        meta
    }

    /// Every `content` value for a meta key, in document order.
    pub fn meta_values(&self, key: &str) -> Vec<String> {
        let key = key.trim().to_ascii_lowercase();
        self.html
            .select(&META)
            .filter(|e| meta_key(e).as_deref() == Some(key.as_str()))
            .filter_map(|e| e.value().attr("content"))
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect()
    }

    /// Anchor and area targets, resolved and deduplicated in document order.
    pub fn links(&self) -> Vec<String> {
        self.resolved(&LINK, "href")
    }

    pub fn images(&self) -> Vec<String> {
        self.resolved(&IMAGE, "src")
    }

    pub fn scripts(&self) -> Vec<String> {
        self.resolved(&SCRIPT, "src")
    }

    pub fn stylesheets(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.html
            .select(&STYLESHEET)
            .filter(|e| {
                e.value()
                    .attr("rel")
                    .is_some_and(|rel| {
                        rel.split_ascii_whitespace()
                            .any(|r| r.eq_ignore_ascii_case("stylesheet"))
                    })
            })
            .filter_map(|e| e.value().attr("href"))
            .filter_map(|href| resolve(href.trim(), &self.base_url))
            .filter(|url| seen.insert(url.clone()))
            .collect()
    }

    /// Raw bodies of `application/ld+json` script blocks.
    pub fn json_ld(&self) -> Vec<String> {
        self.html
            .select(&JSON_LD)
            .map(|e| e.text().collect::<String>())
            .filter(|s| !s.trim().is_empty())
            .collect()
    }

    /// Visible text, one line per block element.
    pub fn visible_text(&self) -> String {
        visible_text(self.raw)
    }

    /// Read `target` from every element matching `selector`.
    ///
    /// Elements lacking the requested attribute are skipped.
    pub fn select(&self, selector: &Selector, target: &Target) -> Vec<String> {
        self.html
            .select(selector)
            .filter_map(|element| read_target(&element, target))
            .collect()
    }

    fn resolved(&self, selector: &Selector, attr: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.html
            .select(selector)
            .filter_map(|e| e.value().attr(attr))
            .filter_map(|value| resolve(value.trim(), &self.base_url))
            .filter(|url| seen.insert(url.clone()))
            .collect()
    }
}

fn meta_key(element: &ElementRef<'_>) -> Option<String> {
    let attrs = element.value();
    ["name", "property", "http-equiv", "itemprop"]
        .iter()
        .find_map(|a| attrs.attr(a))
        .map(|k| k.trim().to_ascii_lowercase())
        .filter(|k| !k.is_empty())
}

fn read_target(element: &ElementRef<'_>, target: &Target) -> Option<String> {
    match target {
        Target::Text => Some(collapse_whitespace(&element.text().collect::<String>())),
        Target::Html => Some(element.inner_html().trim().to_string()),
        Target::Attribute(name) => element.value().attr(name).map(|v| v.trim().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::selector::compile_css;

    const PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>  Example
     Page </title>
  <meta name="Description" content="A test page">
  <meta property="og:title" content="OG Title">
  <meta property="article:tag" content="rust">
  <meta property="article:tag" content="crawler">
  <link rel="stylesheet" href="/css/site.css">
  <link rel="icon" href="/favicon.ico">
  <script src="app.js"></script>
  <script type="application/ld+json">{"@type": "Article", "headline": "LD"}</script>
</head>
<body>
  <h1 class="article-title">X</h1>
  <p>Hello &amp; welcome</p>
  <a href="/about">About</a>
  <a href="contact">Contact</a>
  <a href="/about#team">Team</a>
  <a href="https://other.example.org/">Elsewhere</a>
  <a href="mailto:me@example.com">Mail</a>
  <a href="javascript:void(0)">JS</a>
  <img src="/img/logo.png" alt="logo">
  <script>var hidden = "not visible";</script>
</body>
</html>"#;

    #[test]
    fn test_title_and_meta() {
        let doc = HtmlDocument::parse(PAGE, "https://example.com/docs/index.html");
        assert_eq!(doc.title().as_deref(), Some("Example Page"));

        let meta = doc.meta();
        assert_eq!(meta.get("description").map(String::as_str), Some("A test page"));
        assert_eq!(meta.get("og:title").map(String::as_str), Some("OG Title"));
        assert_eq!(meta.get("charset").map(String::as_str), Some("utf-8"));
        assert_eq!(doc.meta_values("article:tag"), vec!["rust", "crawler"]);
    }

    #[test]
    fn test_links_resolved_and_filtered() {
        let doc = HtmlDocument::parse(PAGE, "https://example.com/docs/index.html");
        assert_eq!(
            doc.links(),
            vec![
                "https://example.com/about",
                "https://example.com/docs/contact",
                "https://example.com/about#team",
                "https://other.example.org/",
            ]
        );
    }

    #[test]
    fn test_resources() {
        let doc = HtmlDocument::parse(PAGE, "https://example.com/docs/index.html");
        assert_eq!(doc.images(), vec!["https://example.com/img/logo.png"]);
        assert_eq!(doc.scripts(), vec!["https://example.com/docs/app.js"]);
        assert_eq!(doc.stylesheets(), vec!["https://example.com/css/site.css"]);
        assert_eq!(doc.json_ld().len(), 1);
    }

    #[test]
    fn test_visible_text_skips_scripts() {
        let doc = HtmlDocument::parse(PAGE, "https://example.com/");
        let text = doc.visible_text();
        assert!(text.contains("Hello & welcome"));
        assert!(!text.contains("not visible"));
    }

    #[test]
    fn test_base_href() {
        let html = r#"<html><head><base href="https://cdn.example.com/root/"></head>
            <body><a href="page">p</a></body></html>"#;
        let doc = HtmlDocument::parse(html, "https://example.com/");
        assert_eq!(doc.links(), vec!["https://cdn.example.com/root/page"]);
    }

    #[test]
    fn test_select_targets() {
        let doc = HtmlDocument::parse(PAGE, "https://example.com/");
        let h1 = compile_css(".article-title").unwrap();
        assert_eq!(doc.select(&h1, &Target::Text), vec!["X"]);

        let img = compile_css("img[alt=logo]").unwrap();
        assert_eq!(
            doc.select(&img, &Target::Attribute("src".into())),
            vec!["/img/logo.png"]
        );
        assert!(doc
            .select(&img, &Target::Attribute("title".into()))
            .is_empty());
    }
}

//! Parser and extractor.
//!
//! - `parser`: title, meta, links, resources and visible text
//! - `selector`: the supported CSS/XPath subset
//! - `rules`: per-field extraction rules with status policy
//! - `transform`: the value transformation pipeline
//! - `json_path`: dot paths into JSON bodies and JSON-LD

pub mod json_path;
pub mod parser;
pub mod rules;
pub mod selector;
pub mod transform;

use std::collections::HashMap;

pub use parser::HtmlDocument;
pub use rules::RuleExtractor;
pub use selector::{xpath_to_css, SimpleSelector, Target};
pub use transform::Pipeline;

use crate::models::ExtractionResult;

/// Everything the crawler needs from one page, with the DOM already dropped.
#[derive(Debug, Clone, Default)]
pub struct PageAnalysis {
    pub title: Option<String>,
    pub metadata: HashMap<String, String>,
    pub text: String,
    pub links: Vec<String>,
    pub images: Vec<String>,
    pub scripts: Vec<String>,
    pub stylesheets: Vec<String>,
    pub extraction: Vec<ExtractionResult>,
}

/// Parse `html` fetched from `page_url` and run the extraction rules.
pub fn analyze(html: &str, page_url: &str, extractor: &RuleExtractor) -> PageAnalysis {
    let doc = HtmlDocument::parse(html, page_url);
    PageAnalysis {
        title: doc.title(),
        metadata: doc.meta(),
        text: doc.visible_text(),
        links: doc.links(),
        images: doc.images(),
        scripts: doc.scripts(),
        stylesheets: doc.stylesheets(),
        extraction: extractor.extract(&doc),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ExtractionRule;

    #[test]
    fn test_analyze() {
        let html = r#"<html><head><title>Home</title></head>
            <body><h1 class="article-title">X</h1><a href="/a">A</a></body></html>"#;
        let extractor = RuleExtractor::new(&[ExtractionRule::css("title", ".article-title")]);
        let page = analyze(html, "https://example.com/", &extractor);

        assert_eq!(page.title.as_deref(), Some("Home"));
        assert_eq!(page.links, vec!["https://example.com/a"]);
        assert_eq!(page.extraction[0].value(), Some("X"));
        assert!(page.text.contains('X'));
    }
}

//! The supported selector subset.
//!
//! Only five CSS forms are accepted:
//!
//! | form              | example                 |
//! |-------------------|-------------------------|
//! | `tag`             | `h1`                    |
//! | `#id`             | `#main`                 |
//! | `.class`          | `.article-title`        |
//! | `tag[attr]`       | `a[href]`, `[data-id]`  |
//! | `tag[attr=value]` | `meta[name="author"]`   |
//!
//! XPath rules are accepted in the equivalent forms `//tag`, `//tag[@attr]`
//! and `//tag[@attr='v']` (with `*` as the tag, `@id` and `@class` map to
//! `#` and `.`), optionally followed by `/@attr` or `/text()`.
//!
//! Anything else (combinators, pseudo-classes, predicates, axes) is rejected
//! and the rule matches nothing.

use scraper::Selector;
use tracing::debug;

/// A parsed selector in the supported subset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimpleSelector {
    Tag(String),
    Id(String),
    Class(String),
    Attribute {
        tag: Option<String>,
        name: String,
        value: Option<String>,
    },
}

/// What to read from a matched element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Text,
    Html,
    Attribute(String),
}

impl Target {
    /// Interpret a rule's `attribute` field. `text` and `html` are reserved.
    pub fn from_attribute(attribute: Option<&str>) -> Self {
        match attribute.map(str::trim) {
            None | Some("") | Some("text") => Target::Text,
            Some("html") => Target::Html,
            Some(name) => Target::Attribute(name.to_ascii_lowercase()),
        }
    }
}

impl SimpleSelector {
    /// Parse a CSS selector in the supported subset.
    pub fn parse(input: &str) -> Option<Self> {
        let s = input.trim();
        if s.is_empty() {
            return None;
        }

        if let Some(id) = s.strip_prefix('#') {
            return is_ident(id).then(|| SimpleSelector::Id(id.to_string()));
        }
        if let Some(class) = s.strip_prefix('.') {
            return is_ident(class).then(|| SimpleSelector::Class(class.to_string()));
        }

        match s.find('[') {
            None => is_tag(s).then(|| SimpleSelector::Tag(s.to_ascii_lowercase())),
            Some(open) => {
                let tag = &s[..open];
                let inner = s[open + 1..].strip_suffix(']')?;
                if inner.contains('[') || inner.contains(']') {
                    return None;
                }
                let tag = if tag.is_empty() {
                    None
                } else if is_tag(tag) {
                    Some(tag.to_ascii_lowercase())
                } else {
                    return None;
                };

                let (name, value) = match inner.split_once('=') {
                    Some((name, value)) => (name.trim(), Some(unquote(value.trim())?)),
                    None => (inner.trim(), None),
                };
                if !is_ident(name) {
                    return None;
                }
                Some(SimpleSelector::Attribute {
                    tag,
                    name: name.to_ascii_lowercase(),
                    value,
                })
            }
        }
    }

    /// Render as a CSS selector string.
    pub fn to_css(&self) -> String {
        match self {
            SimpleSelector::Tag(tag) => tag.clone(),
            SimpleSelector::Id(id) => format!("#{id}"),
            SimpleSelector::Class(class) => format!(".{class}"),
            SimpleSelector::Attribute { tag, name, value } => {
                let tag = tag.as_deref().unwrap_or("");
                match value {
                    Some(v) => format!("{tag}[{name}=\"{}\"]", v.replace('"', "\\\"")),
                    None => format!("{tag}[{name}]"),
                }
            }
        }
    }

    /// Compile into a `scraper` selector.
    pub fn compile(&self) -> Option<Selector> {
        Selector::parse(&self.to_css()).ok()
    }
}

/// Parse and compile a CSS rule selector, logging when it falls outside the subset.
pub fn compile_css(selector: &str) -> Option<Selector> {
    let compiled = SimpleSelector::parse(selector).and_then(|s| s.compile());
    if compiled.is_none() {
        debug!("Unsupported CSS selector '{}', matching nothing", selector);
    }
    compiled
}

/// Convert a simplified XPath expression into the CSS subset plus a read target.
pub fn xpath_to_css(xpath: &str) -> Option<(SimpleSelector, Target)> {
    let rest = xpath.trim().strip_prefix("//")?;

    let (step, target) = if let Some(step) = rest.strip_suffix("/text()") {
        (step, Target::Text)
    } else if let Some((step, attr)) = rest.rsplit_once("/@") {
        if !is_ident(attr) {
            return None;
        }
        (step, Target::Attribute(attr.to_ascii_lowercase()))
    } else {
        (rest, Target::Text)
    };

    if step.split('[').next().is_some_and(|head| head.contains('/')) {
        return None;
    }

    let (tag, predicate) = match step.find('[') {
        Some(open) => (&step[..open], Some(step[open + 1..].strip_suffix(']')?)),
        None => (step, None),
    };
    let tag = match tag {
        "*" => None,
        t if is_tag(t) => Some(t.to_ascii_lowercase()),
        _ => return None,
    };

    let selector = match predicate {
        None => SimpleSelector::Tag(tag?),
        Some(predicate) => {
            let predicate = predicate.trim().strip_prefix('@')?;
            let (name, value) = match predicate.split_once('=') {
                Some((name, value)) => (name.trim(), Some(unquote(value.trim())?)),
                None => (predicate.trim(), None),
            };
            if !is_ident(name) {
                return None;
            }
            let name = name.to_ascii_lowercase();
            match (tag, name.as_str(), value) {
                (None, "id", Some(v)) if is_ident(&v) => SimpleSelector::Id(v),
                (None, "class", Some(v)) if is_ident(&v) => SimpleSelector::Class(v),
                (tag, _, value) => SimpleSelector::Attribute { tag, name, value },
            }
        }
    };

    Some((selector, target))
}

/// Compile an XPath rule selector, logging when it falls outside the subset.
pub fn compile_xpath(xpath: &str) -> Option<(Selector, Target)> {
    let compiled = xpath_to_css(xpath).and_then(|(s, t)| Some((s.compile()?, t)));
    if compiled.is_none() {
        debug!("Unsupported XPath '{}', matching nothing", xpath);
    }
    compiled
}

fn unquote(value: &str) -> Option<String> {
    let unquoted = if let Some(v) = value.strip_prefix('"') {
        v.strip_suffix('"')?
    } else if let Some(v) = value.strip_prefix('\'') {
        v.strip_suffix('\'')?
    } else {
        value
    };
    if unquoted.contains(['"', '\'']) {
        return None;
    }
    Some(unquoted.to_string())
}

fn is_tag(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '-')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_forms() {
        assert_eq!(
            SimpleSelector::parse("h1"),
            Some(SimpleSelector::Tag("h1".into()))
        );
        assert_eq!(
            SimpleSelector::parse("#main"),
            Some(SimpleSelector::Id("main".into()))
        );
        assert_eq!(
            SimpleSelector::parse(".article-title"),
            Some(SimpleSelector::Class("article-title".into()))
        );
        assert_eq!(
            SimpleSelector::parse("a[href]"),
            Some(SimpleSelector::Attribute {
                tag: Some("a".into()),
                name: "href".into(),
                value: None
            })
        );
        assert_eq!(
            SimpleSelector::parse("meta[name=\"author\"]"),
            Some(SimpleSelector::Attribute {
                tag: Some("meta".into()),
                name: "name".into(),
                value: Some("author".into())
            })
        );
        assert_eq!(
            SimpleSelector::parse("meta[property=og:title]")
                .unwrap()
                .to_css(),
            "meta[property=\"og:title\"]"
        );
    }

    #[test]
    fn test_rejects_complex_selectors() {
        for s in [
            "div p",
            "div > p",
            "a:hover",
            "div.note",
            "ul li:nth-child(2)",
            "a[href^=http]",
            "",
            "#",
            "p, span",
        ] {
            assert!(SimpleSelector::parse(s).is_none(), "accepted {s:?}");
        }
    }

    #[test]
    fn test_all_forms_compile() {
        for s in ["h1", "#main", ".a-b", "a[href]", "img[alt='x y']", "[data-id]"] {
            assert!(compile_css(s).is_some(), "failed to compile {s:?}");
        }
    }

    #[test]
    fn test_xpath_conversion() {
        assert_eq!(
            xpath_to_css("//h1"),
            Some((SimpleSelector::Tag("h1".into()), Target::Text))
        );
        assert_eq!(
            xpath_to_css("//*[@id='main']"),
            Some((SimpleSelector::Id("main".into()), Target::Text))
        );
        assert_eq!(
            xpath_to_css("//*[@class=\"price\"]/text()"),
            Some((SimpleSelector::Class("price".into()), Target::Text))
        );
        assert_eq!(
            xpath_to_css("//a[@rel='next']/@href"),
            Some((
                SimpleSelector::Attribute {
                    tag: Some("a".into()),
                    name: "rel".into(),
                    value: Some("next".into())
                },
                Target::Attribute("href".into())
            ))
        );
        assert_eq!(
            xpath_to_css("//div[@id='x']").unwrap().0.to_css(),
            "div[id=\"x\"]"
        );
    }

    #[test]
    fn test_xpath_outside_subset() {
        for x in [
            "/html/body",
            "//div/p",
            "//div[1]",
            "//a[contains(@href,'x')]",
            "//*",
            "h1",
        ] {
            assert!(xpath_to_css(x).is_none(), "accepted {x:?}");
        }
    }

    #[test]
    fn test_target_from_attribute() {
        assert_eq!(Target::from_attribute(None), Target::Text);
        assert_eq!(Target::from_attribute(Some("text")), Target::Text);
        assert_eq!(Target::from_attribute(Some("html")), Target::Html);
        assert_eq!(
            Target::from_attribute(Some("HREF")),
            Target::Attribute("href".into())
        );
    }
}

//! Rule-driven field extraction.

use regex::Regex;
use scraper::Selector;
use tracing::{debug, warn};

use super::json_path;
use super::parser::HtmlDocument;
use super::selector::{compile_css, compile_xpath, Target};
use super::transform::Pipeline;
use crate::models::{ExtractionResult, ExtractionRule, ExtractionStatus, RuleType};

/// How a rule locates raw values, compiled once per crawl.
#[derive(Debug, Clone)]
enum Matcher {
    Elements(Selector, Target),
    Pattern(Regex),
    JsonPath(String),
    Meta(String),
    /// The selector could not be compiled; always matches nothing.
    Invalid(String),
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: ExtractionRule,
    matcher: Matcher,
    pipeline: Pipeline,
}

/// Evaluates a fixed set of [`ExtractionRule`]s against pages.
///
/// Missing fields never produce an `Err`: a required rule with no match
/// records [`ExtractionStatus::Failed`] for that field only.
#[derive(Debug, Clone, Default)]
pub struct RuleExtractor {
    rules: Vec<CompiledRule>,
}

impl RuleExtractor {
    pub fn new(rules: &[ExtractionRule]) -> Self {
        let rules = rules
            .iter()
            .map(|rule| CompiledRule {
                matcher: compile_matcher(rule),
                pipeline: rule
                    .transformation
                    .as_ref()
                    .map(Pipeline::compile)
                    .unwrap_or_default(),
                rule: rule.clone(),
            })
            .collect();
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Evaluate every rule against a document, in declaration order.
    pub fn extract(&self, doc: &HtmlDocument<'_>) -> Vec<ExtractionResult> {
        self.rules.iter().map(|r| evaluate(r, doc)).collect()
    }
}

fn compile_matcher(rule: &ExtractionRule) -> Matcher {
    let target = Target::from_attribute(rule.attribute.as_deref());
    let invalid = || Matcher::Invalid(format!("unsupported selector '{}'", rule.selector));

    match rule.rule_type {
        RuleType::CssSelector => match compile_css(&rule.selector) {
            Some(selector) => Matcher::Elements(selector, target),
            None => invalid(),
        },
        RuleType::Xpath => match compile_xpath(&rule.selector) {
            // An explicit attribute on the rule wins over the path's own target.
            Some((selector, path_target)) => {
                let target = if rule.attribute.is_some() {
                    target
                } else {
                    path_target
                };
                Matcher::Elements(selector, target)
            }
            None => invalid(),
        },
        RuleType::Regex => match Regex::new(&rule.selector) {
            Ok(re) => Matcher::Pattern(re),
            Err(e) => {
                warn!(
                    "Ignoring invalid regex for field '{}': {}",
                    rule.field_name, e
                );
                Matcher::Invalid(format!("invalid regex: {e}"))
            }
        },
        RuleType::JsonPath => Matcher::JsonPath(rule.selector.clone()),
        RuleType::Meta => Matcher::Meta(rule.selector.clone()),
    }
}

fn raw_values(matcher: &Matcher, doc: &HtmlDocument<'_>) -> Vec<String> {
    match matcher {
        Matcher::Elements(selector, target) => doc.select(selector, target),
        // Group 1 when the pattern captures, otherwise the whole match.
        Matcher::Pattern(re) => re
            .captures_iter(doc.raw())
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(0)))
            .map(|m| m.as_str().to_string())
            .collect(),
        Matcher::JsonPath(path) => json_path::evaluate(doc.raw(), &doc.json_ld(), path),
        Matcher::Meta(key) => doc.meta_values(key),
        Matcher::Invalid(_) => Vec::new(),
    }
}

fn evaluate(compiled: &CompiledRule, doc: &HtmlDocument<'_>) -> ExtractionResult {
    let rule = &compiled.rule;
    if !rule.is_enabled {
        return ExtractionResult {
            field_name: rule.field_name.clone(),
            values: Vec::new(),
            status: ExtractionStatus::Skipped,
            error: None,
        };
    }

    let values: Vec<String> = compiled
        .pipeline
        .apply(raw_values(&compiled.matcher, doc))
        .into_iter()
        .filter(|v| !v.is_empty())
        .collect();

    let invalid = match &compiled.matcher {
        Matcher::Invalid(reason) => Some(reason.clone()),
        _ => None,
    };

    let (values, status, error) = if !values.is_empty() {
        (values, ExtractionStatus::Extracted, None)
    } else if let Some(default) = &rule.default_value {
        (vec![default.clone()], ExtractionStatus::Defaulted, invalid)
    } else if rule.is_required {
        let reason = invalid.unwrap_or_else(|| "required field not found".to_string());
        debug!("Required field '{}' missing: {}", rule.field_name, reason);
        (Vec::new(), ExtractionStatus::Failed, Some(reason))
    } else {
        (Vec::new(), ExtractionStatus::Empty, invalid)
    };

    ExtractionResult {
        field_name: rule.field_name.clone(),
        values,
        status,
        error,
    }
}

//! Extraction rule definitions.
//!
//! Rules are declared in configuration and evaluated per page by
//! [`crate::extract::RuleExtractor`]. They are never mutated during
//! evaluation.

use serde::{Deserialize, Serialize};

/// How a rule's selector is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    /// Simplified CSS: `tag`, `#id`, `.class`, `tag[attr]`, `tag[attr=value]`.
    CssSelector,
    /// Simplified XPath, converted to the CSS subset.
    Xpath,
    /// Regular expression over the raw markup.
    Regex,
    /// Dot path over a JSON body or embedded JSON-LD.
    JsonPath,
    /// `<meta>` tag by `name` or `property`.
    Meta,
}

/// A single field-extraction rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRule {
    pub field_name: String,
    pub rule_type: RuleType,
    pub selector: String,
    /// Attribute to read instead of element text (`text` and `html` are special).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation: Option<DataTransformation>,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ExtractionRule {
    /// Create an enabled, optional rule with no transformation.
    pub fn new(field_name: &str, rule_type: RuleType, selector: &str) -> Self {
        Self {
            field_name: field_name.to_string(),
            rule_type,
            selector: selector.to_string(),
            attribute: None,
            transformation: None,
            is_required: false,
            default_value: None,
            is_enabled: true,
        }
    }

    pub fn css(field_name: &str, selector: &str) -> Self {
        Self::new(field_name, RuleType::CssSelector, selector)
    }

    pub fn with_attribute(mut self, attribute: &str) -> Self {
        self.attribute = Some(attribute.to_string());
        self
    }

    pub fn with_transformation(mut self, operations: Vec<TransformOperation>) -> Self {
        self.transformation = Some(DataTransformation { operations });
        self
    }

    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    pub fn with_default(mut self, value: &str) -> Self {
        self.default_value = Some(value.to_string());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.is_enabled = false;
        self
    }
}

/// Ordered list of operations applied left to right.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataTransformation {
    pub operations: Vec<TransformOperation>,
}

/// A single step in a [`DataTransformation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum TransformOperation {
    Trim,
    Lowercase,
    Uppercase,
    /// Capitalise the first letter of every word.
    TitleCase,
    StripHtml,
    ExtractNumbers,
    ExtractEmails,
    ExtractUrls,
    RegexReplace {
        pattern: String,
        replacement: String,
    },
    /// Replace each value with the given capture group of the first match.
    RegexCapture {
        pattern: String,
        #[serde(default = "default_capture_group")]
        group: usize,
    },
    Prefix {
        value: String,
    },
    Suffix {
        value: String,
    },
    /// Split each value; keep only `index` when set.
    Split {
        delimiter: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<usize>,
    },
    /// Collapse all values into one.
    Join {
        separator: String,
    },
    /// Reparse a date. Without `input_format` a list of common formats is tried.
    DateFormat {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input_format: Option<String>,
        output_format: String,
    },
}

fn default_capture_group() -> usize {
    1
}

/// Outcome of evaluating one rule against one page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStatus {
    /// Values were found.
    Extracted,
    /// Nothing matched; the rule's default was substituted.
    Defaulted,
    /// Nothing matched on an optional rule without a default.
    Empty,
    /// Nothing matched on a required rule.
    Failed,
    /// The rule is disabled.
    Skipped,
}

/// Per-field extraction result attached to a scraped page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub field_name: String,
    pub values: Vec<String>,
    pub status: ExtractionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExtractionResult {
    /// First extracted value, if any.
    pub fn value(&self) -> Option<&str> {
        self.values.first().map(|s| s.as_str())
    }

    pub fn is_failed(&self) -> bool {
        self.status == ExtractionStatus::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_deserializes_with_defaults() {
        let json = r#"{
            "field_name": "title",
            "rule_type": "css_selector",
            "selector": ".article-title"
        }"#;
        let rule: ExtractionRule = serde_json::from_str(json).unwrap();
        assert!(rule.is_enabled);
        assert!(!rule.is_required);
        assert_eq!(rule.rule_type, RuleType::CssSelector);
    }

    #[test]
    fn test_transformation_deserializes() {
        let json = r#"{"operations": [
            {"op": "trim"},
            {"op": "regex_replace", "pattern": "\\s+", "replacement": " "},
            {"op": "split", "delimiter": ","}
        ]}"#;
        let t: DataTransformation = serde_json::from_str(json).unwrap();
        assert_eq!(t.operations.len(), 3);
        assert_eq!(t.operations[0], TransformOperation::Trim);
        assert_eq!(
            t.operations[2],
            TransformOperation::Split {
                delimiter: ",".into(),
                index: None
            }
        );
    }
}

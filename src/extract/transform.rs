//! Value transformation pipeline.
//!
//! Operations run strictly left to right over the list of values extracted
//! by a rule; each one consumes the previous one's output. Some operations
//! fan out (`split`, `extract_*`), `join` collapses, `regex_capture` drops
//! values that do not match.

use std::fmt::Write as _;
use std::sync::LazyLock;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime};
use regex::Regex;
use tracing::warn;

use crate::models::{DataTransformation, TransformOperation};
use crate::utils::strip_html;

static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"-?\d{1,3}(?:,\d{3})+(?:\.\d+)?|-?\d+(?:\.\d+)?")
        .expect("number pattern should compile")
});

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}")
        .expect("email pattern should compile")
});

static URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"https?://[^\s"'<>]+"#).expect("url pattern should compile")
});

/// Formats tried when a date operation has no explicit input format.
const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%d.%m.%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%Y%m%d",
];

#[derive(Debug, Clone)]
enum Step {
    Trim,
    Lowercase,
    Uppercase,
    TitleCase,
    StripHtml,
    ExtractNumbers,
    ExtractEmails,
    ExtractUrls,
    Replace(Regex, String),
    Capture(Regex, usize),
    Prefix(String),
    Suffix(String),
    Split(String, Option<usize>),
    Join(String),
    Date(Option<String>, String),
}

/// A [`DataTransformation`] with its regexes compiled.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    steps: Vec<Step>,
}

impl Pipeline {
    /// Compile a transformation. Operations with invalid patterns are
    /// logged and dropped; the rest of the pipeline still runs.
    pub fn compile(transformation: &DataTransformation) -> Self {
        let steps = transformation
            .operations
            .iter()
            .filter_map(compile_step)
            .collect();
        Self { steps }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step in order.
    pub fn apply(&self, values: Vec<String>) -> Vec<String> {
        self.steps
            .iter()
            .fold(values, |values, step| apply_step(step, values))
    }
}

fn compile_step(op: &TransformOperation) -> Option<Step> {
    let compile = |pattern: &str| match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            warn!("Ignoring transform with invalid regex '{}': {}", pattern, e);
            None
        }
    };

    Some(match op {
        TransformOperation::Trim => Step::Trim,
        TransformOperation::Lowercase => Step::Lowercase,
        TransformOperation::Uppercase => Step::Uppercase,
        TransformOperation::TitleCase => Step::TitleCase,
        TransformOperation::StripHtml => Step::StripHtml,
        TransformOperation::ExtractNumbers => Step::ExtractNumbers,
        TransformOperation::ExtractEmails => Step::ExtractEmails,
        TransformOperation::ExtractUrls => Step::ExtractUrls,
        TransformOperation::RegexReplace {
            pattern,
            replacement,
        } => Step::Replace(compile(pattern)?, replacement.clone()),
        TransformOperation::RegexCapture { pattern, group } => {
            Step::Capture(compile(pattern)?, *group)
        }
        TransformOperation::Prefix { value } => Step::Prefix(value.clone()),
        TransformOperation::Suffix { value } => Step::Suffix(value.clone()),
        TransformOperation::Split { delimiter, index } => Step::Split(delimiter.clone(), *index),
        TransformOperation::Join { separator } => Step::Join(separator.clone()),
        TransformOperation::DateFormat {
            input_format,
            output_format,
        } => Step::Date(input_format.clone(), output_format.clone()),
    })
}

fn apply_step(step: &Step, values: Vec<String>) -> Vec<String> {
    match step {
        Step::Trim => values.into_iter().map(|v| v.trim().to_string()).collect(),
        Step::Lowercase => values.into_iter().map(|v| v.to_lowercase()).collect(),
        Step::Uppercase => values.into_iter().map(|v| v.to_uppercase()).collect(),
        Step::TitleCase => values.iter().map(|v| title_case(v)).collect(),
        Step::StripHtml => values.iter().map(|v| strip_html(v)).collect(),
        Step::ExtractNumbers => values
            .iter()
            .flat_map(|v| NUMBER.find_iter(v).map(|m| m.as_str().replace(',', "")))
            .collect(),
        Step::ExtractEmails => values
            .iter()
            .flat_map(|v| EMAIL.find_iter(v).map(|m| m.as_str().to_string()))
            .collect(),
        Step::ExtractUrls => values
            .iter()
            .flat_map(|v| {
                URL.find_iter(v)
                    .map(|m| m.as_str().trim_end_matches(['.', ',', ';', ':', ')']).to_string())
            })
            .collect(),
        Step::Replace(re, replacement) => values
            .iter()
            .map(|v| re.replace_all(v, replacement.as_str()).into_owned())
            .collect(),
        Step::Capture(re, group) => values
            .iter()
            .filter_map(|v| {
                re.captures(v)
                    .and_then(|caps| caps.get(*group))
                    .map(|m| m.as_str().to_string())
            })
            .collect(),
        Step::Prefix(prefix) => values.into_iter().map(|v| format!("{prefix}{v}")).collect(),
        Step::Suffix(suffix) => values.into_iter().map(|v| format!("{v}{suffix}")).collect(),
        Step::Split(delimiter, index) => values
            .iter()
            .flat_map(|v| {
                let parts: Vec<String> = if delimiter.is_empty() {
                    vec![v.clone()]
                } else {
                    v.split(delimiter.as_str())
                        .map(|p| p.trim().to_string())
                        .filter(|p| !p.is_empty())
                        .collect()
                };
                match index {
                    Some(i) => parts.into_iter().nth(*i).into_iter().collect(),
                    None => parts,
                }
            })
            .collect(),
        Step::Join(separator) => {
            if values.is_empty() {
                values
            } else {
                vec![values.join(separator)]
            }
        }
        Step::Date(input, output) => values
            .into_iter()
            .map(|v| reformat_date(&v, input.as_deref(), output).unwrap_or(v))
            .collect(),
    }
}

fn title_case(value: &str) -> String {
    value
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

enum ParsedDate {
    Zoned(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

fn parse_date(value: &str, input: Option<&str>) -> Option<ParsedDate> {
    let value = value.trim();
    if let Some(format) = input {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(ParsedDate::Zoned(dt));
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(ParsedDate::Naive(dt));
        }
        return NaiveDate::parse_from_str(value, format)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(ParsedDate::Naive);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(ParsedDate::Zoned(dt));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(ParsedDate::Zoned(dt));
    }
    if let Some(dt) = DATE_TIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(value, f).ok())
    {
        return Some(ParsedDate::Naive(dt));
    }
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(value, f).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(ParsedDate::Naive)
}

/// Reparse a date, `None` when it cannot be parsed or formatted.
fn reformat_date(value: &str, input: Option<&str>, output: &str) -> Option<String> {
    let mut out = String::new();
    let written = match parse_date(value, input)? {
        ParsedDate::Zoned(dt) => write!(out, "{}", dt.format(output)),
        ParsedDate::Naive(dt) => write!(out, "{}", dt.format(output)),
    };
    written.ok().map(|_| out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(ops: Vec<TransformOperation>, values: &[&str]) -> Vec<String> {
        Pipeline::compile(&DataTransformation { operations: ops })
            .apply(values.iter().map(|v| v.to_string()).collect())
    }

    #[test]
    fn test_left_to_right_order() {
        let ops = vec![
            TransformOperation::Trim,
            TransformOperation::Prefix { value: "a-".into() },
            TransformOperation::Uppercase,
        ];
        assert_eq!(run(ops, &["  x "]), vec!["A-X"]);

        let ops = vec![
            TransformOperation::Uppercase,
            TransformOperation::Prefix { value: "a-".into() },
        ];
        assert_eq!(run(ops, &["x"]), vec!["a-X"]);
    }

    #[test]
    fn test_case_and_strip() {
        assert_eq!(
            run(vec![TransformOperation::TitleCase], &["hello  wORLD"]),
            vec!["Hello World"]
        );
        assert_eq!(
            run(vec![TransformOperation::StripHtml], &["<b>Bold</b> &amp; <i>it</i>"]),
            vec!["Bold & it"]
        );
    }

    #[test]
    fn test_extractors_fan_out() {
        assert_eq!(
            run(vec![TransformOperation::ExtractNumbers], &["$1,299.00 or 15 items, -3"]),
            vec!["1299.00", "15", "-3"]
        );
        assert_eq!(
            run(
                vec![TransformOperation::ExtractEmails],
                &["mail a@example.com or b.c@test.org."]
            ),
            vec!["a@example.com", "b.c@test.org"]
        );
        assert_eq!(
            run(
                vec![TransformOperation::ExtractUrls],
                &["see https://example.com/a, and (http://x.org/b)."]
            ),
            vec!["https://example.com/a", "http://x.org/b"]
        );
    }

    #[test]
    fn test_regex_operations() {
        let replace = TransformOperation::RegexReplace {
            pattern: r"\s+".into(),
            replacement: " ".into(),
        };
        assert_eq!(run(vec![replace], &["a  b\n c"]), vec!["a b c"]);

        let capture = TransformOperation::RegexCapture {
            pattern: r"Price: (\d+)".into(),
            group: 1,
        };
        assert_eq!(run(vec![capture], &["Price: 42", "none"]), vec!["42"]);
    }

    #[test]
    fn test_invalid_regex_step_is_skipped() {
        let ops = vec![
            TransformOperation::RegexReplace {
                pattern: "(".into(),
                replacement: "".into(),
            },
            TransformOperation::Uppercase,
        ];
        assert_eq!(run(ops, &["abc"]), vec!["ABC"]);
    }

    #[test]
    fn test_split_and_join() {
        let split = TransformOperation::Split {
            delimiter: ",".into(),
            index: None,
        };
        assert_eq!(run(vec![split.clone()], &["a, b,,c"]), vec!["a", "b", "c"]);

        let nth = TransformOperation::Split {
            delimiter: "/".into(),
            index: Some(1),
        };
        assert_eq!(run(vec![nth], &["x/y/z", "solo"]), vec!["y"]);

        let join = TransformOperation::Join {
            separator: "|".into(),
        };
        assert_eq!(run(vec![split, join], &["a,b", "c"]), vec!["a|b|c"]);
        assert!(run(
            vec![TransformOperation::Join {
                separator: "|".into()
            }],
            &[]
        )
        .is_empty());
    }

    #[test]
    fn test_date_format() {
        let op = |input: Option<&str>| TransformOperation::DateFormat {
            input_format: input.map(String::from),
            output_format: "%Y-%m-%d".into(),
        };
        assert_eq!(run(vec![op(None)], &["March 5, 2024"]), vec!["2024-03-05"]);
        assert_eq!(
            run(vec![op(None)], &["2024-03-05T10:00:00+02:00"]),
            vec!["2024-03-05"]
        );
        assert_eq!(run(vec![op(Some("%d-%m-%Y"))], &["05-03-2024"]), vec!["2024-03-05"]);
        // Unparseable values pass through unchanged.
        assert_eq!(run(vec![op(None)], &["someday"]), vec!["someday"]);
    }
}

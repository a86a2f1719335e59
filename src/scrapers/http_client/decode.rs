//! Response body decoding.
//!
//! Tries the declared charset first, then UTF-8, Latin-1, Windows-1252 and
//! finally a lossy ASCII decode that always succeeds.

use std::sync::LazyLock;

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use regex::bytes::Regex;

static META_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?([a-zA-Z0-9_\-:.]+)"#)
        .expect("meta charset pattern should compile")
});

/// Bytes sniffed for a `<meta charset>` declaration.
const SNIFF_LEN: usize = 2048;

/// Bytes with no assigned character in Windows-1252.
const CP1252_UNDEFINED: [u8; 5] = [0x81, 0x8D, 0x8F, 0x90, 0x9D];

/// Decoded text and the name of the encoding that succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedText {
    pub text: String,
    pub encoding: &'static str,
}

/// Extract the `charset` parameter from a Content-Type value.
pub fn charset_from_content_type(content_type: &str) -> Option<&str> {
    content_type.split(';').skip(1).find_map(|param| {
        let (key, value) = param.split_once('=')?;
        if key.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches(['"', '\'']))
        } else {
            None
        }
    })
}

fn sniff_meta_charset(body: &[u8]) -> Option<&'static Encoding> {
    let head = &body[..body.len().min(SNIFF_LEN)];
    let caps = META_CHARSET.captures(head)?;
    Encoding::for_label(caps.get(1)?.as_bytes())
}

/// Decode a body using the fallback chain.
pub fn decode_body(body: &[u8], content_type: Option<&str>) -> DecodedText {
    let declared = content_type
        .and_then(charset_from_content_type)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
        .or_else(|| sniff_meta_charset(body));

    if let Some(encoding) = declared {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(body) {
            return DecodedText {
                text: text.into_owned(),
                encoding: encoding.name(),
            };
        }
    }

    let without_bom = body.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(body);
    if let Ok(text) = std::str::from_utf8(without_bom) {
        return DecodedText {
            text: text.to_string(),
            encoding: UTF_8.name(),
        };
    }

    if let Some(text) = decode_latin1_strict(body) {
        return DecodedText {
            text,
            encoding: "ISO-8859-1",
        };
    }

    if !body.iter().any(|b| CP1252_UNDEFINED.contains(b)) {
        let (text, _) = WINDOWS_1252.decode_without_bom_handling(body);
        return DecodedText {
            text: text.into_owned(),
            encoding: WINDOWS_1252.name(),
        };
    }

    DecodedText {
        text: decode_ascii_lossy(body),
        encoding: "US-ASCII",
    }
}

/// ISO-8859-1 without C1 control bytes, which in practice signal Windows-1252.
fn decode_latin1_strict(body: &[u8]) -> Option<String> {
    if body.iter().any(|b| (0x80..=0x9F).contains(b)) {
        return None;
    }
    Some(body.iter().map(|&b| b as char).collect())
}

fn decode_ascii_lossy(body: &[u8]) -> String {
    body.iter()
        .map(|&b| if b.is_ascii() { b as char } else { '\u{FFFD}' })
        .collect()
}

/// Whether a content type should be decoded as text at all.
pub fn is_textual(content_type: Option<&str>) -> bool {
    let Some(ct) = content_type else {
        return true;
    };
    let mime = ct.split(';').next().unwrap_or_default().trim().to_lowercase();
    mime.is_empty()
        || mime.starts_with("text/")
        || mime.contains("html")
        || mime.contains("xml")
        || mime.contains("json")
        || mime.contains("javascript")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_charset_from_content_type() {
        assert_eq!(
            charset_from_content_type("text/html; charset=ISO-8859-1"),
            Some("ISO-8859-1")
        );
        assert_eq!(
            charset_from_content_type("text/html; Charset=\"utf-8\""),
            Some("utf-8")
        );
        assert_eq!(charset_from_content_type("text/html"), None);
    }

    #[test]
    fn test_declared_charset_wins() {
        let body = b"caf\xe9";
        let decoded = decode_body(body, Some("text/html; charset=iso-8859-1"));
        assert_eq!(decoded.text, "café");
    }

    #[test]
    fn test_meta_charset_sniffed() {
        let body = b"<html><head><meta charset=\"windows-1252\"></head><body>\x93hi\x94</body></html>";
        let decoded = decode_body(body, Some("text/html"));
        assert!(decoded.text.contains("\u{201c}hi\u{201d}"));
        assert_eq!(decoded.encoding, "windows-1252");
    }

    #[test]
    fn test_fallback_chain() {
        assert_eq!(decode_body("héllo".as_bytes(), None).encoding, "UTF-8");

        let latin1 = decode_body(b"caf\xe9", None);
        assert_eq!(latin1.encoding, "ISO-8859-1");
        assert_eq!(latin1.text, "café");

        let cp1252 = decode_body(b"\x93quoted\x94", None);
        assert_eq!(cp1252.encoding, "windows-1252");
        assert_eq!(cp1252.text, "\u{201c}quoted\u{201d}");

        // 0x81 is undefined in Windows-1252.
        let ascii = decode_body(b"a\x81b", None);
        assert_eq!(ascii.encoding, "US-ASCII");
        assert_eq!(ascii.text, "a\u{FFFD}b");
    }

    #[test]
    fn test_utf8_bom_stripped() {
        let decoded = decode_body(b"\xEF\xBB\xBFhello", None);
        assert_eq!(decoded.text, "hello");
    }

    #[test]
    fn test_is_textual() {
        assert!(is_textual(Some("text/html; charset=utf-8")));
        assert!(is_textual(Some("application/ld+json")));
        assert!(is_textual(None));
        assert!(!is_textual(Some("application/pdf")));
        assert!(!is_textual(Some("image/png")));
    }
}

//! URL canonicalisation, resolution and classification.
//!
//! All functions return `None` for input they cannot make sense of; callers
//! treat that as "skip this URL".

use std::path::{Component, Path, PathBuf};

use url::{Host, Url};

use super::mime::{category_for_extension, category_for_mime, FileCategory};

/// Link schemes that never point at crawlable content.
const IGNORED_SCHEMES: &[&str] = &["javascript:", "mailto:", "tel:", "data:", "about:", "sms:"];

/// Canonicalise a URL for identity comparison.
///
/// Lowercases scheme and host, strips default ports, drops the fragment,
/// sorts query parameters, collapses duplicate slashes in the path and trims
/// a trailing slash everywhere except the root path.
pub fn normalize(url: &str) -> Option<String> {
    let mut parsed = Url::parse(url.trim()).ok()?;
    if parsed.cannot_be_a_base() {
        return None;
    }

    parsed.set_fragment(None);

    let mut pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| !k.is_empty())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if pairs.is_empty() {
        parsed.set_query(None);
    } else {
        pairs.sort();
        parsed.query_pairs_mut().clear().extend_pairs(pairs.iter());
    }

    let path = canonical_path(parsed.path());
    parsed.set_path(&path);

    Some(parsed.to_string())
}

fn canonical_path(path: &str) -> String {
    let mut collapsed = String::with_capacity(path.len());
    let mut previous_slash = false;
    for c in path.chars() {
        if c == '/' {
            if previous_slash {
                continue;
            }
            previous_slash = true;
        } else {
            previous_slash = false;
        }
        collapsed.push(c);
    }

    if collapsed.len() > 1 && collapsed.ends_with('/') {
        collapsed.pop();
    }
    if collapsed.is_empty() {
        collapsed.push('/');
    }
    collapsed
}

/// Resolve a link found on `base` into an absolute URL.
///
/// Handles absolute, protocol-relative (`//host/x`), root-relative (`/x`)
/// and relative (`x`, `../x`) references. When `base` is a filesystem path
/// rather than a URL the reference is joined lexically and returned as a
/// `file://` URL. Fragment-only and non-navigational links yield `None`.
pub fn resolve(relative: &str, base: &str) -> Option<String> {
    let href = relative.trim();
    if href.is_empty() || href.starts_with('#') {
        return None;
    }
    let lower = href.to_ascii_lowercase();
    if IGNORED_SCHEMES.iter().any(|s| lower.starts_with(s)) {
        return None;
    }

    if let Ok(absolute) = Url::parse(href) {
        return match absolute.scheme() {
            "http" | "https" | "file" => Some(absolute.to_string()),
            _ => None,
        };
    }

    match Url::parse(base.trim()) {
        Ok(base_url) if !base_url.cannot_be_a_base() => {
            base_url.join(href).ok().map(|u| u.to_string())
        }
        Ok(_) => None,
        Err(_) => resolve_path(href, base.trim()),
    }
}

fn resolve_path(href: &str, base: &str) -> Option<String> {
    if href.starts_with("//") {
        return None;
    }
    let base_path = Path::new(base);
    if !base_path.is_absolute() {
        return None;
    }

    let href_path = href.split(['?', '#']).next().unwrap_or_default();
    let joined = if href_path.starts_with('/') {
        PathBuf::from(href_path)
    } else {
        let dir = if base.ends_with('/') {
            base_path
        } else {
            base_path.parent()?
        };
        dir.join(href_path)
    };

    let mut normalized = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            other => normalized.push(other.as_os_str()),
        }
    }

    Url::from_file_path(&normalized).ok().map(|u| u.to_string())
}

/// Classify a URL by extension first, then by declared content type.
///
/// Unparseable URLs yield `None`; URLs with neither a known extension nor a
/// content type default to [`FileCategory::Page`].
pub fn classify(url: &str, content_type: Option<&str>) -> Option<FileCategory> {
    let parsed = Url::parse(url.trim()).ok()?;

    if let Some(category) = path_extension(parsed.path()).and_then(|e| category_for_extension(&e))
    {
        return Some(category);
    }

    Some(match content_type {
        Some(ct) if !ct.trim().is_empty() => category_for_mime(ct),
        _ => FileCategory::Page,
    })
}

/// Extension of the last path segment, lowercased, without the dot.
pub fn path_extension(path: &str) -> Option<String> {
    let segment = path.rsplit('/').next()?;
    let (stem, ext) = segment.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > 8 {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Registrable part of a host: the last two labels, or the whole host for IPs.
pub fn base_domain(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    match parsed.host()? {
        Host::Domain(domain) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            let parts: Vec<&str> = domain.split('.').collect();
            if parts.len() >= 2 {
                Some(parts[parts.len() - 2..].join("."))
            } else {
                Some(domain)
            }
        }
        Host::Ipv4(ip) => Some(ip.to_string()),
        Host::Ipv6(ip) => Some(ip.to_string()),
    }
}

/// Whether two URLs share the same last two domain labels.
pub fn is_same_base_domain(a: &str, b: &str) -> bool {
    match (base_domain(a), base_domain(b)) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

/// Lowercased host of a URL, used as the politeness key.
pub fn host_key(url: &str) -> Option<String> {
    let parsed = Url::parse(url.trim()).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some(match parsed.port() {
        Some(port) => format!("{host}:{port}"),
        None => host,
    })
}

//! Shared utility functions.
//!
//! This module contains reusable utilities used across the codebase:
//! - `url`: canonicalisation, resolution and classification of URLs
//! - `html`: entity decoding, tag stripping and visible-text extraction
//! - `mime`: file categories by extension and MIME type

mod html;
mod mime;
pub mod url;

pub use html::{collapse_whitespace, decode_entities, strip_html, visible_text};
pub use mime::{category_for_extension, category_for_mime, mime_to_extension, FileCategory};

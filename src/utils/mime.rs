//! Content categorisation by extension and MIME type.

use serde::{Deserialize, Serialize};

/// Content category of a URL, used for classification and download filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    Page,
    Image,
    Pdf,
    Document,
    Spreadsheet,
    Presentation,
    Archive,
    Audio,
    Video,
    Script,
    Stylesheet,
    Data,
    Font,
    Other,
}

impl FileCategory {
    /// Get the category ID as a string.
    pub fn id(&self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::Image => "image",
            Self::Pdf => "pdf",
            Self::Document => "document",
            Self::Spreadsheet => "spreadsheet",
            Self::Presentation => "presentation",
            Self::Archive => "archive",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::Script => "script",
            Self::Stylesheet => "stylesheet",
            Self::Data => "data",
            Self::Font => "font",
            Self::Other => "other",
        }
    }

    /// Parse a category from its string ID (plural forms accepted).
    pub fn from_id(id: &str) -> Option<Self> {
        match id.trim().to_lowercase().trim_end_matches('s') {
            "page" | "html" => Some(Self::Page),
            "image" | "img" => Some(Self::Image),
            "pdf" => Some(Self::Pdf),
            "document" | "doc" => Some(Self::Document),
            "spreadsheet" => Some(Self::Spreadsheet),
            "presentation" => Some(Self::Presentation),
            "archive" => Some(Self::Archive),
            "audio" => Some(Self::Audio),
            "video" => Some(Self::Video),
            "script" => Some(Self::Script),
            "stylesheet" | "cs" => Some(Self::Stylesheet),
            "data" => Some(Self::Data),
            "font" => Some(Self::Font),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// Whether links of this category are crawled as pages.
    pub fn is_page(&self) -> bool {
        matches!(self, Self::Page)
    }

    /// Whether this category is a file worth handing to the downloader.
    pub fn is_file(&self) -> bool {
        !matches!(self, Self::Page | Self::Script | Self::Stylesheet)
    }
}

impl std::fmt::Display for FileCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

/// Categorise a lowercase file extension (without the dot).
pub fn category_for_extension(ext: &str) -> Option<FileCategory> {
    let category = match ext.to_lowercase().as_str() {
        "html" | "htm" | "xhtml" | "php" | "asp" | "aspx" | "jsp" | "shtml" | "cfm" => {
            FileCategory::Page
        }
        "jpg" | "jpeg" | "png" | "gif" | "webp" | "svg" | "bmp" | "ico" | "tif" | "tiff"
        | "avif" => FileCategory::Image,
        "pdf" => FileCategory::Pdf,
        "doc" | "docx" | "odt" | "rtf" | "txt" | "md" | "epub" => FileCategory::Document,
        "xls" | "xlsx" | "ods" | "csv" | "tsv" => FileCategory::Spreadsheet,
        "ppt" | "pptx" | "odp" | "key" => FileCategory::Presentation,
        "zip" | "tar" | "gz" | "tgz" | "bz2" | "xz" | "7z" | "rar" => FileCategory::Archive,
        "mp3" | "wav" | "ogg" | "flac" | "m4a" | "aac" => FileCategory::Audio,
        "mp4" | "webm" | "mov" | "avi" | "mkv" | "m4v" => FileCategory::Video,
        "js" | "mjs" => FileCategory::Script,
        "css" => FileCategory::Stylesheet,
        "json" | "xml" | "rss" | "atom" | "yaml" | "yml" => FileCategory::Data,
        "woff" | "woff2" | "ttf" | "otf" | "eot" => FileCategory::Font,
        _ => return None,
    };
    Some(category)
}

/// Categorise a MIME type (parameters such as `charset` are ignored).
pub fn category_for_mime(mime: &str) -> FileCategory {
    let mime_lower = mime
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();

    if mime_lower == "text/html" || mime_lower == "application/xhtml+xml" {
        FileCategory::Page
    } else if mime_lower == "application/pdf" {
        FileCategory::Pdf
    } else if mime_lower.starts_with("image/") {
        FileCategory::Image
    } else if mime_lower.starts_with("audio/") {
        FileCategory::Audio
    } else if mime_lower.starts_with("video/") {
        FileCategory::Video
    } else if mime_lower.starts_with("font/") {
        FileCategory::Font
    } else if mime_lower == "text/css" {
        FileCategory::Stylesheet
    } else if mime_lower.contains("javascript") {
        FileCategory::Script
    } else if mime_lower.contains("spreadsheet")
        || mime_lower.contains("excel")
        || mime_lower == "text/csv"
    {
        FileCategory::Spreadsheet
    } else if mime_lower.contains("presentation") || mime_lower.contains("powerpoint") {
        FileCategory::Presentation
    } else if mime_lower.contains("word")
        || mime_lower == "application/rtf"
        || mime_lower.starts_with("text/")
    {
        FileCategory::Document
    } else if mime_lower == "application/json"
        || mime_lower.ends_with("+json")
        || mime_lower.ends_with("/xml")
        || mime_lower.ends_with("+xml")
    {
        FileCategory::Data
    } else if mime_lower.contains("zip")
        || mime_lower == "application/x-tar"
        || mime_lower == "application/gzip"
        || mime_lower.contains("compressed")
    {
        FileCategory::Archive
    } else {
        FileCategory::Other
    }
}

/// Map MIME type to file extension.
pub fn mime_to_extension(mime: &str) -> &'static str {
    let mime = mime.split(';').next().unwrap_or_default().trim();
    match mime {
        "application/pdf" => "pdf",
        "text/html" => "html",
        "text/plain" => "txt",
        "text/csv" => "csv",
        "application/json" => "json",
        "application/xml" | "text/xml" => "xml",
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/svg+xml" => "svg",
        "application/msword" => "doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        "application/vnd.ms-excel" => "xls",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => "xlsx",
        "application/zip" => "zip",
        "application/gzip" => "gz",
        "audio/mpeg" => "mp3",
        "video/mp4" => "mp4",
        _ => "bin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_for_mime() {
        assert_eq!(category_for_mime("text/html; charset=utf-8"), FileCategory::Page);
        assert_eq!(category_for_mime("application/pdf"), FileCategory::Pdf);
        assert_eq!(category_for_mime("image/png"), FileCategory::Image);
        assert_eq!(category_for_mime("text/csv"), FileCategory::Spreadsheet);
        assert_eq!(category_for_mime("application/zip"), FileCategory::Archive);
        assert_eq!(category_for_mime("application/ld+json"), FileCategory::Data);
        assert_eq!(
            category_for_mime("application/octet-stream"),
            FileCategory::Other
        );
    }

    #[test]
    fn test_category_for_extension() {
        assert_eq!(category_for_extension("PDF"), Some(FileCategory::Pdf));
        assert_eq!(category_for_extension("htm"), Some(FileCategory::Page));
        assert_eq!(category_for_extension("docx"), Some(FileCategory::Document));
        assert_eq!(category_for_extension("unknownext"), None);
    }

    #[test]
    fn test_from_id_accepts_plurals() {
        assert_eq!(FileCategory::from_id("images"), Some(FileCategory::Image));
        assert_eq!(FileCategory::from_id("PDF"), Some(FileCategory::Pdf));
        assert_eq!(FileCategory::from_id("archives"), Some(FileCategory::Archive));
        assert_eq!(FileCategory::from_id("nonsense"), None);
    }

    #[test]
    fn test_mime_to_extension() {
        assert_eq!(mime_to_extension("application/pdf"), "pdf");
        assert_eq!(mime_to_extension("text/html; charset=utf-8"), "html");
        assert_eq!(mime_to_extension("some/random"), "bin");
    }
}

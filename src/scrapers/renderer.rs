//! Pluggable JavaScript renderer.
//!
//! Pages that need script execution are handed to a [`PageRenderer`]
//! implementation (typically a headless browser living outside this crate).
//! The crawler treats the rendered result exactly like an HTTP fetch.

use async_trait::async_trait;

use crate::error::RenderError;

/// Output of a render.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderedPage {
    pub html_content: String,
    pub final_url: String,
    pub text: Option<String>,
    pub title: Option<String>,
    /// PNG bytes, when the renderer captures one.
    pub screenshot: Option<Vec<u8>>,
}

/// Renders a URL with JavaScript enabled.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(&self, url: &str) -> Result<RenderedPage, RenderError>;

    /// Short name for logs.
    fn name(&self) -> &str {
        "renderer"
    }
}

/// Renderer that serves canned HTML, for tests and offline runs.
#[derive(Debug, Clone, Default)]
pub struct StaticRenderer {
    pages: std::collections::HashMap<String, String>,
}

impl StaticRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }
}

#[async_trait]
impl PageRenderer for StaticRenderer {
    async fn render(&self, url: &str) -> Result<RenderedPage, RenderError> {
        let html = self
            .pages
            .get(url)
            .ok_or_else(|| RenderError::Failed {
                url: url.to_string(),
                message: "no canned page".to_string(),
            })?;
        Ok(RenderedPage {
            html_content: html.clone(),
            final_url: url.to_string(),
            ..Default::default()
        })
    }

    fn name(&self) -> &str {
        "static"
    }
}

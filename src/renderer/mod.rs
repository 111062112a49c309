pub mod chromium;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

pub use chromium::ChromiumRenderer;

/// Failures while rendering a single invoice page. None of these abort a
/// run; the job logs them and moves to the next receipt.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Navigation to {url} timed out after {after:?}")]
    NavigationTimeout { url: String, after: Duration },

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("No invoice frame found")]
    FrameNotFound,

    #[error("Browser error: {0}")]
    Browser(String),
}

impl From<chromiumoxide::error::CdpError> for RenderError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        RenderError::Browser(err.to_string())
    }
}

/// Loads a URL and returns the rendered markup of its embedded invoice frame
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render_frame(&self, url: &str) -> Result<String, RenderError>;
}

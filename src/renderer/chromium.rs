use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig as LaunchConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{
    CreateIsolatedWorldParams, EventDomContentEventFired, FrameId, NavigateParams,
};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

use super::{PageRenderer, RenderError};
use crate::config::BrowserConfig;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

const FRAME_MARKUP_SCRIPT: &str =
    "document.documentElement ? document.documentElement.outerHTML : ''";

static PROFILE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Renders invoice pages in headless Chromium, one fresh browser per page
pub struct ChromiumRenderer {
    config: BrowserConfig,
}

impl ChromiumRenderer {
    pub fn new(config: BrowserConfig) -> Self {
        Self { config }
    }

    async fn extract_frame_markup(&self, browser: &Browser, url: &str) -> Result<String, RenderError> {
        let page = browser.new_page("about:blank").await?;
        page.execute(SetUserAgentOverrideParams::new(self.config.user_agent.clone()))
            .await?;

        self.navigate(&page, url).await?;

        let frame_id = self.wait_for_frame(&page).await?;

        let ready_script = frame_ready_script(self.config.min_text_length, &self.config.loading_marker);
        let rendered = timeout(self.config.render_timeout(), async {
            loop {
                if let Ok(Some(Value::Bool(true))) = evaluate_in_frame(&page, &frame_id, &ready_script).await {
                    break;
                }
                sleep(POLL_INTERVAL).await;
            }
        })
        .await;

        if rendered.is_err() {
            // Some viewers never drop the placeholder; give them a fixed grace period
            debug!("Invoice frame for {} not settled, waiting {:?}", url, self.config.render_fallback());
            sleep(self.config.render_fallback()).await;
        }

        let markup = evaluate_in_frame(&page, &frame_id, FRAME_MARKUP_SCRIPT).await?;
        Ok(markup
            .as_ref()
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }

    /// Navigate and wait for DOMContentLoaded only. Subresources and child
    /// frames may still be loading when this returns.
    async fn navigate(&self, page: &Page, url: &str) -> Result<(), RenderError> {
        let mut content_loaded = page.event_listener::<EventDomContentEventFired>().await?;

        let navigation = async {
            let navigated = page
                .execute(NavigateParams::new(url))
                .await
                .map_err(|e| RenderError::Navigation(e.to_string()))?;
            if let Some(error) = navigated.result.error_text.clone() {
                return Err(RenderError::Navigation(error));
            }

            content_loaded
                .next()
                .await
                .ok_or_else(|| RenderError::Navigation("page closed before content loaded".to_string()))?;
            Ok::<(), RenderError>(())
        };

        let navigation_timeout = self.config.navigation_timeout();
        match timeout(navigation_timeout, navigation).await {
            Err(_) => Err(RenderError::NavigationTimeout {
                url: url.to_string(),
                after: navigation_timeout,
            }),
            Ok(result) => result,
        }
    }

    /// Frame id of the first iframe on the page, polled until the frame timeout
    async fn wait_for_frame(&self, page: &Page) -> Result<FrameId, RenderError> {
        let deadline = Instant::now() + self.config.frame_timeout();
        loop {
            if let Ok(element) = page.find_element("iframe").await {
                let node = element.description().await?;
                return node.frame_id.ok_or(RenderError::FrameNotFound);
            }
            if Instant::now() >= deadline {
                return Err(RenderError::FrameNotFound);
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl PageRenderer for ChromiumRenderer {
    async fn render_frame(&self, url: &str) -> Result<String, RenderError> {
        let session = BrowserSession::launch(&self.config).await?;
        let result = match session.browser() {
            Some(browser) => self.extract_frame_markup(browser, url).await,
            None => Err(RenderError::Launch("browser already closed".to_string())),
        };
        session.close().await;
        result
    }
}

/// Evaluate `expression` in a fresh isolated world of `frame_id`, returning
/// the JSON value it produced
async fn evaluate_in_frame(page: &Page, frame_id: &FrameId, expression: &str) -> Result<Option<Value>, RenderError> {
    let world = page
        .execute(CreateIsolatedWorldParams::new(frame_id.clone()))
        .await?;

    let params = EvaluateParams::builder()
        .expression(expression)
        .context_id(world.result.execution_context_id)
        .return_by_value(true)
        .build()
        .map_err(RenderError::Browser)?;

    let evaluated = page.execute(params).await?;
    Ok(evaluated.result.result.value)
}

/// Script that is true once the frame shows real content rather than a
/// loading placeholder
pub fn frame_ready_script(min_text_length: usize, loading_marker: &str) -> String {
    let marker = serde_json::to_string(loading_marker).unwrap_or_else(|_| "\"\"".to_string());
    format!(
        "(() => {{ const text = (document.body && document.body.innerText) || ''; \
         return text.length > {} && !text.includes({}); }})()",
        min_text_length, marker
    )
}

/// A launched browser plus its CDP event loop. `close` is the normal exit;
/// `Drop` kills the process if `close` was never reached.
struct BrowserSession {
    browser: Option<Browser>,
    handler: JoinHandle<()>,
    profile_dir: PathBuf,
    runtime_handle: tokio::runtime::Handle,
}

impl BrowserSession {
    async fn launch(config: &BrowserConfig) -> Result<Self, RenderError> {
        Self::launch_in(config, next_profile_dir()).await
    }

    async fn launch_in(config: &BrowserConfig, profile_dir: PathBuf) -> Result<Self, RenderError> {
        let launch_config = launch_config(config, &profile_dir)?;
        let (browser, mut handler) = match Browser::launch(launch_config).await {
            Ok(launched) => launched,
            Err(e) => {
                // Chrome may have created the profile before failing
                remove_profile_dir(&profile_dir).await;
                return Err(RenderError::Launch(e.to_string()));
            }
        };

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler error: {}", e);
                }
            }
        });

        Ok(Self {
            browser: Some(browser),
            handler,
            profile_dir,
            runtime_handle: tokio::runtime::Handle::current(),
        })
    }

    fn browser(&self) -> Option<&Browser> {
        self.browser.as_ref()
    }

    async fn close(mut self) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("Failed to close browser cleanly: {}", e);
                let _ = browser.kill().await;
            }
            if let Err(e) = browser.wait().await {
                debug!("Waiting for browser exit failed: {}", e);
            }
        }
        self.handler.abort();
        remove_profile_dir(&self.profile_dir).await;
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        self.handler.abort();
        if let Some(mut browser) = self.browser.take() {
            self.runtime_handle.spawn(async move {
                let _ = browser.kill().await;
            });
        }
    }
}

fn next_profile_dir() -> PathBuf {
    std::env::temp_dir().join(format!(
        "receipt-vat-{}-{}",
        std::process::id(),
        PROFILE_COUNTER.fetch_add(1, Ordering::Relaxed)
    ))
}

async fn remove_profile_dir(profile_dir: &Path) {
    match tokio::fs::remove_dir_all(profile_dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => debug!("Could not remove browser profile {}: {}", profile_dir.display(), e),
    }
}

fn launch_config(config: &BrowserConfig, profile_dir: &Path) -> Result<LaunchConfig, RenderError> {
    let mut builder = LaunchConfig::builder()
        .user_data_dir(profile_dir)
        // Keep cross-origin iframes in the page's renderer so the page
        // session can evaluate inside them
        .arg("--disable-site-isolation-trials")
        .arg("--disable-features=IsolateOrigins,site-per-process");

    if config.no_sandbox {
        builder = builder.no_sandbox().arg("--disable-setuid-sandbox");
    }
    if let Some(executable) = &config.chrome_executable {
        builder = builder.chrome_executable(executable);
    }

    builder.build().map_err(RenderError::Launch)
}

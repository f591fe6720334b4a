//! Chromium-backed browser using chromiumoxide.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::SetBlockedUrLsParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page;
use futures::StreamExt;
use mapscrape_core::AppConfig;
use serde_json::Value;
use tokio::task::JoinHandle;

use super::{with_timeout, Browser, BrowserLauncher, BrowserPage};
use crate::error::ScraperError;

const SELECTOR_POLL: Duration = Duration::from_millis(200);

/// Bound on opening a tab and on a graceful browser shutdown.
const SESSION_OP_TIMEOUT: Duration = Duration::from_secs(30);

/// Resources no field is ever read from. Images are switched off with a
/// launch flag; fonts and media are refused per page.
const BLOCKED_RESOURCES: [&str; 12] = [
    "*.woff", "*.woff2", "*.ttf", "*.otf", "*.eot", "*.mp4", "*.webm", "*.m4v", "*.mp3",
    "*.ogg", "*.wav", "*fonts.gstatic.com*",
];

/// Launches local Chromium instances configured for Maps.
#[derive(Debug, Clone)]
pub struct ChromiumLauncher {
    chromium_path: Option<PathBuf>,
    user_agent: String,
}

impl ChromiumLauncher {
    #[must_use]
    pub fn new(chromium_path: Option<PathBuf>, user_agent: impl Into<String>) -> Self {
        Self {
            chromium_path,
            user_agent: user_agent.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.chromium_path.clone(), config.user_agent.clone())
    }

    fn browser_config(&self, headless: bool) -> Result<BrowserConfig, ScraperError> {
        let mut builder = BrowserConfig::builder()
            .window_size(1920, 1080)
            .viewport(None)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--lang=en-US")
            // Images are never read and slow the results panel down.
            .arg("--blink-settings=imagesEnabled=false")
            .arg(format!("--user-agent={}", self.user_agent));

        if !headless {
            builder = builder.with_head();
        }
        if let Some(path) = &self.chromium_path {
            builder = builder.chrome_executable(path);
        }

        builder
            .build()
            .map_err(|e| ScraperError::Session(format!("failed to build browser config: {e}")))
    }
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self, headless: bool) -> Result<Box<dyn Browser>, ScraperError> {
        let config = self.browser_config(headless)?;
        let (browser, mut handler) = CdpBrowser::launch(config)
            .await
            .map_err(|e| ScraperError::Session(format!("failed to launch Chromium: {e}")))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::debug!(error = %e, "chromium handler event error");
                }
            }
        });

        tracing::debug!(headless, "chromium launched");
        Ok(Box::new(ChromiumBrowser {
            browser,
            handler_task,
        }))
    }
}

pub struct ChromiumBrowser {
    browser: CdpBrowser,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl Browser for ChromiumBrowser {
    async fn new_page(&self) -> Result<Box<dyn BrowserPage>, ScraperError> {
        let page = with_timeout("opening a page", SESSION_OP_TIMEOUT, async {
            self.browser
                .new_page("about:blank")
                .await
                .map_err(|e| ScraperError::Session(format!("failed to open page: {e}")))
        })
        .await?;

        let blocked = BLOCKED_RESOURCES.iter().map(|p| (*p).to_owned()).collect();
        if let Err(e) = page.execute(SetBlockedUrLsParams::new(blocked)).await {
            if is_session_loss(&e) {
                return Err(ScraperError::Session(e.to_string()));
            }
            tracing::debug!(error = %e, "resource blocking unavailable, loading everything");
        }
        Ok(Box::new(ChromiumPage { page }))
    }

    async fn close(self: Box<Self>) -> Result<(), ScraperError> {
        let mut this = *self;
        let graceful = tokio::time::timeout(SESSION_OP_TIMEOUT, async {
            let closed = this.browser.close().await;
            if let Err(e) = this.browser.wait().await {
                tracing::debug!(error = %e, "waiting for chromium exit failed");
            }
            closed
        })
        .await;

        let outcome = match graceful {
            Ok(closed) => closed
                .map(|_| ())
                .map_err(|e| ScraperError::Session(format!("failed to close Chromium: {e}"))),
            Err(_) => {
                tracing::warn!(
                    timeout_ms = u64::try_from(SESSION_OP_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
                    "chromium did not exit in time, killing it"
                );
                if let Some(Err(e)) = this.browser.kill().await {
                    tracing::warn!(error = %e, "killing chromium failed");
                }
                Err(ScraperError::Timeout {
                    operation: "closing Chromium".to_owned(),
                    timeout_ms: u64::try_from(SESSION_OP_TIMEOUT.as_millis()).unwrap_or(u64::MAX),
                })
            }
        };
        this.handler_task.abort();
        outcome
    }
}

pub struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    async fn eval(&self, selector: &str, script: String) -> Result<Value, ScraperError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| cdp_to_dom(selector, e))?;
        // `null` and `undefined` results come back without a value.
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }
}

/// Encodes `s` as a JavaScript string literal.
fn js_str(s: &str) -> String {
    Value::String(s.to_owned()).to_string()
}

fn cdp_to_dom(selector: &str, e: CdpError) -> ScraperError {
    if is_session_loss(&e) {
        return ScraperError::Session(e.to_string());
    }
    ScraperError::Dom {
        selector: selector.to_owned(),
        reason: e.to_string(),
    }
}

fn is_session_loss(e: &CdpError) -> bool {
    matches!(
        e,
        CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse
    )
}

fn value_to_opt_string(v: Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s),
        _ => None,
    }
}

#[async_trait]
impl BrowserPage for ChromiumPage {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), ScraperError> {
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) if is_session_loss(&e) => Err(ScraperError::Session(e.to_string())),
            Ok(Err(CdpError::Timeout)) | Err(_) => Err(ScraperError::Timeout {
                operation: format!("navigation to {url}"),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
            Ok(Err(e)) => Err(ScraperError::Navigation {
                url: url.to_owned(),
                reason: e.to_string(),
            }),
        }
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<bool, ScraperError> {
        let script = format!("document.querySelector({}) !== null", js_str(selector));
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.eval(selector, script.clone()).await? == Value::Bool(true) {
                return Ok(true);
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(SELECTOR_POLL.min(deadline - now)).await;
        }
    }

    async fn read_text(&self, selector: &str) -> Result<Option<String>, ScraperError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); return el ? el.innerText : null; }})()",
            js_str(selector)
        );
        Ok(value_to_opt_string(self.eval(selector, script).await?))
    }

    async fn read_attribute(
        &self,
        selector: &str,
        attr: &str,
    ) -> Result<Option<String>, ScraperError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({sel}); \
             if (!el) return null; \
             return {attr} === 'href' && el.href ? el.href : el.getAttribute({attr}); }})()",
            sel = js_str(selector),
            attr = js_str(attr),
        );
        Ok(value_to_opt_string(self.eval(selector, script).await?))
    }

    async fn read_attribute_all(
        &self,
        selector: &str,
        attr: &str,
    ) -> Result<Vec<Option<String>>, ScraperError> {
        let script = format!(
            "Array.from(document.querySelectorAll({sel}), el => \
             {attr} === 'href' && el.href ? el.href : el.getAttribute({attr}))",
            sel = js_str(selector),
            attr = js_str(attr),
        );
        match self.eval(selector, script).await? {
            Value::Array(items) => Ok(items.into_iter().map(value_to_opt_string).collect()),
            _ => Ok(Vec::new()),
        }
    }

    async fn scroll(&self, selector: &str, delta_px: i64) -> Result<bool, ScraperError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); \
             if (!el) return false; el.scrollBy(0, {delta_px}); return true; }})()",
            js_str(selector)
        );
        Ok(self.eval(selector, script).await? == Value::Bool(true))
    }

    async fn click(&self, selector: &str) -> Result<bool, ScraperError> {
        let script = format!(
            "(() => {{ const el = document.querySelector({}); \
             if (!el) return false; el.click(); return true; }})()",
            js_str(selector)
        );
        Ok(self.eval(selector, script).await? == Value::Bool(true))
    }

    async fn current_url(&self) -> Result<Option<String>, ScraperError> {
        self.page.url().await.map_err(|e| cdp_to_dom("<url>", e))
    }

    async fn content(&self) -> Result<String, ScraperError> {
        self.page.content().await.map_err(|e| cdp_to_dom("<document>", e))
    }

    async fn close(self: Box<Self>) -> Result<(), ScraperError> {
        self.page
            .close()
            .await
            .map_err(|e| ScraperError::Session(format!("failed to close page: {e}")))
    }
}

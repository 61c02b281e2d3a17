//! One automated browser instance per query.
//!
//! A `BrowserSession` owns the Chrome process, its single tab, and the
//! session-scoped proxy auth extension. Dropping the session kills the
//! browser and removes the extension directory, so every pipeline exit
//! path tears down exactly once.

use anyhow::{Context, Result};
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::proxy::{ProxyAuthExtension, ProxyLease};
use crate::stealth::{StealthProfile, STEALTH_SCRIPT};

pub struct BrowserSession {
    // Field order matters: the tab must drop before the browser process.
    tab: Arc<Tab>,
    _browser: Browser,
    _auth_extension: Option<ProxyAuthExtension>,
}

impl BrowserSession {
    /// Launch Chrome with the given stealth profile and optional proxy.
    ///
    /// The proxy auth extension is generated fresh for this session and
    /// lives exactly as long as the session does.
    pub fn start(
        cfg: &Config,
        profile: StealthProfile,
        lease: Option<&ProxyLease>,
    ) -> Result<Self> {
        let auth_extension = match lease {
            Some(lease) => Some(ProxyAuthExtension::generate(lease)?),
            None => None,
        };

        let args = profile.chrome_args(lease, auth_extension.as_ref());
        let os_args: Vec<&OsStr> = args.iter().map(OsStr::new).collect();

        let browser = Browser::new(LaunchOptions {
            headless: false, // modern headless requested via --headless=new
            window_size: Some(profile.viewport),
            args: os_args,
            ..Default::default()
        })
        .context("failed to launch Chrome")?;

        let tab = browser.new_tab().context("failed to open tab")?;
        tab.set_default_timeout(Duration::from_secs(cfg.page_load_timeout_secs));

        // Hide automation markers before any page script runs
        tab.enable_debugger()?;
        tab.call_method(
            headless_chrome::protocol::cdp::Page::AddScriptToEvaluateOnNewDocument {
                source: STEALTH_SCRIPT.to_string(),
                world_name: None,
                include_command_line_api: None,
                run_immediately: None,
            },
        )?;

        info!(
            "browser session started (viewport {}x{})",
            profile.viewport.0, profile.viewport.1
        );
        Ok(Self {
            tab,
            _browser: browser,
            _auth_extension: auth_extension,
        })
    }

    /// Load a URL and wait for navigation, bounded by the default timeout.
    pub fn navigate(&self, url: &str) -> Result<()> {
        self.tab.navigate_to(url).context("navigation failed")?;
        self.tab
            .wait_until_navigated()
            .context("page load did not complete")?;
        Ok(())
    }

    /// Full rendered markup of the current document
    pub fn content(&self) -> Result<String> {
        self.tab.get_content().context("failed to read page content")
    }

    /// Evaluate JS in the page, returning the JSON value it produced (if any)
    pub fn evaluate(&self, js: &str) -> Result<Option<serde_json::Value>> {
        let remote = self.tab.evaluate(js, false)?;
        Ok(remote.value)
    }

    pub fn press_key(&self, key: &str) -> Result<()> {
        self.tab.press_key(key)?;
        Ok(())
    }

    /// PNG screenshot of the current viewport, written to `path`
    pub fn screenshot(&self, path: &str) -> Result<()> {
        let png = self.tab.capture_screenshot(
            headless_chrome::protocol::cdp::Page::CaptureScreenshotFormatOption::Png,
            None,
            None,
            true,
        )?;
        std::fs::write(path, png).with_context(|| format!("failed to write {}", path))?;
        Ok(())
    }

    /// Consume and tear down the session. Equivalent to dropping, but
    /// makes the teardown transition explicit at the call site.
    pub fn close(self) {
        info!("browser session closed");
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        // The browser process is killed by the Browser drop impl; log any
        // tab that refuses a graceful close but never propagate from here.
        if let Err(e) = self.tab.close(false) {
            warn!("tab close failed during teardown: {}", e);
        }
    }
}

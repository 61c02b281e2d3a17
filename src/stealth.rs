//! Anti-detection browser configuration.
//!
//! Each session gets a freshly randomized profile: viewport dimensions,
//! user agent drawn from a fixed pool, and the standard set of
//! automation-hiding Chrome flags. A small injection script removes the
//! `navigator.webdriver` marker before any page script runs.

use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::Config;
use crate::proxy::{ProxyAuthExtension, ProxyLease};

pub static USER_AGENTS: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36 Edg/121.0.2277.128",
        "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    ]
});

/// Script installed via Page.addScriptToEvaluateOnNewDocument so it runs
/// before any page script can probe for automation markers.
pub const STEALTH_SCRIPT: &str = r#"
    Object.defineProperty(navigator, 'webdriver', {
        get: () => undefined,
    });
"#;

/// Randomized per-session browser fingerprint.
#[derive(Debug, Clone)]
pub struct StealthProfile {
    pub user_agent: &'static str,
    pub viewport: (u32, u32),
    pub headless: bool,
}

impl StealthProfile {
    pub fn random(cfg: &Config) -> Self {
        let mut rng = rand::thread_rng();
        let viewport = (rng.gen_range(1200..=1920), rng.gen_range(800..=1080));
        let user_agent = USER_AGENTS
            .choose(&mut rng)
            .copied()
            .unwrap_or(USER_AGENTS[0]);
        Self {
            user_agent,
            viewport,
            headless: cfg.headless,
        }
    }

    /// Build the full Chrome argument list for this profile.
    ///
    /// The automation-hiding flags are unconditional; proxy arguments are
    /// appended only when a lease and its auth extension are supplied.
    pub fn chrome_args(
        &self,
        lease: Option<&ProxyLease>,
        extension: Option<&ProxyAuthExtension>,
    ) -> Vec<String> {
        let mut args = vec![
            "--disable-blink-features=AutomationControlled".to_string(),
            "--disable-gpu".to_string(),
            "--disable-dev-shm-usage".to_string(),
            "--no-sandbox".to_string(),
            format!("--window-size={},{}", self.viewport.0, self.viewport.1),
            format!("--user-agent={}", self.user_agent),
        ];
        if let Some(lease) = lease {
            args.push(format!("--proxy-server={}", lease.to_chrome_arg()));
        }
        if let Some(ext) = extension {
            args.push(format!("--load-extension={}", ext.path()));
        }
        if self.headless {
            args.push("--headless=new".to_string());
        }
        args
    }
}

//! Rotating proxy allocation and per-session authentication extensions.
//!
//! Ports are drawn uniformly from the configured range, so two concurrent
//! sessions may land on the same upstream port. That contention is tolerated;
//! the provider load-balances behind the port anyway.

use anyhow::{Context, Result};
use rand::Rng;
use std::path::PathBuf;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;

/// One proxy endpoint leased to a single browser session.
#[derive(Debug, Clone)]
pub struct ProxyLease {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl ProxyLease {
    /// Chrome `--proxy-server` argument value
    pub fn to_chrome_arg(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Draw a lease from the configured host + port range.
/// Returns None when proxying is disabled.
pub fn allocate_lease(cfg: &Config) -> Option<ProxyLease> {
    if !cfg.use_proxy {
        return None;
    }
    let port = rand::thread_rng().gen_range(cfg.proxy_port_min..=cfg.proxy_port_max);
    let lease = ProxyLease {
        host: cfg.proxy_host.clone(),
        port,
        username: cfg.proxy_user.clone(),
        password: cfg.proxy_pass.clone(),
    };
    info!("using proxy {}:{}", lease.host, lease.port);
    Some(lease)
}

/// Chrome extension answering proxy auth challenges for one session.
///
/// Each session writes its own uuid-suffixed directory under the system
/// temp dir, so concurrent sessions never collide on a shared path. The
/// directory is deleted when the extension handle is dropped.
pub struct ProxyAuthExtension {
    dir: PathBuf,
}

impl ProxyAuthExtension {
    pub fn generate(lease: &ProxyLease) -> Result<Self> {
        let dir = std::env::temp_dir().join(format!("proxy_auth_ext_{}", Uuid::new_v4()));
        if dir.exists() {
            std::fs::remove_dir_all(&dir).ok();
        }
        std::fs::create_dir_all(&dir).context("failed to create proxy auth extension dir")?;

        let manifest = r#"{
  "version": "1.0.0",
  "manifest_version": 2,
  "name": "Proxy Auth",
  "permissions": ["proxy", "tabs", "unlimitedStorage", "storage", "<all_urls>", "webRequest", "webRequestBlocking"],
  "background": { "scripts": ["background.js"] },
  "minimum_chrome_version": "76.0.0"
}"#;

        let background = format!(
            r#"var config = {{
  mode: "fixed_servers",
  rules: {{
    singleProxy: {{
      scheme: "http",
      host: "{host}",
      port: parseInt({port})
    }},
    bypassList: ["localhost"]
  }}
}};

chrome.proxy.settings.set({{value: config, scope: "regular"}}, function() {{}});

function callbackFn(details) {{
  return {{
    authCredentials: {{
      username: "{user}",
      password: "{pass}"
    }}
  }};
}}

chrome.webRequest.onAuthRequired.addListener(
  callbackFn,
  {{urls: ["<all_urls>"]}},
  ['blocking']
);"#,
            host = lease.host,
            port = lease.port,
            user = js_escape(&lease.username),
            pass = js_escape(&lease.password),
        );

        std::fs::write(dir.join("manifest.json"), manifest)
            .context("failed to write extension manifest")?;
        std::fs::write(dir.join("background.js"), background)
            .context("failed to write extension background script")?;

        info!("proxy auth extension created at {}", dir.display());
        Ok(Self { dir })
    }

    /// Absolute path for Chrome's `--load-extension` argument
    pub fn path(&self) -> String {
        self.dir.to_string_lossy().to_string()
    }
}

impl Drop for ProxyAuthExtension {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.dir) {
            warn!("failed to remove proxy auth extension dir: {}", e);
        }
    }
}

fn js_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

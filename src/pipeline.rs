//! SERP acquisition pipeline.
//!
//! Drives one browser session through a fixed sequence of steps:
//! proxy lease -> stealth profile -> launch -> navigate -> geolocation
//! dialog -> cookie consent -> settle -> block check -> artifacts ->
//! teardown. Steps never run out of order; dialog handling is
//! best-effort and must not abort the run.
//!
//! Everything here is blocking. Callers dispatch `acquire` via
//! `tokio::task::spawn_blocking` so concurrent queries do not serialize
//! on one browser's I/O.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::Rng;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::proxy::allocate_lease;
use crate::session::BrowserSession;
use crate::stealth::StealthProfile;

/// Immutable description of one search query.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    pub query: String,
    pub domain: String,
    pub num: u32,
    pub gl: String,
    pub hl: String,
    pub lr: Option<String>,
    pub cr: Option<String>,
    pub location: Option<String>,
    /// Pause before teardown, for manual inspection of the live browser
    pub hold_secs: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum AcquireError {
    #[error("browser session failed to start: {0}")]
    SessionInit(String),
    #[error("page load timed out: {0}")]
    NavigationTimeout(String),
    #[error("automation error: {0}")]
    Automation(String),
}

/// Terminal outcome of one pipeline run.
#[derive(Debug)]
pub enum PageOutcome {
    Success { html: String },
    Blocked { html: String, reason: String },
    Failure(AcquireError),
}

/// Affirmative consent button texts, first match wins
pub const COOKIE_TEXTS: &[&str] = &["Принять все", "Accept all", "I agree", "Agree", "Got it"];

/// Markers whose presence (case-insensitive) classifies a page as blocked
pub const CAPTCHA_MARKERS: &[&str] = &["recaptcha", "я не робот", "i'm not a robot"];

// ---------------------------------------------------------------------------
// URL construction
// ---------------------------------------------------------------------------

/// Encoded-location token: fixed tag + base64 of the raw location string
pub fn uule_parameter(location: &str) -> String {
    format!("w+CAIQICI{}", BASE64.encode(location.as_bytes()))
}

/// Build the destination search URL for a query spec.
pub fn build_search_url(spec: &QuerySpec) -> String {
    let mut qs = url::form_urlencoded::Serializer::new(String::new());
    qs.append_pair("q", &spec.query);
    qs.append_pair("hl", &spec.hl);
    qs.append_pair("gl", &spec.gl);
    qs.append_pair("num", &spec.num.to_string());
    qs.append_pair("ie", "UTF-8");
    qs.append_pair("oe", "UTF-8");
    // Personalization off, filter relaxation on
    qs.append_pair("pws", "0");
    qs.append_pair("complete", "0");
    if let Some(lr) = &spec.lr {
        qs.append_pair("lr", lr);
    }
    if let Some(cr) = &spec.cr {
        qs.append_pair("cr", cr);
    }
    if let Some(location) = &spec.location {
        qs.append_pair("uule", &uule_parameter(location));
        let near = location.split(',').next().unwrap_or(location);
        qs.append_pair("near", near);
        info!("search location set: {}", location);
    }
    format!("https://www.{}/search?{}", spec.domain, qs.finish())
}

// ---------------------------------------------------------------------------
// Block detection
// ---------------------------------------------------------------------------

pub fn is_blocked(html: &str) -> bool {
    let lower = html.to_lowercase();
    CAPTCHA_MARKERS.iter().any(|m| lower.contains(m))
}

// ---------------------------------------------------------------------------
// Dialog dismissal
// ---------------------------------------------------------------------------

/// One fallible dismissal attempt; strategies run in order and the first
/// that reports a click wins.
struct DismissStrategy {
    name: &'static str,
    js: &'static str,
}

const GEO_DISMISS_STRATEGIES: &[DismissStrategy] = &[
    DismissStrategy {
        name: "direct button",
        js: r#"
            (() => {
                const btn = document.querySelector('div.mpQYc g-raised-button');
                if (btn) { btn.click(); return true; }
                return false;
            })();
        "#,
    },
    DismissStrategy {
        name: "text match",
        js: r#"
            (() => {
                const buttons = document.querySelectorAll('g-raised-button');
                for (const btn of buttons) {
                    const t = btn.textContent || '';
                    if (t.includes('Not now') || t.includes('Не сейчас')) {
                        btn.click();
                        return true;
                    }
                }
                return false;
            })();
        "#,
    },
    DismissStrategy {
        name: "last button",
        js: r#"
            (() => {
                const buttons = document.querySelectorAll('g-raised-button');
                if (buttons.length > 0) {
                    buttons[buttons.length - 1].click();
                    return true;
                }
                return false;
            })();
        "#,
    },
];

const GEO_DIALOG_PRESENT_JS: &str = r#"!!document.querySelector('div.qk7LXc[role="dialog"]')"#;

/// Dismiss the geolocation permission dialog if present.
///
/// Absence of the dialog is not an error; inability to dismiss a present
/// dialog is logged and the pipeline continues.
fn dismiss_geo_dialog(session: &BrowserSession, cfg: &Config) -> bool {
    // Give the dialog a moment to render
    std::thread::sleep(Duration::from_millis(1500));

    match session.evaluate(GEO_DIALOG_PRESENT_JS) {
        Ok(Some(serde_json::Value::Bool(true))) => {}
        Ok(_) => return false,
        Err(e) => {
            warn!("geolocation dialog probe failed: {}", e);
            return false;
        }
    }
    info!("geolocation dialog detected");

    for strategy in GEO_DISMISS_STRATEGIES {
        match session.evaluate(strategy.js) {
            Ok(Some(serde_json::Value::Bool(true))) => {
                info!("geolocation dialog dismissed via {}", strategy.name);
                action_pause(cfg);
                return true;
            }
            Ok(_) => {}
            Err(e) => warn!("geolocation dismissal '{}' failed: {}", strategy.name, e),
        }
    }

    // Key-based fallback
    match session.press_key("Escape") {
        Ok(()) => {
            info!("geolocation dialog dismissed via Escape");
            action_pause(cfg);
            true
        }
        Err(e) => {
            warn!("could not dismiss geolocation dialog: {}", e);
            false
        }
    }
}

/// Click the first consent button matching a configured affirmative text.
/// Absence of the dialog is not an error.
fn accept_cookies(session: &BrowserSession, cfg: &Config) {
    for text in COOKIE_TEXTS {
        let js = format!(
            r#"
            (() => {{
                const buttons = document.querySelectorAll('button');
                for (const btn of buttons) {{
                    if ((btn.textContent || '').includes("{}")) {{
                        btn.click();
                        return true;
                    }}
                }}
                return false;
            }})();
            "#,
            text.replace('"', "\\\"")
        );
        match session.evaluate(&js) {
            Ok(Some(serde_json::Value::Bool(true))) => {
                info!("cookies accepted via '{}' button", text);
                action_pause(cfg);
                return;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("cookie consent attempt failed: {}", e);
                return;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Pauses
// ---------------------------------------------------------------------------

fn sleep_in_range(range: (f64, f64)) {
    let secs = rand::thread_rng().gen_range(range.0..range.1);
    std::thread::sleep(Duration::from_millis((secs * 1000.0) as u64));
}

fn action_pause(cfg: &Config) {
    sleep_in_range(cfg.action_pause_range);
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

fn sanitize_query(query: &str) -> String {
    query
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .take(50)
        .collect()
}

/// Persist raw HTML and a screenshot according to the configured flags.
fn persist_artifacts(session: &BrowserSession, cfg: &Config, query: &str, html: &str, success: bool) {
    let keep = success || cfg.save_failed_results;
    let timestamp = chrono::Utc::now().timestamp();
    let stem = format!("{}_{}", sanitize_query(query), timestamp);

    if cfg.save_html && keep {
        let _ = std::fs::create_dir_all(&cfg.results_dir);
        let path = format!("{}/{}.html", cfg.results_dir, stem);
        match std::fs::write(&path, html) {
            Ok(()) => info!("html saved to {}", path),
            Err(e) => warn!("failed to save html: {}", e),
        }
    }

    if cfg.save_screenshots && keep {
        let _ = std::fs::create_dir_all(&cfg.screenshots_dir);
        let path = format!("{}/{}.png", cfg.screenshots_dir, stem);
        match session.screenshot(&path) {
            Ok(()) => info!("screenshot saved to {}", path),
            Err(e) => warn!("failed to save screenshot: {}", e),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

fn classify_automation_error(e: anyhow::Error) -> AcquireError {
    let msg = format!("{:#}", e);
    if msg.to_lowercase().contains("timeout") || msg.to_lowercase().contains("timed out") {
        AcquireError::NavigationTimeout(msg)
    } else {
        AcquireError::Automation(msg)
    }
}

/// Run the full acquisition pipeline for one query.
///
/// The session is torn down on every exit path: the browser, its tab and
/// the proxy auth extension are owned by this stack frame and released
/// when it unwinds, whichever branch was taken.
pub fn acquire(spec: &QuerySpec, cfg: &Config) -> PageOutcome {
    let lease = allocate_lease(cfg);
    let profile = StealthProfile::random(cfg);

    let session = match BrowserSession::start(cfg, profile, lease.as_ref()) {
        Ok(session) => session,
        Err(e) => {
            error!("session init failed: {:#}", e);
            return PageOutcome::Failure(AcquireError::SessionInit(format!("{:#}", e)));
        }
    };

    let outcome = run_steps(&session, spec, cfg);

    match &outcome {
        PageOutcome::Success { html } => persist_artifacts(&session, cfg, &spec.query, html, true),
        PageOutcome::Blocked { html, .. } => {
            persist_artifacts(&session, cfg, &spec.query, html, false)
        }
        PageOutcome::Failure(_) => {}
    }

    if spec.hold_secs > 0 {
        info!("holding session open for {}s", spec.hold_secs);
        std::thread::sleep(Duration::from_secs(spec.hold_secs));
    }

    session.close();
    outcome
}

fn run_steps(session: &BrowserSession, spec: &QuerySpec, cfg: &Config) -> PageOutcome {
    let url = build_search_url(spec);
    info!("search url: {}", url);

    if let Err(e) = session.navigate(&url) {
        error!("navigation failed: {:#}", e);
        return PageOutcome::Failure(classify_automation_error(e));
    }

    dismiss_geo_dialog(session, cfg);
    accept_cookies(session, cfg);

    // Let dynamic content finish rendering
    sleep_in_range(cfg.settle_pause_range);

    let html = match session.content() {
        Ok(html) => html,
        Err(e) => {
            error!("failed to read page content: {:#}", e);
            return PageOutcome::Failure(classify_automation_error(e));
        }
    };

    if is_blocked(&html) {
        warn!("captcha detected for query '{}'", spec.query);
        return PageOutcome::Blocked {
            html,
            reason: "captcha/automation-challenge detected".to_string(),
        };
    }

    info!("query '{}' acquired successfully", spec.query);
    PageOutcome::Success { html }
}

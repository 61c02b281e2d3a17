//! Runtime configuration, loaded once from the environment.
//!
//! All knobs mirror `.env` keys; sensible defaults are applied so the
//! service starts without a fully populated environment (proxying is the
//! exception: it is on by default but useless without PROXY_HOST).

use once_cell::sync::Lazy;
use std::env;

/// Global configuration instance
pub static CONFIG: Lazy<Config> = Lazy::new(Config::from_env);

#[derive(Debug, Clone)]
pub struct Config {
    // Proxy settings
    pub proxy_host: String,
    pub proxy_user: String,
    pub proxy_pass: String,
    pub proxy_port_min: u16,
    pub proxy_port_max: u16,
    pub use_proxy: bool,

    // Chrome settings
    pub headless: bool,
    pub page_load_timeout_secs: u64,

    // Artifact persistence
    pub results_dir: String,
    pub screenshots_dir: String,
    pub save_html: bool,
    pub save_screenshots: bool,
    pub save_failed_results: bool,

    // Success counter persistence
    pub counter_path: String,

    // Search defaults
    pub default_search_domain: String,
    pub default_results_count: u32,
    pub default_lang_interface: String,
    pub default_lang_location: String,

    // Pauses (seconds)
    pub settle_pause_range: (f64, f64),
    pub action_pause_range: (f64, f64),
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            proxy_host: env::var("PROXY_HOST").unwrap_or_default(),
            proxy_user: env::var("PROXY_USER").unwrap_or_default(),
            proxy_pass: env::var("PROXY_PASS").unwrap_or_default(),
            proxy_port_min: env_parse("PROXY_PORT_MIN", 10000),
            proxy_port_max: env_parse("PROXY_PORT_MAX", 10999),
            use_proxy: env_parse("USE_PROXY", true),
            headless: env_parse("HEADLESS", true),
            page_load_timeout_secs: env_parse("TIMEOUT_PAGE_LOAD", 30),
            results_dir: env::var("RESULTS_FOLDER").unwrap_or_else(|_| "results".to_string()),
            screenshots_dir: env::var("SCREENSHOTS_FOLDER")
                .unwrap_or_else(|_| "screenshots".to_string()),
            save_html: env_parse("SAVE_HTML", false),
            save_screenshots: env_parse("SAVE_SCREENSHOTS", false),
            save_failed_results: env_parse("SAVE_FAILED_RESULTS", true),
            counter_path: env::var("COUNTER_FILE")
                .unwrap_or_else(|_| "counter_data/success_counter.txt".to_string()),
            default_search_domain: env::var("DEFAULT_SEARCH_DOMAIN")
                .unwrap_or_else(|_| "google.com".to_string()),
            default_results_count: env_parse("DEFAULT_RESULTS_COUNT", 10),
            default_lang_interface: env::var("DEFAULT_LANG_INTERFACE")
                .unwrap_or_else(|_| "en".to_string()),
            default_lang_location: env::var("DEFAULT_LANG_LOCATION")
                .unwrap_or_else(|_| "us".to_string()),
            settle_pause_range: (2.0, 4.0),
            action_pause_range: (1.0, 2.0),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

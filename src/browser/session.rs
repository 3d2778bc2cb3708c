//! Browser session lifecycle.
//!
//! A session is one Chrome process with one tab and a randomly chosen
//! fingerprint (user agent and Accept-Language). Sessions are never repaired:
//! the orchestrator drops a broken one and opens a fresh one.
//! Launch failures are surfaced as-is; recycling policy lives with the caller.

use headless_chrome::protocol::cdp::Page;
use headless_chrome::{Browser, LaunchOptions};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use super::chrome::ChromePage;
use super::PageHandle;
use crate::config::BrowserConfig;

/// Hides the most common automation tells before any page script runs.
const STEALTH_SCRIPT: &str = r#"
Object.defineProperty(navigator, 'webdriver', { get: () => undefined });
window.chrome = window.chrome || { runtime: {} };
Object.defineProperty(navigator, 'plugins', { get: () => [1, 2, 3, 4, 5] });
"#;

/// Browser processes can sit idle for a long time between detail panes.
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to build Chrome launch options: {0}")]
    Options(String),

    #[error("Failed to launch Chrome: {0}")]
    Launch(String),

    #[error("Failed to prepare browser tab: {0}")]
    Tab(String),
}

/// The identity a session presents to the site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub user_agent: String,
    pub accept_language: String,
}

impl Fingerprint {
    /// Primary language tag, e.g. `en-US` from `en-US,en;q=0.9`.
    pub fn primary_language(&self) -> &str {
        self.accept_language
            .split(',')
            .next()
            .unwrap_or_default()
            .trim()
    }
}

/// Opens sessions for the orchestrator. `close` must never fail.
pub trait SessionFactory {
    type Page: PageHandle;

    fn open(&mut self) -> Result<Self::Page, SessionError>;

    fn close(&mut self, page: Self::Page) {
        drop(page);
    }
}

/// Launches headless_chrome sessions from the browser config.
pub struct ChromeSessions {
    config: BrowserConfig,
    headless: bool,
    proxy: Option<String>,
    rng: StdRng,
}

impl ChromeSessions {
    pub fn new(config: BrowserConfig, headless: bool, proxy: Option<String>) -> Self {
        Self {
            config,
            headless,
            proxy,
            rng: StdRng::from_entropy(),
        }
    }

    fn pick_fingerprint(&mut self) -> Fingerprint {
        pick_fingerprint(&self.config, &mut self.rng)
    }
}

impl SessionFactory for ChromeSessions {
    type Page = ChromePage;

    fn open(&mut self) -> Result<ChromePage, SessionError> {
        let fingerprint = self.pick_fingerprint();
        info!(
            "Launching browser: UA={} | Lang={} | Headless={}",
            fingerprint.user_agent, fingerprint.accept_language, self.headless
        );

        let args = launch_args(&fingerprint, self.proxy.as_deref(), &self.config.extra_args);
        let arg_refs: Vec<&OsStr> = args.iter().map(OsStr::new).collect();
        let chrome_path = resolve_chrome_path(self.config.chrome_path.as_deref());
        let sandbox = !is_container();
        debug!("Chrome path: {:?}, sandbox: {}", chrome_path, sandbox);

        let options = LaunchOptions::default_builder()
            .headless(self.headless)
            .sandbox(sandbox)
            .window_size(Some((self.config.window_width, self.config.window_height)))
            .path(chrome_path)
            .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
            .args(arg_refs)
            .build()
            .map_err(|e| SessionError::Options(e.to_string()))?;

        let browser = Browser::new(options).map_err(|e| SessionError::Launch(e.to_string()))?;
        let tab = browser.new_tab().map_err(|e| SessionError::Tab(e.to_string()))?;

        tab.set_user_agent(
            &fingerprint.user_agent,
            Some(&fingerprint.accept_language),
            None,
        )
        .map_err(|e| SessionError::Tab(e.to_string()))?;
        tab.call_method(Page::AddScriptToEvaluateOnNewDocument {
            source: STEALTH_SCRIPT.to_string(),
            world_name: None,
            include_command_line_api: None,
            run_immediately: None,
        })
        .map_err(|e| SessionError::Tab(e.to_string()))?;

        Ok(ChromePage::new(
            browser,
            tab,
            self.config.page_load_timeout(),
            self.config.script_timeout(),
        ))
    }
}

/// Random user agent and Accept-Language from the configured pools.
pub fn pick_fingerprint(config: &BrowserConfig, rng: &mut StdRng) -> Fingerprint {
    let user_agent = config
        .user_agents
        .choose(rng)
        .cloned()
        .unwrap_or_default();
    let accept_language = config
        .accept_languages
        .choose(rng)
        .cloned()
        .unwrap_or_default();
    Fingerprint {
        user_agent,
        accept_language,
    }
}

/// Chrome switches for a session: automation countermeasures, fingerprint, proxy.
pub fn launch_args(fingerprint: &Fingerprint, proxy: Option<&str>, extra: &[String]) -> Vec<String> {
    let mut args = vec![
        "--disable-blink-features=AutomationControlled".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-gpu".to_string(),
        "--disable-infobars".to_string(),
        "--blink-settings=imagesEnabled=true".to_string(),
        "--disable-features=Translate,IsolateOrigins,site-per-process".to_string(),
        format!("--user-agent={}", fingerprint.user_agent),
        format!("--accept-lang={}", fingerprint.accept_language),
        format!("--lang={}", fingerprint.primary_language()),
    ];
    if let Some(proxy) = proxy.filter(|p| !p.trim().is_empty()) {
        args.push(format!("--proxy-server={}", proxy.trim()));
    }
    args.extend(extra.iter().cloned());
    args
}

/// Containers usually lack the namespaces Chrome's sandbox needs.
fn is_container() -> bool {
    std::env::var("MAPHARVEST_CONTAINER").is_ok() || Path::new("/.dockerenv").exists()
}

/// Config value, then `CHROME_PATH`, then a WSL Windows install; otherwise let
/// headless_chrome find a binary on its own.
fn resolve_chrome_path(configured: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = configured {
        return Some(path.to_path_buf());
    }
    if let Ok(env_path) = std::env::var("CHROME_PATH") {
        if !env_path.trim().is_empty() {
            return Some(PathBuf::from(env_path));
        }
    }
    let wsl_path = Path::new("/mnt/c/Program Files/Google/Chrome/Application/chrome.exe");
    if wsl_path.exists() {
        return Some(wsl_path.to_path_buf());
    }
    None
}

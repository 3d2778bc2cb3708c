//! Configuration management for mapharvest
//!
//! All configuration is loaded from `./config/mapharvest.toml`.
//! The embedded template below is the single source of defaults for a fresh install;
//! optional sections fall back to serde defaults when omitted.

use serde::Deserialize;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration file path relative to working directory
pub const CONFIG_PATH: &str = "./config/mapharvest.toml";

/// Default configuration file content
pub const DEFAULT_CONFIG: &str = include_str!("../config/mapharvest.toml");

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found at {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] io::Error),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid URL in '{field}': {url}")]
    InvalidUrl { field: String, url: String },

    #[error("Configuration field '{field}' cannot be empty")]
    EmptyRequired { field: String },

    #[error("Invalid range for '{field}': {min} > {max}")]
    InvalidRange { field: String, min: String, max: String },

    #[error("Value {value} for '{field}' is outside {min}..={max}")]
    OutOfBounds { field: String, value: String, min: String, max: String },
}

/// A place never carries more photos than this, whatever the config says.
pub const MAX_PHOTOS_PER_PLACE: usize = 6;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub browser: BrowserConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub pagination: PaginationConfig,
    #[serde(default)]
    pub photos: PhotoConfig,
}

/// Browser fingerprint pools and launch parameters
#[derive(Debug, Clone, Deserialize)]
pub struct BrowserConfig {
    pub user_agents: Vec<String>,
    pub accept_languages: Vec<String>,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    #[serde(default = "default_page_load_timeout_secs")]
    pub page_load_timeout_secs: u64,
    #[serde(default = "default_script_timeout_secs")]
    pub script_timeout_secs: u64,
    /// Explicit Chrome binary; falls back to CHROME_PATH and well-known locations
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,
    /// Additional command-line switches passed to Chrome
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_window_width() -> u32 {
    1280
}

fn default_window_height() -> u32 {
    1000
}

fn default_page_load_timeout_secs() -> u64 {
    30
}

fn default_script_timeout_secs() -> u64 {
    20
}

impl BrowserConfig {
    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.page_load_timeout_secs)
    }

    pub fn script_timeout(&self) -> Duration {
        Duration::from_secs(self.script_timeout_secs)
    }
}

/// Search endpoint and locale pair
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_hl")]
    pub hl: String,
    #[serde(default = "default_gl")]
    pub gl: String,
}

fn default_base_url() -> String {
    "https://www.google.com/maps".to_string()
}

fn default_hl() -> String {
    "en".to_string()
}

fn default_gl() -> String {
    "eg".to_string()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            hl: default_hl(),
            gl: default_gl(),
        }
    }
}

/// Per-category harvesting policy
#[derive(Debug, Clone, Deserialize)]
pub struct HarvestConfig {
    /// Cap on persisted places per category
    #[serde(default = "default_max_places")]
    pub max_places: usize,
    /// Recycle the browser session after this many categories
    #[serde(default = "default_restart_every")]
    pub restart_every_categories: usize,
    #[serde(default = "default_navigation_tries")]
    pub navigation_tries: u32,
    #[serde(default = "default_navigation_cooldown_ms")]
    pub navigation_cooldown_ms: u64,
    /// How long to wait for a detail pane after clicking a card
    #[serde(default = "default_detail_wait_secs")]
    pub detail_wait_secs: u64,
    /// Below this name/slug similarity a record is flagged as a weak match
    #[serde(default = "default_similarity_threshold")]
    pub name_url_similarity_threshold: f64,
}

fn default_max_places() -> usize {
    500
}

fn default_restart_every() -> usize {
    1
}

fn default_navigation_tries() -> u32 {
    2
}

fn default_navigation_cooldown_ms() -> u64 {
    2500
}

fn default_detail_wait_secs() -> u64 {
    15
}

fn default_similarity_threshold() -> f64 {
    0.6
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            max_places: default_max_places(),
            restart_every_categories: default_restart_every(),
            navigation_tries: default_navigation_tries(),
            navigation_cooldown_ms: default_navigation_cooldown_ms(),
            detail_wait_secs: default_detail_wait_secs(),
            name_url_similarity_threshold: default_similarity_threshold(),
        }
    }
}

/// Scroll-to-load pagination tuning
#[derive(Debug, Clone, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,
    #[serde(default = "default_stall_rounds")]
    pub stall_rounds: u32,
    #[serde(default = "default_scroll_steps_min")]
    pub scroll_steps_min: u32,
    #[serde(default = "default_scroll_steps_max")]
    pub scroll_steps_max: u32,
    #[serde(default = "default_scroll_delta_min")]
    pub scroll_delta_min: i64,
    #[serde(default = "default_scroll_delta_max")]
    pub scroll_delta_max: i64,
    #[serde(default = "default_poll_window_min_secs")]
    pub poll_window_min_secs: f64,
    #[serde(default = "default_poll_window_max_secs")]
    pub poll_window_max_secs: f64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Scroll-height increase (px) that counts as growth
    #[serde(default = "default_growth_slack_px")]
    pub growth_slack_px: i64,
    /// Distance from the bottom (px) treated as "reached the end"
    #[serde(default = "default_bottom_slack_px")]
    pub bottom_slack_px: i64,
}

fn default_max_rounds() -> u32 {
    50
}

fn default_stall_rounds() -> u32 {
    3
}

fn default_scroll_steps_min() -> u32 {
    3
}

fn default_scroll_steps_max() -> u32 {
    6
}

fn default_scroll_delta_min() -> i64 {
    320
}

fn default_scroll_delta_max() -> i64 {
    800
}

fn default_poll_window_min_secs() -> f64 {
    5.5
}

fn default_poll_window_max_secs() -> f64 {
    8.0
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_growth_slack_px() -> i64 {
    12
}

fn default_bottom_slack_px() -> i64 {
    4
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            stall_rounds: default_stall_rounds(),
            scroll_steps_min: default_scroll_steps_min(),
            scroll_steps_max: default_scroll_steps_max(),
            scroll_delta_min: default_scroll_delta_min(),
            scroll_delta_max: default_scroll_delta_max(),
            poll_window_min_secs: default_poll_window_min_secs(),
            poll_window_max_secs: default_poll_window_max_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            growth_slack_px: default_growth_slack_px(),
            bottom_slack_px: default_bottom_slack_px(),
        }
    }
}

/// Photo collection limits
#[derive(Debug, Clone, Deserialize)]
pub struct PhotoConfig {
    #[serde(default = "default_max_photos")]
    pub max_photos: usize,
    #[serde(default = "default_gallery_timeout_secs")]
    pub gallery_timeout_secs: u64,
    #[serde(default = "default_inline_timeout_secs")]
    pub inline_timeout_secs: u64,
    /// Hosts an image URL must belong to
    #[serde(default = "default_image_hosts")]
    pub image_hosts: Vec<String>,
}

impl PhotoConfig {
    /// Effective per-place limit.
    pub fn limit(&self) -> usize {
        self.max_photos.min(MAX_PHOTOS_PER_PLACE)
    }
}

fn default_max_photos() -> usize {
    MAX_PHOTOS_PER_PLACE
}

fn default_gallery_timeout_secs() -> u64 {
    6
}

fn default_inline_timeout_secs() -> u64 {
    8
}

fn default_image_hosts() -> Vec<String> {
    vec!["googleusercontent.com".to_string(), "ggpht.com".to_string()]
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            max_photos: default_max_photos(),
            gallery_timeout_secs: default_gallery_timeout_secs(),
            inline_timeout_secs: default_inline_timeout_secs(),
            image_hosts: default_image_hosts(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the standard path
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_path(Path::new(CONFIG_PATH))
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate configuration text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Embedded defaults, used by tests and by `--init`
    pub fn embedded_default() -> Result<Self, ConfigError> {
        Self::from_toml_str(DEFAULT_CONFIG)
    }

    /// Validate all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.browser.user_agents.is_empty() || self.browser.user_agents.iter().any(|ua| ua.trim().is_empty()) {
            return Err(ConfigError::EmptyRequired {
                field: "browser.user_agents".to_string(),
            });
        }
        if self.browser.accept_languages.is_empty() || self.browser.accept_languages.iter().any(|l| l.trim().is_empty()) {
            return Err(ConfigError::EmptyRequired {
                field: "browser.accept_languages".to_string(),
            });
        }
        if self.browser.page_load_timeout_secs == 0 {
            return Err(ConfigError::EmptyRequired {
                field: "browser.page_load_timeout_secs".to_string(),
            });
        }

        if !self.search.base_url.starts_with("https://") && !self.search.base_url.starts_with("http://") {
            return Err(ConfigError::InvalidUrl {
                field: "search.base_url".to_string(),
                url: self.search.base_url.clone(),
            });
        }
        if self.search.hl.is_empty() {
            return Err(ConfigError::EmptyRequired { field: "search.hl".to_string() });
        }
        if self.search.gl.is_empty() {
            return Err(ConfigError::EmptyRequired { field: "search.gl".to_string() });
        }

        check_bounds("harvest.max_places", self.harvest.max_places, 1, usize::MAX)?;
        if self.harvest.navigation_tries == 0 {
            return Err(ConfigError::EmptyRequired {
                field: "harvest.navigation_tries".to_string(),
            });
        }

        let p = &self.pagination;
        check_range("pagination.scroll_steps", p.scroll_steps_min, p.scroll_steps_max)?;
        check_range("pagination.scroll_delta", p.scroll_delta_min, p.scroll_delta_max)?;
        check_range("pagination.poll_window_secs", p.poll_window_min_secs, p.poll_window_max_secs)?;
        if p.max_rounds == 0 {
            return Err(ConfigError::EmptyRequired {
                field: "pagination.max_rounds".to_string(),
            });
        }

        check_bounds("photos.max_photos", self.photos.max_photos, 1, MAX_PHOTOS_PER_PLACE)?;
        if self.photos.image_hosts.is_empty() {
            return Err(ConfigError::EmptyRequired {
                field: "photos.image_hosts".to_string(),
            });
        }

        Ok(())
    }

    /// Create default configuration file at the standard location
    pub fn create_default_config() -> Result<PathBuf, ConfigError> {
        let path = Path::new(CONFIG_PATH);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::File::create(path)?;
        file.write_all(DEFAULT_CONFIG.as_bytes())?;

        Ok(path.to_path_buf())
    }

    /// Check if stdin is a TTY (interactive terminal)
    pub fn is_interactive() -> bool {
        atty::is(atty::Stream::Stdin)
    }

    /// Prompt user to create default config (only in interactive mode)
    pub fn prompt_create_config() -> Result<Option<PathBuf>, ConfigError> {
        if !Self::is_interactive() {
            return Ok(None);
        }

        eprint!("Configuration file not found at {}. Create it with defaults? [Y/n] ", CONFIG_PATH);
        io::stderr().flush()?;

        let mut answer = String::new();
        io::stdin().read_line(&mut answer)?;
        let answer = answer.trim().to_lowercase();

        if answer.is_empty() || answer == "y" || answer == "yes" {
            Ok(Some(Self::create_default_config()?))
        } else {
            Ok(None)
        }
    }
}

fn check_range<T: PartialOrd + ToString>(field: &str, min: T, max: T) -> Result<(), ConfigError> {
    if min > max {
        return Err(ConfigError::InvalidRange {
            field: field.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        });
    }
    Ok(())
}

fn check_bounds<T: PartialOrd + ToString>(field: &str, value: T, min: T, max: T) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::OutOfBounds {
            field: field.to_string(),
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        });
    }
    Ok(())
}

//! Application configuration for dailypapers.
//!
//! User config lives at `~/.dailypapers/dailypapers.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DigestError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "dailypapers.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".dailypapers";

// ---------------------------------------------------------------------------
// Config structs (matching dailypapers.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Ranking source settings.
    #[serde(default)]
    pub source: SourceConfig,

    /// Interest topics.
    #[serde(default)]
    pub interests: InterestsConfig,

    /// Prioritization settings.
    #[serde(default)]
    pub plan: PlanConfig,

    /// Outbound API pacing.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Report generation and output.
    #[serde(default)]
    pub report: ReportConfig,

    /// Date resolution.
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

/// `[source]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Ranking site base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// arXiv category to collect.
    #[serde(default = "default_category")]
    pub category: String,

    /// Sort parameter; `1` is the readership ranking.
    #[serde(default = "default_sort")]
    pub sort: u32,

    /// Browserless-compatible endpoint for scripted rendering. Plain HTTP when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_endpoint: Option<String>,

    /// Name of the env var holding the render endpoint token (never store the token itself).
    #[serde(default = "default_render_token_env")]
    pub render_token_env: String,

    /// Seconds to wait for the first batch of entries.
    #[serde(default = "default_render_timeout")]
    pub render_timeout_secs: u64,

    /// Milliseconds to let the page settle after requesting more content.
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            category: default_category(),
            sort: default_sort(),
            render_endpoint: None,
            render_token_env: default_render_token_env(),
            render_timeout_secs: default_render_timeout(),
            settle_delay_ms: default_settle_delay(),
        }
    }
}

fn default_base_url() -> String {
    "https://papers.cool".into()
}
fn default_category() -> String {
    "cs.CL".into()
}
fn default_sort() -> u32 {
    1
}
fn default_render_token_env() -> String {
    "BROWSERLESS_TOKEN".into()
}
fn default_render_timeout() -> u64 {
    30
}
fn default_settle_delay() -> u64 {
    1500
}

/// `[interests]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterestsConfig {
    /// Comma-separated interest phrases.
    #[serde(default = "default_topics")]
    pub topics: String,
}

impl Default for InterestsConfig {
    fn default() -> Self {
        Self {
            topics: default_topics(),
        }
    }
}

fn default_topics() -> String {
    "agents,agentic memory,reinforcement learning,reasoning".into()
}

/// `[plan]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanConfig {
    /// Number of top-ranked papers that always get a detailed report.
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
        }
    }
}

fn default_top_n() -> usize {
    15
}

/// `[rate_limit]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Permits per window.
    #[serde(default = "default_requests")]
    pub requests: usize,

    /// Window length in seconds.
    #[serde(default = "default_window")]
    pub window_secs: u64,

    /// How long a report worker waits for a permit before giving up on its item.
    /// `0` means wait indefinitely.
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests: default_requests(),
            window_secs: default_window(),
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }
}

fn default_requests() -> usize {
    30
}
fn default_window() -> u64 {
    60
}
fn default_acquire_timeout() -> u64 {
    300
}

/// `[report]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Concurrent report workers.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Directory that receives `<date>/plan.json` and `<date>/digest.md`.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}
fn default_output_dir() -> String {
    "var/digests".into()
}

/// `[schedule]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// UTC offset (hours) used to resolve "yesterday" when no date is given.
    #[serde(default = "default_utc_offset")]
    pub utc_offset_hours: i32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: default_utc_offset(),
        }
    }
}

fn default_utc_offset() -> i32 {
    8
}

// ---------------------------------------------------------------------------
// Run config (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime pipeline configuration, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Ranking site base URL.
    pub base_url: String,
    /// Category identifier.
    pub category: String,
    /// Sort parameter.
    pub sort: u32,
    /// Parsed interest phrases.
    pub interests: Vec<String>,
    /// Number of top-ranked papers flagged for detail.
    pub top_n: usize,
    /// Permits per window.
    pub rate_limit_requests: usize,
    /// Rate-limit window.
    pub rate_limit_window: Duration,
    /// Per-item permit wait; `None` waits indefinitely.
    pub acquire_timeout: Option<Duration>,
    /// Concurrent report workers.
    pub report_concurrency: usize,
    /// Digest output root.
    pub output_dir: PathBuf,
    /// Wait for the first batch of entries.
    pub render_timeout: Duration,
    /// Settle delay between collection passes.
    pub settle_delay: Duration,
}

impl From<&AppConfig> for RunConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            base_url: config.source.base_url.clone(),
            category: config.source.category.clone(),
            sort: config.source.sort,
            interests: parse_interests(&config.interests.topics),
            top_n: config.plan.top_n,
            rate_limit_requests: config.rate_limit.requests,
            rate_limit_window: Duration::from_secs(config.rate_limit.window_secs),
            acquire_timeout: match config.rate_limit.acquire_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            report_concurrency: config.report.concurrency,
            output_dir: PathBuf::from(&config.report.output_dir),
            render_timeout: Duration::from_secs(config.source.render_timeout_secs),
            settle_delay: Duration::from_millis(config.source.settle_delay_ms),
        }
    }
}

impl RunConfig {
    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.top_n == 0 {
            return Err(DigestError::config("top_n must be a positive integer"));
        }
        if self.rate_limit_requests == 0 {
            return Err(DigestError::config("rate_limit.requests must be positive"));
        }
        if self.rate_limit_window.is_zero() {
            return Err(DigestError::config("rate_limit.window_secs must be positive"));
        }
        if self.report_concurrency == 0 {
            return Err(DigestError::config("report.concurrency must be positive"));
        }
        if self.category.trim().is_empty() {
            return Err(DigestError::config("source.category must not be empty"));
        }
        Ok(())
    }
}

/// Split a comma-separated interest string into trimmed, non-empty phrases.
pub fn parse_interests(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.dailypapers/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| DigestError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.dailypapers/dailypapers.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| DigestError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| DigestError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| DigestError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| DigestError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| DigestError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the render endpoint token from the configured env var, if any.
pub fn render_token(config: &AppConfig) -> Option<String> {
    std::env::var(&config.source.render_token_env)
        .ok()
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("papers.cool"));
        assert!(toml_str.contains("agentic memory"));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let toml_str = r#"
[source]
category = "cs.AI"

[plan]
top_n = 5
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.source.category, "cs.AI");
        assert_eq!(config.source.base_url, "https://papers.cool");
        assert_eq!(config.plan.top_n, 5);
        assert_eq!(config.rate_limit.requests, 30);
    }

    #[test]
    fn run_config_from_app_config() {
        let run = RunConfig::from(&AppConfig::default());
        assert_eq!(run.top_n, 15);
        assert_eq!(run.rate_limit_window, Duration::from_secs(60));
        assert_eq!(run.settle_delay, Duration::from_millis(1500));
        assert_eq!(
            run.interests,
            vec!["agents", "agentic memory", "reinforcement learning", "reasoning"]
        );
        assert!(run.validate().is_ok());
    }

    #[test]
    fn acquire_timeout_zero_waits_indefinitely() {
        let run = RunConfig::from(&AppConfig::default());
        assert_eq!(run.acquire_timeout, Some(Duration::from_secs(300)));

        let config: AppConfig = toml::from_str(
            r#"
[rate_limit]
acquire_timeout_secs = 0
"#,
        )
        .expect("parse");
        assert_eq!(RunConfig::from(&config).acquire_timeout, None);

        let config: AppConfig = toml::from_str(
            r#"
[rate_limit]
acquire_timeout_secs = 18446744073709551615
"#,
        )
        .expect("parse");
        assert_eq!(
            RunConfig::from(&config).acquire_timeout,
            Some(Duration::from_secs(u64::MAX))
        );
    }

    #[test]
    fn interests_are_trimmed_and_blank_items_dropped() {
        assert_eq!(
            parse_interests(" agents , ,tool use,"),
            vec!["agents".to_string(), "tool use".to_string()]
        );
        assert!(parse_interests("").is_empty());
    }

    #[test]
    fn zero_top_n_is_rejected() {
        let mut run = RunConfig::from(&AppConfig::default());
        run.top_n = 0;
        let err = run.validate().unwrap_err();
        assert!(err.to_string().contains("top_n"));
    }
}

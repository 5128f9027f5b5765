//! Shared types, error model, configuration, and call pacing for dailypapers.
//!
//! This crate is the foundation depended on by all other dailypapers crates.
//! It provides:
//! - [`DigestError`]: the unified error type
//! - Domain types ([`Document`], [`RankedEntry`], [`PlanItem`], [`RunId`])
//! - Configuration ([`AppConfig`], [`RunConfig`], config loading)
//! - [`RateLimiter`] and [`RetryPolicy`] for outbound calls

pub mod config;
pub mod error;
pub mod rate_limit;
pub mod retry;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, InterestsConfig, PlanConfig, RateLimitConfig, ReportConfig, RunConfig,
    ScheduleConfig, SourceConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, parse_interests, render_token,
};
pub use error::{DigestError, Result};
pub use rate_limit::RateLimiter;
pub use retry::RetryPolicy;
pub use types::{
    ARXIV_ABS_BASE, ARXIV_PDF_BASE, Document, PlanItem, PlanReason, RankedEntry, RunId,
};

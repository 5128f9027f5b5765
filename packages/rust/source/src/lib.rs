//! Ranked listing collection.
//!
//! This crate provides:
//! - [`transport`]: the [`RenderTransport`] seam plus HTTP and headless-browser transports
//! - [`parser`]: listing HTML → [`RankedEntry`](dailypapers_shared::RankedEntry) records
//! - [`collector`]: [`RankedSource`], the convergence-detecting collector

pub mod collector;
pub mod parser;
pub mod transport;

pub use collector::{CollectOptions, CollectOutcome, CollectState, Collection, RankedSource};
pub use parser::{ParsedListing, parse_listing};
pub use transport::{HeadlessTransport, RenderTransport, StaticTransport};

//! Metadata hydration for dailypapers.
//!
//! Turns bare paper identifiers into full [`Document`]s. The pipeline only
//! depends on [`MetadataSource`]; [`ArxivClient`] is the production
//! implementation backed by the arXiv export API.

pub mod client;
pub mod feed;

use std::future::Future;

use dailypapers_shared::{Document, Result};

pub use client::{ArxivClient, ArxivOptions};
pub use feed::{clean_paper_id, parse_feed};

/// Resolves identifiers to hydrated documents.
///
/// Implementations return what they could resolve. Identifiers the source
/// does not know, and batches that fail after retries, are simply absent
/// from the result; only a failure to do any work at all is an error.
pub trait MetadataSource: Send + Sync {
    fn fetch(&self, ids: &[String]) -> impl Future<Output = Result<Vec<Document>>> + Send;
}

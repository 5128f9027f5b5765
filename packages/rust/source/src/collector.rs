//! Incremental ranked-listing collector with convergence detection.
//!
//! The listing has no page count; more entries appear as the page is
//! scrolled. The collector keeps asking for more and re-parsing the full
//! rendered content until the entry count stops growing for
//! [`CollectOptions::stagnation_limit`] consecutive passes, or until the
//! [`CollectOptions::max_passes`] ceiling is reached.
//!
//! ```text
//! Idle → Loading → { Parsing ⇄ WaitingForMore } → Converged | Aborted
//! ```

use std::time::Duration;

use chrono::NaiveDate;
use dailypapers_shared::{DigestError, RankedEntry, Result};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::parser::{ParsedListing, parse_listing};
use crate::transport::{RenderTransport, parse_base_url};

// ---------------------------------------------------------------------------
// Options and results
// ---------------------------------------------------------------------------

/// Knobs for one collection run.
#[derive(Debug, Clone)]
pub struct CollectOptions {
    /// Consecutive passes without growth before the listing counts as converged.
    pub stagnation_limit: u32,
    /// Hard ceiling on parse passes.
    pub max_passes: u32,
    /// Pause after asking for more content.
    pub settle_delay: Duration,
    /// How long to wait for the first entries to render.
    pub render_timeout: Duration,
    /// Re-check interval while waiting for the first entries.
    pub poll_interval: Duration,
    /// Sort parameter appended to the listing URL.
    pub sort: u32,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            stagnation_limit: 3,
            max_passes: 50,
            settle_delay: Duration::from_millis(1500),
            render_timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(500),
            sort: 1,
        }
    }
}

/// Collector lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectState {
    Idle,
    Loading,
    Parsing,
    WaitingForMore,
    Converged,
    Aborted,
}

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectOutcome {
    /// The entry count stopped growing.
    Stagnated,
    /// The pass ceiling was hit first.
    PassCeiling,
    /// A transport failure ended the run; no entries are returned.
    Aborted(String),
}

/// Result of one collection run.
#[derive(Debug, Clone)]
pub struct Collection {
    /// Entries in published rank order. Empty when aborted.
    pub entries: Vec<RankedEntry>,
    /// How the run ended.
    pub outcome: CollectOutcome,
    /// Parse passes performed.
    pub passes: u32,
}

// ---------------------------------------------------------------------------
// RankedSource
// ---------------------------------------------------------------------------

/// Collects the full ranked listing for a (category, date) pair.
pub struct RankedSource<T: RenderTransport> {
    transport: T,
    base_url: Url,
    options: CollectOptions,
    state: CollectState,
}

impl<T: RenderTransport> RankedSource<T> {
    /// Create a collector over `transport` for the site at `base_url`.
    pub fn new(transport: T, base_url: &str, options: CollectOptions) -> Result<Self> {
        let base_url = parse_base_url(base_url, "source URL")?;

        Ok(Self {
            transport,
            base_url,
            options,
            state: CollectState::Idle,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CollectState {
        self.state
    }

    /// The transport, for inspection after a run.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Listing URL: `{base}/arxiv/{category}?date={date}&sort={sort}`.
    pub fn listing_url(&self, category: &str, date: NaiveDate) -> Result<Url> {
        let mut url = self
            .base_url
            .join(&format!("arxiv/{category}"))
            .map_err(|e| DigestError::validation(format!("invalid category '{category}': {e}")))?;

        url.query_pairs_mut()
            .append_pair("date", &date.format("%Y-%m-%d").to_string())
            .append_pair("sort", &self.options.sort.to_string());

        Ok(url)
    }

    /// Collect every ranked entry for `category` on `date`.
    ///
    /// Returns [`DigestError::SourceUnavailable`] when nothing renders in
    /// time or the source reports zero results. A transport failure at any
    /// point yields an empty list, never a partial one.
    pub async fn collect(&mut self, category: &str, date: NaiveDate) -> Result<Vec<RankedEntry>> {
        Ok(self.collect_run(category, date).await?.entries)
    }

    /// Like [`collect`](Self::collect), but reports how the run ended.
    #[instrument(skip_all, fields(category = %category, date = %date))]
    pub async fn collect_run(&mut self, category: &str, date: NaiveDate) -> Result<Collection> {
        let url = self.listing_url(category, date)?;
        info!(%url, "collecting ranked listing");

        match self.run(&url).await {
            Ok(collection) => {
                self.transition(CollectState::Converged);
                info!(
                    entries = collection.entries.len(),
                    passes = collection.passes,
                    outcome = ?collection.outcome,
                    "listing collection converged"
                );
                Ok(collection)
            }
            Err(DigestError::Transport(reason)) => {
                self.transition(CollectState::Aborted);
                warn!(%reason, "listing collection aborted, returning no entries");
                Ok(Collection {
                    entries: Vec::new(),
                    outcome: CollectOutcome::Aborted(reason),
                    passes: 0,
                })
            }
            Err(e) => {
                self.transition(CollectState::Aborted);
                Err(e)
            }
        }
    }

    async fn run(&mut self, url: &Url) -> Result<Collection> {
        self.transition(CollectState::Loading);
        let initial = self.transport.load(url).await?;
        let mut entries = self.await_first_batch(&initial).await?.entries;

        let mut last_count = 0;
        let mut stagnant = 0;
        let mut passes = 0;

        loop {
            self.transition(CollectState::Parsing);
            passes += 1;

            let count = entries.len();
            if count > last_count {
                last_count = count;
                stagnant = 0;
            } else {
                stagnant += 1;
            }

            info!(pass = passes, count, stagnant, "collection pass");

            if stagnant >= self.options.stagnation_limit {
                debug!(stagnant, "no growth, listing converged");
                return Ok(Collection {
                    entries,
                    outcome: CollectOutcome::Stagnated,
                    passes,
                });
            }
            if passes >= self.options.max_passes {
                warn!(passes, "pass ceiling reached before convergence");
                return Ok(Collection {
                    entries,
                    outcome: CollectOutcome::PassCeiling,
                    passes,
                });
            }

            self.transition(CollectState::WaitingForMore);
            self.transport.trigger_more().await?;
            tokio::time::sleep(self.options.settle_delay).await;

            let html = self.transport.current_content().await?;
            entries = parse_listing(&html).entries;
        }
    }

    /// Poll until the first entries render, the source reports an empty
    /// day, or the render timeout elapses.
    async fn await_first_batch(&mut self, initial: &str) -> Result<ParsedListing> {
        let deadline = Instant::now() + self.options.render_timeout;
        let mut listing = parse_listing(initial);

        loop {
            if !listing.entries.is_empty() {
                return Ok(listing);
            }
            if listing.reports_empty() {
                return Err(DigestError::SourceUnavailable(
                    "source reports zero results for this date".into(),
                ));
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(DigestError::SourceUnavailable(format!(
                    "no entries rendered within {:?}",
                    self.options.render_timeout
                )));
            }

            tokio::time::sleep(self.options.poll_interval.min(deadline - now)).await;
            let html = self.transport.current_content().await?;
            listing = parse_listing(&html);
        }
    }

    fn transition(&mut self, next: CollectState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, "collector state");
            self.state = next;
        }
    }
}

//! Ranked listing parser.
//!
//! Listing markup, one block per paper:
//! ```text
//! <div id="PAPER_ID" class="panel paper">
//!   <h2 class="title">
//!     <span class="index">#RANK</span>
//!     <a class="title-link">TITLE</a>
//!     <a class="title-pdf" data="PDF_URL">[PDF]</a>
//!   </h2>
//!   <p class="metainfo authors"><a class="author">..</a>..</p>
//!   <p class="summary">ABSTRACT</p>
//!   <p class="metainfo subjects"><a href="..">cs.CL</a>..</p>
//! </div>
//! ```
//! plus an optional `<p class="info">Total: N</p>` banner.

use std::collections::HashSet;
use std::sync::LazyLock;

use dailypapers_shared::{DigestError, RankedEntry, Result};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Everything one parse of the rendered listing yields.
#[derive(Debug, Clone, Default)]
pub struct ParsedListing {
    /// Well-formed entries in document order.
    pub entries: Vec<RankedEntry>,
    /// Total advertised by the info banner, if present.
    pub reported_total: Option<u32>,
    /// Entry blocks skipped as malformed or duplicate.
    pub skipped: usize,
}

impl ParsedListing {
    /// The source explicitly reports zero results for the date.
    pub fn reports_empty(&self) -> bool {
        self.entries.is_empty() && self.reported_total == Some(0)
    }
}

// ---------------------------------------------------------------------------
// Selectors and patterns (compiled once)
// ---------------------------------------------------------------------------

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid selector {css}: {e}"))
}

static PAPER_SEL: LazyLock<Selector> = LazyLock::new(|| selector("div.panel.paper"));
static INDEX_SEL: LazyLock<Selector> = LazyLock::new(|| selector("span.index"));
static TITLE_SEL: LazyLock<Selector> = LazyLock::new(|| selector("a.title-link"));
static PDF_SEL: LazyLock<Selector> = LazyLock::new(|| selector("a.title-pdf"));
static AUTHOR_SEL: LazyLock<Selector> = LazyLock::new(|| selector("p.authors a.author"));
static SUMMARY_SEL: LazyLock<Selector> = LazyLock::new(|| selector("p.summary"));
static SUBJECT_SEL: LazyLock<Selector> = LazyLock::new(|| selector("p.subjects a[href]"));
static INFO_SEL: LazyLock<Selector> = LazyLock::new(|| selector("p.info"));

/// Matches the `#N` rank marker.
static RANK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"#(\d+)").expect("rank regex"));

/// Matches `Total: N` in the info banner.
static TOTAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)total\s*:\s*(\d+)").expect("total regex"));

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse every entry currently present in the rendered listing.
///
/// Malformed blocks (no identifier or no title) are logged and skipped.
/// Ranks are strictly ascending in document order: a block whose marker is
/// missing, or not above every rank already assigned, takes the highest rank
/// so far + 1. A repeated identifier keeps its first occurrence.
pub fn parse_listing(html: &str) -> ParsedListing {
    let doc = Html::parse_document(html);
    let mut listing = ParsedListing {
        reported_total: reported_total(&doc),
        ..ParsedListing::default()
    };

    let mut seen: HashSet<String> = HashSet::new();
    let mut max_rank = 0;

    for block in doc.select(&PAPER_SEL) {
        match parse_entry(block, max_rank) {
            Ok(entry) => {
                if !seen.insert(entry.id.clone()) {
                    debug!(id = %entry.id, "duplicate entry in listing, keeping first");
                    listing.skipped += 1;
                    continue;
                }
                max_rank = entry.rank;
                listing.entries.push(entry);
            }
            Err(e) => {
                warn!(error = %e, "skipping listing entry");
                listing.skipped += 1;
            }
        }
    }

    debug!(
        entries = listing.entries.len(),
        skipped = listing.skipped,
        reported_total = ?listing.reported_total,
        "parsed listing"
    );

    listing
}

fn parse_entry(block: ElementRef<'_>, max_rank: u32) -> Result<RankedEntry> {
    let id = block
        .value()
        .attr("id")
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| DigestError::malformed("paper block without id attribute"))?
        .to_string();

    let title = first_text(block, &TITLE_SEL)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| DigestError::malformed(format!("paper {id} has no title")))?;

    let published = first_text(block, &INDEX_SEL).and_then(|text| {
        RANK_RE
            .captures(&text)
            .and_then(|caps| caps[1].parse::<u32>().ok())
    });

    let rank = match published {
        Some(rank) if rank > max_rank => rank,
        _ => {
            if published.is_some() {
                debug!(%id, ?published, max_rank, "rank marker out of order, reassigning");
            }
            max_rank
                .checked_add(1)
                .ok_or_else(|| DigestError::malformed(format!("paper {id}: rank overflow")))?
        }
    };

    let pdf_url = block
        .select(&PDF_SEL)
        .next()
        .and_then(|el| el.value().attr("data"))
        .map(str::trim)
        .filter(|data| !data.is_empty())
        .map(String::from);

    let authors = all_text(block, &AUTHOR_SEL);
    let summary = first_text(block, &SUMMARY_SEL).unwrap_or_default();
    let tags = all_text(block, &SUBJECT_SEL);

    Ok(RankedEntry {
        id,
        rank,
        title,
        authors,
        summary,
        tags,
        pdf_url,
    })
}

fn reported_total(doc: &Html) -> Option<u32> {
    doc.select(&INFO_SEL).find_map(|el| {
        let text = element_text(el);
        TOTAL_RE
            .captures(&text)
            .and_then(|caps| caps[1].parse::<u32>().ok())
    })
}

fn first_text(block: ElementRef<'_>, sel: &Selector) -> Option<String> {
    block.select(sel).next().map(element_text)
}

fn all_text(block: ElementRef<'_>, sel: &Selector) -> Vec<String> {
    block
        .select(sel)
        .map(element_text)
        .filter(|t| !t.is_empty())
        .collect()
}

/// Element text with whitespace runs collapsed.
fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

//! Merge rank order and interest order into one processing plan.

use std::collections::HashSet;

use dailypapers_shared::{Document, PlanItem, PlanReason, RankedEntry};
use tracing::{debug, info};

use crate::matcher::Match;

/// Build the deduplicated, densely ranked plan.
///
/// Precedence, first emission wins:
/// 1. the first `top_n` ranked entries (`TopRanked`, detailed)
/// 2. interest matches in score order (`InterestMatch`, detailed)
/// 3. the remaining ranked entries (`Standard`)
/// 4. hydrated documents that were neither ranked nor matched (`Standard`)
///
/// Identifiers missing from `hydrated` are dropped. `sequence_rank` is the
/// 1-based emission position.
pub fn prioritize(
    ranked: &[RankedEntry],
    hydrated: &[Document],
    matches: &[Match<'_>],
    top_n: usize,
) -> Vec<PlanItem> {
    let available: HashSet<&str> = hydrated.iter().map(|d| d.id.as_str()).collect();

    let mut by_rank: Vec<&RankedEntry> = ranked.iter().collect();
    by_rank.sort_by_key(|e| e.rank);

    let mut plan = PlanBuilder::new(&available);

    for entry in by_rank.iter().take(top_n) {
        plan.push(&entry.id, PlanReason::TopRanked);
    }

    for m in matches {
        plan.push(&m.document.id, PlanReason::InterestMatch);
    }

    for entry in by_rank.iter().skip(top_n) {
        plan.push(&entry.id, PlanReason::Standard);
    }

    for doc in hydrated {
        plan.push(&doc.id, PlanReason::Standard);
    }

    let items = plan.finish();
    info!(
        planned = items.len(),
        ranked = ranked.len(),
        hydrated = hydrated.len(),
        matched = matches.len(),
        top_n,
        "processing plan built"
    );
    items
}

struct PlanBuilder<'a> {
    available: &'a HashSet<&'a str>,
    seen: HashSet<String>,
    items: Vec<PlanItem>,
}

impl<'a> PlanBuilder<'a> {
    fn new(available: &'a HashSet<&'a str>) -> Self {
        Self {
            available,
            seen: HashSet::new(),
            items: Vec::new(),
        }
    }

    fn push(&mut self, id: &str, reason: PlanReason) {
        if !self.available.contains(id) {
            debug!(id, %reason, "not hydrated, dropping from plan");
            return;
        }
        if !self.seen.insert(id.to_string()) {
            return;
        }

        self.items.push(PlanItem {
            id: id.to_string(),
            sequence_rank: self.items.len() as u32 + 1,
            needs_detail: reason != PlanReason::Standard,
            reason,
        });
    }

    fn finish(self) -> Vec<PlanItem> {
        self.items
    }
}

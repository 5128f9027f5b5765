//! Core domain types for the discovery and prioritization pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Base URL for arXiv abstract pages.
pub const ARXIV_ABS_BASE: &str = "https://arxiv.org/abs";

/// Base URL for arXiv PDFs.
pub const ARXIV_PDF_BASE: &str = "https://arxiv.org/pdf";

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper identifying one pipeline run (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Hydrated paper metadata.
///
/// Immutable once hydrated; relevance scores are computed alongside it by the
/// keyword matcher rather than stored on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Identifier, unique within one source (e.g. `2501.12345`).
    pub id: String,
    /// Paper title.
    pub title: String,
    /// Ordered author list.
    #[serde(default)]
    pub authors: Vec<String>,
    /// Abstract / body text.
    #[serde(default)]
    pub summary: String,
    /// Category tags. Order carries no meaning.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Link to the PDF.
    pub pdf_url: String,
    /// Link to the abstract page.
    pub abs_url: String,
    /// Publication timestamp, when the metadata source reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published: Option<DateTime<Utc>>,
}

impl Document {
    /// Category tags joined into a single matchable field.
    pub fn joined_categories(&self) -> String {
        self.categories.join(" ")
    }
}

// ---------------------------------------------------------------------------
// RankedEntry
// ---------------------------------------------------------------------------

/// A paper as listed by the ranking source, with its published rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    /// Identifier taken from the entry's stable element key.
    pub id: String,
    /// 1-based rank as published by the source.
    pub rank: u32,
    /// Title as displayed in the listing.
    pub title: String,
    /// Authors as displayed in the listing.
    #[serde(default)]
    pub authors: Vec<String>,
    /// Abstract snippet as displayed in the listing.
    #[serde(default)]
    pub summary: String,
    /// Subject tags as displayed in the listing.
    #[serde(default)]
    pub tags: Vec<String>,
    /// PDF reference, if the listing carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_url: Option<String>,
}

impl RankedEntry {
    /// Abstract page URL for this entry.
    pub fn abs_url(&self) -> String {
        format!("{ARXIV_ABS_BASE}/{}", self.id)
    }

    /// PDF URL, falling back to the canonical arXiv location.
    pub fn pdf_url(&self) -> String {
        self.pdf_url
            .clone()
            .unwrap_or_else(|| format!("{ARXIV_PDF_BASE}/{}.pdf", self.id))
    }
}

// ---------------------------------------------------------------------------
// PlanItem
// ---------------------------------------------------------------------------

/// Why a document landed where it did in the processing plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanReason {
    /// Within the first `top_n` ranked entries.
    TopRanked,
    /// Matched a configured interest.
    InterestMatch,
    /// Everything else; basic summary only.
    Standard,
}

impl PlanReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TopRanked => "top_ranked",
            Self::InterestMatch => "interest_match",
            Self::Standard => "standard",
        }
    }
}

impl std::fmt::Display for PlanReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in the final processing order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanItem {
    /// Document identifier; unique across the plan.
    pub id: String,
    /// 1-based position in processing/display order. Not the source rank.
    pub sequence_rank: u32,
    /// Whether a detailed multi-section report is wanted.
    pub needs_detail: bool,
    /// Selection reason.
    pub reason: PlanReason,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::new();
        let parsed: RunId = id.to_string().parse().expect("parse RunId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn ranked_entry_pdf_fallback() {
        let entry = RankedEntry {
            id: "2501.00001".into(),
            rank: 1,
            title: "A".into(),
            authors: vec![],
            summary: String::new(),
            tags: vec![],
            pdf_url: None,
        };
        assert_eq!(entry.pdf_url(), "https://arxiv.org/pdf/2501.00001.pdf");
        assert_eq!(entry.abs_url(), "https://arxiv.org/abs/2501.00001");
    }

    #[test]
    fn plan_reason_serializes_snake_case() {
        let item = PlanItem {
            id: "x".into(),
            sequence_rank: 1,
            needs_detail: true,
            reason: PlanReason::InterestMatch,
        };
        let json = serde_json::to_string(&item).expect("serialize");
        assert!(json.contains("\"interest_match\""));
        let parsed: PlanItem = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, item);
    }
}

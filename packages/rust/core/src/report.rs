//! Per-item report generation over the processing plan.
//!
//! Each plan item is handed to a [`ReportGenerator`]: a detailed report when
//! `needs_detail` is set, the basic summary otherwise or as a fallback.
//! Items are processed on a bounded worker pool, each outbound call paced by
//! the shared [`RateLimiter`]. A failing item never affects its siblings.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dailypapers_shared::{DigestError, Document, PlanItem, RateLimiter, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::pipeline::ProgressReporter;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// One titled section of a detailed report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSection {
    pub heading: String,
    pub body: String,
}

impl ReportSection {
    pub fn new(heading: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            heading: heading.into(),
            body: body.into(),
        }
    }
}

/// What the generator produced for one paper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportBody {
    Detailed { sections: Vec<ReportSection> },
    Summary { text: String },
}

/// A plan item together with its document and generated report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedPaper {
    pub item: PlanItem,
    pub document: Document,
    pub report: ReportBody,
    /// A detailed report was wanted but the summary was used instead.
    pub fell_back: bool,
}

/// Detail-report collaborator.
pub trait ReportGenerator: Send + Sync + 'static {
    /// Structured multi-section report.
    fn detailed_report(
        &self,
        doc: &Document,
    ) -> impl Future<Output = Result<Vec<ReportSection>>> + Send;

    /// Short summary; also the fallback when the detailed report fails.
    fn basic_summary(&self, doc: &Document) -> impl Future<Output = Result<String>> + Send;
}

// ---------------------------------------------------------------------------
// MetadataReporter
// ---------------------------------------------------------------------------

/// Sentences kept by the basic summary.
const SUMMARY_SENTENCES: usize = 2;

/// Report generator that works from hydrated metadata alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataReporter;

impl ReportGenerator for MetadataReporter {
    async fn detailed_report(&self, doc: &Document) -> Result<Vec<ReportSection>> {
        if doc.summary.trim().is_empty() {
            return Err(DigestError::Report(format!("{} has no abstract", doc.id)));
        }

        let mut sections = vec![ReportSection::new("Overview", doc.summary.trim())];

        if !doc.authors.is_empty() {
            sections.push(ReportSection::new("Authors", doc.authors.join(", ")));
        }
        if !doc.categories.is_empty() {
            sections.push(ReportSection::new("Categories", doc.categories.join(", ")));
        }

        let mut links = format!("- Abstract: {}\n- PDF: {}", doc.abs_url, doc.pdf_url);
        if let Some(published) = doc.published {
            links.push_str(&format!("\n- Published: {}", published.format("%Y-%m-%d")));
        }
        sections.push(ReportSection::new("Links", links));

        Ok(sections)
    }

    async fn basic_summary(&self, doc: &Document) -> Result<String> {
        let text = first_sentences(&doc.summary, SUMMARY_SENTENCES);
        if text.is_empty() {
            return Err(DigestError::Report(format!("{} has no abstract", doc.id)));
        }
        Ok(text)
    }
}

/// The first `n` sentences of `text`, whitespace collapsed.
fn first_sentences(text: &str, n: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut end = collapsed.len();
    let mut found = 0;

    for (i, ch) in collapsed.char_indices() {
        if matches!(ch, '.' | '!' | '?') {
            let next = collapsed[i + ch.len_utf8()..].chars().next();
            if next.is_none_or(char::is_whitespace) {
                found += 1;
                if found == n {
                    end = i + ch.len_utf8();
                    break;
                }
            }
        }
    }

    collapsed[..end].to_string()
}

// ---------------------------------------------------------------------------
// Fan-out
// ---------------------------------------------------------------------------

/// Pool and pacing settings for [`generate_reports`].
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Items processed at once.
    pub concurrency: usize,
    /// Longest wait for a rate-limit permit per call; `None` waits forever.
    pub acquire_timeout: Option<Duration>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            acquire_timeout: Some(Duration::from_secs(300)),
        }
    }
}

/// Generate a report for every plan item that has a document.
///
/// Returns the processed papers in `sequence_rank` order. Items whose
/// detailed report and summary both fail are dropped.
#[instrument(skip_all, fields(items = plan.len(), concurrency = options.concurrency))]
pub async fn generate_reports<R: ReportGenerator>(
    plan: &[PlanItem],
    documents: &[Document],
    reporter: Arc<R>,
    limiter: Arc<RateLimiter>,
    options: &ReportOptions,
    progress: &dyn ProgressReporter,
) -> Result<Vec<ProcessedPaper>> {
    if options.concurrency == 0 {
        return Err(DigestError::validation("report concurrency must be at least 1"));
    }

    let by_id: HashMap<&str, &Document> = documents.iter().map(|d| (d.id.as_str(), d)).collect();
    let semaphore = Arc::new(Semaphore::new(options.concurrency));
    let mut tasks = JoinSet::new();

    for item in plan {
        let Some(document) = by_id.get(item.id.as_str()) else {
            warn!(id = %item.id, "plan item has no document, skipping");
            continue;
        };

        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| DigestError::Report(format!("worker pool closed: {e}")))?;

        let item = item.clone();
        let document = (*document).clone();
        let reporter = Arc::clone(&reporter);
        let limiter = Arc::clone(&limiter);
        let timeout = options.acquire_timeout;

        tasks.spawn(async move {
            let _permit = permit;
            process_item(item, document, reporter.as_ref(), &limiter, timeout).await
        });
    }

    let total = tasks.len();
    let mut finished = 0;
    let mut processed = Vec::with_capacity(total);
    while let Some(joined) = tasks.join_next().await {
        finished += 1;
        progress.item_done(finished, total);
        match joined {
            Ok(Some(paper)) => processed.push(paper),
            Ok(None) => {}
            Err(e) => error!(error = %e, "report task failed"),
        }
    }

    processed.sort_by_key(|p| p.item.sequence_rank);

    let fell_back = processed.iter().filter(|p| p.fell_back).count();
    info!(
        processed = processed.len(),
        dropped = plan.len() - processed.len(),
        fell_back,
        "report generation complete"
    );

    Ok(processed)
}

async fn process_item<R: ReportGenerator>(
    item: PlanItem,
    document: Document,
    reporter: &R,
    limiter: &RateLimiter,
    timeout: Option<Duration>,
) -> Option<ProcessedPaper> {
    if item.needs_detail {
        match paced(limiter, timeout, reporter.detailed_report(&document)).await {
            Ok(sections) => {
                debug!(id = %item.id, sections = sections.len(), "detailed report ready");
                return Some(ProcessedPaper {
                    item,
                    document,
                    report: ReportBody::Detailed { sections },
                    fell_back: false,
                });
            }
            Err(e) => {
                warn!(id = %item.id, error = %e, "detailed report failed, falling back to summary");
            }
        }
    }

    match paced(limiter, timeout, reporter.basic_summary(&document)).await {
        Ok(text) => {
            let fell_back = item.needs_detail;
            Some(ProcessedPaper {
                item,
                document,
                report: ReportBody::Summary { text },
                fell_back,
            })
        }
        Err(e) => {
            error!(id = %item.id, error = %e, "no report could be generated, dropping item");
            None
        }
    }
}

/// Wait for a permit, then run the call.
async fn paced<T>(
    limiter: &RateLimiter,
    timeout: Option<Duration>,
    call: impl Future<Output = Result<T>>,
) -> Result<T> {
    limiter.acquire(timeout).await?;
    call.await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SilentProgress;
    use dailypapers_shared::PlanReason;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn doc(id: &str, summary: &str) -> Document {
        Document {
            id: id.into(),
            title: format!("Paper {id}"),
            authors: vec!["Ada Lovelace".into()],
            summary: summary.into(),
            categories: vec!["cs.CL".into()],
            pdf_url: format!("https://arxiv.org/pdf/{id}.pdf"),
            abs_url: format!("https://arxiv.org/abs/{id}"),
            published: None,
        }
    }

    fn item(id: &str, seq: u32, needs_detail: bool) -> PlanItem {
        PlanItem {
            id: id.into(),
            sequence_rank: seq,
            needs_detail,
            reason: if needs_detail {
                PlanReason::TopRanked
            } else {
                PlanReason::Standard
            },
        }
    }

    fn limiter() -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new(100, Duration::from_secs(60)).unwrap())
    }

    /// Fails detailed reports for ids in `fail_detail`, summaries for ids in
    /// `fail_summary`.
    #[derive(Default)]
    struct ScriptedReporter {
        fail_detail: Vec<&'static str>,
        fail_summary: Vec<&'static str>,
        calls: AtomicUsize,
    }

    impl ReportGenerator for ScriptedReporter {
        async fn detailed_report(&self, doc: &Document) -> Result<Vec<ReportSection>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_detail.contains(&doc.id.as_str()) {
                return Err(DigestError::Report("detail failed".into()));
            }
            Ok(vec![ReportSection::new("Overview", doc.summary.clone())])
        }

        async fn basic_summary(&self, doc: &Document) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_summary.contains(&doc.id.as_str()) {
                return Err(DigestError::Report("summary failed".into()));
            }
            Ok(format!("summary of {}", doc.id))
        }
    }

    #[tokio::test]
    async fn detail_and_summary_per_flag() {
        let docs = vec![doc("a", "A."), doc("b", "B.")];
        let plan = vec![item("a", 1, true), item("b", 2, false)];

        let out = generate_reports(
            &plan,
            &docs,
            Arc::new(ScriptedReporter::default()),
            limiter(),
            &ReportOptions::default(),
            &SilentProgress,
        )
        .await
        .unwrap();

        assert_eq!(out.len(), 2);
        assert!(matches!(out[0].report, ReportBody::Detailed { .. }));
        assert_eq!(
            out[1].report,
            ReportBody::Summary {
                text: "summary of b".into()
            }
        );
    }

    #[tokio::test]
    async fn failures_fall_back_then_drop() {
        let docs = vec![doc("a", "A."), doc("b", "B."), doc("c", "C.")];
        let plan = vec![item("a", 1, true), item("b", 2, true), item("c", 3, false)];
        let reporter = Arc::new(ScriptedReporter {
            fail_detail: vec!["a", "b"],
            fail_summary: vec!["b"],
            ..ScriptedReporter::default()
        });

        let out = generate_reports(
            &plan,
            &docs,
            reporter,
            limiter(),
            &ReportOptions::default(),
            &SilentProgress,
        )
        .await
        .unwrap();

        let ids: Vec<&str> = out.iter().map(|p| p.item.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert!(out[0].fell_back);
        assert!(!out[1].fell_back);
    }

    #[tokio::test]
    async fn output_follows_sequence_rank() {
        let docs: Vec<Document> = (1..=8).map(|i| doc(&format!("p{i}"), "x.")).collect();
        let plan: Vec<PlanItem> = (1..=8)
            .rev()
            .map(|i| item(&format!("p{i}"), i, i % 2 == 0))
            .collect();

        let out = generate_reports(
            &plan,
            &docs,
            Arc::new(ScriptedReporter::default()),
            limiter(),
            &ReportOptions {
                concurrency: 3,
                acquire_timeout: None,
            },
            &SilentProgress,
        )
        .await
        .unwrap();

        let seq: Vec<u32> = out.iter().map(|p| p.item.sequence_rank).collect();
        assert_eq!(seq, (1..=8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn rate_limit_timeout_drops_item() {
        let docs = vec![doc("a", "A.")];
        let plan = vec![item("a", 1, true)];
        let exhausted = Arc::new(RateLimiter::new(1, Duration::from_secs(60)).unwrap());
        exhausted.acquire(None).await.unwrap();
        let reporter = Arc::new(ScriptedReporter::default());

        let out = generate_reports(
            &plan,
            &docs,
            Arc::clone(&reporter),
            exhausted,
            &ReportOptions {
                concurrency: 1,
                acquire_timeout: Some(Duration::ZERO),
            },
            &SilentProgress,
        )
        .await
        .unwrap();

        assert!(out.is_empty());
        assert_eq!(reporter.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn zero_concurrency_is_rejected() {
        let result = generate_reports(
            &[],
            &[],
            Arc::new(MetadataReporter),
            limiter(),
            &ReportOptions {
                concurrency: 0,
                acquire_timeout: None,
            },
            &SilentProgress,
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn metadata_reporter_sections() {
        let d = doc("a", "First sentence. Second one! Third?");
        let sections = MetadataReporter.detailed_report(&d).await.unwrap();
        let headings: Vec<&str> = sections.iter().map(|s| s.heading.as_str()).collect();
        assert_eq!(headings, vec!["Overview", "Authors", "Categories", "Links"]);

        let summary = MetadataReporter.basic_summary(&d).await.unwrap();
        assert_eq!(summary, "First sentence. Second one!");
    }

    #[tokio::test]
    async fn metadata_reporter_needs_abstract() {
        let d = doc("a", "   ");
        assert!(MetadataReporter.detailed_report(&d).await.is_err());
        assert!(MetadataReporter.basic_summary(&d).await.is_err());
    }

    #[test]
    fn first_sentences_ignores_inner_dots() {
        assert_eq!(
            first_sentences("We use v1.5 models. They work. More.", 2),
            "We use v1.5 models. They work."
        );
        assert_eq!(first_sentences("No terminator", 2), "No terminator");
    }
}

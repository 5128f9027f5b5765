//! End-to-end daily job: collect → hydrate → score → prioritize → report → digest.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Days, FixedOffset, NaiveDate, Utc};
use dailypapers_arxiv::MetadataSource;
use dailypapers_shared::{
    DigestError, Document, PlanItem, RankedEntry, RateLimiter, Result, RunConfig, RunId,
};
use dailypapers_source::{CollectOptions, RankedSource, RenderTransport};
use tracing::{Instrument, info, info_span, warn};

use crate::digest::{self, DigestMeta, DigestPaths};
use crate::matcher::KeywordMatcher;
use crate::prioritizer::prioritize;
use crate::report::{ReportGenerator, ReportOptions, generate_reports};

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called as each plan item finishes report generation.
    fn item_done(&self, current: usize, total: usize);
    /// Called when the run completes, including early returns.
    fn done(&self, outcome: &DailyOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item_done(&self, _current: usize, _total: usize) {}
    fn done(&self, _outcome: &DailyOutcome) {}
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Everything known once the plan is built.
#[derive(Debug, Clone)]
pub struct DailyPlan {
    pub date: NaiveDate,
    pub ranked: Vec<RankedEntry>,
    pub documents: Vec<Document>,
    /// Match scores keyed by document id; unmatched documents are absent.
    pub scores: HashMap<String, f64>,
    /// Compound interests found as whole phrases, keyed by document id.
    pub phrases: HashMap<String, Vec<String>>,
    pub plan: Vec<PlanItem>,
}

/// Result of [`build_plan`].
#[derive(Debug, Clone)]
pub enum PlanOutcome {
    Ready(DailyPlan),
    /// Nothing to process for this date; not an error. `collected` counts
    /// listing entries gathered before the run ended.
    NothingAvailable { reason: String, collected: usize },
}

/// How a daily run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DailyStatus {
    Completed,
    NothingAvailable(String),
}

/// Result of [`run_daily`].
#[derive(Debug, Clone)]
pub struct DailyOutcome {
    pub run_id: RunId,
    pub date: NaiveDate,
    pub status: DailyStatus,
    pub collected: usize,
    pub hydrated: usize,
    pub matched: usize,
    pub planned: usize,
    pub processed: usize,
    pub digest: Option<DigestPaths>,
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Collector options derived from the run config.
pub fn collect_options(config: &RunConfig) -> CollectOptions {
    CollectOptions {
        settle_delay: config.settle_delay,
        render_timeout: config.render_timeout,
        sort: config.sort,
        ..CollectOptions::default()
    }
}

/// Collect, hydrate, score and prioritize.
///
/// An unavailable source, an empty listing, or a hydration that resolves
/// nothing all end in [`PlanOutcome::NothingAvailable`].
pub async fn build_plan<T: RenderTransport, H: MetadataSource>(
    config: &RunConfig,
    source: &mut RankedSource<T>,
    hydrator: &H,
    date: NaiveDate,
    progress: &dyn ProgressReporter,
) -> Result<PlanOutcome> {
    config.validate()?;

    // --- Phase 1: Collect ---
    progress.phase("Collecting ranked listing");
    let ranked = match source.collect(&config.category, date).await {
        Ok(entries) if entries.is_empty() => {
            return Ok(PlanOutcome::NothingAvailable {
                reason: "ranked listing returned no entries".into(),
                collected: 0,
            });
        }
        Ok(entries) => entries,
        Err(DigestError::SourceUnavailable(reason)) => {
            return Ok(PlanOutcome::NothingAvailable {
                reason,
                collected: 0,
            });
        }
        Err(e) => return Err(e),
    };

    // --- Phase 2: Hydrate ---
    progress.phase("Fetching paper metadata");
    let ids: Vec<String> = ranked.iter().map(|e| e.id.clone()).collect();
    let documents = hydrator.fetch(&ids).await?;
    if documents.is_empty() {
        return Ok(PlanOutcome::NothingAvailable {
            reason: format!("metadata hydration resolved none of {} papers", ids.len()),
            collected: ranked.len(),
        });
    }
    if documents.len() < ids.len() {
        warn!(
            requested = ids.len(),
            hydrated = documents.len(),
            "partial metadata hydration"
        );
    }

    // --- Phase 3: Score ---
    progress.phase("Matching interests");
    let matcher = KeywordMatcher::new(&config.interests);
    let matches = matcher.find_matches(&documents);
    let scores: HashMap<String, f64> = matches
        .iter()
        .map(|m| (m.document.id.clone(), m.score))
        .collect();
    let phrases: HashMap<String, Vec<String>> = matches
        .iter()
        .filter_map(|m| {
            let mut found: Vec<String> = Vec::new();
            for field in [&m.document.title, &m.document.summary] {
                for phrase in matcher.matched_phrases(field) {
                    if !found.iter().any(|f| f == phrase) {
                        found.push(phrase.to_string());
                    }
                }
            }
            (!found.is_empty()).then(|| (m.document.id.clone(), found))
        })
        .collect();

    // --- Phase 4: Prioritize ---
    progress.phase("Building processing plan");
    let plan = prioritize(&ranked, &documents, &matches, config.top_n);

    Ok(PlanOutcome::Ready(DailyPlan {
        date,
        ranked,
        documents,
        scores,
        phrases,
        plan,
    }))
}

/// Run the full daily job for `date` and write its digest.
pub async fn run_daily<T, H, R>(
    config: &RunConfig,
    source: &mut RankedSource<T>,
    hydrator: &H,
    reporter: Arc<R>,
    date: NaiveDate,
    progress: &dyn ProgressReporter,
) -> Result<DailyOutcome>
where
    T: RenderTransport,
    H: MetadataSource,
    R: ReportGenerator,
{
    let run_id = RunId::new();
    let span = info_span!("run_daily", %run_id, %date, category = %config.category);

    async move {
        let start = Instant::now();
        info!("starting daily run");

        let daily = match build_plan(config, source, hydrator, date, progress).await? {
            PlanOutcome::Ready(daily) => daily,
            PlanOutcome::NothingAvailable { reason, collected } => {
                info!(%reason, collected, "nothing to process, ending run");
                let outcome = DailyOutcome {
                    run_id,
                    date,
                    status: DailyStatus::NothingAvailable(reason),
                    collected,
                    hydrated: 0,
                    matched: 0,
                    planned: 0,
                    processed: 0,
                    digest: None,
                    elapsed: start.elapsed(),
                };
                progress.done(&outcome);
                return Ok(outcome);
            }
        };

        // --- Phase 5: Reports ---
        progress.phase("Generating reports");
        let limiter = Arc::new(RateLimiter::new(
            config.rate_limit_requests,
            config.rate_limit_window,
        )?);
        let options = ReportOptions {
            concurrency: config.report_concurrency,
            acquire_timeout: config.acquire_timeout,
        };
        let papers = generate_reports(
            &daily.plan,
            &daily.documents,
            reporter,
            limiter,
            &options,
            progress,
        )
        .await?;

        // --- Phase 6: Digest ---
        progress.phase("Writing digest");
        let meta = DigestMeta {
            run_id: run_id.clone(),
            date,
            category: config.category.clone(),
            interests: config.interests.clone(),
            generated_at: Utc::now(),
        };
        let records = digest::plan_records(
            &daily.plan,
            &daily.documents,
            &daily.scores,
            &daily.phrases,
        );
        let paths = digest::write_digest(&config.output_dir, &meta, &records, &papers)?;

        let outcome = DailyOutcome {
            run_id,
            date,
            status: DailyStatus::Completed,
            collected: daily.ranked.len(),
            hydrated: daily.documents.len(),
            matched: daily.scores.len(),
            planned: daily.plan.len(),
            processed: papers.len(),
            digest: Some(paths),
            elapsed: start.elapsed(),
        };

        progress.done(&outcome);
        info!(
            collected = outcome.collected,
            hydrated = outcome.hydrated,
            matched = outcome.matched,
            planned = outcome.planned,
            processed = outcome.processed,
            elapsed_ms = outcome.elapsed.as_millis(),
            "daily run complete"
        );

        Ok(outcome)
    }
    .instrument(span)
    .await
}

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

/// The date to process: `date` if given (`YYYY-MM-DD`), otherwise
/// yesterday at the given UTC offset.
pub fn resolve_target_date(date: Option<&str>, utc_offset_hours: i32) -> Result<NaiveDate> {
    match date {
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|e| {
            DigestError::validation(format!("invalid date '{raw}' (expected YYYY-MM-DD): {e}"))
        }),
        None => yesterday_at(Utc::now(), utc_offset_hours),
    }
}

fn yesterday_at(now: DateTime<Utc>, utc_offset_hours: i32) -> Result<NaiveDate> {
    let offset = utc_offset_hours
        .checked_mul(3600)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| {
            DigestError::config(format!("invalid UTC offset: {utc_offset_hours} hours"))
        })?;

    now.with_timezone(&offset)
        .date_naive()
        .checked_sub_days(Days::new(1))
        .ok_or_else(|| DigestError::validation("date out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::MetadataReporter;
    use dailypapers_shared::{AppConfig, PlanReason, RetryPolicy};
    use dailypapers_source::StaticTransport;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Serves a fixed document set, resolving only ids it knows.
    struct FixedHydrator(Vec<Document>);

    impl MetadataSource for FixedHydrator {
        async fn fetch(&self, ids: &[String]) -> Result<Vec<Document>> {
            Ok(self
                .0
                .iter()
                .filter(|d| ids.contains(&d.id))
                .cloned()
                .collect())
        }
    }

    fn doc(id: &str, title: &str, summary: &str) -> Document {
        Document {
            id: id.into(),
            title: title.into(),
            authors: vec!["Someone".into()],
            summary: summary.into(),
            categories: vec!["cs.CL".into()],
            pdf_url: format!("https://arxiv.org/pdf/{id}.pdf"),
            abs_url: format!("https://arxiv.org/abs/{id}"),
            published: None,
        }
    }

    fn hydrator() -> FixedHydrator {
        FixedHydrator(vec![
            doc(
                "2501.00001",
                "Agentic Memory for Long-Horizon Agents",
                "We study memory architectures for language agents.",
            ),
            doc("2501.00002", "Scaling Laws for Tokenizers", "Vocabulary size matters."),
            doc(
                "2501.00003",
                "Reinforcement Learning from Verifier Feedback",
                "Policy optimization with programmatic verifiers improves reasoning.",
            ),
            doc("2501.00004", "A Survey of Machine Translation Metrics", "We survey metrics."),
        ])
    }

    fn run_config(server: &MockServer, output: &std::path::Path) -> RunConfig {
        let mut config = RunConfig::from(&AppConfig::default());
        config.base_url = server.uri();
        config.interests = vec!["agentic memory".into(), "reinforcement learning".into()];
        config.top_n = 1;
        config.settle_delay = Duration::from_millis(1);
        config.render_timeout = Duration::from_millis(50);
        config.output_dir = output.to_path_buf();
        config
    }

    fn source(config: &RunConfig) -> RankedSource<StaticTransport> {
        let transport = StaticTransport::new().unwrap().with_retry(RetryPolicy::none());
        RankedSource::new(transport, &config.base_url, collect_options(config)).unwrap()
    }

    async fn listing_server(body: &str, status: u16) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/arxiv/cs.CL"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&server)
            .await;
        server
    }

    fn temp_dir() -> std::path::PathBuf {
        std::env::temp_dir().join(format!("dp-pipeline-test-{}", RunId::new()))
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 2).unwrap()
    }

    #[tokio::test]
    async fn full_run_writes_digest() {
        let html = std::fs::read_to_string("../../../fixtures/html/listing-full.html").unwrap();
        let server = listing_server(&html, 200).await;
        let tmp = temp_dir();
        let config = run_config(&server, &tmp);
        let mut source = source(&config);

        let outcome = run_daily(
            &config,
            &mut source,
            &hydrator(),
            Arc::new(MetadataReporter),
            date(),
            &SilentProgress,
        )
        .await
        .unwrap();

        assert_eq!(outcome.status, DailyStatus::Completed);
        assert_eq!(outcome.collected, 5);
        assert_eq!(outcome.hydrated, 4);
        assert_eq!(outcome.planned, 4);
        assert_eq!(outcome.processed, 4);

        let paths = outcome.digest.unwrap();
        assert_eq!(paths.dir, tmp.join("2025-01-02"));
        let md = std::fs::read_to_string(&paths.markdown).unwrap();
        assert!(md.contains("Agentic Memory for Long-Horizon Agents"));

        std::fs::remove_dir_all(&tmp).ok();
    }

    #[tokio::test]
    async fn plan_orders_top_ranked_then_matches() {
        let html = std::fs::read_to_string("../../../fixtures/html/listing-full.html").unwrap();
        let server = listing_server(&html, 200).await;
        let config = run_config(&server, &temp_dir());
        let mut source = source(&config);

        let outcome = build_plan(&config, &mut source, &hydrator(), date(), &SilentProgress)
            .await
            .unwrap();
        let PlanOutcome::Ready(daily) = outcome else {
            panic!("expected a plan");
        };

        let plan: Vec<(&str, PlanReason)> =
            daily.plan.iter().map(|p| (p.id.as_str(), p.reason)).collect();
        assert_eq!(
            plan,
            vec![
                ("2501.00001", PlanReason::TopRanked),
                ("2501.00003", PlanReason::InterestMatch),
                ("2501.00002", PlanReason::Standard),
                ("2501.00004", PlanReason::Standard),
            ]
        );
        assert!(daily.scores.contains_key("2501.00001"));
        assert!(!daily.scores.contains_key("2501.00002"));
        assert_eq!(daily.phrases["2501.00001"], vec!["agentic memory"]);
        assert_eq!(daily.phrases["2501.00003"], vec!["reinforcement learning"]);
        assert!(!daily.phrases.contains_key("2501.00002"));
    }

    #[tokio::test]
    async fn unresolved_hydration_keeps_collected_count() {
        let html = std::fs::read_to_string("../../../fixtures/html/listing-full.html").unwrap();
        let server = listing_server(&html, 200).await;
        let tmp = temp_dir();
        let config = run_config(&server, &tmp);
        let mut source = source(&config);

        let outcome = run_daily(
            &config,
            &mut source,
            &FixedHydrator(Vec::new()),
            Arc::new(MetadataReporter),
            date(),
            &SilentProgress,
        )
        .await
        .unwrap();

        assert!(matches!(outcome.status, DailyStatus::NothingAvailable(_)));
        assert_eq!(outcome.collected, 5);
        assert_eq!(outcome.hydrated, 0);
        assert!(outcome.digest.is_none());
    }

    #[tokio::test]
    async fn empty_day_ends_cleanly() {
        let html = std::fs::read_to_string("../../../fixtures/html/listing-empty.html").unwrap();
        let server = listing_server(&html, 200).await;
        let tmp = temp_dir();
        let config = run_config(&server, &tmp);
        let mut source = source(&config);

        let outcome = run_daily(
            &config,
            &mut source,
            &hydrator(),
            Arc::new(MetadataReporter),
            date(),
            &SilentProgress,
        )
        .await
        .unwrap();

        assert!(matches!(outcome.status, DailyStatus::NothingAvailable(_)));
        assert!(outcome.digest.is_none());
        assert!(!tmp.exists());
    }

    #[tokio::test]
    async fn transport_failure_ends_cleanly() {
        let server = listing_server("", 500).await;
        let config = run_config(&server, &temp_dir());
        let mut source = source(&config);

        let outcome = build_plan(&config, &mut source, &hydrator(), date(), &SilentProgress)
            .await
            .unwrap();
        assert!(matches!(outcome, PlanOutcome::NothingAvailable { collected: 0, .. }));
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let server = MockServer::start().await;
        let mut config = run_config(&server, &temp_dir());
        config.top_n = 0;
        let mut source = source(&config);

        let result = build_plan(&config, &mut source, &hydrator(), date(), &SilentProgress).await;
        assert!(matches!(result, Err(DigestError::Config { .. })));
    }

    #[test]
    fn explicit_date_is_parsed() {
        assert_eq!(resolve_target_date(Some("2025-01-02"), 8).unwrap(), date());
        assert!(resolve_target_date(Some("01/02/2025"), 8).is_err());
    }

    #[test]
    fn yesterday_respects_offset() {
        let now = DateTime::parse_from_rfc3339("2025-01-02T20:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(yesterday_at(now, 8).unwrap(), date());
        assert_eq!(
            yesterday_at(now, 0).unwrap(),
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
        );
        assert!(yesterday_at(now, 30).is_err());
    }
}

//! Discovery and prioritization core for dailypapers.
//!
//! Scores hydrated papers against interests ([`matcher`]), merges rank and
//! interest order into a processing plan ([`prioritizer`]), fans the plan
//! out to a report generator ([`report`]), and writes the daily digest
//! ([`digest`]). [`pipeline`] drives the whole job end to end.

pub mod digest;
pub mod matcher;
pub mod pipeline;
pub mod prioritizer;
pub mod report;

pub use matcher::{KeywordMatcher, Match};
pub use pipeline::{
    DailyOutcome, DailyPlan, DailyStatus, PlanOutcome, ProgressReporter, SilentProgress,
    build_plan, collect_options, resolve_target_date, run_daily,
};
pub use prioritizer::prioritize;
pub use report::{
    MetadataReporter, ProcessedPaper, ReportBody, ReportGenerator, ReportOptions, ReportSection,
    generate_reports,
};

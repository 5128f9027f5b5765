//! Digest writer.
//!
//! Lays out one directory per target date:
//! ```text
//! <output_dir>/<YYYY-MM-DD>/
//! ├── plan.json    processing plan with reasons and match scores
//! └── digest.md    rendered reports in plan order
//! ```

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDate, Utc};
use dailypapers_shared::{DigestError, Document, PlanItem, PlanReason, Result, RunId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::report::{ProcessedPaper, ReportBody};

/// Run-level facts recorded alongside the digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestMeta {
    pub run_id: RunId,
    pub date: NaiveDate,
    pub category: String,
    pub interests: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

/// One row of `plan.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRecord {
    pub sequence_rank: u32,
    pub id: String,
    pub title: String,
    pub reason: PlanReason,
    pub needs_detail: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Compound interests matched as whole phrases.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub matched_phrases: Vec<String>,
}

/// Contents of `plan.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanFile {
    #[serde(flatten)]
    pub meta: DigestMeta,
    pub items: Vec<PlanRecord>,
}

/// Where a digest landed.
#[derive(Debug, Clone)]
pub struct DigestPaths {
    pub dir: PathBuf,
    pub plan: PathBuf,
    pub markdown: PathBuf,
}

/// Join plan items with titles, match scores and matched phrases for `plan.json`.
pub fn plan_records(
    plan: &[PlanItem],
    documents: &[Document],
    scores: &HashMap<String, f64>,
    phrases: &HashMap<String, Vec<String>>,
) -> Vec<PlanRecord> {
    let titles: HashMap<&str, &str> = documents
        .iter()
        .map(|d| (d.id.as_str(), d.title.as_str()))
        .collect();

    plan.iter()
        .map(|item| PlanRecord {
            sequence_rank: item.sequence_rank,
            id: item.id.clone(),
            title: titles.get(item.id.as_str()).copied().unwrap_or_default().to_string(),
            reason: item.reason,
            needs_detail: item.needs_detail,
            score: scores.get(&item.id).copied(),
            matched_phrases: phrases.get(&item.id).cloned().unwrap_or_default(),
        })
        .collect()
}

/// Write `plan.json` and `digest.md` under `<output_dir>/<date>/`.
///
/// Rewriting the same date replaces both files.
#[instrument(skip_all, fields(date = %meta.date, items = records.len(), papers = papers.len()))]
pub fn write_digest(
    output_dir: &Path,
    meta: &DigestMeta,
    records: &[PlanRecord],
    papers: &[ProcessedPaper],
) -> Result<DigestPaths> {
    let dir = output_dir.join(meta.date.format("%Y-%m-%d").to_string());
    std::fs::create_dir_all(&dir).map_err(|e| DigestError::io(&dir, e))?;

    let plan_file = PlanFile {
        meta: meta.clone(),
        items: records.to_vec(),
    };
    let json = serde_json::to_string_pretty(&plan_file)
        .map_err(|e| DigestError::validation(format!("JSON serialization failed: {e}")))?;

    let plan = dir.join("plan.json");
    write_atomic(&plan, &json)?;

    let markdown = dir.join("digest.md");
    write_atomic(&markdown, &render_markdown(meta, papers))?;

    info!(path = %dir.display(), "digest written");

    Ok(DigestPaths {
        dir,
        plan,
        markdown,
    })
}

/// Render processed papers as Markdown, in the order given.
pub fn render_markdown(meta: &DigestMeta, papers: &[ProcessedPaper]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Daily Papers: {} ({})", meta.category, meta.date);
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Generated {} | run `{}` | {} papers",
        meta.generated_at.format("%Y-%m-%d %H:%M UTC"),
        meta.run_id,
        papers.len()
    );
    if !meta.interests.is_empty() {
        let _ = writeln!(out, "\nInterests: {}", meta.interests.join(", "));
    }

    let (detailed, brief): (Vec<&ProcessedPaper>, Vec<&ProcessedPaper>) = papers
        .iter()
        .partition(|p| matches!(p.report, ReportBody::Detailed { .. }));

    if !detailed.is_empty() {
        let _ = writeln!(out, "\n## Highlights");
        for paper in detailed {
            render_paper(&mut out, paper);
        }
    }

    if !brief.is_empty() {
        let _ = writeln!(out, "\n## More Papers");
        for paper in brief {
            render_paper(&mut out, paper);
        }
    }

    out
}

fn render_paper(out: &mut String, paper: &ProcessedPaper) {
    let doc = &paper.document;
    let _ = writeln!(out, "\n### {}. {}", paper.item.sequence_rank, doc.title);
    let _ = writeln!(out);
    if !doc.authors.is_empty() {
        let _ = writeln!(out, "*{}*", doc.authors.join(", "));
        let _ = writeln!(out);
    }
    let _ = writeln!(
        out,
        "`{}` | [abs]({}) | [pdf]({})",
        paper.item.reason, doc.abs_url, doc.pdf_url
    );

    match &paper.report {
        ReportBody::Detailed { sections } => {
            for section in sections {
                let _ = writeln!(out, "\n#### {}\n\n{}", section.heading, section.body);
            }
        }
        ReportBody::Summary { text } => {
            let _ = writeln!(out, "\n{text}");
        }
    }
}

fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&temp, content).map_err(|e| DigestError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| DigestError::io(path, e))?;

    debug!(path = %path.display(), size = content.len(), "wrote file");
    Ok(())
}

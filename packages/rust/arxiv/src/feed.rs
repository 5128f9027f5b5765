//! arXiv Atom response parsing.

use std::sync::LazyLock;

use dailypapers_shared::{ARXIV_ABS_BASE, ARXIV_PDF_BASE, DigestError, Document, Result};
use feed_rs::model::{Entry, Link};
use regex::Regex;
use tracing::{debug, warn};

/// Trailing version suffix on an arXiv identifier (`2501.00001v2`).
static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)v\d+$").expect("version regex"));

/// Path marker separating the host from the identifier in entry ids.
const ABS_MARKER: &str = "/abs/";

/// Strip any URL prefix and version suffix from an arXiv identifier.
///
/// `http://arxiv.org/abs/2501.00001v2` and `2501.00001v2` both become
/// `2501.00001`. Old-style identifiers (`hep-th/9901001v1`) keep their
/// archive prefix.
pub fn clean_paper_id(raw: &str) -> String {
    let raw = raw.trim();
    let id = match raw.find(ABS_MARKER) {
        Some(pos) => &raw[pos + ABS_MARKER.len()..],
        None => raw,
    };

    match VERSION_RE.captures(id) {
        Some(caps) => caps[1].to_string(),
        None => id.to_string(),
    }
}

/// Parse an export API response into documents, in response order.
///
/// Error entries (the API reports bad identifiers as entries under
/// `/api/errors`) are logged and skipped.
pub fn parse_feed(bytes: &[u8]) -> Result<Vec<Document>> {
    let feed = feed_rs::parser::parse(bytes)
        .map_err(|e| DigestError::parse(format!("arXiv response is not a valid feed: {e}")))?;

    let mut documents = Vec::with_capacity(feed.entries.len());
    for entry in feed.entries {
        if !entry.id.contains(ABS_MARKER) {
            let detail = entry
                .summary
                .as_ref()
                .map(|s| collapse(&s.content))
                .unwrap_or_default();
            warn!(id = %entry.id, %detail, "arXiv returned an error entry");
            continue;
        }

        match entry_to_document(entry) {
            Some(doc) => documents.push(doc),
            None => debug!("skipping arXiv entry without a title"),
        }
    }

    Ok(documents)
}

fn entry_to_document(entry: Entry) -> Option<Document> {
    let id = clean_paper_id(&entry.id);
    let title = entry
        .title
        .as_ref()
        .map(|t| collapse(&t.content))
        .filter(|t| !t.is_empty())?;

    let summary = entry
        .summary
        .as_ref()
        .map(|s| collapse(&s.content))
        .unwrap_or_default();

    let authors = entry
        .authors
        .iter()
        .map(|p| collapse(&p.name))
        .filter(|name| !name.is_empty())
        .collect();

    let categories = entry
        .categories
        .iter()
        .map(|c| c.term.trim().to_string())
        .filter(|term| !term.is_empty())
        .collect();

    let pdf_url = entry
        .links
        .iter()
        .find(|link| is_pdf_link(link))
        .map(|link| link.href.clone())
        .unwrap_or_else(|| format!("{ARXIV_PDF_BASE}/{id}.pdf"));

    let abs_url = entry
        .links
        .iter()
        .find(|link| link.rel.as_deref() == Some("alternate"))
        .map(|link| link.href.clone())
        .unwrap_or_else(|| format!("{ARXIV_ABS_BASE}/{id}"));

    Some(Document {
        id,
        title,
        authors,
        summary,
        categories,
        pdf_url,
        abs_url,
        published: entry.published,
    })
}

fn is_pdf_link(link: &Link) -> bool {
    link.title.as_deref() == Some("pdf")
        || link
            .media_type
            .as_deref()
            .is_some_and(|t| t.eq_ignore_ascii_case("application/pdf"))
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load_fixture(name: &str) -> Vec<u8> {
        let path = format!("../../../fixtures/atom/{name}");
        std::fs::read(&path).unwrap_or_else(|_| panic!("missing fixture: {path}"))
    }

    #[test]
    fn clean_paper_id_strips_prefix_and_version() {
        assert_eq!(clean_paper_id("http://arxiv.org/abs/2501.00001v2"), "2501.00001");
        assert_eq!(clean_paper_id("2501.00001v12"), "2501.00001");
        assert_eq!(clean_paper_id("2501.00001"), "2501.00001");
        assert_eq!(clean_paper_id("http://arxiv.org/abs/hep-th/9901001v1"), "hep-th/9901001");
    }

    #[test]
    fn parse_fixture_batch() {
        let docs = parse_feed(&load_fixture("arxiv-batch.xml")).unwrap();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["2501.00001", "2501.00002", "2501.00003"]);

        let first = &docs[0];
        assert_eq!(first.title, "Agentic Memory for Long-Horizon Agents");
        assert_eq!(
            first.summary,
            "We study memory architectures for language agents that operate over long horizons."
        );
        assert_eq!(first.authors, vec!["Ada Lovelace", "Alan Turing"]);
        assert_eq!(first.categories, vec!["cs.CL", "cs.AI"]);
        assert_eq!(first.pdf_url, "http://arxiv.org/pdf/2501.00001v2");
        assert_eq!(first.abs_url, "http://arxiv.org/abs/2501.00001v2");
        assert!(first.published.is_some());
    }

    #[test]
    fn missing_pdf_link_falls_back() {
        let docs = parse_feed(&load_fixture("arxiv-batch.xml")).unwrap();
        assert_eq!(docs[2].pdf_url, "https://arxiv.org/pdf/2501.00003.pdf");
    }

    #[test]
    fn error_entries_are_skipped() {
        let docs = parse_feed(&load_fixture("arxiv-error.xml")).unwrap();
        assert!(docs.is_empty());
    }

    #[test]
    fn garbage_is_a_parse_error() {
        let err = parse_feed(b"definitely not xml").unwrap_err();
        assert!(matches!(err, DigestError::Parse { .. }));
    }
}

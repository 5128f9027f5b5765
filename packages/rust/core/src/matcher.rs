//! Weighted keyword matching of documents against interest phrases.
//!
//! Scoring is a pure function of the document and the matcher; nothing is
//! written back onto the document, so repeated scoring is idempotent and
//! safe to run across batches in parallel.

use std::collections::BTreeSet;

use dailypapers_shared::Document;
use regex::Regex;
use tracing::{debug, info};

/// Weight applied to the title field score.
pub const TITLE_WEIGHT: f64 = 3.0;
/// Weight applied to the abstract field score.
pub const ABSTRACT_WEIGHT: f64 = 2.0;
/// Weight applied to the joined category tags.
pub const CATEGORY_WEIGHT: f64 = 1.0;

/// Flat bonus per field for an exact multi-word interest match.
const COMPOUND_BONUS: f64 = 1.0;

/// A document paired with its relevance score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match<'a> {
    pub document: &'a Document,
    pub score: f64,
}

/// Multi-word interest compiled for word-boundary phrase matching.
#[derive(Debug)]
struct CompoundPhrase {
    interest: String,
    pattern: Regex,
}

/// Scores documents against a fixed set of interests.
#[derive(Debug)]
pub struct KeywordMatcher {
    interests: Vec<String>,
    keywords: BTreeSet<String>,
    compounds: Vec<CompoundPhrase>,
}

impl KeywordMatcher {
    /// Build the keyword set once for the given interests.
    ///
    /// Interests are lowercased, trimmed and whitespace-collapsed; empty and
    /// repeated interests are dropped.
    pub fn new<S: AsRef<str>>(interests: &[S]) -> Self {
        let mut normalized: Vec<String> = Vec::with_capacity(interests.len());
        for raw in interests {
            let interest = normalize(raw.as_ref());
            if !interest.is_empty() && !normalized.contains(&interest) {
                normalized.push(interest);
            }
        }

        let keywords: BTreeSet<String> = normalized.iter().flat_map(|i| variants(i)).collect();

        let compounds = normalized
            .iter()
            .filter(|i| i.contains(' ') || i.contains('-'))
            .filter_map(|i| compile_compound(i))
            .collect();

        info!(
            interests = normalized.len(),
            keywords = keywords.len(),
            "initialized keyword matcher"
        );
        debug!(?keywords, "expanded keywords");

        Self {
            interests: normalized,
            keywords,
            compounds,
        }
    }

    /// Normalized interests, in configuration order.
    pub fn interests(&self) -> &[String] {
        &self.interests
    }

    /// The expanded keyword set.
    pub fn keywords(&self) -> &BTreeSet<String> {
        &self.keywords
    }

    /// Weighted relevance of `doc`. Zero means no match.
    pub fn score(&self, doc: &Document) -> f64 {
        self.field_score(&doc.title) * TITLE_WEIGHT
            + self.field_score(&doc.summary) * ABSTRACT_WEIGHT
            + self.field_score(&doc.joined_categories()) * CATEGORY_WEIGHT
    }

    /// Unweighted score of a single field: distinct keywords present as
    /// substrings, plus one per compound interest matched as a whole phrase.
    pub fn field_score(&self, text: &str) -> f64 {
        if text.is_empty() {
            return 0.0;
        }

        let lower = text.to_lowercase();
        let hits = self
            .keywords
            .iter()
            .filter(|kw| lower.contains(kw.as_str()))
            .count();

        let bonus = self
            .compounds
            .iter()
            .filter(|c| c.pattern.is_match(&lower))
            .count();

        hits as f64 + bonus as f64 * COMPOUND_BONUS
    }

    /// Documents with a positive score, best first. Ties keep input order.
    pub fn find_matches<'a>(&self, docs: &'a [Document]) -> Vec<Match<'a>> {
        let mut matches: Vec<Match<'a>> = docs
            .iter()
            .filter_map(|document| {
                let score = self.score(document);
                (score > 0.0).then_some(Match { document, score })
            })
            .collect();

        // sort_by is stable
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));

        for m in &matches {
            debug!(id = %m.document.id, score = m.score, "document matched");
        }
        info!(matched = matches.len(), total = docs.len(), "keyword matching complete");

        matches
    }

    /// The best `n` matches.
    pub fn top_matches<'a>(&self, docs: &'a [Document], n: usize) -> Vec<Match<'a>> {
        let mut matches = self.find_matches(docs);
        matches.truncate(n);
        matches
    }

    /// Compound interests that match `text` as whole phrases.
    pub fn matched_phrases(&self, text: &str) -> Vec<&str> {
        let lower = text.to_lowercase();
        self.compounds
            .iter()
            .filter(|c| c.pattern.is_match(&lower))
            .map(|c| c.interest.as_str())
            .collect()
    }
}

fn normalize(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Original form, its hyphen/space swap, and its singular/plural twin.
fn variants(interest: &str) -> Vec<String> {
    let mut out = vec![interest.to_string()];

    if interest.contains(' ') {
        out.push(interest.replace(' ', "-"));
    } else if interest.contains('-') {
        out.push(interest.replace('-', " "));
    }

    out.push(number_twin(interest));
    out
}

/// Flip the grammatical number of the final word.
fn number_twin(word: &str) -> String {
    let consonant_y = word.len() > 1
        && word.ends_with('y')
        && !word[..word.len() - 1].ends_with(['a', 'e', 'i', 'o', 'u']);

    if let Some(stem) = word.strip_suffix("ies").filter(|s| !s.is_empty()) {
        format!("{stem}y")
    } else if ["sses", "xes", "zes", "ches", "shes"]
        .iter()
        .any(|suffix| word.ends_with(suffix))
    {
        word[..word.len() - 2].to_string()
    } else if word.ends_with("ss") {
        format!("{word}es")
    } else if let Some(stem) = word.strip_suffix('s').filter(|s| !s.is_empty()) {
        stem.to_string()
    } else if consonant_y {
        format!("{}ies", &word[..word.len() - 1])
    } else if ["x", "z", "ch", "sh"].iter().any(|suffix| word.ends_with(suffix)) {
        format!("{word}es")
    } else {
        format!("{word}s")
    }
}

fn compile_compound(interest: &str) -> Option<CompoundPhrase> {
    let mut forms = vec![
        interest.to_string(),
        interest.replace(' ', "-"),
        interest.replace('-', " "),
    ];
    forms.sort();
    forms.dedup();

    let alternation = forms
        .iter()
        .map(|f| regex::escape(f))
        .collect::<Vec<_>>()
        .join("|");

    match Regex::new(&format!(r"(?i)\b(?:{alternation})\b")) {
        Ok(pattern) => Some(CompoundPhrase {
            interest: interest.to_string(),
            pattern,
        }),
        Err(e) => {
            debug!(interest, error = %e, "skipping compound phrase");
            None
        }
    }
}

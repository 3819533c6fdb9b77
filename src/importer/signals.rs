// src/importer/signals.rs
//! Requirement signal rules: a fixed table of case-insensitive patterns that
//! indicate a source references a given IRB requirement.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

/// Highlights kept per rule across a whole import.
pub const MAX_HIGHLIGHTS_PER_RULE: usize = 3;
/// Highlights contributed by a single source.
pub const MAX_HIGHLIGHTS_PER_SOURCE: usize = 2;

#[derive(Debug)]
pub struct RequirementRule {
    pub id: &'static str,
    pub label: &'static str,
    pub patterns: Vec<Regex>,
    pub weight: f64,
    pub summary: &'static str,
}

fn rule(
    id: &'static str,
    label: &'static str,
    patterns: &[&str],
    weight: f64,
    summary: &'static str,
) -> RequirementRule {
    RequirementRule {
        id,
        label,
        patterns: patterns
            .iter()
            .map(|p| Regex::new(&format!("(?i){p}")).expect("requirement rule regex"))
            .collect(),
        weight,
        summary,
    }
}

pub static REQUIREMENT_RULES: Lazy<Vec<RequirementRule>> = Lazy::new(|| {
    vec![
        rule(
            "review_categories",
            "Review Category Definitions",
            &[r"\bexempt\b", r"\bexpedited\b", r"\bfull[\s-]?board\b"],
            0.12,
            "Review categories (exempt/expedited/full board) are referenced.",
        ),
        rule(
            "training",
            "Human Subjects Training",
            &[r"\bciti\b", r"human subjects training", r"research ethics training"],
            0.11,
            "Research training requirement language detected.",
        ),
        rule(
            "consent_template",
            "Consent Template/Process",
            &[r"\bconsent\b", r"\binformed consent\b", r"consent template"],
            0.10,
            "Consent requirements/templates are referenced.",
        ),
        rule(
            "recruitment_materials",
            "Recruitment Materials",
            &[r"\brecruitment\b", r"recruitment script", r"participant invitation"],
            0.08,
            "Recruitment material requirements are referenced.",
        ),
        rule(
            "survey_instrument",
            "Survey/Instrument Attachment",
            &[
                r"survey instrument",
                r"questionnaire",
                r"interview guide",
                r"focus group guide",
            ],
            0.09,
            "Study instrument attachment requirements are referenced.",
        ),
        rule(
            "privacy_data_security",
            "Privacy/Data Security",
            &[
                r"data security",
                r"confidentiality",
                r"data retention",
                r"encryption",
            ],
            0.10,
            "Data confidentiality/security requirements are referenced.",
        ),
        rule(
            "education_records",
            "Education Records / FERPA",
            &[r"\bferpa\b", r"education records", r"student records"],
            0.08,
            "FERPA or education-record references are detected.",
        ),
        rule(
            "minors_assent",
            "Minors / Assent",
            &[r"\bminor(s)?\b", r"parental permission", r"\bassent\b"],
            0.08,
            "Minor participant requirements are referenced.",
        ),
        rule(
            "hipaa_health_data",
            "HIPAA / Health Data",
            &[r"\bhipaa\b", r"protected health information", r"\bphi\b"],
            0.05,
            "Health-data/HIPAA language is referenced.",
        ),
    ]
});

pub fn find_rule(id: &str) -> Option<&'static RequirementRule> {
    REQUIREMENT_RULES.iter().find(|r| r.id == id)
}

/// Every rule id mapped to zero.
pub fn empty_hits() -> BTreeMap<&'static str, usize> {
    REQUIREMENT_RULES.iter().map(|r| (r.id, 0)).collect()
}

/// Non-overlapping matches per rule, summed over the rule's patterns.
pub fn score(text: &str) -> BTreeMap<&'static str, usize> {
    if text.is_empty() {
        return empty_hits();
    }
    REQUIREMENT_RULES
        .iter()
        .map(|r| {
            let n = r.patterns.iter().map(|p| p.find_iter(text).count()).sum();
            (r.id, n)
        })
        .collect()
}

static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));
static RE_SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]\s+").expect("sentence regex"));

/// Whitespace-collapsed sentences, split after terminal punctuation.
pub fn sentences(text: &str) -> Vec<String> {
    let flat = RE_WS.replace_all(text, " ");
    let flat = flat.trim();
    if flat.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::new();
    let mut start = 0;
    for m in RE_SENTENCE_END.find_iter(flat) {
        // keep the punctuation, drop the whitespace
        let end = m.start() + 1;
        let s = flat[start..end].trim();
        if !s.is_empty() {
            out.push(s.to_string());
        }
        start = m.end();
    }
    let tail = flat[start..].trim();
    if !tail.is_empty() {
        out.push(tail.to_string());
    }
    out
}

/// Up to `max` sentences matching any of the rule's patterns, earliest first.
pub fn highlights(text: &str, rule_id: &str, max: usize) -> Vec<String> {
    let Some(rule) = find_rule(rule_id) else {
        return Vec::new();
    };
    let mut out: Vec<String> = Vec::new();
    for s in sentences(text) {
        if out.len() >= max {
            break;
        }
        if rule.patterns.iter().any(|p| p.is_match(&s)) && !out.contains(&s) {
            out.push(s);
        }
    }
    out
}

/// One entry of the `signals` list.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SignalSummary {
    pub id: String,
    pub label: String,
    pub evidence_count: usize,
    pub summary: String,
    pub highlights: Vec<String>,
}

/// Aggregates hit counts and highlights across all sources of one import.
#[derive(Debug, Clone)]
pub struct SignalAccumulator {
    hits: BTreeMap<&'static str, usize>,
    highlights: BTreeMap<&'static str, Vec<String>>,
}

impl Default for SignalAccumulator {
    fn default() -> Self {
        Self {
            hits: empty_hits(),
            highlights: REQUIREMENT_RULES.iter().map(|r| (r.id, Vec::new())).collect(),
        }
    }
}

impl SignalAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score one source's text, fold it into the totals, and return that
    /// source's own hits.
    pub fn add_source(&mut self, text: &str) -> BTreeMap<&'static str, usize> {
        let hits = score(text);
        for (&id, &count) in &hits {
            *self.hits.entry(id).or_insert(0) += count;
            if count == 0 {
                continue;
            }
            let kept = self.highlights.entry(id).or_default();
            if kept.len() >= MAX_HIGHLIGHTS_PER_RULE {
                continue;
            }
            for sentence in highlights(text, id, MAX_HIGHLIGHTS_PER_SOURCE) {
                if !kept.contains(&sentence) {
                    kept.push(sentence);
                }
                if kept.len() >= MAX_HIGHLIGHTS_PER_RULE {
                    break;
                }
            }
        }
        hits
    }

    pub fn hits(&self) -> &BTreeMap<&'static str, usize> {
        &self.hits
    }

    pub fn triggered(&self) -> impl Iterator<Item = &'static RequirementRule> + '_ {
        REQUIREMENT_RULES
            .iter()
            .filter(move |r| self.hits.get(r.id).copied().unwrap_or(0) > 0)
    }

    /// Rules with at least one hit, in rule-table order.
    pub fn summaries(&self) -> Vec<SignalSummary> {
        self.triggered()
            .map(|r| SignalSummary {
                id: r.id.to_string(),
                label: r.label.to_string(),
                evidence_count: self.hits[r.id],
                summary: r.summary.to_string(),
                highlights: self
                    .highlights
                    .get(r.id)
                    .map(|h| h.iter().take(MAX_HIGHLIGHTS_PER_RULE).cloned().collect())
                    .unwrap_or_default(),
            })
            .collect()
    }

    pub fn triggered_weight(&self) -> f64 {
        self.triggered().map(|r| r.weight).sum()
    }
}

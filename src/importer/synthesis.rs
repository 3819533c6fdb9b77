// src/importer/synthesis.rs
//! Confidence score and warnings, derived only from observable counters.
//!
//! The score says how useful the draft is likely to be. It is not a
//! probability of correctness and never reaches 1.0.

pub const CONFIDENCE_BASE: f64 = 0.22;
pub const FETCH_SUCCESS_BONUS: f64 = 0.24;
pub const SIGNAL_WEIGHT_CAP: f64 = 0.42;
pub const FAILURE_MAJORITY_PENALTY: f64 = 0.08;
pub const NO_SIGNAL_PENALTY: f64 = 0.05;
pub const CONFIDENCE_FLOOR: f64 = 0.08;
pub const CONFIDENCE_CEILING: f64 = 0.93;

pub const WARN_NOTHING_FETCHED: &str =
    "No source pages were successfully fetched. Draft profile uses fallback assumptions.";
pub const WARN_NO_SIGNALS: &str =
    "No strong requirement signals detected from sources; verify manually.";
pub const WARN_DOCUMENT_VERSIONS: &str =
    "Document links were detected but may not be the latest official form versions.";
pub const WARN_VALIDATE_DRAFT: &str = "Imported profile is a best-effort draft and must be validated against your institution's official IRB office instructions.";

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ImportCounters {
    pub fetched: usize,
    pub failed: usize,
    pub signals: usize,
    pub document_links: usize,
}

/// `triggered_weight` is the summed weight of rules with at least one hit.
pub fn confidence(c: &ImportCounters, triggered_weight: f64) -> f64 {
    let mut score = CONFIDENCE_BASE;
    if c.fetched > 0 {
        score += FETCH_SUCCESS_BONUS;
    }
    if c.signals > 0 {
        score += triggered_weight.clamp(0.0, SIGNAL_WEIGHT_CAP);
    }
    if c.failed > c.fetched {
        score -= FAILURE_MAJORITY_PENALTY;
    }
    if c.signals == 0 {
        score -= NO_SIGNAL_PENALTY;
    }
    round2(score.clamp(CONFIDENCE_FLOOR, CONFIDENCE_CEILING))
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn warnings(c: &ImportCounters) -> Vec<String> {
    let mut out = Vec::new();
    if c.fetched == 0 {
        out.push(WARN_NOTHING_FETCHED.to_string());
    }
    if c.failed > 0 {
        out.push(format!(
            "{} source requests failed; requirements may be incomplete.",
            c.failed
        ));
    }
    if c.signals == 0 {
        out.push(WARN_NO_SIGNALS.to_string());
    }
    if c.document_links > 0 {
        out.push(WARN_DOCUMENT_VERSIONS.to_string());
    }
    out.push(WARN_VALIDATE_DRAFT.to_string());
    out
}

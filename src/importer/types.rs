// src/importer/types.rs
use serde::Serialize;
use std::collections::BTreeMap;

use crate::importer::extract::ExtractionError;
use crate::importer::fetch::FetchError;

/// How a candidate URL was discovered. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceType {
    /// Supplied by the caller (IRB page or organization website).
    Explicit,
    /// Likely IRB path under a known or guessed host.
    GuessedPath,
    /// Scraped from a web search results page.
    SearchResult,
    /// Policy text pasted into the request.
    InlineText,
    /// PDF linked from an already fetched page.
    LinkedDocument,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceStatus {
    Unfetched,
    Fetched,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SourceState {
    Unfetched,
    Fetched {
        text: String,
        links: Vec<String>,
        extraction_error: Option<ExtractionError>,
    },
    Failed {
        error: FetchError,
    },
}

/// One attempted (or inline) source document.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDoc {
    pub url: String,
    pub source_type: SourceType,
    pub http_status: Option<u16>,
    pub content_type: String,
    pub title: String,
    pub state: SourceState,
}

pub const INLINE_SOURCE_URL: &str = "inline://raw_policy_text";

impl SourceDoc {
    pub fn candidate(url: impl Into<String>, source_type: SourceType) -> Self {
        Self {
            url: url.into(),
            source_type,
            http_status: None,
            content_type: String::new(),
            title: String::new(),
            state: SourceState::Unfetched,
        }
    }

    /// Pasted policy text. Already fetched; never goes through the network.
    pub fn inline_text(org_name: &str, text: &str, max_chars: usize) -> Self {
        Self {
            url: INLINE_SOURCE_URL.to_string(),
            source_type: SourceType::InlineText,
            http_status: None,
            content_type: "text/plain".to_string(),
            title: format!("{org_name} (Pasted Policy Text)"),
            state: SourceState::Fetched {
                text: truncate_chars(text, max_chars),
                links: Vec::new(),
                extraction_error: None,
            },
        }
    }

    pub fn status(&self) -> SourceStatus {
        match self.state {
            SourceState::Unfetched => SourceStatus::Unfetched,
            SourceState::Fetched { .. } => SourceStatus::Fetched,
            SourceState::Failed { .. } => SourceStatus::Failed,
        }
    }

    pub fn is_fetched(&self) -> bool {
        matches!(self.state, SourceState::Fetched { .. })
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, SourceState::Failed { .. })
    }

    /// Extracted text; empty unless fetched.
    pub fn text(&self) -> &str {
        match &self.state {
            SourceState::Fetched { text, .. } => text,
            _ => "",
        }
    }

    pub fn links(&self) -> &[String] {
        match &self.state {
            SourceState::Fetched { links, .. } => links,
            _ => &[],
        }
    }

    pub fn error(&self) -> Option<&FetchError> {
        match &self.state {
            SourceState::Failed { error } => Some(error),
            _ => None,
        }
    }

    pub fn metadata(&self, hits: &BTreeMap<&'static str, usize>) -> SourceMetadata {
        let extraction_warning = match &self.state {
            SourceState::Fetched {
                extraction_error: Some(e),
                ..
            } => e.to_string(),
            _ => String::new(),
        };
        SourceMetadata {
            url: self.url.clone(),
            source_type: self.source_type,
            status: self.status(),
            http_status: self.http_status,
            content_type: self.content_type.clone(),
            title: self.title.clone(),
            error: self.error().map(|e| e.to_string()).unwrap_or_default(),
            extraction_warning,
            // BTreeMap iteration keeps these sorted.
            matched_requirement_ids: hits
                .iter()
                .filter(|(_, n)| **n > 0)
                .map(|(id, _)| id.to_string())
                .collect(),
        }
    }
}

/// Public view of a source: everything except the raw text.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SourceMetadata {
    pub url: String,
    pub source_type: SourceType,
    pub status: SourceStatus,
    pub http_status: Option<u16>,
    pub content_type: String,
    pub title: String,
    pub error: String,
    pub extraction_warning: String,
    pub matched_requirement_ids: Vec<String>,
}

pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

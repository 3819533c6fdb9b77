// src/importer/documents.rs
use std::collections::HashSet;

use crate::importer::types::SourceDoc;

const DOCUMENT_EXTENSIONS: &[&str] = &[".pdf", ".doc", ".docx", ".rtf"];
const DOCUMENT_HINTS: &[&str] = &["consent", "template", "application", "checklist", "protocol"];

/// Looks like a form, template, or other attachment.
pub fn is_document_link(link: &str) -> bool {
    let lower = link.to_ascii_lowercase();
    DOCUMENT_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
        || DOCUMENT_HINTS.iter().any(|hint| lower.contains(hint))
}

/// Attachment-like links from every fetched source, de-duplicated in
/// discovery order and capped at `cap`.
pub fn discover_document_links(sources: &[SourceDoc], cap: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    sources
        .iter()
        .filter(|s| s.is_fetched())
        .flat_map(|s| s.links().iter())
        .filter(|l| is_document_link(l))
        .filter(|l| seen.insert(l.as_str()))
        .take(cap)
        .cloned()
        .collect()
}

/// The PDFs worth a second-stage fetch, at most `max`.
pub fn pdf_follow_ups(document_links: &[String], max: usize) -> Vec<String> {
    document_links
        .iter()
        .filter(|l| l.to_ascii_lowercase().ends_with(".pdf"))
        .take(max)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::fetch::FetchError;
    use crate::importer::types::{SourceState, SourceType};

    fn fetched(links: &[&str]) -> SourceDoc {
        let mut d = SourceDoc::candidate("https://example.edu/irb", SourceType::Explicit);
        d.state = SourceState::Fetched {
            text: String::new(),
            links: links.iter().map(|s| s.to_string()).collect(),
            extraction_error: None,
        };
        d
    }

    #[test]
    fn picks_extensions_and_keyword_hints() {
        assert!(is_document_link("https://example.edu/forms/A.PDF"));
        assert!(is_document_link("https://example.edu/x.docx"));
        assert!(is_document_link("https://example.edu/irb/consent-forms"));
        assert!(is_document_link("https://example.edu/Protocol/new"));
        assert!(!is_document_link("https://example.edu/about"));
    }

    #[test]
    fn dedups_across_sources_and_skips_failed() {
        let mut failed = SourceDoc::candidate("https://example.edu/hrpp", SourceType::GuessedPath);
        failed.state = SourceState::Failed {
            error: FetchError::HttpStatus(404),
        };
        let sources = vec![
            fetched(&["https://example.edu/a.pdf", "https://example.edu/about"]),
            failed,
            fetched(&["https://example.edu/a.pdf", "https://example.edu/checklist"]),
        ];
        assert_eq!(
            discover_document_links(&sources, 18),
            vec![
                "https://example.edu/a.pdf".to_string(),
                "https://example.edu/checklist".to_string(),
            ]
        );
    }

    #[test]
    fn caps_links_and_pdf_follow_ups() {
        let links: Vec<String> = (0..30).map(|i| format!("https://example.edu/f{i}.pdf")).collect();
        let refs: Vec<&str> = links.iter().map(String::as_str).collect();
        let found = discover_document_links(&[fetched(&refs)], 18);
        assert_eq!(found.len(), 18);

        let mixed = vec![
            "https://example.edu/consent".to_string(),
            "https://example.edu/a.pdf".to_string(),
            "https://example.edu/b.doc".to_string(),
            "https://example.edu/c.pdf".to_string(),
            "https://example.edu/d.pdf".to_string(),
        ];
        assert_eq!(
            pdf_follow_ups(&mixed, 2),
            vec![
                "https://example.edu/a.pdf".to_string(),
                "https://example.edu/c.pdf".to_string(),
            ]
        );
    }
}

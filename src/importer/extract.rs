// src/importer/extract.rs
//! Turn a fetched payload into title / text / links.
//!
//! PDF payloads go through `lopdf` (first pages only). Everything else is
//! decoded with the declared charset and parsed by `scraper`, whose html5ever
//! backend recovers from any markup. Plain-text bodies skip the DOM and only
//! get their tags stripped.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::collections::HashSet;
use url::Url;

use crate::importer::types::truncate_chars;

pub const MAX_PDF_PAGES: usize = 25;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("Empty PDF payload.")]
    EmptyPdf,
    #[error("PDF text extraction unavailable ({0}).")]
    Pdf(String),
    #[error("Text extraction aborted ({0}).")]
    Aborted(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extracted {
    pub title: String,
    pub text: String,
    pub links: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ExtractLimits {
    pub max_text_chars: usize,
    pub max_links_per_page: usize,
}

static TITLE: Lazy<Selector> = Lazy::new(|| Selector::parse("title").expect("title selector"));
static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").expect("anchor selector"));
static RE_CHARSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)charset=([^\s;]+)").expect("charset regex"));
static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("tag regex"));
static RE_WS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

const HIDDEN_ELEMENTS: &[&str] = &["script", "style", "noscript", "template", "title"];

pub fn is_pdf(url: &str, content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("application/pdf")
        || url.to_ascii_lowercase().ends_with(".pdf")
}

/// Dispatch on content type / URL suffix.
pub fn extract(
    url: &str,
    content_type: &str,
    payload: &[u8],
    limits: ExtractLimits,
) -> Result<Extracted, ExtractionError> {
    if is_pdf(url, content_type) {
        let text = extract_pdf_text(payload, MAX_PDF_PAGES)?;
        return Ok(Extracted {
            title: url.rsplit('/').next().unwrap_or_default().to_string(),
            text: truncate_chars(&text, limits.max_text_chars),
            links: Vec::new(),
        });
    }

    let decoded = decode_text(content_type, payload);
    let (title, text, hrefs) = if is_plain_text(content_type) {
        (String::new(), strip_tags(&decoded), Vec::new())
    } else {
        parse_html(&decoded)
    };

    Ok(Extracted {
        title: if title.is_empty() { url.to_string() } else { title },
        text: truncate_chars(&text, limits.max_text_chars),
        links: resolve_links(url, &hrefs, limits.max_links_per_page),
    })
}

/// Decode with the header charset (UTF-8 when absent or unknown). Never fails:
/// undecodable bytes become U+FFFD.
pub fn decode_text(content_type: &str, payload: &[u8]) -> String {
    if payload.is_empty() {
        return String::new();
    }
    let encoding = RE_CHARSET
        .captures(content_type)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim_matches(|c| c == '"' || c == '\''))
        .and_then(|label| encoding_rs::Encoding::for_label(label.as_bytes()))
        .unwrap_or(encoding_rs::UTF_8);
    let (text, _, _) = encoding.decode(payload);
    text.into_owned()
}

fn is_plain_text(content_type: &str) -> bool {
    let ct = content_type.to_ascii_lowercase();
    (ct.starts_with("text/") && !ct.contains("html") && !ct.contains("xml")) || ct.contains("json")
}

fn strip_tags(s: &str) -> String {
    let stripped = RE_TAGS.replace_all(s, " ");
    html_escape::decode_html_entities(&stripped).to_string()
}

fn parse_html(html: &str) -> (String, String, Vec<String>) {
    let doc = Html::parse_document(html);

    let title = doc
        .select(&TITLE)
        .next()
        .map(|t| collapse_ws(&t.text().collect::<Vec<_>>().join(" ")))
        .unwrap_or_default();

    let mut chunks: Vec<&str> = Vec::new();
    for node in doc.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value()
                .as_element()
                .is_some_and(|e| HIDDEN_ELEMENTS.contains(&e.name()))
        });
        if hidden {
            continue;
        }
        let t = text.trim();
        if !t.is_empty() {
            chunks.push(t);
        }
    }

    let hrefs = doc
        .select(&ANCHOR)
        .filter_map(|a| a.value().attr("href"))
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .collect();

    (title, chunks.join("\n"), hrefs)
}

/// Absolute http(s) links, de-duplicated in document order. Only the first
/// `max` hrefs are considered.
pub fn resolve_links(base_url: &str, hrefs: &[String], max: usize) -> Vec<String> {
    let base = Url::parse(base_url).ok();
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for href in hrefs.iter().take(max) {
        let resolved = match &base {
            Some(b) => b.join(href),
            None => Url::parse(href),
        };
        let Ok(mut abs) = resolved else {
            continue;
        };
        if abs.scheme() != "http" && abs.scheme() != "https" {
            continue;
        }
        abs.set_fragment(None);
        let s = abs.to_string();
        if seen.insert(s.clone()) {
            out.push(s);
        }
    }
    out
}

fn extract_pdf_text(payload: &[u8], max_pages: usize) -> Result<String, ExtractionError> {
    if payload.is_empty() {
        return Err(ExtractionError::EmptyPdf);
    }
    let doc = lopdf::Document::load_mem(payload).map_err(|e| ExtractionError::Pdf(e.to_string()))?;
    let pages: Vec<u32> = doc.get_pages().keys().copied().take(max_pages).collect();

    let mut chunks = Vec::new();
    for page in pages {
        match doc.extract_text(&[page]) {
            Ok(t) if !t.trim().is_empty() => chunks.push(t),
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(target: "importer", page, error = %e, "pdf page text unavailable");
            }
        }
    }
    Ok(chunks.join("\n"))
}

fn collapse_ws(s: &str) -> String {
    RE_WS.replace_all(s, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> ExtractLimits {
        ExtractLimits {
            max_text_chars: 240_000,
            max_links_per_page: 120,
        }
    }

    #[test]
    fn html_title_text_and_links() {
        let html = br#"<html><head><title> Human  Research
            Protection </title><style>.x{color:red}</style></head>
            <body><script>var consent = 1;</script>
            <h1>IRB Office</h1><p>Submit your protocol.</p>
            <a href="/irb/forms/consent.pdf">Consent</a>
            <a href="https://other.org/x#top">Other</a>
            <a href="/irb/forms/consent.pdf">Dup</a>
            <a href="mailto:irb@example.edu">Mail</a>
            </body></html>"#;
        let out = extract(
            "https://example.edu/irb/",
            "text/html; charset=utf-8",
            html,
            limits(),
        )
        .unwrap();
        assert_eq!(out.title, "Human Research Protection");
        assert!(out.text.contains("IRB Office"));
        assert!(out.text.contains("Submit your protocol."));
        assert!(!out.text.contains("consent = 1"));
        assert!(!out.text.contains("color:red"));
        assert_eq!(
            out.links,
            vec![
                "https://example.edu/irb/forms/consent.pdf".to_string(),
                "https://other.org/x".to_string(),
            ]
        );
    }

    #[test]
    fn malformed_markup_still_yields_text() {
        let html = b"<div><p>Unclosed <b>informed consent <i>required</div></span>";
        let out = extract("https://example.edu/", "text/html", html, limits()).unwrap();
        assert!(out.text.contains("informed consent"));
        assert_eq!(out.title, "https://example.edu/");
    }

    #[test]
    fn plain_text_strips_tags() {
        let out = extract(
            "https://example.edu/policy.txt",
            "text/plain",
            b"Use the <b>consent</b> template &amp; checklist",
            limits(),
        )
        .unwrap();
        assert!(out.text.contains("consent"));
        assert!(out.text.contains("& checklist"));
        assert!(!out.text.contains("<b>"));
        assert!(out.links.is_empty());
    }

    #[test]
    fn declared_charset_is_honored_and_bad_bytes_replaced() {
        // "café" in latin-1
        let out = decode_text("text/html; charset=\"ISO-8859-1\"", b"caf\xe9");
        assert_eq!(out, "café");
        let lossy = decode_text("text/html", b"ok \xff\xfe end");
        assert!(lossy.starts_with("ok "));
        assert!(lossy.contains('\u{FFFD}'));
    }

    #[test]
    fn text_is_truncated_to_budget() {
        let body = format!("<p>{}</p>", "a".repeat(5_000));
        let out = extract(
            "https://example.edu/",
            "text/html",
            body.as_bytes(),
            ExtractLimits {
                max_text_chars: 1_000,
                max_links_per_page: 120,
            },
        )
        .unwrap();
        assert_eq!(out.text.chars().count(), 1_000);
    }

    #[test]
    fn link_cap_applies_before_resolution() {
        let hrefs: Vec<String> = (0..10).map(|i| format!("/p{i}")).collect();
        let out = resolve_links("https://example.edu/", &hrefs, 3);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0], "https://example.edu/p0");
    }

    /// One text line per page, Courier, no compression.
    fn pdf_with_pages(pages: &[String]) -> Vec<u8> {
        use lopdf::content::{Content, Operation};
        use lopdf::{dictionary, Document, Object, Stream};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids: Vec<Object> = Vec::new();
        for line in pages {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![72.into(), 720.into()]),
                    Operation::new("Tj", vec![Object::string_literal(line.as_str())]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).unwrap();
        buf
    }

    #[test]
    fn pdf_text_and_title_from_generated_document() {
        let pdf = pdf_with_pages(&["Submit informed consent forms.".to_string()]);
        let out = extract(
            "https://example.edu/forms/f.pdf",
            "application/pdf",
            &pdf,
            limits(),
        )
        .unwrap();
        assert_eq!(out.title, "f.pdf");
        assert!(out.text.contains("Submit informed consent forms."), "{:?}", out.text);
        assert!(out.links.is_empty());
    }

    #[test]
    fn pdf_pages_past_the_cap_are_ignored() {
        let pages: Vec<String> = (1..=30).map(|i| format!("marker-{i}.")).collect();
        let pdf = pdf_with_pages(&pages);
        // octet-stream on purpose: the .pdf suffix alone routes to lopdf
        let out = extract(
            "https://example.edu/handbook.pdf",
            "application/octet-stream",
            &pdf,
            limits(),
        )
        .unwrap();
        assert!(out.text.contains("marker-1."));
        assert!(out.text.contains(&format!("marker-{MAX_PDF_PAGES}.")));
        for later in (MAX_PDF_PAGES + 1)..=30 {
            assert!(!out.text.contains(&format!("marker-{later}.")), "page {later} leaked");
        }
    }

    #[test]
    fn broken_pdf_is_a_non_fatal_extraction_error() {
        let err = extract(
            "https://example.edu/form.pdf",
            "application/pdf",
            b"this is not a pdf document",
            limits(),
        )
        .unwrap_err();
        assert!(matches!(err, ExtractionError::Pdf(_)));

        let empty = extract("https://example.edu/form.pdf", "", b"", limits()).unwrap_err();
        assert_eq!(empty, ExtractionError::EmptyPdf);
    }
}

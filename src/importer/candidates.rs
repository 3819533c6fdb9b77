// src/importer/candidates.rs
//! Bounded list of URLs worth fetching for one organization.
//!
//! Priority: explicit IRB page, explicit website, likely paths under it (or
//! under a guessed `.edu` host), then web-search results when the caller gave
//! no URL at all. Nothing here crawls.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use url::Url;

use crate::config::ImporterConfig;
use crate::importer::extract::decode_text;
use crate::importer::fetch::{normalize_url, Fetcher};
use crate::importer::types::{SourceDoc, SourceType};

pub const LIKELY_IRB_PATHS: [&str; 7] = [
    "/irb",
    "/research/irb",
    "/research-compliance/irb",
    "/research-compliance/human-subjects",
    "/human-subjects",
    "/hrpp",
    "/research/human-subjects",
];

/// Paths tried under a host derived from the organization name.
const GUESSED_HOST_PATHS: usize = 3;
/// Distinct results kept from one search results page.
const MAX_RESULTS_PER_PAGE: usize = 7;

pub const SEARCH_QUERY_TEMPLATES: [&str; 3] = [
    "\"{name}\" institutional review board",
    "\"{name}\" human subjects research",
    "\"{name}\" IRB application",
];

static RE_NON_ALNUM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("slug regex"));
static RE_HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)href="([^"]+)""#).expect("href regex"));

/// Lower-case, runs of anything but `[a-z0-9]` become `-`, trimmed.
pub fn slugify(value: &str) -> String {
    RE_NON_ALNUM
        .replace_all(&value.to_lowercase(), "-")
        .trim_matches('-')
        .to_string()
}

/// `base` treated as a directory, then `path` appended under it.
fn join_under(base: &str, path: &str) -> Option<String> {
    let mut dir = Url::parse(base).ok()?;
    dir.set_query(None);
    dir.set_fragment(None);
    if !dir.path().ends_with('/') {
        let p = format!("{}/", dir.path());
        dir.set_path(&p);
    }
    dir.join(path.trim_start_matches('/')).ok().map(String::from)
}

pub async fn build_candidates(
    org_name: &str,
    website: &str,
    irb_page_url: &str,
    fetcher: &Fetcher,
    cfg: &ImporterConfig,
) -> Vec<SourceDoc> {
    let org_name = org_name.trim();
    let mut out = Vec::new();

    let irb_url = normalize_url(irb_page_url);
    if !irb_url.is_empty() {
        out.push(SourceDoc::candidate(irb_url.clone(), SourceType::Explicit));
    }

    let base = normalize_url(website);
    if !base.is_empty() {
        out.push(SourceDoc::candidate(base.clone(), SourceType::Explicit));
        out.extend(
            LIKELY_IRB_PATHS
                .iter()
                .filter_map(|p| join_under(&base, p))
                .map(|u| SourceDoc::candidate(u, SourceType::GuessedPath)),
        );
    } else if !org_name.is_empty() {
        let host = slugify(org_name).replace('-', "");
        if !host.is_empty() {
            let root = format!("https://{host}.edu");
            let paths: Vec<String> = LIKELY_IRB_PATHS
                .iter()
                .take(GUESSED_HOST_PATHS)
                .map(|p| format!("{root}{p}"))
                .collect();
            out.push(SourceDoc::candidate(root, SourceType::GuessedPath));
            out.extend(
                paths
                    .into_iter()
                    .map(|u| SourceDoc::candidate(u, SourceType::GuessedPath)),
            );
        }
    }

    if irb_url.is_empty() && base.is_empty() && !org_name.is_empty() && cfg.search_enabled {
        for link in search(org_name, fetcher, cfg).await {
            out.push(SourceDoc::candidate(link, SourceType::SearchResult));
        }
    }

    let mut seen = HashSet::new();
    out.retain(|s| !s.url.is_empty() && seen.insert(s.url.clone()));
    out.truncate(cfg.max_source_fetch);
    out
}

/// Query the search endpoint once per template until enough results are in.
/// Search requests go through the same fetcher, so they are validated too.
async fn search(org_name: &str, fetcher: &Fetcher, cfg: &ImporterConfig) -> Vec<String> {
    let mut results: Vec<String> = Vec::new();
    for template in SEARCH_QUERY_TEMPLATES {
        let query = template.replace("{name}", org_name);
        let Ok(mut search_url) = Url::parse(&cfg.search_endpoint) else {
            tracing::warn!(target: "importer", endpoint = %cfg.search_endpoint, "invalid search endpoint");
            return results;
        };
        search_url.query_pairs_mut().append_pair("q", &query);

        let outcome = fetcher.fetch(search_url.as_str()).await;
        let body = match outcome.body {
            Ok(b) if !b.is_empty() => b,
            Ok(_) => continue,
            Err(e) => {
                tracing::debug!(target: "importer", %query, error = %e, "search request failed");
                continue;
            }
        };
        let html = decode_text(&outcome.content_type, &body);
        for link in search_result_urls(&html) {
            if !results.contains(&link) {
                results.push(link);
            }
        }
        if results.len() >= cfg.max_search_results {
            break;
        }
    }
    results.truncate(cfg.max_search_results);
    results
}

/// Result URLs from a search results page: redirect wrappers unwrapped,
/// absolute http(s) only, first few distinct.
pub fn search_result_urls(html: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    RE_HREF
        .captures_iter(html)
        .filter_map(|c| c.get(1))
        .map(|m| html_escape::decode_html_entities(m.as_str()).to_string())
        .filter_map(|href| unwrap_result_link(&href))
        .filter(|u| seen.insert(u.clone()))
        .take(MAX_RESULTS_PER_PAGE)
        .collect()
}

fn unwrap_result_link(href: &str) -> Option<String> {
    if href.contains("duckduckgo.com/l/?") {
        let wrapper = Url::parse(&normalize_url(href)).ok()?;
        let target = wrapper
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned())?;
        return (target.starts_with("http://") || target.starts_with("https://")).then_some(target);
    }
    href.starts_with("http").then(|| href.to_string())
}

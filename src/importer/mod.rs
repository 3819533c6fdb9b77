// src/importer/mod.rs
//! Organization profile importer.
//!
//! Given an organization name (and optionally a website, an IRB page URL or
//! pasted policy text) the importer fetches a bounded set of public pages,
//! mines them for IRB requirement signals and returns a draft profile with a
//! confidence score. Every network hop goes through [`security::UrlValidator`].

pub mod candidates;
pub mod documents;
pub mod extract;
pub mod fetch;
pub mod profile_draft;
pub mod security;
pub mod signals;
pub mod synthesis;
pub mod transport;
pub mod types;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use metrics::{counter, describe_counter, describe_histogram, histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::ImporterConfig;
use crate::importer::candidates::build_candidates;
use crate::importer::documents::{discover_document_links, pdf_follow_ups};
use crate::importer::extract::{extract, is_pdf, ExtractLimits, ExtractionError};
use crate::importer::fetch::{normalize_url, FetchError, Fetcher};
use crate::importer::profile_draft::{assemble_profile, DraftInputs};
use crate::importer::security::{HostResolver, SystemResolver, UrlValidator};
use crate::importer::signals::{SignalAccumulator, SignalSummary};
use crate::importer::synthesis::ImportCounters;
use crate::importer::transport::ReqwestTransport;
use crate::importer::types::{SourceDoc, SourceMetadata, SourceState, SourceType};

pub use crate::importer::candidates::slugify;

pub const IMPORT_NOTES: [&str; 2] = [
    "Importer searches public IRB/HRPP pages and extracts requirement signals via keyword heuristics.",
    "Use source links and highlights as verification starting points before relying on the generated profile.",
];

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("importer_imports_total", "Profile imports started.");
        describe_counter!(
            "importer_fetch_total",
            "Source fetches by outcome (fetched/failed)."
        );
        describe_counter!(
            "importer_blocked_urls_total",
            "Outbound URLs refused by the security validator."
        );
        describe_counter!("importer_redirects_total", "Redirect hops followed.");
        describe_histogram!("importer_import_ms", "Wall time of one import in milliseconds.");
    });
}

#[derive(Debug, Clone, Default)]
pub struct ImportRequest {
    pub organization_name: String,
    pub organization_website: String,
    pub irb_page_url: String,
    pub raw_policy_text: String,
    pub profile_id: Option<String>,
    pub base_profile: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImportError {
    #[error("organizationName is required.")]
    MissingOrganizationName,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportStats {
    pub candidate_source_count: usize,
    pub fetched_source_count: usize,
    pub failed_source_count: usize,
    pub signal_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub organization_website: String,
    pub irb_page_url: String,
    pub used_raw_policy_text: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportDebug {
    pub request_context: RequestContext,
    /// Every rule id, including zero counts.
    pub signal_hits: BTreeMap<&'static str, usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub organization_name: String,
    pub profile_draft: Value,
    pub confidence: f64,
    pub warnings: Vec<String>,
    pub notes: Vec<String>,
    pub sources: Vec<SourceMetadata>,
    pub signals: Vec<SignalSummary>,
    pub document_links: Vec<String>,
    pub stats: ImportStats,
    pub debug: ImportDebug,
}

/// `imported_{slug}_v1`; `organization` stands in for an empty slug.
pub fn default_profile_id(org_name: &str) -> String {
    let slug = slugify(org_name);
    let slug = if slug.is_empty() { "organization".to_string() } else { slug };
    format!("imported_{slug}_v1")
}

#[derive(Clone)]
pub struct Importer {
    cfg: Arc<ImporterConfig>,
    fetcher: Fetcher,
}

impl Importer {
    pub fn new(cfg: ImporterConfig, fetcher: Fetcher) -> Self {
        Self {
            cfg: Arc::new(cfg.sanitized()),
            fetcher,
        }
    }

    /// Production wiring: reqwest transport and the system DNS resolver.
    pub fn from_config(cfg: ImporterConfig) -> anyhow::Result<Self> {
        let cfg = cfg.sanitized();
        let resolver: Arc<dyn HostResolver> = Arc::new(SystemResolver);
        let transport = ReqwestTransport::with_resolver(&cfg, resolver.clone())?;
        let validator = UrlValidator::new(&cfg, resolver);
        let fetcher = Fetcher::new(&cfg, validator, Arc::new(transport));
        Ok(Self::new(cfg, fetcher))
    }

    pub fn config(&self) -> &ImporterConfig {
        &self.cfg
    }

    fn limits(&self) -> ExtractLimits {
        ExtractLimits {
            max_text_chars: self.cfg.max_text_chars,
            max_links_per_page: self.cfg.max_links_per_page,
        }
    }

    /// Move an unfetched source to `Fetched` or `Failed`. Sources that are
    /// already past `Unfetched` come back unchanged.
    pub async fn fetch_source(&self, mut source: SourceDoc) -> SourceDoc {
        if !matches!(source.state, SourceState::Unfetched) {
            return source;
        }

        let outcome = self.fetcher.fetch(&source.url).await;
        source.http_status = outcome.http_status;
        source.content_type = outcome.content_type;

        let payload = match outcome.body {
            Ok(b) if b.is_empty() => Err(FetchError::EmptyResponse),
            other => other,
        };
        let payload = match payload {
            Ok(p) => p,
            Err(error) => {
                warn!(target: "importer", url = %source.url, %error, "source fetch failed");
                counter!("importer_fetch_total", "outcome" => "failed").increment(1);
                source.state = SourceState::Failed { error };
                return source;
            }
        };

        let url = source.url.clone();
        let content_type = source.content_type.clone();
        let limits = self.limits();
        let extracted =
            tokio::task::spawn_blocking(move || extract(&url, &content_type, &payload, limits))
                .await
                .unwrap_or_else(|e| Err(ExtractionError::Aborted(e.to_string())));

        source.state = match extracted {
            Ok(ex) => {
                source.title = ex.title;
                SourceState::Fetched {
                    text: ex.text,
                    links: ex.links,
                    extraction_error: None,
                }
            }
            Err(e) => {
                warn!(target: "importer", url = %source.url, error = %e, "text extraction failed");
                source.title = if is_pdf(&source.url, &source.content_type) {
                    source.url.rsplit('/').next().unwrap_or_default().to_string()
                } else {
                    source.url.clone()
                };
                SourceState::Fetched {
                    text: String::new(),
                    links: Vec::new(),
                    extraction_error: Some(e),
                }
            }
        };
        counter!("importer_fetch_total", "outcome" => "fetched").increment(1);
        source
    }

    /// Fetch in order with at most `fetch_concurrency` requests in flight.
    async fn fetch_all(&self, sources: Vec<SourceDoc>) -> Vec<SourceDoc> {
        stream::iter(sources)
            .map(|s| self.fetch_source(s))
            .buffered(self.cfg.fetch_concurrency.max(1))
            .collect()
            .await
    }

    pub async fn import_profile(&self, req: ImportRequest) -> Result<ImportResult, ImportError> {
        let org_name = req.organization_name.trim().to_string();
        if org_name.is_empty() {
            return Err(ImportError::MissingOrganizationName);
        }
        ensure_metrics_described();
        counter!("importer_imports_total").increment(1);
        let started = Instant::now();
        let cfg = &self.cfg;

        let candidates = build_candidates(
            &org_name,
            &req.organization_website,
            &req.irb_page_url,
            &self.fetcher,
            cfg,
        )
        .await;

        let used_raw_policy_text = !req.raw_policy_text.trim().is_empty();
        let mut sources: Vec<SourceDoc> = Vec::new();
        if used_raw_policy_text {
            sources.push(SourceDoc::inline_text(
                &org_name,
                &req.raw_policy_text,
                cfg.max_text_chars,
            ));
        }
        let candidate_source_count = sources.len() + candidates.len();
        info!(
            target: "importer",
            org = %org_name,
            candidates = candidate_source_count,
            inline = used_raw_policy_text,
            "import started"
        );

        // Stage 1: candidates, in priority order.
        sources.extend(self.fetch_all(candidates).await);

        // Stage 2: a few PDFs linked from what stage 1 fetched.
        let document_links = discover_document_links(&sources, cfg.max_document_links);
        let unseen: Vec<String> = {
            let known: HashSet<&str> = sources.iter().map(|s| s.url.as_str()).collect();
            document_links
                .iter()
                .filter(|l| !known.contains(l.as_str()))
                .cloned()
                .collect()
        };
        let follow_ups: Vec<SourceDoc> = pdf_follow_ups(&unseen, cfg.max_pdf_sources)
            .into_iter()
            .map(|u| SourceDoc::candidate(u, SourceType::LinkedDocument))
            .collect();
        sources.extend(self.fetch_all(follow_ups).await);

        let mut acc = SignalAccumulator::new();
        let metadata: Vec<SourceMetadata> = sources
            .iter()
            .map(|s| {
                let hits = acc.add_source(s.text());
                s.metadata(&hits)
            })
            .collect();
        let signals = acc.summaries();

        let counters = ImportCounters {
            fetched: sources.iter().filter(|s| s.is_fetched()).count(),
            failed: sources.iter().filter(|s| s.is_failed()).count(),
            signals: signals.len(),
            document_links: document_links.len(),
        };
        let confidence = synthesis::confidence(&counters, acc.triggered_weight());
        let warnings = synthesis::warnings(&counters);

        let profile_id = req
            .profile_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| default_profile_id(&org_name));
        let base_profile = req
            .base_profile
            .unwrap_or_else(|| Value::Object(Map::new()));
        let profile_draft = assemble_profile(&DraftInputs {
            org_name: &org_name,
            profile_id: &profile_id,
            base_profile: &base_profile,
            hits: acc.hits(),
            sources: &sources,
            document_links: &document_links,
            imported_at: Utc::now(),
        });

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        histogram!("importer_import_ms").record(elapsed_ms);
        info!(
            target: "importer",
            org = %org_name,
            fetched = counters.fetched,
            failed = counters.failed,
            signals = counters.signals,
            confidence,
            elapsed_ms = elapsed_ms as u64,
            "import finished"
        );

        Ok(ImportResult {
            organization_name: org_name,
            profile_draft,
            confidence,
            warnings,
            notes: IMPORT_NOTES.iter().map(|s| s.to_string()).collect(),
            sources: metadata,
            signals,
            document_links,
            stats: ImportStats {
                candidate_source_count,
                fetched_source_count: counters.fetched,
                failed_source_count: counters.failed,
                signal_count: counters.signals,
            },
            debug: ImportDebug {
                request_context: RequestContext {
                    organization_website: normalize_url(&req.organization_website),
                    irb_page_url: normalize_url(&req.irb_page_url),
                    used_raw_policy_text,
                },
                signal_hits: acc.hits().clone(),
            },
        })
    }
}

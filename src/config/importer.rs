// src/config/importer.rs
//! Importer limits and network policy.
//!
//! Every field defaults to the built-in policy value, so a partial TOML file only
//! overrides what it names. Values pass through [`ImporterConfig::sanitized`]
//! before use: operators may tighten limits but cannot disable the SSRF controls.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_IMPORTER_CONFIG_PATH: &str = "config/importer.toml";

pub const ENV_IMPORTER_CONFIG_PATH: &str = "IMPORTER_CONFIG_PATH";
pub const ENV_IMPORTER_TIMEOUT_SECS: &str = "IMPORTER_TIMEOUT_SECS";
pub const ENV_IMPORTER_MAX_SOURCES: &str = "IMPORTER_MAX_SOURCES";
pub const ENV_IMPORTER_SEARCH_ENABLED: &str = "IMPORTER_SEARCH_ENABLED";

pub const USER_AGENT: &str = "IRB-Profile-Importer/1.0";
pub const DEFAULT_SEARCH_ENDPOINT: &str = "https://duckduckgo.com/html/";

/// Hostnames that are refused before any DNS lookup. Always enforced.
pub const BUILTIN_BLOCKED_HOSTNAMES: &[&str] = &[
    "localhost",
    "localhost.localdomain",
    "0.0.0.0",
    "127.0.0.1",
    "::1",
    "metadata.google.internal",
];

fn default_request_timeout_secs() -> u64 {
    7
}
fn default_max_redirects() -> usize {
    4
}
fn default_max_response_bytes() -> usize {
    2_500_000
}
fn default_max_source_fetch() -> usize {
    7
}
fn default_max_links_per_page() -> usize {
    120
}
fn default_max_pdf_sources() -> usize {
    2
}
fn default_max_text_chars() -> usize {
    240_000
}
fn default_max_search_results() -> usize {
    8
}
fn default_max_document_links() -> usize {
    18
}
fn default_fetch_concurrency() -> usize {
    4
}
fn default_user_agent() -> String {
    USER_AGENT.to_string()
}
fn default_search_enabled() -> bool {
    true
}
fn default_search_endpoint() -> String {
    DEFAULT_SEARCH_ENDPOINT.to_string()
}
fn default_allowed_ports() -> Vec<u16> {
    vec![80, 443]
}
fn default_blocked_hostnames() -> Vec<String> {
    BUILTIN_BLOCKED_HOSTNAMES
        .iter()
        .map(|h| h.to_string())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImporterConfig {
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
    /// Cap on both the declared and the actually received body size.
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
    #[serde(default = "default_max_source_fetch")]
    pub max_source_fetch: usize,
    #[serde(default = "default_max_links_per_page")]
    pub max_links_per_page: usize,
    #[serde(default = "default_max_pdf_sources")]
    pub max_pdf_sources: usize,
    /// Per-source text budget. Requirement language past this point is not scored.
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
    #[serde(default = "default_max_search_results")]
    pub max_search_results: usize,
    #[serde(default = "default_max_document_links")]
    pub max_document_links: usize,
    #[serde(default = "default_fetch_concurrency")]
    pub fetch_concurrency: usize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_search_enabled")]
    pub search_enabled: bool,
    #[serde(default = "default_search_endpoint")]
    pub search_endpoint: String,
    #[serde(default = "default_allowed_ports")]
    pub allowed_ports: Vec<u16>,
    #[serde(default = "default_blocked_hostnames")]
    pub blocked_hostnames: Vec<String>,
}

impl Default for ImporterConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            max_redirects: default_max_redirects(),
            max_response_bytes: default_max_response_bytes(),
            max_source_fetch: default_max_source_fetch(),
            max_links_per_page: default_max_links_per_page(),
            max_pdf_sources: default_max_pdf_sources(),
            max_text_chars: default_max_text_chars(),
            max_search_results: default_max_search_results(),
            max_document_links: default_max_document_links(),
            fetch_concurrency: default_fetch_concurrency(),
            user_agent: default_user_agent(),
            search_enabled: default_search_enabled(),
            search_endpoint: default_search_endpoint(),
            allowed_ports: default_allowed_ports(),
            blocked_hostnames: default_blocked_hostnames(),
        }
    }
}

impl ImporterConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: ImporterConfig = toml::from_str(s).context("parsing importer config toml")?;
        Ok(cfg.sanitized())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading importer config from {}", path.display()))?;
        Self::from_toml_str(&content)
    }

    /// Resolution order:
    /// 1) $IMPORTER_CONFIG_PATH (must exist)
    /// 2) config/importer.toml
    /// 3) built-in defaults
    ///
    /// Env overrides are applied last.
    pub fn load_default() -> Result<Self> {
        let cfg = if let Ok(p) = std::env::var(ENV_IMPORTER_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!(
                    "{ENV_IMPORTER_CONFIG_PATH} points to non-existent path"
                ));
            }
            Self::load_from(&pb)?
        } else {
            let default_path = PathBuf::from(DEFAULT_IMPORTER_CONFIG_PATH);
            if default_path.exists() {
                Self::load_from(&default_path)?
            } else {
                Self::default()
            }
        };
        Ok(cfg.with_env_overrides().sanitized())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Some(v) = parse_env_u64(ENV_IMPORTER_TIMEOUT_SECS) {
            self.request_timeout_secs = v;
        }
        if let Some(v) = parse_env_u64(ENV_IMPORTER_MAX_SOURCES) {
            self.max_source_fetch = v as usize;
        }
        if let Ok(raw) = std::env::var(ENV_IMPORTER_SEARCH_ENABLED) {
            match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.search_enabled = true,
                "0" | "false" | "no" | "off" => self.search_enabled = false,
                _ => {}
            }
        }
        self
    }

    /// Clamp every limit into a policy-safe range.
    pub fn sanitized(mut self) -> Self {
        self.request_timeout_secs = self.request_timeout_secs.clamp(1, 60);
        self.max_redirects = self.max_redirects.min(10);
        self.max_response_bytes = self.max_response_bytes.clamp(1_024, 20_000_000);
        self.max_source_fetch = self.max_source_fetch.clamp(1, 20);
        self.max_links_per_page = self.max_links_per_page.clamp(1, 500);
        self.max_pdf_sources = self.max_pdf_sources.min(5);
        self.max_text_chars = self.max_text_chars.clamp(1_000, 1_000_000);
        self.max_search_results = self.max_search_results.min(20);
        self.max_document_links = self.max_document_links.clamp(1, 50);
        self.fetch_concurrency = self.fetch_concurrency.clamp(1, 4);

        if self.user_agent.trim().is_empty() {
            self.user_agent = default_user_agent();
        }
        if self.search_endpoint.trim().is_empty() {
            self.search_endpoint = default_search_endpoint();
        }

        // Only standard web ports may ever be allowed.
        self.allowed_ports.retain(|p| matches!(p, 80 | 443));
        if self.allowed_ports.is_empty() {
            self.allowed_ports = default_allowed_ports();
        }
        self.allowed_ports.sort_unstable();
        self.allowed_ports.dedup();

        let mut hosts: Vec<String> = self
            .blocked_hostnames
            .iter()
            .map(|h| normalize_host(h))
            .filter(|h| !h.is_empty())
            .collect();
        hosts.extend(default_blocked_hostnames());
        hosts.sort();
        hosts.dedup();
        self.blocked_hostnames = hosts;

        self
    }
}

/// Lower-case, strip brackets and one trailing dot.
pub(crate) fn normalize_host(h: &str) -> String {
    let h = h.trim().to_ascii_lowercase();
    let h = h.trim_start_matches('[').trim_end_matches(']');
    h.strip_suffix('.').unwrap_or(h).to_string()
}

fn parse_env_u64(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.trim().parse::<u64>().ok())
}

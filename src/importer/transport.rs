// src/importer/transport.rs
//! Single-request HTTP seam. Implementations must never follow redirects;
//! the fetcher owns redirect semantics so it can re-validate every hop.

use async_trait::async_trait;
use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::config::ImporterConfig;
use crate::importer::security::{is_blocked_ip, BlockReason, HostResolver, SystemResolver};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("{0}")]
    Network(String),
    /// The connect-time lookup answered with an address the policy refuses.
    #[error("{0}")]
    Blocked(BlockReason),
}

#[async_trait]
pub trait TransportResponse: Send {
    fn status(&self) -> u16;
    /// Header value by (case-insensitive) name, if present and valid text.
    fn header(&self, name: &str) -> Option<String>;
    /// Declared body size, when the server sent one.
    fn content_length(&self) -> Option<u64>;
    /// Read at most `limit` bytes of the body, stopping early once reached.
    async fn read_body(&mut self, limit: usize) -> Result<Vec<u8>, TransportError>;
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url) -> Result<Box<dyn TransportResponse>, TransportError>;
}

/// reqwest-backed transport with redirects disabled.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(cfg: &ImporterConfig) -> anyhow::Result<Self> {
        Self::with_resolver(cfg, Arc::new(SystemResolver))
    }

    /// Connections only go to addresses `resolver` returned and
    /// [`is_blocked_ip`] accepted at connect time.
    pub fn with_resolver(
        cfg: &ImporterConfig,
        resolver: Arc<dyn HostResolver>,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .dns_resolver(Arc::new(CheckedResolver { inner: resolver }))
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.request_timeout())
            .connect_timeout(Duration::from_secs(cfg.request_timeout_secs.min(4)))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get(&self, url: &Url) -> Result<Box<dyn TransportResponse>, TransportError> {
        let resp = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(map_reqwest_error)?;
        Ok(Box::new(ReqwestResponse { inner: resp }))
    }
}

/// reqwest DNS hook that applies [`is_blocked_ip`] to every answer.
struct CheckedResolver {
    inner: Arc<dyn HostResolver>,
}

impl Resolve for CheckedResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let inner = self.inner.clone();
        Box::pin(async move {
            let ips = inner.resolve(name.as_str()).await?;
            if let Some(ip) = ips.iter().find(|ip| is_blocked_ip(ip)) {
                tracing::warn!(target: "importer", host = name.as_str(), %ip, "blocked address at connect time");
                return Err(BlockReason::PrivateAddress(*ip).into());
            }
            let addrs: Addrs = Box::new(ips.into_iter().map(|ip| SocketAddr::new(ip, 0)));
            Ok(addrs)
        })
    }
}

struct ReqwestResponse {
    inner: reqwest::Response,
}

#[async_trait]
impl TransportResponse for ReqwestResponse {
    fn status(&self) -> u16 {
        self.inner.status().as_u16()
    }

    fn header(&self, name: &str) -> Option<String> {
        self.inner
            .headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim().to_string())
    }

    fn content_length(&self) -> Option<u64> {
        self.header("content-length")
            .and_then(|s| s.parse::<u64>().ok())
    }

    async fn read_body(&mut self, limit: usize) -> Result<Vec<u8>, TransportError> {
        let mut buf = Vec::new();
        while buf.len() < limit {
            match self.inner.chunk().await.map_err(map_reqwest_error)? {
                Some(chunk) => {
                    let take = (limit - buf.len()).min(chunk.len());
                    buf.extend_from_slice(&chunk[..take]);
                }
                None => break,
            }
        }
        Ok(buf)
    }
}

fn map_reqwest_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        return TransportError::Timeout;
    }
    // Walk to the innermost cause: "error sending request" alone is useless.
    let mut msg = e.to_string();
    let mut source = std::error::Error::source(&e);
    while let Some(s) = source {
        if let Some(reason) = s.downcast_ref::<BlockReason>() {
            return TransportError::Blocked(reason.clone());
        }
        msg = s.to_string();
        source = s.source();
    }
    TransportError::Network(msg)
}

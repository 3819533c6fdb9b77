// tests/common/mod.rs
//
// Offline doubles for the importer's two network seams:
// - StaticResolver: fixed DNS answers (public by default)
// - ScriptedTransport: canned responses per URL, records every request
#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::io;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use url::Url;

use irb_profile_importer::config::ImporterConfig;
use irb_profile_importer::importer::fetch::Fetcher;
use irb_profile_importer::importer::security::{HostResolver, UrlValidator};
use irb_profile_importer::importer::transport::{Transport, TransportError, TransportResponse};
use irb_profile_importer::Importer;

pub const PUBLIC_IP: &str = "93.184.216.34";

pub struct StaticResolver {
    answers: HashMap<String, Vec<IpAddr>>,
    failing: HashSet<String>,
}

impl StaticResolver {
    pub fn public() -> Self {
        Self {
            answers: HashMap::new(),
            failing: HashSet::new(),
        }
    }

    pub fn with(mut self, host: &str, ips: &[&str]) -> Self {
        let ips = ips.iter().map(|s| s.parse().expect("ip literal")).collect();
        self.answers.insert(host.to_string(), ips);
        self
    }

    pub fn failing(mut self, host: &str) -> Self {
        self.failing.insert(host.to_string());
        self
    }
}

#[async_trait]
impl HostResolver for StaticResolver {
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        if self.failing.contains(host) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such host"));
        }
        Ok(self
            .answers
            .get(host)
            .cloned()
            .unwrap_or_else(|| vec![PUBLIC_IP.parse().expect("public ip")]))
    }
}

#[derive(Clone, Debug)]
pub enum Reply {
    Response {
        status: u16,
        headers: Vec<(String, String)>,
        body: Vec<u8>,
    },
    Fail(TransportError),
}

impl Reply {
    pub fn html(body: &str) -> Self {
        Reply::Response {
            status: 200,
            headers: vec![("content-type".into(), "text/html; charset=utf-8".into())],
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn bytes(content_type: &str, body: Vec<u8>) -> Self {
        Reply::Response {
            status: 200,
            headers: vec![("content-type".into(), content_type.into())],
            body,
        }
    }

    pub fn status(status: u16) -> Self {
        Reply::Response {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn redirect(status: u16, location: &str) -> Self {
        Reply::Response {
            status,
            headers: vec![("location".into(), location.into())],
            body: Vec::new(),
        }
    }

    pub fn header(self, name: &str, value: &str) -> Self {
        match self {
            Reply::Response {
                status,
                mut headers,
                body,
            } => {
                headers.push((name.to_string(), value.to_string()));
                Reply::Response {
                    status,
                    headers,
                    body,
                }
            }
            other => other,
        }
    }
}

/// Unknown URLs get `fallback` (404 unless changed).
pub struct ScriptedTransport {
    routes: Mutex<HashMap<String, Reply>>,
    fallback: Mutex<Reply>,
    requests: Mutex<Vec<String>>,
    body_reads: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            routes: Mutex::new(HashMap::new()),
            fallback: Mutex::new(Reply::status(404)),
            requests: Mutex::new(Vec::new()),
            body_reads: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn route(self, url: &str, reply: Reply) -> Self {
        let key = Url::parse(url).expect("route url").to_string();
        self.routes.lock().unwrap().insert(key, reply);
        self
    }

    pub fn fallback(self, reply: Reply) -> Self {
        *self.fallback.lock().unwrap() = reply;
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn body_reads(&self) -> usize {
        self.body_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &Url) -> Result<Box<dyn TransportResponse>, TransportError> {
        self.requests.lock().unwrap().push(url.to_string());
        let reply = self
            .routes
            .lock()
            .unwrap()
            .get(url.as_str())
            .cloned()
            .unwrap_or_else(|| self.fallback.lock().unwrap().clone());
        match reply {
            Reply::Fail(e) => Err(e),
            Reply::Response {
                status,
                headers,
                body,
            } => Ok(Box::new(ScriptedResponse {
                status,
                headers,
                body,
                reads: self.body_reads.clone(),
            })),
        }
    }
}

struct ScriptedResponse {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    reads: Arc<AtomicUsize>,
}

#[async_trait]
impl TransportResponse for ScriptedResponse {
    fn status(&self) -> u16 {
        self.status
    }

    fn header(&self, name: &str) -> Option<String> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.clone())
    }

    fn content_length(&self) -> Option<u64> {
        self.header("content-length").and_then(|v| v.parse().ok())
    }

    async fn read_body(&mut self, limit: usize) -> Result<Vec<u8>, TransportError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.body.iter().take(limit).copied().collect())
    }
}

/// Search off so tests only see the URLs they script.
pub fn test_config() -> ImporterConfig {
    ImporterConfig {
        search_enabled: false,
        ..ImporterConfig::default()
    }
}

pub fn fetcher_with(
    cfg: &ImporterConfig,
    transport: Arc<ScriptedTransport>,
    resolver: StaticResolver,
) -> Fetcher {
    let validator = UrlValidator::new(cfg, Arc::new(resolver));
    Fetcher::new(cfg, validator, transport)
}

pub fn importer_with(
    cfg: ImporterConfig,
    transport: Arc<ScriptedTransport>,
    resolver: StaticResolver,
) -> Importer {
    let cfg = cfg.sanitized();
    let fetcher = fetcher_with(&cfg, transport, resolver);
    Importer::new(cfg, fetcher)
}

/// Minimal uncompressed PDF, one text line per page.
pub fn pdf_bytes(pages: &[&str]) -> Vec<u8> {
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
                Operation::new("Tj", vec![Object::string_literal(*line)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(
            dictionary! {},
            content.encode().expect("encode page"),
        ));
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
    doc.save_to(&mut buf).expect("save pdf");
    buf
}

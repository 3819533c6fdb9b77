// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod config;
pub mod importer;
pub mod metrics;
pub mod profiles;

pub use crate::api::{router, AppState};
pub use crate::config::ImporterConfig;
pub use crate::importer::{ImportError, ImportRequest, ImportResult, Importer};
pub use crate::profiles::ProfileRegistry;

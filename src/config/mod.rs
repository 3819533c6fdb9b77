// src/config/mod.rs
pub mod importer;

pub use importer::ImporterConfig;

// src/profiles.rs
//! In-memory registry of IRB institution profiles.
//!
//! Profiles are free-form JSON objects keyed by `id`. The registry starts with
//! the built-in generic profile and grows as imports are saved.

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::RwLock;

use crate::importer::default_profile_id;

pub const DEFAULT_PROFILE_ID: &str = "generic_classroom_research_us_v1";

const BUILTIN_PROFILES: &[&str] = &[include_str!(
    "../config/profiles/generic_classroom_research_us_v1.json"
)];

/// Lightweight entry for profile pickers.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSummary {
    pub id: String,
    pub name: String,
    pub short_name: String,
    pub description: String,
    pub irb_office_label: String,
    pub version: String,
}

impl ProfileSummary {
    pub fn from_profile(p: &Value) -> Self {
        let s = |key: &str| p.get(key).and_then(Value::as_str).map(str::to_string);
        let name = s("name").unwrap_or_default();
        Self {
            id: s("id").unwrap_or_default(),
            short_name: s("shortName").unwrap_or_else(|| name.clone()),
            name,
            description: s("description").unwrap_or_default(),
            irb_office_label: s("irbOfficeLabel").unwrap_or_else(|| "IRB".to_string()),
            version: s("version").unwrap_or_else(|| "1.0".to_string()),
        }
    }
}

pub struct ProfileRegistry {
    inner: RwLock<BTreeMap<String, Value>>,
}

fn str_field<'a>(p: &'a Value, key: &str) -> &'a str {
    p.get(key).and_then(Value::as_str).map(str::trim).unwrap_or("")
}

impl ProfileRegistry {
    /// Registry seeded with the built-in profiles.
    pub fn with_builtin() -> Result<Self> {
        let mut map = BTreeMap::new();
        for raw in BUILTIN_PROFILES {
            let profile: Value =
                serde_json::from_str(raw).context("parse built-in IRB profile")?;
            let id = str_field(&profile, "id").to_string();
            if id.is_empty() {
                return Err(anyhow!("built-in IRB profile without id"));
            }
            map.insert(id, profile);
        }
        if !map.contains_key(DEFAULT_PROFILE_ID) {
            return Err(anyhow!("default IRB profile '{DEFAULT_PROFILE_ID}' missing"));
        }
        Ok(Self {
            inner: RwLock::new(map),
        })
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, BTreeMap<String, Value>> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn list(&self) -> Vec<ProfileSummary> {
        self.read().values().map(ProfileSummary::from_profile).collect()
    }

    /// The profile with `id`, or the default one when unknown or empty.
    pub fn get(&self, id: Option<&str>) -> Value {
        let guard = self.read();
        id.map(str::trim)
            .filter(|id| !id.is_empty())
            .and_then(|id| guard.get(id))
            .or_else(|| guard.get(DEFAULT_PROFILE_ID))
            .cloned()
            .unwrap_or_else(|| Value::Object(Default::default()))
    }

    pub fn exists(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    /// `imported_{slug}_v1`, suffixed `_2`, `_3`, ... until unused.
    pub fn make_imported_profile_id(&self, name: &str) -> String {
        let base = default_profile_id(name);
        let guard = self.read();
        let mut candidate = base.clone();
        let mut suffix = 2;
        while guard.contains_key(&candidate) {
            candidate = format!("{base}_{suffix}");
            suffix += 1;
        }
        candidate
    }

    /// Shallow-merge `profile` over any existing entry with the same id and
    /// return the stored result.
    pub fn upsert(&self, profile: Value) -> Result<Value> {
        let Value::Object(fields) = profile else {
            return Err(anyhow!("Profile must be a JSON object."));
        };
        let id = fields
            .get("id")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or("")
            .to_string();
        if id.is_empty() {
            return Err(anyhow!("Profile must include a non-empty 'id'."));
        }
        let has_name = fields
            .get("name")
            .and_then(Value::as_str)
            .is_some_and(|n| !n.trim().is_empty());
        if !has_name {
            return Err(anyhow!("Profile must include a non-empty 'name'."));
        }

        let mut guard = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let entry = guard
            .entry(id)
            .or_insert_with(|| Value::Object(Default::default()));
        if !entry.is_object() {
            *entry = Value::Object(Default::default());
        }
        if let Value::Object(existing) = entry {
            existing.extend(fields);
        }
        Ok(entry.clone())
    }
}

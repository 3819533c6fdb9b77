// src/importer/profile_draft.rs
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::importer::types::SourceDoc;

pub const IMPORTED_PROFILE_VERSION: &str = "importer-v1";
pub const MAX_SOURCE_LINKS: usize = 12;
pub const MAX_SOURCE_DOCUMENT_LINKS: usize = 18;

const REQUIRED_ATTACHMENTS: &str = "requiredManualAttachments";
const RECOMMENDED_ATTACHMENTS: &str = "recommendedManualAttachments";

/// Everything the draft is built from. Borrowed; the base profile is cloned.
pub struct DraftInputs<'a> {
    pub org_name: &'a str,
    pub profile_id: &'a str,
    pub base_profile: &'a Value,
    pub hits: &'a BTreeMap<&'static str, usize>,
    pub sources: &'a [SourceDoc],
    pub document_links: &'a [String],
    pub imported_at: DateTime<Utc>,
}

struct AttachmentRule {
    rule_id: &'static str,
    list: &'static str,
    id: &'static str,
    label: &'static str,
    reason: &'static str,
}

const ATTACHMENT_RULES: [AttachmentRule; 4] = [
    AttachmentRule {
        rule_id: "consent_template",
        list: REQUIRED_ATTACHMENTS,
        id: "institution_consent_template_check",
        label: "Institution Consent Template Alignment",
        reason: "Source pages mention consent templates/process requirements; align consent draft to local template language.",
    },
    AttachmentRule {
        rule_id: "training",
        list: REQUIRED_ATTACHMENTS,
        id: "research_training_documentation",
        label: "Human Subjects Training Proof",
        reason: "Source pages mention required research ethics training (e.g., CITI).",
    },
    AttachmentRule {
        rule_id: "recruitment_materials",
        list: REQUIRED_ATTACHMENTS,
        id: "recruitment_materials_copy",
        label: "Recruitment Materials Copy",
        reason: "Source pages mention recruitment material review.",
    },
    AttachmentRule {
        rule_id: "hipaa_health_data",
        list: RECOMMENDED_ATTACHMENTS,
        id: "hipaa_screening_note",
        label: "HIPAA / PHI Applicability Note",
        reason: "Source pages reference HIPAA/PHI; confirm whether health-data rules apply to your protocol.",
    },
];

/// Base profile plus imported identity, provenance and attachment hints.
pub fn assemble_profile(input: &DraftInputs<'_>) -> Value {
    let mut profile: Map<String, Value> = match input.base_profile {
        Value::Object(m) => m.clone(),
        _ => Map::new(),
    };
    let org = input.org_name;

    profile.insert("id".into(), json!(input.profile_id));
    profile.insert("name".into(), json!(format!("{org} IRB Draft Profile (Imported)")));
    profile.insert("shortName".into(), json!(format!("{org} Imported IRB")));
    profile.insert("version".into(), json!(IMPORTED_PROFILE_VERSION));
    profile.insert(
        "description".into(),
        json!(format!(
            "Draft imported profile for {org}. Generated from publicly available IRB/HRPP sources; requires human verification before use."
        )),
    );
    profile.insert("imported".into(), json!(true));
    profile.insert("importedAt".into(), json!(input.imported_at.to_rfc3339()));

    let source_links: Vec<&str> = input
        .sources
        .iter()
        .filter(|s| s.is_fetched())
        .map(|s| s.url.as_str())
        .take(MAX_SOURCE_LINKS)
        .collect();
    profile.insert("sourceLinks".into(), json!(source_links));
    profile.insert(
        "sourceDocumentLinks".into(),
        json!(input
            .document_links
            .iter()
            .take(MAX_SOURCE_DOCUMENT_LINKS)
            .collect::<Vec<_>>()),
    );
    let signals: Map<String, Value> = input
        .hits
        .iter()
        .filter(|(_, n)| **n > 0)
        .map(|(id, n)| (id.to_string(), json!(n)))
        .collect();
    profile.insert("importSignals".into(), Value::Object(signals));

    for rule in &ATTACHMENT_RULES {
        if input.hits.get(rule.rule_id).copied().unwrap_or(0) > 0 {
            ensure_attachment(&mut profile, rule.list, rule.id, rule.label, rule.reason);
        }
    }
    if !input.document_links.is_empty() {
        ensure_attachment(
            &mut profile,
            RECOMMENDED_ATTACHMENTS,
            "imported_form_link_review",
            "Imported IRB Form/Template Link Review",
            "Importer found possible IRB form/template links. Validate versions before submission.",
        );
    }
    // Present even when nothing was added.
    for list in [REQUIRED_ATTACHMENTS, RECOMMENDED_ATTACHMENTS] {
        let items = take_list(&mut profile, list);
        profile.insert(list.to_string(), Value::Array(items));
    }

    Value::Object(profile)
}

fn take_list(profile: &mut Map<String, Value>, key: &str) -> Vec<Value> {
    match profile.remove(key) {
        Some(Value::Array(items)) => items,
        _ => Vec::new(),
    }
}

/// Append unless an entry with the same `id` is already listed.
fn ensure_attachment(
    profile: &mut Map<String, Value>,
    list: &str,
    id: &str,
    label: &str,
    reason: &str,
) {
    let mut items = take_list(profile, list);
    let present = items
        .iter()
        .any(|item| item.get("id").and_then(Value::as_str).map(str::trim) == Some(id));
    if !present {
        items.push(json!({ "id": id, "label": label, "reason": reason }));
    }
    profile.insert(list.to_string(), Value::Array(items));
}

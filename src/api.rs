// src/api.rs
use std::sync::Arc;

use serde_json::json;
use shuttle_axum::axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::importer::{ImportRequest, Importer};
use crate::profiles::{ProfileRegistry, ProfileSummary, DEFAULT_PROFILE_ID};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ProfileRegistry>,
    pub importer: Arc<Importer>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/health", get(api_health))
        .route("/api/profiles", get(list_profiles))
        .route("/api/import-profile", post(import_profile))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ImportProfileReq {
    organization_name: Option<String>,
    organization_website: Option<String>,
    irb_page_url: Option<String>,
    raw_policy_text: Option<String>,
    base_profile_id: Option<String>,
    profile_id: Option<String>,
}

fn error_response(status: StatusCode, msg: impl Into<String>) -> Response {
    (status, Json(json!({ "ok": false, "error": msg.into() }))).into_response()
}

fn trimmed(v: Option<String>) -> String {
    v.map(|s| s.trim().to_string()).unwrap_or_default()
}

async fn api_health() -> Json<serde_json::Value> {
    Json(json!({
        "ok": true,
        "service": "IRB Profile Importer",
        "note": "Imported profiles are best-effort drafts; they do not approve or replace IRB review.",
    }))
}

async fn list_profiles(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "ok": true,
        "defaultProfileId": DEFAULT_PROFILE_ID,
        "profiles": state.registry.list(),
    }))
}

async fn import_profile(
    State(state): State<AppState>,
    body: Result<Json<ImportProfileReq>, JsonRejection>,
) -> Response {
    let Json(body) = match body {
        Ok(b) => b,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.body_text()),
    };

    let organization_name = trimmed(body.organization_name);
    if organization_name.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "'organizationName' is required");
    }

    let requested_id = trimmed(body.profile_id);
    let profile_id = if requested_id.is_empty() {
        state.registry.make_imported_profile_id(&organization_name)
    } else {
        requested_id
    };
    let base_profile_id = trimmed(body.base_profile_id);
    let base_profile = state
        .registry
        .get(Some(base_profile_id.as_str()).filter(|s| !s.is_empty()));

    let req = ImportRequest {
        organization_name,
        organization_website: trimmed(body.organization_website),
        irb_page_url: trimmed(body.irb_page_url),
        raw_policy_text: body.raw_policy_text.unwrap_or_default(),
        profile_id: Some(profile_id),
        base_profile: Some(base_profile),
    };

    let mut result = match state.importer.import_profile(req).await {
        Ok(r) => r,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
    };

    let active = match state.registry.upsert(result.profile_draft.clone()) {
        Ok(saved) => {
            let summary = ProfileSummary::from_profile(&saved);
            result.profile_draft = saved;
            summary
        }
        Err(e) => {
            tracing::warn!(target: "importer", error = %e, "imported profile not saved");
            return error_response(StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    Json(json!({
        "ok": true,
        "activeProfile": active,
        "importResult": result,
        "profiles": state.registry.list(),
    }))
    .into_response()
}

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::http::server::AppState;
use crate::providers::ProviderKind;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub uptime_secs: u64,
    pub providers: Vec<ProviderKind>,
    pub stored_credentials: usize,
    pub cache_entries: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSummary {
    pub entries: usize,
    pub ttl_secs: u64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PutCredential {
    pub api_key: String,
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let gateway = &state.gateway;
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        uptime_secs: state.started_at.elapsed().as_secs(),
        providers: gateway.registry().kinds(),
        stored_credentials: gateway.credentials().store().len(),
        cache_entries: gateway.cache().len(),
    })
}

pub async fn get_cache(State(state): State<AppState>) -> Json<CacheSummary> {
    Json(CacheSummary {
        entries: state.gateway.cache().len(),
        ttl_secs: state.gateway.settings().cache_ttl.as_secs(),
    })
}

fn parse_provider(raw: &str) -> Result<ProviderKind, Response> {
    raw.parse::<ProviderKind>()
        .map_err(|e| (StatusCode::BAD_REQUEST, e).into_response())
}

/// `PUT /admin/credentials/{owner}/{provider}`: encrypt and store, replacing any previous key.
pub async fn put_credential(
    State(state): State<AppState>,
    Path((owner, provider)): Path<(String, String)>,
    Json(body): Json<PutCredential>,
) -> Response {
    let provider = match parse_provider(&provider) {
        Ok(p) => p,
        Err(response) => return response,
    };
    if owner.trim().is_empty() || body.api_key.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "owner and apiKey must not be empty").into_response();
    }

    let credentials = state.gateway.credentials();
    if let Err(e) = credentials.put(&owner, provider, body.api_key.trim()).await {
        tracing::error!(
            owner = %owner,
            provider = %provider,
            error = %e,
            "Failed to store credential"
        );
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to store credential").into_response();
    }
    if let Err(e) = credentials.store().persist().await {
        tracing::error!(error = %e, "Failed to persist credential store");
    }
    StatusCode::NO_CONTENT.into_response()
}

/// `DELETE /admin/credentials/{owner}/{provider}`.
pub async fn delete_credential(
    State(state): State<AppState>,
    Path((owner, provider)): Path<(String, String)>,
) -> Response {
    let provider = match parse_provider(&provider) {
        Ok(p) => p,
        Err(response) => return response,
    };

    let credentials = state.gateway.credentials();
    match credentials.remove(&owner, provider).await {
        Ok(true) => {
            if let Err(e) = credentials.store().persist().await {
                tracing::error!(error = %e, "Failed to persist credential store");
            }
            StatusCode::NO_CONTENT.into_response()
        }
        Ok(false) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            tracing::error!(
                owner = %owner,
                provider = %provider,
                error = %e,
                "Failed to remove credential"
            );
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

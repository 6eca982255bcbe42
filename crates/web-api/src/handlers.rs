use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use position_guard_orchestrator::{
    AccountRegistry, AccountState, AccountStatus, IngestEvent, StartOptions, TickReport,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub accounts: usize,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct AccountListResponse {
    pub accounts: Vec<AccountStatus>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub symbol: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickRequest {
    pub only_symbols: Option<Vec<String>>,
}

/// A forwarder may post one event or a batch.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum EventsRequest {
    One(IngestEvent),
    Many(Vec<IngestEvent>),
}

impl EventsRequest {
    fn into_events(self) -> Vec<IngestEvent> {
        match self {
            Self::One(event) => vec![event],
            Self::Many(events) => events,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsResponse {
    pub accepted: usize,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
}

pub async fn health(State(registry): State<Arc<AccountRegistry>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        accounts: registry.list_accounts().await.len(),
        timestamp: Utc::now(),
    })
}

/// Lists all registered accounts with their last published status.
pub async fn list_accounts(
    State(registry): State<Arc<AccountRegistry>>,
) -> Json<AccountListResponse> {
    Json(AccountListResponse {
        accounts: registry.statuses().await,
    })
}

/// Gets the status of a specific account.
///
/// # Errors
/// Returns `StatusCode::NOT_FOUND` if the account was never started, or
/// `StatusCode::INTERNAL_SERVER_ERROR` if status retrieval fails.
pub async fn get_account_status(
    State(registry): State<Arc<AccountRegistry>>,
    Path(account_id): Path<String>,
) -> Result<Json<AccountStatus>, StatusCode> {
    let handle = registry
        .get_account(&account_id)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;

    let status = handle
        .get_status()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(status))
}

/// Starts monitoring an account, creating its actor on first use.
///
/// # Errors
/// Returns `StatusCode::INTERNAL_SERVER_ERROR` if the start command fails.
pub async fn start_account(
    State(registry): State<Arc<AccountRegistry>>,
    Path(account_id): Path<String>,
    options: Option<Json<StartOptions>>,
) -> Result<StatusCode, StatusCode> {
    let options = options.map(|Json(options)| options).unwrap_or_default();
    let handle = registry.get_or_spawn(&account_id).await;

    handle
        .start(options)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(StatusCode::ACCEPTED)
}

/// Stops an account.
///
/// # Errors
/// Returns `StatusCode::NOT_FOUND` if the account doesn't exist, or
/// `StatusCode::INTERNAL_SERVER_ERROR` if the stop command fails.
pub async fn stop_account(
    State(registry): State<Arc<AccountRegistry>>,
    Path(account_id): Path<String>,
) -> Result<StatusCode, StatusCode> {
    let handle = registry
        .get_account(&account_id)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;

    handle
        .stop()
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(StatusCode::ACCEPTED)
}

/// Reloads an account's strategies; `{symbol}` also subscribes that symbol.
///
/// # Errors
/// Returns `StatusCode::NOT_FOUND` if the account doesn't exist,
/// `StatusCode::CONFLICT` if it is not running, or
/// `StatusCode::INTERNAL_SERVER_ERROR` if the refresh command fails.
pub async fn refresh_account(
    State(registry): State<Arc<AccountRegistry>>,
    Path(account_id): Path<String>,
    request: Option<Json<RefreshRequest>>,
) -> Result<StatusCode, StatusCode> {
    let request = request.map(|Json(request)| request).unwrap_or_default();
    let handle = registry
        .get_account(&account_id)
        .await
        .ok_or(StatusCode::NOT_FOUND)?;

    if handle.latest_status().state != AccountState::Running {
        return Err(StatusCode::CONFLICT);
    }

    handle
        .refresh(request.symbol)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(StatusCode::ACCEPTED)
}

/// Runs one poll-driven evaluation pass and returns its report.
///
/// # Errors
/// Returns `StatusCode::BAD_GATEWAY` with the cause if credentials or
/// strategies cannot be loaded.
pub async fn tick_account(
    State(registry): State<Arc<AccountRegistry>>,
    Path(account_id): Path<String>,
    request: Option<Json<TickRequest>>,
) -> Result<Json<TickReport>, ApiError> {
    let request = request.map(|Json(request)| request).unwrap_or_default();
    let handle = registry.get_or_spawn(&account_id).await;

    let report = handle.tick(request.only_symbols).await.map_err(|e| {
        tracing::warn!("Tick for account {} failed: {:#}", account_id, e);
        api_error(StatusCode::BAD_GATEWAY, format!("{e:#}"))
    })?;

    Ok(Json(report))
}

/// Accepts forwarded position and candle-direction events.
///
/// # Errors
/// Returns `StatusCode::NOT_FOUND` if the account doesn't exist,
/// `StatusCode::CONFLICT` if it is not running, or
/// `StatusCode::INTERNAL_SERVER_ERROR` if an event cannot be delivered.
pub async fn ingest_events(
    State(registry): State<Arc<AccountRegistry>>,
    Path(account_id): Path<String>,
    Json(request): Json<EventsRequest>,
) -> Result<(StatusCode, Json<EventsResponse>), ApiError> {
    let handle = registry
        .get_account(&account_id)
        .await
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("unknown account {account_id}")))?;

    let state = handle.latest_status().state;
    if state != AccountState::Running {
        return Err(api_error(
            StatusCode::CONFLICT,
            format!("account {account_id} is not running ({state:?})"),
        ));
    }

    let events = request.into_events();
    let accepted = events.len();
    for event in events {
        handle
            .ingest(event)
            .await
            .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    }

    Ok((StatusCode::ACCEPTED, Json(EventsResponse { accepted })))
}

//! API request handlers

use crate::core::error::{LendError, Result};
use crate::core::lending::LendingService;
use crate::db::models::Loan;
use crate::providers::MediaKind;
use crate::resolver::Resolver;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared state for all API handlers
#[derive(Clone)]
pub struct AppState {
    pub lending: Arc<LendingService>,
    pub resolver: Arc<Resolver>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: i64,
    pub available_kinds: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub total_loans: usize,
    pub overdue_count: usize,
    pub kind_counts: Vec<KindCount>,
}

#[derive(Debug, Serialize)]
pub struct KindCount {
    pub kind: String,
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct LoansQuery {
    pub kind: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoansResponse {
    pub user_id: i64,
    pub loans: Vec<Loan>,
}

/// Handler for GET /status - service health and resolvable kinds
pub async fn get_status(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let uptime = chrono::Utc::now() - state.started_at;
    Ok(Json(StatusResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: uptime.num_seconds(),
        available_kinds: state
            .resolver
            .available_kinds()
            .into_iter()
            .map(|k| k.as_str().to_string())
            .collect(),
    }))
}

/// Handler for GET /api/stats - ledger-wide counts
pub async fn get_stats(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let stats = state.lending.stats().await?;
    Ok(Json(StatsResponse {
        total_loans: stats.total_loans,
        overdue_count: stats.overdue_count,
        kind_counts: stats
            .kind_counts
            .into_iter()
            .map(|(kind, count)| KindCount { kind, count })
            .collect(),
    }))
}

/// Handler for GET /api/loans/:user_id - a user's active loans,
/// optionally filtered with ?kind=
pub async fn get_user_loans(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<LoansQuery>,
) -> Result<impl IntoResponse> {
    let kind = query
        .kind
        .as_deref()
        .map(|k| k.parse::<MediaKind>())
        .transpose()?;

    let loans = state.lending.loans_for_user(user_id, kind).await?;
    Ok(Json(LoansResponse { user_id, loans }))
}

/// Handler for GET /api/overdue - all overdue loans
pub async fn get_overdue(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let loans = state.lending.overdue().await?;
    Ok(Json(loans))
}

/// Handler for GET /api/returns - recent return-log entries
pub async fn get_recent_returns(
    State(state): State<AppState>,
    Query(query): Query<ReturnsQuery>,
) -> Result<impl IntoResponse> {
    let limit = query.limit.unwrap_or(20);
    if limit == 0 || limit > 100 {
        return Err(LendError::InvalidRequest(
            "limit must be between 1 and 100".to_string(),
        ));
    }
    let entries = state.lending.recent_returns(limit).await?;
    Ok(Json(entries))
}

#[derive(Debug, Deserialize)]
pub struct ReturnsQuery {
    pub limit: Option<usize>,
}

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use super::models::*;
use crate::error::AppResult;
use crate::intake::{AccountAdmin, OutcomeIntake, Pick, Profile, WagerIntake};
use crate::ledger::models::{keys, Sport};
use crate::ledger::LedgerAccessor;
use crate::middleware::ValidatedJson;
use crate::settlement::{PassStatus, SettlementEngine, SettlementReport};
use crate::stats::{self, HistoryEntry, StreakEntry};
use crate::store::DocumentStore;

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<LedgerAccessor>,
    pub wagers: Arc<WagerIntake>,
    pub outcomes: Arc<OutcomeIntake>,
    pub accounts: Arc<AccountAdmin>,
    pub settlement: Arc<SettlementEngine>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = state.ledger.store();
    let status = match store.read(keys::OUTCOME_LOG).await {
        Ok(_) => "healthy",
        Err(e) => {
            warn!("⚠️ Store health probe failed: {}", e);
            "degraded"
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        timestamp: Utc::now(),
        store: store.name().to_string(),
    })
}

// ========== ACCOUNTS ==========

/// POST /users
pub async fn register_user(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<RegisterUserRequest>,
) -> AppResult<(StatusCode, Json<AccountResponse>)> {
    let entry = state
        .accounts
        .register(&request.user, request.color, request.discord)
        .await?;
    Ok((StatusCode::CREATED, Json(entry.into())))
}

/// GET /users
pub async fn list_users(State(state): State<AppState>) -> AppResult<Json<Vec<AccountResponse>>> {
    let accounts = state.accounts.list_accounts().await?;
    Ok(Json(accounts.into_iter().map(AccountResponse::from).collect()))
}

/// GET /users/:user
pub async fn get_profile(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> AppResult<Json<Profile>> {
    Ok(Json(state.accounts.profile(&user).await?))
}

/// GET /users/:user/wagers
pub async fn get_user_wagers(
    State(state): State<AppState>,
    Path(user): Path<String>,
) -> AppResult<Json<Vec<HistoryEntry>>> {
    let log = state.ledger.wager_log().await?;
    Ok(Json(stats::history(&log, &user)))
}

/// PUT /admin/users/:user
pub async fn admin_edit_user(
    State(state): State<AppState>,
    Path(user): Path<String>,
    ValidatedJson(request): ValidatedJson<AdminEditRequest>,
) -> AppResult<Json<AccountResponse>> {
    let entry = state
        .accounts
        .admin_edit(&user, request.points, request.color, request.discord)
        .await?;
    Ok(Json(entry.into()))
}

// ========== WAGERS ==========

/// POST /wagers
pub async fn place_wager(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<PlaceWagerRequest>,
) -> AppResult<(StatusCode, Json<PlaceWagerResponse>)> {
    info!("🎟️ Wager request from {} on {}", request.bettor, request.pick.contest_id);

    let id = state
        .wagers
        .place_wager(&request.bettor, Pick::from(request.pick))
        .await?;
    let balance = state.ledger.balance(request.bettor.trim()).await?.map(|b| b.points);

    Ok((
        StatusCode::CREATED,
        Json(PlaceWagerResponse {
            wager_ids: vec![id],
            balance,
        }),
    ))
}

/// POST /slips
pub async fn place_slip(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<PlaceSlipRequest>,
) -> AppResult<(StatusCode, Json<PlaceWagerResponse>)> {
    info!("🎟️ Slip with {} picks from {}", request.picks.len(), request.bettor);

    let picks = request.picks.into_iter().map(Pick::from).collect();
    let wager_ids = state.wagers.place_slip(&request.bettor, picks).await?;
    let balance = state.ledger.balance(request.bettor.trim()).await?.map(|b| b.points);

    Ok((StatusCode::CREATED, Json(PlaceWagerResponse { wager_ids, balance })))
}

// ========== CONTESTS ==========

/// GET /contests
pub async fn list_contests(State(state): State<AppState>) -> AppResult<Json<Vec<ContestResponse>>> {
    let log = state.outcomes.contests().await?;
    Ok(Json(
        log.contests
            .into_iter()
            .map(|(id, contest)| ContestResponse::new(&id, contest))
            .collect(),
    ))
}

/// GET /contests/:contest_id
pub async fn get_contest(
    State(state): State<AppState>,
    Path(contest_id): Path<String>,
) -> AppResult<Json<ContestResponse>> {
    let contest = state.outcomes.contest(&contest_id).await?;
    Ok(Json(ContestResponse::new(&contest_id, contest)))
}

/// POST /contests/:contest_id/results
pub async fn record_result(
    State(state): State<AppState>,
    Path(contest_id): Path<String>,
    ValidatedJson(request): ValidatedJson<RecordResultRequest>,
) -> AppResult<Json<ContestResponse>> {
    let contest = state
        .outcomes
        .record_result(
            &contest_id,
            request.sport,
            &request.match_id,
            &request.winning_selection,
            request.round.as_deref(),
            request.method.as_deref(),
        )
        .await?;
    Ok(Json(ContestResponse::new(&contest_id, contest)))
}

/// POST /contests/:contest_id/close
pub async fn close_contest(
    State(state): State<AppState>,
    Path(contest_id): Path<String>,
) -> AppResult<Json<ContestResponse>> {
    let contest = state.outcomes.close_contest(&contest_id).await?;
    Ok(Json(ContestResponse::new(&contest_id, contest)))
}

// ========== SETTLEMENT & STATS ==========

/// POST /settlement/run
pub async fn run_settlement(State(state): State<AppState>) -> (StatusCode, Json<SettlementReport>) {
    let report = state.settlement.run_settlement_pass().await;
    let status = match report.status {
        PassStatus::Failed => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::OK,
    };
    (status, Json(report))
}

/// GET /stats/streaks?sport=ufc
pub async fn get_streaks(
    State(state): State<AppState>,
    Query(query): Query<StreakQuery>,
) -> AppResult<Json<Vec<StreakEntry>>> {
    let log = state.ledger.wager_log().await?;
    Ok(Json(stats::longest_streaks(&log, query.sport.unwrap_or(Sport::Ufc))))
}

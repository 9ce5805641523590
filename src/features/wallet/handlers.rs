use super::models::{CreateWalletEntryDto, WalletEntry, WalletOverview};
use super::repository;
use crate::features::auth::{CurrentUser, Role};
use crate::shared::database::lock_connection;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::extract::ValidatedJson;
use crate::AppState;
use axum::extract::{Path, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/wallet", get(get_overview))
        .route("/api/wallet/entries", post(create_entry))
        .route("/api/wallet/entries/:id", delete(delete_entry))
}

async fn get_overview(State(state): State<AppState>) -> AppResult<Json<WalletOverview>> {
    let conn = lock_connection(&state.db)?;
    Ok(Json(repository::overview(&conn)?))
}

async fn create_entry(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidatedJson(dto): ValidatedJson<CreateWalletEntryDto>,
) -> AppResult<Json<WalletEntry>> {
    user.require_role(&[Role::Admin, Role::User])?;
    if dto.source.is_settlement() {
        return Err(AppError::validation(
            "Sumber REFUND/REIMBURSE hanya dibuat dari penyelesaian tugas belanja",
        ));
    }
    let conn = lock_connection(&state.db)?;
    let wallet = repository::global_wallet(&conn)?;
    Ok(Json(repository::create_entry(&conn, wallet.id, user.id, &dto)?))
}

async fn delete_entry(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    user.require_role(&[Role::Admin, Role::User])?;
    let conn = lock_connection(&state.db)?;
    repository::delete_entry(&conn, id)?;
    Ok(Json(json!({ "success": true })))
}

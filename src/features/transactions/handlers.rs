use super::models::{
    BalanceQuery, BalanceResponse, CreateTransactionDto, Transaction, TransactionLedger,
    TransactionQuery, UpdateTransactionDto,
};
use super::repository;
use crate::features::auth::{CurrentUser, Role};
use crate::shared::database::lock_connection;
use crate::shared::errors::AppResult;
use crate::shared::extract::ValidatedJson;
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde_json::{json, Value};

/// 取引を編集できる役割
const WRITER_ROLES: &[Role] = &[Role::Admin, Role::User];

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/transactions",
            get(list_transactions).post(create_transaction),
        )
        .route("/api/transactions/balance", get(get_balance))
        .route(
            "/api/transactions/:id",
            put(update_transaction)
                .delete(delete_transaction)
                .get(get_transaction),
        )
}

async fn list_transactions(
    State(state): State<AppState>,
    Query(query): Query<TransactionQuery>,
) -> AppResult<Json<TransactionLedger>> {
    let conn = lock_connection(&state.db)?;
    Ok(Json(repository::ledger(
        &conn,
        query.from.as_deref(),
        query.to.as_deref(),
    )?))
}

async fn get_balance(
    State(state): State<AppState>,
    Query(query): Query<BalanceQuery>,
) -> AppResult<Json<BalanceResponse>> {
    let conn = lock_connection(&state.db)?;
    let balance = repository::balance_before(&conn, &query.date, query.exclude_id)?;
    Ok(Json(BalanceResponse {
        date: query.date,
        balance,
    }))
}

async fn get_transaction(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Transaction>> {
    let conn = lock_connection(&state.db)?;
    Ok(Json(repository::find_by_id(&conn, id)?))
}

async fn create_transaction(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidatedJson(dto): ValidatedJson<CreateTransactionDto>,
) -> AppResult<Json<Transaction>> {
    user.require_role(WRITER_ROLES)?;
    let conn = lock_connection(&state.db)?;
    Ok(Json(repository::create(&conn, user.id, &dto)?))
}

async fn update_transaction(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    ValidatedJson(dto): ValidatedJson<UpdateTransactionDto>,
) -> AppResult<Json<Transaction>> {
    user.require_role(WRITER_ROLES)?;
    let conn = lock_connection(&state.db)?;
    Ok(Json(repository::update(&conn, id, &dto)?))
}

async fn delete_transaction(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    user.require_role(WRITER_ROLES)?;
    let conn = lock_connection(&state.db)?;
    repository::soft_delete(&conn, id)?;
    Ok(Json(json!({ "success": true })))
}

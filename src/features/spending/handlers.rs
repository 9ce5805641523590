use super::models::{
    ChangeStatusDto, CreateReceiptDto, CreateSpendingTaskDto, SpendingQuery, SpendingReceipt,
    SpendingStatus, SpendingTask, SpendingTaskDetail, SpendingTaskWithSummary, StatusLabel,
    UpdateSpendingTaskDto,
};
use super::repository;
use crate::features::auth::{CurrentUser, Role};
use crate::shared::database::lock_connection;
use crate::shared::errors::AppResult;
use crate::shared::extract::ValidatedJson;
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

const WRITER_ROLES: &[Role] = &[Role::Admin, Role::User];

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/spending-tasks", get(list_tasks).post(create_task))
        .route("/api/spending-tasks/status-labels", get(status_labels))
        .route(
            "/api/spending-tasks/:id",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/api/spending-tasks/:id/status", post(change_status))
        .route("/api/spending-tasks/:id/close", post(close_task))
        .route("/api/spending-tasks/:id/receipts", post(add_receipt))
        .route("/api/spending-receipts/:id", delete(delete_receipt))
}

async fn status_labels() -> Json<Vec<StatusLabel>> {
    Json(SpendingStatus::all_labels())
}

async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<SpendingQuery>,
) -> AppResult<Json<Vec<SpendingTaskWithSummary>>> {
    let conn = lock_connection(&state.db)?;
    Ok(Json(repository::find_all(&conn, query.status)?))
}

async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<SpendingTaskDetail>> {
    let conn = lock_connection(&state.db)?;
    Ok(Json(repository::find_detail(&conn, id)?))
}

async fn create_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidatedJson(dto): ValidatedJson<CreateSpendingTaskDto>,
) -> AppResult<Json<SpendingTask>> {
    user.require_role(WRITER_ROLES)?;
    let conn = lock_connection(&state.db)?;
    Ok(Json(repository::create(&conn, user.id, &dto)?))
}

async fn update_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    ValidatedJson(dto): ValidatedJson<UpdateSpendingTaskDto>,
) -> AppResult<Json<SpendingTask>> {
    user.require_role(WRITER_ROLES)?;
    let conn = lock_connection(&state.db)?;
    Ok(Json(repository::update(&conn, id, &dto)?))
}

async fn delete_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    user.require_role(WRITER_ROLES)?;
    let conn = lock_connection(&state.db)?;
    repository::delete(&conn, id)?;
    Ok(Json(json!({ "success": true })))
}

async fn change_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    ValidatedJson(dto): ValidatedJson<ChangeStatusDto>,
) -> AppResult<Json<SpendingTask>> {
    user.require_role(WRITER_ROLES)?;
    let conn = lock_connection(&state.db)?;
    Ok(Json(repository::change_status(
        &conn,
        id,
        dto.status,
        user.id,
        dto.record_to_wallet,
    )?))
}

async fn close_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<SpendingTask>> {
    user.require_role(WRITER_ROLES)?;
    let conn = lock_connection(&state.db)?;
    Ok(Json(repository::close(&conn, id)?))
}

/// レシートは認証済みであれば誰でも登録できる
async fn add_receipt(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    ValidatedJson(dto): ValidatedJson<CreateReceiptDto>,
) -> AppResult<Json<SpendingReceipt>> {
    let conn = lock_connection(&state.db)?;
    Ok(Json(repository::add_receipt(&conn, id, user.id, &dto)?))
}

/// 登録者本人、またはADMIN/USERのみ削除できる
async fn delete_receipt(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    let conn = lock_connection(&state.db)?;
    let receipt = repository::find_receipt(&conn, id)?;
    if receipt.created_by != user.id {
        user.require_role(WRITER_ROLES)?;
    }
    repository::delete_receipt(&conn, id)?;
    Ok(Json(json!({ "success": true })))
}

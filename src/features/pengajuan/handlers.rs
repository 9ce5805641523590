use super::models::{CreatePengajuanDto, Pengajuan, PengajuanDetail};
use super::repository;
use crate::features::approval::{
    approver_recipients, requester_phone, ApprovalQuery, Decision, DecisionDto,
};
use crate::features::auth::repository as user_repository;
use crate::features::auth::{CurrentUser, Role, SessionUser};
use crate::services::whatsapp::notify_best_effort;
use crate::shared::database::lock_connection;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::extract::ValidatedJson;
use crate::shared::utils::format_rupiah;
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/pengajuan", get(list_pengajuan).post(create_pengajuan))
        .route(
            "/api/pengajuan/:id",
            get(get_pengajuan).delete(delete_pengajuan),
        )
        .route("/api/pengajuan/:id/approve", post(approve_pengajuan))
        .route("/api/pengajuan/:id/reject", post(reject_pengajuan))
}

/// 承認者向けの新規申請通知
fn new_request_message(detail: &PengajuanDetail, requester: &str) -> String {
    let mut message = format!(
        "*Pengajuan Baru #{}*\nDiajukan oleh: {}\n\n",
        detail.pengajuan.id, requester
    );
    for (index, item) in detail.items.iter().enumerate() {
        message.push_str(&format!(
            "{}. {} ({})\n",
            index + 1,
            item.requirement,
            format_rupiah(item.cost_estimation)
        ));
    }
    message.push_str(&format!(
        "\nTotal estimasi: {}",
        format_rupiah(detail.total_cost_estimation)
    ));
    if let Some(notes) = &detail.pengajuan.notes {
        message.push_str(&format!("\nCatatan: {notes}"));
    }
    message
}

/// 申請者向けの結果通知
fn decision_message(pengajuan: &Pengajuan) -> String {
    let mut message = format!(
        "Pengajuan #{} Anda telah *{}*.",
        pengajuan.id,
        pengajuan.status.label()
    );
    if let Some(note) = &pengajuan.decision_note {
        message.push_str(&format!("\nCatatan: {note}"));
    }
    message
}

async fn list_pengajuan(
    State(state): State<AppState>,
    Query(query): Query<ApprovalQuery>,
) -> AppResult<Json<Vec<PengajuanDetail>>> {
    let conn = lock_connection(&state.db)?;
    Ok(Json(repository::find_all(&conn, query.status)?))
}

async fn get_pengajuan(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<PengajuanDetail>> {
    let conn = lock_connection(&state.db)?;
    Ok(Json(repository::find_detail(&conn, id)?))
}

async fn create_pengajuan(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidatedJson(dto): ValidatedJson<CreatePengajuanDto>,
) -> AppResult<Json<PengajuanDetail>> {
    let (detail, recipients, message) = {
        let conn = lock_connection(&state.db)?;
        let detail = repository::create(&conn, user.id, &dto)?;
        let requester = user_repository::get_by_id(&conn, user.id)?.name;
        let recipients = approver_recipients(&conn, state.notifier.as_ref())?;
        let message = new_request_message(&detail, &requester);
        (detail, recipients, message)
    };

    if recipients.is_empty() {
        log::warn!(
            "承認者の電話番号が無いため通知を送信しません: pengajuan_id={}",
            detail.pengajuan.id
        );
    }
    for to in &recipients {
        notify_best_effort(state.notifier.as_ref(), to, &message).await;
    }

    Ok(Json(detail))
}

async fn decide(
    state: AppState,
    user: &SessionUser,
    id: i64,
    decision: Decision,
    dto: Option<ValidatedJson<DecisionDto>>,
) -> AppResult<Json<Pengajuan>> {
    user.require_role(&[Role::Admin])?;
    let note = dto.and_then(|ValidatedJson(dto)| dto.note);

    let (pengajuan, phone) = {
        let conn = lock_connection(&state.db)?;
        let pengajuan = repository::decide(&conn, id, user.id, decision, note)?;
        let phone = requester_phone(&conn, pengajuan.created_by)?;
        (pengajuan, phone)
    };

    if let Some(phone) = phone {
        notify_best_effort(state.notifier.as_ref(), &phone, &decision_message(&pengajuan)).await;
    }

    Ok(Json(pengajuan))
}

async fn approve_pengajuan(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    dto: Option<ValidatedJson<DecisionDto>>,
) -> AppResult<Json<Pengajuan>> {
    decide(state, &user, id, Decision::Approve, dto).await
}

async fn reject_pengajuan(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    dto: Option<ValidatedJson<DecisionDto>>,
) -> AppResult<Json<Pengajuan>> {
    decide(state, &user, id, Decision::Reject, dto).await
}

/// 申請者本人またはADMINのみ、PENDINGの間だけ削除できる
async fn delete_pengajuan(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    let conn = lock_connection(&state.db)?;
    let pengajuan = repository::find_by_id(&conn, id)?;
    if pengajuan.created_by != user.id && !user.is_admin() {
        return Err(AppError::forbidden("他のユーザーの申請は削除できません"));
    }
    repository::delete(&conn, id)?;
    Ok(Json(json!({ "success": true })))
}

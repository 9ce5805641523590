use super::models::{
    CreatePerizinanDto, Perizinan, PerizinanCreated, PublicPerizinanView, ReissueTokenDto,
    TokenReissued,
};
use super::repository;
use super::token::{approval_link, generate_approval_token, IssuedToken};
use crate::features::approval::{
    approver_recipients, requester_phone, ApprovalQuery, Decision, DecisionDto,
};
use crate::features::auth::repository as user_repository;
use crate::features::auth::{CurrentUser, Role, SessionUser};
use crate::services::whatsapp::notify_best_effort;
use crate::shared::database::lock_connection;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::extract::ValidatedJson;
use crate::shared::utils::{format_rupiah, format_timestamp};
use crate::AppState;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};

/// 承認リンク用の認証不要ルート
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/api/public/perizinan/:token", get(view_by_token))
        .route("/api/public/perizinan/:token/approve", post(approve_by_token))
        .route("/api/public/perizinan/:token/reject", post(reject_by_token))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/perizinan", get(list_perizinan).post(create_perizinan))
        .route(
            "/api/perizinan/:id",
            get(get_perizinan).delete(delete_perizinan),
        )
        .route("/api/perizinan/:id/approve", post(approve_perizinan))
        .route("/api/perizinan/:id/reject", post(reject_perizinan))
        .route("/api/perizinan/:id/token", post(reissue_token))
}

/// 承認者向けの依頼メッセージ
fn approval_request_message(
    perizinan: &Perizinan,
    requester: &str,
    link: &str,
    token: &IssuedToken,
) -> String {
    let mut message = format!(
        "*Permohonan Izin Perjalanan #{}*\nPemohon: {}\nKeperluan: {}\nTujuan: {}\nTanggal: {}\nPenumpang: {} orang\nEstimasi biaya: {}",
        perizinan.id,
        requester,
        perizinan.purpose,
        perizinan.destination,
        perizinan.trip_date,
        perizinan.passenger_count,
        format_rupiah(perizinan.cost_estimate)
    );
    if let Some(notes) = &perizinan.notes {
        message.push_str(&format!("\nCatatan: {notes}"));
    }
    message.push_str(&format!(
        "\n\nSetujui atau tolak melalui tautan berikut (berlaku sampai {}):\n{link}",
        format_timestamp(&token.expires_at)
    ));
    message
}

/// 申請者向けの結果通知
fn decision_message(perizinan: &Perizinan) -> String {
    let mut message = format!(
        "Permohonan izin perjalanan #{} ke {} pada {} telah *{}*.",
        perizinan.id,
        perizinan.destination,
        perizinan.trip_date,
        perizinan.status.label()
    );
    if let Some(note) = &perizinan.decision_note {
        message.push_str(&format!("\nCatatan: {note}"));
    }
    message
}

/// 承認依頼を送信する
///
/// # 戻り値
/// 1件以上送信に成功した場合はtrue
async fn send_approval_request(state: &AppState, recipients: &[String], message: &str) -> bool {
    let mut sent = false;
    for to in recipients {
        match state.notifier.send_message(to, message).await {
            Ok(()) => sent = true,
            Err(e) => log::error!("承認依頼の送信に失敗しました（処理は継続します）: to={to}, error={e}"),
        }
    }
    sent
}

/// 申請者へ結果を通知する（失敗してもエラーにはしない）
async fn notify_requester(state: &AppState, perizinan: &Perizinan) {
    let phone = lock_connection(&state.db)
        .and_then(|conn| requester_phone(&conn, perizinan.created_by));
    match phone {
        Ok(Some(phone)) => {
            notify_best_effort(state.notifier.as_ref(), &phone, &decision_message(perizinan))
                .await
        }
        Ok(None) => log::debug!("申請者の電話番号が未登録です: user_id={}", perizinan.created_by),
        Err(e) => log::error!("申請者の電話番号を取得できませんでした: {e}"),
    }
}

async fn list_perizinan(
    State(state): State<AppState>,
    Query(query): Query<ApprovalQuery>,
) -> AppResult<Json<Vec<Perizinan>>> {
    let conn = lock_connection(&state.db)?;
    Ok(Json(repository::find_all(&conn, query.status)?))
}

async fn get_perizinan(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<Perizinan>> {
    let conn = lock_connection(&state.db)?;
    Ok(Json(repository::find_by_id(&conn, id)?))
}

async fn create_perizinan(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidatedJson(dto): ValidatedJson<CreatePerizinanDto>,
) -> AppResult<Json<PerizinanCreated>> {
    let token = generate_approval_token(state.config.approval_token_valid_hours)?;
    let link = approval_link(&state.config.app_base_url, &token.token);

    let (perizinan, recipients, message) = {
        let conn = lock_connection(&state.db)?;
        let perizinan = repository::create(&conn, user.id, &dto, &token)?;
        let requester = user_repository::get_by_id(&conn, user.id)?.name;
        let recipients = approver_recipients(&conn, state.notifier.as_ref())?;
        let message = approval_request_message(&perizinan, &requester, &link, &token);
        (perizinan, recipients, message)
    };

    if recipients.is_empty() {
        log::warn!(
            "承認者の電話番号が無いため承認依頼を送信しません: perizinan_id={}",
            perizinan.id
        );
    }
    let notification_sent = send_approval_request(&state, &recipients, &message).await;

    Ok(Json(PerizinanCreated {
        perizinan,
        approval_link: link,
        notification_sent,
    }))
}

async fn decide(
    state: AppState,
    user: &SessionUser,
    id: i64,
    decision: Decision,
    dto: Option<ValidatedJson<DecisionDto>>,
) -> AppResult<Json<Perizinan>> {
    user.require_role(&[Role::Admin])?;
    let note = dto.and_then(|ValidatedJson(dto)| dto.note);

    let perizinan = {
        let conn = lock_connection(&state.db)?;
        repository::decide_in_app(&conn, id, user.id, decision, note)?
    };
    notify_requester(&state, &perizinan).await;
    Ok(Json(perizinan))
}

async fn approve_perizinan(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    dto: Option<ValidatedJson<DecisionDto>>,
) -> AppResult<Json<Perizinan>> {
    decide(state, &user, id, Decision::Approve, dto).await
}

async fn reject_perizinan(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    dto: Option<ValidatedJson<DecisionDto>>,
) -> AppResult<Json<Perizinan>> {
    decide(state, &user, id, Decision::Reject, dto).await
}

/// PENDINGの申請に新しい承認リンクを発行し、承認者へ再送する
async fn reissue_token(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    dto: Option<ValidatedJson<ReissueTokenDto>>,
) -> AppResult<Json<TokenReissued>> {
    user.require_role(&[Role::Admin])?;
    let valid_hours = dto
        .and_then(|ValidatedJson(dto)| dto.valid_hours)
        .unwrap_or(state.config.approval_token_valid_hours);
    let token = generate_approval_token(valid_hours)?;
    let link = approval_link(&state.config.app_base_url, &token.token);

    let (recipients, message) = {
        let conn = lock_connection(&state.db)?;
        let perizinan = repository::reissue_token(&conn, id, &token)?;
        let requester = user_repository::get_by_id(&conn, perizinan.created_by)?.name;
        let recipients = approver_recipients(&conn, state.notifier.as_ref())?;
        let message = approval_request_message(&perizinan, &requester, &link, &token);
        (recipients, message)
    };
    send_approval_request(&state, &recipients, &message).await;

    Ok(Json(TokenReissued {
        approval_link: link,
        token_expires_at: format_timestamp(&token.expires_at),
    }))
}

/// 申請者本人またはADMINのみ、PENDINGの間だけ削除できる
async fn delete_perizinan(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    let conn = lock_connection(&state.db)?;
    let perizinan = repository::find_by_id(&conn, id)?;
    if perizinan.created_by != user.id && !user.is_admin() {
        return Err(AppError::forbidden("他のユーザーの申請は削除できません"));
    }
    repository::delete(&conn, id)?;
    Ok(Json(json!({ "success": true })))
}

async fn view_by_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> AppResult<Json<PublicPerizinanView>> {
    let conn = lock_connection(&state.db)?;
    let perizinan = repository::find_by_token(&conn, &token, Utc::now())?;
    Ok(Json(repository::public_view(&conn, &perizinan)?))
}

async fn decide_by_token(
    state: AppState,
    token: &str,
    decision: Decision,
    dto: Option<ValidatedJson<DecisionDto>>,
) -> AppResult<Json<PublicPerizinanView>> {
    let note = dto.and_then(|ValidatedJson(dto)| dto.note);

    let (perizinan, view) = {
        let conn = lock_connection(&state.db)?;
        let perizinan = repository::redeem_token(&conn, token, decision, note, Utc::now())?;
        let view = repository::public_view(&conn, &perizinan)?;
        (perizinan, view)
    };
    notify_requester(&state, &perizinan).await;
    Ok(Json(view))
}

async fn approve_by_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
    dto: Option<ValidatedJson<DecisionDto>>,
) -> AppResult<Json<PublicPerizinanView>> {
    decide_by_token(state, &token, Decision::Approve, dto).await
}

async fn reject_by_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
    dto: Option<ValidatedJson<DecisionDto>>,
) -> AppResult<Json<PublicPerizinanView>> {
    decide_by_token(state, &token, Decision::Reject, dto).await
}

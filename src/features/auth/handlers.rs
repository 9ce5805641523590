use super::middleware::{extract_token, CurrentUser, SESSION_COOKIE};
use super::models::{
    CreateUserDto, LoginRequest, LoginResponse, Role, UpdateUserDto, User,
};
use super::password::verify_password;
use super::repository;
use crate::shared::database::lock_connection;
use crate::shared::errors::{AppError, AppResult};
use crate::shared::extract::ValidatedJson;
use crate::AppState;
use axum::extract::{Path, State};
use axum::http::header::SET_COOKIE;
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};

/// 認証不要のルート
pub fn public_routes() -> Router<AppState> {
    Router::new().route("/api/auth/login", post(login))
}

/// 認証必須のルート
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(me))
        .route("/api/users", get(list_users).post(create_user))
        .route("/api/users/:id", put(update_user).delete(delete_user))
}

fn session_cookie(state: &AppState, token: &str) -> String {
    let max_age = state.config.session_ttl_hours * 3600;
    let secure = if state.config.environment.is_production() {
        "; Secure"
    } else {
        ""
    };
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age}{secure}")
}

/// POST /api/auth/login
async fn login(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let found = {
        let conn = lock_connection(&state.db)?;
        repository::find_by_username(&conn, &request.username)?
    };

    let user = match found {
        Some((user, hash)) if verify_password(&request.password, &hash) => user,
        _ => {
            log::warn!("ログイン失敗: username={}", request.username);
            return Err(AppError::validation("Username atau password salah"));
        }
    };

    state.sessions.cleanup_expired_sessions()?;
    let session = state.sessions.create_session(user.id)?;
    let token = state.sessions.encrypt_session_id(&session.id)?;

    log::info!("ログイン成功: user_id={}, role={}", user.id, user.role);

    let cookie = session_cookie(&state, &token);
    Ok((
        [(SET_COOKIE, cookie)],
        Json(LoginResponse {
            token,
            expires_at: session.expires_at,
            user,
        }),
    ))
}

/// POST /api/auth/logout
async fn logout(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    if let Some(token) = extract_token(&headers) {
        state.sessions.invalidate_token(&token)?;
    }
    log::info!("ログアウトしました: user_id={}", user.id);

    let cookie = format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    Ok(([(SET_COOKIE, cookie)], Json(json!({ "success": true }))))
}

/// GET /api/auth/me
async fn me(State(state): State<AppState>, CurrentUser(user): CurrentUser) -> AppResult<Json<User>> {
    let conn = lock_connection(&state.db)?;
    Ok(Json(repository::get_by_id(&conn, user.id)?))
}

/// GET /api/users
async fn list_users(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<User>>> {
    user.require_role(&[Role::Admin])?;
    let conn = lock_connection(&state.db)?;
    Ok(Json(repository::find_all(&conn)?))
}

/// POST /api/users
async fn create_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    ValidatedJson(request): ValidatedJson<CreateUserDto>,
) -> AppResult<Json<User>> {
    user.require_role(&[Role::Admin])?;
    let conn = lock_connection(&state.db)?;
    Ok(Json(repository::create(&conn, &request)?))
}

/// PUT /api/users/:id
async fn update_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
    ValidatedJson(request): ValidatedJson<UpdateUserDto>,
) -> AppResult<Json<User>> {
    user.require_role(&[Role::Admin])?;
    if id == user.id && request.role.is_some_and(|role| role != Role::Admin) {
        return Err(AppError::validation(
            "Tidak dapat menurunkan peran akun sendiri",
        ));
    }

    let (before, updated) = {
        let conn = lock_connection(&state.db)?;
        let before = repository::get_by_id(&conn, id)?;
        let updated = repository::update(&conn, id, &request)?;
        (before, updated)
    };

    // パスワードまたは権限が変わった場合は既存のセッションを無効化する
    if request.password.is_some() || before.role != updated.role {
        let revoked = state.sessions.invalidate_user_sessions(id)?;
        log::info!("ユーザー情報の変更によりセッションを無効化しました: user_id={id}, count={revoked}");
    }
    Ok(Json(updated))
}

/// DELETE /api/users/:id
async fn delete_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<Value>> {
    user.require_role(&[Role::Admin])?;
    if id == user.id {
        return Err(AppError::validation("Tidak dapat menghapus akun sendiri"));
    }

    let conn = lock_connection(&state.db)?;
    repository::delete(&conn, id)?;
    Ok(Json(json!({ "success": true })))
}

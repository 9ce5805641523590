use super::models::SessionUser;
use crate::shared::errors::AppError;
use crate::AppState;
use axum::async_trait;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::{AUTHORIZATION, COOKIE};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;

/// セッションCookieの名前
pub const SESSION_COOKIE: &str = "akasia_session";

/// リクエストヘッダーからセッショントークンを取り出す
///
/// Cookie `akasia_session` を優先し、なければ `Authorization: Bearer` を使う
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let from_cookie = headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.to_string());

    from_cookie
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(|v| v.trim().to_string())
        })
        .filter(|token| !token.is_empty())
}

/// 認証必須ルートのミドルウェア
///
/// 検証済みの`SessionUser`をリクエスト拡張に格納する。
/// トークンが無い・無効な場合はハンドラーを実行せずUnauthorizedを返す。
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let path = request.uri().path().to_string();

    let token = extract_token(request.headers()).ok_or_else(|| {
        log::debug!("認証トークンがありません: path={path}");
        AppError::Unauthorized
    })?;

    let user = state.sessions.validate_session(&token).map_err(|e| {
        log::warn!("認証に失敗しました: path={path}, reason={e}");
        AppError::from(e)
    })?;

    log::debug!("認証成功: user_id={}, path={path}", user.id);
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// 認証済みユーザーを取得するエクストラクター
#[derive(Debug, Clone)]
pub struct CurrentUser(pub SessionUser);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionUser>()
            .cloned()
            .map(CurrentUser)
            .ok_or(AppError::Unauthorized)
    }
}

impl std::ops::Deref for CurrentUser {
    type Target = SessionUser;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_token_from_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; akasia_session=abc123; lang=id"),
        );
        assert_eq!(extract_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn test_extract_token_from_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer xyz789"));
        assert_eq!(extract_token(&headers).as_deref(), Some("xyz789"));
    }

    #[test]
    fn test_cookie_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("akasia_session=from-cookie"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(extract_token(&headers).as_deref(), Some("from-cookie"));
    }

    #[test]
    fn test_missing_or_empty_token() {
        let mut headers = HeaderMap::new();
        assert_eq!(extract_token(&headers), None);

        headers.insert(COOKIE, HeaderValue::from_static("akasia_session="));
        assert_eq!(extract_token(&headers), None);
    }
}

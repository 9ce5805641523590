use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::shared::errors::AppError;

crate::text_enum! {
    /// ユーザーの役割
    pub enum Role {
        /// 管理者（すべての操作が可能）
        Admin => "ADMIN",
        /// 一般ユーザー（財務操作が可能）
        User => "USER",
        /// 運転手（車両利用・領収書の登録のみ）
        Driver => "DRIVER",
    }
}

/// ユーザー情報を表す構造体（パスワードハッシュは含まない）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    /// 表示名
    pub name: String,
    /// WhatsApp通知先（62xxxx形式）
    pub phone: Option<String>,
    pub role: Role,
    pub created_at: String,
    pub updated_at: String,
}

/// セッション情報を表す構造体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// セッションID
    pub id: String,
    /// ユーザーID
    pub user_id: i64,
    /// 有効期限
    pub expires_at: DateTime<Utc>,
    /// 作成日時
    pub created_at: DateTime<Utc>,
}

/// 認証済みリクエストのユーザー情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

impl SessionUser {
    /// 指定された役割のいずれかを持つか確認する
    ///
    /// # 戻り値
    /// 持たない場合はForbiddenエラー
    pub fn require_role(&self, roles: &[Role]) -> Result<(), AppError> {
        if roles.contains(&self.role) {
            Ok(())
        } else {
            log::warn!(
                "権限不足: user_id={}, role={}, required={:?}",
                self.id,
                self.role,
                roles
            );
            Err(AppError::forbidden(format!(
                "役割{}ではこの操作を実行できません",
                self.role
            )))
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// ログインリクエスト
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username wajib diisi"))]
    pub username: String,
    #[validate(length(min = 1, message = "Password wajib diisi"))]
    pub password: String,
}

/// ログインレスポンス
#[derive(Debug, Clone, Serialize)]
pub struct LoginResponse {
    /// 暗号化されたセッショントークン（Cookieにも設定される）
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: User,
}

/// ユーザー作成リクエスト
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateUserDto {
    #[validate(length(min = 3, max = 50, message = "Username harus 3-50 karakter"))]
    pub username: String,
    #[validate(length(min = 1, max = 100, message = "Nama wajib diisi"))]
    pub name: String,
    pub phone: Option<String>,
    #[validate(length(min = 8, message = "Password minimal 8 karakter"))]
    pub password: String,
    pub role: Role,
}

/// ユーザー更新リクエスト（指定された項目のみ更新）
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct UpdateUserDto {
    #[validate(length(min = 1, max = 100, message = "Nama wajib diisi"))]
    pub name: Option<String>,
    pub phone: Option<String>,
    #[validate(length(min = 8, message = "Password minimal 8 karakter"))]
    pub password: Option<String>,
    pub role: Option<Role>,
}

/// セッション関連のエラー
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("セッションが見つかりません")]
    NotFound,

    #[error("セッションが期限切れです")]
    Expired,

    #[error("暗号化エラー: {0}")]
    EncryptionError(String),

    #[error("復号化エラー: {0}")]
    DecryptionError(String),

    #[error("データベースエラー: {0}")]
    DatabaseError(String),
}

impl From<rusqlite::Error> for SessionError {
    fn from(error: rusqlite::Error) -> Self {
        SessionError::DatabaseError(error.to_string())
    }
}

impl From<SessionError> for AppError {
    fn from(error: SessionError) -> Self {
        match error {
            SessionError::NotFound | SessionError::Expired | SessionError::DecryptionError(_) => {
                log::debug!("セッション検証失敗: {error}");
                AppError::Unauthorized
            }
            SessionError::EncryptionError(msg) => AppError::internal(msg),
            SessionError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}

/// 認証関連のハンドラー
pub mod handlers;

/// 認証ミドルウェアとエクストラクター
pub mod middleware;

/// 認証関連のデータモデル
pub mod models;

/// パスワードハッシュ
pub mod password;

/// ユーザーリポジトリ
pub mod repository;

/// セッション管理
pub mod session;

pub use middleware::{require_auth, CurrentUser, SESSION_COOKIE};
pub use models::{Role, SessionUser, User};
pub use session::SessionManager;

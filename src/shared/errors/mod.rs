use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// アプリケーション全体で使用される統一エラー型
#[derive(Debug, Error)]
pub enum AppError {
    /// データベース関連のエラー
    #[error("データベースエラー: {0}")]
    Database(String),

    /// バリデーション関連のエラー
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    /// リソースが見つからない場合のエラー
    #[error("リソースが見つかりません: {0}")]
    NotFound(String),

    /// 一意制約違反・状態遷移の競合
    #[error("競合エラー: {0}")]
    Conflict(String),

    /// 未認証
    #[error("認証されていません")]
    Unauthorized,

    /// 権限不足
    #[error("権限がありません: {0}")]
    Forbidden(String),

    /// 外部サービス連携でのエラー
    #[error("外部サービスエラー: {0}")]
    ExternalService(String),

    /// オブジェクトストレージ関連のエラー
    #[error("ストレージエラー: {0}")]
    Storage(String),

    /// 設定関連のエラー
    #[error("設定エラー: {0}")]
    Configuration(String),

    /// 並行処理関連のエラー
    #[error("並行処理エラー: {0}")]
    Concurrency(String),

    /// 暗号化・ハッシュ化など内部処理のエラー
    #[error("内部エラー: {0}")]
    Internal(String),

    /// I/O関連のエラー
    #[error("I/Oエラー: {0}")]
    Io(#[from] std::io::Error),

    /// JSON解析エラー
    #[error("JSON解析エラー: {0}")]
    Json(#[from] serde_json::Error),
}

/// エラーの重要度を表す列挙型
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ErrorSeverity {
    /// 低重要度（ユーザー入力エラーなど）
    Low,
    /// 中重要度（外部サービス一時的エラーなど）
    Medium,
    /// 高重要度（データベースエラーなど）
    High,
    /// 最重要（セキュリティエラーなど）
    Critical,
}

impl AppError {
    /// クライアントに返すメッセージを取得（インドネシア語）
    ///
    /// # 戻り値
    /// ユーザーに表示可能なエラーメッセージ
    pub fn user_message(&self) -> &str {
        match self {
            AppError::Database(_) => "Terjadi kesalahan pada database",
            AppError::Validation(msg) => msg,
            AppError::NotFound(msg) => msg,
            AppError::Conflict(msg) => msg,
            AppError::Unauthorized => "Unauthorized",
            AppError::Forbidden(_) => "Anda tidak memiliki akses untuk tindakan ini",
            AppError::ExternalService(_) => "Gagal menghubungi layanan eksternal",
            AppError::Storage(_) => "Gagal mengunggah file ke penyimpanan",
            AppError::Configuration(_) => "Konfigurasi server tidak lengkap",
            AppError::Concurrency(_) | AppError::Internal(_) => "Terjadi kesalahan pada server",
            AppError::Io(_) => "Terjadi kesalahan saat memproses file",
            AppError::Json(_) => "Format data tidak valid",
        }
    }

    /// エラーの詳細情報を取得（ログ出力用）
    pub fn details(&self) -> String {
        format!("{self}")
    }

    /// エラーの重要度を取得
    ///
    /// # 戻り値
    /// エラーの重要度レベル
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            AppError::Database(_) => ErrorSeverity::High,
            AppError::Validation(_) => ErrorSeverity::Low,
            AppError::NotFound(_) => ErrorSeverity::Low,
            AppError::Conflict(_) => ErrorSeverity::Low,
            AppError::Unauthorized => ErrorSeverity::Medium,
            AppError::Forbidden(_) => ErrorSeverity::Critical,
            AppError::ExternalService(_) => ErrorSeverity::Medium,
            AppError::Storage(_) => ErrorSeverity::High,
            AppError::Configuration(_) => ErrorSeverity::High,
            AppError::Concurrency(_) => ErrorSeverity::High,
            AppError::Internal(_) => ErrorSeverity::High,
            AppError::Io(_) => ErrorSeverity::Medium,
            AppError::Json(_) => ErrorSeverity::Low,
        }
    }

    /// HTTPステータスコードを取得
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Json(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            AppError::Storage(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_)
            | AppError::Configuration(_)
            | AppError::Concurrency(_)
            | AppError::Internal(_)
            | AppError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// バリデーションエラーを作成するヘルパー関数
    ///
    /// # 引数
    /// * `message` - バリデーションエラーメッセージ
    pub fn validation<S: Into<String>>(message: S) -> Self {
        AppError::Validation(message.into())
    }

    /// リソース未発見エラーを作成するヘルパー関数
    ///
    /// # 引数
    /// * `resource` - 見つからなかったリソース名（インドネシア語）
    ///
    /// # 戻り値
    /// "<resource> tidak ditemukan" を保持するエラー
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        AppError::NotFound(format!("{} tidak ditemukan", resource.into()))
    }

    /// 競合エラーを作成するヘルパー関数
    pub fn conflict<S: Into<String>>(message: S) -> Self {
        AppError::Conflict(message.into())
    }

    /// 権限不足エラーを作成するヘルパー関数
    pub fn forbidden<S: Into<String>>(message: S) -> Self {
        AppError::Forbidden(message.into())
    }

    /// 外部サービスエラーを作成するヘルパー関数
    ///
    /// # 引数
    /// * `service` - サービス名
    /// * `message` - エラーメッセージ
    pub fn external_service<S: Into<String>>(service: S, message: S) -> Self {
        AppError::ExternalService(format!("{}: {}", service.into(), message.into()))
    }

    /// ストレージエラーを作成するヘルパー関数
    pub fn storage<S: Into<String>>(message: S) -> Self {
        AppError::Storage(message.into())
    }

    /// 設定エラーを作成するヘルパー関数
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        AppError::Configuration(message.into())
    }

    /// 並行処理エラーを作成するヘルパー関数
    pub fn concurrency<S: Into<String>>(message: S) -> Self {
        AppError::Concurrency(message.into())
    }

    /// 内部エラーを作成するヘルパー関数
    pub fn internal<S: Into<String>>(message: S) -> Self {
        AppError::Internal(message.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self.severity() {
            ErrorSeverity::High | ErrorSeverity::Critical => {
                log::error!("リクエスト処理エラー: {}", self.details());
            }
            _ => {
                log::warn!("リクエスト処理エラー: {}", self.details());
            }
        }

        let body = serde_json::json!({ "error": self.user_message() });
        (self.status_code(), Json(body)).into_response()
    }
}

/// rusqlite::ErrorからAppErrorへの変換
impl From<rusqlite::Error> for AppError {
    fn from(error: rusqlite::Error) -> Self {
        match &error {
            rusqlite::Error::QueryReturnedNoRows => AppError::not_found("Data"),
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                AppError::Conflict("Data sudah ada atau masih digunakan".to_string())
            }
            _ => AppError::Database(error.to_string()),
        }
    }
}

/// validator::ValidationErrorsからAppErrorへの変換
///
/// フィールド名でソートした最初のエラーメッセージを使用する
impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let field_errors = errors.field_errors();
        let mut fields: Vec<_> = field_errors.keys().copied().collect();
        fields.sort_unstable();

        let message = fields
            .first()
            .and_then(|field| {
                field_errors.get(field).and_then(|errs| {
                    errs.first().map(|err| {
                        err.message
                            .as_ref()
                            .map(|m| m.to_string())
                            .unwrap_or_else(|| format!("Kolom {field} tidak valid"))
                    })
                })
            })
            .unwrap_or_else(|| "Data tidak valid".to_string());

        AppError::Validation(message)
    }
}

/// Result型のエイリアス（アプリケーション全体で使用）
pub type AppResult<T> = Result<T, AppError>;

// サーバー設定管理モジュール

use super::environment::{get_database_filename, get_environment, Environment};
use crate::shared::errors::{AppError, AppResult};
use crate::{get_env_var_optional, get_env_var_or_default};
use log::{debug, info, warn};
use std::collections::HashMap;

/// セッション有効時間の上限（1年）
pub const MAX_SESSION_TTL_HOURS: i64 = 24 * 365;

/// 承認リンクの有効期限の上限（時間）
pub const MAX_APPROVAL_TOKEN_HOURS: i64 = 24 * 30;

/// 開発環境でのみ使用されるセッション暗号化キー
const DEVELOPMENT_SESSION_SECRET: &str = "akasia_development_secret_key_32";

/// オブジェクトストレージ（S3互換）設定
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint: String,
    pub region: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket_name: String,
    /// 公開URLのベース（例: https://xxx.supabase.co/storage/v1/object/public）
    pub public_url: String,
}

impl StorageConfig {
    /// 環境変数から設定を読み込む（未設定の場合はNone）
    pub fn from_env() -> Option<Self> {
        let endpoint = get_env_var_optional!("STORAGE_ENDPOINT")?;
        let access_key = get_env_var_optional!("STORAGE_ACCESS_KEY")?;
        let secret_key = get_env_var_optional!("STORAGE_SECRET_KEY")?;
        let public_url = get_env_var_optional!("STORAGE_PUBLIC_URL")?;

        Some(Self {
            endpoint,
            region: get_env_var_or_default!("STORAGE_REGION", "auto"),
            access_key,
            secret_key,
            bucket_name: get_env_var_or_default!("STORAGE_BUCKET", "akasia"),
            public_url,
        })
    }

    /// 設定の検証
    pub fn validate(&self) -> AppResult<()> {
        validate_http_url("STORAGE_ENDPOINT", &self.endpoint)?;
        validate_http_url("STORAGE_PUBLIC_URL", &self.public_url)?;
        if self.access_key.is_empty() || self.secret_key.is_empty() {
            return Err(AppError::configuration("ストレージの認証情報が空です"));
        }
        if self.bucket_name.is_empty() {
            return Err(AppError::configuration("バケット名が空です"));
        }
        if !self
            .bucket_name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            warn!("バケット名に無効な文字が含まれている可能性があります");
        }
        Ok(())
    }

    /// デバッグ情報を取得（認証情報はマスク）
    pub fn get_debug_info(&self) -> HashMap<String, String> {
        let mut info = HashMap::new();
        info.insert("endpoint".to_string(), self.endpoint.clone());
        info.insert("region".to_string(), self.region.clone());
        info.insert("bucket_name".to_string(), self.bucket_name.clone());
        info.insert("access_key".to_string(), mask_secret(&self.access_key));
        info.insert("public_url".to_string(), self.public_url.clone());
        info
    }
}

/// 画像圧縮設定
#[derive(Debug, Clone, PartialEq)]
pub struct ImageConfig {
    /// 最大幅（px）
    pub max_width: u32,
    /// JPEG品質（1-100）
    pub jpeg_quality: u8,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_width: 1280,
            jpeg_quality: 80,
        }
    }
}

impl ImageConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let max_width = get_env_var_or_default!("IMAGE_MAX_WIDTH", defaults.max_width)
            .parse()
            .unwrap_or(defaults.max_width);
        let jpeg_quality = get_env_var_or_default!("IMAGE_JPEG_QUALITY", defaults.jpeg_quality)
            .parse::<u8>()
            .ok()
            .filter(|q| (1..=100).contains(q))
            .unwrap_or(defaults.jpeg_quality);

        Self {
            max_width: max_width.max(1),
            jpeg_quality,
        }
    }
}

/// WhatsAppゲートウェイ設定
#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    pub api_url: String,
    pub session_id: String,
    pub api_key: String,
    /// 承認者の電話番号（62xxxx形式）
    pub approver_number: Option<String>,
}

impl WhatsAppConfig {
    /// 環境変数から設定を読み込む（未設定の場合はNone）
    pub fn from_env() -> Option<Self> {
        let api_url = get_env_var_optional!("WHATSAPP_API_URL")?;
        let session_id = get_env_var_optional!("WHATSAPP_SESSION_ID")?;
        let api_key = get_env_var_optional!("WHATSAPP_API_KEY")?;

        Some(Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            session_id,
            api_key,
            approver_number: get_env_var_optional!("WHATSAPP_APPROVER_NUMBER"),
        })
    }

    pub fn get_debug_info(&self) -> HashMap<String, String> {
        let mut info = HashMap::new();
        info.insert("api_url".to_string(), self.api_url.clone());
        info.insert("session_id".to_string(), self.session_id.clone());
        info.insert("api_key".to_string(), mask_secret(&self.api_key));
        info.insert(
            "approver_number".to_string(),
            self.approver_number
                .as_deref()
                .map(mask_secret)
                .unwrap_or_else(|| "未設定".to_string()),
        );
        info
    }
}

/// サーバー全体の設定
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: Environment,
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub session_secret: String,
    pub session_ttl_hours: i64,
    /// 承認リンク生成用の公開URL
    pub app_base_url: String,
    pub approval_token_valid_hours: i64,
    pub admin_username: Option<String>,
    pub admin_password: Option<String>,
    pub storage: Option<StorageConfig>,
    pub image: ImageConfig,
    pub whatsapp: Option<WhatsAppConfig>,
}

impl AppConfig {
    /// 環境変数から設定を読み込む
    ///
    /// # 戻り値
    /// サーバー設定、または必須項目が欠けている場合はエラー
    pub fn from_env() -> AppResult<Self> {
        info!("サーバー設定を環境変数から読み込み中...");
        let environment = get_environment();

        let session_secret = match get_env_var_optional!("SESSION_SECRET") {
            Some(secret) => secret,
            None if environment == Environment::Production => {
                return Err(AppError::configuration(
                    "本番環境ではSESSION_SECRETが必須です",
                ));
            }
            None => {
                warn!("SESSION_SECRETが未設定のため開発用キーを使用します");
                DEVELOPMENT_SESSION_SECRET.to_string()
            }
        };

        let port = get_env_var_or_default!("SERVER_PORT", "3000")
            .parse()
            .map_err(|_| AppError::configuration("SERVER_PORTが不正です"))?;

        let config = Self {
            host: get_env_var_or_default!("SERVER_HOST", "0.0.0.0"),
            port,
            database_path: get_env_var_or_default!(
                "DATABASE_PATH",
                get_database_filename(&environment)
            ),
            session_secret,
            session_ttl_hours: parse_hours(
                "SESSION_TTL_HOURS",
                &get_env_var_or_default!("SESSION_TTL_HOURS", "168"),
                MAX_SESSION_TTL_HOURS,
            )?,
            app_base_url: get_env_var_or_default!("APP_BASE_URL", "http://localhost:3000")
                .trim_end_matches('/')
                .to_string(),
            approval_token_valid_hours: parse_hours(
                "APPROVAL_TOKEN_VALID_HOURS",
                &get_env_var_or_default!("APPROVAL_TOKEN_VALID_HOURS", "24"),
                MAX_APPROVAL_TOKEN_HOURS,
            )?,
            admin_username: get_env_var_optional!("ADMIN_USERNAME"),
            admin_password: get_env_var_optional!("ADMIN_PASSWORD"),
            storage: StorageConfig::from_env(),
            image: ImageConfig::from_env(),
            whatsapp: WhatsAppConfig::from_env(),
            environment,
        };

        config.validate()?;
        debug!("サーバー設定: {:?}", config.get_debug_info());
        Ok(config)
    }

    /// 設定の検証
    pub fn validate(&self) -> AppResult<()> {
        validate_http_url("APP_BASE_URL", &self.app_base_url)?;
        if !(1..=MAX_SESSION_TTL_HOURS).contains(&self.session_ttl_hours) {
            return Err(AppError::configuration(format!(
                "SESSION_TTL_HOURSは1〜{MAX_SESSION_TTL_HOURS}の範囲で指定してください"
            )));
        }
        if !(1..=MAX_APPROVAL_TOKEN_HOURS).contains(&self.approval_token_valid_hours) {
            return Err(AppError::configuration(format!(
                "APPROVAL_TOKEN_VALID_HOURSは1〜{MAX_APPROVAL_TOKEN_HOURS}の範囲で指定してください"
            )));
        }
        if self.session_secret.len() < 16 {
            return Err(AppError::configuration(
                "SESSION_SECRETは16文字以上にしてください",
            ));
        }
        if let Some(storage) = &self.storage {
            storage.validate()?;
        } else {
            warn!("ストレージ設定が未設定です。画像アップロードは利用できません");
        }
        if let Some(whatsapp) = &self.whatsapp {
            validate_http_url("WHATSAPP_API_URL", &whatsapp.api_url)?;
        } else {
            warn!("WhatsApp設定が未設定です。通知は送信されません");
        }
        Ok(())
    }

    /// デバッグ情報を取得（認証情報はマスク）
    pub fn get_debug_info(&self) -> HashMap<String, String> {
        let mut info = HashMap::new();
        info.insert("environment".to_string(), format!("{:?}", self.environment));
        info.insert("listen".to_string(), format!("{}:{}", self.host, self.port));
        info.insert("database_path".to_string(), self.database_path.clone());
        info.insert("session_secret".to_string(), mask_secret(&self.session_secret));
        info.insert("app_base_url".to_string(), self.app_base_url.clone());
        if let Some(storage) = &self.storage {
            for (key, value) in storage.get_debug_info() {
                info.insert(format!("storage_{key}"), value);
            }
        }
        if let Some(whatsapp) = &self.whatsapp {
            for (key, value) in whatsapp.get_debug_info() {
                info.insert(format!("whatsapp_{key}"), value);
            }
        }
        info
    }

    /// テスト用の設定
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            environment: Environment::Development,
            host: "127.0.0.1".to_string(),
            port: 0,
            database_path: ":memory:".to_string(),
            session_secret: "test_encryption_key_32_bytes_long".to_string(),
            session_ttl_hours: 24,
            app_base_url: "https://akasia.test".to_string(),
            approval_token_valid_hours: 24,
            admin_username: None,
            admin_password: None,
            storage: None,
            image: ImageConfig::default(),
            whatsapp: None,
        }
    }
}

/// http(s)のURLかどうかを検証する
fn validate_http_url(name: &str, value: &str) -> AppResult<()> {
    match url::Url::parse(value) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") && parsed.has_host() => Ok(()),
        _ => Err(AppError::configuration(format!("{name}が不正です: {value}"))),
    }
}

/// 時間数の環境変数を解釈する（1〜maxの整数のみ許可）
fn parse_hours(name: &str, value: &str, max: i64) -> AppResult<i64> {
    value
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|hours| (1..=max).contains(hours))
        .ok_or_else(|| {
            AppError::configuration(format!(
                "{name}は1〜{max}の整数で指定してください: {value}"
            ))
        })
}

/// 秘密情報をマスクする（最初の4文字と最後の4文字のみ表示）
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}****{tail}")
    } else {
        "****".to_string()
    }
}

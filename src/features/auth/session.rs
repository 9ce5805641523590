use super::models::{Session, SessionError, SessionUser};
use crate::shared::config::app_config::MAX_SESSION_TTL_HOURS;
use crate::shared::database::DbPool;
use crate::shared::utils::{format_timestamp, generate_session_id};
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::sync::MutexGuard;

/// セッション管理を行う構造体
#[derive(Clone)]
pub struct SessionManager {
    /// データベース接続
    db: DbPool,
    /// 暗号化キー
    encryption_key: Vec<u8>,
    /// セッションの有効時間
    ttl: Duration,
}

impl SessionManager {
    /// 新しいSessionManagerを作成する
    ///
    /// # 引数
    /// * `db` - データベース接続
    /// * `encryption_key` - セッション暗号化用のキー
    /// * `ttl_hours` - セッションの有効時間（時間）
    pub fn new(db: DbPool, encryption_key: &str, ttl_hours: i64) -> Self {
        // 任意長のシークレットからAES-256用の32バイト鍵を導出する
        let key_bytes = Sha256::digest(encryption_key.as_bytes()).to_vec();
        let ttl = Duration::try_hours(ttl_hours.min(MAX_SESSION_TTL_HOURS))
            .unwrap_or_else(Duration::zero);

        Self {
            db,
            encryption_key: key_bytes,
            ttl,
        }
    }

    fn connection(&self) -> Result<MutexGuard<'_, Connection>, SessionError> {
        self.db
            .lock()
            .map_err(|e| SessionError::DatabaseError(format!("ロック取得に失敗: {e}")))
    }

    /// セッションを作成する
    ///
    /// # 引数
    /// * `user_id` - ユーザーID
    ///
    /// # 戻り値
    /// 作成されたセッション情報
    pub fn create_session(&self, user_id: i64) -> Result<Session, SessionError> {
        let session_id = generate_session_id();
        let now = Utc::now();
        let expires_at = now + self.ttl;

        let conn = self.connection()?;
        conn.execute(
            "INSERT INTO sessions (id, user_id, expires_at, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![
                session_id,
                user_id,
                format_timestamp(&expires_at),
                format_timestamp(&now)
            ],
        )?;

        log::info!("セッションを作成しました: user_id={user_id}");
        Ok(Session {
            id: session_id,
            user_id,
            expires_at,
            created_at: now,
        })
    }

    /// セッションを検証し、ユーザー情報を取得する
    ///
    /// # 引数
    /// * `token` - 暗号化されたセッショントークン
    ///
    /// # 戻り値
    /// セッションに紐づくユーザー情報
    pub fn validate_session(&self, token: &str) -> Result<SessionUser, SessionError> {
        let session_id = self.decrypt_token(token)?;

        let conn = self.connection()?;
        let row = conn
            .query_row(
                "SELECT s.expires_at, u.id, u.username, u.role
                 FROM sessions s JOIN users u ON u.id = s.user_id
                 WHERE s.id = ?1",
                params![session_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        SessionUser {
                            id: row.get(1)?,
                            username: row.get(2)?,
                            role: row.get(3)?,
                        },
                    ))
                },
            )
            .optional()?;

        let (expires_at, user) = row.ok_or(SessionError::NotFound)?;

        let expires_at = DateTime::parse_from_rfc3339(&expires_at)
            .map_err(|e| SessionError::DatabaseError(format!("有効期限の解析に失敗: {e}")))?
            .with_timezone(&Utc);

        if expires_at < Utc::now() {
            conn.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
            log::debug!("期限切れセッションを削除しました: user_id={}", user.id);
            return Err(SessionError::Expired);
        }

        Ok(user)
    }

    /// トークンに対応するセッションを無効化する
    pub fn invalidate_token(&self, token: &str) -> Result<(), SessionError> {
        let session_id = self.decrypt_token(token)?;
        self.invalidate_session(&session_id)
    }

    /// セッションを無効化する
    ///
    /// # 引数
    /// * `session_id` - セッションID
    pub fn invalidate_session(&self, session_id: &str) -> Result<(), SessionError> {
        let conn = self.connection()?;
        let affected_rows =
            conn.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;

        if affected_rows > 0 {
            log::info!("セッションを無効化しました");
        } else {
            log::warn!("無効化対象のセッションが見つかりませんでした");
        }

        Ok(())
    }

    /// ユーザーのすべてのセッションを無効化する
    ///
    /// # 戻り値
    /// 削除されたセッション数
    pub fn invalidate_user_sessions(&self, user_id: i64) -> Result<usize, SessionError> {
        let conn = self.connection()?;
        let affected_rows =
            conn.execute("DELETE FROM sessions WHERE user_id = ?1", params![user_id])?;

        log::info!("ユーザー{user_id}のセッションを{affected_rows}件無効化しました");
        Ok(affected_rows)
    }

    /// セッションIDを暗号化してトークンを生成する
    ///
    /// # 戻り値
    /// nonce(12バイト)と暗号文を連結したURL-safe Base64文字列
    pub fn encrypt_session_id(&self, session_id: &str) -> Result<String, SessionError> {
        let cipher = Aes256Gcm::new_from_slice(&self.encryption_key)
            .map_err(|e| SessionError::EncryptionError(e.to_string()))?;

        let mut nonce_bytes = [0u8; 12];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, session_id.as_bytes())
            .map_err(|e| SessionError::EncryptionError(e.to_string()))?;

        let mut token_bytes = nonce_bytes.to_vec();
        token_bytes.extend_from_slice(&ciphertext);
        Ok(general_purpose::URL_SAFE_NO_PAD.encode(&token_bytes))
    }

    /// トークンを復号化してセッションIDを取得する
    fn decrypt_token(&self, token: &str) -> Result<String, SessionError> {
        let token_bytes = general_purpose::URL_SAFE_NO_PAD
            .decode(token)
            .map_err(|e| SessionError::DecryptionError(format!("Base64デコードエラー: {e}")))?;

        if token_bytes.len() < 12 {
            return Err(SessionError::DecryptionError(
                "トークンが短すぎます".to_string(),
            ));
        }

        let (nonce_bytes, ciphertext) = token_bytes.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);

        let cipher = Aes256Gcm::new_from_slice(&self.encryption_key)
            .map_err(|e| SessionError::DecryptionError(e.to_string()))?;

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| SessionError::DecryptionError(e.to_string()))?;

        String::from_utf8(plaintext)
            .map_err(|e| SessionError::DecryptionError(format!("UTF-8変換エラー: {e}")))
    }

    /// 期限切れセッションをクリーンアップする
    ///
    /// # 戻り値
    /// 削除されたセッション数
    pub fn cleanup_expired_sessions(&self) -> Result<usize, SessionError> {
        let now = format_timestamp(&Utc::now());
        let conn = self.connection()?;

        let affected_rows =
            conn.execute("DELETE FROM sessions WHERE expires_at < ?1", params![now])?;

        if affected_rows > 0 {
            log::info!("期限切れセッションを{affected_rows}件削除しました");
        }

        Ok(affected_rows)
    }
}

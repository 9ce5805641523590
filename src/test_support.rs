// テスト用の共通ヘルパー

use crate::features::auth::{Role, SessionManager};
use crate::services::storage::ObjectStorage;
use crate::services::whatsapp::Notifier;
use crate::shared::config::AppConfig;
use crate::shared::database::create_in_memory_connection;
use crate::shared::errors::{AppError, AppResult};
use crate::AppState;
use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use rusqlite::{params, Connection};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

const TEST_TIMESTAMP: &str = "2024-05-01T09:00:00+07:00";

/// ユーザーを直接挿入する（パスワードハッシュはダミー、表示名はユーザー名）
pub fn seed_user(conn: &Connection, username: &str, role: Role) -> i64 {
    seed_user_with_phone(conn, username, role, None)
}

pub fn seed_user_with_phone(
    conn: &Connection,
    username: &str,
    role: Role,
    phone: Option<&str>,
) -> i64 {
    conn.execute(
        "INSERT INTO users (username, name, phone, password_hash, role, created_at, updated_at)
         VALUES (?1, ?1, ?2, 'not-a-real-hash', ?3, ?4, ?4)",
        params![username, phone, role, TEST_TIMESTAMP],
    )
    .unwrap();
    conn.last_insert_rowid()
}

/// 車両を直接挿入する（ナンバープレートはそのまま保存）
pub fn seed_car(conn: &Connection, license_plate: &str) -> i64 {
    conn.execute(
        "INSERT INTO cars (name, license_plate, barcode, created_at, updated_at)
         VALUES ('Avanza', ?1, ?2, ?3, ?3)",
        params![
            license_plate,
            format!("TEST-{}", license_plate.replace(' ', "")),
            TEST_TIMESTAMP
        ],
    )
    .unwrap();
    conn.last_insert_rowid()
}

/// メモリ上に保存するストレージ
#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
    fail: bool,
}

impl MemoryStorage {
    /// 常に保存に失敗するストレージ
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn get(&self, key: &str) -> Option<(Vec<u8>, String)> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl ObjectStorage for MemoryStorage {
    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> AppResult<()> {
        if self.fail {
            return Err(AppError::storage("simulated failure"));
        }
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (body, content_type.to_string()));
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("https://storage.test/akasia/{key}")
    }
}

/// 送信内容を記録する通知先
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    approver: Option<String>,
}

impl RecordingNotifier {
    pub fn with_approver(number: &str) -> Self {
        Self {
            approver: Some(number.to_string()),
            ..Self::default()
        }
    }

    /// 送信済みの (宛先, 本文)
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send_message(&self, to: &str, message: &str) -> AppResult<()> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), message.to_string()));
        Ok(())
    }

    fn approver_number(&self) -> Option<&str> {
        self.approver.as_deref()
    }
}

/// インメモリDBを使うアプリケーション状態
pub fn test_state(
    storage: Option<Arc<dyn ObjectStorage>>,
    notifier: Arc<dyn Notifier>,
) -> AppState {
    let config = AppConfig::for_tests();
    let db = Arc::new(Mutex::new(create_in_memory_connection().unwrap()));
    AppState {
        sessions: SessionManager::new(db.clone(), &config.session_secret, config.session_ttl_hours),
        db,
        storage,
        notifier,
        config: Arc::new(config),
    }
}

/// ユーザーを作成し、セッショントークンを発行する
pub fn login_as(state: &AppState, username: &str, role: Role, phone: Option<&str>) -> (i64, String) {
    let user_id = {
        let conn = state.db.lock().unwrap();
        seed_user_with_phone(&conn, username, role, phone)
    };
    let session = state.sessions.create_session(user_id).unwrap();
    let token = state.sessions.encrypt_session_id(&session.id).unwrap();
    (user_id, token)
}

/// ルーターにJSONリクエストを送る
///
/// # 戻り値
/// ステータスコードとJSONボディ（空ボディはNull）
pub async fn send_json(
    router: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

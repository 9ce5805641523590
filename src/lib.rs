// 共有モジュール
pub mod shared;

// 機能モジュール
pub mod features;

// 外部サービス連携
pub mod services;

#[cfg(test)]
mod test_support;

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::{middleware, Json, Router};
use features::auth::{self, require_auth, SessionManager};
use features::{cars, pengajuan, perizinan, spending, transactions, uploads, wallet};
use log::{error, info, warn};
use serde_json::{json, Value};
use services::storage::{ObjectStorage, S3Storage};
use services::whatsapp::{NoopNotifier, Notifier, WhatsAppClient};
use shared::config::{initialize_logging_system, load_environment_variables, AppConfig};
use shared::database::{lock_connection, open_database, DbPool};
use shared::errors::{AppError, AppResult};
use std::sync::{Arc, Mutex};

/// リクエストボディの上限（画像アップロードを含む）
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// アプリケーション状態（全ハンドラーで共有）
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub sessions: SessionManager,
    /// 未設定の場合はアップロード不可
    pub storage: Option<Arc<dyn ObjectStorage>>,
    pub notifier: Arc<dyn Notifier>,
    pub config: Arc<AppConfig>,
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// ルーターを構築する
///
/// 認証が必要なルートには`require_auth`を適用し、未認証のリクエストは
/// ハンドラーに到達する前に`{"error": "Unauthorized"}`で拒否する
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .merge(auth::handlers::routes())
        .merge(cars::handlers::routes())
        .merge(transactions::handlers::routes())
        .merge(spending::handlers::routes())
        .merge(wallet::handlers::routes())
        .merge(pengajuan::handlers::routes())
        .merge(perizinan::handlers::routes())
        .merge(uploads::handlers::routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health))
        .merge(auth::handlers::public_routes())
        .merge(perizinan::handlers::public_routes())
        .merge(protected)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// 設定からアプリケーション状態を組み立てる
///
/// # 処理内容
/// 1. データベースを開きテーブルを作成
/// 2. 初期管理者の作成（ユーザーが存在しない場合）
/// 3. ストレージとWhatsAppクライアントの初期化（設定されている場合）
pub async fn build_state(config: AppConfig) -> AppResult<AppState> {
    info!("データベースを初期化しています...");
    let db: DbPool = Arc::new(Mutex::new(open_database(&config.database_path)?));

    {
        let conn = lock_connection(&db)?;
        match (&config.admin_username, &config.admin_password) {
            (Some(username), Some(password)) => {
                auth::repository::ensure_admin_user(&conn, username, password)?;
            }
            _ => {
                if auth::repository::count(&conn)? == 0 {
                    warn!("ユーザーが存在しません。ADMIN_USERNAMEとADMIN_PASSWORDを設定してください");
                }
            }
        }
    }

    let storage: Option<Arc<dyn ObjectStorage>> = match &config.storage {
        Some(storage_config) => Some(Arc::new(S3Storage::new(storage_config).await?)),
        None => None,
    };

    let notifier: Arc<dyn Notifier> = match &config.whatsapp {
        Some(whatsapp_config) => Arc::new(WhatsAppClient::new(whatsapp_config.clone())?),
        None => Arc::new(NoopNotifier),
    };

    let sessions = SessionManager::new(
        db.clone(),
        &config.session_secret,
        config.session_ttl_hours,
    );

    Ok(AppState {
        db,
        sessions,
        storage,
        notifier,
        config: Arc::new(config),
    })
}

/// サーバーを起動する
pub async fn run_server() -> AppResult<()> {
    load_environment_variables();
    initialize_logging_system();

    info!("Akasiaサーバーを起動しています...");
    let config = AppConfig::from_env().map_err(|e| {
        error!("設定の読み込みに失敗しました: {e}");
        e
    })?;
    let address = format!("{}:{}", config.host, config.port);

    let state = build_state(config).await?;
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .map_err(AppError::Io)?;
    info!("サーバーが起動しました: http://{address}");

    axum::serve(listener, app).await.map_err(AppError::Io)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::auth::Role;
    use crate::test_support::{login_as, send_json, test_state, MemoryStorage, RecordingNotifier};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Method, Request, StatusCode};
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;
    use tower::ServiceExt;

    fn setup() -> (AppState, Router, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::with_approver("6281111111111"));
        let state = test_state(None, notifier.clone());
        let router = build_router(state.clone());
        (state, router, notifier)
    }

    fn count(state: &AppState, table: &str) -> i64 {
        let conn = state.db.lock().unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let (_, router, _) = setup();
        let (status, body) = send_json(&router, Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_unauthenticated_mutations_are_rejected_without_changes() {
        let (state, router, _) = setup();
        let car = json!({ "name": "Avanza", "license_plate": "B 1234 XYZ" });
        let transaction =
            json!({ "amount": 1000, "type": "INCOME", "description": "Kas", "date": "2024-05-01" });

        let requests = vec![
            (Method::POST, "/api/cars", Some(car.clone())),
            (Method::PUT, "/api/cars/1", Some(car)),
            (Method::DELETE, "/api/cars/1", None),
            (Method::POST, "/api/transactions", Some(transaction.clone())),
            (Method::PUT, "/api/transactions/1", Some(transaction)),
            (Method::DELETE, "/api/transactions/1", None),
            (Method::POST, "/api/spending-tasks", Some(json!({ "title": "x", "budget": 1 }))),
            (Method::POST, "/api/wallet/entries", Some(json!({ "amount": 1, "type": "CREDIT" }))),
            (Method::DELETE, "/api/pengajuan/1", None),
        ];

        for (method, uri, body) in requests {
            let (status, response) = send_json(&router, method.clone(), uri, None, body).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
            assert_eq!(response, json!({ "error": "Unauthorized" }));
        }

        let (status, _) = send_json(
            &router,
            Method::POST,
            "/api/cars",
            Some("forged-token"),
            Some(json!({ "name": "Avanza", "license_plate": "B 1 A" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        assert_eq!(count(&state, "cars"), 0);
        assert_eq!(count(&state, "transactions"), 0);
        assert_eq!(count(&state, "spending_tasks"), 0);
        assert_eq!(count(&state, "wallet_entries"), 0);
    }

    #[tokio::test]
    async fn test_login_and_me() {
        let (state, router, _) = setup();
        {
            let conn = state.db.lock().unwrap();
            auth::repository::ensure_admin_user(&conn, "admin", "rahasia-sekali").unwrap();
        }

        let (status, _) = send_json(
            &router,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": "admin", "password": "salah-password" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send_json(
            &router,
            Method::POST,
            "/api/auth/login",
            None,
            Some(json!({ "username": "admin", "password": "rahasia-sekali" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().unwrap().to_string();

        let (status, me) = send_json(&router, Method::GET, "/api/auth/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["username"], "admin");
        assert_eq!(me["role"], "ADMIN");
    }

    #[tokio::test]
    async fn test_password_change_revokes_existing_sessions() {
        let (state, router, _) = setup();
        let (_, admin) = login_as(&state, "admin", Role::Admin, None);
        let (staff_id, staff) = login_as(&state, "staff", Role::User, None);

        let (status, _) = send_json(&router, Method::GET, "/api/auth/me", Some(&staff), None).await;
        assert_eq!(status, StatusCode::OK);

        let uri = format!("/api/users/{staff_id}");
        let (status, _) = send_json(
            &router,
            Method::PUT,
            &uri,
            Some(&admin),
            Some(json!({ "name": "Staf Keuangan" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = send_json(&router, Method::GET, "/api/auth/me", Some(&staff), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = send_json(
            &router,
            Method::PUT,
            &uri,
            Some(&admin),
            Some(json!({ "password": "password-baru-123" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) =
            send_json(&router, Method::GET, "/api/auth/me", Some(&staff), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body, json!({ "error": "Unauthorized" }));

        let (status, _) = send_json(&router, Method::GET, "/api/auth/me", Some(&admin), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_upcoming_taxes_rejects_huge_day_range() {
        let (state, router, _) = setup();
        let (_, driver) = login_as(&state, "driver", Role::Driver, None);

        let (status, _) = send_json(
            &router,
            Method::GET,
            "/api/car-taxes/upcoming?days=1000000000000",
            Some(&driver),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) =
            send_json(&router, Method::GET, "/api/car-taxes/upcoming?days=30", Some(&driver), None)
                .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_wallet_settlement_sources_are_protected() {
        let (state, router, _) = setup();
        let (_, user) = login_as(&state, "finance", Role::User, None);

        let (status, _) = send_json(
            &router,
            Method::POST,
            "/api/wallet/entries",
            Some(&user),
            Some(json!({ "amount": 50000, "type": "CREDIT", "source": "REFUND" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(count(&state, "wallet_entries"), 0);

        let (status, entry) = send_json(
            &router,
            Method::POST,
            "/api/wallet/entries",
            Some(&user),
            Some(json!({ "amount": 50000, "type": "CREDIT" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(entry["source"], "MANUAL");

        let uri = format!("/api/wallet/entries/{}", entry["id"]);
        let (status, _) = send_json(&router, Method::DELETE, &uri, Some(&user), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(count(&state, "wallet_entries"), 0);
    }

    #[tokio::test]
    async fn test_duplicate_license_plate_conflicts() {
        let (state, router, _) = setup();
        let (_, admin) = login_as(&state, "admin", Role::Admin, None);
        let car = json!({ "name": "Avanza", "license_plate": "b 1234 xyz" });

        let (status, created) =
            send_json(&router, Method::POST, "/api/cars", Some(&admin), Some(car.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["license_plate"], "B 1234 XYZ");

        let (status, body) =
            send_json(&router, Method::POST, "/api/cars", Some(&admin), Some(car)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["error"].is_string());
        assert_eq!(count(&state, "cars"), 1);
    }

    #[tokio::test]
    async fn test_driver_cannot_manage_cars() {
        let (state, router, _) = setup();
        let (_, driver) = login_as(&state, "driver", Role::Driver, None);

        let (status, _) = send_json(
            &router,
            Method::POST,
            "/api/cars",
            Some(&driver),
            Some(json!({ "name": "Avanza", "license_plate": "B 1 A" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(count(&state, "cars"), 0);
    }

    #[tokio::test]
    async fn test_perizinan_token_flow() {
        let (state, router, notifier) = setup();
        let (_, user) = login_as(&state, "staff", Role::User, Some("6282222222222"));

        let (status, created) = send_json(
            &router,
            Method::POST,
            "/api/perizinan",
            Some(&user),
            Some(json!({
                "purpose": "Kunjungan klien",
                "destination": "Bandung",
                "trip_date": "2024-06-10",
                "passenger_count": 2
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["notification_sent"], true);

        let link = created["approval_link"].as_str().unwrap().to_string();
        let token = link
            .strip_prefix("https://akasia.test/perizinan/approval/")
            .unwrap()
            .to_string();

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "6281111111111");
        assert!(sent[0].1.contains(&link));

        let view_uri = format!("/api/public/perizinan/{token}");
        let (status, view) = send_json(&router, Method::GET, &view_uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["requester_name"], "staff");

        let approve_uri = format!("/api/public/perizinan/{token}/approve");
        let (status, approved) = send_json(&router, Method::POST, &approve_uri, None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(approved["status"], "APPROVED");

        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].0, "6282222222222");
        assert!(sent[1].1.contains("DISETUJUI"));

        let reject_uri = format!("/api/public/perizinan/{token}/reject");
        let (status, _) = send_json(&router, Method::POST, &reject_uri, None, None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_pengajuan_decision_requires_admin() {
        let (state, router, notifier) = setup();
        let (_, user) = login_as(&state, "staff", Role::User, None);
        let (_, admin) = login_as(&state, "boss", Role::Admin, None);

        let (status, created) = send_json(
            &router,
            Method::POST,
            "/api/pengajuan",
            Some(&user),
            Some(json!({ "items": [{ "requirement": "Ganti oli", "cost_estimation": 450000 }] })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(notifier.sent().len(), 1);
        let id = created["id"].as_i64().unwrap();

        let approve_uri = format!("/api/pengajuan/{id}/approve");
        let (status, _) = send_json(&router, Method::POST, &approve_uri, Some(&user), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, approved) = send_json(
            &router,
            Method::POST,
            &approve_uri,
            Some(&admin),
            Some(json!({ "note": "Silakan" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(approved["status"], "APPROVED");
        assert_eq!(approved["decision_note"], "Silakan");

        let (status, _) = send_json(&router, Method::POST, &approve_uri, Some(&admin), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_spending_status_labels() {
        let (state, router, _) = setup();
        let (_, user) = login_as(&state, "staff", Role::User, None);

        let (status, labels) = send_json(
            &router,
            Method::GET,
            "/api/spending-tasks/status-labels",
            Some(&user),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(labels.as_array().unwrap().len(), 6);
        assert_eq!(labels[0]["value"], "DRAFT");
    }

    fn multipart_request(uri: &str, token: &str, content_type: &str, data: &[u8]) -> Request<Body> {
        let boundary = "akasia-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"foto\"\r\nContent-Type: {content_type}\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_upload_compresses_and_stores_image() {
        let storage = Arc::new(MemoryStorage::default());
        let state = test_state(Some(storage.clone()), Arc::new(RecordingNotifier::default()));
        let router = build_router(state.clone());
        let (_, token) = login_as(&state, "driver", Role::Driver, None);

        let mut png = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(2000, 1000))
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let response = router
            .clone()
            .oneshot(multipart_request("/api/uploads/receipts", &token, "image/png", &png))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        let url = body["url"].as_str().unwrap();
        assert!(url.starts_with("https://storage.test/akasia/receipts/"));
        assert!(url.ends_with(".jpg"));

        let key = body["key"].as_str().unwrap();
        let (data, content_type) = storage.get(key).unwrap();
        assert_eq!(content_type, "image/jpeg");
        let stored = image::load_from_memory(&data).unwrap();
        assert_eq!(stored.width(), 1280);

        let response = router
            .oneshot(multipart_request(
                "/api/uploads/receipts",
                &token,
                "application/pdf",
                b"%PDF-1.4",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upload_without_storage_is_configuration_error() {
        let (state, router, _) = setup();
        let (_, token) = login_as(&state, "driver", Role::Driver, None);

        let response = router
            .oneshot(multipart_request("/api/uploads/receipts", &token, "image/png", b"x"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

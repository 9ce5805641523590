// WhatsAppゲートウェイ通知モジュール

use crate::shared::config::WhatsAppConfig;
use crate::shared::errors::{AppError, AppResult};
use async_trait::async_trait;
use log::{debug, error, info};
use serde::Serialize;
use std::time::Duration;

/// メッセージ通知の送信先
#[async_trait]
pub trait Notifier: Send + Sync {
    /// メッセージを送信する
    ///
    /// # 引数
    /// * `to` - 送信先の電話番号（62xxxx形式）
    /// * `message` - 本文
    async fn send_message(&self, to: &str, message: &str) -> AppResult<()>;

    /// 承認者の電話番号
    fn approver_number(&self) -> Option<&str> {
        None
    }
}

#[derive(Debug, Serialize)]
struct SendMessageBody<'a> {
    to: &'a str,
    message: &'a str,
}

/// WhatsAppゲートウェイのHTTPクライアント
#[derive(Debug, Clone)]
pub struct WhatsAppClient {
    http_client: reqwest::Client,
    config: WhatsAppConfig,
}

impl WhatsAppClient {
    pub fn new(config: WhatsAppConfig) -> AppResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| AppError::configuration(format!("HTTPクライアントの作成に失敗: {e}")))?;

        info!(
            "WhatsAppクライアントを初期化しました: api_url={}",
            config.api_url
        );
        Ok(Self {
            http_client,
            config,
        })
    }

    fn send_url(&self) -> String {
        format!(
            "{}/sessions/{}/send",
            self.config.api_url.trim_end_matches('/'),
            self.config.session_id
        )
    }
}

#[async_trait]
impl Notifier for WhatsAppClient {
    async fn send_message(&self, to: &str, message: &str) -> AppResult<()> {
        let url = self.send_url();
        debug!("WhatsAppメッセージを送信します: to={to}");

        let response = self
            .http_client
            .post(&url)
            .header("X-API-Key", &self.config.api_key)
            .json(&SendMessageBody { to, message })
            .send()
            .await
            .map_err(|e| {
                error!("WhatsAppゲートウェイへの接続に失敗: {e}");
                AppError::external_service("WhatsApp".to_string(), e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("WhatsAppメッセージ送信失敗: status={status}, body={body}");
            return Err(AppError::external_service(
                "WhatsApp".to_string(),
                format!("status {status}"),
            ));
        }

        info!("WhatsAppメッセージを送信しました: to={to}");
        Ok(())
    }

    fn approver_number(&self) -> Option<&str> {
        self.config.approver_number.as_deref()
    }
}

/// WhatsApp未設定時に使う通知先（ログ出力のみ）
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn send_message(&self, to: &str, _message: &str) -> AppResult<()> {
        debug!("WhatsApp未設定のため通知をスキップしました: to={to}");
        Ok(())
    }
}

/// 通知を送信し、失敗してもエラーにはせずログに残す
pub async fn notify_best_effort(notifier: &dyn Notifier, to: &str, message: &str) {
    if let Err(e) = notifier.send_message(to, message).await {
        error!("通知の送信に失敗しました（処理は継続します）: to={to}, error={e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::{Path, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::Value;
    use std::sync::{Arc, Mutex};

    type Received = Arc<Mutex<Vec<(String, Option<String>, Value)>>>;

    async fn spawn_gateway(status: StatusCode) -> (String, Received) {
        let received: Received = Arc::default();

        let app = Router::new()
            .route(
                "/sessions/:session/send",
                post(
                    move |State(received): State<Received>,
                          Path(session): Path<String>,
                          headers: HeaderMap,
                          Json(body): Json<Value>| async move {
                        let key = headers
                            .get("X-API-Key")
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string);
                        received.lock().unwrap().push((session, key, body));
                        status
                    },
                ),
            )
            .with_state(received.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (format!("http://{addr}"), received)
    }

    fn config(api_url: String) -> WhatsAppConfig {
        WhatsAppConfig {
            api_url,
            session_id: "akasia".to_string(),
            api_key: "secret-key".to_string(),
            approver_number: Some("6281234567890".to_string()),
        }
    }

    #[tokio::test]
    async fn test_send_message_posts_to_gateway() {
        let (url, received) = spawn_gateway(StatusCode::OK).await;
        let client = WhatsAppClient::new(config(url)).unwrap();

        client
            .send_message("6281234567890", "Halo dari Akasia")
            .await
            .unwrap();

        let calls = received.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (session, key, body) = &calls[0];
        assert_eq!(session, "akasia");
        assert_eq!(key.as_deref(), Some("secret-key"));
        assert_eq!(body["to"], "6281234567890");
        assert_eq!(body["message"], "Halo dari Akasia");
    }

    #[tokio::test]
    async fn test_non_success_status_is_external_service_error() {
        let (url, _received) = spawn_gateway(StatusCode::INTERNAL_SERVER_ERROR).await;
        let client = WhatsAppClient::new(config(url)).unwrap();

        let result = client.send_message("6281234567890", "Halo").await;
        assert!(matches!(result, Err(AppError::ExternalService(_))));
    }

    #[tokio::test]
    async fn test_best_effort_swallows_errors() {
        let client = WhatsAppClient::new(config("http://127.0.0.1:9".to_string())).unwrap();
        notify_best_effort(&client, "6281234567890", "Halo").await;
        assert_eq!(client.approver_number(), Some("6281234567890"));
    }

    #[tokio::test]
    async fn test_noop_notifier() {
        let notifier = NoopNotifier;
        assert!(notifier.send_message("628123", "x").await.is_ok());
        assert!(notifier.approver_number().is_none());
    }
}

// オブジェクトストレージ（S3互換）クライアントモジュール

use super::image::{compress_image, CompressedImage};
use crate::shared::config::{ImageConfig, StorageConfig};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::utils::generate_object_suffix;
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::config::{Credentials, SharedCredentialsProvider};
use aws_sdk_s3::Client;
use chrono::Utc;
use log::{debug, error, info};
use serde::Serialize;
use std::sync::Arc;

/// オブジェクトストレージの操作
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// オブジェクトを保存する
    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> AppResult<()>;

    /// オブジェクトの公開URLを取得する
    fn public_url(&self, key: &str) -> String;
}

/// S3互換ストレージのクライアント
#[derive(Clone)]
pub struct S3Storage {
    client: Client,
    bucket_name: String,
    public_url: String,
}

impl S3Storage {
    /// クライアントを初期化する
    ///
    /// # 引数
    /// * `config` - ストレージ設定
    pub async fn new(config: &StorageConfig) -> AppResult<Self> {
        info!("ストレージクライアントを初期化しています...");
        config.validate()?;

        // 認証情報を設定（ログには出力しない）
        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "akasia-storage",
        );

        debug!("S3設定を構築中... エンドポイント: {}", config.endpoint);
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(&config.endpoint)
            .region(Region::new(config.region.clone()))
            .credentials_provider(SharedCredentialsProvider::new(credentials))
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
            .force_path_style(true)
            .build();
        let client = Client::from_conf(s3_config);

        info!(
            "ストレージクライアントの初期化が完了しました。バケット: {}",
            config.bucket_name
        );

        Ok(Self {
            client,
            bucket_name: config.bucket_name.clone(),
            public_url: config.public_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> AppResult<()> {
        let size = body.len();
        info!("ファイルアップロード開始: key={key}, size={size} bytes, content_type={content_type}");

        let start_time = std::time::Instant::now();
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .body(body.into())
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| {
                error!(
                    "ファイルアップロード失敗: key={key}, bucket={}, error={e:?}",
                    self.bucket_name
                );
                AppError::storage(format!("アップロードエラー: {e}"))
            })?;

        info!(
            "ファイルアップロード成功: key={key}, duration={:?}",
            start_time.elapsed()
        );
        Ok(())
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.public_url, self.bucket_name, key)
    }
}

/// アップロード結果
#[derive(Debug, Clone, Serialize)]
pub struct UploadedImage {
    pub url: String,
    pub key: String,
    pub width: u32,
    pub height: u32,
    pub size: usize,
}

/// フォルダ名を検証する（英小文字・数字・ハイフンのみ）
pub fn validate_folder(folder: &str) -> AppResult<()> {
    let valid = !folder.is_empty()
        && folder.len() <= 50
        && folder
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');

    if valid {
        Ok(())
    } else {
        Err(AppError::validation("Folder tidak valid"))
    }
}

/// オブジェクトキーを生成する
///
/// # 戻り値
/// `<folder>/<timestamp_ms>-<random>.jpg`
pub fn generate_object_key(folder: &str) -> AppResult<String> {
    validate_folder(folder)?;
    Ok(format!(
        "{folder}/{}-{}.jpg",
        Utc::now().timestamp_millis(),
        generate_object_suffix()
    ))
}

/// 画像を圧縮してストレージにアップロードする
///
/// # 引数
/// * `storage` - ストレージ
/// * `folder` - 保存先フォルダ
/// * `bytes` - 元画像のデータ
/// * `content_type` - 元画像のContent-Type
/// * `config` - 画像圧縮設定
///
/// # 戻り値
/// 公開URLを含むアップロード結果
pub async fn upload_image(
    storage: Arc<dyn ObjectStorage>,
    folder: &str,
    bytes: Vec<u8>,
    content_type: &str,
    config: &ImageConfig,
) -> AppResult<UploadedImage> {
    let key = generate_object_key(folder)?;

    // 画像処理はCPU負荷が高いためブロッキングスレッドで実行する
    let content_type_owned = content_type.to_string();
    let config_owned = config.clone();
    let compressed: CompressedImage = tokio::task::spawn_blocking(move || {
        compress_image(&bytes, &content_type_owned, &config_owned)
    })
    .await
    .map_err(|e| AppError::concurrency(format!("画像処理タスクが失敗しました: {e}")))??;

    let size = compressed.data.len();
    storage
        .put_object(&key, compressed.data, CompressedImage::CONTENT_TYPE)
        .await?;

    Ok(UploadedImage {
        url: storage.public_url(&key),
        key,
        width: compressed.width,
        height: compressed.height,
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryStorage;
    use image::{DynamicImage, ImageFormat, RgbImage};
    use std::io::Cursor;

    #[test]
    fn test_generate_object_key() {
        let key = generate_object_key("receipts").unwrap();
        let (folder, file) = key.split_once('/').unwrap();
        assert_eq!(folder, "receipts");
        assert!(file.ends_with(".jpg"));

        let stem = file.trim_end_matches(".jpg");
        let (timestamp, random) = stem.split_once('-').unwrap();
        assert!(timestamp.parse::<i64>().is_ok());
        assert_eq!(random.len(), 10);
    }

    #[test]
    fn test_validate_folder() {
        assert!(validate_folder("car-images").is_ok());
        assert!(validate_folder("pengajuan2").is_ok());

        assert!(validate_folder("").is_err());
        assert!(validate_folder("../etc").is_err());
        assert!(validate_folder("Receipts").is_err());
        assert!(validate_folder("a/b").is_err());
    }

    #[tokio::test]
    async fn test_upload_image_stores_jpeg() {
        let storage = Arc::new(MemoryStorage::default());

        let mut png = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(1600, 800))
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let uploaded = upload_image(
            storage.clone(),
            "receipts",
            png,
            "image/png",
            &ImageConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(uploaded.width, 1280);
        assert!(uploaded.url.ends_with(&uploaded.key));
        assert!(uploaded.url.contains("/akasia/receipts/"));

        let stored = storage.get(&uploaded.key).unwrap();
        assert_eq!(stored.1, "image/jpeg");
        assert_eq!(stored.0.len(), uploaded.size);
    }

    #[tokio::test]
    async fn test_upload_rejects_non_image() {
        let storage = Arc::new(MemoryStorage::default());
        let result = upload_image(
            storage.clone(),
            "receipts",
            b"%PDF-1.4".to_vec(),
            "application/pdf",
            &ImageConfig::default(),
        )
        .await;

        assert!(matches!(result, Err(AppError::Validation(_))));
        assert!(storage.is_empty());
    }

    #[tokio::test]
    async fn test_storage_failure_is_reported() {
        let storage = Arc::new(MemoryStorage::failing());
        let mut png = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(10, 10))
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();

        let result = upload_image(storage, "receipts", png, "image/png", &ImageConfig::default()).await;
        match result {
            Err(err) => assert_eq!(err.user_message(), "Gagal mengunggah file ke penyimpanan"),
            Ok(_) => panic!("upload should fail"),
        }
    }
}

// 外部サービス連携モジュール

/// 画像圧縮
pub mod image;

/// オブジェクトストレージ
pub mod storage;

/// WhatsApp通知
pub mod whatsapp;

pub use self::image::{compress_image, CompressedImage};
pub use self::storage::{upload_image, ObjectStorage, S3Storage, UploadedImage};
pub use self::whatsapp::{notify_best_effort, NoopNotifier, Notifier, WhatsAppClient};

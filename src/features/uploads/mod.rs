/// 画像アップロード
pub mod handlers;

use crate::features::auth::CurrentUser;
use crate::services::storage::{upload_image, validate_folder, UploadedImage};
use crate::shared::errors::{AppError, AppResult};
use crate::AppState;
use axum::extract::{Multipart, Path, State};
use axum::routing::post;
use axum::{Json, Router};

/// アップロードを受け付けるマルチパートのフィールド名
const FILE_FIELD: &str = "file";

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/uploads/:folder", post(upload))
}

/// POST /api/uploads/:folder
///
/// 画像を圧縮してストレージへ保存し、公開URLを返す
async fn upload(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(folder): Path<String>,
    mut multipart: Multipart,
) -> AppResult<Json<UploadedImage>> {
    validate_folder(&folder)?;
    let storage = state.storage.clone().ok_or_else(|| {
        log::error!("ストレージが設定されていないためアップロードできません");
        AppError::configuration("ストレージが設定されていません")
    })?;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        log::warn!("マルチパートの解析に失敗: {e}");
        AppError::validation("Format unggahan tidak valid")
    })? {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await.map_err(|e| {
            log::warn!("アップロードデータの読み込みに失敗: {e}");
            AppError::validation("Format unggahan tidak valid")
        })?;

        log::info!(
            "画像アップロード: user_id={}, folder={folder}, size={} bytes",
            user.id,
            bytes.len()
        );
        let uploaded = upload_image(
            storage,
            &folder,
            bytes.to_vec(),
            &content_type,
            &state.config.image,
        )
        .await?;
        return Ok(Json(uploaded));
    }

    Err(AppError::validation("File wajib diunggah"))
}

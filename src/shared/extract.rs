use crate::shared::errors::AppError;
use axum::async_trait;
use axum::extract::{FromRequest, Request};
use axum::Json;
use serde::de::DeserializeOwned;
use validator::Validate;

/// JSONボディを読み込み、validatorで検証するエクストラクター
///
/// 解析失敗・検証失敗はどちらも`{"error": ...}`形式のValidationエラーになる
#[derive(Debug, Clone)]
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|rejection| {
            log::debug!("リクエストボディの解析に失敗: {rejection}");
            AppError::validation("Format data tidak valid")
        })?;

        value.validate()?;
        Ok(ValidatedJson(value))
    }
}

// 画像圧縮モジュール

use crate::shared::config::ImageConfig;
use crate::shared::errors::{AppError, AppResult};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use log::{debug, warn};

/// 圧縮後の画像
#[derive(Debug, Clone)]
pub struct CompressedImage {
    /// JPEGデータ
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl CompressedImage {
    pub const CONTENT_TYPE: &'static str = "image/jpeg";
}

/// 画像を縮小し、JPEGに再エンコードする
///
/// # 引数
/// * `bytes` - 元画像のデータ
/// * `content_type` - アップロード時のContent-Type（image/*のみ許可）
/// * `config` - 最大幅とJPEG品質
///
/// # 戻り値
/// JPEG画像（幅はmax_width以下、アスペクト比維持、拡大はしない）
pub fn compress_image(
    bytes: &[u8],
    content_type: &str,
    config: &ImageConfig,
) -> AppResult<CompressedImage> {
    if !content_type.trim().to_ascii_lowercase().starts_with("image/") {
        warn!("画像以外のファイルが送信されました: content_type={content_type}");
        return Err(AppError::validation("File harus berupa gambar"));
    }
    if bytes.is_empty() {
        return Err(AppError::validation("File kosong"));
    }

    let original = image::load_from_memory(bytes).map_err(|e| {
        warn!("画像のデコードに失敗: {e}");
        AppError::validation("File bukan gambar yang valid")
    })?;

    let (width, height) = (original.width(), original.height());
    let max_width = config.max_width.max(1);

    let resized = if width > max_width {
        let new_height = ((u64::from(height) * u64::from(max_width)) / u64::from(width)).max(1);
        let new_height = u32::try_from(new_height).unwrap_or(u32::MAX);
        original.resize_exact(max_width, new_height, FilterType::Triangle)
    } else {
        original
    };

    // JPEGはアルファチャンネルを持たないためRGBに変換する
    let rgb = resized.to_rgb8();
    let mut data = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut data, config.jpeg_quality))
        .map_err(|e| AppError::internal(format!("JPEGエンコードに失敗: {e}")))?;

    debug!(
        "画像を圧縮しました: {}x{} -> {}x{}, {} bytes -> {} bytes",
        width,
        height,
        rgb.width(),
        rgb.height(),
        bytes.len(),
        data.len()
    );

    Ok(CompressedImage {
        data,
        width: rgb.width(),
        height: rgb.height(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([200, 30, 30, 128]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn is_jpeg(data: &[u8]) -> bool {
        data.starts_with(&[0xFF, 0xD8, 0xFF])
    }

    #[test]
    fn test_large_image_is_downsized_to_max_width() {
        let config = ImageConfig::default();
        let result = compress_image(&png_bytes(2000, 1000), "image/png", &config).unwrap();

        assert!(is_jpeg(&result.data));
        assert_eq!(result.width, 1280);
        assert_eq!(result.height, 640);

        let decoded = image::load_from_memory(&result.data).unwrap();
        assert_eq!(decoded.width(), 1280);
    }

    #[test]
    fn test_small_image_is_not_upscaled() {
        let config = ImageConfig::default();
        let result = compress_image(&png_bytes(300, 200), "image/png", &config).unwrap();

        assert!(is_jpeg(&result.data));
        assert_eq!((result.width, result.height), (300, 200));
    }

    #[test]
    fn test_custom_max_width() {
        let config = ImageConfig {
            max_width: 100,
            jpeg_quality: 60,
        };
        let result = compress_image(&png_bytes(400, 100), "image/png", &config).unwrap();
        assert_eq!((result.width, result.height), (100, 25));
    }

    #[test]
    fn test_non_image_content_type_rejected() {
        let config = ImageConfig::default();
        let result = compress_image(&png_bytes(10, 10), "application/pdf", &config);
        assert!(matches!(result, Err(AppError::Validation(_))));
    }

    #[test]
    fn test_undecodable_data_rejected() {
        let config = ImageConfig::default();
        let result = compress_image(b"definitely not an image", "image/jpeg", &config);
        assert!(matches!(result, Err(AppError::Validation(_))));

        let empty = compress_image(&[], "image/jpeg", &config);
        assert!(matches!(empty, Err(AppError::Validation(_))));
    }
}

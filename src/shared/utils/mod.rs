use crate::shared::errors::{AppError, AppResult};
use chrono::{DateTime, Datelike, NaiveDate, SecondsFormat, Utc};
use chrono_tz::Asia::Jakarta;
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

pub mod ids;
pub mod text_enum;

pub use ids::{generate_object_suffix, generate_session_id, is_valid_session_id};

/// 更新DTOで「未指定」と「nullで解除」を区別するためのデシリアライザ
///
/// `#[serde(default, deserialize_with = "deserialize_nullable")]` と組み合わせる。
/// フィールド省略 → `None`、`null` → `Some(None)`、値あり → `Some(Some(v))`
pub fn deserialize_nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: serde::Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// 金額の上限（10^13ルピア未満）
pub const MAX_AMOUNT: i64 = 10_000_000_000_000;

static PHONE_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^62[0-9]{8,13}$").unwrap());

/// 日付文字列のバリデーション
///
/// # 引数
/// * `date_str` - 日付文字列（YYYY-MM-DD形式）
///
/// # 戻り値
/// 有効な日付の場合はOk(())、無効な場合はエラー
///
/// # バリデーション規則
/// - YYYY-MM-DD形式であること
/// - 実在する日付であること
/// - 1900年以降、2100年以前であること
pub fn validate_date(date_str: &str) -> AppResult<()> {
    if date_str.len() != 10
        || date_str.chars().nth(4) != Some('-')
        || date_str.chars().nth(7) != Some('-')
    {
        return Err(AppError::validation(
            "Tanggal harus berformat YYYY-MM-DD",
        ));
    }

    let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .map_err(|_| AppError::validation("Tanggal tidak valid"))?;

    if !(1900..=2100).contains(&date.year()) {
        return Err(AppError::validation(
            "Tanggal harus antara tahun 1900 dan 2100",
        ));
    }

    Ok(())
}

/// 金額のバリデーション
///
/// # 引数
/// * `amount` - 金額（ルピア、整数）
///
/// # 戻り値
/// 有効な金額の場合はOk(())、無効な場合はエラー
pub fn validate_amount(amount: i64) -> AppResult<()> {
    if amount <= 0 {
        return Err(AppError::validation("Jumlah harus lebih dari 0"));
    }
    if amount >= MAX_AMOUNT {
        return Err(AppError::validation("Jumlah terlalu besar"));
    }
    Ok(())
}

/// 必須フィールドのバリデーション
pub fn validate_required_field(text: &str, field_name: &str) -> AppResult<()> {
    if text.trim().is_empty() {
        return Err(AppError::validation(format!("{field_name} wajib diisi")));
    }
    Ok(())
}

/// ナンバープレートを正規化する
///
/// 大文字化し、連続する空白を1つにまとめる（例: " b  1234 xyz " → "B 1234 XYZ"）
pub fn normalize_license_plate(plate: &str) -> String {
    plate
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// WhatsApp用の電話番号を検証し、62xxxx形式に正規化する
///
/// # 引数
/// * `phone` - 電話番号（"08…", "+62…", "62…"、空白・ハイフン可）
///
/// # 戻り値
/// 正規化された電話番号、または無効な場合はエラー
pub fn validate_phone_number(phone: &str) -> AppResult<String> {
    let digits: String = phone
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '+'))
        .collect();

    let normalized = match digits.strip_prefix('0') {
        Some(rest) => format!("62{rest}"),
        None => digits,
    };

    if !PHONE_DIGITS.is_match(&normalized) {
        return Err(AppError::validation("Nomor telepon tidak valid"));
    }

    Ok(normalized)
}

/// 現在の日時をWIB（Asia/Jakarta）で取得
///
/// # 戻り値
/// RFC3339文字列（秒精度、例: 2024-05-01T09:30:00+07:00）
pub fn now_jakarta() -> String {
    format_timestamp(&Utc::now())
}

/// UTC日時をWIBのRFC3339文字列に変換する
pub fn format_timestamp(datetime: &DateTime<Utc>) -> String {
    datetime
        .with_timezone(&Jakarta)
        .to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// RFC3339文字列を解析する
pub fn parse_timestamp(value: &str) -> AppResult<DateTime<Tz>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Jakarta))
        .map_err(|_| AppError::validation("Format waktu tidak valid"))
}

/// 今日の日付をYYYY-MM-DD形式で取得（WIB基準）
pub fn today_jakarta() -> String {
    Utc::now()
        .with_timezone(&Jakarta)
        .format("%Y-%m-%d")
        .to_string()
}

/// 文字列の正規化（前後の空白を削除、空文字はNone）
pub fn normalize_optional(text: Option<String>) -> Option<String> {
    text.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

/// 金額をルピア表記でフォーマット（例: 1500000 → "Rp 1.500.000"）
pub fn format_rupiah(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('.');
        }
        grouped.push(ch);
    }

    if amount < 0 {
        format!("-Rp {grouped}")
    } else {
        format!("Rp {grouped}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_date() {
        assert!(validate_date("2024-05-01").is_ok());
        assert!(validate_date("2024-02-29").is_ok());

        assert!(validate_date("2023-02-29").is_err());
        assert!(validate_date("2024/05/01").is_err());
        assert!(validate_date("24-05-01").is_err());
        assert!(validate_date("1899-12-31").is_err());
    }

    #[test]
    fn test_validate_amount() {
        assert!(validate_amount(1).is_ok());
        assert!(validate_amount(MAX_AMOUNT - 1).is_ok());

        assert!(validate_amount(0).is_err());
        assert!(validate_amount(-500).is_err());
        assert!(validate_amount(MAX_AMOUNT).is_err());
    }

    #[test]
    fn test_normalize_license_plate() {
        assert_eq!(normalize_license_plate(" b  1234 xyz "), "B 1234 XYZ");
        assert_eq!(normalize_license_plate("D 1 AB"), "D 1 AB");
    }

    #[test]
    fn test_validate_phone_number() {
        assert_eq!(validate_phone_number("0812-3456-7890").unwrap(), "6281234567890");
        assert_eq!(validate_phone_number("+62 812 3456 7890").unwrap(), "6281234567890");
        assert_eq!(validate_phone_number("6281234567890").unwrap(), "6281234567890");

        assert!(validate_phone_number("12345").is_err());
        assert!(validate_phone_number("0812abc").is_err());
    }

    #[test]
    fn test_now_jakarta_has_wib_offset() {
        let now = now_jakarta();
        assert!(now.ends_with("+07:00"), "unexpected timestamp: {now}");
        assert!(parse_timestamp(&now).is_ok());
    }

    #[test]
    fn test_today_jakarta_is_valid_date() {
        assert!(validate_date(&today_jakarta()).is_ok());
    }

    #[test]
    fn test_format_rupiah() {
        assert_eq!(format_rupiah(0), "Rp 0");
        assert_eq!(format_rupiah(999), "Rp 999");
        assert_eq!(format_rupiah(1_500_000), "Rp 1.500.000");
        assert_eq!(format_rupiah(-25_000), "-Rp 25.000");
    }

    #[test]
    fn test_normalize_optional() {
        assert_eq!(normalize_optional(Some("  ".to_string())), None);
        assert_eq!(
            normalize_optional(Some(" catatan ".to_string())),
            Some("catatan".to_string())
        );
        assert_eq!(normalize_optional(None), None);
    }
}

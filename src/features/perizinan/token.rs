// 承認リンク用トークンの発行と検証

use crate::shared::config::app_config::MAX_APPROVAL_TOKEN_HOURS;
use crate::shared::errors::{AppError, AppResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// トークンのバイト長
const TOKEN_BYTES: usize = 32;

/// 有効時間の上限（30日）
pub const MAX_VALID_HOURS: i64 = MAX_APPROVAL_TOKEN_HOURS;

/// 発行済みトークン
///
/// `token`はリンクにのみ含め、データベースには`token_hash`だけを保存する
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
}

/// トークンのSHA-256ハッシュ（16進文字列）
pub fn hash_token(token: &str) -> String {
    Sha256::digest(token.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

/// 承認トークンを発行する
///
/// # 引数
/// * `valid_hours` - 有効時間（1〜720時間）
///
/// # 戻り値
/// URLセーフなBase64トークン、そのハッシュ、有効期限
pub fn generate_approval_token(valid_hours: i64) -> AppResult<IssuedToken> {
    if !(1..=MAX_VALID_HOURS).contains(&valid_hours) {
        return Err(AppError::validation(format!(
            "Masa berlaku harus antara 1 dan {MAX_VALID_HOURS} jam"
        )));
    }

    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    let token = URL_SAFE_NO_PAD.encode(bytes);

    Ok(IssuedToken {
        token_hash: hash_token(&token),
        token,
        expires_at: Utc::now() + Duration::hours(valid_hours),
    })
}

/// 承認リンクを組み立てる
pub fn approval_link(app_base_url: &str, token: &str) -> String {
    format!(
        "{}/perizinan/approval/{token}",
        app_base_url.trim_end_matches('/')
    )
}

/// トークンの形式チェック（Base64URL、32バイト分）
pub fn is_well_formed(token: &str) -> bool {
    URL_SAFE_NO_PAD
        .decode(token)
        .map(|bytes| bytes.len() == TOKEN_BYTES)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_approval_token() {
        let issued = generate_approval_token(24).unwrap();

        assert_eq!(issued.token.len(), 43);
        assert!(is_well_formed(&issued.token));
        assert_eq!(issued.token_hash, hash_token(&issued.token));
        assert_eq!(issued.token_hash.len(), 64);
        assert_ne!(issued.token_hash, issued.token);

        let remaining = issued.expires_at - Utc::now();
        assert!(remaining > Duration::hours(23) && remaining <= Duration::hours(24));
    }

    #[test]
    fn test_tokens_are_unique() {
        let a = generate_approval_token(1).unwrap();
        let b = generate_approval_token(1).unwrap();
        assert_ne!(a.token, b.token);
    }

    #[test]
    fn test_valid_hours_bounds() {
        assert!(generate_approval_token(0).is_err());
        assert!(generate_approval_token(-5).is_err());
        assert!(generate_approval_token(MAX_VALID_HOURS + 1).is_err());
        assert!(generate_approval_token(MAX_VALID_HOURS).is_ok());
    }

    #[test]
    fn test_approval_link() {
        assert_eq!(
            approval_link("https://akasia.test/", "abc"),
            "https://akasia.test/perizinan/approval/abc"
        );
    }

    #[test]
    fn test_is_well_formed() {
        assert!(!is_well_formed("short"));
        assert!(!is_well_formed("not base64 !!"));
    }
}

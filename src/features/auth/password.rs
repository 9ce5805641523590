use crate::shared::errors::{AppError, AppResult};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

/// パスワードをargon2idでハッシュ化する
///
/// # 引数
/// * `password` - 平文パスワード
///
/// # 戻り値
/// PHC形式のハッシュ文字列
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::internal(format!("パスワードのハッシュ化に失敗: {e}")))
}

/// パスワードをハッシュと照合する
///
/// ハッシュが壊れている場合もfalseを返す
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("rahasia123").unwrap();

        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("rahasia123", &hash));
        assert!(!verify_password("salah", &hash));
    }

    #[test]
    fn test_hash_uses_random_salt() {
        let first = hash_password("rahasia123").unwrap();
        let second = hash_password("rahasia123").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_verify_with_malformed_hash() {
        assert!(!verify_password("rahasia123", "not-a-hash"));
    }
}

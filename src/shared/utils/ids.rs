use nanoid::nanoid;

/// オブジェクトキー用の英数字（URL・ファイル名で安全）
const ALPHANUMERIC: [char; 62] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h',
    'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
    'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I', 'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R',
    'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z',
];

/// オブジェクトキーの末尾に付与するランダム文字列の長さ
const OBJECT_SUFFIX_LENGTH: usize = 10;

/// オブジェクトキー用のランダム文字列を生成する
///
/// # 戻り値
/// 10文字の英数字
pub fn generate_object_suffix() -> String {
    nanoid!(OBJECT_SUFFIX_LENGTH, &ALPHANUMERIC)
}

/// セッションID用のnanoIdを生成する
///
/// # 戻り値
/// 21文字のURL-safeなnanoId
///
/// # 特性
/// - 文字セット: A-Za-z0-9_- (64文字)
/// - 長さ: 21文字
pub fn generate_session_id() -> String {
    nanoid!()
}

/// セッションIDが有効な形式かどうかを検証する
pub fn is_valid_session_id(id: &str) -> bool {
    id.len() == 21
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_object_suffix() {
        let suffix = generate_object_suffix();
        assert_eq!(suffix.len(), OBJECT_SUFFIX_LENGTH);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(suffix, generate_object_suffix());
    }

    #[test]
    fn test_generate_session_id() {
        let id = generate_session_id();
        assert!(is_valid_session_id(&id));
        assert_ne!(id, generate_session_id());
    }

    #[test]
    fn test_is_valid_session_id() {
        assert!(!is_valid_session_id(""));
        assert!(!is_valid_session_id("short"));
        assert!(!is_valid_session_id("invalid@characters!!!"));
    }
}

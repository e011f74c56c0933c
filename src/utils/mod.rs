/// 生成指定长度的 base36 随机段（大写字母 + 数字）
pub fn generate_code_segment(length: usize) -> String {
    use std::iter;

    let chars = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

    iter::repeat_with(|| chars[rand::random_range(0..chars.len())] as char)
        .take(length)
        .collect()
}

/// 校验调用方自定义的推广码格式
///
/// 允许字母、数字、下划线和连字符，长度 4-32。
pub fn is_valid_custom_code(code: &str) -> bool {
    (4..=32).contains(&code.len())
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// 推广码统一大写存储，保证大小写不敏感的唯一性
pub fn normalize_code(code: &str) -> String {
    code.to_ascii_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_code_segment_length_and_charset() {
        for len in [6, 8] {
            let code = generate_code_segment(len);
            assert_eq!(code.len(), len);
            assert!(
                code.chars()
                    .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
            );
        }
    }

    #[test]
    fn test_is_valid_custom_code() {
        assert!(is_valid_custom_code("SUMMER24"));
        assert!(is_valid_custom_code("my-code_1"));
        assert!(!is_valid_custom_code("abc")); // 太短
        assert!(!is_valid_custom_code(&"A".repeat(33))); // 太长
        assert!(!is_valid_custom_code("has space"));
        assert!(!is_valid_custom_code("emoji🎉code"));
    }

    #[test]
    fn test_normalize_code_uppercases() {
        assert_eq!(normalize_code("Summer24"), "SUMMER24");
        assert_eq!(normalize_code("SUMMER24"), "SUMMER24");
    }
}

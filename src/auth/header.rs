//! # 认证头解析
//!
//! 解析 `Authorization: Bearer <token>` 形式的认证头

use crate::auth_error;
use crate::error::Result;

/// 缺少认证头时的错误消息
pub const MISSING_HEADER: &str = "authorization header missing";

/// 认证头格式错误时的错误消息
pub const INVALID_FORMAT: &str = "invalid authorization header format";

/// 从认证头中提取 Bearer 令牌
///
/// 头值必须恰好由两段组成，第一段为 `Bearer`（不区分大小写）
pub fn extract_bearer_token(value: Option<&str>) -> Result<&str> {
    let value = value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| auth_error!(MISSING_HEADER))?;

    let mut parts = value.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => Ok(token),
        _ => Err(auth_error!(INVALID_FORMAT)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Bearer abc", "abc")]
    #[case("bearer abc", "abc")]
    #[case("BEARER   abc", "abc")]
    #[case("  Bearer abc  ", "abc")]
    fn test_valid_headers(#[case] header: &str, #[case] expected: &str) {
        assert_eq!(extract_bearer_token(Some(header)).unwrap(), expected);
    }

    #[rstest]
    #[case("Bearer")]
    #[case("abc")]
    #[case("Basic abc")]
    #[case("Bearer abc def")]
    fn test_invalid_format(#[case] header: &str) {
        let err = extract_bearer_token(Some(header)).unwrap_err();
        assert!(err.to_string().contains(INVALID_FORMAT));
    }

    #[rstest]
    #[case(None)]
    #[case(Some(""))]
    #[case(Some("   "))]
    fn test_missing(#[case] header: Option<&str>) {
        let err = extract_bearer_token(header).unwrap_err();
        assert!(err.to_string().contains(MISSING_HEADER));
    }
}

//! 抓取失败分类
//!
//! 分类是按消息文本和状态码做的启发式判断，不是可靠的判定。
//! 原始状态码和消息会和分类结果一起保存，便于事后排查误判。

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;

use crate::error::FetchError;
use crate::utils::{clip, mask_credentials};

/// 存储时消息的最大长度
pub const MAX_STORED_MESSAGE: usize = 500;

/// 失败类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimit,
    Blocked,
    Timeout,
    Connection,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Blocked => "blocked",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Connection => "connection",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const RATE_LIMIT_MARKERS: &[&str] = &["429", "too many requests", "rate limit", "throttl"];
const BLOCKED_MARKERS: &[&str] = &[
    "403",
    "forbidden",
    "blocked",
    "captcha",
    "cloudflare",
    "access denied",
];
const TIMEOUT_MARKERS: &[&str] = &["timeout", "timed out"];
const CONNECTION_MARKERS: &[&str] = &["connection", "network", "dns", "refused"];

/// 错误文本中提示出现了验证挑战的关键词
const CHALLENGE_MARKERS: &[&str] = &["cloudflare", "403", "captcha"];

/// 对一次抓取失败分类
///
/// 依次检查：限流 → 封锁 → 超时 → 连接，都不匹配时为 unknown。
/// 验证挑战未解决直接视为封锁。
pub fn classify_error(error: &FetchError) -> ErrorKind {
    if matches!(error, FetchError::ChallengeUnsolved { .. }) {
        return ErrorKind::Blocked;
    }

    match error.status_code() {
        Some(429) => return ErrorKind::RateLimit,
        Some(403) => return ErrorKind::Blocked,
        _ => {}
    }

    let text = error.to_string().to_lowercase();
    let has = |markers: &[&str]| markers.iter().any(|m| text.contains(m));

    if has(RATE_LIMIT_MARKERS) {
        ErrorKind::RateLimit
    } else if has(BLOCKED_MARKERS) {
        ErrorKind::Blocked
    } else if has(TIMEOUT_MARKERS) || matches!(error, FetchError::Timeout(_)) {
        ErrorKind::Timeout
    } else if has(CONNECTION_MARKERS) || matches!(error, FetchError::Connection(_)) {
        ErrorKind::Connection
    } else {
        ErrorKind::Unknown
    }
}

/// 错误文本是否提示遇到了验证挑战
pub fn mentions_challenge(error: &FetchError) -> bool {
    if matches!(error, FetchError::ChallengeUnsolved { .. }) {
        return true;
    }
    let text = error.to_string().to_lowercase();
    CHALLENGE_MARKERS.iter().any(|m| text.contains(m))
}

fn status_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([3-5]\d{2})\b").ok())
        .as_ref()
}

/// 从消息中提取 HTTP 状态码（第一个 3xx/4xx/5xx 形式的三位数）
pub fn extract_status_code(message: &str) -> Option<u16> {
    status_regex()?
        .captures(message)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// 存储用的错误上下文，必须在截断消息之前提取
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    pub class_name: &'static str,
    pub status_code: Option<u16>,
    /// 脱敏并截断到 500 字符的消息
    pub message: String,
}

impl ErrorContext {
    pub fn from_error(error: &FetchError) -> Self {
        let full = error.to_string();
        let status_code = error.status_code().or_else(|| extract_status_code(&full));
        Self {
            class_name: error.class_name(),
            status_code,
            message: mask_credentials(&clip(&full, MAX_STORED_MESSAGE)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_drive_classification() {
        assert_eq!(classify_error(&FetchError::http(429, "")), ErrorKind::RateLimit);
        assert_eq!(classify_error(&FetchError::http(403, "")), ErrorKind::Blocked);
        assert_eq!(
            classify_error(&FetchError::http(500, "upstream timed out")),
            ErrorKind::Timeout
        );
    }

    #[test]
    fn message_markers_in_priority_order() {
        let cases = [
            ("Too Many Requests, throttled", ErrorKind::RateLimit),
            ("Access Denied by Cloudflare", ErrorKind::Blocked),
            ("captcha required", ErrorKind::Blocked),
            ("read timed out", ErrorKind::Timeout),
            ("DNS lookup failed", ErrorKind::Connection),
            ("connection refused", ErrorKind::Connection),
            ("unexpected payload", ErrorKind::Unknown),
            // 限流优先于封锁
            ("403 after rate limit", ErrorKind::RateLimit),
        ];
        for (message, expected) in cases {
            assert_eq!(
                classify_error(&FetchError::Other(message.to_string())),
                expected,
                "{message}"
            );
        }
    }

    #[test]
    fn variant_fallbacks() {
        assert_eq!(
            classify_error(&FetchError::Timeout("deadline".into())),
            ErrorKind::Timeout
        );
        assert_eq!(
            classify_error(&FetchError::Connection("reset".into())),
            ErrorKind::Connection
        );
        assert_eq!(
            classify_error(&FetchError::ChallengeUnsolved { rounds: 3 }),
            ErrorKind::Blocked
        );
    }

    #[test]
    fn status_extraction() {
        assert_eq!(extract_status_code("Got HTTP 503 from server"), Some(503));
        assert_eq!(extract_status_code("error 1234 and 200"), None);
        assert_eq!(extract_status_code("no code"), None);
    }

    #[test]
    fn context_extracts_status_before_truncating() {
        let long = format!("{} status 502", "x ".repeat(400));
        let ctx = ErrorContext::from_error(&FetchError::Other(long));
        assert_eq!(ctx.status_code, Some(502));
        assert_eq!(ctx.message.chars().count(), MAX_STORED_MESSAGE);
        assert_eq!(ctx.class_name, "Other");
    }

    #[test]
    fn context_masks_credentials() {
        let ctx = ErrorContext::from_error(&FetchError::Connection(
            "proxy http://u:pw@proxy:3128 refused".into(),
        ));
        assert!(ctx.message.contains("u:****@proxy"));
        assert!(!ctx.message.contains("pw"));
    }
}

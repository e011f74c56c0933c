//! API 帮助函数

use actix_web::HttpResponse;
use actix_web::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error_code::ErrorCode;
use super::types::{ApiResponse, PaginatedResponse, PaginationInfo};
use crate::errors::PromolinkError;

/// 解析 RFC3339 过期时间
pub fn parse_expires_at(expire_str: &str) -> Result<DateTime<Utc>, PromolinkError> {
    DateTime::parse_from_rfc3339(expire_str)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|_| {
            PromolinkError::date_parse(format!(
                "Invalid expires_at format: {}. Use RFC3339 (e.g. 2026-12-31T23:59:59Z)",
                expire_str
            ))
        })
}

/// 构建 JSON 响应
pub fn json_response<T: Serialize>(
    status: StatusCode,
    code: ErrorCode,
    message: impl Into<String>,
    data: Option<T>,
) -> HttpResponse {
    HttpResponse::build(status)
        .append_header(("Content-Type", "application/json; charset=utf-8"))
        .json(ApiResponse {
            code: code as i32,
            message: message.into(),
            data,
        })
}

/// 构建成功响应
pub fn success_response<T: Serialize>(data: T) -> HttpResponse {
    json_response(StatusCode::OK, ErrorCode::Success, "OK", Some(data))
}

/// 构建分页响应
pub fn paginated_response<T: Serialize>(data: T, pagination: PaginationInfo) -> HttpResponse {
    HttpResponse::Ok()
        .append_header(("Content-Type", "application/json; charset=utf-8"))
        .json(PaginatedResponse {
            code: ErrorCode::Success as i32,
            message: "OK".to_string(),
            data,
            pagination,
        })
}

/// 构建错误响应
pub fn error_response(status: StatusCode, error_code: ErrorCode, message: &str) -> HttpResponse {
    json_response::<()>(status, error_code, message, None)
}

/// 从 PromolinkError 构建错误响应（自动映射 HTTP 状态码和 ErrorCode）
pub fn error_from_promolink(err: &PromolinkError) -> HttpResponse {
    error_response(err.http_status(), ErrorCode::from(err), err.message())
}

/// 统一 Result → HttpResponse 转换
pub fn api_result<T: Serialize>(result: Result<T, PromolinkError>) -> HttpResponse {
    match result {
        Ok(data) => success_response(data),
        Err(e) => error_from_promolink(&e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_expires_at_rfc3339() {
        let parsed = parse_expires_at("2026-12-31T23:59:59Z").unwrap();
        assert_eq!(parsed.date_naive().to_string(), "2026-12-31");
    }

    #[test]
    fn test_parse_expires_at_invalid() {
        assert!(parse_expires_at("next tuesday").is_err());
        assert!(parse_expires_at("").is_err());
    }

    #[test]
    fn test_error_response_status() {
        let response = error_response(
            StatusCode::CONFLICT,
            ErrorCode::DuplicateCode,
            "already exists",
        );
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_success_response_status() {
        let response = success_response("data");
        assert_eq!(response.status(), StatusCode::OK);
    }
}

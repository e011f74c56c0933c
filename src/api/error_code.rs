//! 统一 API 错误码定义

use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::errors::PromolinkError;

/// API 错误码枚举
///
/// 使用 serde_repr 序列化为数字。按千位分域：
/// - 0: 成功
/// - 1000-1099: 通用错误
/// - 3000-3099: 码/链接/二维码错误
/// - 4000-4099: 事件接入错误
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(i32)]
pub enum ErrorCode {
    // 成功
    Success = 0,

    // 通用错误 1000-1099
    BadRequest = 1000,
    NotFound = 1004,
    InternalServerError = 1005,
    InvalidDateFormat = 1012,
    ServiceUnavailable = 1030,

    // 码/链接/二维码错误 3000-3099
    DuplicateCode = 3001,
    GenerationExhausted = 3002,
    SubjectNotUsable = 3003,

    // 事件接入错误 4000-4099
    NoAttributableClick = 4000,
}

impl From<&PromolinkError> for ErrorCode {
    fn from(err: &PromolinkError) -> Self {
        match err {
            PromolinkError::Validation(_) => ErrorCode::BadRequest,
            PromolinkError::DateParse(_) => ErrorCode::InvalidDateFormat,
            PromolinkError::DuplicateCode(_) => ErrorCode::DuplicateCode,
            PromolinkError::GenerationExhausted(_) => ErrorCode::GenerationExhausted,
            PromolinkError::NotUsable(_) => ErrorCode::SubjectNotUsable,
            PromolinkError::NoAttributableClick(_) => ErrorCode::NoAttributableClick,
            PromolinkError::NotFound(_) => ErrorCode::NotFound,
            PromolinkError::StoreUnavailable(_) => ErrorCode::ServiceUnavailable,
            PromolinkError::DatabaseConfig(_)
            | PromolinkError::DatabaseConnection(_)
            | PromolinkError::DatabaseOperation(_)
            | PromolinkError::Serialization(_) => ErrorCode::InternalServerError,
        }
    }
}

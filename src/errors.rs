use std::fmt;

use actix_web::http::StatusCode;

#[derive(Debug, Clone)]
pub enum PromolinkError {
    Validation(String),
    DuplicateCode(String),
    GenerationExhausted(String),
    NotUsable(String),
    NoAttributableClick(String),
    NotFound(String),
    DatabaseConfig(String),
    DatabaseConnection(String),
    DatabaseOperation(String),
    StoreUnavailable(String),
    Serialization(String),
    DateParse(String),
}

impl PromolinkError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            PromolinkError::Validation(_) => "E001",
            PromolinkError::DuplicateCode(_) => "E002",
            PromolinkError::GenerationExhausted(_) => "E003",
            PromolinkError::NotUsable(_) => "E004",
            PromolinkError::NoAttributableClick(_) => "E005",
            PromolinkError::NotFound(_) => "E006",
            PromolinkError::DatabaseConfig(_) => "E007",
            PromolinkError::DatabaseConnection(_) => "E008",
            PromolinkError::DatabaseOperation(_) => "E009",
            PromolinkError::StoreUnavailable(_) => "E010",
            PromolinkError::Serialization(_) => "E011",
            PromolinkError::DateParse(_) => "E012",
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            PromolinkError::Validation(_) => "Validation Error",
            PromolinkError::DuplicateCode(_) => "Duplicate Code",
            PromolinkError::GenerationExhausted(_) => "Code Generation Exhausted",
            PromolinkError::NotUsable(_) => "Subject Not Usable",
            PromolinkError::NoAttributableClick(_) => "No Attributable Click",
            PromolinkError::NotFound(_) => "Resource Not Found",
            PromolinkError::DatabaseConfig(_) => "Database Configuration Error",
            PromolinkError::DatabaseConnection(_) => "Database Connection Error",
            PromolinkError::DatabaseOperation(_) => "Database Operation Error",
            PromolinkError::StoreUnavailable(_) => "Store Unavailable",
            PromolinkError::Serialization(_) => "Serialization Error",
            PromolinkError::DateParse(_) => "Date Parse Error",
        }
    }

    /// 获取错误详情
    pub fn message(&self) -> &str {
        match self {
            PromolinkError::Validation(msg)
            | PromolinkError::DuplicateCode(msg)
            | PromolinkError::GenerationExhausted(msg)
            | PromolinkError::NotUsable(msg)
            | PromolinkError::NoAttributableClick(msg)
            | PromolinkError::NotFound(msg)
            | PromolinkError::DatabaseConfig(msg)
            | PromolinkError::DatabaseConnection(msg)
            | PromolinkError::DatabaseOperation(msg)
            | PromolinkError::StoreUnavailable(msg)
            | PromolinkError::Serialization(msg)
            | PromolinkError::DateParse(msg) => msg,
        }
    }

    /// HTTP 状态码映射（API 层使用）
    pub fn http_status(&self) -> StatusCode {
        match self {
            PromolinkError::Validation(_) | PromolinkError::DateParse(_) => StatusCode::BAD_REQUEST,
            PromolinkError::DuplicateCode(_) | PromolinkError::GenerationExhausted(_) => {
                StatusCode::CONFLICT
            }
            PromolinkError::NotUsable(_) => StatusCode::GONE,
            PromolinkError::NoAttributableClick(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PromolinkError::NotFound(_) => StatusCode::NOT_FOUND,
            PromolinkError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            PromolinkError::DatabaseConfig(_)
            | PromolinkError::DatabaseConnection(_)
            | PromolinkError::DatabaseOperation(_)
            | PromolinkError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 调用方是否值得带退避重试
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PromolinkError::StoreUnavailable(_) | PromolinkError::DatabaseConnection(_)
        )
    }
}

impl fmt::Display for PromolinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type(), self.message())
    }
}

impl std::error::Error for PromolinkError {}

// 便捷的构造函数
impl PromolinkError {
    pub fn validation<T: Into<String>>(msg: T) -> Self {
        PromolinkError::Validation(msg.into())
    }

    pub fn duplicate_code<T: Into<String>>(msg: T) -> Self {
        PromolinkError::DuplicateCode(msg.into())
    }

    pub fn generation_exhausted<T: Into<String>>(msg: T) -> Self {
        PromolinkError::GenerationExhausted(msg.into())
    }

    pub fn not_usable<T: Into<String>>(msg: T) -> Self {
        PromolinkError::NotUsable(msg.into())
    }

    pub fn no_attributable_click<T: Into<String>>(msg: T) -> Self {
        PromolinkError::NoAttributableClick(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        PromolinkError::NotFound(msg.into())
    }

    pub fn database_config<T: Into<String>>(msg: T) -> Self {
        PromolinkError::DatabaseConfig(msg.into())
    }

    pub fn database_connection<T: Into<String>>(msg: T) -> Self {
        PromolinkError::DatabaseConnection(msg.into())
    }

    pub fn database_operation<T: Into<String>>(msg: T) -> Self {
        PromolinkError::DatabaseOperation(msg.into())
    }

    pub fn store_unavailable<T: Into<String>>(msg: T) -> Self {
        PromolinkError::StoreUnavailable(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        PromolinkError::Serialization(msg.into())
    }

    pub fn date_parse<T: Into<String>>(msg: T) -> Self {
        PromolinkError::DateParse(msg.into())
    }
}

// 为常见的错误类型实现 From trait
impl From<sea_orm::DbErr> for PromolinkError {
    fn from(err: sea_orm::DbErr) -> Self {
        PromolinkError::DatabaseOperation(err.to_string())
    }
}

impl From<serde_json::Error> for PromolinkError {
    fn from(err: serde_json::Error) -> Self {
        PromolinkError::Serialization(err.to_string())
    }
}

impl From<chrono::ParseError> for PromolinkError {
    fn from(err: chrono::ParseError) -> Self {
        PromolinkError::DateParse(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PromolinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(PromolinkError::validation("x").code(), "E001");
        assert_eq!(PromolinkError::duplicate_code("x").code(), "E002");
        assert_eq!(PromolinkError::not_usable("x").code(), "E004");
        assert_eq!(PromolinkError::store_unavailable("x").code(), "E010");
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(
            PromolinkError::validation("bad").http_status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PromolinkError::duplicate_code("dup").http_status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            PromolinkError::not_usable("gone").http_status(),
            StatusCode::GONE
        );
        assert_eq!(
            PromolinkError::no_attributable_click("none").http_status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            PromolinkError::store_unavailable("down").http_status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_retryable_classification() {
        assert!(PromolinkError::store_unavailable("timeout").is_retryable());
        assert!(!PromolinkError::not_usable("exhausted").is_retryable());
        assert!(!PromolinkError::validation("bad").is_retryable());
    }

    #[test]
    fn test_display_format() {
        let err = PromolinkError::duplicate_code("code 'SUMMER24' already exists");
        assert_eq!(
            err.to_string(),
            "Duplicate Code: code 'SUMMER24' already exists"
        );
    }
}

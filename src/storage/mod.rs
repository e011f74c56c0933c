//! SeaORM storage backend
//!
//! 支持 SQLite、MySQL/MariaDB 和 PostgreSQL，后端类型从 DATABASE_URL 推断。
//! 所有写路径经过重试执行器；消费路径额外带单次操作超时。

mod codes;
pub mod connection;
pub mod consume;
mod events;
mod links;
pub mod models;
mod qrcodes;
pub mod retry;

use chrono::Utc;
use sea_orm::DatabaseConnection;
use tracing::warn;

pub use codes::CodeFilter;
pub use consume::{Consumable, ConsumeDecision, RejectReason, SubjectRef};
pub use events::{ConversionOutcome, IssuedClick, RecordOutcome};
pub use models::*;

use crate::errors::{PromolinkError, Result};

/// 从数据库 URL 推断数据库类型
pub fn infer_backend_from_url(database_url: &str) -> Result<String> {
    if database_url.starts_with("sqlite://")
        || database_url.ends_with(".db")
        || database_url.ends_with(".sqlite")
        || database_url == ":memory:"
    {
        Ok("sqlite".to_string())
    } else if database_url.starts_with("mysql://") || database_url.starts_with("mariadb://") {
        Ok("mysql".to_string())
    } else if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        Ok("postgres".to_string())
    } else {
        Err(PromolinkError::database_config(format!(
            "无法从 URL 推断数据库类型: {}. 支持的 URL 格式: sqlite://, mysql://, mariadb://, postgres://",
            database_url
        )))
    }
}

/// SeaORM-based storage backend
#[derive(Clone)]
pub struct SeaOrmStorage {
    db: DatabaseConnection,
    backend_name: String,
    retry_config: retry::RetryConfig,
    /// 消费路径单次操作超时
    op_timeout_ms: u64,
}

impl SeaOrmStorage {
    pub async fn new(database_url: &str, backend_name: &str) -> Result<Self> {
        if database_url.is_empty() {
            return Err(PromolinkError::database_config(
                "DATABASE_URL 未设置".to_string(),
            ));
        }

        let config = crate::config::get_config();
        let retry_config = retry::RetryConfig {
            max_retries: config.database.retry_count,
            base_delay_ms: config.database.retry_base_delay_ms,
            max_delay_ms: config.database.retry_max_delay_ms,
        };

        let db = if backend_name == "sqlite" {
            connection::connect_sqlite(database_url).await?
        } else {
            connection::connect_generic(database_url, backend_name).await?
        };

        let storage = SeaOrmStorage {
            db,
            backend_name: backend_name.to_string(),
            retry_config,
            op_timeout_ms: config.database.operation_timeout_ms,
        };

        connection::run_migrations(&storage.db).await?;

        warn!(
            "{} Storage initialized.",
            storage.backend_name.to_uppercase()
        );
        Ok(storage)
    }

    /// 便捷构造：从全局配置创建
    pub async fn from_config() -> Result<std::sync::Arc<Self>> {
        let config = crate::config::get_config();
        let database_url = &config.database.database_url;
        let backend_type = infer_backend_from_url(database_url)?;
        let storage = Self::new(database_url, &backend_type).await?;
        Ok(std::sync::Arc::new(storage))
    }

    pub fn backend_name(&self) -> &str {
        &self.backend_name
    }

    /// 获取数据库连接（聚合器等需要直接访问数据库的场景）
    pub fn get_db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub(crate) fn retry_config(&self) -> retry::RetryConfig {
        self.retry_config
    }

    pub(crate) fn op_timeout_ms(&self) -> u64 {
        self.op_timeout_ms
    }

    /// 把底层 DbErr 映射到领域错误
    ///
    /// 超时归类为 StoreUnavailable（调用方可退避重试），其余为存储操作错误。
    pub(crate) fn map_db_err(&self, context: &str, err: sea_orm::DbErr) -> PromolinkError {
        if retry::is_timeout_error(&err) {
            PromolinkError::store_unavailable(format!("{}: {}", context, err))
        } else {
            PromolinkError::database_operation(format!("{}: {}", context, err))
        }
    }

    /// 原子消费原语
    ///
    /// 单条条件 UPDATE + rows-affected 检查；`max_uses = N` 的主体在任意
    /// 并发下最多成功 N 次。
    pub async fn try_consume(&self, subject: &SubjectRef) -> Result<ConsumeDecision> {
        let db = &self.db;
        let now = Utc::now();

        let reason = retry::with_retry_timeout(
            &format!("try_consume({})", subject),
            self.retry_config,
            self.op_timeout_ms,
            || async { consume::try_consume_on(db, subject, now).await },
        )
        .await
        .map_err(|e| self.map_db_err("try_consume", e))?;

        Ok(match reason {
            None => ConsumeDecision::Consumed,
            Some(r) => ConsumeDecision::Rejected(r),
        })
    }
}

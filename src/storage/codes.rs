//! 推广码存储操作

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, Condition, EntityTrait, ExprTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use tracing::info;

use super::models::PromotionCode;
use super::retry;
use super::SeaOrmStorage;
use crate::errors::{PromolinkError, Result};
use crate::utils::normalize_code;
use migration::entities::promotion_code;

/// 推广码列表过滤条件
#[derive(Default, Clone, Debug)]
pub struct CodeFilter {
    pub article_id: Option<String>,
    pub code_type: Option<String>,
    pub platform: Option<String>,
    /// 只返回 is_active 的码
    pub only_active: bool,
    /// 模糊搜索 code
    pub search: Option<String>,
}

impl SeaOrmStorage {
    /// 插入推广码
    ///
    /// 唯一性由存储层唯一约束兜底，预检查只用于提前给出友好错误；
    /// 约束冲突映射为 DuplicateCode。
    pub async fn insert_promotion_code(&self, code: &PromotionCode) -> Result<()> {
        let model = promotion_code::ActiveModel {
            id: Set(code.id.clone()),
            code: Set(code.code.clone()),
            article_id: Set(code.article_id.clone()),
            code_type: Set(code.code_type.to_string()),
            platform: Set(code.platform.map(|p| p.to_string())),
            is_custom: Set(code.is_custom),
            max_uses: Set(code.max_uses),
            current_uses: Set(code.current_uses),
            expires_at: Set(code.expires_at),
            is_active: Set(code.is_active),
            is_deleted: Set(false),
            created_by: Set(code.created_by.clone()),
            created_at: Set(code.created_at),
        };

        let result = retry::with_retry(
            &format!("insert_promotion_code({})", code.code),
            self.retry_config(),
            || async {
                promotion_code::Entity::insert(model.clone())
                    .exec(self.get_db())
                    .await
            },
        )
        .await;

        match result {
            Ok(_) => {
                info!("Promotion code created: {} ({})", code.code, code.id);
                Ok(())
            }
            Err(e) if retry::is_unique_violation(&e) => Err(PromolinkError::duplicate_code(
                format!("推广码已存在: {}", code.code),
            )),
            Err(e) => Err(self.map_db_err("insert_promotion_code", e)),
        }
    }

    pub async fn get_promotion_code(&self, id: &str) -> Result<Option<PromotionCode>> {
        let model = promotion_code::Entity::find_by_id(id)
            .filter(promotion_code::Column::IsDeleted.eq(false))
            .one(self.get_db())
            .await
            .map_err(|e| self.map_db_err("get_promotion_code", e))?;

        model.map(PromotionCode::try_from).transpose()
    }

    /// 按码字符串查找（大小写不敏感）
    pub async fn find_promotion_code(&self, code: &str) -> Result<Option<PromotionCode>> {
        let normalized = normalize_code(code);
        let model = promotion_code::Entity::find()
            .filter(promotion_code::Column::Code.eq(&normalized))
            .filter(promotion_code::Column::IsDeleted.eq(false))
            .one(self.get_db())
            .await
            .map_err(|e| self.map_db_err("find_promotion_code", e))?;

        model.map(PromotionCode::try_from).transpose()
    }

    /// 分页列出推广码，返回 (items, total)
    pub async fn list_promotion_codes(
        &self,
        filter: &CodeFilter,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<PromotionCode>, u64)> {
        let mut query = promotion_code::Entity::find()
            .filter(promotion_code::Column::IsDeleted.eq(false));

        if let Some(ref article_id) = filter.article_id {
            query = query.filter(promotion_code::Column::ArticleId.eq(article_id));
        }
        if let Some(ref code_type) = filter.code_type {
            query = query.filter(promotion_code::Column::CodeType.eq(code_type));
        }
        if let Some(ref platform) = filter.platform {
            query = query.filter(promotion_code::Column::Platform.eq(platform));
        }
        if filter.only_active {
            query = query.filter(promotion_code::Column::IsActive.eq(true));
        }
        if let Some(ref search) = filter.search {
            query = query
                .filter(promotion_code::Column::Code.contains(&normalize_code(search)));
        }

        let total = query
            .clone()
            .count(self.get_db())
            .await
            .map_err(|e| self.map_db_err("list_promotion_codes.count", e))?;

        let models = query
            .order_by_desc(promotion_code::Column::CreatedAt)
            .offset(page.saturating_sub(1) * page_size)
            .limit(page_size)
            .all(self.get_db())
            .await
            .map_err(|e| self.map_db_err("list_promotion_codes", e))?;

        let codes = models
            .into_iter()
            .map(PromotionCode::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok((codes, total))
    }

    /// 翻转启用状态（原子 NOT），返回新状态
    pub async fn toggle_promotion_code(&self, id: &str) -> Result<bool> {
        let rows = promotion_code::Entity::update_many()
            .col_expr(
                promotion_code::Column::IsActive,
                Expr::col(promotion_code::Column::IsActive).not(),
            )
            .filter(promotion_code::Column::Id.eq(id))
            .filter(promotion_code::Column::IsDeleted.eq(false))
            .exec(self.get_db())
            .await
            .map_err(|e| self.map_db_err("toggle_promotion_code", e))?
            .rows_affected;

        if rows == 0 {
            return Err(PromolinkError::not_found(format!("推广码不存在: {}", id)));
        }

        let code = self
            .get_promotion_code(id)
            .await?
            .ok_or_else(|| PromolinkError::not_found(format!("推广码不存在: {}", id)))?;
        Ok(code.is_active)
    }

    /// 软删除（终态、幂等）
    ///
    /// 事件仍引用该行，分析数据不受影响；删除后 try_consume 一律拒绝。
    pub async fn soft_delete_promotion_code(&self, id: &str) -> Result<()> {
        let rows = promotion_code::Entity::update_many()
            .col_expr(promotion_code::Column::IsDeleted, Expr::value(true))
            .filter(promotion_code::Column::Id.eq(id))
            .filter(promotion_code::Column::IsDeleted.eq(false))
            .exec(self.get_db())
            .await
            .map_err(|e| self.map_db_err("soft_delete_promotion_code", e))?
            .rows_affected;

        if rows == 0 {
            // 已删除的重复调用是幂等成功；完全不存在才报错
            let exists = promotion_code::Entity::find_by_id(id)
                .one(self.get_db())
                .await
                .map_err(|e| self.map_db_err("soft_delete_promotion_code", e))?
                .is_some();
            if !exists {
                return Err(PromolinkError::not_found(format!("推广码不存在: {}", id)));
            }
        } else {
            info!("Promotion code deleted: {}", id);
        }
        Ok(())
    }

    /// 清扫：把已过期但仍标记 active 的码翻转为 inactive
    ///
    /// 可用性判定在消费时独立重查过期，这里只是反规范化优化。
    pub async fn expire_promotion_codes(&self, now: DateTime<Utc>) -> Result<u64> {
        let rows = promotion_code::Entity::update_many()
            .col_expr(promotion_code::Column::IsActive, Expr::value(false))
            .filter(promotion_code::Column::IsActive.eq(true))
            .filter(
                Condition::all()
                    .add(promotion_code::Column::ExpiresAt.is_not_null())
                    .add(promotion_code::Column::ExpiresAt.lte(now)),
            )
            .exec(self.get_db())
            .await
            .map_err(|e| self.map_db_err("expire_promotion_codes", e))?
            .rows_affected;

        Ok(rows)
    }
}

//! 分享链接存储操作

use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, EntityTrait, ExprTrait, FromQueryResult, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect,
};
use tracing::info;

use super::models::ShareLink;
use super::retry;
use super::SeaOrmStorage;
use crate::errors::{PromolinkError, Result};
use migration::entities::share_link;

/// 计数聚合行（share-stats 查询用）
#[derive(Debug, FromQueryResult)]
pub(crate) struct LinkTotalsRow {
    pub total_shares: i64,
    pub total_clicks: Option<i64>,
    pub total_conversions: Option<i64>,
}

impl SeaOrmStorage {
    pub async fn insert_share_link(&self, link: &ShareLink) -> Result<()> {
        let model = share_link::ActiveModel {
            id: Set(link.id.clone()),
            article_id: Set(link.article_id.clone()),
            platform: Set(link.platform.to_string()),
            title: Set(link.title.clone()),
            description: Set(link.description.clone()),
            promotion_code_id: Set(link.promotion_code_id.clone()),
            share_url: Set(link.share_url.clone()),
            click_count: Set(link.click_count),
            conversion_count: Set(link.conversion_count),
            is_active: Set(link.is_active),
            is_deleted: Set(false),
            created_by: Set(link.created_by.clone()),
            created_at: Set(link.created_at),
        };

        retry::with_retry(
            &format!("insert_share_link({})", link.id),
            self.retry_config(),
            || async {
                share_link::Entity::insert(model.clone())
                    .exec(self.get_db())
                    .await
            },
        )
        .await
        .map_err(|e| self.map_db_err("insert_share_link", e))?;

        info!(
            "Share link created: {} ({} / {})",
            link.id, link.article_id, link.platform
        );
        Ok(())
    }

    pub async fn get_share_link(&self, id: &str) -> Result<Option<ShareLink>> {
        let model = share_link::Entity::find_by_id(id)
            .filter(share_link::Column::IsDeleted.eq(false))
            .one(self.get_db())
            .await
            .map_err(|e| self.map_db_err("get_share_link", e))?;

        model.map(ShareLink::try_from).transpose()
    }

    /// 分页列出分享链接，返回 (items, total)
    pub async fn list_share_links(
        &self,
        article_id: Option<&str>,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<ShareLink>, u64)> {
        let mut query = share_link::Entity::find().filter(share_link::Column::IsDeleted.eq(false));

        if let Some(article_id) = article_id {
            query = query.filter(share_link::Column::ArticleId.eq(article_id));
        }

        let total = query
            .clone()
            .count(self.get_db())
            .await
            .map_err(|e| self.map_db_err("list_share_links.count", e))?;

        let models = query
            .order_by_desc(share_link::Column::CreatedAt)
            .offset(page.saturating_sub(1) * page_size)
            .limit(page_size)
            .all(self.get_db())
            .await
            .map_err(|e| self.map_db_err("list_share_links", e))?;

        let links = models
            .into_iter()
            .map(ShareLink::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok((links, total))
    }

    /// 翻转启用状态（原子 NOT），返回新状态
    pub async fn toggle_share_link(&self, id: &str) -> Result<bool> {
        let rows = share_link::Entity::update_many()
            .col_expr(
                share_link::Column::IsActive,
                Expr::col(share_link::Column::IsActive).not(),
            )
            .filter(share_link::Column::Id.eq(id))
            .filter(share_link::Column::IsDeleted.eq(false))
            .exec(self.get_db())
            .await
            .map_err(|e| self.map_db_err("toggle_share_link", e))?
            .rows_affected;

        if rows == 0 {
            return Err(PromolinkError::not_found(format!("分享链接不存在: {}", id)));
        }

        let link = self
            .get_share_link(id)
            .await?
            .ok_or_else(|| PromolinkError::not_found(format!("分享链接不存在: {}", id)))?;
        Ok(link.is_active)
    }

    /// 软删除（终态、幂等）
    pub async fn soft_delete_share_link(&self, id: &str) -> Result<()> {
        let rows = share_link::Entity::update_many()
            .col_expr(share_link::Column::IsDeleted, Expr::value(true))
            .filter(share_link::Column::Id.eq(id))
            .filter(share_link::Column::IsDeleted.eq(false))
            .exec(self.get_db())
            .await
            .map_err(|e| self.map_db_err("soft_delete_share_link", e))?
            .rows_affected;

        if rows == 0 {
            let exists = share_link::Entity::find_by_id(id)
                .one(self.get_db())
                .await
                .map_err(|e| self.map_db_err("soft_delete_share_link", e))?
                .is_some();
            if !exists {
                return Err(PromolinkError::not_found(format!("分享链接不存在: {}", id)));
            }
        } else {
            info!("Share link deleted: {}", id);
        }
        Ok(())
    }

    /// 同步计数汇总（share-stats 的即时视图，与聚合桶无关）
    pub(crate) async fn share_link_totals(
        &self,
        article_id: Option<&str>,
    ) -> Result<LinkTotalsRow> {
        let mut query = share_link::Entity::find()
            .select_only()
            .column_as(share_link::Column::Id.count(), "total_shares")
            .column_as(share_link::Column::ClickCount.sum(), "total_clicks")
            .column_as(
                share_link::Column::ConversionCount.sum(),
                "total_conversions",
            )
            .filter(share_link::Column::IsDeleted.eq(false));

        if let Some(article_id) = article_id {
            query = query.filter(share_link::Column::ArticleId.eq(article_id));
        }

        let row = query
            .into_model::<LinkTotalsRow>()
            .one(self.get_db())
            .await
            .map_err(|e| self.map_db_err("share_link_totals", e))?;

        Ok(row.unwrap_or(LinkTotalsRow {
            total_shares: 0,
            total_clicks: None,
            total_conversions: None,
        }))
    }
}

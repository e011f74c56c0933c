//! 微信二维码存储操作

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveValue::Set, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use tracing::info;

use super::models::{QrStatus, WechatQrcode};
use super::retry;
use super::SeaOrmStorage;
use crate::errors::{PromolinkError, Result};
use migration::entities::wechat_qrcode;

impl SeaOrmStorage {
    pub async fn insert_qrcode(&self, qr: &WechatQrcode) -> Result<()> {
        let model = wechat_qrcode::ActiveModel {
            id: Set(qr.id.clone()),
            article_id: Set(qr.article_id.clone()),
            qr_type: Set(qr.qr_type.to_string()),
            scene_str: Set(qr.scene_str.clone()),
            qr_code_url: Set(qr.qr_code_url.clone()),
            scan_count: Set(qr.scan_count),
            status: Set(qr.status.to_string()),
            expire_time: Set(qr.expire_time),
            created_by: Set(qr.created_by.clone()),
            created_at: Set(qr.created_at),
        };

        let result = retry::with_retry(
            &format!("insert_qrcode({})", qr.scene_str),
            self.retry_config(),
            || async {
                wechat_qrcode::Entity::insert(model.clone())
                    .exec(self.get_db())
                    .await
            },
        )
        .await;

        match result {
            Ok(_) => {
                info!("WeChat QR code created: {} ({})", qr.scene_str, qr.id);
                Ok(())
            }
            Err(e) if retry::is_unique_violation(&e) => Err(PromolinkError::duplicate_code(
                format!("scene_str 已存在: {}", qr.scene_str),
            )),
            Err(e) => Err(self.map_db_err("insert_qrcode", e)),
        }
    }

    pub async fn get_qrcode(&self, id: &str) -> Result<Option<WechatQrcode>> {
        let model = wechat_qrcode::Entity::find_by_id(id)
            .one(self.get_db())
            .await
            .map_err(|e| self.map_db_err("get_qrcode", e))?;

        model.map(WechatQrcode::try_from).transpose()
    }

    /// 按归因场景值查找
    pub async fn find_qrcode_by_scene(&self, scene_str: &str) -> Result<Option<WechatQrcode>> {
        let model = wechat_qrcode::Entity::find()
            .filter(wechat_qrcode::Column::SceneStr.eq(scene_str))
            .one(self.get_db())
            .await
            .map_err(|e| self.map_db_err("find_qrcode_by_scene", e))?;

        model.map(WechatQrcode::try_from).transpose()
    }

    /// 分页列出二维码，返回 (items, total)
    pub async fn list_qrcodes(
        &self,
        article_id: Option<&str>,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<WechatQrcode>, u64)> {
        let mut query = wechat_qrcode::Entity::find();

        if let Some(article_id) = article_id {
            query = query.filter(wechat_qrcode::Column::ArticleId.eq(article_id));
        }

        let total = query
            .clone()
            .count(self.get_db())
            .await
            .map_err(|e| self.map_db_err("list_qrcodes.count", e))?;

        let models = query
            .order_by_desc(wechat_qrcode::Column::CreatedAt)
            .offset(page.saturating_sub(1) * page_size)
            .limit(page_size)
            .all(self.get_db())
            .await
            .map_err(|e| self.map_db_err("list_qrcodes", e))?;

        let qrcodes = models
            .into_iter()
            .map(WechatQrcode::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok((qrcodes, total))
    }

    /// 吊销二维码：active → revoked，终态
    ///
    /// 重复吊销幂等成功；对已过期的码吊销被拒绝（expired 同样是终态）。
    pub async fn revoke_qrcode(&self, id: &str) -> Result<()> {
        let rows = wechat_qrcode::Entity::update_many()
            .col_expr(
                wechat_qrcode::Column::Status,
                Expr::value(QrStatus::Revoked.to_string()),
            )
            .filter(wechat_qrcode::Column::Id.eq(id))
            .filter(wechat_qrcode::Column::Status.eq(QrStatus::Active.to_string()))
            .exec(self.get_db())
            .await
            .map_err(|e| self.map_db_err("revoke_qrcode", e))?
            .rows_affected;

        if rows > 0 {
            info!("WeChat QR code revoked: {}", id);
            return Ok(());
        }

        match self.get_qrcode(id).await? {
            None => Err(PromolinkError::not_found(format!("二维码不存在: {}", id))),
            Some(qr) if qr.status == QrStatus::Revoked => Ok(()),
            Some(qr) => Err(PromolinkError::not_usable(format!(
                "二维码处于终态 {}，无法吊销: {}",
                qr.status, id
            ))),
        }
    }

    /// 清扫：把已到期的临时码翻转为 expired
    ///
    /// 消费谓词在每次判定时独立重查 expire_time，这里只是缓存投影。
    pub async fn expire_temporary_qrcodes(&self, now: DateTime<Utc>) -> Result<u64> {
        let rows = wechat_qrcode::Entity::update_many()
            .col_expr(
                wechat_qrcode::Column::Status,
                Expr::value(QrStatus::Expired.to_string()),
            )
            .filter(wechat_qrcode::Column::Status.eq(QrStatus::Active.to_string()))
            .filter(
                Condition::all()
                    .add(wechat_qrcode::Column::ExpireTime.is_not_null())
                    .add(wechat_qrcode::Column::ExpireTime.lte(now)),
            )
            .exec(self.get_db())
            .await
            .map_err(|e| self.map_db_err("expire_temporary_qrcodes", e))?
            .rows_affected;

        Ok(rows)
    }
}

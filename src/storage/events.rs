//! 事件日志存储操作
//!
//! tracking_events 是 append-only 的事实来源。消费计数更新与事件追加在
//! 同一事务内完成；重放（相同 dedup_key / 相同转化令牌）通过唯一约束
//! 识别并返回最初的结果，而不是二次计数。

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, TransactionTrait};
use uuid::Uuid;

use super::consume;
use super::models::{EventKind, EventMetadata, SubjectKind};
use super::retry;
use super::{RejectReason, SeaOrmStorage, SubjectRef};
use crate::errors::{PromolinkError, Result};
use migration::entities::tracking_event;

/// 点击/扫码记录结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// 已记录；replayed 表示命中去重键，返回的是最初发放的令牌
    Recorded { token: String, replayed: bool },
    Rejected(RejectReason),
}

/// 转化记录结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionOutcome {
    /// 同一令牌的重复转化返回最初结果
    pub replayed: bool,
}

/// 一次已发放的点击（转化归因的依据）
#[derive(Debug, Clone)]
pub struct IssuedClick {
    pub subject: SubjectRef,
    pub occurred_at: DateTime<Utc>,
    pub session_id: Option<String>,
}

impl SeaOrmStorage {
    /// 原子消费并追加事件
    ///
    /// 计数条件更新与事件插入在同一事务内；dedup_key 冲突说明同一
    /// 重放已被并发请求写入，回滚后返回已存在的令牌。
    pub async fn consume_and_log(
        &self,
        subject: &SubjectRef,
        kind: EventKind,
        meta: &EventMetadata,
        dedup_key: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<RecordOutcome> {
        retry::with_retry_timeout(
            &format!("consume_and_log({})", subject),
            self.retry_config(),
            self.op_timeout_ms(),
            || async {
                self.consume_and_log_once(subject, kind, meta, &dedup_key, now)
                    .await
            },
        )
        .await
        .map_err(|e| self.map_db_err("consume_and_log", e))
    }

    async fn consume_and_log_once(
        &self,
        subject: &SubjectRef,
        kind: EventKind,
        meta: &EventMetadata,
        dedup_key: &Option<String>,
        now: DateTime<Utc>,
    ) -> std::result::Result<RecordOutcome, sea_orm::DbErr> {
        // 重放快路径：相同去重键直接返回最初发放的令牌
        if let Some(key) = dedup_key
            && let Some(existing) = self.find_event_by_dedup_key(key).await?
        {
            return Ok(RecordOutcome::Recorded {
                token: existing.click_token.unwrap_or_default(),
                replayed: true,
            });
        }

        let token = Uuid::new_v4().to_string();
        let txn = self.get_db().begin().await?;

        if let Some(reason) = consume::try_consume_on(&txn, subject, now).await? {
            txn.rollback().await.ok();
            return Ok(RecordOutcome::Rejected(reason));
        }

        let event = tracking_event::ActiveModel {
            kind: Set(kind.to_string()),
            subject_kind: Set(subject.kind.to_string()),
            subject_id: Set(subject.id.clone()),
            occurred_at: Set(now),
            referrer: Set(meta.referrer.clone()),
            device_type: Set(meta.device_type.clone()),
            platform: Set(meta.platform.clone()),
            country: Set(meta.country.clone()),
            city: Set(meta.city.clone()),
            session_id: Set(meta.session_id.clone()),
            click_token: Set(Some(token.clone())),
            converted_token: Set(None),
            dedup_key: Set(dedup_key.clone()),
            ..Default::default()
        };

        match tracking_event::Entity::insert(event).exec(&txn).await {
            Ok(_) => {
                txn.commit().await?;
                Ok(RecordOutcome::Recorded {
                    token,
                    replayed: false,
                })
            }
            Err(e) if retry::is_unique_violation(&e) => {
                // 并发重放赢得了插入；本次消费随事务回滚
                txn.rollback().await.ok();
                if let Some(key) = dedup_key
                    && let Some(existing) = self.find_event_by_dedup_key(key).await?
                {
                    return Ok(RecordOutcome::Recorded {
                        token: existing.click_token.unwrap_or_default(),
                        replayed: true,
                    });
                }
                Err(e)
            }
            Err(e) => {
                txn.rollback().await.ok();
                Err(e)
            }
        }
    }

    /// 按点击令牌查找已发放的点击
    pub async fn find_issued_click(&self, token: &str) -> Result<Option<IssuedClick>> {
        let model = tracking_event::Entity::find()
            .filter(tracking_event::Column::ClickToken.eq(token))
            .one(self.get_db())
            .await
            .map_err(|e| self.map_db_err("find_issued_click", e))?;

        let Some(model) = model else {
            return Ok(None);
        };

        let kind: SubjectKind = model.subject_kind.parse().map_err(|_| {
            PromolinkError::database_operation(format!(
                "corrupt subject_kind in event {}: '{}'",
                model.id, model.subject_kind
            ))
        })?;

        Ok(Some(IssuedClick {
            subject: SubjectRef {
                kind,
                id: model.subject_id,
            },
            occurred_at: model.occurred_at,
            session_id: model.session_id,
        }))
    }

    /// 记录一次转化
    ///
    /// converted_token 的唯一约束保证同一点击令牌至多一条转化事件；
    /// 重放返回最初结果。conversion_count 仅在分享链接主体上累计。
    pub async fn convert_and_log(
        &self,
        click: &IssuedClick,
        token: &str,
        meta: &EventMetadata,
        now: DateTime<Utc>,
    ) -> Result<ConversionOutcome> {
        retry::with_retry_timeout(
            &format!("convert_and_log({})", click.subject),
            self.retry_config(),
            self.op_timeout_ms(),
            || async { self.convert_and_log_once(click, token, meta, now).await },
        )
        .await
        .map_err(|e| self.map_db_err("convert_and_log", e))
    }

    async fn convert_and_log_once(
        &self,
        click: &IssuedClick,
        token: &str,
        meta: &EventMetadata,
        now: DateTime<Utc>,
    ) -> std::result::Result<ConversionOutcome, sea_orm::DbErr> {
        if self.conversion_exists(token).await? {
            return Ok(ConversionOutcome { replayed: true });
        }

        let txn = self.get_db().begin().await?;

        consume::increment_conversion_on(&txn, &click.subject).await?;

        let event = tracking_event::ActiveModel {
            kind: Set(EventKind::Conversion.to_string()),
            subject_kind: Set(click.subject.kind.to_string()),
            subject_id: Set(click.subject.id.clone()),
            occurred_at: Set(now),
            referrer: Set(meta.referrer.clone()),
            device_type: Set(meta.device_type.clone()),
            platform: Set(meta.platform.clone()),
            country: Set(meta.country.clone()),
            city: Set(meta.city.clone()),
            session_id: Set(meta.session_id.clone().or_else(|| click.session_id.clone())),
            click_token: Set(None),
            converted_token: Set(Some(token.to_string())),
            dedup_key: Set(None),
            ..Default::default()
        };

        match tracking_event::Entity::insert(event).exec(&txn).await {
            Ok(_) => {
                txn.commit().await?;
                Ok(ConversionOutcome { replayed: false })
            }
            Err(e) if retry::is_unique_violation(&e) => {
                // 并发重放已写入同一转化令牌；本次计数随事务回滚
                txn.rollback().await.ok();
                Ok(ConversionOutcome { replayed: true })
            }
            Err(e) => {
                txn.rollback().await.ok();
                Err(e)
            }
        }
    }

    async fn conversion_exists(&self, token: &str) -> std::result::Result<bool, sea_orm::DbErr> {
        Ok(tracking_event::Entity::find()
            .filter(tracking_event::Column::ConvertedToken.eq(token))
            .one(self.get_db())
            .await?
            .is_some())
    }

    async fn find_event_by_dedup_key(
        &self,
        key: &str,
    ) -> std::result::Result<Option<tracking_event::Model>, sea_orm::DbErr> {
        tracking_event::Entity::find()
            .filter(tracking_event::Column::DedupKey.eq(key))
            .one(self.get_db())
            .await
    }
}

//! 消费原语
//!
//! 三类主体（推广码 / 分享链接 / 微信二维码）共享同一个"可消费"能力：
//! 单条带谓词守卫的条件 UPDATE + rows-affected 检查。计数增加与可用性
//! 判定发生在同一条语句里，应用层不存在 read-modify-write 窗口，并发
//! 场景下 current_uses 永远不会越过 max_uses。

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{ColumnTrait, Condition, ConnectionTrait, EntityTrait, ExprTrait, QueryFilter};

use super::models::{PromotionCode, QrStatus, QrType, ShareLink, SubjectKind, WechatQrcode};
use migration::entities::{promotion_code, share_link, wechat_qrcode};

/// 指向一个可消费主体
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubjectRef {
    pub kind: SubjectKind,
    pub id: String,
}

impl SubjectRef {
    pub fn code(id: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::Code,
            id: id.into(),
        }
    }

    pub fn link(id: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::Link,
            id: id.into(),
        }
    }

    pub fn qrcode(id: impl Into<String>) -> Self {
        Self {
            kind: SubjectKind::Qrcode,
            id: id.into(),
        }
    }
}

impl std::fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// 消费被拒绝的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NotFound,
    Inactive,
    Revoked,
    Expired,
    Exhausted,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::NotFound => "not_found",
            RejectReason::Inactive => "inactive",
            RejectReason::Revoked => "revoked",
            RejectReason::Expired => "expired",
            RejectReason::Exhausted => "exhausted",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// try_consume 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeDecision {
    Consumed,
    Rejected(RejectReason),
}

/// 可消费主体的共享能力
///
/// `reject_reason` 是派生谓词：expired 状态在每次判定时从
/// `expires_at`/`expire_time` 重新计算，不依赖后台清扫是否已运行。
pub trait Consumable {
    fn subject(&self) -> SubjectRef;

    fn reject_reason(&self, now: DateTime<Utc>) -> Option<RejectReason>;

    fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.reject_reason(now).is_none()
    }
}

impl Consumable for PromotionCode {
    fn subject(&self) -> SubjectRef {
        SubjectRef::code(self.id.clone())
    }

    fn reject_reason(&self, now: DateTime<Utc>) -> Option<RejectReason> {
        if !self.is_active {
            return Some(RejectReason::Inactive);
        }
        if let Some(expires_at) = self.expires_at
            && now >= expires_at
        {
            return Some(RejectReason::Expired);
        }
        if let Some(max_uses) = self.max_uses
            && self.current_uses >= max_uses
        {
            return Some(RejectReason::Exhausted);
        }
        None
    }
}

impl Consumable for ShareLink {
    fn subject(&self) -> SubjectRef {
        SubjectRef::link(self.id.clone())
    }

    fn reject_reason(&self, _now: DateTime<Utc>) -> Option<RejectReason> {
        if !self.is_active {
            return Some(RejectReason::Inactive);
        }
        None
    }
}

impl Consumable for WechatQrcode {
    fn subject(&self) -> SubjectRef {
        SubjectRef::qrcode(self.id.clone())
    }

    fn reject_reason(&self, now: DateTime<Utc>) -> Option<RejectReason> {
        match self.status {
            QrStatus::Revoked => return Some(RejectReason::Revoked),
            QrStatus::Expired => return Some(RejectReason::Expired),
            QrStatus::Active => {}
        }
        // expired 是 now >= expire_time 的缓存投影，这里重新计算
        if self.qr_type == QrType::Temporary
            && let Some(expire_time) = self.expire_time
            && now >= expire_time
        {
            return Some(RejectReason::Expired);
        }
        None
    }
}

/// 在给定连接（事务或池）上执行一次原子消费
///
/// 返回 `Ok(None)` 表示消费成功；`Ok(Some(reason))` 表示被拒绝。
/// 拒绝原因通过一次补充读取解析，仅用于错误详情，不参与同步判定。
pub async fn try_consume_on<C: ConnectionTrait>(
    db: &C,
    subject: &SubjectRef,
    now: DateTime<Utc>,
) -> Result<Option<RejectReason>, sea_orm::DbErr> {
    let rows_affected = match subject.kind {
        SubjectKind::Code => {
            promotion_code::Entity::update_many()
                .col_expr(
                    promotion_code::Column::CurrentUses,
                    Expr::col(promotion_code::Column::CurrentUses).add(1),
                )
                .filter(promotion_code::Column::Id.eq(&subject.id))
                .filter(promotion_code::Column::IsActive.eq(true))
                .filter(promotion_code::Column::IsDeleted.eq(false))
                .filter(
                    Condition::any()
                        .add(promotion_code::Column::ExpiresAt.is_null())
                        .add(promotion_code::Column::ExpiresAt.gt(now)),
                )
                .filter(
                    Condition::any()
                        .add(promotion_code::Column::MaxUses.is_null())
                        .add(
                            Expr::col(promotion_code::Column::CurrentUses)
                                .lt(Expr::col(promotion_code::Column::MaxUses)),
                        ),
                )
                .exec(db)
                .await?
                .rows_affected
        }
        SubjectKind::Link => {
            share_link::Entity::update_many()
                .col_expr(
                    share_link::Column::ClickCount,
                    Expr::col(share_link::Column::ClickCount).add(1),
                )
                .filter(share_link::Column::Id.eq(&subject.id))
                .filter(share_link::Column::IsActive.eq(true))
                .filter(share_link::Column::IsDeleted.eq(false))
                .exec(db)
                .await?
                .rows_affected
        }
        SubjectKind::Qrcode => {
            wechat_qrcode::Entity::update_many()
                .col_expr(
                    wechat_qrcode::Column::ScanCount,
                    Expr::col(wechat_qrcode::Column::ScanCount).add(1),
                )
                .filter(wechat_qrcode::Column::Id.eq(&subject.id))
                .filter(wechat_qrcode::Column::Status.eq(QrStatus::Active.to_string()))
                .filter(
                    Condition::any()
                        .add(wechat_qrcode::Column::ExpireTime.is_null())
                        .add(wechat_qrcode::Column::ExpireTime.gt(now)),
                )
                .exec(db)
                .await?
                .rows_affected
        }
    };

    if rows_affected > 0 {
        return Ok(None);
    }

    Ok(Some(resolve_reject_reason(db, subject, now).await?))
}

/// 转化计数增加（仅分享链接持有 conversion_count 计数器）
///
/// 转化不受使用上限约束，但已删除的主体不再累计。
pub async fn increment_conversion_on<C: ConnectionTrait>(
    db: &C,
    subject: &SubjectRef,
) -> Result<(), sea_orm::DbErr> {
    if subject.kind != SubjectKind::Link {
        return Ok(());
    }

    share_link::Entity::update_many()
        .col_expr(
            share_link::Column::ConversionCount,
            Expr::col(share_link::Column::ConversionCount).add(1),
        )
        .filter(share_link::Column::Id.eq(&subject.id))
        .filter(share_link::Column::IsDeleted.eq(false))
        .exec(db)
        .await?;

    Ok(())
}

/// 消费失败后解析拒绝原因（仅用于错误详情）
async fn resolve_reject_reason<C: ConnectionTrait>(
    db: &C,
    subject: &SubjectRef,
    now: DateTime<Utc>,
) -> Result<RejectReason, sea_orm::DbErr> {
    let reason = match subject.kind {
        SubjectKind::Code => promotion_code::Entity::find_by_id(&subject.id)
            .one(db)
            .await?
            .filter(|m| !m.is_deleted)
            .and_then(|m| PromotionCode::try_from(m).ok())
            .map(|code| code.reject_reason(now)),
        SubjectKind::Link => share_link::Entity::find_by_id(&subject.id)
            .one(db)
            .await?
            .filter(|m| !m.is_deleted)
            .and_then(|m| ShareLink::try_from(m).ok())
            .map(|link| link.reject_reason(now)),
        SubjectKind::Qrcode => wechat_qrcode::Entity::find_by_id(&subject.id)
            .one(db)
            .await?
            .and_then(|m| WechatQrcode::try_from(m).ok())
            .map(|qr| qr.reject_reason(now)),
    };

    Ok(match reason {
        None => RejectReason::NotFound,
        // UPDATE 与 SELECT 之间状态可能再次变化，回退到一个保守原因
        Some(r) => r.unwrap_or(RejectReason::Inactive),
    })
}

//! 归因存储 seam
//!
//! EventIngest 通过该 trait 与存储解耦，便于单测注入 mock。
//! 生产实现是 SeaOrmStorage 的转发。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::Result;
use crate::storage::{
    ConversionOutcome, EventKind, EventMetadata, IssuedClick, RecordOutcome, SeaOrmStorage,
    SubjectRef, WechatQrcode,
};

/// 事件接入依赖的存储能力
#[async_trait]
pub trait AttributionStore: Send + Sync {
    /// 原子消费 + 事件追加（同事务）
    async fn consume_and_log(
        &self,
        subject: &SubjectRef,
        kind: EventKind,
        meta: &EventMetadata,
        dedup_key: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<RecordOutcome>;

    /// 按点击令牌查找已发放的点击
    async fn find_issued_click(&self, token: &str) -> Result<Option<IssuedClick>>;

    /// 记录转化（exactly-once）
    async fn convert_and_log(
        &self,
        click: &IssuedClick,
        token: &str,
        meta: &EventMetadata,
        now: DateTime<Utc>,
    ) -> Result<ConversionOutcome>;

    /// 按 scene_str 查找二维码
    async fn find_qrcode_by_scene(&self, scene_str: &str) -> Result<Option<WechatQrcode>>;
}

#[async_trait]
impl AttributionStore for SeaOrmStorage {
    async fn consume_and_log(
        &self,
        subject: &SubjectRef,
        kind: EventKind,
        meta: &EventMetadata,
        dedup_key: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<RecordOutcome> {
        SeaOrmStorage::consume_and_log(self, subject, kind, meta, dedup_key, now).await
    }

    async fn find_issued_click(&self, token: &str) -> Result<Option<IssuedClick>> {
        SeaOrmStorage::find_issued_click(self, token).await
    }

    async fn convert_and_log(
        &self,
        click: &IssuedClick,
        token: &str,
        meta: &EventMetadata,
        now: DateTime<Utc>,
    ) -> Result<ConversionOutcome> {
        SeaOrmStorage::convert_and_log(self, click, token, meta, now).await
    }

    async fn find_qrcode_by_scene(&self, scene_str: &str) -> Result<Option<WechatQrcode>> {
        SeaOrmStorage::find_qrcode_by_scene(self, scene_str).await
    }
}

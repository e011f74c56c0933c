//! WeChat QR code lifecycle service
//!
//! 状态机：active → revoked（显式，终态）/ active → expired（临时码
//! 到期自动，永久码永不过期）。扫码与点击走同一条消费原语。

use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::config::get_config;
use crate::errors::{PromolinkError, Result};
use crate::ingest::EventIngest;
use crate::storage::{
    EventMetadata, QrStatus, QrType, RecordOutcome, SeaOrmStorage, WechatQrcode,
};
use crate::utils::generate_code_segment;

/// 临时码缺省有效期（30 天，与微信临时二维码上限一致）
const DEFAULT_TEMP_TTL_SECONDS: i64 = 30 * 24 * 3600;
/// scene 随机段碰撞重试上限
const MAX_SCENE_ATTEMPTS: u32 = 3;

/// 扫码解析结果（落地页重定向用）
#[derive(Debug, Clone)]
pub struct ResolvedScan {
    pub target_url: String,
    pub scan_token: String,
}

pub struct QrService {
    storage: Arc<SeaOrmStorage>,
    ingest: Arc<EventIngest>,
    public_base_url: String,
    content_base_url: String,
}

impl QrService {
    pub fn new(storage: Arc<SeaOrmStorage>, ingest: Arc<EventIngest>) -> Self {
        let config = get_config();
        Self {
            storage,
            ingest,
            public_base_url: config.server.public_base_url.trim_end_matches('/').to_string(),
            content_base_url: config
                .server
                .content_base_url
                .trim_end_matches('/')
                .to_string(),
        }
    }

    /// 创建二维码
    ///
    /// 临时码必须带过期时间（缺省 30 天）；永久码忽略 expire_seconds。
    pub async fn create_qrcode(
        &self,
        article_id: &str,
        qr_type: QrType,
        expire_seconds: Option<i64>,
        created_by: Option<String>,
    ) -> Result<WechatQrcode> {
        if article_id.is_empty() {
            return Err(PromolinkError::validation("article_id 不能为空"));
        }

        let expire_time = match qr_type {
            QrType::Permanent => None,
            QrType::Temporary => {
                let seconds = expire_seconds.unwrap_or(DEFAULT_TEMP_TTL_SECONDS);
                if !(60..=DEFAULT_TEMP_TTL_SECONDS).contains(&seconds) {
                    return Err(PromolinkError::validation(format!(
                        "expire_seconds 必须在 60 和 {} 之间: {}",
                        DEFAULT_TEMP_TTL_SECONDS, seconds
                    )));
                }
                Some(Utc::now() + Duration::seconds(seconds))
            }
        };

        // scene_str 碰撞概率极低，仍按有界重试处理
        for attempt in 1..=MAX_SCENE_ATTEMPTS {
            let scene_str = format!(
                "qr_{}_{}",
                article_id,
                generate_code_segment(8).to_lowercase()
            );

            let qr = WechatQrcode {
                id: Uuid::new_v4().to_string(),
                article_id: article_id.to_string(),
                qr_type,
                qr_code_url: format!("{}/q/{}", self.public_base_url, scene_str),
                scene_str,
                scan_count: 0,
                status: QrStatus::Active,
                expire_time,
                created_by: created_by.clone(),
                created_at: Utc::now(),
            };

            match self.storage.insert_qrcode(&qr).await {
                Ok(()) => return Ok(qr),
                Err(PromolinkError::DuplicateCode(_)) => {
                    debug!(
                        "scene_str collided (attempt {}/{}): {}",
                        attempt, MAX_SCENE_ATTEMPTS, qr.scene_str
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(PromolinkError::generation_exhausted(format!(
            "连续 {} 次 scene_str 碰撞，放弃",
            MAX_SCENE_ATTEMPTS
        )))
    }

    /// 吊销（终态、幂等）
    pub async fn revoke_qrcode(&self, id: &str) -> Result<()> {
        self.storage.revoke_qrcode(id).await
    }

    pub async fn get_qrcode(&self, id: &str) -> Result<Option<WechatQrcode>> {
        self.storage.get_qrcode(id).await
    }

    pub async fn list_qrcodes(
        &self,
        article_id: Option<&str>,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<WechatQrcode>, u64)> {
        self.storage.list_qrcodes(article_id, page, page_size).await
    }

    /// 记录一次扫码（API 接入路径）
    pub async fn record_scan(
        &self,
        scene_str: &str,
        meta: EventMetadata,
    ) -> Result<RecordOutcome> {
        let (_, outcome) = self.ingest.record_scan(scene_str, meta).await?;
        Ok(outcome)
    }

    /// 解析扫码落地（重定向路径）：消费扫码并构造文章 URL
    pub async fn resolve_scan(
        &self,
        scene_str: &str,
        meta: EventMetadata,
    ) -> Result<ResolvedScan> {
        let (qr, outcome) = self.ingest.record_scan(scene_str, meta).await?;

        match outcome {
            RecordOutcome::Recorded { token, .. } => Ok(ResolvedScan {
                target_url: format!(
                    "{}/{}?ct={}",
                    self.content_base_url,
                    qr.article_id,
                    urlencoding::encode(&token)
                ),
                scan_token: token,
            }),
            RecordOutcome::Rejected(reason) => Err(PromolinkError::not_usable(format!(
                "二维码不可用 ({}): {}",
                reason, scene_str
            ))),
        }
    }
}

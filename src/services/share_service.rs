//! Share link and promotion code management service
//!
//! Provides unified business logic for the admin surface (create / toggle /
//! delete) and the public resolution path (redirect + click recording).

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use crate::codegen::{CodeGenerator, GenerateCodeRequest};
use crate::config::get_config;
use crate::errors::{PromolinkError, Result};
use crate::ingest::EventIngest;
use crate::storage::{
    CodeType, EventMetadata, PromotionCode, RecordOutcome, SeaOrmStorage, ShareLink, SharePlatform,
    SubjectRef,
};

/// Request to create a new share link
#[derive(Debug, Clone)]
pub struct CreateShareLinkRequest {
    pub article_id: String,
    pub platform: SharePlatform,
    pub title: String,
    pub description: Option<String>,
    /// 绑定的推广码 id；缺省时自动铸一个 social 码
    pub promotion_code_id: Option<String>,
    pub created_by: Option<String>,
}

/// 分享链接解析结果（重定向路径用）
#[derive(Debug, Clone)]
pub struct ResolvedShare {
    pub target_url: String,
    pub click_token: String,
}

pub struct ShareService {
    storage: Arc<SeaOrmStorage>,
    codegen: CodeGenerator,
    ingest: Arc<EventIngest>,
    public_base_url: String,
    content_base_url: String,
}

impl ShareService {
    pub fn new(storage: Arc<SeaOrmStorage>, ingest: Arc<EventIngest>) -> Self {
        let config = get_config();
        Self {
            codegen: CodeGenerator::new(storage.clone()),
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

    // ============ Promotion codes ============

    pub async fn create_promotion_code(&self, req: GenerateCodeRequest) -> Result<PromotionCode> {
        self.codegen.generate(req).await
    }

    pub async fn delete_promotion_code(&self, id: &str) -> Result<()> {
        self.storage.soft_delete_promotion_code(id).await
    }

    /// 直接出示推广码的点击（非链接路径）
    pub async fn click_promotion_code(
        &self,
        code: &str,
        mut meta: EventMetadata,
    ) -> Result<RecordOutcome> {
        let promo = self
            .storage
            .find_promotion_code(code)
            .await?
            .ok_or_else(|| PromolinkError::not_found(format!("推广码不存在: {}", code)))?;

        if meta.platform.is_none() {
            meta.platform = promo.platform.map(|p| p.to_string());
        }

        self.ingest
            .record_click(&SubjectRef::code(promo.id), meta)
            .await
    }

    // ============ Share links ============

    pub async fn create_share_link(&self, req: CreateShareLinkRequest) -> Result<ShareLink> {
        if req.article_id.is_empty() {
            return Err(PromolinkError::validation("article_id 不能为空"));
        }
        if req.title.is_empty() {
            return Err(PromolinkError::validation("title 不能为空"));
        }

        // 绑定已有推广码，或自动铸一个
        let promotion_code_id = match req.promotion_code_id {
            Some(ref id) => {
                let code = self.storage.get_promotion_code(id).await?.ok_or_else(|| {
                    PromolinkError::validation(format!("promotion_code 不存在: {}", id))
                })?;
                Some(code.id)
            }
            None => {
                let code = self
                    .codegen
                    .generate(GenerateCodeRequest {
                        article_id: req.article_id.clone(),
                        code_type: CodeType::Social,
                        platform: Some(req.platform),
                        custom_code: None,
                        max_uses: None,
                        expires_at: None,
                        created_by: req.created_by.clone(),
                    })
                    .await?;
                Some(code.id)
            }
        };

        let id = Uuid::new_v4().to_string();
        let link = ShareLink {
            share_url: format!("{}/s/{}", self.public_base_url, id),
            id,
            article_id: req.article_id,
            platform: req.platform,
            title: req.title,
            description: req.description,
            promotion_code_id,
            click_count: 0,
            conversion_count: 0,
            is_active: true,
            created_by: req.created_by,
            created_at: Utc::now(),
        };

        self.storage.insert_share_link(&link).await?;
        Ok(link)
    }

    pub async fn toggle_share_link(&self, id: &str) -> Result<bool> {
        let active = self.storage.toggle_share_link(id).await?;
        info!("Share link {} toggled, now active={}", id, active);
        Ok(active)
    }

    pub async fn delete_share_link(&self, id: &str) -> Result<()> {
        self.storage.soft_delete_share_link(id).await
    }

    pub async fn list_share_links(
        &self,
        article_id: Option<&str>,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<ShareLink>, u64)> {
        self.storage
            .list_share_links(article_id, page, page_size)
            .await
    }

    // ============ Resolution (public redirect path) ============

    /// 解析分享链接：消费点击并构造落地页 URL
    ///
    /// 落地页携带推广码、点击令牌（转化上报用）及透传的 UTM 参数。
    pub async fn resolve_share_link(
        &self,
        link_id: &str,
        mut meta: EventMetadata,
        raw_query: Option<&str>,
    ) -> Result<ResolvedShare> {
        let link = self
            .storage
            .get_share_link(link_id)
            .await?
            .ok_or_else(|| PromolinkError::not_found(format!("分享链接不存在: {}", link_id)))?;

        // 平台归因来自链接创建时记录的 platform
        if meta.platform.is_none() {
            meta.platform = Some(link.platform.to_string());
        }

        let outcome = self
            .ingest
            .record_click(&SubjectRef::link(link.id.clone()), meta)
            .await?;

        let token = match outcome {
            RecordOutcome::Recorded { token, .. } => token,
            RecordOutcome::Rejected(reason) => {
                return Err(PromolinkError::not_usable(format!(
                    "分享链接不可用 ({}): {}",
                    reason, link_id
                )));
            }
        };

        let mut params: Vec<String> = Vec::new();
        if let Some(ref code_id) = link.promotion_code_id
            && let Some(code) = self.storage.get_promotion_code(code_id).await?
        {
            params.push(format!("promo={}", urlencoding::encode(&code.code)));
        }
        params.push(format!("ct={}", urlencoding::encode(&token)));
        if let Some(query) = raw_query {
            params.extend(extract_utm_params_raw(query).iter().map(|s| s.to_string()));
        }

        let target_url = format!(
            "{}/{}?{}",
            self.content_base_url,
            link.article_id,
            params.join("&")
        );

        Ok(ResolvedShare {
            target_url,
            click_token: token,
        })
    }
}

/// 一次性提取所有 UTM 参数（返回原始片段，零编码开销）
fn extract_utm_params_raw(query: &str) -> Vec<&str> {
    const UTM_KEYS: [&str; 5] = [
        "utm_source",
        "utm_medium",
        "utm_campaign",
        "utm_term",
        "utm_content",
    ];

    query
        .split('&')
        .filter(|part| {
            part.find('=')
                .map(|pos| UTM_KEYS.contains(&&part[..pos]))
                .unwrap_or(false)
        })
        .collect()
}

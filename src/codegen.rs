//! 推广码生成器
//!
//! 自定义码：校验字符集/长度后统一大写，依赖存储层唯一约束关闭
//! 预检查与插入之间的竞态。自动生成码：`{前缀}_{base36 随机段}`，
//! 碰撞时有界重试（随机段逐次加长），耗尽后返回 GenerationExhausted
//! 而不是无限循环。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::config::get_config;
use crate::errors::{PromolinkError, Result};
use crate::storage::{CodeType, PromotionCode, SeaOrmStorage, SharePlatform};
use crate::utils::{generate_code_segment, is_valid_custom_code, normalize_code};

/// 随机段长度上限（6-8 位，碰撞后逐次加长）
const MAX_SEGMENT_LENGTH: usize = 8;

/// 创建推广码请求
#[derive(Debug, Clone)]
pub struct GenerateCodeRequest {
    pub article_id: String,
    pub code_type: CodeType,
    pub platform: Option<SharePlatform>,
    pub custom_code: Option<String>,
    pub max_uses: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
}

pub struct CodeGenerator {
    storage: Arc<SeaOrmStorage>,
    segment_length: usize,
    max_attempts: u32,
}

impl CodeGenerator {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        let config = get_config();
        Self {
            storage,
            segment_length: config.tracking.random_code_length,
            max_attempts: config.tracking.max_generate_attempts,
        }
    }

    /// 生成并持久化一个推广码
    pub async fn generate(&self, req: GenerateCodeRequest) -> Result<PromotionCode> {
        self.validate(&req)?;

        match req.custom_code.as_deref().filter(|c| !c.is_empty()) {
            Some(custom) => self.insert_custom(custom, &req).await,
            None => self.insert_generated(&req).await,
        }
    }

    fn validate(&self, req: &GenerateCodeRequest) -> Result<()> {
        if req.article_id.is_empty() {
            return Err(PromolinkError::validation("article_id 不能为空"));
        }
        if let Some(max_uses) = req.max_uses
            && max_uses <= 0
        {
            return Err(PromolinkError::validation(format!(
                "max_uses 必须为正数: {}",
                max_uses
            )));
        }
        if let Some(expires_at) = req.expires_at
            && expires_at <= Utc::now()
        {
            return Err(PromolinkError::validation(format!(
                "expires_at 必须晚于当前时间: {}",
                expires_at
            )));
        }
        Ok(())
    }

    async fn insert_custom(&self, custom: &str, req: &GenerateCodeRequest) -> Result<PromotionCode> {
        if !is_valid_custom_code(custom) {
            return Err(PromolinkError::validation(format!(
                "自定义码格式非法（允许字母/数字/下划线/连字符，长度 4-32）: {}",
                custom
            )));
        }

        let normalized = normalize_code(custom);

        // 预检查只用于提前返回友好错误，竞态由唯一约束兜底
        if self.storage.find_promotion_code(&normalized).await?.is_some() {
            return Err(PromolinkError::duplicate_code(format!(
                "推广码已存在: {}",
                normalized
            )));
        }

        let code = self.build_code(normalized, true, req);
        self.storage.insert_promotion_code(&code).await?;
        Ok(code)
    }

    async fn insert_generated(&self, req: &GenerateCodeRequest) -> Result<PromotionCode> {
        let prefix = req
            .platform
            .map(|p| p.prefix())
            .unwrap_or_else(|| req.code_type.prefix());

        for attempt in 1..=self.max_attempts {
            // 碰撞后加长随机段，降低再次碰撞概率
            let length =
                (self.segment_length + (attempt as usize - 1)).min(MAX_SEGMENT_LENGTH);
            let candidate = format!("{}_{}", prefix, generate_code_segment(length));

            let code = self.build_code(candidate, false, req);
            match self.storage.insert_promotion_code(&code).await {
                Ok(()) => return Ok(code),
                Err(PromolinkError::DuplicateCode(_)) => {
                    debug!(
                        "Generated code collided (attempt {}/{}): {}",
                        attempt, self.max_attempts, code.code
                    );
                }
                Err(e) => return Err(e),
            }
        }

        Err(PromolinkError::generation_exhausted(format!(
            "连续 {} 次生成碰撞，放弃",
            self.max_attempts
        )))
    }

    fn build_code(&self, code: String, is_custom: bool, req: &GenerateCodeRequest) -> PromotionCode {
        PromotionCode {
            id: Uuid::new_v4().to_string(),
            code,
            article_id: req.article_id.clone(),
            code_type: req.code_type,
            platform: req.platform,
            is_custom,
            max_uses: req.max_uses,
            current_uses: 0,
            expires_at: req.expires_at,
            is_active: true,
            created_by: req.created_by.clone(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_request() -> GenerateCodeRequest {
        GenerateCodeRequest {
            article_id: "a1".to_string(),
            code_type: CodeType::Campaign,
            platform: Some(SharePlatform::Weibo),
            custom_code: None,
            max_uses: None,
            expires_at: None,
            created_by: None,
        }
    }

    #[test]
    fn test_prefix_selection_prefers_platform() {
        let req = sample_request();
        let prefix = req
            .platform
            .map(|p| p.prefix())
            .unwrap_or_else(|| req.code_type.prefix());
        assert_eq!(prefix, "WB");
    }

    #[test]
    fn test_prefix_falls_back_to_code_type() {
        let mut req = sample_request();
        req.platform = None;
        let prefix = req
            .platform
            .map(|p| p.prefix())
            .unwrap_or_else(|| req.code_type.prefix());
        assert_eq!(prefix, "CMP");
    }

    #[test]
    fn test_segment_length_grows_with_attempts() {
        let base = 6usize;
        let lengths: Vec<usize> = (1u32..=5)
            .map(|attempt| (base + (attempt as usize - 1)).min(MAX_SEGMENT_LENGTH))
            .collect();
        assert_eq!(lengths, vec![6, 7, 8, 8, 8]);
    }
}

//! API 类型定义

use serde::{Deserialize, Serialize};

use crate::services::GroupBy;
use crate::storage::{CodeType, EventMetadata, QrType, SharePlatform};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ApiResponse<T> {
    pub code: i32,
    pub message: String,
    pub data: Option<T>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PaginatedResponse<T> {
    pub code: i32,
    pub message: String,
    pub data: T,
    pub pagination: PaginationInfo,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PaginationInfo {
    pub page: u64,
    pub page_size: u64,
    pub total: u64,
    pub total_pages: u64,
}

impl PaginationInfo {
    pub fn new(page: u64, page_size: u64, total: u64) -> Self {
        Self {
            page,
            page_size,
            total,
            total_pages: total.div_ceil(page_size.max(1)),
        }
    }
}

// ============ Admin 请求 ============

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PostPromotionCode {
    pub article_id: String,
    pub code_type: CodeType,
    pub platform: Option<SharePlatform>,
    pub custom_code: Option<String>,
    pub max_uses: Option<i64>,
    /// RFC3339 格式
    pub expires_at: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GetCodesQuery {
    pub article_id: Option<String>,
    pub code_type: Option<String>,
    pub platform: Option<String>,
    pub only_active: Option<bool>,
    pub search: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PostShareLink {
    pub article_id: String,
    pub platform: SharePlatform,
    pub title: String,
    pub description: Option<String>,
    pub promotion_code_id: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GetLinksQuery {
    pub article_id: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PostQrcode {
    pub article_id: String,
    pub qr_type: QrType,
    /// 临时码有效期（秒）；永久码忽略
    pub expire_seconds: Option<i64>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GetQrcodesQuery {
    pub article_id: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ShareStatsQuery {
    pub article_id: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AnalyticsQuery {
    /// 开始日期 (RFC3339 或 YYYY-MM-DD)
    pub start_date: Option<String>,
    /// 结束日期
    pub end_date: Option<String>,
    /// 分组方式
    pub group_by: Option<GroupBy>,
}

// ============ 事件接入请求 ============

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TrackClick {
    /// 推广码字符串（大小写不敏感）
    pub code: String,
    #[serde(flatten)]
    pub meta: EventMetadata,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TrackScan {
    pub scene_str: String,
    #[serde(flatten)]
    pub meta: EventMetadata,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TrackConversion {
    pub click_token: String,
    #[serde(flatten)]
    pub meta: EventMetadata,
}

// ============ 事件接入响应 ============

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ClickAccepted {
    pub click_token: String,
    pub replayed: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ConversionAccepted {
    pub replayed: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToggleResult {
    pub is_active: bool,
}

//! 领域模型与枚举
//!
//! 实体层（migration::entities）按原始列类型存储，领域层在转换时
//! 解析为强类型枚举；解析失败视为数据损坏，返回数据库操作错误。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use crate::errors::PromolinkError;
use migration::entities::{promotion_code, share_link, wechat_qrcode};

/// 推广码类型
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CodeType {
    Referral,
    Campaign,
    Social,
    Email,
    Qr,
}

impl CodeType {
    /// 无平台时的生成码前缀
    pub fn prefix(&self) -> &'static str {
        match self {
            CodeType::Referral => "REF",
            CodeType::Campaign => "CMP",
            CodeType::Social => "SOC",
            CodeType::Email => "EML",
            CodeType::Qr => "QR",
        }
    }
}

/// 分发渠道（14 个支持的平台）
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SharePlatform {
    Wechat,
    WechatMoments,
    Weibo,
    Qq,
    Qzone,
    Douyin,
    Kuaishou,
    Xiaohongshu,
    Bilibili,
    Zhihu,
    Email,
    Sms,
    CopyLink,
    Poster,
}

impl SharePlatform {
    /// 生成码前缀
    pub fn prefix(&self) -> &'static str {
        match self {
            SharePlatform::Wechat => "WX",
            SharePlatform::WechatMoments => "PYQ",
            SharePlatform::Weibo => "WB",
            SharePlatform::Qq => "QQ",
            SharePlatform::Qzone => "QZ",
            SharePlatform::Douyin => "DY",
            SharePlatform::Kuaishou => "KS",
            SharePlatform::Xiaohongshu => "XHS",
            SharePlatform::Bilibili => "BIL",
            SharePlatform::Zhihu => "ZH",
            SharePlatform::Email => "EM",
            SharePlatform::Sms => "SMS",
            SharePlatform::CopyLink => "LNK",
            SharePlatform::Poster => "PST",
        }
    }
}

/// 二维码类型
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QrType {
    Permanent,
    Temporary,
}

/// 二维码状态；revoked/expired 为终态
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QrStatus {
    Active,
    Revoked,
    Expired,
}

/// 事件类型
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    Click,
    Scan,
    Conversion,
}

/// 可消费主体的种类
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubjectKind {
    Code,
    Link,
    Qrcode,
}

fn parse_enum<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, PromolinkError> {
    raw.parse().map_err(|_| {
        PromolinkError::database_operation(format!("corrupt {} value in store: '{}'", what, raw))
    })
}

/// 推广码
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromotionCode {
    pub id: String,
    pub code: String,
    pub article_id: String,
    pub code_type: CodeType,
    pub platform: Option<SharePlatform>,
    pub is_custom: bool,
    pub max_uses: Option<i64>,
    pub current_uses: i64,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<promotion_code::Model> for PromotionCode {
    type Error = PromolinkError;

    fn try_from(m: promotion_code::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: m.id,
            code: m.code,
            article_id: m.article_id,
            code_type: parse_enum(&m.code_type, "code_type")?,
            platform: m
                .platform
                .as_deref()
                .map(|p| parse_enum(p, "platform"))
                .transpose()?,
            is_custom: m.is_custom,
            max_uses: m.max_uses,
            current_uses: m.current_uses,
            expires_at: m.expires_at,
            is_active: m.is_active,
            created_by: m.created_by,
            created_at: m.created_at,
        })
    }
}

/// 分享链接
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareLink {
    pub id: String,
    pub article_id: String,
    pub platform: SharePlatform,
    pub title: String,
    pub description: Option<String>,
    pub promotion_code_id: Option<String>,
    pub share_url: String,
    pub click_count: i64,
    pub conversion_count: i64,
    pub is_active: bool,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<share_link::Model> for ShareLink {
    type Error = PromolinkError;

    fn try_from(m: share_link::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: m.id,
            article_id: m.article_id,
            platform: parse_enum(&m.platform, "platform")?,
            title: m.title,
            description: m.description,
            promotion_code_id: m.promotion_code_id,
            share_url: m.share_url,
            click_count: m.click_count,
            conversion_count: m.conversion_count,
            is_active: m.is_active,
            created_by: m.created_by,
            created_at: m.created_at,
        })
    }
}

/// 微信二维码
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WechatQrcode {
    pub id: String,
    pub article_id: String,
    pub qr_type: QrType,
    pub scene_str: String,
    pub qr_code_url: String,
    pub scan_count: i64,
    pub status: QrStatus,
    pub expire_time: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<wechat_qrcode::Model> for WechatQrcode {
    type Error = PromolinkError;

    fn try_from(m: wechat_qrcode::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: m.id,
            article_id: m.article_id,
            qr_type: parse_enum(&m.qr_type, "qr_type")?,
            scene_str: m.scene_str,
            qr_code_url: m.qr_code_url,
            scan_count: m.scan_count,
            status: parse_enum(&m.status, "status")?,
            expire_time: m.expire_time,
            created_by: m.created_by,
            created_at: m.created_at,
        })
    }
}

/// 事件可选元数据；字段缺失或畸形时置空，从不因此拒绝整个事件
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventMetadata {
    pub referrer: Option<String>,
    pub device_type: Option<String>,
    pub platform: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub session_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enum_roundtrip_via_strings() {
        assert_eq!(CodeType::Referral.to_string(), "referral");
        assert_eq!("campaign".parse::<CodeType>().unwrap(), CodeType::Campaign);
        assert_eq!(SharePlatform::WechatMoments.to_string(), "wechat_moments");
        assert_eq!(
            "wechat_moments".parse::<SharePlatform>().unwrap(),
            SharePlatform::WechatMoments
        );
        assert_eq!(QrStatus::Revoked.to_string(), "revoked");
        assert_eq!(SubjectKind::Qrcode.to_string(), "qrcode");
    }

    #[test]
    fn test_platform_prefixes_are_distinct() {
        use strum::IntoEnumIterator;
        let prefixes: std::collections::HashSet<_> =
            SharePlatform::iter().map(|p| p.prefix()).collect();
        assert_eq!(prefixes.len(), SharePlatform::iter().count());
    }

    #[test]
    fn test_fourteen_platforms() {
        use strum::IntoEnumIterator;
        assert_eq!(SharePlatform::iter().count(), 14);
    }
}

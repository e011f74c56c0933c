//! Analytics query service layer
//!
//! 只读门面：组合 Link/Code Store 的同步计数与聚合桶的分布明细。
//!
//! # Query Strategies
//!
//! - share-stats：直接汇总 share_links 的同步计数列（实时）
//! - share-analytics：从 stats_hourly 读取，天/周分辨率在查询时按
//!   小时桶求和，不单独存储，避免更新放大
//!
//! 趋势对比的是请求窗口与紧邻的等长前窗口；前窗口为 0 时，本窗口
//! 非零记 100%，否则 0%。

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::analytics::{merge_counts, parse_json_counts, top_n};
use crate::config::get_config;
use crate::errors::{PromolinkError, Result};
use crate::storage::{CodeFilter, Consumable, PromotionCode, SeaOrmStorage, SubjectKind, SubjectRef};
use migration::entities::stats_hourly;

// ============ 公共类型定义 ============

/// 分组方式
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupBy {
    Hour,
    #[default]
    Day,
    Week,
}

/// 全局/单文章分享统计
#[derive(Debug, Clone, Serialize)]
pub struct ShareStats {
    pub total_shares: u64,
    pub total_clicks: u64,
    pub total_conversions: u64,
    pub conversion_rate: f64,
}

/// 时间序列点
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TimePoint {
    pub label: String,
    pub clicks: u64,
    pub conversions: u64,
}

/// 命名计数（来源 / 设备 / 平台统计）
#[derive(Debug, Clone, Serialize)]
pub struct NamedCount {
    pub name: String,
    pub count: u64,
    pub percentage: f64,
}

/// 地理位置统计
#[derive(Debug, Clone, Serialize)]
pub struct GeoCount {
    pub country: String,
    pub city: Option<String>,
    pub count: u64,
}

/// 窗口对比趋势（百分比变化）
#[derive(Debug, Clone, Serialize)]
pub struct TrendInfo {
    pub clicks_change_pct: f64,
    pub conversions_change_pct: f64,
}

/// 单主体分析数据
#[derive(Debug, Clone, Serialize)]
pub struct ShareAnalytics {
    pub subject_kind: SubjectKind,
    pub subject_id: String,
    pub total_clicks: u64,
    pub total_conversions: u64,
    pub conversion_rate: f64,
    pub trend: TrendInfo,
    pub time_series: Vec<TimePoint>,
    pub top_referrers: Vec<NamedCount>,
    pub geographic_data: Vec<GeoCount>,
    pub device_data: Vec<NamedCount>,
    pub platform_data: Vec<NamedCount>,
}

/// 推广码列表项（含派生的可用性）
#[derive(Debug, Clone, Serialize)]
pub struct PromotionCodeView {
    #[serde(flatten)]
    pub code: PromotionCode,
    pub usable: bool,
}

// ============ QueryService ============

pub struct QueryService {
    storage: Arc<SeaOrmStorage>,
    top_n: usize,
    max_query_buckets: u64,
}

impl QueryService {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        let config = get_config();
        Self {
            storage,
            top_n: config.analytics.top_n,
            max_query_buckets: config.analytics.max_query_buckets,
        }
    }

    /// 严格解析日期范围，解析失败时返回错误
    ///
    /// 支持 RFC3339 和 YYYY-MM-DD；两者都缺省时回退到最近 30 天。
    pub fn parse_date_range_strict(
        start_date: Option<&str>,
        end_date: Option<&str>,
    ) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        match (start_date, end_date) {
            (Some(s), Some(e)) => {
                let start = Self::parse_date(s).ok_or_else(|| {
                    PromolinkError::date_parse(format!(
                        "Invalid start date format: '{}'. Supported formats: RFC3339 or YYYY-MM-DD",
                        s
                    ))
                })?;
                let end = Self::parse_date(e).ok_or_else(|| {
                    PromolinkError::date_parse(format!(
                        "Invalid end date format: '{}'. Supported formats: RFC3339 or YYYY-MM-DD",
                        e
                    ))
                })?;
                if start > end {
                    return Err(PromolinkError::validation(
                        "Start date must not be later than end date",
                    ));
                }
                Ok((start, end))
            }
            (Some(_), None) => Err(PromolinkError::validation(
                "Start date is provided but end date is missing",
            )),
            (None, Some(_)) => Err(PromolinkError::validation(
                "End date is provided but start date is missing",
            )),
            (None, None) => Ok(Self::default_date_range()),
        }
    }

    fn parse_date(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
            .or_else(|| {
                chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|dt| dt.and_utc())
            })
    }

    fn default_date_range() -> (DateTime<Utc>, DateTime<Utc>) {
        let end = Utc::now();
        let start = end - Duration::days(30);
        (start, end)
    }

    /// 转化率：clicks 为 0 时定义为 0，否则 conversions/clicks*100
    pub fn conversion_rate(conversions: u64, clicks: u64) -> f64 {
        if clicks == 0 {
            return 0.0;
        }
        conversions as f64 / clicks as f64 * 100.0
    }

    /// 窗口对比百分比：前窗口为 0 时，本窗口非零记 100%，否则 0%
    pub fn trend_pct(current: u64, previous: u64) -> f64 {
        if previous == 0 {
            return if current > 0 { 100.0 } else { 0.0 };
        }
        (current as f64 - previous as f64) / previous as f64 * 100.0
    }

    // ============ 查询入口 ============

    /// 分享总览（同步计数，实时）
    pub async fn get_share_stats(&self, article_id: Option<&str>) -> Result<ShareStats> {
        info!("Analytics: get_share_stats (article: {:?})", article_id);

        let totals = self.storage.share_link_totals(article_id).await?;
        let clicks = totals.total_clicks.unwrap_or(0).max(0) as u64;
        let conversions = totals.total_conversions.unwrap_or(0).max(0) as u64;

        Ok(ShareStats {
            total_shares: totals.total_shares.max(0) as u64,
            total_clicks: clicks,
            total_conversions: conversions,
            conversion_rate: Self::conversion_rate(conversions, clicks),
        })
    }

    /// 单主体分析：时间序列 + 来源/地理/设备/平台分布 + 窗口趋势
    pub async fn get_share_analytics(
        &self,
        subject: &SubjectRef,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        group_by: GroupBy,
    ) -> Result<ShareAnalytics> {
        info!(
            "Analytics: get_share_analytics for {} from {} to {}",
            subject, start, end
        );

        self.ensure_subject_exists(subject).await?;

        let buckets = self.fetch_buckets(subject, start, end).await?;

        // 时间序列：BTreeMap 保证标签有序
        let mut series: BTreeMap<String, (u64, u64)> = BTreeMap::new();
        let mut total_clicks = 0u64;
        let mut total_conversions = 0u64;
        let mut referrers: HashMap<String, u64> = HashMap::new();
        let mut devices: HashMap<String, u64> = HashMap::new();
        let mut geos: HashMap<String, u64> = HashMap::new();
        let mut platforms: HashMap<String, u64> = HashMap::new();

        for bucket in &buckets {
            let clicks = bucket.clicks.max(0) as u64;
            let conversions = bucket.conversions.max(0) as u64;
            total_clicks += clicks;
            total_conversions += conversions;

            let label = Self::bucket_label(bucket.hour_bucket, group_by);
            let entry = series.entry(label).or_insert((0, 0));
            entry.0 += clicks;
            entry.1 += conversions;

            merge_counts(&mut referrers, &parse_json_counts(&bucket.referrer_counts));
            merge_counts(&mut devices, &parse_json_counts(&bucket.device_counts));
            merge_counts(&mut geos, &parse_json_counts(&bucket.geo_counts));
            merge_counts(&mut platforms, &parse_json_counts(&bucket.platform_counts));
        }

        // 紧邻等长前窗口（只需要计数）
        let prev_start = start - (end - start);
        let (prev_clicks, prev_conversions) = self.window_totals(subject, prev_start, start).await?;

        let time_series = series
            .into_iter()
            .map(|(label, (clicks, conversions))| TimePoint {
                label,
                clicks,
                conversions,
            })
            .collect();

        Ok(ShareAnalytics {
            subject_kind: subject.kind,
            subject_id: subject.id.clone(),
            total_clicks,
            total_conversions,
            conversion_rate: Self::conversion_rate(total_conversions, total_clicks),
            trend: TrendInfo {
                clicks_change_pct: Self::trend_pct(total_clicks, prev_clicks),
                conversions_change_pct: Self::trend_pct(total_conversions, prev_conversions),
            },
            time_series,
            top_referrers: Self::named_counts(&referrers, self.top_n),
            geographic_data: Self::geo_counts(&geos, self.top_n),
            device_data: Self::named_counts(&devices, self.top_n),
            platform_data: Self::named_counts(&platforms, self.top_n),
        })
    }

    /// 推广码列表（含派生可用性）
    pub async fn list_promotion_codes(
        &self,
        filter: &CodeFilter,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<PromotionCodeView>, u64)> {
        let (codes, total) = self
            .storage
            .list_promotion_codes(filter, page, page_size)
            .await?;

        let now = Utc::now();
        let views = codes
            .into_iter()
            .map(|code| PromotionCodeView {
                usable: code.is_usable(now),
                code,
            })
            .collect();

        Ok((views, total))
    }

    // ============ 辅助方法 ============

    async fn ensure_subject_exists(&self, subject: &SubjectRef) -> Result<()> {
        let exists = match subject.kind {
            SubjectKind::Code => self.storage.get_promotion_code(&subject.id).await?.is_some(),
            SubjectKind::Link => self.storage.get_share_link(&subject.id).await?.is_some(),
            SubjectKind::Qrcode => self.storage.get_qrcode(&subject.id).await?.is_some(),
        };
        if !exists {
            return Err(PromolinkError::not_found(format!("主体不存在: {}", subject)));
        }
        Ok(())
    }

    /// 读取主体在窗口内的小时桶（桶数有上限，宽窗口截断而不是无界扫描）
    async fn fetch_buckets(
        &self,
        subject: &SubjectRef,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<stats_hourly::Model>> {
        let buckets = stats_hourly::Entity::find()
            .filter(stats_hourly::Column::SubjectKind.eq(subject.kind.to_string()))
            .filter(stats_hourly::Column::SubjectId.eq(&subject.id))
            .filter(stats_hourly::Column::HourBucket.gte(start))
            .filter(stats_hourly::Column::HourBucket.lt(end))
            .order_by_asc(stats_hourly::Column::HourBucket)
            .limit(self.max_query_buckets)
            .all(self.storage.get_db())
            .await
            .map_err(|e| PromolinkError::database_operation(format!("Bucket query failed: {}", e)))?;

        if buckets.len() as u64 >= self.max_query_buckets {
            warn!(
                "Analytics: bucket limit hit for {} ({} buckets), range truncated",
                subject, self.max_query_buckets
            );
        }
        debug!("Analytics: {} buckets loaded for {}", buckets.len(), subject);

        Ok(buckets)
    }

    async fn window_totals(
        &self,
        subject: &SubjectRef,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(u64, u64)> {
        let buckets = self.fetch_buckets(subject, start, end).await?;
        let clicks = buckets.iter().map(|b| b.clicks.max(0) as u64).sum();
        let conversions = buckets.iter().map(|b| b.conversions.max(0) as u64).sum();
        Ok((clicks, conversions))
    }

    fn bucket_label(bucket: DateTime<Utc>, group_by: GroupBy) -> String {
        match group_by {
            GroupBy::Hour => bucket.format("%Y-%m-%d %H:00").to_string(),
            GroupBy::Day => bucket.format("%Y-%m-%d").to_string(),
            GroupBy::Week => bucket.format("%G-W%V").to_string(),
        }
    }

    fn named_counts(map: &HashMap<String, u64>, n: usize) -> Vec<NamedCount> {
        let total: u64 = map.values().sum();
        top_n(map, n)
            .into_iter()
            .map(|(name, count)| NamedCount {
                name,
                count,
                percentage: if total > 0 {
                    count as f64 / total as f64 * 100.0
                } else {
                    0.0
                },
            })
            .collect()
    }

    fn geo_counts(map: &HashMap<String, u64>, n: usize) -> Vec<GeoCount> {
        top_n(map, n)
            .into_iter()
            .map(|(key, count)| {
                let (country, city) = match key.split_once('|') {
                    Some((country, city)) => (country.to_string(), Some(city.to_string())),
                    None => (key, None),
                };
                GeoCount {
                    country,
                    city,
                    count,
                }
            })
            .collect()
    }
}

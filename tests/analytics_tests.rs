//! 聚合器与分析查询集成测试
//!
//! 覆盖游标消费的幂等性、小时桶分布与查询端的求和一致性、
//! 窗口趋势边界和坏事件隔离。

use std::sync::{Arc, Once};

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue::Set, EntityTrait};
use tempfile::TempDir;

use migration::entities::tracking_event;
use promolink::analytics::Aggregator;
use promolink::config::init_config;
use promolink::services::{GroupBy, QueryService};
use promolink::storage::{SeaOrmStorage, ShareLink, SharePlatform, SubjectRef};

static INIT: Once = Once::new();

fn init_static_config() {
    INIT.call_once(|| {
        init_config();
    });
}

async fn create_temp_storage() -> (Arc<SeaOrmStorage>, TempDir) {
    init_static_config();
    let td = TempDir::new().unwrap();
    let p = td.path().join("analytics_test.db");
    let u = format!("sqlite://{}?mode=rwc", p.display());
    let s = SeaOrmStorage::new(&u, "sqlite").await.unwrap();
    (Arc::new(s), td)
}

fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

async fn seed_link(storage: &SeaOrmStorage, id: &str) {
    let link = ShareLink {
        id: id.to_string(),
        article_id: "article-1".to_string(),
        platform: SharePlatform::Weibo,
        title: "深度解读".to_string(),
        description: None,
        promotion_code_id: None,
        share_url: format!("http://localhost:8080/s/{}", id),
        click_count: 0,
        conversion_count: 0,
        is_active: true,
        created_by: None,
        created_at: Utc::now(),
    };
    storage.insert_share_link(&link).await.unwrap();
}

fn click_event(
    n: usize,
    subject_id: &str,
    occurred_at: DateTime<Utc>,
    referrer: Option<&str>,
    device: Option<&str>,
    platform: Option<&str>,
) -> tracking_event::ActiveModel {
    tracking_event::ActiveModel {
        kind: Set("click".to_string()),
        subject_kind: Set("link".to_string()),
        subject_id: Set(subject_id.to_string()),
        occurred_at: Set(occurred_at),
        referrer: Set(referrer.map(String::from)),
        device_type: Set(device.map(String::from)),
        platform: Set(platform.map(String::from)),
        country: Set(Some("CN".to_string())),
        city: Set(Some("Hangzhou".to_string())),
        session_id: Set(None),
        click_token: Set(Some(format!("seed-token-{}-{}", subject_id, n))),
        converted_token: Set(None),
        dedup_key: Set(None),
        ..Default::default()
    }
}

fn conversion_event(
    n: usize,
    subject_id: &str,
    occurred_at: DateTime<Utc>,
) -> tracking_event::ActiveModel {
    tracking_event::ActiveModel {
        kind: Set("conversion".to_string()),
        subject_kind: Set("link".to_string()),
        subject_id: Set(subject_id.to_string()),
        occurred_at: Set(occurred_at),
        referrer: Set(None),
        device_type: Set(None),
        platform: Set(None),
        country: Set(None),
        city: Set(None),
        session_id: Set(None),
        click_token: Set(None),
        converted_token: Set(Some(format!("seed-conv-{}-{}", subject_id, n))),
        dedup_key: Set(None),
        ..Default::default()
    }
}

async fn insert_events(storage: &SeaOrmStorage, events: Vec<tracking_event::ActiveModel>) {
    for chunk in events.chunks(200) {
        tracking_event::Entity::insert_many(chunk.to_vec())
            .exec(storage.get_db())
            .await
            .unwrap();
    }
}

/// 消费全部积压
async fn drain(aggregator: &Aggregator) {
    loop {
        if aggregator.run_once().await.unwrap() == 0 {
            break;
        }
    }
}

// =============================================================================
// 1000 事件 / 3 小时桶场景
// =============================================================================

#[tokio::test]
async fn test_thousand_clicks_across_three_hourly_buckets() {
    let (storage, _td) = create_temp_storage().await;
    seed_link(&storage, "l-1000").await;

    // 300 / 400 / 300 分布在三个相邻小时
    let mut events = Vec::new();
    let mut n = 0;
    for (hour, count) in [
        ("2026-03-01T10:00:00Z", 300),
        ("2026-03-01T11:00:00Z", 400),
        ("2026-03-01T12:00:00Z", 300),
    ] {
        let base = ts(hour);
        for i in 0..count {
            let at = base + chrono::Duration::seconds((i % 3600) as i64);
            let referrer = if hour.contains("11") {
                Some("weibo.com")
            } else {
                None
            };
            let device = if i % 2 == 0 { Some("smartphone") } else { Some("pc") };
            events.push(click_event(n, "l-1000", at, referrer, device, Some("weibo")));
            n += 1;
        }
    }
    insert_events(&storage, events).await;

    let aggregator = Aggregator::new(storage.clone());
    drain(&aggregator).await;

    let queries = QueryService::new(storage.clone());
    let analytics = queries
        .get_share_analytics(
            &SubjectRef::link("l-1000"),
            ts("2026-03-01T10:00:00Z"),
            ts("2026-03-01T13:00:00Z"),
            GroupBy::Hour,
        )
        .await
        .unwrap();

    assert_eq!(analytics.total_clicks, 1000);

    let by_label: Vec<(String, u64)> = analytics
        .time_series
        .iter()
        .map(|p| (p.label.clone(), p.clicks))
        .collect();
    assert_eq!(
        by_label,
        vec![
            ("2026-03-01 10:00".to_string(), 300),
            ("2026-03-01 11:00".to_string(), 400),
            ("2026-03-01 12:00".to_string(), 300),
        ]
    );

    // 前一个等长窗口没有数据 → 趋势 100%
    assert_eq!(analytics.trend.clicks_change_pct, 100.0);

    // 设备分布：偶数下标 smartphone，奇数下标 pc
    let devices: std::collections::HashMap<_, _> = analytics
        .device_data
        .iter()
        .map(|d| (d.name.clone(), d.count))
        .collect();
    assert_eq!(devices.get("smartphone"), Some(&500));
    assert_eq!(devices.get("pc"), Some(&500));

    // 地理分布
    assert_eq!(analytics.geographic_data[0].country, "CN");
    assert_eq!(
        analytics.geographic_data[0].city.as_deref(),
        Some("Hangzhou")
    );
    assert_eq!(analytics.geographic_data[0].count, 1000);

    // 平台归因全部来自记录时的 platform 字段
    assert_eq!(analytics.platform_data[0].name, "weibo");
    assert_eq!(analytics.platform_data[0].count, 1000);
}

/// 重复处理同一事件流不会二次计数
#[tokio::test]
async fn test_aggregation_is_idempotent() {
    let (storage, _td) = create_temp_storage().await;
    seed_link(&storage, "l-idem").await;

    let base = ts("2026-03-02T09:00:00Z");
    let events = (0..50)
        .map(|i| click_event(i, "l-idem", base, None, None, None))
        .collect();
    insert_events(&storage, events).await;

    let aggregator = Aggregator::new(storage.clone());
    drain(&aggregator).await;

    // 再跑几轮：游标已推进，无事可做
    assert_eq!(aggregator.run_once().await.unwrap(), 0);
    assert_eq!(aggregator.run_once().await.unwrap(), 0);

    let queries = QueryService::new(storage.clone());
    let analytics = queries
        .get_share_analytics(
            &SubjectRef::link("l-idem"),
            ts("2026-03-02T00:00:00Z"),
            ts("2026-03-03T00:00:00Z"),
            GroupBy::Day,
        )
        .await
        .unwrap();
    assert_eq!(analytics.total_clicks, 50);
}

/// 转化进入同一桶的 conversions 列
#[tokio::test]
async fn test_conversions_aggregate_into_buckets() {
    let (storage, _td) = create_temp_storage().await;
    seed_link(&storage, "l-conv").await;

    let base = ts("2026-03-03T15:00:00Z");
    let mut events: Vec<_> = (0..40)
        .map(|i| click_event(i, "l-conv", base, None, None, None))
        .collect();
    events.extend((0..10).map(|i| conversion_event(i, "l-conv", base)));
    insert_events(&storage, events).await;

    let aggregator = Aggregator::new(storage.clone());
    drain(&aggregator).await;

    let queries = QueryService::new(storage.clone());
    let analytics = queries
        .get_share_analytics(
            &SubjectRef::link("l-conv"),
            ts("2026-03-03T00:00:00Z"),
            ts("2026-03-04T00:00:00Z"),
            GroupBy::Day,
        )
        .await
        .unwrap();

    assert_eq!(analytics.total_clicks, 40);
    assert_eq!(analytics.total_conversions, 10);
    assert!((analytics.conversion_rate - 25.0).abs() < f64::EPSILON);
}

/// Top-N 打平按键字典序，保证结果确定
#[tokio::test]
async fn test_top_referrers_tiebreak() {
    let (storage, _td) = create_temp_storage().await;
    seed_link(&storage, "l-tie").await;

    let base = ts("2026-03-04T08:00:00Z");
    let mut events = Vec::new();
    for i in 0..3 {
        events.push(click_event(i, "l-tie", base, Some("bbb.example.com"), None, None));
    }
    for i in 3..6 {
        events.push(click_event(i, "l-tie", base, Some("aaa.example.com"), None, None));
    }
    insert_events(&storage, events).await;

    let aggregator = Aggregator::new(storage.clone());
    drain(&aggregator).await;

    let queries = QueryService::new(storage.clone());
    let analytics = queries
        .get_share_analytics(
            &SubjectRef::link("l-tie"),
            ts("2026-03-04T00:00:00Z"),
            ts("2026-03-05T00:00:00Z"),
            GroupBy::Day,
        )
        .await
        .unwrap();

    assert_eq!(analytics.top_referrers[0].name, "aaa.example.com");
    assert_eq!(analytics.top_referrers[1].name, "bbb.example.com");
    assert_eq!(analytics.top_referrers[0].count, 3);
}

/// 单条坏事件被跳过，不阻塞后续进度
#[tokio::test]
async fn test_malformed_event_is_isolated() {
    let (storage, _td) = create_temp_storage().await;
    seed_link(&storage, "l-bad").await;

    let base = ts("2026-03-05T12:00:00Z");
    let mut events = vec![click_event(0, "l-bad", base, None, None, None)];
    // 人为构造一条坏 kind
    events.push(tracking_event::ActiveModel {
        kind: Set("bogus".to_string()),
        subject_kind: Set("link".to_string()),
        subject_id: Set("l-bad".to_string()),
        occurred_at: Set(base),
        referrer: Set(None),
        device_type: Set(None),
        platform: Set(None),
        country: Set(None),
        city: Set(None),
        session_id: Set(None),
        click_token: Set(Some("seed-bad-token".to_string())),
        converted_token: Set(None),
        dedup_key: Set(None),
        ..Default::default()
    });
    events.push(click_event(1, "l-bad", base, None, None, None));
    insert_events(&storage, events).await;

    let aggregator = Aggregator::new(storage.clone());
    drain(&aggregator).await;

    let queries = QueryService::new(storage.clone());
    let analytics = queries
        .get_share_analytics(
            &SubjectRef::link("l-bad"),
            ts("2026-03-05T00:00:00Z"),
            ts("2026-03-06T00:00:00Z"),
            GroupBy::Day,
        )
        .await
        .unwrap();

    // 坏事件没有计入，两条好事件都在
    assert_eq!(analytics.total_clicks, 2);

    // 游标越过坏事件，重放不再处理
    assert_eq!(aggregator.run_once().await.unwrap(), 0);
}

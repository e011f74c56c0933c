//! 事件聚合器
//!
//! 轮询游标消费 tracking_events，折叠进小时桶。桶写入与游标推进在
//! 同一事务内提交，重复处理同一批事件不会二次计数 —— 聚合是幂等、
//! 可重放的。单条坏事件记日志跳过，从不阻塞后续进度。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, Condition, EntityTrait, QueryFilter, QueryOrder, QuerySelect,
    TransactionTrait,
};
use tokio::time::{Duration, sleep};
use tracing::{debug, info, trace, warn};

use super::{cap_counts, merge_counts, parse_json_counts, to_json_counts, truncate_to_hour};
use crate::config::get_config;
use crate::storage::{EventKind, SeaOrmStorage};
use migration::entities::{aggregator_cursor, stats_hourly, tracking_event};

/// 游标行固定主键（单消费者）
const CURSOR_ID: i32 = 1;

/// 一个桶在本批次内累积的增量
#[derive(Debug, Default, Clone)]
struct BucketDelta {
    clicks: i64,
    conversions: i64,
    referrers: HashMap<String, u64>,
    devices: HashMap<String, u64>,
    geos: HashMap<String, u64>,
    platforms: HashMap<String, u64>,
}

impl BucketDelta {
    fn fold(&mut self, event: &tracking_event::Model, kind: EventKind) {
        match kind {
            EventKind::Conversion => {
                self.conversions += 1;
            }
            EventKind::Click | EventKind::Scan => {
                self.clicks += 1;

                // 分布明细只统计流量事件
                let referrer = event.referrer.clone().unwrap_or_else(|| "direct".to_string());
                *self.referrers.entry(referrer).or_insert(0) += 1;

                let device = event
                    .device_type
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string());
                *self.devices.entry(device).or_insert(0) += 1;

                if let Some(ref country) = event.country {
                    let geo_key = match event.city {
                        Some(ref city) => format!("{}|{}", country, city),
                        None => country.clone(),
                    };
                    *self.geos.entry(geo_key).or_insert(0) += 1;
                }

                if let Some(ref platform) = event.platform {
                    *self.platforms.entry(platform.clone()).or_insert(0) += 1;
                }
            }
        }
    }
}

/// 聚合器
pub struct Aggregator {
    storage: Arc<SeaOrmStorage>,
    poll_interval: Duration,
    batch_size: u64,
    map_cap: usize,
}

impl Aggregator {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        let config = get_config();
        Self {
            storage,
            poll_interval: Duration::from_secs(config.analytics.poll_interval_seconds),
            batch_size: config.analytics.batch_size,
            map_cap: config.analytics.map_cap,
        }
    }

    /// 启动后台聚合循环（作为异步方法运行）
    pub async fn start_background_task(&self) {
        info!(
            "Aggregator started (poll interval: {:?}, batch size: {})",
            self.poll_interval, self.batch_size
        );
        loop {
            match self.run_once().await {
                Ok(0) => {
                    trace!("Aggregator: no new events");
                    sleep(self.poll_interval).await;
                }
                Ok(n) => {
                    debug!("Aggregator: folded {} events", n);
                    // 还有积压时立即继续，追平后再回到轮询节奏
                    if n < self.batch_size {
                        sleep(self.poll_interval).await;
                    }
                }
                Err(e) => {
                    warn!("Aggregation cycle failed: {}", e);
                    sleep(self.poll_interval).await;
                }
            }
        }
    }

    /// 处理一批事件，返回折叠的事件数
    pub async fn run_once(&self) -> anyhow::Result<u64> {
        let db = self.storage.get_db();

        let cursor = aggregator_cursor::Entity::find_by_id(CURSOR_ID).one(db).await?;
        let last_event_id = cursor.as_ref().map(|c| c.last_event_id).unwrap_or(0);

        let events = tracking_event::Entity::find()
            .filter(tracking_event::Column::Id.gt(last_event_id))
            .order_by_asc(tracking_event::Column::Id)
            .limit(self.batch_size)
            .all(db)
            .await?;

        if events.is_empty() {
            return Ok(0);
        }

        let max_event_id = events.last().map(|e| e.id).unwrap_or(last_event_id);

        // 折叠到 (subject_kind, subject_id, hour_bucket) 增量
        let mut deltas: HashMap<(String, String, DateTime<Utc>), BucketDelta> = HashMap::new();
        for event in &events {
            let kind: EventKind = match event.kind.parse() {
                Ok(kind) => kind,
                Err(_) => {
                    // 坏事件隔离：跳过并推进，不阻塞后续
                    warn!("Skipping malformed event {} (kind: '{}')", event.id, event.kind);
                    continue;
                }
            };

            let key = (
                event.subject_kind.clone(),
                event.subject_id.clone(),
                truncate_to_hour(event.occurred_at),
            );
            deltas.entry(key).or_default().fold(event, kind);
        }

        // 桶写入与游标推进同事务：重放安全
        let txn = db.begin().await?;

        let mut fetch_cond = Condition::any();
        for (subject_kind, subject_id, bucket) in deltas.keys() {
            fetch_cond = fetch_cond.add(
                Condition::all()
                    .add(stats_hourly::Column::SubjectKind.eq(subject_kind))
                    .add(stats_hourly::Column::SubjectId.eq(subject_id))
                    .add(stats_hourly::Column::HourBucket.eq(*bucket)),
            );
        }
        let existing = if deltas.is_empty() {
            Vec::new()
        } else {
            stats_hourly::Entity::find().filter(fetch_cond).all(&txn).await?
        };

        let existing_map: HashMap<(String, String, DateTime<Utc>), stats_hourly::Model> = existing
            .into_iter()
            .map(|m| {
                (
                    (m.subject_kind.clone(), m.subject_id.clone(), m.hour_bucket),
                    m,
                )
            })
            .collect();

        let mut to_insert: Vec<stats_hourly::ActiveModel> = Vec::new();

        for (key, delta) in &deltas {
            if let Some(row) = existing_map.get(key) {
                let mut referrers = parse_json_counts(&row.referrer_counts);
                merge_counts(&mut referrers, &delta.referrers);
                cap_counts(&mut referrers, self.map_cap);

                let mut devices = parse_json_counts(&row.device_counts);
                merge_counts(&mut devices, &delta.devices);
                cap_counts(&mut devices, self.map_cap);

                let mut geos = parse_json_counts(&row.geo_counts);
                merge_counts(&mut geos, &delta.geos);
                cap_counts(&mut geos, self.map_cap);

                let mut platforms = parse_json_counts(&row.platform_counts);
                merge_counts(&mut platforms, &delta.platforms);
                cap_counts(&mut platforms, self.map_cap);

                let mut active: stats_hourly::ActiveModel = row.clone().into();
                active.clicks = Set(row.clicks + delta.clicks);
                active.conversions = Set(row.conversions + delta.conversions);
                active.referrer_counts = Set(to_json_counts(&referrers));
                active.device_counts = Set(to_json_counts(&devices));
                active.geo_counts = Set(to_json_counts(&geos));
                active.platform_counts = Set(to_json_counts(&platforms));

                stats_hourly::Entity::update(active).exec(&txn).await?;
            } else {
                let mut referrers = delta.referrers.clone();
                cap_counts(&mut referrers, self.map_cap);
                let mut devices = delta.devices.clone();
                cap_counts(&mut devices, self.map_cap);
                let mut geos = delta.geos.clone();
                cap_counts(&mut geos, self.map_cap);
                let mut platforms = delta.platforms.clone();
                cap_counts(&mut platforms, self.map_cap);

                to_insert.push(stats_hourly::ActiveModel {
                    subject_kind: Set(key.0.clone()),
                    subject_id: Set(key.1.clone()),
                    hour_bucket: Set(key.2),
                    clicks: Set(delta.clicks),
                    conversions: Set(delta.conversions),
                    referrer_counts: Set(to_json_counts(&referrers)),
                    device_counts: Set(to_json_counts(&devices)),
                    geo_counts: Set(to_json_counts(&geos)),
                    platform_counts: Set(to_json_counts(&platforms)),
                    ..Default::default()
                });
            }
        }

        if !to_insert.is_empty() {
            stats_hourly::Entity::insert_many(to_insert).exec(&txn).await?;
        }

        // 推进游标
        let now = Utc::now();
        match cursor {
            Some(c) => {
                let mut active: aggregator_cursor::ActiveModel = c.into();
                active.last_event_id = Set(max_event_id);
                active.updated_at = Set(now);
                aggregator_cursor::Entity::update(active).exec(&txn).await?;
            }
            None => {
                aggregator_cursor::Entity::insert(aggregator_cursor::ActiveModel {
                    id: Set(CURSOR_ID),
                    last_event_id: Set(max_event_id),
                    updated_at: Set(now),
                })
                .exec(&txn)
                .await?;
            }
        }

        txn.commit().await?;

        debug!(
            "Aggregated {} events into {} buckets (cursor: {} -> {})",
            events.len(),
            deltas.len(),
            last_event_id,
            max_event_id
        );

        Ok(events.len() as u64)
    }
}

//! 事件接入
//!
//! 点击/扫码：消费 + 事件追加（同事务），按 (主体, 会话, 粗时间粒度)
//! 去重，重放返回最初发放的令牌。转化：必须引用归因窗口内发放的点击
//! 令牌，窗口外或无对应点击的转化被拒绝；同一令牌至多记一次。
//!
//! 畸形可选元数据一律置空后接受，只有身份/归因失败才拒绝整个事件。

pub mod device;
pub mod sink;

pub use sink::AttributionStore;

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use moka::sync::Cache;
use tracing::{debug, trace};

use crate::config::get_config;
use crate::errors::{PromolinkError, Result};
use crate::storage::{
    ConversionOutcome, EventKind, EventMetadata, IssuedClick, RecordOutcome, RejectReason,
    SharePlatform, SubjectRef, WechatQrcode,
};

/// referrer 字段落库长度上限
const MAX_REFERRER_LENGTH: usize = 2048;

/// 终态拒绝的快路径缓存 TTL
const NEGATIVE_CACHE_TTL_SECONDS: u64 = 60;
/// 终态拒绝缓存容量上限
const NEGATIVE_CACHE_MAX: usize = 10_000;

pub struct EventIngest {
    store: Arc<dyn AttributionStore>,
    /// 点击令牌快路径缓存（TTL = 归因窗口；数据库是事实来源）
    token_cache: Cache<String, IssuedClick>,
    /// 终态拒绝（revoked/expired/exhausted/not_found）的快路径缓存。
    /// 这些状态不可逆，缓存命中只是省一次数据库往返；可用性判定
    /// 本身仍由消费谓词在存储层兜底。
    dead_subjects: DashMap<SubjectRef, (RejectReason, Instant)>,
    attribution_window: Duration,
    dedup_window_seconds: i64,
}

impl EventIngest {
    pub fn new(store: Arc<dyn AttributionStore>) -> Self {
        let config = get_config();
        let window_minutes = config.tracking.attribution_window_minutes;

        Self {
            store,
            token_cache: Cache::builder()
                .time_to_live(std::time::Duration::from_secs(window_minutes as u64 * 60))
                .max_capacity(config.tracking.token_cache_capacity)
                .build(),
            dead_subjects: DashMap::new(),
            attribution_window: Duration::minutes(window_minutes),
            dedup_window_seconds: config.tracking.dedup_window_seconds,
        }
    }

    pub fn attribution_window(&self) -> Duration {
        self.attribution_window
    }

    /// 记录一次点击
    ///
    /// 成功时返回点击令牌；同一 (主体, 会话, 粗时间粒度) 的重放返回
    /// 最初的令牌，不重复消费。
    pub async fn record_click(
        &self,
        subject: &SubjectRef,
        meta: EventMetadata,
    ) -> Result<RecordOutcome> {
        self.record_consumption(subject, EventKind::Click, meta)
            .await
    }

    /// 记录一次二维码扫码（按 scene_str 定位主体）
    ///
    /// 返回命中的二维码与记录结果，落地页重定向需要前者。
    pub async fn record_scan(
        &self,
        scene_str: &str,
        mut meta: EventMetadata,
    ) -> Result<(WechatQrcode, RecordOutcome)> {
        let qr = self
            .store
            .find_qrcode_by_scene(scene_str)
            .await?
            .ok_or_else(|| {
                PromolinkError::not_found(format!("scene_str 无对应二维码: {}", scene_str))
            })?;

        // 扫码事件的平台归因固定为微信
        if meta.platform.is_none() {
            meta.platform = Some(SharePlatform::Wechat.to_string());
        }

        let outcome = self
            .record_consumption(&SubjectRef::qrcode(qr.id.clone()), EventKind::Scan, meta)
            .await?;
        Ok((qr, outcome))
    }

    async fn record_consumption(
        &self,
        subject: &SubjectRef,
        kind: EventKind,
        meta: EventMetadata,
    ) -> Result<RecordOutcome> {
        if let Some(reason) = self.check_dead_subject(subject) {
            trace!("Fast-path rejection for {}: {}", subject, reason);
            return Ok(RecordOutcome::Rejected(reason));
        }

        let meta = sanitize_metadata(meta);
        let now = Utc::now();
        let dedup_key = self.dedup_key(kind, subject, &meta, now);

        let outcome = self
            .store
            .consume_and_log(subject, kind, &meta, dedup_key, now)
            .await?;

        match &outcome {
            RecordOutcome::Recorded { token, replayed } => {
                if *replayed {
                    debug!("Replayed {} on {}, original token returned", kind, subject);
                } else {
                    self.token_cache.insert(
                        token.clone(),
                        IssuedClick {
                            subject: subject.clone(),
                            occurred_at: now,
                            session_id: meta.session_id.clone(),
                        },
                    );
                    trace!("{} recorded on {}: token {}", kind, subject, token);
                }
            }
            RecordOutcome::Rejected(reason) => {
                debug!("{} rejected on {}: {}", kind, subject, reason);
                self.remember_dead_subject(subject, *reason);
            }
        }

        Ok(outcome)
    }

    /// 记录一次转化
    ///
    /// 令牌必须在归因窗口内发放；重复转化幂等返回最初结果。
    pub async fn record_conversion(
        &self,
        click_token: &str,
        meta: EventMetadata,
    ) -> Result<ConversionOutcome> {
        let meta = sanitize_metadata(meta);
        let now = Utc::now();

        let click = match self.token_cache.get(click_token) {
            Some(click) => click,
            None => self
                .store
                .find_issued_click(click_token)
                .await?
                .ok_or_else(|| {
                    PromolinkError::no_attributable_click(format!(
                        "转化未命中任何已发放的点击令牌: {}",
                        click_token
                    ))
                })?,
        };

        if now >= click.occurred_at + self.attribution_window {
            return Err(PromolinkError::no_attributable_click(format!(
                "点击超出归因窗口（发放于 {}，窗口 {} 分钟）",
                click.occurred_at,
                self.attribution_window.num_minutes()
            )));
        }

        let outcome = self
            .store
            .convert_and_log(&click, click_token, &meta, now)
            .await?;

        if outcome.replayed {
            debug!("Replayed conversion for token {}", click_token);
        }
        Ok(outcome)
    }

    /// 去重键：主体 + 会话 + 粗时间粒度；无会话标识时不去重
    fn dedup_key(
        &self,
        kind: EventKind,
        subject: &SubjectRef,
        meta: &EventMetadata,
        now: DateTime<Utc>,
    ) -> Option<String> {
        let session_id = meta.session_id.as_deref()?;
        let bucket = now.timestamp() / self.dedup_window_seconds.max(1);
        Some(format!("{}:{}:{}:{}", kind, subject, session_id, bucket))
    }

    fn check_dead_subject(&self, subject: &SubjectRef) -> Option<RejectReason> {
        let entry = self.dead_subjects.get(subject)?;
        let (reason, cached_at) = *entry;
        if cached_at.elapsed().as_secs() >= NEGATIVE_CACHE_TTL_SECONDS {
            drop(entry);
            self.dead_subjects.remove(subject);
            return None;
        }
        Some(reason)
    }

    fn remember_dead_subject(&self, subject: &SubjectRef, reason: RejectReason) {
        // Inactive 可以被 toggle 回来，不缓存；其余拒绝原因不可逆
        if reason == RejectReason::Inactive {
            return;
        }
        if self.dead_subjects.len() >= NEGATIVE_CACHE_MAX {
            self.dead_subjects
                .retain(|_, (_, at)| at.elapsed().as_secs() < NEGATIVE_CACHE_TTL_SECONDS);
            if self.dead_subjects.len() >= NEGATIVE_CACHE_MAX {
                return;
            }
        }
        self.dead_subjects
            .insert(subject.clone(), (reason, Instant::now()));
    }
}

/// 元数据清洗：截断超长字段、空串置空、非法平台值置空
///
/// 这里从不产生错误 —— 坏的可选字段不值得拒绝整个事件。
fn sanitize_metadata(mut meta: EventMetadata) -> EventMetadata {
    meta.referrer = meta
        .referrer
        .filter(|s| !s.is_empty())
        .map(|s| truncate(s, MAX_REFERRER_LENGTH));
    meta.device_type = meta
        .device_type
        .filter(|s| !s.is_empty())
        .map(|s| truncate(s, 32));
    meta.platform = meta
        .platform
        .filter(|s| s.parse::<SharePlatform>().is_ok());
    meta.country = meta
        .country
        .filter(|s| !s.is_empty())
        .map(|s| truncate(s, 64));
    meta.city = meta
        .city
        .filter(|s| !s.is_empty())
        .map(|s| truncate(s, 64));
    meta.session_id = meta
        .session_id
        .filter(|s| !s.is_empty())
        .map(|s| truncate(s, 64));
    meta
}

fn truncate(s: String, max: usize) -> String {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::Once;

    static INIT: Once = Once::new();

    fn init_static_config() {
        INIT.call_once(|| {
            crate::config::init_config();
        });
    }

    /// Mock 存储：计数 + 可注入的点击发放时间
    struct MockStore {
        consumed: Mutex<Vec<(SubjectRef, EventKind)>>,
        conversions: Mutex<Vec<String>>,
        issued: Mutex<Option<IssuedClick>>,
        reject_with: Mutex<Option<RejectReason>>,
    }

    impl MockStore {
        fn new() -> Self {
            Self {
                consumed: Mutex::new(Vec::new()),
                conversions: Mutex::new(Vec::new()),
                issued: Mutex::new(None),
                reject_with: Mutex::new(None),
            }
        }

        fn issue_click_at(&self, subject: SubjectRef, occurred_at: DateTime<Utc>) {
            *self.issued.lock().unwrap() = Some(IssuedClick {
                subject,
                occurred_at,
                session_id: None,
            });
        }
    }

    #[async_trait]
    impl AttributionStore for MockStore {
        async fn consume_and_log(
            &self,
            subject: &SubjectRef,
            kind: EventKind,
            _meta: &EventMetadata,
            _dedup_key: Option<String>,
            _now: DateTime<Utc>,
        ) -> Result<RecordOutcome> {
            if let Some(reason) = *self.reject_with.lock().unwrap() {
                return Ok(RecordOutcome::Rejected(reason));
            }
            self.consumed.lock().unwrap().push((subject.clone(), kind));
            Ok(RecordOutcome::Recorded {
                token: format!("token-{}", self.consumed.lock().unwrap().len()),
                replayed: false,
            })
        }

        async fn find_issued_click(&self, _token: &str) -> Result<Option<IssuedClick>> {
            Ok(self.issued.lock().unwrap().clone())
        }

        async fn convert_and_log(
            &self,
            _click: &IssuedClick,
            token: &str,
            _meta: &EventMetadata,
            _now: DateTime<Utc>,
        ) -> Result<ConversionOutcome> {
            let mut conversions = self.conversions.lock().unwrap();
            if conversions.iter().any(|t| t == token) {
                return Ok(ConversionOutcome { replayed: true });
            }
            conversions.push(token.to_string());
            Ok(ConversionOutcome { replayed: false })
        }

        async fn find_qrcode_by_scene(&self, _scene_str: &str) -> Result<Option<WechatQrcode>> {
            Ok(None)
        }
    }

    fn make_ingest(store: Arc<MockStore>) -> EventIngest {
        init_static_config();
        EventIngest::new(store)
    }

    #[tokio::test]
    async fn test_click_issues_token() {
        let store = Arc::new(MockStore::new());
        let ingest = make_ingest(store.clone());

        let outcome = ingest
            .record_click(&SubjectRef::code("c1"), EventMetadata::default())
            .await
            .unwrap();

        match outcome {
            RecordOutcome::Recorded { token, replayed } => {
                assert!(!token.is_empty());
                assert!(!replayed);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(store.consumed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_conversion_within_window_accepted() {
        let store = Arc::new(MockStore::new());
        store.issue_click_at(SubjectRef::link("l1"), Utc::now() - Duration::minutes(29));
        let ingest = make_ingest(store.clone());

        let outcome = ingest
            .record_conversion("tok", EventMetadata::default())
            .await
            .unwrap();
        assert!(!outcome.replayed);
    }

    #[tokio::test]
    async fn test_conversion_outside_window_rejected() {
        let store = Arc::new(MockStore::new());
        store.issue_click_at(SubjectRef::link("l1"), Utc::now() - Duration::minutes(31));
        let ingest = make_ingest(store.clone());

        let err = ingest
            .record_conversion("tok", EventMetadata::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PromolinkError::NoAttributableClick(_)));
    }

    #[tokio::test]
    async fn test_conversion_without_click_rejected() {
        let store = Arc::new(MockStore::new());
        let ingest = make_ingest(store);

        let err = ingest
            .record_conversion("ghost", EventMetadata::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PromolinkError::NoAttributableClick(_)));
    }

    #[tokio::test]
    async fn test_conversion_replay_is_idempotent() {
        let store = Arc::new(MockStore::new());
        store.issue_click_at(SubjectRef::link("l1"), Utc::now());
        let ingest = make_ingest(store.clone());

        let first = ingest
            .record_conversion("tok", EventMetadata::default())
            .await
            .unwrap();
        let second = ingest
            .record_conversion("tok", EventMetadata::default())
            .await
            .unwrap();

        assert!(!first.replayed);
        assert!(second.replayed);
        assert_eq!(store.conversions.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_terminal_rejection_hits_negative_cache() {
        let store = Arc::new(MockStore::new());
        *store.reject_with.lock().unwrap() = Some(RejectReason::Revoked);
        let ingest = make_ingest(store.clone());

        let subject = SubjectRef::qrcode("q1");
        let first = ingest
            .record_click(&subject, EventMetadata::default())
            .await
            .unwrap();
        assert_eq!(first, RecordOutcome::Rejected(RejectReason::Revoked));

        // 第二次命中负缓存，不再访问存储
        *store.reject_with.lock().unwrap() = None;
        let second = ingest
            .record_click(&subject, EventMetadata::default())
            .await
            .unwrap();
        assert_eq!(second, RecordOutcome::Rejected(RejectReason::Revoked));
        assert!(store.consumed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_inactive_rejection_not_cached() {
        let store = Arc::new(MockStore::new());
        *store.reject_with.lock().unwrap() = Some(RejectReason::Inactive);
        let ingest = make_ingest(store.clone());

        let subject = SubjectRef::link("l1");
        ingest
            .record_click(&subject, EventMetadata::default())
            .await
            .unwrap();

        // toggle 回来之后必须立刻可用
        *store.reject_with.lock().unwrap() = None;
        let outcome = ingest
            .record_click(&subject, EventMetadata::default())
            .await
            .unwrap();
        assert!(matches!(outcome, RecordOutcome::Recorded { .. }));
    }

    #[test]
    fn test_sanitize_nulls_empty_fields() {
        let meta = sanitize_metadata(EventMetadata {
            referrer: Some("".to_string()),
            device_type: Some("".to_string()),
            platform: None,
            country: Some("CN".to_string()),
            city: None,
            session_id: Some("".to_string()),
        });
        assert!(meta.referrer.is_none());
        assert!(meta.device_type.is_none());
        assert!(meta.session_id.is_none());
        assert_eq!(meta.country.as_deref(), Some("CN"));
    }

    #[test]
    fn test_sanitize_drops_unknown_platform() {
        let meta = sanitize_metadata(EventMetadata {
            platform: Some("myspace".to_string()),
            ..Default::default()
        });
        assert!(meta.platform.is_none());

        let meta = sanitize_metadata(EventMetadata {
            platform: Some("wechat".to_string()),
            ..Default::default()
        });
        assert_eq!(meta.platform.as_deref(), Some("wechat"));
    }

    #[test]
    fn test_sanitize_truncates_long_referrer() {
        let meta = sanitize_metadata(EventMetadata {
            referrer: Some("x".repeat(5000)),
            ..Default::default()
        });
        assert_eq!(meta.referrer.unwrap().len(), MAX_REFERRER_LENGTH);
    }

    #[test]
    fn test_truncate_respects_char_boundary() {
        let truncated = truncate("微信分享".to_string(), 4);
        // 每个汉字 3 字节，4 落在字符中间，回退到 3
        assert_eq!(truncated, "微");
    }
}

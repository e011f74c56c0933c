//! 事件接入集成测试
//!
//! 覆盖点击/扫码/转化的完整链路：消费与事件追加同事务、
//! 重放幂等、归因窗口边界、conversionCount ≤ clickCount。

use std::sync::{Arc, Once};

use chrono::{Duration, Utc};
use sea_orm::{ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter};
use tempfile::TempDir;

use migration::entities::tracking_event;
use promolink::config::init_config;
use promolink::errors::PromolinkError;
use promolink::ingest::EventIngest;
use promolink::storage::{
    EventMetadata, QrStatus, QrType, RecordOutcome, RejectReason, SeaOrmStorage, ShareLink,
    SharePlatform, SubjectRef, WechatQrcode,
};

static INIT: Once = Once::new();

fn init_static_config() {
    INIT.call_once(|| {
        init_config();
    });
}

async fn create_temp_storage() -> (Arc<SeaOrmStorage>, TempDir) {
    init_static_config();
    let td = TempDir::new().unwrap();
    let p = td.path().join("ingest_test.db");
    let u = format!("sqlite://{}?mode=rwc", p.display());
    let s = SeaOrmStorage::new(&u, "sqlite").await.unwrap();
    (Arc::new(s), td)
}

fn make_link(id: &str) -> ShareLink {
    ShareLink {
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
    }
}

fn meta_with_session(session: &str) -> EventMetadata {
    EventMetadata {
        referrer: Some("https://weibo.com/t/123".to_string()),
        device_type: Some("smartphone".to_string()),
        platform: None,
        country: Some("CN".to_string()),
        city: Some("Hangzhou".to_string()),
        session_id: Some(session.to_string()),
    }
}

fn token_of(outcome: &RecordOutcome) -> String {
    match outcome {
        RecordOutcome::Recorded { token, .. } => token.clone(),
        other => panic!("expected Recorded, got {:?}", other),
    }
}

// =============================================================================
// 点击
// =============================================================================

#[tokio::test]
async fn test_click_increments_counter_and_appends_event() {
    let (storage, _td) = create_temp_storage().await;
    let ingest = EventIngest::new(storage.clone());

    let link = make_link("l-click");
    storage.insert_share_link(&link).await.unwrap();

    let outcome = ingest
        .record_click(&SubjectRef::link("l-click"), meta_with_session("s1"))
        .await
        .unwrap();
    let token = token_of(&outcome);
    assert!(!token.is_empty());

    let stored = storage.get_share_link("l-click").await.unwrap().unwrap();
    assert_eq!(stored.click_count, 1);

    let events = tracking_event::Entity::find()
        .filter(tracking_event::Column::SubjectId.eq("l-click"))
        .all(storage.get_db())
        .await
        .unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, "click");
    assert_eq!(events[0].click_token.as_deref(), Some(token.as_str()));
}

/// 同一 (主体, 会话, 粗时间粒度) 的重放返回原令牌，计数不变
#[tokio::test]
async fn test_click_replay_is_idempotent() {
    let (storage, _td) = create_temp_storage().await;
    let ingest = EventIngest::new(storage.clone());

    let link = make_link("l-replay");
    storage.insert_share_link(&link).await.unwrap();

    let subject = SubjectRef::link("l-replay");
    let first = ingest
        .record_click(&subject, meta_with_session("s1"))
        .await
        .unwrap();
    let second = ingest
        .record_click(&subject, meta_with_session("s1"))
        .await
        .unwrap();

    let first_token = token_of(&first);
    match &second {
        RecordOutcome::Recorded { token, replayed } => {
            assert!(*replayed);
            assert_eq!(token, &first_token);
        }
        other => panic!("expected Recorded, got {:?}", other),
    }

    let stored = storage.get_share_link("l-replay").await.unwrap().unwrap();
    assert_eq!(stored.click_count, 1);
}

/// 不同会话不去重
#[tokio::test]
async fn test_distinct_sessions_count_separately() {
    let (storage, _td) = create_temp_storage().await;
    let ingest = EventIngest::new(storage.clone());

    let link = make_link("l-sess");
    storage.insert_share_link(&link).await.unwrap();

    let subject = SubjectRef::link("l-sess");
    ingest
        .record_click(&subject, meta_with_session("s1"))
        .await
        .unwrap();
    ingest
        .record_click(&subject, meta_with_session("s2"))
        .await
        .unwrap();

    let stored = storage.get_share_link("l-sess").await.unwrap().unwrap();
    assert_eq!(stored.click_count, 2);
}

/// 链接关闭后点击被拒绝，事件不落库
#[tokio::test]
async fn test_click_rejected_on_inactive_link() {
    let (storage, _td) = create_temp_storage().await;
    let ingest = EventIngest::new(storage.clone());

    let link = make_link("l-off");
    storage.insert_share_link(&link).await.unwrap();
    storage.toggle_share_link("l-off").await.unwrap();

    let outcome = ingest
        .record_click(&SubjectRef::link("l-off"), meta_with_session("s1"))
        .await
        .unwrap();
    assert_eq!(outcome, RecordOutcome::Rejected(RejectReason::Inactive));

    let events = tracking_event::Entity::find()
        .filter(tracking_event::Column::SubjectId.eq("l-off"))
        .all(storage.get_db())
        .await
        .unwrap();
    assert!(events.is_empty());
}

// =============================================================================
// 转化
// =============================================================================

#[tokio::test]
async fn test_conversion_flow_and_replay() {
    let (storage, _td) = create_temp_storage().await;
    let ingest = EventIngest::new(storage.clone());

    let link = make_link("l-conv");
    storage.insert_share_link(&link).await.unwrap();

    let outcome = ingest
        .record_click(&SubjectRef::link("l-conv"), meta_with_session("s1"))
        .await
        .unwrap();
    let token = token_of(&outcome);

    let first = ingest
        .record_conversion(&token, EventMetadata::default())
        .await
        .unwrap();
    assert!(!first.replayed);

    // 重放返回最初结果
    let second = ingest
        .record_conversion(&token, EventMetadata::default())
        .await
        .unwrap();
    assert!(second.replayed);

    let stored = storage.get_share_link("l-conv").await.unwrap().unwrap();
    assert_eq!(stored.conversion_count, 1);
    assert!(stored.conversion_count <= stored.click_count);
}

#[tokio::test]
async fn test_conversion_without_prior_click_rejected() {
    let (storage, _td) = create_temp_storage().await;
    let ingest = EventIngest::new(storage.clone());

    let err = ingest
        .record_conversion("no-such-token", EventMetadata::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PromolinkError::NoAttributableClick(_)));
}

/// 归因窗口边界：29 分钟接受，31 分钟拒绝（缺省 30 分钟窗口）
#[tokio::test]
async fn test_attribution_window_boundary() {
    let (storage, _td) = create_temp_storage().await;
    let ingest = EventIngest::new(storage.clone());

    let link = make_link("l-window");
    storage.insert_share_link(&link).await.unwrap();

    let outcome = ingest
        .record_click(&SubjectRef::link("l-window"), meta_with_session("s1"))
        .await
        .unwrap();
    let token = token_of(&outcome);

    // 把点击时间改写到 31 分钟前；用新的 EventIngest 实例绕过令牌缓存，
    // 强制走数据库（事实来源）
    backdate_click(&storage, &token, Duration::minutes(31)).await;
    let fresh = EventIngest::new(storage.clone());
    let err = fresh
        .record_conversion(&token, EventMetadata::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PromolinkError::NoAttributableClick(_)));

    // 改回 29 分钟前：接受
    backdate_click(&storage, &token, Duration::minutes(29)).await;
    let fresh = EventIngest::new(storage.clone());
    let outcome = fresh
        .record_conversion(&token, EventMetadata::default())
        .await
        .unwrap();
    assert!(!outcome.replayed);
}

async fn backdate_click(storage: &SeaOrmStorage, token: &str, age: Duration) {
    let event = tracking_event::Entity::find()
        .filter(tracking_event::Column::ClickToken.eq(token))
        .one(storage.get_db())
        .await
        .unwrap()
        .unwrap();
    let mut active: tracking_event::ActiveModel = event.into();
    active.occurred_at = Set(Utc::now() - age);
    tracking_event::Entity::update(active)
        .exec(storage.get_db())
        .await
        .unwrap();
}

// =============================================================================
// 扫码
// =============================================================================

#[tokio::test]
async fn test_scan_increments_and_attributes_wechat() {
    let (storage, _td) = create_temp_storage().await;
    let ingest = EventIngest::new(storage.clone());

    let qr = WechatQrcode {
        id: "q-scan".to_string(),
        article_id: "article-1".to_string(),
        qr_type: QrType::Permanent,
        scene_str: "qr_article-1_scan0001".to_string(),
        qr_code_url: "http://localhost:8080/q/qr_article-1_scan0001".to_string(),
        scan_count: 0,
        status: QrStatus::Active,
        expire_time: None,
        created_by: None,
        created_at: Utc::now(),
    };
    storage.insert_qrcode(&qr).await.unwrap();

    let (found, outcome) = ingest
        .record_scan("qr_article-1_scan0001", meta_with_session("s1"))
        .await
        .unwrap();
    assert_eq!(found.id, "q-scan");
    assert!(matches!(outcome, RecordOutcome::Recorded { .. }));

    let stored = storage.get_qrcode("q-scan").await.unwrap().unwrap();
    assert_eq!(stored.scan_count, 1);

    // 扫码事件的平台归因固定为微信
    let events = tracking_event::Entity::find()
        .filter(tracking_event::Column::SubjectId.eq("q-scan"))
        .all(storage.get_db())
        .await
        .unwrap();
    assert_eq!(events[0].kind, "scan");
    assert_eq!(events[0].platform.as_deref(), Some("wechat"));
}

#[tokio::test]
async fn test_scan_unknown_scene_rejected() {
    let (storage, _td) = create_temp_storage().await;
    let ingest = EventIngest::new(storage.clone());

    let err = ingest
        .record_scan("qr_ghost_00000000", EventMetadata::default())
        .await
        .unwrap_err();
    assert!(matches!(err, PromolinkError::NotFound(_)));
}

// =============================================================================
// 上限主体的接入路径
// =============================================================================

/// maxUses=1 的码第二次点击被拒，计数停在 1
#[tokio::test]
async fn test_click_respects_code_cap() {
    let (storage, _td) = create_temp_storage().await;
    let ingest = EventIngest::new(storage.clone());

    let code = promolink::storage::PromotionCode {
        id: "c-cap".to_string(),
        code: "CAP_ONE01".to_string(),
        article_id: "article-1".to_string(),
        code_type: promolink::storage::CodeType::Campaign,
        platform: None,
        is_custom: false,
        max_uses: Some(1),
        current_uses: 0,
        expires_at: None,
        is_active: true,
        created_by: None,
        created_at: Utc::now(),
    };
    storage.insert_promotion_code(&code).await.unwrap();

    let subject = SubjectRef::code("c-cap");
    let first = ingest
        .record_click(&subject, meta_with_session("s1"))
        .await
        .unwrap();
    assert!(matches!(first, RecordOutcome::Recorded { .. }));

    let second = ingest
        .record_click(&subject, meta_with_session("s2"))
        .await
        .unwrap();
    assert_eq!(second, RecordOutcome::Rejected(RejectReason::Exhausted));

    let stored = storage.get_promotion_code("c-cap").await.unwrap().unwrap();
    assert_eq!(stored.current_uses, 1);
}

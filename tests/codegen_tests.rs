//! 推广码生成器集成测试

use std::sync::{Arc, Once};

use chrono::{Duration, Utc};
use tempfile::TempDir;

use promolink::codegen::{CodeGenerator, GenerateCodeRequest};
use promolink::config::init_config;
use promolink::errors::PromolinkError;
use promolink::storage::{CodeType, SeaOrmStorage, SharePlatform};

static INIT: Once = Once::new();

fn init_static_config() {
    INIT.call_once(|| {
        init_config();
    });
}

async fn create_temp_storage() -> (Arc<SeaOrmStorage>, TempDir) {
    init_static_config();
    let td = TempDir::new().unwrap();
    let p = td.path().join("codegen_test.db");
    let u = format!("sqlite://{}?mode=rwc", p.display());
    let s = SeaOrmStorage::new(&u, "sqlite").await.unwrap();
    (Arc::new(s), td)
}

fn request(custom_code: Option<&str>) -> GenerateCodeRequest {
    GenerateCodeRequest {
        article_id: "article-1".to_string(),
        code_type: CodeType::Social,
        platform: Some(SharePlatform::Wechat),
        custom_code: custom_code.map(String::from),
        max_uses: None,
        expires_at: None,
        created_by: Some("editor-1".to_string()),
    }
}

#[tokio::test]
async fn test_custom_code_roundtrip() {
    let (storage, _td) = create_temp_storage().await;
    let generator = CodeGenerator::new(storage.clone());

    let code = generator.generate(request(Some("SUMMER24"))).await.unwrap();
    assert_eq!(code.code, "SUMMER24");
    assert!(code.is_custom);

    let found = storage.find_promotion_code("SUMMER24").await.unwrap();
    assert!(found.is_some());
}

/// 同一自定义码任意大小写都是冲突
#[tokio::test]
async fn test_custom_code_duplicate_case_insensitive() {
    let (storage, _td) = create_temp_storage().await;
    let generator = CodeGenerator::new(storage);

    generator.generate(request(Some("SUMMER24"))).await.unwrap();

    let err = generator
        .generate(request(Some("summer24")))
        .await
        .unwrap_err();
    assert!(matches!(err, PromolinkError::DuplicateCode(_)));

    let err = generator
        .generate(request(Some("Summer24")))
        .await
        .unwrap_err();
    assert!(matches!(err, PromolinkError::DuplicateCode(_)));
}

#[tokio::test]
async fn test_custom_code_charset_validation() {
    let (storage, _td) = create_temp_storage().await;
    let generator = CodeGenerator::new(storage);

    for bad in ["ab", "has space", "emoji🎉", &"x".repeat(40)] {
        let err = generator.generate(request(Some(bad))).await.unwrap_err();
        assert!(
            matches!(err, PromolinkError::Validation(_)),
            "expected validation error for {:?}",
            bad
        );
    }
}

/// 生成码带平台前缀，随机段为大写 base36
#[tokio::test]
async fn test_generated_code_shape() {
    let (storage, _td) = create_temp_storage().await;
    let generator = CodeGenerator::new(storage);

    let code = generator.generate(request(None)).await.unwrap();
    assert!(!code.is_custom);

    let (prefix, segment) = code.code.split_once('_').unwrap();
    assert_eq!(prefix, "WX");
    assert!((6..=8).contains(&segment.len()));
    assert!(
        segment
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    );
}

/// 无平台时回退到类型前缀
#[tokio::test]
async fn test_generated_code_type_prefix_fallback() {
    let (storage, _td) = create_temp_storage().await;
    let generator = CodeGenerator::new(storage);

    let mut req = request(None);
    req.platform = None;
    req.code_type = CodeType::Referral;

    let code = generator.generate(req).await.unwrap();
    assert!(code.code.starts_with("REF_"));
}

/// 连续生成互不相同
#[tokio::test]
async fn test_generated_codes_are_distinct() {
    let (storage, _td) = create_temp_storage().await;
    let generator = CodeGenerator::new(storage);

    let mut seen = std::collections::HashSet::new();
    for _ in 0..20 {
        let code = generator.generate(request(None)).await.unwrap();
        assert!(seen.insert(code.code.clone()), "duplicate: {}", code.code);
    }
}

#[tokio::test]
async fn test_request_validation() {
    let (storage, _td) = create_temp_storage().await;
    let generator = CodeGenerator::new(storage);

    let mut req = request(None);
    req.max_uses = Some(0);
    assert!(matches!(
        generator.generate(req).await.unwrap_err(),
        PromolinkError::Validation(_)
    ));

    let mut req = request(None);
    req.expires_at = Some(Utc::now() - Duration::hours(1));
    assert!(matches!(
        generator.generate(req).await.unwrap_err(),
        PromolinkError::Validation(_)
    ));

    let mut req = request(None);
    req.article_id = String::new();
    assert!(matches!(
        generator.generate(req).await.unwrap_err(),
        PromolinkError::Validation(_)
    ));
}

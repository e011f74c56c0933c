//! 公开接入端点
//!
//! 点击/扫码/转化由落地页或重定向路径上报，不经过管理控制台。
//! `/s/{id}` 和 `/q/{scene}` 是对外分享 URL 的解析入口：消费一次
//! 点击/扫码并 307 跳转到文章页。

use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::{HttpRequest, HttpResponse, web};
use tracing::{debug, error};

use super::error_code::ErrorCode;
use super::helpers::{error_from_promolink, error_response, success_response};
use super::types::{ClickAccepted, ConversionAccepted, TrackClick, TrackConversion, TrackScan};
use crate::errors::PromolinkError;
use crate::ingest::{EventIngest, device};
use crate::services::{QrService, ShareService};
use crate::storage::{EventMetadata, RecordOutcome};

// ============ JSON 接入端点 ============

pub async fn post_click(
    payload: web::Json<TrackClick>,
    share: web::Data<Arc<ShareService>>,
) -> HttpResponse {
    let payload = payload.into_inner();
    match share.click_promotion_code(&payload.code, payload.meta).await {
        Ok(outcome) => record_outcome_response(outcome),
        Err(e) => error_from_promolink(&e),
    }
}

pub async fn post_scan(
    payload: web::Json<TrackScan>,
    qr: web::Data<Arc<QrService>>,
) -> HttpResponse {
    let payload = payload.into_inner();
    match qr.record_scan(&payload.scene_str, payload.meta).await {
        Ok(outcome) => record_outcome_response(outcome),
        Err(e) => error_from_promolink(&e),
    }
}

pub async fn post_conversion(
    payload: web::Json<TrackConversion>,
    ingest: web::Data<Arc<EventIngest>>,
) -> HttpResponse {
    let payload = payload.into_inner();
    match ingest
        .record_conversion(&payload.click_token, payload.meta)
        .await
    {
        Ok(outcome) => success_response(ConversionAccepted {
            replayed: outcome.replayed,
        }),
        Err(e) => error_from_promolink(&e),
    }
}

fn record_outcome_response(outcome: RecordOutcome) -> HttpResponse {
    match outcome {
        RecordOutcome::Recorded { token, replayed } => success_response(ClickAccepted {
            click_token: token,
            replayed,
        }),
        RecordOutcome::Rejected(reason) => error_response(
            StatusCode::GONE,
            ErrorCode::SubjectNotUsable,
            &format!("subject not usable: {}", reason),
        ),
    }
}

// ============ 重定向入口 ============

pub async fn redirect_share(
    req: HttpRequest,
    path: web::Path<String>,
    share: web::Data<Arc<ShareService>>,
) -> HttpResponse {
    let link_id = path.into_inner();
    let meta = extract_meta(&req);

    match share
        .resolve_share_link(&link_id, meta, req.uri().query())
        .await
    {
        Ok(resolved) => finish_redirect(&resolved.target_url),
        Err(e) => redirect_error_response(&e, &link_id),
    }
}

pub async fn redirect_scan(
    req: HttpRequest,
    path: web::Path<String>,
    qr: web::Data<Arc<QrService>>,
) -> HttpResponse {
    let scene_str = path.into_inner();
    let meta = extract_meta(&req);

    match qr.resolve_scan(&scene_str, meta).await {
        Ok(resolved) => finish_redirect(&resolved.target_url),
        Err(e) => redirect_error_response(&e, &scene_str),
    }
}

#[inline]
fn finish_redirect(target_url: &str) -> HttpResponse {
    HttpResponse::build(StatusCode::TEMPORARY_REDIRECT)
        .insert_header(("Location", target_url))
        .finish()
}

/// 重定向路径返回纯文本错误（浏览器直接展示，不是 JSON 客户端）
fn redirect_error_response(err: &PromolinkError, subject: &str) -> HttpResponse {
    match err {
        PromolinkError::NotFound(_) => {
            debug!("Redirect target not found: {}", subject);
            HttpResponse::build(StatusCode::NOT_FOUND)
                .insert_header(("Content-Type", "text/html; charset=utf-8"))
                .insert_header(("Cache-Control", "public, max-age=60"))
                .body("Not Found")
        }
        PromolinkError::NotUsable(_) => {
            debug!("Redirect target not usable: {}", subject);
            HttpResponse::build(StatusCode::GONE)
                .insert_header(("Content-Type", "text/html; charset=utf-8"))
                .body("Gone")
        }
        _ => {
            error!("Redirect resolution failed for {}: {}", subject, err);
            HttpResponse::build(StatusCode::INTERNAL_SERVER_ERROR)
                .insert_header(("Content-Type", "text/html; charset=utf-8"))
                .body("Internal Server Error")
        }
    }
}

/// 从请求提取事件元数据
///
/// referrer/UA 来自标准头；地理信息由边缘层注入的 x-geo-* 头提供；
/// 会话标识取查询参数 sid。缺了哪个都不拒绝事件。
fn extract_meta(req: &HttpRequest) -> EventMetadata {
    let referrer = req
        .headers()
        .get("referer")
        .and_then(|h| h.to_str().ok())
        .map(String::from);

    let device_type = req
        .headers()
        .get("user-agent")
        .and_then(|h| h.to_str().ok())
        .and_then(device::classify_user_agent);

    let country = req
        .headers()
        .get("x-geo-country")
        .and_then(|h| h.to_str().ok())
        .map(String::from);
    let city = req
        .headers()
        .get("x-geo-city")
        .and_then(|h| h.to_str().ok())
        .map(String::from);

    let session_id = req
        .uri()
        .query()
        .and_then(|q| extract_query_param(q, "sid"))
        .map(|v| v.into_owned());

    EventMetadata {
        referrer,
        device_type,
        platform: None,
        country,
        city,
        session_id,
    }
}

/// 从 query string 提取指定参数值
#[inline]
fn extract_query_param<'a>(query: &'a str, key: &str) -> Option<std::borrow::Cow<'a, str>> {
    for part in query.split('&') {
        if let Some(value) = part.strip_prefix(key).and_then(|s| s.strip_prefix('=')) {
            return urlencoding::decode(value).ok();
        }
    }
    None
}

/// /api/track 路由配置
pub fn track_routes() -> actix_web::Scope {
    web::scope("/track")
        .route("/clicks", web::post().to(post_click))
        .route("/scans", web::post().to(post_scan))
        .route("/conversions", web::post().to(post_conversion))
}

/// 对外分享 URL 解析路由
pub fn redirect_routes() -> actix_web::Scope {
    web::scope("")
        .route("/s/{id}", web::get().to(redirect_share))
        .route("/q/{scene}", web::get().to(redirect_scan))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_query_param() {
        assert_eq!(
            extract_query_param("sid=abc123&utm_source=weibo", "sid").as_deref(),
            Some("abc123")
        );
        assert_eq!(extract_query_param("foo=bar", "sid"), None);
        assert_eq!(
            extract_query_param("sid=a%20b", "sid").as_deref(),
            Some("a b")
        );
    }
}

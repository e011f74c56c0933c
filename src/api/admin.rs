//! Admin API 端点
//!
//! 管理控制台使用的 JSON 接口：推广码 / 分享链接 / 二维码的生命周期
//! 操作，以及分享统计与分析查询。

use std::sync::Arc;

use actix_web::{HttpRequest, HttpResponse, web};

use super::helpers::{
    api_result, error_from_promolink, paginated_response, parse_expires_at, success_response,
};
use super::types::{
    AnalyticsQuery, GetCodesQuery, GetLinksQuery, GetQrcodesQuery, PaginationInfo,
    PostPromotionCode, PostQrcode, PostShareLink, ShareStatsQuery, ToggleResult,
};
use crate::codegen::GenerateCodeRequest;
use crate::errors::PromolinkError;
use crate::services::{CreateShareLinkRequest, QrService, QueryService, ShareService};
use crate::storage::{CodeFilter, SubjectKind, SubjectRef};

const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE_SIZE: u64 = 100;

/// 调用方身份由外部认证层提供，这里只做归属记录
fn operator_from(req: &HttpRequest) -> Option<String> {
    req.headers()
        .get("x-operator")
        .and_then(|h| h.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn page_params(page: Option<u64>, page_size: Option<u64>) -> (u64, u64) {
    let page = page.unwrap_or(1).max(1);
    let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    (page, page_size)
}

// ============ 推广码 ============

pub async fn post_promotion_code(
    req: HttpRequest,
    payload: web::Json<PostPromotionCode>,
    share: web::Data<Arc<ShareService>>,
) -> HttpResponse {
    let payload = payload.into_inner();

    let expires_at = match payload.expires_at.as_deref() {
        Some(s) if !s.is_empty() => match parse_expires_at(s) {
            Ok(t) => Some(t),
            Err(e) => return error_from_promolink(&e),
        },
        _ => None,
    };

    api_result(
        share
            .create_promotion_code(GenerateCodeRequest {
                article_id: payload.article_id,
                code_type: payload.code_type,
                platform: payload.platform,
                custom_code: payload.custom_code,
                max_uses: payload.max_uses,
                expires_at,
                created_by: operator_from(&req),
            })
            .await,
    )
}

pub async fn get_promotion_codes(
    query: web::Query<GetCodesQuery>,
    queries: web::Data<Arc<QueryService>>,
) -> HttpResponse {
    let query = query.into_inner();
    let (page, page_size) = page_params(query.page, query.page_size);

    let filter = CodeFilter {
        article_id: query.article_id,
        code_type: query.code_type,
        platform: query.platform,
        only_active: query.only_active.unwrap_or(false),
        search: query.search,
    };

    match queries.list_promotion_codes(&filter, page, page_size).await {
        Ok((codes, total)) => {
            paginated_response(codes, PaginationInfo::new(page, page_size, total))
        }
        Err(e) => error_from_promolink(&e),
    }
}

pub async fn delete_promotion_code(
    path: web::Path<String>,
    share: web::Data<Arc<ShareService>>,
) -> HttpResponse {
    let id = path.into_inner();
    match share.delete_promotion_code(&id).await {
        Ok(()) => success_response(()),
        Err(e) => error_from_promolink(&e),
    }
}

// ============ 分享链接 ============

pub async fn post_share_link(
    req: HttpRequest,
    payload: web::Json<PostShareLink>,
    share: web::Data<Arc<ShareService>>,
) -> HttpResponse {
    let payload = payload.into_inner();

    api_result(
        share
            .create_share_link(CreateShareLinkRequest {
                article_id: payload.article_id,
                platform: payload.platform,
                title: payload.title,
                description: payload.description,
                promotion_code_id: payload.promotion_code_id,
                created_by: operator_from(&req),
            })
            .await,
    )
}

pub async fn get_share_links(
    query: web::Query<GetLinksQuery>,
    share: web::Data<Arc<ShareService>>,
) -> HttpResponse {
    let query = query.into_inner();
    let (page, page_size) = page_params(query.page, query.page_size);

    match share
        .list_share_links(query.article_id.as_deref(), page, page_size)
        .await
    {
        Ok((links, total)) => {
            paginated_response(links, PaginationInfo::new(page, page_size, total))
        }
        Err(e) => error_from_promolink(&e),
    }
}

pub async fn toggle_share_link(
    path: web::Path<String>,
    share: web::Data<Arc<ShareService>>,
) -> HttpResponse {
    let id = path.into_inner();
    match share.toggle_share_link(&id).await {
        Ok(is_active) => success_response(ToggleResult { is_active }),
        Err(e) => error_from_promolink(&e),
    }
}

pub async fn delete_share_link(
    path: web::Path<String>,
    share: web::Data<Arc<ShareService>>,
) -> HttpResponse {
    let id = path.into_inner();
    match share.delete_share_link(&id).await {
        Ok(()) => success_response(()),
        Err(e) => error_from_promolink(&e),
    }
}

// ============ 微信二维码 ============

pub async fn post_qrcode(
    req: HttpRequest,
    payload: web::Json<PostQrcode>,
    qr: web::Data<Arc<QrService>>,
) -> HttpResponse {
    let payload = payload.into_inner();

    api_result(
        qr.create_qrcode(
            &payload.article_id,
            payload.qr_type,
            payload.expire_seconds,
            operator_from(&req),
        )
        .await,
    )
}

pub async fn get_qrcodes(
    query: web::Query<GetQrcodesQuery>,
    qr: web::Data<Arc<QrService>>,
) -> HttpResponse {
    let query = query.into_inner();
    let (page, page_size) = page_params(query.page, query.page_size);

    match qr
        .list_qrcodes(query.article_id.as_deref(), page, page_size)
        .await
    {
        Ok((qrcodes, total)) => {
            paginated_response(qrcodes, PaginationInfo::new(page, page_size, total))
        }
        Err(e) => error_from_promolink(&e),
    }
}

pub async fn revoke_qrcode(
    path: web::Path<String>,
    qr: web::Data<Arc<QrService>>,
) -> HttpResponse {
    let id = path.into_inner();
    match qr.revoke_qrcode(&id).await {
        Ok(()) => success_response(()),
        Err(e) => error_from_promolink(&e),
    }
}

// ============ 统计查询 ============

pub async fn get_share_stats(
    query: web::Query<ShareStatsQuery>,
    queries: web::Data<Arc<QueryService>>,
) -> HttpResponse {
    api_result(queries.get_share_stats(query.article_id.as_deref()).await)
}

pub async fn get_share_analytics(
    path: web::Path<(String, String)>,
    query: web::Query<AnalyticsQuery>,
    queries: web::Data<Arc<QueryService>>,
) -> HttpResponse {
    let (kind_raw, subject_id) = path.into_inner();

    let kind: SubjectKind = match kind_raw.parse() {
        Ok(kind) => kind,
        Err(_) => {
            return error_from_promolink(&PromolinkError::validation(format!(
                "未知主体类型: {} (支持 code / link / qrcode)",
                kind_raw
            )));
        }
    };

    subject_analytics(kind, subject_id, query.into_inner(), &queries).await
}

/// 兼容入口：未限定主体类型时按分享链接处理
pub async fn get_share_link_analytics(
    path: web::Path<String>,
    query: web::Query<AnalyticsQuery>,
    queries: web::Data<Arc<QueryService>>,
) -> HttpResponse {
    subject_analytics(
        SubjectKind::Link,
        path.into_inner(),
        query.into_inner(),
        &queries,
    )
    .await
}

async fn subject_analytics(
    kind: SubjectKind,
    subject_id: String,
    query: AnalyticsQuery,
    queries: &QueryService,
) -> HttpResponse {
    let (start, end) = match QueryService::parse_date_range_strict(
        query.start_date.as_deref(),
        query.end_date.as_deref(),
    ) {
        Ok(range) => range,
        Err(e) => return error_from_promolink(&e),
    };

    api_result(
        queries
            .get_share_analytics(
                &SubjectRef {
                    kind,
                    id: subject_id,
                },
                start,
                end,
                query.group_by.unwrap_or_default(),
            )
            .await,
    )
}

/// Admin 路由配置
pub fn admin_routes() -> actix_web::Scope {
    web::scope("")
        .route("/promotion-codes", web::post().to(post_promotion_code))
        .route("/promotion-codes", web::get().to(get_promotion_codes))
        .route(
            "/promotion-codes/{id}",
            web::delete().to(delete_promotion_code),
        )
        .route("/share-links", web::post().to(post_share_link))
        .route("/share-links", web::get().to(get_share_links))
        .route("/share-links/{id}/toggle", web::post().to(toggle_share_link))
        .route("/share-links/{id}", web::delete().to(delete_share_link))
        .route("/wechat/qrcodes", web::post().to(post_qrcode))
        .route("/wechat/qrcodes", web::get().to(get_qrcodes))
        .route("/wechat/qrcodes/{id}/revoke", web::post().to(revoke_qrcode))
        .route("/share-stats", web::get().to(get_share_stats))
        .route(
            "/share-analytics/{subject_kind}/{subject_id}",
            web::get().to(get_share_analytics),
        )
        .route(
            "/share-analytics/{share_id}",
            web::get().to(get_share_link_analytics),
        )
}

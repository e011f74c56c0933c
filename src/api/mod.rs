//! HTTP API 层
//!
//! - `/api/...`: 管理控制台 JSON 接口
//! - `/api/track/...`: 公开事件接入
//! - `/s/{id}`, `/q/{scene}`: 分享 URL / 二维码落地解析（307 重定向）

pub mod admin;
pub mod error_code;
pub mod health;
pub mod helpers;
pub mod track;
pub mod types;

pub use error_code::ErrorCode;
pub use health::AppStartTime;

use actix_web::web;

/// /api 路由配置（管理接口 + 事件接入）
pub fn api_routes() -> actix_web::Scope {
    web::scope("/api")
        .service(track::track_routes())
        .service(admin::admin_routes())
}

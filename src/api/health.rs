//! 健康检查端点

use actix_web::{HttpResponse, web};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::helpers::success_response;

/// 程序启动时间（App Data）
#[derive(Clone, Debug)]
pub struct AppStartTime {
    pub start_datetime: DateTime<Utc>,
}

#[derive(Serialize)]
struct HealthStatus {
    status: &'static str,
    uptime_seconds: i64,
}

pub async fn healthz(start: web::Data<AppStartTime>) -> HttpResponse {
    success_response(HealthStatus {
        status: "ok",
        uptime_seconds: (Utc::now() - start.start_datetime).num_seconds(),
    })
}

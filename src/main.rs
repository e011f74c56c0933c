use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware::Condition, web};
use tracing::{debug, info};

use promolink::analytics::{Aggregator, Sweeper};
use promolink::api::{self, AppStartTime};
use promolink::config;
use promolink::ingest::EventIngest;
use promolink::services::{QrService, QueryService, ShareService};
use promolink::storage::SeaOrmStorage;
use promolink::system::logging::init_logging;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let app_start_time = AppStartTime {
        start_datetime: chrono::Utc::now(),
    };

    dotenvy::dotenv().ok();
    let config = config::init_config();

    // guard 必须存活到进程结束，保证日志刷盘
    let _log_guard = init_logging(config);

    if let Err(e) = config::validate_config(config) {
        return Err(std::io::Error::other(format!("Invalid configuration: {}", e)));
    }

    info!("Starting promolink v{}", env!("CARGO_PKG_VERSION"));

    let storage = SeaOrmStorage::from_config()
        .await
        .map_err(|e| std::io::Error::other(format!("Failed to create storage backend: {}", e)))?;
    info!("Using storage backend: {}", storage.backend_name());

    let ingest = Arc::new(EventIngest::new(storage.clone()));
    let share_service = Arc::new(ShareService::new(storage.clone(), ingest.clone()));
    let qr_service = Arc::new(QrService::new(storage.clone(), ingest.clone()));
    let query_service = Arc::new(QueryService::new(storage.clone()));

    // 后台任务持有强引用，防止过早销毁
    let aggregator = Arc::new(Aggregator::new(storage.clone()));
    let aggregator_task = aggregator.clone();
    tokio::spawn(async move {
        aggregator_task.start_background_task().await;
    });

    let sweeper = Arc::new(Sweeper::new(storage.clone()));
    let sweeper_task = sweeper.clone();
    tokio::spawn(async move {
        sweeper_task.start_background_task().await;
    });

    debug!("Background tasks spawned (aggregator, sweeper)");

    let cors_origin = config.server.cors_origin.clone();
    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    info!("Starting server at http://{}", bind_address);

    let mut server = HttpServer::new(move || {
        let cors_enabled = !cors_origin.is_empty();
        let cors = if cors_enabled {
            Cors::default()
                .allowed_origin(&cors_origin)
                .allow_any_method()
                .allow_any_header()
                .max_age(3600)
        } else {
            Cors::default()
        };

        App::new()
            .app_data(web::Data::new(share_service.clone()))
            .app_data(web::Data::new(qr_service.clone()))
            .app_data(web::Data::new(query_service.clone()))
            .app_data(web::Data::new(ingest.clone()))
            .app_data(web::Data::new(app_start_time.clone()))
            .wrap(Condition::new(cors_enabled, cors))
            .route("/healthz", web::get().to(api::health::healthz))
            .service(api::api_routes())
            .service(api::track::redirect_routes())
    });

    if config.server.workers > 0 {
        server = server.workers(config.server.workers);
    }

    server.bind(bind_address)?.run().await
}

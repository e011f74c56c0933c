//! 过期清扫
//!
//! 低频后台任务：把已过期的临时二维码和推广码翻转为终态/非活跃。
//! 消费谓词在每次判定时独立重查过期时间，清扫只是索引友好的反规范化
//! 优化，重复或并发运行都是安全的。

use std::sync::Arc;

use chrono::Utc;
use tokio::time::{Duration, sleep};
use tracing::{debug, info, warn};

use crate::config::get_config;
use crate::errors::Result;
use crate::storage::SeaOrmStorage;

pub struct Sweeper {
    storage: Arc<SeaOrmStorage>,
    interval: Duration,
}

impl Sweeper {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        let config = get_config();
        Self {
            storage,
            interval: Duration::from_secs(config.analytics.sweep_interval_seconds),
        }
    }

    /// 启动后台清扫循环（作为异步方法运行）
    pub async fn start_background_task(&self) {
        info!("Expiry sweeper started (interval: {:?})", self.interval);
        loop {
            sleep(self.interval).await;
            if let Err(e) = self.run_once().await {
                warn!("Expiry sweep failed: {}", e);
            }
        }
    }

    /// 执行一轮清扫，返回 (过期推广码数, 过期二维码数)
    pub async fn run_once(&self) -> Result<(u64, u64)> {
        let now = Utc::now();

        let expired_codes = self.storage.expire_promotion_codes(now).await?;
        let expired_qrcodes = self.storage.expire_temporary_qrcodes(now).await?;

        if expired_codes > 0 || expired_qrcodes > 0 {
            info!(
                "Expiry sweep completed: {} promotion codes, {} QR codes",
                expired_codes, expired_qrcodes
            );
        } else {
            debug!("Expiry sweep completed: nothing to expire");
        }

        Ok((expired_codes, expired_qrcodes))
    }
}

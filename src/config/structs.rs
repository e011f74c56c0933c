use serde::{Deserialize, Serialize};

/// 静态配置（从 TOML 加载，启动时使用）
///
/// 包含基础设施配置：
/// - server: 服务器地址、端口、对外 URL
/// - database: 数据库连接配置
/// - tracking: 归因与去重窗口、码生成参数
/// - analytics: 聚合器与过期清扫参数
/// - logging: 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StaticConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl StaticConfig {
    /// 从 TOML 文件和环境变量加载配置
    ///
    /// 优先级：ENV > config.toml > 默认值
    /// ENV 前缀：PL，分隔符：__
    /// 示例：PL__SERVER__PORT=9999
    pub fn load() -> Self {
        use config::{Config, Environment, File};

        let path = "config.toml";

        let builder = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("PL")
                    .separator("__")
                    .try_parsing(true),
            );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<StaticConfig>() {
                Ok(config) => {
                    if std::path::Path::new(path).exists() {
                        eprintln!("[INFO] Configuration loaded from: {}", path);
                    }
                    config
                }
                Err(e) => {
                    eprintln!("[ERROR] Failed to deserialize config: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("[ERROR] Failed to build config: {}", e);
                Self::default()
            }
        }
    }

    /// 生成示例 TOML 配置文件
    pub fn generate_sample_config() -> String {
        let sample_config = Self::default();
        toml::to_string_pretty(&sample_config)
            .unwrap_or_else(|e| format!("Error generating sample config: {}", e))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// 管理控制台的 CORS 来源（空 = 不启用 CORS）
    #[serde(default)]
    pub cors_origin: String,
    /// 对外短链/二维码落地页的基地址
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
    /// 文章内容页基地址（重定向目标的前缀）
    #[serde(default = "default_content_base_url")]
    pub content_base_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            workers: default_workers(),
            cors_origin: String::new(),
            public_base_url: default_public_base_url(),
            content_base_url: default_content_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// 消费路径单次存储操作的超时上限
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            pool_size: default_pool_size(),
            retry_count: default_retry_count(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            operation_timeout_ms: default_operation_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// 点击 → 转化归因窗口（分钟）
    #[serde(default = "default_attribution_window_minutes")]
    pub attribution_window_minutes: i64,
    /// 点击去重粗时间粒度（秒）
    #[serde(default = "default_dedup_window_seconds")]
    pub dedup_window_seconds: i64,
    /// 自动生成码的随机段长度
    #[serde(default = "default_random_code_length")]
    pub random_code_length: usize,
    /// 生成碰撞重试上限
    #[serde(default = "default_max_generate_attempts")]
    pub max_generate_attempts: u32,
    /// 点击令牌快路径缓存容量
    #[serde(default = "default_token_cache_capacity")]
    pub token_cache_capacity: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            attribution_window_minutes: default_attribution_window_minutes(),
            dedup_window_seconds: default_dedup_window_seconds(),
            random_code_length: default_random_code_length(),
            max_generate_attempts: default_max_generate_attempts(),
            token_cache_capacity: default_token_cache_capacity(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// 聚合器轮询间隔（秒）
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,
    /// 单次聚合批大小
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    /// 查询返回的 Top-N 数量
    #[serde(default = "default_top_n")]
    pub top_n: usize,
    /// 每桶分布 map 的键数上限
    #[serde(default = "default_map_cap")]
    pub map_cap: usize,
    /// 单次分析查询读取的桶数上限
    #[serde(default = "default_max_query_buckets")]
    pub max_query_buckets: u64,
    /// 过期清扫间隔（秒）
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: default_poll_interval_seconds(),
            batch_size: default_batch_size(),
            top_n: default_top_n(),
            map_cap: default_map_cap(),
            max_query_buckets: default_max_query_buckets(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "plain" 或 "json"
    #[serde(default = "default_log_format")]
    pub format: String,
    /// 日志文件路径（空 = 输出到控制台）
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_true")]
    pub enable_rotation: bool,
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
            enable_rotation: true,
            max_backups: default_max_backups(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_workers() -> usize {
    0 // 0 = actix 默认（CPU 核数）
}
fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}
fn default_content_base_url() -> String {
    "http://localhost:3000/articles".to_string()
}
fn default_database_url() -> String {
    "sqlite://promolink.db?mode=rwc".to_string()
}
fn default_pool_size() -> u32 {
    10
}
fn default_retry_count() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    100
}
fn default_retry_max_delay_ms() -> u64 {
    2000
}
fn default_operation_timeout_ms() -> u64 {
    5000
}
fn default_attribution_window_minutes() -> i64 {
    30
}
fn default_dedup_window_seconds() -> i64 {
    60
}
fn default_random_code_length() -> usize {
    6
}
fn default_max_generate_attempts() -> u32 {
    5
}
fn default_token_cache_capacity() -> u64 {
    100_000
}
fn default_poll_interval_seconds() -> u64 {
    5
}
fn default_batch_size() -> u64 {
    500
}
fn default_top_n() -> usize {
    10
}
fn default_map_cap() -> usize {
    50
}
fn default_max_query_buckets() -> u64 {
    2000
}
fn default_sweep_interval_seconds() -> u64 {
    120
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "plain".to_string()
}
fn default_true() -> bool {
    true
}
fn default_max_backups() -> u32 {
    7
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = StaticConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.tracking.attribution_window_minutes, 30);
        assert_eq!(config.tracking.max_generate_attempts, 5);
        assert_eq!(config.analytics.top_n, 10);
        assert!(config.database.database_url.starts_with("sqlite://"));
    }

    #[test]
    fn test_generate_sample_config_is_valid_toml() {
        let sample = StaticConfig::generate_sample_config();
        let parsed: std::result::Result<StaticConfig, _> = toml::from_str(&sample);
        assert!(parsed.is_ok());
    }
}

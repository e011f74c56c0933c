//! 配置校验
//!
//! 启动时一次性检查；错误信息直接面向运维。

use url::Url;

use super::StaticConfig;

pub fn validate(config: &StaticConfig) -> Result<(), String> {
    Url::parse(&config.server.public_base_url)
        .map_err(|e| format!("server.public_base_url 非法: {}", e))?;
    Url::parse(&config.server.content_base_url)
        .map_err(|e| format!("server.content_base_url 非法: {}", e))?;

    if !config.server.cors_origin.is_empty() {
        Url::parse(&config.server.cors_origin)
            .map_err(|e| format!("server.cors_origin 非法: {}", e))?;
    }

    if config.database.pool_size == 0 {
        return Err("database.pool_size 必须大于 0".to_string());
    }
    if config.tracking.attribution_window_minutes <= 0 {
        return Err("tracking.attribution_window_minutes 必须大于 0".to_string());
    }
    if config.tracking.random_code_length == 0 || config.tracking.max_generate_attempts == 0 {
        return Err("tracking 码生成参数必须大于 0".to_string());
    }
    if config.analytics.batch_size == 0 || config.analytics.max_query_buckets == 0 {
        return Err("analytics 批大小与查询桶上限必须大于 0".to_string());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&StaticConfig::default()).is_ok());
    }

    #[test]
    fn test_bad_base_url_rejected() {
        let mut config = StaticConfig::default();
        config.server.public_base_url = "not a url".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_window_rejected() {
        let mut config = StaticConfig::default();
        config.tracking.attribution_window_minutes = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_empty_cors_origin_allowed() {
        let mut config = StaticConfig::default();
        config.server.cors_origin = String::new();
        assert!(validate(&config).is_ok());
    }
}

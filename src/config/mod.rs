mod structs;
mod validators;

pub use structs::*;
pub use validators::validate as validate_config;

use once_cell::sync::OnceCell;

static CONFIG: OnceCell<StaticConfig> = OnceCell::new();

/// 初始化全局配置（幂等，首次调用时加载）
pub fn init_config() -> &'static StaticConfig {
    CONFIG.get_or_init(StaticConfig::load)
}

/// 获取全局配置
pub fn get_config() -> &'static StaticConfig {
    CONFIG.get_or_init(StaticConfig::load)
}

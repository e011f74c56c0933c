//! User-Agent 设备分类
//!
//! 调用方未显式提供 device_type 时，从 User-Agent 推导设备类别。

use once_cell::sync::Lazy;
use woothee::parser::Parser;

static PARSER: Lazy<Parser> = Lazy::new(Parser::new);

/// 从 User-Agent 推导设备类别
///
/// 返回 woothee 的 category（pc / smartphone / mobilephone / appliance /
/// crawler 等）；解析失败返回 None，由上游按未知处理。
pub fn classify_user_agent(user_agent: &str) -> Option<String> {
    if user_agent.is_empty() {
        return None;
    }
    PARSER
        .parse(user_agent)
        .map(|result| result.category.to_string())
        .filter(|c| !c.is_empty() && c != "UNKNOWN")
}

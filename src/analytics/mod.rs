//! 点击统计聚合
//!
//! 聚合器作为独立异步消费者，从 append-only 事件日志按游标折叠到
//! 小时桶；同步计数器（current_uses / click_count）不经过这里，
//! 只有分布明细（来源/地理/设备/时间序列）是最终一致的。

pub mod aggregator;
pub mod sweeper;

pub use aggregator::Aggregator;
pub use sweeper::Sweeper;

use std::collections::HashMap;

use chrono::{DateTime, Timelike, Utc};

/// 将时间戳截断到小时桶边界
pub fn truncate_to_hour(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.date_naive()
        .and_hms_opt(ts.hour(), 0, 0)
        .expect("hour from a valid timestamp is always valid")
        .and_utc()
}

/// 解析桶里的 JSON 计数字段；坏数据按空 map 处理
pub fn parse_json_counts(raw: &Option<String>) -> HashMap<String, u64> {
    raw.as_deref()
        .and_then(|s| serde_json::from_str(s).ok())
        .unwrap_or_default()
}

/// 序列化计数 map；空 map 存 NULL
pub fn to_json_counts(map: &HashMap<String, u64>) -> Option<String> {
    if map.is_empty() {
        return None;
    }
    serde_json::to_string(map).ok()
}

/// 把 from 的计数合并进 into
pub fn merge_counts(into: &mut HashMap<String, u64>, from: &HashMap<String, u64>) {
    for (k, v) in from {
        *into.entry(k.clone()).or_insert(0) += v;
    }
}

/// 取 Top-N：按计数降序，计数相同时按键字典序，保证确定性
pub fn top_n(map: &HashMap<String, u64>, n: usize) -> Vec<(String, u64)> {
    let mut items: Vec<_> = map.iter().map(|(k, v)| (k.clone(), *v)).collect();
    items.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    items.truncate(n);
    items
}

/// 把 map 截断到 cap 个键（保留计数最高的，打平规则与 top_n 一致）
pub fn cap_counts(map: &mut HashMap<String, u64>, cap: usize) {
    if map.len() <= cap {
        return;
    }
    let keep: HashMap<String, u64> = top_n(map, cap).into_iter().collect();
    *map = keep;
}

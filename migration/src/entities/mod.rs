pub mod aggregator_cursor;
pub mod promotion_code;
pub mod share_link;
pub mod stats_hourly;
pub mod tracking_event;
pub mod wechat_qrcode;

pub mod qr_service;
pub mod query_service;
pub mod share_service;

pub use qr_service::{QrService, ResolvedScan};
pub use query_service::{
    GeoCount, GroupBy, NamedCount, PromotionCodeView, QueryService, ShareAnalytics, ShareStats,
    TimePoint, TrendInfo,
};
pub use share_service::{CreateShareLinkRequest, ResolvedShare, ShareService};

//! 追踪事件实体（append-only，自增 id 即聚合游标偏移）

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "tracking_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub kind: String,
    pub subject_kind: String,
    pub subject_id: String,
    pub occurred_at: DateTimeUtc,
    #[sea_orm(column_type = "Text", nullable)]
    pub referrer: Option<String>,
    pub device_type: Option<String>,
    pub platform: Option<String>,
    pub country: Option<String>,
    pub city: Option<String>,
    pub session_id: Option<String>,
    pub click_token: Option<String>,
    pub converted_token: Option<String>,
    pub dedup_key: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

//! 小时级主体统计汇总实体

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "stats_hourly")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub subject_kind: String,
    pub subject_id: String,
    pub hour_bucket: DateTimeUtc,
    pub clicks: i64,
    pub conversions: i64,
    #[sea_orm(column_type = "Text", nullable)]
    pub referrer_counts: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub device_counts: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub geo_counts: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub platform_counts: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

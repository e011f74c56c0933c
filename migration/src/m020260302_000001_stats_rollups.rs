//! 统计汇总表迁移
//!
//! - stats_hourly: 小时级主体汇总（计数 + JSON 分布字段）
//! - aggregator_cursor: 聚合消费游标，单行，与汇总写入同事务推进

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(StatsHourly::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StatsHourly::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(StatsHourly::SubjectKind)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StatsHourly::SubjectId)
                            .string_len(36)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StatsHourly::HourBucket)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(StatsHourly::Clicks)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(StatsHourly::Conversions)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(StatsHourly::ReferrerCounts).text().null())
                    .col(ColumnDef::new(StatsHourly::DeviceCounts).text().null())
                    .col(ColumnDef::new(StatsHourly::GeoCounts).text().null())
                    .col(ColumnDef::new(StatsHourly::PlatformCounts).text().null())
                    .to_owned(),
            )
            .await?;

        // 唯一索引：主体 + 桶
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_stats_hourly_subject_bucket")
                    .table(StatsHourly::Table)
                    .col(StatsHourly::SubjectKind)
                    .col(StatsHourly::SubjectId)
                    .col(StatsHourly::HourBucket)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 范围查询索引
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_stats_hourly_bucket")
                    .table(StatsHourly::Table)
                    .col(StatsHourly::HourBucket)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(AggregatorCursor::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(AggregatorCursor::Id)
                            .integer()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(AggregatorCursor::LastEventId)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(AggregatorCursor::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(AggregatorCursor::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(StatsHourly::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum StatsHourly {
    #[sea_orm(iden = "stats_hourly")]
    Table,
    Id,
    SubjectKind,
    SubjectId,
    HourBucket,
    Clicks,
    Conversions,
    ReferrerCounts,
    DeviceCounts,
    GeoCounts,
    PlatformCounts,
}

#[derive(DeriveIden)]
enum AggregatorCursor {
    #[sea_orm(iden = "aggregator_cursor")]
    Table,
    Id,
    LastEventId,
    UpdatedAt,
}

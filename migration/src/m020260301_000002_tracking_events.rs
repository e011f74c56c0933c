//! 追踪事件表迁移
//!
//! tracking_events 是 append-only 的事件日志，自增主键同时充当
//! 聚合消费游标的偏移量。三个 UNIQUE 索引分别保证：
//! - click_token: 已发放令牌全局唯一
//! - converted_token: 同一令牌的转化最多记录一次
//! - dedup_key: 点击/扫码重放幂等

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(TrackingEvent::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(TrackingEvent::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(TrackingEvent::Kind)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TrackingEvent::SubjectKind)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TrackingEvent::SubjectId)
                            .string_len(36)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(TrackingEvent::OccurredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(TrackingEvent::Referrer).text().null())
                    .col(
                        ColumnDef::new(TrackingEvent::DeviceType)
                            .string_len(32)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TrackingEvent::Platform)
                            .string_len(32)
                            .null(),
                    )
                    .col(ColumnDef::new(TrackingEvent::Country).string_len(64).null())
                    .col(ColumnDef::new(TrackingEvent::City).string_len(64).null())
                    .col(
                        ColumnDef::new(TrackingEvent::SessionId)
                            .string_len(64)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TrackingEvent::ClickToken)
                            .string_len(36)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TrackingEvent::ConvertedToken)
                            .string_len(36)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(TrackingEvent::DedupKey)
                            .string_len(128)
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_event_click_token")
                    .table(TrackingEvent::Table)
                    .col(TrackingEvent::ClickToken)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_event_converted_token")
                    .table(TrackingEvent::Table)
                    .col(TrackingEvent::ConvertedToken)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_event_dedup_key")
                    .table(TrackingEvent::Table)
                    .col(TrackingEvent::DedupKey)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 主体 + 时间范围查询索引
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_event_subject_time")
                    .table(TrackingEvent::Table)
                    .col(TrackingEvent::SubjectKind)
                    .col(TrackingEvent::SubjectId)
                    .col(TrackingEvent::OccurredAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(TrackingEvent::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum TrackingEvent {
    #[sea_orm(iden = "tracking_events")]
    Table,
    Id,
    Kind,
    SubjectKind,
    SubjectId,
    OccurredAt,
    Referrer,
    DeviceType,
    Platform,
    Country,
    City,
    SessionId,
    ClickToken,
    ConvertedToken,
    DedupKey,
}

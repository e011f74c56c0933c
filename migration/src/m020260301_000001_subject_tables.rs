use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // 创建 promotion_codes 表
        manager
            .create_table(
                Table::create()
                    .table(PromotionCode::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PromotionCode::Id)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PromotionCode::Code)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PromotionCode::ArticleId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PromotionCode::CodeType)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PromotionCode::Platform)
                            .string_len(32)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PromotionCode::IsCustom)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(PromotionCode::MaxUses).big_integer().null())
                    .col(
                        ColumnDef::new(PromotionCode::CurrentUses)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(PromotionCode::ExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PromotionCode::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(PromotionCode::IsDeleted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(PromotionCode::CreatedBy)
                            .string_len(64)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(PromotionCode::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // code 全局唯一（写入前统一大写，保证大小写不敏感唯一性）
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_promo_code_unique")
                    .table(PromotionCode::Table)
                    .col(PromotionCode::Code)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_promo_article")
                    .table(PromotionCode::Table)
                    .col(PromotionCode::ArticleId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_promo_expires_at")
                    .table(PromotionCode::Table)
                    .col(PromotionCode::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        // 创建 share_links 表
        manager
            .create_table(
                Table::create()
                    .table(ShareLink::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ShareLink::Id)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ShareLink::ArticleId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ShareLink::Platform)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(ColumnDef::new(ShareLink::Title).text().not_null())
                    .col(ColumnDef::new(ShareLink::Description).text().null())
                    .col(
                        ColumnDef::new(ShareLink::PromotionCodeId)
                            .string_len(36)
                            .null(),
                    )
                    .col(ColumnDef::new(ShareLink::ShareUrl).text().not_null())
                    .col(
                        ColumnDef::new(ShareLink::ClickCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ShareLink::ConversionCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ShareLink::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(ShareLink::IsDeleted)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(ShareLink::CreatedBy).string_len(64).null())
                    .col(
                        ColumnDef::new(ShareLink::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_share_link_article")
                    .table(ShareLink::Table)
                    .col(ShareLink::ArticleId)
                    .to_owned(),
            )
            .await?;

        // 创建 wechat_qrcodes 表
        manager
            .create_table(
                Table::create()
                    .table(WechatQrcode::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(WechatQrcode::Id)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(WechatQrcode::ArticleId)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WechatQrcode::QrType)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WechatQrcode::SceneStr)
                            .string_len(64)
                            .not_null(),
                    )
                    .col(ColumnDef::new(WechatQrcode::QrCodeUrl).text().not_null())
                    .col(
                        ColumnDef::new(WechatQrcode::ScanCount)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(WechatQrcode::Status)
                            .string_len(16)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(WechatQrcode::ExpireTime)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(WechatQrcode::CreatedBy)
                            .string_len(64)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(WechatQrcode::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // scene_str 是扫码归因键，必须唯一
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_qrcode_scene_unique")
                    .table(WechatQrcode::Table)
                    .col(WechatQrcode::SceneStr)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // 过期扫描索引（sweep 用）
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_qrcode_expire_time")
                    .table(WechatQrcode::Table)
                    .col(WechatQrcode::ExpireTime)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(WechatQrcode::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ShareLink::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PromotionCode::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PromotionCode {
    #[sea_orm(iden = "promotion_codes")]
    Table,
    Id,
    Code,
    ArticleId,
    CodeType,
    Platform,
    IsCustom,
    MaxUses,
    CurrentUses,
    ExpiresAt,
    IsActive,
    IsDeleted,
    CreatedBy,
    CreatedAt,
}

#[derive(DeriveIden)]
enum ShareLink {
    #[sea_orm(iden = "share_links")]
    Table,
    Id,
    ArticleId,
    Platform,
    Title,
    Description,
    PromotionCodeId,
    ShareUrl,
    ClickCount,
    ConversionCount,
    IsActive,
    IsDeleted,
    CreatedBy,
    CreatedAt,
}

#[derive(DeriveIden)]
enum WechatQrcode {
    #[sea_orm(iden = "wechat_qrcodes")]
    Table,
    Id,
    ArticleId,
    QrType,
    SceneStr,
    QrCodeUrl,
    ScanCount,
    Status,
    ExpireTime,
    CreatedBy,
    CreatedAt,
}

use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "promotion_codes")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub code: String,
    pub article_id: String,
    pub code_type: String,
    pub platform: Option<String>,
    pub is_custom: bool,
    pub max_uses: Option<i64>,
    pub current_uses: i64,
    pub expires_at: Option<DateTimeUtc>,
    pub is_active: bool,
    pub is_deleted: bool,
    pub created_by: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

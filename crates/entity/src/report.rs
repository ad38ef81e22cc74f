use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Eq)]
#[sea_orm(table_name = "report")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub target: Target,
    #[sea_orm(indexed)]
    pub target_id: Uuid,
    #[sea_orm(indexed)]
    pub reporter_id: Uuid,
    pub reason: Option<String>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::app_user::Entity",
        from = "Column::ReporterId",
        to = "super::app_user::Column::Id",
        on_delete = "Cascade"
    )]
    Reporter,
}

impl Related<super::app_user::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reporter.def()
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveActiveEnum, Eq, PartialEq)]
#[sea_orm(rs_type = "String", db_type = "String(Some(16))")]
pub enum Target {
    #[sea_orm(string_value = "POST")]
    Post,
    #[sea_orm(string_value = "COMMENT")]
    Comment,
}

impl ActiveModelBehavior for ActiveModel {}

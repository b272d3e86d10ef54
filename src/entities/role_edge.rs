use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "role_edges")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    /// Raw user id, or a tagged role (`role:<name>`)
    pub source: String,
    /// Always a tagged role
    pub target: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

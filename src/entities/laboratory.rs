use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Top of the containment hierarchy: a laboratory owning storage units.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "laboratories")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub code: String,
    pub name: String,
    pub location: String,
    pub description: String,
    /// 1 (open) through 5 (most restricted)
    pub security_level: i32,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::storage::Entity")]
    Storages,
}

impl Related<super::storage::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Storages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

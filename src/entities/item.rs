use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A stocked item held in a section.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub code: String,
    pub name: String,
    pub description: String,
    pub category: String,
    pub properties: Option<Json>,
    pub price: f64,
    /// Current on-hand count, never negative
    pub quantity: i32,
    /// Low-stock threshold
    pub min_quantity: i32,
    pub unit: String,
    pub supplier: String,
    pub purchase_date: Option<Date>,
    pub expiry_date: Option<Date>,
    #[sea_orm(indexed)]
    pub section_id: i32,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

impl Model {
    pub fn is_low_stock(&self) -> bool {
        self.quantity <= self.min_quantity
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::section::Entity",
        from = "Column::SectionId",
        to = "super::section::Column::Id"
    )]
    Section,
}

impl Related<super::section::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Section.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

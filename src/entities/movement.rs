use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MovementType {
    #[sea_orm(string_value = "in")]
    In,
    #[sea_orm(string_value = "out")]
    Out,
    #[sea_orm(string_value = "transfer")]
    Transfer,
    #[sea_orm(string_value = "stocktake")]
    Stocktake,
    #[sea_orm(string_value = "damaged")]
    Damaged,
    #[sea_orm(string_value = "scrapped")]
    Scrapped,
}

/// Immutable ledger row recording a quantity and/or location change of an item.
///
/// `quantity` is the magnitude moved; the direction comes from `movement_type`.
/// Locations are free-text descriptors. The row has no foreign key to
/// `items`; it outlives the item it describes.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "movements")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(indexed)]
    pub item_id: i32,
    pub movement_type: MovementType,
    pub from_location: String,
    pub to_location: String,
    pub quantity: i32,
    pub reason: String,
    pub notes: String,
    pub user_id: i32,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

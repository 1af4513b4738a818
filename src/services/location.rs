//! Human-readable location paths across the containment hierarchy.

use crate::entities::{item, laboratory, section, storage};
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

const SEPARATOR: &str = " → ";
pub const UNSET_PATH: &str = "unset";
pub const UNKNOWN_STORAGE: &str = "unknown-storage";
pub const UNKNOWN_LAB: &str = "unknown-lab";

/// Where an item sits, rendered for display.
///
/// The six code/name fields are filled independently; any of them is empty
/// when its ancestor could not be loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationPath {
    pub lab_code: String,
    pub lab_name: String,
    pub storage_code: String,
    pub storage_name: String,
    pub section_code: String,
    pub section_name: String,
    pub full_path: String,
}

/// The ancestors of one item, each possibly missing.
#[derive(Debug, Clone, Default)]
pub struct Ancestry {
    pub section: Option<section::Model>,
    pub storage: Option<storage::Model>,
    pub laboratory: Option<laboratory::Model>,
}

impl Ancestry {
    pub fn resolve(&self) -> LocationPath {
        resolve_location_path(
            self.section.as_ref(),
            self.storage.as_ref(),
            self.laboratory.as_ref(),
        )
    }
}

/// Never fails; degrades to placeholder segments when ancestors are absent.
pub fn resolve_location_path(
    section: Option<&section::Model>,
    storage: Option<&storage::Model>,
    laboratory: Option<&laboratory::Model>,
) -> LocationPath {
    let mut path = LocationPath::default();

    if let Some(lab) = laboratory {
        path.lab_code = lab.code.clone();
        path.lab_name = lab.name.clone();
    }
    if let Some(storage) = storage {
        path.storage_code = storage.code.clone();
        path.storage_name = storage.name.clone();
    }
    if let Some(section) = section {
        path.section_code = section.code.clone();
        path.section_name = section.name.clone();
    }

    path.full_path = match (section, storage, laboratory) {
        (None, _, _) => UNSET_PATH.to_string(),
        (Some(section), None, _) => [UNKNOWN_STORAGE, section.name.as_str()].join(SEPARATOR),
        (Some(section), Some(storage), None) => {
            [UNKNOWN_LAB, storage.name.as_str(), section.name.as_str()].join(SEPARATOR)
        }
        (Some(section), Some(storage), Some(lab)) => {
            [lab.name.as_str(), storage.name.as_str(), section.name.as_str()].join(SEPARATOR)
        }
    };

    path
}

/// Walks section → storage → laboratory for a single item.
pub async fn load_ancestry<C: ConnectionTrait>(
    db: &C,
    item: &item::Model,
) -> Result<Ancestry, DbErr> {
    let section = section::Entity::find_by_id(item.section_id).one(db).await?;

    let storage = match &section {
        Some(section) => storage::Entity::find_by_id(section.storage_id).one(db).await?,
        None => None,
    };

    let laboratory = match &storage {
        Some(storage) => laboratory::Entity::find_by_id(storage.lab_id).one(db).await?,
        None => None,
    };

    Ok(Ancestry {
        section,
        storage,
        laboratory,
    })
}

pub async fn resolve_for_item<C: ConnectionTrait>(
    db: &C,
    item: &item::Model,
) -> Result<LocationPath, DbErr> {
    Ok(load_ancestry(db, item).await?.resolve())
}

/// Resolves paths for many items with one query per hierarchy level.
/// The result is keyed by item id.
pub async fn resolve_for_items<C: ConnectionTrait>(
    db: &C,
    items: &[item::Model],
) -> Result<HashMap<i32, LocationPath>, DbErr> {
    let section_ids: HashSet<i32> = items.iter().map(|i| i.section_id).collect();
    let sections: HashMap<i32, section::Model> = section::Entity::find()
        .filter(section::Column::Id.is_in(section_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();

    let storage_ids: HashSet<i32> = sections.values().map(|s| s.storage_id).collect();
    let storages: HashMap<i32, storage::Model> = storage::Entity::find()
        .filter(storage::Column::Id.is_in(storage_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|s| (s.id, s))
        .collect();

    let lab_ids: HashSet<i32> = storages.values().map(|s| s.lab_id).collect();
    let labs: HashMap<i32, laboratory::Model> = laboratory::Entity::find()
        .filter(laboratory::Column::Id.is_in(lab_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|l| (l.id, l))
        .collect();

    Ok(items
        .iter()
        .map(|item| {
            let section = sections.get(&item.section_id);
            let storage = section.and_then(|s| storages.get(&s.storage_id));
            let lab = storage.and_then(|s| labs.get(&s.lab_id));
            (item.id, resolve_location_path(section, storage, lab))
        })
        .collect())
}

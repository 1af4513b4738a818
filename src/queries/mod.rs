//! Read-side listings, one module per entity.
//!
//! Each module pairs the entity's search/sort allow-list ([`Listable`]) with a
//! filter struct and `Query` implementations the services execute.
//!
//! [`Listable`]: crate::db::query_builder::Listable

pub mod item_queries;
pub mod laboratory_queries;
pub mod movement_queries;
pub mod section_queries;
pub mod storage_queries;

use crate::errors::ServiceError;
use async_trait::async_trait;
use sea_orm::DatabaseConnection;

#[async_trait]
pub trait Query: Send + Sync {
    type Result: Send + Sync;

    async fn execute(&self, db_pool: &DatabaseConnection) -> Result<Self::Result, ServiceError>;
}

/// Parses an optional enum-valued filter, rejecting unknown values.
pub(crate) fn parse_filter<T>(field: &str, value: Option<&str>) -> Result<Option<T>, ServiceError>
where
    T: std::str::FromStr,
{
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|_| {
            ServiceError::ValidationError(format!("unknown {} '{}'", field, raw))
        }),
    }
}

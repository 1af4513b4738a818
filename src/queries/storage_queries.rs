use crate::db::query_builder::{Listable, Page, PageLimits, PageRequest, QueryPlan};
use crate::entities::storage::{self, Entity as Storage, StorageStatus};
use crate::errors::ServiceError;
use crate::queries::{parse_filter, Query};
use async_trait::async_trait;
use sea_orm::{ColumnTrait, Condition, DatabaseConnection};
use serde::{Deserialize, Serialize};

impl Listable for Storage {
    fn search_columns() -> Vec<storage::Column> {
        vec![
            storage::Column::Name,
            storage::Column::Code,
            storage::Column::StorageType,
            storage::Column::Location,
            storage::Column::Description,
        ]
    }

    fn sort_column(key: &str) -> Option<storage::Column> {
        match key {
            "name" => Some(storage::Column::Name),
            "code" => Some(storage::Column::Code),
            "type" => Some(storage::Column::StorageType),
            "status" => Some(storage::Column::Status),
            "capacity" => Some(storage::Column::Capacity),
            "security_level" => Some(storage::Column::SecurityLevel),
            "created_at" => Some(storage::Column::CreatedAt),
            "updated_at" => Some(storage::Column::UpdatedAt),
            _ => None,
        }
    }

    fn created_at_column() -> storage::Column {
        storage::Column::CreatedAt
    }

    fn id_column() -> storage::Column {
        storage::Column::Id
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageFilter {
    pub lab_id: Option<i32>,
    pub storage_type: Option<String>,
    pub status: Option<String>,
    pub security_level: Option<i32>,
}

impl StorageFilter {
    /// Fails with `ValidationError` on an unrecognized status.
    pub fn condition(&self) -> Result<Condition, ServiceError> {
        let status: Option<StorageStatus> = parse_filter("storage status", self.status.as_deref())?;

        Ok(Condition::all()
            .add_option(self.lab_id.map(|id| storage::Column::LabId.eq(id)))
            .add_option(
                self.storage_type
                    .as_deref()
                    .filter(|t| !t.is_empty())
                    .map(|t| storage::Column::StorageType.eq(t)),
            )
            .add_option(status.map(|s| storage::Column::Status.eq(s)))
            .add_option(
                self.security_level
                    .map(|level| storage::Column::SecurityLevel.eq(level)),
            ))
    }
}

#[derive(Debug, Clone)]
pub struct ListStoragesQuery {
    pub filter: StorageFilter,
    pub request: PageRequest,
    pub limits: PageLimits,
}

#[async_trait]
impl Query for ListStoragesQuery {
    type Result = Page<storage::Model>;

    async fn execute(&self, db_pool: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        QueryPlan::<Storage>::build(self.filter.condition()?, &self.request, &self.limits)
            .fetch(db_pool)
            .await
            .map_err(ServiceError::db_error)
    }
}

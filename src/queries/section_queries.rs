use crate::db::query_builder::{Listable, Page, PageLimits, PageRequest, QueryPlan};
use crate::entities::section::{self, Entity as Section, SectionStatus};
use crate::entities::storage;
use crate::errors::ServiceError;
use crate::queries::{parse_filter, Query};
use async_trait::async_trait;
use sea_orm::sea_query::{self, Expr, SimpleExpr};
use sea_orm::{ColumnTrait, Condition, DatabaseConnection};
use serde::{Deserialize, Serialize};

impl Listable for Section {
    fn search_columns() -> Vec<section::Column> {
        vec![
            section::Column::Name,
            section::Column::Code,
            section::Column::Position,
            section::Column::Description,
        ]
    }

    fn sort_column(key: &str) -> Option<section::Column> {
        match key {
            "name" => Some(section::Column::Name),
            "code" => Some(section::Column::Code),
            "position" => Some(section::Column::Position),
            "status" => Some(section::Column::Status),
            "capacity" => Some(section::Column::Capacity),
            "used_capacity" => Some(section::Column::UsedCapacity),
            "security_level" => Some(section::Column::SecurityLevel),
            "created_at" => Some(section::Column::CreatedAt),
            "updated_at" => Some(section::Column::UpdatedAt),
            _ => None,
        }
    }

    fn created_at_column() -> section::Column {
        section::Column::CreatedAt
    }

    fn id_column() -> section::Column {
        section::Column::Id
    }
}

/// Utilization band of a section, `used_capacity` relative to `capacity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CapacityBucket {
    /// used >= capacity
    Full,
    /// used >= 80% of capacity
    High,
    /// used < 30% of capacity
    Low,
}

impl CapacityBucket {
    fn condition(self) -> SimpleExpr {
        let used = Expr::col((section::Entity, section::Column::UsedCapacity));
        let capacity = Expr::col((section::Entity, section::Column::Capacity));
        match self {
            CapacityBucket::Full => used.gte(capacity),
            CapacityBucket::High => used.gte(capacity.mul(0.8)),
            CapacityBucket::Low => used.lt(capacity.mul(0.3)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SectionFilter {
    pub storage_id: Option<i32>,
    /// Sections of any storage belonging to this laboratory
    pub lab_id: Option<i32>,
    pub status: Option<String>,
    pub security_level: Option<i32>,
    pub capacity: Option<String>,
}

impl SectionFilter {
    pub fn condition(&self) -> Result<Condition, ServiceError> {
        let status: Option<SectionStatus> = parse_filter("section status", self.status.as_deref())?;
        let bucket: Option<CapacityBucket> =
            parse_filter("capacity bucket", self.capacity.as_deref())?;

        let in_lab = self.lab_id.map(|lab_id| {
            section::Column::StorageId.in_subquery(
                sea_query::Query::select()
                    .column(storage::Column::Id)
                    .from(storage::Entity)
                    .and_where(storage::Column::LabId.eq(lab_id))
                    .to_owned(),
            )
        });

        Ok(Condition::all()
            .add_option(self.storage_id.map(|id| section::Column::StorageId.eq(id)))
            .add_option(in_lab)
            .add_option(status.map(|s| section::Column::Status.eq(s)))
            .add_option(
                self.security_level
                    .map(|level| section::Column::SecurityLevel.eq(level)),
            )
            .add_option(bucket.map(CapacityBucket::condition)))
    }
}

#[derive(Debug, Clone)]
pub struct ListSectionsQuery {
    pub filter: SectionFilter,
    pub request: PageRequest,
    pub limits: PageLimits,
}

#[async_trait]
impl Query for ListSectionsQuery {
    type Result = Page<section::Model>;

    async fn execute(&self, db_pool: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        QueryPlan::<Section>::build(self.filter.condition()?, &self.request, &self.limits)
            .fetch(db_pool)
            .await
            .map_err(ServiceError::db_error)
    }
}

use crate::db::query_builder::{Listable, Page, PageLimits, PageRequest, QueryPlan};
use crate::entities::laboratory::{self, Entity as Laboratory};
use crate::errors::ServiceError;
use crate::queries::Query;
use async_trait::async_trait;
use sea_orm::{ColumnTrait, Condition, DatabaseConnection};
use serde::{Deserialize, Serialize};

impl Listable for Laboratory {
    fn search_columns() -> Vec<laboratory::Column> {
        vec![
            laboratory::Column::Name,
            laboratory::Column::Code,
            laboratory::Column::Location,
            laboratory::Column::Description,
        ]
    }

    fn sort_column(key: &str) -> Option<laboratory::Column> {
        match key {
            "name" => Some(laboratory::Column::Name),
            "code" => Some(laboratory::Column::Code),
            "location" => Some(laboratory::Column::Location),
            "security_level" => Some(laboratory::Column::SecurityLevel),
            "created_at" => Some(laboratory::Column::CreatedAt),
            "updated_at" => Some(laboratory::Column::UpdatedAt),
            _ => None,
        }
    }

    fn created_at_column() -> laboratory::Column {
        laboratory::Column::CreatedAt
    }

    fn id_column() -> laboratory::Column {
        laboratory::Column::Id
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LaboratoryFilter {
    pub security_level: Option<i32>,
}

impl LaboratoryFilter {
    pub fn condition(&self) -> Condition {
        Condition::all().add_option(
            self.security_level
                .map(|level| laboratory::Column::SecurityLevel.eq(level)),
        )
    }
}

#[derive(Debug, Clone)]
pub struct ListLaboratoriesQuery {
    pub filter: LaboratoryFilter,
    pub request: PageRequest,
    pub limits: PageLimits,
}

#[async_trait]
impl Query for ListLaboratoriesQuery {
    type Result = Page<laboratory::Model>;

    async fn execute(&self, db_pool: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        QueryPlan::<Laboratory>::build(self.filter.condition(), &self.request, &self.limits)
            .fetch(db_pool)
            .await
            .map_err(ServiceError::db_error)
    }
}

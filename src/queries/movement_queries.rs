use crate::db::query_builder::{
    search_condition, Listable, Page, PageLimits, PageRequest, QueryPlan,
};
use crate::entities::item;
use crate::entities::movement::{self, Entity as Movement, MovementType};
use crate::errors::ServiceError;
use crate::queries::{parse_filter, Query};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use sea_orm::sea_query;
use sea_orm::{ColumnTrait, Condition, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};

/// Movements always list newest first; no caller-selectable sort.
impl Listable for Movement {
    fn search_columns() -> Vec<movement::Column> {
        Vec::new()
    }

    fn sort_column(_key: &str) -> Option<movement::Column> {
        None
    }

    fn created_at_column() -> movement::Column {
        movement::Column::CreatedAt
    }

    fn id_column() -> movement::Column {
        movement::Column::Id
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MovementFilter {
    pub item_id: Option<i32>,
    pub user_id: Option<i32>,
    pub movement_type: Option<String>,
    pub start_date: Option<NaiveDate>,
    /// Inclusive: the whole end day is covered
    pub end_date: Option<NaiveDate>,
}

impl MovementFilter {
    /// `search` matches the moved item's name.
    pub fn condition(&self, search: Option<&str>) -> Result<Condition, ServiceError> {
        let movement_type: Option<MovementType> =
            parse_filter("movement type", self.movement_type.as_deref())?;

        let item_search = search
            .and_then(|term| search_condition(&[item::Column::Name], term))
            .map(|matching| {
                movement::Column::ItemId.in_subquery(
                    sea_query::Query::select()
                        .column(item::Column::Id)
                        .from(item::Entity)
                        .cond_where(matching)
                        .to_owned(),
                )
            });

        Ok(Condition::all()
            .add_option(self.item_id.map(|id| movement::Column::ItemId.eq(id)))
            .add_option(self.user_id.map(|id| movement::Column::UserId.eq(id)))
            .add_option(movement_type.map(|t| movement::Column::MovementType.eq(t)))
            .add_option(
                self.start_date
                    .map(|d| movement::Column::CreatedAt.gte(start_of_day(d))),
            )
            .add_option(
                self.end_date
                    .and_then(|d| d.succ_opt())
                    .map(|next| movement::Column::CreatedAt.lt(start_of_day(next))),
            )
            .add_option(item_search))
    }
}

#[derive(Debug, Clone)]
pub struct ListMovementsQuery {
    pub filter: MovementFilter,
    pub request: PageRequest,
    pub limits: PageLimits,
}

#[async_trait]
impl Query for ListMovementsQuery {
    type Result = Page<movement::Model>;

    async fn execute(&self, db_pool: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        let condition = self.filter.condition(self.request.search.as_deref())?;
        QueryPlan::<Movement>::build(condition, &self.request, &self.limits)
            .fetch(db_pool)
            .await
            .map_err(ServiceError::db_error)
    }
}

/// Every movement matching the filter, newest first, without paging.
#[derive(Debug, Clone, Default)]
pub struct ExportMovementsQuery {
    pub filter: MovementFilter,
    pub search: Option<String>,
}

#[async_trait]
impl Query for ExportMovementsQuery {
    type Result = Vec<movement::Model>;

    async fn execute(&self, db_pool: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        Movement::find()
            .filter(self.filter.condition(self.search.as_deref())?)
            .order_by_desc(movement::Column::CreatedAt)
            .order_by_desc(movement::Column::Id)
            .all(db_pool)
            .await
            .map_err(ServiceError::db_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use sea_orm::{DbBackend, QueryTrait};

    #[test]
    fn end_date_covers_whole_day() {
        let filter = MovementFilter {
            end_date: NaiveDate::from_ymd_opt(2024, 5, 31),
            ..Default::default()
        };
        let stmt = Movement::find()
            .filter(filter.condition(None).unwrap())
            .build(DbBackend::Sqlite);
        assert!(stmt.sql.contains("\"movements\".\"created_at\" < ?"));
        let values = stmt.values.expect("bound values").0;
        assert!(values.contains(&start_of_day(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()).into()));
    }

    #[test]
    fn item_name_search_uses_subquery() {
        let stmt = Movement::find()
            .filter(MovementFilter::default().condition(Some("ethanol")).unwrap())
            .build(DbBackend::Sqlite);
        assert!(stmt.sql.contains("\"item_id\" IN (SELECT \"id\" FROM \"items\""));
    }

    #[test]
    fn unknown_movement_type_is_rejected() {
        let filter = MovementFilter {
            movement_type: Some("teleport".into()),
            ..Default::default()
        };
        assert_matches!(filter.condition(None), Err(ServiceError::ValidationError(_)));
    }

    #[test]
    fn listing_ignores_caller_sort() {
        let request = PageRequest::new(1, 20).sort("quantity", false);
        let plan = QueryPlan::<Movement>::build(Condition::all(), &request, &PageLimits::default());
        assert_eq!(plan.sort_key(), "created_at");
        assert!(plan.is_descending());
    }
}

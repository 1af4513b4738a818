use crate::db::query_builder::{Listable, Page, PageLimits, PageRequest, QueryPlan};
use crate::entities::item::{self, Entity as Item};
use crate::errors::ServiceError;
use crate::queries::Query;
use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use sea_orm::sea_query::{Expr, SimpleExpr};
use sea_orm::{
    ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, QuerySelect,
};
use serde::{Deserialize, Serialize};

/// Longest look-ahead honoured for expiry filters.
const MAX_EXPIRY_WINDOW_DAYS: i64 = 36_500;

impl Listable for Item {
    fn search_columns() -> Vec<item::Column> {
        vec![
            item::Column::Name,
            item::Column::Code,
            item::Column::Description,
            item::Column::Category,
        ]
    }

    fn sort_column(key: &str) -> Option<item::Column> {
        match key {
            "name" => Some(item::Column::Name),
            "code" => Some(item::Column::Code),
            "category" => Some(item::Column::Category),
            "quantity" => Some(item::Column::Quantity),
            "price" => Some(item::Column::Price),
            "created_at" => Some(item::Column::CreatedAt),
            "updated_at" => Some(item::Column::UpdatedAt),
            _ => None,
        }
    }

    fn created_at_column() -> item::Column {
        item::Column::CreatedAt
    }

    fn id_column() -> item::Column {
        item::Column::Id
    }
}

/// `quantity <= min_quantity`
pub fn low_stock_condition() -> SimpleExpr {
    Expr::col((item::Entity, item::Column::Quantity))
        .lte(Expr::col((item::Entity, item::Column::MinQuantity)))
}

/// Last expiry date that still counts as "expiring within `days`" of `today`.
/// Non-positive or missing windows fall back to `default_days`.
pub fn expiry_cutoff(today: NaiveDate, days: Option<i64>, default_days: i64) -> NaiveDate {
    let days = days
        .filter(|d| *d > 0)
        .unwrap_or(default_days)
        .clamp(0, MAX_EXPIRY_WINDOW_DAYS);
    today
        .checked_add_signed(Duration::days(days))
        .unwrap_or(NaiveDate::MAX)
}

/// `expiry_date IS NOT NULL AND expiry_date <= cutoff`
pub fn expiring_condition(cutoff: NaiveDate) -> Condition {
    Condition::all()
        .add(item::Column::ExpiryDate.is_not_null())
        .add(item::Column::ExpiryDate.lte(cutoff))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemFilter {
    pub section_id: Option<i32>,
    pub category: Option<String>,
    #[serde(default)]
    pub low_stock: bool,
    /// Only items expiring within this many days; non-positive means the default window
    pub expiring_within_days: Option<i64>,
}

impl ItemFilter {
    pub fn condition(&self, today: NaiveDate, default_expiry_days: i64) -> Condition {
        Condition::all()
            .add_option(self.section_id.map(|id| item::Column::SectionId.eq(id)))
            .add_option(
                self.category
                    .as_deref()
                    .filter(|c| !c.is_empty())
                    .map(|c| item::Column::Category.eq(c)),
            )
            .add_option(self.low_stock.then(low_stock_condition))
            .add_option(self.expiring_within_days.map(|days| {
                expiring_condition(expiry_cutoff(today, Some(days), default_expiry_days))
            }))
    }
}

#[derive(Debug, Clone)]
pub struct ListItemsQuery {
    pub filter: ItemFilter,
    pub request: PageRequest,
    pub limits: PageLimits,
    pub today: NaiveDate,
    pub default_expiry_days: i64,
}

#[async_trait]
impl Query for ListItemsQuery {
    type Result = Page<item::Model>;

    async fn execute(&self, db_pool: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        let condition = self.filter.condition(self.today, self.default_expiry_days);
        QueryPlan::<Item>::build(condition, &self.request, &self.limits)
            .fetch(db_pool)
            .await
            .map_err(ServiceError::db_error)
    }
}

/// Distinct non-empty categories, alphabetical.
#[derive(Debug, Clone, Default)]
pub struct ItemCategoriesQuery;

#[async_trait]
impl Query for ItemCategoriesQuery {
    type Result = Vec<String>;

    async fn execute(&self, db_pool: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        Item::find()
            .select_only()
            .column(item::Column::Category)
            .distinct()
            .filter(item::Column::Category.ne(""))
            .order_by_asc(item::Column::Category)
            .into_tuple::<String>()
            .all(db_pool)
            .await
            .map_err(ServiceError::db_error)
    }
}

/// Every item at or below its minimum quantity, emptiest first.
#[derive(Debug, Clone, Default)]
pub struct LowStockItemsQuery;

#[async_trait]
impl Query for LowStockItemsQuery {
    type Result = Vec<item::Model>;

    async fn execute(&self, db_pool: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        Item::find()
            .filter(low_stock_condition())
            .order_by_asc(item::Column::Quantity)
            .order_by_asc(item::Column::Id)
            .all(db_pool)
            .await
            .map_err(ServiceError::db_error)
    }
}

/// Items whose expiry date falls on or before `cutoff`, soonest first.
#[derive(Debug, Clone)]
pub struct ExpiringItemsQuery {
    pub cutoff: NaiveDate,
}

#[async_trait]
impl Query for ExpiringItemsQuery {
    type Result = Vec<item::Model>;

    async fn execute(&self, db_pool: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        Item::find()
            .filter(expiring_condition(self.cutoff))
            .order_by_asc(item::Column::ExpiryDate)
            .order_by_asc(item::Column::Id)
            .all(db_pool)
            .await
            .map_err(ServiceError::db_error)
    }
}

#[derive(Debug, Clone)]
pub struct ItemCodeExistsQuery {
    pub code: String,
}

#[async_trait]
impl Query for ItemCodeExistsQuery {
    type Result = bool;

    async fn execute(&self, db_pool: &DatabaseConnection) -> Result<Self::Result, ServiceError> {
        let count = Item::find()
            .filter(item::Column::Code.eq(self.code.as_str()))
            .count(db_pool)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::query_builder::PageLimits;
    use sea_orm::{DbBackend, QueryTrait, Value};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[test]
    fn expiry_cutoff_falls_back_to_default_window() {
        assert_eq!(
            expiry_cutoff(today(), Some(0), 30),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap()
        );
        assert_eq!(
            expiry_cutoff(today(), Some(-5), 30),
            NaiveDate::from_ymd_opt(2024, 3, 31).unwrap()
        );
        assert_eq!(
            expiry_cutoff(today(), Some(7), 30),
            NaiveDate::from_ymd_opt(2024, 3, 8).unwrap()
        );
        assert_eq!(
            expiry_cutoff(today(), None, 10),
            NaiveDate::from_ymd_opt(2024, 3, 11).unwrap()
        );
    }

    #[test]
    fn injected_sort_key_falls_back_to_created_at_desc() {
        let request = PageRequest::new(1, 10).sort("; DROP TABLE items", false);
        let plan = QueryPlan::<Item>::build(Condition::all(), &request, &PageLimits::default());

        assert_eq!(plan.sort_key(), "created_at");
        assert!(plan.is_descending());

        let sql = plan.select().build(DbBackend::Sqlite).to_string();
        assert!(!sql.contains("DROP"));
        assert!(sql.contains("ORDER BY \"items\".\"created_at\" DESC"));
    }

    #[test]
    fn allowed_sort_key_honours_direction() {
        let request = PageRequest::new(1, 10).sort("quantity", false);
        let plan = QueryPlan::<Item>::build(Condition::all(), &request, &PageLimits::default());
        assert_eq!(plan.sort_key(), "quantity");
        assert!(!plan.is_descending());

        let request = PageRequest::new(1, 10).sort("price", true);
        let plan = QueryPlan::<Item>::build(Condition::all(), &request, &PageLimits::default());
        assert_eq!(plan.sort_key(), "price");
        assert!(plan.is_descending());
    }

    #[test]
    fn search_term_is_bound_as_escaped_pattern() {
        let request = PageRequest::new(1, 10).search("50%_Off");
        let plan = QueryPlan::<Item>::build(Condition::all(), &request, &PageLimits::default());
        let stmt = plan.select().build(DbBackend::Sqlite);

        let values = stmt.values.expect("bound values").0;
        assert!(values.contains(&Value::from("%50\\%\\_Off%".to_string())));
        assert!(stmt.sql.contains("LOWER(\"name\") LIKE LOWER(?)"));
        assert!(stmt.sql.contains(" OR "));
    }

    #[test]
    fn item_filter_combines_with_and() {
        let filter = ItemFilter {
            section_id: Some(4),
            low_stock: true,
            ..Default::default()
        };
        let sql = Item::find()
            .filter(filter.condition(today(), 30))
            .build(DbBackend::Sqlite)
            .to_string();
        assert!(sql.contains("\"items\".\"section_id\" = 4 AND"));
        assert!(sql.contains("\"items\".\"quantity\" <= \"items\".\"min_quantity\""));
    }
}

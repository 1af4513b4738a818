use crate::{
    db::DbPool,
    entities::{item, laboratory, movement, section, storage, user, MovementType},
    errors::ServiceError,
    queries::item_queries::{expiring_condition, expiry_cutoff, low_stock_condition},
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;

/// Days covered by the "recent" counters.
pub const RECENT_WINDOW_DAYS: i64 = 7;
/// Expiry window of the dashboard counter.
pub const DASHBOARD_EXPIRY_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub laboratories: u64,
    pub storages: u64,
    pub sections: u64,
    pub items: u64,
    pub low_stock_items: u64,
    /// Expiry date on or before today + 30 days, already expired ones included
    pub expiring_items: u64,
    pub expired_items: u64,
    pub users: u64,
    pub recent_movements: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub total_movements: u64,
    pub recent_movements: u64,
    pub in_movements: u64,
    pub laboratories: u64,
    pub storages: u64,
}

#[derive(Clone)]
pub struct StatsService {
    db: Arc<DbPool>,
}

impl StatsService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    #[instrument(skip(self))]
    pub async fn dashboard(&self) -> Result<DashboardStats, ServiceError> {
        self.dashboard_at(Utc::now()).await
    }

    /// Dashboard counters evaluated as of `now`.
    pub async fn dashboard_at(&self, now: DateTime<Utc>) -> Result<DashboardStats, ServiceError> {
        let db = self.db.as_ref();
        let today = now.date_naive();

        Ok(DashboardStats {
            laboratories: laboratory::Entity::find().count(db).await?,
            storages: storage::Entity::find().count(db).await?,
            sections: section::Entity::find().count(db).await?,
            items: item::Entity::find().count(db).await?,
            low_stock_items: item::Entity::find()
                .filter(low_stock_condition())
                .count(db)
                .await?,
            expiring_items: item::Entity::find()
                .filter(expiring_condition(expiry_cutoff(
                    today,
                    Some(DASHBOARD_EXPIRY_DAYS),
                    DASHBOARD_EXPIRY_DAYS,
                )))
                .count(db)
                .await?,
            expired_items: item::Entity::find()
                .filter(item::Column::ExpiryDate.is_not_null())
                .filter(item::Column::ExpiryDate.lt(today))
                .count(db)
                .await?,
            users: user::Entity::find().count(db).await?,
            recent_movements: movement::Entity::find()
                .filter(movement::Column::CreatedAt.gte(recent_since(now)))
                .count(db)
                .await?,
        })
    }

    /// Activity of one user. Laboratory and storage figures are site-wide totals.
    #[instrument(skip(self))]
    pub async fn user_stats(&self, user_id: i32) -> Result<UserStats, ServiceError> {
        let db = self.db.as_ref();
        let by_user = || movement::Entity::find().filter(movement::Column::UserId.eq(user_id));

        Ok(UserStats {
            total_movements: by_user().count(db).await?,
            recent_movements: by_user()
                .filter(movement::Column::CreatedAt.gte(recent_since(Utc::now())))
                .count(db)
                .await?,
            in_movements: by_user()
                .filter(movement::Column::MovementType.eq(MovementType::In))
                .count(db)
                .await?,
            laboratories: laboratory::Entity::find().count(db).await?,
            storages: storage::Entity::find().count(db).await?,
        })
    }
}

fn recent_since(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(RECENT_WINDOW_DAYS)
}

/// True when `expiry` falls strictly before `today`.
pub fn is_expired(expiry: Option<NaiveDate>, today: NaiveDate) -> bool {
    expiry.map_or(false, |date| date < today)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_window_is_seven_days() {
        let now = Utc::now();
        assert_eq!(now - recent_since(now), Duration::days(7));
    }

    #[test]
    fn expired_is_strictly_before_today() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        assert!(is_expired(NaiveDate::from_ymd_opt(2024, 5, 9), today));
        assert!(!is_expired(Some(today), today));
        assert!(!is_expired(None, today));
    }
}

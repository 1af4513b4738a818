use crate::{
    auth::Actor,
    db::{
        query_builder::{Page, PageLimits, PageRequest},
        with_transaction, DbPool,
    },
    entities::{
        item,
        movement::{self, MovementType},
        user,
    },
    errors::ServiceError,
    queries::{
        movement_queries::{ExportMovementsQuery, ListMovementsQuery, MovementFilter},
        Query,
    },
    services::recorder::MovementDraft,
};
use chrono::Utc;
use metrics::counter;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use validator::Validate;

/// How a movement type changes an item's on-hand quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockEffect {
    Increase,
    Decrease,
    Unchanged,
}

impl StockEffect {
    pub fn of(movement_type: MovementType) -> Self {
        match movement_type {
            MovementType::In => StockEffect::Increase,
            MovementType::Out | MovementType::Damaged | MovementType::Scrapped => {
                StockEffect::Decrease
            }
            // stocktake reconciliation is not derived from the free-text reason
            MovementType::Transfer | MovementType::Stocktake => StockEffect::Unchanged,
        }
    }

    /// New quantity after moving `quantity` units, or an error when a
    /// decrease would go negative.
    pub fn apply(self, item_id: i32, current: i32, quantity: i32) -> Result<i32, ServiceError> {
        match self {
            StockEffect::Unchanged => Ok(current),
            StockEffect::Increase => current.checked_add(quantity).ok_or_else(|| {
                ServiceError::ValidationError(format!(
                    "item {} quantity would overflow",
                    item_id
                ))
            }),
            StockEffect::Decrease if current >= quantity => Ok(current - quantity),
            StockEffect::Decrease => Err(insufficient(item_id, current, quantity)),
        }
    }
}

fn insufficient(item_id: i32, available: i32, requested: i32) -> ServiceError {
    ServiceError::InsufficientStock(format!(
        "item {} has {} on hand, requested {}",
        item_id, available, requested
    ))
}

pub fn parse_movement_type(value: &str) -> Result<MovementType, ServiceError> {
    MovementType::from_str(value.trim()).map_err(|_| {
        ServiceError::ValidationError(format!("unknown movement type '{}'", value))
    })
}

/// Applies the quantity side of a movement with a single conditional UPDATE.
///
/// Decreases only match while `quantity >= n`, so two concurrent deductions
/// cannot both succeed against the same stock; zero affected rows means the
/// stock was insufficient at write time.
pub(crate) async fn apply_stock_change<C: ConnectionTrait>(
    conn: &C,
    item_id: i32,
    effect: StockEffect,
    quantity: i32,
) -> Result<(), ServiceError> {
    let update = item::Entity::update_many()
        .col_expr(item::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(item::Column::Id.eq(item_id));

    let result = match effect {
        StockEffect::Unchanged => return Ok(()),
        StockEffect::Increase => {
            update
                .col_expr(
                    item::Column::Quantity,
                    Expr::col(item::Column::Quantity).add(quantity),
                )
                .exec(conn)
                .await?
        }
        StockEffect::Decrease => {
            update
                .col_expr(
                    item::Column::Quantity,
                    Expr::col(item::Column::Quantity).sub(quantity),
                )
                .filter(item::Column::Quantity.gte(quantity))
                .exec(conn)
                .await?
        }
    };

    if result.rows_affected == 0 {
        return Err(match effect {
            StockEffect::Decrease => ServiceError::InsufficientStock(format!(
                "item {} no longer has {} on hand",
                item_id, quantity
            )),
            _ => ServiceError::not_found("Item", item_id),
        });
    }

    Ok(())
}

/// An explicit stock operation.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct MovementRequest {
    pub item_id: i32,
    /// One of in, out, transfer, stocktake, damaged, scrapped
    pub movement_type: String,
    #[validate(range(min = 1, message = "quantity must be greater than zero"))]
    pub quantity: i32,
    #[serde(default)]
    #[validate(length(max = 255))]
    pub from_location: String,
    #[serde(default)]
    #[validate(length(max = 255))]
    pub to_location: String,
    #[serde(default)]
    #[validate(length(max = 500))]
    pub reason: String,
    #[serde(default)]
    pub notes: String,
}

/// Result of a successful [`MovementService::apply_movement`].
#[derive(Debug, Clone, Serialize)]
pub struct AppliedMovement {
    pub movement: movement::Model,
    pub item: item::Model,
}

/// A movement joined with the names needed to display it.
#[derive(Debug, Clone, Serialize)]
pub struct MovementView {
    #[serde(flatten)]
    pub movement: movement::Model,
    pub item_code: String,
    pub item_name: String,
    pub username: String,
}

pub struct MovementService {
    db: Arc<DbPool>,
    limits: PageLimits,
}

impl MovementService {
    pub fn new(db: Arc<DbPool>, limits: PageLimits) -> Self {
        Self { db, limits }
    }

    /// Validates and applies one explicit movement.
    ///
    /// The quantity change and the movement row are written in one
    /// transaction; on any failure neither is persisted.
    #[instrument(skip(self, request), fields(item_id = request.item_id, movement_type = %request.movement_type))]
    pub async fn apply_movement(
        &self,
        request: MovementRequest,
        actor: &Actor,
    ) -> Result<AppliedMovement, ServiceError> {
        let requested_type = request.movement_type.trim().to_ascii_lowercase();
        let result = self.try_apply(request, actor).await;
        match &result {
            Ok(applied) => {
                counter!("labstock_movements.applied", 1, "movement_type" => applied.movement.movement_type.to_string());
                info!(
                    movement_id = applied.movement.id,
                    quantity = applied.item.quantity,
                    "movement applied"
                );
            }
            Err(e) => {
                counter!("labstock_movements.rejected", 1, "movement_type" => requested_type);
                warn!(error = %e, "movement rejected");
            }
        }
        result
    }

    async fn try_apply(
        &self,
        request: MovementRequest,
        actor: &Actor,
    ) -> Result<AppliedMovement, ServiceError> {
        actor.require_admin()?;
        request.validate()?;
        let movement_type = parse_movement_type(&request.movement_type)?;

        let db = self.db.as_ref();
        let item = item::Entity::find_by_id(request.item_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::not_found("Item", request.item_id))?;

        let effect = StockEffect::of(movement_type);
        effect.apply(item.id, item.quantity, request.quantity)?;

        let draft = MovementDraft {
            item_id: item.id,
            movement_type,
            from_location: request.from_location,
            to_location: request.to_location,
            quantity: request.quantity,
            reason: request.reason,
            notes: request.notes,
        };
        let item_id = item.id;
        let user_id = actor.user_id;

        with_transaction(db, move |txn| {
            Box::pin(async move {
                apply_stock_change(txn, item_id, effect, draft.quantity).await?;
                let movement = draft.insert(txn, user_id, Utc::now()).await?;
                let item = item::Entity::find_by_id(item_id)
                    .one(txn)
                    .await?
                    .ok_or_else(|| ServiceError::not_found("Item", item_id))?;
                Ok(AppliedMovement { movement, item })
            })
        })
        .await
    }

    pub async fn get_movement(&self, id: i32) -> Result<MovementView, ServiceError> {
        let movement = movement::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::not_found("Movement", id))?;

        self.decorate(vec![movement])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ServiceError::not_found("Movement", id))
    }

    #[instrument(skip(self))]
    pub async fn list_movements(
        &self,
        filter: MovementFilter,
        request: PageRequest,
    ) -> Result<Page<MovementView>, ServiceError> {
        let mut page = ListMovementsQuery {
            filter,
            request,
            limits: self.limits,
        }
        .execute(self.db.as_ref())
        .await?;

        let views = self.decorate(std::mem::take(&mut page.items)).await?;
        Ok(page.with_items(views))
    }

    /// All matching movements, newest first, for bulk export.
    #[instrument(skip(self))]
    pub async fn export_movements(
        &self,
        filter: MovementFilter,
        search: Option<String>,
    ) -> Result<Vec<MovementView>, ServiceError> {
        let movements = ExportMovementsQuery { filter, search }
            .execute(self.db.as_ref())
            .await?;
        self.decorate(movements).await
    }

    /// Administrative purge of one ledger row. Item quantities are untouched.
    #[instrument(skip(self))]
    pub async fn delete_movement(&self, id: i32, actor: &Actor) -> Result<(), ServiceError> {
        actor.require_admin()?;

        let movement = movement::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::not_found("Movement", id))?;

        let active: movement::ActiveModel = movement.into();
        active.delete(self.db.as_ref()).await?;

        info!(movement_id = id, "movement deleted");
        Ok(())
    }

    /// Attaches item and user names. Rows whose item or user no longer
    /// exists keep empty names.
    async fn decorate(
        &self,
        movements: Vec<movement::Model>,
    ) -> Result<Vec<MovementView>, ServiceError> {
        let db = self.db.as_ref();

        let item_ids: HashSet<i32> = movements.iter().map(|m| m.item_id).collect();
        let items: HashMap<i32, item::Model> = item::Entity::find()
            .filter(item::Column::Id.is_in(item_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|i| (i.id, i))
            .collect();

        let user_ids: HashSet<i32> = movements.iter().map(|m| m.user_id).collect();
        let users: HashMap<i32, user::Model> = user::Entity::find()
            .filter(user::Column::Id.is_in(user_ids))
            .all(db)
            .await?
            .into_iter()
            .map(|u| (u.id, u))
            .collect();

        Ok(movements
            .into_iter()
            .map(|movement| {
                let item = items.get(&movement.item_id);
                MovementView {
                    item_code: item.map(|i| i.code.clone()).unwrap_or_default(),
                    item_name: item.map(|i| i.name.clone()).unwrap_or_default(),
                    username: users
                        .get(&movement.user_id)
                        .map(|u| u.display_name().to_string())
                        .unwrap_or_default(),
                    movement,
                }
            })
            .collect())
    }
}

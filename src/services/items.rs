use crate::{
    auth::Actor,
    db::{
        query_builder::{Page, PageLimits, PageRequest},
        transaction::BoxFuture,
        with_transaction, DbPool,
    },
    entities::{item, movement, section},
    errors::ServiceError,
    queries::{
        item_queries::{
            expiry_cutoff, ExpiringItemsQuery, ItemCategoriesQuery, ItemCodeExistsQuery,
            ItemFilter, ListItemsQuery, LowStockItemsQuery,
        },
        Query,
    },
    services::{
        location::{self, LocationPath},
        recorder::{
            creation_movement, deletion_movement, quantity_set_movement, update_movements,
            MovementDraft, MovementRecorder,
        },
    },
};
use chrono::{NaiveDate, Utc};
use sea_orm::{ActiveModelTrait, DatabaseTransaction, EntityTrait, ModelTrait, Set};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

/// Payload for creating an item, and for replacing one on update.
#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct ItemRequest {
    #[validate(length(min = 1, max = 64))]
    pub code: String,
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    #[validate(length(max = 100))]
    pub category: String,
    /// Arbitrary key/value attributes; must be a JSON object when present
    #[serde(default)]
    pub properties: Option<JsonValue>,
    #[serde(default)]
    #[validate(range(min = 0.0))]
    pub price: f64,
    #[serde(default)]
    #[validate(range(min = 0, message = "quantity must not be negative"))]
    pub quantity: i32,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub min_quantity: i32,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub supplier: String,
    #[serde(default)]
    pub purchase_date: Option<NaiveDate>,
    #[serde(default)]
    pub expiry_date: Option<NaiveDate>,
    pub section_id: i32,
}

/// Accepts a JSON object (or nothing); any other JSON kind is rejected.
pub(crate) fn validate_properties(
    properties: Option<JsonValue>,
) -> Result<Option<JsonValue>, ServiceError> {
    match properties {
        None | Some(JsonValue::Null) => Ok(None),
        Some(value @ JsonValue::Object(_)) => Ok(Some(value)),
        Some(_) => Err(ServiceError::ValidationError(
            "properties must be a JSON object".to_string(),
        )),
    }
}

/// An item together with its resolved location.
#[derive(Debug, Clone, Serialize)]
pub struct ItemDetails {
    #[serde(flatten)]
    pub item: item::Model,
    pub location: LocationPath,
}

/// Outcome of [`ItemService::set_item_quantity`].
#[derive(Debug, Clone, Serialize)]
pub struct QuantityChange {
    pub old_quantity: i32,
    pub new_quantity: i32,
    /// `None` when the quantity was already at the requested value
    pub movement: Option<movement::Model>,
}

/// Item CRUD. Every mutation also writes the movements it implies.
pub struct ItemService {
    db: Arc<DbPool>,
    limits: PageLimits,
    recorder: MovementRecorder,
    expiring_default_days: i64,
}

impl ItemService {
    pub fn new(
        db: Arc<DbPool>,
        limits: PageLimits,
        recorder: MovementRecorder,
        expiring_default_days: i64,
    ) -> Self {
        Self {
            db,
            limits,
            recorder,
            expiring_default_days,
        }
    }

    /// Runs `f` in a transaction and writes the drafts it returns, either in
    /// the same transaction or afterwards depending on the audit mode.
    async fn write_audited<T, F>(
        &self,
        user_id: i32,
        f: F,
    ) -> Result<(T, Vec<movement::Model>), ServiceError>
    where
        F: for<'a> FnOnce(
                &'a DatabaseTransaction,
            ) -> BoxFuture<'a, Result<(T, Vec<MovementDraft>), ServiceError>>
            + Send
            + 'static,
        T: Send + 'static,
    {
        let db = self.db.as_ref();
        let recorder = self.recorder;

        if recorder.is_atomic() {
            with_transaction(db, move |txn| {
                Box::pin(async move {
                    let (value, drafts) = f(txn).await?;
                    let movements = recorder
                        .record_all(txn, drafts, user_id, Utc::now())
                        .await?;
                    Ok((value, movements))
                })
            })
            .await
        } else {
            let (value, drafts) = with_transaction(db, f).await?;
            let movements = recorder
                .record_best_effort(db, drafts, user_id, Utc::now())
                .await;
            Ok((value, movements))
        }
    }

    async fn ensure_section(&self, section_id: i32) -> Result<section::Model, ServiceError> {
        section::Entity::find_by_id(section_id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::not_found("Section", section_id))
    }

    async fn ensure_code_free(&self, code: &str) -> Result<(), ServiceError> {
        if self.code_exists(code).await? {
            return Err(duplicate_code(code));
        }
        Ok(())
    }

    async fn find(&self, id: i32) -> Result<item::Model, ServiceError> {
        item::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::not_found("Item", id))
    }

    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create_item(
        &self,
        request: ItemRequest,
        actor: &Actor,
    ) -> Result<item::Model, ServiceError> {
        request.validate()?;
        let properties = validate_properties(request.properties.clone())?;
        self.ensure_section(request.section_id).await?;
        self.ensure_code_free(&request.code).await?;

        let now = Utc::now();
        let code = request.code.clone();
        let model = item::ActiveModel {
            code: Set(request.code),
            name: Set(request.name),
            description: Set(request.description),
            category: Set(request.category),
            properties: Set(properties),
            price: Set(request.price),
            quantity: Set(request.quantity),
            min_quantity: Set(request.min_quantity),
            unit: Set(request.unit),
            supplier: Set(request.supplier),
            purchase_date: Set(request.purchase_date),
            expiry_date: Set(request.expiry_date),
            section_id: Set(request.section_id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        let (created, _) = self
            .write_audited(actor.user_id, move |txn| {
                Box::pin(async move {
                    let created = model
                        .insert(txn)
                        .await
                        .map_err(|e| ServiceError::from_write(e, || duplicate_message(&code)))?;
                    let drafts = vec![creation_movement(&created)];
                    Ok((created, drafts))
                })
            })
            .await?;

        info!(item_id = created.id, quantity = created.quantity, "item created");
        Ok(created)
    }

    /// Replaces the item's fields. Section and quantity changes are recorded
    /// as movements; no stock-sufficiency check applies to a direct edit.
    #[instrument(skip(self, request))]
    pub async fn update_item(
        &self,
        id: i32,
        request: ItemRequest,
        actor: &Actor,
    ) -> Result<item::Model, ServiceError> {
        request.validate()?;
        let properties = validate_properties(request.properties.clone())?;
        let before = self.find(id).await?;

        if request.section_id != before.section_id {
            self.ensure_section(request.section_id).await?;
        }
        if request.code != before.code {
            self.ensure_code_free(&request.code).await?;
        }

        let code = request.code.clone();
        let mut active: item::ActiveModel = before.clone().into();
        active.code = Set(request.code);
        active.name = Set(request.name);
        active.description = Set(request.description);
        active.category = Set(request.category);
        active.properties = Set(properties);
        active.price = Set(request.price);
        active.quantity = Set(request.quantity);
        active.min_quantity = Set(request.min_quantity);
        active.unit = Set(request.unit);
        active.supplier = Set(request.supplier);
        active.purchase_date = Set(request.purchase_date);
        active.expiry_date = Set(request.expiry_date);
        active.section_id = Set(request.section_id);
        active.updated_at = Set(Utc::now());

        let (after, movements) = self
            .write_audited(actor.user_id, move |txn| {
                Box::pin(async move {
                    let after = active
                        .update(txn)
                        .await
                        .map_err(|e| ServiceError::from_write(e, || duplicate_message(&code)))?;
                    let drafts = update_movements(&before, &after);
                    Ok((after, drafts))
                })
            })
            .await?;

        info!(item_id = id, movements = movements.len(), "item updated");
        Ok(after)
    }

    /// Removes the item after recording an `out` of its remaining quantity.
    ///
    /// In best-effort mode the `out` row is written before the item row is
    /// removed and stays even if the removal then fails.
    #[instrument(skip(self))]
    pub async fn delete_item(&self, id: i32, actor: &Actor) -> Result<(), ServiceError> {
        let existing = self.find(id).await?;

        if self.recorder.is_atomic() {
            self.write_audited(actor.user_id, move |txn| {
                Box::pin(async move {
                    let drafts = vec![deletion_movement(&existing)];
                    existing.delete(txn).await?;
                    Ok(((), drafts))
                })
            })
            .await?;
        } else {
            let db = self.db.as_ref();
            let drafts = vec![deletion_movement(&existing)];
            self.recorder
                .record_best_effort(db, drafts, actor.user_id, Utc::now())
                .await;
            existing.delete(db).await?;
        }

        info!(item_id = id, "item deleted");
        Ok(())
    }

    /// Overwrites the on-hand quantity, recording the difference.
    #[instrument(skip(self))]
    pub async fn set_item_quantity(
        &self,
        id: i32,
        quantity: i32,
        actor: &Actor,
    ) -> Result<QuantityChange, ServiceError> {
        if quantity < 0 {
            return Err(ServiceError::ValidationError(
                "quantity must not be negative".to_string(),
            ));
        }

        let existing = self.find(id).await?;
        let old_quantity = existing.quantity;

        let draft = match quantity_set_movement(&existing, quantity) {
            Some(draft) => draft,
            None => {
                return Ok(QuantityChange {
                    old_quantity,
                    new_quantity: quantity,
                    movement: None,
                })
            }
        };

        let mut active: item::ActiveModel = existing.into();
        active.quantity = Set(quantity);
        active.updated_at = Set(Utc::now());

        let (_, mut movements) = self
            .write_audited(actor.user_id, move |txn| {
                Box::pin(async move {
                    let updated = active.update(txn).await?;
                    Ok((updated, vec![draft]))
                })
            })
            .await?;

        info!(item_id = id, old_quantity, new_quantity = quantity, "item quantity set");
        Ok(QuantityChange {
            old_quantity,
            new_quantity: quantity,
            movement: movements.pop(),
        })
    }

    pub async fn get_item(&self, id: i32) -> Result<ItemDetails, ServiceError> {
        let item = self.find(id).await?;
        let location = location::resolve_for_item(self.db.as_ref(), &item).await?;
        Ok(ItemDetails { item, location })
    }

    #[instrument(skip(self))]
    pub async fn list_items(
        &self,
        filter: ItemFilter,
        request: PageRequest,
    ) -> Result<Page<ItemDetails>, ServiceError> {
        let mut page = ListItemsQuery {
            filter,
            request,
            limits: self.limits,
            today: Utc::now().date_naive(),
            default_expiry_days: self.expiring_default_days,
        }
        .execute(self.db.as_ref())
        .await?;

        let items = std::mem::take(&mut page.items);
        let details = self.with_locations(items).await?;
        Ok(page.with_items(details))
    }

    pub async fn categories(&self) -> Result<Vec<String>, ServiceError> {
        ItemCategoriesQuery.execute(self.db.as_ref()).await
    }

    pub async fn low_stock_items(&self) -> Result<Vec<ItemDetails>, ServiceError> {
        let items = LowStockItemsQuery.execute(self.db.as_ref()).await?;
        self.with_locations(items).await
    }

    /// Items expiring within `days` (default window when absent or non-positive).
    pub async fn expiring_items(&self, days: Option<i64>) -> Result<Vec<ItemDetails>, ServiceError> {
        let cutoff = expiry_cutoff(Utc::now().date_naive(), days, self.expiring_default_days);
        let items = ExpiringItemsQuery { cutoff }
            .execute(self.db.as_ref())
            .await?;
        self.with_locations(items).await
    }

    pub async fn code_exists(&self, code: &str) -> Result<bool, ServiceError> {
        ItemCodeExistsQuery {
            code: code.to_string(),
        }
        .execute(self.db.as_ref())
        .await
    }

    async fn with_locations(
        &self,
        items: Vec<item::Model>,
    ) -> Result<Vec<ItemDetails>, ServiceError> {
        let mut paths = location::resolve_for_items(self.db.as_ref(), &items).await?;
        Ok(items
            .into_iter()
            .map(|item| {
                let location = paths.remove(&item.id).unwrap_or_default();
                ItemDetails { item, location }
            })
            .collect())
    }
}

fn duplicate_message(code: &str) -> String {
    format!("item code '{}' already exists", code)
}

fn duplicate_code(code: &str) -> ServiceError {
    ServiceError::Conflict(duplicate_message(code))
}

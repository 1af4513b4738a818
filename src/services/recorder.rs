//! Movements synthesized as a side effect of item mutations.
//!
//! The `*_movement(s)` functions are pure: they compare snapshots and return
//! the audit rows an item change implies. [`MovementRecorder`] persists them
//! either inside the caller's transaction or after it, depending on
//! [`MovementAuditMode`].

use crate::config::MovementAuditMode;
use crate::entities::item;
use crate::entities::movement::{self, MovementType};
use chrono::{DateTime, Utc};
use metrics::counter;
use sea_orm::{ActiveModelTrait, ConnectionTrait, DbErr, Set};
use tracing::warn;

/// Location descriptor for a section, as stored in movement rows.
pub fn section_descriptor(section_id: i32) -> String {
    format!("section:{}", section_id)
}

/// Location descriptor for a stock level, used by direct quantity edits.
pub fn stock_descriptor(quantity: i32, unit: &str) -> String {
    format!("stock: {} {}", quantity, unit)
}

/// A movement row that has not been written yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovementDraft {
    pub item_id: i32,
    pub movement_type: MovementType,
    pub from_location: String,
    pub to_location: String,
    pub quantity: i32,
    pub reason: String,
    pub notes: String,
}

impl MovementDraft {
    pub fn into_active_model(self, user_id: i32, now: DateTime<Utc>) -> movement::ActiveModel {
        movement::ActiveModel {
            item_id: Set(self.item_id),
            movement_type: Set(self.movement_type),
            from_location: Set(self.from_location),
            to_location: Set(self.to_location),
            quantity: Set(self.quantity),
            reason: Set(self.reason),
            notes: Set(self.notes),
            user_id: Set(user_id),
            created_at: Set(now),
            ..Default::default()
        }
    }

    pub async fn insert<C: ConnectionTrait>(
        self,
        conn: &C,
        user_id: i32,
        now: DateTime<Utc>,
    ) -> Result<movement::Model, DbErr> {
        self.into_active_model(user_id, now).insert(conn).await
    }
}

/// `in` of the full initial quantity into the item's section.
pub fn creation_movement(item: &item::Model) -> MovementDraft {
    MovementDraft {
        item_id: item.id,
        movement_type: MovementType::In,
        from_location: String::new(),
        to_location: section_descriptor(item.section_id),
        quantity: item.quantity,
        reason: "New item".to_string(),
        notes: "Initial stock".to_string(),
    }
}

/// Up to two rows: a `transfer` when the section changed, and an `in`/`out`
/// of the delta when the quantity changed. The checks are independent.
pub fn update_movements(before: &item::Model, after: &item::Model) -> Vec<MovementDraft> {
    let mut drafts = Vec::with_capacity(2);

    if before.section_id != after.section_id {
        drafts.push(MovementDraft {
            item_id: after.id,
            movement_type: MovementType::Transfer,
            from_location: section_descriptor(before.section_id),
            to_location: section_descriptor(after.section_id),
            quantity: after.quantity,
            reason: "Item location updated".to_string(),
            notes: "Item location updated".to_string(),
        });
    }

    let delta = i64::from(after.quantity) - i64::from(before.quantity);
    if delta != 0 {
        let (movement_type, reason) = if delta > 0 {
            (MovementType::In, "Stock increased")
        } else {
            (MovementType::Out, "Stock decreased")
        };
        drafts.push(MovementDraft {
            item_id: after.id,
            movement_type,
            from_location: section_descriptor(after.section_id),
            to_location: section_descriptor(after.section_id),
            quantity: magnitude(delta),
            reason: reason.to_string(),
            notes: "Quantity updated".to_string(),
        });
    }

    drafts
}

/// `out` of whatever is left, written before the row disappears.
pub fn deletion_movement(item: &item::Model) -> MovementDraft {
    MovementDraft {
        item_id: item.id,
        movement_type: MovementType::Out,
        from_location: section_descriptor(item.section_id),
        to_location: String::new(),
        quantity: item.quantity,
        reason: "Item deleted".to_string(),
        notes: "Item deleted".to_string(),
    }
}

/// `None` when the quantity does not actually change.
pub fn quantity_set_movement(item: &item::Model, new_quantity: i32) -> Option<MovementDraft> {
    let delta = i64::from(new_quantity) - i64::from(item.quantity);
    if delta == 0 {
        return None;
    }

    let (movement_type, verb) = if delta > 0 {
        (MovementType::In, "increased")
    } else {
        (MovementType::Out, "decreased")
    };
    let quantity = magnitude(delta);

    Some(MovementDraft {
        item_id: item.id,
        movement_type,
        from_location: stock_descriptor(item.quantity, &item.unit),
        to_location: stock_descriptor(new_quantity, &item.unit),
        quantity,
        reason: format!("Stock {} by {}", verb, quantity),
        notes: "Manual stock adjustment".to_string(),
    })
}

fn magnitude(delta: i64) -> i32 {
    i32::try_from(delta.unsigned_abs()).unwrap_or(i32::MAX)
}

/// Persists synthesized movements according to the configured audit mode.
#[derive(Debug, Clone, Copy)]
pub struct MovementRecorder {
    mode: MovementAuditMode,
}

impl MovementRecorder {
    pub fn new(mode: MovementAuditMode) -> Self {
        Self { mode }
    }

    /// True when drafts must be written inside the item's own transaction.
    pub fn is_atomic(&self) -> bool {
        self.mode == MovementAuditMode::Atomic
    }

    /// Writes every draft; the first failure aborts and is returned.
    pub async fn record_all<C: ConnectionTrait>(
        &self,
        conn: &C,
        drafts: Vec<MovementDraft>,
        user_id: i32,
        now: DateTime<Utc>,
    ) -> Result<Vec<movement::Model>, DbErr> {
        let mut written = Vec::with_capacity(drafts.len());
        for draft in drafts {
            written.push(draft.insert(conn, user_id, now).await?);
        }
        Ok(written)
    }

    /// Writes drafts after the item change has committed. Failures are logged
    /// and counted, never returned.
    pub async fn record_best_effort<C: ConnectionTrait>(
        &self,
        conn: &C,
        drafts: Vec<MovementDraft>,
        user_id: i32,
        now: DateTime<Utc>,
    ) -> Vec<movement::Model> {
        let mut written = Vec::with_capacity(drafts.len());
        for draft in drafts {
            let item_id = draft.item_id;
            let movement_type = draft.movement_type;
            match draft.insert(conn, user_id, now).await {
                Ok(model) => written.push(model),
                Err(e) => {
                    counter!("labstock_movements.audit_dropped", 1);
                    warn!(
                        item_id,
                        movement_type = %movement_type,
                        error = %e,
                        "failed to record synthesized movement"
                    );
                }
            }
        }
        written
    }
}

use crate::{
    auth::Actor,
    db::{
        query_builder::{Page, PageLimits, PageRequest},
        DbPool,
    },
    entities::{laboratory, section, storage, StorageStatus},
    errors::ServiceError,
    queries::{
        parse_filter,
        storage_queries::{ListStoragesQuery, StorageFilter},
        Query,
    },
    services::items::validate_properties,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct StorageRequest {
    #[validate(length(min = 1, max = 50))]
    pub code: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[serde(rename = "type", default)]
    #[validate(length(max = 50))]
    pub storage_type: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    /// running (default), maintenance or disabled
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub capacity: i32,
    #[validate(range(min = 1, max = 5))]
    pub security_level: i32,
    #[serde(default)]
    pub properties: Option<JsonValue>,
    pub lab_id: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct StorageDetails {
    #[serde(flatten)]
    pub storage: storage::Model,
    pub laboratory: Option<laboratory::Model>,
    pub sections: Vec<section::Model>,
}

pub struct StorageService {
    db: Arc<DbPool>,
    limits: PageLimits,
}

impl StorageService {
    pub fn new(db: Arc<DbPool>, limits: PageLimits) -> Self {
        Self { db, limits }
    }

    async fn find(&self, id: i32) -> Result<storage::Model, ServiceError> {
        storage::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::not_found("Storage", id))
    }

    async fn ensure_laboratory(&self, lab_id: i32) -> Result<(), ServiceError> {
        laboratory::Entity::find_by_id(lab_id)
            .one(self.db.as_ref())
            .await?
            .map(|_| ())
            .ok_or_else(|| ServiceError::not_found("Laboratory", lab_id))
    }

    #[instrument(skip(self, request), fields(code = %request.code, lab_id = request.lab_id))]
    pub async fn create_storage(
        &self,
        request: StorageRequest,
        actor: &Actor,
    ) -> Result<storage::Model, ServiceError> {
        actor.require_admin()?;
        request.validate()?;
        let status = parse_filter::<StorageStatus>("storage status", request.status.as_deref())?
            .unwrap_or(StorageStatus::Running);
        let properties = validate_properties(request.properties)?;
        self.ensure_laboratory(request.lab_id).await?;

        let now = Utc::now();
        let created = storage::ActiveModel {
            code: Set(request.code),
            name: Set(request.name),
            storage_type: Set(request.storage_type),
            location: Set(request.location),
            description: Set(request.description),
            status: Set(status),
            capacity: Set(request.capacity),
            security_level: Set(request.security_level),
            properties: Set(properties),
            lab_id: Set(request.lab_id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await?;

        info!(storage_id = created.id, "storage created");
        Ok(created)
    }

    #[instrument(skip(self, request))]
    pub async fn update_storage(
        &self,
        id: i32,
        request: StorageRequest,
        actor: &Actor,
    ) -> Result<storage::Model, ServiceError> {
        actor.require_admin()?;
        request.validate()?;
        let status = parse_filter::<StorageStatus>("storage status", request.status.as_deref())?;
        let properties = validate_properties(request.properties)?;

        let existing = self.find(id).await?;
        if existing.lab_id != request.lab_id {
            self.ensure_laboratory(request.lab_id).await?;
        }

        let mut active: storage::ActiveModel = existing.into();
        active.code = Set(request.code);
        active.name = Set(request.name);
        active.storage_type = Set(request.storage_type);
        active.location = Set(request.location);
        active.description = Set(request.description);
        if let Some(status) = status {
            active.status = Set(status);
        }
        active.capacity = Set(request.capacity);
        active.security_level = Set(request.security_level);
        active.properties = Set(properties);
        active.lab_id = Set(request.lab_id);
        active.updated_at = Set(Utc::now());

        Ok(active.update(self.db.as_ref()).await?)
    }

    /// Refused with `Conflict` while any section still belongs to the storage.
    #[instrument(skip(self))]
    pub async fn delete_storage(&self, id: i32, actor: &Actor) -> Result<(), ServiceError> {
        actor.require_admin()?;
        let existing = self.find(id).await?;

        let sections = section::Entity::find()
            .filter(section::Column::StorageId.eq(id))
            .count(self.db.as_ref())
            .await?;
        if sections > 0 {
            return Err(ServiceError::Conflict(format!(
                "storage {} still owns {} section(s)",
                id, sections
            )));
        }

        existing.delete(self.db.as_ref()).await?;
        info!(storage_id = id, "storage deleted");
        Ok(())
    }

    pub async fn get_storage(&self, id: i32) -> Result<StorageDetails, ServiceError> {
        let db = self.db.as_ref();
        let storage = self.find(id).await?;
        let laboratory = storage.find_related(laboratory::Entity).one(db).await?;
        let sections = storage
            .find_related(section::Entity)
            .order_by_asc(section::Column::Name)
            .all(db)
            .await?;
        Ok(StorageDetails {
            storage,
            laboratory,
            sections,
        })
    }

    pub async fn list_storages(
        &self,
        filter: StorageFilter,
        request: PageRequest,
    ) -> Result<Page<storage::Model>, ServiceError> {
        ListStoragesQuery {
            filter,
            request,
            limits: self.limits,
        }
        .execute(self.db.as_ref())
        .await
    }

    /// Every storage of one laboratory, by name.
    pub async fn storages_by_lab(&self, lab_id: i32) -> Result<Vec<storage::Model>, ServiceError> {
        Ok(storage::Entity::find()
            .filter(storage::Column::LabId.eq(lab_id))
            .order_by_asc(storage::Column::Name)
            .all(self.db.as_ref())
            .await?)
    }
}

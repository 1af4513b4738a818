use crate::{
    auth::Actor,
    db::{
        query_builder::{Page, PageLimits, PageRequest},
        DbPool,
    },
    entities::{item, section, storage, SectionStatus},
    errors::ServiceError,
    queries::{
        parse_filter,
        section_queries::{ListSectionsQuery, SectionFilter},
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
pub struct SectionRequest {
    #[validate(length(min = 1, max = 50))]
    pub code: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub description: String,
    /// available (default), full, maintenance or disabled
    #[serde(default)]
    pub status: Option<String>,
    #[validate(range(min = 1, max = 5))]
    pub security_level: i32,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub capacity: i32,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub used_capacity: i32,
    #[serde(default)]
    pub properties: Option<JsonValue>,
    pub storage_id: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SectionDetails {
    #[serde(flatten)]
    pub section: section::Model,
    pub storage: Option<storage::Model>,
    pub items: Vec<item::Model>,
}

pub struct SectionService {
    db: Arc<DbPool>,
    limits: PageLimits,
}

impl SectionService {
    pub fn new(db: Arc<DbPool>, limits: PageLimits) -> Self {
        Self { db, limits }
    }

    async fn find(&self, id: i32) -> Result<section::Model, ServiceError> {
        section::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::not_found("Section", id))
    }

    async fn ensure_storage(&self, storage_id: i32) -> Result<(), ServiceError> {
        storage::Entity::find_by_id(storage_id)
            .one(self.db.as_ref())
            .await?
            .map(|_| ())
            .ok_or_else(|| ServiceError::not_found("Storage", storage_id))
    }

    #[instrument(skip(self, request), fields(code = %request.code, storage_id = request.storage_id))]
    pub async fn create_section(
        &self,
        request: SectionRequest,
        actor: &Actor,
    ) -> Result<section::Model, ServiceError> {
        actor.require_admin()?;
        request.validate()?;
        let status = parse_filter::<SectionStatus>("section status", request.status.as_deref())?
            .unwrap_or(SectionStatus::Available);
        let properties = validate_properties(request.properties)?;
        self.ensure_storage(request.storage_id).await?;

        let now = Utc::now();
        let created = section::ActiveModel {
            code: Set(request.code),
            name: Set(request.name),
            position: Set(request.position),
            description: Set(request.description),
            status: Set(status),
            security_level: Set(request.security_level),
            capacity: Set(request.capacity),
            used_capacity: Set(request.used_capacity),
            properties: Set(properties),
            storage_id: Set(request.storage_id),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await?;

        info!(section_id = created.id, "section created");
        Ok(created)
    }

    #[instrument(skip(self, request))]
    pub async fn update_section(
        &self,
        id: i32,
        request: SectionRequest,
        actor: &Actor,
    ) -> Result<section::Model, ServiceError> {
        actor.require_admin()?;
        request.validate()?;
        let status = parse_filter::<SectionStatus>("section status", request.status.as_deref())?;
        let properties = validate_properties(request.properties)?;

        let existing = self.find(id).await?;
        if existing.storage_id != request.storage_id {
            self.ensure_storage(request.storage_id).await?;
        }

        let mut active: section::ActiveModel = existing.into();
        active.code = Set(request.code);
        active.name = Set(request.name);
        active.position = Set(request.position);
        active.description = Set(request.description);
        if let Some(status) = status {
            active.status = Set(status);
        }
        active.security_level = Set(request.security_level);
        active.capacity = Set(request.capacity);
        active.used_capacity = Set(request.used_capacity);
        active.properties = Set(properties);
        active.storage_id = Set(request.storage_id);
        active.updated_at = Set(Utc::now());

        Ok(active.update(self.db.as_ref()).await?)
    }

    /// Refused with `Conflict` while any item is still stored in the section.
    #[instrument(skip(self))]
    pub async fn delete_section(&self, id: i32, actor: &Actor) -> Result<(), ServiceError> {
        actor.require_admin()?;
        let existing = self.find(id).await?;

        let items = item::Entity::find()
            .filter(item::Column::SectionId.eq(id))
            .count(self.db.as_ref())
            .await?;
        if items > 0 {
            return Err(ServiceError::Conflict(format!(
                "section {} still holds {} item(s)",
                id, items
            )));
        }

        existing.delete(self.db.as_ref()).await?;
        info!(section_id = id, "section deleted");
        Ok(())
    }

    pub async fn get_section(&self, id: i32) -> Result<SectionDetails, ServiceError> {
        let db = self.db.as_ref();
        let section = self.find(id).await?;
        let storage = section.find_related(storage::Entity).one(db).await?;
        let items = section
            .find_related(item::Entity)
            .order_by_asc(item::Column::Name)
            .all(db)
            .await?;
        Ok(SectionDetails {
            section,
            storage,
            items,
        })
    }

    pub async fn list_sections(
        &self,
        filter: SectionFilter,
        request: PageRequest,
    ) -> Result<Page<section::Model>, ServiceError> {
        ListSectionsQuery {
            filter,
            request,
            limits: self.limits,
        }
        .execute(self.db.as_ref())
        .await
    }

    /// Every section of one storage unit, by name.
    pub async fn sections_by_storage(
        &self,
        storage_id: i32,
    ) -> Result<Vec<section::Model>, ServiceError> {
        Ok(section::Entity::find()
            .filter(section::Column::StorageId.eq(storage_id))
            .order_by_asc(section::Column::Name)
            .all(self.db.as_ref())
            .await?)
    }
}

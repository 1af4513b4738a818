use crate::{
    auth::Actor,
    db::{
        query_builder::{Page, PageLimits, PageRequest},
        DbPool,
    },
    entities::{laboratory, storage},
    errors::ServiceError,
    queries::{
        laboratory_queries::{LaboratoryFilter, ListLaboratoriesQuery},
        Query,
    },
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use validator::Validate;

#[derive(Debug, Clone, Deserialize, Serialize, Validate)]
pub struct LaboratoryRequest {
    #[validate(length(min = 1, max = 50))]
    pub code: String,
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[serde(default)]
    #[validate(length(max = 255))]
    pub location: String,
    #[serde(default)]
    pub description: String,
    #[validate(range(min = 1, max = 5))]
    pub security_level: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct LaboratoryDetails {
    #[serde(flatten)]
    pub laboratory: laboratory::Model,
    pub storages: Vec<storage::Model>,
}

pub struct LaboratoryService {
    db: Arc<DbPool>,
    limits: PageLimits,
}

impl LaboratoryService {
    pub fn new(db: Arc<DbPool>, limits: PageLimits) -> Self {
        Self { db, limits }
    }

    async fn find(&self, id: i32) -> Result<laboratory::Model, ServiceError> {
        laboratory::Entity::find_by_id(id)
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| ServiceError::not_found("Laboratory", id))
    }

    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create_laboratory(
        &self,
        request: LaboratoryRequest,
        actor: &Actor,
    ) -> Result<laboratory::Model, ServiceError> {
        actor.require_admin()?;
        request.validate()?;

        let now = Utc::now();
        let created = laboratory::ActiveModel {
            code: Set(request.code),
            name: Set(request.name),
            location: Set(request.location),
            description: Set(request.description),
            security_level: Set(request.security_level),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await?;

        info!(laboratory_id = created.id, "laboratory created");
        Ok(created)
    }

    #[instrument(skip(self, request))]
    pub async fn update_laboratory(
        &self,
        id: i32,
        request: LaboratoryRequest,
        actor: &Actor,
    ) -> Result<laboratory::Model, ServiceError> {
        actor.require_admin()?;
        request.validate()?;

        let mut active: laboratory::ActiveModel = self.find(id).await?.into();
        active.code = Set(request.code);
        active.name = Set(request.name);
        active.location = Set(request.location);
        active.description = Set(request.description);
        active.security_level = Set(request.security_level);
        active.updated_at = Set(Utc::now());

        Ok(active.update(self.db.as_ref()).await?)
    }

    /// Refused with `Conflict` while any storage unit still belongs to the laboratory.
    #[instrument(skip(self))]
    pub async fn delete_laboratory(&self, id: i32, actor: &Actor) -> Result<(), ServiceError> {
        actor.require_admin()?;
        let lab = self.find(id).await?;

        let storages = storage::Entity::find()
            .filter(storage::Column::LabId.eq(id))
            .count(self.db.as_ref())
            .await?;
        if storages > 0 {
            return Err(ServiceError::Conflict(format!(
                "laboratory {} still owns {} storage unit(s)",
                id, storages
            )));
        }

        lab.delete(self.db.as_ref()).await?;
        info!(laboratory_id = id, "laboratory deleted");
        Ok(())
    }

    pub async fn get_laboratory(&self, id: i32) -> Result<LaboratoryDetails, ServiceError> {
        let laboratory = self.find(id).await?;
        let storages = laboratory
            .find_related(storage::Entity)
            .order_by_asc(storage::Column::Name)
            .all(self.db.as_ref())
            .await?;
        Ok(LaboratoryDetails {
            laboratory,
            storages,
        })
    }

    pub async fn list_laboratories(
        &self,
        filter: LaboratoryFilter,
        request: PageRequest,
    ) -> Result<Page<laboratory::Model>, ServiceError> {
        ListLaboratoriesQuery {
            filter,
            request,
            limits: self.limits,
        }
        .execute(self.db.as_ref())
        .await
    }
}

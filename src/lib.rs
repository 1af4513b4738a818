//! Lab inventory engine
//!
//! Tracks items stored in a Laboratory → Storage → Section hierarchy and keeps
//! every change to their stock in an append-only movement ledger.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod queries;
pub mod services;

use crate::config::AppConfig;
use crate::db::{DbPool, PageLimits};
use crate::services::{
    items::ItemService, laboratories::LaboratoryService, movements::MovementService,
    recorder::MovementRecorder, sections::SectionService, stats::StatsService,
    storages::StorageService,
};
use std::sync::Arc;

/// Every service, built once over a shared connection pool.
#[derive(Clone)]
pub struct AppServices {
    pub laboratories: Arc<LaboratoryService>,
    pub storages: Arc<StorageService>,
    pub sections: Arc<SectionService>,
    pub items: Arc<ItemService>,
    pub movements: Arc<MovementService>,
    pub stats: Arc<StatsService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, cfg: &AppConfig) -> Self {
        let limits = PageLimits::from(cfg);
        let recorder = MovementRecorder::new(cfg.movement_audit_mode);

        Self {
            laboratories: Arc::new(LaboratoryService::new(db_pool.clone(), limits)),
            storages: Arc::new(StorageService::new(db_pool.clone(), limits)),
            sections: Arc::new(SectionService::new(db_pool.clone(), limits)),
            items: Arc::new(ItemService::new(
                db_pool.clone(),
                limits,
                recorder,
                i64::from(cfg.expiring_default_days),
            )),
            movements: Arc::new(MovementService::new(db_pool.clone(), limits)),
            stats: Arc::new(StatsService::new(db_pool)),
        }
    }
}

pub mod prelude {
    pub use crate::auth::Actor;
    pub use crate::config::{AppConfig, MovementAuditMode};
    pub use crate::db::{Page, PageRequest};
    pub use crate::entities::{MovementType, Role, SectionStatus, StorageStatus};
    pub use crate::errors::ServiceError;
    pub use crate::services::{
        items::{ItemDetails, ItemRequest},
        laboratories::LaboratoryRequest,
        location::LocationPath,
        movements::{AppliedMovement, MovementRequest},
        sections::SectionRequest,
        storages::StorageRequest,
    };
    pub use crate::AppServices;
}

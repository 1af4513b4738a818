#![allow(dead_code)]

use std::sync::Arc;

use chrono::Utc;
use labstock::{
    auth::Actor,
    config::{AppConfig, MovementAuditMode},
    db::{self, DbPool},
    entities::{item, laboratory, section, storage, user, Role},
    services::{
        items::ItemRequest, laboratories::LaboratoryRequest, sections::SectionRequest,
        storages::StorageRequest,
    },
    AppServices,
};
use sea_orm::{ActiveModelTrait, Set};

/// Services over a fresh in-memory SQLite database with the schema in place.
pub struct TestApp {
    pub db: Arc<DbPool>,
    pub services: AppServices,
    pub admin: Actor,
    pub user: Actor,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_audit_mode(MovementAuditMode::Atomic).await
    }

    pub async fn with_audit_mode(mode: MovementAuditMode) -> Self {
        let mut cfg = AppConfig::new("sqlite::memory:".to_string(), "test".to_string());
        // one connection, otherwise every pooled connection sees its own empty database
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.movement_audit_mode = mode;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::create_schema(&pool)
            .await
            .expect("failed to create schema");

        let db = Arc::new(pool);
        let services = AppServices::new(db.clone(), &cfg);

        let admin = insert_user(&db, "admin", Role::Admin).await;
        let user = insert_user(&db, "tech", Role::User).await;

        Self {
            db,
            services,
            admin: Actor::from(&admin),
            user: Actor::from(&user),
        }
    }

    pub async fn seed_lab(&self, code: &str) -> laboratory::Model {
        self.services
            .laboratories
            .create_laboratory(lab_request(code), &self.admin)
            .await
            .expect("create laboratory")
    }

    pub async fn seed_storage(&self, lab_id: i32, code: &str) -> storage::Model {
        self.services
            .storages
            .create_storage(storage_request(lab_id, code), &self.admin)
            .await
            .expect("create storage")
    }

    pub async fn seed_section(&self, storage_id: i32, code: &str) -> section::Model {
        self.services
            .sections
            .create_section(section_request(storage_id, code), &self.admin)
            .await
            .expect("create section")
    }

    /// Lab → storage → section chain, returning the section.
    pub async fn seed_location(&self) -> section::Model {
        let lab = self.seed_lab("LAB-A").await;
        let storage = self.seed_storage(lab.id, "FRIDGE-1").await;
        self.seed_section(storage.id, "SHELF-1").await
    }

    pub async fn seed_item(&self, section_id: i32, code: &str, quantity: i32) -> item::Model {
        self.services
            .items
            .create_item(item_request(section_id, code, quantity), &self.user)
            .await
            .expect("create item")
    }
}

pub async fn insert_user(db: &DbPool, username: &str, role: Role) -> user::Model {
    let now = Utc::now();
    user::ActiveModel {
        username: Set(username.to_string()),
        email: Set(format!("{}@lab.test", username)),
        password_hash: Set("x".to_string()),
        role: Set(role),
        active: Set(true),
        real_name: Set(String::new()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .expect("insert user")
}

pub fn lab_request(code: &str) -> LaboratoryRequest {
    LaboratoryRequest {
        code: code.to_string(),
        name: format!("Laboratory {}", code),
        location: "Building 2".to_string(),
        description: String::new(),
        security_level: 2,
    }
}

pub fn storage_request(lab_id: i32, code: &str) -> StorageRequest {
    StorageRequest {
        code: code.to_string(),
        name: format!("Storage {}", code),
        storage_type: "fridge".to_string(),
        location: String::new(),
        description: String::new(),
        status: None,
        capacity: 100,
        security_level: 2,
        properties: None,
        lab_id,
    }
}

pub fn section_request(storage_id: i32, code: &str) -> SectionRequest {
    SectionRequest {
        code: code.to_string(),
        name: format!("Section {}", code),
        position: "top".to_string(),
        description: String::new(),
        status: None,
        security_level: 2,
        capacity: 10,
        used_capacity: 0,
        properties: None,
        storage_id,
    }
}

pub fn item_request(section_id: i32, code: &str, quantity: i32) -> ItemRequest {
    ItemRequest {
        code: code.to_string(),
        name: format!("Item {}", code),
        description: String::new(),
        category: "reagent".to_string(),
        properties: None,
        price: 3.5,
        quantity,
        min_quantity: 2,
        unit: "bottle".to_string(),
        supplier: String::new(),
        purchase_date: None,
        expiry_date: None,
        section_id,
    }
}

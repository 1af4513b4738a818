mod common;

use assert_matches::assert_matches;
use common::{item_request, TestApp};
use rstest::rstest;
use labstock::{
    config::MovementAuditMode,
    entities::{movement, MovementType},
    errors::ServiceError,
    services::movements::MovementRequest,
};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder};
use serde_json::json;

async fn trail(app: &TestApp, item_id: i32) -> Vec<movement::Model> {
    movement::Entity::find()
        .filter(movement::Column::ItemId.eq(item_id))
        .order_by_asc(movement::Column::Id)
        .all(app.db.as_ref())
        .await
        .unwrap()
}

fn explicit(item_id: i32, movement_type: &str, quantity: i32) -> MovementRequest {
    MovementRequest {
        item_id,
        movement_type: movement_type.to_string(),
        quantity,
        from_location: String::new(),
        to_location: String::new(),
        reason: String::new(),
        notes: String::new(),
    }
}

#[tokio::test]
async fn stock_lifecycle_is_fully_audited() {
    let app = TestApp::new().await;
    let section = app.seed_location().await;

    let item = app.seed_item(section.id, "ETH-01", 10).await;
    let movements = trail(&app, item.id).await;
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0].movement_type, MovementType::In);
    assert_eq!(movements[0].quantity, 10);
    assert_eq!(movements[0].to_location, format!("section:{}", section.id));

    let updated = app
        .services
        .items
        .update_item(item.id, item_request(section.id, "ETH-01", 4), &app.user)
        .await
        .unwrap();
    assert_eq!(updated.quantity, 4);
    let movements = trail(&app, item.id).await;
    assert_eq!(movements.len(), 2);
    assert_eq!(movements[1].movement_type, MovementType::Out);
    assert_eq!(movements[1].quantity, 6);

    let rejected = app
        .services
        .movements
        .apply_movement(explicit(item.id, "out", 5), &app.admin)
        .await;
    assert_matches!(rejected, Err(ServiceError::InsufficientStock(_)));
    assert_eq!(trail(&app, item.id).await.len(), 2);

    let applied = app
        .services
        .movements
        .apply_movement(explicit(item.id, "in", 3), &app.admin)
        .await
        .unwrap();
    assert_eq!(applied.item.quantity, 7);
    assert_eq!(trail(&app, item.id).await.len(), 3);
}

#[tokio::test]
async fn moving_an_item_records_a_transfer() {
    let app = TestApp::new().await;
    let section = app.seed_location().await;
    let other = app.seed_section(section.storage_id, "SHELF-2").await;
    let item = app.seed_item(section.id, "ETH-01", 5).await;

    app.services
        .items
        .update_item(item.id, item_request(other.id, "ETH-01", 8), &app.user)
        .await
        .unwrap();

    let movements = trail(&app, item.id).await;
    assert_eq!(movements.len(), 3);
    assert_eq!(movements[1].movement_type, MovementType::Transfer);
    assert_eq!(movements[1].from_location, format!("section:{}", section.id));
    assert_eq!(movements[1].to_location, format!("section:{}", other.id));
    assert_eq!(movements[2].movement_type, MovementType::In);
    assert_eq!(movements[2].quantity, 3);
}

#[tokio::test]
async fn deletion_leaves_an_out_movement_behind() {
    let app = TestApp::new().await;
    let section = app.seed_location().await;
    let item = app.seed_item(section.id, "ETH-01", 6).await;

    app.services.items.delete_item(item.id, &app.user).await.unwrap();

    assert_matches!(
        app.services.items.get_item(item.id).await,
        Err(ServiceError::NotFound(_))
    );
    let movements = trail(&app, item.id).await;
    assert_eq!(movements.len(), 2);
    assert_eq!(movements[1].movement_type, MovementType::Out);
    assert_eq!(movements[1].quantity, 6);
    assert_eq!(movements[1].to_location, "");
}

#[tokio::test]
async fn setting_quantity_records_the_difference() {
    let app = TestApp::new().await;
    let section = app.seed_location().await;
    let item = app.seed_item(section.id, "ETH-01", 10).await;
    let items = &app.services.items;

    let change = items.set_item_quantity(item.id, 3, &app.user).await.unwrap();
    assert_eq!(change.old_quantity, 10);
    assert_eq!(change.new_quantity, 3);
    let movement = change.movement.unwrap();
    assert_eq!(movement.movement_type, MovementType::Out);
    assert_eq!(movement.quantity, 7);
    assert_eq!(movement.from_location, "stock: 10 bottle");
    assert_eq!(movement.to_location, "stock: 3 bottle");

    let unchanged = items.set_item_quantity(item.id, 3, &app.user).await.unwrap();
    assert!(unchanged.movement.is_none());
    assert_eq!(trail(&app, item.id).await.len(), 2);

    assert_matches!(
        items.set_item_quantity(item.id, -1, &app.user).await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn duplicate_codes_conflict() {
    let app = TestApp::new().await;
    let section = app.seed_location().await;
    let first = app.seed_item(section.id, "ETH-01", 1).await;
    let second = app.seed_item(section.id, "ETH-02", 1).await;
    let items = &app.services.items;

    assert_matches!(
        items.create_item(item_request(section.id, "ETH-01", 1), &app.user).await,
        Err(ServiceError::Conflict(_))
    );
    assert_matches!(
        items
            .update_item(second.id, item_request(section.id, "ETH-01", 1), &app.user)
            .await,
        Err(ServiceError::Conflict(_))
    );
    assert!(items.code_exists("ETH-01").await.unwrap());
    assert!(!items.code_exists("ETH-99").await.unwrap());
    assert_eq!(trail(&app, first.id).await.len(), 1);
}

#[tokio::test]
async fn item_requires_an_existing_section() {
    let app = TestApp::new().await;
    assert_matches!(
        app.services
            .items
            .create_item(item_request(424242, "ETH-01", 1), &app.user)
            .await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn properties_must_be_a_json_object() {
    let app = TestApp::new().await;
    let section = app.seed_location().await;
    let items = &app.services.items;

    let mut request = item_request(section.id, "ETH-01", 1);
    request.properties = Some(json!(["flammable"]));
    assert_matches!(
        items.create_item(request.clone(), &app.user).await,
        Err(ServiceError::ValidationError(_))
    );

    request.properties = Some(json!({"purity": "99.8%", "cas": "64-17-5"}));
    let created = items.create_item(request, &app.user).await.unwrap();
    assert_eq!(
        created.properties,
        Some(json!({"purity": "99.8%", "cas": "64-17-5"}))
    );
}

#[tokio::test]
async fn atomic_mode_rolls_back_item_changes_without_audit() {
    let app = TestApp::new().await;
    let section = app.seed_location().await;
    let item = app.seed_item(section.id, "ETH-01", 10).await;

    app.db.execute_unprepared("DROP TABLE movements").await.unwrap();

    let result = app
        .services
        .items
        .update_item(item.id, item_request(section.id, "ETH-01", 2), &app.user)
        .await;
    assert_matches!(result, Err(ServiceError::DatabaseError(_)));

    let details = app.services.items.get_item(item.id).await.unwrap();
    assert_eq!(details.item.quantity, 10);
}

#[tokio::test]
async fn best_effort_mode_keeps_item_changes_when_audit_fails() {
    let app = TestApp::with_audit_mode(MovementAuditMode::BestEffort).await;
    let section = app.seed_location().await;
    let item = app.seed_item(section.id, "ETH-01", 10).await;

    app.db.execute_unprepared("DROP TABLE movements").await.unwrap();

    let updated = app
        .services
        .items
        .update_item(item.id, item_request(section.id, "ETH-01", 2), &app.user)
        .await
        .unwrap();
    assert_eq!(updated.quantity, 2);

    let change = app
        .services
        .items
        .set_item_quantity(item.id, 5, &app.user)
        .await
        .unwrap();
    assert_eq!(change.new_quantity, 5);
    assert!(change.movement.is_none());
}

#[rstest]
#[case(MovementAuditMode::Atomic, 1)]
#[case(MovementAuditMode::BestEffort, 2)]
#[tokio::test]
async fn deletion_out_is_written_before_the_row_is_removed(
    #[case] mode: MovementAuditMode,
    #[case] expected_rows: usize,
) {
    let app = TestApp::with_audit_mode(mode).await;
    let section = app.seed_location().await;
    let item = app.seed_item(section.id, "ETH-01", 4).await;

    app.db
        .execute_unprepared(
            "CREATE TRIGGER items_locked BEFORE DELETE ON items \
             BEGIN SELECT RAISE(ABORT, 'items are locked'); END",
        )
        .await
        .unwrap();

    assert!(app.services.items.delete_item(item.id, &app.user).await.is_err());
    assert!(app.services.items.get_item(item.id).await.is_ok());

    let movements = trail(&app, item.id).await;
    assert_eq!(movements.len(), expected_rows);
    if mode == MovementAuditMode::BestEffort {
        assert_eq!(movements[1].movement_type, MovementType::Out);
        assert_eq!(movements[1].quantity, 4);
    }
}

#[tokio::test]
async fn item_details_carry_their_location() {
    let app = TestApp::new().await;
    let section = app.seed_location().await;
    let item = app.seed_item(section.id, "ETH-01", 1).await;

    let details = app.services.items.get_item(item.id).await.unwrap();
    assert_eq!(details.location.lab_code, "LAB-A");
    assert_eq!(details.location.storage_code, "FRIDGE-1");
    assert_eq!(details.location.section_code, "SHELF-1");
    assert_eq!(
        details.location.full_path,
        "Laboratory LAB-A → Storage FRIDGE-1 → Section SHELF-1"
    );
}

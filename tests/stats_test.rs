mod common;

use chrono::{Duration, Utc};
use common::{item_request, TestApp};
use labstock::services::movements::MovementRequest;

#[tokio::test]
async fn dashboard_counts_the_inventory() {
    let app = TestApp::new().await;
    let section = app.seed_location().await;
    let today = Utc::now().date_naive();

    for (code, quantity, expiry) in [
        ("OLD", 10, Some(today - Duration::days(1))),
        ("SOON", 10, Some(today + Duration::days(10))),
        ("LATER", 10, Some(today + Duration::days(60))),
        ("LOW", 1, None),
    ] {
        let mut request = item_request(section.id, code, quantity);
        request.expiry_date = expiry;
        app.services.items.create_item(request, &app.user).await.unwrap();
    }

    let stats = app.services.stats.dashboard().await.unwrap();
    assert_eq!(stats.laboratories, 1);
    assert_eq!(stats.storages, 1);
    assert_eq!(stats.sections, 1);
    assert_eq!(stats.items, 4);
    assert_eq!(stats.low_stock_items, 1);
    assert_eq!(stats.expiring_items, 2);
    assert_eq!(stats.expired_items, 1);
    assert_eq!(stats.users, 2);
    assert_eq!(stats.recent_movements, 4);

    let expiring = app.services.items.expiring_items(None).await.unwrap();
    assert_eq!(expiring.len(), 2);
    let wide = app.services.items.expiring_items(Some(90)).await.unwrap();
    assert_eq!(wide.len(), 3);
    let low = app.services.items.low_stock_items().await.unwrap();
    assert_eq!(low.len(), 1);
    assert_eq!(low[0].item.code, "LOW");
}

#[tokio::test]
async fn user_stats_count_own_activity() {
    let app = TestApp::new().await;
    let section = app.seed_location().await;
    let item = app.seed_item(section.id, "ETH-01", 10).await;

    app.services
        .movements
        .apply_movement(
            MovementRequest {
                item_id: item.id,
                movement_type: "out".to_string(),
                quantity: 2,
                from_location: String::new(),
                to_location: String::new(),
                reason: String::new(),
                notes: String::new(),
            },
            &app.admin,
        )
        .await
        .unwrap();

    let tech = app.services.stats.user_stats(app.user.user_id).await.unwrap();
    assert_eq!(tech.total_movements, 1);
    assert_eq!(tech.recent_movements, 1);
    assert_eq!(tech.in_movements, 1);
    assert_eq!(tech.laboratories, 1);
    assert_eq!(tech.storages, 1);

    let admin = app.services.stats.user_stats(app.admin.user_id).await.unwrap();
    assert_eq!(admin.total_movements, 1);
    assert_eq!(admin.in_movements, 0);

    let categories = app.services.items.categories().await.unwrap();
    assert_eq!(categories, vec!["reagent".to_string()]);
}

mod common;

use assert_matches::assert_matches;
use common::{lab_request, section_request, storage_request, TestApp};
use labstock::{
    db::PageRequest,
    entities::{SectionStatus, StorageStatus},
    errors::ServiceError,
    queries::{section_queries::SectionFilter, storage_queries::StorageFilter},
};
use serde_json::json;

#[tokio::test]
async fn only_admins_change_the_hierarchy() {
    let app = TestApp::new().await;
    let lab = app.seed_lab("LAB-A").await;

    assert_matches!(
        app.services
            .laboratories
            .create_laboratory(lab_request("LAB-B"), &app.user)
            .await,
        Err(ServiceError::Forbidden(_))
    );
    assert_matches!(
        app.services
            .storages
            .create_storage(storage_request(lab.id, "F-1"), &app.user)
            .await,
        Err(ServiceError::Forbidden(_))
    );
    assert_matches!(
        app.services.laboratories.delete_laboratory(lab.id, &app.user).await,
        Err(ServiceError::Forbidden(_))
    );
}

#[tokio::test]
async fn parents_must_exist() {
    let app = TestApp::new().await;

    assert_matches!(
        app.services
            .storages
            .create_storage(storage_request(77, "F-1"), &app.admin)
            .await,
        Err(ServiceError::NotFound(_))
    );
    assert_matches!(
        app.services
            .sections
            .create_section(section_request(77, "S-1"), &app.admin)
            .await,
        Err(ServiceError::NotFound(_))
    );

    let section = app.seed_location().await;
    assert_matches!(
        app.services
            .sections
            .update_section(section.id, section_request(77, "S-1"), &app.admin)
            .await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn deletes_are_blocked_while_children_exist() {
    let app = TestApp::new().await;
    let section = app.seed_location().await;
    let item = app.seed_item(section.id, "ETH-01", 1).await;
    let storage_id = section.storage_id;
    let lab_id = app
        .services
        .storages
        .get_storage(storage_id)
        .await
        .unwrap()
        .storage
        .lab_id;

    assert_matches!(
        app.services.sections.delete_section(section.id, &app.admin).await,
        Err(ServiceError::Conflict(_))
    );
    assert_matches!(
        app.services.storages.delete_storage(storage_id, &app.admin).await,
        Err(ServiceError::Conflict(_))
    );
    assert_matches!(
        app.services.laboratories.delete_laboratory(lab_id, &app.admin).await,
        Err(ServiceError::Conflict(_))
    );

    app.services.items.delete_item(item.id, &app.user).await.unwrap();
    app.services.sections.delete_section(section.id, &app.admin).await.unwrap();
    app.services.storages.delete_storage(storage_id, &app.admin).await.unwrap();
    app.services.laboratories.delete_laboratory(lab_id, &app.admin).await.unwrap();

    assert_matches!(
        app.services.laboratories.get_laboratory(lab_id).await,
        Err(ServiceError::NotFound(_))
    );
}

#[tokio::test]
async fn details_load_parents_and_children() {
    let app = TestApp::new().await;
    let section = app.seed_location().await;
    app.seed_item(section.id, "ETH-01", 1).await;

    let storage = app
        .services
        .storages
        .get_storage(section.storage_id)
        .await
        .unwrap();
    assert_eq!(storage.sections.len(), 1);
    assert_eq!(storage.laboratory.as_ref().map(|l| l.code.as_str()), Some("LAB-A"));

    let details = app.services.sections.get_section(section.id).await.unwrap();
    assert_eq!(details.items.len(), 1);
    assert_eq!(details.storage.map(|s| s.code), Some("FRIDGE-1".to_string()));

    let lab_details = app
        .services
        .laboratories
        .get_laboratory(storage.storage.lab_id)
        .await
        .unwrap();
    assert_eq!(lab_details.storages.len(), 1);
}

#[tokio::test]
async fn statuses_default_and_validate() {
    let app = TestApp::new().await;
    let lab = app.seed_lab("LAB-A").await;
    let storage = app.seed_storage(lab.id, "F-1").await;
    assert_eq!(storage.status, StorageStatus::Running);

    let section = app.seed_section(storage.id, "S-1").await;
    assert_eq!(section.status, SectionStatus::Available);

    let mut request = storage_request(lab.id, "F-2");
    request.status = Some("exploded".to_string());
    assert_matches!(
        app.services.storages.create_storage(request, &app.admin).await,
        Err(ServiceError::ValidationError(_))
    );

    let mut request = section_request(storage.id, "S-1");
    request.status = Some("maintenance".to_string());
    let updated = app
        .services
        .sections
        .update_section(section.id, request, &app.admin)
        .await
        .unwrap();
    assert_eq!(updated.status, SectionStatus::Maintenance);

    let mut request = storage_request(lab.id, "F-3");
    request.security_level = 9;
    assert_matches!(
        app.services.storages.create_storage(request, &app.admin).await,
        Err(ServiceError::ValidationError(_))
    );

    let mut request = storage_request(lab.id, "F-4");
    request.properties = Some(json!(42));
    assert_matches!(
        app.services.storages.create_storage(request, &app.admin).await,
        Err(ServiceError::ValidationError(_))
    );
}

#[tokio::test]
async fn sections_filter_by_lab_and_capacity() {
    let app = TestApp::new().await;
    let lab_a = app.seed_lab("LAB-A").await;
    let lab_b = app.seed_lab("LAB-B").await;
    let fridge = app.seed_storage(lab_a.id, "F-1").await;
    let cabinet = app.seed_storage(lab_b.id, "C-1").await;

    let mut full = section_request(fridge.id, "S-FULL");
    full.used_capacity = 10;
    app.services.sections.create_section(full, &app.admin).await.unwrap();
    let mut empty = section_request(fridge.id, "S-EMPTY");
    empty.used_capacity = 1;
    app.services.sections.create_section(empty, &app.admin).await.unwrap();
    app.seed_section(cabinet.id, "S-OTHER").await;

    let in_lab_a = app
        .services
        .sections
        .list_sections(
            SectionFilter {
                lab_id: Some(lab_a.id),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(in_lab_a.total, 2);

    let full_only = app
        .services
        .sections
        .list_sections(
            SectionFilter {
                capacity: Some("full".to_string()),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(full_only.total, 1);
    assert_eq!(full_only.items[0].code, "S-FULL");

    let by_storage = app.services.sections.sections_by_storage(fridge.id).await.unwrap();
    assert_eq!(by_storage.len(), 2);

    let storages = app
        .services
        .storages
        .list_storages(
            StorageFilter {
                lab_id: Some(lab_b.id),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(storages.total, 1);
    assert_eq!(app.services.storages.storages_by_lab(lab_a.id).await.unwrap().len(), 1);
}

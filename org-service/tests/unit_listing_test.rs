//! Listing and tree-read integration tests for org-service.

mod common;

use common::{unit_id, TestApp};
use serde_json::Value;
use std::collections::HashSet;
use uuid::Uuid;

/// Seed Engineering(Backend, Frontend) and Sales at the root.
async fn seed_small_org(app: &TestApp, tenant_id: Uuid) -> Uuid {
    let eng = app.create_unit(tenant_id, "Engineering", None).await;
    let eng_id: Uuid = unit_id(&eng).parse().unwrap();
    app.create_unit(tenant_id, "Backend", Some(eng_id)).await;
    app.create_unit(tenant_id, "Frontend", Some(eng_id)).await;
    app.create_unit(tenant_id, "Sales", None).await;
    eng_id
}

fn collect_names(body: &Value) -> Vec<String> {
    body["items"]
        .as_array()
        .expect("items must be an array")
        .iter()
        .map(|u| u["name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn list_is_scoped_to_tenant_and_ordered_by_name() {
    // Arrange
    let app = TestApp::spawn().await;
    let tenant_a = app.seed_tenant().await;
    let tenant_b = app.seed_tenant().await;
    seed_small_org(&app, tenant_a).await;
    app.create_unit(tenant_b, "Marketing", None).await;

    // Act
    let response = app
        .client
        .get(format!(
            "{}/organization-units?tenant_id={}",
            app.address, tenant_a
        ))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["total"], 4);
    assert_eq!(
        collect_names(&body),
        vec!["Backend", "Engineering", "Frontend", "Sales"]
    );

    app.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn list_null_sentinel_returns_roots_only() {
    let app = TestApp::spawn().await;
    let tenant_id = app.seed_tenant().await;
    seed_small_org(&app, tenant_id).await;

    let response = app
        .client
        .get(format!(
            "{}/organization-units?tenant_id={}&parent_id=null",
            app.address, tenant_id
        ))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(collect_names(&body), vec!["Engineering", "Sales"]);

    app.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn list_filters_by_parent_id() {
    let app = TestApp::spawn().await;
    let tenant_id = app.seed_tenant().await;
    let eng_id = seed_small_org(&app, tenant_id).await;

    let response = app
        .client
        .get(format!(
            "{}/organization-units?tenant_id={}&parent_id={}",
            app.address, tenant_id, eng_id
        ))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(collect_names(&body), vec!["Backend", "Frontend"]);

    app.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn list_rejects_malformed_parent_id() {
    let app = TestApp::spawn().await;
    let tenant_id = app.seed_tenant().await;

    let response = app
        .client
        .get(format!(
            "{}/organization-units?tenant_id={}&parent_id=not-a-uuid",
            app.address, tenant_id
        ))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 400);

    app.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn list_level_one_matches_null_sentinel() {
    let app = TestApp::spawn().await;
    let tenant_id = app.seed_tenant().await;
    seed_small_org(&app, tenant_id).await;

    let response = app
        .client
        .get(format!(
            "{}/organization-units?tenant_id={}&level=1",
            app.address, tenant_id
        ))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(collect_names(&body), vec!["Engineering", "Sales"]);

    // Depth beyond the root level is not supported
    let response = app
        .client
        .get(format!(
            "{}/organization-units?tenant_id={}&level=2",
            app.address, tenant_id
        ))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 400);

    app.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn list_level_one_rejects_contradictory_parent_filter() {
    let app = TestApp::spawn().await;
    let tenant_id = app.seed_tenant().await;
    let eng_id = seed_small_org(&app, tenant_id).await;

    // level=1 means roots; a concrete parent_id contradicts it
    let response = app
        .client
        .get(format!(
            "{}/organization-units?tenant_id={}&level=1&parent_id={}",
            app.address, tenant_id, eng_id
        ))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 400);

    // parent_id=null agrees with level=1 and stays accepted
    let response = app
        .client
        .get(format!(
            "{}/organization-units?tenant_id={}&level=1&parent_id=null",
            app.address, tenant_id
        ))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(collect_names(&body), vec!["Engineering", "Sales"]);

    app.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn list_filters_by_name_and_status() {
    // Arrange
    let app = TestApp::spawn().await;
    let tenant_id = app.seed_tenant().await;
    let eng_id = seed_small_org(&app, tenant_id).await;

    let response = app
        .client
        .put(format!(
            "{}/organization-units/{}/status",
            app.address, eng_id
        ))
        .json(&serde_json::json!({"status": "inactive"}))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.status(), 200);

    // Act - case-insensitive substring match on the name
    let response = app
        .client
        .get(format!(
            "{}/organization-units?tenant_id={}&name=end",
            app.address, tenant_id
        ))
        .send()
        .await
        .expect("Failed to execute request");
    let body: Value = response.json().await.unwrap();
    assert_eq!(collect_names(&body), vec!["Backend", "Frontend"]);

    // Act - stored-status filter
    let response = app
        .client
        .get(format!(
            "{}/organization-units?tenant_id={}&status=inactive",
            app.address, tenant_id
        ))
        .send()
        .await
        .expect("Failed to execute request");
    let body: Value = response.json().await.unwrap();
    assert_eq!(collect_names(&body), vec!["Engineering"]);

    app.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn list_paginates_with_stable_order() {
    // Arrange - 5 roots named Unit 1..Unit 5
    let app = TestApp::spawn().await;
    let tenant_id = app.seed_tenant().await;
    for i in 1..=5 {
        app.create_unit(tenant_id, &format!("Unit {}", i), None)
            .await;
    }

    // Act
    let response = app
        .client
        .get(format!(
            "{}/organization-units?tenant_id={}&page=2&page_size=2",
            app.address, tenant_id
        ))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["total"], 5);
    assert_eq!(body["page"], 2);
    assert_eq!(body["page_size"], 2);
    assert_eq!(collect_names(&body), vec!["Unit 3", "Unit 4"]);

    app.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn tree_nests_children_under_parents() {
    // Arrange
    let app = TestApp::spawn().await;
    let tenant_id = app.seed_tenant().await;
    seed_small_org(&app, tenant_id).await;

    // Act
    let response = app
        .client
        .get(format!(
            "{}/organization-units/tree?tenant_id={}",
            app.address, tenant_id
        ))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status(), 200);
    let forest: Vec<Value> = response.json().await.unwrap();
    assert_eq!(forest.len(), 2);

    let eng = forest
        .iter()
        .find(|n| n["name"] == "Engineering")
        .expect("Engineering root missing");
    let child_names: Vec<&str> = eng["children"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(child_names, vec!["Backend", "Frontend"]);

    let sales = forest.iter().find(|n| n["name"] == "Sales").unwrap();
    assert!(sales["children"].as_array().unwrap().is_empty());

    app.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn tree_contains_every_listed_unit() {
    // Arrange
    let app = TestApp::spawn().await;
    let tenant_id = app.seed_tenant().await;
    seed_small_org(&app, tenant_id).await;

    let response = app
        .client
        .get(format!(
            "{}/organization-units?tenant_id={}&page_size=100",
            app.address, tenant_id
        ))
        .send()
        .await
        .expect("Failed to execute request");
    let flat: Value = response.json().await.unwrap();
    let flat_ids: HashSet<String> = flat["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["unit_id"].as_str().unwrap().to_string())
        .collect();

    // Act
    let response = app
        .client
        .get(format!(
            "{}/organization-units/tree?tenant_id={}",
            app.address, tenant_id
        ))
        .send()
        .await
        .expect("Failed to execute request");
    let forest: Vec<Value> = response.json().await.unwrap();

    // Assert - walking the forest yields exactly the flat listing
    let mut tree_ids = HashSet::new();
    let mut stack: Vec<&Value> = forest.iter().collect();
    while let Some(node) = stack.pop() {
        tree_ids.insert(node["unit_id"].as_str().unwrap().to_string());
        stack.extend(node["children"].as_array().unwrap().iter());
    }
    assert_eq!(tree_ids, flat_ids);

    app.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn tree_for_unknown_tenant_not_found() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .get(format!(
            "{}/organization-units/tree?tenant_id={}",
            app.address,
            Uuid::new_v4()
        ))
        .send()
        .await
        .expect("Failed to execute request");

    assert_eq!(response.status(), 404);

    app.cleanup().await;
}

#[tokio::test]
#[ignore] // Requires PostgreSQL
async fn get_unit_with_direct_children_only() {
    // Arrange - Engineering -> Backend -> API
    let app = TestApp::spawn().await;
    let tenant_id = app.seed_tenant().await;
    let eng = app.create_unit(tenant_id, "Engineering", None).await;
    let eng_id: Uuid = unit_id(&eng).parse().unwrap();
    let backend = app.create_unit(tenant_id, "Backend", Some(eng_id)).await;
    let backend_id: Uuid = unit_id(&backend).parse().unwrap();
    app.create_unit(tenant_id, "API", Some(backend_id)).await;

    // Act
    let response = app
        .client
        .get(format!(
            "{}/organization-units/{}?include_children=true",
            app.address, eng_id
        ))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert - one level only, grandchildren excluded
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["name"], "Engineering");
    let children = body["children"].as_array().unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0]["name"], "Backend");

    // Without the flag the children key is absent
    let body = app.get_unit(&eng_id.to_string()).await;
    assert!(body.get("children").is_none());

    app.cleanup().await;
}

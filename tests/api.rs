use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt;

use personal_crm::config::parse_config;
use personal_crm::db;
use personal_crm::migrate::migrate_pool;
use personal_crm::server::{build_router, AppState};

async fn setup() -> (TempDir, Router) {
    let tmp = TempDir::new().unwrap();
    let config = parse_config(&format!(
        r#"[db]
path = "{root}/crm.sqlite"

[server]
bind = "127.0.0.1:0"
cors_origins = ["*"]

[storage]
photos_dir = "{root}/photos"
max_photo_bytes = 64

[pagination]
default_page_size = 2
max_page_size = 10
"#,
        root = tmp.path().display()
    ))
    .unwrap();

    let pool = db::connect(&config).await.unwrap();
    migrate_pool(&pool).await.unwrap();
    let app = build_router(AppState::new(config, pool)).unwrap();
    (tmp, app)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn status_id(app: &Router, name: &str) -> String {
    let (_, statuses) = send(app, Method::GET, "/api/v1/statuses", None).await;
    statuses
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["name"] == name)
        .map(|s| s["id"].as_str().unwrap().to_string())
        .unwrap()
}

async fn create(app: &Router, first_name: &str, status: &str) -> String {
    let (code, contact) = send(
        app,
        Method::POST,
        "/api/v1/contacts",
        Some(json!({ "first_name": first_name, "status_id": status })),
    )
    .await;
    assert_eq!(code, StatusCode::CREATED, "{}", contact);
    contact["id"].as_str().unwrap().to_string()
}

async fn column(app: &Router, status: &str) -> Vec<(String, i64)> {
    let (_, page) = send(
        app,
        Method::GET,
        &format!("/api/v1/contacts?status_id={}&page_size=10", status),
        None,
    )
    .await;
    let mut cells = Vec::new();
    for item in page["data"].as_array().unwrap() {
        let id = item["id"].as_str().unwrap();
        let (_, contact) = send(app, Method::GET, &format!("/api/v1/contacts/{}", id), None).await;
        cells.push((
            contact["first_name"].as_str().unwrap().to_string(),
            contact["sort_order_in_status"].as_i64().unwrap(),
        ));
    }
    cells.sort_by_key(|(_, position)| *position);
    cells
}

fn names(cells: &[(String, i64)]) -> Vec<&str> {
    cells.iter().map(|(name, _)| name.as_str()).collect()
}

#[tokio::test]
async fn test_health() {
    let (_tmp, app) = setup().await;
    let (code, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_move_within_column() {
    let (_tmp, app) = setup().await;
    let new = status_id(&app, "New").await;
    let a = create(&app, "A", &new).await;
    create(&app, "B", &new).await;
    create(&app, "C", &new).await;
    create(&app, "D", &new).await;

    let (code, moved) = send(
        &app,
        Method::POST,
        "/api/v1/kanban/move",
        Some(json!({ "contact_id": a, "status_id": new, "position": 2 })),
    )
    .await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(moved["sort_order_in_status"], 2);

    let cells = column(&app, &new).await;
    assert_eq!(names(&cells), vec!["B", "C", "A", "D"]);
    let positions: Vec<i64> = cells.iter().map(|(_, p)| *p).collect();
    assert_eq!(positions, vec![0, 1, 2, 3]);
}

#[tokio::test]
async fn test_move_across_columns_and_clamp() {
    let (_tmp, app) = setup().await;
    let new = status_id(&app, "New").await;
    let active = status_id(&app, "Active").await;
    let a = create(&app, "A", &new).await;
    create(&app, "B", &new).await;
    create(&app, "X", &active).await;

    let (code, moved) = send(
        &app,
        Method::POST,
        "/api/v1/kanban/move",
        Some(json!({ "contact_id": a, "status_id": active, "position": 99 })),
    )
    .await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(moved["sort_order_in_status"], 1);

    assert_eq!(column(&app, &new).await, vec![("B".to_string(), 0)]);
    assert_eq!(names(&column(&app, &active).await), vec!["X", "A"]);
}

#[tokio::test]
async fn test_move_errors() {
    let (_tmp, app) = setup().await;
    let new = status_id(&app, "New").await;
    let a = create(&app, "A", &new).await;

    let (code, body) = send(
        &app,
        Method::POST,
        "/api/v1/kanban/move",
        Some(json!({ "contact_id": "ghost", "status_id": new, "position": 0 })),
    )
    .await;
    assert_eq!(code, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");

    let (code, _) = send(
        &app,
        Method::POST,
        "/api/v1/kanban/move",
        Some(json!({ "contact_id": a, "status_id": "nowhere", "position": 0 })),
    )
    .await;
    assert_eq!(code, StatusCode::NOT_FOUND);

    let (code, body) = send(
        &app,
        Method::POST,
        "/api/v1/kanban/move",
        Some(json!({ "contact_id": a, "status_id": new, "position": -1 })),
    )
    .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    let (code, _) = send(
        &app,
        Method::POST,
        "/api/v1/kanban/move",
        Some(json!({ "contact_id": a })),
    )
    .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_clusters_and_graph() {
    let (_tmp, app) = setup().await;
    let new = status_id(&app, "New").await;
    let mut ids = Vec::new();
    for name in ["A", "B", "C", "D", "E"] {
        ids.push(create(&app, name, &new).await);
    }
    for (s, t) in [(0, 1), (1, 2), (3, 4)] {
        let (code, _) = send(
            &app,
            Method::POST,
            "/api/v1/graph/edges",
            Some(json!({ "source_id": ids[s], "target_id": ids[t] })),
        )
        .await;
        assert_eq!(code, StatusCode::CREATED);
    }

    let (code, reverse) = send(
        &app,
        Method::POST,
        "/api/v1/graph/edges",
        Some(json!({ "source_id": ids[1], "target_id": ids[0] })),
    )
    .await;
    assert_eq!(code, StatusCode::CONFLICT, "{}", reverse);

    let (code, summary) = send(&app, Method::POST, "/api/v1/graph/clusters/recompute", None).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(summary["clusters_found"], 2);
    assert_eq!(summary["contacts_updated"], 5);
    assert_eq!(summary["algorithm"], "connected_components");

    let (_, graph) = send(&app, Method::GET, "/api/v1/graph", None).await;
    let clusters = graph["clusters"].as_array().unwrap();
    assert_eq!(clusters.len(), 2);
    assert_eq!(clusters[0]["contact_count"], 3);
    assert_eq!(clusters[1]["contact_count"], 2);
    assert_ne!(clusters[0]["color"], clusters[1]["color"]);

    // Same data, same labels.
    let (_, first) = send(&app, Method::GET, &format!("/api/v1/contacts/{}", ids[4]), None).await;
    send(&app, Method::POST, "/api/v1/graph/clusters/recompute", None).await;
    let (_, second) = send(&app, Method::GET, &format!("/api/v1/contacts/{}", ids[4]), None).await;
    assert_eq!(first["cluster_id"], second["cluster_id"]);
}

#[tokio::test]
async fn test_recompute_on_empty_graph() {
    let (_tmp, app) = setup().await;
    let (code, summary) = send(&app, Method::POST, "/api/v1/graph/clusters/recompute", None).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(summary["clusters_found"], 0);
    assert_eq!(summary["contacts_updated"], 0);
}

#[tokio::test]
async fn test_contact_crud_and_pagination() {
    let (_tmp, app) = setup().await;
    let (code, contact) = send(
        &app,
        Method::POST,
        "/api/v1/contacts",
        Some(json!({
            "first_name": "Ann",
            "last_name": "Lee",
            "status": { "name": "Friends" },
            "tags": [{ "name": "climbing" }],
            "interests": [{ "name": "rust" }]
        })),
    )
    .await;
    assert_eq!(code, StatusCode::CREATED);
    assert_eq!(contact["status"]["name"], "Friends");
    let id = contact["id"].as_str().unwrap().to_string();
    let tag = contact["tags"][0]["id"].as_str().unwrap().to_string();

    create(&app, "Bob", &status_id(&app, "New").await).await;
    create(&app, "Cat", &status_id(&app, "New").await).await;

    let (_, page) = send(&app, Method::GET, "/api/v1/contacts", None).await;
    assert_eq!(page["pagination"]["page_size"], 2);
    assert_eq!(page["pagination"]["total_items"], 3);
    assert_eq!(page["pagination"]["total_pages"], 2);
    assert_eq!(page["data"].as_array().unwrap().len(), 2);

    let (_, page) = send(
        &app,
        Method::GET,
        &format!("/api/v1/contacts?tag_ids={}", tag),
        None,
    )
    .await;
    assert_eq!(page["pagination"]["total_items"], 1);

    let (code, _) = send(&app, Method::GET, "/api/v1/contacts?page_size=500", None).await;
    assert_eq!(code, StatusCode::BAD_REQUEST);

    let (code, updated) = send(
        &app,
        Method::PATCH,
        &format!("/api/v1/contacts/{}", id),
        Some(json!({ "notes": "belays well", "tags": [] })),
    )
    .await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(updated["notes"], "belays well");
    assert_eq!(updated["last_name"], "Lee");
    assert_eq!(updated["tags"].as_array().unwrap().len(), 0);

    let (_, suggestions) = send(
        &app,
        Method::GET,
        "/api/v1/suggestions/tags?q=CLIMB",
        None,
    )
    .await;
    assert_eq!(suggestions[0]["name"], "climbing");
    assert_eq!(suggestions[0]["usage_count"], 0);

    let (code, _) = send(&app, Method::DELETE, &format!("/api/v1/contacts/{}", id), None).await;
    assert_eq!(code, StatusCode::NO_CONTENT);
    let (code, body) = send(&app, Method::GET, &format!("/api/v1/contacts/{}", id), None).await;
    assert_eq!(code, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn test_suggestion_validation() {
    let (_tmp, app) = setup().await;
    let (code, _) = send(&app, Method::GET, "/api/v1/suggestions/tags?q=", None).await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    let (code, _) = send(&app, Method::GET, "/api/v1/suggestions/tags?q=a&limit=51", None).await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    let (code, _) = send(&app, Method::GET, "/api/v1/suggestions/pets?q=a", None).await;
    assert_eq!(code, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_status_endpoints() {
    let (_tmp, app) = setup().await;
    let (code, created) = send(
        &app,
        Method::POST,
        "/api/v1/statuses",
        Some(json!({ "name": "Later" })),
    )
    .await;
    assert_eq!(code, StatusCode::CREATED);
    assert_eq!(created["sort_order"], 5);

    let (code, _) = send(
        &app,
        Method::POST,
        "/api/v1/statuses",
        Some(json!({ "name": "later" })),
    )
    .await;
    assert_eq!(code, StatusCode::CONFLICT);

    let new = status_id(&app, "New").await;
    create(&app, "Ann", &new).await;
    let (code, body) = send(&app, Method::DELETE, &format!("/api/v1/statuses/{}", new), None).await;
    assert_eq!(code, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "conflict");

    let (_, statuses) = send(&app, Method::GET, "/api/v1/statuses", None).await;
    let mut order: Vec<String> = statuses
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap().to_string())
        .collect();
    order.reverse();
    let (code, reordered) = send(
        &app,
        Method::POST,
        "/api/v1/statuses/reorder",
        Some(json!({ "order": order })),
    )
    .await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(reordered[0]["name"], "Later");
    assert_eq!(reordered[4]["contact_count"], 1);
}

#[tokio::test]
async fn test_photo_upload_serve_and_remove() {
    let (_tmp, app) = setup().await;
    let id = create(&app, "Ann", &status_id(&app, "New").await).await;
    let uri = format!("/api/v1/contacts/{}/photo", id);

    let upload = |content_type: &'static str, bytes: Vec<u8>| {
        Request::builder()
            .method(Method::PUT)
            .uri(uri.clone())
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(bytes))
            .unwrap()
    };

    let response = app
        .clone()
        .oneshot(upload("image/gif", vec![1, 2, 3]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(upload("image/png", vec![0; 65]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let response = app
        .clone()
        .oneshot(upload("image/png", vec![7; 16]))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let contact: Value = serde_json::from_slice(&bytes).unwrap();
    let photo_url = contact["photo_url"].as_str().unwrap().to_string();
    assert!(photo_url.starts_with("/api/v1/photos/"));

    let response = app
        .clone()
        .oneshot(Request::builder().uri(&photo_url).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let served = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(served.as_ref(), &[7u8; 16][..]);

    let (code, contact) = send(&app, Method::DELETE, &uri, None).await;
    assert_eq!(code, StatusCode::OK);
    assert!(contact["photo_url"].is_null());
    let (code, _) = send(&app, Method::GET, &photo_url, None).await;
    assert_eq!(code, StatusCode::NOT_FOUND);
}

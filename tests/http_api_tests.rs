use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use crudkit::controller::{KeyBinding, RouteAuth, WritableController};
use crudkit::dao::{Dao, DaoCore};
use crudkit::engine::{MemoryEngine, MemoryStore};
use crudkit::schema::SchemaNode;
use crudkit::service::{RuleValidator, WritableService};
use crudkit::web::{header_identity, router};
use http_body_util::BodyExt;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceExt;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct Driver {
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    rating: Option<i64>,
}

async fn app(store: &MemoryStore, drivers: usize) -> axum::Router {
    let node = SchemaNode::builder("driver")
        .generated("id")
        .primary(&["id"])
        .columns(&["name", "rating"])
        .build()
        .expect("driver schema");

    let seed = (1..=drivers)
        .map(|n| {
            json!({"name": format!("driver-{n}"), "rating": n})
                .as_object()
                .cloned()
                .expect("object")
        })
        .collect();
    store.seed(&node, seed).await.expect("seed drivers");

    let dao: Arc<Dao<Driver, MemoryEngine<String>>> = Arc::new(Dao::new(
        DaoCore::new(store.engine(node)).insertable(&["name", "rating"]),
    ));
    let service = WritableService::new(dao).validator(
        RuleValidator::new()
            .required("name")
            .max_length("name", 32)
            .min("rating", 0.0),
    );
    let controller = Arc::new(WritableController::new(service, KeyBinding::integer("id")));
    router(
        controller.routes("/drivers", "/drivers/:id", RouteAuth::Required),
        header_identity("x-user"),
    )
}

fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-user", "dispatcher")
        .header("content-type", "application/json");
    match body {
        Some(body) => builder.body(Body::from(body.to_string())),
        None => builder.body(Body::empty()),
    }
    .expect("request")
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("response body")
        .to_bytes();
    (status, serde_json::from_slice(&bytes).expect("json body"))
}

#[tokio::test]
async fn find_projects_requested_fields_and_counts_all_rows() {
    let store = MemoryStore::new();
    let app = app(&store, 8).await;

    let (status, body) = send(
        &app,
        request(Method::GET, "/drivers?fields=id,name&limit=500", None),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalCount"], 8);
    let data = body["data"].as_array().expect("data");
    assert_eq!(data.len(), 8);
    for row in data {
        let keys: Vec<&str> = row
            .as_object()
            .expect("row")
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys.len(), 2);
        assert!(keys.contains(&"id") && keys.contains(&"name"));
    }
}

#[tokio::test]
async fn anonymous_callers_are_unauthorized() {
    let store = MemoryStore::new();
    let app = app(&store, 1).await;

    let anonymous = Request::builder()
        .uri("/drivers")
        .body(Body::empty())
        .expect("request");
    let (status, body) = send(&app, anonymous).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}

#[tokio::test]
async fn find_one_for_unknown_key_is_not_found() {
    let store = MemoryStore::new();
    let app = app(&store, 2).await;

    let (status, body) = send(&app, request(Method::GET, "/drivers/2", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "driver-2");

    let (status, _) = send(&app, request(Method::GET, "/drivers/99", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn limit_above_max_is_a_bad_request() {
    let store = MemoryStore::new();
    let app = app(&store, 1).await;

    let (status, body) = send(&app, request(Method::GET, "/drivers?limit=1000", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().expect("message").contains("500"));

    let (status, body) = send(&app, request(Method::GET, "/drivers?limit=-5", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
    assert_eq!(body["totalCount"], 1);
}

#[tokio::test]
async fn malformed_filter_reports_position() {
    let store = MemoryStore::new();
    let app = app(&store, 1).await;

    let (status, body) = send(
        &app,
        request(Method::GET, "/drivers?filter=name%20%3D%20", None),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid filter query parameter");
    assert!(body["annotatedInput"].as_str().expect("annotated").contains('^'));
}

#[tokio::test]
async fn update_with_mismatched_identity_never_writes() {
    let store = MemoryStore::new();
    let app = app(&store, 2).await;

    let (status, body) = send(
        &app,
        request(
            Method::PUT,
            "/drivers/1",
            Some(json!({"id": 2, "name": "renamed"})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Request path does not match body payload");
    assert!(
        store
            .rows("driver")
            .await
            .iter()
            .all(|row| row["name"] != "renamed")
    );
}

#[tokio::test]
async fn invalid_insert_carries_field_errors() {
    let store = MemoryStore::new();
    let app = app(&store, 0).await;

    let (status, body) = send(
        &app,
        request(Method::POST, "/drivers", Some(json!({"rating": -1}))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_failed");
    assert!(!body["errors"].as_array().expect("errors").is_empty());
    assert!(store.rows("driver").await.is_empty());
}

#[tokio::test]
async fn insert_update_remove_round_trip() {
    let store = MemoryStore::new();
    let app = app(&store, 0).await;

    let (status, body) = send(
        &app,
        request(Method::POST, "/drivers", Some(json!({"name": "Ada", "rating": 5}))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = body["data"]["id"].as_i64().expect("generated id");

    let (status, body) = send(
        &app,
        request(
            Method::PUT,
            &format!("/drivers/{id}"),
            Some(json!({"id": id, "name": "Ada L.", "rating": 5})),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Ada L.");

    let (status, body) = send(&app, request(Method::DELETE, &format!("/drivers/{id}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"success": true}));

    let (status, _) = send(&app, request(Method::DELETE, &format!("/drivers/{id}"), None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

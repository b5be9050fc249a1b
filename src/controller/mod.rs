//! Controllers: the request-parameter pipeline in front of a service.
//!
//! A controller turns an [`ApiRequest`] into service calls: it parses the
//! fields, filter, sorts and pagination keys of the query, maps path
//! parameters and bodies onto models through an [`EntityBinding`], and
//! shapes the result. Routes are registered explicitly into a
//! [`RouteTable`], whose auth gate runs before every handler.

mod binding;
mod config;
mod params;
mod readable;
mod request;
mod response;
mod routes;
mod writable;

pub use binding::{EntityBinding, KeyBinding};
pub use config::{ControllerConfig, DefaultSortFn, ParamsFilterFn, QueryFilterFn};
pub use params::parse_pagination;
pub use readable::ReadableController;
pub use request::{ApiRequest, Headers, Params, QueryValue};
pub use response::{ApiResponse, DataResponse, FindResponse, SuccessResponse};
pub use routes::{AuthCheck, Method, Route, RouteAuth, RouteHandler, RouteMetadata, RouteTable};
pub use writable::WritableController;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CrudError, LimitDefault};
    use crate::dao::{Dao, DaoCore, Writer};
    use crate::engine::{MemoryEngine, MemoryStore};
    use crate::query::{Filter, ItemsRequest, SortBy};
    use crate::schema::SchemaNode;
    use crate::service::{ReadableService, WritableService};
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Driver {
        #[serde(skip_serializing_if = "Option::is_none")]
        id: Option<i64>,
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        fleet: Option<String>,
    }

    type DriverDao = Dao<Driver, MemoryEngine<String>>;
    type Drivers = WritableController<DriverDao, KeyBinding>;

    fn driver(name: &str, fleet: &str) -> Driver {
        Driver {
            id: None,
            name: name.to_string(),
            fleet: Some(fleet.to_string()),
        }
    }

    async fn seeded_dao(store: &MemoryStore) -> Arc<DriverDao> {
        let node = SchemaNode::builder("driver")
            .generated("id")
            .primary(&["id"])
            .columns(&["name", "fleet"])
            .build()
            .unwrap();
        let dao = Arc::new(Dao::new(
            DaoCore::new(store.engine(node)).insertable(&["name", "fleet"]),
        ));
        dao.insert_many(
            ItemsRequest::new(vec![
                driver("Ada", "north"),
                driver("Grace", "south"),
                driver("Linus", "north"),
            ]),
            None,
        )
        .await
        .unwrap();
        dao
    }

    async fn controller(store: &MemoryStore) -> Drivers {
        WritableController::new(
            WritableService::new(seeded_dao(store).await),
            KeyBinding::integer("id"),
        )
    }

    fn caller() -> Option<String> {
        Some("dispatcher".to_string())
    }

    #[tokio::test]
    async fn find_projects_filters_and_counts() {
        let store = MemoryStore::new();
        let drivers = controller(&store).await;

        let response = drivers
            .find(
                &ApiRequest::new()
                    .query("fields", "id")
                    .query("fields", "name")
                    .query("filter", "fleet = 'north'")
                    .query("sorts", "name desc")
                    .query("limit", "1"),
            )
            .await
            .unwrap();

        assert_eq!(response.total_count, 2);
        assert_eq!(response.data, vec![json!({"id": 3, "name": "Linus"})]);
    }

    #[tokio::test]
    async fn malformed_filter_is_annotated() {
        let store = MemoryStore::new();
        let drivers = controller(&store).await;

        let err = drivers
            .find(&ApiRequest::new().query("filter", "name = "))
            .await
            .unwrap_err();
        match err {
            CrudError::BadRequest {
                message,
                reason,
                annotated_input,
            } => {
                assert_eq!(message, "Invalid filter query parameter");
                assert!(reason.is_some());
                assert!(annotated_input.unwrap().contains('^'));
            }
            other => panic!("unexpected error {other:?}"),
        }

        let err = drivers
            .find(&ApiRequest::new().query("filter", "a = 1").query("filter", "b = 2"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), 400);
    }

    #[tokio::test]
    async fn deeply_nested_filter_is_a_bad_request() {
        let store = MemoryStore::new();
        let drivers = controller(&store).await;

        let filter = format!("{}name = 'Ada'", "not ".repeat(2000));
        let err = drivers
            .find(&ApiRequest::new().query("filter", filter))
            .await
            .unwrap_err();
        assert_eq!(err.status(), 400);
        let payload = err.payload();
        assert_eq!(payload.message, "Invalid filter query parameter");
        assert!(
            payload
                .reason
                .as_deref()
                .unwrap()
                .contains("Filter nesting too deep")
        );
    }

    #[tokio::test]
    async fn unknown_field_is_rejected_with_reason() {
        let store = MemoryStore::new();
        let drivers = controller(&store).await;

        let err = drivers
            .find(&ApiRequest::new().query("fields", "id,salary"))
            .await
            .unwrap_err();
        let payload = err.payload();
        assert_eq!(payload.message, "Invalid fields query parameter");
        assert_eq!(payload.reason.as_deref(), Some("Invalid field with path salary"));
    }

    #[tokio::test]
    async fn limit_above_max_is_rejected() {
        let store = MemoryStore::new();
        let drivers = controller(&store).await;

        let err = drivers
            .find(&ApiRequest::new().query("limit", "1000"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), 400);
        assert!(err.payload().message.contains("500"));
    }

    #[tokio::test]
    async fn configured_filters_and_default_sort_apply() {
        let store = MemoryStore::new();
        let service = ReadableService::new(seeded_dao(&store).await);
        let config = ControllerConfig::new()
            .default_limit(LimitDefault::UseMax)
            .default_sort_by(|schema: &SchemaNode| {
                vec![SortBy::desc(&schema.resolve("name").unwrap())]
            })
            .additional_filter("fleet", |schema, value, _auth| {
                Ok(value.and_then(QueryValue::as_single).map(|fleet| {
                    Filter::eq(&schema.resolve("fleet").unwrap(), json!(fleet))
                }))
            })
            .find_params_filter(|schema, params, _auth| {
                Ok(params.get("initial").map(|initial| {
                    Filter::like(&schema.resolve("name").unwrap(), format!("{initial}%"))
                }))
            });
        let drivers = ReadableController::new(service, KeyBinding::integer("id")).with_config(config);

        let all_north = drivers
            .find(&ApiRequest::new().query("fleet", "north"))
            .await
            .unwrap();
        let names: Vec<&str> = all_north
            .data
            .iter()
            .filter_map(|row| row["name"].as_str())
            .collect();
        assert_eq!(names, vec!["Linus", "Ada"]);

        let scoped = drivers
            .find(&ApiRequest::new().query("fleet", "north").param("initial", "A"))
            .await
            .unwrap();
        assert_eq!(scoped.total_count, 1);
    }

    #[tokio::test]
    async fn find_one_missing_row_is_not_found() {
        let store = MemoryStore::new();
        let drivers = controller(&store).await;

        let found = drivers
            .find_one(&ApiRequest::new().param("id", "2"))
            .await
            .unwrap();
        assert_eq!(found.data["name"], "Grace");

        let err = drivers
            .find_one(&ApiRequest::new().param("id", "99"))
            .await
            .unwrap_err();
        assert!(matches!(err, CrudError::NotFound(_)));
    }

    #[tokio::test]
    async fn update_rejects_mismatched_identity_before_writing() {
        let store = MemoryStore::new();
        let drivers = controller(&store).await;

        let err = drivers
            .update(
                ApiRequest::new()
                    .param("id", "1")
                    .body(json!({"id": 2, "name": "Mallory"})),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.payload().message,
            "Request path does not match body payload"
        );
        let rows = store.rows("driver").await;
        assert!(rows.iter().all(|row| row["name"] != "Mallory"));
    }

    #[tokio::test]
    async fn write_bodies_are_checked_before_the_service() {
        let store = MemoryStore::new();
        let drivers = controller(&store).await;

        let err = drivers.insert(ApiRequest::new()).await.unwrap_err();
        assert_eq!(err.payload().message, "Missing body payload");

        let err = drivers
            .insert(ApiRequest::new().body(json!({"name": 42})))
            .await
            .unwrap_err();
        assert_eq!(err.payload().message, "Invalid body payload");
    }

    #[tokio::test]
    async fn write_round_trip() {
        let store = MemoryStore::new();
        let drivers = controller(&store).await;

        let inserted = drivers
            .insert(
                ApiRequest::new()
                    .body(json!({"name": "Barbara", "fleet": "east"}))
                    .auth(caller()),
            )
            .await
            .unwrap();
        assert_eq!(inserted.data["id"], 4);

        let updated = drivers
            .update(
                ApiRequest::new()
                    .param("id", "4")
                    .body(json!({"id": 4, "name": "Barbara L.", "fleet": "east"})),
            )
            .await
            .unwrap();
        assert_eq!(updated.data["name"], "Barbara L.");

        let removed = drivers
            .remove(ApiRequest::new().param("id", "4"))
            .await
            .unwrap();
        assert!(removed.success);
        assert_eq!(store.rows("driver").await.len(), 3);
    }

    #[tokio::test]
    async fn routes_gate_on_auth() {
        let store = MemoryStore::new();
        let drivers = Arc::new(controller(&store).await);
        let table = drivers.routes("/drivers", "/drivers/:id", RouteAuth::Required);

        let methods: Vec<(Method, &str)> = table
            .routes()
            .iter()
            .map(|route| (route.method, route.path.as_str()))
            .collect();
        assert_eq!(
            methods,
            vec![
                (Method::Get, "/drivers"),
                (Method::Get, "/drivers/:id"),
                (Method::Post, "/drivers"),
                (Method::Put, "/drivers/:id"),
                (Method::Delete, "/drivers/:id"),
            ]
        );

        let find = table.find(Method::Get, "/drivers").unwrap();
        let err = find.call(ApiRequest::new()).await.unwrap_err();
        assert!(matches!(err, CrudError::Unauthorized));

        let response = find.call(ApiRequest::new().auth(caller())).await.unwrap();
        assert_eq!(response.value["totalCount"], 3);
    }
}

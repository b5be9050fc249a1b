//! Data-access objects.
//!
//! A dao is assembled from capabilities layered over a [`DaoBase`] context:
//! [`Reader`] for queries, [`Writer`] for insert/update/remove, [`Upserter`]
//! for reconciliation on unique fields and [`Replacer`] for scoped
//! replacement. Each capability is a trait with default methods, so an entity
//! type opts into exactly the ones it implements.

mod context;
mod keys;
mod mapper;
mod reader;
mod record;
mod replacer;
mod upserter;
mod writer;

pub use context::DaoCore;
pub use keys::primary_key_filter;
pub use mapper::{RowMapper, SerdeMapper};
pub use reader::{Counted, Reader};
pub use record::{Partition, RecordKey, RecordMap, adopt_identity, partition};
pub use replacer::Replacer;
pub use upserter::Upserter;
pub use writer::Writer;

use crate::engine::QueryEngine;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// Caller identity type of a dao.
pub type AuthOf<D> = <<D as DaoBase>::Engine as QueryEngine>::Auth;

/// Transaction handle type of a dao.
pub type TxOf<D> = <<D as DaoBase>::Engine as QueryEngine>::Tx;

/// Context every capability builds on: the shared core and the model mapper.
pub trait DaoBase: Send + Sync {
    type Model: Send + Sync + 'static;
    type Engine: QueryEngine;

    fn core(&self) -> &DaoCore<Self::Engine>;

    fn mapper(&self) -> &dyn RowMapper<Self::Model>;
}

/// General-purpose dao carrying every capability.
pub struct Dao<M, E: QueryEngine> {
    core: DaoCore<E>,
    mapper: Arc<dyn RowMapper<M>>,
}

impl<M, E> Dao<M, E>
where
    M: Serialize + DeserializeOwned + Send + Sync + 'static,
    E: QueryEngine,
{
    /// Dao mapping models through their serde representation.
    pub fn new(core: DaoCore<E>) -> Self {
        Self::with_mapper(core, SerdeMapper::default())
    }
}

impl<M, E> Dao<M, E>
where
    M: Send + Sync + 'static,
    E: QueryEngine,
{
    pub fn with_mapper(core: DaoCore<E>, mapper: impl RowMapper<M>) -> Self {
        Self {
            core,
            mapper: Arc::new(mapper),
        }
    }
}

impl<M, E> DaoBase for Dao<M, E>
where
    M: Send + Sync + 'static,
    E: QueryEngine,
{
    type Model = M;
    type Engine = E;

    fn core(&self) -> &DaoCore<E> {
        &self.core
    }

    fn mapper(&self) -> &dyn RowMapper<M> {
        self.mapper.as_ref()
    }
}

impl<M: Send + Sync + 'static, E: QueryEngine> Reader for Dao<M, E> {}
impl<M: Send + Sync + 'static, E: QueryEngine> Writer for Dao<M, E> {}
impl<M: Send + Sync + 'static, E: QueryEngine> Upserter for Dao<M, E> {}
impl<M: Send + Sync + 'static, E: QueryEngine> Replacer for Dao<M, E> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{CrudError, Row};
    use crate::engine::{MemoryEngine, MemoryStore};
    use crate::query::{
        CountQuery, Filter, FindQuery, ItemRequest, ItemsRequest, Pagination, RemoveWithFilterQuery,
        ReplaceQuery, SortBy, UpdateWithFilterQuery,
    };
    use crate::schema::SchemaNode;
    use serde::Deserialize;
    use serde_json::{Value as JsonValue, json};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Setting {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<i64>,
        key: String,
        value: i64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        owner: Option<i64>,
    }

    fn setting(key: &str, value: i64) -> Setting {
        Setting {
            id: None,
            key: key.to_string(),
            value,
            owner: None,
        }
    }

    fn row(value: JsonValue) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn settings_node() -> Arc<SchemaNode> {
        SchemaNode::builder("setting")
            .generated("id")
            .primary(&["id"])
            .columns(&["value", "owner"])
            .unique(&["key"])
            .build()
            .unwrap()
    }

    async fn settings_dao(store: &MemoryStore) -> Dao<Setting, MemoryEngine<()>> {
        let core = DaoCore::new(store.engine(settings_node()))
            .insertable(&["key", "value", "owner"])
            .updatable(&["value", "owner"])
            .unique(&["key"]);
        Dao::new(core)
    }

    #[tokio::test]
    async fn insert_refetches_generated_keys() {
        let store = MemoryStore::new();
        let dao = settings_dao(&store).await;

        let inserted = dao
            .insert_one(ItemRequest::new(setting("theme", 1)), None)
            .await
            .unwrap();
        assert_eq!(inserted.id, Some(1));

        let found = dao
            .find_one_by_primary_fields(ItemRequest::new(inserted.clone()), None)
            .await
            .unwrap();
        assert_eq!(found, Some(inserted));
    }

    #[tokio::test]
    async fn insert_without_insertable_fields_is_rejected() {
        let store = MemoryStore::new();
        let dao: Dao<Setting, _> = Dao::new(DaoCore::new(store.engine::<()>(settings_node())));

        let err = dao
            .insert_one(ItemRequest::new(setting("theme", 1)), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CrudError::BadRequest { .. }));
        assert!(store.rows("setting").await.is_empty());
    }

    #[tokio::test]
    async fn update_without_updatable_fields_still_refetches() {
        let store = MemoryStore::new();
        let core = DaoCore::new(store.engine::<()>(settings_node()))
            .insertable(&["key", "value"])
            .updatable(&[]);
        let dao: Dao<Setting, _> = Dao::new(core);

        let inserted = dao
            .insert_one(ItemRequest::new(setting("theme", 1)), None)
            .await
            .unwrap();
        let updated = dao
            .update_one(
                ItemRequest::new(Setting {
                    value: 5,
                    ..inserted.clone()
                }),
                None,
            )
            .await
            .unwrap();
        assert_eq!(updated, inserted);
    }

    #[tokio::test]
    async fn find_with_count_ignores_pagination() {
        let store = MemoryStore::new();
        let dao = settings_dao(&store).await;
        let items = vec![setting("a", 1), setting("b", 2), setting("c", 3)];
        dao.insert_many(ItemsRequest::new(items), None).await.unwrap();

        let page = dao
            .find_all_with_count(
                |schema: &SchemaNode| {
                    let value = schema.resolve("value").unwrap();
                    FindQuery::new()
                        .sort_by(vec![SortBy::desc(&value)])
                        .pagination(Pagination::limit(2))
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(page.count, 3);
        assert_eq!(
            page.rows.iter().map(|s| s.key.as_str()).collect::<Vec<_>>(),
            vec!["c", "b"]
        );

        let exists = dao
            .find_exists_with_filter(
                |schema: &SchemaNode| {
                    let key = schema.resolve("key").unwrap();
                    CountQuery::new(Some(Filter::eq(&key, json!("b"))), None)
                },
                None,
            )
            .await
            .unwrap();
        assert!(exists);
    }

    #[tokio::test]
    async fn upsert_updates_matches_and_inserts_the_rest() {
        let store = MemoryStore::new();
        let dao = settings_dao(&store).await;
        dao.insert_one(ItemRequest::new(setting("a", 99)), None)
            .await
            .unwrap();

        let persisted = dao
            .upsert_many(
                ItemsRequest::new(vec![setting("a", 1), setting("b", 2)]),
                None,
            )
            .await
            .unwrap();
        assert_eq!(persisted.len(), 2);

        let rows = store.rows("setting").await;
        assert_eq!(rows.len(), 2);
        let a = rows.iter().find(|r| r["key"] == json!("a")).unwrap();
        assert_eq!(a["value"], json!(1));
        assert_eq!(a["id"], json!(1));
    }

    #[tokio::test]
    async fn upsert_keeps_existing_identity() {
        let store = MemoryStore::new();
        let dao = settings_dao(&store).await;
        dao.insert_one(ItemRequest::new(setting("a", 1)), None)
            .await
            .unwrap();

        let upserted = dao
            .upsert_one_raw(ItemRequest::new(row(json!({"id": 42, "key": "a", "value": 7}))), None)
            .await
            .unwrap();
        assert_eq!(upserted["id"], json!(1));
        assert_eq!(upserted["value"], json!(7));
    }

    #[tokio::test]
    async fn replace_removes_rows_outside_new_items() {
        let store = MemoryStore::new();
        let dao = settings_dao(&store).await;
        let items = vec![
            Setting { owner: Some(1), ..setting("a", 1) },
            Setting { owner: Some(1), ..setting("b", 2) },
            Setting { owner: Some(2), ..setting("z", 9) },
        ];
        dao.insert_many(ItemsRequest::new(items), None).await.unwrap();

        let replaced = dao
            .replace_many(
                |schema: &SchemaNode| {
                    let owner = schema.resolve("owner").unwrap();
                    ReplaceQuery::new(
                        vec![
                            Setting { owner: Some(1), ..setting("b", 20) },
                            Setting { owner: Some(1), ..setting("c", 3) },
                        ],
                        Filter::eq(&owner, json!(1)),
                    )
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(replaced.len(), 2);

        let mut keys: Vec<String> = store
            .rows("setting")
            .await
            .iter()
            .map(|r| r["key"].as_str().unwrap().to_string())
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["b", "c", "z"]);
    }

    #[tokio::test]
    async fn replace_count_mismatch_rolls_back() {
        let store = MemoryStore::new();
        let dao = settings_dao(&store).await;
        dao.insert_one(ItemRequest::new(Setting { owner: Some(1), ..setting("a", 1) }), None)
            .await
            .unwrap();

        // "b" lands outside the scope, so the scope ends up one row short.
        let err = dao
            .replace_many_raw(
                |schema: &SchemaNode| {
                    let owner = schema.resolve("owner").unwrap();
                    ReplaceQuery::new(
                        vec![
                            row(json!({"key": "a", "value": 1, "owner": 1})),
                            row(json!({"key": "b", "value": 2, "owner": 2})),
                        ],
                        Filter::eq(&owner, json!(1)),
                    )
                },
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CrudError::Integrity(_)));
        assert_eq!(store.rows("setting").await.len(), 1);
    }

    #[tokio::test]
    async fn filter_scoped_writes() {
        let store = MemoryStore::new();
        let dao = settings_dao(&store).await;
        let items = vec![setting("a", 1), setting("b", 1), setting("c", 2)];
        dao.insert_many(ItemsRequest::new(items), None).await.unwrap();

        let updated = dao
            .update_with_filter(
                |schema: &SchemaNode| UpdateWithFilterQuery {
                    values: row(json!({"owner": 7})),
                    filter: Filter::eq(&schema.resolve("value").unwrap(), json!(1)),
                    auth: None,
                    expected: Some(2),
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(updated.len(), 2);
        assert!(updated.iter().all(|s| s.owner == Some(7)));

        let removed = dao
            .remove_with_filter(
                |schema: &SchemaNode| RemoveWithFilterQuery {
                    filter: Filter::eq(&schema.resolve("owner").unwrap(), json!(7)),
                    auth: None,
                },
                None,
            )
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.rows("setting").await.len(), 1);
    }

    #[tokio::test]
    async fn supplied_transaction_spans_several_calls() {
        let store = MemoryStore::new();
        let dao = settings_dao(&store).await;
        let tx = store.begin();

        let inserted = dao
            .insert_one(ItemRequest::new(setting("a", 1)), Some(&tx))
            .await
            .unwrap();
        assert!(
            !dao.find_exists_by_primary_fields(ItemRequest::new(inserted.clone()), None)
                .await
                .unwrap()
        );
        assert!(
            dao.remove_one(ItemRequest::new(inserted), Some(&tx))
                .await
                .unwrap()
        );

        store.commit(&tx).await.unwrap();
        assert!(store.rows("setting").await.is_empty());
    }
}

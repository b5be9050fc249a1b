use crate::core::{CrudError, DaoConfig, Result};
use crate::engine::{QueryEngine, with_transaction};
use crate::query::{FilterError, Filter, SortBy, SortDirection, parse_filter_expr};
use crate::schema::{Field, FieldSet, SchemaNode};
use lru::LruCache;
use std::future::Future;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Shared state of a data-access object: the engine, the memoized schema and
/// key field sets, and the cache of resolved API paths.
///
/// Schema and field sets resolve on first use. Concurrent first uses wait on
/// a single resolution.
pub struct DaoCore<E: QueryEngine> {
    engine: E,
    config: DaoConfig,
    insertable_paths: Vec<String>,
    updatable_paths: Option<Vec<String>>,
    unique_paths: Option<Vec<String>>,
    schema: OnceCell<Arc<SchemaNode>>,
    primary: OnceCell<FieldSet>,
    insertable: OnceCell<FieldSet>,
    updatable: OnceCell<FieldSet>,
    unique: OnceCell<FieldSet>,
    paths: Mutex<LruCache<String, Field>>,
}

impl<E: QueryEngine> DaoCore<E> {
    pub fn new(engine: E) -> Self {
        Self::with_config(engine, DaoConfig::default())
    }

    pub fn with_config(engine: E, config: DaoConfig) -> Self {
        let capacity = NonZeroUsize::new(config.path_cache_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            engine,
            config,
            insertable_paths: Vec::new(),
            updatable_paths: None,
            unique_paths: None,
            schema: OnceCell::new(),
            primary: OnceCell::new(),
            insertable: OnceCell::new(),
            updatable: OnceCell::new(),
            unique: OnceCell::new(),
            paths: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Fields written on insert.
    pub fn insertable(mut self, paths: &[&str]) -> Self {
        self.insertable_paths = paths.iter().map(|path| path.to_string()).collect();
        self
    }

    /// Fields written on update. Defaults to the insertable fields.
    pub fn updatable(mut self, paths: &[&str]) -> Self {
        self.updatable_paths = Some(paths.iter().map(|path| path.to_string()).collect());
        self
    }

    /// Fields that identify a record during upsert and replace. Defaults to
    /// the primary fields. Paths may reach a related node's key when that
    /// key is aliased to a local column.
    pub fn unique(mut self, paths: &[&str]) -> Self {
        self.unique_paths = Some(paths.iter().map(|path| path.to_string()).collect());
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn config(&self) -> &DaoConfig {
        &self.config
    }

    pub async fn schema(&self) -> Result<Arc<SchemaNode>> {
        self.schema
            .get_or_try_init(|| self.engine.schema())
            .await
            .cloned()
    }

    pub async fn primary_fields(&self) -> Result<&FieldSet> {
        self.primary
            .get_or_try_init(|| async { Ok(self.schema().await?.primary_fields()) })
            .await
    }

    pub async fn insertable_fields(&self) -> Result<&FieldSet> {
        self.insertable
            .get_or_try_init(|| async {
                let schema = self.schema().await?;
                resolve_columns(&schema, &self.insertable_paths)
            })
            .await
    }

    pub async fn updatable_fields(&self) -> Result<&FieldSet> {
        self.updatable
            .get_or_try_init(|| async {
                match &self.updatable_paths {
                    Some(paths) => {
                        let schema = self.schema().await?;
                        resolve_columns(&schema, paths)
                    }
                    None => Ok(self.insertable_fields().await?.clone()),
                }
            })
            .await
    }

    pub async fn unique_fields(&self) -> Result<&FieldSet> {
        self.unique
            .get_or_try_init(|| async {
                let primary = self.primary_fields().await?;
                let Some(paths) = &self.unique_paths else {
                    return Ok(primary.clone());
                };

                let schema = self.schema().await?;
                let unique = resolve_unique(&schema, paths)?;
                if unique != *primary && !unique.is_disjoint(primary) {
                    return Err(CrudError::internal(
                        "Unique fields must either include all the primary fields or none of them",
                    ));
                }
                Ok(unique)
            })
            .await
    }

    pub async fn with_transaction<T, F, Fut>(&self, tx: Option<&E::Tx>, work: F) -> Result<T>
    where
        F: FnOnce(E::Tx) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        with_transaction(&self.engine, tx, work).await
    }

    /// Resolves one API path, rejecting paths deeper than the configured
    /// join depth.
    pub async fn parse_api_field(&self, input: &str) -> Result<Field> {
        let path = input.trim();
        if let Some(field) = self.paths.lock()?.get(path) {
            return Ok(field.clone());
        }

        let schema = self.schema().await?;
        let field = self
            .resolve_path(&schema, path)
            .map_err(|message| CrudError::bad_request(message))?;
        self.paths.lock()?.put(path.to_string(), field.clone());
        Ok(field)
    }

    fn cached_path(
        &self,
        path: &str,
    ) -> std::result::Result<MutexGuard<'_, LruCache<String, Field>>, FilterError> {
        self.paths.lock().map_err(|err| {
            warn!(path, "path cache lock poisoned");
            FilterError::Internal(CrudError::from(err).to_string())
        })
    }

    fn resolve_path(&self, schema: &SchemaNode, path: &str) -> std::result::Result<Field, String> {
        let field = schema
            .resolve(path)
            .ok_or_else(|| format!("Invalid field with path {path}"))?;
        let max_depth = self.config.max_join_depth;
        if field.depth() > max_depth {
            return Err(format!(
                "Invalid field with path {path}, exceeds max join depth of {max_depth}"
            ));
        }
        Ok(field)
    }

    /// Comma-separated list of paths.
    pub async fn parse_api_fields(&self, input: &str) -> Result<Vec<Field>> {
        let mut fields = Vec::new();
        for path in input.split(',') {
            fields.push(self.parse_api_field(path).await?);
        }
        Ok(fields)
    }

    /// Comma-separated list of `path [asc|ascending|desc|descending]`.
    pub async fn parse_api_sorts(&self, input: &str) -> Result<Vec<SortBy>> {
        let mut sorts = Vec::new();
        for sort in input.split(',') {
            let sort = sort.trim();
            let (path, token) = match sort.split_once(char::is_whitespace) {
                Some((path, token)) => (path, token),
                None => (sort, ""),
            };

            let direction = SortDirection::parse(token).ok_or_else(|| {
                CrudError::bad_request(format!("Invalid sort direction {}", token.trim()))
            })?;

            let field = self.parse_api_field(path).await?;
            if !field.is_sortable() {
                return Err(CrudError::bad_request(format!(
                    "Invalid sort path {path}, sortable field not found"
                )));
            }

            sorts.push(SortBy { field, direction });
        }
        Ok(sorts)
    }

    /// Parses a textual filter expression against the live schema.
    pub async fn parse_api_filter(&self, input: &str) -> std::result::Result<Filter, FilterError> {
        let expr = parse_filter_expr(input)?;
        let schema = self
            .schema()
            .await
            .map_err(|err| FilterError::Internal(err.to_string()))?;

        let mut resolve = |path: &str| -> std::result::Result<Field, FilterError> {
            if let Some(field) = self.cached_path(path)?.get(path) {
                return Ok(field.clone());
            }
            let field = self.resolve_path(&schema, path).map_err(FilterError::Expression)?;
            self.cached_path(path)?.put(path.to_string(), field.clone());
            Ok(field)
        };
        let filter = expr.resolve(&mut resolve)?;
        debug!(%filter, "parsed api filter");
        Ok(filter)
    }
}

fn resolve_columns(schema: &SchemaNode, paths: &[String]) -> Result<FieldSet> {
    paths
        .iter()
        .map(|path| {
            schema
                .resolve(path)
                .filter(Field::is_column)
                .ok_or_else(|| {
                    CrudError::internal(format!(
                        "Expected {path} to be a column of {}",
                        schema.name()
                    ))
                })
        })
        .collect()
}

/// Unique fields must belong to `schema` directly or through an alias to a
/// local column; aliased fields are replaced by that local column.
fn resolve_unique(schema: &SchemaNode, paths: &[String]) -> Result<FieldSet> {
    let fields = resolve_columns(schema, paths)?;
    fields
        .iter()
        .map(|field| {
            if field.joins().is_empty() {
                return Ok(field.clone());
            }
            match field.alias() {
                Some(alias) if alias.node() == schema.name() && alias.joins().is_empty() => {
                    Ok(alias.clone())
                }
                _ => {
                    warn!(field = %field, node = schema.name(), "unique field is not local");
                    Err(CrudError::internal(format!(
                        "Expected unique field {field} to be related to {} directly or via alias",
                        schema.name()
                    )))
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MemoryEngine, MemoryStore};

    fn engine() -> MemoryEngine<()> {
        let owner = SchemaNode::builder("owner")
            .generated("id")
            .primary(&["id"])
            .column("name")
            .build()
            .unwrap();
        let pet = SchemaNode::builder("pet")
            .generated("id")
            .primary(&["id"])
            .columns(&["name", "species"])
            .relation("owner", owner, "ownerId", "id")
            .build()
            .unwrap();
        MemoryStore::new().engine(pet)
    }

    #[tokio::test]
    async fn updatable_defaults_to_insertable() {
        let core = DaoCore::new(engine()).insertable(&["name", "ownerId"]);
        let updatable = core.updatable_fields().await.unwrap();
        assert_eq!(updatable.paths(), vec!["name", "ownerId"]);
    }

    #[tokio::test]
    async fn explicit_updatable_paths_resolve_to_columns() {
        let core = DaoCore::new(engine())
            .insertable(&["name", "species", "ownerId"])
            .updatable(&["species"]);
        let updatable = core.updatable_fields().await.unwrap();
        assert_eq!(updatable.paths(), vec!["species"]);

        let core = DaoCore::new(engine()).updatable(&["owner"]);
        assert!(matches!(
            core.updatable_fields().await,
            Err(CrudError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn unique_fields_follow_relation_alias() {
        let core = DaoCore::new(engine()).unique(&["owner.id", "name"]);
        let unique = core.unique_fields().await.unwrap();
        assert_eq!(unique.paths(), vec!["ownerId", "name"]);
    }

    #[tokio::test]
    async fn unique_fields_cannot_partially_overlap_primary() {
        let core = DaoCore::new(engine()).unique(&["id", "name"]);
        assert!(matches!(
            core.unique_fields().await,
            Err(CrudError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn api_paths_respect_join_depth() {
        let core = DaoCore::with_config(engine(), DaoConfig::new().max_join_depth(0));
        assert!(core.parse_api_field("name").await.is_ok());
        let err = core.parse_api_field("owner.name").await.unwrap_err();
        assert!(err.to_string().contains("exceeds max join depth of 0"));
    }

    #[tokio::test]
    async fn sorts_parse_directions() {
        let core = DaoCore::new(engine());
        let sorts = core.parse_api_sorts("name desc, owner.name").await.unwrap();
        assert_eq!(sorts.len(), 2);
        assert_eq!(sorts[0].direction, SortDirection::Descending);
        assert_eq!(sorts[1].direction, SortDirection::Ascending);

        let tabbed = core.parse_api_sorts("name\tdesc").await.unwrap();
        assert_eq!(tabbed[0].direction, SortDirection::Descending);

        assert!(core.parse_api_sorts("name sideways").await.is_err());
        assert!(core.parse_api_sorts("owner").await.is_err());
    }

    #[tokio::test]
    async fn filters_resolve_against_schema() {
        let core = DaoCore::new(engine());
        let filter = core
            .parse_api_filter("species eq 'cat' and owner.name like 'A%'")
            .await
            .unwrap();
        assert_eq!(filter.to_string(), "pet.species = 'cat' AND owner.name LIKE 'A%'");

        assert!(matches!(
            core.parse_api_filter("color eq 'red'").await,
            Err(FilterError::Expression(_))
        ));
    }

    #[tokio::test]
    async fn poisoned_path_cache_fails_fields_and_filters_alike() {
        let core = DaoCore::new(engine());
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = core.paths.lock().unwrap();
            panic!("poison the path cache");
        }));

        assert!(matches!(
            core.parse_api_field("name").await,
            Err(CrudError::Internal(_))
        ));
        let err = core.parse_api_filter("name eq 'Rex'").await.unwrap_err();
        assert!(matches!(err, FilterError::Internal(_)));
        assert!(!err.is_client_error());
    }
}

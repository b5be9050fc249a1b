//! Services: validation and lifecycle orchestration over a dao.
//!
//! A [`ReadableService`] forwards reads. A [`WritableService`] runs each
//! write as one transaction: existence check, validation chain, `before_*`
//! hook, the dao write, then the `after_*` hook.

mod hooks;
mod rules;
mod validation;

pub use hooks::{NoHooks, WriteHooks};
pub use rules::{
    FieldRule, IsNumber, IsString, Max, MaxLength, Min, Pattern, Required, RuleValidator,
};
pub use validation::{ValidationFn, ValidationResult, Validator, run_validations, validation_fn};

use crate::core::{CrudError, Result};
use crate::dao::{AuthOf, Counted, DaoBase, Reader, TxOf, Writer};
use crate::query::{CountQuery, Filter, FilterError, FindQuery, ItemRequest, SortBy};
use crate::schema::{Field, SchemaNode};
use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;
use tracing::debug;

/// Read-only service.
pub struct ReadableService<D> {
    dao: Arc<D>,
}

impl<D> Clone for ReadableService<D> {
    fn clone(&self) -> Self {
        Self {
            dao: Arc::clone(&self.dao),
        }
    }
}

impl<D: Reader> ReadableService<D> {
    pub fn new(dao: Arc<D>) -> Self {
        Self { dao }
    }

    pub fn dao(&self) -> &Arc<D> {
        &self.dao
    }

    pub async fn find<B>(&self, builder: B, tx: Option<&TxOf<D>>) -> Result<Vec<D::Model>>
    where
        B: FnOnce(&SchemaNode) -> FindQuery<AuthOf<D>> + Send,
    {
        self.dao.find_all(builder, tx).await
    }

    pub async fn find_with_count<B>(
        &self,
        builder: B,
        tx: Option<&TxOf<D>>,
    ) -> Result<Counted<D::Model>>
    where
        B: FnOnce(&SchemaNode) -> FindQuery<AuthOf<D>> + Send,
    {
        self.dao.find_all_with_count(builder, tx).await
    }

    pub async fn find_by_primary_fields(
        &self,
        request: ItemRequest<D::Model, AuthOf<D>>,
        tx: Option<&TxOf<D>>,
    ) -> Result<Option<D::Model>> {
        self.dao.find_one_by_primary_fields(request, tx).await
    }

    pub async fn find_exists_with_filter<B>(&self, builder: B, tx: Option<&TxOf<D>>) -> Result<bool>
    where
        B: FnOnce(&SchemaNode) -> CountQuery<AuthOf<D>> + Send,
    {
        self.dao.find_exists_with_filter(builder, tx).await
    }

    pub async fn find_exists_by_primary_fields(
        &self,
        request: ItemRequest<D::Model, AuthOf<D>>,
        tx: Option<&TxOf<D>>,
    ) -> Result<bool> {
        self.dao.find_exists_by_primary_fields(request, tx).await
    }

    pub async fn schema(&self) -> Result<Arc<SchemaNode>> {
        self.dao.core().schema().await
    }

    pub async fn parse_api_filter(&self, input: &str) -> std::result::Result<Filter, FilterError> {
        self.dao.parse_api_filter(input).await
    }

    pub async fn parse_api_fields(&self, input: &str) -> Result<Vec<Field>> {
        self.dao.parse_api_fields(input).await
    }

    pub async fn parse_api_sorts(&self, input: &str) -> Result<Vec<SortBy>> {
        self.dao.parse_api_sorts(input).await
    }

    pub async fn with_transaction<T, F, Fut>(&self, tx: Option<&TxOf<D>>, work: F) -> Result<T>
    where
        F: FnOnce(TxOf<D>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.dao.core().with_transaction(tx, work).await
    }
}

type SharedValidator<M> = Arc<dyn Validator<M>>;
type Steps<D> = Vec<ValidationFn<<D as DaoBase>::Model, AuthOf<D>, TxOf<D>>>;

/// Read-write service with validation and lifecycle hooks.
///
/// Inserts validate with the insert validator, else the generic one.
/// Updates try the update validator, then the insert validator, then the
/// generic one. Removes skip structural validation and run only the
/// remove steps.
pub struct WritableService<D: DaoBase, H = NoHooks> {
    readable: ReadableService<D>,
    hooks: H,
    validator: Option<SharedValidator<D::Model>>,
    insert_validator: Option<SharedValidator<D::Model>>,
    update_validator: Option<SharedValidator<D::Model>>,
    insert_validations: Steps<D>,
    update_validations: Steps<D>,
    remove_validations: Steps<D>,
}

impl<D: Writer> WritableService<D> {
    pub fn new(dao: Arc<D>) -> Self {
        Self {
            readable: ReadableService::new(dao),
            hooks: NoHooks,
            validator: None,
            insert_validator: None,
            update_validator: None,
            insert_validations: Vec::new(),
            update_validations: Vec::new(),
            remove_validations: Vec::new(),
        }
    }
}

impl<D: Writer, H> WritableService<D, H> {
    pub fn with_hooks<G>(self, hooks: G) -> WritableService<D, G> {
        WritableService {
            readable: self.readable,
            hooks,
            validator: self.validator,
            insert_validator: self.insert_validator,
            update_validator: self.update_validator,
            insert_validations: self.insert_validations,
            update_validations: self.update_validations,
            remove_validations: self.remove_validations,
        }
    }

    pub fn validator(mut self, validator: impl Validator<D::Model> + 'static) -> Self {
        self.validator = Some(Arc::new(validator));
        self
    }

    pub fn insert_validator(mut self, validator: impl Validator<D::Model> + 'static) -> Self {
        self.insert_validator = Some(Arc::new(validator));
        self
    }

    pub fn update_validator(mut self, validator: impl Validator<D::Model> + 'static) -> Self {
        self.update_validator = Some(Arc::new(validator));
        self
    }

    pub fn insert_validation(mut self, step: ValidationFn<D::Model, AuthOf<D>, TxOf<D>>) -> Self {
        self.insert_validations.push(step);
        self
    }

    pub fn update_validation(mut self, step: ValidationFn<D::Model, AuthOf<D>, TxOf<D>>) -> Self {
        self.update_validations.push(step);
        self
    }

    pub fn remove_validation(mut self, step: ValidationFn<D::Model, AuthOf<D>, TxOf<D>>) -> Self {
        self.remove_validations.push(step);
        self
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    fn insert_model_validator(&self) -> Option<&dyn Validator<D::Model>> {
        self.insert_validator
            .as_deref()
            .or(self.validator.as_deref())
    }

    fn update_model_validator(&self) -> Option<&dyn Validator<D::Model>> {
        self.update_validator
            .as_deref()
            .or(self.insert_validator.as_deref())
            .or(self.validator.as_deref())
    }

    /// Structural validation for inserts; `None` when no validator is set.
    pub async fn validate_insert_model(&self, model: &D::Model) -> Option<ValidationResult> {
        match self.insert_model_validator() {
            Some(validator) => Some(validator.validate(model).await),
            None => None,
        }
    }

    pub async fn validate_update_model(&self, model: &D::Model) -> Option<ValidationResult> {
        match self.update_model_validator() {
            Some(validator) => Some(validator.validate(model).await),
            None => None,
        }
    }
}

impl<D, H> WritableService<D, H>
where
    D: Writer,
    D::Model: Clone,
    H: WriteHooks<D::Model, AuthOf<D>, TxOf<D>>,
{
    pub async fn insert(
        &self,
        request: ItemRequest<D::Model, AuthOf<D>>,
        tx: Option<&TxOf<D>>,
    ) -> Result<D::Model> {
        let ItemRequest { item, auth, .. } = request;
        let dao = self.dao();

        self.with_transaction(tx, |tx| async move {
            run_validations(
                self.insert_model_validator(),
                &self.insert_validations,
                &item,
                auth.as_ref(),
                &tx,
            )
            .await?;

            let target = self
                .hooks
                .before_insert(&item, auth.as_ref(), &tx)
                .await?
                .unwrap_or_else(|| item.clone());
            let inserted = dao
                .insert_one(ItemRequest::new(target).auth(auth.clone()), Some(&tx))
                .await?;

            let overridden = self
                .hooks
                .after_insert(&inserted, &item, auth.as_ref(), &tx)
                .await?;
            Ok(overridden.unwrap_or(inserted))
        })
        .await
    }

    pub async fn update(
        &self,
        request: ItemRequest<D::Model, AuthOf<D>>,
        tx: Option<&TxOf<D>>,
    ) -> Result<D::Model> {
        let ItemRequest { item, auth, .. } = request;
        let dao = self.dao();

        self.with_transaction(tx, |tx| async move {
            self.assert_exists(&item, auth.as_ref(), &tx).await?;
            run_validations(
                self.update_model_validator(),
                &self.update_validations,
                &item,
                auth.as_ref(),
                &tx,
            )
            .await?;

            let target = self
                .hooks
                .before_update(&item, auth.as_ref(), &tx)
                .await?
                .unwrap_or_else(|| item.clone());
            let updated = dao
                .update_one(ItemRequest::new(target).auth(auth.clone()), Some(&tx))
                .await?;

            let overridden = self
                .hooks
                .after_update(&updated, &item, auth.as_ref(), &tx)
                .await?;
            Ok(overridden.unwrap_or(updated))
        })
        .await
    }

    pub async fn remove(
        &self,
        request: ItemRequest<D::Model, AuthOf<D>>,
        tx: Option<&TxOf<D>>,
    ) -> Result<bool> {
        let ItemRequest { item, auth, .. } = request;
        let dao = self.dao();

        self.with_transaction(tx, |tx| async move {
            self.assert_exists(&item, auth.as_ref(), &tx).await?;
            run_validations(None, &self.remove_validations, &item, auth.as_ref(), &tx).await?;

            let existing = dao
                .find_one_by_primary_fields(
                    ItemRequest::new(item).auth(auth.clone()),
                    Some(&tx),
                )
                .await?
                .ok_or_else(|| CrudError::not_found("Row to remove"))?;

            let target = self
                .hooks
                .before_remove(&existing, auth.as_ref(), &tx)
                .await?
                .unwrap_or_else(|| existing.clone());
            let removed = dao
                .remove_one(ItemRequest::new(target).auth(auth.clone()), Some(&tx))
                .await?;

            let overridden = self
                .hooks
                .after_remove(removed, &existing, auth.as_ref(), &tx)
                .await?;
            Ok(overridden.unwrap_or(removed))
        })
        .await
    }

    async fn assert_exists(
        &self,
        item: &D::Model,
        auth: Option<&AuthOf<D>>,
        tx: &TxOf<D>,
    ) -> Result<()> {
        let exists = self
            .dao()
            .find_exists_by_primary_fields(
                ItemRequest::new(item.clone()).auth(auth.cloned()),
                Some(tx),
            )
            .await?;
        if exists {
            Ok(())
        } else {
            debug!("write target does not exist");
            Err(CrudError::not_found("Row"))
        }
    }
}

impl<D: DaoBase, H> Deref for WritableService<D, H> {
    type Target = ReadableService<D>;

    fn deref(&self) -> &Self::Target {
        &self.readable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::{Dao, DaoCore};
    use crate::engine::{MemoryEngine, MemoryStore, MemoryTx};
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Driver {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<i64>,
        name: String,
    }

    type DriverDao = Dao<Driver, MemoryEngine<String>>;

    fn driver(name: &str) -> Driver {
        Driver {
            id: None,
            name: name.to_string(),
        }
    }

    fn dao(store: &MemoryStore) -> Arc<DriverDao> {
        let node = SchemaNode::builder("driver")
            .generated("id")
            .primary(&["id"])
            .column("name")
            .build()
            .unwrap();
        Arc::new(Dao::new(DaoCore::new(store.engine(node)).insertable(&["name"])))
    }

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl WriteHooks<Driver, String, MemoryTx> for Recorder {
        async fn before_insert(
            &self,
            item: &Driver,
            _auth: Option<&String>,
            _tx: &MemoryTx,
        ) -> Result<Option<Driver>> {
            self.events.lock().unwrap().push("before_insert".to_string());
            Ok(Some(Driver {
                name: item.name.to_uppercase(),
                ..item.clone()
            }))
        }

        async fn after_insert(
            &self,
            inserted: &Driver,
            original: &Driver,
            _auth: Option<&String>,
            _tx: &MemoryTx,
        ) -> Result<Option<Driver>> {
            self.events
                .lock()
                .unwrap()
                .push(format!("after_insert {} {}", inserted.name, original.name));
            Ok(None)
        }

        async fn after_remove(
            &self,
            removed: bool,
            existing: &Driver,
            _auth: Option<&String>,
            _tx: &MemoryTx,
        ) -> Result<Option<bool>> {
            self.events
                .lock()
                .unwrap()
                .push(format!("after_remove {removed} {}", existing.name));
            Ok(None)
        }
    }

    #[tokio::test]
    async fn insert_runs_hooks_in_order() {
        let store = MemoryStore::new();
        let service = WritableService::new(dao(&store)).with_hooks(Recorder::default());

        let inserted = service
            .insert(ItemRequest::new(driver("ann")), None)
            .await
            .unwrap();
        assert_eq!(inserted.name, "ANN");
        assert_eq!(
            *service.hooks().events.lock().unwrap(),
            vec!["before_insert", "after_insert ANN ann"]
        );
    }

    #[tokio::test]
    async fn invalid_insert_never_writes() {
        let store = MemoryStore::new();
        let service = WritableService::new(dao(&store))
            .validator(RuleValidator::new().max_length("name", 3));

        let err = service
            .insert(ItemRequest::new(driver("Bartholomew")), None)
            .await
            .unwrap_err();
        assert!(matches!(err, CrudError::ValidationFailed { .. }));
        assert!(store.rows("driver").await.is_empty());
    }

    #[tokio::test]
    async fn update_uses_update_validator_before_insert_validator() {
        let store = MemoryStore::new();
        let service = WritableService::new(dao(&store))
            .insert_validator(RuleValidator::new().max_length("name", 3))
            .update_validator(RuleValidator::new().max_length("name", 10));

        let inserted = service
            .insert(ItemRequest::new(driver("Bo")), None)
            .await
            .unwrap();
        let updated = service
            .update(
                ItemRequest::new(Driver {
                    name: "Bartholo".to_string(),
                    ..inserted
                }),
                None,
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Bartholo");
    }

    #[tokio::test]
    async fn update_and_remove_require_existing_rows() {
        let store = MemoryStore::new();
        let service = WritableService::new(dao(&store));
        let ghost = Driver {
            id: Some(7),
            name: "ghost".to_string(),
        };

        let update = service.update(ItemRequest::new(ghost.clone()), None).await;
        assert!(matches!(update, Err(CrudError::NotFound(_))));
        let remove = service.remove(ItemRequest::new(ghost), None).await;
        assert!(matches!(remove, Err(CrudError::NotFound(_))));
    }

    #[tokio::test]
    async fn remove_runs_only_remove_steps() {
        let store = MemoryStore::new();
        let service = WritableService::new(dao(&store))
            .with_hooks(Recorder::default())
            .validator(RuleValidator::new().max_length("name", 1))
            .remove_validation(validation_fn(|driver: Driver, auth: Option<String>, _| {
                Box::pin(async move {
                    Ok((auth.as_deref() != Some("admin")).then(|| {
                        ValidationResult::invalid("id", format!("cannot remove {}", driver.name))
                    }))
                })
            }));

        let inserted = service
            .dao()
            .insert_one(ItemRequest::new(driver("Cy")), None)
            .await
            .unwrap();

        let denied = service
            .remove(ItemRequest::new(inserted.clone()).auth(Some("guest".to_string())), None)
            .await
            .unwrap_err();
        assert!(matches!(denied, CrudError::ValidationFailed { .. }));

        let removed = service
            .remove(ItemRequest::new(inserted).auth(Some("admin".to_string())), None)
            .await
            .unwrap();
        assert!(removed);
        assert!(
            service
                .hooks()
                .events
                .lock()
                .unwrap()
                .contains(&"after_remove true Cy".to_string())
        );
    }
}

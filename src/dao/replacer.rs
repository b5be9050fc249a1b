use super::{AuthOf, TxOf, Upserter, adopt_identity, partition};
use crate::core::{CrudError, Result, Row};
use crate::engine::QueryEngine;
use crate::query::{FindQuery, ItemsRequest, Pagination, ReplaceQuery};
use crate::schema::SchemaNode;
use async_trait::async_trait;
use tracing::debug;

/// Replace capability: makes the rows inside a scope filter match a new item
/// collection exactly, removing rows the collection no longer mentions.
#[async_trait]
pub trait Replacer: Upserter {
    /// Runs remove, update and insert in that order, then asserts the scope
    /// holds exactly as many rows as items were submitted. A mismatch fails
    /// the transaction.
    async fn replace_many_raw<B>(&self, builder: B, tx: Option<&TxOf<Self>>) -> Result<Vec<Row>>
    where
        B: FnOnce(&SchemaNode) -> ReplaceQuery<Row, AuthOf<Self>> + Send,
    {
        let core = self.core();
        let unique = core.unique_fields().await?.clone();
        let primary = core.primary_fields().await?.clone();
        let updatable = core.updatable_fields().await?.clone();
        let select = primary.union(&unique).to_vec();

        let schema = core.schema().await?;
        let ReplaceQuery {
            items,
            filter,
            auth,
        } = builder(&schema);
        let expected = items.len();

        core.with_transaction(tx, |tx| async move {
            let existing = core
                .engine()
                .find_all(
                    FindQuery::new()
                        .fields(select)
                        .filter(filter.clone())
                        .pagination(Pagination::unbounded())
                        .auth(auth.clone()),
                    Some(&tx),
                )
                .await?;

            let reconciled = partition(&unique, items, existing);
            debug!(
                inserts = reconciled.insert.len(),
                updates = reconciled.update.len(),
                removes = reconciled.remove.len(),
                "replace partition"
            );

            if !reconciled.remove.is_empty() {
                self.remove_many_raw(
                    ItemsRequest::new(reconciled.remove).auth(auth.clone()),
                    Some(&tx),
                )
                .await?;
            }

            if !reconciled.update.is_empty() && !updatable.is_empty() && updatable != unique {
                let updates: Vec<Row> = reconciled
                    .update
                    .into_iter()
                    .map(|(mut item, old)| {
                        adopt_identity(&primary, &mut item, &old);
                        item
                    })
                    .collect();
                self.update_many_raw(ItemsRequest::new(updates).auth(auth.clone()), Some(&tx))
                    .await?;
            }

            if !reconciled.insert.is_empty() {
                self.insert_many_raw(
                    ItemsRequest::new(reconciled.insert).auth(auth.clone()),
                    Some(&tx),
                )
                .await?;
            }

            let persisted = core
                .engine()
                .find_all(
                    FindQuery::new()
                        .filter(filter)
                        .pagination(Pagination::unbounded())
                        .auth(auth),
                    Some(&tx),
                )
                .await?;

            if persisted.len() != expected {
                return Err(CrudError::integrity(format!(
                    "Expected replace to result in {expected} rows but actually found {} rows",
                    persisted.len()
                )));
            }
            Ok(persisted)
        })
        .await
    }

    async fn replace_many<B>(
        &self,
        builder: B,
        tx: Option<&TxOf<Self>>,
    ) -> Result<Vec<Self::Model>>
    where
        B: FnOnce(&SchemaNode) -> ReplaceQuery<Self::Model, AuthOf<Self>> + Send,
    {
        let schema = self.core().schema().await?;
        let ReplaceQuery {
            items,
            filter,
            auth,
        } = builder(&schema);
        let rows = self.mapper().to_rows(&items)?;

        let persisted = self
            .replace_many_raw(
                move |_: &SchemaNode| ReplaceQuery::new(rows, filter).auth(auth),
                tx,
            )
            .await?;
        self.mapper().to_models(persisted)
    }
}

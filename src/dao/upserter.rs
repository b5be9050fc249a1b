use super::{AuthOf, TxOf, Writer, adopt_identity, partition, primary_key_filter};
use crate::core::{CrudError, Result, Row};
use crate::engine::QueryEngine;
use crate::query::{FindQuery, ItemRequest, ItemsRequest, Pagination};
use async_trait::async_trait;
use tracing::debug;

/// Upsert capability: reconciles items against existing rows matched on the
/// dao's unique fields. Matched items update, the rest insert.
#[async_trait]
pub trait Upserter: Writer {
    async fn upsert_many_raw(
        &self,
        request: ItemsRequest<Row, AuthOf<Self>>,
        tx: Option<&TxOf<Self>>,
    ) -> Result<Vec<Row>> {
        let core = self.core();
        let unique = core.unique_fields().await?.clone();
        let primary = core.primary_fields().await?.clone();
        let updatable = core.updatable_fields().await?.clone();
        let select = primary.union(&unique).to_vec();

        let ItemsRequest {
            items,
            fields: projection,
            auth,
        } = request;
        if items.is_empty() {
            return Ok(Vec::new());
        }

        core.with_transaction(tx, |tx| async move {
            let existing_filter = primary_key_filter(&unique, &items)?;
            let existing = core
                .engine()
                .find_all(
                    FindQuery::new()
                        .fields(select)
                        .filter(existing_filter)
                        .pagination(Pagination::unbounded())
                        .auth(auth.clone()),
                    Some(&tx),
                )
                .await?;

            let reconciled = partition(&unique, items, existing);
            debug!(
                inserts = reconciled.insert.len(),
                updates = reconciled.update.len(),
                "upsert partition"
            );

            let mut persisted = Vec::new();
            if !reconciled.update.is_empty() {
                let updates: Vec<Row> = reconciled
                    .update
                    .into_iter()
                    .map(|(mut item, old)| {
                        adopt_identity(&primary, &mut item, &old);
                        item
                    })
                    .collect();

                if !updatable.is_empty() && updatable != unique {
                    self.update_many_raw(
                        ItemsRequest::new(updates.clone()).auth(auth.clone()),
                        Some(&tx),
                    )
                    .await?;
                }
                persisted.extend(updates);
            }

            if !reconciled.insert.is_empty() {
                let inserted = self
                    .insert_many_raw(
                        ItemsRequest::new(reconciled.insert).auth(auth.clone()),
                        Some(&tx),
                    )
                    .await?;
                persisted.extend(inserted);
            }

            self.find_all_raw_by_primary_fields(
                ItemsRequest::new(persisted).fields(projection).auth(auth),
                Some(&tx),
            )
            .await
        })
        .await
    }

    async fn upsert_many(
        &self,
        request: ItemsRequest<Self::Model, AuthOf<Self>>,
        tx: Option<&TxOf<Self>>,
    ) -> Result<Vec<Self::Model>> {
        let request = request.try_map(|items| self.mapper().to_rows(&items))?;
        let rows = self.upsert_many_raw(request, tx).await?;
        self.mapper().to_models(rows)
    }

    async fn upsert_one_raw(
        &self,
        request: ItemRequest<Row, AuthOf<Self>>,
        tx: Option<&TxOf<Self>>,
    ) -> Result<Row> {
        let request = ItemsRequest::new(vec![request.item])
            .fields(request.fields)
            .auth(request.auth);
        self.upsert_many_raw(request, tx)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CrudError::integrity("Upserted row was not found after upsert"))
    }

    async fn upsert_one(
        &self,
        request: ItemRequest<Self::Model, AuthOf<Self>>,
        tx: Option<&TxOf<Self>>,
    ) -> Result<Self::Model> {
        let request = request.try_map(|item| self.mapper().to_row(&item))?;
        let row = self.upsert_one_raw(request, tx).await?;
        self.mapper().to_model(row)
    }
}

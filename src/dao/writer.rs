use super::{AuthOf, Reader, TxOf};
use crate::core::{CrudError, Result, Row};
use crate::engine::QueryEngine;
use crate::query::{
    FindQuery, InsertQuery, ItemRequest, ItemsRequest, Pagination, RemoveQuery,
    RemoveWithFilterQuery, UpdateQuery, UpdateWithFilterQuery,
};
use crate::schema::SchemaNode;
use async_trait::async_trait;
use tracing::debug;

/// Write capability. Inserts and updates return the persisted rows, refetched
/// by primary key inside the same transaction so store-assigned values show.
#[async_trait]
pub trait Writer: Reader {
    async fn insert_many_raw(
        &self,
        request: ItemsRequest<Row, AuthOf<Self>>,
        tx: Option<&TxOf<Self>>,
    ) -> Result<Vec<Row>> {
        let fields = self.core().insertable_fields().await?.clone();
        if fields.is_empty() {
            return Err(CrudError::bad_request(
                "Cannot insert row with no fields specified",
            ));
        }

        let ItemsRequest {
            items,
            fields: projection,
            auth,
        } = request;
        self.core()
            .with_transaction(tx, |tx| async move {
                let query = InsertQuery {
                    fields,
                    items,
                    auth,
                };
                let persisted = self.core().engine().insert_many(query, &tx).await?;
                self.find_all_raw_by_primary_fields(
                    ItemsRequest::new(persisted).fields(projection),
                    Some(&tx),
                )
                .await
            })
            .await
    }

    async fn insert_many(
        &self,
        request: ItemsRequest<Self::Model, AuthOf<Self>>,
        tx: Option<&TxOf<Self>>,
    ) -> Result<Vec<Self::Model>> {
        let request = request.try_map(|items| self.mapper().to_rows(&items))?;
        let rows = self.insert_many_raw(request, tx).await?;
        self.mapper().to_models(rows)
    }

    async fn insert_one_raw(
        &self,
        request: ItemRequest<Row, AuthOf<Self>>,
        tx: Option<&TxOf<Self>>,
    ) -> Result<Row> {
        let request = ItemsRequest::new(vec![request.item])
            .fields(request.fields)
            .auth(request.auth);
        self.insert_many_raw(request, tx)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CrudError::integrity("Inserted row was not found after insert"))
    }

    async fn insert_one(
        &self,
        request: ItemRequest<Self::Model, AuthOf<Self>>,
        tx: Option<&TxOf<Self>>,
    ) -> Result<Self::Model> {
        let request = request.try_map(|item| self.mapper().to_row(&item))?;
        let row = self.insert_one_raw(request, tx).await?;
        self.mapper().to_model(row)
    }

    /// Writes the updatable fields of each item onto the row sharing its
    /// primary key. With no updatable fields the write is skipped and the
    /// rows are only refetched.
    async fn update_many_raw(
        &self,
        request: ItemsRequest<Row, AuthOf<Self>>,
        tx: Option<&TxOf<Self>>,
    ) -> Result<Vec<Row>> {
        let fields = self.core().updatable_fields().await?.clone();
        let ItemsRequest {
            items,
            fields: projection,
            auth,
        } = request;

        self.core()
            .with_transaction(tx, |tx| async move {
                if fields.is_empty() {
                    debug!("no updatable fields, skipping update write");
                } else {
                    let query = UpdateQuery {
                        fields,
                        items: items.clone(),
                        auth: auth.clone(),
                    };
                    self.core().engine().update_many(query, &tx).await?;
                }

                self.find_all_raw_by_primary_fields(
                    ItemsRequest::new(items).fields(projection).auth(auth),
                    Some(&tx),
                )
                .await
            })
            .await
    }

    async fn update_many(
        &self,
        request: ItemsRequest<Self::Model, AuthOf<Self>>,
        tx: Option<&TxOf<Self>>,
    ) -> Result<Vec<Self::Model>> {
        let request = request.try_map(|items| self.mapper().to_rows(&items))?;
        let rows = self.update_many_raw(request, tx).await?;
        self.mapper().to_models(rows)
    }

    async fn update_one_raw(
        &self,
        request: ItemRequest<Row, AuthOf<Self>>,
        tx: Option<&TxOf<Self>>,
    ) -> Result<Row> {
        let request = ItemsRequest::new(vec![request.item])
            .fields(request.fields)
            .auth(request.auth);
        self.update_many_raw(request, tx)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| CrudError::not_found("Row to update"))
    }

    async fn update_one(
        &self,
        request: ItemRequest<Self::Model, AuthOf<Self>>,
        tx: Option<&TxOf<Self>>,
    ) -> Result<Self::Model> {
        let request = request.try_map(|item| self.mapper().to_row(&item))?;
        let row = self.update_one_raw(request, tx).await?;
        self.mapper().to_model(row)
    }

    /// Sets `values` on every row matching the filter, then returns the rows
    /// the same filter selects afterwards, up to `expected` of them.
    async fn update_with_filter_raw<B>(
        &self,
        builder: B,
        tx: Option<&TxOf<Self>>,
    ) -> Result<Vec<Row>>
    where
        B: FnOnce(&SchemaNode) -> UpdateWithFilterQuery<AuthOf<Self>> + Send,
    {
        let schema = self.core().schema().await?;
        let query = builder(&schema);

        self.core()
            .with_transaction(tx, |tx| async move {
                let refetch = FindQuery::new()
                    .filter(query.filter.clone())
                    .pagination(Pagination::new(0, query.expected))
                    .auth(query.auth.clone());

                self.core().engine().update_with_filter(query, &tx).await?;
                self.core().engine().find_all(refetch, Some(&tx)).await
            })
            .await
    }

    async fn update_with_filter<B>(
        &self,
        builder: B,
        tx: Option<&TxOf<Self>>,
    ) -> Result<Vec<Self::Model>>
    where
        B: FnOnce(&SchemaNode) -> UpdateWithFilterQuery<AuthOf<Self>> + Send,
    {
        let rows = self.update_with_filter_raw(builder, tx).await?;
        self.mapper().to_models(rows)
    }

    /// Returns the number of rows removed.
    async fn remove_many_raw(
        &self,
        request: ItemsRequest<Row, AuthOf<Self>>,
        tx: Option<&TxOf<Self>>,
    ) -> Result<u64> {
        let query = RemoveQuery {
            items: request.items,
            auth: request.auth,
        };
        self.core()
            .with_transaction(tx, |tx| async move {
                self.core().engine().remove_many(query, &tx).await
            })
            .await
    }

    async fn remove_many(
        &self,
        request: ItemsRequest<Self::Model, AuthOf<Self>>,
        tx: Option<&TxOf<Self>>,
    ) -> Result<u64> {
        let request = request.try_map(|items| self.mapper().to_rows(&items))?;
        self.remove_many_raw(request, tx).await
    }

    async fn remove_one_raw(
        &self,
        request: ItemRequest<Row, AuthOf<Self>>,
        tx: Option<&TxOf<Self>>,
    ) -> Result<bool> {
        let request = ItemsRequest::new(vec![request.item]).auth(request.auth);
        Ok(self.remove_many_raw(request, tx).await? > 0)
    }

    async fn remove_one(
        &self,
        request: ItemRequest<Self::Model, AuthOf<Self>>,
        tx: Option<&TxOf<Self>>,
    ) -> Result<bool> {
        let request = request.try_map(|item| self.mapper().to_row(&item))?;
        self.remove_one_raw(request, tx).await
    }

    async fn remove_with_filter<B>(&self, builder: B, tx: Option<&TxOf<Self>>) -> Result<u64>
    where
        B: FnOnce(&SchemaNode) -> RemoveWithFilterQuery<AuthOf<Self>> + Send,
    {
        let schema = self.core().schema().await?;
        let query = builder(&schema);
        self.core()
            .with_transaction(tx, |tx| async move {
                self.core().engine().remove_with_filter(query, &tx).await
            })
            .await
    }
}

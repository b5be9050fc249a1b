use super::{AuthOf, DaoBase, TxOf, primary_key_filter};
use crate::core::{Result, Row};
use crate::engine::QueryEngine;
use crate::query::{
    CountQuery, Filter, FilterError, FindQuery, ItemRequest, ItemsRequest, Pagination, SortBy,
};
use crate::schema::{Field, SchemaNode};
use async_trait::async_trait;

/// A page of rows together with the number of rows matching the filter,
/// ignoring pagination.
#[derive(Debug, Clone, PartialEq)]
pub struct Counted<T> {
    pub count: u64,
    pub rows: Vec<T>,
}

/// Read capability. Every operation has a raw variant returning stored rows
/// and a model variant converting them through the dao's mapper.
#[async_trait]
pub trait Reader: DaoBase {
    async fn find_all_raw<B>(&self, builder: B, tx: Option<&TxOf<Self>>) -> Result<Vec<Row>>
    where
        B: FnOnce(&SchemaNode) -> FindQuery<AuthOf<Self>> + Send,
    {
        let schema = self.core().schema().await?;
        let query = builder(&schema);
        self.core().engine().find_all(query, tx).await
    }

    async fn find_all<B>(&self, builder: B, tx: Option<&TxOf<Self>>) -> Result<Vec<Self::Model>>
    where
        B: FnOnce(&SchemaNode) -> FindQuery<AuthOf<Self>> + Send,
    {
        let rows = self.find_all_raw(builder, tx).await?;
        self.mapper().to_models(rows)
    }

    async fn find_all_with_count_raw<B>(
        &self,
        builder: B,
        tx: Option<&TxOf<Self>>,
    ) -> Result<Counted<Row>>
    where
        B: FnOnce(&SchemaNode) -> FindQuery<AuthOf<Self>> + Send,
    {
        let schema = self.core().schema().await?;
        let query = builder(&schema);
        let engine = self.core().engine();

        let count = engine.find_count(CountQuery::from(&query), tx).await?;
        let rows = engine.find_all(query, tx).await?;
        Ok(Counted { count, rows })
    }

    async fn find_all_with_count<B>(
        &self,
        builder: B,
        tx: Option<&TxOf<Self>>,
    ) -> Result<Counted<Self::Model>>
    where
        B: FnOnce(&SchemaNode) -> FindQuery<AuthOf<Self>> + Send,
    {
        let Counted { count, rows } = self.find_all_with_count_raw(builder, tx).await?;
        Ok(Counted {
            count,
            rows: self.mapper().to_models(rows)?,
        })
    }

    /// First row of the query, keeping its offset and forcing a limit of one.
    async fn find_one_raw<B>(&self, builder: B, tx: Option<&TxOf<Self>>) -> Result<Option<Row>>
    where
        B: FnOnce(&SchemaNode) -> FindQuery<AuthOf<Self>> + Send,
    {
        let rows = self
            .find_all_raw(
                |schema: &SchemaNode| {
                    let query = builder(schema);
                    let offset = query.pagination.map(|p| p.offset).unwrap_or(0);
                    query.pagination(Pagination::new(offset, Some(1)))
                },
                tx,
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn find_one<B>(&self, builder: B, tx: Option<&TxOf<Self>>) -> Result<Option<Self::Model>>
    where
        B: FnOnce(&SchemaNode) -> FindQuery<AuthOf<Self>> + Send,
    {
        self.find_one_raw(builder, tx)
            .await?
            .map(|row| self.mapper().to_model(row))
            .transpose()
    }

    async fn find_count<B>(&self, builder: B, tx: Option<&TxOf<Self>>) -> Result<u64>
    where
        B: FnOnce(&SchemaNode) -> CountQuery<AuthOf<Self>> + Send,
    {
        let schema = self.core().schema().await?;
        self.core().engine().find_count(builder(&schema), tx).await
    }

    async fn find_exists_with_filter<B>(&self, builder: B, tx: Option<&TxOf<Self>>) -> Result<bool>
    where
        B: FnOnce(&SchemaNode) -> CountQuery<AuthOf<Self>> + Send,
    {
        Ok(self.find_count(builder, tx).await? != 0)
    }

    /// Rows identified by the primary fields of `request.items`.
    async fn find_all_raw_by_primary_fields(
        &self,
        request: ItemsRequest<Row, AuthOf<Self>>,
        tx: Option<&TxOf<Self>>,
    ) -> Result<Vec<Row>> {
        if request.items.is_empty() {
            return Ok(Vec::new());
        }

        let primary = self.core().primary_fields().await?;
        let filter = primary_key_filter(primary, &request.items)?;
        let limit = request.items.len() as u64;
        let query = FindQuery::new()
            .maybe_fields(request.fields)
            .filter(filter)
            .pagination(Pagination::limit(limit))
            .auth(request.auth);
        self.core().engine().find_all(query, tx).await
    }

    async fn find_all_by_primary_fields(
        &self,
        request: ItemsRequest<Self::Model, AuthOf<Self>>,
        tx: Option<&TxOf<Self>>,
    ) -> Result<Vec<Self::Model>> {
        let request = request.try_map(|items| self.mapper().to_rows(&items))?;
        let rows = self.find_all_raw_by_primary_fields(request, tx).await?;
        self.mapper().to_models(rows)
    }

    /// Row identified by the primary fields of `request.item`, further
    /// narrowed by `request.filter` when present.
    async fn find_one_raw_by_primary_fields(
        &self,
        request: ItemRequest<Row, AuthOf<Self>>,
        tx: Option<&TxOf<Self>>,
    ) -> Result<Option<Row>> {
        let primary = self.core().primary_fields().await?;
        let key_filter = primary_key_filter(primary, std::slice::from_ref(&request.item))?;
        let filter = match request.filter {
            Some(extra) => key_filter.and(extra),
            None => key_filter,
        };

        let query = FindQuery::new()
            .maybe_fields(request.fields)
            .filter(filter)
            .pagination(Pagination::limit(1))
            .auth(request.auth);
        let rows = self.core().engine().find_all(query, tx).await?;
        Ok(rows.into_iter().next())
    }

    async fn find_one_by_primary_fields(
        &self,
        request: ItemRequest<Self::Model, AuthOf<Self>>,
        tx: Option<&TxOf<Self>>,
    ) -> Result<Option<Self::Model>> {
        let request = request.try_map(|item| self.mapper().to_row(&item))?;
        self.find_one_raw_by_primary_fields(request, tx)
            .await?
            .map(|row| self.mapper().to_model(row))
            .transpose()
    }

    /// Cheap existence probe: counts rows matching the item's primary fields.
    async fn find_exists_raw_by_primary_fields(
        &self,
        request: ItemRequest<Row, AuthOf<Self>>,
        tx: Option<&TxOf<Self>>,
    ) -> Result<bool> {
        let primary = self.core().primary_fields().await?;
        let filter = primary_key_filter(primary, std::slice::from_ref(&request.item))?;
        let count = self
            .core()
            .engine()
            .find_count(CountQuery::new(Some(filter), request.auth), tx)
            .await?;
        Ok(count != 0)
    }

    async fn find_exists_by_primary_fields(
        &self,
        request: ItemRequest<Self::Model, AuthOf<Self>>,
        tx: Option<&TxOf<Self>>,
    ) -> Result<bool> {
        let request = request.try_map(|item| self.mapper().to_row(&item))?;
        self.find_exists_raw_by_primary_fields(request, tx).await
    }

    async fn parse_api_filter(&self, input: &str) -> std::result::Result<Filter, FilterError> {
        self.core().parse_api_filter(input).await
    }

    async fn parse_api_fields(&self, input: &str) -> Result<Vec<Field>> {
        self.core().parse_api_fields(input).await
    }

    async fn parse_api_sorts(&self, input: &str) -> Result<Vec<SortBy>> {
        self.core().parse_api_sorts(input).await
    }
}

//! In-memory reference engine.
//!
//! Backs tests and the demo server. Tables live in a [`MemoryStore`], one per
//! schema node; a [`MemoryEngine`] serves a single node of that store.
//! Transactions are store-wide, so one [`MemoryTx`] can span several engines.

mod eval;
mod store;

pub use eval::eval_like;
pub use store::{MemoryStore, MemoryTx};

use super::QueryEngine;
use crate::core::{CrudError, Result, Row, get_in_row, values_equal};
use crate::query::{
    CountQuery, FindQuery, Filter, InsertQuery, RemoveQuery, RemoveWithFilterQuery, UpdateQuery,
    UpdateWithFilterQuery,
};
use crate::schema::{Field, SchemaNode};
use async_trait::async_trait;
use eval::{compare_rows, matches, project};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use store::{RowKey, TxWriter, View, row_key};
use tracing::debug;

/// Extra scope applied to every read, update and remove for a caller.
pub type AuthFilter<A> = Arc<dyn Fn(&SchemaNode, Option<&A>) -> Option<Filter> + Send + Sync>;

pub struct MemoryEngine<A> {
    store: MemoryStore,
    node: Arc<SchemaNode>,
    auth_filter: Option<AuthFilter<A>>,
}

impl<A> Clone for MemoryEngine<A> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            node: Arc::clone(&self.node),
            auth_filter: self.auth_filter.clone(),
        }
    }
}

impl<A> MemoryEngine<A> {
    pub fn new(store: MemoryStore, node: Arc<SchemaNode>) -> Self {
        Self {
            store,
            node,
            auth_filter: None,
        }
    }

    pub fn with_auth_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&SchemaNode, Option<&A>) -> Option<Filter> + Send + Sync + 'static,
    {
        self.auth_filter = Some(Arc::new(filter));
        self
    }

    pub fn node(&self) -> &Arc<SchemaNode> {
        &self.node
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    fn scope(&self, filter: Option<Filter>, auth: Option<&A>) -> Option<Filter> {
        let auth_scope = self
            .auth_filter
            .as_ref()
            .and_then(|auth_filter| auth_filter(&self.node, auth));
        Filter::all([filter, auth_scope])
    }

    /// Materialized rows of this node matching `scope`, with their keys.
    fn select(&self, view: &View<'_>, scope: Option<&Filter>) -> Result<Vec<(RowKey, Row)>> {
        let Some(table) = view.table(self.node.name()) else {
            return Ok(Vec::new());
        };

        let mut selected = Vec::new();
        for (key, stored) in table.entries() {
            let row = materialize(view, &self.node, stored);
            if let Some(filter) = scope {
                if !matches(filter, &row)? {
                    continue;
                }
            }
            selected.push((key.clone(), row));
        }
        Ok(selected)
    }

    /// Fails when `row` collides with another row on a declared unique constraint.
    fn check_unique(&self, view: &View<'_>, key: &RowKey, row: &Row) -> Result<()> {
        let Some(table) = view.table(self.node.name()) else {
            return Ok(());
        };

        for columns in self.node.unique_constraints() {
            let values: Vec<&JsonValue> = columns
                .iter()
                .filter_map(|column| row.get(column).filter(|value| !value.is_null()))
                .collect();
            if values.len() != columns.len() {
                continue;
            }

            let collides = table.entries().any(|(other_key, other)| {
                other_key != key
                    && columns.iter().zip(&values).all(|(column, value)| {
                        other
                            .get(column)
                            .is_some_and(|existing| values_equal(existing, value))
                    })
            });
            if collides {
                return Err(CrudError::store(format!(
                    "Unique constraint violated on {}({})",
                    self.node.name(),
                    columns.join(", ")
                )));
            }
        }
        Ok(())
    }

    fn insert_row(&self, writer: &mut TxWriter<'_>, fields: &[Field], item: &Row) -> Result<Row> {
        let table = self.node.name();
        let mut row = Row::new();

        for column in self.node.columns() {
            let value = fields
                .iter()
                .find(|field| column_name(field) == Some(column.name.as_str()))
                .and_then(|field| get_in_row(item, field.path()))
                .filter(|value| !value.is_null())
                .cloned();

            let value = match value {
                Some(value) => value,
                None if column.generated => writer.next_id(table, &column.name)?.into(),
                None => column.default.clone().unwrap_or(JsonValue::Null),
            };
            row.insert(column.name.clone(), value);
        }

        let key = row_key(&self.node, &row)?;
        {
            let view = writer.view();
            if view.table(table).is_some_and(|t| t.get(&key).is_some()) {
                return Err(CrudError::store(format!(
                    "Duplicate primary key on {table}"
                )));
            }
            self.check_unique(&view, &key, &row)?;
        }

        writer.put(table, key, row.clone());
        Ok(row)
    }
}

/// Local column written by `field`, following its alias when it was
/// declared through a relation key.
fn column_name(field: &Field) -> Option<&str> {
    let target = field.alias().unwrap_or(field);
    (target.is_column() && target.joins().is_empty()).then(|| target.name())
}

/// Expands a stored row with its derived values, aggregate counts and
/// joined relation objects. Derived values see stored columns only.
fn materialize(view: &View<'_>, node: &SchemaNode, stored: &Row) -> Row {
    let mut out = stored.clone();
    for column in node.columns() {
        out.entry(column.name.clone()).or_insert(JsonValue::Null);
    }

    for derived in node.derived_fields() {
        out.insert(derived.name.clone(), (derived.compute)(stored));
    }

    for aggregate in node.aggregates() {
        let count = match stored.get(&aggregate.local_key).filter(|v| !v.is_null()) {
            Some(local) => view
                .table(&aggregate.table)
                .map(|table| {
                    table
                        .rows()
                        .filter(|row| {
                            row.get(&aggregate.foreign_key)
                                .is_some_and(|value| values_equal(value, local))
                        })
                        .count()
                })
                .unwrap_or(0),
            None => 0,
        };
        out.insert(aggregate.name.clone(), JsonValue::from(count));
    }

    for relation in node.relations() {
        let joined = stored
            .get(&relation.local)
            .filter(|value| !value.is_null())
            .and_then(|local| {
                view.table(relation.target.name())?.rows().find(|row| {
                    row.get(&relation.foreign)
                        .is_some_and(|value| values_equal(value, local))
                })
            })
            .map(|row| JsonValue::Object(materialize(view, &relation.target, row)))
            .unwrap_or(JsonValue::Null);
        out.insert(relation.name.clone(), joined);
    }

    out
}

#[async_trait]
impl<A> QueryEngine for MemoryEngine<A>
where
    A: Clone + Send + Sync + 'static,
{
    type Tx = MemoryTx;
    type Auth = A;

    async fn schema(&self) -> Result<Arc<SchemaNode>> {
        Ok(Arc::clone(&self.node))
    }

    async fn begin(&self) -> Result<MemoryTx> {
        Ok(self.store.begin())
    }

    async fn commit(&self, tx: MemoryTx) -> Result<()> {
        self.store.commit(&tx).await
    }

    async fn rollback(&self, tx: MemoryTx) -> Result<()> {
        self.store.rollback(&tx).await
    }

    async fn find_all(&self, query: FindQuery<A>, tx: Option<&MemoryTx>) -> Result<Vec<Row>> {
        let FindQuery {
            fields,
            filter,
            sort_by,
            pagination,
            auth,
        } = query;
        let scope = self.scope(filter, auth.as_ref());

        self.store
            .read(tx, |view| {
                let mut rows: Vec<Row> = self
                    .select(&view, scope.as_ref())?
                    .into_iter()
                    .map(|(_, row)| row)
                    .collect();

                if !sort_by.is_empty() {
                    rows.sort_by(|a, b| compare_rows(a, b, &sort_by));
                }
                if let Some(pagination) = pagination {
                    rows = pagination.apply(rows);
                }

                Ok(match &fields {
                    Some(fields) => rows.iter().map(|row| project(row, fields)).collect(),
                    None => rows,
                })
            })
            .await
    }

    async fn find_count(&self, query: CountQuery<A>, tx: Option<&MemoryTx>) -> Result<u64> {
        let scope = self.scope(query.filter, query.auth.as_ref());
        self.store
            .read(tx, |view| Ok(self.select(&view, scope.as_ref())?.len() as u64))
            .await
    }

    async fn insert_many(&self, query: InsertQuery<A>, tx: &MemoryTx) -> Result<Vec<Row>> {
        let fields = query.fields.to_vec();
        let inserted = self
            .store
            .write(tx, |writer| {
                query
                    .items
                    .iter()
                    .map(|item| self.insert_row(writer, &fields, item))
                    .collect::<Result<Vec<_>>>()
            })
            .await?;

        debug!(table = self.node.name(), rows = inserted.len(), "inserted rows");
        Ok(inserted)
    }

    async fn update_many(&self, query: UpdateQuery<A>, tx: &MemoryTx) -> Result<u64> {
        let scope = self.scope(None, query.auth.as_ref());
        let table = self.node.name();

        let updated = self
            .store
            .write(tx, |writer| {
                let mut updated = 0;
                for item in &query.items {
                    let key = row_key(&self.node, item)?;
                    let row = {
                        let view = writer.view();
                        let Some(stored) = view.table(table).and_then(|t| t.get(&key)) else {
                            continue;
                        };
                        if let Some(scope) = &scope {
                            if !matches(scope, &materialize(&view, &self.node, stored))? {
                                continue;
                            }
                        }

                        let mut row = stored.clone();
                        for field in &query.fields {
                            if let (Some(column), Some(value)) =
                                (column_name(field), get_in_row(item, field.path()))
                            {
                                row.insert(column.to_string(), value.clone());
                            }
                        }
                        self.check_unique(&view, &key, &row)?;
                        row
                    };
                    writer.put(table, key, row);
                    updated += 1;
                }
                Ok(updated)
            })
            .await?;

        debug!(table, rows = updated, "updated rows");
        Ok(updated)
    }

    async fn update_with_filter(
        &self,
        query: UpdateWithFilterQuery<A>,
        tx: &MemoryTx,
    ) -> Result<u64> {
        let scope = self.scope(Some(query.filter), query.auth.as_ref());
        let table = self.node.name();

        let updated = self
            .store
            .write(tx, |writer| {
                let rows = {
                    let view = writer.view();
                    let mut rows = Vec::new();
                    for (key, _) in self.select(&view, scope.as_ref())? {
                        let Some(stored) = view.table(table).and_then(|t| t.get(&key)) else {
                            continue;
                        };
                        let mut row = stored.clone();
                        for column in self.node.columns() {
                            if let Some(value) = query.values.get(&column.name) {
                                row.insert(column.name.clone(), value.clone());
                            }
                        }
                        self.check_unique(&view, &key, &row)?;
                        rows.push((key, row));
                    }
                    rows
                };

                let updated = rows.len() as u64;
                for (key, row) in rows {
                    writer.put(table, key, row);
                }
                Ok(updated)
            })
            .await?;

        debug!(table, rows = updated, "updated rows with filter");
        Ok(updated)
    }

    async fn remove_many(&self, query: RemoveQuery<A>, tx: &MemoryTx) -> Result<u64> {
        let scope = self.scope(None, query.auth.as_ref());
        let table = self.node.name();

        let removed = self
            .store
            .write(tx, |writer| {
                let mut keys = Vec::with_capacity(query.items.len());
                {
                    let view = writer.view();
                    for item in &query.items {
                        let key = row_key(&self.node, item)?;
                        let Some(stored) = view.table(table).and_then(|t| t.get(&key)) else {
                            continue;
                        };
                        if let Some(scope) = &scope {
                            if !matches(scope, &materialize(&view, &self.node, stored))? {
                                continue;
                            }
                        }
                        keys.push(key);
                    }
                }

                Ok(keys
                    .into_iter()
                    .filter(|key| writer.delete(table, key.clone()))
                    .count() as u64)
            })
            .await?;

        debug!(table, rows = removed, "removed rows");
        Ok(removed)
    }

    async fn remove_with_filter(
        &self,
        query: RemoveWithFilterQuery<A>,
        tx: &MemoryTx,
    ) -> Result<u64> {
        let scope = self.scope(Some(query.filter), query.auth.as_ref());
        let table = self.node.name();

        let removed = self
            .store
            .write(tx, |writer| {
                let keys: Vec<RowKey> = self
                    .select(&writer.view(), scope.as_ref())?
                    .into_iter()
                    .map(|(key, _)| key)
                    .collect();

                Ok(keys
                    .into_iter()
                    .filter(|key| writer.delete(table, key.clone()))
                    .count() as u64)
            })
            .await?;

        debug!(table, rows = removed, "removed rows with filter");
        Ok(removed)
    }
}

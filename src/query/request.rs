//! Request descriptors.
//!
//! Reads and filter-scoped writes take a *builder*: a closure that receives
//! the live [`SchemaNode`](crate::schema::SchemaNode) and returns the
//! descriptor. The closure runs inside the operation, after the schema is
//! resolved, so descriptors can reference fields without the caller holding
//! a schema handle.

use super::{Filter, Pagination, SortBy};
use crate::core::Row;
use crate::schema::{Field, FieldSet};

#[derive(Debug, Clone)]
pub struct FindQuery<A> {
    pub fields: Option<Vec<Field>>,
    pub filter: Option<Filter>,
    pub sort_by: Vec<SortBy>,
    pub pagination: Option<Pagination>,
    pub auth: Option<A>,
}

impl<A> Default for FindQuery<A> {
    fn default() -> Self {
        Self {
            fields: None,
            filter: None,
            sort_by: Vec::new(),
            pagination: None,
            auth: None,
        }
    }
}

impl<A> FindQuery<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields(mut self, fields: impl IntoIterator<Item = Field>) -> Self {
        self.fields = Some(fields.into_iter().collect());
        self
    }

    pub fn maybe_fields(mut self, fields: Option<Vec<Field>>) -> Self {
        self.fields = fields;
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn maybe_filter(mut self, filter: Option<Filter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn sort_by(mut self, sort_by: Vec<SortBy>) -> Self {
        self.sort_by = sort_by;
        self
    }

    pub fn pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = Some(pagination);
        self
    }

    pub fn auth(mut self, auth: Option<A>) -> Self {
        self.auth = auth;
        self
    }
}

#[derive(Debug, Clone)]
pub struct CountQuery<A> {
    pub filter: Option<Filter>,
    pub auth: Option<A>,
}

impl<A> CountQuery<A> {
    pub fn new(filter: Option<Filter>, auth: Option<A>) -> Self {
        Self { filter, auth }
    }
}

impl<A: Clone> From<&FindQuery<A>> for CountQuery<A> {
    fn from(query: &FindQuery<A>) -> Self {
        Self {
            filter: query.filter.clone(),
            auth: query.auth.clone(),
        }
    }
}

/// Engine-level insert: write `fields` of each item.
#[derive(Debug, Clone)]
pub struct InsertQuery<A> {
    pub fields: FieldSet,
    pub items: Vec<Row>,
    pub auth: Option<A>,
}

/// Engine-level update: write `fields` of each item onto the row sharing its primary key.
#[derive(Debug, Clone)]
pub struct UpdateQuery<A> {
    pub fields: FieldSet,
    pub items: Vec<Row>,
    pub auth: Option<A>,
}

#[derive(Debug, Clone)]
pub struct UpdateWithFilterQuery<A> {
    /// Column values to set, laid out as a (possibly nested) row
    pub values: Row,
    pub filter: Filter,
    pub auth: Option<A>,
    /// Upper bound of rows returned by the refetch
    pub expected: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct RemoveQuery<A> {
    pub items: Vec<Row>,
    pub auth: Option<A>,
}

#[derive(Debug, Clone)]
pub struct RemoveWithFilterQuery<A> {
    pub filter: Filter,
    pub auth: Option<A>,
}

/// Single-item request: find/exists by primary key, insert/update/remove/upsert one.
#[derive(Debug, Clone)]
pub struct ItemRequest<T, A> {
    pub item: T,
    pub fields: Option<Vec<Field>>,
    pub filter: Option<Filter>,
    pub auth: Option<A>,
}

impl<T, A> ItemRequest<T, A> {
    pub fn new(item: T) -> Self {
        Self {
            item,
            fields: None,
            filter: None,
            auth: None,
        }
    }

    pub fn fields(mut self, fields: Option<Vec<Field>>) -> Self {
        self.fields = fields;
        self
    }

    pub fn filter(mut self, filter: Option<Filter>) -> Self {
        self.filter = filter;
        self
    }

    pub fn auth(mut self, auth: Option<A>) -> Self {
        self.auth = auth;
        self
    }

    /// Converts the item, keeping the rest of the request.
    pub fn try_map<U, E>(
        self,
        convert: impl FnOnce(T) -> Result<U, E>,
    ) -> Result<ItemRequest<U, A>, E> {
        Ok(ItemRequest {
            item: convert(self.item)?,
            fields: self.fields,
            filter: self.filter,
            auth: self.auth,
        })
    }
}

/// Multi-item request: find by primary keys, insert/update/remove/upsert many.
#[derive(Debug, Clone)]
pub struct ItemsRequest<T, A> {
    pub items: Vec<T>,
    pub fields: Option<Vec<Field>>,
    pub auth: Option<A>,
}

impl<T, A> ItemsRequest<T, A> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            fields: None,
            auth: None,
        }
    }

    pub fn fields(mut self, fields: Option<Vec<Field>>) -> Self {
        self.fields = fields;
        self
    }

    pub fn auth(mut self, auth: Option<A>) -> Self {
        self.auth = auth;
        self
    }

    pub fn try_map<U, E>(
        self,
        convert: impl FnOnce(Vec<T>) -> Result<Vec<U>, E>,
    ) -> Result<ItemsRequest<U, A>, E> {
        Ok(ItemsRequest {
            items: convert(self.items)?,
            fields: self.fields,
            auth: self.auth,
        })
    }
}

/// Replace request: `filter` is the replacement scope.
#[derive(Debug, Clone)]
pub struct ReplaceQuery<T, A> {
    pub items: Vec<T>,
    pub filter: Filter,
    pub auth: Option<A>,
}

impl<T, A> ReplaceQuery<T, A> {
    pub fn new(items: Vec<T>, filter: Filter) -> Self {
        Self {
            items,
            filter,
            auth: None,
        }
    }

    pub fn auth(mut self, auth: Option<A>) -> Self {
        self.auth = auth;
        self
    }
}

use super::request::{Params, QueryValue};
use crate::core::{LimitConfig, LimitDefault, QueryKeys, Result};
use crate::query::{Filter, SortBy};
use crate::schema::SchemaNode;
use std::fmt;
use std::sync::Arc;

/// Sort order used when a find request carries none.
pub type DefaultSortFn = Arc<dyn Fn(&SchemaNode) -> Vec<SortBy> + Send + Sync>;

/// Turns the value of an extra query key into a filter fragment. Runs with
/// `None` when the key is absent from the request.
pub type QueryFilterFn<A> =
    Arc<dyn Fn(&SchemaNode, Option<&QueryValue>, Option<&A>) -> Result<Option<Filter>> + Send + Sync>;

/// Derives a filter fragment from path parameters.
pub type ParamsFilterFn<A> =
    Arc<dyn Fn(&SchemaNode, &Params, Option<&A>) -> Result<Option<Filter>> + Send + Sync>;

/// Find pipeline configuration for a route group.
pub struct ControllerConfig<A> {
    pub query_keys: QueryKeys,
    pub limits: LimitConfig,
    pub default_sort_by: Option<DefaultSortFn>,
    /// Applied in insertion order
    pub additional_filters: Vec<(String, QueryFilterFn<A>)>,
    pub find_params_filter: Option<ParamsFilterFn<A>>,
    /// Falls back to `find_params_filter` when unset
    pub find_one_params_filter: Option<ParamsFilterFn<A>>,
}

impl<A> Default for ControllerConfig<A> {
    fn default() -> Self {
        Self {
            query_keys: QueryKeys::default(),
            limits: LimitConfig::default(),
            default_sort_by: None,
            additional_filters: Vec::new(),
            find_params_filter: None,
            find_one_params_filter: None,
        }
    }
}

impl<A> Clone for ControllerConfig<A> {
    fn clone(&self) -> Self {
        Self {
            query_keys: self.query_keys.clone(),
            limits: self.limits,
            default_sort_by: self.default_sort_by.clone(),
            additional_filters: self.additional_filters.clone(),
            find_params_filter: self.find_params_filter.clone(),
            find_one_params_filter: self.find_one_params_filter.clone(),
        }
    }
}

impl<A> fmt::Debug for ControllerConfig<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let filter_keys: Vec<&str> = self
            .additional_filters
            .iter()
            .map(|(key, _)| key.as_str())
            .collect();
        f.debug_struct("ControllerConfig")
            .field("query_keys", &self.query_keys)
            .field("limits", &self.limits)
            .field("default_sort_by", &self.default_sort_by.is_some())
            .field("additional_filters", &filter_keys)
            .field("find_params_filter", &self.find_params_filter.is_some())
            .field("find_one_params_filter", &self.find_one_params_filter.is_some())
            .finish()
    }
}

impl<A> ControllerConfig<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query_keys(mut self, keys: QueryKeys) -> Self {
        self.query_keys = keys;
        self
    }

    pub fn default_limit(mut self, default: LimitDefault) -> Self {
        self.limits.default_limit = default;
        self
    }

    /// `None` removes the maximum
    pub fn max_limit(mut self, max: Option<u64>) -> Self {
        self.limits.max_limit = max;
        self
    }

    pub fn default_sort_by<F>(mut self, provider: F) -> Self
    where
        F: Fn(&SchemaNode) -> Vec<SortBy> + Send + Sync + 'static,
    {
        self.default_sort_by = Some(Arc::new(provider));
        self
    }

    pub fn additional_filter<F>(mut self, key: &str, build: F) -> Self
    where
        F: Fn(&SchemaNode, Option<&QueryValue>, Option<&A>) -> Result<Option<Filter>>
            + Send
            + Sync
            + 'static,
    {
        self.additional_filters.push((key.to_string(), Arc::new(build)));
        self
    }

    pub fn find_params_filter<F>(mut self, build: F) -> Self
    where
        F: Fn(&SchemaNode, &Params, Option<&A>) -> Result<Option<Filter>> + Send + Sync + 'static,
    {
        self.find_params_filter = Some(Arc::new(build));
        self
    }

    pub fn find_one_params_filter<F>(mut self, build: F) -> Self
    where
        F: Fn(&SchemaNode, &Params, Option<&A>) -> Result<Option<Filter>> + Send + Sync + 'static,
    {
        self.find_one_params_filter = Some(Arc::new(build));
        self
    }

    pub(crate) fn find_one_filter_fn(&self) -> Option<&ParamsFilterFn<A>> {
        self.find_one_params_filter
            .as_ref()
            .or(self.find_params_filter.as_ref())
    }
}

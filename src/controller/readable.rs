use super::binding::EntityBinding;
use super::config::ControllerConfig;
use super::params::{parse_pagination, single_query_value};
use super::request::ApiRequest;
use super::response::{ApiResponse, DataResponse, FindResponse};
use super::routes::{Route, RouteAuth, RouteTable};
use crate::core::{CrudError, Result};
use crate::dao::{AuthOf, Reader};
use crate::query::{Filter, FilterError, FindQuery, ItemRequest, Pagination, SortBy};
use crate::schema::{Field, SchemaNode};
use crate::service::ReadableService;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tracing::debug;

/// Message of a client error, so it can be carried as a reason.
fn client_reason(err: CrudError) -> Result<String> {
    match err {
        CrudError::BadRequest { message, .. } => Ok(message),
        other if other.is_client_error() => Ok(other.to_string()),
        other => Err(other),
    }
}

fn invalid_filter(err: FilterError) -> CrudError {
    if !err.is_client_error() {
        return CrudError::internal(err.to_string());
    }
    let annotated_input = err.annotated_input().map(str::to_string);
    CrudError::BadRequest {
        message: "Invalid filter query parameter".to_string(),
        reason: Some(err.to_string()),
        annotated_input,
    }
}

/// Read endpoints over a [`ReadableService`]: find and find-one.
pub struct ReadableController<D: Reader, B> {
    service: ReadableService<D>,
    binding: B,
    config: ControllerConfig<AuthOf<D>>,
}

impl<D, B> ReadableController<D, B>
where
    D: Reader,
    D::Model: Serialize + DeserializeOwned,
    B: EntityBinding<D::Model>,
{
    pub fn new(service: ReadableService<D>, binding: B) -> Self {
        Self {
            service,
            binding,
            config: ControllerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ControllerConfig<AuthOf<D>>) -> Self {
        self.config = config;
        self
    }

    pub fn service(&self) -> &ReadableService<D> {
        &self.service
    }

    pub fn binding(&self) -> &B {
        &self.binding
    }

    pub fn config(&self) -> &ControllerConfig<AuthOf<D>> {
        &self.config
    }

    /// Paged find. The parsed filter, the additional query filters and the
    /// params filter are ANDed together.
    pub async fn find(
        &self,
        request: &ApiRequest<AuthOf<D>>,
    ) -> Result<FindResponse<JsonValue>> {
        let raw_filter = self.parse_request_filter(request).await?;
        let fields = self.parse_request_fields(request).await?;
        let sort_by = self.parse_request_sorts(request).await?;
        let pagination = self.parse_request_pagination(request)?;
        let auth = request.auth.clone();

        self.binding
            .assert_valid_find_params(&request.params)
            .await?;

        let schema = self.service.schema().await?;
        let params_filter = match &self.config.find_params_filter {
            Some(build) => build(&schema, &request.params, auth.as_ref())?,
            None => None,
        };

        let query = FindQuery::new()
            .maybe_fields(fields)
            .maybe_filter(Filter::all([raw_filter, params_filter]))
            .sort_by(sort_by)
            .pagination(pagination)
            .auth(auth);
        let counted = self
            .service
            .find_with_count(move |_: &SchemaNode| query, None)
            .await?;

        let data = counted
            .rows
            .iter()
            .map(|model| self.binding.model_to_json(model))
            .collect::<Result<Vec<_>>>()?;
        Ok(FindResponse {
            data,
            total_count: counted.count,
        })
    }

    /// Single row anchored by the path parameters.
    pub async fn find_one(&self, request: &ApiRequest<AuthOf<D>>) -> Result<DataResponse<JsonValue>> {
        let item = self.binding.find_one_params_to_model(&request.params)?;
        let fields = self.parse_request_fields(request).await?;
        let auth = request.auth.clone();

        self.binding
            .assert_valid_find_one_params(&request.params)
            .await?;

        let filter = match self.config.find_one_filter_fn() {
            Some(build) => {
                let schema = self.service.schema().await?;
                build(&schema, &request.params, auth.as_ref())?
            }
            None => None,
        };

        let model = self
            .service
            .find_by_primary_fields(
                ItemRequest::new(item)
                    .fields(fields)
                    .filter(filter)
                    .auth(auth),
                None,
            )
            .await?
            .ok_or_else(|| CrudError::not_found("Row"))?;

        Ok(DataResponse {
            data: self.binding.model_to_json(&model)?,
        })
    }

    /// Projection from the fields key; `None` when absent or empty.
    pub async fn parse_request_fields(
        &self,
        request: &ApiRequest<AuthOf<D>>,
    ) -> Result<Option<Vec<Field>>> {
        let raw = match request.query_value(&self.config.query_keys.fields) {
            Some(value) => value.joined(","),
            None => return Ok(None),
        };
        if raw.trim().is_empty() {
            return Ok(None);
        }

        match self.service.parse_api_fields(&raw).await {
            Ok(fields) => Ok(Some(fields)),
            Err(err) => {
                let reason = client_reason(err)?;
                debug!(input = %raw, %reason, "rejected fields query parameter");
                Err(CrudError::bad_request("Invalid fields query parameter").with_reason(reason))
            }
        }
    }

    /// Textual filter ANDed with every configured additional filter, in
    /// configuration order.
    pub async fn parse_request_filter(
        &self,
        request: &ApiRequest<AuthOf<D>>,
    ) -> Result<Option<Filter>> {
        let mut filter = match single_query_value(request, &self.config.query_keys.filter)? {
            Some(raw) => Some(self.service.parse_api_filter(raw).await.map_err(|err| {
                debug!(input = %raw, error = %err, "rejected filter query parameter");
                invalid_filter(err)
            })?),
            None => None,
        };

        if !self.config.additional_filters.is_empty() {
            let schema = self.service.schema().await?;
            for (key, build) in &self.config.additional_filters {
                let extra = build(&schema, request.query_value(key), request.auth.as_ref())?;
                filter = Filter::all([filter, extra]);
            }
        }
        Ok(filter)
    }

    /// Sorts from the sorts key, or the configured default when none parse.
    pub async fn parse_request_sorts(
        &self,
        request: &ApiRequest<AuthOf<D>>,
    ) -> Result<Vec<SortBy>> {
        let raw = request
            .query_value(&self.config.query_keys.sorts)
            .map(|value| value.joined(","))
            .unwrap_or_default();

        let sorts = if raw.trim().is_empty() {
            Vec::new()
        } else {
            self.service.parse_api_sorts(&raw).await?
        };

        match &self.config.default_sort_by {
            Some(provider) if sorts.is_empty() => {
                let schema = self.service.schema().await?;
                Ok(provider(&schema))
            }
            _ => Ok(sorts),
        }
    }

    pub fn parse_request_pagination(&self, request: &ApiRequest<AuthOf<D>>) -> Result<Pagination> {
        parse_pagination(request, &self.config.query_keys, &self.config.limits)
    }
}

impl<D, B> ReadableController<D, B>
where
    D: Reader + 'static,
    D::Model: Serialize + DeserializeOwned,
    B: EntityBinding<D::Model> + 'static,
{
    /// `GET collection_path` (find) and `GET item_path` (find-one).
    pub fn routes(
        self: &Arc<Self>,
        collection_path: &str,
        item_path: &str,
        auth: RouteAuth<AuthOf<D>>,
    ) -> RouteTable<AuthOf<D>> {
        let find = Arc::clone(self);
        let find_one = Arc::clone(self);

        RouteTable::new()
            .with(
                Route::get(collection_path, move |request| {
                    let controller = Arc::clone(&find);
                    async move { ApiResponse::json(&controller.find(&request).await?) }
                })
                .auth(auth.clone()),
            )
            .with(
                Route::get(item_path, move |request| {
                    let controller = Arc::clone(&find_one);
                    async move { ApiResponse::json(&controller.find_one(&request).await?) }
                })
                .auth(auth),
            )
    }
}

use super::binding::EntityBinding;
use super::config::ControllerConfig;
use super::readable::ReadableController;
use super::request::ApiRequest;
use super::response::{ApiResponse, DataResponse, SuccessResponse};
use super::routes::{Route, RouteAuth, RouteTable};
use crate::core::{CrudError, Result};
use crate::dao::{AuthOf, TxOf, Writer};
use crate::query::ItemRequest;
use crate::service::{NoHooks, WritableService, WriteHooks};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::ops::Deref;
use std::sync::Arc;
use tracing::debug;

/// Read and write endpoints over a [`WritableService`].
///
/// Bodies are converted and identity-checked here, so malformed requests
/// never reach the service.
pub struct WritableController<D: Writer, B, H = NoHooks> {
    readable: ReadableController<D, B>,
    service: WritableService<D, H>,
}

impl<D, B, H> WritableController<D, B, H>
where
    D: Writer,
    D::Model: Clone + Serialize + DeserializeOwned,
    B: EntityBinding<D::Model>,
    H: WriteHooks<D::Model, AuthOf<D>, TxOf<D>>,
{
    pub fn new(service: WritableService<D, H>, binding: B) -> Self {
        Self {
            readable: ReadableController::new((*service).clone(), binding),
            service,
        }
    }

    pub fn with_config(mut self, config: ControllerConfig<AuthOf<D>>) -> Self {
        self.readable = self.readable.with_config(config);
        self
    }

    pub fn writable_service(&self) -> &WritableService<D, H> {
        &self.service
    }

    pub async fn insert(&self, request: ApiRequest<AuthOf<D>>) -> Result<DataResponse<JsonValue>> {
        let item = self.body_to_model(request.body)?;
        let model = self
            .service
            .insert(ItemRequest::new(item).auth(request.auth), None)
            .await?;
        Ok(DataResponse {
            data: self.binding().model_to_json(&model)?,
        })
    }

    /// Updates the row named by the path. The body must carry the same
    /// identity as the path.
    pub async fn update(&self, request: ApiRequest<AuthOf<D>>) -> Result<DataResponse<JsonValue>> {
        let item = self.body_to_model(request.body)?;
        let path_item = self.binding().update_params_to_model(&request.params)?;

        if !self.binding().check_params_match_body(&item, &path_item) {
            debug!(params = ?request.params, "update body does not match path");
            return Err(CrudError::bad_request(
                "Request path does not match body payload",
            ));
        }

        let model = self
            .service
            .update(ItemRequest::new(item).auth(request.auth), None)
            .await?;
        Ok(DataResponse {
            data: self.binding().model_to_json(&model)?,
        })
    }

    pub async fn remove(&self, request: ApiRequest<AuthOf<D>>) -> Result<SuccessResponse> {
        let item = self.binding().remove_params_to_model(&request.params)?;
        let success = self
            .service
            .remove(ItemRequest::new(item).auth(request.auth), None)
            .await?;
        Ok(SuccessResponse { success })
    }

    pub fn body_to_model(&self, body: Option<JsonValue>) -> Result<D::Model> {
        let body = body.ok_or_else(|| CrudError::bad_request("Missing body payload"))?;
        self.binding().json_to_model(body).map_err(|err| {
            CrudError::bad_request("Invalid body payload").with_reason(err.to_string())
        })
    }
}

impl<D, B, H> WritableController<D, B, H>
where
    D: Writer + 'static,
    D::Model: Clone + Serialize + DeserializeOwned,
    B: EntityBinding<D::Model> + 'static,
    H: WriteHooks<D::Model, AuthOf<D>, TxOf<D>> + 'static,
{
    /// Find and find-one plus `POST collection_path`, `PUT item_path` and
    /// `DELETE item_path`.
    pub fn routes(
        self: &Arc<Self>,
        collection_path: &str,
        item_path: &str,
        auth: RouteAuth<AuthOf<D>>,
    ) -> RouteTable<AuthOf<D>> {
        let find = Arc::clone(self);
        let find_one = Arc::clone(self);
        let insert = Arc::clone(self);
        let update = Arc::clone(self);
        let remove = Arc::clone(self);

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
                .auth(auth.clone()),
            )
            .with(
                Route::post(collection_path, move |request| {
                    let controller = Arc::clone(&insert);
                    async move { ApiResponse::json(&controller.insert(request).await?) }
                })
                .auth(auth.clone()),
            )
            .with(
                Route::put(item_path, move |request| {
                    let controller = Arc::clone(&update);
                    async move { ApiResponse::json(&controller.update(request).await?) }
                })
                .auth(auth.clone()),
            )
            .with(
                Route::delete(item_path, move |request| {
                    let controller = Arc::clone(&remove);
                    async move { ApiResponse::json(&controller.remove(request).await?) }
                })
                .auth(auth),
            )
    }
}

impl<D: Writer, B, H> Deref for WritableController<D, B, H> {
    type Target = ReadableController<D, B>;

    fn deref(&self) -> &Self::Target {
        &self.readable
    }
}

//! axum glue.
//!
//! Mounts a [`RouteTable`] onto an [`axum::Router`]: path parameters, the
//! decoded query, headers and the JSON body become an [`ApiRequest`], the
//! caller identity comes from an authenticator over the headers, and both
//! [`ApiResponse`] and [`CrudError`] render as HTTP responses.

use crate::controller::{ApiRequest, ApiResponse, Headers, Method, Route, RouteTable};
use crate::core::{CrudError, Result};
use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query};
use axum::response::{IntoResponse, Response};
use axum::routing::{MethodFilter, on};
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error};

/// Resolves the caller identity from request headers. `Ok(None)` is an
/// anonymous caller; an error rejects the request outright.
pub type Authenticator<A> = Arc<dyn Fn(&Headers) -> Result<Option<A>> + Send + Sync>;

impl IntoResponse for CrudError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!(error = %self, "request failed");
        } else {
            debug!(error = %self, "request rejected");
        }
        (status, Json(self.payload())).into_response()
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::OK);
        let body = match self.value {
            JsonValue::String(text) if !self.content_type.contains("json") => text,
            value => value.to_string(),
        };

        let mut response = (status, body).into_response();
        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&self.content_type) {
            headers.insert(CONTENT_TYPE, value);
        }
        for (name, value) in self.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(&value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => debug!(header = %name, "skipping invalid response header"),
            }
        }
        response
    }
}

/// Authenticator reading the identity verbatim from one header.
pub fn header_identity(name: &str) -> Authenticator<String> {
    let name = name.to_ascii_lowercase();
    Arc::new(move |headers: &Headers| {
        Ok(headers
            .get(&name)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string))
    })
}

/// Authenticator that never identifies anyone.
pub fn anonymous<A>() -> Authenticator<A> {
    Arc::new(|_: &Headers| Ok(None))
}

fn method_filter(method: Method) -> MethodFilter {
    match method {
        Method::Get => MethodFilter::GET,
        Method::Post => MethodFilter::POST,
        Method::Put => MethodFilter::PUT,
        Method::Delete => MethodFilter::DELETE,
        Method::Patch => MethodFilter::PATCH,
    }
}

fn to_headers(headers: &HeaderMap) -> Headers {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str(), value.to_string()))
        })
        .collect()
}

fn parse_body(body: &Bytes) -> Result<Option<JsonValue>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body).map(Some).map_err(|err| {
        CrudError::bad_request("Invalid JSON body").with_reason(err.to_string())
    })
}

async fn dispatch<A>(
    route: &Route<A>,
    authenticate: &Authenticator<A>,
    params: HashMap<String, String>,
    query: Vec<(String, String)>,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<ApiResponse>
where
    A: Clone + Send + Sync + 'static,
{
    let headers = to_headers(headers);
    let auth = authenticate(&headers)?;
    let mut request = ApiRequest::new().query_pairs(query).auth(auth);
    request.params = params;
    request.headers = headers;
    request.body = parse_body(body)?;
    route.call(request).await
}

/// Builds a router serving every route of `table`.
pub fn router<A>(table: RouteTable<A>, authenticate: Authenticator<A>) -> axum::Router
where
    A: Clone + Send + Sync + 'static,
{
    let mut router = axum::Router::new();
    for route in table {
        debug!(method = %route.method, path = %route.path, public = route.is_public(), "mounting route");
        let filter = method_filter(route.method);
        let path = route.path.clone();
        let route = Arc::new(route);
        let authenticate = Arc::clone(&authenticate);

        let handler = move |params: Option<Path<HashMap<String, String>>>,
                            Query(query): Query<Vec<(String, String)>>,
                            headers: HeaderMap,
                            body: Bytes| {
            let route = Arc::clone(&route);
            let authenticate = Arc::clone(&authenticate);
            async move {
                let params = params.map(|Path(params)| params).unwrap_or_default();
                dispatch(&route, &authenticate, params, query, &headers, &body)
                    .await
                    .into_response()
            }
        };
        router = router.route(&path, on(filter, handler));
    }
    router
}

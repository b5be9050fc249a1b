//! Route table.
//!
//! Controllers register their handlers explicitly. Every route carries an
//! auth requirement that is checked before the handler runs; an external
//! router (see [`crate::web`]) mounts the table.

use super::request::ApiRequest;
use super::response::ApiResponse;
use crate::core::{CrudError, Result};
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

pub type RouteHandler<A> =
    Arc<dyn Fn(ApiRequest<A>) -> BoxFuture<'static, Result<ApiResponse>> + Send + Sync>;

/// Async predicate over the caller identity.
pub type AuthCheck<A> = Arc<dyn Fn(A) -> BoxFuture<'static, Result<bool>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who may call a route.
pub enum RouteAuth<A> {
    /// A caller identity must be present
    Required,
    Optional,
    /// Public route, marked as such in the table
    None,
    /// Identity must be present and the check must pass
    Check(AuthCheck<A>),
}

impl<A> RouteAuth<A> {
    pub fn check<F, Fut>(check: F) -> Self
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool>> + Send + 'static,
    {
        Self::Check(Arc::new(move |auth| Box::pin(check(auth))))
    }

    fn requires_identity(&self) -> bool {
        matches!(self, Self::Required | Self::Check(_))
    }
}

impl<A> Default for RouteAuth<A> {
    fn default() -> Self {
        Self::Required
    }
}

impl<A> Clone for RouteAuth<A> {
    fn clone(&self) -> Self {
        match self {
            Self::Required => Self::Required,
            Self::Optional => Self::Optional,
            Self::None => Self::None,
            Self::Check(check) => Self::Check(Arc::clone(check)),
        }
    }
}

impl<A> fmt::Debug for RouteAuth<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Required => f.write_str("Required"),
            Self::Optional => f.write_str("Optional"),
            Self::None => f.write_str("None"),
            Self::Check(_) => f.write_str("Check(..)"),
        }
    }
}

/// Descriptive metadata for documentation generators.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteMetadata {
    pub description: Option<String>,
    pub content_type: Option<String>,
    pub auth_strategies: Vec<String>,
}

impl RouteMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn auth_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.auth_strategies.push(strategy.into());
        self
    }
}

pub struct Route<A> {
    pub method: Method,
    pub path: String,
    pub auth: RouteAuth<A>,
    pub metadata: RouteMetadata,
    handler: RouteHandler<A>,
}

impl<A> Clone for Route<A> {
    fn clone(&self) -> Self {
        Self {
            method: self.method,
            path: self.path.clone(),
            auth: self.auth.clone(),
            metadata: self.metadata.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

impl<A> fmt::Debug for Route<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("auth", &self.auth)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

impl<A> Route<A>
where
    A: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(method: Method, path: &str, handler: F) -> Self
    where
        F: Fn(ApiRequest<A>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ApiResponse>> + Send + 'static,
    {
        Self {
            method,
            path: path.to_string(),
            auth: RouteAuth::default(),
            metadata: RouteMetadata::default(),
            handler: Arc::new(move |request| Box::pin(handler(request))),
        }
    }

    pub fn get<F, Fut>(path: &str, handler: F) -> Self
    where
        F: Fn(ApiRequest<A>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ApiResponse>> + Send + 'static,
    {
        Self::new(Method::Get, path, handler)
    }

    pub fn post<F, Fut>(path: &str, handler: F) -> Self
    where
        F: Fn(ApiRequest<A>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ApiResponse>> + Send + 'static,
    {
        Self::new(Method::Post, path, handler)
    }

    pub fn put<F, Fut>(path: &str, handler: F) -> Self
    where
        F: Fn(ApiRequest<A>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ApiResponse>> + Send + 'static,
    {
        Self::new(Method::Put, path, handler)
    }

    pub fn patch<F, Fut>(path: &str, handler: F) -> Self
    where
        F: Fn(ApiRequest<A>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ApiResponse>> + Send + 'static,
    {
        Self::new(Method::Patch, path, handler)
    }

    pub fn delete<F, Fut>(path: &str, handler: F) -> Self
    where
        F: Fn(ApiRequest<A>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ApiResponse>> + Send + 'static,
    {
        Self::new(Method::Delete, path, handler)
    }

    pub fn auth(mut self, auth: RouteAuth<A>) -> Self {
        self.auth = auth;
        self
    }

    pub fn metadata(mut self, metadata: RouteMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn is_public(&self) -> bool {
        matches!(self.auth, RouteAuth::None)
    }

    /// Runs the auth gate, then the handler.
    pub async fn call(&self, request: ApiRequest<A>) -> Result<ApiResponse> {
        authorize(&self.auth, request.auth.as_ref()).await.inspect_err(|err| {
            debug!(method = %self.method, path = %self.path, error = %err, "request rejected by auth gate");
        })?;
        (self.handler)(request).await
    }
}

async fn authorize<A: Clone>(requirement: &RouteAuth<A>, caller: Option<&A>) -> Result<()> {
    if !requirement.requires_identity() {
        return Ok(());
    }
    let Some(caller) = caller else {
        return Err(CrudError::Unauthorized);
    };
    if let RouteAuth::Check(check) = requirement {
        if !check(caller.clone()).await? {
            return Err(CrudError::Forbidden);
        }
    }
    Ok(())
}

/// Ordered list of routes exposed by one or more controllers.
pub struct RouteTable<A> {
    routes: Vec<Route<A>>,
}

impl<A> Default for RouteTable<A> {
    fn default() -> Self {
        Self { routes: Vec::new() }
    }
}

impl<A> Clone for RouteTable<A> {
    fn clone(&self) -> Self {
        Self {
            routes: self.routes.clone(),
        }
    }
}

impl<A> fmt::Debug for RouteTable<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.routes).finish()
    }
}

impl<A> RouteTable<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, route: Route<A>) {
        self.routes.push(route);
    }

    pub fn with(mut self, route: Route<A>) -> Self {
        self.add(route);
        self
    }

    /// Appends every route of `other`, keeping order.
    pub fn merge(mut self, other: RouteTable<A>) -> Self {
        self.routes.extend(other.routes);
        self
    }

    pub fn routes(&self) -> &[Route<A>] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn find(&self, method: Method, path: &str) -> Option<&Route<A>> {
        self.routes
            .iter()
            .find(|route| route.method == method && route.path == path)
    }
}

impl<A> IntoIterator for RouteTable<A> {
    type Item = Route<A>;
    type IntoIter = std::vec::IntoIter<Route<A>>;

    fn into_iter(self) -> Self::IntoIter {
        self.routes.into_iter()
    }
}

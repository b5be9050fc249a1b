// ============================================================================
// crudkit
// ============================================================================
//
// Transactional CRUD, upsert and replace over a pluggable query engine, plus
// the request-parameter pipeline that exposes them as HTTP routes.
//
// Layers, bottom up:
// - `schema` / `query`: typed fields, filters, sorts and request descriptors
// - `engine`: the `QueryEngine` seam and an in-memory reference engine
// - `dao`: reader / writer / upserter / replacer capabilities
// - `service`: validation chain and lifecycle hooks inside one transaction
// - `controller`: query-string parsing, path/body mapping, route table
// - `web`: axum glue

pub mod controller;
pub mod core;
pub mod dao;
pub mod engine;
pub mod query;
pub mod schema;
pub mod service;
pub mod web;

pub use crate::core::{CrudError, Result};
pub use controller::{
    ApiRequest, ApiResponse, ControllerConfig, EntityBinding, KeyBinding, ReadableController,
    RouteAuth, RouteTable, WritableController,
};
pub use dao::{Dao, DaoBase, DaoCore, Reader, Replacer, Upserter, Writer};
pub use engine::{MemoryEngine, MemoryStore, QueryEngine};
pub use schema::{Field, FieldSet, SchemaNode};
pub use service::{ReadableService, WritableService};

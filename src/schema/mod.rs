//! Schema nodes and field handles.
//!
//! A [`SchemaNode`] describes one entity: its columns, keys, computed fields
//! and many-to-one relations. Dotted paths such as `driver.name` resolve to a
//! [`Field`] carrying its join depth, which the data-access layer uses to cap
//! join fan-out.

pub mod field;
pub mod node;

pub use field::{Field, FieldKind, FieldSet};
pub use node::{AggregateDef, ColumnDef, DeriveFn, DerivedDef, RelationDef, SchemaNode, SchemaNodeBuilder};

use super::field::{Field, FieldKind, FieldSet};
use crate::core::{CrudError, Result, Row};
use serde_json::Value as JsonValue;
use std::fmt;
use std::sync::Arc;

pub type DeriveFn = Arc<dyn Fn(&Row) -> JsonValue + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDef {
    pub name: String,
    /// Filled from a store-side sequence when an insert omits it
    pub generated: bool,
    pub default: Option<JsonValue>,
}

#[derive(Clone)]
pub struct DerivedDef {
    pub name: String,
    pub compute: DeriveFn,
}

impl fmt::Debug for DerivedDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedDef").field("name", &self.name).finish()
    }
}

/// Count of rows in `table` whose `foreign_key` equals this row's `local_key`.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateDef {
    pub name: String,
    pub table: String,
    pub foreign_key: String,
    pub local_key: String,
}

/// Many-to-one join: `local` column of this node references `foreign` on `target`.
#[derive(Debug, Clone)]
pub struct RelationDef {
    pub name: String,
    pub target: Arc<SchemaNode>,
    pub local: String,
    pub foreign: String,
}

/// A schema node: one entity's table, its keys, and the fields reachable from it.
#[derive(Debug)]
pub struct SchemaNode {
    name: String,
    columns: Vec<ColumnDef>,
    primary: Vec<String>,
    uniques: Vec<Vec<String>>,
    derived: Vec<DerivedDef>,
    aggregates: Vec<AggregateDef>,
    relations: Vec<RelationDef>,
}

impl SchemaNode {
    pub fn builder(name: &str) -> SchemaNodeBuilder {
        SchemaNodeBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|column| column.name == name)
    }

    pub fn primary_columns(&self) -> &[String] {
        &self.primary
    }

    pub fn unique_constraints(&self) -> &[Vec<String>] {
        &self.uniques
    }

    pub fn derived_fields(&self) -> &[DerivedDef] {
        &self.derived
    }

    pub fn derived(&self, name: &str) -> Option<&DerivedDef> {
        self.derived.iter().find(|def| def.name == name)
    }

    pub fn aggregates(&self) -> &[AggregateDef] {
        &self.aggregates
    }

    pub fn aggregate(&self, name: &str) -> Option<&AggregateDef> {
        self.aggregates.iter().find(|def| def.name == name)
    }

    pub fn relations(&self) -> &[RelationDef] {
        &self.relations
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|def| def.name == name)
    }

    /// Column field of this node, at depth 0.
    pub fn column_field(&self, name: &str) -> Option<Field> {
        self.column(name)
            .map(|_| Field::new(&self.name, name, Vec::new(), FieldKind::Column, 0))
    }

    pub fn primary_fields(&self) -> FieldSet {
        self.primary
            .iter()
            .filter_map(|name| self.column_field(name))
            .collect()
    }

    /// Resolves a list of column names, failing on the first unknown one.
    pub fn column_fields(&self, names: &[&str]) -> Result<FieldSet> {
        names
            .iter()
            .map(|name| {
                self.column_field(name).ok_or_else(|| {
                    CrudError::internal(format!("Unknown column {name} on {}", self.name))
                })
            })
            .collect()
    }

    /// Resolves a dotted path (e.g. `driver.name`) to a field handle.
    pub fn resolve(&self, path: &str) -> Option<Field> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return None;
        }
        self.resolve_in(&segments, Vec::new(), 0)
    }

    fn resolve_in(&self, segments: &[&str], joins: Vec<String>, depth: usize) -> Option<Field> {
        let rest = segments.join(".");

        if self.column(&rest).is_some() {
            return Some(Field::new(&self.name, &rest, joins, FieldKind::Column, depth));
        }
        if self.derived(&rest).is_some() {
            return Some(Field::new(&self.name, &rest, joins, FieldKind::Derived, depth));
        }
        if self.aggregate(&rest).is_some() {
            return Some(Field::new(&self.name, &rest, joins, FieldKind::Aggregate, depth));
        }

        let (head, tail) = segments.split_first()?;
        let relation = self.relation(head)?;

        if tail.is_empty() {
            return Some(Field::new(
                &self.name,
                &relation.name,
                joins,
                FieldKind::Relation,
                depth + 1,
            ));
        }

        let mut nested_joins = joins.clone();
        nested_joins.push(relation.name.clone());
        let field = relation.target.resolve_in(tail, nested_joins, depth + 1)?;

        if field.is_column() && tail.len() == 1 && field.name() == relation.foreign {
            let local = Field::new(&self.name, &relation.local, joins, FieldKind::Column, depth);
            return Some(field.with_alias(local));
        }

        Some(field)
    }
}

pub struct SchemaNodeBuilder {
    name: String,
    columns: Vec<ColumnDef>,
    primary: Vec<String>,
    uniques: Vec<Vec<String>>,
    derived: Vec<DerivedDef>,
    aggregates: Vec<AggregateDef>,
    relations: Vec<RelationDef>,
}

impl SchemaNodeBuilder {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            columns: Vec::new(),
            primary: Vec::new(),
            uniques: Vec::new(),
            derived: Vec::new(),
            aggregates: Vec::new(),
            relations: Vec::new(),
        }
    }

    fn column_mut(&mut self, name: &str) -> &mut ColumnDef {
        if let Some(index) = self.columns.iter().position(|column| column.name == name) {
            return &mut self.columns[index];
        }
        self.columns.push(ColumnDef {
            name: name.to_string(),
            generated: false,
            default: None,
        });
        let last = self.columns.len() - 1;
        &mut self.columns[last]
    }

    pub fn column(mut self, name: &str) -> Self {
        self.column_mut(name);
        self
    }

    pub fn columns(mut self, names: &[&str]) -> Self {
        for name in names {
            self.column_mut(name);
        }
        self
    }

    /// Column whose value is assigned by the store when omitted on insert.
    pub fn generated(mut self, name: &str) -> Self {
        self.column_mut(name).generated = true;
        self
    }

    pub fn default_value(mut self, name: &str, value: JsonValue) -> Self {
        self.column_mut(name).default = Some(value);
        self
    }

    pub fn primary(mut self, names: &[&str]) -> Self {
        for name in names {
            self.column_mut(name);
        }
        self.primary = names.iter().map(|name| name.to_string()).collect();
        self
    }

    pub fn unique(mut self, names: &[&str]) -> Self {
        for name in names {
            self.column_mut(name);
        }
        self.uniques
            .push(names.iter().map(|name| name.to_string()).collect());
        self
    }

    pub fn derived<F>(mut self, name: &str, compute: F) -> Self
    where
        F: Fn(&Row) -> JsonValue + Send + Sync + 'static,
    {
        self.derived.push(DerivedDef {
            name: name.to_string(),
            compute: Arc::new(compute),
        });
        self
    }

    /// Aggregate counting rows of `table` that reference this node's first
    /// primary column through `foreign_key`.
    pub fn count(mut self, name: &str, table: &str, foreign_key: &str) -> Self {
        self.aggregates.push(AggregateDef {
            name: name.to_string(),
            table: table.to_string(),
            foreign_key: foreign_key.to_string(),
            local_key: String::new(),
        });
        self
    }

    pub fn relation(
        mut self,
        name: &str,
        target: Arc<SchemaNode>,
        local: &str,
        foreign: &str,
    ) -> Self {
        self.column_mut(local);
        self.relations.push(RelationDef {
            name: name.to_string(),
            target,
            local: local.to_string(),
            foreign: foreign.to_string(),
        });
        self
    }

    pub fn build(mut self) -> Result<Arc<SchemaNode>> {
        if self.primary.is_empty() {
            return Err(CrudError::internal(format!(
                "Schema node {} declares no primary columns",
                self.name
            )));
        }

        let primary_key = self.primary[0].clone();
        for aggregate in &mut self.aggregates {
            aggregate.local_key = primary_key.clone();
        }

        for relation in &self.relations {
            if relation.target.column(&relation.foreign).is_none() {
                return Err(CrudError::internal(format!(
                    "Relation {}.{} targets unknown column {}.{}",
                    self.name, relation.name, relation.target.name, relation.foreign
                )));
            }
        }

        Ok(Arc::new(SchemaNode {
            name: self.name,
            columns: self.columns,
            primary: self.primary,
            uniques: self.uniques,
            derived: self.derived,
            aggregates: self.aggregates,
            relations: self.relations,
        }))
    }
}

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Stored column
    Column,
    /// Computed from the row it belongs to
    Derived,
    /// Computed over related rows
    Aggregate,
    /// A join to another schema node; not a scalar
    Relation,
}

/// Handle to a field resolved from a dotted path against a schema node.
///
/// `path` is relative to the root node the path was resolved from, so it is
/// also where the field's value lives inside an item of that root node.
/// `joins` are the relation names traversed before reaching the owning node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    node: String,
    name: String,
    path: Vec<String>,
    joins: Vec<String>,
    kind: FieldKind,
    depth: usize,
    alias: Option<Box<Field>>,
}

impl Field {
    pub(crate) fn new(
        node: &str,
        name: &str,
        joins: Vec<String>,
        kind: FieldKind,
        depth: usize,
    ) -> Self {
        let mut path = joins.clone();
        path.extend(name.split('.').map(str::to_string));
        Self {
            node: node.to_string(),
            name: name.to_string(),
            path,
            joins,
            kind,
            depth,
            alias: None,
        }
    }

    pub(crate) fn with_alias(mut self, alias: Field) -> Self {
        self.alias = Some(Box::new(alias));
        self
    }

    /// Name of the schema node that owns this field.
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Name of the field within its owning node (may itself be dotted).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &[String] {
        &self.path
    }

    pub fn path_string(&self) -> String {
        self.path.join(".")
    }

    pub fn joins(&self) -> &[String] {
        &self.joins
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Number of joins between the root node and this field.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Local field that mirrors this one, when declared through a relation key.
    pub fn alias(&self) -> Option<&Field> {
        self.alias.as_deref()
    }

    pub fn is_column(&self) -> bool {
        self.kind == FieldKind::Column
    }

    pub fn is_sortable(&self) -> bool {
        matches!(
            self.kind,
            FieldKind::Column | FieldKind::Derived | FieldKind::Aggregate
        )
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.name)
    }
}

/// Ordered, deduplicated set of fields. Order is the insertion order and is
/// the order record keys are built in.
#[derive(Debug, Clone, Default)]
pub struct FieldSet {
    fields: Vec<Field>,
}

impl FieldSet {
    pub fn new(fields: impl IntoIterator<Item = Field>) -> Self {
        let mut set = Self::default();
        for field in fields {
            set.insert(field);
        }
        set
    }

    pub fn insert(&mut self, field: Field) -> bool {
        if self.contains(&field) {
            return false;
        }
        self.fields.push(field);
        true
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Field> {
        self.fields.iter()
    }

    pub fn first(&self) -> Option<&Field> {
        self.fields.first()
    }

    pub fn as_slice(&self) -> &[Field] {
        &self.fields
    }

    pub fn to_vec(&self) -> Vec<Field> {
        self.fields.clone()
    }

    pub fn contains(&self, field: &Field) -> bool {
        self.fields.iter().any(|own| own.path == field.path)
    }

    pub fn is_superset(&self, other: &FieldSet) -> bool {
        other.iter().all(|field| self.contains(field))
    }

    pub fn is_disjoint(&self, other: &FieldSet) -> bool {
        !other.iter().any(|field| self.contains(field))
    }

    /// Fields of `self` followed by the fields of `other` not already present.
    pub fn union(&self, other: &FieldSet) -> FieldSet {
        let mut out = self.clone();
        for field in other.iter() {
            out.insert(field.clone());
        }
        out
    }

    pub fn paths(&self) -> Vec<String> {
        self.fields.iter().map(Field::path_string).collect()
    }
}

/// Set equality: same members regardless of order.
impl PartialEq for FieldSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.is_superset(other)
    }
}

impl Eq for FieldSet {}

impl FromIterator<Field> for FieldSet {
    fn from_iter<I: IntoIterator<Item = Field>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl<'a> IntoIterator for &'a FieldSet {
    type Item = &'a Field;
    type IntoIter = std::slice::Iter<'a, Field>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.iter()
    }
}

impl fmt::Display for FieldSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.fields.iter().map(ToString::to_string).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(name: &str) -> Field {
        Field::new("item", name, Vec::new(), FieldKind::Column, 0)
    }

    #[test]
    fn field_set_deduplicates_by_path() {
        let set = FieldSet::new([column("id"), column("name"), column("id")]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.paths(), vec!["id", "name"]);
    }

    #[test]
    fn equality_ignores_order() {
        let a = FieldSet::new([column("a"), column("b")]);
        let b = FieldSet::new([column("b"), column("a")]);
        assert_eq!(a, b);
        assert_ne!(a, FieldSet::new([column("a")]));
    }

    #[test]
    fn disjoint_and_superset() {
        let primary = FieldSet::new([column("id")]);
        let unique = FieldSet::new([column("key")]);
        assert!(primary.is_disjoint(&unique));
        assert!(primary.union(&unique).is_superset(&primary));
    }

    #[test]
    fn joined_field_path_includes_relations() {
        let field = Field::new("driver", "name", vec!["driver".into()], FieldKind::Column, 1);
        assert_eq!(field.path_string(), "driver.name");
        assert_eq!(field.to_string(), "driver.name");
        assert!(field.is_sortable());
    }
}

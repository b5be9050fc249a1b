//! Record keys and reconciliation partitioning.

use crate::core::{KeyValue, Row, get_in_row, set_in_row};
use crate::schema::FieldSet;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Canonical key of an item under a field set: each field's path paired with
/// the value found there, in field-set order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey(Vec<(String, KeyValue)>);

impl RecordKey {
    pub fn build(fields: &FieldSet, item: &Row) -> Self {
        Self(
            fields
                .iter()
                .map(|field| {
                    (
                        field.path_string(),
                        KeyValue::from_json(get_in_row(item, field.path())),
                    )
                })
                .collect(),
        )
    }

    pub fn values(&self) -> impl Iterator<Item = &KeyValue> {
        self.0.iter().map(|(_, value)| value)
    }

    /// True when some key field had no value.
    pub fn is_partial(&self) -> bool {
        self.values().any(KeyValue::is_null)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(path, value)| format!("{path}={value}"))
            .collect();
        write!(f, "{{{}}}", parts.join(", "))
    }
}

/// Items keyed by [`RecordKey`], in first-seen key order.
///
/// Inserting under a key that is already present replaces the item but keeps
/// the key's original position: the last duplicate wins.
#[derive(Debug, Clone, Default)]
pub struct RecordMap {
    entries: Vec<(RecordKey, Row)>,
    index: HashMap<RecordKey, usize>,
}

impl RecordMap {
    pub fn build(fields: &FieldSet, items: impl IntoIterator<Item = Row>) -> Self {
        let mut map = Self::default();
        for item in items {
            map.insert(RecordKey::build(fields, &item), item);
        }
        map
    }

    pub fn insert(&mut self, key: RecordKey, item: Row) {
        match self.index.get(&key) {
            Some(&position) => self.entries[position].1 = item,
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, item));
            }
        }
    }

    pub fn get(&self, key: &RecordKey) -> Option<&Row> {
        self.index.get(key).map(|&position| &self.entries[position].1)
    }

    pub fn contains_key(&self, key: &RecordKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &RecordKey> {
        self.entries.iter().map(|(key, _)| key)
    }

    pub fn into_entries(self) -> Vec<(RecordKey, Row)> {
        self.entries
    }
}

/// Outcome of reconciling new items against existing rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partition {
    /// New items with no existing counterpart
    pub insert: Vec<Row>,
    /// `(new item, matched existing row)` pairs
    pub update: Vec<(Row, Row)>,
    /// Existing rows with no new counterpart
    pub remove: Vec<Row>,
}

/// Splits `new_items` and `existing` into insert/update/remove sets keyed by
/// `fields`. Both sides are keyed with the same field set.
pub fn partition(fields: &FieldSet, new_items: Vec<Row>, existing: Vec<Row>) -> Partition {
    let new_map = RecordMap::build(fields, new_items);
    let old_map = RecordMap::build(fields, existing);

    let mut out = Partition::default();
    let mut matched = HashSet::new();
    for (key, item) in new_map.into_entries() {
        match old_map.get(&key) {
            Some(old) => {
                out.update.push((item, old.clone()));
                matched.insert(key);
            }
            None => out.insert.push(item),
        }
    }

    out.remove = old_map
        .into_entries()
        .into_iter()
        .filter(|(key, _)| !matched.contains(key))
        .map(|(_, row)| row)
        .collect();
    out
}

/// Copies `existing`'s values for `primary` onto `item`, so an update
/// cannot move a record to another identity.
pub fn adopt_identity(primary: &FieldSet, item: &mut Row, existing: &Row) {
    for field in primary {
        if let Some(old) = get_in_row(existing, field.path()) {
            if get_in_row(item, field.path()) != Some(old) {
                set_in_row(item, field.path(), old.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaNode;
    use serde_json::{Value as JsonValue, json};

    fn row(value: JsonValue) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn fields() -> (FieldSet, FieldSet) {
        let node = SchemaNode::builder("setting")
            .generated("id")
            .primary(&["id"])
            .column("value")
            .unique(&["key"])
            .build()
            .unwrap();
        (
            node.column_fields(&["key"]).unwrap(),
            node.primary_fields(),
        )
    }

    #[test]
    fn record_map_is_last_write_wins() {
        let (unique, _) = fields();
        let map = RecordMap::build(
            &unique,
            vec![
                row(json!({"key": "a", "value": 1})),
                row(json!({"key": "b", "value": 2})),
                row(json!({"key": "a", "value": 3})),
            ],
        );
        assert_eq!(map.len(), 2);
        let first = map.keys().next().unwrap().clone();
        assert_eq!(map.get(&first).unwrap()["value"], json!(3));
    }

    #[test]
    fn partition_splits_disjoint_sets() {
        let (unique, _) = fields();
        let result = partition(
            &unique,
            vec![
                row(json!({"key": "a", "value": 1})),
                row(json!({"key": "b", "value": 2})),
            ],
            vec![
                row(json!({"id": 1, "key": "a"})),
                row(json!({"id": 2, "key": "c"})),
            ],
        );

        assert_eq!(result.insert, vec![row(json!({"key": "b", "value": 2}))]);
        assert_eq!(result.update.len(), 1);
        assert_eq!(result.update[0].1["id"], json!(1));
        assert_eq!(result.remove, vec![row(json!({"id": 2, "key": "c"}))]);
    }

    #[test]
    fn adopt_identity_overwrites_submitted_keys() {
        let (_, primary) = fields();
        let mut item = row(json!({"id": 9, "key": "a"}));
        adopt_identity(&primary, &mut item, &row(json!({"id": 1, "key": "a"})));
        assert_eq!(item["id"], json!(1));

        let mut missing = row(json!({"key": "a"}));
        adopt_identity(&primary, &mut missing, &row(json!({"id": 4})));
        assert_eq!(missing["id"], json!(4));
    }

    #[test]
    fn record_key_reports_missing_values() {
        let (unique, _) = fields();
        assert!(RecordKey::build(&unique, &row(json!({"value": 1}))).is_partial());
        assert_eq!(
            RecordKey::build(&unique, &row(json!({"key": "x"}))).to_string(),
            "{key='x'}"
        );
    }
}

use serde_json::{Map as JsonMap, Value as JsonValue};
use std::cmp::Ordering;
use std::fmt;

/// Backing-store (and default model) representation of a record.
pub type Row = JsonMap<String, JsonValue>;

/// Follows `path` into `row`, returning `None` as soon as a segment is missing
/// or a non-object is traversed.
pub fn get_in_row<'a>(row: &'a Row, path: &[String]) -> Option<&'a JsonValue> {
    let (first, rest) = path.split_first()?;
    let mut current = row.get(first)?;
    for key in rest {
        current = current.as_object()?.get(key)?;
    }
    Some(current)
}

/// Like [`get_in_row`] but treats JSON `null` as absent.
pub fn get_present<'a>(row: &'a Row, path: &[String]) -> Option<&'a JsonValue> {
    get_in_row(row, path).filter(|value| !value.is_null())
}

/// Writes `value` at `path`, creating (or replacing non-object) intermediates.
pub fn set_in_row(row: &mut Row, path: &[String], value: JsonValue) {
    let Some((last, parents)) = path.split_last() else {
        return;
    };

    let mut current = row;
    for key in parents {
        let slot = current
            .entry(key.clone())
            .or_insert_with(|| JsonValue::Object(JsonMap::new()));
        if !slot.is_object() {
            *slot = JsonValue::Object(JsonMap::new());
        }
        current = match slot {
            JsonValue::Object(map) => map,
            _ => return,
        };
    }
    current.insert(last.clone(), value);
}

pub fn split_path(path: &str) -> Vec<String> {
    path.split('.').map(|segment| segment.to_string()).collect()
}

/// Orders two scalar JSON values. Returns `None` for incomparable pairs
/// (mixed types, objects, arrays, nulls).
pub fn compare_values(left: &JsonValue, right: &JsonValue) -> Option<Ordering> {
    match (left, right) {
        (JsonValue::Number(a), JsonValue::Number(b)) => {
            if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
                return Some(a.cmp(&b));
            }
            a.as_f64()?.partial_cmp(&b.as_f64()?)
        }
        (JsonValue::String(a), JsonValue::String(b)) => Some(a.cmp(b)),
        (JsonValue::Bool(a), JsonValue::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

/// Equality used by filters and key matching: numbers compare numerically,
/// everything else structurally.
pub fn values_equal(left: &JsonValue, right: &JsonValue) -> bool {
    match (left, right) {
        (JsonValue::Number(_), JsonValue::Number(_)) => {
            compare_values(left, right) == Some(Ordering::Equal)
        }
        _ => left == right,
    }
}

/// Hashable, canonical form of a JSON value, used to build record keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyValue {
    Null,
    Bool(bool),
    Int(i64),
    /// Non-integral floats, keyed by their bit pattern.
    Float(u64),
    Text(String),
    /// Objects/arrays, keyed by their serialized form.
    Composite(String),
}

impl KeyValue {
    pub fn from_json(value: Option<&JsonValue>) -> Self {
        match value {
            None | Some(JsonValue::Null) => Self::Null,
            Some(JsonValue::Bool(b)) => Self::Bool(*b),
            Some(JsonValue::Number(n)) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(f) = n.as_f64() {
                    if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
                        Self::Int(f as i64)
                    } else {
                        Self::Float(f.to_bits())
                    }
                } else {
                    Self::Composite(n.to_string())
                }
            }
            Some(JsonValue::String(s)) => Self::Text(s.clone()),
            Some(other) => Self::Composite(other.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(bits) => write!(f, "{}", f64::from_bits(*bits)),
            Self::Text(s) => write!(f, "'{s}'"),
            Self::Composite(s) => f.write_str(s),
        }
    }
}

/// Renders a JSON literal the way filters print it (`'text'`, `12`, `null`).
pub fn display_literal(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => format!("'{s}'"),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: JsonValue) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn get_follows_nested_paths() {
        let r = row(json!({"driver": {"id": 4}, "name": "x"}));
        assert_eq!(get_in_row(&r, &split_path("driver.id")), Some(&json!(4)));
        assert_eq!(get_in_row(&r, &split_path("name.id")), None);
        assert_eq!(get_in_row(&r, &split_path("missing")), None);
    }

    #[test]
    fn set_creates_intermediate_objects() {
        let mut r = Row::new();
        set_in_row(&mut r, &split_path("driver.id"), json!(7));
        set_in_row(&mut r, &split_path("driver.name"), json!("Ann"));
        assert_eq!(JsonValue::Object(r), json!({"driver": {"id": 7, "name": "Ann"}}));
    }

    #[test]
    fn integral_floats_share_keys_with_ints() {
        assert_eq!(
            KeyValue::from_json(Some(&json!(3.0))),
            KeyValue::from_json(Some(&json!(3)))
        );
        assert_ne!(
            KeyValue::from_json(Some(&json!("3"))),
            KeyValue::from_json(Some(&json!(3)))
        );
    }

    #[test]
    fn compare_mixed_numbers() {
        assert_eq!(compare_values(&json!(1), &json!(1.5)), Some(Ordering::Less));
        assert_eq!(compare_values(&json!("a"), &json!(1)), None);
        assert!(values_equal(&json!(2), &json!(2.0)));
    }
}

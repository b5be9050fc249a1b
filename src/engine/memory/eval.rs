use crate::core::{CrudError, Result, Row, compare_values, get_in_row, get_present, set_in_row, values_equal};
use crate::query::{CompareOp, Filter, SortBy};
use crate::schema::Field;
use lru::LruCache;
use regex::Regex;
use serde_json::Value as JsonValue;
use std::cmp::Ordering;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

lazy_static::lazy_static! {
    static ref LIKE_REGEX_CACHE: Mutex<LruCache<String, Arc<Regex>>> =
        Mutex::new(LruCache::new(NonZeroUsize::new(200).unwrap_or(NonZeroUsize::MIN)));
}

/// Converts a LIKE pattern (`%`, `_`, `\` escapes) into an anchored regex.
fn like_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 2);
    regex.push('^');

    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => regex.push_str(".*"),
            '_' => regex.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => regex.push_str(&regex::escape(&escaped.to_string())),
                None => regex.push_str(r"\\"),
            },
            c => regex.push_str(&regex::escape(&c.to_string())),
        }
    }

    regex.push('$');
    regex
}

/// Patterns made of one literal with at most a leading and a trailing `%`
/// are answered without a regex.
fn fast_path_like(text: &str, pattern: &str, case_sensitive: bool) -> Option<bool> {
    if pattern.contains(['_', '\\']) {
        return None;
    }

    let starts = pattern.starts_with('%');
    let ends = pattern.len() > 1 && pattern.ends_with('%');
    let literal = &pattern[usize::from(starts)..pattern.len() - usize::from(ends)];
    if literal.contains('%') {
        return None;
    }

    let (text, literal) = if case_sensitive {
        (text.to_string(), literal.to_string())
    } else {
        (text.to_lowercase(), literal.to_lowercase())
    };

    Some(match (starts, ends) {
        (false, false) => text == literal,
        (false, true) => text.starts_with(&literal),
        (true, false) => text.ends_with(&literal),
        (true, true) => text.contains(&literal),
    })
}

fn compiled_like(pattern: &str, case_sensitive: bool) -> Result<Arc<Regex>> {
    let cache_key = format!("{}:{pattern}", if case_sensitive { 's' } else { 'i' });

    if let Some(regex) = LIKE_REGEX_CACHE.lock()?.get(&cache_key) {
        return Ok(Arc::clone(regex));
    }

    let compiled = regex::RegexBuilder::new(&like_to_regex(pattern))
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| CrudError::bad_request(format!("Invalid LIKE pattern: {e}")))?;
    let compiled = Arc::new(compiled);

    LIKE_REGEX_CACHE
        .lock()?
        .put(cache_key, Arc::clone(&compiled));
    Ok(compiled)
}

pub fn eval_like(text: &str, pattern: &str, case_sensitive: bool) -> Result<bool> {
    if let Some(result) = fast_path_like(text, pattern, case_sensitive) {
        return Ok(result);
    }
    Ok(compiled_like(pattern, case_sensitive)?.is_match(text))
}

fn field_value<'a>(row: &'a Row, field: &Field) -> Option<&'a JsonValue> {
    get_present(row, field.path())
}

/// Evaluates `filter` against a materialized row. Comparisons involving a
/// missing or null value never match.
pub fn matches(filter: &Filter, row: &Row) -> Result<bool> {
    Ok(match filter {
        Filter::Compare { field, op, value } => match field_value(row, field) {
            None => false,
            Some(actual) => match op {
                CompareOp::Eq => values_equal(actual, value),
                CompareOp::Ne => !values_equal(actual, value),
                CompareOp::Lt => compare_values(actual, value) == Some(Ordering::Less),
                CompareOp::Le => matches!(
                    compare_values(actual, value),
                    Some(Ordering::Less | Ordering::Equal)
                ),
                CompareOp::Gt => compare_values(actual, value) == Some(Ordering::Greater),
                CompareOp::Ge => matches!(
                    compare_values(actual, value),
                    Some(Ordering::Greater | Ordering::Equal)
                ),
            },
        },
        Filter::In { field, values } => match field_value(row, field) {
            None => false,
            Some(actual) => values.iter().any(|value| values_equal(actual, value)),
        },
        Filter::Like {
            field,
            pattern,
            case_sensitive,
        } => match field_value(row, field) {
            Some(JsonValue::String(text)) => eval_like(text, pattern, *case_sensitive)?,
            Some(JsonValue::Number(number)) => {
                eval_like(&number.to_string(), pattern, *case_sensitive)?
            }
            _ => false,
        },
        Filter::IsNull { field, negated } => field_value(row, field).is_none() != *negated,
        Filter::And(filters) => {
            for filter in filters {
                if !matches(filter, row)? {
                    return Ok(false);
                }
            }
            true
        }
        Filter::Or(filters) => {
            for filter in filters {
                if matches(filter, row)? {
                    return Ok(true);
                }
            }
            false
        }
        Filter::Not(inner) => !matches(inner, row)?,
    })
}

/// Compares two rows by each sort key in turn. Nulls sort last when
/// ascending and first when descending.
pub fn compare_rows(left: &Row, right: &Row, sort_by: &[SortBy]) -> Ordering {
    for sort in sort_by {
        let a = field_value(left, &sort.field);
        let b = field_value(right, &sort.field);
        let descending = sort.direction.is_descending();

        let ordering = match (a, b) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) if descending => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (Some(_), None) if descending => Ordering::Greater,
            (Some(_), None) => Ordering::Less,
            (Some(a), Some(b)) => {
                let ordering = compare_values(a, b).unwrap_or(Ordering::Equal);
                if descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            }
        };

        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Keeps only the values at the given fields' paths. Missing values
/// project as null.
pub fn project(row: &Row, fields: &[Field]) -> Row {
    let mut out = Row::new();
    for field in fields {
        let value = get_in_row(row, field.path())
            .cloned()
            .unwrap_or(JsonValue::Null);
        set_in_row(&mut out, field.path(), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::SortDirection;
    use crate::schema::SchemaNode;
    use serde_json::json;

    fn row(value: JsonValue) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn like_fast_paths_and_regex() {
        assert!(eval_like("hello", "hello", true).unwrap());
        assert!(eval_like("Hello", "hel%", false).unwrap());
        assert!(!eval_like("Hello", "hel%", true).unwrap());
        assert!(eval_like("hello world", "%world", true).unwrap());
        assert!(eval_like("hello world", "%lo w%", true).unwrap());
        assert!(eval_like("h.llo", "h._lo", true).unwrap());
        assert!(!eval_like("hello", "h._lo", true).unwrap());
        assert!(eval_like("50%", "50\\%", true).unwrap());
        assert!(eval_like("abc", "%", true).unwrap());
    }

    #[test]
    fn null_values_never_compare() {
        let node = SchemaNode::builder("t")
            .primary(&["id"])
            .column("name")
            .build()
            .unwrap();
        let name = node.resolve("name").unwrap();
        let r = row(json!({"id": 1, "name": null}));

        assert!(!matches(&Filter::eq(&name, json!("x")), &r).unwrap());
        assert!(!matches(&Filter::compare(&name, CompareOp::Ne, json!("x")), &r).unwrap());
        assert!(matches(&Filter::is_null(&name), &r).unwrap());
        assert!(!matches(&Filter::Or(Vec::new()), &r).unwrap());
    }

    #[test]
    fn sorts_with_sql_null_ordering() {
        let node = SchemaNode::builder("t")
            .primary(&["id"])
            .column("rank")
            .build()
            .unwrap();
        let rank = node.resolve("rank").unwrap();
        let mut rows = vec![
            row(json!({"id": 1, "rank": null})),
            row(json!({"id": 2, "rank": 5})),
            row(json!({"id": 3, "rank": 1})),
        ];

        let asc = [SortBy::asc(&rank)];
        rows.sort_by(|a, b| compare_rows(a, b, &asc));
        let ids: Vec<_> = rows.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!(3), json!(2), json!(1)]);

        let desc = [SortBy {
            field: rank,
            direction: SortDirection::Descending,
        }];
        rows.sort_by(|a, b| compare_rows(a, b, &desc));
        let ids: Vec<_> = rows.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!(1), json!(2), json!(3)]);
    }
}

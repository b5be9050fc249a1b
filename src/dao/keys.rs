use crate::core::{CrudError, Result, Row, get_present};
use crate::query::Filter;
use crate::schema::{Field, FieldSet};
use serde_json::Value as JsonValue;

/// Builds a filter selecting exactly the rows identified by `items` under
/// `fields`.
///
/// One key field yields `field IN (..)`; several yield an OR of per-item AND
/// groups. Every item must carry a value for every field.
pub fn primary_key_filter(fields: &FieldSet, items: &[Row]) -> Result<Filter> {
    match fields.as_slice() {
        [] => Err(CrudError::internal(
            "Cannot build a key filter from an empty field set",
        )),
        [field] => {
            let values = items
                .iter()
                .map(|item| required_value(field, item))
                .collect::<Result<Vec<_>>>()?;
            Ok(Filter::in_list(field, values))
        }
        fields => {
            let groups = items
                .iter()
                .map(|item| {
                    fields
                        .iter()
                        .map(|field| Ok(Filter::eq(field, required_value(field, item)?)))
                        .collect::<Result<Vec<_>>>()
                        .map(Filter::And)
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Filter::Or(groups))
        }
    }
}

fn required_value(field: &Field, item: &Row) -> Result<JsonValue> {
    get_present(item, field.path()).cloned().ok_or_else(|| {
        CrudError::integrity(format!(
            "Expected field {field} to be defined on item {}",
            JsonValue::Object(item.clone())
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SchemaNode;
    use serde_json::json;

    fn row(value: JsonValue) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn single_field_uses_in_list() {
        let node = SchemaNode::builder("ride").primary(&["id"]).build().unwrap();
        let filter = primary_key_filter(
            &node.primary_fields(),
            &[row(json!({"id": 1})), row(json!({"id": 2}))],
        )
        .unwrap();
        assert_eq!(filter.to_string(), "ride.id IN (1, 2)");
    }

    #[test]
    fn composite_key_uses_or_of_and_groups() {
        let node = SchemaNode::builder("seat")
            .primary(&["row", "number"])
            .build()
            .unwrap();
        let filter = primary_key_filter(
            &node.primary_fields(),
            &[
                row(json!({"row": "A", "number": 1})),
                row(json!({"row": "B", "number": 2})),
            ],
        )
        .unwrap();
        assert_eq!(
            filter.to_string(),
            "(seat.row = 'A' AND seat.number = 1) OR (seat.row = 'B' AND seat.number = 2)"
        );
    }

    #[test]
    fn missing_value_is_integrity_error() {
        let node = SchemaNode::builder("ride").primary(&["id"]).build().unwrap();
        let err = primary_key_filter(&node.primary_fields(), &[row(json!({"id": null}))])
            .unwrap_err();
        assert!(matches!(err, CrudError::Integrity(_)));
    }
}

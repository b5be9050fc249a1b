use crate::core::{CrudError, Result, Row};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::marker::PhantomData;

/// Converts between a domain model and its stored row. The two directions
/// must be inverses of each other.
pub trait RowMapper<M>: Send + Sync + 'static {
    fn to_row(&self, model: &M) -> Result<Row>;

    fn to_model(&self, row: Row) -> Result<M>;

    fn to_rows(&self, models: &[M]) -> Result<Vec<Row>> {
        models.iter().map(|model| self.to_row(model)).collect()
    }

    fn to_models(&self, rows: Vec<Row>) -> Result<Vec<M>> {
        rows.into_iter().map(|row| self.to_model(row)).collect()
    }
}

/// Maps any serde model through its JSON object form.
pub struct SerdeMapper<M>(PhantomData<fn() -> M>);

impl<M> Default for SerdeMapper<M> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<M> RowMapper<M> for SerdeMapper<M>
where
    M: Serialize + DeserializeOwned + 'static,
{
    fn to_row(&self, model: &M) -> Result<Row> {
        match serde_json::to_value(model)? {
            JsonValue::Object(row) => Ok(row),
            other => Err(CrudError::internal(format!(
                "Model serialized to {other} instead of an object"
            ))),
        }
    }

    fn to_model(&self, row: Row) -> Result<M> {
        Ok(serde_json::from_value(JsonValue::Object(row))?)
    }
}

use super::request::Params;
use crate::core::{CrudError, Result, Row, set_in_row, split_path, values_equal};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Number, Value as JsonValue};

/// Entity-specific glue between transport values and models.
///
/// Path parameters become partial models anchoring find-one, update and
/// remove. The JSON conversions default to the model's serde form.
#[async_trait]
pub trait EntityBinding<M>: Send + Sync
where
    M: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn find_one_params_to_model(&self, params: &Params) -> Result<M>;

    fn update_params_to_model(&self, params: &Params) -> Result<M> {
        self.find_one_params_to_model(params)
    }

    fn remove_params_to_model(&self, params: &Params) -> Result<M> {
        self.update_params_to_model(params)
    }

    /// Whether the identity in an update body equals the one in the path.
    fn check_params_match_body(&self, body: &M, params: &M) -> bool;

    async fn assert_valid_find_params(&self, _params: &Params) -> Result<()> {
        Ok(())
    }

    async fn assert_valid_find_one_params(&self, params: &Params) -> Result<()> {
        self.assert_valid_find_params(params).await
    }

    fn model_to_json(&self, model: &M) -> Result<JsonValue> {
        Ok(serde_json::to_value(model)?)
    }

    fn json_to_model(&self, json: JsonValue) -> Result<M> {
        Ok(serde_json::from_value(json)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyKind {
    Integer,
    Text,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ParamKey {
    param: String,
    path: Vec<String>,
    kind: KeyKind,
}

/// Binding that maps path parameters onto model key fields by name.
///
/// `KeyBinding::integer("id")` turns `/drivers/7` into `{"id": 7}` and
/// deserializes that into the model, so models must tolerate missing
/// non-key fields (`#[serde(default)]`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyBinding {
    keys: Vec<ParamKey>,
}

impl KeyBinding {
    pub fn integer(param: &str) -> Self {
        Self::default().and_integer(param, param)
    }

    pub fn text(param: &str) -> Self {
        Self::default().and_text(param, param)
    }

    /// Adds an integer key read from `param` and written at `path`.
    pub fn and_integer(mut self, param: &str, path: &str) -> Self {
        self.keys.push(ParamKey {
            param: param.to_string(),
            path: split_path(path),
            kind: KeyKind::Integer,
        });
        self
    }

    pub fn and_text(mut self, param: &str, path: &str) -> Self {
        self.keys.push(ParamKey {
            param: param.to_string(),
            path: split_path(path),
            kind: KeyKind::Text,
        });
        self
    }

    fn key_row(&self, params: &Params) -> Result<Row> {
        let mut row = Row::new();
        for key in &self.keys {
            let raw = params.get(&key.param).ok_or_else(|| {
                CrudError::bad_request(format!("Missing path parameter {}", key.param))
            })?;
            let value = match key.kind {
                KeyKind::Text => JsonValue::String(raw.clone()),
                KeyKind::Integer => raw
                    .trim()
                    .parse::<i64>()
                    .map(|number| JsonValue::Number(Number::from(number)))
                    .map_err(|_| {
                        CrudError::bad_request(format!("Invalid path parameter {}", key.param))
                    })?,
            };
            set_in_row(&mut row, &key.path, value);
        }
        Ok(row)
    }
}

impl<M> EntityBinding<M> for KeyBinding
where
    M: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn find_one_params_to_model(&self, params: &Params) -> Result<M> {
        let row = self.key_row(params)?;
        serde_json::from_value(JsonValue::Object(row)).map_err(|err| {
            CrudError::bad_request("Invalid path parameters").with_reason(err.to_string())
        })
    }

    fn check_params_match_body(&self, body: &M, params: &M) -> bool {
        let (Ok(body), Ok(params)) = (serde_json::to_value(body), serde_json::to_value(params))
        else {
            return false;
        };
        self.keys.iter().all(|key| {
            let lookup = |value: &JsonValue| {
                key.path
                    .iter()
                    .try_fold(value, |current, segment| current.get(segment))
                    .cloned()
                    .unwrap_or(JsonValue::Null)
            };
            values_equal(&lookup(&body), &lookup(&params))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct Driver {
        id: Option<i64>,
        name: String,
    }

    fn params(id: &str) -> Params {
        [("id".to_string(), id.to_string())].into_iter().collect()
    }

    #[test]
    fn integer_keys_parse_into_partial_models() {
        let binding = KeyBinding::integer("id");
        let model: Driver = binding.find_one_params_to_model(&params("7")).unwrap();
        assert_eq!(model.id, Some(7));
        assert!(model.name.is_empty());
    }

    #[test]
    fn malformed_or_missing_params_are_bad_requests() {
        let binding = KeyBinding::integer("id");
        let err = EntityBinding::<Driver>::find_one_params_to_model(&binding, &params("seven"))
            .unwrap_err();
        assert_eq!(err.payload().message, "Invalid path parameter id");

        let err = EntityBinding::<Driver>::find_one_params_to_model(&binding, &Params::new())
            .unwrap_err();
        assert_eq!(err.payload().message, "Missing path parameter id");
    }

    #[test]
    fn body_must_carry_the_path_identity() {
        let binding = KeyBinding::integer("id");
        let path = Driver {
            id: Some(1),
            ..Driver::default()
        };
        let same = Driver {
            id: Some(1),
            name: "Ada".into(),
        };
        let other = Driver {
            id: Some(2),
            name: "Ada".into(),
        };
        assert!(binding.check_params_match_body(&same, &path));
        assert!(!binding.check_params_match_body(&other, &path));
    }
}

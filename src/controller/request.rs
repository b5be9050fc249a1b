use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Path parameters of a matched route.
pub type Params = HashMap<String, String>;

/// A query-string value. Repeated keys collect into `Many`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    Single(String),
    Many(Vec<String>),
}

impl QueryValue {
    /// Single values as is, repeated values joined with `separator`.
    pub fn joined(&self, separator: &str) -> String {
        match self {
            Self::Single(value) => value.clone(),
            Self::Many(values) => values.join(separator),
        }
    }

    pub fn as_single(&self) -> Option<&str> {
        match self {
            Self::Single(value) => Some(value),
            Self::Many(_) => None,
        }
    }

    pub fn is_many(&self) -> bool {
        matches!(self, Self::Many(_))
    }

    fn push(&mut self, value: String) {
        match self {
            Self::Single(first) => *self = Self::Many(vec![std::mem::take(first), value]),
            Self::Many(values) => values.push(value),
        }
    }
}

/// Request headers with case-insensitive lookup. Names are stored lower-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers(HashMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name.as_ref(), value);
        }
        headers
    }
}

/// Transport-neutral request handed to controller handlers.
#[derive(Debug, Clone)]
pub struct ApiRequest<A> {
    pub params: Params,
    pub query: HashMap<String, QueryValue>,
    pub headers: Headers,
    pub body: Option<JsonValue>,
    pub auth: Option<A>,
}

impl<A> Default for ApiRequest<A> {
    fn default() -> Self {
        Self {
            params: Params::new(),
            query: HashMap::new(),
            headers: Headers::new(),
            body: None,
            auth: None,
        }
    }
}

impl<A> ApiRequest<A> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    /// Adds a query value. Adding the same key again turns it into a list.
    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        let value = value.into();
        match self.query.get_mut(key) {
            Some(existing) => existing.push(value),
            None => {
                self.query.insert(key.to_string(), QueryValue::Single(value));
            }
        }
        self
    }

    /// Builds the query map from decoded pairs, in order.
    pub fn query_pairs<K, V>(mut self, pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, value) in pairs {
            self = self.query(key.as_ref(), value);
        }
        self
    }

    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: JsonValue) -> Self {
        self.body = Some(body);
        self
    }

    pub fn auth(mut self, auth: Option<A>) -> Self {
        self.auth = auth;
        self
    }

    pub fn query_value(&self, key: &str) -> Option<&QueryValue> {
        self.query.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case() {
        let headers: Headers = [("Content-Type", "application/json")].into_iter().collect();
        assert_eq!(headers.get("content-type"), Some("application/json"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(headers.get("accept"), None);
    }

    #[test]
    fn repeated_query_keys_become_lists() {
        let request = ApiRequest::<()>::new()
            .query("fields", "id")
            .query("fields", "name")
            .query("limit", "10");

        assert_eq!(
            request.query_value("fields"),
            Some(&QueryValue::Many(vec!["id".into(), "name".into()]))
        );
        assert_eq!(request.query_value("fields").unwrap().joined(","), "id,name");
        assert_eq!(request.query_value("limit").unwrap().as_single(), Some("10"));
    }
}

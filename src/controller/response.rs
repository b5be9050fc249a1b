use crate::core::Result;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Handler output: a JSON value plus status, content type and extra headers.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub content_type: String,
    pub headers: Vec<(String, String)>,
    pub value: JsonValue,
}

impl ApiResponse {
    pub fn new(value: JsonValue) -> Self {
        Self {
            status: 200,
            content_type: "application/json".to_string(),
            headers: Vec::new(),
            value,
        }
    }

    /// 200 response carrying the serialized form of `value`.
    pub fn json(value: &impl Serialize) -> Result<Self> {
        Ok(Self::new(serde_json::to_value(value)?))
    }

    pub fn code(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Body of a find response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FindResponse<T> {
    pub data: Vec<T>,
    pub total_count: u64,
}

/// Body of find-one, insert and update responses.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

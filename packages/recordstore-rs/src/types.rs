//! Wire types for the record store API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A record's field map: field name to JSON value.
pub type Fields = serde_json::Map<String, Value>;

/// A single record as returned by the store.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub fields: Fields,
    #[serde(rename = "createdTime", default)]
    pub created_time: Option<String>,
}

impl Record {
    /// Read a string field, treating missing and non-string values as absent.
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Read a boolean field; missing checkboxes read as false.
    pub fn bool_field(&self, name: &str) -> bool {
        self.fields
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Read an integer field.
    pub fn int_field(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(Value::as_i64)
    }

    /// Read the first id of a linked-record field.
    pub fn linked_id(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(Value::as_array)
            .and_then(|ids| ids.first())
            .and_then(Value::as_str)
    }
}

/// Page of records from a list call.
#[derive(Debug, Deserialize)]
pub struct ListResponse {
    pub records: Vec<Record>,
    #[serde(default)]
    pub offset: Option<String>,
}

/// Body for create and single-record update calls.
#[derive(Debug, Serialize)]
pub struct RecordPayload {
    pub fields: Fields,
}

/// One entry of a batch update.
#[derive(Debug, Serialize)]
pub struct RecordUpdate {
    pub id: String,
    pub fields: Fields,
}

/// Body for batch update calls.
#[derive(Debug, Serialize)]
pub struct BatchUpdatePayload {
    pub records: Vec<RecordUpdate>,
}

/// Error envelope returned by the store on non-2xx responses.
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ApiErrorDetail {
    Message { message: String },
    Code(String),
}

impl ApiErrorBody {
    pub fn message(&self) -> String {
        match &self.error {
            Some(ApiErrorDetail::Message { message }) => message.clone(),
            Some(ApiErrorDetail::Code(code)) => code.clone(),
            None => "unknown error".to_string(),
        }
    }
}

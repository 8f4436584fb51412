//! Wire models for the Remote Data Service
//!
//! Shapes mirror the Salesforce REST describe/search/save payloads, trimmed
//! to the attributes the middleware consumes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One entry of a `describeGlobal` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalSObjectDescribe {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub key_prefix: Option<String>,
    pub createable: bool,
    pub updateable: bool,
    pub deletable: bool,
    pub queryable: bool,
}

/// Full `describe` result for one sobject.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeSObjectResult {
    pub name: String,
    pub label: String,
    #[serde(default)]
    pub label_plural: Option<String>,
    #[serde(default)]
    pub key_prefix: Option<String>,
    pub createable: bool,
    pub updateable: bool,
    pub deletable: bool,
    pub queryable: bool,
    #[serde(default)]
    pub searchable: bool,
    #[serde(default)]
    pub fields: Vec<DescribeField>,
    #[serde(default)]
    pub record_type_infos: Vec<Value>,
}

/// One field of a `describe` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescribeField {
    pub name: String,
    pub label: String,
    /// Raw type string from the API ("string", "picklist", "reference", ...)
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default)]
    pub length: Option<i64>,
    #[serde(default)]
    pub precision: Option<i64>,
    #[serde(default)]
    pub scale: Option<i64>,
    pub nillable: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub auto_number: bool,
    #[serde(default)]
    pub calculated: bool,
    #[serde(default)]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub picklist_values: Vec<PicklistEntry>,
    /// Target sobject names for reference fields
    #[serde(default)]
    pub reference_to: Vec<String>,
    #[serde(default)]
    pub relationship_name: Option<String>,
    /// Master-detail references cascade deletes from the parent
    #[serde(default)]
    pub cascade_delete: bool,
    #[serde(default)]
    pub restricted_delete: bool,
}

/// Picklist entry as returned by describe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PicklistEntry {
    pub label: Option<String>,
    pub value: String,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

/// SOQL query response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub total_size: usize,
    pub done: bool,
    #[serde(default)]
    pub records: Vec<Value>,
}

/// SOSL search response.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    #[serde(default)]
    pub search_records: Vec<Value>,
}

/// Error entry of a failed save.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveError {
    pub status_code: Option<String>,
    pub message: String,
    #[serde(default)]
    pub fields: Vec<String>,
}

/// Result of a create/update/delete call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveResult {
    pub success: bool,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub errors: Vec<SaveError>,
}

impl SaveResult {
    pub fn success(id: impl Into<String>) -> Self {
        Self {
            success: true,
            id: Some(id.into()),
            errors: Vec::new(),
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            id: None,
            errors: vec![SaveError {
                status_code: None,
                message: message.into(),
                fields: Vec::new(),
            }],
        }
    }

    /// First error message, or a generic fallback.
    pub fn error_message(&self) -> String {
        self.errors
            .first()
            .map(|e| e.message.clone())
            .unwrap_or_else(|| "unknown remote error".to_string())
    }
}

/// Pull the record id out of a raw search/query record.
pub fn record_id(record: &Value) -> Option<&str> {
    record.get("Id").and_then(|v| v.as_str())
}

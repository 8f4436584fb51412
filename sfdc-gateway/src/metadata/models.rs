//! Typed metadata models
//!
//! Describe payloads are duck-typed JSON; they are validated into these
//! structs once, at the sync boundary, so the validator and resolver never
//! touch stringly-typed rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One remote entity type. Identity is `name`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SObjectMetadata {
    pub name: String,
    pub label: String,
    pub label_plural: Option<String>,
    pub key_prefix: Option<String>,
    pub createable: bool,
    pub updateable: bool,
    pub deletable: bool,
    pub queryable: bool,
    pub searchable: bool,
    pub synced_at: Option<DateTime<Utc>>,
}

/// Field data types as declared by describe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    String,
    TextArea,
    Email,
    Phone,
    Url,
    Int,
    Double,
    Currency,
    Percent,
    Boolean,
    Date,
    DateTime,
    Time,
    Picklist,
    MultiPicklist,
    Reference,
    Id,
    Other(String),
}

impl FieldType {
    /// Map a raw describe type string.
    pub fn from_api_name(raw: &str) -> Self {
        match raw.to_ascii_lowercase().as_str() {
            "string" | "encryptedstring" => Self::String,
            "textarea" => Self::TextArea,
            "email" => Self::Email,
            "phone" => Self::Phone,
            "url" => Self::Url,
            "int" | "integer" | "long" => Self::Int,
            "double" => Self::Double,
            "currency" => Self::Currency,
            "percent" => Self::Percent,
            "boolean" => Self::Boolean,
            "date" => Self::Date,
            "datetime" => Self::DateTime,
            "time" => Self::Time,
            "picklist" | "combobox" => Self::Picklist,
            "multipicklist" => Self::MultiPicklist,
            "reference" => Self::Reference,
            "id" => Self::Id,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn api_name(&self) -> String {
        match self {
            Self::String => "string".into(),
            Self::TextArea => "textarea".into(),
            Self::Email => "email".into(),
            Self::Phone => "phone".into(),
            Self::Url => "url".into(),
            Self::Int => "int".into(),
            Self::Double => "double".into(),
            Self::Currency => "currency".into(),
            Self::Percent => "percent".into(),
            Self::Boolean => "boolean".into(),
            Self::Date => "date".into(),
            Self::DateTime => "datetime".into(),
            Self::Time => "time".into(),
            Self::Picklist => "picklist".into(),
            Self::MultiPicklist => "multipicklist".into(),
            Self::Reference => "reference".into(),
            Self::Id => "id".into(),
            Self::Other(raw) => raw.clone(),
        }
    }

    /// Types whose payload values are plain JSON strings.
    pub fn is_string_like(&self) -> bool {
        matches!(
            self,
            Self::String
                | Self::TextArea
                | Self::Email
                | Self::Phone
                | Self::Url
                | Self::Picklist
                | Self::MultiPicklist
                | Self::Reference
                | Self::Id
                | Self::Date
                | Self::DateTime
                | Self::Time
        )
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Int | Self::Double | Self::Currency | Self::Percent)
    }
}

/// One allowed picklist value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PicklistValue {
    pub label: Option<String>,
    pub value: String,
}

/// One field of an sobject. Unique per (sobject, name).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMetadata {
    pub sobject: String,
    pub name: String,
    pub label: String,
    pub field_type: FieldType,
    pub length: Option<i64>,
    pub precision: Option<i64>,
    pub scale: Option<i64>,
    pub nillable: bool,
    pub unique: bool,
    pub auto_number: bool,
    pub calculated: bool,
    pub default_value: Option<Value>,
    /// Ordered allowed values for picklist/multipicklist fields
    pub picklist_values: Vec<PicklistValue>,
    /// Target sobject names for reference fields
    pub reference_to: Vec<String>,
    pub relationship_name: Option<String>,
}

impl FieldMetadata {
    /// A non-empty declared default makes the field effectively optional.
    pub fn has_default(&self) -> bool {
        match &self.default_value {
            None | Some(Value::Null) => false,
            Some(Value::String(s)) => !s.is_empty(),
            Some(_) => true,
        }
    }
}

/// Kind of a relationship edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationshipKind {
    Lookup,
    MasterDetail,
    ExternalLookup,
}

impl RelationshipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lookup => "lookup",
            Self::MasterDetail => "master_detail",
            Self::ExternalLookup => "external_lookup",
        }
    }

    pub fn from_str(raw: &str) -> Self {
        match raw {
            "master_detail" => Self::MasterDetail,
            "external_lookup" => Self::ExternalLookup,
            _ => Self::Lookup,
        }
    }
}

/// Directed edge from one sobject to another, carried by a reference field.
/// Unique per (from_sobject, field).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipMetadata {
    pub from_sobject: String,
    pub to_sobject: String,
    pub field: String,
    pub relationship_name: Option<String>,
    pub kind: RelationshipKind,
    pub cascade_delete: bool,
    pub restrict_delete: bool,
    pub required: bool,
}

/// Advisory validation rule. The formula is not locally evaluable; only
/// existence and message are surfaced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationRuleMetadata {
    pub sobject: String,
    pub name: String,
    pub active: bool,
    pub error_message: String,
    pub error_display_field: Option<String>,
    pub description: Option<String>,
}

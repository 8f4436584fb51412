//! Record operations and payload values
//!
//! A payload value is either a literal or a tagged reference to another
//! operation's temporary id. The tag removes the ambiguity of sigil-prefixed
//! strings: a literal that happens to look like a reference marker can never
//! be misread as one.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One payload value: a literal JSON value or a reference to a sibling
/// operation's temporary id, resolved by the dependency resolver.
///
/// References serialize as `{"$ref": "<temp id>"}`; everything else is a
/// literal. Untagged deserialization tries the reference shape first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Reference {
        #[serde(rename = "$ref")]
        temp_id: String,
    },
    Literal(Value),
}

impl FieldValue {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    pub fn reference(temp_id: impl Into<String>) -> Self {
        Self::Reference {
            temp_id: temp_id.into(),
        }
    }

    pub fn as_reference(&self) -> Option<&str> {
        match self {
            Self::Reference { temp_id } => Some(temp_id),
            Self::Literal(_) => None,
        }
    }

    /// Literal null or empty string counts as empty for required-field
    /// purposes; a reference never does.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Reference { .. } => false,
            Self::Literal(Value::Null) => true,
            Self::Literal(Value::String(s)) => s.is_empty(),
            Self::Literal(_) => false,
        }
    }
}

/// Kind of CRUD operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Create,
    Update,
    Delete,
}

impl OperationKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// One unit of work in a batch. Constructed by the caller, consumed once by
/// the resolver, never mutated concurrently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordOperation {
    #[serde(rename = "type")]
    pub kind: OperationKind,
    pub sobject: String,
    #[serde(default)]
    pub payload: HashMap<String, FieldValue>,
    /// Caller-assigned placeholder id other operations may reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_id: Option<String>,
    /// Real record id, required for update/delete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
}

impl RecordOperation {
    pub fn create(sobject: impl Into<String>, payload: HashMap<String, FieldValue>) -> Self {
        Self {
            kind: OperationKind::Create,
            sobject: sobject.into(),
            payload,
            temp_id: None,
            record_id: None,
        }
    }

    pub fn update(
        sobject: impl Into<String>,
        record_id: impl Into<String>,
        payload: HashMap<String, FieldValue>,
    ) -> Self {
        Self {
            kind: OperationKind::Update,
            sobject: sobject.into(),
            payload,
            temp_id: None,
            record_id: Some(record_id.into()),
        }
    }

    pub fn delete(sobject: impl Into<String>, record_id: impl Into<String>) -> Self {
        Self {
            kind: OperationKind::Delete,
            sobject: sobject.into(),
            payload: HashMap::new(),
            temp_id: None,
            record_id: Some(record_id.into()),
        }
    }

    pub fn with_temp_id(mut self, temp_id: impl Into<String>) -> Self {
        self.temp_id = Some(temp_id.into());
        self
    }

    /// Does any payload value reference a sibling operation?
    pub fn has_references(&self) -> bool {
        self.payload.values().any(|v| v.as_reference().is_some())
    }

    /// (field, temp id) pairs for every reference in the payload.
    pub fn references(&self) -> Vec<(&str, &str)> {
        self.payload
            .iter()
            .filter_map(|(field, value)| value.as_reference().map(|r| (field.as_str(), r)))
            .collect()
    }

    /// Materialize the payload as a JSON object, substituting real ids for
    /// references and skipping `omit` fields (deferred break-point fields).
    /// Returns the unresolved temp ids if any reference has no mapping yet.
    pub fn resolve_payload(
        &self,
        id_map: &HashMap<String, String>,
        omit: &[String],
    ) -> Result<Value, Vec<String>> {
        let mut object = Map::new();
        let mut unresolved = Vec::new();
        for (field, value) in &self.payload {
            if omit.contains(field) {
                continue;
            }
            match value {
                FieldValue::Literal(v) => {
                    object.insert(field.clone(), v.clone());
                }
                FieldValue::Reference { temp_id } => match id_map.get(temp_id) {
                    Some(real_id) => {
                        object.insert(field.clone(), Value::String(real_id.clone()));
                    }
                    None => unresolved.push(temp_id.clone()),
                },
            }
        }
        if unresolved.is_empty() {
            Ok(Value::Object(object))
        } else {
            Err(unresolved)
        }
    }
}

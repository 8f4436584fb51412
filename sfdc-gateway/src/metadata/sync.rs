//! Metadata sync service
//!
//! Fetches describe results from the remote service and flattens them into
//! store rows. Relationship edges are derived from reference fields while the
//! describe payload is in hand, so the resolver never needs a live describe.

use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use log::{debug, info, warn};
use sqlx::SqlitePool;

use crate::api::{DescribeField, DescribeSObjectResult, RemoteDataService};

use super::models::{
    FieldMetadata, FieldType, PicklistValue, RelationshipKind, RelationshipMetadata,
    SObjectMetadata, ValidationRuleMetadata,
};
use super::store;

/// Outcome of one `sync_objects` call. No partial rollback: rows upserted
/// before a failure stay upserted.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub objects_synced: usize,
    pub fields_synced: usize,
    pub relationships_synced: usize,
    pub errors: Vec<String>,
}

impl SyncReport {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Fetches and persists metadata for requested sobjects.
pub struct MetadataSyncService {
    service: Arc<dyn RemoteDataService>,
    pool: SqlitePool,
}

impl MetadataSyncService {
    pub fn new(service: Arc<dyn RemoteDataService>, pool: SqlitePool) -> Self {
        Self { service, pool }
    }

    /// Describe and upsert each named sobject. Per-entity failures are
    /// recorded in the report; the caller decides whether they are fatal.
    pub async fn sync_objects(&self, names: &[String]) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        for name in names {
            match self.sync_one(name).await {
                Ok((fields, relationships)) => {
                    report.objects_synced += 1;
                    report.fields_synced += fields;
                    report.relationships_synced += relationships;
                    debug!("synced {name}: {fields} fields, {relationships} relationships");
                }
                Err(e) => {
                    warn!("metadata sync failed for {name}: {e:#}");
                    report.errors.push(format!("{name}: {e:#}"));
                }
            }
        }

        info!(
            "metadata sync: {} objects, {} fields, {} relationships, {} errors",
            report.objects_synced,
            report.fields_synced,
            report.relationships_synced,
            report.errors.len()
        );
        Ok(report)
    }

    async fn sync_one(&self, name: &str) -> Result<(usize, usize)> {
        let describe = self.service.describe(name).await?;

        store::upsert_sobject(&self.pool, &sobject_from_describe(&describe)).await?;

        let mut fields_synced = 0;
        let mut relationships_synced = 0;
        for raw in &describe.fields {
            let field = field_from_describe(&describe.name, raw);
            store::upsert_field(&self.pool, &field).await?;
            fields_synced += 1;

            if let Some(rel) = relationship_from_describe(&describe.name, raw) {
                store::upsert_relationship(&self.pool, &rel).await?;
                relationships_synced += 1;
            }
        }

        self.sync_validation_rules(name).await?;

        Ok((fields_synced, relationships_synced))
    }

    /// Validation rules come from the tooling query surface. Orgs that do not
    /// expose it just end up with zero advisory rules.
    async fn sync_validation_rules(&self, sobject: &str) -> Result<()> {
        let soql = format!(
            "SELECT ValidationName, Active, ErrorMessage, ErrorDisplayField, Description \
             FROM ValidationRule WHERE EntityDefinition.QualifiedApiName = '{sobject}'"
        );
        let result = match self.service.query(&soql).await {
            Ok(result) => result,
            Err(e) => {
                debug!("validation rule query unavailable for {sobject}: {e:#}");
                return Ok(());
            }
        };

        for record in &result.records {
            let rule = ValidationRuleMetadata {
                sobject: sobject.to_string(),
                name: record
                    .get("ValidationName")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                active: record.get("Active").and_then(|v| v.as_bool()).unwrap_or(false),
                error_message: record
                    .get("ErrorMessage")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                error_display_field: record
                    .get("ErrorDisplayField")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
                description: record
                    .get("Description")
                    .and_then(|v| v.as_str())
                    .map(str::to_string),
            };
            if rule.name.is_empty() {
                continue;
            }
            store::upsert_validation_rule(&self.pool, &rule).await?;
        }
        Ok(())
    }
}

fn sobject_from_describe(describe: &DescribeSObjectResult) -> SObjectMetadata {
    SObjectMetadata {
        name: describe.name.clone(),
        label: describe.label.clone(),
        label_plural: describe.label_plural.clone(),
        key_prefix: describe.key_prefix.clone(),
        createable: describe.createable,
        updateable: describe.updateable,
        deletable: describe.deletable,
        queryable: describe.queryable,
        searchable: describe.searchable,
        synced_at: Some(Utc::now()),
    }
}

fn field_from_describe(sobject: &str, raw: &DescribeField) -> FieldMetadata {
    FieldMetadata {
        sobject: sobject.to_string(),
        name: raw.name.clone(),
        label: raw.label.clone(),
        field_type: FieldType::from_api_name(&raw.field_type),
        length: raw.length,
        precision: raw.precision,
        scale: raw.scale,
        nillable: raw.nillable,
        unique: raw.unique,
        auto_number: raw.auto_number,
        calculated: raw.calculated,
        default_value: raw.default_value.clone(),
        picklist_values: raw
            .picklist_values
            .iter()
            .filter(|p| p.active)
            .map(|p| PicklistValue {
                label: p.label.clone(),
                value: p.value.clone(),
            })
            .collect(),
        reference_to: raw.reference_to.clone(),
        relationship_name: raw.relationship_name.clone(),
    }
}

/// Reference fields yield one outbound edge per field, targeting the first
/// declared reference target (polymorphic extras are kept on the field row).
fn relationship_from_describe(sobject: &str, raw: &DescribeField) -> Option<RelationshipMetadata> {
    if FieldType::from_api_name(&raw.field_type) != FieldType::Reference {
        return None;
    }
    let target = raw.reference_to.first()?;
    let kind = if raw.cascade_delete {
        RelationshipKind::MasterDetail
    } else {
        RelationshipKind::Lookup
    };
    Some(RelationshipMetadata {
        from_sobject: sobject.to_string(),
        to_sobject: target.clone(),
        field: raw.name.clone(),
        relationship_name: raw.relationship_name.clone(),
        kind,
        cascade_delete: raw.cascade_delete,
        restrict_delete: raw.restricted_delete,
        required: !raw.nillable,
    })
}

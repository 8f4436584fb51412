//! Metadata store repository
//!
//! Keyed reads and upsert-by-natural-key writes over the SQLite pool. The
//! staleness predicate lives here and nowhere else; the cache manager and any
//! instrumentation must go through it so the two can never diverge.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};

use super::models::{
    FieldMetadata, FieldType, PicklistValue, RelationshipKind, RelationshipMetadata,
    SObjectMetadata, ValidationRuleMetadata,
};

/// Fields the platform manages itself; never required from a caller payload.
pub const SYSTEM_MANAGED_FIELDS: &[&str] = &[
    "Id",
    "CreatedDate",
    "CreatedById",
    "LastModifiedDate",
    "LastModifiedById",
    "SystemModstamp",
    "LastActivityDate",
    "LastViewedDate",
    "LastReferencedDate",
];

/// Booleans the platform defaults on insert.
pub const AUTO_DEFAULTED_BOOLEANS: &[&str] = &["IsDeleted", "IsArchived", "IsClosed"];

fn sobject_from_row(row: &SqliteRow) -> Result<SObjectMetadata> {
    let synced_at: Option<String> = row.try_get("synced_at")?;
    let synced_at = synced_at
        .as_deref()
        .map(|s| DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc)))
        .transpose()
        .context("Invalid synced_at timestamp in sobjects row")?;
    Ok(SObjectMetadata {
        name: row.try_get("name")?,
        label: row.try_get("label")?,
        label_plural: row.try_get("label_plural")?,
        key_prefix: row.try_get("key_prefix")?,
        createable: row.try_get("createable")?,
        updateable: row.try_get("updateable")?,
        deletable: row.try_get("deletable")?,
        queryable: row.try_get("queryable")?,
        searchable: row.try_get("searchable")?,
        synced_at,
    })
}

fn field_from_row(row: &SqliteRow) -> Result<FieldMetadata> {
    let field_type: String = row.try_get("field_type")?;
    let default_value: Option<String> = row.try_get("default_value")?;
    let default_value = default_value
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .context("Invalid default_value JSON in fields row")?;
    let picklist_values: String = row.try_get("picklist_values")?;
    let picklist_values: Vec<PicklistValue> = serde_json::from_str(&picklist_values)
        .context("Invalid picklist_values JSON in fields row")?;
    let reference_to: String = row.try_get("reference_to")?;
    let reference_to: Vec<String> =
        serde_json::from_str(&reference_to).context("Invalid reference_to JSON in fields row")?;
    Ok(FieldMetadata {
        sobject: row.try_get("sobject")?,
        name: row.try_get("name")?,
        label: row.try_get("label")?,
        field_type: FieldType::from_api_name(&field_type),
        length: row.try_get("length")?,
        precision: row.try_get("precision")?,
        scale: row.try_get("scale")?,
        nillable: row.try_get("nillable")?,
        unique: row.try_get("is_unique")?,
        auto_number: row.try_get("auto_number")?,
        calculated: row.try_get("calculated")?,
        default_value,
        picklist_values,
        reference_to,
        relationship_name: row.try_get("relationship_name")?,
    })
}

/// Get one sobject row by name.
pub async fn get_sobject(pool: &SqlitePool, name: &str) -> Result<Option<SObjectMetadata>> {
    let row = sqlx::query("SELECT * FROM sobjects WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("Failed to get sobject metadata")?;
    row.as_ref().map(sobject_from_row).transpose()
}

/// Get all fields of an sobject, ordered by name.
pub async fn get_fields(pool: &SqlitePool, sobject: &str) -> Result<Vec<FieldMetadata>> {
    let rows = sqlx::query("SELECT * FROM fields WHERE sobject = ? ORDER BY name")
        .bind(sobject)
        .fetch_all(pool)
        .await
        .context("Failed to get field metadata")?;
    rows.iter().map(field_from_row).collect()
}

/// Point lookup of one field.
pub async fn get_field(
    pool: &SqlitePool,
    sobject: &str,
    name: &str,
) -> Result<Option<FieldMetadata>> {
    let row = sqlx::query("SELECT * FROM fields WHERE sobject = ? AND name = ?")
        .bind(sobject)
        .bind(name)
        .fetch_optional(pool)
        .await
        .context("Failed to get field metadata")?;
    row.as_ref().map(field_from_row).transpose()
}

/// Fields a create payload must supply: not-nillable, minus system-managed
/// fields, auto-defaulted booleans, OwnerId, auto-number/calculated fields,
/// and anything carrying a non-empty declared default.
pub async fn get_required_fields(pool: &SqlitePool, sobject: &str) -> Result<Vec<FieldMetadata>> {
    let fields = get_fields(pool, sobject).await?;
    Ok(fields
        .into_iter()
        .filter(|f| !f.nillable)
        .filter(|f| !SYSTEM_MANAGED_FIELDS.contains(&f.name.as_str()))
        .filter(|f| !AUTO_DEFAULTED_BOOLEANS.contains(&f.name.as_str()))
        .filter(|f| f.name != "OwnerId")
        .filter(|f| !f.auto_number && !f.calculated)
        .filter(|f| !f.has_default())
        .collect())
}

/// Active validation rules for an sobject.
pub async fn get_validation_rules(
    pool: &SqlitePool,
    sobject: &str,
) -> Result<Vec<ValidationRuleMetadata>> {
    let rows = sqlx::query(
        "SELECT * FROM validation_rules WHERE sobject = ? AND active = 1 ORDER BY name",
    )
    .bind(sobject)
    .fetch_all(pool)
    .await
    .context("Failed to get validation rules")?;
    rows.iter()
        .map(|row| {
            Ok(ValidationRuleMetadata {
                sobject: row.try_get("sobject")?,
                name: row.try_get("name")?,
                active: row.try_get("active")?,
                error_message: row.try_get("error_message")?,
                error_display_field: row.try_get("error_display_field")?,
                description: row.try_get("description")?,
            })
        })
        .collect()
}

/// Outbound relationship edges of an sobject.
pub async fn get_relationships(
    pool: &SqlitePool,
    sobject: &str,
) -> Result<Vec<RelationshipMetadata>> {
    let rows = sqlx::query("SELECT * FROM relationships WHERE from_sobject = ? ORDER BY field")
        .bind(sobject)
        .fetch_all(pool)
        .await
        .context("Failed to get relationships")?;
    rows.iter()
        .map(|row| {
            let kind: String = row.try_get("kind")?;
            Ok(RelationshipMetadata {
                from_sobject: row.try_get("from_sobject")?,
                field: row.try_get("field")?,
                to_sobject: row.try_get("to_sobject")?,
                relationship_name: row.try_get("relationship_name")?,
                kind: RelationshipKind::from_str(&kind),
                cascade_delete: row.try_get("cascade_delete")?,
                restrict_delete: row.try_get("restrict_delete")?,
                required: row.try_get("required")?,
            })
        })
        .collect()
}

/// Insert or overwrite one sobject row.
pub async fn upsert_sobject(pool: &SqlitePool, sobject: &SObjectMetadata) -> Result<()> {
    sqlx::query(
        "INSERT INTO sobjects (name, label, label_plural, key_prefix, createable, updateable,
                               deletable, queryable, searchable, synced_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(name) DO UPDATE SET
             label = excluded.label,
             label_plural = excluded.label_plural,
             key_prefix = excluded.key_prefix,
             createable = excluded.createable,
             updateable = excluded.updateable,
             deletable = excluded.deletable,
             queryable = excluded.queryable,
             searchable = excluded.searchable,
             synced_at = excluded.synced_at",
    )
    .bind(&sobject.name)
    .bind(&sobject.label)
    .bind(&sobject.label_plural)
    .bind(&sobject.key_prefix)
    .bind(sobject.createable)
    .bind(sobject.updateable)
    .bind(sobject.deletable)
    .bind(sobject.queryable)
    .bind(sobject.searchable)
    .bind(sobject.synced_at.map(|dt| dt.to_rfc3339()))
    .execute(pool)
    .await
    .context("Failed to upsert sobject metadata")?;
    Ok(())
}

/// Insert or overwrite one field row.
pub async fn upsert_field(pool: &SqlitePool, field: &FieldMetadata) -> Result<()> {
    let default_value = field
        .default_value
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .context("Failed to serialize field default value")?;
    sqlx::query(
        "INSERT INTO fields (sobject, name, label, field_type, length, precision, scale,
                             nillable, is_unique, auto_number, calculated, default_value,
                             picklist_values, reference_to, relationship_name)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(sobject, name) DO UPDATE SET
             label = excluded.label,
             field_type = excluded.field_type,
             length = excluded.length,
             precision = excluded.precision,
             scale = excluded.scale,
             nillable = excluded.nillable,
             is_unique = excluded.is_unique,
             auto_number = excluded.auto_number,
             calculated = excluded.calculated,
             default_value = excluded.default_value,
             picklist_values = excluded.picklist_values,
             reference_to = excluded.reference_to,
             relationship_name = excluded.relationship_name",
    )
    .bind(&field.sobject)
    .bind(&field.name)
    .bind(&field.label)
    .bind(field.field_type.api_name())
    .bind(field.length)
    .bind(field.precision)
    .bind(field.scale)
    .bind(field.nillable)
    .bind(field.unique)
    .bind(field.auto_number)
    .bind(field.calculated)
    .bind(default_value)
    .bind(serde_json::to_string(&field.picklist_values)?)
    .bind(serde_json::to_string(&field.reference_to)?)
    .bind(&field.relationship_name)
    .execute(pool)
    .await
    .context("Failed to upsert field metadata")?;
    Ok(())
}

/// Insert or overwrite one relationship edge.
pub async fn upsert_relationship(pool: &SqlitePool, rel: &RelationshipMetadata) -> Result<()> {
    sqlx::query(
        "INSERT INTO relationships (from_sobject, field, to_sobject, relationship_name, kind,
                                    cascade_delete, restrict_delete, required)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(from_sobject, field) DO UPDATE SET
             to_sobject = excluded.to_sobject,
             relationship_name = excluded.relationship_name,
             kind = excluded.kind,
             cascade_delete = excluded.cascade_delete,
             restrict_delete = excluded.restrict_delete,
             required = excluded.required",
    )
    .bind(&rel.from_sobject)
    .bind(&rel.field)
    .bind(&rel.to_sobject)
    .bind(&rel.relationship_name)
    .bind(rel.kind.as_str())
    .bind(rel.cascade_delete)
    .bind(rel.restrict_delete)
    .bind(rel.required)
    .execute(pool)
    .await
    .context("Failed to upsert relationship metadata")?;
    Ok(())
}

/// Insert or overwrite one validation rule.
pub async fn upsert_validation_rule(
    pool: &SqlitePool,
    rule: &ValidationRuleMetadata,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO validation_rules (sobject, name, active, error_message,
                                       error_display_field, description)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(sobject, name) DO UPDATE SET
             active = excluded.active,
             error_message = excluded.error_message,
             error_display_field = excluded.error_display_field,
             description = excluded.description",
    )
    .bind(&rule.sobject)
    .bind(&rule.name)
    .bind(rule.active)
    .bind(&rule.error_message)
    .bind(&rule.error_display_field)
    .bind(&rule.description)
    .execute(pool)
    .await
    .context("Failed to upsert validation rule")?;
    Ok(())
}

/// Staleness rule: absent, never synced, or synced longer than `ttl` ago.
pub async fn is_metadata_stale(pool: &SqlitePool, name: &str, ttl: Duration) -> Result<bool> {
    match get_sobject(pool, name).await? {
        None => Ok(true),
        Some(sobject) => match sobject.synced_at {
            None => Ok(true),
            Some(synced_at) => Ok(Utc::now() - synced_at > ttl),
        },
    }
}

/// Age of an sobject's cached metadata, if any sync has happened.
pub async fn get_metadata_age(pool: &SqlitePool, name: &str) -> Result<Option<Duration>> {
    Ok(get_sobject(pool, name)
        .await?
        .and_then(|s| s.synced_at)
        .map(|synced_at| Utc::now() - synced_at))
}

/// Wipe every cached row.
pub async fn clear_metadata(pool: &SqlitePool) -> Result<()> {
    for table in ["fields", "relationships", "validation_rules", "sobjects"] {
        sqlx::query(&format!("DELETE FROM {table}"))
            .execute(pool)
            .await
            .context("Failed to clear metadata")?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_fixtures {
    use super::*;
    use crate::metadata::migrations::run_migrations;
    use serde_json::json;

    pub async fn memory_pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    pub fn account_sobject() -> SObjectMetadata {
        SObjectMetadata {
            name: "Account".into(),
            label: "Account".into(),
            label_plural: Some("Accounts".into()),
            key_prefix: Some("001".into()),
            createable: true,
            updateable: true,
            deletable: true,
            queryable: true,
            searchable: true,
            synced_at: Some(Utc::now()),
        }
    }

    pub fn field(sobject: &str, name: &str, field_type: FieldType, nillable: bool) -> FieldMetadata {
        FieldMetadata {
            sobject: sobject.into(),
            name: name.into(),
            label: name.into(),
            field_type,
            length: None,
            precision: None,
            scale: None,
            nillable,
            unique: false,
            auto_number: false,
            calculated: false,
            default_value: None,
            picklist_values: vec![],
            reference_to: vec![],
            relationship_name: None,
        }
    }

    /// Seed a minimal Account schema: required Name, Industry picklist,
    /// NumberOfEmployees int, AnnualRevenue currency, audit fields.
    pub async fn seed_account(pool: &SqlitePool) {
        upsert_sobject(pool, &account_sobject()).await.unwrap();

        let mut name = field("Account", "Name", FieldType::String, false);
        name.length = Some(255);
        upsert_field(pool, &name).await.unwrap();

        let mut industry = field("Account", "Industry", FieldType::Picklist, true);
        industry.picklist_values = ["Technology", "Finance", "Healthcare", "Energy"]
            .iter()
            .map(|v| PicklistValue {
                label: Some(v.to_string()),
                value: v.to_string(),
            })
            .collect();
        upsert_field(pool, &industry).await.unwrap();

        upsert_field(pool, &field("Account", "NumberOfEmployees", FieldType::Int, true))
            .await
            .unwrap();

        let mut revenue = field("Account", "AnnualRevenue", FieldType::Currency, true);
        revenue.precision = Some(18);
        revenue.scale = Some(2);
        upsert_field(pool, &revenue).await.unwrap();

        let mut id = field("Account", "Id", FieldType::Id, false);
        id.default_value = None;
        upsert_field(pool, &id).await.unwrap();
        upsert_field(pool, &field("Account", "CreatedDate", FieldType::DateTime, false))
            .await
            .unwrap();
        upsert_field(pool, &field("Account", "OwnerId", FieldType::Reference, false))
            .await
            .unwrap();
        upsert_field(pool, &field("Account", "IsDeleted", FieldType::Boolean, false))
            .await
            .unwrap();

        let mut status = field("Account", "Status__c", FieldType::Picklist, false);
        status.default_value = Some(json!("New"));
        upsert_field(pool, &status).await.unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::test_fixtures::*;
    use super::*;

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let pool = memory_pool().await;
        let sobject = account_sobject();
        upsert_sobject(&pool, &sobject).await.unwrap();
        upsert_sobject(&pool, &sobject).await.unwrap();
        let stored = get_sobject(&pool, "Account").await.unwrap().unwrap();
        assert_eq!(stored.key_prefix.as_deref(), Some("001"));
        assert!(stored.createable);
    }

    #[tokio::test]
    async fn test_required_fields_exclusions() {
        let pool = memory_pool().await;
        seed_account(&pool).await;
        let required = get_required_fields(&pool, "Account").await.unwrap();
        let names: Vec<&str> = required.iter().map(|f| f.name.as_str()).collect();
        // Only Name survives: Id/CreatedDate/OwnerId/IsDeleted are system
        // exclusions and Status__c carries a default.
        assert_eq!(names, vec!["Name"]);
    }

    #[tokio::test]
    async fn test_staleness_rule() {
        let pool = memory_pool().await;
        // Absent entity is stale.
        assert!(is_metadata_stale(&pool, "Account", Duration::hours(24)).await.unwrap());

        let mut sobject = account_sobject();
        sobject.synced_at = Some(Utc::now() - Duration::milliseconds(1) - Duration::hours(24));
        upsert_sobject(&pool, &sobject).await.unwrap();
        assert!(is_metadata_stale(&pool, "Account", Duration::hours(24)).await.unwrap());

        sobject.synced_at = Some(Utc::now() + Duration::milliseconds(1) - Duration::hours(24));
        upsert_sobject(&pool, &sobject).await.unwrap();
        assert!(!is_metadata_stale(&pool, "Account", Duration::hours(24)).await.unwrap());

        // Never-synced entity is stale even when present.
        sobject.synced_at = None;
        upsert_sobject(&pool, &sobject).await.unwrap();
        assert!(is_metadata_stale(&pool, "Account", Duration::hours(24)).await.unwrap());
    }

    #[tokio::test]
    async fn test_picklist_round_trip() {
        let pool = memory_pool().await;
        seed_account(&pool).await;
        let industry = get_field(&pool, "Account", "Industry").await.unwrap().unwrap();
        assert_eq!(industry.field_type, FieldType::Picklist);
        assert_eq!(industry.picklist_values.len(), 4);
        assert_eq!(industry.picklist_values[0].value, "Technology");
    }

    #[tokio::test]
    async fn test_clear_metadata() {
        let pool = memory_pool().await;
        seed_account(&pool).await;
        clear_metadata(&pool).await.unwrap();
        assert!(get_sobject(&pool, "Account").await.unwrap().is_none());
        assert!(get_fields(&pool, "Account").await.unwrap().is_empty());
    }
}

//! Locally cached sobject metadata
//!
//! Describe results are flattened into typed rows (sobjects, fields,
//! relationships, validation rules) and persisted in SQLite. The cache
//! manager decides what is missing or stale; the sync service fetches and
//! upserts; the store is the only component that touches SQL.

pub mod cache;
pub mod migrations;
pub mod models;
pub mod store;
pub mod sync;

pub use cache::MetadataCacheManager;
pub use models::{
    FieldMetadata, FieldType, PicklistValue, RelationshipKind, RelationshipMetadata,
    SObjectMetadata, ValidationRuleMetadata,
};
pub use sync::{MetadataSyncService, SyncReport};

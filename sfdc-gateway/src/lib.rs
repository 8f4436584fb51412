//! Middleware layer for Salesforce CRUD operations.
//!
//! Sits between a caller and the Salesforce APIs and does three things before
//! any network write: validates payloads against locally cached metadata,
//! searches for probable duplicates with a multi-algorithm fuzzy matcher, and
//! for multi-record batches computes a dependency-safe execution order with
//! temporary-id resolution.
//!
//! The wire client, authentication and the transport exposing these commands
//! to external callers are collaborators behind the [`api::RemoteDataService`]
//! trait; the metadata cache persists in SQLite via sqlx.

pub mod api;
pub mod matching;
pub mod metadata;
pub mod orchestrator;
pub mod resolver;
pub mod validation;

pub use api::{RemoteDataService, SaveResult};
pub use metadata::cache::MetadataCacheManager;
pub use orchestrator::{ExecuteRequest, Orchestrator, OrchestratorConfig};
pub use resolver::{FieldValue, OperationKind, RecordOperation};
pub use validation::PreflightValidator;

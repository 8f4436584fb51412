//! Dependency resolver for multi-record batches
//!
//! Builds a reference graph over a batch of operations wired together by
//! temporary ids, breaks cycles on nullable relationship edges, levels the
//! graph into ordered execution batches and runs them against the remote
//! service while substituting real ids for temporary references.

pub mod execute;
pub mod graph;
pub mod operation;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use sqlx::SqlitePool;

use crate::api::RemoteDataService;
use crate::metadata::models::RelationshipMetadata;
use crate::metadata::store;

pub use execute::{BatchExecution, OperationOutcome};
pub use graph::{AnalysisError, DependencyGraph, ExecutionBatch, ExecutionPlan};
pub use operation::{FieldValue, OperationKind, RecordOperation};

/// Loads relationship metadata, builds the graph and executes the plan.
/// One resolver call owns its graph and id map exclusively; nothing is
/// shared across batches.
pub struct DependencyResolver {
    pool: SqlitePool,
}

impl DependencyResolver {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Relationship edges for every distinct sobject in the batch, keyed by
    /// (sobject, field).
    pub async fn load_relationships(
        &self,
        operations: &[RecordOperation],
    ) -> Result<HashMap<(String, String), RelationshipMetadata>> {
        let mut sobjects: Vec<&str> = operations.iter().map(|op| op.sobject.as_str()).collect();
        sobjects.sort();
        sobjects.dedup();

        let mut map = HashMap::new();
        for sobject in sobjects {
            for rel in store::get_relationships(&self.pool, sobject).await? {
                map.insert((rel.from_sobject.clone(), rel.field.clone()), rel);
            }
        }
        Ok(map)
    }

    /// Build the graph and plan without executing, for dry-run inspection.
    pub async fn plan(
        &self,
        operations: Vec<RecordOperation>,
    ) -> Result<DependencyGraph, AnalysisError> {
        let relationships = self
            .load_relationships(&operations)
            .await
            .map_err(AnalysisError::metadata)?;
        DependencyGraph::build(operations, &relationships)
    }

    /// Full pipeline: analyze, plan, execute.
    pub async fn resolve_and_execute(
        &self,
        service: Arc<dyn RemoteDataService>,
        operations: Vec<RecordOperation>,
    ) -> Result<BatchExecution, AnalysisError> {
        let mut graph = self.plan(operations).await?;
        let plan = graph.execution_plan();
        Ok(execute::execute_plan(service.as_ref(), &mut graph, &plan).await)
    }
}

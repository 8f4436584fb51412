//! Execution of a dependency plan
//!
//! Batches run strictly in level order. A batch with more than one node has
//! no internal edges, so its operations dispatch concurrently and settle
//! individually; a sequential batch aborts its remaining operations on the
//! first failure. Real ids flow into the id map as creates succeed, and
//! break-point nodes get their deferred fields patched at the end.

use std::collections::HashMap;

use futures::future::join_all;
use log::{debug, info, warn};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::api::RemoteDataService;

use super::graph::{DependencyGraph, ExecutionPlan, GraphNode};
use super::operation::{FieldValue, OperationKind};

/// Result of one operation within a batch execution.
#[derive(Debug, Clone)]
pub struct OperationOutcome {
    pub index: usize,
    pub sobject: String,
    pub kind: OperationKind,
    pub temp_id: Option<String>,
    pub success: bool,
    pub record_id: Option<String>,
    pub error: Option<String>,
}

impl OperationOutcome {
    fn failure(node: &GraphNode, index: usize, error: String) -> Self {
        Self {
            index,
            sobject: node.operation.sobject.clone(),
            kind: node.operation.kind,
            temp_id: node.operation.temp_id.clone(),
            success: false,
            record_id: None,
            error: Some(error),
        }
    }
}

/// Full result of executing one batch of operations. Partial failure is a
/// normal outcome, not an error: callers inspect per-operation results.
#[derive(Debug, Clone)]
pub struct BatchExecution {
    pub outcomes: Vec<OperationOutcome>,
    /// temp id -> real id, accumulated across batches
    pub id_map: HashMap<String, String>,
    pub plan: ExecutionPlan,
    /// Analysis-phase warnings carried over from the graph
    pub warnings: Vec<String>,
}

impl BatchExecution {
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.success)
    }

    pub fn successful_operations(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    pub fn failed_operations(&self) -> usize {
        self.outcomes.len() - self.successful_operations()
    }

    /// (temp id, real id) pairs for every created record that carried one.
    pub fn created_records(&self) -> Vec<(String, String)> {
        self.outcomes
            .iter()
            .filter(|o| o.success && o.kind == OperationKind::Create)
            .filter_map(|o| {
                o.temp_id
                    .as_ref()
                    .zip(o.record_id.as_ref())
                    .map(|(t, r)| (t.clone(), r.clone()))
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter_map(|o| {
                o.error
                    .as_ref()
                    .map(|e| format!("{} {}: {e}", o.kind.label(), o.sobject))
            })
            .collect()
    }
}

async fn execute_node(
    service: &dyn RemoteDataService,
    node: &GraphNode,
    index: usize,
    id_map: &HashMap<String, String>,
) -> OperationOutcome {
    let op = &node.operation;
    let payload = match op.resolve_payload(id_map, &node.deferred_fields) {
        Ok(payload) => payload,
        Err(unresolved) => {
            return OperationOutcome::failure(
                node,
                index,
                format!("unresolved temporary reference(s): {}", unresolved.join(", ")),
            );
        }
    };

    let result = match op.kind {
        OperationKind::Create => service.create(&op.sobject, &payload).await,
        OperationKind::Update => match &op.record_id {
            Some(id) => service.update(&op.sobject, id, &payload).await,
            None => {
                return OperationOutcome::failure(node, index, "missing record id".to_string());
            }
        },
        OperationKind::Delete => match &op.record_id {
            Some(id) => service.delete(&op.sobject, id).await,
            None => {
                return OperationOutcome::failure(node, index, "missing record id".to_string());
            }
        },
    };

    match result {
        Ok(save) if save.success => OperationOutcome {
            index,
            sobject: op.sobject.clone(),
            kind: op.kind,
            temp_id: op.temp_id.clone(),
            success: true,
            record_id: save.id.or_else(|| op.record_id.clone()),
            error: None,
        },
        Ok(save) => OperationOutcome::failure(node, index, save.error_message()),
        Err(e) => OperationOutcome::failure(node, index, format!("{e:#}")),
    }
}

/// Run the plan to completion. Every operation gets exactly one outcome;
/// failures are isolated under parallel dispatch and abort the remainder of
/// a sequential batch.
pub async fn execute_plan(
    service: &dyn RemoteDataService,
    graph: &mut DependencyGraph,
    plan: &ExecutionPlan,
) -> BatchExecution {
    // Correlation id for tracing one batch through interleaved logs
    let run_id = Uuid::new_v4();
    info!("[{run_id}] executing plan: {}", plan.describe(graph));

    let mut id_map: HashMap<String, String> = HashMap::new();
    let mut outcomes: Vec<Option<OperationOutcome>> = vec![None; graph.nodes.len()];

    for batch in &plan.batches {
        if batch.can_parallelize {
            let futures = batch
                .nodes
                .iter()
                .map(|&i| execute_node(service, &graph.nodes[i], i, &id_map));
            for outcome in join_all(futures).await {
                let index = outcome.index;
                outcomes[index] = Some(outcome);
            }
        } else {
            let mut aborted = false;
            for &i in &batch.nodes {
                if aborted {
                    outcomes[i] = Some(OperationOutcome::failure(
                        &graph.nodes[i],
                        i,
                        "aborted: earlier operation in sequential batch failed".to_string(),
                    ));
                    continue;
                }
                let outcome = execute_node(service, &graph.nodes[i], i, &id_map).await;
                if !outcome.success {
                    aborted = true;
                }
                outcomes[i] = Some(outcome);
            }
        }

        for &i in &batch.nodes {
            let Some(outcome) = &outcomes[i] else { continue };
            if !outcome.success {
                continue;
            }
            graph.nodes[i].executed = true;
            if let (Some(temp_id), Some(record_id)) = (&outcome.temp_id, &outcome.record_id) {
                id_map.insert(temp_id.clone(), record_id.clone());
            }
        }
        debug!(
            "[{run_id}] level {} complete, id map has {} entries",
            batch.level,
            id_map.len()
        );
    }

    // Break-point follow-ups: patch the deferred reference fields now that
    // the cyclic counterpart's id exists. Needs the node's own created id.
    for i in 0..graph.nodes.len() {
        if graph.nodes[i].deferred_fields.is_empty() || !graph.nodes[i].executed {
            continue;
        }
        let own_id = outcomes[i].as_ref().and_then(|o| o.record_id.clone());
        let Some(own_id) = own_id else { continue };

        let mut patch = Map::new();
        let mut unresolved = Vec::new();
        for field in &graph.nodes[i].deferred_fields {
            match graph.nodes[i].operation.payload.get(field) {
                Some(FieldValue::Reference { temp_id }) => match id_map.get(temp_id) {
                    Some(real_id) => {
                        patch.insert(field.clone(), Value::String(real_id.clone()));
                    }
                    None => unresolved.push(temp_id.clone()),
                },
                Some(FieldValue::Literal(v)) => {
                    patch.insert(field.clone(), v.clone());
                }
                None => {}
            }
        }

        let error = if !unresolved.is_empty() {
            Some(format!(
                "deferred update skipped, unresolved reference(s): {}",
                unresolved.join(", ")
            ))
        } else {
            let sobject = graph.nodes[i].operation.sobject.clone();
            match service.update(&sobject, &own_id, &Value::Object(patch)).await {
                Ok(save) if save.success => None,
                Ok(save) => Some(format!("deferred update failed: {}", save.error_message())),
                Err(e) => Some(format!("deferred update failed: {e:#}")),
            }
        };
        if let Some(error) = error {
            warn!("{} {error}", graph.nodes[i].operation.sobject);
            if let Some(outcome) = outcomes[i].as_mut() {
                outcome.success = false;
                outcome.error = Some(error);
            }
        }
    }

    let outcomes: Vec<OperationOutcome> = outcomes
        .into_iter()
        .enumerate()
        .map(|(i, outcome)| {
            outcome.unwrap_or_else(|| {
                OperationOutcome::failure(&graph.nodes[i], i, "not scheduled".to_string())
            })
        })
        .collect();

    BatchExecution {
        outcomes,
        id_map,
        plan: plan.clone(),
        warnings: graph.warnings.clone(),
    }
}

//! Dependency graph construction, cycle breaking and leveling

use std::collections::HashMap;

use log::{debug, warn};

use crate::metadata::models::RelationshipMetadata;

use super::operation::{OperationKind, RecordOperation};

/// Errors found before anything is sent to the remote service.
#[derive(Debug, Clone)]
pub enum AnalysisError {
    /// Metadata store read failed while loading relationship edges
    Metadata(String),
    /// Two operations in the batch claim the same temporary id
    DuplicateTempId(String),
    /// Update/delete operation without a record id
    MissingRecordId { index: usize, sobject: String },
    /// A reference cycle with no nullable edge cannot be ordered
    CircularDependency { nodes: Vec<String> },
}

impl AnalysisError {
    pub fn metadata(e: anyhow::Error) -> Self {
        Self::Metadata(format!("{e:#}"))
    }
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Metadata(msg) => write!(f, "metadata lookup failed: {msg}"),
            Self::DuplicateTempId(id) => write!(f, "duplicate temporary id: {id}"),
            Self::MissingRecordId { index, sobject } => {
                write!(f, "operation {index} ({sobject}) requires a record id")
            }
            Self::CircularDependency { nodes } => write!(
                f,
                "circular dependency with no nullable edge involving: {}",
                nodes.join(" -> ")
            ),
        }
    }
}

impl std::error::Error for AnalysisError {}

/// One dependency edge: this node's `field` references `node`'s temp id.
#[derive(Debug, Clone)]
pub struct Dependency {
    pub node: usize,
    pub field: String,
}

/// One operation wrapped with its graph bookkeeping.
#[derive(Debug, Clone)]
pub struct GraphNode {
    pub operation: RecordOperation,
    pub depends_on: Vec<Dependency>,
    pub dependents: Vec<usize>,
    pub level: usize,
    pub executed: bool,
    /// Reference fields omitted at create time and applied by a follow-up
    /// update once the referenced id exists (cycle break points)
    pub deferred_fields: Vec<String>,
}

impl GraphNode {
    pub fn is_break_point(&self) -> bool {
        !self.deferred_fields.is_empty()
    }

    fn label(&self) -> String {
        match &self.operation.temp_id {
            Some(temp_id) => format!("{} ({temp_id})", self.operation.sobject),
            None => self.operation.sobject.clone(),
        }
    }
}

/// One level of the execution plan. Operations inside a batch have no edges
/// between each other.
#[derive(Debug, Clone)]
pub struct ExecutionBatch {
    pub level: usize,
    pub nodes: Vec<usize>,
    pub can_parallelize: bool,
}

/// Ordered batches; strictly ascending level order at execution time.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlan {
    pub batches: Vec<ExecutionBatch>,
}

impl ExecutionPlan {
    pub fn total_operations(&self) -> usize {
        self.batches.iter().map(|b| b.nodes.len()).sum()
    }

    /// Human-readable plan summary for logs.
    pub fn describe(&self, graph: &DependencyGraph) -> String {
        self.batches
            .iter()
            .map(|batch| {
                let labels: Vec<String> = batch
                    .nodes
                    .iter()
                    .map(|&i| {
                        let node = &graph.nodes[i];
                        format!("{} {}", node.operation.kind.label(), node.label())
                    })
                    .collect();
                let parallel = if batch.can_parallelize { ", parallel" } else { "" };
                format!("level {}: [{}{}]", batch.level, labels.join(", "), parallel)
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Reference graph over one batch of operations. Owned exclusively by one
/// resolver call; discarded after execution.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    pub nodes: Vec<GraphNode>,
    /// Informational findings from analysis (e.g. empty required
    /// relationship fields); never fatal
    pub warnings: Vec<String>,
}

impl DependencyGraph {
    /// Build the graph: one node per operation, an edge wherever a payload
    /// references a sibling's temp id, cycles broken on nullable
    /// relationship edges.
    pub fn build(
        operations: Vec<RecordOperation>,
        relationships: &HashMap<(String, String), RelationshipMetadata>,
    ) -> Result<Self, AnalysisError> {
        // Owned keys: the index outlives `operations`, which is consumed
        // into the node list below.
        let mut temp_index: HashMap<String, usize> = HashMap::new();
        for (i, op) in operations.iter().enumerate() {
            if let Some(temp_id) = &op.temp_id {
                if temp_index.insert(temp_id.clone(), i).is_some() {
                    return Err(AnalysisError::DuplicateTempId(temp_id.clone()));
                }
            }
        }

        for (i, op) in operations.iter().enumerate() {
            if matches!(op.kind, OperationKind::Update | OperationKind::Delete)
                && op.record_id.is_none()
            {
                return Err(AnalysisError::MissingRecordId {
                    index: i,
                    sobject: op.sobject.clone(),
                });
            }
        }

        let mut warnings = Vec::new();
        for op in &operations {
            for ((_, field), rel) in relationships
                .iter()
                .filter(|((sobject, _), _)| *sobject == op.sobject)
            {
                if !rel.required || op.kind != OperationKind::Create {
                    continue;
                }
                let empty = op.payload.get(field).is_none_or(|v| v.is_empty());
                if empty {
                    let msg = format!(
                        "required relationship field {field} on {} is empty",
                        op.sobject
                    );
                    warn!("{msg}");
                    warnings.push(msg);
                }
            }
        }

        let mut nodes: Vec<GraphNode> = operations
            .into_iter()
            .map(|operation| GraphNode {
                operation,
                depends_on: Vec::new(),
                dependents: Vec::new(),
                level: 0,
                executed: false,
                deferred_fields: Vec::new(),
            })
            .collect();

        let mut edges: Vec<(usize, Dependency)> = Vec::new();
        for (i, node) in nodes.iter().enumerate() {
            for (field, temp_id) in node.operation.references() {
                if let Some(&target) = temp_index.get(temp_id) {
                    edges.push((
                        i,
                        Dependency {
                            node: target,
                            field: field.to_string(),
                        },
                    ));
                }
            }
        }
        for (i, dep) in edges {
            nodes[dep.node].dependents.push(i);
            nodes[i].depends_on.push(dep);
        }

        let mut graph = Self { nodes, warnings };
        graph.break_cycles(relationships)?;
        graph.compute_levels();
        Ok(graph)
    }

    /// Depth-first search with a recursion stack; every back edge yields the
    /// node sequence of its cycle.
    fn detect_cycles(&self) -> Vec<Vec<usize>> {
        #[derive(Clone, Copy, PartialEq)]
        enum State {
            Unvisited,
            OnStack,
            Done,
        }

        fn visit(
            graph: &DependencyGraph,
            node: usize,
            state: &mut Vec<State>,
            stack: &mut Vec<usize>,
            cycles: &mut Vec<Vec<usize>>,
        ) {
            state[node] = State::OnStack;
            stack.push(node);
            for dep in &graph.nodes[node].depends_on {
                match state[dep.node] {
                    State::Unvisited => visit(graph, dep.node, state, stack, cycles),
                    State::OnStack => {
                        let start = stack.iter().position(|&n| n == dep.node).unwrap_or(0);
                        cycles.push(stack[start..].to_vec());
                    }
                    State::Done => {}
                }
            }
            stack.pop();
            state[node] = State::Done;
        }

        let mut state = vec![State::Unvisited; self.nodes.len()];
        let mut cycles = Vec::new();
        for node in 0..self.nodes.len() {
            if state[node] == State::Unvisited {
                let mut stack = Vec::new();
                visit(self, node, &mut state, &mut stack, &mut cycles);
            }
        }
        cycles
    }

    /// Break every cycle by deferring the first nullable relationship edge:
    /// the referencing record is created without the field and patched by a
    /// follow-up update. A cycle made entirely of required edges is fatal.
    fn break_cycles(
        &mut self,
        relationships: &HashMap<(String, String), RelationshipMetadata>,
    ) -> Result<(), AnalysisError> {
        // One broken edge can dissolve several overlapping cycles, so detect
        // again after each break. Every round removes exactly one edge or
        // returns, so the loop terminates even on dense mutual references.
        loop {
            let cycles = self.detect_cycles();
            let Some(cycle) = cycles.first() else {
                return Ok(());
            };

            let mut broken = false;
            'edges: for (pos, &source) in cycle.iter().enumerate() {
                // Edge from cycle[pos] to the next cycle node it depends on.
                let target = if pos + 1 < cycle.len() { cycle[pos + 1] } else { cycle[0] };
                let Some(dep_idx) = self.nodes[source]
                    .depends_on
                    .iter()
                    .position(|d| d.node == target)
                else {
                    continue;
                };
                let field = self.nodes[source].depends_on[dep_idx].field.clone();
                let required = relationships
                    .get(&(self.nodes[source].operation.sobject.clone(), field.clone()))
                    .map(|rel| rel.required)
                    .unwrap_or(false);
                if required {
                    continue 'edges;
                }

                debug!(
                    "breaking cycle at {} via nullable field {field}",
                    self.nodes[source].label()
                );
                self.nodes[source].depends_on.remove(dep_idx);
                // Drop one matching dependent entry, not all: two operations
                // may share several reference fields, one edge each.
                if let Some(pos) = self.nodes[target]
                    .dependents
                    .iter()
                    .position(|&d| d == source)
                {
                    self.nodes[target].dependents.remove(pos);
                }
                self.nodes[source].deferred_fields.push(field);
                broken = true;
                break;
            }

            if !broken {
                return Err(AnalysisError::CircularDependency {
                    nodes: cycle.iter().map(|&i| self.nodes[i].label()).collect(),
                });
            }
        }
    }

    /// Iterative relaxation: a node's level must exceed every remaining
    /// dependency's level. Broken (deferred) edges are already removed, so
    /// they impose no ordering constraint.
    fn compute_levels(&mut self) {
        loop {
            let mut changed = false;
            for i in 0..self.nodes.len() {
                for d in 0..self.nodes[i].depends_on.len() {
                    let dep_level = self.nodes[self.nodes[i].depends_on[d].node].level;
                    if self.nodes[i].level <= dep_level {
                        self.nodes[i].level = dep_level + 1;
                        changed = true;
                    }
                }
            }
            if !changed {
                break;
            }
        }
    }

    /// Group nodes by level into ordered batches.
    pub fn execution_plan(&self) -> ExecutionPlan {
        let mut by_level: HashMap<usize, Vec<usize>> = HashMap::new();
        for (i, node) in self.nodes.iter().enumerate() {
            by_level.entry(node.level).or_default().push(i);
        }
        let mut levels: Vec<usize> = by_level.keys().copied().collect();
        levels.sort_unstable();
        ExecutionPlan {
            batches: levels
                .into_iter()
                .map(|level| {
                    let nodes = by_level.remove(&level).unwrap_or_default();
                    ExecutionBatch {
                        level,
                        can_parallelize: nodes.len() > 1,
                        nodes,
                    }
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::models::RelationshipKind;
    use crate::resolver::operation::FieldValue;

    fn relationship(from: &str, field: &str, to: &str, required: bool) -> RelationshipMetadata {
        RelationshipMetadata {
            from_sobject: from.to_string(),
            to_sobject: to.to_string(),
            field: field.to_string(),
            relationship_name: None,
            kind: RelationshipKind::Lookup,
            cascade_delete: false,
            restrict_delete: false,
            required,
        }
    }

    fn rel_map(rels: Vec<RelationshipMetadata>) -> HashMap<(String, String), RelationshipMetadata> {
        rels.into_iter()
            .map(|r| ((r.from_sobject.clone(), r.field.clone()), r))
            .collect()
    }

    fn create_op(sobject: &str, temp_id: &str, fields: &[(&str, FieldValue)]) -> RecordOperation {
        let payload = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        RecordOperation::create(sobject, payload).with_temp_id(temp_id)
    }

    #[test]
    fn test_linear_chain_two_batches() {
        let ops = vec![
            create_op("Account", "a1", &[("Name", FieldValue::literal("Acme"))]),
            create_op(
                "Contact",
                "c1",
                &[
                    ("LastName", FieldValue::literal("Doe")),
                    ("AccountId", FieldValue::reference("a1")),
                ],
            ),
        ];
        let graph = DependencyGraph::build(ops, &rel_map(vec![])).unwrap();
        let plan = graph.execution_plan();

        assert_eq!(plan.batches.len(), 2);
        assert_eq!(plan.batches[0].nodes, vec![0]);
        assert_eq!(plan.batches[1].nodes, vec![1]);
        assert!(!plan.batches[0].can_parallelize);
    }

    #[test]
    fn test_fan_out_parallel_second_batch() {
        let mut ops = vec![create_op(
            "Account",
            "parent",
            &[("Name", FieldValue::literal("Acme"))],
        )];
        for i in 0..3 {
            ops.push(create_op(
                "Contact",
                &format!("c{i}"),
                &[
                    ("LastName", FieldValue::literal(format!("Doe {i}"))),
                    ("AccountId", FieldValue::reference("parent")),
                ],
            ));
        }
        let graph = DependencyGraph::build(ops, &rel_map(vec![])).unwrap();
        let plan = graph.execution_plan();

        assert_eq!(plan.batches.len(), 2);
        assert_eq!(plan.batches[1].nodes.len(), 3);
        assert!(plan.batches[1].can_parallelize);
    }

    #[test]
    fn test_independent_operations_single_parallel_batch() {
        let ops = vec![
            create_op("Account", "a1", &[("Name", FieldValue::literal("One"))]),
            create_op("Account", "a2", &[("Name", FieldValue::literal("Two"))]),
            create_op("Account", "a3", &[("Name", FieldValue::literal("Three"))]),
        ];
        let graph = DependencyGraph::build(ops, &rel_map(vec![])).unwrap();
        let plan = graph.execution_plan();

        assert_eq!(plan.batches.len(), 1);
        assert!(plan.batches[0].can_parallelize);
        assert_eq!(plan.total_operations(), 3);
    }

    #[test]
    fn test_cycle_broken_on_nullable_edge() {
        // Account references Contact (nullable custom lookup), Contact
        // references Account (required master-detail).
        let ops = vec![
            create_op(
                "Account",
                "a1",
                &[
                    ("Name", FieldValue::literal("Acme")),
                    ("Primary_Contact__c", FieldValue::reference("c1")),
                ],
            ),
            create_op(
                "Contact",
                "c1",
                &[
                    ("LastName", FieldValue::literal("Doe")),
                    ("AccountId", FieldValue::reference("a1")),
                ],
            ),
        ];
        let rels = rel_map(vec![
            relationship("Account", "Primary_Contact__c", "Contact", false),
            relationship("Contact", "AccountId", "Account", true),
        ]);
        let graph = DependencyGraph::build(ops, &rels).unwrap();

        // Account becomes the break point: created without the contact
        // reference, patched later.
        assert!(graph.nodes[0].is_break_point());
        assert_eq!(graph.nodes[0].deferred_fields, vec!["Primary_Contact__c"]);

        let plan = graph.execution_plan();
        assert_eq!(plan.batches.len(), 2);
        assert_eq!(plan.batches[0].nodes, vec![0]);
        assert_eq!(plan.batches[1].nodes, vec![1]);
    }

    #[test]
    fn test_dense_mutual_cycle_terminates() {
        // Two operations tied together by six nullable edges: five lookups
        // one way, one back. Every one of them must be deferred before the
        // graph becomes acyclic.
        let a_fields: Vec<(String, FieldValue)> = (0..5)
            .map(|i| (format!("Contact_{i}__c"), FieldValue::reference("b")))
            .collect();
        let mut a_payload: std::collections::HashMap<String, FieldValue> =
            a_fields.iter().cloned().collect();
        a_payload.insert("Name".to_string(), FieldValue::literal("Acme"));
        let ops = vec![
            RecordOperation::create("Account", a_payload).with_temp_id("a"),
            create_op(
                "Contact",
                "b",
                &[
                    ("LastName", FieldValue::literal("Doe")),
                    ("Account__c", FieldValue::reference("a")),
                ],
            ),
        ];
        let mut rels: Vec<RelationshipMetadata> = (0..5)
            .map(|i| relationship("Account", &format!("Contact_{i}__c"), "Contact", false))
            .collect();
        rels.push(relationship("Contact", "Account__c", "Account", false));

        let graph = DependencyGraph::build(ops, &rel_map(rels)).unwrap();

        // All five Account edges were deferred, one at a time, and the
        // dependent lists stayed consistent with the remaining edges.
        assert_eq!(graph.nodes[0].deferred_fields.len(), 5);
        assert!(graph.nodes[0].depends_on.is_empty());
        assert!(graph.nodes[1].dependents.is_empty());
        assert_eq!(graph.nodes[1].depends_on.len(), 1);
        assert_eq!(graph.nodes[0].dependents, vec![1]);
        assert_eq!(graph.execution_plan().batches.len(), 2);
    }

    #[test]
    fn test_unbreakable_cycle_is_fatal() {
        let ops = vec![
            create_op("Alpha__c", "x", &[("Beta__c", FieldValue::reference("y"))]),
            create_op("Beta__c", "y", &[("Alpha__c", FieldValue::reference("x"))]),
        ];
        let rels = rel_map(vec![
            relationship("Alpha__c", "Beta__c", "Beta__c", true),
            relationship("Beta__c", "Alpha__c", "Alpha__c", true),
        ]);
        let err = DependencyGraph::build(ops, &rels).unwrap_err();
        assert!(matches!(err, AnalysisError::CircularDependency { .. }));
    }

    #[test]
    fn test_duplicate_temp_id_rejected() {
        let ops = vec![
            create_op("Account", "dup", &[("Name", FieldValue::literal("One"))]),
            create_op("Account", "dup", &[("Name", FieldValue::literal("Two"))]),
        ];
        let err = DependencyGraph::build(ops, &rel_map(vec![])).unwrap_err();
        assert!(matches!(err, AnalysisError::DuplicateTempId(_)));
    }

    #[test]
    fn test_missing_record_id_rejected() {
        let mut op = RecordOperation::delete("Account", "001X");
        op.record_id = None;
        let err = DependencyGraph::build(vec![op], &rel_map(vec![])).unwrap_err();
        assert!(matches!(err, AnalysisError::MissingRecordId { .. }));
    }

    #[test]
    fn test_empty_required_relationship_warns_without_edge() {
        let ops = vec![create_op(
            "Contact",
            "c1",
            &[("LastName", FieldValue::literal("Doe"))],
        )];
        let rels = rel_map(vec![relationship("Contact", "AccountId", "Account", true)]);
        let graph = DependencyGraph::build(ops, &rels).unwrap();

        assert_eq!(graph.warnings.len(), 1);
        assert!(graph.warnings[0].contains("AccountId"));
        // Informational only: still a trivial one-batch plan.
        assert_eq!(graph.execution_plan().batches.len(), 1);
    }
}

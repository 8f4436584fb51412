//! Execution orchestration
//!
//! Front door of the crate. Routes an incoming request to the single-operation
//! path (metadata, duplicate advisory, preflight, dispatch) or the
//! multi-operation path (metadata with relationship expansion, dependency
//! resolution, planned execution) based purely on the request's shape and
//! content, never on a caller-declared flag.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::api::RemoteDataService;
use crate::matching::duplicate::{ConfidenceThresholds, DuplicateMatcher, DuplicateSearchConfig};
use crate::matching::similarity::SimilarityWeights;
use crate::metadata::cache::MetadataCacheManager;
use crate::metadata::sync::MetadataSyncService;
use crate::resolver::{DependencyResolver, ExecutionPlan, OperationKind, RecordOperation};
use crate::validation::{IssueKind, PreflightValidator, ValidationIssue};

/// Tunables for the orchestration layer.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Run the duplicate matcher before single-path creates
    pub check_duplicates: bool,
    /// Field the duplicate matcher scores, unless overridden per sobject
    pub duplicate_field: String,
    /// Per-sobject overrides for the duplicate field
    pub duplicate_fields: HashMap<String, String>,
    pub thresholds: ConfidenceThresholds,
    pub weights: SimilarityWeights,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            check_duplicates: true,
            duplicate_field: "Name".to_string(),
            duplicate_fields: HashMap::new(),
            thresholds: ConfidenceThresholds::default(),
            weights: SimilarityWeights::default(),
        }
    }
}

impl OrchestratorConfig {
    fn duplicate_field_for(&self, sobject: &str) -> &str {
        self.duplicate_fields
            .get(sobject)
            .map(String::as_str)
            .unwrap_or(&self.duplicate_field)
    }
}

/// Incoming request: one operation object or an array of them. The shape
/// alone decides which variant deserializes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExecuteRequest {
    Single(RecordOperation),
    Batch(Vec<RecordOperation>),
}

/// Result of the single-operation path. Warnings keep their issue taxonomy
/// so callers can filter duplicate suspects from preflight advisories.
#[derive(Debug, Clone)]
pub struct SingleOutcome {
    pub success: bool,
    pub record_id: Option<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<ValidationIssue>,
    pub duration: Duration,
}

/// Result of the multi-operation path. Partial failure is normal; `success`
/// means every operation succeeded.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub success: bool,
    pub total_operations: usize,
    pub successful_operations: usize,
    pub failed_operations: usize,
    /// (temp id, real id) pairs for created records that carried a temp id
    pub created_records: Vec<(String, String)>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub execution_plan: ExecutionPlan,
}

/// What `execute` produced, matching the path the request was routed to.
#[derive(Debug, Clone)]
pub enum ExecutionReport {
    Single(SingleOutcome),
    Batch(BatchSummary),
}

impl ExecutionReport {
    pub fn success(&self) -> bool {
        match self {
            Self::Single(outcome) => outcome.success,
            Self::Batch(summary) => summary.success,
        }
    }
}

pub struct Orchestrator {
    service: Arc<dyn RemoteDataService>,
    pool: SqlitePool,
    cache: MetadataCacheManager,
    config: OrchestratorConfig,
}

impl Orchestrator {
    pub fn new(
        service: Arc<dyn RemoteDataService>,
        pool: SqlitePool,
        config: OrchestratorConfig,
    ) -> Self {
        let sync = MetadataSyncService::new(service.clone(), pool.clone());
        let cache = MetadataCacheManager::new(pool.clone(), sync);
        Self {
            service,
            pool,
            cache,
            config,
        }
    }

    pub fn cache(&self) -> &MetadataCacheManager {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut MetadataCacheManager {
        &mut self.cache
    }

    /// Route a request by shape: a lone operation takes the single path; an
    /// array takes the multi path when it holds more than one operation or
    /// any payload references a sibling. A one-element array without
    /// references degrades to the single path.
    pub async fn execute(&self, request: ExecuteRequest) -> Result<ExecutionReport> {
        match request {
            ExecuteRequest::Single(op) => {
                Ok(ExecutionReport::Single(self.execute_single_operation(op).await?))
            }
            ExecuteRequest::Batch(ops) => {
                let multi = ops.len() > 1 || ops.iter().any(RecordOperation::has_references);
                if multi {
                    Ok(ExecutionReport::Batch(self.execute_multiple_operations(ops).await?))
                } else {
                    match ops.into_iter().next() {
                        Some(op) => {
                            debug!("one-element batch without references, taking single path");
                            Ok(ExecutionReport::Single(self.execute_single_operation(op).await?))
                        }
                        None => Ok(ExecutionReport::Batch(BatchSummary {
                            success: true,
                            total_operations: 0,
                            successful_operations: 0,
                            failed_operations: 0,
                            created_records: Vec::new(),
                            errors: Vec::new(),
                            warnings: Vec::new(),
                            execution_plan: ExecutionPlan::default(),
                        })),
                    }
                }
            }
        }
    }

    /// Single-operation pipeline: ensure metadata, advisory duplicate check
    /// on creates, blocking preflight, dispatch.
    pub async fn execute_single_operation(&self, op: RecordOperation) -> Result<SingleOutcome> {
        let started = Instant::now();
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        self.cache
            .ensure_metadata(&[op.sobject.clone()])
            .await
            .with_context(|| format!("ensuring metadata for {}", op.sobject))?;

        // The single path carries no siblings, so a reference can never
        // resolve here.
        let payload = match op.resolve_payload(&HashMap::new(), &[]) {
            Ok(payload) => payload,
            Err(unresolved) => {
                return Ok(SingleOutcome {
                    success: false,
                    record_id: None,
                    errors: vec![format!(
                        "payload references temporary id(s) with no sibling operations: {}",
                        unresolved.join(", ")
                    )],
                    warnings,
                    duration: started.elapsed(),
                });
            }
        };

        if op.kind == OperationKind::Create && self.config.check_duplicates {
            let field = self.config.duplicate_field_for(&op.sobject).to_string();
            let matcher = DuplicateMatcher::new(DuplicateSearchConfig {
                weights: self.config.weights,
                thresholds: self.config.thresholds,
                ..DuplicateSearchConfig::new(op.sobject.clone(), &field)
            });
            // Advisory only; a matcher failure must not block the create.
            match matcher.find_duplicates(self.service.as_ref(), &payload).await {
                Ok(matches) => {
                    for m in matches {
                        warnings.push(
                            ValidationIssue::new(
                                IssueKind::DuplicateSuspect,
                                Some(&field),
                                format!(
                                    "possible duplicate ({} {:.2}): {} \"{}\"",
                                    m.confidence.label(),
                                    m.score,
                                    m.record_id,
                                    m.matched_value
                                ),
                            )
                            .with_suggestion(format!(
                                "review {} before creating another {}",
                                m.record_id, op.sobject
                            )),
                        );
                    }
                }
                Err(e) => warn!("duplicate check for {} failed: {e:#}", op.sobject),
            }
        }

        let validator = PreflightValidator::new(self.pool.clone());
        let validation = match op.kind {
            OperationKind::Create => Some(validator.validate_create(&op.sobject, &payload).await?),
            OperationKind::Update => match &op.record_id {
                Some(id) => Some(validator.validate_update(&op.sobject, id, &payload).await?),
                None => {
                    errors.push(format!("update of {} requires a record id", op.sobject));
                    None
                }
            },
            OperationKind::Delete => {
                if op.record_id.is_none() {
                    errors.push(format!("delete of {} requires a record id", op.sobject));
                }
                None
            }
        };
        if let Some(validation) = validation {
            warnings.extend(validation.warnings.iter().cloned());
            errors.extend(validation.errors.iter().map(|e| e.message.clone()));
        }
        if !errors.is_empty() {
            return Ok(SingleOutcome {
                success: false,
                record_id: None,
                errors,
                warnings,
                duration: started.elapsed(),
            });
        }

        let result = match op.kind {
            OperationKind::Create => self.service.create(&op.sobject, &payload).await,
            OperationKind::Update => {
                // Presence checked above
                let id = op.record_id.as_deref().unwrap_or_default();
                self.service.update(&op.sobject, id, &payload).await
            }
            OperationKind::Delete => {
                let id = op.record_id.as_deref().unwrap_or_default();
                self.service.delete(&op.sobject, id).await
            }
        };

        let outcome = match result {
            Ok(save) if save.success => SingleOutcome {
                success: true,
                record_id: save.id.or_else(|| op.record_id.clone()),
                errors,
                warnings,
                duration: started.elapsed(),
            },
            Ok(save) => SingleOutcome {
                success: false,
                record_id: None,
                errors: vec![save.error_message()],
                warnings,
                duration: started.elapsed(),
            },
            Err(e) => SingleOutcome {
                success: false,
                record_id: None,
                errors: vec![format!("{e:#}")],
                warnings,
                duration: started.elapsed(),
            },
        };
        info!(
            "{} {} {} in {:?}",
            op.kind.label(),
            op.sobject,
            if outcome.success { "succeeded" } else { "failed" },
            outcome.duration
        );
        Ok(outcome)
    }

    /// Multi-operation pipeline: warm metadata for every entity in the batch
    /// (one relationship hop deep, so edge analysis sees its targets), then
    /// delegate to the dependency resolver.
    pub async fn execute_multiple_operations(
        &self,
        operations: Vec<RecordOperation>,
    ) -> Result<BatchSummary> {
        let total = operations.len();

        let mut sobjects: Vec<&str> = operations.iter().map(|op| op.sobject.as_str()).collect();
        sobjects.sort();
        sobjects.dedup();
        for sobject in &sobjects {
            self.cache
                .ensure_metadata_with_relationships(sobject, 1)
                .await
                .with_context(|| format!("ensuring metadata for {sobject}"))?;
        }

        let resolver = DependencyResolver::new(self.pool.clone());
        let execution = match resolver
            .resolve_and_execute(self.service.clone(), operations)
            .await
        {
            Ok(execution) => execution,
            Err(analysis) => {
                // Analysis failure: nothing was dispatched.
                return Ok(BatchSummary {
                    success: false,
                    total_operations: total,
                    successful_operations: 0,
                    failed_operations: total,
                    created_records: Vec::new(),
                    errors: vec![analysis.to_string()],
                    warnings: Vec::new(),
                    execution_plan: ExecutionPlan::default(),
                });
            }
        };

        Ok(BatchSummary {
            success: execution.all_succeeded(),
            total_operations: total,
            successful_operations: execution.successful_operations(),
            failed_operations: execution.failed_operations(),
            created_records: execution.created_records(),
            errors: execution.errors(),
            warnings: execution.warnings.clone(),
            execution_plan: execution.plan,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::MockDataService;
    use crate::metadata::migrations::run_migrations;
    use crate::resolver::FieldValue;
    use serde_json::json;

    async fn orchestrator_with(service: MockDataService) -> (Orchestrator, Arc<MockDataService>) {
        crate::api::testing::init_test_logging();
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let service = Arc::new(service);
        let orchestrator = Orchestrator::new(
            service.clone(),
            pool,
            OrchestratorConfig::default(),
        );
        (orchestrator, service)
    }

    fn create_op(sobject: &str, fields: &[(&str, FieldValue)]) -> RecordOperation {
        let payload = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        RecordOperation::create(sobject, payload)
    }

    #[tokio::test]
    async fn test_single_create_succeeds() {
        let (orchestrator, service) =
            orchestrator_with(MockDataService::with_standard_schema()).await;
        let outcome = orchestrator
            .execute_single_operation(create_op(
                "Account",
                &[("Name", FieldValue::literal("Acme"))],
            ))
            .await
            .unwrap();

        assert!(outcome.success, "errors: {:?}", outcome.errors);
        assert!(outcome.record_id.is_some());
        assert!(outcome.warnings.is_empty());
        assert_eq!(service.created().len(), 1);
    }

    #[tokio::test]
    async fn test_validation_blocks_dispatch() {
        let (orchestrator, service) =
            orchestrator_with(MockDataService::with_standard_schema()).await;
        let outcome = orchestrator
            .execute_single_operation(create_op(
                "Account",
                &[("Industry", FieldValue::literal("Technology"))],
            ))
            .await
            .unwrap();

        assert!(!outcome.success);
        assert!(outcome.errors.iter().any(|e| e.contains("Name")));
        // Nothing reached the remote service.
        assert!(service.created().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_finding_warns_without_blocking() {
        let (orchestrator, service) =
            orchestrator_with(MockDataService::with_standard_schema()).await;
        service.seed_record("Account", json!({"Id": "001A", "Name": "Acme Corporation"}));

        let outcome = orchestrator
            .execute_single_operation(create_op(
                "Account",
                &[("Name", FieldValue::literal("Acme Corporation"))],
            ))
            .await
            .unwrap();

        assert!(outcome.success);
        let suspect = outcome
            .warnings
            .iter()
            .find(|w| w.kind == IssueKind::DuplicateSuspect)
            .unwrap_or_else(|| panic!("warnings: {:?}", outcome.warnings));
        assert_eq!(suspect.field.as_deref(), Some("Name"));
        assert!(suspect.message.contains("possible duplicate"));
        assert!(suspect.suggestion.as_deref().is_some_and(|s| s.contains("001A")));
        // The create still went through.
        assert_eq!(service.created().len(), 1);
    }

    #[tokio::test]
    async fn test_update_requires_record_id() {
        let (orchestrator, _service) =
            orchestrator_with(MockDataService::with_standard_schema()).await;
        let op = RecordOperation {
            kind: OperationKind::Update,
            sobject: "Account".to_string(),
            payload: [("Name".to_string(), FieldValue::literal("Acme"))].into(),
            temp_id: None,
            record_id: None,
        };
        let outcome = orchestrator.execute_single_operation(op).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.errors[0].contains("record id"));
    }

    #[tokio::test]
    async fn test_routing_by_shape() {
        let (orchestrator, _service) =
            orchestrator_with(MockDataService::with_standard_schema()).await;

        // Lone object: single path.
        let request: ExecuteRequest =
            serde_json::from_value(json!({"type": "create", "sobject": "Account",
                "payload": {"Name": "Solo"}}))
            .unwrap();
        assert!(matches!(
            orchestrator.execute(request).await.unwrap(),
            ExecutionReport::Single(_)
        ));

        // One-element array without references degrades to the single path.
        let request: ExecuteRequest =
            serde_json::from_value(json!([{"type": "create", "sobject": "Account",
                "payload": {"Name": "Lonely"}}]))
            .unwrap();
        assert!(matches!(
            orchestrator.execute(request).await.unwrap(),
            ExecutionReport::Single(_)
        ));

        // Two operations: multi path.
        let request: ExecuteRequest = serde_json::from_value(json!([
            {"type": "create", "sobject": "Account", "payload": {"Name": "One"}},
            {"type": "create", "sobject": "Account", "payload": {"Name": "Two"}},
        ]))
        .unwrap();
        assert!(matches!(
            orchestrator.execute(request).await.unwrap(),
            ExecutionReport::Batch(_)
        ));
    }

    #[tokio::test]
    async fn test_one_element_array_with_reference_takes_multi_path() {
        let (orchestrator, _service) =
            orchestrator_with(MockDataService::with_standard_schema()).await;
        let request: ExecuteRequest =
            serde_json::from_value(json!([{"type": "create", "sobject": "Contact",
                "payload": {"LastName": "Doe", "AccountId": {"$ref": "a1"}}}]))
            .unwrap();
        let report = orchestrator.execute(request).await.unwrap();
        // Multi path, and the dangling reference fails the operation.
        match report {
            ExecutionReport::Batch(summary) => {
                assert!(!summary.success);
                assert_eq!(summary.failed_operations, 1);
            }
            ExecutionReport::Single(_) => panic!("expected multi path"),
        }
    }

    #[tokio::test]
    async fn test_multi_path_resolves_chain() {
        let (orchestrator, service) =
            orchestrator_with(MockDataService::with_standard_schema()).await;
        let ops = vec![
            create_op("Account", &[("Name", FieldValue::literal("Acme"))]).with_temp_id("a1"),
            create_op(
                "Contact",
                &[
                    ("LastName", FieldValue::literal("Doe")),
                    ("AccountId", FieldValue::reference("a1")),
                ],
            )
            .with_temp_id("c1"),
        ];
        let summary = orchestrator.execute_multiple_operations(ops).await.unwrap();

        assert!(summary.success, "errors: {:?}", summary.errors);
        assert_eq!(summary.total_operations, 2);
        assert_eq!(summary.successful_operations, 2);
        assert_eq!(summary.created_records.len(), 2);
        // Account level precedes Contact level.
        assert_eq!(summary.execution_plan.batches.len(), 2);

        let created = service.created();
        let account_id = &summary
            .created_records
            .iter()
            .find(|(t, _)| t == "a1")
            .unwrap()
            .1;
        let contact = &created.iter().find(|(s, _)| s == "Contact").unwrap().1;
        assert_eq!(contact["AccountId"], json!(account_id));
    }

    #[tokio::test]
    async fn test_analysis_failure_is_collected_not_thrown() {
        let (orchestrator, service) =
            orchestrator_with(MockDataService::with_standard_schema()).await;
        let ops = vec![
            create_op("Account", &[("Name", FieldValue::literal("One"))]).with_temp_id("dup"),
            create_op("Account", &[("Name", FieldValue::literal("Two"))]).with_temp_id("dup"),
        ];
        let summary = orchestrator.execute_multiple_operations(ops).await.unwrap();

        assert!(!summary.success);
        assert_eq!(summary.failed_operations, 2);
        assert_eq!(summary.errors.len(), 1);
        assert!(summary.errors[0].contains("duplicate temporary id"));
        assert!(service.created().is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch_is_trivially_successful() {
        let (orchestrator, _service) =
            orchestrator_with(MockDataService::with_standard_schema()).await;
        let report = orchestrator
            .execute(ExecuteRequest::Batch(Vec::new()))
            .await
            .unwrap();
        match report {
            ExecutionReport::Batch(summary) => {
                assert!(summary.success);
                assert_eq!(summary.total_operations, 0);
            }
            ExecutionReport::Single(_) => panic!("expected batch report"),
        }
    }
}

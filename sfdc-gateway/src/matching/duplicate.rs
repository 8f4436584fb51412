//! Duplicate search
//!
//! Issues several independent SOSL strategies for one term, unions the
//! candidates, then re-scores every candidate locally with the similarity
//! engine over normalized strings. Candidates confirmed by more than one
//! strategy get a small boost. Remote strategy failures degrade the search
//! instead of aborting it.

use std::collections::HashMap;

use anyhow::Result;
use log::{debug, warn};
use serde_json::Value;

use crate::api::models::record_id;
use crate::api::{RemoteDataService, SearchPattern, SearchStrategy, escape_sosl_term};

use super::normalize::{
    normalize_company_name, normalize_email, normalize_for_search, normalize_person_name,
};
use super::similarity::{SimilarityScore, SimilarityWeights, composite_similarity};

/// Boost per confirming strategy beyond the first.
const MULTI_STRATEGY_BOOST: f64 = 0.05;

/// Tier cutoffs, overridable per deployment.
#[derive(Debug, Clone, Copy)]
pub struct ConfidenceThresholds {
    pub high: f64,
    pub medium: f64,
}

impl Default for ConfidenceThresholds {
    fn default() -> Self {
        Self {
            high: 0.95,
            medium: 0.75,
        }
    }
}

/// Confidence bucket for a duplicate-match score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfidenceTier {
    Low,
    Medium,
    High,
}

impl ConfidenceTier {
    pub fn from_score(score: f64, thresholds: &ConfidenceThresholds) -> Self {
        if score >= thresholds.high {
            Self::High
        } else if score >= thresholds.medium {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        }
    }
}

/// Search configuration for one sobject/field pair.
#[derive(Debug, Clone)]
pub struct DuplicateSearchConfig {
    pub sobject: String,
    pub field: String,
    pub limit: usize,
    pub min_confidence: Option<ConfidenceTier>,
    pub weights: SimilarityWeights,
    pub thresholds: ConfidenceThresholds,
}

impl DuplicateSearchConfig {
    pub fn new(sobject: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            sobject: sobject.into(),
            field: field.into(),
            limit: 10,
            min_confidence: None,
            weights: SimilarityWeights::default(),
            thresholds: ConfidenceThresholds::default(),
        }
    }
}

/// One scored duplicate candidate.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub record: Value,
    pub record_id: String,
    pub matched_value: String,
    pub normalized_input: String,
    pub normalized_candidate: String,
    pub similarity: SimilarityScore,
    /// Composite after the multi-strategy boost; the tier comes from this
    pub score: f64,
    pub confidence: ConfidenceTier,
    pub matched_by: Vec<SearchStrategy>,
}

/// Pick the normalizer variant from the field name.
fn normalizer_for_field(field: &str) -> fn(&str) -> String {
    let lower = field.to_lowercase();
    if lower.contains("email") {
        normalize_email
    } else if lower.contains("firstname")
        || lower.contains("lastname")
        || lower.contains("middlename")
    {
        normalize_person_name
    } else if lower.contains("name") {
        normalize_company_name
    } else {
        normalize_for_search
    }
}

pub struct DuplicateMatcher {
    config: DuplicateSearchConfig,
}

impl DuplicateMatcher {
    pub fn new(config: DuplicateSearchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DuplicateSearchConfig {
        &self.config
    }

    /// Search for records resembling `term` in the configured field.
    pub async fn find_matches(
        &self,
        service: &dyn RemoteDataService,
        term: &str,
    ) -> Result<Vec<MatchResult>> {
        let term = term.trim();
        if term.is_empty() {
            return Ok(Vec::new());
        }

        let patterns = self.build_patterns(term);

        // Union candidates by record id, remembering every strategy that
        // surfaced each one.
        let mut candidates: HashMap<String, (Value, Vec<SearchStrategy>)> = HashMap::new();
        for pattern in &patterns {
            let result = match service.search(&pattern.statement).await {
                Ok(result) => result,
                Err(e) => {
                    // e.g. fuzzy search unsupported by the org
                    warn!(
                        "{} search strategy failed, degrading: {e:#}",
                        pattern.strategy.label()
                    );
                    continue;
                }
            };
            for record in result.search_records {
                let Some(id) = record_id(&record).map(str::to_string) else {
                    continue;
                };
                let entry = candidates.entry(id).or_insert_with(|| (record, Vec::new()));
                if !entry.1.contains(&pattern.strategy) {
                    entry.1.push(pattern.strategy);
                }
            }
        }
        debug!(
            "duplicate search for {:?}: {} patterns, {} distinct candidates",
            term,
            patterns.len(),
            candidates.len()
        );

        // Some orgs return id-only search records; fetch the candidate field
        // over SOQL for those so they can still be scored.
        let fetched = self.fetch_missing_values(service, &candidates).await;

        let normalizer = normalizer_for_field(&self.config.field);
        let normalized_input = normalizer(term);

        let mut matches: Vec<MatchResult> = candidates
            .into_iter()
            .filter_map(|(id, (record, matched_by))| {
                let matched_value = record
                    .get(&self.config.field)
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
                    .or_else(|| fetched.get(&id).cloned())?;
                let normalized_candidate = normalizer(&matched_value);
                let similarity = composite_similarity(
                    &normalized_input,
                    &normalized_candidate,
                    &self.config.weights,
                );
                let boost = MULTI_STRATEGY_BOOST * (matched_by.len().saturating_sub(1)) as f64;
                let score = (similarity.composite + boost).min(1.0);
                Some(MatchResult {
                    confidence: ConfidenceTier::from_score(score, &self.config.thresholds),
                    record,
                    record_id: id,
                    matched_value,
                    normalized_input: normalized_input.clone(),
                    normalized_candidate,
                    similarity,
                    score,
                    matched_by,
                })
            })
            .collect();

        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(self.config.limit);
        if let Some(min) = self.config.min_confidence {
            matches.retain(|m| m.confidence >= min);
        }
        Ok(matches)
    }

    /// Values for candidates whose search record lacks the configured field,
    /// fetched in one SOQL round trip. A fetch failure drops those
    /// candidates rather than aborting the search.
    async fn fetch_missing_values(
        &self,
        service: &dyn RemoteDataService,
        candidates: &HashMap<String, (Value, Vec<SearchStrategy>)>,
    ) -> HashMap<String, String> {
        let missing: Vec<&str> = candidates
            .iter()
            .filter(|(_, (record, _))| {
                record
                    .get(&self.config.field)
                    .and_then(|v| v.as_str())
                    .is_none()
            })
            .map(|(id, _)| id.as_str())
            .collect();
        if missing.is_empty() {
            return HashMap::new();
        }

        let id_list = missing
            .iter()
            .map(|id| format!("'{id}'"))
            .collect::<Vec<_>>()
            .join(", ");
        let soql = format!(
            "SELECT Id, {} FROM {} WHERE Id IN ({id_list})",
            self.config.field, self.config.sobject
        );
        let result = match service.query(&soql).await {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    "candidate field fetch failed, dropping {} id-only record(s): {e:#}",
                    missing.len()
                );
                return HashMap::new();
            }
        };

        let mut fetched = HashMap::new();
        for record in &result.records {
            if let (Some(id), Some(value)) = (
                record_id(record),
                record.get(&self.config.field).and_then(|v| v.as_str()),
            ) {
                fetched.insert(id.to_string(), value.to_string());
            }
        }
        fetched
    }

    /// Convenience wrapper: extract the configured field from a record
    /// payload and search with a MEDIUM confidence floor.
    pub async fn find_duplicates(
        &self,
        service: &dyn RemoteDataService,
        record: &Value,
    ) -> Result<Vec<MatchResult>> {
        let Some(term) = record.get(&self.config.field).and_then(|v| v.as_str()) else {
            return Ok(Vec::new());
        };
        let floored = DuplicateMatcher {
            config: DuplicateSearchConfig {
                min_confidence: Some(
                    self.config
                        .min_confidence
                        .map_or(ConfidenceTier::Medium, |min| min.max(ConfidenceTier::Medium)),
                ),
                ..self.config.clone()
            },
        };
        floored.find_matches(service, term).await
    }

    fn build_patterns(&self, term: &str) -> Vec<SearchPattern> {
        let escaped = escape_sosl_term(term);
        let fields = ["Id", self.config.field.as_str()];
        let limit = self.config.limit.max(10);

        let mut patterns = vec![
            SearchPattern::build(SearchStrategy::Exact, &escaped, &self.config.sobject, &fields, limit),
            SearchPattern::build(SearchStrategy::Prefix, &escaped, &self.config.sobject, &fields, limit),
            SearchPattern::build(SearchStrategy::Substring, &escaped, &self.config.sobject, &fields, limit),
            SearchPattern::build(SearchStrategy::Fuzzy, &escaped, &self.config.sobject, &fields, limit),
        ];

        // Repeat the exact search over the normalized term when
        // normalization actually changed it.
        let normalized = normalize_for_search(term);
        if !normalized.is_empty() && normalized != term {
            let escaped_normalized = escape_sosl_term(&normalized);
            patterns.push(SearchPattern::build(
                SearchStrategy::Normalized,
                &escaped_normalized,
                &self.config.sobject,
                &fields,
                limit,
            ));
        }
        patterns
    }
}

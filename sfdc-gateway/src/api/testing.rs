//! In-memory fake of the Remote Data Service for tests
//!
//! Holds a describe schema and a record set per sobject, answers SOSL
//! searches with naive term matching, and lets tests inject failures.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde_json::{Value, json};

use super::models::{
    DescribeField, DescribeSObjectResult, GlobalSObjectDescribe, PicklistEntry, QueryResult,
    SaveResult, SearchResult, record_id,
};
use super::RemoteDataService;

/// Install the env_logger backend once so `RUST_LOG=debug cargo test` shows
/// module logs. Safe to call from every test.
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn string_field(name: &str, nillable: bool) -> DescribeField {
    DescribeField {
        name: name.to_string(),
        label: name.to_string(),
        field_type: "string".to_string(),
        length: Some(255),
        precision: None,
        scale: None,
        nillable,
        unique: false,
        auto_number: false,
        calculated: false,
        default_value: None,
        picklist_values: Vec::new(),
        reference_to: Vec::new(),
        relationship_name: None,
        cascade_delete: false,
        restricted_delete: false,
    }
}

pub fn typed_field(name: &str, field_type: &str, nillable: bool) -> DescribeField {
    DescribeField {
        field_type: field_type.to_string(),
        ..string_field(name, nillable)
    }
}

pub fn reference_field(name: &str, to: &str, nillable: bool) -> DescribeField {
    DescribeField {
        field_type: "reference".to_string(),
        reference_to: vec![to.to_string()],
        relationship_name: Some(name.trim_end_matches("Id").to_string()),
        ..string_field(name, nillable)
    }
}

pub fn picklist_field(name: &str, values: &[&str], nillable: bool) -> DescribeField {
    DescribeField {
        field_type: "picklist".to_string(),
        picklist_values: values
            .iter()
            .map(|v| PicklistEntry {
                label: Some(v.to_string()),
                value: v.to_string(),
                active: true,
            })
            .collect(),
        ..string_field(name, nillable)
    }
}

pub fn describe_sobject(name: &str, fields: Vec<DescribeField>) -> DescribeSObjectResult {
    DescribeSObjectResult {
        name: name.to_string(),
        label: name.to_string(),
        label_plural: Some(format!("{name}s")),
        key_prefix: None,
        createable: true,
        updateable: true,
        deletable: true,
        queryable: true,
        searchable: true,
        fields,
        record_type_infos: Vec::new(),
    }
}

#[derive(Default)]
pub struct MockDataService {
    schema: HashMap<String, DescribeSObjectResult>,
    records: Mutex<HashMap<String, Vec<Value>>>,
    /// Payloads passed to `create`, in call order, for assertions.
    created: Mutex<Vec<(String, Value)>>,
    updated: Mutex<Vec<(String, String, Value)>>,
    /// Sobjects whose create calls fail.
    fail_creates_for: HashSet<String>,
    /// Simulate an org without native fuzzy search.
    fail_fuzzy: bool,
    /// Search responses carry only the Id field, like orgs that ignore the
    /// RETURNING field list.
    id_only_search: bool,
    next_id: AtomicU64,
}

impl MockDataService {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            ..Default::default()
        }
    }

    /// Account + Contact schema covering the validator and matcher tests.
    pub fn with_standard_schema() -> Self {
        let mut mock = Self::new();
        mock.add_sobject(describe_sobject(
            "Account",
            vec![
                typed_field("Id", "id", false),
                string_field("Name", false),
                picklist_field(
                    "Industry",
                    &["Technology", "Finance", "Healthcare", "Energy"],
                    true,
                ),
                typed_field("NumberOfEmployees", "int", true),
                {
                    let mut f = typed_field("AnnualRevenue", "currency", true);
                    f.precision = Some(18);
                    f.scale = Some(2);
                    f
                },
                reference_field("OwnerId", "User", false),
                reference_field("ParentId", "Account", true),
                typed_field("IsDeleted", "boolean", false),
                typed_field("CreatedDate", "datetime", false),
            ],
        ));
        mock.add_sobject(describe_sobject(
            "Contact",
            vec![
                typed_field("Id", "id", false),
                string_field("LastName", false),
                string_field("FirstName", true),
                typed_field("Email", "email", true),
                reference_field("AccountId", "Account", true),
                reference_field("ReportsToId", "Contact", true),
                reference_field("OwnerId", "User", false),
            ],
        ));
        mock.add_sobject(describe_sobject("User", vec![typed_field("Id", "id", false)]));
        mock
    }

    pub fn add_sobject(&mut self, describe: DescribeSObjectResult) {
        self.schema.insert(describe.name.clone(), describe);
    }

    pub fn fail_creates_for(&mut self, sobject: &str) {
        self.fail_creates_for.insert(sobject.to_string());
    }

    pub fn without_fuzzy_search(&mut self) {
        self.fail_fuzzy = true;
    }

    pub fn with_id_only_search(&mut self) {
        self.id_only_search = true;
    }

    /// Seed an existing record; it becomes searchable immediately.
    pub fn seed_record(&self, sobject: &str, record: Value) {
        self.records
            .lock()
            .unwrap()
            .entry(sobject.to_string())
            .or_default()
            .push(record);
    }

    pub fn created(&self) -> Vec<(String, Value)> {
        self.created.lock().unwrap().clone()
    }

    pub fn updated(&self) -> Vec<(String, String, Value)> {
        self.updated.lock().unwrap().clone()
    }

    fn allocate_id(&self) -> String {
        format!("001MOCK{:011}", self.next_id.fetch_add(1, Ordering::SeqCst))
    }
}

/// Strip the SOSL decoration from a FIND term, returning the bare term and
/// which naive match predicate to apply.
fn parse_find_term(statement: &str) -> Option<(String, Matcher)> {
    let start = statement.find('{')? + 1;
    let end = statement.find('}')?;
    let raw = &statement[start..end];
    let (raw, matcher) = if let Some(inner) = raw.strip_prefix('*').and_then(|r| r.strip_suffix('*'))
    {
        (inner, Matcher::Substring)
    } else if let Some(inner) = raw.strip_suffix('*') {
        (inner, Matcher::Prefix)
    } else if let Some(inner) = raw.strip_suffix('~') {
        (inner, Matcher::Fuzzy)
    } else {
        (raw, Matcher::Exact)
    };
    Some((raw.replace('\\', ""), matcher))
}

#[derive(Clone, Copy)]
enum Matcher {
    Exact,
    Prefix,
    Substring,
    Fuzzy,
}

fn parse_returning_entity(statement: &str) -> Option<&str> {
    let rest = statement.split("RETURNING ").nth(1)?;
    Some(rest.split('(').next()?.trim())
}

fn record_matches(record: &Value, term: &str, matcher: Matcher) -> bool {
    let term = term.to_lowercase();
    let Some(map) = record.as_object() else {
        return false;
    };
    map.values().filter_map(|v| v.as_str()).any(|v| {
        let v = v.to_lowercase();
        match matcher {
            Matcher::Exact => v == term,
            Matcher::Prefix => v.starts_with(&term),
            // Fuzzy approximated as substring-either-way in the fake
            Matcher::Substring | Matcher::Fuzzy => v.contains(&term) || term.contains(&v),
        }
    })
}

#[async_trait]
impl RemoteDataService for MockDataService {
    async fn describe(&self, sobject: &str) -> Result<DescribeSObjectResult> {
        self.schema
            .get(sobject)
            .cloned()
            .ok_or_else(|| anyhow!("no such sobject: {sobject}"))
    }

    async fn describe_global(&self) -> Result<Vec<GlobalSObjectDescribe>> {
        Ok(self
            .schema
            .values()
            .map(|d| GlobalSObjectDescribe {
                name: d.name.clone(),
                label: d.label.clone(),
                key_prefix: d.key_prefix.clone(),
                createable: d.createable,
                updateable: d.updateable,
                deletable: d.deletable,
                queryable: d.queryable,
            })
            .collect())
    }

    async fn query(&self, soql: &str) -> Result<QueryResult> {
        // Only id-filtered selects are answered; tooling queries (validation
        // rules) return nothing in the fake.
        let entity = soql
            .split(" FROM ")
            .nth(1)
            .and_then(|rest| rest.split_whitespace().next());
        let ids = soql
            .split("WHERE Id IN (")
            .nth(1)
            .and_then(|rest| rest.split(')').next());
        let (Some(entity), Some(ids)) = (entity, ids) else {
            return Ok(QueryResult::default());
        };
        let ids: HashSet<&str> = ids
            .split(',')
            .map(|id| id.trim().trim_matches('\''))
            .collect();

        let records = self.records.lock().unwrap();
        let hits: Vec<Value> = records
            .get(entity)
            .map(|recs| {
                recs.iter()
                    .filter(|r| record_id(r).is_some_and(|id| ids.contains(id)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(QueryResult {
            total_size: hits.len(),
            done: true,
            records: hits,
        })
    }

    async fn search(&self, sosl: &str) -> Result<SearchResult> {
        if self.fail_fuzzy && sosl.contains("~}") {
            return Err(anyhow!("fuzzy search is not enabled for this org"));
        }
        let Some((term, matcher)) = parse_find_term(sosl) else {
            return Err(anyhow!("malformed SOSL statement: {sosl}"));
        };
        let entity = parse_returning_entity(sosl).unwrap_or_default().to_string();
        let records = self.records.lock().unwrap();
        let mut hits: Vec<Value> = records
            .get(&entity)
            .map(|recs| {
                recs.iter()
                    .filter(|r| record_matches(r, &term, matcher))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        if self.id_only_search {
            hits = hits
                .iter()
                .filter_map(|r| record_id(r).map(|id| json!({"Id": id})))
                .collect();
        }
        Ok(SearchResult {
            search_records: hits,
        })
    }

    async fn create(&self, sobject: &str, data: &Value) -> Result<SaveResult> {
        if self.fail_creates_for.contains(sobject) {
            return Ok(SaveResult::failure(format!("create rejected for {sobject}")));
        }
        let id = self.allocate_id();
        let mut record = data.clone();
        if let Some(map) = record.as_object_mut() {
            map.insert("Id".to_string(), json!(id.clone()));
        }
        self.records
            .lock()
            .unwrap()
            .entry(sobject.to_string())
            .or_default()
            .push(record);
        self.created
            .lock()
            .unwrap()
            .push((sobject.to_string(), data.clone()));
        Ok(SaveResult::success(id))
    }

    async fn update(&self, sobject: &str, id: &str, data: &Value) -> Result<SaveResult> {
        self.updated
            .lock()
            .unwrap()
            .push((sobject.to_string(), id.to_string(), data.clone()));
        Ok(SaveResult::success(id))
    }

    async fn delete(&self, _sobject: &str, id: &str) -> Result<SaveResult> {
        Ok(SaveResult::success(id))
    }
}

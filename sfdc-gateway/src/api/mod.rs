//! Remote Data Service surface
//!
//! The actual Salesforce client (authentication, HTTP, session refresh) lives
//! outside this crate. Everything here talks to it through the
//! [`RemoteDataService`] trait so that the middleware can be exercised against
//! an in-memory fake in tests.

pub mod models;
pub mod search;
#[cfg(test)]
pub mod testing;

use async_trait::async_trait;
use serde_json::Value;

pub use models::{
    DescribeField, DescribeSObjectResult, GlobalSObjectDescribe, PicklistEntry, QueryResult,
    SaveError, SaveResult, SearchResult,
};
pub use search::{SearchPattern, SearchStrategy, escape_sosl_term};

/// Opaque handle to the remote CRM.
///
/// `search` takes a full SOSL statement (see [`search::SearchPattern`]);
/// `query` takes SOQL. Both return raw records as JSON values keyed by field
/// name, with the record id under `"Id"`.
#[async_trait]
pub trait RemoteDataService: Send + Sync {
    async fn describe(&self, sobject: &str) -> anyhow::Result<DescribeSObjectResult>;
    async fn describe_global(&self) -> anyhow::Result<Vec<GlobalSObjectDescribe>>;
    async fn query(&self, soql: &str) -> anyhow::Result<QueryResult>;
    async fn search(&self, sosl: &str) -> anyhow::Result<SearchResult>;
    async fn create(&self, sobject: &str, data: &Value) -> anyhow::Result<SaveResult>;
    async fn update(&self, sobject: &str, id: &str, data: &Value) -> anyhow::Result<SaveResult>;
    async fn delete(&self, sobject: &str, id: &str) -> anyhow::Result<SaveResult>;
}

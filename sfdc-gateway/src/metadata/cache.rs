//! TTL-aware metadata cache manager
//!
//! Decides what is missing or stale and delegates the fetching to the sync
//! service. The staleness predicate itself lives in the store; this module
//! only orchestrates. Retry policy is the sync collaborator's concern.

use anyhow::{Result, bail};
use chrono::Duration;
use log::{debug, info};
use sqlx::SqlitePool;

use super::store;
use super::sync::{MetadataSyncService, SyncReport};

/// Entities pre-warmed by `initialize`.
pub const CORE_OBJECTS: &[&str] = &["Account", "Contact", "Lead", "Opportunity", "Case", "Task"];

/// Default TTL before cached metadata is considered stale.
pub const DEFAULT_TTL_HOURS: i64 = 24;

pub struct MetadataCacheManager {
    pool: SqlitePool,
    sync: MetadataSyncService,
    ttl: Duration,
}

impl MetadataCacheManager {
    pub fn new(pool: SqlitePool, sync: MetadataSyncService) -> Self {
        Self {
            pool,
            sync,
            ttl: Duration::hours(DEFAULT_TTL_HOURS),
        }
    }

    pub fn set_ttl(&mut self, ttl: Duration) {
        self.ttl = ttl;
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Pre-warm the core entity set, syncing only what is missing or stale.
    pub async fn initialize(&self) -> Result<SyncReport> {
        let names: Vec<String> = CORE_OBJECTS.iter().map(|s| s.to_string()).collect();
        self.ensure_metadata(&names).await
    }

    /// Sync whichever of `names` are missing or stale. A sync error for any
    /// entity fails the whole call: downstream validation must not run
    /// against absent or half-synced schema.
    pub async fn ensure_metadata(&self, names: &[String]) -> Result<SyncReport> {
        let mut deficit = Vec::new();
        for name in names {
            if store::is_metadata_stale(&self.pool, name, self.ttl).await? {
                deficit.push(name.clone());
            }
        }

        if deficit.is_empty() {
            debug!("metadata cache hit for {names:?}");
            return Ok(SyncReport::default());
        }

        info!("metadata cache deficit: {deficit:?}");
        let report = self.sync.sync_objects(&deficit).await?;
        if report.has_errors() {
            bail!("metadata sync failed: {}", report.errors.join("; "));
        }
        Ok(report)
    }

    /// Ensure `name`, then walk its stored relationship edges and ensure the
    /// distinct targets, `depth` hops deep. A batch touching Contact pulls in
    /// Account this way without the caller enumerating it.
    pub async fn ensure_metadata_with_relationships(
        &self,
        name: &str,
        depth: u8,
    ) -> Result<()> {
        let root = [name.to_string()];
        self.ensure_metadata(&root).await?;
        if depth == 0 {
            return Ok(());
        }

        let relationships = store::get_relationships(&self.pool, name).await?;
        let mut targets: Vec<String> = relationships
            .into_iter()
            .map(|r| r.to_sobject)
            .filter(|t| t != name)
            .collect();
        targets.sort();
        targets.dedup();

        for target in targets {
            Box::pin(self.ensure_metadata_with_relationships(&target, depth - 1)).await?;
        }
        Ok(())
    }

    /// Force a sync regardless of staleness.
    pub async fn refresh_metadata(&self, names: &[String]) -> Result<SyncReport> {
        let report = self.sync.sync_objects(names).await?;
        if report.has_errors() {
            bail!("metadata refresh failed: {}", report.errors.join("; "));
        }
        Ok(report)
    }

    /// Drop every cached row.
    pub async fn clear_cache(&self) -> Result<()> {
        store::clear_metadata(&self.pool).await
    }

    /// Fresh-and-present predicate, the exact negation of the store's
    /// staleness rule.
    pub async fn is_cached(&self, name: &str) -> Result<bool> {
        Ok(!store::is_metadata_stale(&self.pool, name, self.ttl).await?)
    }

    /// Age of an entity's cached metadata, if it was ever synced.
    pub async fn metadata_age(&self, name: &str) -> Result<Option<Duration>> {
        store::get_metadata_age(&self.pool, name).await
    }
}

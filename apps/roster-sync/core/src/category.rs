//! Idempotent materialization of nested category paths
//!
//! `/A/B/C` resolves segment by segment beneath the configured sync root.
//! Existing nodes come from a cache loaded once at startup; misses fall
//! back to the store, and only then to creation. Creation races with a
//! concurrent actor resolve by re-querying.

use std::collections::HashMap;
use std::sync::Arc;
use sync_common::{CategoryStore, SyncResult};

/// Sentinel returned instead of mutating in dry-run mode
pub const DRY_RUN_CATEGORY_ID: i64 = -1;

/// Resolution counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverStats {
    pub found: u64,
    pub created: u64,
}

/// Walks and materializes category paths
pub struct CategoryPathResolver {
    store: Arc<dyn CategoryStore>,
    root: i64,
    dry_run: bool,
    cache: HashMap<(i64, String), i64>,
    stats: ResolverStats,
    created_paths: Vec<String>,
}

impl CategoryPathResolver {
    /// Load all existing categories once and build the lookup cache
    pub async fn load(
        store: Arc<dyn CategoryStore>,
        root: i64,
        dry_run: bool,
    ) -> SyncResult<Self> {
        let categories = store.list_categories().await?;
        let cache = categories
            .into_iter()
            .map(|c| ((c.parent_id, c.name), c.id))
            .collect();

        Ok(Self {
            store,
            root,
            dry_run,
            cache,
            stats: ResolverStats::default(),
            created_paths: Vec::new(),
        })
    }

    /// Resolve a `/A/B/C` path to the id of its final node, creating
    /// missing nodes. Empty paths resolve to the root.
    pub async fn resolve(&mut self, path: &str) -> SyncResult<i64> {
        let segments: Vec<&str> = path
            .split('/')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        let mut parent = self.root;
        let mut walked: Vec<String> = Vec::new();

        for segment in segments {
            walked.push(segment.to_string());
            let key = (parent, segment.to_string());

            if let Some(&id) = self.cache.get(&key) {
                self.stats.found += 1;
                parent = id;
                continue;
            }

            if let Some(existing) = self.store.find_child(segment, parent).await? {
                self.cache.insert(key, existing.id);
                self.stats.found += 1;
                parent = existing.id;
                continue;
            }

            if self.dry_run {
                return Ok(DRY_RUN_CATEGORY_ID);
            }

            let id = match self.store.create_category(segment, parent).await {
                Ok(id) => {
                    self.stats.created += 1;
                    self.created_paths.push(walked.join("/"));
                    id
                }
                // A concurrent actor may have created the node first
                Err(err) => match self.store.find_child(segment, parent).await? {
                    Some(existing) => {
                        self.stats.found += 1;
                        existing.id
                    }
                    None => return Err(err),
                },
            };

            self.cache.insert(key, id);
            parent = id;
        }

        Ok(parent)
    }

    pub fn stats(&self) -> ResolverStats {
        self.stats
    }

    /// Paths of nodes created during this run
    pub fn created_paths(&self) -> &[String] {
        &self.created_paths
    }
}

//! Parsed plan cache.

use crate::parser;
use crate::plan::ExecutionPlan;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use strata_core::{PipelineId, Result};
use tracing::debug;

struct CachedPlan {
    digest: String,
    plan: Arc<ExecutionPlan>,
}

/// Parsed plans keyed by pipeline id and source digest.
///
/// A definition is parsed once and shared read-only across runs until its
/// source text changes.
#[derive(Default)]
pub struct PlanCache {
    entries: DashMap<PipelineId, CachedPlan>,
}

impl PlanCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached plan for `id`, parsing `source` if it is new or changed.
    pub fn get_or_parse(&self, id: PipelineId, source: &str) -> Result<Arc<ExecutionPlan>> {
        let digest = digest(source);
        if let Some(entry) = self.entries.get(&id)
            && entry.digest == digest
        {
            return Ok(Arc::clone(&entry.plan));
        }

        let plan = Arc::new(parser::parse(source)?);
        debug!(pipeline_id = %id, digest = %digest, "Parsed pipeline plan");
        self.entries.insert(
            id,
            CachedPlan {
                digest,
                plan: Arc::clone(&plan),
            },
        );
        Ok(plan)
    }

    pub fn invalidate(&self, id: PipelineId) {
        self.entries.remove(&id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Hex SHA-256 of a pipeline source.
pub fn digest(source: &str) -> String {
    hex::encode(Sha256::digest(source.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const V1: &str = "name: a\ntype: output\nsteps:\n  - name: s\n    plugin: context/set\n";
    const V2: &str = "name: b\ntype: output\nsteps:\n  - name: s\n    plugin: context/set\n";

    #[test]
    fn test_reuses_plan_until_source_changes() {
        let cache = PlanCache::new();
        let id = PipelineId::new();

        let first = cache.get_or_parse(id, V1).unwrap();
        let second = cache.get_or_parse(id, V1).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        let changed = cache.get_or_parse(id, V2).unwrap();
        assert_eq!(changed.name(), "b");
        assert_eq!(cache.len(), 1);

        cache.invalidate(id);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_parse_errors_are_not_cached() {
        let cache = PlanCache::new();
        assert!(cache.get_or_parse(PipelineId::new(), "name: x\n").is_err());
        assert!(cache.is_empty());
    }
}

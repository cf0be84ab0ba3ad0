use std::time::Duration;

use dashmap::DashMap;

use crate::ids;
use crate::path::ArtifactPath;

/// Time-expiring set of artifact paths for which every configured upstream
/// has failed (C2, §4.2). Entries are evicted lazily, on the next read past
/// their TTL, rather than by a background sweep.
pub struct NegativeCache {
    ttl: Duration,
    entries: DashMap<ArtifactPath, std::time::SystemTime>,
}

impl NegativeCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Records that every upstream has just failed to supply `path`.
    pub fn mark_failed(&self, path: ArtifactPath) {
        self.entries.insert(path, ids::now());
    }

    /// True if `path` was marked failed within the TTL window. Expired
    /// entries are removed as a side effect.
    pub fn is_failed(&self, path: &ArtifactPath) -> bool {
        let Some(inserted_at) = self.entries.get(path).map(|e| *e) else {
            return false;
        };

        let expired = ids::now()
            .duration_since(inserted_at)
            .map(|age| age >= self.ttl)
            .unwrap_or(false);

        if expired {
            self.entries.remove(path);
            false
        } else {
            true
        }
    }
}

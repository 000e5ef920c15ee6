//! Oldest-first eviction ordering.

use super::CacheEntry;

/// Result of an eviction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Number of entries scanned
    pub scanned: usize,
    /// Total size before the pass
    pub total_before: u64,
    /// Total size after the pass
    pub total_after: u64,
    /// Names of deleted entries, in deletion order
    pub deleted: Vec<String>,
    /// Bytes reclaimed
    pub bytes_reclaimed: u64,
    /// Deletions that failed (non-fatal)
    pub errors: Vec<String>,
}

impl EvictionReport {
    pub fn within_budget(&self, budget: u64) -> bool {
        self.total_after <= budget
    }
}

/// Order entries for eviction: oldest modification first, ties broken by name.
pub(super) fn eviction_order(entries: &mut [CacheEntry]) {
    entries.sort_by(|a, b| {
        a.modified
            .cmp(&b.modified)
            .then_with(|| a.name.cmp(&b.name))
    });
}

/// Run an eviction pass over `entries` with the given delete function.
///
/// Entries are deleted front to back while the running total exceeds
/// `budget`. A failed delete leaves the total unchanged, so the pass moves on
/// to the next candidate.
pub(super) fn run_eviction<F>(
    mut entries: Vec<CacheEntry>,
    budget: u64,
    mut delete: F,
) -> EvictionReport
where
    F: FnMut(&CacheEntry) -> std::io::Result<()>,
{
    let total: u64 = entries.iter().map(|e| e.size_bytes).sum();
    let mut report = EvictionReport {
        scanned: entries.len(),
        total_before: total,
        total_after: total,
        ..EvictionReport::default()
    };

    if total <= budget {
        return report;
    }

    eviction_order(&mut entries);

    for entry in &entries {
        if report.total_after <= budget {
            break;
        }
        match delete(entry) {
            Ok(()) => {
                report.total_after = report.total_after.saturating_sub(entry.size_bytes);
                report.bytes_reclaimed += entry.size_bytes;
                report.deleted.push(entry.name.clone());
            }
            Err(e) => {
                tracing::warn!(entry = %entry.path.display(), error = %e, "failed to evict cache entry");
                report.errors.push(format!("Failed to delete {}: {}", entry.path.display(), e));
            }
        }
    }

    report
}

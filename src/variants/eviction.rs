//! Resident-count eviction
//!
//! Baseline artifacts count toward the limit but are never candidates, so
//! the resident count can stay above the limit when only baselines remain.

use super::error::Result;
use super::fingerprint::Fingerprint;
use super::store::{Artifact, ArtifactStore};

/// Outcome of one [`EvictionPolicy::enforce`] pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Fingerprints whose artifacts were deleted, oldest first
    pub evicted: Vec<Fingerprint>,
    /// Valid artifacts left in the store
    pub resident: usize,
    /// The pass stopped while still over the limit
    pub stalled: bool,
}

/// Least-recently-modified eviction of non-baseline artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictionPolicy {
    max_resident: usize,
}

impl EvictionPolicy {
    /// Policy allowing at most `max_resident` valid artifacts
    pub fn new(max_resident: usize) -> Self {
        Self { max_resident }
    }

    /// The enforced limit
    pub fn max_resident(&self) -> usize {
        self.max_resident
    }

    /// The artifact that would be evicted next, if any
    pub fn candidate(artifacts: &[Artifact]) -> Option<&Artifact> {
        artifacts
            .iter()
            .filter(|a| !a.is_baseline())
            .min_by(|a, b| (a.modified, a.created_at, &a.name).cmp(&(b.modified, b.created_at, &b.name)))
    }

    /// Delete artifacts until the store is within the limit
    ///
    /// `unload` is called with each victim's fingerprint before its file is
    /// deleted, so the in-memory entry never outlives the artifact.
    pub fn enforce<F>(&self, store: &ArtifactStore, mut unload: F) -> Result<EvictionReport>
    where
        F: FnMut(&Fingerprint) -> bool,
    {
        let mut report = EvictionReport::default();
        let mut artifacts = store.list()?;
        // Each round removes one file, so this bounds the loop even if files reappear
        let mut budget = artifacts.len();

        while artifacts.len() > self.max_resident {
            let Some(victim) = Self::candidate(&artifacts).cloned() else {
                log_warn!(
                    "eviction stalled: {} resident artifacts exceed limit {} but none are evictable",
                    artifacts.len(),
                    self.max_resident
                );
                report.stalled = true;
                break;
            };
            if budget == 0 {
                log_warn!("eviction stalled: store keeps growing while evicting");
                report.stalled = true;
                break;
            }
            budget -= 1;

            let was_loaded = unload(&victim.fingerprint);
            if let Err(e) = store.delete(&victim.name) {
                log_warn!("eviction stalled: cannot delete {}: {}", victim.name, e);
                report.stalled = true;
                break;
            }
            log_info!(
                "evicted {} (loaded: {}, limit {})",
                victim.fingerprint.short(),
                was_loaded,
                self.max_resident
            );
            report.evicted.push(victim.fingerprint);
            artifacts = store.list()?;
        }

        report.resident = artifacts.len();
        Ok(report)
    }
}

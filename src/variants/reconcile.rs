//! Startup reconciliation of the artifact store against the baseline templates

use super::baseline::BaselineTemplates;
use super::error::Result;
use super::fingerprint::Baseline;
use super::store::{Artifact, ArtifactStore};

/// What reconciliation did to the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    /// The store was kept
    Fresh {
        /// Valid artifacts left in place
        preserved: usize,
        /// Baselines that had no artifact and were copied in from the templates
        seeded: Vec<Baseline>,
    },
    /// The store was cleared and reseeded with the baseline templates only
    Reset {
        /// Why the store was considered stale
        reason: String,
    },
}

impl Reconciliation {
    /// Whether the store was reset
    pub fn is_reset(&self) -> bool {
        matches!(self, Reconciliation::Reset { .. })
    }
}

/// Why the store is stale, or `None` when it is fresh
///
/// The store is stale when the newest artifact of some baseline is older
/// than that baseline's template. A baseline without any artifact does not
/// make the store stale.
pub fn staleness(artifacts: &[Artifact], templates: &BaselineTemplates) -> Option<String> {
    Baseline::ALL.into_iter().find_map(|which| {
        let newest = artifacts
            .iter()
            .filter(|a| &a.fingerprint == which.fingerprint())
            .map(|a| a.created_at)
            .max()?;
        let template = templates.created_at(which);
        (newest < template).then(|| {
            format!(
                "`{}` artifact from {} predates its template from {}",
                which, newest, template
            )
        })
    })
}

/// Reset a stale store, or keep a fresh one and seed any missing baseline
pub fn reconcile(store: &ArtifactStore, templates: &BaselineTemplates) -> Result<Reconciliation> {
    let artifacts = store.list()?;

    if let Some(reason) = staleness(&artifacts, templates) {
        log_info!("artifact store {} is stale: {}", store.dir().display(), reason);
        store.reset()?;
        for template in templates.iter() {
            store.copy_in(&template.artifact.path)?;
        }
        return Ok(Reconciliation::Reset { reason });
    }

    let mut seeded = Vec::new();
    for template in templates.iter() {
        if !artifacts.iter().any(|a| &a.fingerprint == template.which.fingerprint()) {
            store.copy_in(&template.artifact.path)?;
            seeded.push(template.which);
        }
    }
    let preserved = artifacts.len();
    log_info!(
        "artifact store {} is fresh: kept {} artifacts, seeded {} baselines",
        store.dir().display(),
        preserved,
        seeded.len()
    );
    Ok(Reconciliation::Fresh { preserved, seeded })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portable::PortableCompiler;
    use crate::variants::fingerprint::Fingerprint;
    use std::fs;
    use time::macros::datetime;

    fn setup() -> (tempfile::TempDir, ArtifactStore, BaselineTemplates) {
        let dir = tempfile::tempdir().unwrap();
        let templates = BaselineTemplates::emit(
            &dir.path().join("templates"),
            "parser",
            &PortableCompiler::new(),
        )
        .unwrap();
        let store = ArtifactStore::open(dir.path().join("parsers"), "parser").unwrap();
        (dir, store, templates)
    }

    #[test]
    fn empty_store_is_seeded() {
        let (_dir, store, templates) = setup();
        let outcome = reconcile(&store, &templates).unwrap();
        assert_eq!(
            outcome,
            Reconciliation::Fresh {
                preserved: 0,
                seeded: vec![Baseline::Init, Baseline::Default],
            }
        );
        assert_eq!(store.resident_count().unwrap(), 2);
    }

    #[test]
    fn old_baseline_resets_store() {
        let (_dir, store, templates) = setup();
        let old = store
            .artifact_name(Baseline::Init.fingerprint(), datetime!(2001-01-01 00:00:00))
            .unwrap();
        fs::write(store.dir().join(old), "old init").unwrap();
        store.write(&Fingerprint::of("user"), "user variant").unwrap();

        let outcome = reconcile(&store, &templates).unwrap();
        assert!(outcome.is_reset());

        let names: Vec<String> = store.list().unwrap().into_iter().map(|a| a.name).collect();
        let expected: Vec<String> = templates.iter().map(|t| t.artifact.name.clone()).collect();
        assert_eq!(names.len(), 2);
        for name in expected {
            assert!(names.contains(&name), "{name}");
        }
    }

    #[test]
    fn fresh_store_keeps_user_variants() {
        let (_dir, store, templates) = setup();
        reconcile(&store, &templates).unwrap();
        store.write(&Fingerprint::of("user"), "user variant").unwrap();

        let outcome = reconcile(&store, &templates).unwrap();
        assert_eq!(
            outcome,
            Reconciliation::Fresh {
                preserved: 3,
                seeded: vec![],
            }
        );
    }
}

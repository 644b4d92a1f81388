//! Store reconciliation across process restarts
//!
//! Simulates an older installation by planting artifacts with old timestamps
//! and checks what a freshly bootstrapped manager keeps.

use parsanol_variants::variants::{
    ArtifactStore, Baseline, CacheConfig, CustomizationSpec, Fingerprint, ParserCacheManager,
    Reconciliation,
};
use std::fs;
use time::macros::datetime;

fn plant_old(config: &CacheConfig, fingerprint: &Fingerprint, contents: &str) {
    let store =
        ArtifactStore::open(&config.cache_dir, &config.prefix).expect("Should open store");
    let name = store
        .artifact_name(fingerprint, datetime!(2001-02-03 04:05:06.000007))
        .expect("Should format name");
    fs::write(store.dir().join(name), contents).expect("Should write artifact");
}

#[test]
fn test_stale_baseline_clears_user_variants() {
    let dir = tempfile::tempdir().unwrap();
    let config = CacheConfig::new(dir.path());
    plant_old(&config, Baseline::Default.fingerprint(), "old default");
    plant_old(&config, &Fingerprint::of("user"), "old user variant");

    let manager = ParserCacheManager::new(config).unwrap();

    let artifacts = manager.store().list().unwrap();
    assert_eq!(artifacts.len(), 2);
    assert!(artifacts.iter().all(|a| a.is_baseline()));
    assert!(!manager.is_loaded("user"));
    assert_eq!(manager.loaded_count(), 2);

    // The fresh baselines work
    let engine = manager.resolve("user", &CustomizationSpec::new().with_identifier("alpha")).unwrap();
    assert!(engine.matches("alpha"));
}

#[test]
fn test_fresh_store_is_preserved_across_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let config = CacheConfig::new(dir.path());
    {
        let manager = ParserCacheManager::new(config.clone()).unwrap();
        manager.resolve("k1", &CustomizationSpec::new().with_function("f")).unwrap();
        manager.resolve("k2", &CustomizationSpec::new().with_function("g")).unwrap();
        manager.shutdown();
    }

    let manager = ParserCacheManager::new(config).unwrap();
    assert_eq!(manager.store().resident_count().unwrap(), 4);
    assert!(manager.is_loaded("k1") && manager.is_loaded("k2"));

    let outcome = manager.reload().unwrap();
    assert_eq!(
        outcome,
        Reconciliation::Fresh {
            preserved: 4,
            seeded: vec![],
        }
    );
}

#[test]
fn test_missing_baseline_is_seeded() {
    let dir = tempfile::tempdir().unwrap();
    let config = CacheConfig::new(dir.path());
    {
        let manager = ParserCacheManager::new(config.clone()).unwrap();
        manager.resolve("k1", &CustomizationSpec::new().with_function("f")).unwrap();
        manager.shutdown();
        let init = manager.store().find(Baseline::Init.fingerprint()).unwrap().unwrap();
        manager.store().delete(&init.name).unwrap();
    }

    let manager = ParserCacheManager::new(config).unwrap();
    assert!(manager.is_loaded("k1"));
    assert!(manager.baseline(Baseline::Init).matches("where x: scalar"));
    assert_eq!(manager.store().resident_count().unwrap(), 3);
}

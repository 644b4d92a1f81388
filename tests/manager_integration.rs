//! Integration tests for the parser cache manager
//!
//! These tests cover resolution through memory, store and synthesis,
//! background persistence, eviction, reload and concurrent misses.

use filetime::{set_file_mtime, FileTime};
use parsanol_variants::portable::{GrammarCompiler, ParseError, ParserEngine, PortableCompiler};
use parsanol_variants::variants::{
    Baseline, BaselineTemplates, CacheConfig, CustomizationSpec, Fingerprint, ParserCacheManager,
    Reconciliation, VariantError,
};
use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

// ============================================================================
// Helpers
// ============================================================================

/// Compiler that counts how often it runs
#[derive(Default)]
struct CountingCompiler {
    inner: PortableCompiler,
    compiles: AtomicUsize,
}

impl CountingCompiler {
    fn count(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }
}

impl GrammarCompiler for CountingCompiler {
    fn compile(&self, source: &str) -> Result<ParserEngine, ParseError> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        self.inner.compile(source)
    }
}

fn alpha_spec() -> CustomizationSpec {
    CustomizationSpec::new()
        .with_identifier("alpha")
        .with_identifier("beta")
}

/// Resolve a distinct variant, wait for it to land, and pin its mtime
fn insert(manager: &ParserCacheManager, key: &str, mtime: i64) {
    let spec = CustomizationSpec::new().with_identifier(format!("id{}", mtime));
    manager.resolve(key, &spec).unwrap();
    manager.await_persistence();
    if let Some(artifact) = manager.store().find(&Fingerprint::of(key)).unwrap() {
        set_file_mtime(&artifact.path, FileTime::from_unix_time(mtime, 0)).unwrap();
    }
}

fn on_disk(manager: &ParserCacheManager, key: &str) -> bool {
    manager
        .store()
        .find(&Fingerprint::of(key))
        .unwrap()
        .is_some()
}

// ============================================================================
// Resolution
// ============================================================================

#[test]
fn test_same_key_returns_same_engine() {
    let dir = tempfile::tempdir().unwrap();
    let compiler = Arc::new(CountingCompiler::default());
    let manager =
        ParserCacheManager::with_compiler(CacheConfig::new(dir.path()), compiler.clone()).unwrap();
    let after_bootstrap = compiler.count();

    let first = manager.resolve("k1", &alpha_spec()).unwrap();
    let second = manager.resolve("k1", &alpha_spec()).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(compiler.count(), after_bootstrap + 1);
    assert!(manager.is_loaded("k1"));
    assert_eq!(manager.loaded_count(), 3);
}

#[test]
fn test_reserved_keys_return_baselines() {
    let dir = tempfile::tempdir().unwrap();
    let manager = ParserCacheManager::new(CacheConfig::new(dir.path())).unwrap();

    let init = manager.resolve("init", &alpha_spec()).unwrap();
    assert!(Arc::ptr_eq(&init, &manager.baseline(Baseline::Init)));
    assert!(init.matches("where x: scalar"));

    let default = manager.resolve("default", &CustomizationSpec::new()).unwrap();
    assert!(Arc::ptr_eq(&default, &manager.baseline(Baseline::Default)));
    assert_eq!(manager.store().resident_count().unwrap(), 2);
}

#[test]
fn test_synthesized_variant_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let manager = ParserCacheManager::new(CacheConfig::new(dir.path())).unwrap();

    let engine = manager.resolve("k1", &alpha_spec()).unwrap();
    assert!(engine.matches("alpha"));
    manager.await_persistence();

    assert!(on_disk(&manager, "k1"));
    assert_eq!(manager.store().resident_count().unwrap(), 3);
}

#[test]
fn test_new_process_loads_persisted_variants() {
    let dir = tempfile::tempdir().unwrap();
    {
        let manager = ParserCacheManager::new(CacheConfig::new(dir.path())).unwrap();
        manager.resolve("k1", &alpha_spec()).unwrap();
        // Dropping the manager drains its persistence thread
    }

    let manager = ParserCacheManager::new(CacheConfig::new(dir.path())).unwrap();
    assert!(manager.is_loaded("k1"));
    assert_eq!(manager.loaded_count(), 3);
    assert!(manager
        .resolve("k1", &CustomizationSpec::new())
        .unwrap()
        .matches("beta"));
}

#[test]
fn test_store_hit_after_bootstrap() {
    let dir = tempfile::tempdir().unwrap();
    let reader = ParserCacheManager::new(CacheConfig::new(dir.path())).unwrap();
    let writer = ParserCacheManager::new(CacheConfig::new(dir.path())).unwrap();

    writer.resolve("k1", &alpha_spec()).unwrap();
    writer.await_persistence();
    assert!(!reader.is_loaded("k1"));

    // An empty spec would not accept `alpha`; the stored artifact does
    let engine = reader.resolve("k1", &CustomizationSpec::new()).unwrap();
    assert!(engine.matches("alpha"));
    assert!(reader.is_loaded("k1"));
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn test_broken_artifact_is_deleted_and_surfaced() {
    let dir = tempfile::tempdir().unwrap();
    let manager = ParserCacheManager::new(CacheConfig::new(dir.path())).unwrap();
    let fingerprint = Fingerprint::of("broken");
    manager.store().write(&fingerprint, "{ not a grammar").unwrap();

    let err = manager.resolve("broken", &alpha_spec()).unwrap_err();
    assert!(matches!(err, VariantError::Compile { ref key, .. } if key == "broken"));
    assert!(!manager.is_loaded("broken"));
    assert!(!on_disk(&manager, "broken"));

    // Next resolution synthesizes
    let engine = manager.resolve("broken", &alpha_spec()).unwrap();
    assert!(engine.matches("alpha"));
}

#[test]
fn test_failed_persistence_keeps_the_engine() {
    let dir = tempfile::tempdir().unwrap();
    let manager = ParserCacheManager::new(CacheConfig::new(dir.path())).unwrap();

    // Replace the store directory with a plain file so every write fails
    let cache_dir = manager.store().dir().to_path_buf();
    fs::remove_dir_all(&cache_dir).unwrap();
    fs::write(&cache_dir, "not a directory").unwrap();

    let engine = manager.resolve("k1", &alpha_spec()).unwrap();
    assert!(engine.matches("alpha"));
    manager.await_persistence();
    assert!(manager.is_loaded("k1"));
    assert!(cache_dir.is_file());
}

#[test]
fn test_unreadable_artifact_falls_through_to_synthesis() {
    let dir = tempfile::tempdir().unwrap();
    let manager = ParserCacheManager::new(CacheConfig::new(dir.path())).unwrap();
    let artifact = manager
        .store()
        .write(&Fingerprint::of("k1"), "placeholder")
        .unwrap();
    fs::write(&artifact.path, [0xff, 0xfe, 0xfd]).unwrap();

    let engine = manager.resolve("k1", &alpha_spec()).unwrap();
    assert!(engine.matches("alpha"));

    // The synthesized source replaces the unreadable artifact
    manager.await_persistence();
    let stored = manager
        .store()
        .find(&Fingerprint::of("k1"))
        .unwrap()
        .expect("Should persist the synthesized variant");
    assert_ne!(stored.name, artifact.name);
    assert!(manager.store().read(&stored).is_ok());
}

#[test]
fn test_schema_drift_is_fatal_and_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let manager = ParserCacheManager::new(CacheConfig::new(dir.path())).unwrap();
    let init_source = manager.store().read_baseline(Baseline::Init).unwrap();

    let err = manager
        .resolve_from("k1", &init_source, &alpha_spec())
        .unwrap_err();
    assert!(err.is_schema_drift(), "{err}");
    assert!(err.to_string().contains("k1"));
    assert!(!manager.is_loaded("k1"));
    manager.await_persistence();
    assert!(!on_disk(&manager, "k1"));
}

// ============================================================================
// Eviction
// ============================================================================

/// The three-slot scenario with one more slot, so the two newest variants
/// stay resident next to the baselines
#[test]
fn test_eviction_keeps_baselines_and_newest_variants() {
    let dir = tempfile::tempdir().unwrap();
    let config = CacheConfig::new(dir.path()).with_max_resident(4);
    let manager = ParserCacheManager::new(config).unwrap();

    insert(&manager, "v1", 1_000);
    insert(&manager, "v2", 2_000);
    assert_eq!(manager.store().resident_count().unwrap(), 4);

    insert(&manager, "v3", 3_000);
    assert!(!on_disk(&manager, "v1"));
    assert!(!manager.is_loaded("v1"));
    assert!(on_disk(&manager, "v2"));

    insert(&manager, "v4", 4_000);
    assert!(!on_disk(&manager, "v2"));
    assert!(!manager.is_loaded("v2"));

    for key in ["init", "default", "v3", "v4"] {
        assert!(on_disk(&manager, key), "{key}");
        assert!(manager.is_loaded(key), "{key}");
    }
    assert_eq!(manager.store().resident_count().unwrap(), 4);
    assert_eq!(manager.loaded_count(), 4);
}

/// maxResident = 3: the two baselines plus only the newest variant
#[test]
fn test_eviction_with_three_slots() {
    let dir = tempfile::tempdir().unwrap();
    let config = CacheConfig::new(dir.path()).with_max_resident(3);
    let manager = ParserCacheManager::new(config).unwrap();

    insert(&manager, "v1", 1_000);
    insert(&manager, "v2", 2_000);
    insert(&manager, "v3", 3_000);

    assert!(!on_disk(&manager, "v1"));
    assert!(!on_disk(&manager, "v2"));
    for key in ["init", "default", "v3"] {
        assert!(on_disk(&manager, key), "{key}");
    }
}

#[test]
fn test_baselines_survive_tiny_limit() {
    let dir = tempfile::tempdir().unwrap();
    let config = CacheConfig::new(dir.path()).with_max_resident(1);
    let manager = ParserCacheManager::new(config).unwrap();

    // The returned engine stays usable even though its artifact is evicted
    let engine = manager.resolve("v1", &alpha_spec()).unwrap();
    manager.await_persistence();
    assert!(engine.matches("alpha"));

    assert!(!on_disk(&manager, "v1"));
    assert!(on_disk(&manager, "init"));
    assert!(on_disk(&manager, "default"));
    assert_eq!(manager.store().resident_count().unwrap(), 2);
    assert!(manager.is_loaded("init") && manager.is_loaded("default"));
}

#[test]
fn test_test_mode_disables_eviction() {
    let dir = tempfile::tempdir().unwrap();
    let config = CacheConfig::new(dir.path()).with_max_resident(3);
    let manager = ParserCacheManager::new(config).unwrap();
    manager.set_test_mode(true);
    assert!(manager.config().test_mode);

    insert(&manager, "v1", 1_000);
    insert(&manager, "v2", 2_000);
    insert(&manager, "v3", 3_000);
    assert_eq!(manager.store().resident_count().unwrap(), 5);
}

// ============================================================================
// Reload
// ============================================================================

#[test]
fn test_reload_keeps_fresh_store() {
    let dir = tempfile::tempdir().unwrap();
    let manager = ParserCacheManager::new(CacheConfig::new(dir.path())).unwrap();
    let before = manager.resolve("k1", &alpha_spec()).unwrap();

    let outcome = manager.reload().unwrap();
    assert!(!outcome.is_reset());
    assert!(manager.is_loaded("k1"));

    let after = manager.resolve("k1", &alpha_spec()).unwrap();
    assert!(!Arc::ptr_eq(&before, &after));
}

#[test]
fn test_reload_after_template_update_resets_store() {
    let dir = tempfile::tempdir().unwrap();
    let config = CacheConfig::new(dir.path());
    let manager = ParserCacheManager::new(config.clone()).unwrap();
    manager.resolve("k1", &alpha_spec()).unwrap();
    manager.await_persistence();

    let templates =
        BaselineTemplates::emit(&config.template_dir, &config.prefix, &PortableCompiler::new())
            .unwrap();

    let outcome = manager.reload().unwrap();
    assert!(matches!(outcome, Reconciliation::Reset { .. }));
    assert!(!manager.is_loaded("k1"));
    assert_eq!(manager.loaded_count(), 2);

    let names: Vec<String> = manager
        .store()
        .list()
        .unwrap()
        .into_iter()
        .map(|a| a.name)
        .collect();
    assert_eq!(names.len(), 2);
    for template in templates.iter() {
        assert!(names.contains(&template.artifact.name));
    }
}

// ============================================================================
// Concurrency
// ============================================================================

#[test]
fn test_concurrent_misses_compile_once() {
    let dir = tempfile::tempdir().unwrap();
    let compiler = Arc::new(CountingCompiler::default());
    let manager = Arc::new(
        ParserCacheManager::with_compiler(CacheConfig::new(dir.path()), compiler.clone()).unwrap(),
    );
    let after_bootstrap = compiler.count();

    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let manager = Arc::clone(&manager);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                manager.resolve("shared", &alpha_spec()).unwrap()
            })
        })
        .collect();
    let engines: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for engine in &engines[1..] {
        assert!(Arc::ptr_eq(&engines[0], engine));
    }
    assert_eq!(compiler.count(), after_bootstrap + 1);

    manager.await_persistence();
    assert!(on_disk(&manager, "shared"));
}

//! Parser cache manager
//!
//! Resolves a customization key to a compiled [`ParserEngine`]:
//!
//! 1. in-memory map, keyed by fingerprint;
//! 2. newest artifact for that fingerprint in the store;
//! 3. synthesis from the `default` baseline, compile, register, then persist
//!    and enforce the resident limit on a background thread.
//!
//! Concurrent misses for the same fingerprint are serialized, so each
//! fingerprint is synthesized, compiled and written at most once.
//!
//! # Example
//!
//! ```no_run
//! use parsanol_variants::variants::{CacheConfig, CustomizationSpec, ParserCacheManager};
//!
//! let manager = ParserCacheManager::new(CacheConfig::from_env()?)?;
//! let spec = CustomizationSpec::from_extra_json(r#"{"ids": ["alpha"], "funcs": ["f"]}"#)?;
//! let engine = manager.resolve(&spec.canonical_key(), &spec)?;
//! assert!(engine.matches("f(alpha)"));
//! manager.shutdown();
//! # Ok::<(), parsanol_variants::variants::VariantError>(())
//! ```

use super::baseline::BaselineTemplates;
use super::config::CacheConfig;
use super::customization::CustomizationSpec;
use super::error::{Result, VariantError};
use super::eviction::EvictionPolicy;
use super::fingerprint::{Baseline, Fingerprint};
use super::reconcile::{reconcile, Reconciliation};
use super::store::{Artifact, ArtifactStore};
use super::synth::synthesize;
use super::worker::PersistenceWorker;
use crate::portable::{GrammarCompiler, ParseError, ParserEngine, PortableCompiler};
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

type EngineMap = HashMap<Fingerprint, Arc<ParserEngine>>;

/// State shared with persistence threads
struct Shared {
    store: ArtifactStore,
    engines: RwLock<EngineMap>,
    /// Serializes store mutations (writes, eviction, reset)
    store_lock: Mutex<()>,
}

/// Engines compiled from the two baseline templates
struct BaselineEngines {
    init: Arc<ParserEngine>,
    default: Arc<ParserEngine>,
}

impl BaselineEngines {
    fn get(&self, which: Baseline) -> &Arc<ParserEngine> {
        match which {
            Baseline::Init => &self.init,
            Baseline::Default => &self.default,
        }
    }
}

/// Resolves customization keys to compiled parsers
pub struct ParserCacheManager {
    config: RwLock<CacheConfig>,
    compiler: Arc<dyn GrammarCompiler>,
    shared: Arc<Shared>,
    templates: RwLock<BaselineTemplates>,
    baselines: RwLock<BaselineEngines>,
    miss_locks: Mutex<HashMap<Fingerprint, Arc<Mutex<()>>>>,
    worker: PersistenceWorker,
}

impl ParserCacheManager {
    /// Bootstrap a manager using the built-in compiler
    pub fn new(config: CacheConfig) -> Result<Self> {
        Self::with_compiler(config, Arc::new(PortableCompiler::new()))
    }

    /// Bootstrap a manager with a caller-supplied compiler
    ///
    /// Loads (or emits) the baseline templates, reconciles the store against
    /// them and compiles every resident artifact.
    pub fn with_compiler(config: CacheConfig, compiler: Arc<dyn GrammarCompiler>) -> Result<Self> {
        let store = ArtifactStore::open(&config.cache_dir, &config.prefix)?;
        let templates =
            BaselineTemplates::load_or_emit(&config.template_dir, &config.prefix, compiler.as_ref())?;
        let shared = Arc::new(Shared {
            store,
            engines: RwLock::new(EngineMap::new()),
            store_lock: Mutex::new(()),
        });

        let (baselines, _) = bootstrap(&shared, &templates, compiler.as_ref())?;
        Ok(Self {
            config: RwLock::new(config),
            compiler,
            shared,
            templates: RwLock::new(templates),
            baselines: RwLock::new(baselines),
            miss_locks: Mutex::new(HashMap::new()),
            worker: PersistenceWorker::new(),
        })
    }

    /// Resolve a key against the resident `default` template
    pub fn resolve(&self, key: &str, spec: &CustomizationSpec) -> Result<Arc<ParserEngine>> {
        let baseline_source = self
            .templates
            .read()
            .source(Baseline::Default)
            .to_string();
        self.resolve_from(key, &baseline_source, spec)
    }

    /// Resolve a key, synthesizing from `baseline_source` on a full miss
    ///
    /// The reserved keys `init` and `default` always return the baseline
    /// engines and never synthesize.
    pub fn resolve_from(
        &self,
        key: &str,
        baseline_source: &str,
        spec: &CustomizationSpec,
    ) -> Result<Arc<ParserEngine>> {
        if let Some(which) = Baseline::from_key(key) {
            return Ok(self.baseline(which));
        }

        let fingerprint = Fingerprint::of(key);
        if let Some(engine) = self.loaded(&fingerprint) {
            return Ok(engine);
        }

        let lock = self.miss_lock(&fingerprint);
        let result = {
            let _guard = lock.lock();
            self.resolve_miss(key, &fingerprint, baseline_source, spec)
        };
        self.release_miss_lock(&fingerprint, lock);
        result
    }

    fn resolve_miss(
        &self,
        key: &str,
        fingerprint: &Fingerprint,
        baseline_source: &str,
        spec: &CustomizationSpec,
    ) -> Result<Arc<ParserEngine>> {
        // Another caller may have finished while we waited
        if let Some(engine) = self.loaded(fingerprint) {
            return Ok(engine);
        }

        if let Some(engine) = self.load_from_store(key, fingerprint)? {
            return Ok(engine);
        }

        let source = synthesize(key, baseline_source, spec)?;
        let engine = Arc::new(self.compile(key, &source)?);
        self.shared
            .engines
            .write()
            .insert(fingerprint.clone(), Arc::clone(&engine));
        log_info!("synthesized parser {} for `{}`", fingerprint.short(), key);

        self.persist_async(fingerprint.clone(), source);
        Ok(engine)
    }

    /// Step 2 of resolution; storage failures fall through to synthesis
    fn load_from_store(&self, key: &str, fingerprint: &Fingerprint) -> Result<Option<Arc<ParserEngine>>> {
        let shared = &self.shared;
        let found = {
            let _store = shared.store_lock.lock();
            shared.store.find(fingerprint)
        };
        let artifact = match found {
            Ok(Some(artifact)) => artifact,
            Ok(None) => return Ok(None),
            Err(e) => {
                log_warn!("cannot search artifact store: {}", e);
                return Ok(None);
            }
        };
        let source = match shared.store.read(&artifact) {
            Ok(source) => source,
            Err(e) => {
                log_warn!("cannot read artifact {}: {}", artifact.name, e);
                return Ok(None);
            }
        };

        match self.compile(key, &source) {
            Ok(engine) => {
                let engine = Arc::new(engine);
                shared
                    .engines
                    .write()
                    .insert(fingerprint.clone(), Arc::clone(&engine));
                log_debug!("loaded parser {} from {}", fingerprint.short(), artifact.name);
                Ok(Some(engine))
            }
            Err(e) => {
                // Never cache a failed fingerprint; the next resolution re-synthesizes
                let _store = shared.store_lock.lock();
                if let Err(delete_err) = shared.store.delete(&artifact.name) {
                    log_warn!("cannot delete broken artifact {}: {}", artifact.name, delete_err);
                }
                Err(e)
            }
        }
    }

    fn compile(&self, key: &str, source: &str) -> Result<ParserEngine> {
        self.compiler
            .compile(source)
            .map_err(|source| VariantError::Compile {
                key: key.to_string(),
                source,
            })
    }

    /// Write an artifact and enforce the resident limit off the calling thread
    fn persist_async(&self, fingerprint: Fingerprint, source: String) {
        let shared = Arc::clone(&self.shared);
        let policy = EvictionPolicy::new(self.config.read().effective_max_resident());
        let label = fingerprint.short().to_string();

        self.worker.spawn(&label, move || {
            let _store = shared.store_lock.lock();
            match shared.store.write(&fingerprint, &source) {
                Ok(artifact) => log_debug!("persisted parser {} as {}", fingerprint.short(), artifact.name),
                // The engine stays usable; it is re-synthesized next process start
                Err(e) => log_warn!("cannot persist parser {}: {}", fingerprint.short(), e),
            }
            let evicted = policy.enforce(&shared.store, |victim| {
                shared.engines.write().remove(victim).is_some()
            });
            if let Err(e) = evicted {
                log_warn!("eviction failed: {}", e);
            }
        });
    }

    fn loaded(&self, fingerprint: &Fingerprint) -> Option<Arc<ParserEngine>> {
        self.shared.engines.read().get(fingerprint).cloned()
    }

    fn miss_lock(&self, fingerprint: &Fingerprint) -> Arc<Mutex<()>> {
        Arc::clone(
            self.miss_locks
                .lock()
                .entry(fingerprint.clone())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    fn release_miss_lock(&self, fingerprint: &Fingerprint, lock: Arc<Mutex<()>>) {
        let mut locks = self.miss_locks.lock();
        // One reference in the map plus ours: nobody else is waiting
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(fingerprint);
        }
    }

    /// Engine of a baseline
    pub fn baseline(&self, which: Baseline) -> Arc<ParserEngine> {
        Arc::clone(self.baselines.read().get(which))
    }

    /// Whether the engine for `key` is in memory
    pub fn is_loaded(&self, key: &str) -> bool {
        self.shared
            .engines
            .read()
            .contains_key(&Fingerprint::of(key))
    }

    /// Number of engines in memory, baselines included
    pub fn loaded_count(&self) -> usize {
        self.shared.engines.read().len()
    }

    /// The artifact store
    pub fn store(&self) -> &ArtifactStore {
        &self.shared.store
    }

    /// Current configuration
    pub fn config(&self) -> CacheConfig {
        self.config.read().clone()
    }

    /// Switch test mode, which lifts the resident limit
    pub fn set_test_mode(&self, enabled: bool) {
        self.config.write().test_mode = enabled;
    }

    /// Drop every in-memory engine and bootstrap again
    ///
    /// Picks up template and store changes made underneath the process.
    pub fn reload(&self) -> Result<Reconciliation> {
        self.await_persistence();
        let config = self.config();
        let templates = BaselineTemplates::load_or_emit(
            &config.template_dir,
            &config.prefix,
            self.compiler.as_ref(),
        )?;
        self.shared.engines.write().clear();
        let (baselines, outcome) = bootstrap(&self.shared, &templates, self.compiler.as_ref())?;
        *self.templates.write() = templates;
        *self.baselines.write() = baselines;
        Ok(outcome)
    }

    /// Block until every background write has completed
    pub fn await_persistence(&self) {
        self.worker.drain();
    }

    /// Drain outstanding writes; the manager stays usable
    pub fn shutdown(&self) {
        self.await_persistence();
        log_debug!("parser cache shut down with {} engines loaded", self.loaded_count());
    }
}

/// Reconcile the store and compile every resident artifact
fn bootstrap(
    shared: &Shared,
    templates: &BaselineTemplates,
    compiler: &dyn GrammarCompiler,
) -> Result<(BaselineEngines, Reconciliation)> {
    let _store = shared.store_lock.lock();
    let outcome = reconcile(&shared.store, templates)?;

    let artifacts = shared.store.list()?;
    let mut engines = shared.engines.write();
    for (artifact, compiled) in compile_all(&shared.store, &artifacts, compiler) {
        match compiled {
            Ok(engine) => {
                engines.insert(artifact.fingerprint.clone(), Arc::new(engine));
            }
            Err(e) => {
                log_warn!("dropping unusable artifact {}: {}", artifact.name, e);
                if let Err(delete_err) = shared.store.delete(&artifact.name) {
                    log_warn!("cannot delete {}: {}", artifact.name, delete_err);
                }
            }
        }
    }

    let mut baseline_engine = |which: Baseline| -> Result<Arc<ParserEngine>> {
        if let Some(engine) = engines.get(which.fingerprint()) {
            return Ok(Arc::clone(engine));
        }
        let engine = compiler
            .compile(templates.source(which))
            .map_err(|source| VariantError::Compile {
                key: which.key().to_string(),
                source,
            })?;
        let engine = Arc::new(engine);
        engines.insert(which.fingerprint().clone(), Arc::clone(&engine));
        Ok(engine)
    };
    let baselines = BaselineEngines {
        init: baseline_engine(Baseline::Init)?,
        default: baseline_engine(Baseline::Default)?,
    };

    log_info!("loaded {} parsers from {}", engines.len(), shared.store.dir().display());
    Ok((baselines, outcome))
}

fn load_one(
    store: &ArtifactStore,
    artifact: &Artifact,
    compiler: &dyn GrammarCompiler,
) -> Result<ParserEngine> {
    let source = store.read(artifact)?;
    compiler
        .compile(&source)
        .map_err(|source: ParseError| VariantError::Compile {
            key: artifact.fingerprint.to_string(),
            source,
        })
}

#[cfg(feature = "rayon")]
fn compile_all<'a>(
    store: &ArtifactStore,
    artifacts: &'a [Artifact],
    compiler: &dyn GrammarCompiler,
) -> Vec<(&'a Artifact, Result<ParserEngine>)> {
    artifacts
        .par_iter()
        .map(|artifact| (artifact, load_one(store, artifact, compiler)))
        .collect()
}

#[cfg(not(feature = "rayon"))]
fn compile_all<'a>(
    store: &ArtifactStore,
    artifacts: &'a [Artifact],
    compiler: &dyn GrammarCompiler,
) -> Vec<(&'a Artifact, Result<ParserEngine>)> {
    artifacts
        .iter()
        .map(|artifact| (artifact, load_one(store, artifact, compiler)))
        .collect()
}

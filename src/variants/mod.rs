//! Specialized-parser cache
//!
//! Specializes the `default` baseline grammar into variants that recognize
//! extra identifiers, functions and builtin-package symbols, and caches the
//! compiled result in memory and on disk.
//!
//! # Module Organization
//!
//! - [`fingerprint`] - Key digests and the two reserved baselines
//! - [`customization`] - What a variant adds to the baseline
//! - [`baseline`] - Built-in baseline grammars and their templates
//! - [`synth`] - Rule-site patching of the `default` baseline
//! - [`store`] - Timestamped artifact files
//! - [`worker`] - Background persistence
//! - [`eviction`] - Resident-count limit
//! - [`reconcile`] - Startup staleness check
//! - [`manager`] - The [`ParserCacheManager`] facade

pub mod baseline;
pub mod config;
pub mod customization;
pub mod error;
pub mod eviction;
pub mod fingerprint;
pub mod manager;
pub mod reconcile;
pub mod store;
pub mod synth;
pub mod worker;

pub use baseline::{BaselineTemplates, Template};
pub use config::{CacheConfig, DEFAULT_MAX_RESIDENT, TEST_MODE_MAX_RESIDENT};
pub use customization::CustomizationSpec;
pub use error::{Result, VariantError};
pub use eviction::{EvictionPolicy, EvictionReport};
pub use fingerprint::{Baseline, Fingerprint};
pub use manager::ParserCacheManager;
pub use reconcile::Reconciliation;
pub use store::{Artifact, ArtifactStore};
pub use synth::synthesize;

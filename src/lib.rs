//! Parsanol Variants - specialized PEG parser cache
//!
//! Keeps many customized variants of one template grammar without
//! re-deriving or recompiling each of them on every process start.
//! It provides:
//! - A portable packrat PEG engine with a grammar DSL and JSON grammar source
//! - Rule-level synthesis of grammar variants from a baseline template
//! - A timestamped on-disk artifact store with background persistence
//! - Least-recently-modified eviction that never touches the baselines
//! - Startup reconciliation of the store against the baseline templates
//!
//! ## Quick Start
//!
//! ```rust
//! use parsanol_variants::prelude::*;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let manager = ParserCacheManager::new(CacheConfig::new(dir.path())).unwrap();
//!
//! let spec = CustomizationSpec::new().with_identifier("alpha").with_function("f");
//! let engine = manager.resolve("alpha-and-f", &spec).unwrap();
//! assert!(engine.matches("f(alpha)"));
//!
//! // Same key, same engine
//! let again = manager.resolve("alpha-and-f", &spec).unwrap();
//! assert!(std::sync::Arc::ptr_eq(&engine, &again));
//! manager.shutdown();
//! ```
//!
//! ## Using the Parser DSL
//!
//! ```rust
//! use parsanol_variants::portable::parser_dsl::*;
//! use parsanol_variants::portable::ParserEngine;
//!
//! let grammar = GrammarBuilder::new()
//!     .rule("greeting", str("hello").then(str("world")))
//!     .build();
//! assert!(ParserEngine::new(grammar).unwrap().matches("helloworld"));
//! ```
//!
//! ## Feature Flags
//!
//! - `logging` (default) - Log store, eviction and bootstrap events using the `log` crate
//! - `parallel` - Compile resident artifacts in parallel at bootstrap using rayon

// Lint configuration for production quality
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(clippy::all)]
#![allow(clippy::new_without_default)]

// Logging macros, textually scoped over every module below
#[macro_use]
mod logging;

// Prelude module for convenient imports
pub mod prelude;

// Grammar model, DSL and engine
pub mod portable;

// Variant synthesis and caching
pub mod variants;

/// Re-export commonly used types for convenience
pub use portable::{Grammar, GrammarCompiler, ParseError, ParserEngine, PortableCompiler};
pub use variants::{CacheConfig, CustomizationSpec, ParserCacheManager, VariantError};

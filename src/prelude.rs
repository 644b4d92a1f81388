//! Prelude module for convenient imports
//!
//! ```
//! use parsanol_variants::prelude::*;
//! ```
//!
//! # Re-exported Items
//!
//! ## Core Types
//! - [`Grammar`] - PEG grammar definition
//! - [`ParserEngine`] - Compiled parser
//! - [`ParseNode`] - Parse tree node
//! - [`ParseError`] - Parse error type
//!
//! ## Parser DSL
//! - [`str()`], [`re()`], [`ref_()`], [`seq()`], [`choice()`], [`dynamic()`]
//! - [`GrammarBuilder`], [`Parslet`], [`ParsletExt`]
//!
//! ## Variant Cache
//! - [`ParserCacheManager`] - Resolves keys to engines
//! - [`CacheConfig`] - Cache configuration
//! - [`CustomizationSpec`] - What a variant adds
//! - [`Fingerprint`], [`Baseline`]
//! - [`VariantError`] - Cache error type

pub use crate::portable::{
    parser_dsl::{choice, dynamic, re, ref_, seq, str, GrammarBuilder, Parslet, ParsletExt},
    Grammar, GrammarCompiler, ParseError, ParseNode, ParserConfig, ParserEngine, PortableCompiler,
};

pub use crate::variants::{
    Baseline, CacheConfig, CustomizationSpec, Fingerprint, ParserCacheManager, VariantError,
};

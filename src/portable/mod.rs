//! Portable grammar core
//!
//! The pure Rust grammar model, builder DSL and packrat engine that the
//! variant cache compiles its source text with.
//!
//! # Module Organization
//!
//! ## Core Types
//! - [`Grammar`] - PEG grammar definition (and its JSON source text)
//! - [`ParserEngine`] - Compiled, shareable parser
//! - [`ParseNode`] - Parse tree node
//!
//! ## Parser DSL
//! - [`parser_dsl`] - Parser combinator DSL, including in-place rule edits
//!
//! ## Compilation
//! - [`GrammarCompiler`] - Source text to engine
//! - [`PortableCompiler`] - The built-in compiler

// ============================================================================
// Module Declarations
// ============================================================================

pub mod ast;
pub mod compiler;
pub mod grammar;
pub mod parser;
pub mod parser_dsl;

// ============================================================================
// Core Types
// ============================================================================

pub use ast::{ParseError, ParseNode, ParseResult};
pub use compiler::{GrammarCompiler, PortableCompiler};
pub use grammar::{Atom, Grammar};
pub use parser::{ParserConfig, ParserEngine};

// ============================================================================
// Parser DSL
// ============================================================================

pub use parser_dsl::{GrammarBuilder, Parslet, ParsletExt};

//! Source-to-engine compilation
//!
//! The variant cache never builds engines directly. It hands grammar source
//! text to a [`GrammarCompiler`], which lets callers substitute their own
//! toolchain (or instrument compilation in tests).

use super::ast::ParseError;
use super::grammar::Grammar;
use super::parser::{ParserConfig, ParserEngine};

/// Turns grammar source text into a runnable engine
pub trait GrammarCompiler: Send + Sync {
    /// Compile source text into an engine
    fn compile(&self, source: &str) -> Result<ParserEngine, ParseError>;

    /// Emit the source text for a grammar under the given name
    fn emit_source(&self, grammar: &Grammar, name: &str) -> Result<String, ParseError> {
        let mut named = grammar.clone();
        named.name = name.to_string();
        named.to_source().map_err(|e| ParseError::InvalidGrammar {
            reason: format!("cannot emit grammar source: {}", e),
        })
    }
}

/// The built-in compiler for JSON grammar source
#[derive(Debug, Clone, Copy, Default)]
pub struct PortableCompiler {
    config: ParserConfig,
}

impl PortableCompiler {
    /// Compiler producing engines with default limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiler producing engines with the given limits
    pub fn with_config(config: ParserConfig) -> Self {
        Self { config }
    }
}

impl GrammarCompiler for PortableCompiler {
    fn compile(&self, source: &str) -> Result<ParserEngine, ParseError> {
        let grammar = Grammar::from_source(source)?;
        ParserEngine::with_config(grammar, self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portable::parser_dsl::*;

    #[test]
    fn test_emit_then_compile() {
        let grammar = GrammarBuilder::new().rule("digits", re("[0-9]+")).build();
        let compiler = PortableCompiler::new();
        let source = compiler.emit_source(&grammar, "numbers").unwrap();
        let engine = compiler.compile(&source).unwrap();
        assert_eq!(engine.name(), "numbers");
        assert!(engine.matches("123"));
        assert!(!engine.matches("12a"));
    }

    #[test]
    fn test_compile_garbage() {
        assert!(PortableCompiler::new().compile("not a grammar").is_err());
    }
}

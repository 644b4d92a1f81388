//! Customization requests
//!
//! A [`CustomizationSpec`] says which extensions a grammar variant carries.
//! Callers usually hand it over as an "extras" JSON object:
//!
//! ```json
//! { "ids": ["alpha", "beta"], "funcs": ["f", "g"], "pkg": ["sin", "e"] }
//! ```
//!
//! The reserved constant `e` is not a package symbol; listing it under
//! `pkg` turns on [`CustomizationSpec::constant_enabled`] instead.

use super::error::Result;
use serde::Deserialize;
use std::collections::BTreeSet;

/// The reserved mathematical constant
pub const RESERVED_CONSTANT: &str = "e";

/// Extensions applied to the `default` baseline grammar
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "RawExtras")]
pub struct CustomizationSpec {
    /// Regex patterns recognized as distinguished constant-like identifiers
    pub identifier_patterns: Vec<String>,

    /// Regex patterns accepted as custom function names
    pub function_names: Vec<String>,

    /// Builtin package symbols, each naming a sub-rule of the baseline
    pub builtin_package_symbols: BTreeSet<String>,

    /// Whether the reserved constant is recognized
    pub constant_enabled: bool,
}

/// Wire form of the extras object
#[derive(Deserialize)]
struct RawExtras {
    #[serde(default)]
    ids: Vec<String>,
    #[serde(default)]
    funcs: Vec<String>,
    #[serde(default)]
    pkg: Vec<String>,
}

impl From<RawExtras> for CustomizationSpec {
    fn from(raw: RawExtras) -> Self {
        let mut spec = CustomizationSpec {
            identifier_patterns: raw.ids,
            function_names: raw.funcs,
            ..Default::default()
        };
        for symbol in raw.pkg {
            spec = spec.with_package_symbol(symbol);
        }
        spec
    }
}

impl CustomizationSpec {
    /// An empty spec; synthesizing it reproduces the baseline behavior
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a caller's extras JSON object
    pub fn from_extra_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Add a custom identifier pattern
    pub fn with_identifier(mut self, pattern: impl Into<String>) -> Self {
        self.identifier_patterns.push(pattern.into());
        self
    }

    /// Add a custom function-name pattern
    pub fn with_function(mut self, pattern: impl Into<String>) -> Self {
        self.function_names.push(pattern.into());
        self
    }

    /// Add a builtin package symbol; the reserved constant enables it instead
    pub fn with_package_symbol(mut self, symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        if symbol == RESERVED_CONSTANT {
            self.constant_enabled = true;
        } else {
            self.builtin_package_symbols.insert(symbol);
        }
        self
    }

    /// Enable or disable the reserved constant
    pub fn with_constant(mut self, enabled: bool) -> Self {
        self.constant_enabled = enabled;
        self
    }

    /// Whether this spec leaves every rule site untouched
    pub fn is_empty(&self) -> bool {
        self.identifier_patterns.is_empty()
            && self.function_names.is_empty()
            && self.builtin_package_symbols.is_empty()
            && !self.constant_enabled
    }

    /// Stable key string for callers without a key of their own
    ///
    /// Equal specs give equal keys. The constant is folded back into `pkg`.
    pub fn canonical_key(&self) -> String {
        let mut pkg: Vec<&str> = self
            .builtin_package_symbols
            .iter()
            .map(String::as_str)
            .collect();
        if self.constant_enabled {
            pkg.push(RESERVED_CONSTANT);
            pkg.sort_unstable();
        }
        serde_json::json!({
            "ids": self.identifier_patterns,
            "funcs": self.function_names,
            "pkg": pkg,
        })
        .to_string()
    }
}

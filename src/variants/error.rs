//! Errors raised while resolving grammar variants

use crate::portable::ParseError;
use std::path::PathBuf;

/// Result alias for the variant cache
pub type Result<T> = std::result::Result<T, VariantError>;

/// Errors produced by synthesis, compilation and the artifact store
#[derive(Debug, thiserror::Error)]
pub enum VariantError {
    /// A canonical rule body the synthesizer patches is missing or different
    #[error("schema drift resolving `{key}`: rule site `{site}` {reason}")]
    SchemaDrift {
        /// Customization key being resolved
        key: String,
        /// Name of the rule site that failed to match
        site: &'static str,
        /// What was wrong with the site
        reason: String,
    },

    /// A builtin-package symbol has no sub-rule in the baseline
    #[error("unknown builtin package symbol `{symbol}` in `{key}`")]
    UnknownPackageSymbol {
        /// Customization key being resolved
        key: String,
        /// The offending symbol
        symbol: String,
    },

    /// The compiler rejected synthesized or loaded source
    #[error("failed to compile parser for `{key}`: {source}")]
    Compile {
        /// Customization key being resolved
        key: String,
        /// Compiler error
        #[source]
        source: ParseError,
    },

    /// Artifact store I/O failure
    #[error("storage error at {}: {source}", path.display())]
    Storage {
        /// File or directory involved
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// No template exists for a baseline
    #[error("missing `{which}` baseline template in {}", dir.display())]
    MissingBaseline {
        /// Baseline key (`init` or `default`)
        which: &'static str,
        /// Directory that was searched
        dir: PathBuf,
    },

    /// Customization extras could not be decoded
    #[error("invalid customization data: {0}")]
    InvalidCustomization(#[from] serde_json::Error),

    /// No home directory for the default cache location
    #[error("failed to determine home directory for default cache path")]
    MissingHomeDir,
}

impl VariantError {
    /// Wrap an I/O error with the path it concerns
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        VariantError::Storage {
            path: path.into(),
            source,
        }
    }

    /// Whether this error signals a baseline and synthesizer out of sync
    pub fn is_schema_drift(&self) -> bool {
        matches!(
            self,
            VariantError::SchemaDrift { .. } | VariantError::UnknownPackageSymbol { .. }
        )
    }
}

//! Customization key fingerprints and the two reserved baselines

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::OnceLock;

/// Key of the `init` baseline
pub const INIT_KEY: &str = "init";

/// Key of the `default` baseline
pub const DEFAULT_KEY: &str = "default";

/// Length of a fingerprint in hex characters
pub const FINGERPRINT_HEX_LEN: usize = 64;

/// A stable SHA-256 fingerprint stored as a lowercase hex string.
///
/// Deserialization goes through [`Fingerprint::from_hex`], so every value
/// holds a full digest.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint of a customization key.
    pub fn of(key: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    /// Accepts exactly 64 lowercase hex characters.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let valid = hex.len() == FINGERPRINT_HEX_LEN
            && hex.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        valid.then(|| Self(hex.to_string()))
    }

    /// The hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }

    /// Whether this is one of the reserved baseline fingerprints.
    pub fn is_baseline(&self) -> bool {
        Baseline::from_fingerprint(self).is_some()
    }
}

impl TryFrom<String> for Fingerprint {
    type Error = String;

    fn try_from(hex: String) -> Result<Self, Self::Error> {
        Self::from_hex(&hex).ok_or_else(|| format!("`{}` is not a SHA-256 hex digest", hex))
    }
}

impl From<Fingerprint> for String {
    fn from(fingerprint: Fingerprint) -> Self {
        fingerprint.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The two permanently resident variants
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Baseline {
    /// Definition-block grammar
    Init,
    /// Expression grammar that user variants are synthesized from
    Default,
}

impl Baseline {
    /// Both baselines, `init` first
    pub const ALL: [Baseline; 2] = [Baseline::Init, Baseline::Default];

    /// The reserved customization key
    pub fn key(self) -> &'static str {
        match self {
            Baseline::Init => INIT_KEY,
            Baseline::Default => DEFAULT_KEY,
        }
    }

    /// The reserved fingerprint, computed once per process
    pub fn fingerprint(self) -> &'static Fingerprint {
        static INIT: OnceLock<Fingerprint> = OnceLock::new();
        static DEFAULT: OnceLock<Fingerprint> = OnceLock::new();
        match self {
            Baseline::Init => INIT.get_or_init(|| Fingerprint::of(INIT_KEY)),
            Baseline::Default => DEFAULT.get_or_init(|| Fingerprint::of(DEFAULT_KEY)),
        }
    }

    /// Baseline reserved under `key`
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.key() == key)
    }

    /// Baseline whose reserved fingerprint is `fingerprint`
    pub fn from_fingerprint(fingerprint: &Fingerprint) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|b| b.fingerprint() == fingerprint)
    }
}

impl fmt::Display for Baseline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

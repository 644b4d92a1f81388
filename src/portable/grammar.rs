//! Grammar model
//!
//! This module defines the in-memory representation of grammars. A grammar
//! is a flat table of atoms plus a map of named rules into that table.
//! Grammars round-trip through JSON, and that JSON is the *source text*
//! that the variant cache persists, patches and recompiles.

use crate::portable::ast::ParseError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Maximum nesting rendered by [`Grammar::render_atom`] before giving up
const MAX_RENDER_DEPTH: usize = 256;

/// One node of a grammar's atom table
///
/// Children are referenced by index into [`Grammar::atoms`]; the serialized
/// form of this enum is part of the emitted source text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Atom {
    /// Exact text
    Str {
        /// Text to match
        pattern: String,
    },

    /// Regex anchored at the current position
    Re {
        /// Regex source, without anchors
        pattern: String,
    },

    /// Every child, in order
    Sequence {
        /// Children
        atoms: Vec<usize>,
    },

    /// First child that matches
    Alternative {
        /// Children, in priority order
        atoms: Vec<usize>,
    },

    /// Greedy repetition
    Repetition {
        /// Repeated atom
        atom: usize,
        /// Fewest matches accepted
        min: usize,
        /// Most matches taken; `None` is unbounded
        max: Option<usize>,
    },

    /// Capture under a name
    Named {
        /// Capture name
        name: String,
        /// Captured atom
        atom: usize,
    },

    /// Call of a rule body
    Entity {
        /// Rule body
        atom: usize,
    },

    /// Zero-width check
    Lookahead {
        /// Checked atom
        atom: usize,
        /// `true` to require a match, `false` to forbid one
        positive: bool,
    },

    /// Match and drop the capture
    Ignore {
        /// Matched atom
        atom: usize,
    },
}

impl Atom {
    /// Indices of the atoms this atom refers to
    pub fn children(&self) -> Vec<usize> {
        match self {
            Atom::Str { .. } | Atom::Re { .. } => Vec::new(),
            Atom::Sequence { atoms } | Atom::Alternative { atoms } => atoms.clone(),
            Atom::Repetition { atom, .. }
            | Atom::Named { atom, .. }
            | Atom::Entity { atom }
            | Atom::Lookahead { atom, .. }
            | Atom::Ignore { atom } => vec![*atom],
        }
    }
}

/// Atom table, rule map and root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grammar {
    /// Grammar name, carried into emitted source
    #[serde(default)]
    pub name: String,

    /// Atom table
    pub atoms: Vec<Atom>,

    /// Named rules and the atom index of each rule body
    #[serde(default)]
    pub rules: BTreeMap<String, usize>,

    /// Atom a whole-input parse starts from
    pub root: usize,
}

impl Grammar {
    /// Empty grammar
    pub fn new() -> Self {
        Self {
            name: String::new(),
            atoms: Vec::new(),
            rules: BTreeMap::new(),
            root: 0,
        }
    }

    /// Append an atom, returning its index
    pub fn add_atom(&mut self, atom: Atom) -> usize {
        self.atoms.push(atom);
        self.atoms.len() - 1
    }

    /// Atom at `idx`
    #[inline]
    pub fn get_atom(&self, idx: usize) -> Option<&Atom> {
        self.atoms.get(idx)
    }

    /// Size of the atom table
    #[inline]
    pub fn atom_count(&self) -> usize {
        self.atoms.len()
    }

    /// Atom index of a named rule
    #[inline]
    pub fn rule(&self, name: &str) -> Option<usize> {
        self.rules.get(name).copied()
    }

    /// Emit the canonical source text of this grammar
    ///
    /// The output is pretty-printed JSON. Rules are kept in a sorted map, so
    /// emitting the same grammar twice yields byte-identical text.
    pub fn to_source(&self) -> Result<String, serde_json::Error> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        Ok(text)
    }

    /// Parse source text produced by [`to_source`](Self::to_source)
    pub fn from_source(source: &str) -> Result<Self, ParseError> {
        serde_json::from_str(source).map_err(|e| ParseError::InvalidGrammar {
            reason: format!("malformed grammar source: {}", e),
        })
    }

    /// Check that every atom, rule and root index points inside the atom table
    pub fn validate(&self) -> Result<(), ParseError> {
        let len = self.atoms.len();
        if self.root >= len {
            return Err(ParseError::InvalidGrammar {
                reason: format!("root atom {} out of range ({} atoms)", self.root, len),
            });
        }
        for (name, &idx) in &self.rules {
            if idx >= len {
                return Err(ParseError::InvalidGrammar {
                    reason: format!("rule `{}` points at missing atom {}", name, idx),
                });
            }
        }
        for (idx, atom) in self.atoms.iter().enumerate() {
            if let Some(child) = atom.children().into_iter().find(|&c| c >= len) {
                return Err(ParseError::InvalidGrammar {
                    reason: format!("atom {} refers to missing atom {}", idx, child),
                });
            }
        }
        Ok(())
    }

    /// Render the body of a named rule in canonical form
    ///
    /// Rule references render as `@name` and are not expanded, so the result
    /// describes exactly one rule. Returns `None` for an unknown rule.
    ///
    /// # Example
    ///
    /// ```
    /// use parsanol_variants::portable::parser_dsl::{GrammarBuilder, ParsletExt, ref_, str};
    ///
    /// let grammar = GrammarBuilder::new()
    ///     .rule("greeting", str("hello").then(ref_("name")))
    ///     .rule("name", str("world"))
    ///     .build();
    ///
    /// assert_eq!(
    ///     grammar.render_rule("greeting").as_deref(),
    ///     Some(r#"seq("hello", @name)"#)
    /// );
    /// ```
    pub fn render_rule(&self, name: &str) -> Option<String> {
        let idx = self.rule(name)?;
        Some(self.render_atom(idx))
    }

    /// Render a single atom (and its non-reference children) in canonical form
    pub fn render_atom(&self, idx: usize) -> String {
        let rule_names: HashMap<usize, &str> = self
            .rules
            .iter()
            .rev()
            .map(|(name, &idx)| (idx, name.as_str()))
            .collect();
        let mut out = String::new();
        self.render_into(idx, &rule_names, 0, &mut out);
        out
    }

    fn render_into(
        &self,
        idx: usize,
        rule_names: &HashMap<usize, &str>,
        depth: usize,
        out: &mut String,
    ) {
        if depth > MAX_RENDER_DEPTH {
            out.push_str("...");
            return;
        }
        let Some(atom) = self.atoms.get(idx) else {
            out.push_str(&format!("#{}?", idx));
            return;
        };

        let list = |out: &mut String, head: &str, items: &[usize]| {
            out.push_str(head);
            out.push('(');
            for (i, &child) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                self.render_into(child, rule_names, depth + 1, out);
            }
            out.push(')');
        };

        match atom {
            Atom::Str { pattern } => out.push_str(&format!("{:?}", pattern)),
            Atom::Re { pattern } => out.push_str(&format!("re({:?})", pattern)),
            Atom::Sequence { atoms } => list(out, "seq", atoms),
            Atom::Alternative { atoms } => list(out, "choice", atoms),
            Atom::Repetition { atom, min, max } => {
                out.push_str("rep(");
                self.render_into(*atom, rule_names, depth + 1, out);
                match max {
                    Some(max) => out.push_str(&format!(", {}, {})", min, max)),
                    None => out.push_str(&format!(", {}, *)", min)),
                }
            }
            Atom::Named { name, atom } => {
                out.push_str(&format!("label({:?}, ", name));
                self.render_into(*atom, rule_names, depth + 1, out);
                out.push(')');
            }
            Atom::Entity { atom } => match rule_names.get(atom) {
                Some(name) => out.push_str(&format!("@{}", name)),
                None => out.push_str(&format!("@#{}", atom)),
            },
            Atom::Lookahead { atom, positive } => {
                out.push_str(if *positive { "ahead(" } else { "not(" });
                self.render_into(*atom, rule_names, depth + 1, out);
                out.push(')');
            }
            Atom::Ignore { atom } => {
                out.push_str("ignore(");
                self.render_into(*atom, rule_names, depth + 1, out);
                out.push(')');
            }
        }
    }
}

impl Default for Grammar {
    fn default() -> Self {
        Self::new()
    }
}

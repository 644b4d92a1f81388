//! Parser DSL for building grammars
//!
//! Combinators lower themselves into atoms of a [`GrammarBuilder`]. A builder
//! opened over an existing grammar can also swap rule bodies in place, which
//! is how variants are derived from a baseline.
//!
//! # Example
//!
//! ```rust
//! use parsanol_variants::portable::parser_dsl::*;
//!
//! let grammar = GrammarBuilder::new()
//!     .rule("greeting", str("hello").then(str("world")))
//!     .build();
//! assert_eq!(grammar.render_rule("greeting").as_deref(), Some(r#"seq("hello", "world")"#));
//! ```

use super::ast::ParseError;
use super::grammar::{Atom, Grammar};
use std::collections::BTreeMap;

/// Anything that can lower itself into grammar atoms
pub trait Parslet: Send + Sync {
    /// Push this parslet's atoms and return the index of its top atom
    fn build(self, builder: &mut GrammarBuilder) -> usize;
}

/// Accumulates atoms and rules into a [`Grammar`]
pub struct GrammarBuilder {
    name: String,
    atoms: Vec<Atom>,
    rules: BTreeMap<String, usize>,
    /// Entity atoms waiting for their rule to be defined
    unresolved: BTreeMap<usize, String>,
    /// First rule defined; becomes the root of a fresh grammar
    root_rule: Option<String>,
    /// Root of the grammar this builder was opened over
    root: Option<usize>,
}

impl GrammarBuilder {
    /// Empty builder
    pub fn new() -> Self {
        Self {
            name: String::new(),
            atoms: Vec::new(),
            rules: BTreeMap::new(),
            unresolved: BTreeMap::new(),
            root_rule: None,
            root: None,
        }
    }

    /// Open an existing grammar for editing
    ///
    /// Atoms, rules and root are taken over unchanged, so atom indices stay
    /// valid across edits.
    pub fn from_grammar(grammar: Grammar) -> Self {
        Self {
            name: grammar.name,
            atoms: grammar.atoms,
            rules: grammar.rules,
            unresolved: BTreeMap::new(),
            root_rule: None,
            root: Some(grammar.root),
        }
    }

    /// Set the grammar name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Define a rule
    pub fn rule(mut self, name: &str, parslet: impl Parslet) -> Self {
        self.rule_mut(name, parslet);
        self
    }

    /// Define a rule through a mutable reference
    pub fn rule_mut(&mut self, name: &str, parslet: impl Parslet) -> &mut Self {
        let top = parslet.build(self);
        self.rules.insert(name.to_string(), top);
        self.root_rule.get_or_insert_with(|| name.to_string());
        self
    }

    /// Replace the body of an existing rule in place
    ///
    /// The new body moves into the rule's own atom slot, so entities that
    /// already point at the rule see the replacement. Returns `false` when
    /// the rule does not exist.
    pub fn replace_rule(&mut self, name: &str, parslet: impl Parslet) -> bool {
        let Some(&slot) = self.rules.get(name) else {
            return false;
        };

        let top = parslet.build(self);
        // Children are pushed before their parent, so `top` is the last atom
        debug_assert_eq!(top + 1, self.atoms.len());
        let Some(body) = self.atoms.pop() else {
            return false;
        };
        self.atoms[slot] = body;
        if let Some(target) = self.unresolved.remove(&top) {
            self.unresolved.insert(slot, target);
        }
        true
    }

    fn push(&mut self, atom: Atom) -> usize {
        self.atoms.push(atom);
        self.atoms.len() - 1
    }

    fn forward(&mut self, rule: String) -> usize {
        let idx = self.push(Atom::Entity { atom: 0 });
        self.unresolved.insert(idx, rule);
        idx
    }

    /// Referenced rule names that are still undefined, sorted
    pub fn unresolved_refs(&self) -> Vec<String> {
        let mut missing: Vec<String> = self
            .unresolved
            .values()
            .filter(|name| !self.rules.contains_key(*name))
            .cloned()
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }

    /// Build, failing if any reference is still undefined
    pub fn try_build(self) -> Result<Grammar, ParseError> {
        let missing = self.unresolved_refs();
        if !missing.is_empty() {
            return Err(ParseError::InvalidGrammar {
                reason: format!("unresolved rule references: {}", missing.join(", ")),
            });
        }
        Ok(self.build())
    }

    /// Build, leaving undefined references pointing at atom 0
    pub fn build(self) -> Grammar {
        let GrammarBuilder {
            name,
            mut atoms,
            rules,
            unresolved,
            root_rule,
            root,
        } = self;

        for (idx, rule) in unresolved {
            if let (Some(Atom::Entity { atom }), Some(&target)) =
                (atoms.get_mut(idx), rules.get(&rule))
            {
                *atom = target;
            }
        }
        let root = root
            .or_else(|| root_rule.and_then(|rule| rules.get(&rule).copied()))
            .unwrap_or(0);

        Grammar {
            name,
            atoms,
            rules,
            root,
        }
    }
}

impl Default for GrammarBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Terminals
// ============================================================================

/// Literal, regex or rule reference
#[derive(Clone, Debug)]
pub enum Leaf {
    /// Exact text
    Literal(String),
    /// Regex anchored at the current position
    Pattern(String),
    /// Another rule, possibly defined later
    Rule(String),
}

impl Parslet for Leaf {
    fn build(self, builder: &mut GrammarBuilder) -> usize {
        match self {
            Leaf::Literal(pattern) => builder.push(Atom::Str { pattern }),
            Leaf::Pattern(pattern) => builder.push(Atom::Re { pattern }),
            Leaf::Rule(rule) => builder.forward(rule),
        }
    }
}

// ============================================================================
// Wrappers
// ============================================================================

#[derive(Clone, Debug)]
enum Wrap {
    Repeat { min: usize, max: Option<usize> },
    Label(String),
    Ahead { positive: bool },
    Ignore,
}

/// A parslet under a single-child operator
#[derive(Clone)]
pub struct Wrapped<P> {
    inner: P,
    wrap: Wrap,
}

fn wrapped<P>(inner: P, wrap: Wrap) -> Wrapped<P> {
    Wrapped { inner, wrap }
}

impl<P: Parslet> Parslet for Wrapped<P> {
    fn build(self, builder: &mut GrammarBuilder) -> usize {
        let atom = self.inner.build(builder);
        builder.push(match self.wrap {
            Wrap::Repeat { min, max } => Atom::Repetition { atom, min, max },
            Wrap::Label(name) => Atom::Named { name, atom },
            Wrap::Ahead { positive } => Atom::Lookahead { atom, positive },
            Wrap::Ignore => Atom::Ignore { atom },
        })
    }
}

// ============================================================================
// Sequences and choices
// ============================================================================

/// Whether parts must all match in order or the first match wins
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JoinKind {
    /// All parts, in order
    Sequence,
    /// First part that matches
    Choice,
}

impl JoinKind {
    fn atom(self, atoms: Vec<usize>) -> Atom {
        match self {
            JoinKind::Sequence => Atom::Sequence { atoms },
            JoinKind::Choice => Atom::Alternative { atoms },
        }
    }
}

/// Two parslets of different types, joined
#[derive(Clone)]
pub struct Pair<A, B> {
    first: A,
    second: B,
    kind: JoinKind,
}

impl<A: Parslet, B: Parslet> Parslet for Pair<A, B> {
    fn build(self, builder: &mut GrammarBuilder) -> usize {
        let atoms = vec![self.first.build(builder), self.second.build(builder)];
        builder.push(self.kind.atom(atoms))
    }
}

/// Any number of parslets of one type, joined
#[derive(Clone)]
pub struct Joined<P> {
    parts: Vec<P>,
    kind: JoinKind,
}

impl<P: Parslet> Parslet for Joined<P> {
    fn build(self, builder: &mut GrammarBuilder) -> usize {
        let atoms = self.parts.into_iter().map(|p| p.build(builder)).collect();
        builder.push(self.kind.atom(atoms))
    }
}

// ============================================================================
// Type erasure
// ============================================================================

/// Object-safe form of [`Parslet`]
pub trait DynParslet: Send + Sync {
    /// Lower a boxed parslet
    fn build_boxed(self: Box<Self>, builder: &mut GrammarBuilder) -> usize;
}

impl<P: Parslet + 'static> DynParslet for P {
    fn build_boxed(self: Box<Self>, builder: &mut GrammarBuilder) -> usize {
        (*self).build(builder)
    }
}

/// Boxed parslet, for mixing types in one [`seq`] or [`choice`]
pub struct Dynamic(Box<dyn DynParslet>);

impl Parslet for Dynamic {
    fn build(self, builder: &mut GrammarBuilder) -> usize {
        self.0.build_boxed(builder)
    }
}

/// Box a parslet
pub fn dynamic<P: Parslet + 'static>(p: P) -> Dynamic {
    Dynamic(Box::new(p))
}

// ============================================================================
// Combinator methods
// ============================================================================

/// Combinator methods available on every parslet
pub trait ParsletExt: Parslet + Sized {
    /// Capture the match under `name`
    fn label(self, name: &str) -> Wrapped<Self> {
        wrapped(self, Wrap::Label(name.to_string()))
    }

    /// Between `min` and `max` matches; `None` is unbounded
    fn repeat(self, min: usize, max: Option<usize>) -> Wrapped<Self> {
        wrapped(self, Wrap::Repeat { min, max })
    }

    /// Zero or more
    fn many(self) -> Wrapped<Self> {
        self.repeat(0, None)
    }

    /// One or more
    fn many1(self) -> Wrapped<Self> {
        self.repeat(1, None)
    }

    /// Zero or one
    fn optional(self) -> Wrapped<Self> {
        self.repeat(0, Some(1))
    }

    /// Succeed without consuming if this matches
    fn lookahead(self) -> Wrapped<Self> {
        wrapped(self, Wrap::Ahead { positive: true })
    }

    /// Succeed without consuming if this does not match
    fn not_ahead(self) -> Wrapped<Self> {
        wrapped(self, Wrap::Ahead { positive: false })
    }

    /// This, then `other`
    fn then<B: Parslet>(self, other: B) -> Pair<Self, B> {
        Pair {
            first: self,
            second: other,
            kind: JoinKind::Sequence,
        }
    }

    /// This, or else `other`
    fn or<B: Parslet>(self, other: B) -> Pair<Self, B> {
        Pair {
            first: self,
            second: other,
            kind: JoinKind::Choice,
        }
    }

    /// Match but capture nothing
    fn ignore(self) -> Wrapped<Self> {
        wrapped(self, Wrap::Ignore)
    }
}

impl<T: Parslet> ParsletExt for T {}

// ============================================================================
// Constructors
// ============================================================================

/// Exact text
pub fn str(s: impl Into<String>) -> Leaf {
    Leaf::Literal(s.into())
}

/// Regex, anchored at the current position
pub fn re(pattern: impl Into<String>) -> Leaf {
    Leaf::Pattern(pattern.into())
}

/// Reference to a rule, which may be defined later
pub fn ref_(name: impl Into<String>) -> Leaf {
    Leaf::Rule(name.into())
}

/// Never matches; renders as `not("")`
pub fn never() -> Wrapped<Leaf> {
    str("").not_ahead()
}

/// All of `items`, in order
pub fn seq<I, P>(items: I) -> Joined<P>
where
    I: IntoIterator<Item = P>,
{
    Joined {
        parts: items.into_iter().collect(),
        kind: JoinKind::Sequence,
    }
}

/// First of `items` that matches
pub fn choice<I, P>(items: I) -> Joined<P>
where
    I: IntoIterator<Item = P>,
{
    Joined {
        parts: items.into_iter().collect(),
        kind: JoinKind::Choice,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_rule_is_root() {
        let grammar = GrammarBuilder::new()
            .rule("a", str("x"))
            .rule("b", str("y"))
            .build();
        assert_eq!(Some(grammar.root), grammar.rule("a"));
    }

    #[test]
    fn test_forward_reference_resolved() {
        let grammar = GrammarBuilder::new()
            .rule("top", ref_("leaf").many1())
            .rule("leaf", re("[a-z]"))
            .build();
        assert_eq!(
            grammar.render_rule("top").as_deref(),
            Some("rep(@leaf, 1, *)")
        );
    }

    #[test]
    fn test_replace_rule_keeps_slot_and_references() {
        let grammar = GrammarBuilder::new()
            .rule("top", seq(vec![dynamic(ref_("word")), dynamic(str("!"))]))
            .rule("word", str("hi"))
            .rule("other", str("yo"))
            .build();
        let slot = grammar.rule("word");

        let mut builder = GrammarBuilder::from_grammar(grammar);
        assert!(builder.replace_rule("word", str("hi").or(ref_("other"))));
        let edited = builder.try_build().unwrap();

        assert_eq!(edited.rule("word"), slot);
        assert_eq!(
            edited.render_rule("word").as_deref(),
            Some(r#"choice("hi", @other)"#)
        );
        assert_eq!(
            edited.render_rule("top").as_deref(),
            Some(r#"seq(@word, "!")"#)
        );
    }

    #[test]
    fn test_replace_rule_with_bare_reference() {
        let grammar = GrammarBuilder::new()
            .rule("top", ref_("a"))
            .rule("a", str("a"))
            .rule("b", str("b"))
            .build();
        let mut builder = GrammarBuilder::from_grammar(grammar);
        assert!(builder.replace_rule("top", ref_("b")));
        let edited = builder.try_build().unwrap();
        assert_eq!(edited.render_rule("top").as_deref(), Some("@b"));
    }

    #[test]
    fn test_replace_unknown_rule() {
        let mut builder = GrammarBuilder::from_grammar(Grammar::new());
        assert!(!builder.replace_rule("nope", str("x")));
    }

    #[test]
    fn test_unresolved_reference_fails_try_build() {
        let builder = GrammarBuilder::new().rule("top", ref_("ghost"));
        assert_eq!(builder.unresolved_refs(), vec!["ghost".to_string()]);
        assert!(builder.try_build().is_err());
    }

    #[test]
    fn test_never_renders_as_sentinel() {
        let grammar = GrammarBuilder::new().rule("nothing", never()).build();
        assert_eq!(
            grammar.render_rule("nothing").as_deref(),
            Some(r#"not("")"#)
        );
    }

    #[test]
    fn test_wrappers_render() {
        let grammar = GrammarBuilder::new()
            .rule("top", str("a").optional().label("x").ignore())
            .build();
        assert_eq!(
            grammar.render_rule("top").as_deref(),
            Some(r#"ignore(label("x", rep("a", 0, 1)))"#)
        );
    }
}

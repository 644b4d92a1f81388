//! Packrat parser engine
//!
//! A [`ParserEngine`] is a grammar with its regular expressions compiled
//! up front. It is immutable after construction and can be shared across
//! threads; each parse call builds its own memo table.

use super::ast::{ParseError, ParseNode, ParseResult};
use super::grammar::{Atom, Grammar};
use hashbrown::HashMap;
use regex::Regex;

/// Default maximum input size (10 MB)
pub const DEFAULT_MAX_INPUT_SIZE: usize = 10 * 1024 * 1024;

/// Default limit on nested atom evaluations
///
/// Every level costs a few native stack frames, so this stays well inside
/// a 2 MB thread stack even in unoptimized builds.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 256;

/// Resource limits applied to every parse
///
/// # Example
///
/// ```
/// use parsanol_variants::portable::ParserConfig;
///
/// let config = ParserConfig::new()
///     .with_max_input_size(1024)
///     .with_max_recursion_depth(64);
/// assert_eq!(config.max_recursion_depth, 64);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ParserConfig {
    /// Longest input accepted, in bytes
    pub max_input_size: usize,

    /// Deepest nesting of atom evaluations
    pub max_recursion_depth: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_input_size: DEFAULT_MAX_INPUT_SIZE,
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
        }
    }
}

impl ParserConfig {
    /// Default limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the input size limit
    pub fn with_max_input_size(mut self, size: usize) -> Self {
        self.max_input_size = size;
        self
    }

    /// Override the nesting limit
    pub fn with_max_recursion_depth(mut self, depth: usize) -> Self {
        self.max_recursion_depth = depth;
        self
    }
}

/// A compiled, ready-to-run grammar
#[derive(Debug)]
pub struct ParserEngine {
    grammar: Grammar,
    /// Anchored regex per atom; `None` for non-regex atoms
    regexes: Vec<Option<Regex>>,
    config: ParserConfig,
}

impl ParserEngine {
    /// Compile a grammar with default limits
    pub fn new(grammar: Grammar) -> Result<Self, ParseError> {
        Self::with_config(grammar, ParserConfig::default())
    }

    /// Compile a grammar with explicit limits
    pub fn with_config(grammar: Grammar, config: ParserConfig) -> Result<Self, ParseError> {
        grammar.validate()?;

        let regexes = grammar
            .atoms
            .iter()
            .map(|atom| match atom {
                Atom::Re { pattern } => Regex::new(&format!("^(?:{})", pattern))
                    .map(Some)
                    .map_err(|e| ParseError::InvalidGrammar {
                        reason: format!("invalid regex `{}`: {}", pattern, e),
                    }),
                _ => Ok(None),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            grammar,
            regexes,
            config,
        })
    }

    /// Name carried by the compiled grammar
    #[inline]
    pub fn name(&self) -> &str {
        &self.grammar.name
    }

    /// The compiled grammar
    #[inline]
    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// Resource limits applied to each parse
    #[inline]
    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parse the whole input from the root rule
    pub fn parse(&self, input: &str) -> Result<ParseNode, ParseError> {
        self.parse_from(self.grammar.root, input)
    }

    /// Parse the whole input starting from a named rule
    pub fn parse_rule(&self, rule: &str, input: &str) -> Result<ParseNode, ParseError> {
        let start = self.grammar.rule(rule).ok_or_else(|| ParseError::UnknownRule {
            rule: rule.to_string(),
        })?;
        self.parse_from(start, input)
    }

    /// Whether the whole input is accepted by the root rule
    pub fn matches(&self, input: &str) -> bool {
        self.parse(input).is_ok()
    }

    /// Whether the whole input is accepted by a named rule
    pub fn matches_rule(&self, rule: &str, input: &str) -> bool {
        self.parse_rule(rule, input).is_ok()
    }

    fn parse_from(&self, start: usize, input: &str) -> Result<ParseNode, ParseError> {
        if input.len() > self.config.max_input_size {
            return Err(ParseError::InputTooLarge {
                input_size: input.len(),
                max_size: self.config.max_input_size,
            });
        }

        let mut parser = PortableParser::new(self, input);
        let result = parser.try_atom(start, 0)?;
        if result.end_pos != input.len() {
            return Err(ParseError::Incomplete {
                expected: input.len(),
                actual: result.end_pos,
            });
        }
        Ok(result.value)
    }
}

fn hit(value: ParseNode, end_pos: usize) -> Result<ParseResult, ParseError> {
    Ok(ParseResult { value, end_pos })
}

fn miss(position: usize) -> Result<ParseResult, ParseError> {
    Err(ParseError::at_position(position))
}

/// State of a single parse call
struct PortableParser<'a> {
    engine: &'a ParserEngine,
    input: &'a str,
    /// Packrat memo keyed by (atom, position); `None` records a soft failure
    memo: HashMap<(usize, usize), Option<ParseResult>>,
    depth: usize,
}

impl<'a> PortableParser<'a> {
    fn new(engine: &'a ParserEngine, input: &'a str) -> Self {
        Self {
            engine,
            input,
            memo: HashMap::new(),
            depth: 0,
        }
    }

    /// Memoized match of one atom, enforcing the depth limit
    fn try_atom(&mut self, atom_id: usize, pos: usize) -> Result<ParseResult, ParseError> {
        if let Some(cached) = self.memo.get(&(atom_id, pos)) {
            return cached.clone().ok_or(ParseError::at_position(pos));
        }

        let max_depth = self.engine.config.max_recursion_depth;
        if self.depth >= max_depth {
            return Err(ParseError::RecursionLimitExceeded {
                depth: self.depth + 1,
                max_depth,
            });
        }
        self.depth += 1;
        let outcome = self.step(atom_id, pos);
        self.depth -= 1;
        match &outcome {
            Ok(result) => {
                self.memo.insert((atom_id, pos), Some(result.clone()));
            }
            Err(err) if err.is_soft() => {
                self.memo.insert((atom_id, pos), None);
            }
            Err(_) => {}
        }
        outcome
    }

    fn step(&mut self, atom_id: usize, pos: usize) -> Result<ParseResult, ParseError> {
        let engine = self.engine;
        let Some(atom) = engine.grammar.get_atom(atom_id) else {
            return Err(ParseError::InvalidGrammar {
                reason: format!("atom {} does not exist", atom_id),
            });
        };
        let input = self.input;
        let rest = input.get(pos..).unwrap_or_default();

        match atom {
            Atom::Str { pattern } if rest.starts_with(pattern.as_str()) => hit(
                ParseNode::Text {
                    offset: pos,
                    length: pattern.len(),
                },
                pos + pattern.len(),
            ),
            Atom::Str { .. } => miss(pos),
            Atom::Re { .. } => {
                let Some(Some(regex)) = engine.regexes.get(atom_id) else {
                    return Err(ParseError::InvalidGrammar {
                        reason: format!("atom {} has no compiled regex", atom_id),
                    });
                };
                match regex.find(rest) {
                    Some(m) => hit(
                        ParseNode::Text {
                            offset: pos,
                            length: m.end(),
                        },
                        pos + m.end(),
                    ),
                    None => miss(pos),
                }
            }
            Atom::Sequence { atoms } => self.all(atoms, pos),
            Atom::Alternative { atoms } => self.first(atoms, pos),
            Atom::Repetition { atom, min, max } => self.repeat(*atom, *min, *max, pos),
            Atom::Named { name, atom } => {
                let inner = self.try_atom(*atom, pos)?;
                hit(
                    ParseNode::Hash(vec![(name.clone(), inner.value)]),
                    inner.end_pos,
                )
            }
            Atom::Entity { atom } => self.try_atom(*atom, pos),
            Atom::Lookahead { atom, positive } => {
                let matched = match self.try_atom(*atom, pos) {
                    Ok(_) => true,
                    Err(err) if err.is_soft() => false,
                    Err(err) => return Err(err),
                };
                if matched == *positive {
                    hit(ParseNode::Nil, pos)
                } else {
                    miss(pos)
                }
            }
            Atom::Ignore { atom } => {
                let end = self.try_atom(*atom, pos)?.end_pos;
                hit(ParseNode::Nil, end)
            }
        }
    }

    fn all(&mut self, atoms: &[usize], pos: usize) -> Result<ParseResult, ParseError> {
        let mut end = pos;
        let mut items = Vec::with_capacity(atoms.len());
        for &atom_id in atoms {
            let part = self.try_atom(atom_id, end)?;
            end = part.end_pos;
            items.push(part.value);
        }
        hit(ParseNode::Array(items), end)
    }

    fn first(&mut self, atoms: &[usize], pos: usize) -> Result<ParseResult, ParseError> {
        for &atom_id in atoms {
            match self.try_atom(atom_id, pos) {
                Err(err) if err.is_soft() => continue,
                outcome => return outcome,
            }
        }
        miss(pos)
    }

    /// Greedy; stops early on an empty match
    fn repeat(
        &mut self,
        atom_id: usize,
        min: usize,
        max: Option<usize>,
        pos: usize,
    ) -> Result<ParseResult, ParseError> {
        let mut items = Vec::new();
        let mut end = pos;

        while max.map_or(true, |max| items.len() < max) {
            let part = match self.try_atom(atom_id, end) {
                Ok(part) => part,
                Err(err) if err.is_soft() => break,
                Err(err) => return Err(err),
            };
            let advanced = part.end_pos > end;
            end = part.end_pos;
            items.push(part.value);
            if !advanced {
                break;
            }
        }

        if items.len() < min {
            return miss(pos);
        }
        hit(ParseNode::Array(items), end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portable::parser_dsl::*;

    fn words() -> ParserEngine {
        let grammar = GrammarBuilder::new()
            .rule(
                "list",
                seq(vec![
                    dynamic(ref_("word").label("first")),
                    dynamic(seq(vec![dynamic(str(",").ignore()), dynamic(ref_("word"))]).many()),
                ]),
            )
            .rule("word", re("[a-z]+"))
            .build();
        ParserEngine::new(grammar).unwrap()
    }

    #[test]
    fn test_parse_whole_input() {
        let engine = words();
        let input = "ab,cd,ef";
        let tree = engine.parse(input).unwrap();
        assert_eq!(tree.find("first").and_then(|n| n.text(input)), Some("ab"));
        assert_eq!(tree.flatten(input), "abcdef");
    }

    #[test]
    fn test_trailing_input_is_incomplete() {
        let err = words().parse("ab,").unwrap_err();
        assert_eq!(
            err,
            ParseError::Incomplete {
                expected: 3,
                actual: 2
            }
        );
    }

    #[test]
    fn test_parse_rule() {
        let engine = words();
        assert!(engine.matches_rule("word", "xyz"));
        assert!(!engine.matches_rule("word", "x,y"));
        assert!(matches!(
            engine.parse_rule("nope", "x"),
            Err(ParseError::UnknownRule { .. })
        ));
    }

    #[test]
    fn test_negative_lookahead() {
        let grammar = GrammarBuilder::new()
            .rule("ident", str("if").not_ahead().then(re("[a-z]+")))
            .build();
        let engine = ParserEngine::new(grammar).unwrap();
        assert!(engine.matches("abc"));
        assert!(!engine.matches("iffy"));
    }

    #[test]
    fn test_never_matches_nothing() {
        let grammar = GrammarBuilder::new().rule("nothing", never()).build();
        let engine = ParserEngine::new(grammar).unwrap();
        assert!(!engine.matches(""));
        assert!(!engine.matches("x"));
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let grammar = GrammarBuilder::new().rule("bad", re("[unclosed")).build();
        assert!(matches!(
            ParserEngine::new(grammar),
            Err(ParseError::InvalidGrammar { .. })
        ));
    }

    #[test]
    fn test_input_too_large() {
        let grammar = GrammarBuilder::new().rule("any", re(".*")).build();
        let engine =
            ParserEngine::with_config(grammar, ParserConfig::new().with_max_input_size(4)).unwrap();
        assert!(matches!(
            engine.parse("too long"),
            Err(ParseError::InputTooLarge { .. })
        ));
    }

    #[test]
    fn test_recursion_limit() {
        let grammar = GrammarBuilder::new()
            .rule("nest", str("(").then(ref_("nest").optional()).then(str(")")))
            .build();
        let engine = ParserEngine::with_config(
            grammar,
            ParserConfig::new().with_max_recursion_depth(32),
        )
        .unwrap();
        assert!(engine.matches("((()))"));
        let deep = format!("{}{}", "(".repeat(20), ")".repeat(20));
        assert!(matches!(
            engine.parse(&deep),
            Err(ParseError::RecursionLimitExceeded { max_depth: 32, .. })
        ));
    }

    #[test]
    fn test_deep_input_fails_before_the_stack_runs_out() {
        let grammar = GrammarBuilder::new()
            .rule("nest", str("(").then(ref_("nest").optional()).then(str(")")))
            .build();
        let engine = ParserEngine::new(grammar).unwrap();
        assert!(engine.matches(&format!("{}{}", "(".repeat(16), ")".repeat(16))));

        let deep = format!("{}{}", "(".repeat(5000), ")".repeat(5000));
        assert!(matches!(
            engine.parse(&deep),
            Err(ParseError::RecursionLimitExceeded {
                max_depth: DEFAULT_MAX_RECURSION_DEPTH,
                ..
            })
        ));
    }
}

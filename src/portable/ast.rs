//! Parse tree and error types for Parsanol
//!
//! Parse results are plain owned trees. Matched text is never copied; leaves
//! hold byte offsets into the input that produced them.

use std::fmt;

/// Parse tree node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseNode {
    /// Nothing captured (lookahead, ignored atoms)
    Nil,

    /// Slice of the input, by byte range
    Text {
        /// Offset from start of input
        offset: usize,
        /// Length in bytes
        length: usize,
    },

    /// Sequence or repetition results
    Array(Vec<ParseNode>),

    /// Named captures
    Hash(Vec<(String, ParseNode)>),
}

impl ParseNode {
    /// Matched text of a [`ParseNode::Text`] leaf
    pub fn text<'i>(&self, input: &'i str) -> Option<&'i str> {
        match self {
            ParseNode::Text { offset, length } => input.get(*offset..*offset + length),
            _ => None,
        }
    }

    /// Depth-first search for the first capture called `name`
    pub fn find(&self, name: &str) -> Option<&ParseNode> {
        match self {
            ParseNode::Nil | ParseNode::Text { .. } => None,
            ParseNode::Array(items) => items.iter().find_map(|item| item.find(name)),
            ParseNode::Hash(entries) => entries.iter().find_map(|(key, value)| {
                if key == name {
                    Some(value)
                } else {
                    value.find(name)
                }
            }),
        }
    }

    /// Concatenated text of every leaf below this node
    pub fn flatten(&self, input: &str) -> String {
        let mut out = String::new();
        self.flatten_into(input, &mut out);
        out
    }

    fn flatten_into(&self, input: &str, out: &mut String) {
        match self {
            ParseNode::Nil => {}
            ParseNode::Text { .. } => out.push_str(self.text(input).unwrap_or_default()),
            ParseNode::Array(items) => items.iter().for_each(|i| i.flatten_into(input, out)),
            ParseNode::Hash(entries) => entries
                .iter()
                .for_each(|(_, value)| value.flatten_into(input, out)),
        }
    }
}

/// A successful match of one atom
#[derive(Debug, Clone)]
pub struct ParseResult {
    /// Captured tree
    pub value: ParseNode,
    /// Byte offset just past the match
    pub end_pos: usize,
}

/// Why a grammar could not be compiled or an input could not be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// No alternative matched
    Failed {
        /// Furthest byte offset reached
        position: usize,
    },

    /// The root rule matched a strict prefix of the input
    Incomplete {
        /// Input length
        expected: usize,
        /// Bytes matched by the root rule
        actual: usize,
    },

    /// Grammar source that cannot be loaded or validated
    InvalidGrammar {
        /// What is wrong with it
        reason: String,
    },

    /// Named start rule is not defined
    UnknownRule {
        /// Rule that was asked for
        rule: String,
    },

    /// Input longer than [`ParserConfig::max_input_size`](super::ParserConfig)
    InputTooLarge {
        /// Input length in bytes
        input_size: usize,
        /// Configured limit
        max_size: usize,
    },

    /// Atom nesting deeper than the configured limit
    RecursionLimitExceeded {
        /// Depth reached
        depth: usize,
        /// Configured limit
        max_depth: usize,
    },
}

impl ParseError {
    /// Plain match failure at `position`
    #[inline]
    pub fn at_position(position: usize) -> Self {
        ParseError::Failed { position }
    }

    /// Whether an enclosing alternative may still try something else
    #[inline]
    pub fn is_soft(&self) -> bool {
        matches!(self, ParseError::Failed { .. })
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Failed { position } => write!(f, "no match at byte {}", position),
            ParseError::Incomplete { expected, actual } => write!(
                f,
                "trailing input: matched {} of {} bytes",
                actual, expected
            ),
            ParseError::InvalidGrammar { reason } => write!(f, "invalid grammar: {}", reason),
            ParseError::UnknownRule { rule } => write!(f, "no rule named `{}`", rule),
            ParseError::InputTooLarge {
                input_size,
                max_size,
            } => write!(
                f,
                "input of {} bytes is over the {} byte limit",
                input_size, max_size
            ),
            ParseError::RecursionLimitExceeded { depth, max_depth } => write!(
                f,
                "parse nesting reached depth {} (limit {})",
                depth, max_depth
            ),
        }
    }
}

impl std::error::Error for ParseError {}

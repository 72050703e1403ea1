//! Composite scope expressions.
//!
//! A [`Scope`] is a tree of scope identifiers joined by AND / OR. Endpoint
//! requirements are built with the `&` and `|` operators once at start-up
//! (see [`known`]); [`FromStr`] exists for validating administered input and
//! is never used on the request path.

pub mod known;

use std::collections::BTreeSet;
use std::fmt;
use std::ops::{BitAnd, BitOr};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Leaf(String),
    And(Vec<Scope>),
    Or(Vec<Scope>),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ScopeParseError {
    #[error("invalid scope identifier '{0}'")]
    InvalidIdentifier(String),
    #[error("unexpected '{0}' at position {1}")]
    UnexpectedToken(char, usize),
    #[error("unexpected end of expression")]
    UnexpectedEnd,
    #[error("unbalanced parentheses")]
    Unbalanced,
}

/// Dot-separated lowercase segments of `[a-z0-9_-]`.
pub fn is_valid_scope_id(id: &str) -> bool {
    !id.is_empty()
        && id.split('.').all(|segment| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
        })
}

impl Scope {
    pub fn leaf(id: impl Into<String>) -> Self {
        let id = id.into();
        debug_assert!(is_valid_scope_id(&id), "invalid scope identifier {id}");
        Scope::Leaf(id)
    }

    /// Evaluate the expression against the granted identifiers.
    pub fn is_contained_in(&self, granted: &BTreeSet<String>) -> bool {
        match self {
            Scope::Leaf(id) => granted.contains(id),
            Scope::And(children) => {
                debug_assert!(!children.is_empty(), "empty AND scope");
                children.iter().all(|child| child.is_contained_in(granted))
            }
            Scope::Or(children) => {
                debug_assert!(!children.is_empty(), "empty OR scope");
                children.iter().any(|child| child.is_contained_in(granted))
            }
        }
    }

    /// All leaf identifiers of the expression.
    pub fn identifiers(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_identifiers(&mut out);
        out
    }

    fn collect_identifiers<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            Scope::Leaf(id) => {
                out.insert(id.as_str());
            }
            Scope::And(children) | Scope::Or(children) => {
                for child in children {
                    child.collect_identifiers(out);
                }
            }
        }
    }

    fn combine(self, rhs: Scope, and: bool) -> Scope {
        let mut children = Vec::new();
        for side in [self, rhs] {
            match side {
                Scope::And(inner) if and => children.extend(inner),
                Scope::Or(inner) if !and => children.extend(inner),
                other => children.push(other),
            }
        }
        if and {
            Scope::And(children)
        } else {
            Scope::Or(children)
        }
    }
}

impl BitOr for Scope {
    type Output = Scope;

    fn bitor(self, rhs: Scope) -> Scope {
        self.combine(rhs, false)
    }
}

impl BitAnd for Scope {
    type Output = Scope;

    fn bitand(self, rhs: Scope) -> Scope {
        self.combine(rhs, true)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Leaf(id) => f.write_str(id),
            Scope::Or(children) => {
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{}", child)?;
                }
                Ok(())
            }
            Scope::And(children) => {
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" & ")?;
                    }
                    match child {
                        Scope::Or(_) => write!(f, "({})", child)?,
                        _ => write!(f, "{}", child)?,
                    }
                }
                Ok(())
            }
        }
    }
}

impl FromStr for Scope {
    type Err = ScopeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parser = Parser { input: s, pos: 0 };
        let scope = parser.parse_or()?;
        parser.skip_ws();
        match parser.peek() {
            None => Ok(scope),
            Some(')') => Err(ScopeParseError::Unbalanced),
            Some(c) => Err(ScopeParseError::UnexpectedToken(c, parser.pos)),
        }
    }
}

// or   := and ('|' and)*
// and  := atom ('&' atom)*
// atom := identifier | '(' or ')'
struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn parse_or(&mut self) -> Result<Scope, ScopeParseError> {
        let mut scope = self.parse_and()?;
        loop {
            self.skip_ws();
            if self.peek() != Some('|') {
                return Ok(scope);
            }
            self.pos += 1;
            scope = scope | self.parse_and()?;
        }
    }

    fn parse_and(&mut self) -> Result<Scope, ScopeParseError> {
        let mut scope = self.parse_atom()?;
        loop {
            self.skip_ws();
            if self.peek() != Some('&') {
                return Ok(scope);
            }
            self.pos += 1;
            scope = scope & self.parse_atom()?;
        }
    }

    fn parse_atom(&mut self) -> Result<Scope, ScopeParseError> {
        self.skip_ws();
        match self.peek() {
            None => Err(ScopeParseError::UnexpectedEnd),
            Some('(') => {
                self.pos += 1;
                let inner = self.parse_or()?;
                self.skip_ws();
                if self.peek() != Some(')') {
                    return Err(ScopeParseError::Unbalanced);
                }
                self.pos += 1;
                Ok(inner)
            }
            Some(c @ ('|' | '&' | ')')) => Err(ScopeParseError::UnexpectedToken(c, self.pos)),
            Some(_) => {
                let start = self.pos;
                while let Some(c) = self.peek() {
                    if c.is_whitespace() || matches!(c, '|' | '&' | '(' | ')') {
                        break;
                    }
                    self.pos += c.len_utf8();
                }
                let id = &self.input[start..self.pos];
                if !is_valid_scope_id(id) {
                    return Err(ScopeParseError::InvalidIdentifier(id.to_string()));
                }
                Ok(Scope::Leaf(id.to_string()))
            }
        }
    }
}

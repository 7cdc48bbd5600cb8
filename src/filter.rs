//! # Filter Expressions
//!
//! Units and requirements may carry an LDAP-style filter that decides whether
//! they apply to a target environment, e.g.
//! `(&(os=linux)(|(ws=gtk)(ws=wayland))(!(arch=x86)))`.
//!
//! Filters are parsed once (at load time, through serde) into a small tree and
//! evaluated as a pure function of an [`Environment`]. Supported operators:
//!
//! | Syntax       | Meaning                                              |
//! |--------------|------------------------------------------------------|
//! | `(&f1 f2..)` | all sub-filters match                                |
//! | `(\|f1 f2..)`| any sub-filter matches                               |
//! | `(!f)`       | negation                                             |
//! | `(k=v)`      | equality; `*` in `v` acts as a wildcard              |
//! | `(k=*)`      | presence                                             |
//! | `(k~=v)`     | equality ignoring case and whitespace                |
//! | `(k>=v)`     | ordering, by version when both sides are versions    |
//! | `(k<=v)`     | ordering, by version when both sides are versions    |
//!
//! A backslash escapes the next character inside values.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::version::Version;

/// Key/value properties describing a target environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Environment(BTreeMap<String, String>);

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Environment(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    And(Vec<Node>),
    Or(Vec<Node>),
    Not(Box<Node>),
    Present(String),
    Equal(String, String),
    Substring(String, Pattern),
    Approx(String, String),
    GreaterOrEqual(String, String),
    LessOrEqual(String, String),
}

impl Node {
    fn matches(&self, env: &Environment) -> bool {
        match self {
            Node::And(children) => children.iter().all(|c| c.matches(env)),
            Node::Or(children) => children.iter().any(|c| c.matches(env)),
            Node::Not(child) => !child.matches(env),
            Node::Present(key) => env.get(key).is_some(),
            Node::Equal(key, value) => env.get(key) == Some(value.as_str()),
            Node::Substring(key, pattern) => env.get(key).is_some_and(|v| pattern.matches(v)),
            Node::Approx(key, value) => env
                .get(key)
                .is_some_and(|v| normalize_approx(v) == normalize_approx(value)),
            Node::GreaterOrEqual(key, value) => env
                .get(key)
                .is_some_and(|v| compare_values(v, value).is_ge()),
            Node::LessOrEqual(key, value) => env
                .get(key)
                .is_some_and(|v| compare_values(v, value).is_le()),
        }
    }
}

fn normalize_approx(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn compare_values(actual: &str, expected: &str) -> std::cmp::Ordering {
    match (Version::parse(actual), Version::parse(expected)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => actual.cmp(expected),
    }
}

/// A parsed filter expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Filter {
    expression: String,
    root: Node,
}

impl Filter {
    /// Parses an LDAP-style filter expression.
    pub fn parse(expression: &str) -> Result<Self> {
        let mut parser = Parser {
            input: expression.trim().chars().collect(),
            pos: 0,
            expression,
        };
        let root = parser.parse_filter()?;
        parser.skip_whitespace();
        if parser.pos != parser.input.len() {
            return Err(parser.error("unexpected trailing input"));
        }
        Ok(Filter {
            expression: expression.trim().to_string(),
            root,
        })
    }

    /// Evaluates the filter against an environment.
    pub fn matches(&self, env: &Environment) -> bool {
        self.root.matches(env)
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }
}

impl PartialEq for Filter {
    fn eq(&self, other: &Self) -> bool {
        self.expression == other.expression
    }
}

impl Eq for Filter {}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.expression)
    }
}

impl FromStr for Filter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Filter::parse(s)
    }
}

impl TryFrom<String> for Filter {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Filter::parse(&value)
    }
}

impl From<Filter> for String {
    fn from(filter: Filter) -> Self {
        filter.expression
    }
}

struct Parser<'a> {
    input: Vec<char>,
    pos: usize,
    expression: &'a str,
}

impl Parser<'_> {
    fn error(&self, message: &str) -> Error {
        Error::Filter {
            expression: self.expression.to_string(),
            message: format!("{} at offset {}", message, self.pos),
        }
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        self.skip_whitespace();
        if self.peek() == Some(expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", expected)))
        }
    }

    fn parse_filter(&mut self) -> Result<Node> {
        self.expect('(')?;
        self.skip_whitespace();
        let node = match self.peek() {
            Some('&') => {
                self.pos += 1;
                Node::And(self.parse_list()?)
            }
            Some('|') => {
                self.pos += 1;
                Node::Or(self.parse_list()?)
            }
            Some('!') => {
                self.pos += 1;
                Node::Not(Box::new(self.parse_filter()?))
            }
            Some(_) => self.parse_item()?,
            None => return Err(self.error("unexpected end of filter")),
        };
        self.expect(')')?;
        Ok(node)
    }

    fn parse_list(&mut self) -> Result<Vec<Node>> {
        let mut nodes = Vec::new();
        loop {
            self.skip_whitespace();
            if self.peek() != Some('(') {
                break;
            }
            nodes.push(self.parse_filter()?);
        }
        if nodes.is_empty() {
            return Err(self.error("operator needs at least one operand"));
        }
        Ok(nodes)
    }

    fn parse_item(&mut self) -> Result<Node> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if matches!(c, '=' | '~' | '<' | '>' | '(' | ')') {
                break;
            }
            self.pos += 1;
        }
        let key: String = self.input[start..self.pos].iter().collect::<String>();
        let key = key.trim().to_string();
        if key.is_empty() {
            return Err(self.error("missing attribute name"));
        }

        let op = match self.peek() {
            Some('=') => {
                self.pos += 1;
                '='
            }
            Some(c @ ('~' | '<' | '>')) => {
                self.pos += 1;
                if self.peek() != Some('=') {
                    return Err(self.error("expected '=' after comparison operator"));
                }
                self.pos += 1;
                c
            }
            _ => return Err(self.error("expected an operator")),
        };

        let pieces = self.parse_value()?;
        match op {
            '=' if pieces.len() == 2 && pieces.iter().all(String::is_empty) => Ok(Node::Present(key)),
            '=' if pieces.len() > 1 => {
                let escaped: Vec<String> = pieces.iter().map(|p| Pattern::escape(p)).collect();
                Ok(Node::Substring(key, Pattern::new(&escaped.join("*"))?))
            }
            '=' => Ok(Node::Equal(key, pieces.concat())),
            '~' => Ok(Node::Approx(key, self.plain(pieces)?)),
            '>' => Ok(Node::GreaterOrEqual(key, self.plain(pieces)?)),
            _ => Ok(Node::LessOrEqual(key, self.plain(pieces)?)),
        }
    }

    fn plain(&self, pieces: Vec<String>) -> Result<String> {
        if pieces.len() > 1 {
            return Err(self.error("wildcards are only allowed with '='"));
        }
        Ok(pieces.concat())
    }

    /// Reads a value up to the closing parenthesis, split on unescaped `*`.
    fn parse_value(&mut self) -> Result<Vec<String>> {
        let mut pieces = vec![String::new()];
        loop {
            match self.peek() {
                None => return Err(self.error("unterminated value")),
                Some(')') => break,
                Some('(') => return Err(self.error("unescaped '(' in value")),
                Some('\\') => {
                    self.pos += 1;
                    let escaped = self.peek().ok_or_else(|| self.error("dangling escape"))?;
                    if let Some(last) = pieces.last_mut() {
                        last.push(escaped);
                    }
                    self.pos += 1;
                }
                Some('*') => {
                    pieces.push(String::new());
                    self.pos += 1;
                }
                Some(c) => {
                    if let Some(last) = pieces.last_mut() {
                        last.push(c);
                    }
                    self.pos += 1;
                }
            }
        }
        Ok(pieces)
    }
}

//! Syntax tree of a parsed query.

use crate::error::{QuarryError, Result};
use crate::types::format_datetime;
use crate::value::{Key, Value};
use super::parser::RESERVED;
use std::fmt;

/// A boolean combination of leaves.
///
/// Word lists use `Conjunction<String>` and HAVING clauses use
/// `Conjunction<Predicate>`. `And` and `Or` always hold at least two
/// children; the parser collapses single-child groups.
#[derive(Debug, Clone, PartialEq)]
pub enum Conjunction<T> {
    Leaf(T),
    Not(Box<Conjunction<T>>),
    And(Vec<Conjunction<T>>),
    Or(Vec<Conjunction<T>>),
}

impl<T> Conjunction<T> {
    /// All leaves in left-to-right order.
    pub fn leaves(&self) -> Vec<&T> {
        fn walk<'a, T>(node: &'a Conjunction<T>, out: &mut Vec<&'a T>) {
            match node {
                Conjunction::Leaf(leaf) => out.push(leaf),
                Conjunction::Not(inner) => walk(inner, out),
                Conjunction::And(children) | Conjunction::Or(children) => {
                    children.iter().for_each(|c| walk(c, out))
                }
            }
        }
        let mut out = Vec::new();
        walk(self, &mut out);
        out
    }

    /// Evaluate the tree with `leaf` deciding each leaf.
    pub fn evaluate(&self, leaf: &mut impl FnMut(&T) -> bool) -> bool {
        match self {
            Conjunction::Leaf(l) => leaf(l),
            Conjunction::Not(inner) => !inner.evaluate(leaf),
            Conjunction::And(children) => children.iter().all(|c| c.evaluate(leaf)),
            Conjunction::Or(children) => children.iter().any(|c| c.evaluate(leaf)),
        }
    }
}

impl<T: fmt::Display> fmt::Display for Conjunction<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn group<T: fmt::Display>(
            f: &mut fmt::Formatter<'_>,
            children: &[Conjunction<T>],
            op: &str,
        ) -> fmt::Result {
            f.write_str("(")?;
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    write!(f, " {} ", op)?;
                }
                write!(f, "{}", child)?;
            }
            f.write_str(")")
        }
        match self {
            Conjunction::Leaf(l) => write!(f, "{}", l),
            Conjunction::Not(inner) => write!(f, "NOT {}", inner),
            Conjunction::And(children) => group(f, children, "AND"),
            Conjunction::Or(children) => group(f, children, "OR"),
        }
    }
}

/// Aggregate applied to an array value before comparing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Sum,
    Count,
    Avg,
    Max,
    Min,
}

impl Aggregate {
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "sum" => Aggregate::Sum,
            "count" => Aggregate::Count,
            "avg" => Aggregate::Avg,
            "max" => Aggregate::Max,
            "min" => Aggregate::Min,
            _ => return None,
        })
    }

    pub fn name(self) -> &'static str {
        match self {
            Aggregate::Sum => "sum",
            Aggregate::Count => "count",
            Aggregate::Avg => "avg",
            Aggregate::Max => "max",
            Aggregate::Min => "min",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl CompareOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Gt => ">",
            CompareOp::Le => "<=",
            CompareOp::Ge => ">=",
        }
    }
}

/// The left-hand side of a predicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub key: Key,
    pub aggregate: Option<Aggregate>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PredicateOp {
    Compare(CompareOp, Value),
    In { negated: bool, values: Vec<Value> },
}

/// One HAVING condition on a document's metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub target: Target,
    pub op: PredicateOp,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.aggregate {
            Some(agg) => write!(f, "{}({})", agg.name(), key_literal(&self.key)),
            None => f.write_str(&key_literal(&self.key)),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.op {
            PredicateOp::Compare(op, value) => {
                write!(f, "{} {} {}", self.target, op.symbol(), literal(value))
            }
            PredicateOp::In { negated, values } => {
                let list: Vec<String> = values.iter().map(literal).collect();
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{} {}IN ({})", self.target, not, list.join(", "))
            }
        }
    }
}

/// Render a value the way it would be written in a query.
fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => quote(s),
        Value::DateTime(dt) => quote(&format_datetime(dt)),
        other => other.to_string(),
    }
}

/// Render a key, backquoting segments that would not lex as a bare word.
fn key_literal(key: &Key) -> String {
    key.segments()
        .enumerate()
        .map(|(i, segment)| {
            let index = i > 0 && segment.bytes().all(|b| b.is_ascii_digit());
            if index || (is_bare_word(segment) && !RESERVED.contains(&segment)) {
                segment.to_string()
            } else {
                format!("`{}`", segment.replace('\\', "\\\\").replace('`', "``"))
            }
        })
        .collect::<Vec<_>>()
        .join(".")
}

fn is_bare_word(s: &str) -> bool {
    let mut bytes = s.bytes();
    bytes
        .next()
        .is_some_and(|b| b.is_ascii_alphabetic() || b == b'_' || b >= 0x80)
        && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80)
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\\', "\\\\").replace('\'', "''"))
}

/// A parsed query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Query {
    pub words: Option<Conjunction<String>>,
    pub having: Option<Conjunction<Predicate>>,
    pub limit: Option<usize>,
}

impl Query {
    /// Distinct query words in first-appearance order.
    pub fn terms(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        if let Some(words) = &self.words {
            for w in words.leaves() {
                if !out.contains(w) {
                    out.push(w.clone());
                }
            }
        }
        out
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(words) = &self.words {
            let quoted = map_leaves(words, &|w: &String| quote(w));
            parts.push(quoted.to_string());
        }
        if let Some(having) = &self.having {
            parts.push(format!("HAVING {}", having));
        }
        if let Some(limit) = self.limit {
            parts.push(format!("LIMIT {}", limit));
        }
        f.write_str(&parts.join(" "))
    }
}

fn map_leaves<T, U>(node: &Conjunction<T>, f: &impl Fn(&T) -> U) -> Conjunction<U> {
    match node {
        Conjunction::Leaf(l) => Conjunction::Leaf(f(l)),
        Conjunction::Not(inner) => Conjunction::Not(Box::new(map_leaves(inner, f))),
        Conjunction::And(c) => Conjunction::And(c.iter().map(|n| map_leaves(n, f)).collect()),
        Conjunction::Or(c) => Conjunction::Or(c.iter().map(|n| map_leaves(n, f)).collect()),
    }
}

/// Result of parsing a query string.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// Nothing but whitespace and comments
    Empty,
    SyntaxError { pos: usize, expected: String },
    Ast(Query),
}

impl ParseOutcome {
    /// `Ok(None)` for an empty query, `Err` for a syntax error.
    pub fn into_result(self) -> Result<Option<Query>> {
        match self {
            ParseOutcome::Empty => Ok(None),
            ParseOutcome::SyntaxError { pos, expected } => Err(QuarryError::Syntax { pos, expected }),
            ParseOutcome::Ast(query) => Ok(Some(query)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::parse;

    fn leaf(s: &str) -> Conjunction<String> {
        Conjunction::Leaf(s.to_string())
    }

    #[test]
    fn test_evaluate() {
        let tree = Conjunction::Or(vec![
            Conjunction::And(vec![leaf("a"), leaf("b")]),
            Conjunction::Not(Box::new(leaf("c"))),
        ]);
        let eval = |present: &[&str]| tree.evaluate(&mut |w: &String| present.contains(&w.as_str()));
        assert!(eval(&["a", "b", "c"]));
        assert!(!eval(&["a", "c"]));
        assert!(eval(&[]));
    }

    #[test]
    fn test_leaves_and_terms() {
        let query = Query {
            words: Some(Conjunction::And(vec![
                leaf("fall"),
                Conjunction::Not(Box::new(leaf("Take"))),
                leaf("fall"),
            ])),
            ..Query::default()
        };
        assert_eq!(query.words.as_ref().unwrap().leaves().len(), 3);
        assert_eq!(query.terms(), vec!["fall", "Take"]);
    }

    #[test]
    fn test_display() {
        let query = Query {
            words: Some(Conjunction::Or(vec![leaf("it's"), leaf("b")])),
            having: Some(Conjunction::Leaf(Predicate {
                target: Target {
                    key: Key::parse("a.b").unwrap(),
                    aggregate: Some(Aggregate::Sum),
                },
                op: PredicateOp::In {
                    negated: true,
                    values: vec![Value::Number(1.0), Value::String("x".into()), Value::Null],
                },
            })),
            limit: Some(3),
        };
        assert_eq!(
            query.to_string(),
            "('it''s' OR 'b') HAVING sum(a.b) NOT IN (1, 'x', NULL) LIMIT 3"
        );
    }

    #[test]
    fn test_display_quoted_keys() {
        let parsed = |text: &str| match parse(text, 0, 0) {
            ParseOutcome::Ast(query) => query,
            other => panic!("{:?} did not parse: {:?}", text, other),
        };

        let query = parsed("HAVING `weird key` = 1");
        assert_eq!(query.to_string(), "HAVING `weird key` = 1");
        assert_eq!(parsed(&query.to_string()), query);

        let query = parsed("HAVING max(tags.`LIMIT`.0) > 2");
        assert_eq!(query.to_string(), "HAVING max(tags.`LIMIT`.0) > 2");
        assert_eq!(parsed(&query.to_string()), query);
    }

    #[test]
    fn test_into_result() {
        assert_eq!(ParseOutcome::Empty.into_result().unwrap(), None);
        let query = Query {
            limit: Some(3),
            ..Query::default()
        };
        assert_eq!(
            ParseOutcome::Ast(query.clone()).into_result().unwrap(),
            Some(query)
        );
        let err = ParseOutcome::SyntaxError {
            pos: 7,
            expected: "')'".to_string(),
        }
        .into_result()
        .unwrap_err();
        assert!(matches!(err, QuarryError::Syntax { pos: 7, .. }));
    }
}

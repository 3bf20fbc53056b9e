//! Recursive-descent query parser.
//!
//! ```text
//! query       := [word_expr] [HAVING having_expr] [LIMIT number] [';'] EOS
//! word_expr   := word_and (OR word_and)*
//! word_and    := word_not (AND word_not)*
//! word_not    := NOT word_not | '(' word_expr ')' | string_literal
//! having_expr := pred_and (OR pred_and)*
//! pred_and    := pred_not (AND pred_not)*
//! pred_not    := NOT pred_not | '(' having_expr ')' | predicate
//! predicate   := target op value | target [NOT] IN '(' value (',' value)* ')'
//! target      := agg '(' key ')' | key
//! key         := ident ('.' segment)*
//! value       := ['-'] number | string_literal | TRUE | FALSE | NULL
//! ```
//!
//! Keywords are case-sensitive and uppercase; aggregate names are lowercase.
//! Every decision is made on at most two tokens of lookahead, so a failed
//! rule fails the whole parse. The error position is the furthest token any
//! rule looked at, and the message lists what was acceptable there.

use super::ast::{
    Aggregate, CompareOp, Conjunction, ParseOutcome, Predicate, PredicateOp, Query, Target,
};
use super::lexer::{unquote, Token, TokenKind};
use super::tokens::{Pos, Tokens};
use crate::value::{Key, Value};

pub(crate) const RESERVED: &[&str] = &[
    "HAVING", "LIMIT", "AND", "OR", "NOT", "IN", "TRUE", "FALSE", "NULL",
];

/// Parse a query string.
///
/// `max_query_size` bounds the query length in bytes and `max_depth` bounds
/// nesting of NOT and parentheses; 0 disables either check.
pub fn parse(query: &str, max_query_size: usize, max_depth: usize) -> ParseOutcome {
    let mut parser = Parser::new(query, max_query_size, max_depth);
    if parser.peek().kind == TokenKind::EndOfStream {
        return ParseOutcome::Empty;
    }
    match parser.query() {
        Some(ast) => ParseOutcome::Ast(ast),
        None => parser.syntax_error(),
    }
}

/// What the parser would have accepted at its furthest position.
#[derive(Debug, Default)]
struct Expected {
    index: usize,
    items: Vec<&'static str>,
}

impl Expected {
    fn add(&mut self, index: usize, what: &'static str) {
        if index > self.index || self.items.is_empty() {
            self.index = index;
            self.items.clear();
        }
        if index == self.index && !self.items.contains(&what) {
            self.items.push(what);
        }
    }
}

struct Parser<'a> {
    query: &'a str,
    tokens: Tokens<'a>,
    pos: Pos,
    expected: Expected,
    too_deep: bool,
}

impl<'a> Parser<'a> {
    fn new(query: &'a str, max_query_size: usize, max_depth: usize) -> Self {
        Parser {
            query,
            tokens: Tokens::new(query, max_query_size),
            pos: Pos::new(max_depth),
            expected: Expected::default(),
            too_deep: false,
        }
    }

    fn syntax_error(&mut self) -> ParseOutcome {
        if self.too_deep {
            let at = self.peek();
            return ParseOutcome::SyntaxError {
                pos: at.begin,
                expected: format!("nesting at most {} deep", self.pos.max_depth),
            };
        }
        let at = if self.expected.items.is_empty() {
            self.tokens.max()
        } else {
            self.tokens.get(self.expected.index)
        };
        let mut expected = self.expected.items.join(", ");
        if at.kind == TokenKind::Error {
            expected.push_str(" (found invalid token)");
        }
        ParseOutcome::SyntaxError {
            pos: at.begin,
            expected,
        }
    }

    // === Token helpers ===

    fn peek(&mut self) -> Token {
        self.tokens.get(self.pos.index)
    }

    fn peek_at(&mut self, ahead: usize) -> Token {
        self.tokens.get(self.pos.index + ahead)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek();
        self.pos.index += 1;
        token
    }

    fn text(&self, token: Token) -> &'a str {
        token.text(self.query)
    }

    fn expect(&mut self, kind: TokenKind) -> Option<Token> {
        if self.peek().kind == kind {
            return Some(self.advance());
        }
        self.expected.add(self.pos.index, kind.describe());
        None
    }

    /// Consume `word` if it is the next token.
    fn keyword(&mut self, word: &'static str) -> bool {
        let token = self.peek();
        if token.kind == TokenKind::BareWord && self.text(token) == word {
            self.advance();
            return true;
        }
        self.expected.add(self.pos.index, word);
        false
    }

    /// Run `rule` one nesting level deeper.
    fn nested<T>(&mut self, rule: impl FnOnce(&mut Self) -> Option<T>) -> Option<T> {
        if !self.pos.increase_depth() {
            self.too_deep = true;
            return None;
        }
        let result = rule(self);
        self.pos.decrease_depth();
        result
    }

    // === Query ===

    fn query(&mut self) -> Option<Query> {
        let words = if self.starts_word_expr() {
            Some(self.word_or()?)
        } else {
            None
        };

        let having = if self.keyword("HAVING") {
            Some(self.pred_or()?)
        } else {
            None
        };

        if words.is_none() && having.is_none() {
            return None;
        }

        let limit = if self.keyword("LIMIT") {
            Some(self.unsigned()?)
        } else {
            None
        };

        if self.peek().kind == TokenKind::Semicolon {
            self.advance();
        } else {
            self.expected.add(self.pos.index, TokenKind::Semicolon.describe());
        }
        self.expect(TokenKind::EndOfStream)?;

        Some(Query {
            words,
            having,
            limit,
        })
    }

    fn starts_word_expr(&mut self) -> bool {
        let token = self.peek();
        let starts = match token.kind {
            TokenKind::StringLiteral | TokenKind::OpeningRoundBracket => true,
            TokenKind::BareWord => self.text(token) == "NOT",
            _ => false,
        };
        if !starts {
            self.expected
                .add(self.pos.index, TokenKind::StringLiteral.describe());
        }
        starts
    }

    fn unsigned(&mut self) -> Option<usize> {
        let token = self.peek();
        if token.kind == TokenKind::Number {
            if let Ok(n) = self.text(token).parse::<usize>() {
                self.advance();
                return Some(n);
            }
        }
        self.expected.add(self.pos.index, "unsigned integer");
        None
    }

    // === Word expressions ===

    fn word_or(&mut self) -> Option<Conjunction<String>> {
        let mut children = vec![self.word_and()?];
        while self.keyword("OR") {
            children.push(self.word_and()?);
        }
        Some(collapse(children, Conjunction::Or))
    }

    fn word_and(&mut self) -> Option<Conjunction<String>> {
        let mut children = vec![self.word_not()?];
        while self.keyword("AND") {
            children.push(self.word_not()?);
        }
        Some(collapse(children, Conjunction::And))
    }

    fn word_not(&mut self) -> Option<Conjunction<String>> {
        if self.keyword("NOT") {
            let inner = self.nested(Self::word_not)?;
            return Some(Conjunction::Not(Box::new(inner)));
        }
        if self.peek().kind == TokenKind::OpeningRoundBracket {
            self.advance();
            let inner = self.nested(Self::word_or)?;
            self.expect(TokenKind::ClosingRoundBracket)?;
            return Some(inner);
        }
        self.expected
            .add(self.pos.index, TokenKind::OpeningRoundBracket.describe());
        let token = self.expect(TokenKind::StringLiteral)?;
        Some(Conjunction::Leaf(unquote(self.text(token))))
    }

    // === HAVING expressions ===

    fn pred_or(&mut self) -> Option<Conjunction<Predicate>> {
        let mut children = vec![self.pred_and()?];
        while self.keyword("OR") {
            children.push(self.pred_and()?);
        }
        Some(collapse(children, Conjunction::Or))
    }

    fn pred_and(&mut self) -> Option<Conjunction<Predicate>> {
        let mut children = vec![self.pred_not()?];
        while self.keyword("AND") {
            children.push(self.pred_not()?);
        }
        Some(collapse(children, Conjunction::And))
    }

    fn pred_not(&mut self) -> Option<Conjunction<Predicate>> {
        if self.keyword("NOT") {
            let inner = self.nested(Self::pred_not)?;
            return Some(Conjunction::Not(Box::new(inner)));
        }
        if self.peek().kind == TokenKind::OpeningRoundBracket {
            self.advance();
            let inner = self.nested(Self::pred_or)?;
            self.expect(TokenKind::ClosingRoundBracket)?;
            return Some(inner);
        }
        self.expected
            .add(self.pos.index, TokenKind::OpeningRoundBracket.describe());
        self.predicate().map(Conjunction::Leaf)
    }

    fn predicate(&mut self) -> Option<Predicate> {
        let target = self.target()?;

        if self.keyword("IN") {
            let values = self.value_list()?;
            return Some(Predicate {
                target,
                op: PredicateOp::In {
                    negated: false,
                    values,
                },
            });
        }
        if self.keyword("NOT") {
            if !self.keyword("IN") {
                return None;
            }
            let values = self.value_list()?;
            return Some(Predicate {
                target,
                op: PredicateOp::In {
                    negated: true,
                    values,
                },
            });
        }

        let op = self.compare_op()?;
        let value = self.value()?;
        Some(Predicate {
            target,
            op: PredicateOp::Compare(op, value),
        })
    }

    fn target(&mut self) -> Option<Target> {
        let token = self.peek();
        if token.kind == TokenKind::BareWord {
            if let Some(aggregate) = Aggregate::from_name(self.text(token)) {
                if self.peek_at(1).kind == TokenKind::OpeningRoundBracket {
                    self.advance();
                    self.advance();
                    let key = self.key()?;
                    self.expect(TokenKind::ClosingRoundBracket)?;
                    return Some(Target {
                        key,
                        aggregate: Some(aggregate),
                    });
                }
            }
        }
        let key = self.key()?;
        Some(Target {
            key,
            aggregate: None,
        })
    }

    fn key(&mut self) -> Option<Key> {
        let start = self.pos.index;
        let mut segments = vec![self.segment(true)?];
        while self.peek().kind == TokenKind::Dot {
            self.advance();
            segments.push(self.segment(false)?);
        }
        match Key::from_segments(&segments) {
            Ok(key) => Some(key),
            Err(_) => {
                self.expected.add(start, "non-empty key");
                None
            }
        }
    }

    /// One key segment. Segments after the first may be array indexes.
    fn segment(&mut self, first: bool) -> Option<String> {
        let token = self.peek();
        let text = self.text(token);
        let segment = match token.kind {
            TokenKind::BareWord if !RESERVED.contains(&text) => Some(text.to_string()),
            TokenKind::QuotedIdentifier => Some(unquote(text)),
            TokenKind::Number if !first && text.bytes().all(|b| b.is_ascii_digit()) => {
                Some(text.to_string())
            }
            _ => None,
        };
        match segment {
            Some(s) => {
                self.advance();
                Some(s)
            }
            None => {
                self.expected.add(self.pos.index, "identifier");
                None
            }
        }
    }

    fn compare_op(&mut self) -> Option<CompareOp> {
        let op = match self.peek().kind {
            TokenKind::Equals => CompareOp::Eq,
            TokenKind::NotEquals => CompareOp::Ne,
            TokenKind::Less => CompareOp::Lt,
            TokenKind::Greater => CompareOp::Gt,
            TokenKind::LessOrEquals => CompareOp::Le,
            TokenKind::GreaterOrEquals => CompareOp::Ge,
            _ => {
                self.expected.add(self.pos.index, "comparison operator");
                return None;
            }
        };
        self.advance();
        Some(op)
    }

    fn value(&mut self) -> Option<Value> {
        let token = self.peek();
        let value = match token.kind {
            TokenKind::Minus => {
                self.advance();
                let number = self.expect(TokenKind::Number)?;
                return self.number(number).map(|n| Value::Number(-n));
            }
            TokenKind::Number => self.number(token).map(Value::Number),
            TokenKind::StringLiteral => Some(Value::String(unquote(self.text(token)))),
            TokenKind::BareWord => match self.text(token) {
                "TRUE" => Some(Value::Bool(true)),
                "FALSE" => Some(Value::Bool(false)),
                "NULL" => Some(Value::Null),
                _ => None,
            },
            _ => None,
        };
        match value {
            Some(v) => {
                if token.kind != TokenKind::Minus {
                    self.advance();
                }
                Some(v)
            }
            None => {
                self.expected.add(self.pos.index, "value");
                None
            }
        }
    }

    fn number(&self, token: Token) -> Option<f64> {
        self.text(token).parse::<f64>().ok()
    }

    fn value_list(&mut self) -> Option<Vec<Value>> {
        self.expect(TokenKind::OpeningRoundBracket)?;
        let mut values = vec![self.value()?];
        while self.peek().kind == TokenKind::Comma {
            self.advance();
            values.push(self.value()?);
        }
        self.expected.add(self.pos.index, TokenKind::Comma.describe());
        self.expect(TokenKind::ClosingRoundBracket)?;
        Some(values)
    }
}

fn collapse<T>(
    mut children: Vec<Conjunction<T>>,
    group: fn(Vec<Conjunction<T>>) -> Conjunction<T>,
) -> Conjunction<T> {
    if children.len() == 1 {
        children.swap_remove(0)
    } else {
        group(children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ast(query: &str) -> Query {
        match parse(query, 0, 0) {
            ParseOutcome::Ast(q) => q,
            other => panic!("{:?} did not parse: {:?}", query, other),
        }
    }

    fn error(query: &str) -> (usize, String) {
        match parse(query, 0, 0) {
            ParseOutcome::SyntaxError { pos, expected } => (pos, expected),
            other => panic!("{:?} parsed unexpectedly: {:?}", query, other),
        }
    }

    fn leaf(s: &str) -> Conjunction<String> {
        Conjunction::Leaf(s.to_string())
    }

    #[test]
    fn test_empty() {
        assert_eq!(parse("", 0, 0), ParseOutcome::Empty);
        assert_eq!(parse("  \n\t", 0, 0), ParseOutcome::Empty);
        assert_eq!(parse("-- only a comment", 0, 0), ParseOutcome::Empty);
    }

    #[test]
    fn test_word_precedence() {
        let q = ast("'a' OR 'b' AND NOT 'c'");
        assert_eq!(
            q.words,
            Some(Conjunction::Or(vec![
                leaf("a"),
                Conjunction::And(vec![leaf("b"), Conjunction::Not(Box::new(leaf("c")))]),
            ]))
        );
        assert_eq!(q.having, None);
        assert_eq!(q.limit, None);
    }

    #[test]
    fn test_parentheses_and_chains() {
        let q = ast("('a' OR 'b') AND 'c' AND 'd';");
        assert_eq!(
            q.words,
            Some(Conjunction::And(vec![
                Conjunction::Or(vec![leaf("a"), leaf("b")]),
                leaf("c"),
                leaf("d"),
            ]))
        );
    }

    #[test]
    fn test_limit() {
        let q = ast("'word' LIMIT 10");
        assert_eq!(q.words, Some(leaf("word")));
        assert_eq!(q.limit, Some(10));
        assert!(matches!(parse("'word' LIMIT", 0, 0), ParseOutcome::SyntaxError { .. }));
        assert!(matches!(parse("'word' LIMIT 1.5", 0, 0), ParseOutcome::SyntaxError { .. }));
    }

    #[test]
    fn test_having_predicates() {
        let q = ast("'w' HAVING sum(stats.plays) >= 10 AND NOT tag IN ('a', 'b') OR `odd key` = -2.5");
        let having = q.having.unwrap();
        let leaves = having.leaves();
        assert_eq!(leaves.len(), 3);

        assert_eq!(leaves[0].target.key.as_str(), "stats.plays");
        assert_eq!(leaves[0].target.aggregate, Some(Aggregate::Sum));
        assert_eq!(leaves[0].op, PredicateOp::Compare(CompareOp::Ge, Value::Number(10.0)));

        assert_eq!(
            leaves[1].op,
            PredicateOp::In {
                negated: false,
                values: vec![Value::String("a".into()), Value::String("b".into())],
            }
        );
        assert_eq!(leaves[2].target.key.as_str(), "odd key");
        assert_eq!(leaves[2].op, PredicateOp::Compare(CompareOp::Eq, Value::Number(-2.5)));
        assert!(matches!(having, Conjunction::Or(_)));
    }

    #[test]
    fn test_having_only_and_literals() {
        let q = ast("HAVING a NOT IN (TRUE, NULL) AND b != FALSE LIMIT 3");
        assert_eq!(q.words, None);
        assert_eq!(q.limit, Some(3));
        let having = q.having.unwrap();
        let leaves = having.leaves();
        assert_eq!(
            leaves[0].op,
            PredicateOp::In {
                negated: true,
                values: vec![Value::Bool(true), Value::Null],
            }
        );
        assert_eq!(leaves[1].op, PredicateOp::Compare(CompareOp::Ne, Value::Bool(false)));
    }

    #[test]
    fn test_array_index_keys() {
        let q = ast("HAVING items.0.name = 'x'");
        assert_eq!(q.having.unwrap().leaves()[0].target.key.as_str(), "items.0.name");
    }

    #[test]
    fn test_aggregate_name_as_key() {
        let q = ast("HAVING count = 3");
        let having = q.having.unwrap();
        let leaf = having.leaves()[0];
        assert_eq!(leaf.target.key.as_str(), "count");
        assert_eq!(leaf.target.aggregate, None);
    }

    #[test]
    fn test_keywords_are_case_sensitive() {
        assert!(matches!(parse("'a' and 'b'", 0, 0), ParseOutcome::SyntaxError { .. }));
        assert!(matches!(parse("'word' having x = 1", 0, 0), ParseOutcome::SyntaxError { .. }));
        assert!(matches!(parse("HAVING SUM(x) = 1", 0, 0), ParseOutcome::SyntaxError { .. }));
    }

    #[test]
    fn test_syntax_errors() {
        let (pos, expected) = error("word");
        assert_eq!(pos, 0);
        assert!(expected.contains("string literal"));
        assert!(expected.contains("HAVING"));

        let (pos, expected) = error("'a' 'b'");
        assert_eq!(pos, 4);
        assert!(expected.contains("end of query"));

        let (pos, _) = error("\"word\" LIMIT 10");
        assert_eq!(pos, 0);

        let (pos, expected) = error("'a' HAVING x >");
        assert_eq!(pos, 14);
        assert!(expected.contains("value"));

        let (pos, expected) = error("'a' AND ('b'");
        assert_eq!(pos, 12);
        assert!(expected.contains("')'"));

        let (_, expected) = error("'a' ! 'b'");
        assert!(expected.contains("invalid token"));

        assert!(matches!(parse("'a' HAVING", 0, 0), ParseOutcome::SyntaxError { .. }));
        assert!(matches!(parse("HAVING NOT = 1", 0, 0), ParseOutcome::SyntaxError { .. }));
        assert!(matches!(parse("LIMIT 5", 0, 0), ParseOutcome::SyntaxError { .. }));
    }

    #[test]
    fn test_depth_limit() {
        let deep = format!("{}'a'", "NOT ".repeat(10));
        assert!(matches!(parse(&deep, 0, 20), ParseOutcome::Ast(_)));
        let (_, expected) = match parse(&deep, 0, 5) {
            ParseOutcome::SyntaxError { pos, expected } => (pos, expected),
            other => panic!("unexpected {:?}", other),
        };
        assert!(expected.contains("5"));
    }

    #[test]
    fn test_max_query_size() {
        assert!(matches!(parse("'short'", 16, 0), ParseOutcome::Ast(_)));
        assert!(matches!(
            parse("'this query is too long'", 16, 0),
            ParseOutcome::SyntaxError { .. }
        ));
    }

    #[test]
    fn test_display_round_trip() {
        let text = "('a' OR NOT 'b') HAVING max(x.y) < 3 LIMIT 2";
        let q = ast(text);
        assert_eq!(ast(&q.to_string()), q);
    }
}

//! Lazily materialized stream of significant tokens.

use super::lexer::{Lexer, Token};

/// Significant tokens of one query, lexed on demand and kept for
/// backtracking.
pub struct Tokens<'a> {
    lexer: Lexer<'a>,
    data: Vec<Token>,
}

impl<'a> Tokens<'a> {
    pub fn new(query: &'a str, max_query_size: usize) -> Self {
        Tokens {
            lexer: Lexer::new(query, max_query_size),
            data: Vec::new(),
        }
    }

    /// The token at `index`. Past the end of input this keeps returning the
    /// final end-of-stream or error token.
    pub fn get(&mut self, index: usize) -> Token {
        loop {
            if let Some(token) = self.data.get(index) {
                return *token;
            }
            if let Some(last) = self.data.last() {
                if last.kind.is_end() {
                    return *last;
                }
            }
            let token = self.lexer.next_token();
            if token.kind.is_significant() {
                self.data.push(token);
            }
        }
    }

    /// The rightmost token looked at so far.
    pub fn max(&mut self) -> Token {
        match self.data.last() {
            Some(token) => *token,
            None => self.get(0),
        }
    }
}

/// Position in a token stream together with the recursion depth of the
/// parser holding it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pos {
    pub index: usize,
    pub depth: usize,
    pub max_depth: usize,
}

impl Pos {
    pub fn new(max_depth: usize) -> Self {
        Pos {
            index: 0,
            depth: 0,
            max_depth,
        }
    }

    /// Enter one level of recursion. Returns false once `max_depth` is
    /// exceeded; 0 means unlimited.
    #[must_use]
    pub fn increase_depth(&mut self) -> bool {
        self.depth += 1;
        self.max_depth == 0 || self.depth <= self.max_depth
    }

    pub fn decrease_depth(&mut self) {
        debug_assert!(self.depth > 0, "parser depth underflow");
        self.depth = self.depth.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::lexer::TokenKind;

    #[test]
    fn test_skips_insignificant() {
        let mut tokens = Tokens::new("  'a' -- note\n AND 'b'  ", 0);
        assert_eq!(tokens.get(0).kind, TokenKind::StringLiteral);
        assert_eq!(tokens.get(1).kind, TokenKind::BareWord);
        assert_eq!(tokens.get(2).kind, TokenKind::StringLiteral);
        assert_eq!(tokens.get(3).kind, TokenKind::EndOfStream);
        assert_eq!(tokens.get(10).kind, TokenKind::EndOfStream);
    }

    #[test]
    fn test_backtracking_is_stable() {
        let mut tokens = Tokens::new("x y z", 0);
        let z = tokens.get(2);
        let x = tokens.get(0);
        assert_eq!(x.begin, 0);
        assert_eq!(z.begin, 4);
        assert_eq!(tokens.get(2), z);
    }

    #[test]
    fn test_stops_at_error() {
        let mut tokens = Tokens::new("'a' ! 'b'", 0);
        assert_eq!(tokens.get(1).kind, TokenKind::Error);
        assert_eq!(tokens.get(2).kind, TokenKind::Error);
        assert_eq!(tokens.max().kind, TokenKind::Error);
    }

    #[test]
    fn test_max_tracks_rightmost() {
        let mut tokens = Tokens::new("a b c", 0);
        assert_eq!(tokens.max().begin, 0);
        tokens.get(2);
        tokens.get(0);
        assert_eq!(tokens.max().begin, 4);
    }

    #[test]
    fn test_depth_limit() {
        let mut pos = Pos::new(2);
        assert!(pos.increase_depth());
        assert!(pos.increase_depth());
        assert!(!pos.increase_depth());
        pos.decrease_depth();
        assert_eq!(pos.depth, 2);
    }
}

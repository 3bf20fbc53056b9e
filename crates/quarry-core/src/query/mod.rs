//! The query language.
//!
//! ```text
//! 'fall' AND NOT ('Take' OR 'memory') HAVING avg(ratings) >= 4 LIMIT 10
//! ```
//!
//! Quoted words select documents through the inverted index, `HAVING`
//! filters them on metadata and `LIMIT` caps the ranked result.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod tokens;

pub use ast::{
    Aggregate, CompareOp, Conjunction, ParseOutcome, Predicate, PredicateOp, Query, Target,
};
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::parse;

use crate::config::SearchConfig;

/// Parse `query` with the size and depth limits from `config`.
pub fn parse_with(query: &str, config: &SearchConfig) -> ParseOutcome {
    parse(query, config.max_query_size, config.max_parser_depth)
}

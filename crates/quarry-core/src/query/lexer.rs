//! Query tokenizer.
//!
//! Produces every token including whitespace and comments; [`super::tokens`]
//! filters out the insignificant ones. Positions are byte offsets into the
//! query text. The lexer never fails: malformed input becomes an
//! [`TokenKind::Error`] token and lexing continues after it.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    Whitespace,
    Comment,

    BareWord,
    Number,
    StringLiteral,
    QuotedIdentifier,

    OpeningRoundBracket,
    ClosingRoundBracket,
    OpeningSquareBracket,
    ClosingSquareBracket,
    OpeningCurlyBrace,
    ClosingCurlyBrace,

    Comma,
    Semicolon,
    Dot,
    Asterisk,
    Slash,
    Plus,
    Minus,

    Equals,
    NotEquals,
    Less,
    Greater,
    LessOrEquals,
    GreaterOrEquals,
    Concatenation,

    EndOfStream,
    Error,
}

impl TokenKind {
    /// Whitespace and comments carry no meaning for the parser.
    pub fn is_significant(self) -> bool {
        !matches!(self, TokenKind::Whitespace | TokenKind::Comment)
    }

    pub fn is_end(self) -> bool {
        matches!(self, TokenKind::EndOfStream | TokenKind::Error)
    }

    /// Human-readable name used in syntax error messages.
    pub fn describe(self) -> &'static str {
        match self {
            TokenKind::Whitespace => "whitespace",
            TokenKind::Comment => "comment",
            TokenKind::BareWord => "word",
            TokenKind::Number => "number",
            TokenKind::StringLiteral => "string literal",
            TokenKind::QuotedIdentifier => "quoted identifier",
            TokenKind::OpeningRoundBracket => "'('",
            TokenKind::ClosingRoundBracket => "')'",
            TokenKind::OpeningSquareBracket => "'['",
            TokenKind::ClosingSquareBracket => "']'",
            TokenKind::OpeningCurlyBrace => "'{'",
            TokenKind::ClosingCurlyBrace => "'}'",
            TokenKind::Comma => "','",
            TokenKind::Semicolon => "';'",
            TokenKind::Dot => "'.'",
            TokenKind::Asterisk => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Equals => "'='",
            TokenKind::NotEquals => "'!='",
            TokenKind::Less => "'<'",
            TokenKind::Greater => "'>'",
            TokenKind::LessOrEquals => "'<='",
            TokenKind::GreaterOrEquals => "'>='",
            TokenKind::Concatenation => "'||'",
            TokenKind::EndOfStream => "end of query",
            TokenKind::Error => "invalid token",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// A token spanning `begin..end` bytes of the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub begin: usize,
    pub end: usize,
}

impl Token {
    pub fn text<'a>(&self, query: &'a str) -> &'a str {
        query.get(self.begin..self.end).unwrap_or("")
    }

    pub fn len(&self) -> usize {
        self.end - self.begin
    }

    pub fn is_empty(&self) -> bool {
        self.begin == self.end
    }
}

pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
    /// Tokens ending past this offset become errors; 0 disables the check
    max_query_size: usize,
    prev_significant: Option<TokenKind>,
}

impl<'a> Lexer<'a> {
    pub fn new(query: &'a str, max_query_size: usize) -> Self {
        Lexer {
            input: query.as_bytes(),
            pos: 0,
            max_query_size,
            prev_significant: None,
        }
    }

    pub fn next_token(&mut self) -> Token {
        let mut token = self.next_token_impl();
        if self.max_query_size != 0 && token.end > self.max_query_size {
            token.kind = TokenKind::Error;
        }
        if token.kind.is_significant() {
            self.prev_significant = Some(token.kind);
        }
        token
    }

    fn peek(&self, ahead: usize) -> Option<u8> {
        self.input.get(self.pos + ahead).copied()
    }

    fn emit(&mut self, kind: TokenKind, begin: usize, len: usize) -> Token {
        self.pos = begin + len;
        Token {
            kind,
            begin,
            end: self.pos,
        }
    }

    fn next_token_impl(&mut self) -> Token {
        let begin = self.pos;
        let Some(c) = self.peek(0) else {
            return Token {
                kind: TokenKind::EndOfStream,
                begin,
                end: begin,
            };
        };

        match c {
            c if c.is_ascii_whitespace() => {
                let len = self.input[begin..]
                    .iter()
                    .take_while(|b| b.is_ascii_whitespace())
                    .count();
                self.emit(TokenKind::Whitespace, begin, len)
            }
            b'0'..=b'9' => self.number(begin),
            b'\'' => self.quoted(begin, b'\'', TokenKind::StringLiteral),
            b'`' => self.quoted(begin, b'`', TokenKind::QuotedIdentifier),
            b'(' => self.emit(TokenKind::OpeningRoundBracket, begin, 1),
            b')' => self.emit(TokenKind::ClosingRoundBracket, begin, 1),
            b'[' => self.emit(TokenKind::OpeningSquareBracket, begin, 1),
            b']' => self.emit(TokenKind::ClosingSquareBracket, begin, 1),
            b'{' => self.emit(TokenKind::OpeningCurlyBrace, begin, 1),
            b'}' => self.emit(TokenKind::ClosingCurlyBrace, begin, 1),
            b',' => self.emit(TokenKind::Comma, begin, 1),
            b';' => self.emit(TokenKind::Semicolon, begin, 1),
            b'*' => self.emit(TokenKind::Asterisk, begin, 1),
            b'+' => self.emit(TokenKind::Plus, begin, 1),
            b'.' => {
                let follows_word = self
                    .peek(1)
                    .is_some_and(|n| n.is_ascii_alphanumeric() || n == b'_' || n == b'`');
                let after_operand = matches!(
                    self.prev_significant,
                    Some(TokenKind::BareWord | TokenKind::Number | TokenKind::QuotedIdentifier)
                );
                if begin > 0 && follows_word && after_operand {
                    self.emit(TokenKind::Dot, begin, 1)
                } else {
                    self.emit(TokenKind::Error, begin, 1)
                }
            }
            b'-' => {
                if self.peek(1) == Some(b'-') {
                    let len = self.input[begin..]
                        .iter()
                        .position(|&b| b == b'\n')
                        .unwrap_or(self.input.len() - begin);
                    self.emit(TokenKind::Comment, begin, len)
                } else {
                    self.emit(TokenKind::Minus, begin, 1)
                }
            }
            b'/' => {
                if self.peek(1) == Some(b'*') {
                    match find(&self.input[begin + 2..], b"*/") {
                        Some(at) => self.emit(TokenKind::Comment, begin, at + 4),
                        None => self.emit(TokenKind::Error, begin, self.input.len() - begin),
                    }
                } else {
                    self.emit(TokenKind::Slash, begin, 1)
                }
            }
            b'=' => {
                let len = if self.peek(1) == Some(b'=') { 2 } else { 1 };
                self.emit(TokenKind::Equals, begin, len)
            }
            b'!' => {
                if self.peek(1) == Some(b'=') {
                    self.emit(TokenKind::NotEquals, begin, 2)
                } else {
                    self.emit(TokenKind::Error, begin, 1)
                }
            }
            b'<' => match self.peek(1) {
                Some(b'=') => self.emit(TokenKind::LessOrEquals, begin, 2),
                Some(b'>') => self.emit(TokenKind::NotEquals, begin, 2),
                _ => self.emit(TokenKind::Less, begin, 1),
            },
            b'>' => match self.peek(1) {
                Some(b'=') => self.emit(TokenKind::GreaterOrEquals, begin, 2),
                _ => self.emit(TokenKind::Greater, begin, 1),
            },
            b'|' => {
                if self.peek(1) == Some(b'|') {
                    self.emit(TokenKind::Concatenation, begin, 2)
                } else {
                    self.emit(TokenKind::Error, begin, 1)
                }
            }
            c if is_word_start(c) => {
                let len = self.input[begin..]
                    .iter()
                    .take_while(|&&b| is_word_char(b))
                    .count();
                self.emit(TokenKind::BareWord, begin, len)
            }
            _ => self.emit(TokenKind::Error, begin, 1),
        }
    }

    fn number(&mut self, begin: usize) -> Token {
        let digits = |from: usize, input: &[u8]| {
            input[from..].iter().take_while(|b| b.is_ascii_digit()).count()
        };
        let mut end = begin + digits(begin, self.input);
        if self.input.get(end) == Some(&b'.')
            && self.input.get(end + 1).is_some_and(u8::is_ascii_digit)
        {
            end += 1 + digits(end + 1, self.input);
        }
        self.emit(TokenKind::Number, begin, end - begin)
    }

    /// A quoted run. A doubled quote stands for itself and a backslash
    /// escapes the next byte.
    fn quoted(&mut self, begin: usize, quote: u8, kind: TokenKind) -> Token {
        let mut i = begin + 1;
        while i < self.input.len() {
            match self.input[i] {
                b'\\' => i += 2,
                b if b == quote => {
                    if self.input.get(i + 1) == Some(&quote) {
                        i += 2;
                    } else {
                        return self.emit(kind, begin, i + 1 - begin);
                    }
                }
                _ => i += 1,
            }
        }
        self.emit(TokenKind::Error, begin, self.input.len() - begin)
    }
}

fn is_word_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b >= 0x80
}

fn is_word_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b >= 0x80
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Strip the quotes from a string literal or quoted identifier and resolve
/// its escapes.
pub fn unquote(raw: &str) -> String {
    let mut chars = raw.chars();
    let quote = chars.next();
    let inner = match quote {
        Some(q) if raw.len() >= 2 && raw.ends_with(q) => &raw[q.len_utf8()..raw.len() - q.len_utf8()],
        _ => return raw.to_string(),
    };

    let mut out = String::with_capacity(inner.len());
    let mut it = inner.chars().peekable();
    while let Some(c) = it.next() {
        match c {
            '\\' => match it.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('r') => out.push('\r'),
                Some('0') => out.push('\0'),
                Some(other) => out.push(other),
                None => {}
            },
            c if Some(c) == quote && it.peek() == Some(&c) => {
                it.next();
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out
}

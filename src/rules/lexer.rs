//! Tokenizer for rule expressions
//!
//! Single pass over the input bytes. Characters that cannot start a token
//! produce `Token::Illegal`; the lexer itself never fails.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Dotted name, optionally `@`-prefixed (`@request.auth.id`, `record.owner`)
    Ident(String),
    /// Contents of a single- or double-quoted string
    Str(String),
    /// Decimal digits, parsed to an integer by the parser
    Int(String),
    Bool(bool),
    LParen,
    RParen,
    And,
    Or,
    Eq,
    NotEq,
    Gt,
    Lt,
    Gte,
    Lte,
    Illegal(String),
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "identifier '{}'", s),
            Token::Str(s) => write!(f, "string '{}'", s),
            Token::Int(s) => write!(f, "integer {}", s),
            Token::Bool(b) => write!(f, "{}", b),
            Token::LParen => f.write_str("'('"),
            Token::RParen => f.write_str("')'"),
            Token::And => f.write_str("'&&'"),
            Token::Or => f.write_str("'||'"),
            Token::Eq => f.write_str("'='"),
            Token::NotEq => f.write_str("'!='"),
            Token::Gt => f.write_str("'>'"),
            Token::Lt => f.write_str("'<'"),
            Token::Gte => f.write_str("'>='"),
            Token::Lte => f.write_str("'<='"),
            Token::Illegal(s) => write!(f, "illegal input '{}'", s),
            Token::Eof => f.write_str("end of input"),
        }
    }
}

pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek_byte(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn byte_at(&self, offset: usize) -> Option<u8> {
        self.input.as_bytes().get(self.pos + offset).copied()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek_byte(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    /// Consume `len` bytes and return `token`
    fn emit(&mut self, len: usize, token: Token) -> Token {
        self.pos += len;
        token
    }

    pub fn next_token(&mut self) -> Token {
        self.skip_whitespace();

        let Some(ch) = self.peek_byte() else {
            return Token::Eof;
        };
        let next = self.byte_at(1);

        match ch {
            b'(' => self.emit(1, Token::LParen),
            b')' => self.emit(1, Token::RParen),
            b'=' if next == Some(b'=') => self.emit(2, Token::Eq),
            b'=' => self.emit(1, Token::Eq),
            b'!' if next == Some(b'=') => self.emit(2, Token::NotEq),
            b'>' if next == Some(b'=') => self.emit(2, Token::Gte),
            b'>' => self.emit(1, Token::Gt),
            b'<' if next == Some(b'=') => self.emit(2, Token::Lte),
            b'<' => self.emit(1, Token::Lt),
            b'&' if next == Some(b'&') => self.emit(2, Token::And),
            b'|' if next == Some(b'|') => self.emit(2, Token::Or),
            b'\'' | b'"' => self.read_string(ch),
            c if is_ident_start(c) => self.read_identifier(),
            c if c.is_ascii_digit() => self.read_number(),
            _ => self.read_illegal(),
        }
    }

    fn read_identifier(&mut self) -> Token {
        let start = self.pos;
        while matches!(self.peek_byte(), Some(c) if is_ident_start(c) || c.is_ascii_digit() || c == b'.')
        {
            self.pos += 1;
        }
        match &self.input[start..self.pos] {
            "true" => Token::Bool(true),
            "false" => Token::Bool(false),
            ident => Token::Ident(ident.to_string()),
        }
    }

    fn read_number(&mut self) -> Token {
        let start = self.pos;
        while matches!(self.peek_byte(), Some(c) if c.is_ascii_digit()) {
            self.pos += 1;
        }
        Token::Int(self.input[start..self.pos].to_string())
    }

    fn read_string(&mut self, quote: u8) -> Token {
        let start = self.pos + 1;
        let mut end = start;
        while let Some(c) = self.input.as_bytes().get(end).copied() {
            if c == quote {
                self.pos = end + 1;
                return Token::Str(self.input[start..end].to_string());
            }
            end += 1;
        }

        let rest = self.input[self.pos..].to_string();
        self.pos = self.input.len();
        Token::Illegal(rest)
    }

    fn read_illegal(&mut self) -> Token {
        let ch = self.input[self.pos..].chars().next().unwrap_or('\u{FFFD}');
        self.pos += ch.len_utf8().max(1);
        Token::Illegal(ch.to_string())
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        match self.next_token() {
            Token::Eof => None,
            token => Some(token),
        }
    }
}

fn is_ident_start(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_' || c == b'@'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        Lexer::new(input).collect()
    }

    #[test]
    fn test_lex_request_comparison() {
        assert_eq!(
            tokens("@request.auth.id != ''"),
            vec![
                Token::Ident("@request.auth.id".into()),
                Token::NotEq,
                Token::Str(String::new()),
            ]
        );
    }

    #[test]
    fn test_lex_operators() {
        assert_eq!(
            tokens("= == != > < >= <= && || ( )"),
            vec![
                Token::Eq,
                Token::Eq,
                Token::NotEq,
                Token::Gt,
                Token::Lt,
                Token::Gte,
                Token::Lte,
                Token::And,
                Token::Or,
                Token::LParen,
                Token::RParen,
            ]
        );
    }

    #[test]
    fn test_lex_literals() {
        assert_eq!(
            tokens("true false 42 \"hi\" 'there'"),
            vec![
                Token::Bool(true),
                Token::Bool(false),
                Token::Int("42".into()),
                Token::Str("hi".into()),
                Token::Str("there".into()),
            ]
        );
    }

    #[test]
    fn test_lex_identifier_shapes() {
        assert_eq!(
            tokens("record.owner_id status2"),
            vec![
                Token::Ident("record.owner_id".into()),
                Token::Ident("status2".into()),
            ]
        );
    }

    #[test]
    fn test_lex_illegal_characters() {
        assert_eq!(
            tokens("a & b"),
            vec![
                Token::Ident("a".into()),
                Token::Illegal("&".into()),
                Token::Ident("b".into()),
            ]
        );
        assert_eq!(tokens("!"), vec![Token::Illegal("!".into())]);
        assert_eq!(tokens("é"), vec![Token::Illegal("é".into())]);
    }

    #[test]
    fn test_lex_unterminated_string() {
        assert_eq!(
            tokens("owner = 'abc"),
            vec![
                Token::Ident("owner".into()),
                Token::Eq,
                Token::Illegal("'abc".into()),
            ]
        );
    }

    #[test]
    fn test_lex_unicode_inside_strings() {
        assert_eq!(tokens("'héllo'"), vec![Token::Str("héllo".into())]);
    }

    #[test]
    fn test_lex_eof_is_sticky() {
        let mut lexer = Lexer::new("  ");
        assert_eq!(lexer.next_token(), Token::Eof);
        assert_eq!(lexer.next_token(), Token::Eof);
    }
}

//! Lexer/Scanner for gscript source code.

use crate::error::LexerError;
use crate::lexer::token::{Token, TokenKind};
use crate::span::Span;

/// The lexer transforms source code into a stream of tokens.
///
/// A newline that follows a token able to end a statement is turned into a
/// `Semicolon`, so most statements need no explicit terminator.
pub struct Scanner<'a> {
    source: &'a str,
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    current_pos: usize,
    line: usize,
    column: usize,
    start_pos: usize,
    start_line: usize,
    start_column: usize,
    /// Set when the last emitted token can end a statement.
    pending_terminator: bool,
}

impl<'a> Scanner<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            chars: source.char_indices().peekable(),
            current_pos: 0,
            line: 1,
            column: 1,
            start_pos: 0,
            start_line: 1,
            start_column: 1,
            pending_terminator: false,
        }
    }

    /// Scan all tokens from the source.
    pub fn scan_tokens(&mut self) -> Result<Vec<Token>, LexerError> {
        let mut tokens = Vec::new();

        loop {
            let token = self.scan_token()?;
            let is_eof = token.kind == TokenKind::Eof;
            tokens.push(token);
            if is_eof {
                break;
            }
        }

        Ok(tokens)
    }

    /// Scan the next token.
    pub fn scan_token(&mut self) -> Result<Token, LexerError> {
        if self.skip_whitespace_and_comments() {
            self.pending_terminator = false;
            return Ok(self.make_token(TokenKind::Semicolon));
        }
        self.mark_start();

        let Some((_, c)) = self.advance() else {
            if self.pending_terminator {
                self.pending_terminator = false;
                return Ok(self.make_token(TokenKind::Semicolon));
            }
            return Ok(Token::eof(self.current_pos, self.line, self.column));
        };

        let token = match c {
            '(' => self.make_token(TokenKind::LeftParen),
            ')' => self.make_token(TokenKind::RightParen),
            '{' => self.make_token(TokenKind::LeftBrace),
            '}' => self.make_token(TokenKind::RightBrace),
            '[' => self.make_token(TokenKind::LeftBracket),
            ']' => self.make_token(TokenKind::RightBracket),
            ',' => self.make_token(TokenKind::Comma),
            ';' => self.make_token(TokenKind::Semicolon),
            ':' => self.make_token(TokenKind::Colon),
            '?' => self.make_token(TokenKind::Question),
            '~' => self.make_token(TokenKind::Tilde),
            '.' => {
                if self.peek() == Some('.') && self.peek_next() == Some('.') {
                    self.advance();
                    self.advance();
                    self.make_token(TokenKind::Ellipsis)
                } else {
                    self.make_token(TokenKind::Dot)
                }
            }
            '+' => {
                if self.match_char('+') {
                    self.make_token(TokenKind::PlusPlus)
                } else if self.match_char('=') {
                    self.make_token(TokenKind::PlusEqual)
                } else {
                    self.make_token(TokenKind::Plus)
                }
            }
            '-' => {
                if self.match_char('-') {
                    self.make_token(TokenKind::MinusMinus)
                } else if self.match_char('=') {
                    self.make_token(TokenKind::MinusEqual)
                } else {
                    self.make_token(TokenKind::Minus)
                }
            }
            '*' => self.with_assign(TokenKind::Star, TokenKind::StarEqual),
            '%' => self.with_assign(TokenKind::Percent, TokenKind::PercentEqual),
            '^' => self.with_assign(TokenKind::Caret, TokenKind::CaretEqual),
            '/' => {
                if self.match_char('/') {
                    self.make_token(TokenKind::SlashSlash)
                } else {
                    self.with_assign(TokenKind::Slash, TokenKind::SlashEqual)
                }
            }
            '&' => {
                if self.match_char('&') {
                    self.make_token(TokenKind::AndAnd)
                } else {
                    self.with_assign(TokenKind::Amp, TokenKind::AmpEqual)
                }
            }
            '|' => {
                if self.match_char('|') {
                    self.make_token(TokenKind::OrOr)
                } else {
                    self.with_assign(TokenKind::Pipe, TokenKind::PipeEqual)
                }
            }
            '=' => self.with_assign(TokenKind::Equal, TokenKind::EqualEqual),
            '!' => self.with_assign(TokenKind::Bang, TokenKind::BangEqual),
            '<' => {
                if self.match_char('<') {
                    self.make_token(TokenKind::ShiftLeft)
                } else {
                    self.with_assign(TokenKind::Less, TokenKind::LessEqual)
                }
            }
            '>' => {
                if self.match_char('>') {
                    self.make_token(TokenKind::ShiftRight)
                } else {
                    self.with_assign(TokenKind::Greater, TokenKind::GreaterEqual)
                }
            }

            '"' | '\'' => self.scan_string(c)?,

            c if c.is_ascii_digit() => self.scan_number(c)?,

            c if c.is_alphabetic() || c == '_' => self.scan_identifier(c),

            _ => return Err(LexerError::unexpected_char(c, self.current_span())),
        };

        self.pending_terminator = token.kind.ends_statement();
        Ok(token)
    }

    /// Skips blanks and comments. Returns true when a newline was crossed
    /// while a statement terminator is pending; the scanner then sits right
    /// after that newline.
    fn skip_whitespace_and_comments(&mut self) -> bool {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r') => {
                    self.advance();
                }
                Some('\n') => {
                    self.mark_start();
                    self.advance();
                    self.line += 1;
                    self.column = 1;
                    if self.pending_terminator {
                        return true;
                    }
                }
                Some('#') => {
                    while self.peek().is_some() && self.peek() != Some('\n') {
                        self.advance();
                    }
                }
                _ => return false,
            }
        }
    }

    fn with_assign(&mut self, plain: TokenKind, with_equal: TokenKind) -> Token {
        if self.match_char('=') {
            self.make_token(with_equal)
        } else {
            self.make_token(plain)
        }
    }

    fn scan_string(&mut self, quote: char) -> Result<Token, LexerError> {
        let mut value = String::new();

        loop {
            match self.peek() {
                None | Some('\n') => {
                    return Err(LexerError::unterminated_string(self.current_span()));
                }
                Some(c) if c == quote => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.peek() {
                        Some('n') => value.push('\n'),
                        Some('t') => value.push('\t'),
                        Some('\\') => value.push('\\'),
                        Some('"') => value.push('"'),
                        Some('\'') => value.push('\''),
                        Some(c) => {
                            return Err(LexerError::invalid_escape(c, self.current_span()));
                        }
                        None => {
                            return Err(LexerError::unterminated_string(self.current_span()));
                        }
                    }
                    self.advance();
                }
                Some(c) => {
                    self.advance();
                    value.push(c);
                }
            }
        }

        Ok(self.make_token(TokenKind::StringLiteral(value)))
    }

    fn scan_number(&mut self, first: char) -> Result<Token, LexerError> {
        if first == '0' && matches!(self.peek(), Some('x' | 'X')) {
            self.advance();
            let mut digits = String::new();
            while let Some(c) = self.peek().filter(|c| c.is_ascii_hexdigit()) {
                digits.push(c);
                self.advance();
            }
            let n = i64::from_str_radix(&digits, 16).map_err(|_| {
                LexerError::invalid_number(format!("0x{}", digits), self.current_span())
            })?;
            return Ok(self.make_token(TokenKind::IntLiteral(n)));
        }

        let mut value = String::from(first);
        let mut is_float = false;

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                value.push(c);
                self.advance();
            } else if c == '.' && !is_float && self.peek_next().is_some_and(|n| n.is_ascii_digit())
            {
                is_float = true;
                value.push(c);
                self.advance();
            } else {
                break;
            }
        }

        if is_float {
            let n: f64 = value
                .parse()
                .map_err(|_| LexerError::invalid_number(value.clone(), self.current_span()))?;
            Ok(self.make_token(TokenKind::FloatLiteral(n)))
        } else if value.len() > 1 && value.starts_with('0') {
            let n = i64::from_str_radix(&value[1..], 8)
                .map_err(|_| LexerError::invalid_number(value.clone(), self.current_span()))?;
            Ok(self.make_token(TokenKind::IntLiteral(n)))
        } else {
            let n: i64 = value
                .parse()
                .map_err(|_| LexerError::invalid_number(value.clone(), self.current_span()))?;
            Ok(self.make_token(TokenKind::IntLiteral(n)))
        }
    }

    fn scan_identifier(&mut self, first: char) -> Token {
        let mut value = String::from(first);

        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                value.push(c);
                self.advance();
            } else {
                break;
            }
        }

        let kind = TokenKind::keyword(&value).unwrap_or(TokenKind::Identifier(value));
        self.make_token(kind)
    }

    fn advance(&mut self) -> Option<(usize, char)> {
        if let Some((pos, c)) = self.chars.next() {
            self.current_pos = pos + c.len_utf8();
            self.column += 1;
            Some((pos, c))
        } else {
            None
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn peek_next(&self) -> Option<char> {
        let mut iter = self.source[self.current_pos..].chars();
        iter.next();
        iter.next()
    }

    fn match_char(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn mark_start(&mut self) {
        self.start_pos = self.current_pos;
        self.start_line = self.line;
        self.start_column = self.column;
    }

    fn current_span(&self) -> Span {
        Span::new(
            self.start_pos,
            self.current_pos,
            self.start_line,
            self.start_column,
        )
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        Token::new(kind, self.current_span())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scan(source: &str) -> Vec<TokenKind> {
        Scanner::new(source)
            .scan_tokens()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            scan("(){}"),
            vec![
                TokenKind::LeftParen,
                TokenKind::RightParen,
                TokenKind::LeftBrace,
                TokenKind::RightBrace,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            scan("42 3.14 0x1f 017"),
            vec![
                TokenKind::IntLiteral(42),
                TokenKind::FloatLiteral(3.14),
                TokenKind::IntLiteral(31),
                TokenKind::IntLiteral(15),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            scan(r#"'a\tb' "it\'s\n""#),
            vec![
                TokenKind::StringLiteral("a\tb".to_string()),
                TokenKind::StringLiteral("it's\n".to_string()),
                TokenKind::Semicolon,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_newline_in_string_is_error() {
        let err = Scanner::new("'abc\ndef'").scan_tokens().unwrap_err();
        assert!(matches!(err, LexerError::UnterminatedString(_)));
    }

    #[test]
    fn test_unknown_escape_is_error() {
        let err = Scanner::new(r#""\q""#).scan_tokens().unwrap_err();
        assert!(matches!(err, LexerError::InvalidEscape('q', _)));
    }

    #[test]
    fn test_keywords() {
        assert_eq!(
            scan("let func elif fallthrough goto"),
            vec![
                TokenKind::Let,
                TokenKind::Func,
                TokenKind::Elif,
                TokenKind::Fallthrough,
                TokenKind::Goto,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            scan("+ += ++ // /= << >>= ... ~ != &&"),
            vec![
                TokenKind::Plus,
                TokenKind::PlusEqual,
                TokenKind::PlusPlus,
                TokenKind::SlashSlash,
                TokenKind::SlashEqual,
                TokenKind::ShiftLeft,
                TokenKind::ShiftRight,
                TokenKind::Equal,
                TokenKind::Ellipsis,
                TokenKind::Tilde,
                TokenKind::BangEqual,
                TokenKind::AndAnd,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_semicolon_insertion() {
        assert_eq!(
            scan("a = 1\nb++\nif (x) {\n}\n"),
            vec![
                TokenKind::Identifier("a".to_string()),
                TokenKind::Equal,
                TokenKind::IntLiteral(1),
                TokenKind::Semicolon,
                TokenKind::Identifier("b".to_string()),
                TokenKind::PlusPlus,
                TokenKind::Semicolon,
                TokenKind::If,
                TokenKind::LeftParen,
                TokenKind::Identifier("x".to_string()),
                TokenKind::RightParen,
                TokenKind::LeftBrace,
                TokenKind::RightBrace,
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            scan("x # trailing\n# whole line\ny"),
            vec![
                TokenKind::Identifier("x".to_string()),
                TokenKind::Semicolon,
                TokenKind::Identifier("y".to_string()),
                TokenKind::Semicolon,
                TokenKind::Eof,
            ]
        );
    }
}

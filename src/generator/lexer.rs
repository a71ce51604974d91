//! Lexer for the message description language.
//!
//! Tokens: identifiers (keywords are plain identifiers), numbers with an
//! optional sign, fraction and decimal exponent, double-quoted strings,
//! brackets, braces, parens, colon, semicolon, equals, comma, dot, and a
//! synthetic end-of-input token. Comments start with `#` and run to the
//! end of the line.

use super::ParseError;

/// Token kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// End of input.
    End,
    /// `[A-Za-z0-9_]+`, also used for keywords.
    Ident,
    /// Numeric literal: `[+-]? digits ( . digits )? ( e [+-]? digits )?`.
    Number,
    /// `"..."` with backslash escapes, quotes included in the lexeme.
    String,
    /// `[`
    LBrack,
    /// `]`
    RBrack,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `:`
    Colon,
    /// `;`
    Semicolon,
    /// `=`
    Equals,
    /// `,`
    Comma,
    /// `.`
    Dot,
}

/// One token with its source position (1-based line and column).
#[derive(Debug, Clone)]
pub struct Token {
    /// Kind of the token.
    pub kind: TokenKind,
    /// Raw text (for strings, including the quotes).
    pub lexeme: String,
    /// Line of the first character.
    pub line: u32,
    /// Column of the first character.
    pub column: u32,
}

/// Streaming lexer with unbounded lookahead.
pub struct Lexer<'a> {
    input: &'a [u8],
    file: String,
    pos: usize,
    line: u32,
    column: u32,
    lookahead: Vec<Token>,
}

impl<'a> Lexer<'a> {
    /// Lex `input`, attributing positions to `file` in errors.
    pub fn new(input: &'a str, file: &str) -> Self {
        Self {
            input: input.as_bytes(),
            file: file.to_string(),
            pos: 0,
            line: 1,
            column: 1,
            lookahead: Vec::new(),
        }
    }

    /// Peek `k` tokens ahead without consuming.
    pub fn peek(&mut self, k: usize) -> Result<&Token, ParseError> {
        while self.lookahead.len() <= k {
            let token = self.next_impl()?;
            self.lookahead.push(token);
        }
        Ok(&self.lookahead[k])
    }

    /// Consume and return the next token.
    pub fn next(&mut self) -> Result<Token, ParseError> {
        if self.lookahead.is_empty() {
            self.next_impl()
        } else {
            Ok(self.lookahead.remove(0))
        }
    }

    fn ch(&self) -> u8 {
        *self.input.get(self.pos).unwrap_or(&0)
    }

    fn ch_next(&self) -> u8 {
        *self.input.get(self.pos + 1).unwrap_or(&0)
    }

    fn advance(&mut self) {
        if self.pos >= self.input.len() {
            return;
        }
        if self.input[self.pos] == b'\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        self.pos += 1;
    }

    fn skip_ws_and_comments(&mut self) {
        loop {
            while self.ch().is_ascii_whitespace() {
                self.advance();
            }
            if self.ch() == b'#' {
                while self.ch() != 0 && self.ch() != b'\n' {
                    self.advance();
                }
                continue;
            }
            break;
        }
    }

    fn is_ident_char(c: u8) -> bool {
        c.is_ascii_alphanumeric() || c == b'_'
    }

    fn error(&self, line: u32, column: u32, message: impl Into<String>) -> ParseError {
        ParseError::new(&self.file, line, column, message)
    }

    fn make(&self, kind: TokenKind, start: usize, line: u32, column: u32) -> Token {
        Token {
            kind,
            lexeme: String::from_utf8_lossy(&self.input[start..self.pos]).into_owned(),
            line,
            column,
        }
    }

    fn lex_string(&mut self) -> Result<Token, ParseError> {
        let (start, line, column) = (self.pos, self.line, self.column);
        self.advance(); // opening quote

        let mut escaped = false;
        loop {
            let c = self.ch();
            if c == 0 || c == b'\n' {
                return Err(self.error(line, column, "Unterminated string literal"));
            }
            if escaped {
                escaped = false;
                self.advance();
                continue;
            }
            if c == b'\\' {
                escaped = true;
                self.advance();
                continue;
            }
            if c == b'"' {
                self.advance(); // closing quote
                break;
            }
            self.advance();
        }

        Ok(self.make(TokenKind::String, start, line, column))
    }

    fn lex_number(&mut self) -> Result<Token, ParseError> {
        let (start, line, column) = (self.pos, self.line, self.column);

        if self.ch() == b'+' || self.ch() == b'-' {
            self.advance();
        }
        while self.ch().is_ascii_digit() {
            self.advance();
        }

        if self.ch() == b'.' {
            self.advance();
            while self.ch().is_ascii_digit() {
                self.advance();
            }
        }

        if self.ch() == b'e' || self.ch() == b'E' {
            self.advance();
            if self.ch() == b'+' || self.ch() == b'-' {
                self.advance();
            }
            if !self.ch().is_ascii_digit() {
                return Err(self.error(line, column, "Malformed exponent in number literal"));
            }
            while self.ch().is_ascii_digit() {
                self.advance();
            }
        }

        Ok(self.make(TokenKind::Number, start, line, column))
    }

    fn lex_ident(&mut self) -> Token {
        let (start, line, column) = (self.pos, self.line, self.column);
        while Self::is_ident_char(self.ch()) {
            self.advance();
        }
        self.make(TokenKind::Ident, start, line, column)
    }

    fn next_impl(&mut self) -> Result<Token, ParseError> {
        self.skip_ws_and_comments();

        let (line, column) = (self.line, self.column);
        let c = self.ch();

        if c == 0 {
            return Ok(Token {
                kind: TokenKind::End,
                lexeme: String::new(),
                line,
                column,
            });
        }

        if c == b'"' {
            return self.lex_string();
        }

        // Digits always start a number; a sign only when followed by one.
        if c.is_ascii_digit() || ((c == b'+' || c == b'-') && self.ch_next().is_ascii_digit()) {
            return self.lex_number();
        }

        if Self::is_ident_char(c) {
            return Ok(self.lex_ident());
        }

        let start = self.pos;
        self.advance();
        let kind = match c {
            b'[' => TokenKind::LBrack,
            b']' => TokenKind::RBrack,
            b'{' => TokenKind::LBrace,
            b'}' => TokenKind::RBrace,
            b'(' => TokenKind::LParen,
            b')' => TokenKind::RParen,
            b':' => TokenKind::Colon,
            b';' => TokenKind::Semicolon,
            b'=' => TokenKind::Equals,
            b',' => TokenKind::Comma,
            b'.' => TokenKind::Dot,
            other => {
                return Err(self.error(
                    line,
                    column,
                    format!("Unexpected character: '{}'", other as char),
                ));
            }
        };
        Ok(self.make(kind, start, line, column))
    }
}

/// Strip the quotes from a string lexeme and process escapes.
///
/// `\n \r \t \\ \"` map to their characters; unknown escapes are
/// preserved as the escaped character itself.
pub fn unquote(token: &Token, file: &str) -> Result<String, ParseError> {
    let s = token.lexeme.as_bytes();
    if s.len() < 2 || s[0] != b'"' || s[s.len() - 1] != b'"' {
        return Err(ParseError::new(
            file,
            token.line,
            token.column,
            "Internal error: invalid string token",
        ));
    }

    let inner = &s[1..s.len() - 1];
    let mut out = Vec::with_capacity(inner.len());
    let mut i = 0;
    while i < inner.len() {
        let c = inner[i];
        if c != b'\\' {
            out.push(c);
            i += 1;
            continue;
        }
        if i + 1 >= inner.len() {
            return Err(ParseError::new(
                file,
                token.line,
                token.column,
                "Invalid escape sequence in string",
            ));
        }
        let e = inner[i + 1];
        out.push(match e {
            b'n' => b'\n',
            b'r' => b'\r',
            b't' => b'\t',
            // Backslash, quote, and unknown escapes all keep the
            // escaped byte itself.
            other => other,
        });
        i += 2;
    }
    Ok(String::from_utf8_lossy(&out).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<TokenKind> {
        let mut lexer = Lexer::new(input, "<test>");
        let mut out = Vec::new();
        loop {
            let token = lexer.next().unwrap();
            let done = token.kind == TokenKind::End;
            out.push(token.kind);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn test_punctuation() {
        assert_eq!(
            kinds("[ ] { } ( ) : ; = , ."),
            vec![
                TokenKind::LBrack,
                TokenKind::RBrack,
                TokenKind::LBrace,
                TokenKind::RBrace,
                TokenKind::LParen,
                TokenKind::RParen,
                TokenKind::Colon,
                TokenKind::Semicolon,
                TokenKind::Equals,
                TokenKind::Comma,
                TokenKind::Dot,
                TokenKind::End,
            ]
        );
    }

    #[test]
    fn test_idents_and_keywords_share_a_kind() {
        let mut lexer = Lexer::new("message int32 _x9", "<test>");
        for expected in ["message", "int32", "_x9"] {
            let token = lexer.next().unwrap();
            assert_eq!(token.kind, TokenKind::Ident);
            assert_eq!(token.lexeme, expected);
        }
    }

    #[test]
    fn test_numbers() {
        for text in ["0", "42", "-7", "+3", "3.25", "-0.5", "1e6", "2.5e-3", "1E+2"] {
            let mut lexer = Lexer::new(text, "<test>");
            let token = lexer.next().unwrap();
            assert_eq!(token.kind, TokenKind::Number, "lexing {text}");
            assert_eq!(token.lexeme, text);
        }
    }

    #[test]
    fn test_malformed_exponent() {
        let mut lexer = Lexer::new("1e", "<test>");
        let err = lexer.next().unwrap_err();
        assert!(err.to_string().contains("exponent"));
    }

    #[test]
    fn test_comments_skipped() {
        assert_eq!(
            kinds("a # comment ; { }\nb"),
            vec![TokenKind::Ident, TokenKind::Ident, TokenKind::End]
        );
    }

    #[test]
    fn test_string_with_escapes() {
        let mut lexer = Lexer::new(r#""a\nb\t\"q\\ \z""#, "<test>");
        let token = lexer.next().unwrap();
        assert_eq!(token.kind, TokenKind::String);
        let text = unquote(&token, "<test>").unwrap();
        assert_eq!(text, "a\nb\t\"q\\ z");
    }

    #[test]
    fn test_unterminated_string_reports_position() {
        let mut lexer = Lexer::new("\n  \"oops", "<test>");
        let err = lexer.next().unwrap_err();
        assert_eq!(err.line(), 2);
        assert_eq!(err.column(), 3);
        assert!(err.to_string().contains("Unterminated"));
    }

    #[test]
    fn test_string_must_not_span_lines() {
        let mut lexer = Lexer::new("\"line\nbreak\"", "<test>");
        assert!(lexer.next().is_err());
    }

    #[test]
    fn test_positions_tracked() {
        let mut lexer = Lexer::new("a\n  b", "<test>");
        let a = lexer.next().unwrap();
        assert_eq!((a.line, a.column), (1, 1));
        let b = lexer.next().unwrap();
        assert_eq!((b.line, b.column), (2, 3));
    }

    #[test]
    fn test_unexpected_character() {
        let mut lexer = Lexer::new("@", "<test>");
        let err = lexer.next().unwrap_err();
        assert!(err.to_string().contains("Unexpected character"));
    }

    #[test]
    fn test_peek_does_not_consume() {
        let mut lexer = Lexer::new("a b", "<test>");
        assert_eq!(lexer.peek(0).unwrap().lexeme, "a");
        assert_eq!(lexer.peek(1).unwrap().lexeme, "b");
        assert_eq!(lexer.next().unwrap().lexeme, "a");
        assert_eq!(lexer.next().unwrap().lexeme, "b");
    }
}

//! Tokenizer for policy text.
//!
//! String literal contents are kept raw (escapes intact). The parser decodes
//! them, because `like` patterns treat `\*` differently from plain strings.

use crate::ast::PatternElem;
use crate::error::ParseError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum TokenKind {
    Ident(String),
    /// Raw string contents between the quotes.
    Str(String),
    Int(u64),
    At,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semi,
    Colon,
    ColonColon,
    Dot,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Plus,
    Minus,
    Star,
    Eof,
}

impl TokenKind {
    /// Short description used in "expected X, found Y" messages.
    pub(crate) fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("`{name}`"),
            TokenKind::Str(raw) => format!("string \"{raw}\""),
            TokenKind::Int(n) => format!("integer {n}"),
            TokenKind::Eof => "end of input".to_string(),
            other => format!("`{}`", other.symbol()),
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            TokenKind::At => "@",
            TokenKind::LParen => "(",
            TokenKind::RParen => ")",
            TokenKind::LBrace => "{",
            TokenKind::RBrace => "}",
            TokenKind::LBracket => "[",
            TokenKind::RBracket => "]",
            TokenKind::Comma => ",",
            TokenKind::Semi => ";",
            TokenKind::Colon => ":",
            TokenKind::ColonColon => "::",
            TokenKind::Dot => ".",
            TokenKind::EqEq => "==",
            TokenKind::NotEq => "!=",
            TokenKind::Lt => "<",
            TokenKind::Le => "<=",
            TokenKind::Gt => ">",
            TokenKind::Ge => ">=",
            TokenKind::AndAnd => "&&",
            TokenKind::OrOr => "||",
            TokenKind::Bang => "!",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Star => "*",
            TokenKind::Ident(_) | TokenKind::Str(_) | TokenKind::Int(_) | TokenKind::Eof => "",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    pub line: usize,
    pub column: usize,
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: usize,
    column: usize,
}

/// Splits policy text into tokens, ending with a single `Eof` token.
pub(crate) fn tokenize(src: &str) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Lexer {
        chars: src.chars().peekable(),
        line: 1,
        column: 1,
    };
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            return Ok(tokens);
        }
    }
}

impl Lexer<'_> {
    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.chars.peek() == Some(&expected) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn skip_trivia(&mut self) {
        loop {
            match self.chars.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') => {
                    let mut ahead = self.chars.clone();
                    ahead.next();
                    if ahead.peek() != Some(&'/') {
                        return;
                    }
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                _ => return,
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, ParseError> {
        self.skip_trivia();
        let (line, column) = (self.line, self.column);
        let token = |kind| Token { kind, line, column };

        let Some(c) = self.bump() else {
            return Ok(token(TokenKind::Eof));
        };

        let kind = match c {
            '@' => TokenKind::At,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semi,
            '.' => TokenKind::Dot,
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            ':' if self.eat(':') => TokenKind::ColonColon,
            ':' => TokenKind::Colon,
            '=' if self.eat('=') => TokenKind::EqEq,
            '!' if self.eat('=') => TokenKind::NotEq,
            '!' => TokenKind::Bang,
            '<' if self.eat('=') => TokenKind::Le,
            '<' => TokenKind::Lt,
            '>' if self.eat('=') => TokenKind::Ge,
            '>' => TokenKind::Gt,
            '&' if self.eat('&') => TokenKind::AndAnd,
            '|' if self.eat('|') => TokenKind::OrOr,
            '=' | '&' | '|' => {
                return Err(ParseError::new(
                    line,
                    column,
                    format!("unknown operator `{c}`"),
                ));
            }
            '"' => TokenKind::Str(self.raw_string(line, column)?),
            c if c.is_ascii_digit() => TokenKind::Int(self.integer(c, line, column)?),
            c if c.is_ascii_alphabetic() || c == '_' => TokenKind::Ident(self.ident(c)),
            other => {
                return Err(ParseError::new(
                    line,
                    column,
                    format!("unexpected character `{other}`"),
                ));
            }
        };
        Ok(token(kind))
    }

    fn raw_string(&mut self, line: usize, column: usize) -> Result<String, ParseError> {
        let mut raw = String::new();
        loop {
            match self.bump() {
                None => return Err(ParseError::new(line, column, "unterminated string literal")),
                Some('"') => return Ok(raw),
                Some('\\') => {
                    raw.push('\\');
                    match self.bump() {
                        Some(escaped) => raw.push(escaped),
                        None => {
                            return Err(ParseError::new(
                                line,
                                column,
                                "unterminated string literal",
                            ));
                        }
                    }
                }
                Some(c) => raw.push(c),
            }
        }
    }

    fn integer(&mut self, first: char, line: usize, column: usize) -> Result<u64, ParseError> {
        let mut digits = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if !c.is_ascii_digit() {
                break;
            }
            digits.push(c);
            self.bump();
        }
        digits.parse().map_err(|_| {
            ParseError::new(line, column, format!("integer literal {digits} is out of range"))
        })
    }

    fn ident(&mut self, first: char) -> String {
        let mut name = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if !(c.is_ascii_alphanumeric() || c == '_') {
                break;
            }
            name.push(c);
            self.bump();
        }
        name
    }
}

/// Decodes escapes in a raw string literal.
pub(crate) fn unescape(raw: &str) -> Result<String, String> {
    Ok(decode(raw, false)?
        .into_iter()
        .map(|elem| match elem {
            PatternElem::Char(c) => c,
            PatternElem::Wildcard => '*',
        })
        .collect())
}

/// Compiles the raw contents of a `like` pattern: `*` is a wildcard and `\*`
/// a literal star.
pub(crate) fn compile_pattern(raw: &str) -> Result<Vec<PatternElem>, String> {
    decode(raw, true)
}

fn decode(raw: &str, pattern: bool) -> Result<Vec<PatternElem>, String> {
    let mut out = Vec::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(if pattern && c == '*' {
                PatternElem::Wildcard
            } else {
                PatternElem::Char(c)
            });
            continue;
        }
        let decoded = match chars.next() {
            Some('n') => '\n',
            Some('r') => '\r',
            Some('t') => '\t',
            Some('0') => '\0',
            Some('\\') => '\\',
            Some('"') => '"',
            Some('\'') => '\'',
            Some('*') => '*',
            Some('u') => unicode_escape(&mut chars)?,
            Some(other) => return Err(format!("invalid escape sequence `\\{other}`")),
            None => return Err("dangling `\\` in string literal".to_string()),
        };
        out.push(PatternElem::Char(decoded));
    }
    Ok(out)
}

fn unicode_escape(chars: &mut std::str::Chars<'_>) -> Result<char, String> {
    if chars.next() != Some('{') {
        return Err("expected `{` after `\\u`".to_string());
    }
    let mut hex = String::new();
    for c in chars.by_ref() {
        if c == '}' {
            let code = u32::from_str_radix(&hex, 16)
                .map_err(|_| format!("invalid unicode escape `\\u{{{hex}}}`"))?;
            return char::from_u32(code)
                .ok_or_else(|| format!("invalid unicode scalar `\\u{{{hex}}}`"));
        }
        if hex.len() == 6 {
            break;
        }
        hex.push(c);
    }
    Err("unterminated unicode escape".to_string())
}

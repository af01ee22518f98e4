//! Tokenizer for component source text
//!
//! The lexer is pull-based: the parser asks for one token at a time and
//! switches to the raw JSX helpers ([`Lexer::jsx_text`], [`Lexer::jsx_name`])
//! while it is inside markup, where the token grammar does not apply.

use crate::compile::CompileError;

/// Position in the source text (1-based line and column)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    /// Line number, starting at 1
    pub line: u32,
    /// Column number, starting at 1
    pub column: u32,
    /// Byte offset into the source
    pub offset: usize,
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A lexical token
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Identifier or keyword
    Ident(String),
    /// Numeric literal
    Num(f64),
    /// String literal (quotes removed, escapes resolved)
    Str(String),
    /// Template literal split into text and `${}` chunks
    Template(Vec<TemplatePart>),
    /// Operator or punctuation
    Punct(&'static str),
    /// End of input
    Eof,
}

impl Token {
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Ident(name) => format!("identifier '{name}'"),
            Self::Num(n) => format!("number {n}"),
            Self::Str(_) => "string".to_string(),
            Self::Template(_) => "template literal".to_string(),
            Self::Punct(p) => format!("token '{p}'"),
            Self::Eof => "end of input".to_string(),
        }
    }
}

/// Piece of a template literal
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    /// Literal text
    Text(String),
    /// Embedded expression source and where it starts
    Expr {
        /// Raw source of the expression
        source: String,
        /// Start of the expression in the enclosing source
        span: Span,
    },
}

// Longest first so that `===` wins over `==` and `=`.
const PUNCTS: &[&str] = &[
    "===", "!==", "...", "=>", "==", "!=", "<=", ">=", "&&", "||", "??", "?.", "+=", "-=", "(",
    ")", "{", "}", "[", "]", ",", ";", ":", ".", "?", "+", "-", "*", "/", "%", "!", "<", ">", "=",
    "|", "&",
];

#[derive(Debug, Clone)]
pub(crate) struct Lexer<'src> {
    src: &'src str,
    pos: usize,
    line: u32,
    column: u32,
}

impl<'src> Lexer<'src> {
    pub(crate) fn new(src: &'src str) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
            column: 1,
        }
    }

    /// Lexer over an embedded fragment that starts at `span` in the outer source
    pub(crate) fn at(src: &'src str, span: Span) -> Self {
        Self {
            src,
            pos: 0,
            line: span.line,
            column: span.column,
        }
    }

    pub(crate) fn source(&self) -> &'src str {
        self.src
    }

    pub(crate) fn span(&self) -> Span {
        Span {
            line: self.line,
            column: self.column,
            offset: self.pos,
        }
    }

    /// Rewind to a previously observed span of this same lexer
    pub(crate) fn reset(&mut self, span: Span) {
        self.pos = span.offset;
        self.line = span.line;
        self.column = span.column;
    }

    pub(crate) fn peek_char(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_char_at(&self, n: usize) -> Option<char> {
        self.src[self.pos..].chars().nth(n)
    }

    pub(crate) fn bump_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    pub(crate) fn eat_char(&mut self, expected: char) -> bool {
        if self.peek_char() == Some(expected) {
            self.bump_char();
            true
        } else {
            false
        }
    }

    /// Skip whitespace and comments
    pub(crate) fn skip_trivia(&mut self) -> Result<(), CompileError> {
        loop {
            match (self.peek_char(), self.peek_char_at(1)) {
                (Some(c), _) if c.is_whitespace() => {
                    self.bump_char();
                }
                (Some('/'), Some('/')) => {
                    while let Some(c) = self.peek_char() {
                        if c == '\n' {
                            break;
                        }
                        self.bump_char();
                    }
                }
                (Some('/'), Some('*')) => {
                    let start = self.span();
                    self.bump_char();
                    self.bump_char();
                    loop {
                        match self.bump_char() {
                            Some('*') if self.peek_char() == Some('/') => {
                                self.bump_char();
                                break;
                            }
                            Some(_) => {}
                            None => {
                                return Err(CompileError::syntax(
                                    "Unterminated comment",
                                    start,
                                    self.src,
                                ))
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    pub(crate) fn next_token(&mut self) -> Result<(Token, Span), CompileError> {
        self.skip_trivia()?;
        let span = self.span();
        let Some(c) = self.peek_char() else {
            return Ok((Token::Eof, span));
        };

        if is_ident_start(c) {
            return Ok((Token::Ident(self.ident()), span));
        }
        if c.is_ascii_digit() || (c == '.' && self.peek_char_at(1).is_some_and(|d| d.is_ascii_digit()))
        {
            return self.number(span).map(|n| (Token::Num(n), span));
        }
        if c == '"' || c == '\'' {
            return self.string(c, span).map(|s| (Token::Str(s), span));
        }
        if c == '`' {
            return self.template(span).map(|t| (Token::Template(t), span));
        }

        let rest = &self.src[self.pos..];
        for punct in PUNCTS {
            if rest.starts_with(punct) {
                for _ in 0..punct.len() {
                    self.bump_char();
                }
                return Ok((Token::Punct(punct), span));
            }
        }

        Err(CompileError::syntax(
            format!("Invalid or unexpected token '{c}'"),
            span,
            self.src,
        ))
    }

    fn ident(&mut self) -> String {
        let start = self.pos;
        while self.peek_char().is_some_and(is_ident_continue) {
            self.bump_char();
        }
        self.src[start..self.pos].to_string()
    }

    fn number(&mut self, span: Span) -> Result<f64, CompileError> {
        let start = self.pos;
        while self.peek_char().is_some_and(|c| c.is_ascii_digit() || c == '_') {
            self.bump_char();
        }
        if self.peek_char() == Some('.') && self.peek_char_at(1).is_some_and(|c| c.is_ascii_digit())
        {
            self.bump_char();
            while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                self.bump_char();
            }
        }
        if matches!(self.peek_char(), Some('e' | 'E')) {
            self.bump_char();
            if matches!(self.peek_char(), Some('+' | '-')) {
                self.bump_char();
            }
            while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                self.bump_char();
            }
        }
        let text: String = self.src[start..self.pos].chars().filter(|c| *c != '_').collect();
        text.parse::<f64>()
            .map_err(|_| CompileError::syntax(format!("Invalid number '{text}'"), span, self.src))
    }

    fn escape(&mut self, span: Span) -> Result<char, CompileError> {
        match self.bump_char() {
            Some('n') => Ok('\n'),
            Some('t') => Ok('\t'),
            Some('r') => Ok('\r'),
            Some('0') => Ok('\0'),
            Some('u') => {
                let mut hex = String::new();
                if self.eat_char('{') {
                    while let Some(c) = self.bump_char() {
                        if c == '}' {
                            break;
                        }
                        hex.push(c);
                    }
                } else {
                    for _ in 0..4 {
                        if let Some(c) = self.bump_char() {
                            hex.push(c);
                        }
                    }
                }
                u32::from_str_radix(&hex, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| CompileError::syntax("Invalid Unicode escape sequence", span, self.src))
            }
            Some(other) => Ok(other),
            None => Err(CompileError::syntax("Invalid or unexpected token", span, self.src)),
        }
    }

    fn string(&mut self, quote: char, span: Span) -> Result<String, CompileError> {
        self.bump_char();
        let mut out = String::new();
        loop {
            match self.bump_char() {
                Some(c) if c == quote => return Ok(out),
                Some('\\') => out.push(self.escape(span)?),
                Some('\n') | None => {
                    return Err(CompileError::syntax("Unterminated string constant", span, self.src))
                }
                Some(c) => out.push(c),
            }
        }
    }

    fn template(&mut self, span: Span) -> Result<Vec<TemplatePart>, CompileError> {
        self.bump_char();
        let mut parts = Vec::new();
        let mut text = String::new();
        loop {
            match self.bump_char() {
                Some('`') => break,
                Some('\\') => text.push(self.escape(span)?),
                Some('$') if self.peek_char() == Some('{') => {
                    self.bump_char();
                    if !text.is_empty() {
                        parts.push(TemplatePart::Text(std::mem::take(&mut text)));
                    }
                    let expr_span = self.span();
                    let start = self.pos;
                    let mut depth = 0usize;
                    loop {
                        match self.peek_char() {
                            Some('{') => depth += 1,
                            Some('}') if depth == 0 => break,
                            Some('}') => depth -= 1,
                            None => {
                                return Err(CompileError::syntax(
                                    "Unterminated template literal",
                                    span,
                                    self.src,
                                ))
                            }
                            Some(_) => {}
                        }
                        self.bump_char();
                    }
                    parts.push(TemplatePart::Expr {
                        source: self.src[start..self.pos].to_string(),
                        span: expr_span,
                    });
                    self.bump_char();
                }
                Some(c) => text.push(c),
                None => {
                    return Err(CompileError::syntax("Unterminated template literal", span, self.src))
                }
            }
        }
        if !text.is_empty() || parts.is_empty() {
            parts.push(TemplatePart::Text(text));
        }
        Ok(parts)
    }

    /// Tag or attribute name inside markup (`div`, `aria-label`, `Chart.Line`)
    pub(crate) fn jsx_name(&mut self) -> Result<(String, Span), CompileError> {
        self.skip_trivia()?;
        let span = self.span();
        if !self.peek_char().is_some_and(is_ident_start) {
            let found = self.peek_char().map_or("end of input".to_string(), |c| format!("'{c}'"));
            return Err(CompileError::syntax(
                format!("Expected a JSX name but found {found}"),
                span,
                self.src,
            ));
        }
        let start = self.pos;
        while self
            .peek_char()
            .is_some_and(|c| is_ident_continue(c) || c == '-' || c == '.' || c == ':')
        {
            self.bump_char();
        }
        Ok((self.src[start..self.pos].to_string(), span))
    }

    /// Raw text between markup delimiters (`<` and `{`)
    pub(crate) fn jsx_text(&mut self) -> String {
        let start = self.pos;
        while let Some(c) = self.peek_char() {
            if c == '<' || c == '{' {
                break;
            }
            self.bump_char();
        }
        self.src[start..self.pos].to_string()
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_continue(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<Token> {
        let mut lexer = Lexer::new(src);
        let mut out = Vec::new();
        loop {
            let (tok, _) = lexer.next_token().unwrap();
            if tok == Token::Eof {
                break;
            }
            out.push(tok);
        }
        out
    }

    #[test]
    fn lexes_longest_punctuation() {
        assert_eq!(
            tokens("a === b !== c => d"),
            vec![
                Token::Ident("a".into()),
                Token::Punct("==="),
                Token::Ident("b".into()),
                Token::Punct("!=="),
                Token::Ident("c".into()),
                Token::Punct("=>"),
                Token::Ident("d".into()),
            ]
        );
    }

    #[test]
    fn lexes_numbers_and_strings() {
        assert_eq!(
            tokens("1_000 2.5 'it\\'s' \"x\""),
            vec![
                Token::Num(1000.0),
                Token::Num(2.5),
                Token::Str("it's".into()),
                Token::Str("x".into()),
            ]
        );
    }

    #[test]
    fn template_splits_expressions() {
        let toks = tokens("`total: ${a + b}!`");
        let Token::Template(parts) = &toks[0] else {
            panic!("expected template");
        };
        assert_eq!(parts.len(), 3);
        assert!(matches!(&parts[1], TemplatePart::Expr { source, .. } if source == "a + b"));
    }

    #[test]
    fn comments_are_skipped() {
        assert_eq!(tokens("// hi\n/* there */ x"), vec![Token::Ident("x".into())]);
    }

    #[test]
    fn unterminated_string_is_error() {
        let mut lexer = Lexer::new("'abc");
        let err = lexer.next_token().unwrap_err();
        assert!(err.message.contains("Unterminated string"));
    }

    #[test]
    fn tracks_lines_and_columns() {
        let mut lexer = Lexer::new("a\n  b");
        lexer.next_token().unwrap();
        let (_, span) = lexer.next_token().unwrap();
        assert_eq!((span.line, span.column), (2, 3));
    }
}

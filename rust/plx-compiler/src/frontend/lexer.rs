//! Indentation-aware lexer for authored logic source.

use crate::frontend::tokens::{keyword, Token, TokenKind};
use plx_core::span::Span;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum LexError {
    #[error("unexpected character '{ch}' at line {line}, col {col}")]
    UnexpectedChar { ch: char, line: usize, col: usize },
    #[error("unterminated string at line {line}, col {col}")]
    UnterminatedString { line: usize, col: usize },
    #[error("inconsistent indentation at line {line}")]
    InconsistentIndent { line: usize },
    #[error("invalid number at line {line}, col {col}")]
    InvalidNumber { line: usize, col: usize },
    #[error("tabs are not allowed in indentation (line {line})")]
    TabIndent { line: usize },
}

pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: usize,
    col: usize,
    byte_offset: usize,
    indent_stack: Vec<usize>,
    at_line_start: bool,
    /// Bracket nesting depth; newlines inside brackets are not logical.
    depth: usize,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Self {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            byte_offset: 0,
            indent_stack: vec![0],
            at_line_start: true,
            depth: 0,
        }
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.source.get(self.pos).copied()?;
        self.pos += 1;
        self.byte_offset += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.col = 1;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn span_from(&self, start_offset: usize, start_line: usize, start_col: usize) -> Span {
        Span::new(start_offset, self.byte_offset, start_line, start_col)
    }

    fn push(&self, tokens: &mut Vec<Token>, kind: TokenKind, span: Span) {
        tokens.push(Token::new(kind, span));
    }

    /// Measure the indentation of the upcoming line, emitting INDENT /
    /// DEDENT tokens against the indent stack. Blank and comment-only
    /// lines produce nothing.
    fn handle_indentation(&mut self, tokens: &mut Vec<Token>) -> Result<(), LexError> {
        loop {
            let mut indent = 0usize;
            let mut scan = self.pos;
            while let Some(ch) = self.source.get(scan).copied() {
                match ch {
                    ' ' => {
                        indent += 1;
                        scan += 1;
                    }
                    '\t' => return Err(LexError::TabIndent { line: self.line }),
                    _ => break,
                }
            }
            match self.source.get(scan).copied() {
                // Blank line or comment-only line: consume and retry.
                None => {
                    self.skip_to(scan);
                    return Ok(());
                }
                Some('\n') => {
                    self.skip_to(scan);
                    self.advance();
                    continue;
                }
                Some('#') => {
                    self.skip_to(scan);
                    while let Some(ch) = self.current() {
                        if ch == '\n' {
                            break;
                        }
                        self.advance();
                    }
                    if self.current().is_some() {
                        self.advance();
                    }
                    continue;
                }
                Some(_) => {
                    self.skip_to(scan);
                    let current = *self.indent_stack.last().unwrap_or(&0);
                    if indent > current {
                        self.indent_stack.push(indent);
                        let span = Span::new(self.byte_offset, self.byte_offset, self.line, 1);
                        self.push(tokens, TokenKind::Indent, span);
                    } else if indent < current {
                        while let Some(&top) = self.indent_stack.last() {
                            if top <= indent {
                                break;
                            }
                            self.indent_stack.pop();
                            let span =
                                Span::new(self.byte_offset, self.byte_offset, self.line, 1);
                            self.push(tokens, TokenKind::Dedent, span);
                        }
                        if *self.indent_stack.last().unwrap_or(&0) != indent {
                            return Err(LexError::InconsistentIndent { line: self.line });
                        }
                    }
                    return Ok(());
                }
            }
        }
    }

    fn skip_to(&mut self, target: usize) {
        while self.pos < target {
            self.advance();
        }
    }

    fn lex_number(&mut self, tokens: &mut Vec<Token>) -> Result<(), LexError> {
        let (so, sl, sc) = (self.byte_offset, self.line, self.col);
        let mut text = String::new();
        let mut is_float = false;
        while let Some(ch) = self.current() {
            if ch.is_ascii_digit() || ch == '_' {
                if ch != '_' {
                    text.push(ch);
                }
                self.advance();
            } else if ch == '.' && self.peek().is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                text.push(ch);
                self.advance();
            } else if (ch == 'e' || ch == 'E')
                && self
                    .peek()
                    .is_some_and(|c| c.is_ascii_digit() || c == '+' || c == '-')
            {
                is_float = true;
                text.push(ch);
                self.advance();
                if let Some(sign) = self.current() {
                    if sign == '+' || sign == '-' {
                        text.push(sign);
                        self.advance();
                    }
                }
            } else {
                break;
            }
        }
        let span = self.span_from(so, sl, sc);
        if is_float {
            let value = text
                .parse::<f64>()
                .map_err(|_| LexError::InvalidNumber { line: sl, col: sc })?;
            self.push(tokens, TokenKind::FloatLit(value), span);
        } else {
            let value = text
                .parse::<i64>()
                .map_err(|_| LexError::InvalidNumber { line: sl, col: sc })?;
            self.push(tokens, TokenKind::IntLit(value), span);
        }
        Ok(())
    }

    fn lex_string(&mut self, tokens: &mut Vec<Token>, quote: char) -> Result<(), LexError> {
        let (so, sl, sc) = (self.byte_offset, self.line, self.col);
        self.advance();
        let mut text = String::new();
        loop {
            match self.current() {
                None | Some('\n') => {
                    return Err(LexError::UnterminatedString { line: sl, col: sc })
                }
                Some(ch) if ch == quote => {
                    self.advance();
                    break;
                }
                Some('\\') => {
                    self.advance();
                    match self.current() {
                        Some('n') => text.push('\n'),
                        Some('t') => text.push('\t'),
                        Some('\\') => text.push('\\'),
                        Some(c) if c == quote => text.push(c),
                        Some(c) => {
                            text.push('\\');
                            text.push(c);
                        }
                        None => return Err(LexError::UnterminatedString { line: sl, col: sc }),
                    }
                    self.advance();
                }
                Some(ch) => {
                    text.push(ch);
                    self.advance();
                }
            }
        }
        let span = self.span_from(so, sl, sc);
        self.push(tokens, TokenKind::StringLit(text), span);
        Ok(())
    }

    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            if self.at_line_start && self.depth == 0 {
                self.at_line_start = false;
                self.handle_indentation(&mut tokens)?;
            }
            let Some(ch) = self.current() else { break };
            let (so, sl, sc) = (self.byte_offset, self.line, self.col);
            match ch {
                '\n' => {
                    self.advance();
                    if self.depth == 0 {
                        self.push(
                            &mut tokens,
                            TokenKind::Newline,
                            self.span_from(so, sl, sc),
                        );
                        self.at_line_start = true;
                    }
                }
                ' ' | '\r' => {
                    self.advance();
                }
                '#' => {
                    while let Some(c) = self.current() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                '0'..='9' => self.lex_number(&mut tokens)?,
                '"' | '\'' => self.lex_string(&mut tokens, ch)?,
                c if c.is_alphabetic() || c == '_' => {
                    let mut name = String::new();
                    while let Some(c) = self.current() {
                        if c.is_alphanumeric() || c == '_' {
                            name.push(c);
                            self.advance();
                        } else {
                            break;
                        }
                    }
                    let span = self.span_from(so, sl, sc);
                    let kind = keyword(&name).unwrap_or(TokenKind::Ident(name));
                    self.push(&mut tokens, kind, span);
                }
                _ => {
                    let kind = self.lex_operator(ch, sl, sc)?;
                    let span = self.span_from(so, sl, sc);
                    self.push(&mut tokens, kind, span);
                }
            }
        }

        // Close any open blocks.
        let end = Span::new(self.byte_offset, self.byte_offset, self.line, self.col);
        if tokens
            .last()
            .is_some_and(|t| !matches!(t.kind, TokenKind::Newline))
        {
            tokens.push(Token::new(TokenKind::Newline, end));
        }
        while self.indent_stack.len() > 1 {
            self.indent_stack.pop();
            tokens.push(Token::new(TokenKind::Dedent, end));
        }
        tokens.push(Token::new(TokenKind::Eof, end));
        Ok(tokens)
    }

    fn lex_operator(&mut self, ch: char, line: usize, col: usize) -> Result<TokenKind, LexError> {
        let two = |lexer: &mut Lexer, kind: TokenKind| {
            lexer.advance();
            lexer.advance();
            kind
        };
        let one = |lexer: &mut Lexer, kind: TokenKind| {
            lexer.advance();
            kind
        };
        Ok(match (ch, self.peek()) {
            ('=', Some('=')) => two(self, TokenKind::EqEq),
            ('=', _) => one(self, TokenKind::Assign),
            ('!', Some('=')) => two(self, TokenKind::NotEq),
            ('<', Some('=')) => two(self, TokenKind::LtEq),
            ('<', _) => one(self, TokenKind::Lt),
            ('>', Some('=')) => two(self, TokenKind::GtEq),
            ('>', _) => one(self, TokenKind::Gt),
            ('+', _) => one(self, TokenKind::Plus),
            ('-', _) => one(self, TokenKind::Minus),
            ('*', Some('*')) => two(self, TokenKind::StarStar),
            ('*', _) => one(self, TokenKind::Star),
            ('/', Some('/')) => two(self, TokenKind::SlashSlash),
            ('/', _) => one(self, TokenKind::Slash),
            ('%', _) => one(self, TokenKind::Percent),
            ('&', _) => one(self, TokenKind::Amp),
            ('|', _) => one(self, TokenKind::Pipe),
            ('^', _) => one(self, TokenKind::Caret),
            ('~', _) => one(self, TokenKind::Tilde),
            ('(', _) => {
                self.depth += 1;
                one(self, TokenKind::LParen)
            }
            (')', _) => {
                self.depth = self.depth.saturating_sub(1);
                one(self, TokenKind::RParen)
            }
            ('[', _) => {
                self.depth += 1;
                one(self, TokenKind::LBracket)
            }
            (']', _) => {
                self.depth = self.depth.saturating_sub(1);
                one(self, TokenKind::RBracket)
            }
            (':', _) => one(self, TokenKind::Colon),
            (',', _) => one(self, TokenKind::Comma),
            ('.', _) => one(self, TokenKind::Dot),
            _ => return Err(LexError::UnexpectedChar { ch, line, col }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Lexer::new(source)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn indentation_blocks() {
        let toks = kinds("if x:\n    y = 1\nz = 2\n");
        assert!(toks.contains(&TokenKind::Indent));
        assert!(toks.contains(&TokenKind::Dedent));
    }

    #[test]
    fn comments_and_blanks_ignored() {
        let toks = kinds("# header\n\nx = 1  # trailing\n");
        assert_eq!(
            toks,
            vec![
                TokenKind::Ident("x".into()),
                TokenKind::Assign,
                TokenKind::IntLit(1),
                TokenKind::Newline,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn newlines_inside_brackets_are_soft() {
        let toks = kinds("f(1,\n  2)\n");
        assert!(!toks
            .iter()
            .take_while(|t| !matches!(t, TokenKind::RParen))
            .any(|t| matches!(t, TokenKind::Newline | TokenKind::Indent)));
    }

    #[test]
    fn tab_indent_rejected() {
        assert!(matches!(
            Lexer::new("if x:\n\ty = 1\n").tokenize(),
            Err(LexError::TabIndent { .. })
        ));
    }
}

//! Recursive-descent parser for authored logic bodies.

use crate::frontend::ast::*;
use crate::frontend::tokens::{Token, TokenKind};
use plx_core::span::Span;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
#[error("{message} at line {}, col {}", .span.line, .span.col)]
pub struct ParseError {
    pub message: String,
    pub span: Span,
}

impl ParseError {
    fn new(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0 }
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn kind(&self) -> &TokenKind {
        &self.current().kind
    }

    fn span(&self) -> Span {
        self.current().span
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn check(&mut self, kind: &TokenKind) -> bool {
        if self.kind() == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.kind() == &kind {
            Ok(self.advance())
        } else {
            Err(ParseError::new(
                format!(
                    "expected {}, found {}",
                    kind.describe(),
                    self.kind().describe()
                ),
                self.span(),
            ))
        }
    }

    fn expect_ident(&mut self) -> Result<(String, Span), ParseError> {
        match self.kind().clone() {
            TokenKind::Ident(name) => {
                let span = self.span();
                self.advance();
                Ok((name, span))
            }
            other => Err(ParseError::new(
                format!("expected identifier, found {}", other.describe()),
                self.span(),
            )),
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.kind(), TokenKind::Newline) {
            self.advance();
        }
    }

    /// Parse a full method body: statements until end of source.
    pub fn parse_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        self.skip_newlines();
        while !matches!(self.kind(), TokenKind::Eof) {
            stmts.push(self.parse_stmt()?);
            self.skip_newlines();
        }
        Ok(stmts)
    }

    /// Parse a single expression source (SFC transition conditions).
    pub fn parse_single_expr(&mut self) -> Result<Expr, ParseError> {
        self.skip_newlines();
        let expr = self.parse_expr()?;
        self.skip_newlines();
        self.expect(TokenKind::Eof)?;
        Ok(expr)
    }

    /// `:` NEWLINE INDENT stmt+ DEDENT
    fn parse_suite(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(TokenKind::Colon)?;
        self.expect(TokenKind::Newline)?;
        self.skip_newlines();
        self.expect(TokenKind::Indent)?;
        let mut stmts = Vec::new();
        self.skip_newlines();
        while !matches!(self.kind(), TokenKind::Dedent | TokenKind::Eof) {
            stmts.push(self.parse_stmt()?);
            self.skip_newlines();
        }
        self.expect(TokenKind::Dedent)?;
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        let start = self.span();
        match self.kind() {
            TokenKind::If => self.parse_if(),
            TokenKind::Match => self.parse_match(),
            TokenKind::While => {
                self.advance();
                let condition = self.parse_expr()?;
                let body = self.parse_suite()?;
                Ok(Stmt::new(StmtKind::While { condition, body }, start))
            }
            TokenKind::For => {
                self.advance();
                let (var, _) = self.expect_ident()?;
                self.expect(TokenKind::In)?;
                let iter = self.parse_expr()?;
                let body = self.parse_suite()?;
                Ok(Stmt::new(StmtKind::For { var, iter, body }, start))
            }
            TokenKind::Return => {
                self.advance();
                let value = if matches!(self.kind(), TokenKind::Newline | TokenKind::Eof) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.end_of_line()?;
                Ok(Stmt::new(StmtKind::Return { value }, start))
            }
            TokenKind::Pass => {
                self.advance();
                self.end_of_line()?;
                Ok(Stmt::new(StmtKind::Pass, start))
            }
            _ => {
                let expr = self.parse_expr()?;
                if self.check(&TokenKind::Assign) {
                    let value = self.parse_expr()?;
                    self.end_of_line()?;
                    let span = start.merge(value.span);
                    Ok(Stmt::new(
                        StmtKind::Assign {
                            target: expr,
                            value,
                        },
                        span,
                    ))
                } else {
                    self.end_of_line()?;
                    let span = expr.span;
                    Ok(Stmt::new(StmtKind::Expr { expr }, span))
                }
            }
        }
    }

    fn end_of_line(&mut self) -> Result<(), ParseError> {
        match self.kind() {
            TokenKind::Newline => {
                self.advance();
                Ok(())
            }
            TokenKind::Eof | TokenKind::Dedent => Ok(()),
            other => Err(ParseError::new(
                format!("expected end of line, found {}", other.describe()),
                self.span(),
            )),
        }
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        let start = self.span();
        self.expect(TokenKind::If)?;
        let mut branches = Vec::new();
        let condition = self.parse_expr()?;
        let body = self.parse_suite()?;
        branches.push((condition, body));
        let mut else_body = None;
        loop {
            self.skip_newlines();
            if self.check(&TokenKind::Elif) {
                let condition = self.parse_expr()?;
                let body = self.parse_suite()?;
                branches.push((condition, body));
            } else if self.check(&TokenKind::Else) {
                else_body = Some(self.parse_suite()?);
                break;
            } else {
                break;
            }
        }
        Ok(Stmt::new(
            StmtKind::If {
                branches,
                else_body,
            },
            start,
        ))
    }

    fn parse_match(&mut self) -> Result<Stmt, ParseError> {
        let start = self.span();
        self.expect(TokenKind::Match)?;
        let subject = self.parse_expr()?;
        self.expect(TokenKind::Colon)?;
        self.expect(TokenKind::Newline)?;
        self.skip_newlines();
        self.expect(TokenKind::Indent)?;
        let mut arms = Vec::new();
        self.skip_newlines();
        while matches!(self.kind(), TokenKind::Case) {
            let arm_span = self.span();
            self.advance();
            let pattern = self.parse_pattern()?;
            let body = self.parse_suite()?;
            arms.push(MatchArm {
                pattern,
                body,
                span: arm_span,
            });
            self.skip_newlines();
        }
        self.expect(TokenKind::Dedent)?;
        if arms.is_empty() {
            return Err(ParseError::new("match statement has no case arms", start));
        }
        Ok(Stmt::new(StmtKind::Match { subject, arms }, start))
    }

    fn parse_pattern(&mut self) -> Result<Pattern, ParseError> {
        let start = self.span();
        let first = self.parse_pattern_atom()?;
        if !matches!(self.kind(), TokenKind::Pipe) {
            return Ok(first);
        }
        let mut alternatives = vec![first];
        while self.check(&TokenKind::Pipe) {
            alternatives.push(self.parse_pattern_atom()?);
        }
        Ok(Pattern::Or(alternatives, start))
    }

    fn parse_pattern_atom(&mut self) -> Result<Pattern, ParseError> {
        let span = self.span();
        match self.kind().clone() {
            TokenKind::IntLit(v) => {
                self.advance();
                Ok(Pattern::Int(v, span))
            }
            TokenKind::Minus => {
                self.advance();
                match self.kind().clone() {
                    TokenKind::IntLit(v) => {
                        self.advance();
                        Ok(Pattern::Int(-v, span))
                    }
                    other => Err(ParseError::new(
                        format!("expected integer after '-', found {}", other.describe()),
                        self.span(),
                    )),
                }
            }
            TokenKind::Ident(name) => {
                self.advance();
                if name == "_" {
                    return Ok(Pattern::Wildcard(span));
                }
                let mut path = vec![name];
                while self.check(&TokenKind::Dot) {
                    let (part, _) = self.expect_ident()?;
                    path.push(part);
                }
                Ok(Pattern::Path(path, span))
            }
            TokenKind::If => Err(ParseError::new(
                "guards on case patterns are not supported",
                span,
            )),
            other => Err(ParseError::new(
                format!("unsupported case pattern {}", other.describe()),
                span,
            )),
        }
    }

    // ── Expressions, loosest to tightest binding ──

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let value = self.parse_or()?;
        if self.check(&TokenKind::If) {
            let condition = self.parse_or()?;
            self.expect(TokenKind::Else)?;
            let else_value = self.parse_expr()?;
            let span = value.span.merge(else_value.span);
            return Ok(Expr::new(
                ExprKind::Ternary {
                    condition: Box::new(condition),
                    then_value: Box::new(value),
                    else_value: Box::new(else_value),
                },
                span,
            ));
        }
        Ok(value)
    }

    fn parse_bool_op(
        &mut self,
        op: BoolOpKind,
        token: TokenKind,
        next: fn(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        let first = next(self)?;
        if self.kind() != &token {
            return Ok(first);
        }
        let mut values = vec![first];
        while self.check(&token) {
            values.push(next(self)?);
        }
        let span = values[0].span.merge(values[values.len() - 1].span);
        Ok(Expr::new(ExprKind::BoolOp { op, values }, span))
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        self.parse_bool_op(BoolOpKind::Or, TokenKind::Or, Self::parse_and)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        self.parse_bool_op(BoolOpKind::And, TokenKind::And, Self::parse_not)
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if matches!(self.kind(), TokenKind::Not) {
            let span = self.span();
            self.advance();
            let operand = self.parse_not()?;
            let span = span.merge(operand.span);
            return Ok(Expr::new(
                ExprKind::Unary {
                    op: UnaryOp::Not,
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        self.parse_comparison()
    }

    fn comparison_op(&self) -> Option<CmpOp> {
        Some(match self.kind() {
            TokenKind::EqEq => CmpOp::Eq,
            TokenKind::NotEq => CmpOp::NotEq,
            TokenKind::Lt => CmpOp::Lt,
            TokenKind::LtEq => CmpOp::LtEq,
            TokenKind::Gt => CmpOp::Gt,
            TokenKind::GtEq => CmpOp::GtEq,
            _ => return None,
        })
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let left = self.parse_bitor()?;
        let Some(op) = self.comparison_op() else {
            return Ok(left);
        };
        self.advance();
        let right = self.parse_bitor()?;
        if self.comparison_op().is_some() {
            return Err(ParseError::new(
                "chained comparisons are not supported",
                self.span(),
            ));
        }
        let span = left.span.merge(right.span);
        Ok(Expr::new(
            ExprKind::Compare {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            span,
        ))
    }

    fn parse_binary(
        &mut self,
        table: &[(TokenKind, BinOp)],
        next: fn(&mut Self) -> Result<Expr, ParseError>,
    ) -> Result<Expr, ParseError> {
        let mut left = next(self)?;
        'outer: loop {
            for (token, op) in table {
                if self.kind() == token {
                    self.advance();
                    let right = next(self)?;
                    let span = left.span.merge(right.span);
                    left = Expr::new(
                        ExprKind::Binary {
                            op: *op,
                            left: Box::new(left),
                            right: Box::new(right),
                        },
                        span,
                    );
                    continue 'outer;
                }
            }
            return Ok(left);
        }
    }

    fn parse_bitor(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary(&[(TokenKind::Pipe, BinOp::BitOr)], Self::parse_bitxor)
    }

    fn parse_bitxor(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary(&[(TokenKind::Caret, BinOp::BitXor)], Self::parse_bitand)
    }

    fn parse_bitand(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary(&[(TokenKind::Amp, BinOp::BitAnd)], Self::parse_addsub)
    }

    fn parse_addsub(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary(
            &[(TokenKind::Plus, BinOp::Add), (TokenKind::Minus, BinOp::Sub)],
            Self::parse_term,
        )
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        self.parse_binary(
            &[
                (TokenKind::Star, BinOp::Mul),
                (TokenKind::Slash, BinOp::Div),
                (TokenKind::SlashSlash, BinOp::FloorDiv),
                (TokenKind::Percent, BinOp::Mod),
            ],
            Self::parse_unary,
        )
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let span = self.span();
        let op = match self.kind() {
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            _ => None,
        };
        if let Some(op) = op {
            self.advance();
            let operand = self.parse_unary()?;
            let span = span.merge(operand.span);
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand),
                },
                span,
            ));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_postfix()?;
        if self.check(&TokenKind::StarStar) {
            let exponent = self.parse_unary()?;
            let span = base.span.merge(exponent.span);
            return Ok(Expr::new(
                ExprKind::Binary {
                    op: BinOp::Pow,
                    left: Box::new(base),
                    right: Box::new(exponent),
                },
                span,
            ));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_atom()?;
        loop {
            match self.kind() {
                TokenKind::Dot => {
                    self.advance();
                    let (attr, attr_span) = self.expect_ident()?;
                    let span = expr.span.merge(attr_span);
                    expr = Expr::new(
                        ExprKind::Attribute {
                            value: Box::new(expr),
                            attr,
                        },
                        span,
                    );
                }
                TokenKind::LParen => {
                    self.advance();
                    let (args, named) = self.parse_call_args()?;
                    let close = self.expect(TokenKind::RParen)?;
                    let span = expr.span.merge(close.span);
                    expr = Expr::new(
                        ExprKind::Call {
                            func: Box::new(expr),
                            args,
                            named,
                        },
                        span,
                    );
                }
                TokenKind::LBracket => {
                    self.advance();
                    let mut indexes = vec![self.parse_expr()?];
                    while self.check(&TokenKind::Comma) {
                        indexes.push(self.parse_expr()?);
                    }
                    let close = self.expect(TokenKind::RBracket)?;
                    let span = expr.span.merge(close.span);
                    expr = Expr::new(
                        ExprKind::Subscript {
                            value: Box::new(expr),
                            indexes,
                        },
                        span,
                    );
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), ParseError> {
        let mut args = Vec::new();
        let mut named: Vec<(String, Expr)> = Vec::new();
        if matches!(self.kind(), TokenKind::RParen) {
            return Ok((args, named));
        }
        loop {
            // `name=value` forms a named argument; a bare expression may not
            // follow one.
            let is_named = matches!(self.kind(), TokenKind::Ident(_))
                && matches!(
                    self.tokens.get(self.pos + 1).map(|t| &t.kind),
                    Some(TokenKind::Assign)
                );
            if is_named {
                let (name, _) = self.expect_ident()?;
                self.expect(TokenKind::Assign)?;
                let value = self.parse_expr()?;
                named.push((name, value));
            } else {
                if !named.is_empty() {
                    return Err(ParseError::new(
                        "positional argument after named argument",
                        self.span(),
                    ));
                }
                args.push(self.parse_expr()?);
            }
            if !self.check(&TokenKind::Comma) {
                break;
            }
        }
        Ok((args, named))
    }

    fn parse_atom(&mut self) -> Result<Expr, ParseError> {
        let span = self.span();
        match self.kind().clone() {
            TokenKind::IntLit(v) => {
                self.advance();
                Ok(Expr::new(ExprKind::Int(v), span))
            }
            TokenKind::FloatLit(v) => {
                self.advance();
                Ok(Expr::new(ExprKind::Float(v), span))
            }
            TokenKind::StringLit(s) => {
                self.advance();
                Ok(Expr::new(ExprKind::Str(s), span))
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(true), span))
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::new(ExprKind::Bool(false), span))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Expr::new(ExprKind::Name(name), span))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                if matches!(self.kind(), TokenKind::Comma) {
                    return Err(ParseError::new("tuples are not supported", self.span()));
                }
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            other => Err(ParseError::new(
                format!("unexpected {}", other.describe()),
                span,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::lexer::Lexer;

    fn parse(source: &str) -> Result<Vec<Stmt>, ParseError> {
        let tokens = Lexer::new(source).tokenize().expect("lex");
        Parser::new(tokens).parse_body()
    }

    #[test]
    fn assignment_and_if() {
        let stmts = parse("if self.cmd:\n    self.run = True\nelse:\n    self.run = False\n")
            .unwrap();
        assert_eq!(stmts.len(), 1);
        assert!(matches!(&stmts[0].kind, StmtKind::If { branches, else_body }
            if branches.len() == 1 && else_body.is_some()));
    }

    #[test]
    fn match_with_or_pattern_and_wildcard() {
        let stmts = parse(
            "match self.step:\n    case 1 | 2:\n        pass\n    case _:\n        pass\n",
        )
        .unwrap();
        let StmtKind::Match { arms, .. } = &stmts[0].kind else {
            panic!("expected match");
        };
        assert_eq!(arms.len(), 2);
        assert!(matches!(arms[0].pattern, Pattern::Or(..)));
        assert!(matches!(arms[1].pattern, Pattern::Wildcard(..)));
    }

    #[test]
    fn named_call_arguments() {
        let stmts = parse("self.out = delayed(self.cmd, seconds=5)\n").unwrap();
        let StmtKind::Assign { value, .. } = &stmts[0].kind else {
            panic!("expected assign");
        };
        let ExprKind::Call { args, named, .. } = &value.kind else {
            panic!("expected call");
        };
        assert_eq!(args.len(), 1);
        assert_eq!(named[0].0, "seconds");
    }

    #[test]
    fn chained_comparison_rejected() {
        assert!(parse("self.x = 1 < self.y < 3\n").is_err());
    }

    #[test]
    fn ternary() {
        let stmts = parse("self.x = 1 if self.cmd else 2\n").unwrap();
        let StmtKind::Assign { value, .. } = &stmts[0].kind else {
            panic!("expected assign");
        };
        assert!(matches!(value.kind, ExprKind::Ternary { .. }));
    }

    #[test]
    fn for_over_range() {
        let stmts = parse("for i in range(0, 10):\n    pass\n").unwrap();
        assert!(matches!(&stmts[0].kind, StmtKind::For { var, .. } if var == "i"));
    }
}

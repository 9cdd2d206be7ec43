//! Authored AST → IR lowering: name resolution against the POU's declared
//! variables, syntax mapping, sentinel expansion with stable instance
//! names, and type annotation of every produced expression.

use crate::diagnostics::{CompileError, CompileErrors, ErrorKind, Warning};
use crate::frontend::ast;
use crate::frontend::lexer::Lexer;
use crate::frontend::parser::Parser;
use crate::typerules;
use plx_core::ir::{
    self, BinaryOp, CaseArm, CaseLabel, Expr, ExprKind, IfBranch, PathSegment, Stmt, StmtKind,
    UnaryOp, VarPath,
};
use plx_core::pou::{BlockRole, Pou, PouKind, VarDecl};
use plx_core::span::Span;
use plx_core::stdfb::StdFb;
use plx_core::time::IecDuration;
use plx_core::types::{ElementaryType, Type, TypeTable};
use plx_core::value::Value;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};

/// Compile context shared across POUs: the user type table and the POUs
/// already materialized (for parents and user-FB instance typing).
pub struct Ctx<'a> {
    pub types: TypeTable<'a>,
    pub pous: HashMap<&'a str, &'a Pou>,
}

impl<'a> Ctx<'a> {
    pub fn new(types: TypeTable<'a>) -> Self {
        Self {
            types,
            pous: HashMap::new(),
        }
    }

    pub fn with_pous(types: TypeTable<'a>, pous: impl IntoIterator<Item = &'a Pou>) -> Self {
        let mut ctx = Self::new(types);
        for pou in pous {
            ctx.pous.insert(pou.name.as_str(), pou);
        }
        ctx
    }

    pub fn pou(&self, name: &str) -> Option<&'a Pou> {
        self.pous.get(name).copied()
    }
}

/// The view of a POU's declarations the lowerer resolves `self.X` against.
#[derive(Debug, Clone)]
pub struct Scope {
    pub pou_name: String,
    pub kind: PouKind,
    pub parent: Option<String>,
    vars: Vec<(String, BlockRole, Type)>,
    methods: Vec<(String, Type)>,
}

impl Scope {
    pub fn new(pou_name: impl Into<String>, kind: PouKind, parent: Option<String>) -> Self {
        Self {
            pou_name: pou_name.into(),
            kind,
            parent,
            vars: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn declare(&mut self, name: impl Into<String>, role: BlockRole, ty: Type) {
        self.vars.push((name.into(), role, ty));
    }

    pub fn declare_method(&mut self, name: impl Into<String>, return_type: Type) {
        self.methods.push((name.into(), return_type));
    }

    pub fn var(&self, name: &str) -> Option<(BlockRole, &Type)> {
        self.vars
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, role, ty)| (*role, ty))
    }

    fn method_return(&self, name: &str) -> Option<&Type> {
        self.methods
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, ty)| ty)
    }
}

/// Everything a successful lowering produces besides the statements.
#[derive(Debug, Clone)]
pub struct LoweredBody {
    pub stmts: Vec<Stmt>,
    /// Synthesized FB instances, appended to the POU's static block.
    pub synthesized_locals: Vec<VarDecl>,
    /// Synthesized induction variables, appended to the temp block.
    pub synthesized_temps: Vec<VarDecl>,
    pub warnings: Vec<Warning>,
    pub fingerprint: String,
}

pub fn fingerprint(source: &str) -> String {
    format!("sha256:{:x}", Sha256::digest(source.as_bytes()))
}

/// Lower one authored logic body. Errors are collected per POU and
/// reported together.
pub fn lower_logic(
    source: &str,
    scope: &Scope,
    ctx: &Ctx<'_>,
) -> Result<LoweredBody, CompileErrors> {
    let mut lowerer = Lowerer::new(scope, ctx);
    let stmts = lowerer.lower_source_body(source);
    lowerer.warn_unassigned_outputs(&stmts);
    let (synthesized_locals, synthesized_temps, warnings) = lowerer.finish()?;
    Ok(LoweredBody {
        stmts,
        synthesized_locals,
        synthesized_temps,
        warnings,
        fingerprint: fingerprint(source),
    })
}

const SENTINELS: &[(&str, StdFb)] = &[
    ("delayed", StdFb::Ton),
    ("sustained", StdFb::Tof),
    ("pulse", StdFb::Tp),
    ("rising", StdFb::RTrig),
    ("falling", StdFb::FTrig),
    ("count_up", StdFb::Ctu),
    ("count_down", StdFb::Ctd),
];

fn sentinel(name: &str) -> Option<StdFb> {
    SENTINELS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, fb)| *fb)
}

/// Stateful lowerer. One instance covers a whole POU so that sentinel
/// counters stay stable across chart snippets.
pub struct Lowerer<'a, 'c> {
    scope: &'a Scope,
    ctx: &'a Ctx<'c>,
    counters: HashMap<StdFb, usize>,
    synthesized: Vec<VarDecl>,
    temps: Vec<VarDecl>,
    errors: Vec<CompileError>,
    warnings: Vec<Warning>,
    /// FB invocations synthesized for the current statement.
    prelude: Vec<Stmt>,
    loop_vars: Vec<String>,
    allow_prelude: bool,
}

impl<'a, 'c> Lowerer<'a, 'c> {
    pub fn new(scope: &'a Scope, ctx: &'a Ctx<'c>) -> Self {
        Self {
            scope,
            ctx,
            counters: HashMap::new(),
            synthesized: Vec::new(),
            temps: Vec::new(),
            errors: Vec::new(),
            warnings: Vec::new(),
            prelude: Vec::new(),
            loop_vars: Vec::new(),
            allow_prelude: true,
        }
    }

    pub fn finish(self) -> Result<(Vec<VarDecl>, Vec<VarDecl>, Vec<Warning>), CompileErrors> {
        match CompileErrors::from_vec(self.errors) {
            Some(errors) => Err(errors),
            None => Ok((self.synthesized, self.temps, self.warnings)),
        }
    }

    pub fn take_errors(&mut self) -> Vec<CompileError> {
        std::mem::take(&mut self.errors)
    }

    fn error(&mut self, kind: ErrorKind, message: impl Into<String>, span: Span) {
        self.errors.push(CompileError::spanned(kind, message, span));
    }

    /// Placeholder expression emitted after an error so lowering can keep
    /// collecting diagnostics.
    fn poison(&self, span: Span) -> Expr {
        Expr::typed(ExprKind::Literal(Value::Bool(false)), Type::BOOL, span)
    }

    // ── Source entry points ──

    /// Lex, parse, and lower a statement body.
    pub fn lower_source_body(&mut self, source: &str) -> Vec<Stmt> {
        match self.parse_body(source) {
            Some(stmts) => self.lower_block(&stmts),
            None => Vec::new(),
        }
    }

    /// Lower a single boolean expression (SFC transition conditions).
    /// Timing sentinels are rejected here: a condition has no statement
    /// position to carry the synthesized invocation, so authored charts
    /// invoke declared timers from step actions instead.
    pub fn lower_condition_source(&mut self, source: &str) -> Option<Expr> {
        let tokens = match Lexer::new(source).tokenize() {
            Ok(tokens) => tokens,
            Err(e) => {
                self.errors.push(lex_error(e));
                return None;
            }
        };
        let parsed = match Parser::new(tokens).parse_single_expr() {
            Ok(expr) => expr,
            Err(e) => {
                self.errors
                    .push(CompileError::spanned(ErrorKind::SyntaxUnsupported, e.message, e.span));
                return None;
            }
        };
        let was_allowed = self.allow_prelude;
        self.allow_prelude = false;
        let expr = self.lower_expr(&parsed);
        self.allow_prelude = was_allowed;
        self.require_bool(&expr, "transition condition");
        Some(expr)
    }

    fn parse_body(&mut self, source: &str) -> Option<Vec<ast::Stmt>> {
        let tokens = match Lexer::new(source).tokenize() {
            Ok(tokens) => tokens,
            Err(e) => {
                self.errors.push(lex_error(e));
                return None;
            }
        };
        match Parser::new(tokens).parse_body() {
            Ok(stmts) => Some(stmts),
            Err(e) => {
                self.errors
                    .push(CompileError::spanned(ErrorKind::SyntaxUnsupported, e.message, e.span));
                None
            }
        }
    }

    // ── Statements ──

    pub fn lower_block(&mut self, stmts: &[ast::Stmt]) -> Vec<Stmt> {
        let mut out = Vec::new();
        for stmt in stmts {
            let lowered = self.lower_stmt(stmt);
            out.append(&mut self.prelude);
            out.extend(lowered);
        }
        out
    }

    fn lower_stmt(&mut self, stmt: &ast::Stmt) -> Vec<Stmt> {
        let span = stmt.span;
        match &stmt.kind {
            ast::StmtKind::Assign { target, value } => {
                let Some((path, target_ty)) = self.lower_assign_target(target) else {
                    // Still lower the value for its own diagnostics.
                    let _ = self.lower_expr(value);
                    return vec![];
                };
                let value = self.lower_expr(value);
                if value.ty.is_some() && !typerules::expr_assignable(&target_ty, &value) {
                    self.error(
                        ErrorKind::TypeMismatch,
                        format!(
                            "cannot assign {} to '{}' of type {}",
                            type_name(&value),
                            path,
                            target_ty
                        ),
                        span,
                    );
                }
                vec![Stmt::new(StmtKind::Assign { target: path, value }, span)]
            }
            ast::StmtKind::If {
                branches,
                else_body,
            } => {
                let mut lowered_branches = Vec::new();
                for (condition, body) in branches {
                    let condition = self.lower_expr(condition);
                    self.require_bool(&condition, "if condition");
                    let body = self.lower_block(body);
                    lowered_branches.push(IfBranch { condition, body });
                }
                let else_body = else_body
                    .as_ref()
                    .map(|body| self.lower_block(body))
                    .unwrap_or_default();
                vec![Stmt::new(
                    StmtKind::If {
                        branches: lowered_branches,
                        else_body,
                    },
                    span,
                )]
            }
            ast::StmtKind::Match { subject, arms } => self.lower_match(subject, arms, span),
            ast::StmtKind::While { condition, body } => {
                let condition = self.lower_expr(condition);
                self.require_bool(&condition, "while condition");
                let body = self.lower_block(body);
                vec![Stmt::new(StmtKind::While { condition, body }, span)]
            }
            ast::StmtKind::For { var, iter, body } => self.lower_for(var, iter, body, span),
            ast::StmtKind::Return { value } => {
                let return_type = match &self.scope.kind {
                    PouKind::Function { return_type } => Some(return_type.clone()),
                    _ => {
                        self.error(
                            ErrorKind::SyntaxUnsupported,
                            "return is only allowed in functions",
                            span,
                        );
                        None
                    }
                };
                let value = value.as_ref().map(|v| self.lower_expr(v));
                if let (Some(return_type), Some(value)) = (&return_type, &value) {
                    if value.ty.is_some() && !typerules::expr_assignable(return_type, value) {
                        self.error(
                            ErrorKind::TypeMismatch,
                            format!(
                                "return value {} does not match return type {}",
                                type_name(value),
                                return_type
                            ),
                            span,
                        );
                    }
                }
                vec![Stmt::new(StmtKind::Return(value), span)]
            }
            ast::StmtKind::Expr { expr } => self.lower_expr_stmt(expr, span),
            ast::StmtKind::Pass => vec![Stmt::new(StmtKind::Empty, span)],
        }
    }

    /// A bare call statement: `super().logic()` or a declared FB instance
    /// invocation. Anything else has no IR counterpart.
    fn lower_expr_stmt(&mut self, expr: &ast::Expr, span: Span) -> Vec<Stmt> {
        let ast::ExprKind::Call { func, args, named } = &expr.kind else {
            self.error(
                ErrorKind::SyntaxUnsupported,
                "only call statements are supported in statement position",
                span,
            );
            return vec![];
        };

        // super().logic()
        if let ast::ExprKind::Attribute { value, attr } = &func.kind {
            if let ast::ExprKind::Call { func: inner, .. } = &value.kind {
                if matches!(&inner.kind, ast::ExprKind::Name(n) if n == "super") {
                    if attr != "logic" || !args.is_empty() || !named.is_empty() {
                        self.error(
                            ErrorKind::SyntaxUnsupported,
                            "only super().logic() is supported",
                            span,
                        );
                        return vec![];
                    }
                    if self.scope.parent.is_none() {
                        self.error(
                            ErrorKind::NameUnresolved,
                            format!("'{}' has no parent to call", self.scope.pou_name),
                            span,
                        );
                        return vec![];
                    }
                    return vec![Stmt::new(StmtKind::SuperCall, span)];
                }
            }
        }

        // self.instance(IN=..., PT=...)
        if let Some((path, ty)) = self.try_lower_path(func) {
            if let Type::Fb(fb_name) = &ty {
                let fb_name = fb_name.clone();
                if !args.is_empty() {
                    self.error(
                        ErrorKind::SyntaxUnsupported,
                        "function block inputs must be passed by name",
                        span,
                    );
                    return vec![];
                }
                let inputs = self.lower_fb_inputs(&fb_name, named, span);
                return vec![Stmt::new(
                    StmtKind::InvokeFb {
                        instance: path,
                        inputs,
                    },
                    span,
                )];
            }
        }

        self.error(
            ErrorKind::SyntaxUnsupported,
            "statement-position call must be super().logic() or a function block invocation",
            span,
        );
        vec![]
    }

    fn lower_fb_inputs(
        &mut self,
        fb_name: &str,
        named: &[(String, ast::Expr)],
        span: Span,
    ) -> Vec<(String, Expr)> {
        let mut inputs = Vec::new();
        for (name, value) in named {
            let value = self.lower_expr(value);
            let expected = self.fb_input_type(fb_name, name);
            match expected {
                Some(expected) => {
                    if value.ty.is_some() && !typerules::expr_assignable(&expected, &value) {
                        self.error(
                            ErrorKind::TypeMismatch,
                            format!(
                                "input '{}' of {} expects {}, got {}",
                                name,
                                fb_name,
                                expected,
                                type_name(&value)
                            ),
                            span,
                        );
                    }
                }
                None => {
                    self.error(
                        ErrorKind::NameUnresolved,
                        format!("{} has no input '{}'", fb_name, name),
                        span,
                    );
                }
            }
            inputs.push((name.clone(), value));
        }
        inputs
    }

    /// Find a member declaration anywhere along a user FB's inheritance
    /// chain.
    fn user_fb_var(&self, fb_name: &str, member: &str) -> Option<(BlockRole, Type)> {
        let mut seen = HashSet::new();
        let mut cursor = self.ctx.pou(fb_name);
        while let Some(pou) = cursor {
            if !seen.insert(pou.name.as_str()) {
                return None;
            }
            if let Some((role, decl)) = pou.find_var(member) {
                return Some((role, decl.ty.clone()));
            }
            cursor = pou.parent.as_deref().and_then(|p| self.ctx.pou(p));
        }
        None
    }

    fn fb_input_type(&self, fb_name: &str, input: &str) -> Option<Type> {
        if let Some(fb) = StdFb::from_type_name(fb_name) {
            return fb.input(input).cloned();
        }
        let (role, ty) = self.user_fb_var(fb_name, input)?;
        matches!(role, BlockRole::Input | BlockRole::InOut).then_some(ty)
    }

    fn fb_member_type(&self, fb_name: &str, member: &str) -> Option<Type> {
        if let Some(fb) = StdFb::from_type_name(fb_name) {
            return fb
                .output(member)
                .or_else(|| fb.input(member))
                .cloned();
        }
        // Temp variables of an instance are not addressable from outside.
        let (role, ty) = self.user_fb_var(fb_name, member)?;
        (role != BlockRole::Temp).then_some(ty)
    }

    fn lower_match(
        &mut self,
        subject: &ast::Expr,
        arms: &[ast::MatchArm],
        span: Span,
    ) -> Vec<Stmt> {
        let selector = self.lower_expr(subject);
        let selector_enum = match &selector.ty {
            Some(Type::Enum(name)) => Some(name.clone()),
            Some(ty) if ty.is_integer() => None,
            Some(ty) => {
                self.error(
                    ErrorKind::TypeMismatch,
                    format!("match selector must be an integer or enum, got {}", ty),
                    selector.span,
                );
                None
            }
            None => None,
        };

        let mut lowered_arms: Vec<CaseArm> = Vec::new();
        let mut default: Option<Vec<Stmt>> = None;
        for (i, arm) in arms.iter().enumerate() {
            if matches!(arm.pattern, ast::Pattern::Wildcard(_)) {
                if i + 1 != arms.len() {
                    self.error(
                        ErrorKind::SyntaxUnsupported,
                        "wildcard case must be the last arm",
                        arm.span,
                    );
                }
                default = Some(self.lower_block(&arm.body));
                continue;
            }
            let mut labels = Vec::new();
            self.lower_pattern(&arm.pattern, selector_enum.as_deref(), &mut labels);
            let body = self.lower_block(&arm.body);
            lowered_arms.push(CaseArm {
                labels,
                body,
                span: arm.span,
            });
        }

        // Exhaustiveness over enum selectors is advisory only.
        if let (Some(enum_name), None) = (&selector_enum, &default) {
            if let Some(def) = self.ctx.types.enumeration(enum_name) {
                let covered: HashSet<&str> = lowered_arms
                    .iter()
                    .flat_map(|arm| arm.labels.iter())
                    .filter_map(|label| match label {
                        CaseLabel::EnumVariant { variant, .. } => Some(variant.as_str()),
                        CaseLabel::Int(_) => None,
                    })
                    .collect();
                let missing: Vec<&str> = def
                    .variants
                    .iter()
                    .map(|v| v.name.as_str())
                    .filter(|name| !covered.contains(name))
                    .collect();
                if !missing.is_empty() {
                    self.warnings.push(Warning::new(
                        format!(
                            "match on {} does not cover: {}",
                            enum_name,
                            missing.join(", ")
                        ),
                        Some(span),
                    ));
                }
            }
        }

        match ir::case_stmt(selector, lowered_arms, default, span) {
            Ok(stmt) => vec![stmt],
            Err(ir::IrError::CaseOverlap { label }) => {
                self.error(
                    ErrorKind::CaseOverlap,
                    format!("case label {} appears in more than one arm", label),
                    span,
                );
                vec![]
            }
            Err(e) => {
                self.error(ErrorKind::InternalInvariant, e.to_string(), span);
                vec![]
            }
        }
    }

    fn lower_pattern(
        &mut self,
        pattern: &ast::Pattern,
        selector_enum: Option<&str>,
        labels: &mut Vec<CaseLabel>,
    ) {
        match pattern {
            ast::Pattern::Or(alternatives, _) => {
                for alt in alternatives {
                    self.lower_pattern(alt, selector_enum, labels);
                }
            }
            ast::Pattern::Int(value, span) => {
                if let Some(enum_name) = selector_enum {
                    self.error(
                        ErrorKind::TypeMismatch,
                        format!("integer case label on {} selector", enum_name),
                        *span,
                    );
                    return;
                }
                labels.push(CaseLabel::Int(*value));
            }
            ast::Pattern::Path(path, span) => {
                let Some(enum_name) = selector_enum else {
                    self.error(
                        ErrorKind::TypeMismatch,
                        "enum case label on an integer selector",
                        *span,
                    );
                    return;
                };
                let variant = match path.len() {
                    1 => path[0].as_str(),
                    2 if path[0] == enum_name => path[1].as_str(),
                    _ => {
                        self.error(
                            ErrorKind::NameUnresolved,
                            format!("case pattern '{}' does not name a variant of {}", path.join("."), enum_name),
                            *span,
                        );
                        return;
                    }
                };
                let known = self
                    .ctx
                    .types
                    .enumeration(enum_name)
                    .is_some_and(|def| def.variant(variant).is_some());
                if !known {
                    self.error(
                        ErrorKind::NameUnresolved,
                        format!("{} has no variant '{}'", enum_name, variant),
                        *span,
                    );
                    return;
                }
                labels.push(CaseLabel::EnumVariant {
                    type_name: enum_name.to_string(),
                    variant: variant.to_string(),
                });
            }
            ast::Pattern::Wildcard(span) => {
                // Reached only through an Or-pattern; a bare wildcard arm is
                // handled by the caller.
                self.error(
                    ErrorKind::SyntaxUnsupported,
                    "wildcard cannot appear inside an alternative pattern",
                    *span,
                );
            }
        }
    }

    fn lower_for(
        &mut self,
        var: &str,
        iter: &ast::Expr,
        body: &[ast::Stmt],
        span: Span,
    ) -> Vec<Stmt> {
        let ast::ExprKind::Call { func, args, named } = &iter.kind else {
            self.error(
                ErrorKind::SyntaxUnsupported,
                "for loops must iterate over range(..)",
                iter.span,
            );
            return vec![];
        };
        if !matches!(&func.kind, ast::ExprKind::Name(n) if n == "range")
            || !named.is_empty()
            || !(2..=3).contains(&args.len())
        {
            self.error(
                ErrorKind::SyntaxUnsupported,
                "for loops must iterate over range(lo, hi[, step])",
                iter.span,
            );
            return vec![];
        }

        let from = self.lower_expr(&args[0]);
        let hi = self.lower_expr(&args[1]);
        let step = args.get(2).map(|s| self.lower_expr(s));
        for bound in [&from, &hi].into_iter().chain(step.as_ref()) {
            if let Some(ty) = &bound.ty {
                if !ty.is_integer() {
                    self.error(
                        ErrorKind::TypeMismatch,
                        format!("range bounds must be integers, got {}", ty),
                        bound.span,
                    );
                }
            }
        }

        // `range` excludes its upper bound; the IR loop is inclusive.
        let to = match hi.const_int() {
            Some(v) => match i32::try_from(v - 1) {
                Ok(v32) => Expr::typed(ExprKind::Literal(Value::DInt(v32)), Type::DINT, hi.span),
                Err(_) => Expr::typed(ExprKind::Literal(Value::LInt(v - 1)), Type::LINT, hi.span),
            },
            None => {
                let span = hi.span;
                let ty = hi.ty.clone().unwrap_or(Type::DINT);
                Expr::typed(
                    ExprKind::Binary {
                        op: BinaryOp::Sub,
                        left: Box::new(hi),
                        right: Box::new(Expr::typed(
                            ExprKind::Literal(Value::DInt(1)),
                            Type::DINT,
                            span,
                        )),
                    },
                    ty,
                    span,
                )
            }
        };

        // The induction variable is a bare name; synthesize a DINT temp
        // unless a declared variable already provides it.
        match self.scope.var(var) {
            Some((_, ty)) if !ty.is_integer() => {
                self.error(
                    ErrorKind::TypeMismatch,
                    format!("loop variable '{}' must be an integer, is {}", var, ty),
                    span,
                );
            }
            Some(_) => {}
            None => {
                if !self.loop_vars.iter().any(|v| v == var)
                    && !self.temps.iter().any(|t| t.name == var)
                {
                    self.temps.push(VarDecl::new(var, Type::DINT));
                }
            }
        }

        self.loop_vars.push(var.to_string());
        let body = self.lower_block(body);
        self.loop_vars.pop();

        vec![Stmt::new(
            StmtKind::For {
                var: var.to_string(),
                from,
                to,
                step,
                body,
            },
            span,
        )]
    }

    // ── Assignment targets and variable paths ──

    fn lower_assign_target(&mut self, target: &ast::Expr) -> Option<(VarPath, Type)> {
        let reported = self.errors.len();
        let Some((path, ty)) = self.try_lower_path(target) else {
            // Only add the generic complaint when path lowering did not
            // already say something more precise.
            if self.errors.len() == reported {
                self.error(
                    ErrorKind::SyntaxUnsupported,
                    "assignment target must be a variable path on self",
                    target.span,
                );
            }
            return None;
        };
        let Some(root) = path.root() else {
            return None;
        };
        if let Some((role, _)) = self.scope.var(root) {
            match role {
                BlockRole::Constant => {
                    self.error(
                        ErrorKind::TypeMismatch,
                        format!("cannot assign to constant '{}'", root),
                        target.span,
                    );
                    return None;
                }
                BlockRole::Input => {
                    self.error(
                        ErrorKind::TypeMismatch,
                        format!("cannot assign to input '{}'", root),
                        target.span,
                    );
                    return None;
                }
                _ => {}
            }
        } else if self.loop_vars.iter().any(|v| v == root) {
            self.error(
                ErrorKind::SyntaxUnsupported,
                format!("cannot assign to loop variable '{}'", root),
                target.span,
            );
            return None;
        }
        Some((path, ty))
    }

    /// Lower an attribute/subscript chain rooted at `self` into a typed
    /// variable path. Returns `None` (silently) when the expression is not
    /// path-shaped; resolution failures inside a path are reported.
    fn try_lower_path(&mut self, expr: &ast::Expr) -> Option<(VarPath, Type)> {
        let mut chain = Vec::new();
        let mut cursor = expr;
        loop {
            match &cursor.kind {
                ast::ExprKind::Attribute { value, attr } => {
                    chain.push(PathLink::Field(attr.clone(), cursor.span));
                    cursor = value;
                }
                ast::ExprKind::Subscript { value, indexes } => {
                    chain.push(PathLink::Index(indexes.clone(), cursor.span));
                    cursor = value;
                }
                ast::ExprKind::Name(name) if name == "self" => break,
                ast::ExprKind::Name(name) => {
                    // Bare loop variable reference.
                    if chain.is_empty() && self.loop_vars.iter().any(|v| v == name) {
                        return Some((VarPath::var(name.clone()), Type::DINT));
                    }
                    return None;
                }
                _ => return None,
            }
        }
        chain.reverse();

        let mut links = chain.into_iter();
        let Some(PathLink::Field(root, root_span)) = links.next() else {
            self.error(
                ErrorKind::SyntaxUnsupported,
                "self cannot be subscripted directly",
                expr.span,
            );
            return None;
        };
        let Some((_, root_ty)) = self.scope.var(&root) else {
            self.error(
                ErrorKind::NameUnresolved,
                format!("'{}' is not declared in {}", root, self.scope.pou_name),
                root_span,
            );
            return None;
        };

        let mut ty = root_ty.clone();
        let mut segments = vec![PathSegment::Field(root)];
        for link in links {
            match link {
                PathLink::Field(name, span) => {
                    let next = match &ty {
                        Type::Struct(sname) => self
                            .ctx
                            .types
                            .structure(sname)
                            .and_then(|def| def.field(&name))
                            .map(|fd| fd.ty.clone()),
                        Type::Fb(fb_name) => self.fb_member_type(fb_name, &name),
                        _ => None,
                    };
                    let Some(next) = next else {
                        self.error(
                            ErrorKind::NameUnresolved,
                            format!("{} has no member '{}'", ty, name),
                            span,
                        );
                        return None;
                    };
                    segments.push(PathSegment::Field(name));
                    ty = next;
                }
                PathLink::Index(indexes, span) => {
                    let Type::Array { element, dims } = &ty else {
                        self.error(
                            ErrorKind::TypeMismatch,
                            format!("{} cannot be indexed", ty),
                            span,
                        );
                        return None;
                    };
                    if indexes.len() != dims.len() {
                        self.error(
                            ErrorKind::TypeMismatch,
                            format!(
                                "expected {} subscripts, got {}",
                                dims.len(),
                                indexes.len()
                            ),
                            span,
                        );
                        return None;
                    }
                    let element = element.as_ref().clone();
                    let mut lowered = Vec::new();
                    for index in &indexes {
                        let index = self.lower_expr(index);
                        if let Some(ity) = &index.ty {
                            if !ity.is_integer() {
                                self.error(
                                    ErrorKind::TypeMismatch,
                                    format!("array subscript must be an integer, got {}", ity),
                                    index.span,
                                );
                            }
                        }
                        lowered.push(index);
                    }
                    segments.push(PathSegment::Index(lowered));
                    ty = element;
                }
            }
        }
        Some((VarPath { segments }, ty))
    }

    // ── Expressions ──

    pub fn lower_expr(&mut self, expr: &ast::Expr) -> Expr {
        let span = expr.span;
        match &expr.kind {
            ast::ExprKind::Int(v) => {
                if let Ok(v32) = i32::try_from(*v) {
                    Expr::typed(ExprKind::Literal(Value::DInt(v32)), Type::DINT, span)
                } else {
                    Expr::typed(ExprKind::Literal(Value::LInt(*v)), Type::LINT, span)
                }
            }
            ast::ExprKind::Float(v) => {
                Expr::typed(ExprKind::Literal(Value::LReal(*v)), Type::LREAL, span)
            }
            ast::ExprKind::Str(s) => Expr::literal(Value::String(s.clone()), span),
            ast::ExprKind::Bool(b) => {
                Expr::typed(ExprKind::Literal(Value::Bool(*b)), Type::BOOL, span)
            }
            ast::ExprKind::Name(name) => {
                if self.loop_vars.iter().any(|v| v == name) {
                    return Expr::variable(VarPath::var(name.clone()), Type::DINT, span);
                }
                if name == "self" {
                    self.error(
                        ErrorKind::SyntaxUnsupported,
                        "self is not a value by itself",
                        span,
                    );
                } else {
                    self.error(
                        ErrorKind::NameUnresolved,
                        format!("unknown name '{}'; POU variables are reached via self", name),
                        span,
                    );
                }
                self.poison(span)
            }
            ast::ExprKind::Attribute { value, attr } => {
                // Enum variant reference: EnumName.VARIANT
                if let ast::ExprKind::Name(type_name) = &value.kind {
                    if let Some(def) = self.ctx.types.enumeration(type_name) {
                        return if def.variant(attr).is_some() {
                            Expr::typed(
                                ExprKind::EnumVariant {
                                    type_name: type_name.clone(),
                                    variant: attr.clone(),
                                },
                                Type::Enum(type_name.clone()),
                                span,
                            )
                        } else {
                            self.error(
                                ErrorKind::NameUnresolved,
                                format!("{} has no variant '{}'", type_name, attr),
                                span,
                            );
                            self.poison(span)
                        };
                    }
                }
                let reported = self.errors.len();
                match self.try_lower_path(expr) {
                    Some((path, ty)) => Expr::variable(path, ty, span),
                    None => {
                        if self.errors.len() == reported {
                            self.error(
                                ErrorKind::SyntaxUnsupported,
                                "unsupported attribute access",
                                span,
                            );
                        }
                        self.poison(span)
                    }
                }
            }
            ast::ExprKind::Subscript { .. } => {
                let reported = self.errors.len();
                match self.try_lower_path(expr) {
                    Some((path, ty)) => Expr::variable(path, ty, span),
                    None => {
                        if self.errors.len() == reported {
                            self.error(
                                ErrorKind::SyntaxUnsupported,
                                "unsupported subscript",
                                span,
                            );
                        }
                        self.poison(span)
                    }
                }
            }
            ast::ExprKind::Call { func, args, named } => self.lower_call(func, args, named, span),
            ast::ExprKind::Unary { op, operand } => {
                let operand = self.lower_expr(operand);
                let op = match op {
                    ast::UnaryOp::Neg => UnaryOp::Neg,
                    ast::UnaryOp::Not => UnaryOp::Not,
                    ast::UnaryOp::BitNot => UnaryOp::BitNot,
                };
                let ty = operand
                    .ty
                    .as_ref()
                    .and_then(|t| typerules::unary_result(op, t));
                if ty.is_none() && operand.ty.is_some() {
                    self.error(
                        ErrorKind::TypeMismatch,
                        format!("operator {} cannot apply to {}", op, type_name(&operand)),
                        span,
                    );
                }
                Expr {
                    kind: ExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                    ty,
                    span,
                }
            }
            ast::ExprKind::Binary { op, left, right } => {
                let left = self.lower_expr(left);
                let right = self.lower_expr(right);
                let ir_op = match op {
                    ast::BinOp::Add => BinaryOp::Add,
                    ast::BinOp::Sub => BinaryOp::Sub,
                    ast::BinOp::Mul => BinaryOp::Mul,
                    ast::BinOp::Div | ast::BinOp::FloorDiv => BinaryOp::Div,
                    ast::BinOp::Mod => BinaryOp::Mod,
                    ast::BinOp::Pow => BinaryOp::Pow,
                    ast::BinOp::BitAnd => BinaryOp::BitAnd,
                    ast::BinOp::BitOr => BinaryOp::BitOr,
                    ast::BinOp::BitXor => BinaryOp::BitXor,
                };
                if matches!(op, ast::BinOp::FloorDiv) {
                    let float_operand = [&left, &right].into_iter().any(|e| {
                        e.ty.as_ref()
                            .and_then(Type::elementary)
                            .is_some_and(|t| t.is_float())
                    });
                    if float_operand {
                        self.error(
                            ErrorKind::TypeMismatch,
                            "integer division requires integer operands",
                            span,
                        );
                    }
                }
                self.binary(ir_op, left, right, span)
            }
            ast::ExprKind::BoolOp { op, values } => {
                let ir_op = match op {
                    ast::BoolOpKind::And => BinaryOp::And,
                    ast::BoolOpKind::Or => BinaryOp::Or,
                };
                let mut iter = values.iter();
                let first = iter.next().map(|e| self.lower_expr(e));
                let Some(mut acc) = first else {
                    return self.poison(span);
                };
                for value in iter {
                    let value = self.lower_expr(value);
                    acc = self.binary(ir_op, acc, value, span);
                }
                acc
            }
            ast::ExprKind::Compare { op, left, right } => {
                let ir_op = match op {
                    ast::CmpOp::Eq => BinaryOp::Eq,
                    ast::CmpOp::NotEq => BinaryOp::NotEq,
                    ast::CmpOp::Lt => BinaryOp::Lt,
                    ast::CmpOp::LtEq => BinaryOp::LtEq,
                    ast::CmpOp::Gt => BinaryOp::Gt,
                    ast::CmpOp::GtEq => BinaryOp::GtEq,
                };
                let left = self.lower_expr(left);
                let right = self.lower_expr(right);
                self.binary(ir_op, left, right, span)
            }
            ast::ExprKind::Ternary {
                condition,
                then_value,
                else_value,
            } => {
                let condition = self.lower_expr(condition);
                self.require_bool(&condition, "conditional expression");
                let then_value = self.lower_expr(then_value);
                let else_value = self.lower_expr(else_value);
                let ty = match (&then_value.ty, &else_value.ty) {
                    (Some(t), Some(e)) => {
                        if typerules::expr_assignable(t, &else_value) {
                            Some(t.clone())
                        } else if typerules::expr_assignable(e, &then_value) {
                            Some(e.clone())
                        } else {
                            self.error(
                                ErrorKind::TypeMismatch,
                                format!("conditional branches have incompatible types {} and {}", t, e),
                                span,
                            );
                            None
                        }
                    }
                    _ => None,
                };
                Expr {
                    kind: ExprKind::Select {
                        condition: Box::new(condition),
                        then_value: Box::new(then_value),
                        else_value: Box::new(else_value),
                    },
                    ty,
                    span,
                }
            }
        }
    }

    fn binary(&mut self, op: BinaryOp, left: Expr, right: Expr, span: Span) -> Expr {
        let ty = match (&left.ty, &right.ty) {
            (Some(l), Some(r)) => {
                let result = typerules::binary_result(op, l, r).or_else(|| {
                    // An integer constant adapts to the other operand.
                    self.refit_const(op, &left, r).or_else(|| self.refit_const(op, &right, l))
                });
                if result.is_none() {
                    self.error(
                        ErrorKind::TypeMismatch,
                        format!("operator {} cannot combine {} and {}", op, l, r),
                        span,
                    );
                }
                result
            }
            _ => None,
        };
        Expr {
            kind: ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty,
            span,
        }
    }

    fn refit_const(&self, op: BinaryOp, lit: &Expr, other: &Type) -> Option<Type> {
        let v = lit.const_int()?;
        let target = other.elementary()?;
        if !target.is_integer() || Value::int_of(target, v as i128).is_none() {
            return None;
        }
        typerules::binary_result(op, other, other)
    }

    fn require_bool(&mut self, expr: &Expr, what: &str) {
        if let Some(ty) = &expr.ty {
            if !ty.is_boolean() {
                self.error(
                    ErrorKind::TypeMismatch,
                    format!("{} must be BOOL, got {}", what, ty),
                    expr.span,
                );
            }
        }
    }

    // ── Calls: sentinels, conversions, standard functions, methods ──

    fn lower_call(
        &mut self,
        func: &ast::Expr,
        args: &[ast::Expr],
        named: &[(String, ast::Expr)],
        span: Span,
    ) -> Expr {
        let ast::ExprKind::Name(name) = &func.kind else {
            // Method call: self.method(args)
            if let ast::ExprKind::Attribute { value, attr } = &func.kind {
                if matches!(&value.kind, ast::ExprKind::Name(n) if n == "self") {
                    if let Some(return_type) = self.scope.method_return(attr).cloned() {
                        let args: Vec<Expr> = args.iter().map(|a| self.lower_expr(a)).collect();
                        let named: Vec<(String, Expr)> = named
                            .iter()
                            .map(|(n, v)| (n.clone(), self.lower_expr(v)))
                            .collect();
                        return Expr::typed(
                            ExprKind::Call {
                                function: attr.clone(),
                                args,
                                named,
                            },
                            return_type,
                            span,
                        );
                    }
                }
            }
            self.error(ErrorKind::SyntaxUnsupported, "unsupported call target", span);
            return self.poison(span);
        };

        if name == "super" {
            self.error(
                ErrorKind::SyntaxUnsupported,
                "super() may only appear as super().logic()",
                span,
            );
            return self.poison(span);
        }
        if name == "range" {
            self.error(
                ErrorKind::SyntaxUnsupported,
                "range(..) is only valid as a for-loop iterable",
                span,
            );
            return self.poison(span);
        }
        if name == "duration" {
            return match self.duration_from_named(named, args, span) {
                Some(d) => Expr::typed(ExprKind::Literal(Value::Time(d)), Type::TIME, span),
                None => self.poison(span),
            };
        }
        if let Some(fb) = sentinel(name) {
            return self.expand_sentinel(fb, name, args, named, span);
        }

        // Explicit conversion named by elementary type: int(x), real(x), ...
        let upper = name.to_uppercase();
        if let Ok(target) = upper.parse::<ElementaryType>() {
            if args.len() != 1 || !named.is_empty() {
                self.error(
                    ErrorKind::SyntaxUnsupported,
                    format!("conversion {} takes exactly one argument", name),
                    span,
                );
                return self.poison(span);
            }
            let operand = self.lower_expr(&args[0]);
            if let Some(ty) = &operand.ty {
                let convertible = ty
                    .elementary()
                    .is_some_and(|e| e.is_numeric() || e.is_bit_string())
                    || matches!(ty, Type::Enum(_));
                if !(convertible && (target.is_numeric() || target.is_bit_string())) {
                    self.error(
                        ErrorKind::TypeMismatch,
                        format!("cannot convert {} to {}", ty, target),
                        span,
                    );
                }
            }
            return Expr::typed(
                ExprKind::Call {
                    function: upper,
                    args: vec![operand],
                    named: vec![],
                },
                Type::Elementary(target),
                span,
            );
        }

        // Standard functions.
        let upper_args: Vec<Expr> = args.iter().map(|a| self.lower_expr(a)).collect();
        if !named.is_empty() {
            self.error(
                ErrorKind::SyntaxUnsupported,
                format!("'{}' does not take named arguments", name),
                span,
            );
            return self.poison(span);
        }
        let arg_types: Option<Vec<Type>> = upper_args.iter().map(|a| a.ty.clone()).collect();
        let result = arg_types
            .as_deref()
            .and_then(|tys| typerules::std_function_result(&upper, tys));
        match result {
            Some(ty) => Expr::typed(
                ExprKind::Call {
                    function: upper,
                    args: upper_args,
                    named: vec![],
                },
                ty,
                span,
            ),
            None => {
                self.error(
                    ErrorKind::NameUnresolved,
                    format!("unknown function '{}'", name),
                    span,
                );
                self.poison(span)
            }
        }
    }

    /// Build a TIME literal from `seconds=` / `ms=` (and the longer unit
    /// keywords). Components must be compile-time numeric constants.
    fn duration_from_named(
        &mut self,
        named: &[(String, ast::Expr)],
        args: &[ast::Expr],
        span: Span,
    ) -> Option<IecDuration> {
        if !args.is_empty() || named.is_empty() {
            self.error(
                ErrorKind::InvalidLiteral,
                "duration(..) takes named components only, e.g. duration(seconds=5)",
                span,
            );
            return None;
        }
        let mut nanos: i128 = 0;
        for (key, value) in named {
            let scale: i128 = match key.as_str() {
                "days" => 86_400_000_000_000,
                "hours" => 3_600_000_000_000,
                "minutes" => 60_000_000_000,
                "seconds" => 1_000_000_000,
                "ms" => 1_000_000,
                "us" => 1_000,
                "ns" => 1,
                _ => {
                    self.error(
                        ErrorKind::InvalidLiteral,
                        format!("unknown duration component '{}'", key),
                        span,
                    );
                    return None;
                }
            };
            let amount: i128 = match &value.kind {
                ast::ExprKind::Int(v) => *v as i128,
                ast::ExprKind::Float(v) => {
                    // Fractional components are carried at nanosecond
                    // resolution.
                    nanos += (*v * scale as f64) as i128;
                    continue;
                }
                _ => {
                    self.error(
                        ErrorKind::InvalidLiteral,
                        format!("duration component '{}' must be a numeric constant", key),
                        value.span,
                    );
                    return None;
                }
            };
            nanos += amount * scale;
        }
        match i64::try_from(nanos) {
            Ok(n) => Some(IecDuration::from_nanos(n)),
            Err(_) => {
                self.error(ErrorKind::InvalidLiteral, "duration out of range", span);
                None
            }
        }
    }

    /// Expand a timing/edge/counter sentinel into an invocation of a
    /// synthesized instance plus a read of its Q output. Instance names are
    /// derived from the per-kind call-site counter in source order, so
    /// re-lowering the same source yields the same names.
    fn expand_sentinel(
        &mut self,
        fb: StdFb,
        name: &str,
        args: &[ast::Expr],
        named: &[(String, ast::Expr)],
        span: Span,
    ) -> Expr {
        if self.scope.kind.is_function() {
            self.error(
                ErrorKind::SyntaxUnsupported,
                format!("'{}' keeps state across scans and requires a function block", name),
                span,
            );
            return self.poison(span);
        }
        if !self.allow_prelude {
            self.error(
                ErrorKind::SyntaxUnsupported,
                format!(
                    "'{}' is not allowed in transition conditions; invoke a declared timer from step actions",
                    name
                ),
                span,
            );
            return self.poison(span);
        }

        let inputs: Vec<(String, Expr)> = match fb {
            StdFb::Ton | StdFb::Tof | StdFb::Tp => {
                if args.len() != 1 {
                    self.error(
                        ErrorKind::SyntaxUnsupported,
                        format!("'{}' takes one condition argument", name),
                        span,
                    );
                    return self.poison(span);
                }
                let cond = self.lower_expr(&args[0]);
                self.require_bool(&cond, "timer condition");
                let Some(pt) = self.duration_from_named(named, &[], span) else {
                    return self.poison(span);
                };
                let pt = Expr::typed(ExprKind::Literal(Value::Time(pt)), Type::TIME, span);
                vec![("IN".to_string(), cond), ("PT".to_string(), pt)]
            }
            StdFb::RTrig | StdFb::FTrig => {
                if args.len() != 1 || !named.is_empty() {
                    self.error(
                        ErrorKind::SyntaxUnsupported,
                        format!("'{}' takes exactly one argument", name),
                        span,
                    );
                    return self.poison(span);
                }
                let clk = self.lower_expr(&args[0]);
                self.require_bool(&clk, "edge input");
                vec![("CLK".to_string(), clk)]
            }
            StdFb::Ctu | StdFb::Ctd => {
                if args.len() != 3 || !named.is_empty() {
                    self.error(
                        ErrorKind::SyntaxUnsupported,
                        format!("'{}' takes three arguments", name),
                        span,
                    );
                    return self.poison(span);
                }
                let clk = self.lower_expr(&args[0]);
                self.require_bool(&clk, "counter clock");
                let gate = self.lower_expr(&args[1]);
                self.require_bool(&gate, "counter gate");
                let preset = self.lower_expr(&args[2]);
                if preset.ty.is_some() && !typerules::expr_assignable(&Type::INT, &preset) {
                    self.error(
                        ErrorKind::TypeMismatch,
                        format!("counter preset must fit INT, got {}", type_name(&preset)),
                        preset.span,
                    );
                }
                let (clk_pin, gate_pin) = match fb {
                    StdFb::Ctu => ("CU", "R"),
                    _ => ("CD", "LD"),
                };
                vec![
                    (clk_pin.to_string(), clk),
                    (gate_pin.to_string(), gate),
                    ("PV".to_string(), preset),
                ]
            }
        };

        let counter = self.counters.entry(fb).or_insert(0);
        let instance = format!("{}_{}", fb.instance_prefix(), counter);
        *counter += 1;
        if !self.synthesized.iter().any(|d| d.name == instance) {
            self.synthesized
                .push(VarDecl::new(instance.clone(), Type::Fb(fb.to_string())));
        }

        self.prelude.push(Stmt::new(
            StmtKind::InvokeFb {
                instance: VarPath::var(instance.clone()),
                inputs,
            },
            span,
        ));
        Expr::variable(VarPath::field(instance, "Q"), Type::BOOL, span)
    }

    // ── Output assignment analysis ──

    /// Warn for output variables that some control path leaves unassigned.
    pub fn warn_unassigned_outputs(&mut self, stmts: &[Stmt]) {
        let assigned = must_assigned(stmts);
        let outputs: Vec<String> = self
            .scope
            .vars
            .iter()
            .filter(|(_, role, _)| *role == BlockRole::Output)
            .map(|(name, _, _)| name.clone())
            .collect();
        for output in outputs {
            if !assigned.contains(output.as_str()) {
                self.warnings.push(Warning::new(
                    format!("output '{}' may not be assigned on every scan", output),
                    None,
                ));
            }
        }
    }
}

enum PathLink {
    Field(String, Span),
    Index(Vec<ast::Expr>, Span),
}

fn lex_error(e: crate::frontend::lexer::LexError) -> CompileError {
    CompileError::new(ErrorKind::SyntaxUnsupported, e.to_string())
}

fn type_name(expr: &Expr) -> String {
    match &expr.ty {
        Some(ty) => ty.to_string(),
        None => "<error>".to_string(),
    }
}

/// Root variables assigned on every control path through `stmts`.
fn must_assigned(stmts: &[Stmt]) -> HashSet<String> {
    let mut assigned = HashSet::new();
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::Assign { target, .. } => {
                if let Some(root) = target.root() {
                    assigned.insert(root.to_string());
                }
            }
            StmtKind::If {
                branches,
                else_body,
            } => {
                // Without an else, the fall-through path assigns nothing.
                if !branches.is_empty() && !else_body.is_empty() {
                    let mut common = must_assigned(&branches[0].body);
                    for branch in &branches[1..] {
                        common = common
                            .intersection(&must_assigned(&branch.body))
                            .cloned()
                            .collect();
                    }
                    common = common
                        .intersection(&must_assigned(else_body))
                        .cloned()
                        .collect();
                    assigned.extend(common);
                }
            }
            StmtKind::Case { arms, default, .. } => {
                if let Some(default) = default {
                    let mut common = must_assigned(default);
                    for arm in arms {
                        common = common
                            .intersection(&must_assigned(&arm.body))
                            .cloned()
                            .collect();
                    }
                    assigned.extend(common);
                }
            }
            // A repeat body runs at least once.
            StmtKind::RepeatUntil { body, .. } => {
                assigned.extend(must_assigned(body));
            }
            StmtKind::While { .. }
            | StmtKind::For { .. }
            | StmtKind::InvokeFb { .. }
            | StmtKind::SuperCall
            | StmtKind::Return(_)
            | StmtKind::Empty => {}
        }
    }
    assigned
}

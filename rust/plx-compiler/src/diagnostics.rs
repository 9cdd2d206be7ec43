//! Compile-time diagnostics: error kinds, spans, warnings, and batch
//! reporting with source snippets.

use plx_core::span::Span;
use std::fmt;
use thiserror::Error;

/// Severity level for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

/// The closed set of compile error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum ErrorKind {
    SourceUnavailable,
    SyntaxUnsupported,
    NameUnresolved,
    TypeMismatch,
    InheritanceCycle,
    DuplicateName,
    CaseOverlap,
    InvalidLiteral,
    InvalidSchedule,
    DanglingReference,
    InternalInvariant,
}

#[derive(Debug, Error, Clone, PartialEq)]
#[error("{kind}: {message}")]
pub struct CompileError {
    pub kind: ErrorKind,
    pub span: Option<Span>,
    pub message: String,
    pub related: Vec<Span>,
}

impl CompileError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            span: None,
            message: message.into(),
            related: Vec::new(),
        }
    }

    pub fn spanned(kind: ErrorKind, message: impl Into<String>, span: Span) -> Self {
        Self {
            kind,
            span: Some(span),
            message: message.into(),
            related: Vec::new(),
        }
    }

    pub fn with_related(mut self, span: Span) -> Self {
        self.related.push(span);
        self
    }

    /// Plain-text rendering with an optional source snippet and caret
    /// underline.
    pub fn render(&self, source: Option<&str>) -> String {
        let mut out = String::new();
        out.push_str(&format!("error[{}]: {}", self.kind, self.message));
        if let Some(span) = self.span {
            out.push_str(&format!(" (line {}, col {})", span.line, span.col));
            if let Some(source) = source {
                if let Some(line_text) = source.lines().nth(span.line.saturating_sub(1)) {
                    let width = (span.end.saturating_sub(span.start)).max(1);
                    out.push('\n');
                    out.push_str(&format!("  {} | {}\n", span.line, line_text));
                    let gutter = span.line.to_string().len();
                    out.push_str(&format!(
                        "  {} | {}{}",
                        " ".repeat(gutter),
                        " ".repeat(span.col.saturating_sub(1)),
                        "^".repeat(width.min(line_text.len() + 1)),
                    ));
                }
            }
        }
        out
    }
}

/// A batch of compile errors, reported together.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CompileErrors(pub Vec<CompileError>);

impl CompileErrors {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Build from a list, returning `None` when there is nothing to report.
    pub fn from_vec(errors: Vec<CompileError>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self(errors))
        }
    }

    /// `Ok(value)` when the batch is empty, the batch otherwise.
    pub fn into_result<T>(self, value: T) -> Result<T, CompileErrors> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }

    pub fn push(&mut self, error: CompileError) {
        self.0.push(error);
    }

    pub fn extend(&mut self, other: CompileErrors) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompileError> {
        self.0.iter()
    }

    pub fn has_kind(&self, kind: ErrorKind) -> bool {
        self.0.iter().any(|e| e.kind == kind)
    }
}

impl fmt::Display for CompileErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", e)?;
        }
        Ok(())
    }
}

impl std::error::Error for CompileErrors {}

impl From<CompileError> for CompileErrors {
    fn from(error: CompileError) -> Self {
        Self(vec![error])
    }
}

/// A non-fatal finding, reported alongside a successful compilation.
#[derive(Debug, Clone, PartialEq)]
pub struct Warning {
    pub message: String,
    pub span: Option<Span>,
}

impl Warning {
    pub fn new(message: impl Into<String>, span: Option<Span>) -> Self {
        Self {
            message: message.into(),
            span,
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "warning: {}", self.message)?;
        if let Some(span) = self.span {
            write!(f, " (line {}, col {})", span.line, span.col)?;
        }
        Ok(())
    }
}

//! Error types for the parallelization analysis.
//!
//! Errors are organized by the phase that produces them. Everything here is
//! fatal for the analysis run: recoverable situations (unrecognized access
//! shapes, a loop without a dependence graph) are reported through
//! [`Diagnostic`]s and verdicts instead.

use thiserror::Error;
use crate::utils::location::Span;
use serde::{Serialize, Deserialize};
use std::fmt;

/// Top-level error type for the analysis.
#[derive(Error, Debug)]
pub enum AutoParError {
    /// The loop cannot be handled by the legality procedure
    #[error("Legality error: {0}")]
    Legality(#[from] LegalityError),

    /// The dependence graph is inconsistent
    #[error("Dependence graph error: {0}")]
    Dependence(#[from] DependenceError),

    /// The analysis session is not in the required state
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// The program model is malformed
    #[error("Program model error: {0}")]
    Model(#[from] ModelError),

    /// Internal consistency violation
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AutoParError {
    /// Check if this error reports a non-canonical loop.
    pub fn is_not_canonical(&self) -> bool {
        matches!(
            self,
            AutoParError::Legality(LegalityError { kind: LegalityErrorKind::NotCanonicalLoop, .. })
        )
    }
}

/// Error raised by the legality decision.
#[derive(Error, Debug, Clone)]
pub struct LegalityError {
    /// The error message
    pub message: String,
    /// Location in source (if available)
    pub span: Option<Span>,
    /// The kind of legality error
    pub kind: LegalityErrorKind,
}

impl LegalityError {
    /// The loop does not have the canonical counted shape.
    pub fn not_canonical(message: impl Into<String>, span: Span) -> Self {
        Self {
            message: message.into(),
            span: Some(span),
            kind: LegalityErrorKind::NotCanonicalLoop,
        }
    }

    /// The loop id does not name a loop of the program.
    pub fn unknown_loop(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            span: None,
            kind: LegalityErrorKind::UnknownLoop,
        }
    }
}

impl fmt::Display for LegalityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.span {
            Some(ref span) if !span.is_dummy() => write!(f, "{} at {}", self.message, span),
            _ => write!(f, "{}", self.message),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegalityErrorKind {
    /// Not an increment/decrement-by-one counted loop
    NotCanonicalLoop,
    /// Loop id out of range
    UnknownLoop,
}

/// Error in a dependence graph supplied by the graph builder.
#[derive(Error, Debug, Clone)]
pub struct DependenceError {
    /// The error message
    pub message: String,
    /// The kind of dependence error
    pub kind: DependenceErrorKind,
}

impl DependenceError {
    pub fn new(kind: DependenceErrorKind, message: impl Into<String>) -> Self {
        Self { message: message.into(), kind }
    }
}

impl fmt::Display for DependenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependenceErrorKind {
    /// An edge endpoint names a node that is not in the graph
    DanglingEndpoint,
    /// A node resolves to an access that is not in the program
    UnknownAccess,
}

/// Error in the lifecycle of the analysis session.
#[derive(Error, Debug, Clone)]
pub struct SessionError {
    /// The error message
    pub message: String,
    /// The kind of session error
    pub kind: SessionErrorKind,
}

impl SessionError {
    pub fn new(kind: SessionErrorKind, message: impl Into<String>) -> Self {
        Self { message: message.into(), kind }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionErrorKind {
    /// Oracles requested before `initialize`
    NotInitialized,
    /// `initialize` called twice without `release`
    AlreadyInitialized,
}

/// Error found while validating a program model.
#[derive(Error, Debug, Clone)]
pub struct ModelError {
    /// The error message
    pub message: String,
    /// The kind of model error
    pub kind: ModelErrorKind,
}

impl ModelError {
    pub fn new(kind: ModelErrorKind, message: impl Into<String>) -> Self {
        Self { message: message.into(), kind }
    }
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelErrorKind {
    /// A node refers to an id outside its arena
    DanglingReference,
    /// A node is stored at a position that does not match its id
    IdMismatch,
    /// A loop is missing its statement or scopes
    MalformedLoop,
    /// Parent links or children lead back to the node itself
    Cycle,
}

/// A diagnostic message with severity level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Severity level
    pub severity: DiagnosticSeverity,
    /// Message
    pub message: String,
    /// Primary span
    pub span: Option<Span>,
    /// Additional notes
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiagnosticSeverity {
    /// The loop was rejected
    Error,
    /// The answer may be more conservative than necessary
    Warning,
    /// Informational message
    Note,
}

impl Diagnostic {
    /// Create a new error diagnostic.
    pub fn error(message: impl Into<String>) -> Self {
        Self::with_severity(DiagnosticSeverity::Error, message)
    }

    /// Create a new warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::with_severity(DiagnosticSeverity::Warning, message)
    }

    /// Create a new note.
    pub fn note(message: impl Into<String>) -> Self {
        Self::with_severity(DiagnosticSeverity::Note, message)
    }

    fn with_severity(severity: DiagnosticSeverity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            span: None,
            notes: Vec::new(),
        }
    }

    /// Add a span to the diagnostic.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Add a note to the diagnostic.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self.severity {
            DiagnosticSeverity::Error => "error",
            DiagnosticSeverity::Warning => "warning",
            DiagnosticSeverity::Note => "note",
        };
        write!(f, "{}: {}", label, self.message)?;
        if let Some(span) = self.span.filter(|s| !s.is_dummy()) {
            write!(f, " at {}", span)?;
        }
        for note in &self.notes {
            write!(f, "\n  = {}", note)?;
        }
        Ok(())
    }
}

/// Result type using AutoParError.
pub type AutoParResult<T> = Result<T, AutoParError>;

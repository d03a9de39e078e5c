//! Error taxonomy for the lowering engine.
//!
//! Fatal failures (malformed input, name collisions) return `Err(LowerError)`
//! and abort translation. Everything else — unsupported constructs,
//! non-synthesizable constructs, sign-qualifier conflicts — is reported
//! through a [`Diagnostic`] handed to an [`ErrorHandler`], and translation
//! continues with a best-effort fallback.

use std::fmt;

/// A source-location stamp, matching the `src = "file:line.col"` attribute
/// this crate stamps on emitted objects.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SourceLoc {
    /// source file name, empty if unknown
    pub file: String,
    /// 1-based line number, 0 if unknown
    pub line: u32,
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.file.is_empty() {
            write!(f, "<unknown>:{}", self.line)
        } else {
            write!(f, "{}:{}", self.file, self.line)
        }
    }
}

/// Fatal errors: malformed input or a name collision, per spec §7's
/// "malformed input ... fatal, aborts translation" and §5's "name collisions
/// abort with a fatal error".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LowerError {
    /// a required child node was absent, or a node appeared where the
    /// dispatcher expected a different kind.
    MalformedInput {
        /// what was expected
        expected: String,
        /// where in the input this happened
        at: SourceLoc,
    },
    /// a freshly allocated wire name collided with one already present in
    /// the module.
    NameCollision {
        /// the colliding name
        name: String,
        /// where in the input this happened
        at: SourceLoc,
    },
}

impl fmt::Display for LowerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LowerError::MalformedInput { expected, at } => {
                write!(f, "{}: malformed input, expected {}", at, expected)
            }
            LowerError::NameCollision { name, at } => {
                write!(f, "{}: wire name collision: {}", at, name)
            }
        }
    }
}

impl std::error::Error for LowerError {}

/// Severity of a non-fatal diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// a warning: best-effort fallback was taken, translation continues unaffected.
    Warning,
    /// an error that does not abort translation (SynthAudit findings, sign-qualifier conflicts).
    Error,
}

/// What kind of condition produced the diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// an unsupported statement or expression kind was skipped or given a
    /// best-effort fallback (e.g. an unroll attempt failed and the original
    /// un-unrolled for-statement was kept).
    UnsupportedConstruct,
    /// SynthAudit flagged a non-synthesizable construct.
    NonSynthesizable,
    /// a port's high-conn signed attribute was cleared to match its unsigned low-conn.
    SignQualifierConflict,
    /// the compile-time interpreter gave up on an expression it couldn't evaluate.
    InterpreterDiverged,
}

/// A single non-fatal diagnostic, carrying enough context to reproduce the
/// one-line `file:line` message spec §7 requires plus, where available, a
/// debug-formatted snippet of the offending node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// severity of this diagnostic
    pub severity: Severity,
    /// what kind of condition produced it
    pub kind: DiagnosticKind,
    /// human-readable message
    pub message: String,
    /// source location of the offending node, if known
    pub src: SourceLoc,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.src, self.message)
    }
}

/// `UHDM_FORCING_UNSIGNED_TYPE`, the fixed diagnostic code spec §7 names for
/// sign-qualifier conflicts.
pub const UHDM_FORCING_UNSIGNED_TYPE: &str = "UHDM_FORCING_UNSIGNED_TYPE";

/// Callback interface for recoverable diagnostics (spec §6's "environment" and
/// §7's "error-handler callback ... carrying the node pointer for IDE
/// integration").
pub trait ErrorHandler {
    /// called once per diagnostic, in the order it was raised.
    fn on_diagnostic(&mut self, diagnostic: &Diagnostic);
}

/// An [`ErrorHandler`] that simply collects diagnostics into a `Vec`; used by
/// tests and as the CLI's default non-interactive handler.
#[derive(Debug, Default)]
pub struct CollectingHandler {
    /// diagnostics collected so far, in raised order
    pub diagnostics: Vec<Diagnostic>,
}

impl CollectingHandler {
    /// a fresh handler with no diagnostics collected yet.
    pub fn new() -> Self {
        Self::default()
    }
}

impl ErrorHandler for CollectingHandler {
    fn on_diagnostic(&mut self, diagnostic: &Diagnostic) {
        if matches!(diagnostic.severity, Severity::Error) {
            log::error!("{}", diagnostic);
        } else {
            log::warn!("{}", diagnostic);
        }
        self.diagnostics.push(diagnostic.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_location() {
        let err = LowerError::MalformedInput {
            expected: "event_control".to_string(),
            at: SourceLoc {
                file: "top.sv".to_string(),
                line: 12,
            },
        };
        assert_eq!(err.to_string(), "top.sv:12: malformed input, expected event_control");
    }

    #[test]
    fn collecting_handler_records_in_order() {
        let mut handler = CollectingHandler::new();
        handler.on_diagnostic(&Diagnostic {
            severity: Severity::Warning,
            kind: DiagnosticKind::UnsupportedConstruct,
            message: "unknown statement kind, skipped".to_string(),
            src: SourceLoc::default(),
        });
        handler.on_diagnostic(&Diagnostic {
            severity: Severity::Error,
            kind: DiagnosticKind::SignQualifierConflict,
            message: UHDM_FORCING_UNSIGNED_TYPE.to_string(),
            src: SourceLoc::default(),
        });
        assert_eq!(handler.diagnostics.len(), 2);
        assert_eq!(handler.diagnostics[1].message, UHDM_FORCING_UNSIGNED_TYPE);
    }
}

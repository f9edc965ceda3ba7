//! Diagnostics published alongside a module's AST and analysis.

use core::fmt;

use ecow::{EcoString, EcoVec};
use pythia_std::loc::{IndexSpan, SourceSpan};
use serde::{Deserialize, Serialize};

/// The severity of a diagnostic message, following the LSP specification.
#[derive(serde_repr::Serialize_repr, serde_repr::Deserialize_repr, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DiagnosticSeverity {
    /// An error message.
    Error = 1,
    /// A warning message.
    Warning = 2,
    /// An information message.
    Information = 3,
    /// A hint message.
    Hint = 4,
}

impl fmt::Display for DiagnosticSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiagnosticSeverity::Error => write!(f, "error"),
            DiagnosticSeverity::Warning => write!(f, "warning"),
            DiagnosticSeverity::Information => write!(f, "information"),
            DiagnosticSeverity::Hint => write!(f, "hint"),
        }
    }
}

/// Extra metadata attached to a diagnostic.
#[derive(serde_repr::Serialize_repr, serde_repr::Deserialize_repr, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DiagnosticTag {
    /// The flagged code is unnecessary and may be rendered faded out.
    Unnecessary = 1,
    /// The flagged code is deprecated.
    Deprecated = 2,
}

/// The stable diagnostic code strings.
pub mod codes {
    /// An import statement whose target could not be resolved.
    pub const UNRESOLVED_IMPORT: &str = "unresolved-import";
    /// A name read before any binding in its scope.
    pub const USE_BEFORE_DEF: &str = "use-before-def";
    /// A call through a member that is not callable.
    pub const NOT_CALLABLE: &str = "not-callable";
    /// A syntax error reported by the parser.
    pub const PARSE_ERROR: &str = "parse-error";
}

/// A single diagnostic message attached to a span of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The human readable message.
    pub message: EcoString,
    /// The line/column range the message covers.
    pub span: SourceSpan,
    /// The byte range the message covers.
    pub index_span: IndexSpan,
    /// The stable code string, one of [`codes`].
    pub code: EcoString,
    /// The severity of the message.
    pub severity: DiagnosticSeverity,
    /// Extra tags, if any.
    #[serde(default, skip_serializing_if = "EcoVec::is_empty")]
    pub tags: EcoVec<DiagnosticTag>,
}

impl Diagnostic {
    /// Creates a diagnostic without tags.
    pub fn new(
        message: impl Into<EcoString>,
        span: SourceSpan,
        index_span: IndexSpan,
        code: &'static str,
        severity: DiagnosticSeverity,
    ) -> Self {
        Self {
            message: message.into(),
            span,
            index_span,
            code: code.into(),
            severity,
            tags: EcoVec::new(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}] {} at {}",
            self.severity, self.code, self.message, self.span
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pythia_std::loc::{SourceLocation, SourceSpan};

    #[test]
    fn test_severity_serializes_as_number() {
        let json = serde_json::to_string(&DiagnosticSeverity::Warning).unwrap();
        assert_eq!(json, "2");
    }

    #[test]
    fn test_diagnostic_display() {
        let diag = Diagnostic::new(
            "unresolved import 'no_such_module'",
            SourceSpan::new(SourceLocation::new(1, 8), SourceLocation::new(1, 22)),
            IndexSpan::from_bounds(7, 21),
            codes::UNRESOLVED_IMPORT,
            DiagnosticSeverity::Warning,
        );
        assert_eq!(
            diag.to_string(),
            "warning[unresolved-import] unresolved import 'no_such_module' at 1:8-1:22"
        );
    }
}

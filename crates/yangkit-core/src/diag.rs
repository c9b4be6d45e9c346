//! Leveled diagnostics with structured validation codes.
//!
//! Parsing and compilation never panic on bad input; they record diagnostics
//! into the context's sink and surface failure through return values. The
//! verbosity threshold and the last-error indicator are per-context state.

use alloc::string::String;
use alloc::vec::Vec;

/// Diagnostic severity level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Blocks progress; the input may be malformed.
    Error,
    /// Informational; processing continues.
    Warning,
    /// Progress reporting (module loaded, etc.).
    Verbose,
    /// Internal detail useful when debugging the library itself.
    Debug,
}

/// Verbosity threshold: diagnostics above the threshold are discarded.
pub type Verbosity = Severity;

/// Structured validation error codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationCode {
    /// A mandatory attribute is missing (e.g. `name` on `type`).
    MissingArgument,
    /// A mandatory substatement is missing (e.g. `key` on a config list).
    MissingStatement,
    /// A statement not defined for its parent.
    UnknownStatement,
    /// A statement allowed at most once appeared again.
    TooManyStatements,
    /// An attribute value outside its domain.
    InvalidArgument,
    /// A prefix with no matching import.
    UnresolvedPrefix,
    /// Two list keys reference the same leaf.
    DuplicateKey,
    /// A key name does not match any direct leaf child.
    MissingKey,
    /// A key references a node that is not a leaf.
    KeyNotLeaf,
    /// A key leaf has the built-in `empty` type.
    KeyTypeEmpty,
    /// A key leaf's config flag differs from its list's.
    KeyConfigMismatch,
    /// Two enums in one enumeration share a name.
    DuplicateEnumName,
    /// Two enums in one enumeration share a value.
    DuplicateEnumValue,
    /// An enum name has leading or trailing whitespace.
    EnumNameWhitespace,
    /// A module with the same name and newest revision is already registered.
    DuplicateModule,
    /// Two sibling schema nodes share a name.
    DuplicateNodeName,
}

/// A single diagnostic message.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    /// Severity level.
    pub severity: Severity,
    /// Validation code, when the diagnostic maps to one.
    pub code: Option<ValidationCode>,
    /// Source line in the input document, when known.
    pub line: Option<u32>,
    /// Human-readable message.
    pub message: String,
}

/// Diagnostic sink with a mutable verbosity threshold.
#[derive(Clone, Debug)]
pub struct DiagSink {
    threshold: Verbosity,
    diagnostics: Vec<Diagnostic>,
}

impl Default for DiagSink {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagSink {
    /// Create a sink that records errors and warnings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            threshold: Severity::Warning,
            diagnostics: Vec::new(),
        }
    }

    /// Set the verbosity threshold.
    pub fn set_verbosity(&mut self, threshold: Verbosity) {
        self.threshold = threshold;
    }

    /// Get the verbosity threshold.
    #[must_use]
    pub fn verbosity(&self) -> Verbosity {
        self.threshold
    }

    /// Record a diagnostic if it passes the threshold.
    pub fn report(&mut self, diag: Diagnostic) {
        if diag.severity <= self.threshold {
            self.diagnostics.push(diag);
        }
    }

    /// Record a validation error with a code and source line.
    pub fn error(&mut self, code: ValidationCode, line: Option<u32>, message: String) {
        self.report(Diagnostic {
            severity: Severity::Error,
            code: Some(code),
            line,
            message,
        });
    }

    /// Record a warning.
    pub fn warning(&mut self, line: Option<u32>, message: String) {
        self.report(Diagnostic {
            severity: Severity::Warning,
            code: None,
            line,
            message,
        });
    }

    /// Record a verbose progress message.
    pub fn verbose(&mut self, message: String) {
        self.report(Diagnostic {
            severity: Severity::Verbose,
            code: None,
            line: None,
            message,
        });
    }

    /// All recorded diagnostics, in report order.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// The most recently recorded error, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<&Diagnostic> {
        self.diagnostics
            .iter()
            .rev()
            .find(|d| d.severity == Severity::Error)
    }

    /// Discard recorded diagnostics, keeping the threshold.
    pub fn clear(&mut self) {
        self.diagnostics.clear();
    }
}

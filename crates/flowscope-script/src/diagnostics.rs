//! Compilation diagnostics.
//!
//! Every recoverable compilation condition flows through [`Diagnostic`]
//! values collected into an ordered list; a failed compile is a normal
//! outcome, never a panic or an `Err` at the compile-call boundary.
//! Diagnostics are threaded through the phases as explicit values, appended
//! and returned, never mutated through shared state.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::image::LoadedType;

/// Stable diagnostic codes.
///
/// `FS1xxx` are analysis errors, `FS2xxx` analysis warnings, `FS3xxx`
/// emission errors, `FS9xxx` internal faults surfaced as diagnostics.
pub mod codes {
    /// Expression or unit source does not parse.
    pub const SYNTAX: &str = "FS1001";
    /// Identifier does not resolve to a location or parameter.
    pub const UNKNOWN_IDENTIFIER: &str = "FS1002";
    /// Operand or argument type does not fit.
    pub const TYPE_MISMATCH: &str = "FS1003";
    /// Function name does not resolve in any visible namespace.
    pub const UNKNOWN_FUNCTION: &str = "FS1004";
    /// Call has the wrong number of arguments.
    pub const ARITY: &str = "FS1005";
    /// Location has a type expressions cannot compute with.
    pub const UNSUPPORTED_TYPE: &str = "FS1006";
    /// Expression type does not match the declared result type.
    pub const RETURN_TYPE: &str = "FS1007";
    /// Imported namespace is not provided by any referenced unit.
    pub const UNKNOWN_NAMESPACE: &str = "FS2001";
    /// Referenced unit could not be resolved.
    pub const UNKNOWN_UNIT: &str = "FS2002";
    /// Two units in one compilation share a name.
    pub const DUPLICATE_UNIT: &str = "FS3001";
    /// Two members of one unit share a name.
    pub const DUPLICATE_MEMBER: &str = "FS3002";
    /// Requested type name is absent from the loaded image.
    pub const MISSING_TYPE: &str = "FS3003";
    /// Image failed to load; indicates a fault in emission itself.
    pub const INTERNAL: &str = "FS9001";
}

/// One compilation message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Originating line, 1-indexed, best-effort. Absent for conditions with
    /// no source position (e.g., load failures).
    pub source_line: Option<u32>,
    /// Stable diagnostic code from [`codes`].
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// True for severity below error.
    pub is_warning: bool,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Diagnostic {
            source_line: None,
            code: code.to_string(),
            message: message.into(),
            is_warning: false,
        }
    }

    /// Create a warning diagnostic.
    pub fn warning(code: &str, message: impl Into<String>) -> Self {
        Diagnostic {
            source_line: None,
            code: code.to_string(),
            message: message.into(),
            is_warning: true,
        }
    }

    /// Attach a source line.
    pub fn with_line(mut self, line: u32) -> Self {
        self.source_line = Some(line);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = if self.is_warning { "warning" } else { "error" };
        match self.source_line {
            Some(line) => write!(f, "{severity} {} (line {line}): {}", self.code, self.message),
            None => write!(f, "{severity} {}: {}", self.code, self.message),
        }
    }
}

/// Whether any diagnostic in the list is an error.
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(|d| !d.is_warning)
}

/// Result of an ahead-of-time compile.
///
/// Invariant: if any diagnostic is an error, `result_type` is `None`.
#[derive(Debug, Clone)]
pub struct CompileResult {
    /// The extracted type, present only on success.
    pub result_type: Option<LoadedType>,
    /// All diagnostics, in the order the phases produced them.
    pub diagnostics: Vec<Diagnostic>,
}

impl CompileResult {
    /// A failed result carrying the collected diagnostics.
    pub fn failed(diagnostics: Vec<Diagnostic>) -> Self {
        CompileResult {
            result_type: None,
            diagnostics,
        }
    }

    /// Whether any diagnostic is an error.
    pub fn has_errors(&self) -> bool {
        has_errors(&self.diagnostics)
    }
}

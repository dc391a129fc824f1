//! Error handling: three failure kinds, each surfaced at most once per
//! transaction.

use crate::bytecode::CodeObjectId;
use thiserror::Error;

/// Where in the bytecode a failure occurred, for the one-line diagnostic
/// format below: `"Line <L>: IFC Violation at <offset> in <code-object-id>"`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: u32,
    pub offset: u32,
    pub code_object: CodeObjectId,
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Line {}: IFC Violation at {} in {}",
            self.line, self.offset, self.code_object
        )
    }
}

/// The three failure kinds a transaction can end in.
#[derive(Debug, Clone, Error)]
pub enum IfcError {
    /// A language-level error (arithmetic on a bad operand, property access
    /// on null, explicit `throw`). Recoverable: dispatched to a handler if
    /// one is found; otherwise the transaction returns this to the host.
    #[error("{location}: unhandled throw: {message}")]
    Throwable {
        location: SourceLocation,
        message: String,
    },

    /// A strict No-Sensitive-Upgrade violation: a structural write, delete,
    /// scope pop, or tear-off whose destination outranks what the current
    /// PC is allowed to overwrite, with no taint-bit relaxation available.
    #[error("{location}")]
    NsuViolation { location: SourceLocation },

    /// A branch (Family 2) whose guard label carries the taint bit.
    #[error("{location}")]
    BranchOnTaint { location: SourceLocation },
}

impl IfcError {
    pub fn location(&self) -> SourceLocation {
        match self {
            IfcError::Throwable { location, .. } => *location,
            IfcError::NsuViolation { location } => *location,
            IfcError::BranchOnTaint { location } => *location,
        }
    }

    /// Whether this error terminates the whole transaction (unwind
    /// everything) rather than being recoverable via a handler. NSU
    /// violations and branch-on-taint always do; a throwable only does if
    /// no handler catches it (that decision is made by the dispatcher, not
    /// by this type).
    pub fn is_fatal_to_transaction(&self) -> bool {
        !matches!(self, IfcError::Throwable { .. })
    }
}

/// Debug-only internal precondition violation within the analyzer or PC
/// stack. This never crosses the public `Transaction::run` boundary.
#[derive(Debug, Error)]
#[error("internal contract violation: {0}")]
pub struct ContractError(pub &'static str);

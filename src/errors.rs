//! The solver's error taxonomy.
//!
//! Everything except the two interrupt kinds accumulates in the solver's
//! error vector; constraints bind their outputs to error-recovery terms and
//! keep going. Interrupts unwind `run()`.

use crate::types::Location;
use std::fmt;
use thiserror::Error;

/// Where an unknown symbol was expected.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SymbolContext {
    Type,
    Binding,
}

/// Structured error payloads. Rendering is deferred to `Display` so that
/// errors are cheap to accumulate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeErrorData {
    UnknownSymbol {
        name: String,
        context: SymbolContext,
    },
    OccursCheckFailed,
    GenericError {
        message: String,
    },
    CodeTooComplex,
    UnificationTooComplex,
    UnknownRequire {
        module: String,
    },
    IllegalRequire {
        module: String,
        reason: String,
    },
    /// Internal invariant violation; reported rather than panicking so a
    /// broken module doesn't take the host down.
    InternalError {
        message: String,
    },
}

impl TypeErrorData {
    /// Stable tag used by tests comparing error sets across orderings.
    pub fn kind(&self) -> &'static str {
        match self {
            TypeErrorData::UnknownSymbol { .. } => "UnknownSymbol",
            TypeErrorData::OccursCheckFailed => "OccursCheckFailed",
            TypeErrorData::GenericError { .. } => "GenericError",
            TypeErrorData::CodeTooComplex => "CodeTooComplex",
            TypeErrorData::UnificationTooComplex => "UnificationTooComplex",
            TypeErrorData::UnknownRequire { .. } => "UnknownRequire",
            TypeErrorData::IllegalRequire { .. } => "IllegalRequire",
            TypeErrorData::InternalError { .. } => "InternalError",
        }
    }
}

impl fmt::Display for TypeErrorData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeErrorData::UnknownSymbol { name, context } => match context {
                SymbolContext::Type => write!(f, "Unknown type '{name}'"),
                SymbolContext::Binding => write!(f, "Unknown global '{name}'"),
            },
            TypeErrorData::OccursCheckFailed => {
                write!(f, "Type contains a self-reference which cannot be resolved")
            }
            TypeErrorData::GenericError { message } => write!(f, "{message}"),
            TypeErrorData::CodeTooComplex => {
                write!(f, "Code is too complex to typecheck! Consider adding type annotations")
            }
            TypeErrorData::UnificationTooComplex => {
                write!(f, "Internal error: Code is too complex to typecheck!")
            }
            TypeErrorData::UnknownRequire { module } => {
                if module.is_empty() {
                    write!(f, "Unknown require: unsupported path")
                } else {
                    write!(f, "Unknown require: {module}")
                }
            }
            TypeErrorData::IllegalRequire { module, reason } => {
                write!(f, "Cannot require module {module}: {reason}")
            }
            TypeErrorData::InternalError { message } => {
                write!(f, "Internal error: {message}")
            }
        }
    }
}

/// A reported error with its source location and owning module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TypeError {
    pub location: Location,
    pub module_name: String,
    pub data: TypeErrorData,
}

/// Fatal conditions that abort `run()` without leaking partial results.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SolverInterrupt {
    #[error("time limit exceeded while typechecking {module}")]
    TimeLimit { module: String },
    #[error("typechecking of {module} was cancelled")]
    UserCancel { module: String },
}

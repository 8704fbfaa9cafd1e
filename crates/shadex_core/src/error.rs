//! Error taxonomy for every module operation.
//!
//! # Responsibility
//! - Carry enough context for logs while mapping onto the closed result set.
//! - Keep the boundary translation in one function (`ExtError::code`).
//!
//! # Invariants
//! - Every variant maps to exactly one failure `ResultCode`.
//! - Only grammar-level rejection maps to `ParseError`; everything else is
//!   `UnexpectedError`.

use crate::abi::{ArgTypes, ObjectKind, ResultCode};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ExtResult<T> = Result<T, ExtError>;

/// Handle-addressed resource families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    ParseContext,
    Object,
    Buffer,
}

impl Resource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ParseContext => "parse_context",
            Self::Object => "object",
            Self::Buffer => "buffer",
        }
    }
}

impl Display for Resource {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure of one module operation.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtError {
    /// Host and module disagree on the protocol magic.
    HandshakeMismatch { expected: i32, actual: i32 },
    /// Destination too small; nothing was written.
    BufferTooSmall { required: usize, capacity: usize },
    /// Keyword/index pair is not in the catalog.
    UnknownInitializer { index: i32, keyword: String },
    /// Catalog registration rejected.
    InvalidInitializer(String),
    /// Raw object kind is not a single known kind bit.
    InvalidObjectKind(i32),
    /// Initializer cannot produce this object kind.
    UnsupportedKind { keyword: String, kind: ObjectKind },
    /// Token is unknown, already freed, or belongs to another object.
    UnknownHandle { resource: Resource, token: usize },
    /// Argument rejected by the initializer grammar.
    Syntax(String),
    /// Host reported success before the grammar was complete.
    IncompleteArguments { keyword: String, expected: ArgTypes },
    /// Operation not legal in the object's current lifecycle state.
    InvalidState {
        operation: &'static str,
        reason: &'static str,
    },
    /// Fetch request disagrees with the declared working set.
    RequestMismatch(String),
    /// Required capability was never advertised for this object.
    CapabilityDenied {
        operation: &'static str,
        capability: &'static str,
    },
    /// Handle table cannot address another entry.
    Exhausted(Resource),
    /// Host text is not valid in its declared encoding.
    InvalidText(String),
    /// Pixel source reported a failure.
    Source(String),
}

impl ExtError {
    /// Maps this error onto the boundary result set.
    pub fn code(&self) -> ResultCode {
        match self {
            Self::Syntax(_) => ResultCode::ParseError,
            _ => ResultCode::UnexpectedError,
        }
    }
}

impl Display for ExtError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HandshakeMismatch { expected, actual } => write!(
                f,
                "handshake magic mismatch: expected {expected:#010x}, got {actual:#010x}"
            ),
            Self::BufferTooSmall { required, capacity } => write!(
                f,
                "destination holds {capacity} units but {required} are required"
            ),
            Self::UnknownInitializer { index, keyword } => {
                write!(f, "unknown initializer #{index} `{keyword}`")
            }
            Self::InvalidInitializer(message) => write!(f, "invalid initializer: {message}"),
            Self::InvalidObjectKind(raw) => write!(f, "invalid object kind value: {raw}"),
            Self::UnsupportedKind { keyword, kind } => {
                write!(f, "initializer `{keyword}` cannot produce {kind} objects")
            }
            Self::UnknownHandle { resource, token } => {
                write!(f, "unknown or released {resource} token {token:#x}")
            }
            Self::Syntax(message) => write!(f, "{message}"),
            Self::IncompleteArguments { keyword, expected } => write!(
                f,
                "initializer `{keyword}` finished while still expecting {expected}"
            ),
            Self::InvalidState { operation, reason } => write!(f, "{operation} rejected: {reason}"),
            Self::RequestMismatch(message) => write!(f, "pixel request mismatch: {message}"),
            Self::CapabilityDenied {
                operation,
                capability,
            } => write!(f, "{operation} requires undeclared capability {capability}"),
            Self::Exhausted(resource) => write!(f, "{resource} table is full"),
            Self::InvalidText(message) => write!(f, "invalid host text: {message}"),
            Self::Source(message) => write!(f, "pixel source failure: {message}"),
        }
    }
}

impl Error for ExtError {}

#[cfg(test)]
mod tests {
    use super::{ExtError, Resource};
    use crate::abi::ResultCode;

    #[test]
    fn only_syntax_errors_are_parse_errors() {
        assert_eq!(
            ExtError::Syntax("bad".to_string()).code(),
            ResultCode::ParseError
        );
        assert_eq!(
            ExtError::UnknownHandle {
                resource: Resource::Buffer,
                token: 7,
            }
            .code(),
            ResultCode::UnexpectedError
        );
        assert_eq!(
            ExtError::BufferTooSmall {
                required: 8,
                capacity: 4,
            }
            .code(),
            ResultCode::UnexpectedError
        );
    }

    #[test]
    fn display_includes_context() {
        let err = ExtError::CapabilityDenied {
            operation: "load_file",
            capability: "FILE_INPUT",
        };
        assert!(err.to_string().contains("FILE_INPUT"));
    }
}

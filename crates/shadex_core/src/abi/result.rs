//! Closed set of result codes returned by every entry point.

/// Result code of one boundary call.
///
/// Positive codes are non-error outcomes; negative codes are failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ResultCode {
    Ok = 0,
    /// Enumeration finished.
    NoMoreItems = 1,
    /// Optional data is not available.
    NoData = 2,
    /// Call was understood and deliberately not acted on.
    Ignore = 3,
    /// Grammar-level rejection of initializer input.
    ParseError = -1,
    /// Contract violation or internal fault.
    UnexpectedError = -2,
}

impl ResultCode {
    pub fn as_raw(self) -> i32 {
        self as i32
    }

    pub fn from_raw(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Ok),
            1 => Some(Self::NoMoreItems),
            2 => Some(Self::NoData),
            3 => Some(Self::Ignore),
            -1 => Some(Self::ParseError),
            -2 => Some(Self::UnexpectedError),
            _ => None,
        }
    }

    pub fn is_failure(self) -> bool {
        self.as_raw() < 0
    }
}

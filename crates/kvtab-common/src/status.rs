//! Status codes reported to the host engine.
//!
//! The host storage layer speaks integer status codes. Every adapter error
//! maps onto one of these; `0` is success. The numeric values are stable
//! and must not be renumbered.

use std::fmt;

/// Host-facing status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum StatusCode {
    /// Operation succeeded.
    Success = 0,
    /// Internal error, including malformed store replies.
    InternalError = 122,
    /// Resource exhaustion while allocating shared state.
    OutOfMemory = 128,
    /// The operation is not supported by this engine.
    WrongCommand = 131,
    /// End of a table scan. Not a failure.
    EndOfFile = 137,
    /// Timed out waiting for a table lock.
    LockWaitTimeout = 146,
    /// The backing store could not be reached.
    NoConnection = 157,
    /// The declared table definition does not fit the engine.
    TableDefChanged = 159,
}

impl StatusCode {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns true for the success code.
    #[inline]
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, StatusCode::Success)
    }

    /// Returns true if the code ends an operation without signalling failure.
    #[inline]
    #[must_use]
    pub const fn is_terminal_ok(self) -> bool {
        matches!(self, StatusCode::Success | StatusCode::EndOfFile)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, self.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(StatusCode::Success.as_u16(), 0);
        assert_eq!(StatusCode::WrongCommand.as_u16(), 131);
        assert_eq!(StatusCode::EndOfFile.as_u16(), 137);
        assert_eq!(StatusCode::NoConnection.as_u16(), 157);
    }

    #[test]
    fn test_terminal_ok() {
        assert!(StatusCode::Success.is_terminal_ok());
        assert!(StatusCode::EndOfFile.is_terminal_ok());
        assert!(!StatusCode::EndOfFile.is_success());
        assert!(!StatusCode::NoConnection.is_terminal_ok());
    }

    #[test]
    fn test_display() {
        assert_eq!(StatusCode::EndOfFile.to_string(), "EndOfFile(137)");
    }
}

//! Core types for the event log client.

use std::fmt;

/// A point in the global (`$all`) log.
///
/// Positions are ordered by commit offset, then by prepare offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub commit: u64,
    pub prepare: u64,
}

impl Position {
    /// Start of the `$all` stream.
    pub const START: Position = Position {
        commit: 0,
        prepare: 0,
    };

    /// End of the `$all` stream.
    pub const END: Position = Position {
        commit: u64::MAX,
        prepare: u64::MAX,
    };

    pub fn new(commit: u64, prepare: u64) -> Self {
        Self { commit, prepare }
    }

    /// Check if this is the start sentinel
    pub fn is_start(&self) -> bool {
        *self == Position::START
    }

    /// Check if this is the end sentinel
    pub fn is_end(&self) -> bool {
        *self == Position::END
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C:{}/P:{}", self.commit, self.prepare)
    }
}

/// Offset of an event within a single stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamPosition(u64);

impl StreamPosition {
    /// The first event of a stream.
    pub const START: StreamPosition = StreamPosition(0);

    /// The end of a stream, only meaningful as a read start point.
    pub const END: StreamPosition = StreamPosition(u64::MAX);

    /// Create a position at a specific revision.
    pub fn new(revision: u64) -> Self {
        StreamPosition(revision)
    }

    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn is_start(&self) -> bool {
        *self == StreamPosition::START
    }

    pub fn is_end(&self) -> bool {
        *self == StreamPosition::END
    }
}

impl Default for StreamPosition {
    fn default() -> Self {
        StreamPosition::START
    }
}

impl From<u64> for StreamPosition {
    fn from(revision: u64) -> Self {
        StreamPosition(revision)
    }
}

impl fmt::Display for StreamPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read direction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Direction {
    #[default]
    Forwards,
    Backwards,
}

/// Outcome of a single-stream read, known as soon as the first message arrives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadState {
    Ok,
    StreamNotFound,
}

/// Credentials attached to a call.
///
/// These are passed through to the transport untouched.
#[derive(Clone, PartialEq, Eq)]
pub struct UserCredentials {
    pub username: String,
    pub password: String,
}

impl UserCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_orders_by_commit_then_prepare() {
        let a = Position::new(10, 5);
        let b = Position::new(10, 7);
        let c = Position::new(11, 0);
        assert!(a < b);
        assert!(b < c);
        assert!(Position::START < a);
        assert!(c < Position::END);
    }

    #[test]
    fn test_stream_position_sentinels() {
        assert!(StreamPosition::START.is_start());
        assert!(StreamPosition::END.is_end());
        assert_eq!(StreamPosition::from(0), StreamPosition::START);
        assert!(StreamPosition::new(3) < StreamPosition::END);
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = UserCredentials::new("admin", "changeit");
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("admin"));
        assert!(!rendered.contains("changeit"));
    }
}

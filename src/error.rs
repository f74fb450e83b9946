use crate::command::error::CmeError;

/// Failure reported by the modem in a terminal status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// A bare `ERROR` without further detail.
    Generic,
    /// `+CME ERROR: <code>`
    Cme(CmeError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SnapshotError {
    /// The snapshot did not fit the store or the serialization buffer.
    TooLarge,
    /// The stored bytes could not be decoded, or carry an unknown version.
    Corrupt,
    /// The backing store reported a failure.
    Store,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    // Transaction outcomes
    Transport,
    Timeout,
    Protocol(ProtocolError),
    ParseOverflow,

    // Submission back-pressure
    QueueFull,
    PoolExhausted,
    CommandTooLong,

    /// The reply of a typed command could not be decoded.
    Parse,
    /// The engine still has queued or in-flight work.
    Busy,

    Snapshot(SnapshotError),

    IoPin,
}

impl Error {
    pub fn cme(&self) -> Option<CmeError> {
        match self {
            Self::Protocol(ProtocolError::Cme(e)) => Some(*e),
            _ => None,
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for Error {
    fn format(&self, f: defmt::Formatter<'_>) {
        match self {
            Self::Transport => defmt::write!(f, "Transport"),
            Self::Timeout => defmt::write!(f, "Timeout"),
            Self::Protocol(e) => defmt::write!(f, "Protocol({:?})", e),
            Self::ParseOverflow => defmt::write!(f, "ParseOverflow"),
            Self::QueueFull => defmt::write!(f, "QueueFull"),
            Self::PoolExhausted => defmt::write!(f, "PoolExhausted"),
            Self::CommandTooLong => defmt::write!(f, "CommandTooLong"),
            Self::Parse => defmt::write!(f, "Parse"),
            Self::Busy => defmt::write!(f, "Busy"),
            Self::Snapshot(e) => defmt::write!(f, "Snapshot({:?})", e),
            Self::IoPin => defmt::write!(f, "IoPin"),
        }
    }
}

impl From<ProtocolError> for Error {
    fn from(e: ProtocolError) -> Self {
        Self::Protocol(e)
    }
}

impl From<SnapshotError> for Error {
    fn from(e: SnapshotError) -> Self {
        Self::Snapshot(e)
    }
}

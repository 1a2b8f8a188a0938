use std::{io, path::PathBuf};

use thiserror::Error;

use crate::session::Termination;

/// Rejected run configuration. Raised before any file is loaded or session created.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("busy factor must be within [0, 1], got {0}")]
    BusyFactorOutOfRange(f64),

    #[error("fail factor must be within [0, 1], got {0}")]
    FailFactorOutOfRange(f64),
}

#[derive(Error, Debug)]
pub enum SampleError {
    #[error("could not read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{}:{line}: expected 2 fields (username,password), found {fields}", .path.display())]
    Format {
        path: PathBuf,
        line: u64,
        fields: usize,
    },

    #[error("could not parse {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("sample pool `{name}` has {len} entries, at least {required} are needed")]
    TooSmall {
        name: &'static str,
        len: usize,
        required: usize,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty message")]
    Empty,

    #[error("message is not valid UTF-8")]
    Utf8,

    #[error("unknown message id {0:?}")]
    UnknownMessage(String),

    #[error("message {id} truncated: fixed part needs {expected} bytes, got {actual}")]
    Truncated {
        id: String,
        expected: usize,
        actual: usize,
    },

    #[error("message {0} has non-ASCII bytes in its fixed-length fields")]
    NonAsciiFixedFields(String),

    #[error("checksum mismatch: message says {found}, computed {computed}")]
    Checksum { found: String, computed: String },
}

/// Everything that can end (or disturb) a single simulated terminal.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("error connecting to SIP server: {0}")]
    Dial(#[source] io::Error),

    #[error("error writing SIP request: {0}")]
    Write(#[source] io::Error),

    #[error("error reading SIP response: {0}")]
    Read(#[source] io::Error),

    #[error("connection closed by peer")]
    CleanDisconnect,

    #[error("error decoding SIP response: {0}")]
    Decode(#[from] DecodeError),

    #[error("SIP login failed")]
    LoginRejected,
}

impl SessionError {
    /// Classifies a write failure; a peer that went away is not an error worth logging.
    pub fn from_write(e: io::Error) -> Self {
        if Self::is_eof(&e) {
            SessionError::CleanDisconnect
        } else {
            SessionError::Write(e)
        }
    }

    pub fn from_read(e: io::Error) -> Self {
        if Self::is_eof(&e) {
            SessionError::CleanDisconnect
        } else {
            SessionError::Read(e)
        }
    }

    fn is_eof(e: &io::Error) -> bool {
        e.kind() == io::ErrorKind::UnexpectedEof
    }

    /// How a session ends because of this error, `None` when it does not end.
    pub fn termination(&self) -> Option<Termination> {
        match self {
            SessionError::Dial(_) => Some(Termination::DialFailed),
            SessionError::Write(_) => Some(Termination::WriteFailed),
            SessionError::Read(_) => Some(Termination::ReadFailed),
            SessionError::CleanDisconnect => Some(Termination::Disconnected),
            SessionError::LoginRejected => Some(Termination::LoginRejected),
            SessionError::Decode(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eof_is_a_clean_disconnect() {
        let err = SessionError::from_write(io::Error::from(io::ErrorKind::UnexpectedEof));
        assert!(matches!(err, SessionError::CleanDisconnect));

        let err = SessionError::from_read(io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(matches!(err, SessionError::Read(_)));
        assert_eq!(err.termination(), Some(Termination::ReadFailed));
    }

    #[test]
    fn only_decode_errors_are_survivable() {
        assert_eq!(SessionError::Decode(DecodeError::Empty).termination(), None);
        assert_eq!(
            SessionError::LoginRejected.termination(),
            Some(Termination::LoginRejected)
        );
        assert_eq!(
            SessionError::CleanDisconnect.termination(),
            Some(Termination::Disconnected)
        );
    }
}

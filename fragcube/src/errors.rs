use std::fmt;
use std::io;
use std::result;

#[derive(Debug)]
pub enum Error {
    /// Malformed or contradictory user input
    InvalidParam(String),

    /// A buffer size computation overflowed or an allocation is unreasonable
    Memory(String),

    /// A collaborator (source reader, metadata store, i/o server) failed
    Utility(String),

    /// The requested partitioning exceeds the deployment's capacity
    ResourceConstraint(String),

    /// A failure code received from another rank
    Remote(i64),

    IO(io::Error),
}

impl Error {
    /// Stable status code for this error class, used when a failure has to
    /// cross rank boundaries.
    ///
    pub fn code(&self) -> i64 {
        match self {
            Self::InvalidParam(_) => 1,
            Self::Memory(_) => 2,
            Self::Utility(_) => 3,
            Self::ResourceConstraint(_) => 4,
            Self::IO(_) => 5,
            Self::Remote(code) => *code,
        }
    }

    /// Reconstruct the error class another rank reported by code.
    ///
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => Self::InvalidParam(String::from("reported by another rank")),
            2 => Self::Memory(String::from("reported by another rank")),
            3 => Self::Utility(String::from("reported by another rank")),
            4 => Self::ResourceConstraint(String::from("reported by another rank")),
            _ => Self::Remote(code),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Self::IO(err)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidParam(msg) => write!(f, "invalid parameter: {}", msg),
            Self::Memory(msg) => write!(f, "memory error: {}", msg),
            Self::Utility(msg) => write!(f, "utility error: {}", msg),
            Self::ResourceConstraint(msg) => write!(f, "resource constraint: {}", msg),
            Self::Remote(code) => write!(f, "remote failure, status code {}", code),
            Self::IO(err) => write!(f, "i/o error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::IO(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = result::Result<T, Error>;

use std::fmt;
use std::io;

#[derive(Debug)]
pub enum Error {
    /// Corrupt data on the inter-shard wire, e.g. a truncated serialised
    /// double or an exponent outside the transportable range.
    Network(String),
    /// Failure propagated from a backend cursor; never retried here.
    Database(String),
    /// Malformed range bounds for a value slot.
    Range(String),
    /// A query that cannot be turned into a posting list tree.
    InvalidArgument(String),
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Network(msg) => write!(f, "network error: {}", msg),
            Error::Database(msg) => write!(f, "database error: {}", msg),
            Error::Range(msg) => write!(f, "range error: {}", msg),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Error::Io(e) => write!(f, "io error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<fst::Error> for Error {
    fn from(e: fst::Error) -> Self {
        Error::Database(e.to_string())
    }
}

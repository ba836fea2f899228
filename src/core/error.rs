use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Config,
    Parse,
    Resolve,
    Io,
    Scan,
    Concurrency,
    NotFound,
    InvalidArgument,
    InvalidState,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: String) -> Self {
        Error { kind, context }
    }

    pub fn config(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Config, context.into())
    }

    pub fn parse(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Parse, context.into())
    }

    pub fn resolve(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Resolve, context.into())
    }

    pub fn scan(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Scan, context.into())
    }

    pub fn concurrency(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::Concurrency, context.into())
    }

    pub fn not_found(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::NotFound, context.into())
    }

    pub fn invalid_state(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidState, context.into())
    }

    pub fn invalid_argument(context: impl Into<String>) -> Self {
        Error::new(ErrorKind::InvalidArgument, context.into())
    }

    /// Wrap an I/O failure with the path or operation that caused it.
    pub fn io(err: std::io::Error, what: impl fmt::Display) -> Self {
        Error::new(ErrorKind::Io, format!("{}: {}", what, err))
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.context)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            kind: ErrorKind::Io,
            context: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            kind: ErrorKind::Config,
            context: format!("config file: {}", err),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

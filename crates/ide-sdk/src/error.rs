use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A recipe or component could not be parsed or resolved.
    Config,
    /// A required binary is absent or not executable.
    MissingExecutable,
    /// Something was registered twice.
    Duplicate,
    /// Malformed user or recipe input (connect string, cmake argument).
    InvalidArgument,
    /// A feature was requested for a build tool that does not support it.
    Unsupported,
    Io,
    /// An external command ran but failed.
    Command,
    Internal,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    msg: String,
}

impl Error {
    pub fn msg<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::Internal, msg)
    }

    pub fn new<M: Into<String>>(kind: ErrorKind, msg: M) -> Self {
        Self {
            kind,
            msg: msg.into(),
        }
    }

    pub fn config<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::Config, msg)
    }

    pub fn missing_executable<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::MissingExecutable, msg)
    }

    pub fn invalid_argument<M: Into<String>>(msg: M) -> Self {
        Self::new(ErrorKind::InvalidArgument, msg)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::new(ErrorKind::Io, err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::config(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::new(ErrorKind::Io, format!("json error: {err}"))
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        Self::new(ErrorKind::Io, format!("walkdir error: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

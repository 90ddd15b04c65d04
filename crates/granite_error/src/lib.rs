use std::error::Error;
use std::fmt;

pub type Result<T, E = DbError> = std::result::Result<T, E>;

/// Stable error classification.
///
/// Callers branch on the kind, never on the message. Messages exist for
/// humans and may change freely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorKind {
    /// Catch-all for internal invariant violations.
    Internal,
    /// Invalid or unsupported combination of options, detected before any
    /// input is consumed. Not retryable with the same configuration.
    InvalidConfiguration,
    /// A memory budget was exceeded and falling back to disk was disallowed.
    ResourceExhaustion,
    /// Failure reading or writing external storage.
    Io,
    /// Feature not yet implemented.
    NotImplemented,
}

/// Primary error type used throughout the engine.
#[derive(Debug)]
pub struct DbError {
    kind: DbErrorKind,
    msg: String,
    source: Option<Box<dyn Error + Send + Sync>>,
    /// Extra key/value context attached to the error, printed alongside the
    /// message.
    fields: Vec<(&'static str, String)>,
}

impl DbError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self::with_kind(DbErrorKind::Internal, msg)
    }

    pub fn with_kind(kind: DbErrorKind, msg: impl Into<String>) -> Self {
        DbError {
            kind,
            msg: msg.into(),
            source: None,
            fields: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: impl Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn with_field(mut self, key: &'static str, value: impl fmt::Display) -> Self {
        self.fields.push((key, value.to_string()));
        self
    }

    pub fn kind(&self) -> DbErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.msg
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg)?;
        if !self.fields.is_empty() {
            write!(f, " (")?;
            for (idx, (key, value)) in self.fields.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{key} = {value}")?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_ref().map(|s| s.as_ref() as _)
    }
}

pub trait ResultExt<T> {
    /// Wrap the error with a static context message.
    fn context(self, msg: &'static str) -> Result<T>;

    /// Wrap the error with a lazily computed context message.
    fn context_fn<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Error + Send + Sync + 'static,
{
    fn context(self, msg: &'static str) -> Result<T> {
        self.map_err(|e| DbError::new(msg).with_source(e))
    }

    fn context_fn<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| DbError::new(f()).with_source(e))
    }
}

pub trait OptionExt<T> {
    /// Convert a None into an internal error with the given message.
    fn required(self, msg: &'static str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn required(self, msg: &'static str) -> Result<T> {
        self.ok_or_else(|| DbError::new(msg))
    }
}

#[macro_export]
macro_rules! not_implemented {
    ($($arg:tt)*) => {
        return Err($crate::DbError::with_kind(
            $crate::DbErrorKind::NotImplemented,
            format!($($arg)*),
        ))
    };
}

//! Error type shared by every reconciliation component.
//!
//! A [`SyncError`] carries a classification, a static description, optional dynamic detail, an
//! optional source and the callsite that raised it. Several errors can be aggregated into one,
//! which is how the coordinator reports multiple failed commits.

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Result type used throughout the crate.
pub type SyncResult<T> = Result<T, SyncError>;

/// Categories of errors raised while reconciling and writing records.
///
/// Retry decisions are derived from the kind alone, see
/// [`crate::concurrency::policy::build_commit_policy`].
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Document store
    StoreUnavailable,
    StoreDeadlineExceeded,
    StoreQueryFailed,
    StoreCommitFailed,
    DocumentNotFound,

    // Reference catalog
    CatalogRequestFailed,
    CatalogInvalidResponse,

    // Image collaborator
    ImageProcessingFailed,

    // Data & configuration
    ConfigError,
    InvalidData,
    InvalidQuery,

    // IO & serialization
    IoError,
    SerializationError,
    DeserializationError,

    // Coordinator
    CommitTaskPanic,
    InvalidState,

    Unknown,
}

#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

#[derive(Debug, Clone)]
enum ErrorRepr {
    Single(ErrorPayload),
    Many {
        errors: Vec<SyncError>,
        location: &'static Location<'static>,
    },
}

/// Error raised by reconciliation, matching, merging and batched writes.
#[derive(Debug, Clone)]
pub struct SyncError {
    repr: ErrorRepr,
}

impl SyncError {
    /// Returns the kind of this error, or of the first aggregated error.
    pub fn kind(&self) -> ErrorKind {
        match &self.repr {
            ErrorRepr::Single(payload) => payload.kind,
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(SyncError::kind)
                .unwrap_or(ErrorKind::Unknown),
        }
    }

    /// Returns every kind contained in this error, flattening aggregates.
    pub fn kinds(&self) -> Vec<ErrorKind> {
        match &self.repr {
            ErrorRepr::Single(payload) => vec![payload.kind],
            ErrorRepr::Many { errors, .. } => errors.iter().flat_map(SyncError::kinds).collect(),
        }
    }

    /// Returns the static description of this error, or of the first aggregated error.
    pub fn description(&self) -> &str {
        match &self.repr {
            ErrorRepr::Single(payload) => &payload.description,
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(SyncError::description)
                .unwrap_or("aggregated errors"),
        }
    }

    /// Returns the dynamic detail, or the first detail found among aggregated errors.
    pub fn detail(&self) -> Option<&str> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload.detail.as_deref(),
            ErrorRepr::Many { errors, .. } => errors.iter().find_map(SyncError::detail),
        }
    }

    /// Returns the backtrace captured when a single error was created.
    pub fn backtrace(&self) -> Option<&Backtrace> {
        match &self.repr {
            ErrorRepr::Single(payload) => Some(payload.backtrace.as_ref()),
            ErrorRepr::Many { .. } => None,
        }
    }

    /// Returns the callsite that created this error.
    pub fn location(&self) -> &'static Location<'static> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload.location,
            ErrorRepr::Many { location, .. } => location,
        }
    }

    /// Attaches the originating error. Ignored on aggregates, which expose their first error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        if let ErrorRepr::Single(payload) = &mut self.repr {
            payload.source = Some(Arc::new(source));
        }

        self
    }

    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        SyncError {
            repr: ErrorRepr::Single(ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            }),
        }
    }

    #[track_caller]
    fn wrap<E>(kind: ErrorKind, description: &'static str, err: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        let detail = err.to_string();
        SyncError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl PartialEq for SyncError {
    fn eq(&self, other: &SyncError) -> bool {
        match (&self.repr, &other.repr) {
            (ErrorRepr::Single(a), ErrorRepr::Single(b)) => a.kind == b.kind,
            (ErrorRepr::Many { errors: a, .. }, ErrorRepr::Many { errors: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            ErrorRepr::Single(payload) => {
                let location = payload.location;
                write!(
                    f,
                    "[{:?}] {} @ {}:{}",
                    payload.kind,
                    payload.description,
                    location.file(),
                    location.line()
                )?;

                if let Some(detail) = &payload.detail {
                    for line in detail.lines() {
                        write!(f, "\n  {line}")?;
                    }
                }

                Ok(())
            }
            ErrorRepr::Many { errors, location } => {
                write!(
                    f,
                    "[Many] {} errors @ {}:{}",
                    errors.len(),
                    location.file(),
                    location.line()
                )?;

                for (index, error) in errors.iter().enumerate() {
                    let rendered = error.to_string();
                    for (line_index, line) in rendered.lines().enumerate() {
                        if line_index == 0 {
                            write!(f, "\n  {}. {line}", index + 1)?;
                        } else {
                            write!(f, "\n     {line}")?;
                        }
                    }
                }

                Ok(())
            }
        }
    }
}

impl error::Error for SyncError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.repr {
            ErrorRepr::Single(payload) => payload
                .source
                .as_ref()
                .map(|source| source.as_ref() as &(dyn error::Error + 'static)),
            ErrorRepr::Many { errors, .. } => errors
                .first()
                .map(|error| error as &(dyn error::Error + 'static)),
        }
    }
}

impl From<(ErrorKind, &'static str)> for SyncError {
    #[track_caller]
    fn from((kind, description): (ErrorKind, &'static str)) -> SyncError {
        SyncError::from_components(kind, Cow::Borrowed(description), None, None)
    }
}

impl<D> From<(ErrorKind, &'static str, D)> for SyncError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, description, detail): (ErrorKind, &'static str, D)) -> SyncError {
        SyncError::from_components(kind, Cow::Borrowed(description), Some(detail.into()), None)
    }
}

/// Aggregates errors. A single error is returned unwrapped.
impl<E> From<Vec<E>> for SyncError
where
    E: Into<SyncError>,
{
    #[track_caller]
    fn from(errors: Vec<E>) -> SyncError {
        let location = Location::caller();
        let mut errors: Vec<SyncError> = errors.into_iter().map(Into::into).collect();

        if errors.len() == 1 {
            if let Some(error) = errors.pop() {
                return error;
            }
        }

        SyncError {
            repr: ErrorRepr::Many { errors, location },
        }
    }
}

impl From<std::io::Error> for SyncError {
    #[track_caller]
    fn from(err: std::io::Error) -> SyncError {
        SyncError::wrap(ErrorKind::IoError, "I/O operation failed", err)
    }
}

impl From<serde_json::Error> for SyncError {
    #[track_caller]
    fn from(err: serde_json::Error) -> SyncError {
        let (kind, description) = match err.classify() {
            serde_json::error::Category::Io => (ErrorKind::IoError, "JSON I/O operation failed"),
            serde_json::error::Category::Syntax
            | serde_json::error::Category::Data
            | serde_json::error::Category::Eof => (
                ErrorKind::DeserializationError,
                "JSON deserialization failed",
            ),
        };

        SyncError::wrap(kind, description, err)
    }
}

/// Maps [`sqlx::Error`] onto store error kinds.
///
/// Pool acquisition timeouts and canceled statements count as deadline exceeded, connection
/// loss and contention SQLSTATEs as unavailable.
impl From<sqlx::Error> for SyncError {
    #[track_caller]
    fn from(err: sqlx::Error) -> SyncError {
        let kind = match &err {
            sqlx::Error::PoolTimedOut => ErrorKind::StoreDeadlineExceeded,
            sqlx::Error::Io(_) | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
                ErrorKind::StoreUnavailable
            }
            sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
                // query_canceled, raised by statement_timeout
                Some("57014") => ErrorKind::StoreDeadlineExceeded,
                // serialization_failure, deadlock_detected, too_many_connections,
                // admin_shutdown, cannot_connect_now
                Some("40001" | "40P01" | "53300" | "57P01" | "57P03") => {
                    ErrorKind::StoreUnavailable
                }
                _ => ErrorKind::StoreQueryFailed,
            },
            _ => ErrorKind::StoreQueryFailed,
        };

        SyncError::wrap(kind, "Document store operation failed", err)
    }
}

impl From<reqwest::Error> for SyncError {
    #[track_caller]
    fn from(err: reqwest::Error) -> SyncError {
        if err.is_decode() {
            return SyncError::wrap(
                ErrorKind::CatalogInvalidResponse,
                "Catalog response could not be decoded",
                err,
            );
        }

        SyncError::wrap(ErrorKind::CatalogRequestFailed, "Catalog request failed", err)
    }
}

impl From<regex::Error> for SyncError {
    #[track_caller]
    fn from(err: regex::Error) -> SyncError {
        SyncError::wrap(ErrorKind::ConfigError, "Invalid identifier pattern", err)
    }
}

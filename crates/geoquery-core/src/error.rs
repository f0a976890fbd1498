use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeoQueryError {
    /// Network unreachable, timeout, or retries exhausted.
    #[error("Connection error: {0}")]
    Connection(String),

    /// The service answered, but with malformed data or a rejected query.
    #[error("Query error: {0}")]
    Query(String),

    /// Caller input violates a precondition.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The model backend failed or produced an unusable filter specification.
    #[error("Translation error: {0}")]
    Translation(String),
}

/// Discriminant of [`GeoQueryError`], convenient for matching and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connection,
    Query,
    Validation,
    Translation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Connection => write!(f, "ConnectionError"),
            ErrorKind::Query => write!(f, "QueryError"),
            ErrorKind::Validation => write!(f, "ValidationError"),
            ErrorKind::Translation => write!(f, "TranslationError"),
        }
    }
}

impl GeoQueryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GeoQueryError::Connection(_) => ErrorKind::Connection,
            GeoQueryError::Query(_) => ErrorKind::Query,
            GeoQueryError::Validation(_) => ErrorKind::Validation,
            GeoQueryError::Translation(_) => ErrorKind::Translation,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        GeoQueryError::Validation(msg.into())
    }

    pub fn query(msg: impl Into<String>) -> Self {
        GeoQueryError::Query(msg.into())
    }

    pub fn translation(msg: impl Into<String>) -> Self {
        GeoQueryError::Translation(msg.into())
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        GeoQueryError::Connection(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, GeoQueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(GeoQueryError::query("x").kind(), ErrorKind::Query);
        assert_eq!(
            GeoQueryError::validation("x").kind(),
            ErrorKind::Validation
        );
        assert_eq!(ErrorKind::Connection.to_string(), "ConnectionError");
    }

    #[test]
    fn test_display_includes_message() {
        let err = GeoQueryError::translation("missing where_clause");
        assert_eq!(
            err.to_string(),
            "Translation error: missing where_clause"
        );
    }
}

use thiserror::Error;

/// Boxed cause carried by [`Error::PropertyWrite`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors raised by the mapper and the SQLite access layer.
#[derive(Debug, Error)]
pub enum Error {
    /// A cursor was used after it had been closed.
    #[error("cursor is closed")]
    CursorClosed,

    /// Assigning a column value to an entity property failed.
    #[error("error in assigning value of {property}: {source}")]
    PropertyWrite {
        property: &'static str,
        #[source]
        source: BoxError,
    },

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// A result row names the same column twice.
    #[error("duplicate column {0} in result row")]
    DuplicateColumn(String),

    /// A parameter bag could not be turned into statement bindings.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Failure to coerce a [`Value`](crate::value::Value) into a Rust type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    #[error("unexpected NULL for non-nullable {expected}")]
    UnexpectedNull { expected: &'static str },

    #[error("cannot convert {found} to {expected}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("value {value} is out of range for {expected}")]
    OutOfRange { expected: &'static str, value: i64 },

    #[error("'{value}' is not a valid {enum_name}")]
    InvalidEnum {
        enum_name: &'static str,
        value: String,
    },
}

impl Error {
    pub(crate) fn property_write(property: &'static str, source: BoxError) -> Self {
        Error::PropertyWrite { property, source }
    }
}

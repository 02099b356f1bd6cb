//! Crate-wide error type.
//!
//! Every layer (file store, buffer pool, record manager, index manager,
//! catalog/executor) returns `Result<T>` built on this single enum rather
//! than the C++ source's "print to stdout, return false" convention —
//! the diagnostic text lives in the error itself and is only rendered at
//! the boundary that needs to show it (the CLI, or a test assertion).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, DbError>;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("page {0} not found")]
    PageNotFound(u32),

    #[error("invalid page id: {0}")]
    InvalidPageId(u32),

    #[error("buffer pool has no evictable frames")]
    NoFreeFrames,

    #[error("file handle {0} is not open")]
    InvalidHandle(u32),

    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("record not found at {0:?}")]
    RecordNotFound(crate::record::RecordLocation),

    #[error("heap page is full")]
    PageFull,

    #[error("index key count mismatch: expected {expected}, got {got}")]
    IndexKeyCountMismatch { expected: usize, got: usize },

    #[error("index entry not found")]
    IndexEntryNotFound,

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not null constraint violated on column {0}")]
    NotNullViolation(i32),

    #[error("duplicate primary key value")]
    DuplicatePrimaryKey,

    #[error("duplicate unique value on column {0}")]
    DuplicateUnique(i32),

    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),

    #[error("table {0} is referenced by another table's foreign key")]
    TableReferenced(String),

    #[error("database not found: {0}")]
    DatabaseNotFound(String),

    #[error("table not found: {0}")]
    TableNotFound(String),

    #[error("column not found: {0}")]
    ColumnNotFound(String),

    #[error("database already exists: {0}")]
    DatabaseExists(String),

    #[error("table already exists: {0}")]
    TableExists(String),

    #[error("no active database selected")]
    NoActiveDatabase,

    #[error("internal integrity assertion failed: {0}")]
    Integrity(String),

    #[error("malformed input: {0}")]
    MalformedInput(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_diagnostic() {
        let err = DbError::PageNotFound(42);
        assert_eq!(format!("{err}"), "page 42 not found");
    }

    #[test]
    fn io_error_converts_via_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "nope");
        let err: DbError = io_err.into();
        assert!(matches!(err, DbError::Io(_)));
    }
}

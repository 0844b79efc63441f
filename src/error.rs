use std::ffi::CStr;
use std::io;
use std::os::raw::c_int;
use std::result;

use lmdb_sys as ffi;
use thiserror::Error;

use crate::types::TxnState;

/// Result type for all lumokv operations
pub type Result<T> = result::Result<T, Error>;

/// Errors surfaced by the access layer.
#[derive(Debug, Error)]
pub enum Error {
    /// Unrecognized or invalid open option
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Failure reported by the storage engine
    #[error("storage error: {0}")]
    Storage(StorageError),

    /// No matching key (distinct from a key holding an empty value)
    #[error("key not found")]
    NotFound,

    /// A cursor or transaction was used after it was closed or finished
    #[error("{0} used after it was closed")]
    UseAfterClose(&'static str),

    /// A precondition this layer relies on does not hold
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// Lifecycle call made from the wrong transaction state
    #[error("transaction is {state}, expected {expected}")]
    Transaction {
        state: TxnState,
        expected: TxnState,
    },
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound)
    }

    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        Error::InvariantViolation(msg.into())
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Error {
        match err {
            StorageError::NotFound => Error::NotFound,
            err => Error::Storage(err),
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Error {
        Error::Storage(StorageError::Io(err))
    }
}

/// Engine error codes
#[derive(Debug, Error)]
pub enum StorageError {
    /// Key/data pair already exists
    #[error("key/data pair already exists")]
    KeyExist,
    /// No matching key/data pair found
    #[error("no matching key/data pair found")]
    NotFound,
    /// Requested page not found
    #[error("requested page not found")]
    PageNotFound,
    /// Database file is corrupted
    #[error("database file is corrupted")]
    Corrupted,
    /// Update of meta page failed
    #[error("update of meta page failed or environment had fatal error")]
    Panic,
    /// Database version mismatch
    #[error("database version mismatch")]
    VersionMismatch,
    /// File is not a valid LMDB file
    #[error("file is not a valid LMDB file")]
    Invalid,
    /// Environment mapsize limit reached
    #[error("environment mapsize limit reached")]
    MapFull,
    /// Environment maxdbs limit reached
    #[error("environment maxdbs limit reached")]
    DbsFull,
    /// Environment maxreaders limit reached
    #[error("environment maxreaders limit reached")]
    ReadersFull,
    /// Thread-local storage keys full
    #[error("thread-local storage keys full")]
    TlsFull,
    /// Transaction has too many dirty pages
    #[error("transaction has too many dirty pages")]
    TxnFull,
    /// Too many open cursors
    #[error("too many open cursors")]
    CursorFull,
    /// Page has not enough space
    #[error("page has not enough space")]
    PageFull,
    /// Database contents grew beyond environment mapsize
    #[error("database contents grew beyond environment mapsize")]
    MapResized,
    /// Operation and DB incompatible
    #[error("operation and database incompatible")]
    Incompatible,
    /// Invalid reuse of reader locktable slot
    #[error("invalid reuse of reader locktable slot")]
    BadRslot,
    /// Transaction must abort, has a child, or is invalid
    #[error("transaction must abort, has a child, or is invalid")]
    BadTxn,
    /// Unsupported size of key/DB name/data, or wrong DUPFIXED size
    #[error("unsupported size of key/database name/data, or wrong DUPFIXED size")]
    BadValSize,
    /// The specified DBI was changed unexpectedly
    #[error("the specified database handle was changed unexpectedly")]
    BadDbi,
    /// Operating system error (disk, filesystem, permissions)
    #[error("I/O error: {0}")]
    Io(#[source] io::Error),
    /// Engine code this layer does not know
    #[error("engine error {code}: {message}")]
    Other { code: c_int, message: String },
}

impl StorageError {
    /// The engine's description of a return code.
    pub fn describe(code: c_int) -> String {
        unsafe {
            let msg = ffi::mdb_strerror(code);
            if msg.is_null() {
                format!("error code {}", code)
            } else {
                CStr::from_ptr(msg).to_string_lossy().into_owned()
            }
        }
    }
}

impl From<c_int> for StorageError {
    fn from(err: c_int) -> StorageError {
        match err {
            -30799 => StorageError::KeyExist,
            -30798 => StorageError::NotFound,
            -30797 => StorageError::PageNotFound,
            -30796 => StorageError::Corrupted,
            -30795 => StorageError::Panic,
            -30794 => StorageError::VersionMismatch,
            -30793 => StorageError::Invalid,
            -30792 => StorageError::MapFull,
            -30791 => StorageError::DbsFull,
            -30790 => StorageError::ReadersFull,
            -30789 => StorageError::TlsFull,
            -30788 => StorageError::TxnFull,
            -30787 => StorageError::CursorFull,
            -30786 => StorageError::PageFull,
            -30785 => StorageError::MapResized,
            -30784 => StorageError::Incompatible,
            -30783 => StorageError::BadRslot,
            -30782 => StorageError::BadTxn,
            -30781 => StorageError::BadValSize,
            -30780 => StorageError::BadDbi,
            err if err > 0 => StorageError::Io(io::Error::from_raw_os_error(err)),
            err => StorageError::Other {
                code: err,
                message: StorageError::describe(err),
            },
        }
    }
}

/// Convert an engine return code into a `Result`.
pub(crate) fn mdb_result(rc: c_int) -> result::Result<(), StorageError> {
    if rc == 0 {
        Ok(())
    } else {
        Err(StorageError::from(rc))
    }
}

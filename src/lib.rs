//! lumokv: a transactional key/value access layer over LMDB.
//!
//! The low-level pieces mirror the engine: an [`Environment`] hands out
//! [`Transaction`]s, [`DatabaseHandle`]s name key spaces, and [`Cursor`]s
//! walk them. [`Database`] wraps a handle so that each call runs in its own
//! transaction.
//!
//! ```no_run
//! use lumokv::{Database, DbFlags, EnvOptions, Environment};
//!
//! # fn main() -> lumokv::Result<()> {
//! let env = Environment::open("data", EnvOptions::new().map_size(10 << 20))?;
//! let db = Database::open(&env, None, DbFlags::empty())?;
//! db.store(b"a", b"1")?;
//! assert_eq!(db.fetch(b"a")?, b"1".to_vec());
//! # Ok(())
//! # }
//! ```

mod config;
mod constants;
mod cursor;
mod database;
mod env;
mod error;
mod facade;
mod iter;
pub mod sequence;
mod transaction;
mod types;
mod value;

pub use config::EnvOptions;
pub use constants::{
    CopyFlags, DbFlags, EnvFlags, WriteFlags, DEFAULT_FILE_MODE, REQUIRED_ENV_FLAGS,
    RUNTIME_ENV_FLAGS, SEQUENCE_KEY_LEN,
};
pub use cursor::{Cursor, CursorIter};
pub use database::DatabaseHandle;
pub use env::Environment;
pub use error::{Error, Result, StorageError};
pub use facade::Database;
pub use iter::{Iter, Values};
pub use transaction::Transaction;
pub use types::{CursorOp, EnvInfo, Record, Stat, TxnMode, TxnState};

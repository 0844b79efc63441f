use std::collections::HashMap;
use std::ffi::CString;
use std::mem::MaybeUninit;
use std::os::raw::{c_int, c_uint};
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};

use lmdb_sys as ffi;
use log::debug;
use parking_lot::Mutex;

use crate::constants::{DbFlags, WriteFlags};
use crate::cursor::Cursor;
use crate::env::Environment;
use crate::error::{mdb_result, Error, Result, StorageError};
use crate::transaction::Transaction;
use crate::types::{Stat, TxnMode};
use crate::value::{empty_val, to_val, to_vec};

// Process-wide, so a handle can never match a registry entry of another
// environment, even one opened later at the same address.
static NEXT_GENERATION: AtomicU64 = AtomicU64::new(1);

/// Live key space handles of one environment: dbi to the generation handed
/// out for it. A dbi number freed by the engine is reused for the next key
/// space opened; the new generation tells old handles apart.
#[derive(Debug, Default)]
pub(crate) struct DbiRegistry {
    live: Mutex<HashMap<ffi::MDB_dbi, u64>>,
}

impl DbiRegistry {
    /// Generation for a dbi whose open just committed. Reopening a live key
    /// space yields the generation its existing handles carry.
    pub(crate) fn register(&self, dbi: ffi::MDB_dbi) -> u64 {
        *self
            .live
            .lock()
            .entry(dbi)
            .or_insert_with(|| NEXT_GENERATION.fetch_add(1, Ordering::Relaxed))
    }

    pub(crate) fn retire(&self, dbi: ffi::MDB_dbi) {
        self.live.lock().remove(&dbi);
    }

    pub(crate) fn is_live(&self, dbi: ffi::MDB_dbi, generation: u64) -> bool {
        self.live.lock().get(&dbi) == Some(&generation)
    }
}

/// Handle to one key space of an environment.
///
/// A plain value: it can be copied freely and outlives transactions, but every
/// operation needs an active [`Transaction`] of the environment that opened it.
/// Handles come from [`Environment::open_database`] and stay valid until the
/// key space is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DatabaseHandle {
    dbi: ffi::MDB_dbi,
    env_id: usize,
    generation: u64,
}

impl DatabaseHandle {
    /// Open the key space `name` (`None` for the default one) inside `txn`.
    ///
    /// Only the caller may turn the dbi into a handle, after `txn` commits:
    /// the engine forgets dbis opened by a transaction that aborts.
    pub(crate) fn open_dbi(txn: &Transaction, name: Option<&str>, flags: DbFlags) -> Result<ffi::MDB_dbi> {
        let raw = txn.raw()?;
        txn.ensure_writable()?;
        let name = name
            .map(CString::new)
            .transpose()
            .map_err(|_| Error::invariant("database name contains a NUL byte"))?;
        let name_ptr = name.as_ref().map_or(ptr::null(), |n| n.as_ptr());

        let mut dbi: ffi::MDB_dbi = 0;
        unsafe { mdb_result(ffi::mdb_dbi_open(raw, name_ptr, flags.bits() as c_uint, &mut dbi))? };
        Ok(dbi)
    }

    pub(crate) fn new(env: &Environment, dbi: ffi::MDB_dbi, generation: u64) -> Self {
        DatabaseHandle {
            dbi,
            env_id: env.id(),
            generation,
        }
    }

    pub fn dbi(&self) -> u32 {
        self.dbi as u32
    }

    /// Flags the key space was created with, read in a short-lived read-only
    /// transaction.
    pub fn flags(&self, env: &Environment) -> Result<DbFlags> {
        env.run_in_transaction(TxnMode::ReadOnly, |txn| self.flags_in(txn))
    }

    pub fn flags_in(&self, txn: &Transaction) -> Result<DbFlags> {
        let raw = self.bind(txn)?;
        let mut flags: c_uint = 0;
        unsafe { mdb_result(ffi::mdb_dbi_flags(raw, self.dbi, &mut flags))? };
        Ok(DbFlags::from_bits_truncate(flags as u32))
    }

    /// Value stored under `key`; the first duplicate in dupsort key spaces.
    pub fn get(&self, txn: &Transaction, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let raw = self.bind(txn)?;
        let mut key_val = to_val(key);
        let mut data_val = empty_val();

        let rc = unsafe { ffi::mdb_get(raw, self.dbi, &mut key_val, &mut data_val) };
        match mdb_result(rc) {
            Ok(()) => Ok(Some(unsafe { to_vec(&data_val) })),
            Err(StorageError::NotFound) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn put(&self, txn: &Transaction, key: &[u8], value: &[u8], flags: WriteFlags) -> Result<()> {
        let raw = self.bind(txn)?;
        txn.ensure_writable()?;
        let mut key_val = to_val(key);
        let mut data_val = to_val(value);

        unsafe {
            mdb_result(ffi::mdb_put(
                raw,
                self.dbi,
                &mut key_val,
                &mut data_val,
                flags.bits() as c_uint,
            ))?
        };
        Ok(())
    }

    /// Delete `key`. With `value`, only that duplicate goes; without, every
    /// value of the key. Returns `false` when nothing matched.
    pub fn del(&self, txn: &Transaction, key: &[u8], value: Option<&[u8]>) -> Result<bool> {
        let raw = self.bind(txn)?;
        txn.ensure_writable()?;
        let mut key_val = to_val(key);
        let mut data_val = value.map(to_val);
        let data_ptr = data_val
            .as_mut()
            .map_or(ptr::null_mut(), |val| val as *mut ffi::MDB_val);

        let rc = unsafe { ffi::mdb_del(raw, self.dbi, &mut key_val, data_ptr) };
        match mdb_result(rc) {
            Ok(()) => Ok(true),
            Err(StorageError::NotFound) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    pub fn stat(&self, txn: &Transaction) -> Result<Stat> {
        let raw = self.bind(txn)?;
        let mut stat = MaybeUninit::uninit();
        unsafe {
            mdb_result(ffi::mdb_stat(raw, self.dbi, stat.as_mut_ptr()))?;
            Ok(Stat::from(stat.assume_init()))
        }
    }

    pub fn cursor<'env>(&self, txn: &Transaction<'env>) -> Result<Cursor<'env>> {
        Cursor::open(txn, *self)
    }

    /// Remove every record, keeping the key space.
    pub fn clear(&self, txn: &Transaction) -> Result<()> {
        self.drop_with(txn, false)
    }

    /// Delete the key space itself, in its own write transaction.
    ///
    /// Every copy of this handle is closed afterwards and fails with
    /// [`Error::UseAfterClose`], even once the engine hands the dbi number
    /// to another key space.
    pub fn drop_database(self, env: &Environment) -> Result<()> {
        env.run_in_transaction(TxnMode::ReadWrite, |txn| {
            self.drop_with(txn, true)?;
            // Retired before the commit, while the writer lock keeps other
            // threads from opening a key space under the freed dbi.
            env.dbis().retire(self.dbi);
            Ok::<_, Error>(())
        })?;
        debug!("dropped database with dbi {}", self.dbi);
        Ok(())
    }

    fn drop_with(&self, txn: &Transaction, delete: bool) -> Result<()> {
        let raw = self.bind(txn)?;
        txn.ensure_writable()?;
        unsafe { mdb_result(ffi::mdb_drop(raw, self.dbi, delete as c_int))? };
        Ok(())
    }

    /// Engine transaction handle, after checking `txn` belongs to our
    /// environment and is active, and that this handle was not dropped.
    pub(crate) fn bind(&self, txn: &Transaction) -> Result<*mut ffi::MDB_txn> {
        let env = txn.env();
        if env.id() != self.env_id {
            return Err(Error::invariant(
                "database handle used with a transaction of another environment",
            ));
        }
        if !env.dbis().is_live(self.dbi, self.generation) {
            return Err(Error::UseAfterClose("database handle"));
        }
        txn.raw()
    }

    pub(crate) fn env_id(&self) -> usize {
        self.env_id
    }

    pub(crate) fn raw_dbi(&self) -> ffi::MDB_dbi {
        self.dbi
    }
}

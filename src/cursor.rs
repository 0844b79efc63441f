use std::marker::PhantomData;
use std::os::raw::c_uint;
use std::ptr;
use std::rc::Rc;

use lmdb_sys as ffi;

use crate::constants::WriteFlags;
use crate::database::DatabaseHandle;
use crate::env::Environment;
use crate::error::{mdb_result, Error, Result, StorageError};
use crate::iter::Walk;
use crate::transaction::{Transaction, TxnStatus};
use crate::types::{CursorOp, Record, TxnMode, TxnState};
use crate::value::{empty_val, to_val, to_vec};

/// Which transaction (and which snapshot of it) a cursor belongs to.
#[derive(Debug)]
struct Binding {
    status: Rc<TxnStatus>,
    generation: u64,
    mode: TxnMode,
}

impl Binding {
    fn of(txn: &Transaction) -> Self {
        let status = txn.status();
        Binding {
            generation: status.generation(),
            status,
            mode: txn.mode(),
        }
    }

    fn is_live(&self) -> bool {
        self.status.state() == TxnState::Active && self.status.generation() == self.generation
    }
}

/// A positioned reader (and, in write transactions, writer) over one key
/// space.
///
/// Every positioning verb returns `Ok(None)` when no record matches. Records
/// are copied out of the map, so they stay valid after the transaction ends.
#[derive(Debug)]
pub struct Cursor<'env> {
    cursor: *mut ffi::MDB_cursor,
    db: DatabaseHandle,
    binding: Binding,
    _env: PhantomData<&'env Environment>,
}

impl<'env> Cursor<'env> {
    pub(crate) fn open(txn: &Transaction<'env>, db: DatabaseHandle) -> Result<Self> {
        let raw = db.bind(txn)?;
        let mut cursor = ptr::null_mut();
        unsafe { mdb_result(ffi::mdb_cursor_open(raw, db.raw_dbi(), &mut cursor))? };

        Ok(Cursor {
            cursor,
            db,
            binding: Binding::of(txn),
            _env: PhantomData,
        })
    }

    pub fn database(&self) -> DatabaseHandle {
        self.db
    }

    /// Run one positioning verb. `key` and `value` are only read by verbs
    /// that take them.
    pub fn position(
        &mut self,
        op: CursorOp,
        key: Option<&[u8]>,
        value: Option<&[u8]>,
    ) -> Result<Option<Record>> {
        let cursor = self.live()?;
        if op.takes_key() && key.is_none() {
            return Err(Error::invariant(format!("{:?} needs a key", op)));
        }
        if op.takes_value() && value.is_none() {
            return Err(Error::invariant(format!("{:?} needs a value", op)));
        }

        let mut key_val = key.map_or_else(empty_val, to_val);
        let mut data_val = value.map_or_else(empty_val, to_val);

        let rc = unsafe { ffi::mdb_cursor_get(cursor, &mut key_val, &mut data_val, op.code()) };
        match mdb_result(rc) {
            Ok(()) => Ok(Some(unsafe { Record::new(to_vec(&key_val), to_vec(&data_val)) })),
            Err(StorageError::NotFound) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn first(&mut self) -> Result<Option<Record>> {
        self.position(CursorOp::First, None, None)
    }

    pub fn last(&mut self) -> Result<Option<Record>> {
        self.position(CursorOp::Last, None, None)
    }

    pub fn next(&mut self) -> Result<Option<Record>> {
        self.position(CursorOp::Next, None, None)
    }

    pub fn prev(&mut self) -> Result<Option<Record>> {
        self.position(CursorOp::Prev, None, None)
    }

    pub fn first_dup(&mut self) -> Result<Option<Record>> {
        self.position(CursorOp::FirstDup, None, None)
    }

    pub fn last_dup(&mut self) -> Result<Option<Record>> {
        self.position(CursorOp::LastDup, None, None)
    }

    /// Next value of the current key only.
    pub fn next_dup(&mut self) -> Result<Option<Record>> {
        self.position(CursorOp::NextDup, None, None)
    }

    pub fn prev_dup(&mut self) -> Result<Option<Record>> {
        self.position(CursorOp::PrevDup, None, None)
    }

    /// First value of the next key, skipping the rest of the current key.
    pub fn next_nodup(&mut self) -> Result<Option<Record>> {
        self.position(CursorOp::NextNoDup, None, None)
    }

    pub fn prev_nodup(&mut self) -> Result<Option<Record>> {
        self.position(CursorOp::PrevNoDup, None, None)
    }

    pub fn get_current(&mut self) -> Result<Option<Record>> {
        self.position(CursorOp::GetCurrent, None, None)
    }

    /// Position exactly at `key`.
    pub fn set(&mut self, key: &[u8]) -> Result<Option<Record>> {
        self.position(CursorOp::Set, Some(key), None)
    }

    /// Position at the first key greater than or equal to `key`.
    pub fn set_range(&mut self, key: &[u8]) -> Result<Option<Record>> {
        self.position(CursorOp::SetRange, Some(key), None)
    }

    pub fn set_key(&mut self, key: &[u8]) -> Result<Option<Record>> {
        self.position(CursorOp::SetKey, Some(key), None)
    }

    /// Position exactly at the `key`/`value` pair (dupsort).
    pub fn get_both(&mut self, key: &[u8], value: &[u8]) -> Result<Option<Record>> {
        self.position(CursorOp::GetBoth, Some(key), Some(value))
    }

    /// Position at `key` and its first value greater than or equal to `value`.
    pub fn get_both_range(&mut self, key: &[u8], value: &[u8]) -> Result<Option<Record>> {
        self.position(CursorOp::GetBothRange, Some(key), Some(value))
    }

    /// Up to a page of packed duplicates at the current key (DUPFIXED).
    pub fn get_multiple(&mut self) -> Result<Option<Record>> {
        let current = match self.get_current()? {
            Some(current) => current,
            None => return Ok(None),
        };
        // The engine leaves the key untouched for this verb.
        Ok(self
            .position(CursorOp::GetMultiple, None, None)?
            .map(|record| Record::new(current.key, record.value)))
    }

    /// The next page of packed duplicates (DUPFIXED).
    pub fn next_multiple(&mut self) -> Result<Option<Record>> {
        self.position(CursorOp::NextMultiple, None, None)
    }

    pub fn put(&mut self, key: &[u8], value: &[u8], flags: WriteFlags) -> Result<()> {
        let cursor = self.writable()?;
        let mut key_val = to_val(key);
        let mut data_val = to_val(value);
        unsafe {
            mdb_result(ffi::mdb_cursor_put(
                cursor,
                &mut key_val,
                &mut data_val,
                flags.bits() as c_uint,
            ))?
        };
        Ok(())
    }

    /// Delete the record at the current position, or with `all_duplicates`
    /// every value of the current key.
    pub fn del(&mut self, all_duplicates: bool) -> Result<()> {
        let cursor = self.writable()?;
        let flags = if all_duplicates {
            WriteFlags::NODUPDATA
        } else {
            WriteFlags::empty()
        };
        unsafe { mdb_result(ffi::mdb_cursor_del(cursor, flags.bits() as c_uint))? };
        Ok(())
    }

    /// Number of values stored under the current key.
    pub fn count(&self) -> Result<usize> {
        let cursor = self.live()?;
        let mut count = 0;
        unsafe { mdb_result(ffi::mdb_cursor_count(cursor, &mut count))? };
        Ok(count as usize)
    }

    /// Rebind this read-only cursor to `txn` without reallocating it. The
    /// cursor restarts before the first record.
    pub fn renew(&mut self, txn: &Transaction<'env>) -> Result<()> {
        if self.cursor.is_null() {
            return Err(Error::UseAfterClose("cursor"));
        }
        if self.binding.mode == TxnMode::ReadWrite {
            return Err(Error::invariant(
                "cursors of read-write transactions cannot be renewed",
            ));
        }
        if !txn.mode().is_read_only() {
            return Err(Error::invariant("cursors can only be renewed in read-only transactions"));
        }
        let raw = self.db.bind(txn)?;
        unsafe { mdb_result(ffi::mdb_cursor_renew(raw, self.cursor))? };
        self.binding = Binding::of(txn);
        Ok(())
    }

    /// Release the cursor. Later calls fail with `UseAfterClose`; closing
    /// twice is harmless.
    pub fn close(&mut self) {
        if self.cursor.is_null() {
            return;
        }
        // The engine frees write cursors itself when their transaction ends.
        let freed_by_engine = self.binding.mode == TxnMode::ReadWrite && !self.binding.is_live();
        if !freed_by_engine {
            unsafe { ffi::mdb_cursor_close(self.cursor) };
        }
        self.cursor = ptr::null_mut();
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.is_null()
    }

    /// Walk every record from the first one.
    pub fn iter(&mut self) -> CursorIter<'_, 'env> {
        CursorIter::new(self, Walk::forward())
    }

    /// Walk records from the first key greater than or equal to `key`.
    pub fn iter_from(&mut self, key: &[u8]) -> CursorIter<'_, 'env> {
        CursorIter::new(self, Walk::from_key(key))
    }

    /// Walk the values stored under `key`.
    pub fn iter_dup_of(&mut self, key: &[u8]) -> CursorIter<'_, 'env> {
        CursorIter::new(self, Walk::duplicates_of(key))
    }

    fn live(&self) -> Result<*mut ffi::MDB_cursor> {
        if self.cursor.is_null() {
            return Err(Error::UseAfterClose("cursor"));
        }
        if !self.binding.is_live() {
            return Err(Error::UseAfterClose("cursor transaction"));
        }
        Ok(self.cursor)
    }

    fn writable(&self) -> Result<*mut ffi::MDB_cursor> {
        let cursor = self.live()?;
        if self.binding.mode.is_read_only() {
            return Err(Error::invariant("write attempted through a read-only cursor"));
        }
        Ok(cursor)
    }
}

impl Drop for Cursor<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Lazy walk over a borrowed cursor. Stops after the first error.
pub struct CursorIter<'c, 'env> {
    cursor: &'c mut Cursor<'env>,
    walk: Walk,
}

impl<'c, 'env> CursorIter<'c, 'env> {
    fn new(cursor: &'c mut Cursor<'env>, walk: Walk) -> Self {
        CursorIter { cursor, walk }
    }
}

impl Iterator for CursorIter<'_, '_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.walk.step(self.cursor)
    }
}

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::ops::Range;
use std::result;

use log::warn;

use crate::constants::{DbFlags, WriteFlags};
use crate::cursor::Cursor;
use crate::database::DatabaseHandle;
use crate::env::Environment;
use crate::error::{Error, Result};
use crate::iter::{Iter, Values, Walk};
use crate::sequence;
use crate::transaction::Transaction;
use crate::types::{Record, Stat, TxnMode};

/// Read-only transaction and cursor kept between reads.
struct CachedReader<'env> {
    // Declared before `txn` so the cursor is released first.
    cursor: Cursor<'env>,
    txn: Transaction<'env>,
}

/// Holds the cached reader for the duration of one read and parks it again,
/// reset, on every exit path.
struct ReaderLease<'a, 'env> {
    slot: &'a RefCell<Option<CachedReader<'env>>>,
    reader: Option<CachedReader<'env>>,
}

impl<'a, 'env> ReaderLease<'a, 'env> {
    fn acquire(db: &'a Database<'env>) -> Result<Self> {
        let parked = db.reader.borrow_mut().take();
        let reader = match parked {
            Some(mut reader) => {
                reader.txn.renew()?;
                reader.cursor.renew(&reader.txn)?;
                reader
            }
            None => {
                let txn = db.env.begin_transaction(TxnMode::ReadOnly)?;
                let cursor = db.handle.cursor(&txn)?;
                CachedReader { cursor, txn }
            }
        };
        Ok(ReaderLease {
            slot: &db.reader,
            reader: Some(reader),
        })
    }

    fn read<T>(
        &mut self,
        f: impl FnOnce(&Transaction<'env>, &mut Cursor<'env>) -> Result<T>,
    ) -> Result<T> {
        match self.reader.as_mut() {
            Some(CachedReader { cursor, txn }) => f(txn, cursor),
            None => Err(Error::UseAfterClose("cached reader")),
        }
    }
}

impl Drop for ReaderLease<'_, '_> {
    fn drop(&mut self) {
        let mut reader = match self.reader.take() {
            Some(reader) => reader,
            None => return,
        };
        if let Err(err) = reader.txn.reset() {
            warn!("discarding cached reader, reset failed: {}", err);
            return;
        }
        if let Ok(mut slot) = self.slot.try_borrow_mut() {
            if slot.is_none() {
                *slot = Some(reader);
            }
        }
    }
}

/// Convenience layer over one key space.
///
/// Every call runs in its own transaction: reads in a read-only one (fresh,
/// or the cached reader when enabled), writes in a read-write one that
/// commits on success and aborts on failure.
pub struct Database<'env> {
    env: &'env Environment,
    handle: DatabaseHandle,
    cache_reads: bool,
    reader: RefCell<Option<CachedReader<'env>>>,
}

impl<'env> Database<'env> {
    /// Open (creating if missing) the key space `name`.
    pub fn open(env: &'env Environment, name: Option<&str>, flags: DbFlags) -> Result<Self> {
        let handle = env.open_database(name, flags | DbFlags::CREATE)?;
        Ok(Database::wrap(env, handle))
    }

    pub fn from_handle(env: &'env Environment, handle: DatabaseHandle) -> Result<Self> {
        if handle.env_id() != env.id() {
            return Err(Error::invariant("database handle belongs to another environment"));
        }
        Ok(Database::wrap(env, handle))
    }

    fn wrap(env: &'env Environment, handle: DatabaseHandle) -> Self {
        Database {
            env,
            handle,
            cache_reads: false,
            reader: RefCell::new(None),
        }
    }

    /// Keep one read-only transaction and cursor between reads, renewing them
    /// for each call instead of allocating new ones.
    ///
    /// The parked transaction keeps its reader slot, so it counts against
    /// `max_readers` until it is taken by an iterator or this `Database` is
    /// dropped. Reads and iterators of this `Database` reuse that slot.
    pub fn with_read_cache(mut self, enabled: bool) -> Self {
        self.cache_reads = enabled;
        if !enabled {
            self.reader.get_mut().take();
        }
        self
    }

    pub fn handle(&self) -> DatabaseHandle {
        self.handle
    }

    pub fn env(&self) -> &'env Environment {
        self.env
    }

    pub fn flags(&self) -> Result<DbFlags> {
        self.read_txn(|txn| self.handle.flags_in(txn))
    }

    /// Value under `key`, or `None` when absent.
    pub fn lookup(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.read_txn(|txn| self.handle.get(txn, key))
    }

    /// Value under `key`; [`Error::NotFound`] when absent.
    pub fn fetch(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.lookup(key)?.ok_or(Error::NotFound)
    }

    pub fn fetch_or(&self, key: &[u8], default: impl Into<Vec<u8>>) -> Result<Vec<u8>> {
        Ok(self.lookup(key)?.unwrap_or_else(|| default.into()))
    }

    pub fn fetch_or_else<F>(&self, key: &[u8], default: F) -> Result<Vec<u8>>
    where
        F: FnOnce(&[u8]) -> Vec<u8>,
    {
        Ok(self.lookup(key)?.unwrap_or_else(|| default(key)))
    }

    /// Store `value` under `key`, replacing it (or adding a duplicate in
    /// dupsort key spaces).
    pub fn store(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.write(|txn| self.handle.put(txn, key, value, WriteFlags::empty()))
    }

    /// Delete every value under `key`. `false` when the key was absent.
    pub fn delete(&self, key: &[u8]) -> Result<bool> {
        self.write(|txn| self.handle.del(txn, key, None))
    }

    /// Delete one `key`/`value` pair. `false` when it was absent.
    pub fn delete_value(&self, key: &[u8], value: &[u8]) -> Result<bool> {
        self.write(|txn| self.handle.del(txn, key, Some(value)))
    }

    /// Every record in key order, over a snapshot taken now.
    pub fn iter(&self) -> Result<Iter<'env>> {
        self.walk(Walk::forward())
    }

    /// Records from the first key greater than or equal to `key`.
    pub fn iter_from(&self, key: &[u8]) -> Result<Iter<'env>> {
        self.walk(Walk::from_key(key))
    }

    /// Every value stored under `key`.
    pub fn iter_duplicates(&self, key: &[u8]) -> Result<Values<'env>> {
        self.walk(Walk::duplicates_of(key)).map(Values::from_iter)
    }

    pub fn first(&self) -> Result<Option<Record>> {
        self.read(|_, cursor| cursor.first())
    }

    pub fn last(&self) -> Result<Option<Record>> {
        self.read(|_, cursor| cursor.last())
    }

    /// Store `value` under the next sequence key and return that key.
    pub fn append(&self, value: &[u8]) -> Result<u64> {
        self.write(|txn| self.append_in(txn, value))
    }

    /// Append every value in one transaction: all of them land, or none.
    pub fn append_many<I>(&self, values: I) -> Result<Range<u64>>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        self.write(|txn| {
            let start = self.next_sequence_key(txn)?;
            let mut next = start;
            let mut cursor = self.handle.cursor(txn)?;
            for value in values {
                cursor.put(&sequence::encode(next), value.as_ref(), WriteFlags::APPEND)?;
                next = next
                    .checked_add(1)
                    .ok_or_else(|| Error::invariant("sequence key space exhausted"))?;
            }
            Ok(start..next)
        })
    }

    /// The append step inside a caller's read-write transaction.
    pub fn append_in(&self, txn: &Transaction<'env>, value: &[u8]) -> Result<u64> {
        let key = self.next_sequence_key(txn)?;
        self.handle
            .put(txn, &sequence::encode(key), value, WriteFlags::APPEND)?;
        Ok(key)
    }

    fn next_sequence_key(&self, txn: &Transaction<'env>) -> Result<u64> {
        txn.ensure_writable()?;
        let mut cursor = self.handle.cursor(txn)?;
        let last = cursor.last()?;
        sequence::next_key(last.as_ref().map(|record| record.key.as_slice()))
    }

    pub fn stat(&self) -> Result<Stat> {
        self.read_txn(|txn| self.handle.stat(txn))
    }

    /// Number of records, duplicates included.
    pub fn len(&self) -> Result<usize> {
        Ok(self.stat()?.entries)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn to_pairs(&self) -> Result<Vec<Record>> {
        self.read(|_, cursor| cursor.iter().collect())
    }

    /// Records grouped by key, values in duplicate order.
    pub fn to_grouped_map(&self) -> Result<BTreeMap<Vec<u8>, Vec<Vec<u8>>>> {
        self.read(|_, cursor| {
            let mut map: BTreeMap<Vec<u8>, Vec<Vec<u8>>> = BTreeMap::new();
            for record in cursor.iter() {
                let Record { key, value } = record?;
                map.entry(key).or_default().push(value);
            }
            Ok(map)
        })
    }

    /// One value per key (the first duplicate).
    pub fn to_map(&self) -> Result<BTreeMap<Vec<u8>, Vec<u8>>> {
        self.read(|_, cursor| {
            let mut map = BTreeMap::new();
            for record in cursor.iter() {
                let Record { key, value } = record?;
                map.entry(key).or_insert(value);
            }
            Ok(map)
        })
    }

    /// Remove every record, keeping the key space.
    pub fn clear(&self) -> Result<()> {
        self.write(|txn| self.handle.clear(txn))
    }

    /// Run `f` with a transaction and this key space's handle; commit when it
    /// returns `Ok`, abort otherwise.
    pub fn transaction<T, E, F>(&self, mode: TxnMode, f: F) -> result::Result<T, E>
    where
        F: FnOnce(&mut Transaction<'env>, DatabaseHandle) -> result::Result<T, E>,
        E: From<Error>,
    {
        let handle = self.handle;
        self.env.run_in_transaction(mode, |txn| f(txn, handle))
    }

    fn read<T>(&self, f: impl FnOnce(&Transaction<'env>, &mut Cursor<'env>) -> Result<T>) -> Result<T> {
        if self.cache_reads {
            let mut lease = ReaderLease::acquire(self)?;
            return lease.read(f);
        }
        self.env.run_in_transaction(TxnMode::ReadOnly, |txn| {
            let mut cursor = self.handle.cursor(txn)?;
            f(txn, &mut cursor)
        })
    }

    /// Like [`read`](Database::read) for calls that need no cursor: the
    /// uncached path opens only a transaction.
    fn read_txn<T>(&self, f: impl FnOnce(&Transaction<'env>) -> Result<T>) -> Result<T> {
        if self.cache_reads {
            let mut lease = ReaderLease::acquire(self)?;
            return lease.read(|txn, _| f(txn));
        }
        self.env.run_in_transaction(TxnMode::ReadOnly, |txn| f(txn))
    }

    /// Lazy walk. With the read cache on, the parked reader moves into the
    /// iterator, which finishes its transaction when the walk ends.
    fn walk(&self, walk: Walk) -> Result<Iter<'env>> {
        if self.cache_reads {
            let parked = self.reader.borrow_mut().take();
            if let Some(CachedReader { mut cursor, mut txn }) = parked {
                txn.renew()?;
                cursor.renew(&txn)?;
                return Ok(Iter::from_reader(txn, cursor, walk));
            }
        }
        Iter::new(self.env, self.handle, walk)
    }

    fn write<T>(&self, f: impl FnOnce(&Transaction<'env>) -> Result<T>) -> Result<T> {
        self.env.run_in_transaction(TxnMode::ReadWrite, |txn| f(txn))
    }
}

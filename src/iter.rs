use log::debug;

use crate::cursor::Cursor;
use crate::database::DatabaseHandle;
use crate::env::Environment;
use crate::error::Result;
use crate::transaction::Transaction;
use crate::types::{CursorOp, Record, TxnMode};

/// A cursor walk: one positioning verb to start, another to advance.
#[derive(Debug, Clone)]
pub(crate) struct Walk {
    start: Option<(CursorOp, Option<Vec<u8>>)>,
    advance: CursorOp,
    done: bool,
}

impl Walk {
    pub(crate) fn forward() -> Self {
        Walk {
            start: Some((CursorOp::First, None)),
            advance: CursorOp::Next,
            done: false,
        }
    }

    pub(crate) fn from_key(key: &[u8]) -> Self {
        Walk {
            start: Some((CursorOp::SetRange, Some(key.to_vec()))),
            advance: CursorOp::Next,
            done: false,
        }
    }

    pub(crate) fn duplicates_of(key: &[u8]) -> Self {
        Walk {
            start: Some((CursorOp::SetKey, Some(key.to_vec()))),
            advance: CursorOp::NextDup,
            done: false,
        }
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done
    }

    /// Move `cursor` one record further. `None` once exhausted or after an
    /// error has been yielded.
    pub(crate) fn step(&mut self, cursor: &mut Cursor) -> Option<Result<Record>> {
        if self.done {
            return None;
        }
        let result = match self.start.take() {
            Some((op, key)) => cursor.position(op, key.as_deref(), None),
            None => cursor.position(self.advance, None, None),
        };
        match result {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

/// Iterator over a key space that owns its read-only transaction.
///
/// The transaction is finished as soon as the walk ends (exhaustion or
/// error), which frees the reader slot before the iterator is dropped.
pub struct Iter<'env> {
    // Declared before `txn` so the cursor is released first.
    cursor: Cursor<'env>,
    txn: Transaction<'env>,
    walk: Walk,
}

impl<'env> Iter<'env> {
    pub(crate) fn new(env: &'env Environment, db: DatabaseHandle, walk: Walk) -> Result<Self> {
        let txn = env.begin_transaction(TxnMode::ReadOnly)?;
        let cursor = db.cursor(&txn)?;
        Ok(Iter { cursor, txn, walk })
    }

    /// Walk over an already active read-only transaction and a cursor bound
    /// to it; both are finished with the walk.
    pub(crate) fn from_reader(txn: Transaction<'env>, cursor: Cursor<'env>, walk: Walk) -> Self {
        Iter { cursor, txn, walk }
    }

    fn finish(&mut self) -> Result<()> {
        self.cursor.close();
        if self.txn.is_active() {
            self.txn.commit()?;
        }
        Ok(())
    }
}

impl Iterator for Iter<'_> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.walk.is_done() {
            return None;
        }
        match self.walk.step(&mut self.cursor) {
            Some(Ok(record)) => Some(Ok(record)),
            Some(Err(err)) => {
                self.cursor.close();
                self.txn.abort();
                Some(Err(err))
            }
            None => match self.finish() {
                Ok(()) => None,
                Err(err) => {
                    debug!("finishing iteration failed: {}", err);
                    Some(Err(err))
                }
            },
        }
    }
}

/// Values stored under one key, in duplicate sort order.
pub struct Values<'env> {
    inner: Iter<'env>,
}

impl<'env> Values<'env> {
    pub(crate) fn from_iter(inner: Iter<'env>) -> Self {
        Values { inner }
    }
}

impl Iterator for Values<'_> {
    type Item = Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|record| record.map(|r| r.value))
    }
}

use std::cell::Cell;
use std::os::raw::c_uint;
use std::ptr;
use std::rc::Rc;

use lmdb_sys as ffi;
use log::{debug, trace};

use crate::constants::EnvFlags;
use crate::env::Environment;
use crate::error::{mdb_result, Error, Result};
use crate::types::{TxnMode, TxnState};

/// State shared between a transaction and the cursors opened in it.
///
/// `generation` moves forward on every renew, so a cursor bound before a
/// reset can tell it no longer belongs to the current snapshot.
#[derive(Debug)]
pub(crate) struct TxnStatus {
    state: Cell<TxnState>,
    generation: Cell<u64>,
}

impl TxnStatus {
    pub(crate) fn state(&self) -> TxnState {
        self.state.get()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.get()
    }
}

/// A unit of atomic work against an [`Environment`].
///
/// Read-write transactions serialize on the engine's writer lock. Beginning a
/// second read-write transaction on a thread that already holds one blocks
/// forever.
///
/// Dropping a transaction that is still active (or reset) aborts it.
#[derive(Debug)]
pub struct Transaction<'env> {
    env: &'env Environment,
    txn: *mut ffi::MDB_txn,
    mode: TxnMode,
    status: Rc<TxnStatus>,
}

impl<'env> Transaction<'env> {
    pub(crate) fn begin(
        env: &'env Environment,
        parent: *mut ffi::MDB_txn,
        mode: TxnMode,
    ) -> Result<Self> {
        let flags = match mode {
            TxnMode::ReadOnly => EnvFlags::RDONLY.bits(),
            TxnMode::ReadWrite => 0,
        };
        let mut txn = ptr::null_mut();
        unsafe {
            mdb_result(ffi::mdb_txn_begin(
                env.raw(),
                parent,
                flags as c_uint,
                &mut txn,
            ))?
        };
        trace!("began {:?} transaction (nested: {})", mode, !parent.is_null());

        Ok(Transaction {
            env,
            txn,
            mode,
            status: Rc::new(TxnStatus {
                state: Cell::new(TxnState::Active),
                generation: Cell::new(0),
            }),
        })
    }

    /// Begin a child transaction of this read-write transaction.
    ///
    /// The child borrows its parent mutably: the parent is unusable until the
    /// child is committed, aborted or dropped. Child writes reach the parent
    /// on child commit and everyone else on parent commit.
    pub fn begin_nested(&mut self) -> Result<Transaction<'_>> {
        if self.mode.is_read_only() {
            return Err(Error::invariant(
                "nested transactions need a read-write parent",
            ));
        }
        let parent = self.raw()?;
        Transaction::begin(self.env, parent, TxnMode::ReadWrite)
    }

    /// Apply this transaction's writes.
    ///
    /// Fails with [`Error::Transaction`] unless the transaction is active. If
    /// the engine rejects the commit the transaction ends up aborted.
    pub fn commit(&mut self) -> Result<()> {
        self.expect_state(TxnState::Active)?;

        let rc = unsafe { ffi::mdb_txn_commit(self.txn) };
        // The engine frees the handle whether or not the commit went through.
        self.txn = ptr::null_mut();
        match mdb_result(rc) {
            Ok(()) => {
                self.set_state(TxnState::Committed);
                trace!("committed {:?} transaction", self.mode);
                Ok(())
            }
            Err(err) => {
                self.set_state(TxnState::Aborted);
                debug!("commit of {:?} transaction failed: {}", self.mode, err);
                Err(err.into())
            }
        }
    }

    /// Discard this transaction's writes. Calling it again, or after a
    /// commit, does nothing.
    pub fn abort(&mut self) {
        match self.state() {
            TxnState::Active | TxnState::Reset => {
                unsafe { ffi::mdb_txn_abort(self.txn) };
                self.txn = ptr::null_mut();
                self.set_state(TxnState::Aborted);
                trace!("aborted {:?} transaction", self.mode);
            }
            TxnState::Committed | TxnState::Aborted => {}
        }
    }

    /// Release the snapshot of a read-only transaction, keeping the handle
    /// and its reader slot for a later [`renew`](Transaction::renew).
    pub fn reset(&mut self) -> Result<()> {
        self.expect_read_only("reset")?;
        self.expect_state(TxnState::Active)?;

        unsafe { ffi::mdb_txn_reset(self.txn) };
        self.set_state(TxnState::Reset);
        trace!("reset read-only transaction");
        Ok(())
    }

    /// Take a snapshot of the latest commit, in the reader slot kept since
    /// the reset.
    ///
    /// Cursors bound before the reset stay stale until they are renewed too.
    pub fn renew(&mut self) -> Result<()> {
        self.expect_read_only("renew")?;
        self.expect_state(TxnState::Reset)?;

        unsafe { mdb_result(ffi::mdb_txn_renew(self.txn))? };
        self.status.generation.set(self.status.generation() + 1);
        self.set_state(TxnState::Active);
        trace!("renewed read-only transaction");
        Ok(())
    }

    pub fn mode(&self) -> TxnMode {
        self.mode
    }

    pub fn state(&self) -> TxnState {
        self.status.state()
    }

    pub fn is_active(&self) -> bool {
        self.state() == TxnState::Active
    }

    pub fn env(&self) -> &'env Environment {
        self.env
    }

    /// Engine handle, only while active.
    pub(crate) fn raw(&self) -> Result<*mut ffi::MDB_txn> {
        match self.state() {
            TxnState::Active => Ok(self.txn),
            TxnState::Reset => Err(Error::Transaction {
                state: TxnState::Reset,
                expected: TxnState::Active,
            }),
            TxnState::Committed | TxnState::Aborted => Err(Error::UseAfterClose("transaction")),
        }
    }

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        if self.mode.is_read_only() {
            return Err(Error::invariant("write attempted in a read-only transaction"));
        }
        Ok(())
    }

    pub(crate) fn status(&self) -> Rc<TxnStatus> {
        Rc::clone(&self.status)
    }

    fn set_state(&self, state: TxnState) {
        self.status.state.set(state);
    }

    fn expect_state(&self, expected: TxnState) -> Result<()> {
        let state = self.state();
        if state != expected {
            return Err(Error::Transaction { state, expected });
        }
        Ok(())
    }

    fn expect_read_only(&self, operation: &str) -> Result<()> {
        if !self.mode.is_read_only() {
            return Err(Error::invariant(format!(
                "{} is only valid for read-only transactions",
                operation
            )));
        }
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if matches!(self.state(), TxnState::Active | TxnState::Reset) {
            debug!("aborting unfinished {:?} transaction on drop", self.mode);
            self.abort();
        }
    }
}

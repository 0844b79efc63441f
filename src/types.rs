use std::fmt;
use std::os::raw::c_uint;

use lmdb_sys as ffi;

/// Cursor positioning verbs understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CursorOp {
    First,
    FirstDup,
    GetBoth,
    GetBothRange,
    GetCurrent,
    GetMultiple,
    Last,
    LastDup,
    Next,
    NextDup,
    NextMultiple,
    NextNoDup,
    Prev,
    PrevDup,
    PrevNoDup,
    Set,
    SetKey,
    SetRange,
}

impl CursorOp {
    pub const ALL: [CursorOp; 18] = [
        CursorOp::First,
        CursorOp::FirstDup,
        CursorOp::GetBoth,
        CursorOp::GetBothRange,
        CursorOp::GetCurrent,
        CursorOp::GetMultiple,
        CursorOp::Last,
        CursorOp::LastDup,
        CursorOp::Next,
        CursorOp::NextDup,
        CursorOp::NextMultiple,
        CursorOp::NextNoDup,
        CursorOp::Prev,
        CursorOp::PrevDup,
        CursorOp::PrevNoDup,
        CursorOp::Set,
        CursorOp::SetKey,
        CursorOp::SetRange,
    ];

    /// Engine op code for this verb.
    pub const fn code(self) -> c_uint {
        match self {
            CursorOp::First => ffi::MDB_FIRST,
            CursorOp::FirstDup => ffi::MDB_FIRST_DUP,
            CursorOp::GetBoth => ffi::MDB_GET_BOTH,
            CursorOp::GetBothRange => ffi::MDB_GET_BOTH_RANGE,
            CursorOp::GetCurrent => ffi::MDB_GET_CURRENT,
            CursorOp::GetMultiple => ffi::MDB_GET_MULTIPLE,
            CursorOp::Last => ffi::MDB_LAST,
            CursorOp::LastDup => ffi::MDB_LAST_DUP,
            CursorOp::Next => ffi::MDB_NEXT,
            CursorOp::NextDup => ffi::MDB_NEXT_DUP,
            CursorOp::NextMultiple => ffi::MDB_NEXT_MULTIPLE,
            CursorOp::NextNoDup => ffi::MDB_NEXT_NODUP,
            CursorOp::Prev => ffi::MDB_PREV,
            CursorOp::PrevDup => ffi::MDB_PREV_DUP,
            CursorOp::PrevNoDup => ffi::MDB_PREV_NODUP,
            CursorOp::Set => ffi::MDB_SET,
            CursorOp::SetKey => ffi::MDB_SET_KEY,
            CursorOp::SetRange => ffi::MDB_SET_RANGE,
        }
    }

    /// Whether the verb reads a key argument.
    pub const fn takes_key(self) -> bool {
        matches!(
            self,
            CursorOp::Set
                | CursorOp::SetKey
                | CursorOp::SetRange
                | CursorOp::GetBoth
                | CursorOp::GetBothRange
        )
    }

    /// Whether the verb also reads a value argument.
    pub const fn takes_value(self) -> bool {
        matches!(self, CursorOp::GetBoth | CursorOp::GetBothRange)
    }
}

/// Structural statistics of one key space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stat {
    /// Size of a database page
    pub psize: u32,
    /// Depth (height) of the B-tree
    pub depth: u32,
    /// Number of internal (non-leaf) pages
    pub branch_pages: usize,
    /// Number of leaf pages
    pub leaf_pages: usize,
    /// Number of overflow pages
    pub overflow_pages: usize,
    /// Number of data entries
    pub entries: usize,
}

impl From<ffi::MDB_stat> for Stat {
    fn from(stat: ffi::MDB_stat) -> Self {
        Stat {
            psize: stat.ms_psize as u32,
            depth: stat.ms_depth as u32,
            branch_pages: stat.ms_branch_pages as usize,
            leaf_pages: stat.ms_leaf_pages as usize,
            overflow_pages: stat.ms_overflow_pages as usize,
            entries: stat.ms_entries as usize,
        }
    }
}

/// Environment-wide information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvInfo {
    /// Address of the map, zero unless the map is fixed
    pub map_addr: usize,
    pub map_size: usize,
    pub last_pgno: usize,
    pub last_txnid: usize,
    pub max_readers: u32,
    pub num_readers: u32,
}

impl From<ffi::MDB_envinfo> for EnvInfo {
    fn from(info: ffi::MDB_envinfo) -> Self {
        EnvInfo {
            map_addr: info.me_mapaddr as usize,
            map_size: info.me_mapsize as usize,
            last_pgno: info.me_last_pgno as usize,
            last_txnid: info.me_last_txnid as usize,
            max_readers: info.me_maxreaders as u32,
            num_readers: info.me_numreaders as u32,
        }
    }
}

/// Whether a transaction may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxnMode {
    ReadWrite,
    ReadOnly,
}

impl TxnMode {
    pub fn is_read_only(self) -> bool {
        self == TxnMode::ReadOnly
    }
}

/// Lifecycle state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TxnState {
    Active,
    Committed,
    Aborted,
    /// Read-only transaction parked without a snapshot.
    Reset,
}

impl TxnState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TxnState::Committed | TxnState::Aborted)
    }
}

impl fmt::Display for TxnState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            TxnState::Active => "active",
            TxnState::Committed => "committed",
            TxnState::Aborted => "aborted",
            TxnState::Reset => "reset",
        };
        f.write_str(name)
    }
}

/// An owned key/value pair read from a key space.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Record {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Record {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Record {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl From<Record> for (Vec<u8>, Vec<u8>) {
    fn from(record: Record) -> Self {
        (record.key, record.value)
    }
}

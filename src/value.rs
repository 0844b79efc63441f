use std::os::raw::c_void;
use std::{ptr, slice};

use lmdb_sys as ffi;

/// Borrow a byte slice as an engine value. The engine never writes through
/// the pointer of an input value.
pub(crate) fn to_val(data: &[u8]) -> ffi::MDB_val {
    ffi::MDB_val {
        mv_size: data.len(),
        mv_data: data.as_ptr() as *mut c_void,
    }
}

/// An output slot for the engine to fill.
pub(crate) fn empty_val() -> ffi::MDB_val {
    ffi::MDB_val {
        mv_size: 0,
        mv_data: ptr::null_mut(),
    }
}

/// Copy an engine value out of the map.
///
/// # Safety
///
/// `val` must have been filled by the engine inside a transaction that is
/// still active, or point into a live slice.
pub(crate) unsafe fn to_vec(val: &ffi::MDB_val) -> Vec<u8> {
    if val.mv_size == 0 || val.mv_data.is_null() {
        Vec::new()
    } else {
        slice::from_raw_parts(val.mv_data as *const u8, val.mv_size).to_vec()
    }
}

use std::ffi::{CStr, CString};
use std::fs;
use std::mem::MaybeUninit;
use std::os::raw::{c_int, c_uint};
use std::path::{Path, PathBuf};
use std::ptr;
use std::result;

use lmdb_sys as ffi;
use log::debug;
use once_cell::sync::Lazy;

use crate::config::EnvOptions;
use crate::constants::{CopyFlags, DbFlags, EnvFlags, REQUIRED_ENV_FLAGS, RUNTIME_ENV_FLAGS};
use crate::database::{DatabaseHandle, DbiRegistry};
use crate::error::{mdb_result, Error, Result};
use crate::transaction::Transaction;
use crate::types::{EnvInfo, Stat, TxnMode};

static VERSION: Lazy<String> = Lazy::new(|| unsafe {
    let version = ffi::mdb_version(ptr::null_mut(), ptr::null_mut(), ptr::null_mut());
    if version.is_null() {
        String::from("unknown")
    } else {
        CStr::from_ptr(version).to_string_lossy().into_owned()
    }
});

/// An opened storage environment.
///
/// Everything derived from it (transactions, cursors, the [`Database`]
/// facade) borrows the environment, so it cannot be closed while any of
/// them is alive.
///
/// [`Database`]: crate::Database
#[derive(Debug)]
pub struct Environment {
    env: *mut ffi::MDB_env,
    path: PathBuf,
    options: EnvOptions,
    dbis: DbiRegistry,
}

// The engine handle is safe to share; transactions stay on their thread.
unsafe impl Send for Environment {}
unsafe impl Sync for Environment {}

impl Environment {
    /// Open (creating if needed) the environment stored at `path`.
    pub fn open<P: AsRef<Path>>(path: P, options: EnvOptions) -> Result<Self> {
        options.validate()?;

        let path = path.as_ref().to_path_buf();
        let flags = options.flags | REQUIRED_ENV_FLAGS;
        if !flags.intersects(EnvFlags::NOSUBDIR | EnvFlags::RDONLY) {
            fs::create_dir_all(&path)?;
        }
        let c_path = path_to_cstring(&path)?;

        let mut raw = ptr::null_mut();
        unsafe { mdb_result(ffi::mdb_env_create(&mut raw))? };

        // From here on Drop closes the handle, whether or not the open succeeds.
        let env = Environment {
            env: raw,
            path,
            options,
            dbis: DbiRegistry::default(),
        };

        unsafe {
            if let Some(size) = env.options.map_size {
                mdb_result(ffi::mdb_env_set_mapsize(env.env, size))?;
            }
            if let Some(readers) = env.options.max_readers {
                mdb_result(ffi::mdb_env_set_maxreaders(env.env, readers as c_uint))?;
            }
            if let Some(dbs) = env.options.max_databases {
                mdb_result(ffi::mdb_env_set_maxdbs(env.env, dbs as ffi::MDB_dbi))?;
            }
            mdb_result(ffi::mdb_env_open(
                env.env,
                c_path.as_ptr(),
                flags.bits() as c_uint,
                env.options.mode as ffi::mode_t,
            ))?;
        }

        debug!("opened environment at {}", env.path.display());
        Ok(env)
    }

    /// Close the environment, releasing the storage handle.
    pub fn close(self) {
        drop(self)
    }

    /// Begin a top-level transaction.
    pub fn begin_transaction(&self, mode: TxnMode) -> Result<Transaction<'_>> {
        Transaction::begin(self, ptr::null_mut(), mode)
    }

    /// Run `operation` inside a fresh transaction.
    ///
    /// The transaction commits when `operation` returns `Ok`; on `Err` it is
    /// aborted and the error is handed back unchanged. A panic unwinding out
    /// of `operation` aborts it as well, through the transaction's `Drop`.
    pub fn run_in_transaction<'env, T, E, F>(&'env self, mode: TxnMode, operation: F) -> result::Result<T, E>
    where
        F: FnOnce(&mut Transaction<'env>) -> result::Result<T, E>,
        E: From<Error>,
    {
        let mut txn = self.begin_transaction(mode)?;
        match operation(&mut txn) {
            Ok(value) => {
                txn.commit()?;
                Ok(value)
            }
            Err(err) => {
                txn.abort();
                Err(err)
            }
        }
    }

    /// Open the key space `name` (`None` for the default one).
    ///
    /// Runs in its own write transaction, so it blocks while another write
    /// transaction is open and must not be called from a thread that holds one.
    pub fn open_database(&self, name: Option<&str>, flags: DbFlags) -> Result<DatabaseHandle> {
        let dbi = self.run_in_transaction(TxnMode::ReadWrite, |txn| {
            DatabaseHandle::open_dbi(txn, name, flags)
        })?;
        let handle = DatabaseHandle::new(self, dbi, self.dbis.register(dbi));
        debug!("opened database {:?} as dbi {}", name, handle.dbi());
        Ok(handle)
    }

    pub fn info(&self) -> Result<EnvInfo> {
        let mut info = MaybeUninit::uninit();
        unsafe {
            mdb_result(ffi::mdb_env_info(self.env, info.as_mut_ptr()))?;
            Ok(EnvInfo::from(info.assume_init()))
        }
    }

    /// Statistics of the main (unnamed) key space.
    pub fn stat(&self) -> Result<Stat> {
        let mut stat = MaybeUninit::uninit();
        unsafe {
            mdb_result(ffi::mdb_env_stat(self.env, stat.as_mut_ptr()))?;
            Ok(Stat::from(stat.assume_init()))
        }
    }

    /// Flush buffers to disk. `force` syncs even under NOSYNC/MAPASYNC.
    pub fn sync(&self, force: bool) -> Result<()> {
        unsafe { mdb_result(ffi::mdb_env_sync(self.env, force as c_int))? };
        Ok(())
    }

    /// Copy the environment to `path` while it stays in use.
    ///
    /// With `compact`, free pages are omitted and pages renumbered.
    pub fn copy<P: AsRef<Path>>(&self, path: P, compact: bool) -> Result<()> {
        let path = path.as_ref();
        if !self.flags()?.contains(EnvFlags::NOSUBDIR) {
            fs::create_dir_all(path)?;
        }
        let c_path = path_to_cstring(path)?;
        let flags = if compact {
            CopyFlags::COMPACT
        } else {
            CopyFlags::empty()
        };
        unsafe {
            mdb_result(ffi::mdb_env_copy2(
                self.env,
                c_path.as_ptr(),
                flags.bits() as c_uint,
            ))?
        };
        debug!("copied environment to {} (compact: {})", path.display(), compact);
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn options(&self) -> &EnvOptions {
        &self.options
    }

    /// Switch `flags` on or off on the open environment.
    ///
    /// Only the durability flags in [`RUNTIME_ENV_FLAGS`] can change after
    /// open; anything else is a [`Error::Config`].
    ///
    /// [`RUNTIME_ENV_FLAGS`]: crate::RUNTIME_ENV_FLAGS
    pub fn set_flags(&mut self, flags: EnvFlags, on: bool) -> Result<()> {
        if !RUNTIME_ENV_FLAGS.contains(flags) {
            return Err(Error::Config(format!(
                "{:?} cannot be changed on an open environment",
                flags - RUNTIME_ENV_FLAGS
            )));
        }
        unsafe { mdb_result(ffi::mdb_env_set_flags(self.env, flags.bits() as c_uint, on as c_int))? };
        debug!("set {:?} to {} on {}", flags, on, self.path.display());
        Ok(())
    }

    /// Grow (or shrink) the memory map to `bytes`.
    ///
    /// Takes `&mut self` so no transaction of this environment can be open,
    /// which the engine requires. Used to recover from
    /// [`StorageError::MapFull`](crate::StorageError::MapFull).
    pub fn set_map_size(&mut self, bytes: usize) -> Result<()> {
        if bytes == 0 {
            return Err(Error::Config("map_size must be greater than zero".into()));
        }
        unsafe { mdb_result(ffi::mdb_env_set_mapsize(self.env, bytes))? };
        self.options.map_size = Some(bytes);
        debug!("resized map of {} to {} bytes", self.path.display(), bytes);
        Ok(())
    }

    pub fn flags(&self) -> Result<EnvFlags> {
        let mut flags: c_uint = 0;
        unsafe { mdb_result(ffi::mdb_env_get_flags(self.env, &mut flags))? };
        Ok(EnvFlags::from_bits_truncate(flags as u32))
    }

    pub fn max_readers(&self) -> Result<u32> {
        let mut readers: c_uint = 0;
        unsafe { mdb_result(ffi::mdb_env_get_maxreaders(self.env, &mut readers))? };
        Ok(readers as u32)
    }

    pub fn max_key_size(&self) -> usize {
        unsafe { ffi::mdb_env_get_maxkeysize(self.env) as usize }
    }

    /// Version string of the storage engine.
    pub fn version() -> &'static str {
        &VERSION
    }

    pub(crate) fn dbis(&self) -> &DbiRegistry {
        &self.dbis
    }

    pub(crate) fn raw(&self) -> *mut ffi::MDB_env {
        self.env
    }

    /// Identity used to tie handles to the environment that opened them.
    pub(crate) fn id(&self) -> usize {
        self.env as usize
    }
}

impl Drop for Environment {
    fn drop(&mut self) {
        if !self.env.is_null() {
            unsafe { ffi::mdb_env_close(self.env) };
            self.env = ptr::null_mut();
            debug!("closed environment at {}", self.path.display());
        }
    }
}

fn path_to_cstring(path: &Path) -> Result<CString> {
    let path = path
        .to_str()
        .ok_or_else(|| Error::Config(format!("path {} is not valid UTF-8", path.display())))?;
    CString::new(path).map_err(|_| Error::Config(format!("path {} contains a NUL byte", path)))
}

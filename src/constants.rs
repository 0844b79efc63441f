use bitflags::bitflags;

// Environment flags
bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EnvFlags: u32 {
        const FIXEDMAP = 0x01;
        const NOSUBDIR = 0x4000;
        const NOSYNC = 0x10000;
        const RDONLY = 0x20000;
        const NOMETASYNC = 0x40000;
        const WRITEMAP = 0x80000;
        const MAPASYNC = 0x100000;
        const NOTLS = 0x200000;
        const NOLOCK = 0x400000;
        const NORDAHEAD = 0x800000;
        const NOMEMINIT = 0x1000000;
    }
}

// Database flags
bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DbFlags: u32 {
        const REVERSEKEY = 0x02;
        const DUPSORT = 0x04;
        const INTEGERKEY = 0x08;
        const DUPFIXED = 0x10;
        const INTEGERDUP = 0x20;
        const REVERSEDUP = 0x40;
        const CREATE = 0x40000;
    }
}

// Write operation flags
bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WriteFlags: u32 {
        const NOOVERWRITE = 0x10;
        const NODUPDATA = 0x20;
        const CURRENT = 0x40;
        const APPEND = 0x20000;
        const APPENDDUP = 0x40000;
    }
}

// Copy operation flags
bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CopyFlags: u32 {
        const COMPACT = 0x01;
    }
}

/// Flags every environment is opened with. Reader slots must follow the
/// transaction object, not the thread, for reset/renew to be reusable.
pub const REQUIRED_ENV_FLAGS: EnvFlags = EnvFlags::NOTLS;

/// Flags that can be switched on an open environment with
/// [`Environment::set_flags`](crate::Environment::set_flags).
pub const RUNTIME_ENV_FLAGS: EnvFlags = EnvFlags::NOSYNC
    .union(EnvFlags::NOMETASYNC)
    .union(EnvFlags::MAPASYNC)
    .union(EnvFlags::NOMEMINIT);

/// Default permission bits for the data and lock files.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Width in bytes of auto-increment sequence keys.
pub const SEQUENCE_KEY_LEN: usize = 8;

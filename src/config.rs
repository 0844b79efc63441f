use std::str::FromStr;

use crate::constants::{EnvFlags, DEFAULT_FILE_MODE};
use crate::error::{Error, Result};

/// Options applied when an [`Environment`](crate::Environment) is opened.
///
/// Unset limits keep the engine defaults (10 MiB map, 126 readers, no named
/// key spaces).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvOptions {
    /// Maximum size in bytes the map may grow to
    pub map_size: Option<usize>,
    /// Size of the reader slot table
    pub max_readers: Option<u32>,
    /// Maximum number of named key spaces
    pub max_databases: Option<u32>,
    /// Extra environment flags
    pub flags: EnvFlags,
    /// Permission bits for created files
    pub mode: u32,
}

impl Default for EnvOptions {
    fn default() -> Self {
        EnvOptions {
            map_size: None,
            max_readers: None,
            max_databases: None,
            flags: EnvFlags::empty(),
            mode: DEFAULT_FILE_MODE,
        }
    }
}

impl EnvOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map_size(mut self, bytes: usize) -> Self {
        self.map_size = Some(bytes);
        self
    }

    pub fn max_readers(mut self, readers: u32) -> Self {
        self.max_readers = Some(readers);
        self
    }

    pub fn max_databases(mut self, dbs: u32) -> Self {
        self.max_databases = Some(dbs);
        self
    }

    pub fn flags(mut self, flags: EnvFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    /// Build options from `(name, value)` pairs, as read from a config file
    /// or command line. Unknown names and unparsable values are rejected.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut options = EnvOptions::default();
        for (name, value) in pairs {
            options.set(name.as_ref().trim(), value.as_ref().trim())?;
        }
        options.validate()?;
        Ok(options)
    }

    fn set(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "map_size" => self.map_size = Some(parse_number(name, value)?),
            "max_readers" => self.max_readers = Some(parse_number(name, value)?),
            "max_databases" => self.max_databases = Some(parse_number(name, value)?),
            other => {
                return Err(Error::Config(format!("unrecognized option `{}`", other)));
            }
        }
        Ok(())
    }

    /// Reject values the engine would accept but that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.map_size == Some(0) {
            return Err(Error::Config("map_size must be greater than zero".into()));
        }
        if self.max_readers == Some(0) {
            return Err(Error::Config("max_readers must be greater than zero".into()));
        }
        if self.flags.contains(EnvFlags::RDONLY) && self.flags.contains(EnvFlags::WRITEMAP) {
            return Err(Error::Config("RDONLY and WRITEMAP are mutually exclusive".into()));
        }
        Ok(())
    }
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .replace('_', "")
        .parse()
        .map_err(|_| Error::Config(format!("option `{}` has invalid value `{}`", name, value)))
}

/// Parses `name=value` pairs separated by commas, e.g.
/// `map_size=10485760,max_databases=4`.
impl FromStr for EnvOptions {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut pairs = Vec::new();
        for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, value) = part
                .split_once('=')
                .ok_or_else(|| Error::Config(format!("expected name=value, got `{}`", part)))?;
            pairs.push((name, value));
        }
        EnvOptions::from_pairs(pairs)
    }
}

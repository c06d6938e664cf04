//! Connection settings and their resolution against a sectioned
//! configuration file.
//!
//! Explicit options always win. Fields that were not supplied are read from
//! one section of the file: the section passed to `connect`, else the
//! section set on the options, else `default`. Once a section is chosen,
//! nothing falls back to `default`.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use serde::Deserialize;

use crate::error::{Error, Result};

pub const DEFAULT_SECTION: &str = "default";
pub const DEFAULT_CONFIG_PATH: &str = "./config.toml";

/// Connection fields as they appear in one configuration section
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SectionSettings {
    pub host: Option<String>,
    pub dbname: Option<String>,
    pub user: Option<String>,
    pub passwd: Option<String>,
}

/// A parsed configuration file, one table per section:
///
/// ```toml
/// [default]
/// host = "localhost"
/// dbname = "passwords.db"
/// user = "app"
/// passwd = "secret"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigFile {
    sections: HashMap<String, SectionSettings>,
}

impl ConfigFile {
    /// Load the file at `path`. A missing file is an empty configuration.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Self::parse(&text, path),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!("configuration file {} not found", path.display());
                Ok(Self::default())
            }
            Err(source) => Err(Error::ConfigFile {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn parse(text: &str, path: &Path) -> Result<Self> {
        let sections = toml::from_str(text).map_err(|source| Error::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self { sections })
    }

    pub fn section(&self, name: &str) -> Option<&SectionSettings> {
        self.sections.get(name)
    }
}

/// Fully resolved connection settings
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionSettings {
    pub host: String,
    pub dbname: String,
    pub user: String,
    pub passwd: String,
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSettings")
            .field("host", &self.host)
            .field("dbname", &self.dbname)
            .field("user", &self.user)
            .field("passwd", &"***")
            .finish()
    }
}

/// Session construction options. Unset fields are filled from the
/// configuration file at connect time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    pub explicit: SectionSettings,
    pub section: Option<String>,
    pub config_path: Option<PathBuf>,
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.explicit.host = Some(host.into());
        self
    }

    pub fn with_dbname(mut self, dbname: impl Into<String>) -> Self {
        self.explicit.dbname = Some(dbname.into());
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.explicit.user = Some(user.into());
        self
    }

    pub fn with_passwd(mut self, passwd: impl Into<String>) -> Self {
        self.explicit.passwd = Some(passwd.into());
        self
    }

    /// Section used when `connect` is not given one
    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn config_path(&self) -> &Path {
        self.config_path
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH))
    }

    /// `requested`, else the configured section, else `default`.
    pub fn section_name<'a>(&'a self, requested: Option<&'a str>) -> &'a str {
        requested
            .or(self.section.as_deref())
            .unwrap_or(DEFAULT_SECTION)
    }

    /// Resolve every field, reading the configuration file only if some
    /// field was not given explicitly.
    pub fn resolve(&self, section: Option<&str>) -> Result<ConnectionSettings> {
        let section = self.section_name(section);
        let e = &self.explicit;
        let complete =
            e.host.is_some() && e.dbname.is_some() && e.user.is_some() && e.passwd.is_some();
        if complete {
            return resolve_fields(e, &SectionSettings::default(), section);
        }
        let file = ConfigFile::load(self.config_path())?;
        let fallback = file.section(section).cloned().unwrap_or_default();
        resolve_fields(e, &fallback, section)
    }
}

fn pick(
    explicit: &Option<String>,
    fallback: &Option<String>,
    field: &'static str,
    section: &str,
) -> Result<String> {
    explicit
        .as_ref()
        .or(fallback.as_ref())
        .cloned()
        .ok_or_else(|| Error::Configuration {
            field,
            section: section.to_string(),
        })
}

pub fn resolve_fields(
    explicit: &SectionSettings,
    fallback: &SectionSettings,
    section: &str,
) -> Result<ConnectionSettings> {
    let user = pick(&explicit.user, &fallback.user, "user", section)?;
    let host = pick(&explicit.host, &fallback.host, "host", section)?;
    let dbname = pick(&explicit.dbname, &fallback.dbname, "dbname", section)?;
    let passwd = pick(&explicit.passwd, &fallback.passwd, "passwd", section)?;
    Ok(ConnectionSettings {
        host,
        dbname,
        user,
        passwd,
    })
}

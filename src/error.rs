use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by a [`Session`](crate::Session) or a
/// [`RowCursor`](crate::RowCursor). Nothing is retried internally.
#[derive(Debug, Error)]
pub enum Error {
    /// A connection setting is missing from both the options and the section
    #[error("connection setting `{field}` is not set and is missing from section [{section}]")]
    Configuration { field: &'static str, section: String },

    #[error("failed to read configuration file {}: {source}", path.display())]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse configuration file {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// The driver refused to open the database
    #[error("failed to connect to database `{dbname}`: {source}")]
    Connection {
        dbname: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Malformed SQL, driver rejection, or a missing table
    #[error("query failed: {sql}: {source}")]
    Query {
        sql: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Reading a row from a cursor that holds no rows
    #[error("no row to read because the result is empty")]
    EmptyResult,

    /// Cursor delegation on a session that has not run a query yet
    #[error("no query has been issued on this session")]
    NoCurrentResult,

    #[error("column/value count mismatch: {columns} columns, {values} values")]
    Arity { columns: usize, values: usize },

    #[error("session is not connected")]
    NotConnected,
}

impl Error {
    pub(crate) fn query(sql: impl Into<String>, source: rusqlite::Error) -> Self {
        Error::Query {
            sql: sql.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

//! SQL session wrapper and resettable row cursors over SQLite.
//!
//! # Intention
//!
//! - Give callers one [`Session`] per unit of work: connect from explicit
//!   settings or a configuration section, run statements, commit on close.
//! - Hand query results back as [`RowCursor`]s that can be advanced, reset
//!   and iterated any number of times.
//!
//! # Architectural Boundaries
//!
//! - Only session, cursor and configuration code belongs here.
//! - The convenience builders (`insert`, `update_set`, `delete`) embed values
//!   as literals. They are not an injection boundary; use `query`/`update`
//!   with parameters for untrusted input.
//!
//! # Example
//!
//! ```no_run
//! use sql_session::{Session, SessionOptions, Value};
//!
//! # fn main() -> sql_session::Result<()> {
//! Session::scoped(SessionOptions::new().with_section("tategaki"), |db| {
//!     let users = db.query("SELECT * FROM edit_users", &[])?;
//!     while users.advance() {
//!         println!("{:?}", users.get("name")?);
//!     }
//!     db.insert("edit_users", &["name"], &[Value::from("sample")])?;
//!     Ok(())
//! })
//! # }
//! ```

pub mod config;
pub mod cursor;
pub mod error;
pub mod sqlite;
pub mod value;

pub use config::{ConfigFile, ConnectionSettings, SectionSettings, SessionOptions};
pub use cursor::{IntoRows, Row, RowCursor, Rows};
pub use error::{Error, Result};
pub use sqlite::Session;
pub use value::Value;

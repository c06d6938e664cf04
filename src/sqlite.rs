use log::{debug, info, warn};
use rusqlite::config::DbConfig;
use rusqlite::{params_from_iter, Connection, OptionalExtension};

use crate::config::{ConnectionSettings, SessionOptions};
use crate::cursor::{Row, RowCursor, Rows};
use crate::error::{Error, Result};
use crate::value::Value;

/// `INSERT INTO table (c1,c2) VALUES (v1,v2)` with the values embedded as
/// literals in their portable form (text as `"text"`).
///
/// SQLite reads a double-quoted token as a column name whenever one of that
/// name is in scope, so the session itself executes [`sqlite_literal`]
/// renderings instead of this text.
pub fn insert_sql(table: &str, columns: &[&str], values: &[Value]) -> Result<String> {
    build_insert(table, columns, values, Value::to_sql_literal)
}

/// `UPDATE table SET c1=v1,c2=v2 WHERE condition`. The condition is used
/// verbatim.
pub fn update_set_sql(
    table: &str,
    columns: &[&str],
    values: &[Value],
    condition: &str,
) -> Result<String> {
    build_update_set(table, columns, values, condition, Value::to_sql_literal)
}

pub fn delete_sql(table: &str, condition: &str) -> String {
    format!("DELETE FROM {table} WHERE {condition}")
}

/// The literal of `value` as SQLite must see it to read it as a string.
///
/// Text and timestamps go through [`Value::to_sql_literal`] first, so the
/// quoting rule still decides the content. The outer double quotes are then
/// swapped for single quotes and embedded single quotes are doubled.
pub fn sqlite_literal(value: &Value) -> String {
    match value {
        Value::Text(_) | Value::Timestamp(_) => {
            let literal = value.to_sql_literal();
            let inner = literal
                .strip_prefix('"')
                .and_then(|rest| rest.strip_suffix('"'))
                .unwrap_or(literal.as_str());
            format!("'{}'", inner.replace('\'', "''"))
        }
        other => other.to_sql_literal(),
    }
}

fn build_insert(
    table: &str,
    columns: &[&str],
    values: &[Value],
    literal: fn(&Value) -> String,
) -> Result<String> {
    check_arity(columns, values)?;
    let values: Vec<String> = values.iter().map(literal).collect();
    Ok(format!(
        "INSERT INTO {table} ({}) VALUES ({})",
        columns.join(","),
        values.join(",")
    ))
}

fn build_update_set(
    table: &str,
    columns: &[&str],
    values: &[Value],
    condition: &str,
    literal: fn(&Value) -> String,
) -> Result<String> {
    check_arity(columns, values)?;
    let sets: Vec<String> = columns
        .iter()
        .zip(values)
        .map(|(column, value)| format!("{column}={}", literal(value)))
        .collect();
    Ok(format!(
        "UPDATE {table} SET {} WHERE {condition}",
        sets.join(",")
    ))
}

/// Each column spec is joined with spaces, e.g. `["id", "INTEGER", "PRIMARY KEY"]`.
pub fn create_table_sql(table: &str, columns: &[&[&str]]) -> String {
    let columns: Vec<String> = columns.iter().map(|spec| spec.join(" ")).collect();
    format!("CREATE TABLE {table} ({})", columns.join(","))
}

fn check_arity(columns: &[&str], values: &[Value]) -> Result<()> {
    if columns.len() != values.len() {
        return Err(Error::Arity {
            columns: columns.len(),
            values: values.len(),
        });
    }
    Ok(())
}

fn end_transaction(conn: &Connection, reopen: bool) -> rusqlite::Result<()> {
    if !conn.is_autocommit() {
        conn.execute_batch("COMMIT")?;
    }
    if reopen {
        conn.execute_batch("BEGIN")?;
    }
    Ok(())
}

/// A database session over one SQLite connection.
///
/// Writes are held in an open transaction until [`commit`](Self::commit) or
/// [`close`](Self::close). Dropping an open session commits and closes it;
/// [`Session::scoped`] does the same around a closure and reports failures.
///
/// The most recent [`query`](Self::query) result is kept as the current
/// cursor, which `advance`, `get`, `count`, `reset` and `values` operate on.
/// `columns`, `all_values`, `tables` and `has_table` go to the database
/// directly and leave the current cursor alone.
#[derive(Debug)]
pub struct Session {
    options: SessionOptions,
    settings: Option<ConnectionSettings>,
    connection: Option<Connection>,
    current: Option<RowCursor>,
}

impl Session {
    /// Create an unconnected session
    pub fn new(options: SessionOptions) -> Self {
        Self {
            options,
            settings: None,
            connection: None,
            current: None,
        }
    }

    /// Create a session and connect it using the configured section
    pub fn open(options: SessionOptions) -> Result<Self> {
        let mut session = Self::new(options);
        session.connect(None)?;
        Ok(session)
    }

    /// Open a session, run `f` on it and close it, whether or not `f`
    /// succeeded. An error from `f` takes precedence over a close error.
    pub fn scoped<T, E, F>(options: SessionOptions, f: F) -> std::result::Result<T, E>
    where
        F: FnOnce(&mut Session) -> std::result::Result<T, E>,
        E: From<Error>,
    {
        let mut session = Session::open(options)?;
        let outcome = f(&mut session);
        let closed = session.close();
        let value = outcome?;
        closed?;
        Ok(value)
    }

    /// Resolve the connection settings and open the database.
    ///
    /// `section` overrides the section set on the options. A session that is
    /// already connected is committed and closed first.
    pub fn connect(&mut self, section: Option<&str>) -> Result<&mut Self> {
        let settings = self.options.resolve(section)?;
        self.release()?;

        info!(
            "connecting to {} as {}@{}",
            settings.dbname, settings.user, settings.host
        );
        let connect_error = |source: rusqlite::Error| Error::Connection {
            dbname: settings.dbname.clone(),
            source,
        };
        let conn = Connection::open(&settings.dbname).map_err(connect_error)?;
        conn.set_db_config(DbConfig::SQLITE_DBCONFIG_DQS_DML, true)
            .map_err(connect_error)?;
        conn.set_db_config(DbConfig::SQLITE_DBCONFIG_DQS_DDL, true)
            .map_err(connect_error)?;
        conn.execute_batch("BEGIN").map_err(connect_error)?;

        self.connection = Some(conn);
        self.settings = Some(settings);
        Ok(self)
    }

    /// Commit, then release the statement cache and the connection.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        let Some(conn) = self.connection.take() else {
            return Ok(());
        };
        let dbname = self
            .settings
            .as_ref()
            .map(|s| s.dbname.clone())
            .unwrap_or_default();
        debug!("closing connection to {dbname}");

        let committed = end_transaction(&conn, false).map_err(|e| Error::query("COMMIT", e));
        conn.flush_prepared_statement_cache();
        let closed = conn
            .close()
            .map_err(|(_, source)| Error::Connection { dbname, source });
        committed?;
        closed
    }

    /// Make pending writes durable without closing.
    pub fn commit(&mut self) -> Result<&mut Self> {
        let conn = self.connection()?;
        debug!("commit");
        end_transaction(conn, true).map_err(|e| Error::query("COMMIT", e))?;
        Ok(self)
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Settings resolved by the last `connect`
    pub fn settings(&self) -> Option<&ConnectionSettings> {
        self.settings.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn connection(&self) -> Result<&Connection> {
        self.connection.as_ref().ok_or(Error::NotConnected)
    }

    fn fetch_all(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let conn = self.connection()?;
        debug!("execute query: {sql} ({} params)", params.len());
        let mut stmt = conn.prepare_cached(sql).map_err(|e| Error::query(sql, e))?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt
            .query(params_from_iter(params))
            .map_err(|e| Error::query(sql, e))?;

        let mut result = Vec::new();
        while let Some(row) = rows.next().map_err(|e| Error::query(sql, e))? {
            let record = names
                .iter()
                .enumerate()
                .map(|(idx, name)| {
                    Ok::<_, rusqlite::Error>((name.clone(), Value::from(row.get_ref(idx)?)))
                })
                .collect::<rusqlite::Result<Row>>()
                .map_err(|e| Error::query(sql, e))?;
            result.push(record);
        }
        Ok(result)
    }

    /// Run a row-returning statement with positional parameters. The result
    /// becomes the current cursor, positioned before the first row.
    pub fn query(&mut self, sql: &str, params: &[Value]) -> Result<&mut RowCursor> {
        let rows = self.fetch_all(sql, params)?;
        Ok(self.current.insert(RowCursor::new(rows)))
    }

    /// Run a statement that returns no rows. Returns the affected row count.
    pub fn update(&mut self, sql: &str, params: &[Value]) -> Result<usize> {
        let conn = self.connection()?;
        debug!("execute update: {sql} ({} params)", params.len());
        let mut stmt = conn.prepare_cached(sql).map_err(|e| Error::query(sql, e))?;
        stmt.execute(params_from_iter(params))
            .map_err(|e| Error::query(sql, e))
    }

    /// Insert one row with the values embedded as literals (see
    /// [`sqlite_literal`]). Not an injection boundary.
    pub fn insert(&mut self, table: &str, columns: &[&str], values: &[Value]) -> Result<usize> {
        let sql = build_insert(table, columns, values, sqlite_literal)?;
        self.update(&sql, &[])
    }

    /// Values are embedded like [`insert`](Self::insert). `condition` is used
    /// verbatim: quote string literals in it with single quotes, since
    /// `"name"` means the column `name` when the table has one.
    pub fn update_set(
        &mut self,
        table: &str,
        columns: &[&str],
        values: &[Value],
        condition: &str,
    ) -> Result<usize> {
        let sql = build_update_set(table, columns, values, condition, sqlite_literal)?;
        self.update(&sql, &[])
    }

    /// `condition` is used verbatim, with the same quoting caveat as
    /// [`update_set`](Self::update_set).
    pub fn delete(&mut self, table: &str, condition: &str) -> Result<usize> {
        self.update(&delete_sql(table, condition), &[])
    }

    pub fn create_table(&mut self, table: &str, columns: &[&[&str]]) -> Result<()> {
        self.update(&create_table_sql(table, columns), &[])?;
        Ok(())
    }

    pub fn delete_table(&mut self, table: &str) -> Result<()> {
        self.update(&format!("DROP TABLE {table}"), &[])?;
        Ok(())
    }

    /// The current cursor
    pub fn cursor(&self) -> Result<&RowCursor> {
        self.current.as_ref().ok_or(Error::NoCurrentResult)
    }

    pub fn cursor_mut(&mut self) -> Result<&mut RowCursor> {
        self.current.as_mut().ok_or(Error::NoCurrentResult)
    }

    pub fn advance(&mut self) -> Result<bool> {
        Ok(self.cursor_mut()?.advance())
    }

    pub fn get(&self, column: &str) -> Result<Option<&Value>> {
        self.cursor()?.get(column)
    }

    pub fn get_or(&self, column: &str, default: impl Into<Value>) -> Result<Value> {
        self.cursor()?.get_or(column, default)
    }

    pub fn count(&self) -> Result<usize> {
        Ok(self.cursor()?.count())
    }

    pub fn reset(&mut self) -> Result<&mut RowCursor> {
        Ok(self.cursor_mut()?.reset())
    }

    pub fn values(&self, column: Option<&str>) -> Result<Vec<Value>> {
        Ok(self.cursor()?.values(column))
    }

    /// Iterate the current result without moving its cursor.
    pub fn iter(&self) -> Result<Rows<'_>> {
        Ok(self.cursor()?.iter())
    }

    /// Column names of `table` in declaration order.
    pub fn columns(&self, table: &str) -> Result<Vec<String>> {
        let conn = self.connection()?;
        let sql = format!("SELECT * FROM {table}");
        let stmt = conn.prepare(&sql).map_err(|e| Error::query(&sql, e))?;
        Ok(stmt.column_names().into_iter().map(String::from).collect())
    }

    /// Every row's value of `column` in `table`, `Null` where absent.
    pub fn all_values(&self, table: &str, column: &str) -> Result<Vec<Value>> {
        let rows = self.fetch_all(&format!("SELECT * FROM {table}"), &[])?;
        Ok(rows
            .iter()
            .map(|row| row.get(column).cloned().unwrap_or(Value::Null))
            .collect())
    }

    pub fn tables(&self) -> Result<Vec<String>> {
        let rows = self.fetch_all(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            &[],
        )?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("name").and_then(Value::as_str).map(String::from))
            .collect())
    }

    /// Whether a table matches `name` (SQL `LIKE`, so `_` and `%` are
    /// wildcards).
    pub fn has_table(&self, name: &str) -> Result<bool> {
        let conn = self.connection()?;
        let sql = "SELECT name FROM sqlite_master WHERE type = 'table' AND name LIKE ?1";
        debug!("execute query: {sql} (1 params)");
        let found: Option<String> = conn
            .query_row(sql, [name], |row| row.get(0))
            .optional()
            .map_err(|e| Error::query(sql, e))?;
        Ok(found.is_some())
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!("failed to close session: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_statement_embeds_literals() {
        let sql = insert_sql("t", &["name", "count"], &[Value::from("sample"), Value::from(5)])
            .unwrap();
        assert_eq!(sql, "INSERT INTO t (name,count) VALUES (\"sample\",5)");
    }

    #[test]
    fn update_statement_keeps_condition_verbatim() {
        let sql = update_set_sql(
            "password_table",
            &["password", "memo"],
            &[Value::from("pw2"), Value::Null],
            "name=\"github\"",
        )
        .unwrap();
        assert_eq!(
            sql,
            "UPDATE password_table SET password=\"pw2\",memo=NULL WHERE name=\"github\""
        );
    }

    #[test]
    fn sqlite_literals_are_single_quoted() {
        assert_eq!(sqlite_literal(&Value::from("sample")), "'sample'");
        assert_eq!(sqlite_literal(&Value::from("\"sample\"")), "'sample'");
        assert_eq!(sqlite_literal(&Value::from("\"sample")), "'sample'");
        assert_eq!(sqlite_literal(&Value::from("it's")), "'it''s'");
        assert_eq!(sqlite_literal(&Value::from("\"")), "'\"'");
        assert_eq!(sqlite_literal(&Value::from(5)), "5");
        assert_eq!(sqlite_literal(&Value::Null), "NULL");

        let sql = build_insert(
            "t",
            &["name", "count"],
            &[Value::from("sample"), Value::from(5)],
            sqlite_literal,
        )
        .unwrap();
        assert_eq!(sql, "INSERT INTO t (name,count) VALUES ('sample',5)");
    }

    #[test]
    fn arity_mismatch_is_rejected() {
        let err = insert_sql("t", &["a", "b"], &[Value::from(1)]).unwrap_err();
        assert!(matches!(err, Error::Arity { columns: 2, values: 1 }));
        let err = update_set_sql("t", &["a"], &[], "1=1").unwrap_err();
        assert!(matches!(err, Error::Arity { columns: 1, values: 0 }));
    }

    #[test]
    fn ddl_statements() {
        assert_eq!(
            create_table_sql(
                "t",
                &[&["id", "INTEGER", "PRIMARY KEY"], &["name", "TEXT", "NOT NULL"]]
            ),
            "CREATE TABLE t (id INTEGER PRIMARY KEY,name TEXT NOT NULL)"
        );
        assert_eq!(delete_sql("t", "id=1"), "DELETE FROM t WHERE id=1");
    }

    #[test]
    fn unconnected_session() {
        let mut session = Session::new(SessionOptions::new());
        assert!(!session.is_connected());
        assert!(matches!(session.update("SELECT 1", &[]), Err(Error::NotConnected)));
        assert!(matches!(session.tables(), Err(Error::NotConnected)));
        assert!(matches!(session.advance(), Err(Error::NoCurrentResult)));
    }
}

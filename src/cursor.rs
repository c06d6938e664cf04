use std::sync::Arc;

use crate::error::{Error, Result};
use crate::value::Value;

/// One result row: column names mapped to values, in the column order the
/// driver returned them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: Vec<(String, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a column, replacing an existing value with the same name in place
    pub fn with_value(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.insert(column.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, column: String, value: Value) {
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((column, value)),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn columns(&self) -> Vec<&str> {
        self.iter().map(|(name, _)| name).collect()
    }

    pub fn values(&self) -> Vec<Value> {
        self.iter().map(|(_, value)| value.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.insert(column, value);
        }
        row
    }
}

/// The result of one query: an immutable row sequence plus a read position.
///
/// A fresh cursor is positioned before the first row; [`advance`](Self::advance)
/// moves it forward and [`reset`](Self::reset) puts it back. The rows are
/// shared, so cloning is cheap and clones may be iterated on other threads.
///
/// While positioned before the first row, the row readers (`get`, `columns`,
/// `values(None)`) address the last row. They only fail when the result is
/// empty.
#[derive(Debug)]
pub struct RowCursor {
    rows: Arc<[Row]>,
    position: Option<usize>,
}

/// Clones share the rows but start before the first row.
impl Clone for RowCursor {
    fn clone(&self) -> Self {
        Self {
            rows: Arc::clone(&self.rows),
            position: None,
        }
    }
}

fn step(position: Option<usize>, len: usize) -> Option<usize> {
    let next = position.map_or(0, |p| p + 1);
    (next < len).then_some(next)
}

impl RowCursor {
    pub fn new(rows: Vec<Row>) -> Self {
        Self {
            rows: rows.into(),
            position: None,
        }
    }

    /// Move to the next row. Returns `false` and stays on the last row once
    /// there is nothing left.
    pub fn advance(&mut self) -> bool {
        match step(self.position, self.rows.len()) {
            Some(next) => {
                self.position = Some(next);
                true
            }
            None => false,
        }
    }

    /// Move back to before the first row.
    pub fn reset(&mut self) -> &mut Self {
        self.position = None;
        self
    }

    pub fn count(&self) -> usize {
        self.rows.len()
    }

    /// Current position, `None` before the first row.
    pub fn position(&self) -> Option<usize> {
        self.position
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// The row at the current position, `None` before the first row.
    pub fn current(&self) -> Option<&Row> {
        self.position.and_then(|p| self.rows.get(p))
    }

    fn read_row(&self) -> Result<&Row> {
        let last = self.rows.len().checked_sub(1).ok_or(Error::EmptyResult)?;
        Ok(&self.rows[self.position.unwrap_or(last)])
    }

    /// Value of `column` in the current row, `None` if the row has no such
    /// column.
    pub fn get(&self, column: &str) -> Result<Option<&Value>> {
        Ok(self.read_row()?.get(column))
    }

    /// Value of `column` in the current row, or `default` if the row has no
    /// such column.
    pub fn get_or(&self, column: &str, default: impl Into<Value>) -> Result<Value> {
        Ok(self.get(column)?.cloned().unwrap_or_else(|| default.into()))
    }

    /// Column names of the current row.
    pub fn columns(&self) -> Result<Vec<&str>> {
        Ok(self.read_row()?.columns())
    }

    /// With a column, that column's value from every row (`Null` where a row
    /// lacks it). Without one, every value of the current row. Both are
    /// empty for an empty result.
    pub fn values(&self, column: Option<&str>) -> Vec<Value> {
        match column {
            Some(column) => self
                .rows
                .iter()
                .map(|row| row.get(column).cloned().unwrap_or(Value::Null))
                .collect(),
            None => self.read_row().map(Row::values).unwrap_or_default(),
        }
    }

    /// Iterate the rows from the start without moving this cursor.
    pub fn iter(&self) -> Rows<'_> {
        Rows {
            rows: &self.rows,
            position: None,
        }
    }
}

/// Borrowing iterator with its own position.
#[derive(Debug, Clone)]
pub struct Rows<'a> {
    rows: &'a [Row],
    position: Option<usize>,
}

impl<'a> Iterator for Rows<'a> {
    type Item = &'a Row;

    fn next(&mut self) -> Option<Self::Item> {
        let next = step(self.position, self.rows.len())?;
        self.position = Some(next);
        self.rows.get(next)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.rows.len() - self.position.map_or(0, |p| p + 1);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Rows<'_> {}

impl<'a> IntoIterator for &'a RowCursor {
    type Item = &'a Row;
    type IntoIter = Rows<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Owning iterator over a fresh clone of a cursor.
#[derive(Debug)]
pub struct IntoRows {
    cursor: RowCursor,
}

impl Iterator for IntoRows {
    type Item = Row;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor.advance() {
            self.cursor.current().cloned()
        } else {
            None
        }
    }
}

impl IntoIterator for RowCursor {
    type Item = Row;
    type IntoIter = IntoRows;

    fn into_iter(self) -> Self::IntoIter {
        IntoRows {
            cursor: self.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> RowCursor {
        RowCursor::new(vec![
            Row::new().with_value("id", 1).with_value("name", "alice"),
            Row::new().with_value("id", 2).with_value("name", "bob"),
            Row::new().with_value("id", 3).with_value("name", "carol"),
        ])
    }

    #[test]
    fn advance_stops_on_last_row() {
        let mut cursor = users();
        assert_eq!(cursor.position(), None);
        let mut steps = 0;
        while cursor.advance() {
            steps += 1;
        }
        assert_eq!(steps, cursor.count());
        assert_eq!(cursor.position(), Some(2));
        assert!(!cursor.advance());
        assert_eq!(cursor.position(), Some(2));
    }

    #[test]
    fn reset_revisits_rows_in_order() {
        let mut cursor = users();
        for _ in 0..3 {
            let mut names = Vec::new();
            while cursor.advance() {
                names.push(cursor.get("name").unwrap().cloned().unwrap());
            }
            assert_eq!(
                names,
                vec![Value::from("alice"), Value::from("bob"), Value::from("carol")]
            );
            cursor.reset();
        }
    }

    #[test]
    fn get_falls_back_to_default_for_missing_column() {
        let mut cursor = users();
        cursor.advance();
        assert_eq!(cursor.get("id").unwrap(), Some(&Value::Integer(1)));
        assert_eq!(cursor.get("memo").unwrap(), None);
        assert_eq!(cursor.get_or("memo", "").unwrap(), Value::from(""));
        assert_eq!(cursor.get_or("name", "").unwrap(), Value::from("alice"));
    }

    #[test]
    fn empty_cursor_rejects_row_reads() {
        let mut cursor = RowCursor::new(Vec::new());
        assert_eq!(cursor.count(), 0);
        assert!(!cursor.advance());
        assert!(matches!(cursor.get("id"), Err(Error::EmptyResult)));
        assert!(matches!(cursor.get_or("id", 0), Err(Error::EmptyResult)));
        assert!(matches!(cursor.columns(), Err(Error::EmptyResult)));
        assert!(cursor.values(None).is_empty());
        assert!(cursor.values(Some("id")).is_empty());
    }

    #[test]
    fn before_first_reads_last_row() {
        let cursor = users();
        assert_eq!(cursor.get("name").unwrap(), Some(&Value::from("carol")));
        assert!(cursor.current().is_none());
    }

    #[test]
    fn columns_and_values_follow_row_order() {
        let mut cursor = users();
        cursor.advance();
        assert_eq!(cursor.columns().unwrap(), vec!["id", "name"]);
        assert_eq!(
            cursor.values(None),
            vec![Value::Integer(1), Value::from("alice")]
        );
        assert_eq!(
            cursor.values(Some("id")),
            vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]
        );
        assert_eq!(
            cursor.values(Some("memo")),
            vec![Value::Null, Value::Null, Value::Null]
        );
    }

    #[test]
    fn iteration_leaves_cursor_in_place() {
        let mut cursor = users();
        cursor.advance();
        let ids: Vec<_> = cursor.iter().map(|row| row.get("id").cloned()).collect();
        assert_eq!(ids.len(), 3);
        assert_eq!(cursor.iter().len(), 3);
        assert_eq!(cursor.position(), Some(0));

        let names: Vec<_> = (&cursor).into_iter().filter_map(|row| row.get("name")).collect();
        assert_eq!(names.len(), 3);
        assert_eq!(cursor.position(), Some(0));
    }

    #[test]
    fn clone_starts_before_first_and_shares_rows() {
        let mut cursor = users();
        cursor.advance();
        cursor.advance();
        let mut clone = cursor.clone();
        assert_eq!(clone.position(), None);
        assert_eq!(clone.rows(), cursor.rows());
        assert!(clone.advance());
        assert_eq!(cursor.position(), Some(1));

        let owned: Vec<Row> = cursor.into_iter().collect();
        assert_eq!(owned.len(), 3);
    }

    #[test]
    fn row_keys_are_unique() {
        let row = Row::new()
            .with_value("a", 1)
            .with_value("b", 2)
            .with_value("a", 3);
        assert_eq!(row.len(), 2);
        assert_eq!(row.columns(), vec!["a", "b"]);
        assert_eq!(row.get("a"), Some(&Value::Integer(3)));

        let collected: Row = vec![
            ("a".to_string(), Value::Integer(1)),
            ("a".to_string(), Value::Integer(2)),
        ]
        .into_iter()
        .collect();
        assert_eq!(collected.len(), 1);
        assert_eq!(collected.iter().next(), Some(("a", &Value::Integer(2))));
        assert!(Row::new().is_empty());
    }
}

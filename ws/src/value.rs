//! SQL parameter and result values
//!
//! `SqlValue` is the single value type crossing the store boundary, so the
//! core never touches rusqlite types directly.

use eyre::{Result, eyre};
use rusqlite::ToSql;
use rusqlite::types::{ToSqlOutput, Value as RusqliteValue, ValueRef};

/// A value bound to a `?n` placeholder or read from a result column
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl SqlValue {
    /// Build from a rusqlite value reference (result columns)
    pub(crate) fn from_ref(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Self::Null,
            ValueRef::Integer(i) => Self::Integer(i),
            ValueRef::Real(f) => Self::Real(f),
            ValueRef::Text(t) => Self::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Self::Blob(b.to_vec()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        let value = match self {
            Self::Null => RusqliteValue::Null,
            Self::Integer(i) => RusqliteValue::Integer(*i),
            Self::Real(f) => RusqliteValue::Real(*f),
            Self::Text(t) => RusqliteValue::Text(t.clone()),
            Self::Blob(b) => RusqliteValue::Blob(b.clone()),
        };
        Ok(ToSqlOutput::Owned(value))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        Self::Integer(v as i64)
    }
}

impl From<u32> for SqlValue {
    fn from(v: u32) -> Self {
        Self::Integer(v as i64)
    }
}

impl From<usize> for SqlValue {
    fn from(v: usize) -> Self {
        Self::Integer(v as i64)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        Self::Real(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Integer(v as i64)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(inner) => inner.into(),
            None => Self::Null,
        }
    }
}

/// A single result row with by-name column access
#[derive(Debug, Clone)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl Row {
    pub(crate) fn new(columns: Vec<String>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    /// Raw value by column name
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    fn required(&self, column: &str) -> Result<&SqlValue> {
        self.get(column)
            .ok_or_else(|| eyre!("No such column: {}", column))
    }

    /// Non-null text column
    pub fn text(&self, column: &str) -> Result<String> {
        match self.required(column)? {
            SqlValue::Text(t) => Ok(t.clone()),
            other => Err(eyre!("Column {} is not text: {:?}", column, other)),
        }
    }

    /// Nullable text column
    pub fn opt_text(&self, column: &str) -> Result<Option<String>> {
        match self.required(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(t) => Ok(Some(t.clone())),
            other => Err(eyre!("Column {} is not text: {:?}", column, other)),
        }
    }

    /// Non-null integer column
    pub fn integer(&self, column: &str) -> Result<i64> {
        match self.required(column)? {
            SqlValue::Integer(i) => Ok(*i),
            other => Err(eyre!("Column {} is not an integer: {:?}", column, other)),
        }
    }

    /// Nullable integer column
    pub fn opt_integer(&self, column: &str) -> Result<Option<i64>> {
        match self.required(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Integer(i) => Ok(Some(*i)),
            other => Err(eyre!("Column {} is not an integer: {:?}", column, other)),
        }
    }

    /// Non-null real column (integers widen)
    pub fn real(&self, column: &str) -> Result<f64> {
        match self.required(column)? {
            SqlValue::Real(f) => Ok(*f),
            SqlValue::Integer(i) => Ok(*i as f64),
            other => Err(eyre!("Column {} is not a real: {:?}", column, other)),
        }
    }

    /// Nullable real column
    pub fn opt_real(&self, column: &str) -> Result<Option<f64>> {
        match self.required(column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Real(f) => Ok(Some(*f)),
            SqlValue::Integer(i) => Ok(Some(*i as f64)),
            other => Err(eyre!("Column {} is not a real: {:?}", column, other)),
        }
    }

    /// Integer column interpreted as a boolean (0/1)
    pub fn boolean(&self, column: &str) -> Result<bool> {
        Ok(self.integer(column)? != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> Row {
        Row::new(
            vec![
                "id".to_string(),
                "count".to_string(),
                "score".to_string(),
                "note".to_string(),
            ],
            vec![
                SqlValue::Text("task-1".to_string()),
                SqlValue::Integer(3),
                SqlValue::Real(0.75),
                SqlValue::Null,
            ],
        )
    }

    #[test]
    fn test_row_text_access() {
        let row = sample_row();
        assert_eq!(row.text("id").unwrap(), "task-1");
        assert!(row.text("count").is_err());
        assert!(row.text("missing").is_err());
    }

    #[test]
    fn test_row_nullable_access() {
        let row = sample_row();
        assert_eq!(row.opt_text("note").unwrap(), None);
        assert_eq!(row.opt_text("id").unwrap(), Some("task-1".to_string()));
        assert_eq!(row.opt_integer("note").unwrap(), None);
    }

    #[test]
    fn test_row_numeric_access() {
        let row = sample_row();
        assert_eq!(row.integer("count").unwrap(), 3);
        assert_eq!(row.real("score").unwrap(), 0.75);
        // Integers widen to real
        assert_eq!(row.real("count").unwrap(), 3.0);
        assert!(row.boolean("count").unwrap());
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(SqlValue::from(42i64), SqlValue::Integer(42));
        assert_eq!(SqlValue::from(true), SqlValue::Integer(1));
        assert_eq!(SqlValue::from("x"), SqlValue::Text("x".to_string()));
        assert_eq!(SqlValue::from(None::<i64>), SqlValue::Null);
        assert_eq!(SqlValue::from(Some("y")), SqlValue::Text("y".to_string()));
    }
}

//! Persistence collaborator interface.
//!
//! # Data Flow
//! ```text
//! Controller / handler
//!     → in_transaction(db, options, work)      (transaction.rs)
//!         → Database::begin(isolation)
//!         → work(db): execute_sql / query / get_row / get_page (page.rs)
//!         → commit on Ok, rollback on Err or read-only
//! ```
//!
//! The core never calls the database itself; only handlers do. Backends
//! implement [`Database`] and get `get_row`, `get_rows` and `get_page` for free.

pub mod page;
pub mod transaction;

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde_json::Value;

pub use page::{Page, PageRequest, Sort, SortDirection};
pub use transaction::{in_transaction, IsolationLevel, TransactionOptions};

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("query failed: {0}")]
    Query(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("invalid page request: {0}")]
    InvalidPage(String),

    #[error("column '{column}' could not be read: {reason}")]
    Column { column: String, reason: String },
}

/// One result row, column name → value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.columns.insert(column.into(), value.into());
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(Value::as_str)
    }

    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(Value::as_i64)
    }

    pub fn get_bool(&self, column: &str) -> Option<bool> {
        match self.get(column)? {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_i64().map(|n| n != 0),
            _ => None,
        }
    }

    /// Deserialize a column into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, column: &str) -> Result<T, PersistenceError> {
        let value = self.get(column).cloned().unwrap_or(Value::Null);
        serde_json::from_value(value).map_err(|e| PersistenceError::Column {
            column: column.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A SQL backend.
pub trait Database: Send + Sync {
    /// Run a statement, returning the number of affected rows.
    fn execute_sql(&self, sql: &str, args: &[Value]) -> Result<u64, PersistenceError>;

    fn query(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>, PersistenceError>;

    fn begin(&self, isolation: IsolationLevel) -> Result<(), PersistenceError>;

    fn commit(&self) -> Result<(), PersistenceError>;

    fn rollback(&self) -> Result<(), PersistenceError>;

    /// First row of the result, if any.
    fn get_row(&self, sql: &str, args: &[Value]) -> Result<Option<Row>, PersistenceError> {
        Ok(self.query(sql, args)?.into_iter().next())
    }

    fn get_rows(&self, sql: &str, args: &[Value]) -> Result<Vec<Row>, PersistenceError> {
        self.query(sql, args)
    }

    /// One page of `sql`, with the total taken from a count query.
    fn get_page(&self, sql: &str, request: &PageRequest, args: &[Value]) -> Result<Page<Row>, PersistenceError> {
        let count_sql = page::count_sql(sql);
        let total = self
            .get_row(&count_sql, args)?
            .and_then(|row| row.get_i64("total"))
            .unwrap_or(0)
            .max(0) as u64;

        if total == 0 {
            return Ok(Page::empty(request.clone()));
        }

        let mut paged_args = args.to_vec();
        paged_args.push(Value::from(request.size()));
        paged_args.push(Value::from(request.offset()));
        let rows = self.query(&page::paged_sql(sql, request), &paged_args)?;
        Ok(Page::new(rows, request.clone(), total))
    }
}


#[cfg(test)]
mod tests {
    use super::testing::MockDb;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_row_getters() {
        let row = Row::new()
            .with("id", 7)
            .with("name", "ana")
            .with("active", 1)
            .with("tags", json!(["a", "b"]));
        assert_eq!(row.get_i64("id"), Some(7));
        assert_eq!(row.get_str("name"), Some("ana"));
        assert_eq!(row.get_bool("active"), Some(true));
        assert_eq!(row.get_as::<Vec<String>>("tags").unwrap(), vec!["a", "b"]);
        assert!(row.get_as::<u8>("name").is_err());
    }

    #[test]
    fn test_get_page_counts_then_limits() {
        let db = MockDb {
            total: 45,
            rows: vec![Row::new().with("id", 21)],
            ..Default::default()
        };
        let request = PageRequest::new(2, 10).unwrap().sorted_by("id", SortDirection::Desc).unwrap();
        let page = db.get_page("SELECT * FROM USER", &request, &[]).unwrap();

        assert_eq!(page.total_elements(), 45);
        assert_eq!(page.total_pages(), 5);
        let calls = db.calls();
        assert!(calls[0].starts_with("query SELECT COUNT(*) AS total FROM (SELECT * FROM USER)"));
        assert!(calls[1].contains("ORDER BY id DESC LIMIT ? OFFSET ?"));
        assert!(calls[1].ends_with("[Number(10), Number(20)]"));
    }

    #[test]
    fn test_get_page_empty_skips_query() {
        let db = MockDb::default();
        let page = db.get_page("SELECT * FROM ROLE", &PageRequest::new(0, 5).unwrap(), &[]).unwrap();
        assert!(page.is_empty());
        assert_eq!(db.calls().len(), 1);
    }
}

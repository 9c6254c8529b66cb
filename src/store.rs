use serde_json::{Map, Value};

use crate::error::ScriptResult;

/// Rows returned by a single statement, each keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    /// Column names in statement order, known even when no row matched.
    pub columns: Vec<String>,
    /// `None` when the statement produced no result set (DDL, plain DML).
    pub rows: Option<Vec<Map<String, Value>>>,
}

impl ResultSet {
    pub fn with_rows(columns: Vec<String>, rows: Vec<Map<String, Value>>) -> Self {
        Self {
            columns,
            rows: Some(rows),
        }
    }
}

/// Database handle handed to script functions at invocation time.
#[allow(async_fn_in_trait)]
pub trait Store {
    async fn run(&self, statement: &str) -> ScriptResult<ResultSet>;

    async fn use_keyspace(&self, keyspace: &str) -> ScriptResult<()>;
}

//! Lindorm wide-table SQL access over the MySQL wire protocol.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlRow};
use sqlx::{Column, Connection, Executor, Row};
use std::sync::Arc;
use tokio::sync::Mutex;

const SELECT_REQUIRED: &str = "Query should start with SELECT. Example: SELECT * FROM table ";

const INEFFICIENT_QUERY_HINT: &str = "Your query was identified as inefficient. \
Please add /*+ _l_allow_filtering_ */ hint after the SELECT keyword.\n\
Example: SELECT /*+ _l_allow_filtering_ */ * FROM table\n\
Instead of: SELECT * FROM table";

const JOIN_UNION_HINT: &str = "JOIN UNION is not allowed. Please execute \
'ALTER SYSTEM SET `lindorm.sql.join_union.disabled`=FALSE' to enable join.";

/// Column names plus stringified rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOutput {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl QueryOutput {
    /// Header line followed by one `,`-joined line per row.
    pub fn to_text(&self) -> String {
        std::iter::once(self.columns.join(","))
            .chain(self.rows.iter().map(|row| row.join(",")))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Runs one SQL statement and materializes the result.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn query(&self, sql: &str) -> Result<QueryOutput>;

    /// Release the underlying connection.
    async fn close(&self) {}
}

/// Owns a single MySQL-protocol connection.
///
/// The connection is opened lazily and dropped after a connection-level
/// failure; the next statement reconnects. Statements are never retried.
pub struct MySqlExecutor {
    host: String,
    port: u16,
    options: MySqlConnectOptions,
    conn: Mutex<Option<MySqlConnection>>,
}

impl MySqlExecutor {
    pub fn new(host: &str, port: u16, username: &str, password: &str, database: &str) -> Self {
        let options = MySqlConnectOptions::new()
            .host(host)
            .port(port)
            .username(username)
            .password(password)
            .database(database)
            // Lindorm rejects the sql_mode changes sqlx issues by default.
            .pipes_as_concat(false)
            .no_engine_substitution(false);

        Self {
            host: host.to_string(),
            port,
            options,
            conn: Mutex::new(None),
        }
    }

    /// Open the connection now instead of on first use.
    pub async fn connect(&self) -> Result<()> {
        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            *guard = Some(self.open().await?);
        }
        Ok(())
    }

    async fn open(&self) -> Result<MySqlConnection> {
        let conn = MySqlConnection::connect_with(&self.options).await?;
        tracing::info!(
            host = %self.host,
            port = self.port,
            "SQL connection established"
        );
        Ok(conn)
    }
}

#[async_trait]
impl SqlExecutor for MySqlExecutor {
    async fn query(&self, sql: &str) -> Result<QueryOutput> {
        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            *guard = Some(self.open().await?);
        }
        let Some(conn) = guard.as_mut() else {
            return Err(AppError::SqlError("SQL connection unavailable".to_string()));
        };

        let start = std::time::Instant::now();
        match fetch(conn, sql).await {
            Ok(output) => {
                tracing::debug!(
                    rows = output.rows.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "SQL statement completed"
                );
                Ok(output)
            }
            Err(e) => {
                if is_connection_error(&e) {
                    tracing::warn!(error = %e, "SQL connection lost, will reconnect on next call");
                    *guard = None;
                }
                Err(e.into())
            }
        }
    }

    async fn close(&self) {
        if let Some(conn) = self.conn.lock().await.take() {
            match conn.close().await {
                Ok(()) => tracing::info!("SQL connection closed"),
                Err(e) => tracing::warn!(error = %e, "Error closing SQL connection"),
            }
        }
    }
}

async fn fetch(conn: &mut MySqlConnection, sql: &str) -> sqlx::Result<QueryOutput> {
    let rows: Vec<MySqlRow> = (&mut *conn).fetch_all(sql).await?;

    let columns: Vec<String> = match rows.first() {
        Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
        // No rows to read names from; ask the server to describe the statement.
        None => match (&mut *conn).describe(sql).await {
            Ok(described) => described
                .columns()
                .iter()
                .map(|c| c.name().to_string())
                .collect(),
            Err(_) => Vec::new(),
        },
    };

    let rows = rows
        .iter()
        .map(|row| (0..row.len()).map(|i| render_value(row, i)).collect())
        .collect();

    Ok(QueryOutput { columns, rows })
}

/// Text for one cell; `NULL` for SQL NULL.
fn render_value(row: &MySqlRow, index: usize) -> String {
    fn or_null<T: ToString>(value: Option<T>) -> String {
        value.map_or_else(|| "NULL".to_string(), |v| v.to_string())
    }

    if let Ok(v) = row.try_get::<Option<String>, _>(index) {
        return or_null(v);
    }
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return or_null(v);
    }
    if let Ok(v) = row.try_get::<Option<u64>, _>(index) {
        return or_null(v);
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return or_null(v);
    }
    match row.try_get_unchecked::<Option<Vec<u8>>, _>(index) {
        Ok(v) => or_null(v.map(|bytes| String::from_utf8_lossy(&bytes).into_owned())),
        Err(_) => "?".to_string(),
    }
}

fn is_connection_error(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::WorkerCrashed
    )
}

/// Guidance for statements that must not reach the server.
pub fn select_guard(query: &str) -> Option<&'static str> {
    if query.trim().to_uppercase().starts_with("SELECT") {
        None
    } else {
        Some(SELECT_REQUIRED)
    }
}

/// Rewrite well-known server rejections into instructions for the agent.
fn explain_query_error(message: &str) -> String {
    if message.contains("Detect inefficient query") {
        INEFFICIENT_QUERY_HINT.to_string()
    } else if message.contains("JOIN is not allowed") || message.contains("UNION is not allowed") {
        JOIN_UNION_HINT.to_string()
    } else {
        format!("Error executing query: {}", message)
    }
}

fn error_message(err: &AppError) -> String {
    match err {
        AppError::SqlError(msg) => msg.clone(),
        other => other.to_string(),
    }
}

/// SQL operations as the tools see them. Failures come back as text.
pub struct WideTableClient {
    executor: Arc<dyn SqlExecutor>,
    database: String,
}

impl WideTableClient {
    pub fn new(executor: Arc<dyn SqlExecutor>, database: impl Into<String>) -> Self {
        Self {
            executor,
            database: database.into(),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// `Tables_in_<database>` header, then one table name per line.
    pub async fn show_tables(&self) -> String {
        match self.executor.query("SHOW TABLES").await {
            Ok(output) => {
                let mut lines = vec![format!("Tables_in_{}", self.database)];
                lines.extend(
                    output
                        .rows
                        .into_iter()
                        .filter_map(|row| row.into_iter().next()),
                );
                lines.join("\n")
            }
            Err(e) => format!("Error executing SHOW TABLES: {}", error_message(&e)),
        }
    }

    pub async fn describe_table(&self, table_name: &str) -> String {
        // Backtick-quoted names may contain spaces; a `;` would end the statement.
        if table_name.trim().is_empty() || table_name.contains(';') {
            return format!(
                "Error executing DESCRIBE TABLE {}: invalid table name",
                table_name
            );
        }

        match self
            .executor
            .query(&format!("DESCRIBE TABLE {}", table_name))
            .await
        {
            Ok(output) => output.to_text(),
            Err(e) => format!(
                "Error executing DESCRIBE TABLE {}: {}",
                table_name,
                error_message(&e)
            ),
        }
    }

    /// Run a read-only statement. Anything that is not a SELECT is answered
    /// with guidance and never sent to the server.
    pub async fn execute_query(&self, query: &str) -> String {
        if let Some(guidance) = select_guard(query) {
            tracing::warn!(query, "Rejected non-SELECT statement");
            return guidance.to_string();
        }

        match self.executor.query(query).await {
            Ok(output) => output.to_text(),
            Err(e) => explain_query_error(&error_message(&e)),
        }
    }

    pub async fn close(&self) {
        self.executor.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct FakeExecutor {
        result: std::result::Result<QueryOutput, String>,
        statements: StdMutex<Vec<String>>,
    }

    impl FakeExecutor {
        fn ok(columns: &[&str], rows: &[&[&str]]) -> Self {
            Self {
                result: Ok(QueryOutput {
                    columns: columns.iter().map(|c| c.to_string()).collect(),
                    rows: rows
                        .iter()
                        .map(|r| r.iter().map(|v| v.to_string()).collect())
                        .collect(),
                }),
                statements: StdMutex::new(Vec::new()),
            }
        }

        fn failing(message: &str) -> Self {
            Self {
                result: Err(message.to_string()),
                statements: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SqlExecutor for FakeExecutor {
        async fn query(&self, sql: &str) -> Result<QueryOutput> {
            self.statements.lock().unwrap().push(sql.to_string());
            self.result.clone().map_err(AppError::SqlError)
        }
    }

    #[test]
    fn test_select_guard() {
        assert!(select_guard("SELECT * FROM t").is_none());
        assert!(select_guard("  select id from t ").is_none());
        assert_eq!(select_guard("DELETE FROM t"), Some(SELECT_REQUIRED));
        assert!(select_guard("").is_some());
    }

    #[tokio::test]
    async fn test_non_select_never_reaches_executor() {
        let executor = Arc::new(FakeExecutor::ok(&["a"], &[]));
        let client = WideTableClient::new(executor.clone(), "default");

        let out = client.execute_query("DELETE FROM t").await;

        assert!(out.starts_with("Query should start with SELECT"));
        assert!(executor.statements.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_execute_query_renders_rows() {
        let executor = Arc::new(FakeExecutor::ok(&["id", "name"], &[&["1", "a"], &["2", "NULL"]]));
        let client = WideTableClient::new(executor, "default");

        let out = client.execute_query("select id, name from t").await;

        assert_eq!(out, "id,name\n1,a\n2,NULL");
    }

    #[tokio::test]
    async fn test_inefficient_query_hint() {
        let executor = Arc::new(FakeExecutor::failing(
            "Detect inefficient query: SELECT * FROM t",
        ));
        let client = WideTableClient::new(executor, "default");

        let out = client.execute_query("SELECT * FROM t").await;

        assert!(out.starts_with("Your query was identified as inefficient."));
        assert!(out.contains("/*+ _l_allow_filtering_ */"));
    }

    #[tokio::test]
    async fn test_join_union_hint() {
        for message in ["JOIN is not allowed here", "UNION is not allowed"] {
            let client = WideTableClient::new(Arc::new(FakeExecutor::failing(message)), "default");

            let out = client.execute_query("SELECT * FROM a JOIN b").await;

            assert!(out.starts_with("JOIN UNION is not allowed."), "{out}");
        }
    }

    #[tokio::test]
    async fn test_other_errors_are_reported() {
        let client = WideTableClient::new(
            Arc::new(FakeExecutor::failing("Table 't' doesn't exist")),
            "default",
        );

        assert_eq!(
            client.execute_query("SELECT * FROM t").await,
            "Error executing query: Table 't' doesn't exist"
        );
        assert_eq!(
            client.show_tables().await,
            "Error executing SHOW TABLES: Table 't' doesn't exist"
        );
        assert_eq!(
            client.describe_table("t").await,
            "Error executing DESCRIBE TABLE t: Table 't' doesn't exist"
        );
    }

    #[tokio::test]
    async fn test_show_tables_uses_database_header() {
        let executor = Arc::new(FakeExecutor::ok(
            &["Tables_in_ignored"],
            &[&["orders"], &["users"]],
        ));
        let client = WideTableClient::new(executor.clone(), "shop");

        assert_eq!(client.show_tables().await, "Tables_in_shop\norders\nusers");
        assert_eq!(executor.statements.lock().unwrap()[0], "SHOW TABLES");
    }

    #[tokio::test]
    async fn test_describe_table() {
        let executor = Arc::new(FakeExecutor::ok(
            &["TABLE_NAME", "COLUMN_NAME", "TYPE"],
            &[&["t", "id", "INT"], &["t", "v", "VARCHAR"]],
        ));
        let client = WideTableClient::new(executor.clone(), "default");

        let out = client.describe_table("t").await;

        assert_eq!(out, "TABLE_NAME,COLUMN_NAME,TYPE\nt,id,INT\nt,v,VARCHAR");
        assert_eq!(executor.statements.lock().unwrap()[0], "DESCRIBE TABLE t");
    }

    #[tokio::test]
    async fn test_describe_table_rejects_statement_injection() {
        let executor = Arc::new(FakeExecutor::ok(&["a"], &[]));
        let client = WideTableClient::new(executor.clone(), "default");

        let out = client.describe_table("t; DROP TABLE t").await;

        assert!(out.ends_with("invalid table name"));
        assert!(executor.statements.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_describe_table_accepts_quoted_name_with_space() {
        let executor = Arc::new(FakeExecutor::ok(&["COLUMN_NAME"], &[&["id"]]));
        let client = WideTableClient::new(executor.clone(), "default");

        let out = client.describe_table("`my table`").await;

        assert_eq!(out, "COLUMN_NAME\nid");
        assert_eq!(
            executor.statements.lock().unwrap()[0],
            "DESCRIBE TABLE `my table`"
        );
    }

    #[tokio::test]
    async fn test_describe_table_rejects_blank_name() {
        let executor = Arc::new(FakeExecutor::ok(&["a"], &[]));
        let client = WideTableClient::new(executor.clone(), "default");

        assert!(client.describe_table("   ").await.ends_with("invalid table name"));
        assert!(executor.statements.lock().unwrap().is_empty());
    }

    #[test]
    fn test_query_output_text_without_rows() {
        let output = QueryOutput {
            columns: vec!["a".into(), "b".into()],
            rows: vec![],
        };

        assert_eq!(output.to_text(), "a,b");
    }
}

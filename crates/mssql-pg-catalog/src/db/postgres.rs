//! PostgreSQL target: pooled connections and transactional sessions.

use super::{Batch, SqlValue, TargetDatabase, TargetSession};
use crate::config::TargetConfig;
use crate::error::{MigrateError, Result};
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use futures::SinkExt;
use tokio_postgres::{Config as PgConfig, NoTls};
use tracing::{debug, info, warn};

/// Rows per COPY buffer flush.
const COPY_CHUNK_ROWS: usize = 10_000;

/// Build a deadpool pool for a PostgreSQL endpoint.
pub(crate) fn build_pool(
    host: &str,
    port: u16,
    database: &str,
    user: &str,
    password: &str,
    max_size: usize,
    context: &str,
) -> Result<Pool> {
    let mut pg_config = PgConfig::new();
    pg_config.host(host);
    pg_config.port(port);
    pg_config.dbname(database);
    pg_config.user(user);
    pg_config.password(password);
    pg_config.application_name("mssql-pg-catalog");

    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };

    let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
    Pool::builder(mgr)
        .max_size(max_size)
        .build()
        .map_err(|e| MigrateError::pool(format!("Failed to create pool: {}", e), context))
}

/// PostgreSQL target database.
pub struct PgTarget {
    pool: Pool,
}

impl PgTarget {
    /// Connect to the target described by `config` and test the connection.
    pub async fn connect(config: &TargetConfig) -> Result<Self> {
        let pool = build_pool(
            &config.host,
            config.port,
            &config.database,
            &config.user,
            &config.password,
            config.max_connections as usize,
            "target",
        )?;
        let target = Self { pool };
        target.ping().await?;

        info!(
            "Connected to PostgreSQL: {}:{}/{}",
            config.host, config.port, config.database
        );
        Ok(target)
    }

    async fn client(&self) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e.to_string(), "target"))
    }
}

#[async_trait]
impl TargetDatabase for PgTarget {
    async fn begin(&self) -> Result<Box<dyn TargetSession>> {
        let client = self.client().await?;
        client.batch_execute("BEGIN").await?;
        Ok(Box::new(PgSession {
            client: Some(client),
        }))
    }

    async fn ping(&self) -> Result<()> {
        let client = self.client().await?;
        client.simple_query("SELECT 1").await?;
        Ok(())
    }
}

/// A pooled connection with an open transaction.
///
/// If the session is dropped while the transaction is still open, the
/// connection is detached from the pool and closed, which makes the server
/// roll the transaction back.
pub struct PgSession {
    client: Option<Object>,
}

impl PgSession {
    fn client(&self) -> Result<&Object> {
        self.client
            .as_ref()
            .ok_or_else(|| MigrateError::pool("session already finished", "target"))
    }

    async fn finish(mut self: Box<Self>, statement: &str) -> Result<()> {
        let client = self
            .client
            .take()
            .ok_or_else(|| MigrateError::pool("session already finished", "target"))?;
        match client.batch_execute(statement).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // connection state is unknown; never hand it back to the pool
                drop(Object::take(client));
                Err(MigrateError::Target(e))
            }
        }
    }
}

#[async_trait]
impl TargetSession for PgSession {
    async fn execute(&mut self, sql: &str) -> Result<u64> {
        let client = self.client()?;
        debug!("Executing: {}", sql);
        Ok(client.execute(sql, &[]).await?)
    }

    async fn row_count(&mut self, qualified_table: &str) -> Result<i64> {
        let client = self.client()?;
        let sql = format!("SELECT COUNT(*) FROM {}", qualified_table);
        let row = client.query_one(&sql, &[]).await?;
        Ok(row.try_get(0)?)
    }

    async fn copy_in(&mut self, qualified_table: &str, columns: &[String], rows: Batch) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let client = self.client()?;

        let copy_stmt = format!(
            "COPY {} ({}) FROM STDIN WITH (FORMAT text)",
            qualified_table,
            columns.join(", ")
        );

        let sink = client.copy_in::<_, Bytes>(copy_stmt.as_str()).await?;
        futures::pin_mut!(sink);

        let mut buf = BytesMut::with_capacity(1024 * 1024);
        let row_count = rows.len();

        for (i, row) in rows.into_iter().enumerate() {
            for (j, value) in row.iter().enumerate() {
                if j > 0 {
                    buf.put_u8(b'\t');
                }
                buf.extend_from_slice(sql_value_to_copy_text(value).as_bytes());
            }
            buf.put_u8(b'\n');

            if (i + 1) % COPY_CHUNK_ROWS == 0 || i + 1 == row_count {
                sink.send(buf.split().freeze())
                    .await
                    .map_err(|e| MigrateError::transfer(qualified_table, format!("COPY send failed: {}", e)))?;
            }
        }

        Ok(sink.finish().await?)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.finish("ROLLBACK").await
    }
}

impl Drop for PgSession {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            warn!("Target session dropped with an open transaction; closing connection");
            drop(Object::take(client));
        }
    }
}

/// Convert SqlValue to text format for COPY.
pub(crate) fn sql_value_to_copy_text(value: &SqlValue) -> String {
    match value {
        SqlValue::Null(_) => "\\N".to_string(),
        SqlValue::Bool(b) => if *b { "t" } else { "f" }.to_string(),
        SqlValue::I16(n) => n.to_string(),
        SqlValue::I32(n) => n.to_string(),
        SqlValue::I64(n) => n.to_string(),
        SqlValue::F32(n) => n.to_string(),
        SqlValue::F64(n) => n.to_string(),
        SqlValue::String(s) => escape_copy_text(s),
        SqlValue::Bytes(b) => format!("\\\\x{}", hex::encode(b)),
        SqlValue::Uuid(u) => u.to_string(),
        SqlValue::Decimal(d) => d.to_string(),
        SqlValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        SqlValue::DateTimeOffset(dt) => dt.to_rfc3339(),
        SqlValue::Date(d) => d.to_string(),
        SqlValue::Time(t) => t.to_string(),
    }
}

/// Escape special characters for COPY text format.
fn escape_copy_text(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '\t' => result.push_str("\\t"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            _ => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqlNullType;
    use chrono::NaiveDate;

    #[test]
    fn test_copy_text_escapes_control_characters() {
        let value = SqlValue::String("a\tb\nc\\d\re".into());
        assert_eq!(sql_value_to_copy_text(&value), "a\\tb\\nc\\\\d\\re");
    }

    #[test]
    fn test_copy_text_null_and_bool() {
        assert_eq!(sql_value_to_copy_text(&SqlValue::Null(SqlNullType::I32)), "\\N");
        assert_eq!(sql_value_to_copy_text(&SqlValue::Bool(true)), "t");
        assert_eq!(sql_value_to_copy_text(&SqlValue::Bool(false)), "f");
    }

    #[test]
    fn test_copy_text_bytes_are_hex_escaped() {
        let value = SqlValue::Bytes(vec![0xde, 0xad, 0x01]);
        assert_eq!(sql_value_to_copy_text(&value), "\\\\xdead01");
    }

    #[test]
    fn test_copy_text_temporal_values() {
        let dt = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_micro_opt(12, 30, 0, 250)
            .unwrap();
        assert_eq!(
            sql_value_to_copy_text(&SqlValue::DateTime(dt)),
            "2024-03-01 12:30:00.000250"
        );
        assert_eq!(
            sql_value_to_copy_text(&SqlValue::Date(dt.date())),
            "2024-03-01"
        );
    }
}

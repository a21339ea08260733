//! SQL Server source over tiberius with a bb8 pool.

use super::{Batch, SourceDatabase, SqlNullType, SqlValue, TransferColumn};
use crate::config::SourceConfig;
use crate::error::{MigrateError, Result};
use crate::identifier::{qualify_mssql, quote_mssql};
use async_trait::async_trait;
use bb8::Pool;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use futures::TryStreamExt;
use rust_decimal::Decimal;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, QueryItem, Row};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info};
use uuid::Uuid;

/// Connection manager for bb8 pool with tiberius.
#[derive(Clone)]
struct TiberiusConnectionManager {
    config: SourceConfig,
}

impl TiberiusConnectionManager {
    fn new(config: SourceConfig) -> Self {
        Self { config }
    }

    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.port);
        config.database(&self.config.database);
        config.authentication(AuthMethod::sql_server(&self.config.user, &self.config.password));

        if self.config.encrypt {
            if self.config.trust_server_cert {
                config.trust_cert();
            }
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }

        config
    }
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = Client<Compat<TcpStream>>;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let config = self.build_config();
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| tiberius::error::Error::Io {
                kind: e.kind(),
                message: e.to_string(),
            })?;

        tcp.set_nodelay(true).ok();

        Client::connect(config, tcp.compat_write()).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// SQL Server source database.
pub struct MssqlSource {
    pool: Pool<TiberiusConnectionManager>,
}

impl MssqlSource {
    /// Create the pool and test one connection.
    pub async fn connect(config: &SourceConfig) -> Result<Self> {
        let manager = TiberiusConnectionManager::new(config.clone());
        let pool = Pool::builder()
            .max_size(config.max_connections)
            .build(manager)
            .await
            .map_err(|e| MigrateError::pool(format!("Failed to create MSSQL pool: {}", e), "source"))?;

        let source = Self { pool };
        source.ping().await?;

        info!(
            "Connected to MSSQL: {}:{}/{} (pool_size={})",
            config.host, config.port, config.database, config.max_connections
        );
        Ok(source)
    }
}

#[async_trait]
impl SourceDatabase for MssqlSource {
    async fn row_count(&self, schema: &str, table: &str) -> Result<i64> {
        let mut client = self
            .pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e.to_string(), "source"))?;

        let query = format!("SELECT COUNT_BIG(*) FROM {}", qualify_mssql(schema, table));
        let row = client.simple_query(&query).await?.into_row().await?;

        Ok(match row {
            Some(r) => r.try_get::<i64, _>(0)?.unwrap_or(0),
            None => 0,
        })
    }

    async fn stream_rows(
        &self,
        schema: &str,
        table: &str,
        columns: &[TransferColumn],
        batch_size: usize,
        buffer: usize,
    ) -> Result<mpsc::Receiver<Result<Batch>>> {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        let sql = select_sql(schema, table, columns);
        let types: Vec<String> = columns.iter().map(|c| c.source_data_type.clone()).collect();
        let pool = self.pool.clone();
        let batch_size = batch_size.max(1);

        debug!("Streaming source rows: {}", sql);
        tokio::spawn(async move {
            if let Err(e) = read_batches(pool, &sql, &types, batch_size, &tx).await {
                let _ = tx.send(Err(e)).await;
            }
        });

        Ok(rx)
    }

    async fn ping(&self) -> Result<()> {
        let mut client = self
            .pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e.to_string(), "source"))?;
        client.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }
}

fn select_sql(schema: &str, table: &str, columns: &[TransferColumn]) -> String {
    let column_list = columns
        .iter()
        .map(|c| quote_mssql(&c.source_name))
        .collect::<Vec<_>>()
        .join(", ");
    format!("SELECT {} FROM {}", column_list, qualify_mssql(schema, table))
}

async fn read_batches(
    pool: Pool<TiberiusConnectionManager>,
    sql: &str,
    types: &[String],
    batch_size: usize,
    tx: &mpsc::Sender<Result<Batch>>,
) -> Result<()> {
    let mut conn = pool
        .get_owned()
        .await
        .map_err(|e| MigrateError::pool(e.to_string(), "source"))?;

    let mut stream = conn.simple_query(sql).await?;
    let mut batch = Vec::with_capacity(batch_size);

    while let Some(item) = stream.try_next().await? {
        let QueryItem::Row(row) = item else {
            continue;
        };
        batch.push(convert_row(&row, types)?);

        if batch.len() >= batch_size {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
            if tx.send(Ok(full)).await.is_err() {
                // receiver gone, the transfer was abandoned
                return Ok(());
            }
        }
    }

    if !batch.is_empty() {
        let _ = tx.send(Ok(batch)).await;
    }
    Ok(())
}

fn convert_row(row: &Row, types: &[String]) -> Result<Vec<SqlValue>> {
    types
        .iter()
        .enumerate()
        .map(|(idx, data_type)| convert_row_value(row, idx, data_type))
        .collect()
}

/// Convert a row value to SqlValue based on the column type.
fn convert_row_value(row: &Row, idx: usize, data_type: &str) -> Result<SqlValue> {
    let dt = data_type.trim().to_lowercase();

    let value = match dt.as_str() {
        "bit" => row
            .try_get::<bool, _>(idx)?
            .map(SqlValue::Bool)
            .unwrap_or(SqlValue::Null(SqlNullType::Bool)),
        "tinyint" => row
            .try_get::<u8, _>(idx)?
            .map(|v| SqlValue::I16(v as i16))
            .unwrap_or(SqlValue::Null(SqlNullType::I16)),
        "smallint" => row
            .try_get::<i16, _>(idx)?
            .map(SqlValue::I16)
            .unwrap_or(SqlValue::Null(SqlNullType::I16)),
        "int" => row
            .try_get::<i32, _>(idx)?
            .map(SqlValue::I32)
            .unwrap_or(SqlValue::Null(SqlNullType::I32)),
        "bigint" => row
            .try_get::<i64, _>(idx)?
            .map(SqlValue::I64)
            .unwrap_or(SqlValue::Null(SqlNullType::I64)),
        "real" => row
            .try_get::<f32, _>(idx)?
            .map(SqlValue::F32)
            .unwrap_or(SqlValue::Null(SqlNullType::F32)),
        "float" => row
            .try_get::<f64, _>(idx)?
            .map(SqlValue::F64)
            .unwrap_or(SqlValue::Null(SqlNullType::F64)),
        "uniqueidentifier" => row
            .try_get::<Uuid, _>(idx)?
            .map(SqlValue::Uuid)
            .unwrap_or(SqlValue::Null(SqlNullType::Uuid)),
        "datetime" | "datetime2" | "smalldatetime" => row
            .try_get::<NaiveDateTime, _>(idx)?
            .map(SqlValue::DateTime)
            .unwrap_or(SqlValue::Null(SqlNullType::DateTime)),
        "datetimeoffset" => row
            .try_get::<DateTime<FixedOffset>, _>(idx)?
            .map(SqlValue::DateTimeOffset)
            .unwrap_or(SqlValue::Null(SqlNullType::DateTimeOffset)),
        "date" => row
            .try_get::<NaiveDate, _>(idx)?
            .map(SqlValue::Date)
            .unwrap_or(SqlValue::Null(SqlNullType::Date)),
        "time" => row
            .try_get::<NaiveTime, _>(idx)?
            .map(SqlValue::Time)
            .unwrap_or(SqlValue::Null(SqlNullType::Time)),
        "binary" | "varbinary" | "image" | "rowversion" | "timestamp" => row
            .try_get::<&[u8], _>(idx)?
            .map(|v| SqlValue::Bytes(v.to_vec()))
            .unwrap_or(SqlValue::Null(SqlNullType::Bytes)),
        "decimal" | "numeric" | "money" | "smallmoney" => match row.try_get::<Decimal, _>(idx) {
            Ok(Some(d)) => SqlValue::Decimal(d),
            Ok(None) => SqlValue::Null(SqlNullType::Decimal),
            // money columns arrive as floats
            Err(_) => match row.try_get::<f64, _>(idx)? {
                Some(f) => Decimal::try_from(f)
                    .map(SqlValue::Decimal)
                    .unwrap_or(SqlValue::F64(f)),
                None => SqlValue::Null(SqlNullType::Decimal),
            },
        },
        // varchar, nvarchar, char, nchar, text, ntext, sysname and friends
        _ => row
            .try_get::<&str, _>(idx)?
            .map(|s| SqlValue::String(s.to_string()))
            .unwrap_or(SqlValue::Null(SqlNullType::String)),
    };

    Ok(value)
}

//! Source and target database collaborators.
//!
//! The migrator only talks to these traits. Concrete implementations:
//!
//! - [`MssqlSource`]: SQL Server via tiberius and a bb8 pool
//! - [`PgTarget`]: PostgreSQL via deadpool-postgres, one transaction per session
//! - [`CopyMover`]: streams source batches into `COPY ... FROM STDIN`

pub mod mover;
pub mod mssql;
pub mod postgres;

pub use mover::CopyMover;
pub use mssql::MssqlSource;
pub use postgres::{PgSession, PgTarget};

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

/// SQL value enum for type-safe row handling.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null(SqlNullType),
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    Decimal(rust_decimal::Decimal),
    DateTime(chrono::NaiveDateTime),
    DateTimeOffset(chrono::DateTime<chrono::FixedOffset>),
    Date(chrono::NaiveDate),
    Time(chrono::NaiveTime),
}

/// Type hint for NULL values to ensure correct PostgreSQL encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlNullType {
    Bool,
    I16,
    I32,
    I64,
    F32,
    F64,
    String,
    Bytes,
    Uuid,
    Decimal,
    DateTime,
    DateTimeOffset,
    Date,
    Time,
}

/// A batch of rows in transfer column order.
pub type Batch = Vec<Vec<SqlValue>>;

/// One column of a data transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferColumn {
    /// Column name in the source table.
    pub source_name: String,
    /// Resolved (quoted if needed) column name in the target table.
    pub target_name: String,
    /// Source data type, drives value conversion.
    pub source_data_type: String,
    pub is_identity: bool,
}

/// Everything a data mover needs to copy one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferRequest {
    pub source_schema: String,
    pub source_table: String,
    /// Resolved, schema-qualified target table.
    pub target_table: String,
    pub columns: Vec<TransferColumn>,
}

impl TransferRequest {
    /// Target column list in transfer order.
    pub fn target_columns(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.target_name.clone()).collect()
    }
}

/// Read access to the source database.
#[async_trait]
pub trait SourceDatabase: Send + Sync {
    /// Number of rows in a source table.
    async fn row_count(&self, schema: &str, table: &str) -> Result<i64>;

    /// Stream a table's rows in batches of `batch_size`.
    ///
    /// At most `buffer` batches are held between the reader and the caller.
    /// A read error is delivered as the last item of the channel.
    async fn stream_rows(
        &self,
        schema: &str,
        table: &str,
        columns: &[TransferColumn],
        batch_size: usize,
        buffer: usize,
    ) -> Result<mpsc::Receiver<Result<Batch>>>;

    /// Check connectivity.
    async fn ping(&self) -> Result<()>;
}

/// Write access to the target database.
#[async_trait]
pub trait TargetDatabase: Send + Sync {
    /// Open a session with a transaction already started.
    async fn begin(&self) -> Result<Box<dyn TargetSession>>;

    /// Check connectivity.
    async fn ping(&self) -> Result<()>;
}

/// One open target transaction.
///
/// Dropping a session without calling [`commit`](Self::commit) must not
/// leave any of its work visible.
#[async_trait]
pub trait TargetSession: Send {
    /// Execute one statement and return the affected row count.
    async fn execute(&mut self, sql: &str) -> Result<u64>;

    /// `SELECT COUNT(*)` of a qualified target table.
    async fn row_count(&mut self, qualified_table: &str) -> Result<i64>;

    /// Bulk load rows into a qualified target table.
    async fn copy_in(&mut self, qualified_table: &str, columns: &[String], rows: Batch) -> Result<u64>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}

/// Copies table rows from the source into an open target session.
#[async_trait]
pub trait DataMover: Send + Sync {
    async fn copy_rows(
        &self,
        request: &TransferRequest,
        source: &dyn SourceDatabase,
        session: &mut dyn TargetSession,
    ) -> Result<u64>;
}

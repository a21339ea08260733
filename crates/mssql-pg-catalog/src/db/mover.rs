//! Batch data mover over `COPY ... FROM STDIN`.

use super::{DataMover, SourceDatabase, TargetSession, TransferRequest};
use crate::config::TransferSettings;
use crate::error::{MigrateError, Result};
use async_trait::async_trait;
use std::time::Instant;
use tracing::{debug, info};

/// Streams source batches and writes each one with COPY.
///
/// Identity columns are created `GENERATED BY DEFAULT`, so COPY can supply
/// their historical values directly.
#[derive(Debug, Clone)]
pub struct CopyMover {
    batch_size: usize,
    read_ahead: usize,
}

impl CopyMover {
    pub fn new(batch_size: usize, read_ahead: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            read_ahead: read_ahead.max(1),
        }
    }

    pub fn from_settings(settings: &TransferSettings) -> Self {
        Self::new(settings.batch_size, settings.read_ahead_batches)
    }
}

impl Default for CopyMover {
    fn default() -> Self {
        Self::from_settings(&TransferSettings::default())
    }
}

#[async_trait]
impl DataMover for CopyMover {
    async fn copy_rows(
        &self,
        request: &TransferRequest,
        source: &dyn SourceDatabase,
        session: &mut dyn TargetSession,
    ) -> Result<u64> {
        if request.columns.is_empty() {
            return Err(MigrateError::transfer(
                &request.target_table,
                "no columns to transfer",
            ));
        }

        let started = Instant::now();
        let target_columns = request.target_columns();
        let mut rx = source
            .stream_rows(
                &request.source_schema,
                &request.source_table,
                &request.columns,
                self.batch_size,
                self.read_ahead,
            )
            .await?;

        let mut total = 0u64;
        let mut batches = 0usize;
        while let Some(batch) = rx.recv().await {
            let batch = batch?;
            let written = session
                .copy_in(&request.target_table, &target_columns, batch)
                .await?;
            total += written;
            batches += 1;
            debug!(
                "{}: batch {} written ({} rows, {} total)",
                request.target_table, batches, written, total
            );
        }

        info!(
            "{}: copied {} rows in {} batches ({:.1}s)",
            request.target_table,
            total,
            batches,
            started.elapsed().as_secs_f64()
        );
        Ok(total)
    }
}

//! # mssql-pg-catalog
//!
//! Catalog-driven MSSQL to PostgreSQL migration engine.
//!
//! A metadata catalog describes every source and target object and links
//! them through lineage ids. This library turns those rows into models,
//! renders PostgreSQL DDL from them and drives one table at a time through:
//!
//! - **Metadata load** of columns, indexes, constraints, sequences and triggers
//! - **Expression mapping** of computed columns, checks and defaults
//! - **DDL** for the base table, its indexes and constraints, and a wrapping
//!   view for computed columns
//! - **Data transfer** using PostgreSQL COPY
//! - **Status tracking** of `pending → in_progress → completed | failed`
//!
//! ## Example
//!
//! ```rust,no_run
//! use mssql_pg_catalog::{Config, TableMigrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("config.yaml")?;
//!     let migrator = TableMigrator::connect(&config).await?;
//!     let outcome = migrator.migrate("public", "accnt", false).await?;
//!     println!("Migrated {} rows", outcome.rows_migrated);
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod identifier;
pub mod mapping;
pub mod migrator;
pub mod model;
pub mod status;
pub mod typemap;

// Re-exports for convenient access
pub use catalog::{CatalogSnapshot, CatalogStore, MemoryCatalog, PgCatalog};
pub use config::{Config, MappingSettings, MigrationSettings, TransferSettings};
pub use db::{CopyMover, DataMover, MssqlSource, PgTarget, SourceDatabase, SqlValue, TargetDatabase};
pub use error::{MigrateError, Result};
pub use identifier::{needs_quoting, quoting_reasons, target_qualified_name};
pub use mapping::{FunctionMappingRule, FunctionMappingState, MappingOutcome, MappingStatus};
pub use migrator::{plan_table, reset_table, MigrationOutcome, TableMigrator};
pub use model::{TableModel, TablePlan, ViewModel};
pub use status::MigrationStatus;

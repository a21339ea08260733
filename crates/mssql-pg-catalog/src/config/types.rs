//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (MSSQL).
    pub source: SourceConfig,

    /// Target database configuration (PostgreSQL).
    pub target: TargetConfig,

    /// Metadata catalog connection (PostgreSQL).
    pub catalog: CatalogConfig,

    /// Per-table migration behaviour.
    #[serde(default)]
    pub migration: MigrationSettings,

    /// Function mapping and readiness thresholds.
    #[serde(default)]
    pub mapping: MappingSettings,

    /// Bulk data transfer settings.
    #[serde(default)]
    pub transfer: TransferSettings,
}

/// Source database (MSSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 1433).
    #[serde(default = "default_mssql_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password. Never serialized.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// Encrypt connection (default: true).
    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Trust server certificate (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,

    /// Maximum pooled connections (default: 4).
    #[serde(default = "default_pool_size")]
    pub max_connections: u32,
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Target database (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password. Never serialized.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// Maximum pooled connections (default: 4).
    #[serde(default = "default_pool_size")]
    pub max_connections: u32,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Metadata catalog (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password. Never serialized.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// Schema holding the catalog tables (default: "migration_catalog").
    #[serde(default = "default_catalog_schema")]
    pub schema: String,

    /// Maximum pooled connections (default: 4).
    #[serde(default = "default_pool_size")]
    pub max_connections: u32,
}

impl fmt::Debug for CatalogConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CatalogConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Migration behaviour for a single table run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationSettings {
    /// Create foreign keys with the table (default: true).
    #[serde(default = "default_true")]
    pub create_foreign_keys: bool,

    /// Create ported triggers after the view (default: true).
    #[serde(default = "default_true")]
    pub create_triggers: bool,

    /// Advance identity sequences to the migrated maximum (default: true).
    #[serde(default = "default_true")]
    pub reset_identity: bool,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            create_foreign_keys: true,
            create_triggers: true,
            reset_identity: true,
        }
    }
}

/// Function mapping thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingSettings {
    /// Minimum rule confidence (0-100) for an automatic rewrite (default: 80).
    #[serde(default = "default_min_confidence")]
    pub min_confidence: u8,

    /// Merge the built-in rules with catalog rules (default: true).
    #[serde(default = "default_true")]
    pub use_builtin_rules: bool,
}

impl Default for MappingSettings {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            use_builtin_rules: true,
        }
    }
}

/// Bulk data transfer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSettings {
    /// Rows per batch read from the source (default: 10000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Batches buffered between reader and writer (default: 4).
    #[serde(default = "default_read_ahead")]
    pub read_ahead_batches: usize,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            read_ahead_batches: default_read_ahead(),
        }
    }
}

// Default value functions for serde
fn default_mssql_port() -> u16 {
    1433
}

fn default_pg_port() -> u16 {
    5432
}

fn default_catalog_schema() -> String {
    "migration_catalog".to_string()
}

fn default_pool_size() -> u32 {
    4
}

fn default_min_confidence() -> u8 {
    80
}

fn default_batch_size() -> usize {
    10_000
}

fn default_read_ahead() -> usize {
    4
}

fn default_true() -> bool {
    true
}

//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};
use crate::identifier::validate_identifier;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Source validation
    if config.source.host.is_empty() {
        return Err(MigrateError::Config("source.host is required".into()));
    }
    if config.source.database.is_empty() {
        return Err(MigrateError::Config("source.database is required".into()));
    }
    if config.source.user.is_empty() {
        return Err(MigrateError::Config("source.user is required".into()));
    }

    // Target validation
    if config.target.host.is_empty() {
        return Err(MigrateError::Config("target.host is required".into()));
    }
    if config.target.database.is_empty() {
        return Err(MigrateError::Config("target.database is required".into()));
    }
    if config.target.user.is_empty() {
        return Err(MigrateError::Config("target.user is required".into()));
    }

    // Catalog validation
    if config.catalog.host.is_empty() {
        return Err(MigrateError::Config("catalog.host is required".into()));
    }
    if config.catalog.database.is_empty() {
        return Err(MigrateError::Config("catalog.database is required".into()));
    }
    validate_identifier(&config.catalog.schema)
        .map_err(|e| MigrateError::Config(format!("catalog.schema is invalid: {}", e)))?;

    for (name, size) in [
        ("source.max_connections", config.source.max_connections),
        ("target.max_connections", config.target.max_connections),
        ("catalog.max_connections", config.catalog.max_connections),
    ] {
        if size == 0 {
            return Err(MigrateError::Config(format!("{} must be at least 1", name)));
        }
    }

    if config.mapping.min_confidence > 100 {
        return Err(MigrateError::Config(format!(
            "mapping.min_confidence must be between 0 and 100, got {}",
            config.mapping.min_confidence
        )));
    }

    if config.transfer.batch_size == 0 {
        return Err(MigrateError::Config(
            "transfer.batch_size must be at least 1".into(),
        ));
    }
    if config.transfer.read_ahead_batches == 0 {
        return Err(MigrateError::Config(
            "transfer.read_ahead_batches must be at least 1".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        CatalogConfig, MappingSettings, MigrationSettings, SourceConfig, TargetConfig,
        TransferSettings,
    };

    fn valid_config() -> Config {
        Config {
            source: SourceConfig {
                host: "localhost".to_string(),
                port: 1433,
                database: "source_db".to_string(),
                user: "sa".to_string(),
                password: "password".to_string(),
                encrypt: false,
                trust_server_cert: true,
                max_connections: 4,
            },
            target: TargetConfig {
                host: "localhost".to_string(),
                port: 5432,
                database: "target_db".to_string(),
                user: "postgres".to_string(),
                password: "password".to_string(),
                max_connections: 4,
            },
            catalog: CatalogConfig {
                host: "localhost".to_string(),
                port: 5432,
                database: "target_db".to_string(),
                user: "postgres".to_string(),
                password: "password".to_string(),
                schema: "migration_catalog".to_string(),
                max_connections: 2,
            },
            migration: MigrationSettings::default(),
            mapping: MappingSettings::default(),
            transfer: TransferSettings::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_source_host() {
        let mut config = valid_config();
        config.source.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_missing_catalog_database() {
        let mut config = valid_config();
        config.catalog.database = "".to_string();
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("catalog.database"));
    }

    #[test]
    fn test_catalog_schema_with_null_byte_rejected() {
        let mut config = valid_config();
        config.catalog.schema = "cat\0alog".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_confidence_out_of_range() {
        let mut config = valid_config();
        config.mapping.min_confidence = 101;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_batch_size() {
        let mut config = valid_config();
        config.transfer.batch_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_pool_size() {
        let mut config = valid_config();
        config.target.max_connections = 0;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("target.max_connections"));
    }

    #[test]
    fn test_source_config_debug_redacts_password() {
        let mut config = valid_config();
        config.source.password = "super_secret_password_123".to_string();
        let debug_output = format!("{:?}", config.source);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_123"));
    }

    #[test]
    fn test_catalog_config_debug_redacts_password() {
        let mut config = valid_config();
        config.catalog.password = "super_secret_password_456".to_string();
        let debug_output = format!("{:?}", config.catalog);
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("super_secret_password_456"));
    }
}

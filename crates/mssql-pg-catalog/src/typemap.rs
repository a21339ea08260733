//! Column type mapping between MSSQL and PostgreSQL.
//!
//! Catalog rows may carry either the original MSSQL type or a type the
//! introspection step already resolved for PostgreSQL; the latter passes
//! through unchanged.

/// Largest length PostgreSQL accepts for `varchar(n)` / `char(n)`.
const PG_MAX_CHAR_LENGTH: i32 = 10_485_760;

/// Map a column type to its PostgreSQL spelling.
pub fn map_column_type(data_type: &str, max_length: i32, precision: i32, scale: i32) -> String {
    let normalized = data_type.trim().to_lowercase();
    match normalized.as_str() {
        "bit" => "boolean".to_string(),

        "tinyint" | "smallint" => "smallint".to_string(),
        "int" => "integer".to_string(),
        "bigint" => "bigint".to_string(),

        "decimal" | "numeric" => {
            if precision > 0 {
                format!("numeric({},{})", precision, scale.max(0))
            } else {
                "numeric".to_string()
            }
        }
        "money" => "numeric(19,4)".to_string(),
        "smallmoney" => "numeric(10,4)".to_string(),

        "float" => {
            // float(1..24) is single precision in SQL Server
            if precision > 0 && precision <= 24 {
                "real".to_string()
            } else {
                "double precision".to_string()
            }
        }
        "real" => "real".to_string(),

        "char" | "nchar" => sized_char("char", max_length),
        "varchar" | "nvarchar" => sized_char("varchar", max_length),
        "text" | "ntext" | "sysname" => "text".to_string(),

        "binary" | "varbinary" | "image" | "rowversion" | "timestamp" => "bytea".to_string(),

        "date" => "date".to_string(),
        "time" => with_fraction("time", scale),
        "datetime" | "smalldatetime" => "timestamp".to_string(),
        "datetime2" => with_fraction("timestamp", scale),
        "datetimeoffset" => with_fraction("timestamptz", scale),

        "uniqueidentifier" => "uuid".to_string(),
        "xml" => "xml".to_string(),

        "sql_variant" | "hierarchyid" | "geometry" | "geography" => "text".to_string(),

        other if is_postgres_type(other) => data_type.trim().to_string(),

        _ => "text".to_string(),
    }
}

/// Whether the type is an integer type that can back an identity column.
pub fn is_integer_type(data_type: &str) -> bool {
    matches!(
        data_type.trim().to_lowercase().as_str(),
        "tinyint" | "smallint" | "int" | "integer" | "bigint" | "int2" | "int4" | "int8"
    )
}

fn sized_char(base: &str, max_length: i32) -> String {
    if max_length > 0 && max_length <= PG_MAX_CHAR_LENGTH {
        format!("{}({})", base, max_length)
    } else if base == "char" && max_length == 0 {
        "char(1)".to_string()
    } else {
        "text".to_string()
    }
}

fn with_fraction(base: &str, scale: i32) -> String {
    // SQL Server allows 7 fractional digits, PostgreSQL 6; 7 is also the default.
    if (0..=6).contains(&scale) && scale != 0 {
        format!("{}({})", base, scale)
    } else {
        base.to_string()
    }
}

fn is_postgres_type(normalized: &str) -> bool {
    const PG_TYPES: &[&str] = &[
        "boolean",
        "integer",
        "int2",
        "int4",
        "int8",
        "double precision",
        "character varying",
        "character",
        "bytea",
        "timestamptz",
        "timestamp without time zone",
        "timestamp with time zone",
        "uuid",
        "json",
        "jsonb",
        "inet",
        "interval",
        "serial",
        "bigserial",
        "citext",
    ];
    PG_TYPES.contains(&normalized)
        || normalized.starts_with("numeric(")
        || normalized.starts_with("varchar(")
        || normalized.starts_with("char(")
        || normalized.starts_with("character varying(")
        || normalized.starts_with("timestamp(")
        || normalized.starts_with("time(")
        || normalized.ends_with("[]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_types() {
        assert_eq!(map_column_type("int", 0, 0, 0), "integer");
        assert_eq!(map_column_type("bigint", 0, 0, 0), "bigint");
        assert_eq!(map_column_type("tinyint", 0, 0, 0), "smallint");
        assert_eq!(map_column_type("INT", 0, 0, 0), "integer");
    }

    #[test]
    fn test_string_types() {
        assert_eq!(map_column_type("varchar", 20, 0, 0), "varchar(20)");
        assert_eq!(map_column_type("nvarchar", -1, 0, 0), "text");
        assert_eq!(map_column_type("nchar", 10, 0, 0), "char(10)");
        assert_eq!(map_column_type("ntext", 0, 0, 0), "text");
    }

    #[test]
    fn test_numeric_types() {
        assert_eq!(map_column_type("decimal", 0, 18, 2), "numeric(18,2)");
        assert_eq!(map_column_type("numeric", 0, 0, 0), "numeric");
        assert_eq!(map_column_type("money", 0, 0, 0), "numeric(19,4)");
        assert_eq!(map_column_type("float", 0, 53, 0), "double precision");
        assert_eq!(map_column_type("float", 0, 24, 0), "real");
    }

    #[test]
    fn test_temporal_types() {
        assert_eq!(map_column_type("datetime", 0, 0, 3), "timestamp");
        assert_eq!(map_column_type("datetime2", 0, 0, 7), "timestamp");
        assert_eq!(map_column_type("datetime2", 0, 0, 3), "timestamp(3)");
        assert_eq!(map_column_type("datetimeoffset", 0, 0, 7), "timestamptz");
        assert_eq!(map_column_type("date", 0, 0, 0), "date");
    }

    #[test]
    fn test_special_types() {
        assert_eq!(map_column_type("uniqueidentifier", 0, 0, 0), "uuid");
        assert_eq!(map_column_type("bit", 0, 0, 0), "boolean");
        assert_eq!(map_column_type("rowversion", 0, 0, 0), "bytea");
        assert_eq!(map_column_type("hierarchyid", 0, 0, 0), "text");
    }

    #[test]
    fn test_postgres_types_pass_through() {
        assert_eq!(map_column_type("jsonb", 0, 0, 0), "jsonb");
        assert_eq!(map_column_type("numeric(10,2)", 0, 0, 0), "numeric(10,2)");
        assert_eq!(map_column_type("double precision", 0, 0, 0), "double precision");
    }

    #[test]
    fn test_identity_capable_types() {
        assert!(is_integer_type("int"));
        assert!(is_integer_type("bigint"));
        assert!(!is_integer_type("varchar"));
    }
}

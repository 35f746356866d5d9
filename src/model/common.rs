use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type Id = String;

pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}

/// Declared data type of a schema field. Selects which typed slot of a
/// `FieldValue` row holds the live value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    Json,
    Array,
    Object,
}

impl FieldType {
    pub const ALL: [FieldType; 8] = [
        FieldType::String,
        FieldType::Integer,
        FieldType::Float,
        FieldType::Boolean,
        FieldType::Date,
        FieldType::Json,
        FieldType::Array,
        FieldType::Object,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Json => "json",
            FieldType::Array => "array",
            FieldType::Object => "object",
        }
    }

    pub fn parse(tag: &str) -> Option<FieldType> {
        FieldType::ALL.iter().copied().find(|t| t.as_str() == tag)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Float)
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, FieldType::Json | FieldType::Array | FieldType::Object)
    }

    /// Directed type-compatibility check: which declared types an existing
    /// field may migrate to. Everything converts to string and to the
    /// structured types; narrowing conversions are not offered.
    pub fn can_convert_to(&self, target: FieldType) -> bool {
        self.allowed_targets().contains(&target)
    }

    pub fn allowed_targets(&self) -> &'static [FieldType] {
        use FieldType::*;
        match self {
            String => &[String, Json, Array, Object],
            Integer => &[Integer, Float, String, Json, Array, Object],
            Float => &[Float, String, Json, Array, Object],
            Boolean => &[Boolean, String, Json, Array, Object],
            Date => &[Date, String, Json, Array, Object],
            Json => &[Json, String, Array, Object],
            Array => &[Array, String, Json, Object],
            Object => &[Object, String, Json, Array],
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target SQL dialect for generated migration scripts and DDL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    Postgresql,
    Mysql,
    Sqlite,
}

impl SqlDialect {
    pub fn as_str(&self) -> &'static str {
        match self {
            SqlDialect::Postgresql => "postgresql",
            SqlDialect::Mysql => "mysql",
            SqlDialect::Sqlite => "sqlite",
        }
    }

    /// Column type for a field type in this dialect.
    pub fn sql_type(&self, field_type: FieldType) -> &'static str {
        use FieldType::*;
        match self {
            SqlDialect::Postgresql => match field_type {
                String => "TEXT",
                Integer => "INTEGER",
                Float => "DOUBLE PRECISION",
                Boolean => "BOOLEAN",
                Date => "TIMESTAMP",
                Json | Array | Object => "JSONB",
            },
            SqlDialect::Mysql => match field_type {
                String => "TEXT",
                Integer => "INT",
                Float => "DOUBLE",
                Boolean => "BOOLEAN",
                Date => "DATETIME",
                Json | Array | Object => "JSON",
            },
            SqlDialect::Sqlite => match field_type {
                String => "TEXT",
                Integer => "INTEGER",
                Float => "REAL",
                Boolean => "INTEGER",
                Date => "TEXT",
                Json | Array | Object => "TEXT",
            },
        }
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tags_round_trip() {
        for ty in FieldType::ALL {
            assert_eq!(FieldType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(FieldType::parse("decimal"), None);
    }

    #[test]
    fn compatibility_table_matches_contract() {
        use FieldType::*;
        // Widening numeric conversion is allowed, narrowing is not.
        assert!(Integer.can_convert_to(Float));
        assert!(!Float.can_convert_to(Integer));
        // Everything can become a string.
        for ty in FieldType::ALL {
            assert!(ty.can_convert_to(String));
        }
        // No path from float to boolean.
        assert!(!Float.can_convert_to(Boolean));
        assert!(!String.can_convert_to(Date));
        // Structured types are mutually convertible.
        assert!(Json.can_convert_to(Array));
        assert!(Array.can_convert_to(Object));
        assert!(Object.can_convert_to(Json));
    }

    #[test]
    fn dialect_type_maps() {
        assert_eq!(SqlDialect::Postgresql.sql_type(FieldType::Json), "JSONB");
        assert_eq!(SqlDialect::Mysql.sql_type(FieldType::Float), "DOUBLE");
        assert_eq!(SqlDialect::Sqlite.sql_type(FieldType::Boolean), "INTEGER");
        assert_eq!(SqlDialect::Sqlite.sql_type(FieldType::Date), "TEXT");
    }
}

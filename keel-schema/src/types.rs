//! Logical column types and referential actions.

use std::fmt;
use std::str::FromStr;

/// Logical type of a column.
///
/// Dialects translate these to and from their physical type names. `Custom`
/// carries a physical type the model has no logical name for; it is kept
/// verbatim so foreign tables with exotic types can still be captured and
/// compared.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ColumnType {
    SmallInt,
    Integer,
    BigInt,
    Boolean,
    Float,
    Double,
    Decimal { precision: u8, scale: u8 },
    String { length: Option<u32> },
    Text,
    Date,
    Time,
    DateTime,
    Binary,
    Json,
    Uuid,
    Custom(String),
}

/// Default precision for `decimal` columns declared without one.
pub const DEFAULT_DECIMAL_PRECISION: u8 = 10;

impl ColumnType {
    /// Parse a manifest type name.
    ///
    /// `length` applies to `string`; `precision` and `scale` apply to
    /// `decimal`. Returns `None` for unknown names.
    pub fn from_name(
        name: &str,
        length: Option<u32>,
        precision: Option<u8>,
        scale: Option<u8>,
    ) -> Option<Self> {
        let ty = match name.trim().to_ascii_lowercase().as_str() {
            "smallint" | "int2" => Self::SmallInt,
            "integer" | "int" | "int4" => Self::Integer,
            "bigint" | "int8" => Self::BigInt,
            "boolean" | "bool" => Self::Boolean,
            "float" | "real" => Self::Float,
            "double" => Self::Double,
            "decimal" | "numeric" => Self::Decimal {
                precision: precision.unwrap_or(DEFAULT_DECIMAL_PRECISION),
                scale: scale.unwrap_or(0),
            },
            "string" | "varchar" => Self::String { length },
            "text" => Self::Text,
            "date" => Self::Date,
            "time" => Self::Time,
            "datetime" | "timestamp" => Self::DateTime,
            "binary" | "blob" | "bytes" => Self::Binary,
            "json" => Self::Json,
            "uuid" | "guid" => Self::Uuid,
            _ => return None,
        };
        Some(ty)
    }

    /// Whether the type is an integer type (auto-increment capable).
    pub fn is_integer(&self) -> bool {
        matches!(self, Self::SmallInt | Self::Integer | Self::BigInt)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SmallInt => write!(f, "smallint"),
            Self::Integer => write!(f, "integer"),
            Self::BigInt => write!(f, "bigint"),
            Self::Boolean => write!(f, "boolean"),
            Self::Float => write!(f, "float"),
            Self::Double => write!(f, "double"),
            Self::Decimal { precision, scale } => write!(f, "decimal({precision}, {scale})"),
            Self::String { length: Some(n) } => write!(f, "string({n})"),
            Self::String { length: None } => write!(f, "string"),
            Self::Text => write!(f, "text"),
            Self::Date => write!(f, "date"),
            Self::Time => write!(f, "time"),
            Self::DateTime => write!(f, "datetime"),
            Self::Binary => write!(f, "binary"),
            Self::Json => write!(f, "json"),
            Self::Uuid => write!(f, "uuid"),
            Self::Custom(raw) => write!(f, "{raw}"),
        }
    }
}

/// Action taken on referencing rows when the referenced row changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReferentialAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ReferentialAction {
    /// SQL keyword form.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

impl fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for ReferentialAction {
    type Err = String;

    /// Accepts SQL keywords in any case, with spaces or underscores
    /// (`SET NULL`, `set_null`, `setnull`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "noaction" | "" => Ok(Self::NoAction),
            "restrict" => Ok(Self::Restrict),
            "cascade" => Ok(Self::Cascade),
            "setnull" => Ok(Self::SetNull),
            "setdefault" => Ok(Self::SetDefault),
            _ => Err(s.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name_aliases() {
        assert_eq!(
            ColumnType::from_name("INT", None, None, None),
            Some(ColumnType::Integer)
        );
        assert_eq!(
            ColumnType::from_name("timestamp", None, None, None),
            Some(ColumnType::DateTime)
        );
        assert_eq!(
            ColumnType::from_name("string", Some(255), None, None),
            Some(ColumnType::String { length: Some(255) })
        );
        assert_eq!(ColumnType::from_name("money", None, None, None), None);
    }

    #[test]
    fn test_decimal_defaults() {
        assert_eq!(
            ColumnType::from_name("decimal", None, None, None),
            Some(ColumnType::Decimal {
                precision: 10,
                scale: 0
            })
        );
        assert_eq!(
            ColumnType::from_name("numeric", None, Some(12), Some(2)),
            Some(ColumnType::Decimal {
                precision: 12,
                scale: 2
            })
        );
    }

    #[test]
    fn test_is_integer() {
        assert!(ColumnType::BigInt.is_integer());
        assert!(!ColumnType::Decimal { precision: 5, scale: 0 }.is_integer());
        assert!(!ColumnType::Custom("serial".into()).is_integer());
    }

    #[test]
    fn test_display() {
        assert_eq!(ColumnType::String { length: Some(64) }.to_string(), "string(64)");
        assert_eq!(ColumnType::Custom("tsvector".into()).to_string(), "tsvector");
    }

    #[test]
    fn test_referential_action_parse() {
        assert_eq!("CASCADE".parse(), Ok(ReferentialAction::Cascade));
        assert_eq!("set null".parse(), Ok(ReferentialAction::SetNull));
        assert_eq!("set_default".parse(), Ok(ReferentialAction::SetDefault));
        assert_eq!("NO ACTION".parse(), Ok(ReferentialAction::NoAction));
        assert!("explode".parse::<ReferentialAction>().is_err());
    }
}

//! UDA state variable datatypes and their values.

use std::fmt;

/// Datatype of a state variable, named as in service descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Datatype {
    Ui1,
    Ui2,
    Ui4,
    Ui8,
    I1,
    I2,
    I4,
    I8,
    Int,
    R4,
    R8,
    Number,
    Fixed14_4,
    Float,
    Char,
    String,
    Boolean,
    Uri,
    Uuid,
    BinBase64,
    BinHex,
    Date,
    DateTime,
    DateTimeTz,
    Time,
    TimeTz,
    /// A vendor datatype, handled as text
    Custom(std::string::String),
}

impl Datatype {
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "ui1" => Datatype::Ui1,
            "ui2" => Datatype::Ui2,
            "ui4" => Datatype::Ui4,
            "ui8" => Datatype::Ui8,
            "i1" => Datatype::I1,
            "i2" => Datatype::I2,
            "i4" => Datatype::I4,
            "i8" => Datatype::I8,
            "int" => Datatype::Int,
            "r4" => Datatype::R4,
            "r8" => Datatype::R8,
            "number" => Datatype::Number,
            "fixed.14.4" => Datatype::Fixed14_4,
            "float" => Datatype::Float,
            "char" => Datatype::Char,
            "string" => Datatype::String,
            "boolean" => Datatype::Boolean,
            "uri" => Datatype::Uri,
            "uuid" => Datatype::Uuid,
            "bin.base64" => Datatype::BinBase64,
            "bin.hex" => Datatype::BinHex,
            "date" => Datatype::Date,
            "dateTime" => Datatype::DateTime,
            "dateTime.tz" => Datatype::DateTimeTz,
            "time" => Datatype::Time,
            "time.tz" => Datatype::TimeTz,
            other => Datatype::Custom(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Datatype::Ui1 => "ui1",
            Datatype::Ui2 => "ui2",
            Datatype::Ui4 => "ui4",
            Datatype::Ui8 => "ui8",
            Datatype::I1 => "i1",
            Datatype::I2 => "i2",
            Datatype::I4 => "i4",
            Datatype::I8 => "i8",
            Datatype::Int => "int",
            Datatype::R4 => "r4",
            Datatype::R8 => "r8",
            Datatype::Number => "number",
            Datatype::Fixed14_4 => "fixed.14.4",
            Datatype::Float => "float",
            Datatype::Char => "char",
            Datatype::String => "string",
            Datatype::Boolean => "boolean",
            Datatype::Uri => "uri",
            Datatype::Uuid => "uuid",
            Datatype::BinBase64 => "bin.base64",
            Datatype::BinHex => "bin.hex",
            Datatype::Date => "date",
            Datatype::DateTime => "dateTime",
            Datatype::DateTimeTz => "dateTime.tz",
            Datatype::Time => "time",
            Datatype::TimeTz => "time.tz",
            Datatype::Custom(name) => name,
        }
    }

    /// Types that may carry an `allowedValueList`.
    pub fn is_string_type(&self) -> bool {
        matches!(
            self,
            Datatype::String | Datatype::Char | Datatype::Uri | Datatype::Uuid | Datatype::Custom(_)
        )
    }

    /// Types that may carry an `allowedValueRange`.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Datatype::Ui1
                | Datatype::Ui2
                | Datatype::Ui4
                | Datatype::Ui8
                | Datatype::I1
                | Datatype::I2
                | Datatype::I4
                | Datatype::I8
                | Datatype::Int
                | Datatype::R4
                | Datatype::R8
                | Datatype::Number
                | Datatype::Fixed14_4
                | Datatype::Float
        )
    }

    /// Parse a value in its wire representation.
    pub fn parse_value(&self, raw: &str) -> Result<Value, std::string::String> {
        let trimmed = raw.trim();
        let invalid = || format!("'{}' is not a valid {}", raw, self.name());

        match self {
            Datatype::Ui1 => unsigned_in(trimmed, u8::MAX as u64).ok_or_else(invalid),
            Datatype::Ui2 => unsigned_in(trimmed, u16::MAX as u64).ok_or_else(invalid),
            Datatype::Ui4 => unsigned_in(trimmed, u32::MAX as u64).ok_or_else(invalid),
            Datatype::Ui8 => unsigned_in(trimmed, u64::MAX).ok_or_else(invalid),
            Datatype::I1 => signed_in(trimmed, i8::MIN as i64, i8::MAX as i64).ok_or_else(invalid),
            Datatype::I2 => {
                signed_in(trimmed, i16::MIN as i64, i16::MAX as i64).ok_or_else(invalid)
            }
            Datatype::I4 | Datatype::Int => {
                signed_in(trimmed, i32::MIN as i64, i32::MAX as i64).ok_or_else(invalid)
            }
            Datatype::I8 => signed_in(trimmed, i64::MIN, i64::MAX).ok_or_else(invalid),
            Datatype::R4
            | Datatype::R8
            | Datatype::Number
            | Datatype::Fixed14_4
            | Datatype::Float => trimmed
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Value::Float)
                .ok_or_else(invalid),
            Datatype::Boolean => match trimmed.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => Ok(Value::Boolean(true)),
                "0" | "false" | "no" => Ok(Value::Boolean(false)),
                _ => Err(invalid()),
            },
            Datatype::Char => {
                let mut chars = raw.chars();
                match (chars.next(), chars.next()) {
                    (Some(_), None) => Ok(Value::Text(raw.to_string())),
                    _ => Err(invalid()),
                }
            }
            Datatype::Uri => url::Url::parse(trimmed)
                .map(|_| Value::Text(trimmed.to_string()))
                .map_err(|_| invalid()),
            _ => Ok(Value::Text(raw.to_string())),
        }
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn unsigned_in(raw: &str, max: u64) -> Option<Value> {
    raw.parse::<u64>()
        .ok()
        .filter(|v| *v <= max)
        .map(Value::Unsigned)
}

fn signed_in(raw: &str, min: i64, max: i64) -> Option<Value> {
    raw.parse::<i64>()
        .ok()
        .filter(|v| (min..=max).contains(v))
        .map(Value::Integer)
}

/// A typed state variable or argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Boolean(bool),
    Integer(i64),
    Unsigned(u64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Unsigned(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Unsigned(v) => Some(*v),
            Value::Integer(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            Value::Unsigned(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }
}

/// Wire representation; booleans are written as `0` and `1`.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Boolean(v) => f.write_str(if *v { "1" } else { "0" }),
            Value::Integer(v) => write!(f, "{}", v),
            Value::Unsigned(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::Unsigned(v as u64)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Datatype::Boolean, "1", Value::Boolean(true))]
    #[case(Datatype::Boolean, "no", Value::Boolean(false))]
    #[case(Datatype::Boolean, "TRUE", Value::Boolean(true))]
    #[case(Datatype::Ui1, "255", Value::Unsigned(255))]
    #[case(Datatype::I2, "-32768", Value::Integer(-32768))]
    #[case(Datatype::R8, "0.25", Value::Float(0.25))]
    #[case(Datatype::String, " padded ", Value::Text(" padded ".to_string()))]
    #[case(Datatype::Custom("vendor".to_string()), "x", Value::Text("x".to_string()))]
    fn test_parse_value(#[case] datatype: Datatype, #[case] raw: &str, #[case] expected: Value) {
        assert_eq!(datatype.parse_value(raw).unwrap(), expected);
    }

    #[rstest]
    #[case(Datatype::Boolean, "maybe")]
    #[case(Datatype::Ui1, "256")]
    #[case(Datatype::Ui4, "-1")]
    #[case(Datatype::I1, "128")]
    #[case(Datatype::Char, "ab")]
    #[case(Datatype::Uri, "not a uri")]
    #[case(Datatype::R4, "NaN")]
    fn test_parse_value_rejects(#[case] datatype: Datatype, #[case] raw: &str) {
        assert!(datatype.parse_value(raw).is_err());
    }

    #[test]
    fn test_boolean_wire_format() {
        assert_eq!(Value::Boolean(true).to_string(), "1");
        assert_eq!(Value::Boolean(false).to_string(), "0");
    }

    #[test]
    fn test_datatype_names_roundtrip() {
        for name in ["ui4", "fixed.14.4", "dateTime.tz", "bin.base64", "string"] {
            assert_eq!(Datatype::from_name(name).name(), name);
        }
        assert_eq!(
            Datatype::from_name("x-acme"),
            Datatype::Custom("x-acme".to_string())
        );
    }
}

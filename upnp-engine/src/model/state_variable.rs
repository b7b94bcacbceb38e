use crate::error::{ErrorCode, ValidationError};
use crate::model::{Datatype, Value};

/// Numeric constraint of a state variable.
#[derive(Debug, Clone, PartialEq)]
pub struct AllowedValueRange {
    pub minimum: f64,
    pub maximum: f64,
    pub step: Option<f64>,
}

/// A state variable of a service.
#[derive(Debug, Clone, PartialEq)]
pub struct StateVariable {
    pub name: String,
    pub datatype: Datatype,
    pub default_value: Option<String>,
    /// Changes are sent to subscribers
    pub send_events: bool,
    pub allowed_values: Vec<String>,
    pub allowed_range: Option<AllowedValueRange>,
}

impl StateVariable {
    pub fn new(name: impl Into<String>, datatype: Datatype) -> Self {
        Self {
            name: name.into(),
            datatype,
            default_value: None,
            send_events: false,
            allowed_values: Vec::new(),
            allowed_range: None,
        }
    }

    pub fn evented(mut self) -> Self {
        self.send_events = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    pub fn with_allowed_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_values = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_allowed_range(mut self, minimum: f64, maximum: f64, step: Option<f64>) -> Self {
        self.allowed_range = Some(AllowedValueRange {
            minimum,
            maximum,
            step,
        });
        self
    }

    /// Parse `raw` and check it against the allowed values and range.
    ///
    /// Errors carry the control error code to report to the caller.
    pub fn parse_value(&self, raw: &str) -> Result<Value, (ErrorCode, String)> {
        let value = self
            .datatype
            .parse_value(raw)
            .map_err(|e| (ErrorCode::ArgumentValueInvalid, e))?;

        if !self.allowed_values.is_empty() && !self.allowed_values.iter().any(|v| v == raw) {
            return Err((
                ErrorCode::ArgumentValueInvalid,
                format!("'{}' is not an allowed value of {}", raw, self.name),
            ));
        }

        if let (Some(range), Some(number)) = (&self.allowed_range, value.as_f64()) {
            if number < range.minimum || number > range.maximum {
                return Err((
                    ErrorCode::ArgumentValueOutOfRange,
                    format!(
                        "{} is outside {}..={} of {}",
                        number, range.minimum, range.maximum, self.name
                    ),
                ));
            }
        }

        Ok(value)
    }

    /// The default value, or the zero value of the datatype.
    pub fn initial_value(&self) -> Value {
        self.default_value
            .as_deref()
            .and_then(|raw| self.datatype.parse_value(raw).ok())
            .unwrap_or_else(|| match self.datatype {
                Datatype::Boolean => Value::Boolean(false),
                ref t if t.is_numeric() => match t.parse_value("0") {
                    Ok(v) => v,
                    Err(_) => Value::Text(String::new()),
                },
                _ => Value::Text(String::new()),
            })
    }

    pub(crate) fn validate(&self, errors: &mut Vec<ValidationError>) {
        let element = format!("StateVariable({})", self.name);
        if self.name.is_empty() {
            errors.push(ValidationError::new(element.clone(), "name is empty"));
        }
        if !self.allowed_values.is_empty() && !self.datatype.is_string_type() {
            errors.push(ValidationError::new(
                element.clone(),
                format!("allowed value list on non-string type {}", self.datatype),
            ));
        }
        if self.allowed_range.is_some() && !self.datatype.is_numeric() {
            errors.push(ValidationError::new(
                element.clone(),
                format!("allowed value range on non-numeric type {}", self.datatype),
            ));
        }
        if let Some(range) = &self.allowed_range {
            if range.minimum > range.maximum {
                errors.push(ValidationError::new(
                    element.clone(),
                    "allowed range minimum exceeds maximum",
                ));
            }
        }
        if let Some(default) = &self.default_value {
            if let Err(e) = self.datatype.parse_value(default) {
                errors.push(ValidationError::new(element, format!("default value: {}", e)));
            }
        }
    }
}

use std::fmt;

use serde::{Deserialize, Serialize};

/// Value of a named envelope attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<Self>),
}

impl AttributeValue {
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Interprets a textual configuration value, falling back to text.
    #[must_use]
    pub fn infer(value: &str) -> Self {
        if let Ok(b) = value.parse::<bool>() {
            Self::Bool(b)
        } else if let Ok(i) = value.parse::<i64>() {
            Self::Integer(i)
        } else if let Ok(f) = value.parse::<f64>() {
            Self::Float(f)
        } else {
            Self::Text(value.to_string())
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer() {
        assert_eq!(AttributeValue::infer("true"), AttributeValue::Bool(true));
        assert_eq!(AttributeValue::infer("42"), AttributeValue::Integer(42));
        assert_eq!(AttributeValue::infer("1.5"), AttributeValue::Float(1.5));
        assert_eq!(
            AttributeValue::infer("spam"),
            AttributeValue::Text("spam".to_string())
        );
    }

    #[test]
    fn test_display_list() {
        let value = AttributeValue::List(vec![1_i64.into(), "two".into()]);
        assert_eq!(value.to_string(), "[1, two]");
    }
}

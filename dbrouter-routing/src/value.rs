//! Routing key values and their declared types.

use std::fmt;

/// Runtime value of a routing key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoutingValue {
    /// A string key.
    Text(String),
    /// A signed integer key.
    Int(i64),
    /// An unsigned integer key.
    UInt(u64),
}

impl RoutingValue {
    /// Returns the runtime type of this value.
    #[must_use]
    pub const fn key_type(&self) -> KeyType {
        match self {
            Self::Text(_) => KeyType::Text,
            Self::Int(_) => KeyType::Int,
            Self::UInt(_) => KeyType::UInt,
        }
    }
}

impl fmt::Display for RoutingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Int(n) => write!(f, "{n}"),
            Self::UInt(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for RoutingValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for RoutingValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for RoutingValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for RoutingValue {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<u64> for RoutingValue {
    fn from(n: u64) -> Self {
        Self::UInt(n)
    }
}

impl From<u32> for RoutingValue {
    fn from(n: u32) -> Self {
        Self::UInt(u64::from(n))
    }
}

/// Key type an algorithm declares it accepts.
///
/// `Any` accepts every value and `Number` accepts both integer kinds; every
/// other type accepts only itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    /// Any routing value.
    Any,
    /// String keys.
    Text,
    /// Signed or unsigned integer keys.
    Number,
    /// Signed integer keys.
    Int,
    /// Unsigned integer keys.
    UInt,
}

impl KeyType {
    /// Returns true if a value of type `actual` may be passed where `self`
    /// is declared.
    #[must_use]
    pub const fn accepts(self, actual: Self) -> bool {
        match self {
            Self::Any => true,
            Self::Number => matches!(actual, Self::Number | Self::Int | Self::UInt),
            Self::Text => matches!(actual, Self::Text),
            Self::Int => matches!(actual, Self::Int),
            Self::UInt => matches!(actual, Self::UInt),
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Any => "any",
            Self::Text => "text",
            Self::Number => "number",
            Self::Int => "int",
            Self::UInt => "uint",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_types() {
        assert_eq!(RoutingValue::from("abc").key_type(), KeyType::Text);
        assert_eq!(RoutingValue::from(-4_i64).key_type(), KeyType::Int);
        assert_eq!(RoutingValue::from(4_u32).key_type(), KeyType::UInt);
    }

    #[test]
    fn test_value_display() {
        assert_eq!(RoutingValue::from("user-1").to_string(), "user-1");
        assert_eq!(RoutingValue::from(-12_i32).to_string(), "-12");
        assert_eq!(RoutingValue::from(10_001_u64).to_string(), "10001");
    }

    #[test]
    fn test_supertypes() {
        assert!(KeyType::Any.accepts(KeyType::Text));
        assert!(KeyType::Any.accepts(KeyType::UInt));
        assert!(KeyType::Number.accepts(KeyType::Int));
        assert!(KeyType::Number.accepts(KeyType::UInt));
        assert!(KeyType::Int.accepts(KeyType::Int));
    }

    #[test]
    fn test_incompatible_types() {
        assert!(!KeyType::Number.accepts(KeyType::Text));
        assert!(!KeyType::Text.accepts(KeyType::Int));
        assert!(!KeyType::Int.accepts(KeyType::UInt));
        assert!(!KeyType::Int.accepts(KeyType::Number));
        assert!(!KeyType::Text.accepts(KeyType::Any));
    }
}

//! Composite record identity
//!
//! Keys are built from heterogeneous attributes (numeric ids from embedded
//! JSON, string ids from URLs). Every part is normalised to its canonical text
//! form on construction, so `1`, `1.0`, `"1"` and `" 1 "` all produce the same
//! key part and keys compare and hash by their normalised parts only.

use serde_json::Value;
use std::fmt;

/// Separator used by the flat string form of a key
pub const KEY_SEPARATOR: char = '|';

/// One normalised attribute of a composite key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyPart(String);

impl KeyPart {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        KeyPart(value.trim().to_string())
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        KeyPart::from(value.as_str())
    }
}

impl From<&String> for KeyPart {
    fn from(value: &String) -> Self {
        KeyPart::from(value.as_str())
    }
}

macro_rules! key_part_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for KeyPart {
                fn from(value: $t) -> Self {
                    KeyPart(value.to_string())
                }
            }
        )*
    };
}

key_part_from_int!(i32, i64, u32, u64, usize);

impl From<f64> for KeyPart {
    fn from(value: f64) -> Self {
        // Whole floats collapse onto their integer spelling
        if value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15 {
            KeyPart((value as i64).to_string())
        } else {
            KeyPart(value.to_string())
        }
    }
}

impl From<&Value> for KeyPart {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => KeyPart(String::new()),
            Value::Bool(b) => KeyPart(b.to_string()),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    KeyPart::from(i)
                } else if let Some(u) = n.as_u64() {
                    KeyPart::from(u)
                } else {
                    KeyPart::from(n.as_f64().unwrap_or_default())
                }
            }
            Value::String(s) => KeyPart::from(s.as_str()),
            other => KeyPart(other.to_string()),
        }
    }
}

/// Record identity built from an ordered sequence of attributes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositeKey {
    parts: Vec<KeyPart>,
}

impl CompositeKey {
    pub fn new<I, P>(parts: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<KeyPart>,
    {
        Self {
            parts: parts.into_iter().map(Into::into).collect(),
        }
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.parts
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", KEY_SEPARATOR)?;
            }
            f.write_str(part.as_str())?;
        }
        Ok(())
    }
}

/// Builds a [`CompositeKey`] from attributes of mixed types
///
/// ```
/// use flipwatch::composite_key;
///
/// assert_eq!(composite_key!(1, "abc"), composite_key!("1", "abc"));
/// ```
#[macro_export]
macro_rules! composite_key {
    ($($part:expr),+ $(,)?) => {
        $crate::state::CompositeKey::new(
            vec![$($crate::state::KeyPart::from($part)),+]
        )
    };
}

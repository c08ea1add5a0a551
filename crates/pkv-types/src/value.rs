use std::collections::HashMap;

use crate::error::KvsError;

/// A map of key names to values, as stored at the document root and inside
/// [`KvsValue::Object`].
pub type KvsMap = HashMap<String, KvsValue>;

/// A stored value.
///
/// `KvsValue` is a tagged sum: every variant carries its type explicitly
/// and there is no implicit widening between the numeric variants. An
/// `I32(5)` and a `U32(5)` are different values that serialize under
/// different tags.
#[derive(Clone, Debug, PartialEq)]
pub enum KvsValue {
    /// The absence of a value (distinct from an absent key).
    Null,
    /// A boolean.
    Boolean(bool),
    /// A signed 32-bit integer.
    I32(i32),
    /// An unsigned 32-bit integer.
    U32(u32),
    /// A signed 64-bit integer.
    I64(i64),
    /// An unsigned 64-bit integer.
    U64(u64),
    /// A double-precision float.
    F64(f64),
    /// A UTF-8 string.
    String(String),
    /// An ordered sequence of values; elements may have mixed types.
    Array(Vec<KvsValue>),
    /// A nested map of key names to values.
    Object(KvsMap),
}

impl KvsValue {
    /// The tag string this value serializes under.
    pub fn type_name(&self) -> &'static str {
        match self {
            KvsValue::Null => "null",
            KvsValue::Boolean(_) => "bool",
            KvsValue::I32(_) => "i32",
            KvsValue::U32(_) => "u32",
            KvsValue::I64(_) => "i64",
            KvsValue::U64(_) => "u64",
            KvsValue::F64(_) => "f64",
            KvsValue::String(_) => "str",
            KvsValue::Array(_) => "arr",
            KvsValue::Object(_) => "obj",
        }
    }

    /// Returns `true` for [`KvsValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, KvsValue::Null)
    }

    /// The boolean payload, if this is a `Boolean`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            KvsValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// The `i32` payload, if this is an `I32`.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            KvsValue::I32(n) => Some(*n),
            _ => None,
        }
    }

    /// The `u32` payload, if this is a `U32`.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            KvsValue::U32(n) => Some(*n),
            _ => None,
        }
    }

    /// The `i64` payload, if this is an `I64`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            KvsValue::I64(n) => Some(*n),
            _ => None,
        }
    }

    /// The `u64` payload, if this is a `U64`.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            KvsValue::U64(n) => Some(*n),
            _ => None,
        }
    }

    /// The `f64` payload, if this is an `F64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            KvsValue::F64(n) => Some(*n),
            _ => None,
        }
    }

    /// The string payload, if this is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            KvsValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// The element list, if this is an `Array`.
    pub fn as_array(&self) -> Option<&[KvsValue]> {
        match self {
            KvsValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// The nested map, if this is an `Object`.
    pub fn as_object(&self) -> Option<&KvsMap> {
        match self {
            KvsValue::Object(map) => Some(map),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Construction conversions
// ---------------------------------------------------------------------------

impl From<()> for KvsValue {
    fn from(_: ()) -> Self {
        KvsValue::Null
    }
}

impl From<bool> for KvsValue {
    fn from(b: bool) -> Self {
        KvsValue::Boolean(b)
    }
}

impl From<i32> for KvsValue {
    fn from(n: i32) -> Self {
        KvsValue::I32(n)
    }
}

impl From<u32> for KvsValue {
    fn from(n: u32) -> Self {
        KvsValue::U32(n)
    }
}

impl From<i64> for KvsValue {
    fn from(n: i64) -> Self {
        KvsValue::I64(n)
    }
}

impl From<u64> for KvsValue {
    fn from(n: u64) -> Self {
        KvsValue::U64(n)
    }
}

impl From<f64> for KvsValue {
    fn from(n: f64) -> Self {
        KvsValue::F64(n)
    }
}

impl From<&str> for KvsValue {
    fn from(s: &str) -> Self {
        KvsValue::String(s.to_string())
    }
}

impl From<String> for KvsValue {
    fn from(s: String) -> Self {
        KvsValue::String(s)
    }
}

impl From<Vec<KvsValue>> for KvsValue {
    fn from(items: Vec<KvsValue>) -> Self {
        KvsValue::Array(items)
    }
}

impl From<KvsMap> for KvsValue {
    fn from(map: KvsMap) -> Self {
        KvsValue::Object(map)
    }
}

// ---------------------------------------------------------------------------
// Extraction conversions
//
// Each conversion requires the exact variant; there is no widening from
// I32 to I64 or similar.
// ---------------------------------------------------------------------------

macro_rules! try_from_value {
    ($target:ty, $variant:ident) => {
        impl TryFrom<KvsValue> for $target {
            type Error = KvsError;

            fn try_from(value: KvsValue) -> Result<Self, Self::Error> {
                match value {
                    KvsValue::$variant(inner) => Ok(inner),
                    _ => Err(KvsError::ConversionFailed),
                }
            }
        }
    };
}

try_from_value!(bool, Boolean);
try_from_value!(i32, I32);
try_from_value!(u32, U32);
try_from_value!(i64, I64);
try_from_value!(u64, U64);
try_from_value!(f64, F64);
try_from_value!(String, String);
try_from_value!(Vec<KvsValue>, Array);
try_from_value!(KvsMap, Object);

impl TryFrom<KvsValue> for () {
    type Error = KvsError;

    fn try_from(value: KvsValue) -> Result<Self, Self::Error> {
        match value {
            KvsValue::Null => Ok(()),
            _ => Err(KvsError::ConversionFailed),
        }
    }
}

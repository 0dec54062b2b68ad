//! Attribute values and items.
//!
//! An [`AttributeValue`] holds exactly one typed value. On the wire it is a
//! single-key object such as `{"S": "hello"}` or `{"N": "42"}`; numbers stay
//! string-encoded so no precision is lost between client and store.

use std::collections::HashMap;
use std::fmt;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A stored item: attribute name to value.
pub type Item = HashMap<String, AttributeValue>;

const TAGS: &[&str] = &["S", "N", "B", "SS", "NS", "BS", "BOOL", "NULL", "L", "M"];

/// A single typed attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    /// String.
    S(String),
    /// Number, kept in its decimal string form.
    N(String),
    /// Binary.
    B(Bytes),
    /// String set.
    Ss(Vec<String>),
    /// Number set.
    Ns(Vec<String>),
    /// Binary set.
    Bs(Vec<Bytes>),
    /// Boolean.
    Bool(bool),
    /// Null marker.
    Null(bool),
    /// Ordered list.
    L(Vec<AttributeValue>),
    /// Nested map.
    M(HashMap<String, AttributeValue>),
}

impl AttributeValue {
    /// Build a number value from anything that formats as a decimal.
    #[must_use]
    pub fn number(n: impl fmt::Display) -> Self {
        Self::N(n.to_string())
    }

    /// The wire tag of this value (`"S"`, `"N"`, `"BOOL"`, ...).
    #[must_use]
    pub fn type_descriptor(&self) -> &'static str {
        match self {
            Self::S(_) => "S",
            Self::N(_) => "N",
            Self::B(_) => "B",
            Self::Ss(_) => "SS",
            Self::Ns(_) => "NS",
            Self::Bs(_) => "BS",
            Self::Bool(_) => "BOOL",
            Self::Null(_) => "NULL",
            Self::L(_) => "L",
            Self::M(_) => "M",
        }
    }

    /// Whether this value may be used as a key attribute (`S`, `N` or `B`).
    #[must_use]
    pub fn is_scalar_key(&self) -> bool {
        matches!(self, Self::S(_) | Self::N(_) | Self::B(_))
    }

    #[must_use]
    pub fn as_s(&self) -> Option<&str> {
        match self {
            Self::S(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_n(&self) -> Option<&str> {
        match self {
            Self::N(n) => Some(n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_l(&self) -> Option<&[AttributeValue]> {
        match self {
            Self::L(l) => Some(l),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_m(&self) -> Option<&HashMap<String, AttributeValue>> {
        match self {
            Self::M(m) => Some(m),
            _ => None,
        }
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::S(value.to_owned())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::S(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

macro_rules! number_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for AttributeValue {
                fn from(value: $ty) -> Self {
                    Self::number(value)
                }
            }
        )*
    };
}

number_from!(i32, i64, u32, u64, usize, f64);

impl Eq for AttributeValue {}

impl std::hash::Hash for AttributeValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.type_descriptor().hash(state);
        match self {
            Self::S(s) | Self::N(s) => s.hash(state),
            Self::B(b) => b.hash(state),
            Self::Bool(b) | Self::Null(b) => b.hash(state),
            Self::Ss(v) | Self::Ns(v) => v.hash(state),
            Self::Bs(v) => v.iter().for_each(|b| b.hash(state)),
            Self::L(v) => v.hash(state),
            Self::M(m) => {
                // HashMap iteration order is unstable.
                let mut entries: Vec<_> = m.iter().collect();
                entries.sort_by_key(|(k, _)| *k);
                entries.hash(state);
            }
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S(s) => f.write_str(s),
            Self::N(n) => f.write_str(n),
            Self::B(b) => write!(f, "<{} bytes>", b.len()),
            Self::Ss(v) | Self::Ns(v) => write!(f, "{v:?}"),
            Self::Bs(v) => write!(f, "<{} binaries>", v.len()),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Null(_) => f.write_str("null"),
            Self::L(v) => write!(f, "[{} items]", v.len()),
            Self::M(m) => write!(f, "{{{} keys}}", m.len()),
        }
    }
}

impl Serialize for AttributeValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        let tag = self.type_descriptor();
        match self {
            Self::S(s) | Self::N(s) => map.serialize_entry(tag, s)?,
            Self::B(b) => map.serialize_entry(tag, &BASE64.encode(b))?,
            Self::Ss(v) | Self::Ns(v) => map.serialize_entry(tag, v)?,
            Self::Bs(v) => {
                let encoded: Vec<String> = v.iter().map(|b| BASE64.encode(b)).collect();
                map.serialize_entry(tag, &encoded)?;
            }
            Self::Bool(b) | Self::Null(b) => map.serialize_entry(tag, b)?,
            Self::L(list) => map.serialize_entry(tag, list)?,
            Self::M(m) => map.serialize_entry(tag, m)?,
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for AttributeValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(TaggedValueVisitor)
    }
}

struct TaggedValueVisitor;

fn decode_binary<E: de::Error>(encoded: &str) -> Result<Bytes, E> {
    BASE64.decode(encoded).map(Bytes::from).map_err(E::custom)
}

impl<'de> Visitor<'de> for TaggedValueVisitor {
    type Value = AttributeValue;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("an attribute value object with a single type tag")
    }

    fn visit_map<M: MapAccess<'de>>(self, mut map: M) -> Result<Self::Value, M::Error> {
        let Some(tag) = map.next_key::<String>()? else {
            return Err(de::Error::custom("attribute value has no type tag"));
        };

        let value = match tag.as_str() {
            "S" => AttributeValue::S(map.next_value()?),
            "N" => AttributeValue::N(map.next_value()?),
            "B" => AttributeValue::B(decode_binary::<M::Error>(&map.next_value::<String>()?)?),
            "SS" => AttributeValue::Ss(map.next_value()?),
            "NS" => AttributeValue::Ns(map.next_value()?),
            "BS" => AttributeValue::Bs(
                map.next_value::<Vec<String>>()?
                    .iter()
                    .map(|e| decode_binary::<M::Error>(e))
                    .collect::<Result<_, _>>()?,
            ),
            "BOOL" => AttributeValue::Bool(map.next_value()?),
            "NULL" => AttributeValue::Null(map.next_value()?),
            "L" => AttributeValue::L(map.next_value()?),
            "M" => AttributeValue::M(map.next_value()?),
            other => return Err(de::Error::unknown_field(other, TAGS)),
        };

        if map.next_key::<String>()?.is_some() {
            return Err(de::Error::custom(
                "attribute value must have exactly one type tag",
            ));
        }

        Ok(value)
    }
}

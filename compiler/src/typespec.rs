// typespec.rs — Structural type descriptors for component inputs and outputs
//
// A TypeSpec constrains which producer outputs may be wired into a consumer
// input. Compatibility is exact structural equality or absence of a
// constraint on either side; no coercion or subtype relationship is modeled.
//
// Preconditions: property mappings come straight from a parsed document.
// Postconditions: none (types and pure predicates only).
// Failure modes: deserialization rejects non-scalar, non-single-key forms.
// Side effects: none.

use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};

// ── TypeSpec ─────────────────────────────────────────────────────────────

/// Structural type descriptor attached to an input or output.
///
/// Document forms: absent/null (`Unspecified`), a bare string name, or a
/// single-key mapping from a type name to a property mapping, e.g.
/// `{GCSPath: {openapi_schema_validator: {...}}}`.
#[derive(Debug, Clone, Default)]
pub enum TypeSpec {
    /// No declared type. Compatible with anything.
    #[default]
    Unspecified,
    /// A bare type name.
    Name(String),
    /// A parameterized type: name plus property mapping (arbitrary scalars
    /// or nested mappings, compared independently of key order).
    Parameterized { name: String, properties: Mapping },
}

impl TypeSpec {
    /// Parse the `type` field of an input/output entry.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(TypeSpec::Unspecified),
            Value::String(name) => Ok(TypeSpec::Name(name.clone())),
            Value::Mapping(map) => {
                if map.len() != 1 {
                    return Err(format!(
                        "parameterized type must have exactly one key, found {}",
                        map.len()
                    ));
                }
                let (key, props) = map.iter().next().expect("internal: len checked above");
                let name = key
                    .as_str()
                    .ok_or_else(|| "parameterized type name must be a string".to_string())?;
                match props {
                    Value::Mapping(properties) => Ok(TypeSpec::Parameterized {
                        name: name.to_string(),
                        properties: properties.clone(),
                    }),
                    Value::Null => Ok(TypeSpec::Parameterized {
                        name: name.to_string(),
                        properties: Mapping::new(),
                    }),
                    _ => Err(format!("properties of type '{}' must be a mapping", name)),
                }
            }
            _ => Err("type must be a string or a single-key mapping".to_string()),
        }
    }
}

/// Structural equality: both unspecified, same bare name, or same
/// parameterized name with deeply equal properties (key order ignored).
impl PartialEq for TypeSpec {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TypeSpec::Unspecified, TypeSpec::Unspecified) => true,
            (TypeSpec::Name(a), TypeSpec::Name(b)) => a == b,
            (
                TypeSpec::Parameterized {
                    name: a,
                    properties: pa,
                },
                TypeSpec::Parameterized {
                    name: b,
                    properties: pb,
                },
            ) => a == b && mappings_equal(pa, pb),
            _ => false,
        }
    }
}

impl Eq for TypeSpec {}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSpec::Unspecified => write!(f, "(unspecified)"),
            TypeSpec::Name(name) => write!(f, "{}", name),
            TypeSpec::Parameterized { name, properties } => {
                let props = serde_json::to_string(properties)
                    .unwrap_or_else(|_| "{...}".to_string());
                write!(f, "{} {}", name, props)
            }
        }
    }
}

impl<'de> Deserialize<'de> for TypeSpec {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        TypeSpec::from_value(&value).map_err(de::Error::custom)
    }
}

/// Serialized back into the document form; used by canonical JSON digests.
impl Serialize for TypeSpec {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            TypeSpec::Unspecified => serializer.serialize_none(),
            TypeSpec::Name(name) => serializer.serialize_str(name),
            TypeSpec::Parameterized { name, properties } => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(name, properties)?;
                map.end()
            }
        }
    }
}

// ── Compatibility ────────────────────────────────────────────────────────

/// Decide whether a producer output type may feed a consumer input type.
///
/// Rules, in order: either side unspecified is compatible; bare names match
/// by string equality; parameterized types match by name plus deep property
/// equality; everything else is incompatible.
pub fn types_compatible(producer: &TypeSpec, consumer: &TypeSpec) -> bool {
    match (producer, consumer) {
        (TypeSpec::Unspecified, _) | (_, TypeSpec::Unspecified) => true,
        _ => producer == consumer,
    }
}

/// Deep mapping equality independent of key order.
fn mappings_equal(a: &Mapping, b: &Mapping) -> bool {
    a.len() == b.len()
        && a.iter()
            .all(|(key, va)| b.get(key).is_some_and(|vb| values_equal(va, vb)))
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Mapping(ma), Value::Mapping(mb)) => mappings_equal(ma, mb),
        (Value::Sequence(sa), Value::Sequence(sb)) => {
            sa.len() == sb.len() && sa.iter().zip(sb).all(|(x, y)| values_equal(x, y))
        }
        _ => a == b,
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

//! Type system: coercion, comparison and length per property type

use crate::error::{Error, Result};
use crate::value::{Path, Value};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use uuid::Uuid;

/// Type name of string values
pub const STRING: &str = "STRING";
/// Type name of 64-bit integers
pub const LONG: &str = "LONG";
/// Type name of doubles
pub const DOUBLE: &str = "DOUBLE";
/// Type name of booleans
pub const BOOLEAN: &str = "BOOLEAN";
/// Type name of timestamps
pub const DATE: &str = "DATE";
/// Type name of node paths
pub const PATH: &str = "PATH";
/// Type name of qualified names
pub const NAME: &str = "NAME";
/// Type name of node references
pub const REFERENCE: &str = "REFERENCE";

/// Operations for one named property type
pub trait TypeFactory: Send + Sync {
    /// Type name, e.g. `LONG`
    fn type_name(&self) -> &str;

    /// Coerce a value into this type. Nulls stay null and lists are
    /// converted element by element.
    fn create(&self, value: &Value) -> Result<Value>;

    /// Total order over values of this type
    fn compare(&self, a: &Value, b: &Value) -> Ordering;

    /// Length of a value as reported by `LENGTH(...)`
    fn length(&self, value: &Value) -> i64;
}

/// Registry of type factories plus the coercion rules between types
pub trait TypeSystem: Send + Sync {
    /// Factory for a named type
    fn type_factory(&self, type_name: &str) -> Option<&dyn TypeFactory>;

    /// Factory used when a type is unknown
    fn default_factory(&self) -> &dyn TypeFactory;

    /// Name of the type a value naturally belongs to
    fn type_name_of(&self, value: &Value) -> &str;

    /// Result type of arithmetic between two types
    fn compatible_type(&self, left: &str, right: &str) -> String;

    /// Comparator used when the two sides have different or unknown types
    fn default_compare(&self, a: &Value, b: &Value) -> Ordering {
        a.total_cmp(b)
    }

    /// Factory for a named type, falling back to the default factory
    fn factory_or_default(&self, type_name: &str) -> &dyn TypeFactory {
        self.type_factory(type_name)
            .unwrap_or_else(|| self.default_factory())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    String,
    Long,
    Double,
    Boolean,
    Date,
    Path,
    Name,
    Reference,
}

/// Factory for one of the built-in types
#[derive(Debug, Clone, Copy)]
pub struct StandardFactory {
    kind: Kind,
    name: &'static str,
}

impl StandardFactory {
    fn convert(&self, value: &Value) -> Option<Value> {
        let converted = match (self.kind, value) {
            (_, Value::Null) => Value::Null,
            (Kind::String, other) => Value::String(other.to_string()),

            (Kind::Long, Value::Long(v)) => Value::Long(*v),
            (Kind::Long, Value::Double(v)) => Value::Long(*v as i64),
            (Kind::Long, Value::Boolean(b)) => Value::Long(i64::from(*b)),
            (Kind::Long, Value::Date(d)) => Value::Long(d.timestamp_millis()),
            (Kind::Long, Value::String(s)) => Value::Long(s.trim().parse().ok()?),

            (Kind::Double, Value::Long(v)) => Value::Double(*v as f64),
            (Kind::Double, Value::Double(v)) => Value::Double(*v),
            (Kind::Double, Value::Date(d)) => Value::Double(d.timestamp_millis() as f64),
            (Kind::Double, Value::String(s)) => Value::Double(s.trim().parse().ok()?),

            (Kind::Boolean, Value::Boolean(b)) => Value::Boolean(*b),
            (Kind::Boolean, Value::Long(v)) => Value::Boolean(*v != 0),
            (Kind::Boolean, Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Value::Boolean(true),
                "false" => Value::Boolean(false),
                _ => return None,
            },

            (Kind::Date, Value::Date(d)) => Value::Date(*d),
            (Kind::Date, Value::Long(ms)) => Value::Date(DateTime::<Utc>::from_timestamp_millis(*ms)?),
            (Kind::Date, Value::String(s)) => Value::Date(
                DateTime::parse_from_rfc3339(s.trim())
                    .ok()?
                    .with_timezone(&Utc),
            ),

            (Kind::Path, Value::Path(p)) => Value::Path(p.clone()),
            (Kind::Path, Value::Location(l)) => Value::Path(l.path().clone()),
            (Kind::Path, Value::String(s)) => Value::Path(Path::parse(s).ok()?),

            (Kind::Name, Value::Name(n)) => Value::Name(n.clone()),
            (Kind::Name, Value::String(s)) => Value::Name(s.clone()),
            (Kind::Name, Value::Path(p)) => Value::Name(
                p.last_segment()
                    .map(|s| s.name().to_string())
                    .unwrap_or_default(),
            ),

            (Kind::Reference, Value::Reference(id)) => Value::Reference(*id),
            (Kind::Reference, Value::String(s)) => Value::Reference(Uuid::parse_str(s.trim()).ok()?),
            (Kind::Reference, Value::Location(l)) => Value::Reference(l.id()?),

            _ => return None,
        };
        Some(converted)
    }
}

impl TypeFactory for StandardFactory {
    fn type_name(&self) -> &str {
        self.name
    }

    fn create(&self, value: &Value) -> Result<Value> {
        if let Value::List(items) = value {
            let converted = items
                .iter()
                .map(|item| self.create(item))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Value::List(converted));
        }
        self.convert(value)
            .ok_or_else(|| Error::conversion(value, self.name))
    }

    fn compare(&self, a: &Value, b: &Value) -> Ordering {
        match (self.convert(a), self.convert(b)) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            _ => a.total_cmp(b),
        }
    }

    fn length(&self, value: &Value) -> i64 {
        match value {
            Value::Null => 0,
            Value::String(s) | Value::Name(s) => s.chars().count() as i64,
            other => other.to_string().chars().count() as i64,
        }
    }
}

/// Built-in type system covering STRING, LONG, DOUBLE, BOOLEAN, DATE, PATH,
/// NAME and REFERENCE
#[derive(Debug, Clone)]
pub struct StandardTypeSystem {
    factories: Vec<StandardFactory>,
}

impl Default for StandardTypeSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl StandardTypeSystem {
    /// Create the standard type system
    pub fn new() -> Self {
        let factories = [
            (Kind::String, STRING),
            (Kind::Long, LONG),
            (Kind::Double, DOUBLE),
            (Kind::Boolean, BOOLEAN),
            (Kind::Date, DATE),
            (Kind::Path, PATH),
            (Kind::Name, NAME),
            (Kind::Reference, REFERENCE),
        ]
        .into_iter()
        .map(|(kind, name)| StandardFactory { kind, name })
        .collect();
        Self { factories }
    }
}

impl TypeSystem for StandardTypeSystem {
    fn type_factory(&self, type_name: &str) -> Option<&dyn TypeFactory> {
        self.factories
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(type_name))
            .map(|f| f as &dyn TypeFactory)
    }

    fn default_factory(&self) -> &dyn TypeFactory {
        &self.factories[0]
    }

    fn type_name_of(&self, value: &Value) -> &str {
        match value {
            Value::Long(_) => LONG,
            Value::Double(_) => DOUBLE,
            Value::Boolean(_) => BOOLEAN,
            Value::Date(_) => DATE,
            Value::Path(_) | Value::Location(_) => PATH,
            Value::Name(_) => NAME,
            Value::Reference(_) => REFERENCE,
            Value::List(items) => items
                .first()
                .map(|item| self.type_name_of(item))
                .unwrap_or(STRING),
            Value::Null | Value::String(_) => STRING,
        }
    }

    fn compatible_type(&self, left: &str, right: &str) -> String {
        if left.eq_ignore_ascii_case(LONG) && right.eq_ignore_ascii_case(LONG) {
            LONG.to_string()
        } else {
            DOUBLE.to_string()
        }
    }
}

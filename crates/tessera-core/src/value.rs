//! Values carried in tuple slots
//!
//! - [`Value`] - the opaque slot value (property values, locations, scores)
//! - [`Path`] - hierarchical node path with same-name-sibling indexes
//! - [`Location`] - the path/identity pair addressing one stored node

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// One segment of a [`Path`]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Segment {
    name: String,
    index: u32,
}

impl Segment {
    /// Create a segment; indexes start at 1
    pub fn new(name: impl Into<String>, index: u32) -> Self {
        Self {
            name: name.into(),
            index: index.max(1),
        }
    }

    /// Segment name, possibly namespace-prefixed (`jcr:content`)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Same-name-sibling index (1-based)
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Name without the namespace prefix
    pub fn local_name(&self) -> &str {
        match self.name.split_once(':') {
            Some((_, local)) => local,
            None => &self.name,
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.index > 1 {
            write!(f, "{}[{}]", self.name, self.index)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/// Absolute path of a node in the content store.
///
/// Paths order segment by segment, so an ancestor always sorts before its
/// descendants and siblings sort by name then index.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Path {
    segments: Vec<Segment>,
}

impl Path {
    /// The root path `/`
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a path from segments
    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self { segments }
    }

    /// Parse an absolute path such as `/a/b[2]/c`
    pub fn parse(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        let Some(rest) = trimmed.strip_prefix('/') else {
            return Err(Error::conversion(text, "PATH"));
        };
        if rest.is_empty() {
            return Ok(Self::root());
        }
        let mut segments = Vec::new();
        for raw in rest.trim_end_matches('/').split('/') {
            if raw.is_empty() {
                return Err(Error::conversion(text, "PATH"));
            }
            let segment = match raw.strip_suffix(']').and_then(|s| s.split_once('[')) {
                Some((name, index)) => {
                    let index: u32 = index
                        .parse()
                        .map_err(|_| Error::conversion(text, "PATH"))?;
                    if name.is_empty() || index == 0 {
                        return Err(Error::conversion(text, "PATH"));
                    }
                    Segment::new(name, index)
                }
                None => Segment::new(raw, 1),
            };
            segments.push(segment);
        }
        Ok(Self { segments })
    }

    /// Append a child segment
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(Segment::new(name, 1));
        Self { segments }
    }

    /// Segments from the root downwards
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// True for `/`
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Number of segments; the root has depth 0
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Parent path, `None` for the root
    pub fn parent(&self) -> Option<Path> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Last segment, `None` for the root
    pub fn last_segment(&self) -> Option<&Segment> {
        self.segments.last()
    }

    /// Whether `self` is a strict ancestor of `other`
    pub fn is_ancestor_of(&self, other: &Path) -> bool {
        self.segments.len() < other.segments.len()
            && other.segments[..self.segments.len()] == self.segments[..]
    }

    /// Whether `self` is a strict descendant of `other`
    pub fn is_descendant_of(&self, other: &Path) -> bool {
        other.is_ancestor_of(self)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.segments {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Path {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Path> for String {
    fn from(path: Path) -> Self {
        path.to_string()
    }
}

/// Address of one node in the backing store
///
/// Equality, hashing and ordering follow the path alone; the identifier is
/// only consulted by [`Location::is_same`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    path: Path,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<Uuid>,
}

impl Location {
    /// Location known only by path
    pub fn new(path: Path) -> Self {
        Self { path, id: None }
    }

    /// Location with both a path and a stable identifier
    pub fn with_id(path: Path, id: Uuid) -> Self {
        Self { path, id: Some(id) }
    }

    /// Parse the path and build a path-only location
    pub fn parse(path: &str) -> Result<Self> {
        Ok(Self::new(Path::parse(path)?))
    }

    /// Node path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Node identifier, if known
    pub fn id(&self) -> Option<Uuid> {
        self.id
    }

    /// Identity comparison: the paths must match, and so must the
    /// identifiers when both sides carry one
    pub fn is_same(&self, other: &Location) -> bool {
        if self.path != other.path {
            return false;
        }
        match (self.id, other.id) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

impl PartialEq for Location {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Eq for Location {}

impl std::hash::Hash for Location {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        std::hash::Hash::hash(&self.path, state);
    }
}

impl PartialOrd for Location {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Location {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path.cmp(&other.path)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "{} ({})", self.path, id),
            None => write!(f, "{}", self.path),
        }
    }
}

/// Opaque tuple slot value
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Empty slot or missing property
    #[default]
    Null,
    /// Boolean
    Boolean(bool),
    /// 64-bit integer
    Long(i64),
    /// Double precision float (also used for full-text scores)
    Double(f64),
    /// String
    String(String),
    /// Timestamp
    Date(DateTime<Utc>),
    /// Node path
    Path(Path),
    /// Qualified name
    Name(String),
    /// Node reference
    Reference(Uuid),
    /// Location marker
    Location(Location),
    /// Multi-valued property or bound variable
    List(Vec<Value>),
}

impl Value {
    /// True for [`Value::Null`]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Borrow the location stored in this slot
    pub fn as_location(&self) -> Option<&Location> {
        match self {
            Value::Location(location) => Some(location),
            _ => None,
        }
    }

    /// Numeric view of this value, if it has one
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Long(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Rank used to order values of unrelated kinds
    fn kind_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Long(_) | Value::Double(_) => 2,
            Value::Date(_) => 3,
            Value::String(_) => 4,
            Value::Name(_) => 5,
            Value::Path(_) => 6,
            Value::Reference(_) => 7,
            Value::Location(_) => 8,
            Value::List(_) => 9,
        }
    }

    /// Total order over all values: nulls first, numbers compared
    /// numerically across LONG/DOUBLE, otherwise by kind then natural order.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Long(a), Value::Long(b)) => a.cmp(b),
            (Value::Double(a), Value::Double(b)) => a.total_cmp(b),
            (Value::Long(a), Value::Double(b)) => (*a as f64).total_cmp(b),
            (Value::Double(a), Value::Long(b)) => a.total_cmp(&(*b as f64)),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::Path(a), Value::Path(b)) => a.cmp(b),
            (Value::Name(a), Value::Name(b)) => a.cmp(b),
            (Value::Reference(a), Value::Reference(b)) => a.cmp(b),
            (Value::Location(a), Value::Location(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.total_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => self.kind_rank().cmp(&other.kind_rank()),
        }
    }

    /// Convert into a plain JSON value for result rows
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Long(v) => serde_json::Value::Number((*v).into()),
            Value::Double(v) => serde_json::Number::from_f64(*v)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::List(values) => {
                serde_json::Value::Array(values.iter().map(Value::to_json).collect())
            }
            other => serde_json::Value::String(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Long(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::String(s) | Value::Name(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.to_rfc3339()),
            Value::Path(p) => write!(f, "{}", p),
            Value::Reference(id) => write!(f, "{}", id),
            Value::Location(l) => write!(f, "{}", l),
            Value::List(values) => {
                write!(f, "[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl From<&serde_json::Value> for Value {
    fn from(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(v) => Value::Long(v),
                None => Value::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from).collect()),
            serde_json::Value::Object(_) => Value::String(json.to_string()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Location> for Value {
    fn from(v: Location) -> Self {
        Value::Location(v)
    }
}

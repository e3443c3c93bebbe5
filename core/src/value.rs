//! Attribute value kinds, typed values and untyped document literals.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static INTEGER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+$").expect("static regex must compile"));
static DECIMAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^-?\d*\.\d+([eE][+-]?\d+)?$").expect("static regex must compile")
});

/// Element kind of a scalar attribute value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScalarKind {
    String,
    Boolean,
    Int,
    Long,
    Double,
}

impl ScalarKind {
    fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Int => "int",
            Self::Long => "long",
            Self::Double => "double",
        }
    }

    fn is_numeric(self) -> bool {
        matches!(self, Self::Int | Self::Long | Self::Double)
    }
}

/// The value kind of an attribute node. Doubles as the attribute's subtype.
///
/// ```
/// use metamodel_core::{ScalarKind, ValueKind};
///
/// assert_eq!(ValueKind::from_subtype("intArray"), Some(ValueKind::Array(ScalarKind::Int)));
/// assert_eq!(ValueKind::Scalar(ScalarKind::Double).subtype(), "double");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ValueKind {
    Scalar(ScalarKind),
    Array(ScalarKind),
}

impl ValueKind {
    pub const STRING: ValueKind = ValueKind::Scalar(ScalarKind::String);
    pub const BOOLEAN: ValueKind = ValueKind::Scalar(ScalarKind::Boolean);
    pub const INT: ValueKind = ValueKind::Scalar(ScalarKind::Int);
    pub const LONG: ValueKind = ValueKind::Scalar(ScalarKind::Long);
    pub const DOUBLE: ValueKind = ValueKind::Scalar(ScalarKind::Double);
    pub const STRING_ARRAY: ValueKind = ValueKind::Array(ScalarKind::String);

    /// All kinds in registration order.
    pub const ALL: [ValueKind; 10] = [
        Self::STRING,
        Self::BOOLEAN,
        Self::INT,
        Self::LONG,
        Self::DOUBLE,
        Self::STRING_ARRAY,
        ValueKind::Array(ScalarKind::Boolean),
        ValueKind::Array(ScalarKind::Int),
        ValueKind::Array(ScalarKind::Long),
        ValueKind::Array(ScalarKind::Double),
    ];

    /// Attribute subtype name for this kind.
    pub fn subtype(self) -> &'static str {
        match self {
            Self::Scalar(kind) => kind.name(),
            Self::Array(ScalarKind::String) => "stringArray",
            Self::Array(ScalarKind::Boolean) => "booleanArray",
            Self::Array(ScalarKind::Int) => "intArray",
            Self::Array(ScalarKind::Long) => "longArray",
            Self::Array(ScalarKind::Double) => "doubleArray",
        }
    }

    /// Parses an attribute subtype such as `int` or `stringArray`.
    pub fn from_subtype(subtype: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.subtype() == subtype)
    }

    /// Scalar kind of the value, or of each element for arrays.
    pub fn element(self) -> ScalarKind {
        match self {
            Self::Scalar(kind) | Self::Array(kind) => kind,
        }
    }

    pub fn is_array(self) -> bool {
        matches!(self, Self::Array(_))
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.subtype())
    }
}

impl From<ValueKind> for String {
    fn from(kind: ValueKind) -> Self {
        kind.subtype().to_string()
    }
}

impl TryFrom<String> for ValueKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        ValueKind::from_subtype(&value).ok_or_else(|| format!("unknown value kind '{value}'"))
    }
}

/// A typed scalar.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    String(String),
    Boolean(bool),
    Int(i32),
    Long(i64),
    Double(f64),
}

impl Scalar {
    pub fn kind(&self) -> ScalarKind {
        match self {
            Self::String(_) => ScalarKind::String,
            Self::Boolean(_) => ScalarKind::Boolean,
            Self::Int(_) => ScalarKind::Int,
            Self::Long(_) => ScalarKind::Long,
            Self::Double(_) => ScalarKind::Double,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Long(l) => write!(f, "{l}"),
            Self::Double(d) => write!(f, "{d}"),
        }
    }
}

/// The typed value held by an attribute node.
///
/// Arrays remember their element kind so an empty array still has a type.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Scalar(Scalar),
    Array(ScalarKind, Vec<Scalar>),
}

impl Serialize for AttributeValue {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Scalar(scalar) => scalar.serialize(serializer),
            Self::Array(_, items) => items.serialize(serializer),
        }
    }
}

impl AttributeValue {
    /// A scalar string value.
    pub fn string(value: impl Into<String>) -> Self {
        Self::Scalar(Scalar::String(value.into()))
    }

    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Scalar(scalar) => ValueKind::Scalar(scalar.kind()),
            Self::Array(kind, _) => ValueKind::Array(*kind),
        }
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Self::Scalar(scalar) => Some(scalar),
            Self::Array(..) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Scalar(Scalar::Boolean(b)) => Some(*b),
            _ => None,
        }
    }

    /// Integer value of an `int` or `long` scalar.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Scalar(Scalar::Int(i)) => Some(i64::from(*i)),
            Self::Scalar(Scalar::Long(l)) => Some(*l),
            _ => None,
        }
    }

    /// Numeric value of any numeric scalar, widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Scalar(Scalar::Int(i)) => Some(f64::from(*i)),
            Self::Scalar(Scalar::Long(l)) => Some(*l as f64),
            Self::Scalar(Scalar::Double(d)) => Some(*d),
            _ => None,
        }
    }
}

/// Arrays render as their elements joined by `,`.
impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(scalar) => write!(f, "{scalar}"),
            Self::Array(_, items) => {
                for (idx, item) in items.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                Ok(())
            }
        }
    }
}

/// A value as it appears in a source document.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Array(Vec<Literal>),
    /// Markup text with no native type. Typed lexically when a kind has to
    /// be inferred, taken verbatim when the kind is already fixed.
    Untyped(String),
}

impl Literal {
    /// Lexically types a markup text value.
    ///
    /// Markup carries no native types, so `true`/`false`, integers, decimals
    /// and `[a, b]` lists are recognized here; anything else stays text.
    ///
    /// ```
    /// use metamodel_core::Literal;
    ///
    /// assert_eq!(Literal::sniff("TRUE"), Literal::Bool(true));
    /// assert_eq!(Literal::sniff("100"), Literal::Integer(100));
    /// assert_eq!(Literal::sniff("2.5"), Literal::Float(2.5));
    /// assert_eq!(Literal::sniff("x"), Literal::Text("x".into()));
    /// ```
    pub fn sniff(text: &str) -> Literal {
        let trimmed = text.trim();
        if trimmed.eq_ignore_ascii_case("true") {
            return Literal::Bool(true);
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return Literal::Bool(false);
        }
        if INTEGER.is_match(trimmed) {
            // Too wide for a long: keep the digits rather than round them.
            return trimmed
                .parse::<i64>()
                .map(Literal::Integer)
                .unwrap_or_else(|_| Literal::Text(text.to_string()));
        }
        if DECIMAL.is_match(trimmed) {
            if let Ok(value) = trimmed.parse::<f64>() {
                return Literal::Float(value);
            }
        }
        if let Some(inner) = trimmed
            .strip_prefix('[')
            .and_then(|rest| rest.strip_suffix(']'))
        {
            let inner = inner.trim();
            if inner.is_empty() {
                return Literal::Array(Vec::new());
            }
            return Literal::Array(inner.split(',').map(sniff_element).collect());
        }
        Literal::Text(text.to_string())
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Literal::Array(_))
    }
}

fn sniff_element(raw: &str) -> Literal {
    let raw = raw.trim();
    let unquoted = raw
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .or_else(|| raw.strip_prefix('\'').and_then(|rest| rest.strip_suffix('\'')));
    match unquoted {
        Some(text) => Literal::Text(text.to_string()),
        None => Literal::sniff(raw),
    }
}

impl From<&Scalar> for Literal {
    fn from(scalar: &Scalar) -> Self {
        match scalar {
            Scalar::String(s) => Literal::Text(s.clone()),
            Scalar::Boolean(b) => Literal::Bool(*b),
            Scalar::Int(i) => Literal::Integer(i64::from(*i)),
            Scalar::Long(l) => Literal::Integer(*l),
            Scalar::Double(d) => Literal::Float(*d),
        }
    }
}

impl From<&AttributeValue> for Literal {
    fn from(value: &AttributeValue) -> Self {
        match value {
            AttributeValue::Scalar(scalar) => scalar.into(),
            AttributeValue::Array(_, items) => {
                Literal::Array(items.iter().map(Literal::from).collect())
            }
        }
    }
}

pub(crate) fn unify(kinds: impl IntoIterator<Item = ScalarKind>) -> Option<ScalarKind> {
    kinds.into_iter().reduce(|acc, kind| match (acc, kind) {
        (a, b) if a == b => a,
        (a, b) if a.is_numeric() && b.is_numeric() => a.max(b),
        _ => ScalarKind::String,
    })
}

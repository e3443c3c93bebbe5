//! Attribute value-kind inference and literal coercion.
//!
//! A kind override registered for the owning node type always wins. Without
//! one, the kind follows the literal: booleans stay boolean, integers become
//! `int` or `long` by range, decimals become `double`, text stays `string`
//! and arrays take the unified kind of their elements.

use crate::error::{MetaDataError, Result};
use crate::value::{AttributeValue, Literal, Scalar, ScalarKind, ValueKind, unify};

/// Infers a value kind from the literal alone.
///
/// ```
/// use metamodel_core::{Literal, ValueKind, infer_kind};
///
/// assert_eq!(infer_kind(&Literal::Integer(100)), ValueKind::INT);
/// assert_eq!(infer_kind(&Literal::Integer(1 << 40)), ValueKind::LONG);
/// assert_eq!(infer_kind(&Literal::Text("100".into())), ValueKind::STRING);
/// assert_eq!(infer_kind(&Literal::Array(vec![])), ValueKind::STRING_ARRAY);
/// ```
pub fn infer_kind(literal: &Literal) -> ValueKind {
    match literal {
        Literal::Untyped(text) => infer_kind(&Literal::sniff(text)),
        Literal::Array(items) => {
            let element = unify(items.iter().map(|item| match infer_kind(item) {
                ValueKind::Scalar(kind) => kind,
                ValueKind::Array(_) => ScalarKind::String,
            }));
            ValueKind::Array(element.unwrap_or(ScalarKind::String))
        }
        scalar => ValueKind::Scalar(infer_scalar(scalar)),
    }
}

fn infer_scalar(literal: &Literal) -> ScalarKind {
    match literal {
        Literal::Bool(_) => ScalarKind::Boolean,
        Literal::Integer(value) if i32::try_from(*value).is_ok() => ScalarKind::Int,
        Literal::Integer(_) => ScalarKind::Long,
        Literal::Float(_) => ScalarKind::Double,
        Literal::Text(_) | Literal::Array(_) | Literal::Untyped(_) => ScalarKind::String,
    }
}

/// Picks the kind for an attribute: the override when present, otherwise
/// the kind inferred from the literal.
pub fn resolve_kind(literal: &Literal, override_kind: Option<ValueKind>) -> ValueKind {
    override_kind.unwrap_or_else(|| infer_kind(literal))
}

/// Converts a literal into a value of `kind`.
///
/// A scalar assigned to an array kind becomes a single element, except text,
/// which is split on `,`.
pub fn coerce(name: &str, literal: &Literal, kind: ValueKind) -> Result<AttributeValue> {
    let invalid = || MetaDataError::InvalidAttributeValue {
        name: name.to_string(),
        kind: kind.to_string(),
        value: render(literal),
    };
    match (kind, literal) {
        (ValueKind::Array(_), Literal::Untyped(text)) => match Literal::sniff(text) {
            sniffed @ Literal::Array(_) => coerce(name, &sniffed, kind),
            _ => coerce(name, &Literal::Text(text.clone()), kind),
        },
        (_, Literal::Untyped(text)) => coerce(name, &Literal::Text(text.clone()), kind),
        (ValueKind::Scalar(ScalarKind::String), Literal::Array(_)) => {
            Ok(AttributeValue::string(render(literal)))
        }
        (ValueKind::Scalar(_), Literal::Array(_)) => Err(invalid()),
        (ValueKind::Scalar(element), scalar) => coerce_scalar(scalar, element)
            .map(AttributeValue::Scalar)
            .ok_or_else(invalid),
        (ValueKind::Array(element), Literal::Array(items)) => items
            .iter()
            .map(|item| coerce_scalar(item, element))
            .collect::<Option<Vec<_>>>()
            .map(|items| AttributeValue::Array(element, items))
            .ok_or_else(invalid),
        (ValueKind::Array(element), Literal::Text(text)) => {
            if text.trim().is_empty() {
                return Ok(AttributeValue::Array(element, Vec::new()));
            }
            text.split(',')
                .map(|part| coerce_scalar(&Literal::Text(part.trim().to_string()), element))
                .collect::<Option<Vec<_>>>()
                .map(|items| AttributeValue::Array(element, items))
                .ok_or_else(invalid)
        }
        (ValueKind::Array(element), scalar) => coerce_scalar(scalar, element)
            .map(|item| AttributeValue::Array(element, vec![item]))
            .ok_or_else(invalid),
    }
}

fn coerce_scalar(literal: &Literal, kind: ScalarKind) -> Option<Scalar> {
    match kind {
        ScalarKind::String => Some(Scalar::String(render(literal))),
        ScalarKind::Boolean => match literal {
            Literal::Bool(value) => Some(Scalar::Boolean(*value)),
            Literal::Text(text) if text.trim().eq_ignore_ascii_case("true") => {
                Some(Scalar::Boolean(true))
            }
            Literal::Text(text) if text.trim().eq_ignore_ascii_case("false") => {
                Some(Scalar::Boolean(false))
            }
            _ => None,
        },
        ScalarKind::Int => as_integer(literal)
            .and_then(|value| i32::try_from(value).ok())
            .map(Scalar::Int),
        ScalarKind::Long => as_integer(literal).map(Scalar::Long),
        ScalarKind::Double => match literal {
            Literal::Integer(value) => Some(Scalar::Double(*value as f64)),
            Literal::Float(value) => Some(Scalar::Double(*value)),
            Literal::Text(text) => text.trim().parse().ok().map(Scalar::Double),
            _ => None,
        },
    }
}

fn as_integer(literal: &Literal) -> Option<i64> {
    match literal {
        Literal::Integer(value) => Some(*value),
        Literal::Float(value) if value.fract() == 0.0 && value.abs() < i64::MAX as f64 => {
            Some(*value as i64)
        }
        Literal::Text(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Renders a literal the way a string attribute stores it.
pub fn render(literal: &Literal) -> String {
    match literal {
        Literal::Bool(value) => value.to_string(),
        Literal::Integer(value) => value.to_string(),
        Literal::Float(value) => value.to_string(),
        Literal::Text(text) | Literal::Untyped(text) => text.clone(),
        Literal::Array(items) => items.iter().map(render).collect::<Vec<_>>().join(","),
    }
}

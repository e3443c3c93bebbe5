//! JSON front end.
//!
//! ```json
//! {"metadata": {
//!   "package": "acme::vehicle",
//!   "children": [
//!     {"object": {"name": "Car", "@description": "A car", "children": [
//!       {"field": {"name": "wheels", "subType": "int", "@maxValue": 8}},
//!       {"attr": {"name": "tags", "subType": "stringArray", "value": ["fast", "red"]}}
//!     ]}}
//!   ]
//! }}
//! ```
//!
//! Each child entry is an object with a single key naming the type.
//! Attribute values use `@`-prefixed keys and keep their JSON types.

use metamodel_core::{Declaration, Literal, MetaTree, NodeId, type_names};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::parser::{DocumentBuilder, LoadReport, ParseOptions};

const ATTRIBUTE_PREFIX: char = '@';

const RESERVED: &[&str] = &[
    "name",
    "subType",
    "type",
    "package",
    "defaultPackage",
    "super",
    "children",
    "overlay",
    "value",
];

/// Keys applied as attributes even without the `@` prefix.
const BARE_ATTRIBUTES: &[&str] = &["isAbstract"];

pub(crate) fn parse(
    tree: &mut MetaTree,
    document: &str,
    content: &str,
    options: ParseOptions,
    report: &mut LoadReport,
) -> Result<()> {
    let value: Value = serde_json::from_str(content)?;
    let metadata = value.get(type_names::METADATA).and_then(Value::as_object);
    let package = metadata
        .and_then(|m| m.get("package").or_else(|| m.get("defaultPackage")))
        .and_then(Value::as_str)
        .unwrap_or_default();

    let mut builder = DocumentBuilder::new(tree, document, package, options, report);
    let Some(metadata) = metadata else {
        return Err(builder.invalid("expected a top-level \"metadata\" object"));
    };
    let parent = builder.root();
    if let Some(children) = children_key(metadata).and_then(|key| metadata[key].as_array()) {
        walk(&mut builder, children, parent)?;
    }
    Ok(())
}

/// `children`, or else the first unreserved array-valued key.
fn children_key(fields: &Map<String, Value>) -> Option<&str> {
    if fields.contains_key("children") {
        return Some("children");
    }
    fields
        .iter()
        .find(|(key, value)| is_fallback_children(key, value))
        .map(|(key, _)| key.as_str())
}

fn is_fallback_children(key: &str, value: &Value) -> bool {
    value.is_array()
        && !key.starts_with(ATTRIBUTE_PREFIX)
        && !RESERVED.contains(&key)
        && !BARE_ATTRIBUTES.contains(&key)
}

fn walk(builder: &mut DocumentBuilder<'_, '_>, entries: &[Value], parent: NodeId) -> Result<()> {
    for entry in entries {
        let Some(object) = entry.as_object() else {
            return Err(builder.invalid(format!("child entries must be objects, found {entry}")));
        };
        let mut keys = object.iter();
        let (Some((type_name, body)), None) = (keys.next(), keys.next()) else {
            return Err(builder.invalid(format!(
                "child entries must have exactly one type key, found {} keys",
                object.len()
            )));
        };

        if type_name == type_names::ATTR {
            attr_node(builder, body, parent)?;
        } else if builder.knows_type(type_name) {
            node(builder, type_name, body, parent)?;
        } else {
            builder.unknown_element(parent, type_name)?;
        }
    }
    Ok(())
}

fn node(
    builder: &mut DocumentBuilder<'_, '_>,
    type_name: &str,
    body: &Value,
    parent: NodeId,
) -> Result<()> {
    let Some(fields) = body.as_object() else {
        return Err(builder.invalid(format!("{type_name} entry must be an object")));
    };
    let text = |key: &str| fields.get(key).and_then(Value::as_str);
    let declaration = Declaration {
        type_name,
        subtype: text("subType").or_else(|| text("type")),
        name: text("name"),
        package: text("package"),
        super_ref: text("super"),
        overlay: fields.get("overlay").is_some_and(is_true),
    };
    let id = builder.declare(parent, &declaration)?;

    let children = children_key(fields);
    if let Some(entries) = children.and_then(|key| fields[key].as_array()) {
        walk(builder, entries, id)?;
    }

    for (key, value) in fields {
        if let Some(name) = key.strip_prefix(ATTRIBUTE_PREFIX) {
            if let Some(literal) = to_literal(builder, value)? {
                builder.literal(id, name, &literal)?;
            }
        } else if BARE_ATTRIBUTES.contains(&key.as_str()) {
            if let Some(literal) = to_literal(builder, value)? {
                builder.literal(id, key, &literal)?;
            }
        } else if RESERVED.contains(&key.as_str()) || children == Some(key.as_str()) {
            continue;
        } else {
            builder.ignored_key(id, key, "attribute keys must start with '@'")?;
        }
    }
    builder.finish(id)
}

fn attr_node(builder: &mut DocumentBuilder<'_, '_>, body: &Value, parent: NodeId) -> Result<()> {
    let Some(fields) = body.as_object() else {
        return Err(builder.invalid("attr entry must be an object"));
    };
    let Some(name) = fields.get("name").and_then(Value::as_str) else {
        return Err(builder.invalid("attr entry requires a name"));
    };
    let subtype = fields
        .get("subType")
        .or_else(|| fields.get("type"))
        .and_then(Value::as_str);
    let literal = match fields.get("value") {
        Some(value) => to_literal(builder, value)?,
        None => None,
    };
    builder.attribute(parent, name, subtype, literal.as_ref())
}

fn is_true(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => s.eq_ignore_ascii_case("true"),
        _ => false,
    }
}

/// Converts a JSON value to a literal. `null` means "no value".
fn to_literal(builder: &DocumentBuilder<'_, '_>, value: &Value) -> Result<Option<Literal>> {
    let literal = match value {
        Value::Null => return Ok(None),
        Value::Bool(b) => Literal::Bool(*b),
        Value::Number(number) => match number.as_i64() {
            Some(i) => Literal::Integer(i),
            None => Literal::Float(number.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => Literal::Text(s.clone()),
        Value::Array(items) => {
            let mut elements = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::Array(_) | Value::Object(_) => {
                        return Err(builder.invalid(format!(
                            "array attribute values must hold scalars, found {item}"
                        )));
                    }
                    other => {
                        if let Some(element) = to_literal(builder, other)? {
                            elements.push(element);
                        }
                    }
                }
            }
            Literal::Array(elements)
        }
        Value::Object(_) => {
            return Err(builder.invalid(format!(
                "attribute values must be literals, found {value}"
            )));
        }
    };
    Ok(Some(literal))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use metamodel_core::{AttributeValue, Scalar, ScalarKind, TypeRegistry, ValueKind};

    use super::*;
    use crate::error::LoaderError;

    fn load(content: &str, options: ParseOptions) -> Result<(MetaTree, LoadReport)> {
        let mut tree = MetaTree::new(Arc::new(TypeRegistry::with_builtins().unwrap())).unwrap();
        let mut report = LoadReport::default();
        parse(&mut tree, "test.json", content, options, &mut report)?;
        Ok((tree, report))
    }

    #[test]
    fn test_native_types_are_kept() {
        let (tree, _) = load(
            r#"{"metadata": {"package": "acme", "children": [
                 {"object": {"name": "Car", "@code": "007", "@rank": 3, "@big": 9999999999,
                             "@ratio": 0.5, "@sizes": [1, 2], "isAbstract": true}}
               ]}}"#,
            ParseOptions::default(),
        )
        .unwrap();
        let car = tree.own_child(tree.root(), "object", "acme::Car").unwrap();
        let kind = |name| tree.attribute_value(car, name).unwrap().map(|v| v.kind());
        assert_eq!(kind("code"), Some(ValueKind::STRING));
        assert_eq!(kind("rank"), Some(ValueKind::INT));
        assert_eq!(kind("big"), Some(ValueKind::LONG));
        assert_eq!(kind("ratio"), Some(ValueKind::DOUBLE));
        assert_eq!(kind("sizes"), Some(ValueKind::Array(ScalarKind::Int)));
        assert_eq!(
            tree.attribute_value(car, "isAbstract").unwrap(),
            Some(&AttributeValue::Scalar(Scalar::Boolean(true)))
        );
    }

    #[test]
    fn test_fallback_children_key() {
        let (tree, _) = load(
            r#"{"metadata": {"package": "acme", "objects": [
                 {"object": {"name": "Car", "fields": [{"field": {"name": "vin"}}]}}
               ]}}"#,
            ParseOptions::default(),
        )
        .unwrap();
        let car = tree.own_child(tree.root(), "object", "acme::Car").unwrap();
        assert!(tree.own_child(car, "field", "vin").is_some());
    }

    #[test]
    fn test_unprefixed_scalar_key() {
        let content = r#"{"metadata": {"children": [{"object": {"name": "Car", "color": "red"}}]}}"#;
        let (tree, report) = load(content, ParseOptions::default()).unwrap();
        let car = tree.own_child(tree.root(), "object", "Car").unwrap();
        assert!(tree.attribute_value(car, "color").unwrap().is_none());
        assert_eq!(report.ignored, vec!["object:Car: color".to_string()]);

        let strict = ParseOptions {
            strict: true,
            ..ParseOptions::default()
        };
        assert!(matches!(
            load(content, strict),
            Err(LoaderError::InvalidDocument { .. })
        ));
    }

    #[test]
    fn test_attr_entries() {
        let (tree, _) = load(
            r#"{"metadata": {"children": [{"object": {"name": "Car", "children": [
                 {"attr": {"name": "tags", "subType": "stringArray", "value": ["fast", "red"]}},
                 {"attr": {"name": "note", "value": "x"}}
               ]}}]}}"#,
            ParseOptions::default(),
        )
        .unwrap();
        let car = tree.own_child(tree.root(), "object", "Car").unwrap();
        assert_eq!(tree.attribute_value(car, "tags").unwrap().unwrap().to_string(), "fast,red");
        assert_eq!(
            tree.attribute_value(car, "note").unwrap(),
            Some(&AttributeValue::string("x"))
        );
    }

    #[test]
    fn test_entry_with_two_keys_is_invalid() {
        let err = load(
            r#"{"metadata": {"children": [{"object": {"name": "A"}, "field": {"name": "b"}}]}}"#,
            ParseOptions::default(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, LoaderError::InvalidDocument { .. }));
    }

    #[test]
    fn test_missing_metadata_key() {
        let err = load(r#"{"types": []}"#, ParseOptions::default()).err().unwrap();
        assert!(matches!(err, LoaderError::InvalidDocument { .. }));
    }
}

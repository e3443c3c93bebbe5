//! XML front end.
//!
//! ```xml
//! <metadata package="acme::vehicle">
//!   <object name="Car" super="..::common::Base" description="A car">
//!     <field name="wheels" subType="int" maxValue="8"/>
//!     <attr name="tags" subType="stringArray">fast,red</attr>
//!   </object>
//! </metadata>
//! ```
//!
//! Elements are node declarations named by their type. `<children>` is an
//! optional wrapper. XML attributes other than the reserved ones become
//! inline attribute values; their text carries no type of its own.

use metamodel_core::{Declaration, Literal, MetaTree, NodeId, type_names};
use roxmltree::{Document, Node};

use crate::error::Result;
use crate::parser::{DocumentBuilder, LoadReport, ParseOptions};

const CHILDREN: &str = "children";

const RESERVED: &[&str] = &["name", "subType", "type", "package", "super", "overlay"];

pub(crate) fn parse(
    tree: &mut MetaTree,
    document: &str,
    content: &str,
    options: ParseOptions,
    report: &mut LoadReport,
) -> Result<()> {
    let xml = Document::parse(content)?;
    let root = xml.root_element();
    let package = root
        .attribute("package")
        .or_else(|| root.attribute("defaultPackage"))
        .unwrap_or_default();

    let mut builder = DocumentBuilder::new(tree, document, package, options, report);
    if root.tag_name().name() != type_names::METADATA {
        return Err(builder.invalid(format!(
            "root element must be <metadata>, found <{}>",
            root.tag_name().name()
        )));
    }
    let parent = builder.root();
    walk(&mut builder, root, parent)
}

fn walk(
    builder: &mut DocumentBuilder<'_, '_>,
    element: Node<'_, '_>,
    parent: NodeId,
) -> Result<()> {
    for child in element.children().filter(Node::is_element) {
        let tag = child.tag_name().name();
        if tag == CHILDREN {
            walk(builder, child, parent)?;
        } else if tag == type_names::ATTR {
            attr_element(builder, child, parent)?;
        } else if builder.knows_type(tag) {
            node_element(builder, child, parent)?;
        } else {
            builder.unknown_element(parent, tag)?;
        }
    }
    Ok(())
}

fn node_element(
    builder: &mut DocumentBuilder<'_, '_>,
    element: Node<'_, '_>,
    parent: NodeId,
) -> Result<()> {
    let declaration = Declaration {
        type_name: element.tag_name().name(),
        subtype: element.attribute("subType").or_else(|| element.attribute("type")),
        name: element.attribute("name"),
        package: element.attribute("package"),
        super_ref: element.attribute("super"),
        overlay: element
            .attribute("overlay")
            .is_some_and(|v| v.trim().eq_ignore_ascii_case("true")),
    };
    let id = builder.declare(parent, &declaration)?;

    walk(builder, element, id)?;

    for attribute in element.attributes() {
        if attribute.namespace().is_some() || RESERVED.contains(&attribute.name()) {
            continue;
        }
        builder.literal(id, attribute.name(), &Literal::Untyped(attribute.value().to_string()))?;
    }
    builder.finish(id)
}

fn attr_element(
    builder: &mut DocumentBuilder<'_, '_>,
    element: Node<'_, '_>,
    parent: NodeId,
) -> Result<()> {
    let Some(name) = element.attribute("name") else {
        return Err(builder.invalid("<attr> requires a name attribute"));
    };
    let subtype = element.attribute("subType").or_else(|| element.attribute("type"));
    let text: String = element
        .children()
        .filter(Node::is_text)
        .filter_map(|node| node.text())
        .collect();
    let raw = element
        .attribute("value")
        .map(str::to_string)
        .or_else(|| Some(text.trim().to_string()).filter(|t| !t.is_empty()));
    let literal = raw.map(Literal::Untyped);
    builder.attribute(parent, name, subtype, literal.as_ref())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use metamodel_core::{AttributeValue, Scalar, TypeRegistry, ValueKind};

    use super::*;
    use crate::error::LoaderError;

    fn load(content: &str, options: ParseOptions) -> Result<MetaTree> {
        let mut tree = MetaTree::new(Arc::new(TypeRegistry::with_builtins().unwrap())).unwrap();
        let mut report = LoadReport::default();
        parse(&mut tree, "test.xml", content, options, &mut report)?;
        Ok(tree)
    }

    #[test]
    fn test_children_wrapper_and_inline_attributes() {
        let tree = load(
            r#"<metadata package="acme">
                 <children>
                   <object name="Car">
                     <children>
                       <field name="vin" required="true" maxLength="17" zip="007"/>
                     </children>
                   </object>
                 </children>
               </metadata>"#,
            ParseOptions::default(),
        )
        .unwrap();
        let car = tree.own_child(tree.root(), "object", "acme::Car").unwrap();
        let vin = tree.own_child(car, "field", "vin").unwrap();
        assert_eq!(
            tree.attribute_value(vin, "required").unwrap(),
            Some(&AttributeValue::Scalar(Scalar::Boolean(true)))
        );
        assert_eq!(
            tree.attribute_value(vin, "maxLength").unwrap(),
            Some(&AttributeValue::Scalar(Scalar::Int(17)))
        );
        assert_eq!(
            tree.attribute_value(vin, "zip").unwrap().map(|v| v.kind()),
            Some(ValueKind::INT)
        );
    }

    #[test]
    fn test_attr_element_text_and_subtype() {
        let tree = load(
            r#"<metadata package="acme">
                 <object name="Car">
                   <attr name="tags" subType="stringArray">fast, red</attr>
                   <attr name="code" subType="string">007</attr>
                   <attr name="weight" value="1.5"/>
                 </object>
               </metadata>"#,
            ParseOptions::default(),
        )
        .unwrap();
        let car = tree.own_child(tree.root(), "object", "acme::Car").unwrap();
        assert_eq!(tree.attribute_value(car, "tags").unwrap().unwrap().to_string(), "fast,red");
        assert_eq!(
            tree.attribute_value(car, "code").unwrap(),
            Some(&AttributeValue::string("007"))
        );
        assert_eq!(
            tree.attribute_value(car, "weight").unwrap(),
            Some(&AttributeValue::Scalar(Scalar::Double(1.5)))
        );
    }

    #[test]
    fn test_unknown_element_strict() {
        let content = r#"<metadata><layout name="grid"/></metadata>"#;
        assert!(load(content, ParseOptions::default()).is_ok());

        let strict = ParseOptions {
            strict: true,
            ..ParseOptions::default()
        };
        let err = load(content, strict).err().unwrap();
        assert!(matches!(err, LoaderError::MetaData { .. }));
    }

    #[test]
    fn test_unknown_subtype_is_fatal() {
        let err = load(
            r#"<metadata><field name="id" subType="uuid"/></metadata>"#,
            ParseOptions::default(),
        )
        .err()
        .unwrap();
        match err {
            LoaderError::MetaData { path, source, .. } => {
                assert_eq!(path, "field:id");
                assert!(matches!(source, metamodel_core::MetaDataError::TypeNotFound { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_wrong_root_element() {
        let err = load("<types/>", ParseOptions::default()).err().unwrap();
        assert!(matches!(err, LoaderError::InvalidDocument { .. }));
    }

    #[test]
    fn test_malformed_xml() {
        let err = load("<metadata>", ParseOptions::default()).err().unwrap();
        assert!(matches!(err, LoaderError::XmlError(_)));
    }
}

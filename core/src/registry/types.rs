//! Declarations held by the registry: bindings, child rules and attribute
//! rules.

use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::ValueKind;

/// Matches any type, subtype or name in a [`ChildRule`].
pub const WILDCARD: &str = "*";

/// Well-known type names.
pub mod type_names {
    pub const METADATA: &str = "metadata";
    pub const OBJECT: &str = "object";
    pub const FIELD: &str = "field";
    pub const ATTR: &str = "attr";
    pub const VALIDATOR: &str = "validator";
    pub const KEY: &str = "key";
    pub const VIEW: &str = "view";
}

/// Structural role of a node, fixed by its `(type, subtype)` declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "valueKind")]
pub enum NodeKind {
    Root,
    Object,
    Field,
    Attribute(ValueKind),
    Validator,
    Key,
    View,
    Other,
}

impl NodeKind {
    /// Derives the kind a `(type, subtype)` pair naturally maps to.
    pub fn for_type(type_name: &str, subtype: &str) -> NodeKind {
        match type_name {
            type_names::METADATA => NodeKind::Root,
            type_names::OBJECT => NodeKind::Object,
            type_names::FIELD => NodeKind::Field,
            type_names::ATTR => {
                NodeKind::Attribute(ValueKind::from_subtype(subtype).unwrap_or(ValueKind::STRING))
            }
            type_names::VALIDATOR => NodeKind::Validator,
            type_names::KEY => NodeKind::Key,
            type_names::VIEW => NodeKind::View,
            _ => NodeKind::Other,
        }
    }
}

/// What a `(type, subtype)` pair is bound to.
///
/// Two registrations of the same pair are compatible only when their
/// bindings are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Binding {
    pub kind: NodeKind,
    /// Implementation identifier, e.g. `field.string`.
    pub implementation: Cow<'static, str>,
}

impl Binding {
    pub fn new(kind: NodeKind, implementation: impl Into<Cow<'static, str>>) -> Self {
        Self {
            kind,
            implementation: implementation.into(),
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.implementation)
    }
}

/// An allow or deny rule for children of a declaration.
///
/// `seq` orders rules registry-wide; the registry assigns it on
/// registration and the first matching rule by `seq` wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildRule {
    pub child_type: String,
    pub child_subtype: String,
    pub child_name: String,
    pub allow: bool,
    #[serde(skip)]
    pub seq: u64,
}

impl ChildRule {
    pub fn allow(
        child_type: impl Into<String>,
        child_subtype: impl Into<String>,
        child_name: impl Into<String>,
    ) -> Self {
        Self {
            child_type: child_type.into(),
            child_subtype: child_subtype.into(),
            child_name: child_name.into(),
            allow: true,
            seq: 0,
        }
    }

    pub fn deny(
        child_type: impl Into<String>,
        child_subtype: impl Into<String>,
        child_name: impl Into<String>,
    ) -> Self {
        Self {
            allow: false,
            ..Self::allow(child_type, child_subtype, child_name)
        }
    }

    /// True when every part of the rule matches the child, `*` matching anything.
    pub fn matches(&self, child_type: &str, child_subtype: &str, child_name: &str) -> bool {
        pattern_matches(&self.child_type, child_type)
            && pattern_matches(&self.child_subtype, child_subtype)
            && pattern_matches(&self.child_name, child_name)
    }
}

impl fmt::Display for ChildRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}.{}:{}",
            if self.allow { "" } else { "!" },
            self.child_type,
            self.child_subtype,
            self.child_name
        )
    }
}

fn pattern_matches(pattern: &str, value: &str) -> bool {
    pattern == WILDCARD || pattern == value
}

/// Fixes the value kind of a named attribute on a declaration.
///
/// Registering an attribute rule also allows an `attr` child of that name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeRule {
    pub name: String,
    pub kind: ValueKind,
    #[serde(skip)]
    pub seq: u64,
}

impl AttributeRule {
    pub fn new(name: impl Into<String>, kind: ValueKind) -> Self {
        Self {
            name: name.into(),
            kind,
            seq: 0,
        }
    }

    pub(crate) fn implied_child_rule(&self) -> ChildRule {
        ChildRule {
            seq: self.seq,
            ..ChildRule::allow(type_names::ATTR, self.kind.subtype(), self.name.clone())
        }
    }
}

/// A full declaration for one `(type, subtype)` pair.
///
/// # Examples
///
/// ```
/// use metamodel_core::*;
///
/// let binding = Binding::new(NodeKind::Field, "field.currency");
/// let decl = TypeDeclaration::new("field", "currency", binding)
///     .with_description("Monetary amount")
///     .inherits("field", "decimal")
///     .with_attribute("currencyCode", ValueKind::STRING);
///
/// assert_eq!(decl.inherits_from, Some(("field".to_string(), "decimal".to_string())));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDeclaration {
    pub type_name: String,
    pub subtype: String,
    pub binding: Binding,
    pub description: Option<String>,
    /// Name used when a node of this type is declared without one.
    pub default_name: Option<String>,
    /// Prefix for generated names when no default name exists.
    pub name_prefix: Option<String>,
    pub inherits_from: Option<(String, String)>,
    /// Marks this subtype as the type's default.
    pub is_default: bool,
    pub children: Vec<ChildRule>,
    pub attributes: Vec<AttributeRule>,
}

impl TypeDeclaration {
    pub fn new(type_name: impl Into<String>, subtype: impl Into<String>, binding: Binding) -> Self {
        Self {
            type_name: type_name.into(),
            subtype: subtype.into(),
            binding,
            description: None,
            default_name: None,
            name_prefix: None,
            inherits_from: None,
            is_default: false,
            children: Vec::new(),
            attributes: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_default_name(mut self, name: impl Into<String>) -> Self {
        self.default_name = Some(name.into());
        self
    }

    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = Some(prefix.into());
        self
    }

    pub fn inherits(mut self, type_name: impl Into<String>, subtype: impl Into<String>) -> Self {
        self.inherits_from = Some((type_name.into(), subtype.into()));
        self
    }

    /// Marks this subtype as the type's default.
    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn accepts(
        mut self,
        child_type: impl Into<String>,
        child_subtype: impl Into<String>,
        child_name: impl Into<String>,
    ) -> Self {
        self.children
            .push(ChildRule::allow(child_type, child_subtype, child_name));
        self
    }

    pub fn rejects(
        mut self,
        child_type: impl Into<String>,
        child_subtype: impl Into<String>,
        child_name: impl Into<String>,
    ) -> Self {
        self.children
            .push(ChildRule::deny(child_type, child_subtype, child_name));
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.attributes.push(AttributeRule::new(name, kind));
        self
    }

    /// `type.subtype`, the form used by `inherits` references.
    pub fn id(&self) -> String {
        format!("{}.{}", self.type_name, self.subtype)
    }
}

/// Additional rules for an existing type, or one of its subtypes.
///
/// Extensions only add rules. They never replace a binding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypeExtension {
    pub type_name: String,
    /// `None` applies the rules to every subtype of the type.
    pub subtype: Option<String>,
    pub children: Vec<ChildRule>,
    pub attributes: Vec<AttributeRule>,
}

impl TypeExtension {
    pub fn for_type(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            ..Self::default()
        }
    }

    pub fn for_subtype(type_name: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            subtype: Some(subtype.into()),
            ..Self::default()
        }
    }

    pub fn accepts(
        mut self,
        child_type: impl Into<String>,
        child_subtype: impl Into<String>,
        child_name: impl Into<String>,
    ) -> Self {
        self.children
            .push(ChildRule::allow(child_type, child_subtype, child_name));
        self
    }

    pub fn rejects(
        mut self,
        child_type: impl Into<String>,
        child_subtype: impl Into<String>,
        child_name: impl Into<String>,
    ) -> Self {
        self.children
            .push(ChildRule::deny(child_type, child_subtype, child_name));
        self
    }

    pub fn with_attribute(mut self, name: impl Into<String>, kind: ValueKind) -> Self {
        self.attributes.push(AttributeRule::new(name, kind));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_wildcards() {
        let rule = ChildRule::allow("field", WILDCARD, WILDCARD);
        assert!(rule.matches("field", "int", "age"));
        assert!(!rule.matches("attr", "int", "age"));

        let named = ChildRule::deny(WILDCARD, WILDCARD, "secret");
        assert!(named.matches("attr", "string", "secret"));
        assert!(!named.matches("attr", "string", "public"));
    }

    #[test]
    fn test_attribute_rule_implies_child_rule() {
        let rule = AttributeRule::new("maxLength", ValueKind::INT);
        let child = rule.implied_child_rule();
        assert!(child.allow);
        assert!(child.matches("attr", "int", "maxLength"));
        assert!(!child.matches("attr", "string", "maxLength"));
    }

    #[test]
    fn test_node_kind_for_type() {
        assert_eq!(NodeKind::for_type("metadata", "base"), NodeKind::Root);
        assert_eq!(
            NodeKind::for_type("attr", "doubleArray"),
            NodeKind::Attribute(ValueKind::Array(crate::ScalarKind::Double))
        );
        assert_eq!(NodeKind::for_type("layout", "grid"), NodeKind::Other);
    }
}

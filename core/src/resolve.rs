//! Declaration resolution: naming, overlay find-or-create, super references
//! and typed attribute assignment.
//!
//! Parsers describe each element as a [`Declaration`] and hand it to a
//! [`Resolver`], which decides whether it creates a node, overlays an
//! existing one or overloads an inherited one.

use tracing::{debug, warn};

use crate::error::{MetaDataError, Result};
use crate::infer::{coerce, infer_kind};
use crate::name::{
    PKG_SEPARATOR, expand_package_ref, qualify, split_qualified, validate_name, validate_package,
};
use crate::registry::{NodeKind, WILDCARD, field_value_kind, type_names};
use crate::tree::{MetaTree, NewNode, NodeId};
use crate::value::{Literal, ValueKind};

/// One node declaration as read from a document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Declaration<'a> {
    pub type_name: &'a str,
    pub subtype: Option<&'a str>,
    pub name: Option<&'a str>,
    pub package: Option<&'a str>,
    pub super_ref: Option<&'a str>,
    /// Requires the node to exist already.
    pub overlay: bool,
}

impl<'a> Declaration<'a> {
    pub fn new(type_name: &'a str) -> Self {
        Self {
            type_name,
            ..Self::default()
        }
    }

    pub fn subtype(mut self, subtype: &'a str) -> Self {
        self.subtype = Some(subtype);
        self
    }

    pub fn name(mut self, name: &'a str) -> Self {
        self.name = Some(name);
        self
    }

    pub fn package(mut self, package: &'a str) -> Self {
        self.package = Some(package);
        self
    }

    pub fn super_ref(mut self, reference: &'a str) -> Self {
        self.super_ref = Some(reference);
        self
    }

    pub fn overlay(mut self, overlay: bool) -> Self {
        self.overlay = overlay;
        self
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Applies declarations from one document to a tree.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use metamodel_core::*;
///
/// let mut tree = MetaTree::new(Arc::new(TypeRegistry::with_builtins().unwrap())).unwrap();
/// let root = tree.root();
/// let mut resolver = Resolver::new(&mut tree, "acme::vehicle");
///
/// let car = resolver.declare(root, &Declaration::new("object").name("Car")).unwrap();
/// resolver.apply_literal(car, "description", &Literal::Text("A car".into())).unwrap();
///
/// assert_eq!(tree.node(car).name(), "acme::vehicle::Car");
/// ```
pub struct Resolver<'t> {
    tree: &'t mut MetaTree,
    default_package: String,
    enforce_names: bool,
}

impl<'t> Resolver<'t> {
    /// Resolves against `tree`, placing root-level nodes in `default_package`.
    pub fn new(tree: &'t mut MetaTree, default_package: impl Into<String>) -> Self {
        Self {
            tree,
            default_package: default_package.into(),
            enforce_names: true,
        }
    }

    /// Toggles the name pattern check on short names and package segments.
    /// On by default.
    pub fn enforce_names(mut self, enforce: bool) -> Self {
        self.enforce_names = enforce;
        self
    }

    pub fn tree(&self) -> &MetaTree {
        &*self.tree
    }

    pub fn default_package(&self) -> &str {
        &self.default_package
    }

    /// Nearest non-empty package at or above `id`.
    fn package_for(&self, id: NodeId) -> Option<&str> {
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.tree.node(node_id);
            if !node.package().is_empty() {
                return Some(node.package());
            }
            current = node.parent();
        }
        None
    }

    fn describe(&self, parent: NodeId, type_name: &str, name: &str) -> String {
        let path = self.tree.path(parent);
        if path == "/" {
            format!("{type_name}:{name}")
        } else {
            format!("{path}/{type_name}:{name}")
        }
    }

    /// Resolves the package a declaration lands in.
    ///
    /// Root-level nodes default to the document package. Nested nodes keep
    /// simple names unless they name a package.
    fn package_of(&self, parent: NodeId, explicit: Option<&str>) -> Result<String> {
        let is_root_level = parent == self.tree.root();
        match explicit {
            Some(package) => {
                let base = if is_root_level {
                    self.default_package.as_str()
                } else {
                    self.package_for(parent).unwrap_or(&self.default_package)
                };
                expand_package_ref(base, package)
            }
            None if is_root_level => Ok(self.default_package.clone()),
            None => Ok(String::new()),
        }
    }

    fn generate_name(
        &self,
        parent: NodeId,
        type_name: &str,
        subtype: Option<&str>,
        package: &str,
    ) -> Result<String> {
        let declaration = self.tree.registry().resolve(type_name, subtype)?;
        if let Some(name) = declaration.default_name {
            return Ok(name);
        }
        let Some(prefix) = declaration.name_prefix else {
            return Err(MetaDataError::MissingName {
                type_name: declaration.type_name,
                subtype: declaration.subtype,
            });
        };
        let mut counter = 1usize;
        loop {
            let candidate = format!("{prefix}{counter}");
            if self
                .tree
                .own_child(parent, type_name, &qualify(package, &candidate))
                .is_none()
            {
                return Ok(candidate);
            }
            counter += 1;
        }
    }

    /// Creates or overlays the node a declaration describes.
    ///
    /// The same `(type, name)` under the same parent always yields the same
    /// node. A name that is only inherited is overloaded: a local node is
    /// created whose super is the inherited one.
    pub fn declare(&mut self, parent: NodeId, declaration: &Declaration<'_>) -> Result<NodeId> {
        let type_name = declaration.type_name;
        let subtype = present(declaration.subtype).filter(|s| *s != WILDCARD);

        let mut explicit_package = present(declaration.package).map(str::to_string);
        let short_name = match present(declaration.name) {
            Some(name) if name.contains(PKG_SEPARATOR) && explicit_package.is_none() => {
                let (package, short) = split_qualified(name);
                explicit_package = Some(package.to_string());
                short.to_string()
            }
            Some(name) => name.to_string(),
            None => {
                let package = self.package_of(parent, explicit_package.as_deref())?;
                self.generate_name(parent, type_name, subtype, &package)?
            }
        };
        let package = self.package_of(parent, explicit_package.as_deref())?;
        if self.enforce_names {
            validate_name(type_name, &short_name)?;
            validate_package(type_name, &package)?;
        }
        let qualified = qualify(&package, &short_name);

        if let Some(existing) = self.tree.own_child(parent, type_name, &qualified) {
            let current = self.tree.node(existing).subtype().to_string();
            if let Some(requested) = subtype {
                if requested != current {
                    return Err(MetaDataError::DuplicateChild {
                        node: self.tree.path(existing),
                        existing: current,
                        requested: requested.to_string(),
                    });
                }
            }
            if let Some(reference) = present(declaration.super_ref) {
                self.attach_super(existing, reference)?;
            }
            debug!(path = %self.tree.path(existing), "overlaying existing node");
            return Ok(existing);
        }

        if parent != self.tree.root() {
            if let Some(inherited) = self.tree.find_child(parent, type_name, &qualified, true)? {
                return self.overload(parent, inherited, declaration, subtype, qualified);
            }
        }

        if declaration.overlay {
            return Err(MetaDataError::OverlayTargetNotFound(
                self.describe(parent, type_name, &qualified),
            ));
        }

        let super_node = match present(declaration.super_ref) {
            Some(reference) => {
                Some(self.resolve_super(parent, type_name, &package, &short_name, reference)?)
            }
            None => None,
        };
        let subtype = match (subtype, super_node) {
            (Some(subtype), _) => subtype.to_string(),
            (None, Some(super_node)) => self.tree.node(super_node).subtype().to_string(),
            (None, None) => self.tree.registry().resolve(type_name, None)?.subtype,
        };

        let id = self
            .tree
            .add_child(parent, NewNode::new(type_name, subtype, qualified))?;
        if let Some(super_node) = super_node {
            self.tree.set_super(id, super_node)?;
        }
        Ok(id)
    }

    fn overload(
        &mut self,
        parent: NodeId,
        inherited: NodeId,
        declaration: &Declaration<'_>,
        subtype: Option<&str>,
        qualified: String,
    ) -> Result<NodeId> {
        let inherited_subtype = self.tree.node(inherited).subtype().to_string();
        if let Some(requested) = subtype {
            if requested != inherited_subtype {
                return Err(MetaDataError::DuplicateChild {
                    node: self.tree.path(inherited),
                    existing: inherited_subtype,
                    requested: requested.to_string(),
                });
            }
        }
        let id = self.tree.add_child(
            parent,
            NewNode::new(declaration.type_name, inherited_subtype, qualified),
        )?;
        match present(declaration.super_ref) {
            Some(reference) => self.attach_super(id, reference)?,
            None => self.tree.set_super(id, inherited)?,
        }
        debug!(
            path = %self.tree.path(id),
            inherited = %self.tree.path(inherited),
            "overloaded inherited node"
        );
        Ok(id)
    }

    fn attach_super(&mut self, id: NodeId, reference: &str) -> Result<()> {
        let node = self.tree.node(id);
        let parent = node.parent().unwrap_or(self.tree.root());
        let (type_name, package, name) = (
            node.type_name().to_string(),
            node.package().to_string(),
            node.short_name().to_string(),
        );
        let target = self.resolve_super(parent, &type_name, &package, &name, reference)?;
        match self.tree.node(id).super_node() {
            None => self.tree.set_super(id, target),
            Some(current) if current == target => Ok(()),
            Some(current) => {
                warn!(
                    path = %self.tree.path(id),
                    current = %self.tree.path(current),
                    ignored = %reference,
                    "super already set, keeping existing"
                );
                Ok(())
            }
        }
    }

    /// Resolves a super reference to an existing root-level node of the same
    /// type.
    ///
    /// A bare name is tried in the declaring node's package first. Otherwise
    /// the reference is expanded against the nearest package above the
    /// declaring node.
    pub fn resolve_super(
        &self,
        parent: NodeId,
        type_name: &str,
        package: &str,
        name: &str,
        reference: &str,
    ) -> Result<NodeId> {
        let root = self.tree.root();
        let mut tried = Vec::new();

        if !reference.contains(PKG_SEPARATOR) && !package.is_empty() {
            let candidate = qualify(package, reference);
            if let Some(found) = self.tree.own_child(root, type_name, &candidate) {
                return Ok(found);
            }
            tried.push(candidate);
        }

        let base = self.package_for(parent).unwrap_or(package);
        let expanded = expand_package_ref(base, reference)?;
        if let Some(found) = self.tree.own_child(root, type_name, &expanded) {
            return Ok(found);
        }
        tried.push(expanded);

        Err(MetaDataError::SuperReferenceNotFound {
            node: self.describe(parent, type_name, &qualify(package, name)),
            type_name: type_name.to_string(),
            reference: reference.to_string(),
            tried: tried.join(", "),
        })
    }

    /// Value kind for a new attribute on `owner`: a registered override,
    /// then the kind of an inherited attribute of the same name, then the
    /// literal's own kind.
    fn attribute_kind(&self, owner: NodeId, name: &str, literal: &Literal) -> Result<ValueKind> {
        let node = self.tree.node(owner);
        if let Some(kind) = self
            .tree
            .registry()
            .attribute_override(node.type_name(), node.subtype(), name)
        {
            return Ok(kind);
        }
        let inherited = self
            .tree
            .find_child(owner, type_names::ATTR, name, true)?
            .and_then(|attr| self.tree.node(attr).value_kind());
        Ok(inherited.unwrap_or_else(|| infer_kind(literal)))
    }

    /// Assigns an inline attribute value.
    ///
    /// An existing own attribute keeps its kind and the literal is coerced
    /// to it.
    pub fn apply_literal(
        &mut self,
        owner: NodeId,
        name: &str,
        literal: &Literal,
    ) -> Result<NodeId> {
        if let Some(existing) = self.tree.own_child(owner, type_names::ATTR, name) {
            let kind = self
                .tree
                .node(existing)
                .value_kind()
                .unwrap_or(ValueKind::STRING);
            let value = coerce(name, literal, kind)?;
            self.tree.set_value(existing, value)?;
            return Ok(existing);
        }
        let kind = self.attribute_kind(owner, name, literal)?;
        let value = coerce(name, literal, kind)?;
        self.tree.add_child(
            owner,
            NewNode::new(type_names::ATTR, kind.subtype(), name).with_value(value),
        )
    }

    /// Declares an explicit attribute node, optionally with a subtype and a
    /// value.
    pub fn declare_attribute(
        &mut self,
        owner: NodeId,
        name: &str,
        subtype: Option<&str>,
        literal: Option<&Literal>,
    ) -> Result<NodeId> {
        let explicit = match present(subtype).filter(|s| *s != WILDCARD) {
            Some(subtype) => {
                let declaration = self.tree.registry().resolve(type_names::ATTR, Some(subtype))?;
                let kind = match declaration.binding.kind {
                    NodeKind::Attribute(kind) => kind,
                    _ => ValueKind::STRING,
                };
                Some((declaration.subtype, kind))
            }
            None => None,
        };

        if let Some(existing) = self.tree.own_child(owner, type_names::ATTR, name) {
            let current = self.tree.node(existing);
            if let Some((requested, _)) = &explicit {
                if *requested != current.subtype() {
                    return Err(MetaDataError::DuplicateChild {
                        node: self.tree.path(existing),
                        existing: current.subtype().to_string(),
                        requested: requested.clone(),
                    });
                }
            }
            let kind = current.value_kind().unwrap_or(ValueKind::STRING);
            if let Some(literal) = literal {
                let value = coerce(name, literal, kind)?;
                self.tree.set_value(existing, value)?;
            }
            return Ok(existing);
        }

        let (subtype, kind) = match explicit {
            Some(explicit) => explicit,
            None => {
                let placeholder = Literal::Text(String::new());
                let kind = self.attribute_kind(owner, name, literal.unwrap_or(&placeholder))?;
                (kind.subtype().to_string(), kind)
            }
        };
        let mut node = NewNode::new(type_names::ATTR, subtype, name);
        if let Some(literal) = literal {
            node = node.with_value(coerce(name, literal, kind)?);
        }
        self.tree.add_child(owner, node)
    }

    /// Converts a field's effective `defaultValue` attribute to the field's
    /// own value kind and stores it on the field.
    pub fn apply_default_value(&mut self, id: NodeId) -> Result<()> {
        let node = self.tree.node(id);
        if node.kind() != NodeKind::Field {
            return Ok(());
        }
        let kind = field_value_kind(node.subtype());
        let Some(raw) = self.tree.attribute_value(id, "defaultValue")? else {
            return Ok(());
        };
        let value = coerce("defaultValue", &Literal::from(raw), kind)?;
        self.tree.set_default_value(id, value)
    }
}

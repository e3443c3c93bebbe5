//! The metadata tree.
//!
//! Nodes live in an arena owned by [`MetaTree`] and are addressed by
//! [`NodeId`]. A node's effective children are its own children followed by
//! the effective children of its super node that it does not shadow by
//! `(type, name)`.
//!
//! While a tree is being built every query is computed on demand. Once the
//! tree is [frozen](MetaTree::freeze) it rejects changes and memoizes
//! effective children per node.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{MetaDataError, Result};
use crate::name::split_qualified;
use crate::registry::{NodeKind, TypeRegistry, type_names};
use crate::value::{AttributeValue, ValueKind};

/// Address of a node inside one [`MetaTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    /// Arena slot of the node. Stable for the lifetime of the tree.
    pub fn index(self) -> usize {
        self.0
    }
}

/// A node to be added with [`MetaTree::add_child`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewNode {
    pub type_name: String,
    pub subtype: String,
    /// Qualified name for root-level nodes, simple name otherwise.
    pub name: String,
    pub value: Option<AttributeValue>,
}

impl NewNode {
    pub fn new(
        type_name: impl Into<String>,
        subtype: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            subtype: subtype.into(),
            name: name.into(),
            value: None,
        }
    }

    pub fn with_value(mut self, value: AttributeValue) -> Self {
        self.value = Some(value);
        self
    }
}

#[derive(Debug)]
pub struct NodeData {
    type_name: String,
    subtype: String,
    name: String,
    package: String,
    short_name: String,
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    super_node: Option<NodeId>,
    value: Option<AttributeValue>,
    default_value: Option<AttributeValue>,
    effective: OnceLock<Arc<[NodeId]>>,
    index: OnceLock<HashMap<(String, String), NodeId>>,
}

impl NodeData {
    fn new(type_name: String, subtype: String, name: String, kind: NodeKind) -> Self {
        let (package, short_name) = split_qualified(&name);
        let (package, short_name) = (package.to_string(), short_name.to_string());
        Self {
            type_name,
            subtype,
            name,
            package,
            short_name,
            kind,
            parent: None,
            children: Vec::new(),
            super_node: None,
            value: None,
            default_value: None,
            effective: OnceLock::new(),
            index: OnceLock::new(),
        }
    }

    /// Registered type, e.g. `object` or `field`.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Resolved subtype. Never empty, defaults are applied on creation.
    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    /// Qualified name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Package part of the qualified name. Empty for unpackaged nodes.
    pub fn package(&self) -> &str {
        &self.package
    }

    /// Name without its package.
    pub fn short_name(&self) -> &str {
        &self.short_name
    }

    /// Node kind from the registry binding.
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    /// Containing node. `None` only for the root.
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Own children in declaration order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// The node this one inherits children and attributes from.
    pub fn super_node(&self) -> Option<NodeId> {
        self.super_node
    }

    /// Value of an attribute node.
    pub fn value(&self) -> Option<&AttributeValue> {
        self.value.as_ref()
    }

    /// Default value of a field, typed by the field's subtype.
    pub fn default_value(&self) -> Option<&AttributeValue> {
        self.default_value.as_ref()
    }

    pub fn is_attribute(&self) -> bool {
        self.type_name == type_names::ATTR
    }

    /// Value kind of an attribute node.
    pub fn value_kind(&self) -> Option<ValueKind> {
        match self.kind {
            NodeKind::Attribute(kind) => Some(kind),
            _ => None,
        }
    }

    fn inheritable(&self) -> bool {
        !(self.is_attribute() && self.short_name.starts_with('_'))
    }

    fn reset_caches(&mut self) {
        self.effective.take();
        self.index.take();
    }
}

/// Arena of metadata nodes rooted at a `metadata` node.
#[derive(Debug)]
pub struct MetaTree {
    registry: Arc<TypeRegistry>,
    nodes: Vec<NodeData>,
    frozen: bool,
}

impl MetaTree {
    /// Creates a tree whose root uses the default `metadata` subtype.
    pub fn new(registry: Arc<TypeRegistry>) -> Result<Self> {
        let root = registry.resolve(type_names::METADATA, None)?;
        let data = NodeData::new(
            root.type_name,
            root.subtype,
            String::new(),
            root.binding.kind,
        );
        Ok(Self {
            registry,
            nodes: vec![data],
            frozen: false,
        })
    }

    /// Registry the tree validates against.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Node data for `id`.
    ///
    /// # Panics
    ///
    /// If `id` does not belong to this tree. Use [`get`](Self::get) for
    /// ids from elsewhere.
    pub fn node(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0]
    }

    /// Node data for `id`, if it belongs to this tree.
    pub fn get(&self, id: NodeId) -> Option<&NodeData> {
        self.nodes.get(id.0)
    }

    /// Number of nodes, including the root.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    /// True once [`freeze`](Self::freeze) succeeded.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn ensure_mutable(&self, what: impl FnOnce() -> String) -> Result<()> {
        if self.frozen {
            Err(MetaDataError::TreeFrozen(what()))
        } else {
            Ok(())
        }
    }

    /// Slash-separated `type:name` path used in diagnostics.
    pub fn path(&self, id: NodeId) -> String {
        let mut segments = Vec::new();
        let mut current = Some(id);
        while let Some(node_id) = current {
            let node = self.node(node_id);
            if node.parent.is_some() {
                segments.push(format!("{}:{}", node.type_name, node.name));
            }
            current = node.parent;
        }
        if segments.is_empty() {
            return "/".to_string();
        }
        segments.reverse();
        segments.join("/")
    }

    /// Adds a child, or returns the existing own child with the same type
    /// and name.
    ///
    /// An existing child with another subtype is a [`MetaDataError::DuplicateChild`].
    /// A new child the parent does not accept is rejected without modifying
    /// the parent.
    pub fn add_child(&mut self, parent: NodeId, node: NewNode) -> Result<NodeId> {
        self.ensure_mutable(|| format!("{}/{}:{}", self.path(parent), node.type_name, node.name))?;

        if let Some(existing) = self.own_child(parent, &node.type_name, &node.name) {
            let current = self.node(existing);
            if current.subtype != node.subtype {
                return Err(MetaDataError::DuplicateChild {
                    node: self.path(existing),
                    existing: current.subtype.clone(),
                    requested: node.subtype,
                });
            }
            if let Some(value) = node.value {
                self.set_value(existing, value)?;
            }
            return Ok(existing);
        }

        let declaration = self
            .registry
            .resolve(&node.type_name, Some(&node.subtype))?;
        let parent_data = self.node(parent);
        let (_, short_name) = split_qualified(&node.name);
        if !self.registry.accepts_child(
            &parent_data.type_name,
            &parent_data.subtype,
            &node.type_name,
            &node.subtype,
            short_name,
        ) {
            return Err(MetaDataError::ConstraintViolation {
                parent: format!(
                    "{} ({}.{})",
                    self.path(parent),
                    parent_data.type_name,
                    parent_data.subtype
                ),
                child: format!("{}.{}:{}", node.type_name, node.subtype, node.name),
                supported: self
                    .registry
                    .supported_children_description(&parent_data.type_name, &parent_data.subtype),
            });
        }

        let id = NodeId(self.nodes.len());
        let mut data = NodeData::new(
            node.type_name,
            node.subtype,
            node.name,
            declaration.binding.kind,
        );
        data.parent = Some(parent);
        self.nodes.push(data);
        self.nodes[parent.0].children.push(id);
        if let Some(value) = node.value {
            self.set_value(id, value)?;
        }
        debug!(path = %self.path(id), subtype = %self.node(id).subtype, "added node");
        Ok(id)
    }

    /// Own child with the given type and name.
    pub fn own_child(&self, parent: NodeId, type_name: &str, name: &str) -> Option<NodeId> {
        self.node(parent)
            .children
            .iter()
            .copied()
            .find(|id| {
                let child = self.node(*id);
                child.type_name == type_name && child.name == name
            })
    }

    /// Replaces an attribute's value. The value must match the attribute's kind.
    pub fn set_value(&mut self, id: NodeId, value: AttributeValue) -> Result<()> {
        self.ensure_mutable(|| self.path(id))?;
        let node = self.node(id);
        if let Some(kind) = node.value_kind() {
            if kind != value.kind() {
                return Err(MetaDataError::InvalidAttributeValue {
                    name: node.short_name.clone(),
                    kind: kind.to_string(),
                    value: value.to_string(),
                });
            }
        }
        self.nodes[id.0].value = Some(value);
        Ok(())
    }

    pub fn set_default_value(&mut self, id: NodeId, value: AttributeValue) -> Result<()> {
        self.ensure_mutable(|| self.path(id))?;
        self.nodes[id.0].default_value = Some(value);
        Ok(())
    }

    /// Links `id` to `super_node`, rejecting links that would form a cycle.
    pub fn set_super(&mut self, id: NodeId, super_node: NodeId) -> Result<()> {
        self.ensure_mutable(|| self.path(id))?;
        let mut current = Some(super_node);
        let mut visited = HashSet::new();
        while let Some(node_id) = current {
            if node_id == id || !visited.insert(node_id) {
                return Err(MetaDataError::CyclicInheritance(format!(
                    "{} -> {}",
                    self.path(id),
                    self.path(super_node)
                )));
            }
            current = self.node(node_id).super_node;
        }
        self.nodes[id.0].super_node = Some(super_node);
        Ok(())
    }

    /// Super nodes from nearest to farthest.
    pub fn super_chain(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let mut chain = Vec::new();
        let mut visited = HashSet::from([id]);
        let mut current = self.node(id).super_node;
        while let Some(node_id) = current {
            if !visited.insert(node_id) {
                return Err(MetaDataError::CyclicInheritance(self.path(node_id)));
            }
            chain.push(node_id);
            current = self.node(node_id).super_node;
        }
        Ok(chain)
    }

    fn compute_effective(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let node = self.node(id);
        let mut result = node.children.clone();
        let mut shadowed: HashSet<(&str, &str)> = node
            .children
            .iter()
            .map(|child| {
                let child = self.node(*child);
                (child.type_name.as_str(), child.name.as_str())
            })
            .collect();

        for ancestor in self.super_chain(id)? {
            for child_id in &self.node(ancestor).children {
                let child = self.node(*child_id);
                if child.inheritable()
                    && shadowed.insert((child.type_name.as_str(), child.name.as_str()))
                {
                    result.push(*child_id);
                }
            }
        }
        Ok(result)
    }

    /// Own children followed by inherited, unshadowed children.
    pub fn effective_children(&self, id: NodeId) -> Result<Arc<[NodeId]>> {
        let node = self.node(id);
        if let Some(cached) = node.effective.get() {
            return Ok(Arc::clone(cached));
        }
        let computed: Arc<[NodeId]> = self.compute_effective(id)?.into();
        if self.frozen {
            let _ = node.effective.set(Arc::clone(&computed));
        }
        Ok(computed)
    }

    /// Children of `id`, optionally filtered by type.
    pub fn children(
        &self,
        id: NodeId,
        type_name: Option<&str>,
        include_inherited: bool,
    ) -> Result<Arc<[NodeId]>> {
        let all: Arc<[NodeId]> = if include_inherited {
            self.effective_children(id)?
        } else {
            self.node(id).children.clone().into()
        };
        match type_name {
            None => Ok(all),
            Some(type_name) => Ok(all
                .iter()
                .copied()
                .filter(|child| self.node(*child).type_name == type_name)
                .collect()),
        }
    }

    /// Finds a child by type and name, own children first.
    pub fn find_child(
        &self,
        id: NodeId,
        type_name: &str,
        name: &str,
        include_inherited: bool,
    ) -> Result<Option<NodeId>> {
        if !include_inherited {
            return Ok(self.own_child(id, type_name, name));
        }
        let node = self.node(id);
        if let Some(index) = node.index.get() {
            return Ok(index.get(&(type_name.to_string(), name.to_string())).copied());
        }
        if self.frozen {
            let index = self.build_index(id)?;
            let found = index.get(&(type_name.to_string(), name.to_string())).copied();
            let _ = node.index.set(index);
            return Ok(found);
        }
        Ok(self
            .effective_children(id)?
            .iter()
            .copied()
            .find(|child| {
                let child = self.node(*child);
                child.type_name == type_name && child.name == name
            }))
    }

    fn build_index(&self, id: NodeId) -> Result<HashMap<(String, String), NodeId>> {
        Ok(self
            .effective_children(id)?
            .iter()
            .map(|child| {
                let data = self.node(*child);
                ((data.type_name.clone(), data.name.clone()), *child)
            })
            .collect())
    }

    /// Effective attribute value by name.
    pub fn attribute_value(&self, id: NodeId, name: &str) -> Result<Option<&AttributeValue>> {
        Ok(self
            .find_child(id, type_names::ATTR, name, true)?
            .and_then(|attr| self.node(attr).value.as_ref()))
    }

    /// Marks the tree read-only and fills every node's caches.
    ///
    /// Fails if any super chain is cyclic.
    pub fn freeze(&mut self) -> Result<()> {
        if self.frozen {
            return Ok(());
        }
        for node in &mut self.nodes {
            node.reset_caches();
        }
        self.frozen = true;
        for idx in 0..self.nodes.len() {
            let id = NodeId(idx);
            if let Err(e) = self.effective_children(id) {
                self.frozen = false;
                return Err(e);
            }
        }
        debug!(nodes = self.nodes.len(), "tree frozen");
        Ok(())
    }

    /// Drops every node but the root and makes the tree writable again.
    pub fn clear(&mut self) {
        self.nodes.truncate(1);
        if let Some(root) = self.nodes.first_mut() {
            root.children.clear();
            root.reset_caches();
        }
        self.frozen = false;
    }

    /// Node counts by type, excluding the root.
    pub fn count_by_type(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for node in self.nodes.iter().skip(1) {
            *counts.entry(node.type_name.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Depth-first text rendering of the tree, one node per line.
    ///
    /// Equal trees render identically, so the output doubles as a stable
    /// basis for fingerprints.
    pub fn canonical_dump(&self) -> String {
        let mut out = String::new();
        let mut stack = vec![(NodeId::ROOT, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            let node = self.node(id);
            let _ = write!(
                out,
                "{:indent$}{}.{} {}",
                "",
                node.type_name,
                node.subtype,
                node.name,
                indent = depth * 2
            );
            if let Some(super_node) = node.super_node {
                let _ = write!(out, " super={}", self.path(super_node));
            }
            if let Some(value) = &node.value {
                let _ = write!(out, " value={value}");
            }
            if let Some(value) = &node.default_value {
                let _ = write!(out, " default={value}");
            }
            out.push('\n');
            for child in node.children.iter().rev() {
                stack.push((*child, depth + 1));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Scalar;

    fn tree() -> MetaTree {
        MetaTree::new(Arc::new(TypeRegistry::with_builtins().unwrap())).unwrap()
    }

    fn object(tree: &mut MetaTree, name: &str) -> NodeId {
        let root = tree.root();
        tree.add_child(root, NewNode::new("object", "pojo", name)).unwrap()
    }

    #[test]
    fn test_add_child_returns_existing_for_same_subtype() {
        let mut tree = tree();
        let first = object(&mut tree, "acme::Car");
        let second = object(&mut tree, "acme::Car");
        assert_eq!(first, second);
        assert_eq!(tree.node(tree.root()).children().len(), 1);
        assert_eq!(tree.node(first).package(), "acme");
        assert_eq!(tree.node(first).short_name(), "Car");
    }

    #[test]
    fn test_add_child_rejects_subtype_change() {
        let mut tree = tree();
        object(&mut tree, "Car");
        let root = tree.root();
        let err = tree
            .add_child(root, NewNode::new("object", "proxy", "Car"))
            .unwrap_err();
        assert!(matches!(err, MetaDataError::DuplicateChild { .. }));
    }

    #[test]
    fn test_rejected_child_leaves_parent_unchanged() {
        let mut tree = tree();
        let car = object(&mut tree, "Car");
        let wheels = tree
            .add_child(car, NewNode::new("field", "int", "wheels"))
            .unwrap();
        let before = tree.len();

        let err = tree
            .add_child(wheels, NewNode::new("field", "int", "nested"))
            .unwrap_err();
        assert!(matches!(err, MetaDataError::ConstraintViolation { .. }));
        assert_eq!(tree.len(), before);
        assert!(tree.node(wheels).children().is_empty());
    }

    #[test]
    fn test_attribute_value_must_match_kind() {
        let mut tree = tree();
        let car = object(&mut tree, "Car");
        let attr = tree
            .add_child(
                car,
                NewNode::new("attr", "int", "rank")
                    .with_value(AttributeValue::Scalar(Scalar::Int(3))),
            )
            .unwrap();
        let err = tree
            .set_value(attr, AttributeValue::string("high"))
            .unwrap_err();
        assert!(matches!(err, MetaDataError::InvalidAttributeValue { .. }));
        assert_eq!(
            tree.node(attr).value(),
            Some(&AttributeValue::Scalar(Scalar::Int(3)))
        );
    }

    #[test]
    fn test_inherited_children_are_shadowed_by_own() {
        let mut tree = tree();
        let base = object(&mut tree, "Base");
        let id = tree.add_child(base, NewNode::new("field", "long", "id")).unwrap();
        let created = tree
            .add_child(base, NewNode::new("field", "date", "created"))
            .unwrap();
        tree.add_child(
            base,
            NewNode::new("attr", "string", "_internal").with_value(AttributeValue::string("x")),
        )
        .unwrap();

        let car = object(&mut tree, "Car");
        let own_id = tree.add_child(car, NewNode::new("field", "long", "id")).unwrap();
        tree.set_super(car, base).unwrap();

        let effective = tree.effective_children(car).unwrap();
        assert_eq!(&*effective, &[own_id, created]);
        assert_ne!(own_id, id);
        assert_eq!(tree.find_child(car, "field", "created", true).unwrap(), Some(created));
        assert_eq!(tree.find_child(car, "field", "created", false).unwrap(), None);
        assert_eq!(tree.attribute_value(car, "_internal").unwrap(), None);
        assert!(tree.attribute_value(base, "_internal").unwrap().is_some());
    }

    #[test]
    fn test_super_cycle_rejected() {
        let mut tree = tree();
        let a = object(&mut tree, "A");
        let b = object(&mut tree, "B");
        tree.set_super(a, b).unwrap();
        let err = tree.set_super(b, a).unwrap_err();
        assert!(matches!(err, MetaDataError::CyclicInheritance(_)));
        assert!(matches!(
            tree.set_super(a, a),
            Err(MetaDataError::CyclicInheritance(_))
        ));
    }

    #[test]
    fn test_frozen_tree_rejects_changes_and_caches() {
        let mut tree = tree();
        let car = object(&mut tree, "Car");
        tree.freeze().unwrap();

        let err = tree
            .add_child(car, NewNode::new("field", "int", "wheels"))
            .unwrap_err();
        assert!(matches!(err, MetaDataError::TreeFrozen(_)));

        let first = tree.effective_children(car).unwrap();
        let second = tree.effective_children(car).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_clear_keeps_root() {
        let mut tree = tree();
        object(&mut tree, "Car");
        tree.freeze().unwrap();
        tree.clear();
        assert!(tree.is_empty());
        assert!(!tree.is_frozen());
        object(&mut tree, "Truck");
        assert_eq!(tree.count_by_type().get("object"), Some(&1));
    }

    #[test]
    fn test_path_and_dump() {
        let mut tree = tree();
        let car = object(&mut tree, "acme::Car");
        tree.add_child(car, NewNode::new("field", "int", "wheels")).unwrap();
        let wheels = tree.own_child(car, "field", "wheels").unwrap();
        assert_eq!(tree.path(wheels), "object:acme::Car/field:wheels");
        assert_eq!(tree.path(tree.root()), "/");

        let dump = tree.canonical_dump();
        assert_eq!(
            dump,
            "metadata.base \n  object.pojo acme::Car\n    field.int wheels\n"
        );
    }
}

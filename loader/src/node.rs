//! Read-only node handles for consumers of a loaded tree.
//!
//! A [`MetaNode`] holds a weak reference to its loader, so it never keeps a
//! destroyed tree alive. Every query re-checks the loader and fails with
//! [`QueryError::LoaderDestroyed`] once it is gone.

use std::fmt;
use std::sync::{Arc, Weak};

use metamodel_core::{AttributeValue, MetaDataNotFoundError, MetaTree, NodeId, type_names};
use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::index;
use crate::loader::LoaderShared;

type QueryResult<T> = std::result::Result<T, QueryError>;

/// A node of a loaded tree.
#[derive(Clone)]
pub struct MetaNode {
    loader: Weak<LoaderShared>,
    loader_name: Arc<str>,
    id: NodeId,
}

impl MetaNode {
    pub(crate) fn new(shared: &Arc<LoaderShared>, id: NodeId) -> Self {
        Self {
            loader: Arc::downgrade(shared),
            loader_name: shared.name_arc(),
            id,
        }
    }

    fn sibling(&self, id: NodeId) -> Self {
        Self {
            loader: Weak::clone(&self.loader),
            loader_name: Arc::clone(&self.loader_name),
            id,
        }
    }

    fn query<T>(&self, query: impl FnOnce(&MetaTree) -> QueryResult<T>) -> QueryResult<T> {
        let Some(shared) = self.loader.upgrade() else {
            return Err(QueryError::LoaderDestroyed(self.loader_name.to_string()));
        };
        shared.with_tree(|tree| {
            if tree.get(self.id).is_none() {
                let root = tree.path(tree.root());
                return Err(
                    MetaDataNotFoundError::new("node", self.id.index().to_string(), root).into(),
                );
            }
            query(tree)
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Name of the loader that owns the node.
    pub fn loader_name(&self) -> &str {
        &self.loader_name
    }

    /// Registered type, e.g. `object` or `field`.
    pub fn type_name(&self) -> QueryResult<String> {
        self.query(|tree| Ok(tree.node(self.id).type_name().to_string()))
    }

    /// Resolved subtype.
    pub fn subtype(&self) -> QueryResult<String> {
        self.query(|tree| Ok(tree.node(self.id).subtype().to_string()))
    }

    /// The package-qualified name, e.g. `acme::vehicle::Car`.
    pub fn get_qualified_name(&self) -> QueryResult<String> {
        self.query(|tree| Ok(tree.node(self.id).name().to_string()))
    }

    /// Name without its package.
    pub fn short_name(&self) -> QueryResult<String> {
        self.query(|tree| Ok(tree.node(self.id).short_name().to_string()))
    }

    pub fn get_package(&self) -> QueryResult<String> {
        self.query(|tree| Ok(tree.node(self.id).package().to_string()))
    }

    /// Slash-separated path from the root, e.g. `object:acme::Car/field:vin`.
    pub fn path(&self) -> QueryResult<String> {
        self.query(|tree| Ok(tree.path(self.id)))
    }

    /// The containing node, `None` for the root.
    pub fn parent(&self) -> QueryResult<Option<MetaNode>> {
        self.query(|tree| Ok(tree.node(self.id).parent().map(|id| self.sibling(id))))
    }

    /// The node this one inherits from.
    pub fn super_node(&self) -> QueryResult<Option<MetaNode>> {
        self.query(|tree| Ok(tree.node(self.id).super_node().map(|id| self.sibling(id))))
    }

    /// Children, optionally of one type, with or without inherited ones.
    pub fn get_children(
        &self,
        type_name: Option<&str>,
        include_inherited: bool,
    ) -> QueryResult<Children> {
        self.query(|tree| {
            let ids = tree.children(self.id, type_name, include_inherited)?;
            Ok(Children::new(self.clone(), ids))
        })
    }

    /// Fetches a child by name and type, own children first then inherited.
    ///
    /// # Errors
    ///
    /// [`QueryError::NotFound`] when there is no such child. Use
    /// [`find_child`](Self::find_child) when a miss is expected.
    pub fn get_child(&self, name: &str, type_name: &str) -> QueryResult<MetaNode> {
        self.query(|tree| {
            tree.find_child(self.id, type_name, name, true)?
                .map(|id| self.sibling(id))
                .ok_or_else(|| {
                    MetaDataNotFoundError::new(type_name, name, tree.path(self.id)).into()
                })
        })
    }

    /// Like [`get_child`](Self::get_child) but a miss is `Ok(None)`.
    pub fn find_child(&self, name: &str, type_name: &str) -> QueryResult<Option<MetaNode>> {
        self.query(|tree| {
            Ok(tree
                .find_child(self.id, type_name, name, true)?
                .map(|id| self.sibling(id)))
        })
    }

    /// True when the node has attribute `name`, own or inherited.
    pub fn has_attribute(&self, name: &str) -> QueryResult<bool> {
        self.query(|tree| Ok(tree.attribute_value(self.id, name)?.is_some()))
    }

    /// Effective value of attribute `name`, inherited values included.
    pub fn attribute(&self, name: &str) -> QueryResult<Option<AttributeValue>> {
        self.query(|tree| Ok(tree.attribute_value(self.id, name)?.cloned()))
    }

    /// Attribute value rendered as text. Arrays are comma-joined.
    pub fn get_attribute_value_as_string(&self, name: &str) -> QueryResult<String> {
        self.query(|tree| {
            tree.attribute_value(self.id, name)?
                .map(AttributeValue::to_string)
                .ok_or_else(|| {
                    MetaDataNotFoundError::new(type_names::ATTR, name, tree.path(self.id)).into()
                })
        })
    }

    /// The value held by an attribute node.
    pub fn value(&self) -> QueryResult<Option<AttributeValue>> {
        self.query(|tree| Ok(tree.node(self.id).value().cloned()))
    }

    /// A field's default value in the field's own value kind.
    pub fn default_value(&self) -> QueryResult<Option<AttributeValue>> {
        self.query(|tree| Ok(tree.node(self.id).default_value().cloned()))
    }

    /// A serializable reference that can be re-attached through the loader
    /// index.
    pub fn detach(&self) -> DetachedNode {
        DetachedNode {
            loader: self.loader_name.to_string(),
            node: self.id,
        }
    }
}

impl PartialEq for MetaNode {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.loader.ptr_eq(&other.loader)
    }
}

impl Eq for MetaNode {}

impl fmt::Debug for MetaNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaNode")
            .field("loader", &self.loader_name)
            .field("id", &self.id)
            .finish()
    }
}

/// Iterator over a node's children.
///
/// The ids are captured when the iterator is created; [`rewind`](Self::rewind)
/// starts over without querying the tree again.
#[derive(Debug, Clone)]
pub struct Children {
    owner: MetaNode,
    ids: Arc<[NodeId]>,
    next: usize,
}

impl Children {
    fn new(owner: MetaNode, ids: Arc<[NodeId]>) -> Self {
        Self { owner, ids, next: 0 }
    }

    /// Restarts iteration from the first child.
    pub fn rewind(&mut self) {
        self.next = 0;
    }

    pub fn ids(&self) -> &[NodeId] {
        &self.ids
    }
}

impl Iterator for Children {
    type Item = MetaNode;

    fn next(&mut self) -> Option<MetaNode> {
        let id = *self.ids.get(self.next)?;
        self.next += 1;
        Some(self.owner.sibling(id))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.ids.len() - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Children {}

/// A node reference that outlives the handle it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetachedNode {
    pub loader: String,
    pub node: NodeId,
}

impl DetachedNode {
    /// Resolves the reference against the registered loader of that name.
    ///
    /// # Errors
    ///
    /// [`QueryError::LoaderDestroyed`] when no live loader is registered
    /// under the name.
    pub fn attach(&self) -> QueryResult<MetaNode> {
        let Some(shared) = index::lookup(&self.loader) else {
            return Err(QueryError::LoaderDestroyed(self.loader.clone()));
        };
        let node = MetaNode::new(&shared, self.node);
        node.type_name()?;
        Ok(node)
    }
}

//! Error types for registry, tree construction and lookups.
//!
//! [`MetaDataError`] covers every hard failure raised while types are
//! registered or a tree is being built. Lookups that simply find nothing
//! report [`MetaDataNotFoundError`] instead, so callers can tell "absent"
//! apart from "broken".

use thiserror::Error;

/// Failures raised while registering types or building a metadata tree.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetaDataError {
    /// No declaration exists for the `(type, subtype)` pair and the type has
    /// no usable default subtype.
    #[error("no type registered for {type_name}.{}", subtype.as_deref().unwrap_or("<default>"))]
    TypeNotFound {
        type_name: String,
        subtype: Option<String>,
    },

    /// The `(type, subtype)` pair is already bound to a different binding.
    #[error("{type_name}.{subtype} is already bound to {existing}, cannot rebind to {requested}")]
    DuplicateType {
        type_name: String,
        subtype: String,
        existing: String,
        requested: String,
    },

    /// An extension targeted a type that was never registered.
    #[error("cannot extend unregistered type {0}")]
    UnknownType(String),

    /// The parent's constraints reject the child.
    #[error("{parent} does not accept {child} (supported children: {supported})")]
    ConstraintViolation {
        parent: String,
        child: String,
        supported: String,
    },

    /// A super reference did not resolve to an existing node of the same type.
    #[error("super reference '{reference}' on {node} does not resolve to an existing {type_name} (tried {tried})")]
    SuperReferenceNotFound {
        node: String,
        type_name: String,
        reference: String,
        tried: String,
    },

    /// A relative package reference climbed above the root package.
    #[error("package '{base}' cannot climb {climbs} level(s) for '{reference}'")]
    InvalidPackagePath {
        base: String,
        reference: String,
        climbs: usize,
    },

    /// A child with the same type and name already exists with another subtype.
    #[error("{node} already exists with subtype {existing}, cannot redeclare it as {requested}")]
    DuplicateChild {
        node: String,
        existing: String,
        requested: String,
    },

    /// Following super links revisited a node.
    #[error("cyclic inheritance through {0}")]
    CyclicInheritance(String),

    /// A provider names a dependency that no known provider satisfies.
    #[error("provider '{provider}' depends on unknown provider '{dependency}'")]
    MissingProvider { provider: String, dependency: String },

    /// Provider dependencies form a cycle.
    #[error("circular provider dependency: {0}")]
    CyclicProviders(String),

    /// A provider's registration failed.
    #[error("provider '{provider}' failed: {source}")]
    ProviderFailed {
        provider: String,
        #[source]
        source: Box<MetaDataError>,
    },

    /// A node name does not satisfy the naming rules.
    #[error("invalid name '{name}' for {type_name}: {reason}")]
    InvalidName {
        type_name: String,
        name: String,
        reason: String,
    },

    /// A node was declared without a name and its type supplies no default.
    #[error("{type_name}.{subtype} requires a name")]
    MissingName { type_name: String, subtype: String },

    /// A literal cannot be converted to the attribute's value kind.
    #[error("attribute '{name}' cannot hold '{value}' as {kind}")]
    InvalidAttributeValue {
        name: String,
        kind: String,
        value: String,
    },

    /// An explicit overlay named a node that does not exist yet.
    #[error("overlay requested for {0} but no such node exists")]
    OverlayTargetNotFound(String),

    /// The tree was frozen and can no longer be changed.
    #[error("tree is frozen, cannot modify {0}")]
    TreeFrozen(String),
}

/// A lookup that found nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{type_name} '{name}' not found in {scope}")]
pub struct MetaDataNotFoundError {
    pub type_name: String,
    pub name: String,
    pub scope: String,
}

impl MetaDataNotFoundError {
    pub fn new(
        type_name: impl Into<String>,
        name: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            type_name: type_name.into(),
            name: name.into(),
            scope: scope.into(),
        }
    }
}

/// Convenience alias for results with [`MetaDataError`].
pub type Result<T> = std::result::Result<T, MetaDataError>;

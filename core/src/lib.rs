//! Core metadata model: type registry, metadata tree, inheritance and
//! attribute inference.
//!
//! This crate defines everything a metadata loader builds on:
//!
//! - [`TypeRegistry`]: `(type, subtype)` declarations, child constraints and
//!   attribute value-kind overrides, populated by [`TypeProvider`]s applied in
//!   dependency order.
//! - [`MetaTree`]: arena of metadata nodes with overlay-aware child
//!   insertion and inherited (effective) children.
//! - [`Resolver`]: turns document [`Declaration`]s into nodes: qualified
//!   naming, relative package expansion, super references and typed
//!   attributes.
//! - [`infer_kind`] / [`coerce`]: value-kind inference for attribute
//!   literals.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use metamodel_core::*;
//!
//! let registry = Arc::new(TypeRegistry::with_builtins().unwrap());
//! let mut tree = MetaTree::new(registry).unwrap();
//! let root = tree.root();
//!
//! let mut resolver = Resolver::new(&mut tree, "acme::vehicle");
//! let car = resolver.declare(root, &Declaration::new("object").name("Car")).unwrap();
//! let wheels = resolver
//!     .declare(car, &Declaration::new("field").subtype("int").name("wheels"))
//!     .unwrap();
//! resolver.apply_literal(wheels, "maxValue", &Literal::Integer(8)).unwrap();
//!
//! tree.freeze().unwrap();
//! let value = tree.attribute_value(wheels, "maxValue").unwrap().unwrap();
//! assert_eq!(value.kind(), ValueKind::INT);
//! assert_eq!(tree.node(car).name(), "acme::vehicle::Car");
//! ```

mod error;
mod infer;
mod name;
mod registry;
mod resolve;
mod tree;
mod value;

pub use error::{MetaDataError, MetaDataNotFoundError, Result};
pub use infer::{coerce, infer_kind, render, resolve_kind};
pub use name::{
    PKG_SEPARATOR, expand_package_ref, is_relative, qualify, split_qualified, validate_name,
    validate_package,
};
pub use registry::*;
pub use resolve::{Declaration, Resolver};
pub use tree::{MetaTree, NewNode, NodeData, NodeId};
pub use value::{AttributeValue, Literal, Scalar, ScalarKind, ValueKind};

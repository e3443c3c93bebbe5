//! Loading XML and JSON metadata documents into one typed tree.
//!
//! A [`Loader`] applies the built-in type providers plus any configured
//! types documents, parses its sources in order into a shared
//! [`MetaTree`](metamodel_core::MetaTree) and freezes it. Later sources can
//! overlay and extend nodes declared by earlier ones.
//!
//! # Quick start
//!
//! ```
//! use metamodel_loader::{Loader, MetadataSource};
//!
//! let loader = Loader::builder("quick-start")
//!     .source(MetadataSource::xml(
//!         "common.xml",
//!         r#"<metadata package="acme::common">
//!              <object name="Base"><field name="id" subType="long"/></object>
//!            </metadata>"#,
//!     ))
//!     .source(MetadataSource::json(
//!         "vehicle.json",
//!         r#"{"metadata": {"package": "acme::vehicle", "children": [
//!              {"object": {"name": "Car", "super": "..::common::Base", "children": [
//!                {"field": {"name": "wheels", "subType": "int", "@maxValue": 8}}
//!              ]}}
//!            ]}}"#,
//!     ))
//!     .init()
//!     .unwrap();
//!
//! let car = loader.find("object", "acme::vehicle::Car").unwrap().unwrap();
//! let fields: Vec<String> = car
//!     .get_children(Some("field"), true)
//!     .unwrap()
//!     .map(|f| f.short_name().unwrap())
//!     .collect();
//! assert_eq!(fields, ["wheels", "id"]);
//!
//! let wheels = car.get_child("wheels", "field").unwrap();
//! assert_eq!(wheels.get_attribute_value_as_string("maxValue").unwrap(), "8");
//! ```
//!
//! # Configuration
//!
//! [`LoaderConfig`] describes a loader in YAML; see the [`config`] module.
//! Loaders built with `register: true` are published in a process-wide index
//! ([`find_loader`]), which is how a [`DetachedNode`] finds its tree again.

pub mod config;
mod error;
mod index;
mod loader;
mod node;
mod parser;
mod source;
mod types_doc;

pub use config::LoaderConfig;
pub use error::{LoaderError, QueryError, Result};
pub use index::{find_loader, registered_loaders};
pub use loader::{Loader, LoaderBuilder, LoaderState};
pub use node::{Children, DetachedNode, MetaNode};
pub use parser::{LoadReport, ParseOptions, parse_source};
pub use source::{MetadataSource, SourceFormat};
pub use types_doc::{
    AttributeEntry, ChildEntry, DocumentTypeProvider, SubTypeEntry, TypeEntry, TypesDocument,
};

//! Metadata document parsers.
//!
//! Both front ends walk their syntax tree and feed a shared
//! [`DocumentBuilder`], so XML and JSON documents with the same content
//! produce the same nodes.
//!
//! For every node the order is fixed: resolve or create the node (attaching
//! its super), then its children, then its inline attribute values, then the
//! field default value.

pub(crate) mod json;
pub(crate) mod xml;

use std::collections::BTreeMap;

use metamodel_core::{Declaration, Literal, MetaDataError, MetaTree, NodeId, Resolver};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{LoaderError, Result};
use crate::source::{MetadataSource, SourceFormat};

/// Parse-time switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseOptions {
    /// Unknown elements and unprefixed JSON attributes become errors.
    pub strict: bool,
    /// Check node names against the naming pattern.
    pub enforce_name_pattern: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            strict: false,
            enforce_name_pattern: true,
        }
    }
}

/// What one source contributed to the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub source: String,
    pub format: Option<SourceFormat>,
    /// Nodes created by this source, per type.
    pub created: BTreeMap<String, usize>,
    /// Elements or keys that were skipped with a warning.
    pub ignored: Vec<String>,
}

impl LoadReport {
    pub fn total_created(&self) -> usize {
        self.created.values().sum()
    }
}

/// Parses one source into `tree`.
///
/// On error the tree may hold part of the document; callers that need
/// all-or-nothing loading reset it.
pub fn parse_source(
    tree: &mut MetaTree,
    source: &MetadataSource,
    options: ParseOptions,
) -> Result<LoadReport> {
    let document = source.id();
    let content = source.read()?;
    let format = match source.format() {
        Ok(format) => format,
        Err(e) => SourceFormat::sniff(&content).ok_or(e)?,
    };

    let before = tree.count_by_type();
    let mut report = LoadReport {
        source: document.clone(),
        format: Some(format),
        ..LoadReport::default()
    };
    match format {
        SourceFormat::Xml => xml::parse(tree, &document, &content, options, &mut report)?,
        SourceFormat::Json => json::parse(tree, &document, &content, options, &mut report)?,
    }

    for (type_name, count) in tree.count_by_type() {
        let created = count - before.get(&type_name).copied().unwrap_or(0);
        if created > 0 {
            report.created.insert(type_name, created);
        }
    }
    info!(
        source = %document,
        format = ?format,
        nodes = report.total_created(),
        ignored = report.ignored.len(),
        "loaded metadata source"
    );
    Ok(report)
}

/// Applies declarations from one document and tags failures with the
/// document and node path.
pub(crate) struct DocumentBuilder<'t, 'r> {
    document: &'r str,
    resolver: Resolver<'t>,
    options: ParseOptions,
    report: &'r mut LoadReport,
}

impl<'t, 'r> DocumentBuilder<'t, 'r> {
    pub(crate) fn new(
        tree: &'t mut MetaTree,
        document: &'r str,
        package: &str,
        options: ParseOptions,
        report: &'r mut LoadReport,
    ) -> Self {
        Self {
            document,
            resolver: Resolver::new(tree, package).enforce_names(options.enforce_name_pattern),
            options,
            report,
        }
    }

    pub(crate) fn root(&self) -> NodeId {
        self.resolver.tree().root()
    }

    pub(crate) fn invalid(&self, message: impl Into<String>) -> LoaderError {
        LoaderError::document(self.document, message)
    }

    fn wrap(&self, at: NodeId, what: Option<String>, source: MetaDataError) -> LoaderError {
        let mut path = self.resolver.tree().path(at);
        if let Some(what) = what {
            path = if path == "/" { what } else { format!("{path}/{what}") };
        }
        LoaderError::MetaData {
            document: self.document.to_string(),
            path,
            source,
        }
    }

    pub(crate) fn knows_type(&self, type_name: &str) -> bool {
        self.resolver.tree().registry().has_type(type_name)
    }

    /// Skips an element whose type is not registered, or fails in strict mode.
    pub(crate) fn unknown_element(&mut self, parent: NodeId, type_name: &str) -> Result<()> {
        if self.options.strict {
            return Err(self.wrap(
                parent,
                Some(type_name.to_string()),
                MetaDataError::TypeNotFound {
                    type_name: type_name.to_string(),
                    subtype: None,
                },
            ));
        }
        let path = self.resolver.tree().path(parent);
        warn!(
            document = %self.document,
            parent = %path,
            element = %type_name,
            "ignoring unknown element"
        );
        self.report.ignored.push(format!("{path}: {type_name}"));
        Ok(())
    }

    /// Records a skipped key, or fails in strict mode.
    pub(crate) fn ignored_key(&mut self, node: NodeId, key: &str, reason: &str) -> Result<()> {
        let path = self.resolver.tree().path(node);
        if self.options.strict {
            return Err(self.invalid(format!("{path}: {reason}: '{key}'")));
        }
        warn!(document = %self.document, node = %path, key = %key, "{reason}");
        self.report.ignored.push(format!("{path}: {key}"));
        Ok(())
    }

    pub(crate) fn declare(
        &mut self,
        parent: NodeId,
        declaration: &Declaration<'_>,
    ) -> Result<NodeId> {
        self.resolver.declare(parent, declaration).map_err(|e| {
            let what = format!(
                "{}:{}",
                declaration.type_name,
                declaration.name.unwrap_or("<unnamed>")
            );
            self.wrap(parent, Some(what), e)
        })
    }

    pub(crate) fn literal(&mut self, node: NodeId, name: &str, literal: &Literal) -> Result<()> {
        self.resolver
            .apply_literal(node, name, literal)
            .map(|_| ())
            .map_err(|e| self.wrap(node, Some(format!("@{name}")), e))
    }

    pub(crate) fn attribute(
        &mut self,
        owner: NodeId,
        name: &str,
        subtype: Option<&str>,
        literal: Option<&Literal>,
    ) -> Result<()> {
        self.resolver
            .declare_attribute(owner, name, subtype, literal)
            .map(|_| ())
            .map_err(|e| self.wrap(owner, Some(format!("attr:{name}")), e))
    }

    pub(crate) fn finish(&mut self, node: NodeId) -> Result<()> {
        self.resolver
            .apply_default_value(node)
            .map_err(|e| self.wrap(node, None, e))
    }
}

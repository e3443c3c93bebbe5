//! Types documents: user-declared types, subtypes and constraints.
//!
//! A types document becomes a [`TypeProvider`] with id `types:<source>`
//! that depends on `core-types`. Entries for types that already exist and
//! declare no subtypes only add rules.
//!
//! # Example (JSON)
//!
//! ```json
//! {"types": [
//!   {"name": "field", "subTypes": [
//!     {"name": "currency", "inherits": "field.decimal",
//!      "attributes": [{"name": "currencyCode", "subType": "string"}]}
//!   ]},
//!   {"name": "object", "children": [{"type": "layout", "allow": false}]}
//! ]}
//! ```
//!
//! # Example (XML)
//!
//! ```xml
//! <types>
//!   <type name="field">
//!     <subType name="currency" inherits="field.decimal">
//!       <attribute name="currencyCode" subType="string"/>
//!     </subType>
//!   </type>
//! </types>
//! ```

use metamodel_core::{
    AttributeRule, Binding, CORE_TYPES, ChildRule, MetaDataError, NodeKind, TypeDeclaration,
    TypeExtension, TypeProvider, TypeRegistry, ValueKind, WILDCARD,
};
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LoaderError, Result};
use crate::source::{MetadataSource, SourceFormat};

fn wildcard() -> String {
    WILDCARD.to_string()
}

fn allowed() -> bool {
    true
}

/// A parsed types document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TypesDocument {
    #[serde(default)]
    pub types: Vec<TypeEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_sub_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub children: Vec<ChildEntry>,
    #[serde(default)]
    pub attributes: Vec<AttributeEntry>,
    #[serde(default)]
    pub sub_types: Vec<SubTypeEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubTypeEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    /// `type.subtype`, or a bare subtype of the same type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inherits: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub children: Vec<ChildEntry>,
    #[serde(default)]
    pub attributes: Vec<AttributeEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildEntry {
    #[serde(rename = "type")]
    pub child_type: String,
    #[serde(default = "wildcard")]
    pub sub_type: String,
    #[serde(default = "wildcard")]
    pub name: String,
    #[serde(default = "allowed")]
    pub allow: bool,
}

impl ChildEntry {
    fn rule(&self) -> ChildRule {
        if self.allow {
            ChildRule::allow(&self.child_type, &self.sub_type, &self.name)
        } else {
            ChildRule::deny(&self.child_type, &self.sub_type, &self.name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeEntry {
    pub name: String,
    pub sub_type: ValueKind,
}

impl AttributeEntry {
    fn rule(&self) -> AttributeRule {
        AttributeRule::new(&self.name, self.sub_type)
    }
}

impl TypesDocument {
    /// Parses the JSON form: `{"types": [...]}`.
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Parses the XML form rooted at `<types>`.
    pub fn from_xml(content: &str) -> Result<Self> {
        let xml = Document::parse(content)?;
        let root = xml.root_element();
        if root.tag_name().name() != "types" {
            return Err(LoaderError::document(
                "types document",
                format!("root element must be <types>, found <{}>", root.tag_name().name()),
            ));
        }
        let types = elements(root, "type")
            .map(type_entry)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { types })
    }

    /// Reads and parses a source in whichever format it declares.
    pub fn from_source(source: &MetadataSource) -> Result<Self> {
        let content = source.read()?;
        let format = match source.format() {
            Ok(format) => format,
            Err(e) => SourceFormat::sniff(&content).ok_or(e)?,
        };
        let parsed = match format {
            SourceFormat::Json => Self::from_json(&content),
            SourceFormat::Xml => Self::from_xml(&content),
        };
        parsed.map_err(|e| match e {
            LoaderError::InvalidDocument { message, .. } => {
                LoaderError::document(&source.id(), message)
            }
            other => other,
        })
    }
}

fn elements<'a, 'input>(
    parent: Node<'a, 'input>,
    tag: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> {
    parent
        .children()
        .filter(move |n| n.is_element() && n.tag_name().name() == tag)
}

fn owned(node: Node<'_, '_>, name: &str) -> Option<String> {
    node.attribute(name).map(str::to_string)
}

fn required(node: Node<'_, '_>, name: &str) -> Result<String> {
    owned(node, name).ok_or_else(|| {
        LoaderError::document(
            "types document",
            format!("<{}> requires a '{name}' attribute", node.tag_name().name()),
        )
    })
}

fn child_entries(node: Node<'_, '_>) -> Result<Vec<ChildEntry>> {
    elements(node, "children")
        .flat_map(|wrapper| elements(wrapper, "child"))
        .map(|child| {
            Ok(ChildEntry {
                child_type: required(child, "type")?,
                sub_type: owned(child, "subType").unwrap_or_else(wildcard),
                name: owned(child, "name").unwrap_or_else(wildcard),
                allow: child
                    .attribute("allow")
                    .is_none_or(|v| !v.trim().eq_ignore_ascii_case("false")),
            })
        })
        .collect()
}

fn attribute_entries(node: Node<'_, '_>) -> Result<Vec<AttributeEntry>> {
    elements(node, "attribute")
        .map(|attribute| {
            let name = required(attribute, "name")?;
            let subtype = required(attribute, "subType")?;
            let sub_type = ValueKind::from_subtype(&subtype).ok_or_else(|| {
                LoaderError::document(
                    "types document",
                    format!("attribute '{name}' has unknown value kind '{subtype}'"),
                )
            })?;
            Ok(AttributeEntry { name, sub_type })
        })
        .collect()
}

fn type_entry(node: Node<'_, '_>) -> Result<TypeEntry> {
    let sub_types = elements(node, "subType")
        .map(|sub| {
            Ok(SubTypeEntry {
                name: required(sub, "name")?,
                class: owned(sub, "class"),
                inherits: owned(sub, "inherits"),
                default_name: owned(sub, "defaultName"),
                name_prefix: owned(sub, "namePrefix"),
                description: owned(sub, "description"),
                children: child_entries(sub)?,
                attributes: attribute_entries(sub)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(TypeEntry {
        name: required(node, "name")?,
        class: owned(node, "class"),
        default_sub_type: owned(node, "defaultSubType"),
        default_name: owned(node, "defaultName"),
        name_prefix: owned(node, "namePrefix"),
        description: owned(node, "description"),
        children: child_entries(node)?,
        attributes: attribute_entries(node)?,
        sub_types,
    })
}

/// Registers the contents of a [`TypesDocument`].
#[derive(Debug, Clone)]
pub struct DocumentTypeProvider {
    id: String,
    document: TypesDocument,
}

impl DocumentTypeProvider {
    /// A provider with id `types:<source_id>`.
    pub fn new(source_id: &str, document: TypesDocument) -> Self {
        Self {
            id: format!("types:{source_id}"),
            document,
        }
    }

    /// Reads a types document and wraps it in a provider.
    pub fn from_source(source: &MetadataSource) -> Result<Self> {
        Ok(Self::new(&source.id(), TypesDocument::from_source(source)?))
    }

    pub fn document(&self) -> &TypesDocument {
        &self.document
    }

    fn register_entry(
        &self,
        registry: &TypeRegistry,
        entry: &TypeEntry,
    ) -> metamodel_core::Result<()> {
        if entry.sub_types.is_empty() && !registry.has_type(&entry.name) {
            return Err(MetaDataError::UnknownType(entry.name.clone()));
        }

        for sub in &entry.sub_types {
            if sub.class.is_none() && registry.is_registered(&entry.name, &sub.name) {
                registry.extend(TypeExtension {
                    type_name: entry.name.clone(),
                    subtype: Some(sub.name.clone()),
                    children: sub.children.iter().map(ChildEntry::rule).collect(),
                    attributes: sub.attributes.iter().map(AttributeEntry::rule).collect(),
                })?;
                continue;
            }
            registry.register(self.declaration(entry, sub))?;
        }

        if !entry.children.is_empty() || !entry.attributes.is_empty() {
            registry.extend(TypeExtension {
                type_name: entry.name.clone(),
                subtype: None,
                children: entry.children.iter().map(ChildEntry::rule).collect(),
                attributes: entry.attributes.iter().map(AttributeEntry::rule).collect(),
            })?;
        }
        debug!(
            provider = %self.id,
            type_name = %entry.name,
            subtypes = entry.sub_types.len(),
            "registered types entry"
        );
        Ok(())
    }

    /// A subtype without its own class takes the type-level class.
    fn declaration(&self, entry: &TypeEntry, sub: &SubTypeEntry) -> TypeDeclaration {
        let implementation = sub
            .class
            .clone()
            .or_else(|| entry.class.clone())
            .unwrap_or_else(|| format!("{}.{}", entry.name, sub.name));
        let mut declaration = TypeDeclaration::new(
            &entry.name,
            &sub.name,
            Binding::new(NodeKind::for_type(&entry.name, &sub.name), implementation),
        );
        declaration.description = sub.description.clone().or_else(|| entry.description.clone());
        declaration.default_name = sub
            .default_name
            .clone()
            .or_else(|| entry.default_name.clone());
        declaration.name_prefix = sub.name_prefix.clone().or_else(|| entry.name_prefix.clone());
        declaration.inherits_from = sub.inherits.as_deref().map(|inherits| {
            match inherits.split_once('.') {
                Some((type_name, subtype)) => (type_name.to_string(), subtype.to_string()),
                None => (entry.name.clone(), inherits.to_string()),
            }
        });
        declaration.is_default = entry.default_sub_type.as_deref() == Some(sub.name.as_str());
        declaration.children = sub.children.iter().map(ChildEntry::rule).collect();
        declaration.attributes = sub.attributes.iter().map(AttributeEntry::rule).collect();
        declaration
    }
}

impl TypeProvider for DocumentTypeProvider {
    fn provider_id(&self) -> &str {
        &self.id
    }

    fn dependencies(&self) -> Vec<String> {
        vec![CORE_TYPES.to_string()]
    }

    fn register_types(&self, registry: &TypeRegistry) -> metamodel_core::Result<()> {
        for entry in &self.document.types {
            self.register_entry(registry, entry)?;
        }
        Ok(())
    }
}

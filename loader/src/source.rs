//! Where metadata and types documents come from.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{LoaderError, Result};

/// Document syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Xml,
    Json,
}

impl SourceFormat {
    /// Guesses the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "xml" => Some(SourceFormat::Xml),
            "json" => Some(SourceFormat::Json),
            _ => None,
        }
    }

    /// Guesses the format from the first non-whitespace character.
    pub fn sniff(content: &str) -> Option<Self> {
        match content.trim_start().chars().next()? {
            '<' => Some(SourceFormat::Xml),
            '{' => Some(SourceFormat::Json),
            _ => None,
        }
    }
}

/// A metadata or types document.
///
/// # Examples
///
/// ```
/// use metamodel_loader::{MetadataSource, SourceFormat};
///
/// let source = MetadataSource::json("inline.json", r#"{"metadata":{}}"#);
/// assert_eq!(source.id(), "inline.json");
/// assert_eq!(source.format().unwrap(), SourceFormat::Json);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataSource {
    /// A file on disk. The format follows the extension.
    File(PathBuf),
    /// In-memory content under a stable identifier.
    Inline {
        id: String,
        format: SourceFormat,
        content: String,
    },
}

impl MetadataSource {
    /// A file source. The format follows the extension.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        MetadataSource::File(path.into())
    }

    pub fn xml(id: impl Into<String>, content: impl Into<String>) -> Self {
        MetadataSource::Inline {
            id: id.into(),
            format: SourceFormat::Xml,
            content: content.into(),
        }
    }

    pub fn json(id: impl Into<String>, content: impl Into<String>) -> Self {
        MetadataSource::Inline {
            id: id.into(),
            format: SourceFormat::Json,
            content: content.into(),
        }
    }

    /// Identifier used for de-duplication and diagnostics.
    pub fn id(&self) -> String {
        match self {
            MetadataSource::File(path) => path.display().to_string(),
            MetadataSource::Inline { id, .. } => id.clone(),
        }
    }

    /// Document format, from the extension for files.
    pub fn format(&self) -> Result<SourceFormat> {
        match self {
            MetadataSource::Inline { format, .. } => Ok(*format),
            MetadataSource::File(path) => SourceFormat::from_path(path).ok_or_else(|| {
                LoaderError::document(
                    &self.id(),
                    "unrecognized file extension, expected .xml or .json",
                )
            }),
        }
    }

    /// The document text. Files are read on every call.
    pub fn read(&self) -> Result<String> {
        match self {
            MetadataSource::File(path) => Ok(std::fs::read_to_string(path)?),
            MetadataSource::Inline { content, .. } => Ok(content.clone()),
        }
    }
}

impl fmt::Display for MetadataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

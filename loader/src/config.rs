//! YAML loader configuration.
//!
//! # Example YAML
//!
//! ```yaml
//! name: vehicles
//! register: true
//! strict: false
//! enforce_name_pattern: true
//! types:
//!   - types/money.json
//! sources:
//!   - models/common.xml
//!   - models/vehicle.json
//!   - id: inline.json
//!     format: json
//!     content: '{"metadata": {"package": "acme", "children": []}}'
//! ```
//!
//! Relative file paths are resolved against the directory holding the
//! configuration file.

use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::parser::ParseOptions;
use crate::source::MetadataSource;

fn enforced() -> bool {
    true
}

/// Everything needed to build and initialize a [`Loader`](crate::Loader).
///
/// # Examples
///
/// ```
/// # use metamodel_loader::LoaderConfig;
/// let config: LoaderConfig = serde_yaml::from_str("name: vehicles\nsources: [cars.xml]").unwrap();
/// assert_eq!(config.sources.len(), 1);
/// assert!(config.enforce_name_pattern);
/// assert!(!config.register);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Loader name, used as the registry index key.
    pub name: String,
    /// Metadata documents, loaded in order.
    #[serde(default)]
    pub sources: Vec<MetadataSource>,
    /// Types documents, applied before any metadata is read.
    #[serde(default)]
    pub types: Vec<MetadataSource>,
    #[serde(default)]
    pub strict: bool,
    #[serde(default = "enforced")]
    pub enforce_name_pattern: bool,
    /// Publish the loader in the process-wide index once it is ready.
    #[serde(default)]
    pub register: bool,
}

impl LoaderConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sources: Vec::new(),
            types: Vec::new(),
            strict: false,
            enforce_name_pattern: true,
            register: false,
        }
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::LoaderError::IoError) if the file cannot be
    /// read, or [`YamlError`](crate::LoaderError::YamlError) if parsing fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let mut config: LoaderConfig = serde_yaml::from_reader(reader)?;
        if let Some(base) = path.parent() {
            config.rebase(base);
        }
        Ok(config)
    }

    /// Saves the configuration as YAML.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Parser options carried by this configuration.
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            strict: self.strict,
            enforce_name_pattern: self.enforce_name_pattern,
        }
    }

    fn rebase(&mut self, base: &Path) {
        for source in self.sources.iter_mut().chain(self.types.iter_mut()) {
            if let MetadataSource::File(path) = source {
                if path.is_relative() {
                    *path = base.join(&*path);
                }
            }
        }
    }
}

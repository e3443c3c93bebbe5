//! The loader: one merged metadata tree built from ordered sources.
//!
//! # Lifecycle
//!
//! `Unconfigured → Initializing → Ready → Destroyed`
//!
//! Sources, types documents and providers may be added until the loader is
//! ready. [`Loader::init`] applies the built-in and configured providers,
//! parses every source in order into one shared tree and freezes it. A
//! failed `init` discards the partial tree and leaves the loader in
//! `Initializing`, so it can be fixed and retried.
//!
//! ```
//! use metamodel_loader::{Loader, LoaderState, MetadataSource};
//!
//! let loader = Loader::builder("vehicles")
//!     .source(MetadataSource::xml(
//!         "cars.xml",
//!         r#"<metadata package="acme"><object name="Car"><field name="vin"/></object></metadata>"#,
//!     ))
//!     .init()
//!     .unwrap();
//! assert_eq!(loader.state(), LoaderState::Ready);
//!
//! let car = loader.root().unwrap().get_child("acme::Car", "object").unwrap();
//! assert_eq!(car.get_package().unwrap(), "acme");
//! assert!(car.find_child("vin", "field").unwrap().is_some());
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use metamodel_core::{MetaTree, NodeId, TypeProvider, TypeRegistry, builtin_providers};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::LoaderConfig;
use crate::error::{LoaderError, QueryError, Result};
use crate::index;
use crate::node::MetaNode;
use crate::parser::{LoadReport, ParseOptions, parse_source};
use crate::source::MetadataSource;
use crate::types_doc::DocumentTypeProvider;

/// Where a loader is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoaderState {
    Unconfigured,
    Initializing,
    Ready,
    Destroyed,
}

impl fmt::Display for LoaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            LoaderState::Unconfigured => "unconfigured",
            LoaderState::Initializing => "initializing",
            LoaderState::Ready => "ready",
            LoaderState::Destroyed => "destroyed",
        })
    }
}

#[derive(Default)]
struct Setup {
    sources: Vec<MetadataSource>,
    types: Vec<MetadataSource>,
    providers: Vec<Arc<dyn TypeProvider>>,
    options: ParseOptions,
    register: bool,
    reports: Vec<LoadReport>,
}

/// State shared by every handle of one loader.
///
/// The state and tree locks are never held together. `setup` serializes
/// lifecycle operations and is taken first.
pub(crate) struct LoaderShared {
    name: Arc<str>,
    registry: Arc<TypeRegistry>,
    state: RwLock<LoaderState>,
    tree: RwLock<Option<MetaTree>>,
    setup: Mutex<Setup>,
}

impl LoaderShared {
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_arc(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    fn state(&self) -> LoaderState {
        *self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: LoaderState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn setup(&self) -> MutexGuard<'_, Setup> {
        self.setup.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs a read-only query against the ready tree.
    pub(crate) fn with_tree<T>(
        &self,
        query: impl FnOnce(&MetaTree) -> std::result::Result<T, QueryError>,
    ) -> std::result::Result<T, QueryError> {
        match self.state() {
            LoaderState::Ready => {}
            LoaderState::Destroyed => {
                return Err(QueryError::LoaderDestroyed(self.name.to_string()));
            }
            LoaderState::Unconfigured | LoaderState::Initializing => {
                return Err(QueryError::NotReady(self.name.to_string()));
            }
        }
        let tree = self.tree.read().unwrap_or_else(PoisonError::into_inner);
        match tree.as_ref() {
            Some(tree) => query(tree),
            None => Err(QueryError::LoaderDestroyed(self.name.to_string())),
        }
    }
}

/// Builder for a [`Loader`].
///
/// # Example
///
/// ```
/// use metamodel_loader::{Loader, MetadataSource};
///
/// let loader = Loader::builder("inline")
///     .strict(true)
///     .source(MetadataSource::json("a.json", r#"{"metadata": {"children": []}}"#))
///     .build();
/// assert!(loader.reports().is_empty());
/// ```
pub struct LoaderBuilder {
    name: String,
    registry: Option<Arc<TypeRegistry>>,
    setup: Setup,
}

impl LoaderBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: None,
            setup: Setup::default(),
        }
    }

    /// Uses `registry` instead of the process-wide one.
    pub fn registry(mut self, registry: Arc<TypeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn source(mut self, source: MetadataSource) -> Self {
        self.setup.sources.push(source);
        self
    }

    /// Adds a types document, applied before any source is parsed.
    pub fn types(mut self, source: MetadataSource) -> Self {
        self.setup.types.push(source);
        self
    }

    /// Adds a custom type provider.
    pub fn provider(mut self, provider: Arc<dyn TypeProvider>) -> Self {
        self.setup.providers.push(provider);
        self
    }

    /// Fails on unknown elements and keys instead of reporting them.
    pub fn strict(mut self, strict: bool) -> Self {
        self.setup.options.strict = strict;
        self
    }

    pub fn enforce_name_pattern(mut self, enforce: bool) -> Self {
        self.setup.options.enforce_name_pattern = enforce;
        self
    }

    /// Publish the loader in the process-wide index once it is ready.
    pub fn register(mut self, register: bool) -> Self {
        self.setup.register = register;
        self
    }

    pub fn build(self) -> Loader {
        let shared = LoaderShared {
            name: self.name.into(),
            registry: self.registry.unwrap_or_else(TypeRegistry::global),
            state: RwLock::new(LoaderState::Unconfigured),
            tree: RwLock::new(None),
            setup: Mutex::new(self.setup),
        };
        Loader {
            shared: Arc::new(shared),
        }
    }

    /// Builds the loader and initializes it.
    pub fn init(self) -> Result<Loader> {
        let loader = self.build();
        loader.init()?;
        Ok(loader)
    }
}

/// A handle to a loader. Clones share the same tree.
#[derive(Clone)]
pub struct Loader {
    shared: Arc<LoaderShared>,
}

impl fmt::Debug for Loader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loader")
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

impl Loader {
    pub fn builder(name: impl Into<String>) -> LoaderBuilder {
        LoaderBuilder::new(name)
    }

    /// An unconfigured loader using the process-wide registry.
    pub fn new(name: impl Into<String>) -> Self {
        LoaderBuilder::new(name).build()
    }

    /// Builds an uninitialized loader from a configuration.
    pub fn from_config(config: &LoaderConfig) -> Self {
        let mut builder = LoaderBuilder::new(&config.name)
            .strict(config.strict)
            .enforce_name_pattern(config.enforce_name_pattern)
            .register(config.register);
        builder.setup.sources = config.sources.clone();
        builder.setup.types = config.types.clone();
        builder.build()
    }

    pub(crate) fn from_shared(shared: Arc<LoaderShared>) -> Self {
        Self { shared }
    }

    pub fn name(&self) -> &str {
        self.shared.name()
    }

    pub fn state(&self) -> LoaderState {
        self.shared.state()
    }

    /// The registry this loader's types come from.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.shared.registry
    }

    fn invalid_state(&self, state: LoaderState, operation: &str) -> LoaderError {
        LoaderError::InvalidState {
            name: self.name().to_string(),
            state: state.to_string(),
            operation: operation.to_string(),
        }
    }

    /// Locks the setup if the loader is still configurable.
    fn configurable(&self, operation: &str) -> Result<MutexGuard<'_, Setup>> {
        let setup = self.shared.setup();
        match self.state() {
            LoaderState::Unconfigured | LoaderState::Initializing => Ok(setup),
            state => Err(self.invalid_state(state, operation)),
        }
    }

    /// Adds a metadata source. Adding the same source id twice is a no-op.
    pub fn add_source(&self, source: MetadataSource) -> Result<()> {
        let mut setup = self.configurable("add a source")?;
        if setup.sources.iter().all(|s| s.id() != source.id()) {
            setup.sources.push(source);
        }
        Ok(())
    }

    /// Adds a types document. Adding the same id twice is a no-op.
    pub fn add_types(&self, source: MetadataSource) -> Result<()> {
        let mut setup = self.configurable("add a types document")?;
        if setup.types.iter().all(|s| s.id() != source.id()) {
            setup.types.push(source);
        }
        Ok(())
    }

    pub fn add_provider(&self, provider: Arc<dyn TypeProvider>) -> Result<()> {
        let mut setup = self.configurable("add a provider")?;
        if setup
            .providers
            .iter()
            .all(|p| p.provider_id() != provider.provider_id())
        {
            setup.providers.push(provider);
        }
        Ok(())
    }

    /// Applies providers, parses every source in order and freezes the tree.
    ///
    /// # Errors
    ///
    /// Returns [`LoaderError::InvalidState`] unless the loader is
    /// unconfigured or initializing. Any provider, read or parse failure
    /// aborts the whole load; no partial tree is kept.
    pub fn init(&self) -> Result<()> {
        let mut setup = self.configurable("initialize")?;
        self.shared.set_state(LoaderState::Initializing);

        let mut providers = builtin_providers();
        providers.extend(setup.providers.iter().cloned());
        for types in &setup.types {
            let provider = DocumentTypeProvider::from_source(types)?;
            providers.push(Arc::new(provider));
        }
        self.shared.registry.apply_providers(&providers)?;

        let mut tree = MetaTree::new(Arc::clone(&self.shared.registry))?;
        let mut reports = Vec::with_capacity(setup.sources.len());
        for source in &setup.sources {
            match parse_source(&mut tree, source, setup.options) {
                Ok(report) => reports.push(report),
                Err(e) => {
                    warn!(
                        loader = %self.name(),
                        source = %source,
                        error = %e,
                        "source failed, discarding tree"
                    );
                    tree.clear();
                    return Err(e);
                }
            }
        }
        tree.freeze()?;

        // A taken name fails the load before anything becomes queryable.
        if setup.register {
            if let Err(e) = index::publish(&self.shared) {
                warn!(loader = %self.name(), error = %e, "publish failed, discarding tree");
                tree.clear();
                return Err(e);
            }
        }

        let nodes = tree.len();
        *self.shared.tree.write().unwrap_or_else(PoisonError::into_inner) = Some(tree);
        setup.reports = reports;
        self.shared.set_state(LoaderState::Ready);
        info!(loader = %self.name(), sources = setup.sources.len(), nodes, "loader ready");
        Ok(())
    }

    /// Publishes the loader in the process-wide index.
    pub fn register(&self) -> Result<()> {
        match self.state() {
            LoaderState::Ready => index::publish(&self.shared),
            state => Err(self.invalid_state(state, "register")),
        }
    }

    /// Removes the loader from the process-wide index. Returns whether it
    /// was registered.
    pub fn unregister(&self) -> bool {
        index::withdraw(&self.shared)
    }

    /// Drops the tree, unregisters and marks the loader destroyed.
    ///
    /// Every node handle of this loader fails afterwards.
    pub fn destroy(&self) -> Result<()> {
        let mut setup = self.shared.setup();
        let state = self.state();
        if state == LoaderState::Destroyed {
            return Err(self.invalid_state(state, "destroy"));
        }
        let tree = self
            .shared
            .tree
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(mut tree) = tree {
            tree.clear();
        }
        setup.reports.clear();
        index::withdraw(&self.shared);
        self.shared.set_state(LoaderState::Destroyed);
        debug!(loader = %self.name(), "loader destroyed");
        Ok(())
    }

    /// Per-source load reports from the last successful `init`.
    pub fn reports(&self) -> Vec<LoadReport> {
        self.shared.setup().reports.clone()
    }

    /// The root node of the ready tree.
    pub fn root(&self) -> std::result::Result<MetaNode, QueryError> {
        self.shared.with_tree(|tree| Ok(self.node(tree.root())))
    }

    /// A handle for `id`. Queries on it fail if `id` is not in the tree.
    pub fn node(&self, id: NodeId) -> MetaNode {
        MetaNode::new(&self.shared, id)
    }

    /// Runs a read-only query against the ready tree.
    pub fn with_tree<T>(
        &self,
        query: impl FnOnce(&MetaTree) -> std::result::Result<T, QueryError>,
    ) -> std::result::Result<T, QueryError> {
        self.shared.with_tree(query)
    }

    /// Top-level node of `type_name` by qualified name.
    pub fn find(
        &self,
        type_name: &str,
        qualified_name: &str,
    ) -> std::result::Result<Option<MetaNode>, QueryError> {
        self.root()?.find_child(qualified_name, type_name)
    }

    /// SHA-256 over the canonical dump of the tree.
    pub fn fingerprint(&self) -> std::result::Result<String, QueryError> {
        self.shared.with_tree(|tree| {
            let hash = Sha256::digest(tree.canonical_dump().as_bytes());
            Ok(format!("{:x}", hash))
        })
    }
}

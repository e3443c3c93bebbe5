//! The type registry: `(type, subtype)` declarations, child constraints and
//! attribute value-kind overrides.
//!
//! A registry is populated by [`TypeProvider`]s. [`TypeRegistry::global`]
//! returns the process-wide instance; tests build their own with
//! [`TypeRegistry::new`].

mod builtin;
mod provider;
mod types;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, PoisonError, RwLock};

use tracing::{debug, info, warn};

use crate::error::{MetaDataError, Result};
use crate::value::ValueKind;

pub use builtin::{
    CORE_TYPES, CoreTypes, FIELD_TYPES, FieldTypes, KEY_TYPES, KeyTypes, OBJECT_TYPES,
    ObjectTypes, VALIDATOR_TYPES, VIEW_TYPES, ValidatorTypes, ViewTypes, builtin_providers,
    field_value_kind,
};
pub use provider::{TypeProvider, order_providers};
pub use types::{
    AttributeRule, Binding, ChildRule, NodeKind, TypeDeclaration, TypeExtension, WILDCARD,
    type_names,
};

static GLOBAL: LazyLock<Arc<TypeRegistry>> = LazyLock::new(|| Arc::new(TypeRegistry::new()));

/// Serializes runs of one provider. Only a successful run is remembered, so
/// a provider that failed runs again on the next application.
#[derive(Debug, Default)]
struct ProviderSlot {
    running: Mutex<()>,
    applied: AtomicBool,
}

impl ProviderSlot {
    fn is_applied(&self) -> bool {
        self.applied.load(Ordering::Acquire)
    }
}

/// Counts reported by [`TypeRegistry::stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryStats {
    pub types: usize,
    pub declarations: usize,
    pub providers_applied: usize,
}

#[derive(Debug, Default)]
struct TypeEntry {
    default_subtype: Option<String>,
    /// Declarations in registration order.
    declarations: Vec<TypeDeclaration>,
    rules: Vec<ChildRule>,
    attributes: Vec<AttributeRule>,
}

impl TypeEntry {
    fn declaration(&self, subtype: &str) -> Option<&TypeDeclaration> {
        self.declarations.iter().find(|d| d.subtype == subtype)
    }

    fn declaration_mut(&mut self, subtype: &str) -> Option<&mut TypeDeclaration> {
        self.declarations.iter_mut().find(|d| d.subtype == subtype)
    }
}

#[derive(Debug, Default)]
struct Catalog {
    types: HashMap<String, TypeEntry>,
    /// Type names in first-registration order.
    order: Vec<String>,
}

/// Registry of type declarations.
///
/// Reads and writes go through a short-lived `RwLock` on the catalog.
/// Provider application is tracked per provider, so concurrent callers
/// applying the same provider block only on that provider.
///
/// # Examples
///
/// ```
/// use metamodel_core::*;
///
/// let registry = TypeRegistry::new();
/// registry.apply_providers(&builtin_providers()).unwrap();
///
/// let decl = registry.resolve("field", None).unwrap();
/// assert_eq!(decl.subtype, "string");
/// assert!(registry.accepts_child("object", "pojo", "field", "int", "age"));
/// ```
#[derive(Debug, Default)]
pub struct TypeRegistry {
    catalog: RwLock<Catalog>,
    applied: Mutex<HashMap<String, Arc<ProviderSlot>>>,
    seq: AtomicU64,
}

impl TypeRegistry {
    /// An empty registry with no providers applied.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide registry.
    pub fn global() -> Arc<TypeRegistry> {
        Arc::clone(&GLOBAL)
    }

    /// Creates a registry with every built-in provider applied.
    pub fn with_builtins() -> Result<Self> {
        let registry = Self::new();
        registry.apply_providers(&builtin_providers())?;
        Ok(registry)
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::Relaxed)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Catalog> {
        self.catalog.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Catalog> {
        self.catalog.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a declaration.
    ///
    /// Registering the same binding again is a no-op. Registering a different
    /// binding for an existing `(type, subtype)` pair fails.
    pub fn register(&self, mut declaration: TypeDeclaration) -> Result<()> {
        for rule in &mut declaration.children {
            rule.seq = self.next_seq();
        }
        for rule in &mut declaration.attributes {
            rule.seq = self.next_seq();
        }

        let mut catalog = self.write();
        if !catalog.types.contains_key(&declaration.type_name) {
            catalog.order.push(declaration.type_name.clone());
        }
        let entry = catalog
            .types
            .entry(declaration.type_name.clone())
            .or_default();

        if let Some(existing) = entry.declaration(&declaration.subtype) {
            if existing.binding != declaration.binding {
                return Err(MetaDataError::DuplicateType {
                    type_name: declaration.type_name,
                    subtype: declaration.subtype,
                    existing: existing.binding.to_string(),
                    requested: declaration.binding.to_string(),
                });
            }
            debug!(declaration = %declaration.id(), "declaration already registered");
            return Ok(());
        }

        if declaration.is_default {
            match &entry.default_subtype {
                None => entry.default_subtype = Some(declaration.subtype.clone()),
                Some(current) if *current != declaration.subtype => {
                    warn!(
                        type_name = %declaration.type_name,
                        current = %current,
                        ignored = %declaration.subtype,
                        "default subtype already set"
                    );
                }
                Some(_) => {}
            }
        }
        debug!(declaration = %declaration.id(), binding = %declaration.binding, "registered type");
        entry.declarations.push(declaration);
        Ok(())
    }

    /// Adds rules to an already registered type or subtype.
    pub fn extend(&self, mut extension: TypeExtension) -> Result<()> {
        for rule in &mut extension.children {
            rule.seq = self.next_seq();
        }
        for rule in &mut extension.attributes {
            rule.seq = self.next_seq();
        }

        let mut catalog = self.write();
        let Some(entry) = catalog.types.get_mut(&extension.type_name) else {
            return Err(MetaDataError::UnknownType(extension.type_name));
        };
        match &extension.subtype {
            None => {
                entry.rules.extend(extension.children);
                entry.attributes.extend(extension.attributes);
            }
            Some(subtype) => {
                let Some(declaration) = entry.declaration_mut(subtype) else {
                    return Err(MetaDataError::UnknownType(format!(
                        "{}.{subtype}",
                        extension.type_name
                    )));
                };
                declaration.children.extend(extension.children);
                declaration.attributes.extend(extension.attributes);
            }
        }
        debug!(type_name = %extension.type_name, subtype = ?extension.subtype, "extended type");
        Ok(())
    }

    /// True when at least one subtype of `type_name` is registered.
    pub fn has_type(&self, type_name: &str) -> bool {
        self.read().types.contains_key(type_name)
    }

    /// True when the exact `(type, subtype)` pair is registered.
    pub fn is_registered(&self, type_name: &str, subtype: &str) -> bool {
        self.read()
            .types
            .get(type_name)
            .is_some_and(|entry| entry.declaration(subtype).is_some())
    }

    /// The subtype used when a declaration omits one, if the type has a default.
    pub fn default_subtype(&self, type_name: &str) -> Option<String> {
        self.read()
            .types
            .get(type_name)
            .and_then(|entry| entry.default_subtype.clone())
    }

    /// Resolves a declaration, falling back to the type's default subtype
    /// when `subtype` is `None`.
    pub fn resolve(&self, type_name: &str, subtype: Option<&str>) -> Result<TypeDeclaration> {
        let catalog = self.read();
        let not_found = || MetaDataError::TypeNotFound {
            type_name: type_name.to_string(),
            subtype: subtype.map(str::to_string),
        };
        let entry = catalog.types.get(type_name).ok_or_else(not_found)?;
        let subtype = match subtype {
            Some(subtype) => subtype,
            None => entry.default_subtype.as_deref().ok_or_else(not_found)?,
        };
        entry.declaration(subtype).cloned().ok_or_else(not_found)
    }

    /// Subtypes registered for `type_name`, in registration order.
    pub fn subtypes(&self, type_name: &str) -> Vec<String> {
        self.read()
            .types
            .get(type_name)
            .map(|entry| entry.declarations.iter().map(|d| d.subtype.clone()).collect())
            .unwrap_or_default()
    }

    /// Type names in first-registration order.
    pub fn type_names(&self) -> Vec<String> {
        self.read().order.clone()
    }

    /// Walks the declaration and its `inherits_from` chain.
    fn chain<'c>(catalog: &'c Catalog, type_name: &str, subtype: &str) -> Vec<&'c TypeDeclaration> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some((type_name.to_string(), subtype.to_string()));
        while let Some((t, s)) = next.take() {
            if !seen.insert((t.clone(), s.clone())) {
                warn!(type_name = %t, subtype = %s, "cyclic declaration inheritance");
                break;
            }
            let Some(declaration) = catalog.types.get(&t).and_then(|e| e.declaration(&s)) else {
                break;
            };
            next = declaration.inherits_from.clone();
            chain.push(declaration);
        }
        chain
    }

    fn applicable_rules(catalog: &Catalog, type_name: &str, subtype: &str) -> Vec<ChildRule> {
        let chain = Self::chain(catalog, type_name, subtype);
        let mut seen_types = HashSet::new();
        let mut rules = Vec::new();
        for declaration in &chain {
            rules.extend(declaration.children.iter().cloned());
            rules.extend(declaration.attributes.iter().map(AttributeRule::implied_child_rule));
            if seen_types.insert(declaration.type_name.as_str()) {
                if let Some(entry) = catalog.types.get(&declaration.type_name) {
                    rules.extend(entry.rules.iter().cloned());
                    rules.extend(entry.attributes.iter().map(AttributeRule::implied_child_rule));
                }
            }
        }
        if chain.is_empty() {
            if let Some(entry) = catalog.types.get(type_name) {
                rules.extend(entry.rules.iter().cloned());
            }
        }
        rules.sort_by_key(|rule| rule.seq);
        rules
    }

    /// Decides whether a parent accepts a child.
    ///
    /// All rules that apply to the parent are ordered by registration and
    /// the first match decides. No match rejects.
    pub fn accepts_child(
        &self,
        parent_type: &str,
        parent_subtype: &str,
        child_type: &str,
        child_subtype: &str,
        child_name: &str,
    ) -> bool {
        let catalog = self.read();
        Self::applicable_rules(&catalog, parent_type, parent_subtype)
            .iter()
            .find(|rule| rule.matches(child_type, child_subtype, child_name))
            .is_some_and(|rule| rule.allow)
    }

    /// Value kind fixed for attribute `name` on nodes of the given type.
    ///
    /// Subtype rules win over type-level rules, which win over inherited
    /// declarations.
    pub fn attribute_override(
        &self,
        parent_type: &str,
        parent_subtype: &str,
        name: &str,
    ) -> Option<ValueKind> {
        let catalog = self.read();
        for declaration in Self::chain(&catalog, parent_type, parent_subtype) {
            if let Some(rule) = declaration.attributes.iter().find(|a| a.name == name) {
                return Some(rule.kind);
            }
            let type_level = catalog
                .types
                .get(&declaration.type_name)
                .and_then(|entry| entry.attributes.iter().find(|a| a.name == name));
            if let Some(rule) = type_level {
                return Some(rule.kind);
            }
        }
        None
    }

    /// Human-readable list of the children a parent accepts.
    pub fn supported_children_description(&self, type_name: &str, subtype: &str) -> String {
        let catalog = self.read();
        let rules = Self::applicable_rules(&catalog, type_name, subtype);
        if rules.is_empty() {
            return "none".to_string();
        }
        rules
            .iter()
            .map(ChildRule::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Applies providers in dependency order, each at most once per registry.
    pub fn apply_providers(&self, providers: &[Arc<dyn TypeProvider>]) -> Result<()> {
        let ordered = order_providers(providers, |id| self.is_applied(id))?;
        for provider in ordered {
            self.apply(provider.as_ref())?;
        }
        Ok(())
    }

    fn provider_slot(&self, provider_id: &str) -> Arc<ProviderSlot> {
        let mut applied = self.applied.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(applied.entry(provider_id.to_string()).or_default())
    }

    fn apply(&self, provider: &dyn TypeProvider) -> Result<()> {
        let id = provider.provider_id();
        let slot = self.provider_slot(id);
        let _running = slot.running.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_applied() {
            return Ok(());
        }
        info!(provider = %id, description = %provider.description(), "applying type provider");
        match provider.register_types(self) {
            Ok(()) => {
                slot.applied.store(true, Ordering::Release);
                Ok(())
            }
            Err(e) => {
                warn!(provider = %id, error = %e, "type provider failed");
                Err(MetaDataError::ProviderFailed {
                    provider: id.to_string(),
                    source: Box::new(e),
                })
            }
        }
    }

    /// Returns true once the provider has been applied successfully.
    pub fn is_applied(&self, provider_id: &str) -> bool {
        let applied = self.applied.lock().unwrap_or_else(PoisonError::into_inner);
        applied.get(provider_id).is_some_and(|slot| slot.is_applied())
    }

    /// Counts registered types, `(type, subtype)` declarations and
    /// successfully applied providers.
    pub fn stats(&self) -> RegistryStats {
        let catalog = self.read();
        let providers_applied = {
            let applied = self.applied.lock().unwrap_or_else(PoisonError::into_inner);
            applied
                .values()
                .filter(|slot| slot.is_applied())
                .count()
        };
        RegistryStats {
            types: catalog.types.len(),
            declarations: catalog.types.values().map(|e| e.declarations.len()).sum(),
            providers_applied,
        }
    }

    /// Removes every declaration and forgets which providers ran.
    pub fn clear(&self) {
        *self.write() = Catalog::default();
        self.applied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        info!("type registry cleared");
    }
}

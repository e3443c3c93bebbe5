//! Type providers and their dependency ordering.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{MetaDataError, Result};
use crate::registry::TypeRegistry;

/// A unit of type registration.
///
/// Providers name the providers they depend on; the registry applies them in
/// dependency order and each provider exactly once.
pub trait TypeProvider: Send + Sync {
    /// Unique identifier, e.g. `field-types`.
    fn provider_id(&self) -> &str;

    /// Providers that must be applied first.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    fn description(&self) -> &str {
        self.provider_id()
    }

    fn register_types(&self, registry: &TypeRegistry) -> Result<()>;
}

/// Orders providers so every provider follows its dependencies.
///
/// A dependency is satisfied either by another provider in `providers` or by
/// `already_applied`. Input order breaks ties, so the result is deterministic.
pub fn order_providers(
    providers: &[Arc<dyn TypeProvider>],
    already_applied: impl Fn(&str) -> bool,
) -> Result<Vec<Arc<dyn TypeProvider>>> {
    let by_id: HashMap<&str, &Arc<dyn TypeProvider>> = providers
        .iter()
        .map(|provider| (provider.provider_id(), provider))
        .collect();

    let mut ordered = Vec::with_capacity(providers.len());
    let mut visited = HashSet::new();
    let mut visiting = Vec::new();

    for provider in providers {
        visit(
            provider,
            &by_id,
            &already_applied,
            &mut visited,
            &mut visiting,
            &mut ordered,
        )?;
    }
    Ok(ordered)
}

fn visit<'a>(
    provider: &'a Arc<dyn TypeProvider>,
    by_id: &HashMap<&'a str, &'a Arc<dyn TypeProvider>>,
    already_applied: &impl Fn(&str) -> bool,
    visited: &mut HashSet<&'a str>,
    visiting: &mut Vec<&'a str>,
    ordered: &mut Vec<Arc<dyn TypeProvider>>,
) -> Result<()> {
    let id = provider.provider_id();
    if visited.contains(id) {
        return Ok(());
    }
    if let Some(start) = visiting.iter().position(|v| *v == id) {
        let mut cycle: Vec<&str> = visiting[start..].to_vec();
        cycle.push(id);
        return Err(MetaDataError::CyclicProviders(cycle.join(" -> ")));
    }

    visiting.push(id);
    for dependency in provider.dependencies() {
        match by_id.get(dependency.as_str()) {
            Some(dep) => visit(*dep, by_id, already_applied, visited, visiting, ordered)?,
            None if already_applied(&dependency) => {}
            None => {
                return Err(MetaDataError::MissingProvider {
                    provider: id.to_string(),
                    dependency,
                });
            }
        }
    }
    visiting.pop();

    visited.insert(id);
    ordered.push(Arc::clone(provider));
    Ok(())
}

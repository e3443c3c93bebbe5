//! Process-wide index of registered loaders.
//!
//! Entries are weak, so an index entry never keeps a loader alive. A
//! [`DetachedNode`](crate::DetachedNode) finds its loader again through here.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, PoisonError, RwLock, Weak};

use tracing::debug;

use crate::error::{LoaderError, Result};
use crate::loader::{Loader, LoaderShared};

static LOADERS: LazyLock<RwLock<HashMap<String, Weak<LoaderShared>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

pub(crate) fn publish(shared: &Arc<LoaderShared>) -> Result<()> {
    let mut loaders = LOADERS.write().unwrap_or_else(PoisonError::into_inner);
    if let Some(existing) = loaders.get(shared.name()).and_then(Weak::upgrade) {
        if !Arc::ptr_eq(&existing, shared) {
            return Err(LoaderError::NameTaken(shared.name().to_string()));
        }
        return Ok(());
    }
    loaders.insert(shared.name().to_string(), Arc::downgrade(shared));
    debug!(loader = %shared.name(), "loader registered");
    Ok(())
}

/// Removes the entry for `shared`, leaving entries of other loaders alone.
pub(crate) fn withdraw(shared: &Arc<LoaderShared>) -> bool {
    let mut loaders = LOADERS.write().unwrap_or_else(PoisonError::into_inner);
    let owned = loaders
        .get(shared.name())
        .is_some_and(|entry| entry.ptr_eq(&Arc::downgrade(shared)) || entry.strong_count() == 0);
    if owned {
        loaders.remove(shared.name());
        debug!(loader = %shared.name(), "loader unregistered");
    }
    owned
}

pub(crate) fn lookup(name: &str) -> Option<Arc<LoaderShared>> {
    LOADERS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .get(name)
        .and_then(Weak::upgrade)
}

/// Looks up a live registered loader by name.
pub fn find_loader(name: &str) -> Option<Loader> {
    lookup(name).map(Loader::from_shared)
}

/// Names of the live registered loaders, sorted.
pub fn registered_loaders() -> Vec<String> {
    let loaders = LOADERS.read().unwrap_or_else(PoisonError::into_inner);
    let mut names: Vec<String> = loaders
        .iter()
        .filter(|(_, entry)| entry.strong_count() > 0)
        .map(|(name, _)| name.clone())
        .collect();
    names.sort();
    names
}

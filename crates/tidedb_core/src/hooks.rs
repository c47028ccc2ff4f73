//! Process-wide lifecycle hooks.
//!
//! Extensions register callbacks on named hook points; the orchestrator runs
//! them at the matching lifecycle moments. Hooks are process-wide, like the
//! name registry: an extension installs itself once and sees every database.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

/// The lifecycle moments hooks can attach to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    /// Before a database is created, ahead of any validation.
    PreCreateDatabase,
    /// After a database finished creation.
    PostCreateDatabase,
    /// First thing inside a database's destroy, after the destroyed flag is
    /// set.
    PreDestroyDatabase,
    /// After a database's data was fully removed from storage.
    PostRemoveDatabase,
    /// For each entry of an `add_collections` call, before the bulk write.
    PreCreateCollection,
    /// After a collection's storage instances were removed.
    PostRemoveCollection,
}

/// Context handed to hook callbacks.
#[derive(Debug, Clone)]
pub struct HookContext {
    /// Name of the database the event belongs to.
    pub database_name: String,
    /// The collection involved, for collection-scoped hook points.
    pub collection_name: Option<String>,
}

impl HookContext {
    pub(crate) fn database(database_name: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            collection_name: None,
        }
    }

    pub(crate) fn collection(
        database_name: impl Into<String>,
        collection_name: impl Into<String>,
    ) -> Self {
        Self {
            database_name: database_name.into(),
            collection_name: Some(collection_name.into()),
        }
    }
}

type HookFn = dyn Fn(&HookContext) + Send + Sync;

static HOOKS: LazyLock<RwLock<HashMap<HookPoint, Vec<Arc<HookFn>>>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

/// Registers a hook callback on a hook point.
pub fn register_hook(point: HookPoint, hook: impl Fn(&HookContext) + Send + Sync + 'static) {
    HOOKS.write().entry(point).or_default().push(Arc::new(hook));
}

/// Removes all registered hooks. Intended for tests.
pub fn clear_hooks() {
    HOOKS.write().clear();
}

/// Runs all hooks registered on a point.
pub(crate) fn run_hooks(point: HookPoint, context: &HookContext) {
    let hooks: Vec<Arc<HookFn>> = HOOKS
        .read()
        .get(&point)
        .map(|hooks| hooks.to_vec())
        .unwrap_or_default();
    for hook in hooks {
        hook(context);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn registered_hooks_run_with_context() {
        clear_hooks();
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        register_hook(HookPoint::PreDestroyDatabase, move |ctx| {
            assert_eq!(ctx.database_name, "hookdb");
            seen.fetch_add(1, Ordering::SeqCst);
        });

        run_hooks(
            HookPoint::PreDestroyDatabase,
            &HookContext::database("hookdb"),
        );
        run_hooks(
            HookPoint::PostRemoveDatabase,
            &HookContext::database("hookdb"),
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        clear_hooks();
    }
}

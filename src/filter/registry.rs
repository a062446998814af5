//! Name → compiled filter mapping with atomic hot swap.

use arc_swap::ArcSwap;
use dashmap::DashMap;
use std::sync::Arc;

use crate::config::schema::RelayConfig;
use crate::filter::spec::FilterSpec;

/// Shared, swappable slot holding one link's current filter.
pub type FilterHandle = Arc<ArcSwap<FilterSpec>>;

/// Registry of compiled filters keyed by link name.
///
/// Each entry is an `ArcSwap` so a reload replaces the whole spec at once;
/// evaluations that already loaded the old `Arc` finish against it.
#[derive(Debug, Default)]
pub struct FilterRegistry {
    filters: DashMap<String, FilterHandle>,
}

impl FilterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a compiled filter and return its handle.
    ///
    /// If the name is already taken the existing entry is kept and its handle returned.
    pub fn register(&self, spec: FilterSpec) -> FilterHandle {
        let name = spec.name().to_string();
        self.filters
            .entry(name)
            .or_insert_with(|| Arc::new(ArcSwap::from_pointee(spec)))
            .value()
            .clone()
    }

    pub fn unregister(&self, name: &str) {
        if self.filters.remove(name).is_some() {
            tracing::debug!(filter = %name, "Filter unregistered");
        }
    }

    /// Current spec for `name`.
    pub fn get(&self, name: &str) -> Option<Arc<FilterSpec>> {
        self.filters.get(name).map(|h| h.load_full())
    }

    pub fn handle(&self, name: &str) -> Option<FilterHandle> {
        self.filters.get(name).map(|h| h.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.filters.iter().map(|e| e.key().clone()).collect()
    }

    /// Recompile every registered filter that is still configured.
    ///
    /// Entries no longer in `config` are left alone. A filter that fails to
    /// compile keeps its previous spec. Returns the number of swapped entries.
    pub fn recompile_all(&self, config: &RelayConfig) -> usize {
        let mut swapped = 0;
        for app in &config.bot_apps {
            let Some(handle) = self.handle(&app.name) else {
                continue;
            };
            match FilterSpec::compile(app, &config.server.default) {
                Ok(spec) => {
                    tracing::info!(filter = %spec, "Filter recompiled");
                    handle.store(Arc::new(spec));
                    swapped += 1;
                }
                Err(e) => {
                    tracing::error!(filter = %app.name, error = %e, "Recompile failed, keeping previous filter");
                }
            }
        }
        swapped
    }
}

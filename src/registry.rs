//! Typed table of source adapters, built once at startup.
//!
//! The selector only ever names [`SourceId`]s; the registry resolves them to
//! concrete adapters.

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapters::{ArxivAdapter, OpenAlexAdapter, PapersWithCodeAdapter, SemanticScholarAdapter};
use crate::config::AggregatorConfig;
use crate::error::Result;
use crate::http::build_client;
use crate::source::SourceAdapter;
use crate::types::SourceId;

/// `SourceId -> SourceAdapter` lookup table.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    adapters: HashMap<SourceId, Arc<dyn SourceAdapter>>,
}

impl SourceRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in HTTP adapters for every [`SourceId`].
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Http`](crate::SearchError::Http) if the shared
    /// HTTP client cannot be constructed.
    pub fn with_default_adapters(config: &AggregatorConfig) -> Result<Self> {
        let client = build_client(&config.http)?;
        let mut registry = Self::new();
        registry.register(Arc::new(ArxivAdapter::new(client.clone(), config)));
        registry.register(Arc::new(OpenAlexAdapter::new(client.clone(), config)));
        registry.register(Arc::new(SemanticScholarAdapter::new(client.clone(), config)));
        registry.register(Arc::new(PapersWithCodeAdapter::new(client, config)));
        Ok(registry)
    }

    /// Register `adapter` under its own source id, replacing any previous one.
    pub fn register(&mut self, adapter: Arc<dyn SourceAdapter>) -> &mut Self {
        self.adapters.insert(adapter.source_id(), adapter);
        self
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, adapter: Arc<dyn SourceAdapter>) -> Self {
        self.register(adapter);
        self
    }

    /// The adapter for `source`, if registered.
    pub fn get(&self, source: SourceId) -> Option<Arc<dyn SourceAdapter>> {
        self.adapters.get(&source).cloned()
    }

    /// Whether an adapter is registered for `source`.
    pub fn contains(&self, source: SourceId) -> bool {
        self.adapters.contains_key(&source)
    }

    /// Registered source ids in lexicographic order.
    pub fn sources(&self) -> Vec<SourceId> {
        let mut sources: Vec<SourceId> = self.adapters.keys().copied().collect();
        sources.sort();
        sources
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("sources", &self.sources())
            .finish()
    }
}

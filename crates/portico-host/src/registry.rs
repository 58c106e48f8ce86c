//! Static plugin id → base URL registry.

use crate::error::{FrameError, Result};
use portico_core::PorticoConfig;
use std::collections::BTreeMap;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, Url>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &PorticoConfig) -> Result<Self> {
        let mut registry = Self::new();
        for (id, entry) in &config.plugins {
            registry = registry.with_plugin(id, &entry.base_url)?;
        }
        debug!(category = "frame", plugins = registry.len(), "Plugin registry loaded");
        Ok(registry)
    }

    pub fn with_plugin(mut self, plugin_id: &str, base_url: &str) -> Result<Self> {
        let url = Url::parse(base_url)?;
        self.plugins.insert(plugin_id.to_string(), url);
        Ok(self)
    }

    /// Base URL for `plugin_id`, or `NotFound`.
    pub fn resolve(&self, plugin_id: &str) -> Result<&Url> {
        self.plugins
            .get(plugin_id)
            .ok_or_else(|| FrameError::NotFound(plugin_id.to_string()))
    }

    pub fn contains(&self, plugin_id: &str) -> bool {
        self.plugins.contains_key(plugin_id)
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.plugins.keys().map(String::as_str)
    }
}

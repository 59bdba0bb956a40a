//! Helper and partial registries.
//!
//! A `Configuration` is an explicit value shared by `Arc` between the
//! facade and every renderer it compiles. Each registry sits behind a
//! reader/writer lock; lookups clone the entry's `Arc` and release the lock
//! before the helper or partial runs, so registration racing with a render
//! never sees a half-written map.

use crate::context::Frame;
use crate::error::Result;
use crate::helpers::{self, BlockBody, BlockHelperFn, Emit, HelperFn};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Default)]
pub struct Configuration {
    helpers: RwLock<HashMap<String, Arc<HelperFn>>>,
    block_helpers: RwLock<HashMap<String, Arc<BlockHelperFn>>>,
    templates: RwLock<HashMap<String, Arc<Emit>>>,
}

impl Configuration {
    /// Empty registries, no built-in helpers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registries with `if`, `unless`, `each`, `with` and `log` pre-registered.
    pub fn with_builtins() -> Self {
        let config = Self::new();
        helpers::register_builtins(&config);
        config
    }

    pub fn register_helper<F>(&self, name: impl Into<String>, helper: F)
    where
        F: Fn(&mut dyn fmt::Write, &Frame<'_>, &[Value]) -> Result<()> + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::debug!(helper = %name, "registering inline helper");
        self.helpers.write().insert(name, Arc::new(helper));
    }

    pub fn register_block_helper<F>(&self, name: impl Into<String>, helper: F)
    where
        F: Fn(
                &mut dyn fmt::Write,
                &Frame<'_>,
                &[Value],
                &BlockBody<'_>,
                Option<&BlockBody<'_>>,
            ) -> Result<()>
            + Send
            + Sync
            + 'static,
    {
        let name = name.into();
        tracing::debug!(helper = %name, "registering block helper");
        self.block_helpers.write().insert(name, Arc::new(helper));
    }

    pub(crate) fn register_partial(&self, name: impl Into<String>, template: Arc<Emit>) {
        let name = name.into();
        tracing::debug!(partial = %name, "registering partial");
        self.templates.write().insert(name, template);
    }

    pub fn helper(&self, name: &str) -> Option<Arc<HelperFn>> {
        self.helpers.read().get(name).cloned()
    }

    pub fn block_helper(&self, name: &str) -> Option<Arc<BlockHelperFn>> {
        self.block_helpers.read().get(name).cloned()
    }

    pub(crate) fn partial(&self, name: &str) -> Option<Arc<Emit>> {
        self.templates.read().get(name).cloned()
    }

    pub fn has_helper(&self, name: &str) -> bool {
        self.helpers.read().contains_key(name)
    }

    pub fn has_block_helper(&self, name: &str) -> bool {
        self.block_helpers.read().contains_key(name)
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.templates.read().contains_key(name)
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut helpers: Vec<String> = self.helpers.read().keys().cloned().collect();
        let mut block_helpers: Vec<String> = self.block_helpers.read().keys().cloned().collect();
        let mut templates: Vec<String> = self.templates.read().keys().cloned().collect();
        helpers.sort();
        block_helpers.sort();
        templates.sort();
        f.debug_struct("Configuration")
            .field("helpers", &helpers)
            .field("block_helpers", &block_helpers)
            .field("templates", &templates)
            .finish()
    }
}

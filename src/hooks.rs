//! Record lifecycle hooks
//!
//! Hooks are registered per collection and phase on a [`HookRegistry`] owned
//! by the caller and handed to the record service. They run in registration
//! order; the first error stops the chain.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::record::Record;

/// Point in a record mutation where a hook runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPhase {
    BeforeCreate,
    AfterCreate,
    BeforeUpdate,
    AfterUpdate,
    BeforeDelete,
    AfterDelete,
}

impl HookPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            HookPhase::BeforeCreate => "before_create",
            HookPhase::AfterCreate => "after_create",
            HookPhase::BeforeUpdate => "before_update",
            HookPhase::AfterUpdate => "after_update",
            HookPhase::BeforeDelete => "before_delete",
            HookPhase::AfterDelete => "after_delete",
        }
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A hook may inspect or rewrite the record, or reject the operation
pub type HookFn = Arc<dyn Fn(&mut Record) -> Result<()> + Send + Sync>;

/// Ordered hook lists per collection and phase
#[derive(Clone, Default)]
pub struct HookRegistry {
    hooks: HashMap<(String, HookPhase), Vec<HookFn>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hook for `collection` at `phase`
    pub fn register<F>(&mut self, collection: impl Into<String>, phase: HookPhase, hook: F) -> &mut Self
    where
        F: Fn(&mut Record) -> Result<()> + Send + Sync + 'static,
    {
        self.hooks
            .entry((collection.into(), phase))
            .or_default()
            .push(Arc::new(hook));
        self
    }

    pub fn on_before_create<F>(&mut self, collection: impl Into<String>, hook: F) -> &mut Self
    where
        F: Fn(&mut Record) -> Result<()> + Send + Sync + 'static,
    {
        self.register(collection, HookPhase::BeforeCreate, hook)
    }

    pub fn on_before_update<F>(&mut self, collection: impl Into<String>, hook: F) -> &mut Self
    where
        F: Fn(&mut Record) -> Result<()> + Send + Sync + 'static,
    {
        self.register(collection, HookPhase::BeforeUpdate, hook)
    }

    pub fn on_before_delete<F>(&mut self, collection: impl Into<String>, hook: F) -> &mut Self
    where
        F: Fn(&mut Record) -> Result<()> + Send + Sync + 'static,
    {
        self.register(collection, HookPhase::BeforeDelete, hook)
    }

    /// Number of hooks registered for `collection` at `phase`
    pub fn count(&self, collection: &str, phase: HookPhase) -> usize {
        self.hooks
            .get(&(collection.to_string(), phase))
            .map_or(0, Vec::len)
    }

    /// Run every hook for `collection` at `phase`, stopping at the first error
    pub fn trigger(&self, collection: &str, phase: HookPhase, record: &mut Record) -> Result<()> {
        let Some(hooks) = self.hooks.get(&(collection.to_string(), phase)) else {
            return Ok(());
        };
        for hook in hooks {
            hook(record)?;
        }
        Ok(())
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for ((collection, phase), hooks) in &self.hooks {
            map.entry(&format_args!("{}.{}", collection, phase), &hooks.len());
        }
        map.finish()
    }
}

//! Plugin hooks around the masking pipeline.
//!
//! Pre-hooks run in ascending priority order before masking; post-hooks run
//! in descending priority order after it, so the plugin that saw the record
//! first also sees it last. Plugins may also contribute patterns, which are
//! validated with the rest of the configuration.

use crate::pattern::PatternRule;
use crate::record::Record;
use crate::value::ValueMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Default plugin priority.
pub const DEFAULT_PLUGIN_PRIORITY: i32 = 100;

/// Extension hooks invoked by the engine.
///
/// Every hook has a no-op default. A hook that panics is logged and skipped.
pub trait RedactionPlugin: Send + Sync {
    fn name(&self) -> &str;

    fn priority(&self) -> i32 {
        DEFAULT_PLUGIN_PRIORITY
    }

    fn pre_process_message(&self, _message: &mut String, _record: &Record) {}

    fn post_process_message(&self, _message: &mut String, _record: &Record) {}

    fn pre_process_context(&self, _context: &mut ValueMap, _record: &Record) {}

    fn post_process_context(&self, _context: &mut ValueMap, _record: &Record) {}

    /// Extra patterns appended after the configured ones.
    fn patterns(&self) -> Vec<PatternRule> {
        Vec::new()
    }
}

/// Plugins in ascending priority order (ties keep registration order).
#[derive(Clone, Default)]
pub(crate) struct PluginChain {
    plugins: Vec<Arc<dyn RedactionPlugin>>,
}

impl PluginChain {
    pub(crate) fn new(mut plugins: Vec<Arc<dyn RedactionPlugin>>) -> Self {
        plugins.sort_by_key(|p| p.priority());
        Self { plugins }
    }

    pub(crate) fn names(&self) -> Vec<&str> {
        self.plugins.iter().map(|p| p.name()).collect()
    }

    /// Patterns contributed by all plugins, in chain order.
    pub(crate) fn patterns(&self) -> Vec<PatternRule> {
        self.plugins.iter().flat_map(|p| p.patterns()).collect()
    }

    pub(crate) fn pre_message(&self, message: &mut String, record: &Record) {
        for plugin in &self.plugins {
            guarded(plugin.as_ref(), "pre_process_message", || {
                plugin.pre_process_message(message, record)
            });
        }
    }

    pub(crate) fn post_message(&self, message: &mut String, record: &Record) {
        for plugin in self.plugins.iter().rev() {
            guarded(plugin.as_ref(), "post_process_message", || {
                plugin.post_process_message(message, record)
            });
        }
    }

    pub(crate) fn pre_context(&self, context: &mut ValueMap, record: &Record) {
        for plugin in &self.plugins {
            guarded(plugin.as_ref(), "pre_process_context", || {
                plugin.pre_process_context(context, record)
            });
        }
    }

    pub(crate) fn post_context(&self, context: &mut ValueMap, record: &Record) {
        for plugin in self.plugins.iter().rev() {
            guarded(plugin.as_ref(), "post_process_context", || {
                plugin.post_process_context(context, record)
            });
        }
    }
}

fn guarded(plugin: &dyn RedactionPlugin, hook: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        warn!(plugin = plugin.name(), hook, "plugin hook panicked");
    }
}

impl fmt::Debug for PluginChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

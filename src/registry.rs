//! Tool registry with priority ordering.
//!
//! The [`ToolRegistry`] holds registered tools, provides lookup by name and
//! lists the currently available tools in fallback order. It is built once
//! at startup and then shared read-only behind an `Arc`.

use std::sync::Arc;

use crate::error::{Result, RouterError};
use crate::tool::SearchTool;

/// Registry of search tools.
///
/// Tools keep their registration slot: re-registering a name replaces the
/// tool in place, so ties in priority resolve in first-registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn SearchTool>>,
}

impl ToolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Arc<dyn SearchTool>) {
        tracing::debug!(tool = tool.name(), priority = tool.priority(), "tool registered");
        match self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            Some(slot) => *slot = tool,
            None => self.tools.push(tool),
        }
    }

    /// Remove a tool by name. Returns true if it was registered.
    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.tools.len();
        self.tools.retain(|t| t.name() != name);
        before != self.tools.len()
    }

    /// Get a tool by name.
    ///
    /// # Errors
    ///
    /// Returns [`RouterError::ToolNotFound`] if no tool has that name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn SearchTool>> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .cloned()
            .ok_or_else(|| RouterError::ToolNotFound(name.to_owned()))
    }

    /// All tools whose availability predicate holds, sorted by ascending priority.
    ///
    /// The sort is stable: equal priorities keep registration order.
    pub fn available_tools(&self) -> Vec<Arc<dyn SearchTool>> {
        let mut available: Vec<Arc<dyn SearchTool>> = self
            .tools
            .iter()
            .filter(|t| t.is_available())
            .cloned()
            .collect();
        available.sort_by_key(|t| t.priority());
        available
    }

    /// Names of all registered tools in registration order.
    pub fn list_tools(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// Name and availability of every registered tool.
    pub fn availability(&self) -> Vec<(String, bool)> {
        self.tools
            .iter()
            .map(|t| (t.name().to_owned(), t.is_available()))
            .collect()
    }

    /// Number of registered tools, available or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.list_tools())
            .finish()
    }
}

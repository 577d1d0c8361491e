//! ToolRegistry - the tool catalogue for one agent.

use std::collections::HashMap;
use std::sync::Arc;

use crate::llm::{ToolCall, ToolDefinition};

use super::builtin::{
    AskUserTool, DisplayTextTool, EditFileTool, ListDirectoryTool, ReadFileTool, RunCommandTool, SearchTool,
    WriteFileTool,
};
use super::{Tool, ToolContext, ToolResult};

/// Mapping from tool name to implementation.
///
/// Tools are shared (`Arc`) so several agents can hold the same catalogue.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The code-generation tool set carried by worker (Kobold) agents.
    pub fn worker() -> Self {
        let mut registry = Self::empty();
        registry.add(Arc::new(ReadFileTool));
        registry.add(Arc::new(WriteFileTool));
        registry.add(Arc::new(EditFileTool));
        registry.add(Arc::new(SearchTool));
        registry.add(Arc::new(ListDirectoryTool));
        registry.add(Arc::new(RunCommandTool));
        registry.add(Arc::new(AskUserTool));
        registry.add(Arc::new(DisplayTextTool));
        registry
    }

    pub fn add(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn with(mut self, tool: Arc<dyn Tool>) -> Self {
        self.add(tool);
        self
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Definitions for the LLM, sorted by name for stable prompts.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .map(|t| ToolDefinition::new(t.name(), t.description(), t.input_schema()))
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Execute one tool call. Unknown tools become error-shaped results.
    pub async fn execute(&self, call: &ToolCall, ctx: &ToolContext) -> ToolResult {
        match self.tools.get(&call.name) {
            Some(tool) => tool.execute(call.input.clone(), ctx).await,
            None => ToolResult::error(format!("Unknown tool: {}", call.name)),
        }
    }

    /// Execute tool calls strictly in order, pairing results with call ids.
    pub async fn execute_all(&self, calls: &[ToolCall], ctx: &ToolContext) -> Vec<(String, ToolResult)> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let result = self.execute(call, ctx).await;
            results.push((call.id.clone(), result));
        }
        results
    }
}

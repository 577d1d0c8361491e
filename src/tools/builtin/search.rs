//! search tool - regex content search across the workspace.

use async_trait::async_trait;
use grep_regex::RegexMatcherBuilder;
use grep_searcher::sinks::UTF8;
use grep_searcher::SearcherBuilder;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

use crate::tools::{Tool, ToolContext, ToolResult};

const DEFAULT_MAX_RESULTS: usize = 50;

/// Search file contents for a regex pattern.
pub struct SearchTool;

#[async_trait]
impl Tool for SearchTool {
    fn name(&self) -> &'static str {
        "search"
    }

    fn description(&self) -> &'static str {
        "Search file contents for a regex pattern. Returns file:line matches."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Regex pattern to search for"
                },
                "path": {
                    "type": "string",
                    "description": "Directory to search, relative to the workspace (default: .)"
                },
                "extension": {
                    "type": "string",
                    "description": "Only search files with this extension (e.g. 'rs')"
                },
                "case_insensitive": {
                    "type": "boolean",
                    "description": "Case-insensitive search (default: false)"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum matches to return (default: 50)"
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let pattern = match input["pattern"].as_str() {
            Some(p) => p,
            None => return ToolResult::error("pattern is required"),
        };
        let path = input["path"].as_str().unwrap_or(".");
        let extension = input["extension"].as_str().map(|s| s.to_string());
        let case_insensitive = input["case_insensitive"].as_bool().unwrap_or(false);
        let max_results = input["max_results"].as_u64().unwrap_or(DEFAULT_MAX_RESULTS as u64) as usize;

        let root = match ctx.validate_path(Path::new(path)) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(e.to_string()),
        };

        let matcher = match RegexMatcherBuilder::new().case_insensitive(case_insensitive).build(pattern) {
            Ok(m) => m,
            Err(e) => return ToolResult::error(format!("Invalid pattern: {}", e)),
        };

        // The grep machinery is synchronous; run it off the async thread.
        let workspace = ctx.workspace.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut searcher = SearcherBuilder::new().line_number(true).build();
            let mut matches: Vec<String> = Vec::new();

            for entry in walkdir::WalkDir::new(&root)
                .into_iter()
                .filter_entry(|e| !e.file_name().to_string_lossy().starts_with('.'))
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                if matches.len() >= max_results {
                    break;
                }

                if let Some(ext) = &extension {
                    let has_ext = entry.path().extension().map(|e| e.to_string_lossy() == *ext).unwrap_or(false);
                    if !has_ext {
                        continue;
                    }
                }

                let display_path = entry
                    .path()
                    .strip_prefix(&workspace)
                    .unwrap_or(entry.path())
                    .display()
                    .to_string();

                let search_result = searcher.search_path(
                    &matcher,
                    entry.path(),
                    UTF8(|line_number, line| {
                        if matches.len() < max_results {
                            matches.push(format!("{}:{}: {}", display_path, line_number, line.trim_end()));
                        }
                        Ok(matches.len() < max_results)
                    }),
                );

                if let Err(e) = search_result {
                    debug!(path = %display_path, error = %e, "SearchTool: skipping unreadable file");
                }
            }

            matches
        })
        .await;

        match result {
            Ok(matches) if matches.is_empty() => ToolResult::success("No matches found"),
            Ok(matches) => ToolResult::success(matches.join("\n")),
            Err(e) => ToolResult::error(format!("Search failed: {}", e)),
        }
    }
}

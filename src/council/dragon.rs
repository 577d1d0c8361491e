//! The Dragon and its council dispatch.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::agent::{Agent, AgentOptions};
use crate::llm::LlmProvider;
use crate::prompts;
use crate::tools::{Tool, ToolContext, ToolRegistry, ToolResult};

use super::state::CouncilState;
use super::tools::{
    AddFeatureTool, AllowExternalPathTool, ApproveSpecificationTool, CreateProjectTool, GitCommandTool,
    ImportProjectTool, ListProjectsTool, ProjectStatusTool, ScanDirectoryTool, SetAgentConfigTool,
    ShowConfigTool, ShowSpecificationTool, UpdateSpecificationTool,
};

/// The Dragon's delegated sub-agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouncilMember {
    SpecificationManager,
    Importer,
    GitOperator,
    ConfigurationOverseer,
}

impl CouncilMember {
    /// Parse a member reference, tolerating shorthand.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "specification manager" | "spec manager" | "specification" | "spec" => Some(Self::SpecificationManager),
            "importer" | "import" => Some(Self::Importer),
            "git operator" | "git" => Some(Self::GitOperator),
            "configuration overseer" | "config overseer" | "configuration" | "config" => {
                Some(Self::ConfigurationOverseer)
            }
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::SpecificationManager => "specification manager",
            Self::Importer => "importer",
            Self::GitOperator => "git operator",
            Self::ConfigurationOverseer => "configuration overseer",
        }
    }

    fn prompt(&self) -> &'static str {
        match self {
            Self::SpecificationManager => prompts::SPEC_MANAGER,
            Self::Importer => prompts::IMPORTER,
            Self::GitOperator => prompts::GIT_OPERATOR,
            Self::ConfigurationOverseer => prompts::CONFIG_OVERSEER,
        }
    }

    /// The member's tool subset.
    fn registry(&self, state: &CouncilState) -> ToolRegistry {
        let state = state.clone();
        match self {
            Self::SpecificationManager => ToolRegistry::empty()
                .with(Arc::new(CreateProjectTool { state: state.clone() }))
                .with(Arc::new(UpdateSpecificationTool { state: state.clone() }))
                .with(Arc::new(AddFeatureTool { state: state.clone() }))
                .with(Arc::new(ListProjectsTool { state: state.clone() }))
                .with(Arc::new(ShowSpecificationTool { state })),
            Self::Importer => ToolRegistry::empty()
                .with(Arc::new(ScanDirectoryTool))
                .with(Arc::new(ImportProjectTool { state: state.clone() }))
                .with(Arc::new(AddFeatureTool { state })),
            Self::GitOperator => ToolRegistry::empty().with(Arc::new(GitCommandTool { state })),
            Self::ConfigurationOverseer => ToolRegistry::empty()
                .with(Arc::new(SetAgentConfigTool { state: state.clone() }))
                .with(Arc::new(AllowExternalPathTool { state: state.clone() }))
                .with(Arc::new(ShowConfigTool { state })),
        }
    }
}

/// Route a natural-language sub-task to a council member, which runs its own
/// execution loop and reports back.
pub struct DelegateToCouncilTool {
    pub state: CouncilState,
    pub provider: Arc<dyn LlmProvider>,
    pub options: AgentOptions,
}

#[async_trait]
impl Tool for DelegateToCouncilTool {
    fn name(&self) -> &'static str {
        "delegate_to_council"
    }

    fn description(&self) -> &'static str {
        "Delegate an operational sub-task to a council member: 'specification manager', \
         'importer', 'git operator', or 'configuration overseer'."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "member": {
                    "type": "string",
                    "description": "Which council member handles this"
                },
                "instruction": {
                    "type": "string",
                    "description": "Natural-language instruction for the member"
                }
            },
            "required": ["member", "instruction"]
        })
    }

    async fn execute(&self, input: Value, ctx: &ToolContext) -> ToolResult {
        let member_ref = match input["member"].as_str() {
            Some(m) => m,
            None => return ToolResult::error("member is required"),
        };
        let instruction = match input["instruction"].as_str() {
            Some(i) => i,
            None => return ToolResult::error("instruction is required"),
        };

        let Some(member) = CouncilMember::parse(member_ref) else {
            return ToolResult::error(format!(
                "Unknown council member '{}'. Valid: specification manager, importer, git operator, configuration overseer",
                member_ref
            ));
        };

        info!(member = member.name(), "delegate_to_council: dispatching");
        let mut agent = Agent::new(
            format!("council-{}", member.name().replace(' ', "-")),
            member.prompt(),
            self.provider.clone(),
            member.registry(&self.state),
            self.options.clone(),
        );

        // The member shares the caller's context: same workspace, same
        // cancellation, same observers.
        match agent.run_turn(instruction, ctx).await {
            Ok(outcome) => {
                debug!(member = member.name(), iterations = outcome.iterations, "delegate_to_council: done");
                ToolResult::success(
                    outcome
                        .final_text
                        .unwrap_or_else(|| format!("{} finished with no report", member.name())),
                )
            }
            Err(e) => ToolResult::error(format!("{} failed: {}", member.name(), e)),
        }
    }
}

/// Build the user-facing Dragon agent.
pub fn build_dragon(
    id: impl Into<String>,
    state: CouncilState,
    provider: Arc<dyn LlmProvider>,
    options: AgentOptions,
) -> Agent {
    let registry = ToolRegistry::empty()
        .with(Arc::new(DelegateToCouncilTool {
            state: state.clone(),
            provider: provider.clone(),
            options: options.clone(),
        }))
        .with(Arc::new(ApproveSpecificationTool { state: state.clone() }))
        .with(Arc::new(ProjectStatusTool { state }));

    Agent::new(id, prompts::DRAGON, provider, registry, options)
}

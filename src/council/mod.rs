//! Conversation agent (Dragon) and its council.
//!
//! The Dragon converses with the user and delegates operational work to four
//! sub-agents through a single delegation tool. Specifications it produces
//! are prototypes until explicitly approved.

mod dragon;
mod state;
mod tools;

pub use dragon::{build_dragon, CouncilMember, DelegateToCouncilTool};
pub use state::CouncilState;
pub use tools::{
    AddFeatureTool, AllowExternalPathTool, ApproveSpecificationTool, CreateProjectTool, GitCommandTool,
    ImportProjectTool, ListProjectsTool, ProjectStatusTool, ScanDirectoryTool, SetAgentConfigTool, ShowConfigTool,
    ShowSpecificationTool, UpdateSpecificationTool,
};

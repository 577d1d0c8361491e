//! Prompt constants and rendering.

use std::collections::HashMap;

/// Analyzer (Wyvern) decomposition prompt.
pub const WYVERN: &str = include_str!("../../prompts/wyvern.pmt");

/// File-structure inference pass.
pub const STRUCTURE: &str = include_str!("../../prompts/structure.pmt");

/// Worker (Kobold) base prompt.
pub const KOBOLD: &str = include_str!("../../prompts/kobold.pmt");

/// Worker planning pass.
pub const PLANNER: &str = include_str!("../../prompts/planner.pmt");

/// Conversation agent (Dragon).
pub const DRAGON: &str = include_str!("../../prompts/dragon.pmt");

/// Council: specification manager.
pub const SPEC_MANAGER: &str = include_str!("../../prompts/spec_manager.pmt");

/// Council: importer.
pub const IMPORTER: &str = include_str!("../../prompts/importer.pmt");

/// Council: git operator.
pub const GIT_OPERATOR: &str = include_str!("../../prompts/git_operator.pmt");

/// Council: configuration overseer.
pub const CONFIG_OVERSEER: &str = include_str!("../../prompts/config_overseer.pmt");

/// Look up an embedded prompt by name.
pub fn get_embedded(name: &str) -> Option<&'static str> {
    match name {
        "wyvern" => Some(WYVERN),
        "structure" => Some(STRUCTURE),
        "kobold" => Some(KOBOLD),
        "planner" => Some(PLANNER),
        "dragon" => Some(DRAGON),
        "spec_manager" => Some(SPEC_MANAGER),
        "importer" => Some(IMPORTER),
        "git_operator" => Some(GIT_OPERATOR),
        "config_overseer" => Some(CONFIG_OVERSEER),
        _ => None,
    }
}

/// Render a template by `{{key}}` replacement. Unknown placeholders stay
/// literal so a missing value is visible rather than silently empty.
pub fn render(template: &str, context: &HashMap<String, String>) -> String {
    let mut result = template.to_string();
    for (key, value) in context {
        let placeholder = format!("{{{{{}}}}}", key);
        result = result.replace(&placeholder, value);
    }
    result
}

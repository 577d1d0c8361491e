//! Agent: a stateful conversational actor.
//!
//! An agent combines an LLM provider, a tool catalogue, a system prompt, and
//! a conversation log. [`Agent::run_turn`] executes one turn to completion:
//! LLM round-trips separated by tool invocations, ending on an assistant
//! message with no tool calls or at the iteration cap.

mod events;
mod turn;

pub use events::{event_channel, AgentEvent, EventSender};
pub use turn::{Agent, AgentOptions, TurnOutcome};

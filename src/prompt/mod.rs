//! Interactive prompt rendezvous.
//!
//! A tool executing inside a worker turn registers a single-shot slot here,
//! emits a `prompt` event to the transport, and waits with a deadline. When
//! the transport receives the matching `prompt_response`, the slot completes
//! and is removed. Completion is idempotent; a second attempt is a no-op.

mod broker;

pub use broker::{PromptBroker, PromptOutcome};

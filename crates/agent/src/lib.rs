//! The agenx conversation loop.
//!
//! A team of agents takes turns on a scientific task:
//!
//! 1. The **Selector** picks the next speaker from the speaking order
//! 2. The speaker runs a **turn**: the planner dispatches its reasoning
//!    mode, the others call the model and their tools
//! 3. Every turn streams **events** and ends with exactly one response
//! 4. The **GroupChat** records the response and loops until the task
//!    terminates
//!
//! Everything an agent emits flows through an `EventStream` that a
//! console (or a test) consumes.

pub mod agent;
pub mod builder;
pub mod dispatcher;
pub mod flow;
pub mod reasoning;
pub mod selector;
pub mod team;
pub mod user_proxy;

#[cfg(test)]
mod test_helpers;

pub use agent::ChatAgent;
pub use builder::TeamBuilder;
pub use dispatcher::{format_tool_summary, TurnDispatcher};
pub use flow::{FlowListener, PrincipleFlow};
pub use reasoning::{ReasoningMode, FALLBACK_TEXT};
pub use selector::Selector;
pub use team::GroupChat;
pub use user_proxy::{InputSource, UserProxyAgent};

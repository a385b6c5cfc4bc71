//! Toolwire Agent: the response loop.
//!
//! - [`response_loop`]: turn state machine driving the model and capability calls
//! - [`context`]: system prompt and message assembly

pub mod context;
pub mod response_loop;

pub use context::ContextBuilder;
pub use response_loop::{AgentError, LoopControl, LoopState, ResponseLoop, ResponseSink};

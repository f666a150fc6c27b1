//! The agent-runtime client: wire-protocol frames plus the connection
//! state machine that speaks them.

mod client;
mod frame;

pub use client::{AgentClientConfig, AgentRuntimeClient, ClientState};
pub use frame::{ChatEventPayload, ChatMessage, ChatState, ContentItem, Frame, FrameError};

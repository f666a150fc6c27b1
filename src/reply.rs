//! The response envelope (spec §3): what a voice turn returns to the
//! caller once STT, the agent runtime, and the response shaper have all
//! run.

use serde::Serialize;

use crate::ids::{ProviderId, TurnId};
use crate::shaper::ShapedReply;

#[derive(Debug, Clone, Serialize)]
pub struct Timing {
    pub stt_ms: u64,
    pub agent_ms: u64,
    pub total_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplyMeta {
    pub provider: ProviderId,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayReply {
    pub turn_id: TurnId,
    pub session_key: String,
    pub assistant: ShapedReply,
    pub timing: Timing,
    pub meta: ReplyMeta,
}

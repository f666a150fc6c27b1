//! The agent-runtime client (spec §4.3): a long-lived framed-WebSocket
//! client implementing the `connect` handshake and `chat.send` request
//! dispatch with event-driven correlation.
//!
//! Grounded directly on `OpenAIRealtime`'s client shape
//! (`core/realtime/openai/client.rs`): an `mpsc::Sender<Frame>` feeding a
//! single task that owns the split WebSocket halves, a
//! `tokio::sync::RwLock<ClientState>` for the state machine, and a
//! `DashMap`-backed pending-request table dispatched from the socket
//! reader without blocking per-request callers. This crate scopes backoff
//! to connection establishment only (spec §4.3): once `Ready`, a
//! dropped connection resets to `Disconnected` and the *next* caller
//! re-triggers the handshake, rather than a perpetual background
//! reconnect loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex as SyncMutex;
use tokio::sync::{Mutex as AsyncMutex, RwLock, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::frame::{
    ChatEventPayload, ChatSendParams, ChatState, ConnectAuth, ConnectChallengePayload,
    ConnectClient, ConnectParams, Frame,
};
use crate::errors::{AppError, ErrorCode};
use crate::ids::SessionKey;
use crate::secret::Secret;

const PROTOCOL_VERSION: u32 = 3;
const CHALLENGE_FALLBACK_MS: u64 = 500;
const WS_CHANNEL_CAPACITY: usize = 64;
const MAX_CONNECT_ATTEMPTS: u32 = 5;
const BASE_BACKOFF_MS: u64 = 250;
const MAX_BACKOFF_MS: u64 = 5_000;
const PROTOCOL_MISUSE_CLOSE_CODE: u16 = 1008;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    AwaitingChallenge,
    AwaitingHelloOk,
    Ready,
    Draining,
    Failed,
}

struct PendingChat {
    session_key: String,
    accumulator: SyncMutex<String>,
    done: AsyncMutex<Option<oneshot::Sender<Result<String, AppError>>>>,
}

/// Construction parameters for an `AgentRuntimeClient`, pulled from the
/// relevant slice of `GatewayConfig` by the rebuilder so the client itself
/// doesn't depend on the whole config store.
#[derive(Debug, Clone)]
pub struct AgentClientConfig {
    pub url: String,
    pub token: Secret,
    pub handshake_timeout_ms: u64,
}

pub struct AgentRuntimeClient {
    config: AgentClientConfig,
    state: Arc<RwLock<ClientState>>,
    ws_sender: AsyncMutex<Option<mpsc::Sender<Frame>>>,
    connect_guard: AsyncMutex<()>,
    connection_handle: AsyncMutex<Option<JoinHandle<()>>>,
    intentional_disconnect: Arc<AtomicBool>,
    pending: Arc<DashMap<String, Arc<PendingChat>>>,
    run_id_index: Arc<DashMap<String, String>>,
}

impl AgentRuntimeClient {
    pub fn new(config: AgentClientConfig) -> Arc<Self> {
        Arc::new(AgentRuntimeClient {
            config,
            state: Arc::new(RwLock::new(ClientState::Disconnected)),
            ws_sender: AsyncMutex::new(None),
            connect_guard: AsyncMutex::new(()),
            connection_handle: AsyncMutex::new(None),
            intentional_disconnect: Arc::new(AtomicBool::new(false)),
            pending: Arc::new(DashMap::new()),
            run_id_index: Arc::new(DashMap::new()),
        })
    }

    pub async fn state(&self) -> ClientState {
        *self.state.read().await
    }

    fn backoff_delay(attempt: u32) -> Duration {
        let scaled = BASE_BACKOFF_MS.saturating_mul(1u64 << attempt.min(16));
        Duration::from_millis(scaled.min(MAX_BACKOFF_MS))
    }

    /// Lazily performs the handshake if not already `Ready`, retrying
    /// connection establishment with bounded exponential backoff.
    pub async fn ensure_ready(&self) -> Result<(), AppError> {
        if self.state().await == ClientState::Ready {
            return Ok(());
        }

        let _guard = self.connect_guard.lock().await;
        if self.state().await == ClientState::Ready {
            return Ok(());
        }

        let mut last_err = None;
        for attempt in 0..MAX_CONNECT_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Self::backoff_delay(attempt)).await;
            }
            match self.connect_once().await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(attempt, "agent-runtime handshake attempt failed");
                    last_err = Some(e);
                }
            }
        }

        *self.state.write().await = ClientState::Failed;
        Err(last_err.unwrap_or_else(|| {
            AppError::operator(
                ErrorCode::OpenclawUnavailable,
                "agent runtime unavailable",
                "exhausted connection attempts",
            )
        }))
    }

    async fn connect_once(&self) -> Result<(), AppError> {
        *self.state.write().await = ClientState::Connecting;
        self.intentional_disconnect.store(false, Ordering::SeqCst);

        let (ws_stream, _response) = tokio_tungstenite::connect_async(self.config.url.as_str())
            .await
            .map_err(|e| {
                AppError::operator(ErrorCode::OpenclawUnavailable, "agent runtime unreachable", e.to_string())
            })?;

        let (mut sink, mut stream) = ws_stream.split();

        *self.state.write().await = ClientState::AwaitingChallenge;
        let nonce = match tokio::time::timeout(
            Duration::from_millis(CHALLENGE_FALLBACK_MS),
            Self::await_challenge(&mut stream),
        )
        .await
        {
            Ok(Ok(nonce)) => nonce,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                debug!("no connect.challenge within fallback interval, proceeding without nonce");
                None
            }
        };

        let connect_id = Uuid::new_v4().to_string();
        let connect_frame = Frame::Request {
            id: connect_id.clone(),
            method: "connect".to_string(),
            params: serde_json::to_value(ConnectParams {
                min_protocol: PROTOCOL_VERSION,
                max_protocol: PROTOCOL_VERSION,
                nonce,
                client: ConnectClient {
                    id: "gateway-client".to_string(),
                    mode: "backend".to_string(),
                },
                caps: Vec::new(),
                role: "operator".to_string(),
                scopes: Vec::new(),
                auth: ConnectAuth {
                    token: self.config.token.expose().to_string(),
                },
            })
            .expect("ConnectParams always serializes"),
        };

        let text = serde_json::to_string(&connect_frame).expect("Frame always serializes");
        sink.send(Message::Text(text.into())).await.map_err(|e| {
            AppError::operator(ErrorCode::OpenclawUnavailable, "failed to send connect frame", e.to_string())
        })?;

        *self.state.write().await = ClientState::AwaitingHelloOk;
        let hello_deadline = Duration::from_millis(self.config.handshake_timeout_ms);
        let hello_ok = tokio::time::timeout(hello_deadline, Self::await_response(&mut stream, &connect_id)).await;

        match hello_ok {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                *self.state.write().await = ClientState::Failed;
                return Err(e);
            }
            Err(_) => {
                *self.state.write().await = ClientState::Failed;
                return Err(AppError::operator(
                    ErrorCode::OpenclawUnavailable,
                    "agent runtime handshake timed out",
                    "no hello-ok within handshake_timeout_ms",
                ));
            }
        }

        let (tx, rx) = mpsc::channel::<Frame>(WS_CHANNEL_CAPACITY);
        *self.ws_sender.lock().await = Some(tx);
        *self.state.write().await = ClientState::Ready;
        info!("agent-runtime client ready");

        let state = self.state.clone();
        let pending = self.pending.clone();
        let run_id_index = self.run_id_index.clone();
        let intentional_disconnect = self.intentional_disconnect.clone();

        let handle = tokio::spawn(Self::run_connection(sink, stream, rx, state, pending, run_id_index, intentional_disconnect));
        *self.connection_handle.lock().await = Some(handle);

        Ok(())
    }

    async fn await_challenge<S>(stream: &mut S) -> Result<Option<String>, AppError>
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if let Ok(Frame::Event { event, payload }) = serde_json::from_str::<Frame>(&text)
                        && event == "connect.challenge"
                    {
                        let challenge: ConnectChallengePayload = serde_json::from_value(payload)
                            .unwrap_or(ConnectChallengePayload { nonce: None });
                        return Ok(challenge.nonce);
                    }
                }
                Ok(Message::Close(frame)) => return Err(Self::close_to_error(frame)),
                Ok(_) => continue,
                Err(e) => {
                    return Err(AppError::operator(
                        ErrorCode::OpenclawUnavailable,
                        "agent runtime connection error",
                        e.to_string(),
                    ));
                }
            }
        }
        Err(AppError::operator(
            ErrorCode::OpenclawUnavailable,
            "agent runtime closed before challenge",
            "stream ended",
        ))
    }

    async fn await_response<S>(stream: &mut S, expected_id: &str) -> Result<(), AppError>
    where
        S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
    {
        while let Some(msg) = stream.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if let Ok(Frame::Response { id, ok, error, .. }) = serde_json::from_str::<Frame>(&text)
                        && id == expected_id
                    {
                        return if ok {
                            Ok(())
                        } else {
                            Err(AppError::operator(
                                ErrorCode::OpenclawUnavailable,
                                "agent runtime rejected connect",
                                error.map(|e| e.message).unwrap_or_default(),
                            ))
                        };
                    }
                }
                Ok(Message::Close(frame)) => return Err(Self::close_to_error(frame)),
                Ok(_) => continue,
                Err(e) => {
                    return Err(AppError::operator(
                        ErrorCode::OpenclawUnavailable,
                        "agent runtime connection error",
                        e.to_string(),
                    ));
                }
            }
        }
        Err(AppError::operator(
            ErrorCode::OpenclawUnavailable,
            "agent runtime closed before hello-ok",
            "stream ended",
        ))
    }

    fn close_to_error(frame: Option<CloseFrame>) -> AppError {
        match frame {
            Some(f) if f.code.into() == PROTOCOL_MISUSE_CLOSE_CODE => AppError::operator(
                ErrorCode::OpenclawUnavailable,
                "agent runtime unavailable",
                "invalid request frame",
            ),
            Some(f) => AppError::operator(
                ErrorCode::OpenclawUnavailable,
                "agent runtime closed connection",
                format!("close code {}: {}", u16::from(f.code), f.reason),
            ),
            None => AppError::operator(
                ErrorCode::OpenclawUnavailable,
                "agent runtime closed connection",
                "no close frame",
            ),
        }
    }

    /// The background task owning the split WebSocket halves: forwards
    /// outbound frames from `rx` and dispatches inbound frames to the
    /// pending-request table. Mirrors the single-task-owns-both-halves
    /// shape used elsewhere for WebSocket clients; does not itself
    /// reconnect (spec §4.3).
    async fn run_connection(
        mut sink: futures_util::stream::SplitSink<
            tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
            Message,
        >,
        mut stream: futures_util::stream::SplitStream<
            tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
        >,
        mut rx: mpsc::Receiver<Frame>,
        state: Arc<RwLock<ClientState>>,
        pending: Arc<DashMap<String, Arc<PendingChat>>>,
        run_id_index: Arc<DashMap<String, String>>,
        intentional_disconnect: Arc<AtomicBool>,
    ) {
        loop {
            tokio::select! {
                Some(frame) = rx.recv() => {
                    let text = match serde_json::to_string(&frame) {
                        Ok(t) => t,
                        Err(e) => {
                            warn!(error = %e, "failed to serialize outbound frame");
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        warn!(error = %e, "failed to send frame to agent runtime");
                        break;
                    }
                }
                Some(msg) = stream.next() => {
                    match msg {
                        Ok(Message::Text(text)) => {
                            Self::dispatch_inbound(&text, &pending, &run_id_index);
                        }
                        Ok(Message::Ping(data)) => {
                            let _ = sink.send(Message::Pong(data)).await;
                        }
                        Ok(Message::Close(_)) => {
                            info!("agent runtime closed the connection");
                            break;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(error = %e, "agent runtime connection error");
                            break;
                        }
                    }
                }
                else => break,
            }
        }

        *state.write().await = ClientState::Disconnected;
        Self::fail_all_pending(&pending, &run_id_index, intentional_disconnect.load(Ordering::SeqCst));
    }

    fn dispatch_inbound(
        text: &str,
        pending: &DashMap<String, Arc<PendingChat>>,
        run_id_index: &DashMap<String, String>,
    ) {
        let frame: Frame = match serde_json::from_str(text) {
            Ok(f) => f,
            Err(e) => {
                warn!(error = %e, "failed to parse inbound frame");
                return;
            }
        };

        let Frame::Event { event, payload } = frame else {
            return;
        };
        if event != "chat" {
            return;
        }

        let chat: ChatEventPayload = match serde_json::from_value(payload) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "failed to parse chat event payload");
                return;
            }
        };

        let key = Self::resolve_pending_key(&chat, pending, run_id_index);
        let Some(key) = key else {
            debug!("chat event did not correlate to any outstanding send");
            return;
        };

        let is_terminal = matches!(chat.state, ChatState::Final | ChatState::Error | ChatState::Aborted);
        let entry = if is_terminal {
            pending.remove(&key).map(|(_, v)| v)
        } else {
            pending.get(&key).map(|e| e.value().clone())
        };
        let Some(entry) = entry else {
            return;
        };

        match chat.state {
            ChatState::Delta => {
                if let Some(ref message) = chat.message {
                    entry.accumulator.lock().push_str(&message.text_content());
                }
            }
            ChatState::Final => {
                let text = chat.message.as_ref().map(|m| m.text_content()).unwrap_or_default();
                Self::resolve_entry(&entry, Ok(text));
                run_id_index.retain(|_, v| v != &key);
            }
            ChatState::Error => {
                let detail = chat
                    .error
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "agent runtime reported a session error".to_string());
                Self::resolve_entry(
                    &entry,
                    Err(AppError::operator(ErrorCode::OpenclawSessionError, "agent session error", detail)),
                );
                run_id_index.retain(|_, v| v != &key);
            }
            ChatState::Aborted => {
                Self::resolve_entry(
                    &entry,
                    Err(AppError::operator(ErrorCode::OpenclawSessionError, "agent session error", "aborted")),
                );
                run_id_index.retain(|_, v| v != &key);
            }
        }
    }

    fn resolve_pending_key(
        chat: &ChatEventPayload,
        pending: &DashMap<String, Arc<PendingChat>>,
        run_id_index: &DashMap<String, String>,
    ) -> Option<String> {
        if let Some(ref run_id) = chat.run_id {
            if let Some(key) = run_id_index.get(run_id) {
                return Some(key.clone());
            }
            if pending.contains_key(run_id) {
                return Some(run_id.clone());
            }
        }

        if let Some(ref session_key) = chat.session_key {
            let matches: Vec<String> = pending
                .iter()
                .filter(|entry| &entry.value().session_key == session_key)
                .map(|entry| entry.key().clone())
                .collect();
            if matches.len() == 1 {
                let key = matches[0].clone();
                if let Some(ref run_id) = chat.run_id {
                    run_id_index.insert(run_id.clone(), key.clone());
                }
                return Some(key);
            }
        }

        None
    }

    fn resolve_entry(entry: &Arc<PendingChat>, result: Result<String, AppError>) {
        if let Ok(mut slot) = entry.done.try_lock()
            && let Some(sender) = slot.take()
        {
            let _ = sender.send(result);
        }
    }

    fn fail_all_pending(pending: &DashMap<String, Arc<PendingChat>>, run_id_index: &DashMap<String, String>, _intentional: bool) {
        for entry in pending.iter() {
            Self::resolve_entry(
                entry.value(),
                Err(AppError::operator(
                    ErrorCode::OpenclawUnavailable,
                    "agent runtime unavailable",
                    "connection closed with requests in flight",
                )),
            );
        }
        pending.clear();
        run_id_index.clear();
    }

    /// Send `text` on behalf of `session_key`, returning the assistant's
    /// final reassembled text once the agent reports `state:"final"`.
    pub async fn send(&self, session_key: &SessionKey, text: &str, timeout_ms: u64) -> Result<String, AppError> {
        self.ensure_ready().await?;

        let id = Uuid::new_v4().to_string();
        let idempotency_key = Uuid::new_v4().to_string();

        let (done_tx, done_rx) = oneshot::channel();
        let entry = Arc::new(PendingChat {
            session_key: session_key.as_str().to_string(),
            accumulator: SyncMutex::new(String::new()),
            done: AsyncMutex::new(Some(done_tx)),
        });
        self.pending.insert(idempotency_key.clone(), entry);

        let frame = Frame::Request {
            id,
            method: "chat.send".to_string(),
            params: serde_json::to_value(ChatSendParams {
                session_key: session_key.as_str().to_string(),
                message: text.to_string(),
                idempotency_key: idempotency_key.clone(),
                timeout_ms: Some(timeout_ms),
            })
            .expect("ChatSendParams always serializes"),
        };

        let sender = {
            let guard = self.ws_sender.lock().await;
            guard.clone()
        };
        let Some(sender) = sender else {
            self.pending.remove(&idempotency_key);
            return Err(AppError::operator(
                ErrorCode::OpenclawUnavailable,
                "agent runtime unavailable",
                "no active connection",
            ));
        };

        if sender.send(frame).await.is_err() {
            self.pending.remove(&idempotency_key);
            return Err(AppError::operator(
                ErrorCode::OpenclawUnavailable,
                "agent runtime unavailable",
                "outbound channel closed",
            ));
        }

        match tokio::time::timeout(Duration::from_millis(timeout_ms), done_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(AppError::operator(
                ErrorCode::OpenclawUnavailable,
                "agent runtime unavailable",
                "pending request dropped",
            )),
            Err(_) => {
                self.pending.remove(&idempotency_key);
                Err(AppError::user(ErrorCode::OpenclawTimeout, "agent did not respond in time"))
            }
        }
    }

    /// Moves to `Draining`: rejects further sends, closes the socket, and
    /// fails pending sends with `OPENCLAW_UNAVAILABLE`.
    pub async fn disconnect(&self) {
        self.intentional_disconnect.store(true, Ordering::SeqCst);
        *self.state.write().await = ClientState::Draining;

        *self.ws_sender.lock().await = None;
        if let Some(handle) = self.connection_handle.lock().await.take() {
            handle.abort();
        }

        Self::fail_all_pending(&self.pending, &self.run_id_index, true);
        *self.state.write().await = ClientState::Disconnected;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> Arc<AgentRuntimeClient> {
        AgentRuntimeClient::new(AgentClientConfig {
            url: "ws://127.0.0.1:1/agent".to_string(),
            token: Secret::new("tok"),
            handshake_timeout_ms: 1_000,
        })
    }

    #[test]
    fn backoff_delay_doubles_and_caps() {
        assert_eq!(AgentRuntimeClient::backoff_delay(0), Duration::from_millis(250));
        assert_eq!(AgentRuntimeClient::backoff_delay(1), Duration::from_millis(500));
        assert_eq!(AgentRuntimeClient::backoff_delay(5), Duration::from_millis(5_000));
    }

    #[tokio::test]
    async fn starts_disconnected() {
        let c = client();
        assert_eq!(c.state().await, ClientState::Disconnected);
    }

    #[tokio::test]
    async fn disconnect_on_never_connected_client_is_a_no_op() {
        let c = client();
        c.disconnect().await;
        assert_eq!(c.state().await, ClientState::Disconnected);
    }

    #[test]
    fn resolve_pending_key_matches_by_run_id_then_learns_index() {
        let pending: DashMap<String, Arc<PendingChat>> = DashMap::new();
        let run_id_index: DashMap<String, String> = DashMap::new();
        pending.insert(
            "idem-1".to_string(),
            Arc::new(PendingChat {
                session_key: "sess-1".to_string(),
                accumulator: SyncMutex::new(String::new()),
                done: AsyncMutex::new(None),
            }),
        );

        let chat = ChatEventPayload {
            run_id: Some("run-1".to_string()),
            session_key: Some("sess-1".to_string()),
            state: ChatState::Delta,
            message: None,
            error: None,
        };

        let key = AgentRuntimeClient::resolve_pending_key(&chat, &pending, &run_id_index);
        assert_eq!(key.as_deref(), Some("idem-1"));
        assert_eq!(run_id_index.get("run-1").map(|v| v.clone()), Some("idem-1".to_string()));

        // Subsequent event with only the run id (no session key) still resolves via the index.
        let chat2 = ChatEventPayload {
            run_id: Some("run-1".to_string()),
            session_key: None,
            state: ChatState::Final,
            message: None,
            error: None,
        };
        let key2 = AgentRuntimeClient::resolve_pending_key(&chat2, &pending, &run_id_index);
        assert_eq!(key2.as_deref(), Some("idem-1"));
    }
}

//! HTTP-level coverage of the `/api/voice/turn` and `/api/settings`
//! surface, driven through the real router and middleware stack with a
//! stub STT provider and a tiny in-process agent-runtime server standing
//! in for the network dependencies.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tower::ServiceExt;

use voice_turn_gateway::agent::{AgentClientConfig, AgentRuntimeClient, Frame};
use voice_turn_gateway::config::{ConfigStore, GatewayConfig};
use voice_turn_gateway::errors::AppResult;
use voice_turn_gateway::ids::{ProviderId, SessionKey};
use voice_turn_gateway::orchestrator::{AgentClientHolder, Orchestrator, ProviderMap};
use voice_turn_gateway::rate_limit::RateLimiter;
use voice_turn_gateway::routes::build_router;
use voice_turn_gateway::secret::Secret;
use voice_turn_gateway::state::AppState;
use voice_turn_gateway::stt::{AudioPayload, SttHealth, SttProvider, SttResult, TranscribeCtx};

struct StubProvider;

#[async_trait]
impl SttProvider for StubProvider {
    fn provider_id(&self) -> ProviderId {
        ProviderId::Whisperx
    }
    fn name(&self) -> &str {
        "stub"
    }
    async fn transcribe(&self, _audio: AudioPayload, _ctx: TranscribeCtx) -> AppResult<SttResult> {
        Ok(SttResult {
            text: "turn on the kitchen lights".to_string(),
            language: "en".to_string(),
            confidence: Some(0.95),
            provider_id: ProviderId::Whisperx,
            model: Some("stub-model".to_string()),
            duration_ms: 12,
        })
    }
    async fn health_check(&self) -> SttHealth {
        SttHealth { healthy: true, message: "ok".to_string(), latency_ms: 1 }
    }
}

async fn agent_test_server() -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        let connect_req = loop {
            if let tokio_tungstenite::tungstenite::Message::Text(text) =
                ws.next().await.unwrap().unwrap()
            {
                break serde_json::from_str::<Frame>(&text).unwrap();
            }
        };
        let id = match connect_req {
            Frame::Request { id, .. } => id,
            other => panic!("expected connect, got {other:?}"),
        };
        ws.send(tokio_tungstenite::tungstenite::Message::Text(
            serde_json::to_string(&Frame::Response { id, ok: true, result: Some(json!({})), error: None })
                .unwrap()
                .into(),
        ))
        .await
        .unwrap();

        let chat_req = loop {
            if let tokio_tungstenite::tungstenite::Message::Text(text) =
                ws.next().await.unwrap().unwrap()
            {
                break serde_json::from_str::<Frame>(&text).unwrap();
            }
        };
        let session_key = match chat_req {
            Frame::Request { params, .. } => params["sessionKey"].as_str().unwrap().to_string(),
            other => panic!("expected chat.send, got {other:?}"),
        };

        ws.send(tokio_tungstenite::tungstenite::Message::Text(
            serde_json::to_string(&Frame::Event {
                event: "chat".to_string(),
                payload: json!({
                    "runId": "run-http-1",
                    "sessionKey": session_key,
                    "state": "final",
                    "message": {"content": [{"type": "text", "text": "Turning on the kitchen lights now."}]},
                }),
            })
            .unwrap()
            .into(),
        ))
        .await
        .unwrap();
    });
    (format!("ws://{addr}/agent"), handle)
}

fn base_config() -> GatewayConfig {
    GatewayConfig {
        agent_gateway_url: "ws://127.0.0.1:1/agent".to_string(),
        agent_gateway_token: Secret::new("tok"),
        agent_session_key: SessionKey::new("sess-http").unwrap(),
        stt_provider: ProviderId::Whisperx,
        whisperx: Default::default(),
        openai: Default::default(),
        custom: Default::default(),
        server: Default::default(),
    }
}

async fn build_test_state(agent_url: String) -> AppState {
    build_test_state_with(agent_url, base_config()).await
}

async fn build_test_state_with(agent_url: String, mut cfg: GatewayConfig) -> AppState {
    cfg.agent_gateway_url = agent_url.clone();
    let config = Arc::new(ConfigStore::new(cfg));

    let providers: Arc<ProviderMap> = Arc::new(ProviderMap::new());
    providers.insert(ProviderId::Whisperx, Arc::new(StubProvider) as Arc<dyn SttProvider>);

    let agent_client = AgentRuntimeClient::new(AgentClientConfig {
        url: agent_url,
        token: Secret::new("tok"),
        handshake_timeout_ms: 2_000,
    });
    let agent_client = Arc::new(AgentClientHolder::new(agent_client));

    let rate_limiter = RateLimiter::new(config.clone());
    let orchestrator = Arc::new(Orchestrator::new(config.clone(), providers.clone(), agent_client.clone()));

    AppState {
        config,
        providers,
        agent_client,
        rate_limiter,
        orchestrator,
    }
}

fn with_connect_info(request: Request<Body>) -> Request<Body> {
    let mut request = request;
    let addr: SocketAddr = "127.0.0.1:55000".parse().unwrap();
    request.extensions_mut().insert(ConnectInfo(addr));
    request
}

#[tokio::test]
async fn voice_turn_happy_path_returns_shaped_reply_with_timing() {
    let (agent_url, server) = agent_test_server().await;
    let state = build_test_state(agent_url).await;
    let app = build_router(state);

    let request = with_connect_info(
        Request::builder()
            .method("POST")
            .uri("/api/voice/turn")
            .header("content-type", "audio/wav")
            .body(Body::from(vec![0u8; 16]))
            .unwrap(),
    );

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["assistant"]["full_text"], "Turning on the kitchen lights now.");
    assert!(body["timing"]["total_ms"].as_u64().is_some());
    assert_eq!(body["meta"]["provider"], "whisperx");

    server.await.unwrap();
}

#[tokio::test]
async fn voice_turn_rejects_unsupported_content_type() {
    let (agent_url, _server) = agent_test_server().await;
    let state = build_test_state(agent_url).await;
    let app = build_router(state);

    let request = with_connect_info(
        Request::builder()
            .method("POST")
            .uri("/api/voice/turn")
            .header("content-type", "application/json")
            .body(Body::from(vec![1u8; 4]))
            .unwrap(),
    );

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn settings_roundtrip_masks_secrets_and_applies_patch() {
    let (agent_url, _server) = agent_test_server().await;
    let state = build_test_state(agent_url).await;
    let app = build_router(state);

    let get_request = with_connect_info(
        Request::builder().method("GET").uri("/api/settings").body(Body::empty()).unwrap(),
    );
    let response = app.clone().oneshot(get_request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["agent_gateway_token"], voice_turn_gateway::secret::MASKED);

    let patch_request = with_connect_info(
        Request::builder()
            .method("POST")
            .uri("/api/settings")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&json!({"server": {"rateLimitPerMinute": 30}})).unwrap()))
            .unwrap(),
    );
    let response = app.oneshot(patch_request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["server"]["rate_limit_per_minute"], 30);
}

#[tokio::test]
async fn get_settings_is_never_rate_limited() {
    let (agent_url, _server) = agent_test_server().await;
    let mut cfg = base_config();
    cfg.server.rate_limit_per_minute = 1;
    let state = build_test_state_with(agent_url, cfg).await;
    let app = build_router(state);

    for _ in 0..5 {
        let request = with_connect_info(
            Request::builder().method("GET").uri("/api/settings").body(Body::empty()).unwrap(),
        );
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}

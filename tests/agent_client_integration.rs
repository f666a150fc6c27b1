//! End-to-end coverage of `AgentRuntimeClient` against a tiny in-process
//! WebSocket server that speaks the real frame protocol, exercising the
//! scenarios from the testable-properties list: a full handshake + chat
//! round trip, and the nonce-omission regression (no `connect.challenge`
//! within the fallback window still produces a valid `connect` request).

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;

use voice_turn_gateway::agent::{AgentClientConfig, AgentRuntimeClient, ClientState, Frame};
use voice_turn_gateway::ids::SessionKey;
use voice_turn_gateway::secret::Secret;

async fn start_server() -> (String, TcpListener) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (format!("ws://{addr}/agent"), listener)
}

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = listener.accept().await.unwrap();
    tokio_tungstenite::accept_async(stream).await.unwrap()
}

async fn recv_frame(ws: &mut WebSocketStream<TcpStream>) -> Frame {
    loop {
        match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            _ => continue,
        }
    }
}

async fn send_frame(ws: &mut WebSocketStream<TcpStream>, frame: &Frame) {
    ws.send(Message::Text(serde_json::to_string(frame).unwrap().into()))
        .await
        .unwrap();
}

#[tokio::test]
async fn full_handshake_and_chat_round_trip() {
    let (url, listener) = start_server().await;

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;

        send_frame(
            &mut ws,
            &Frame::Event {
                event: "connect.challenge".to_string(),
                payload: json!({"nonce": "srv-nonce-1"}),
            },
        )
        .await;

        let connect_req = recv_frame(&mut ws).await;
        let (id, params) = match connect_req {
            Frame::Request { id, method, params } => {
                assert_eq!(method, "connect");
                (id, params)
            }
            other => panic!("expected connect request, got {other:?}"),
        };
        assert_eq!(params["nonce"], "srv-nonce-1");

        send_frame(
            &mut ws,
            &Frame::Response {
                id,
                ok: true,
                result: Some(json!({"protocol": 3})),
                error: None,
            },
        )
        .await;

        let chat_req = recv_frame(&mut ws).await;
        let params = match chat_req {
            Frame::Request { method, params, .. } => {
                assert_eq!(method, "chat.send");
                params
            }
            other => panic!("expected chat.send request, got {other:?}"),
        };
        let session_key = params["sessionKey"].as_str().unwrap().to_string();

        send_frame(
            &mut ws,
            &Frame::Event {
                event: "chat".to_string(),
                payload: json!({
                    "runId": "run-1",
                    "sessionKey": session_key,
                    "state": "final",
                    "message": {"content": [{"type": "text", "text": "hello from the agent"}]},
                }),
            },
        )
        .await;
    });

    let client = AgentRuntimeClient::new(AgentClientConfig {
        url,
        token: Secret::new("tok"),
        handshake_timeout_ms: 2_000,
    });

    let session_key = SessionKey::new("sess-under-test").unwrap();
    let reply = client.send(&session_key, "hi there", 2_000).await.unwrap();
    assert_eq!(reply, "hello from the agent");
    assert_eq!(client.state().await, ClientState::Ready);

    server.await.unwrap();
}

#[tokio::test]
async fn connects_without_a_challenge_once_fallback_window_elapses() {
    let (url, listener) = start_server().await;

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;

        // No connect.challenge sent: the client must fall back to an
        // un-nonced connect request once CHALLENGE_FALLBACK_MS elapses.
        let connect_req = recv_frame(&mut ws).await;
        let (id, params) = match connect_req {
            Frame::Request { id, method, params } => {
                assert_eq!(method, "connect");
                (id, params)
            }
            other => panic!("expected connect request, got {other:?}"),
        };
        assert!(params.get("nonce").is_none() || params["nonce"].is_null());

        send_frame(
            &mut ws,
            &Frame::Response {
                id,
                ok: true,
                result: Some(json!({"protocol": 3})),
                error: None,
            },
        )
        .await;

        let chat_req = recv_frame(&mut ws).await;
        let params = match chat_req {
            Frame::Request { method, params, .. } => {
                assert_eq!(method, "chat.send");
                params
            }
            other => panic!("expected chat.send request, got {other:?}"),
        };
        let session_key = params["sessionKey"].as_str().unwrap().to_string();

        send_frame(
            &mut ws,
            &Frame::Event {
                event: "chat".to_string(),
                payload: json!({
                    "runId": "run-2",
                    "sessionKey": session_key,
                    "state": "final",
                    "message": {"content": [{"type": "text", "text": "no-nonce reply"}]},
                }),
            },
        )
        .await;
    });

    let client = AgentRuntimeClient::new(AgentClientConfig {
        url,
        token: Secret::new("tok"),
        handshake_timeout_ms: 2_000,
    });

    let session_key = SessionKey::new("sess-no-nonce").unwrap();
    let reply = client.send(&session_key, "hi", 2_000).await.unwrap();
    assert_eq!(reply, "no-nonce reply");

    server.await.unwrap();
}

#[tokio::test]
async fn agent_session_error_surfaces_as_openclaw_session_error() {
    let (url, listener) = start_server().await;

    let server = tokio::spawn(async move {
        let mut ws = accept(&listener).await;
        let connect_req = recv_frame(&mut ws).await;
        let id = match connect_req {
            Frame::Request { id, .. } => id,
            other => panic!("expected connect request, got {other:?}"),
        };
        send_frame(
            &mut ws,
            &Frame::Response { id, ok: true, result: Some(json!({})), error: None },
        )
        .await;

        let chat_req = recv_frame(&mut ws).await;
        let params = match chat_req {
            Frame::Request { params, .. } => params,
            other => panic!("expected chat.send request, got {other:?}"),
        };
        let session_key = params["sessionKey"].as_str().unwrap().to_string();

        send_frame(
            &mut ws,
            &Frame::Event {
                event: "chat".to_string(),
                payload: json!({
                    "runId": "run-3",
                    "sessionKey": session_key,
                    "state": "error",
                    "error": {"message": "upstream model unavailable"},
                }),
            },
        )
        .await;
    });

    let client = AgentRuntimeClient::new(AgentClientConfig {
        url,
        token: Secret::new("tok"),
        handshake_timeout_ms: 2_000,
    });

    let session_key = SessionKey::new("sess-error").unwrap();
    let err = client.send(&session_key, "hi", 2_000).await.unwrap_err();
    assert_eq!(err.code().as_str(), "OPENCLAW_SESSION_ERROR");

    server.await.unwrap();
}

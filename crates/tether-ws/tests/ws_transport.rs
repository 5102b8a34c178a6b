// SPDX-FileCopyrightText: 2026 Tether Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket transport against a local tokio-tungstenite server.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

use tether_core::{MessageId, OutboundMessage, TetherError, Transport, TransportEvent, TransportEvents};
use tether_ws::WsTransport;

const WAIT: Duration = Duration::from_secs(5);

async fn listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());
    (listener, url)
}

/// Accepts one connection, requiring `Authorization: Bearer good`.
fn require_bearer(req: &Request, resp: Response) -> Result<Response, ErrorResponse> {
    let authorized = req
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        == Some("Bearer good");
    if authorized {
        Ok(resp)
    } else {
        let mut rejection = ErrorResponse::new(Some("unauthorized".to_string()));
        *rejection.status_mut() = StatusCode::UNAUTHORIZED;
        Err(rejection)
    }
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<(u64, TransportEvent)>) -> TransportEvent {
    let (_, event) = timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    event
}

#[tokio::test]
async fn acks_frames_and_clean_close_are_reported() {
    let (listener, url) = listener().await;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_hdr_async(stream, require_bearer)
            .await
            .unwrap();

        let Some(Ok(Message::Text(text))) = ws.next().await else {
            panic!("expected a text message");
        };
        let sent: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(sent["type"], "text");
        assert_eq!(sent["content"], "hello server");

        let ack = serde_json::json!({"type": "ack", "id": sent["id"]}).to_string();
        ws.send(Message::Text(ack.into())).await.unwrap();
        let frame = r#"{"id":"srv-1","type":"text","content":"hello client","timestamp":"2026-03-01T10:00:00Z"}"#;
        ws.send(Message::Text(frame.into())).await.unwrap();
        ws.close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        }))
        .await
        .unwrap();
    });

    let transport = WsTransport::new(url, Some("good".to_string()));
    let (tx, mut rx) = mpsc::unbounded_channel();
    transport.open(TransportEvents::new(3, tx)).await.unwrap();

    let message = OutboundMessage::text("hello server");
    transport.send(&message).await.unwrap();

    assert_eq!(
        next_event(&mut rx).await,
        TransportEvent::Ack {
            message_id: message.id.clone()
        }
    );
    match next_event(&mut rx).await {
        TransportEvent::Frame(frame) => {
            assert_eq!(frame.id, MessageId::from("srv-1"));
            assert_eq!(frame.content, serde_json::json!("hello client"));
        }
        other => panic!("expected frame, got {other:?}"),
    }
    assert_eq!(
        next_event(&mut rx).await,
        TransportEvent::Closed {
            clean: true,
            reason: Some("bye".to_string())
        }
    );

    server.await.unwrap();
    assert!(transport.send(&OutboundMessage::text("late")).await.is_err());
    transport.close().await.unwrap();
}

#[tokio::test]
async fn rejected_bearer_is_an_authentication_error() {
    let (listener, url) = listener().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let _ = tokio_tungstenite::accept_hdr_async(stream, require_bearer).await;
    });

    let transport = WsTransport::new(url, Some("stale".to_string()));
    let (tx, _rx) = mpsc::unbounded_channel();
    let err = transport.open(TransportEvents::new(1, tx)).await.unwrap_err();
    assert!(matches!(err, TetherError::Authentication { .. }), "got {err:?}");
}

#[tokio::test]
async fn refused_connection_is_a_connection_error() {
    let (listener, url) = listener().await;
    drop(listener);

    let transport = WsTransport::new(url, None);
    let (tx, _rx) = mpsc::unbounded_channel();
    let err = transport.open(TransportEvents::new(1, tx)).await.unwrap_err();
    assert_eq!(err.code(), Some("connect_failed"));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn local_close_sends_close_frame_without_event() {
    let (listener, url) = listener().await;
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None => return true,
                Some(Ok(_)) => continue,
                Some(Err(_)) => return false,
            }
        }
    });

    let transport = WsTransport::new(url, None);
    let (tx, mut rx) = mpsc::unbounded_channel();
    transport.open(TransportEvents::new(1, tx)).await.unwrap();
    transport.close().await.unwrap();

    assert!(timeout(WAIT, server).await.unwrap().unwrap());
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn abrupt_disconnect_is_an_unclean_close() {
    let (listener, url) = listener().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        drop(ws);
    });

    let transport = WsTransport::new(url, None);
    let (tx, mut rx) = mpsc::unbounded_channel();
    transport.open(TransportEvents::new(1, tx)).await.unwrap();

    match next_event(&mut rx).await {
        TransportEvent::Closed { clean, .. } => assert!(!clean),
        other => panic!("expected closed, got {other:?}"),
    }
}

//! Real sockets: upstream accept, downstream dial, full round trip.

mod common;

use common::*;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::http::HeaderMap;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{accept_hdr_async, connect_async};

use onebot_filter::{HttpServer, Relay, RelayConfig};

const SUFFIX: &str = "/onebot/v11/ws";

async fn serve(relay: &Arc<Relay>, config: &RelayConfig) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut server = config.server.clone();
    server.suffix = SUFFIX.to_string();
    let http = HttpServer::new(&server, relay.hub());

    let mut shutdown = relay.subscribe_shutdown();
    tokio::spawn(http.run(listener, async move {
        let _ = shutdown.recv().await;
    }));
    addr
}

#[tokio::test]
async fn second_upstream_is_forbidden() {
    let config = config("");
    let (relay, _dialer, _peers) = relay(&config);
    let addr = serve(&relay, &config).await;
    let url = format!("ws://{}{}", addr, SUFFIX);

    let (mut first, _) = connect_async(url.as_str()).await.unwrap();
    let hub = relay.hub();
    eventually(|| hub.is_connected()).await;

    match connect_async(url.as_str()).await {
        Err(tungstenite::Error::Http(response)) => assert_eq!(response.status(), 403),
        other => panic!("expected 403, got {:?}", other.map(|(_, r)| r.status())),
    }

    first.close(None).await.unwrap();
    eventually(|| !hub.is_connected()).await;
    assert!(connect_async(url.as_str()).await.is_ok());

    relay.shutdown();
}

#[tokio::test]
async fn round_trip_through_real_sockets() {
    let bot = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let bot_addr = bot.local_addr().unwrap();
    let config = config(&format!(
        r##"
        [[bot-apps]]
        name = "bot"
        uri = "ws://{}/ws"
        access-token = "secret"

        [bot-apps.private-message]
        mode = "whitelist"
        prefix = ["#"]
        prefix-replace = "/"
        "##,
        bot_addr
    ));

    let (headers_tx, headers_rx) = oneshot::channel::<HeaderMap>();
    let bot_task = tokio::spawn(async move {
        let (stream, _) = bot.accept().await.unwrap();
        let mut ws = accept_hdr_async(stream, move |request: &Request, response: Response| {
            let _ = headers_tx.send(request.headers().clone());
            Ok(response)
        })
        .await
        .unwrap();

        let received = loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => break text.as_str().to_owned(),
                _ => continue,
            }
        };
        ws.send(Message::text(r#"{"action":"send_private_msg","params":{"user_id":1}}"#))
            .await
            .unwrap();
        received
    });

    let relay = Arc::new(Relay::from_config(&config));
    relay.start_all(&config).unwrap();

    let headers = timeout(WAIT, headers_rx).await.unwrap().unwrap();
    assert_eq!(headers["x-self-id"], "10001");
    assert_eq!(headers["authorization"], "Bearer secret");
    assert_eq!(headers["user-agent"], "OneBot/11");
    assert_eq!(headers["x-client-role"], "Universal");

    let hub = relay.hub();
    eventually(|| hub.link_count() == 1).await;

    let addr = serve(&relay, &config).await;
    let (mut upstream, _) = connect_async(format!("ws://{}{}", addr, SUFFIX).as_str()).await.unwrap();
    eventually(|| hub.is_connected()).await;

    // Rejected by the whitelist, then admitted and rewritten by the prefix.
    for text in ["hello", "#help"] {
        let frame = private_message(1, text);
        upstream.send(Message::text(frame.as_text().unwrap().to_owned())).await.unwrap();
    }

    let received = timeout(WAIT, bot_task).await.unwrap().unwrap();
    let received: serde_json::Value = serde_json::from_str(&received).unwrap();
    assert_eq!(received["message"], "/help");
    assert_eq!(received["raw_message"], "/help");

    let reply = loop {
        match timeout(WAIT, upstream.next()).await.unwrap().unwrap().unwrap() {
            Message::Text(text) => break text.as_str().to_owned(),
            _ => continue,
        }
    };
    assert!(reply.contains("send_private_msg"));

    relay.shutdown();
}

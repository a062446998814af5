//! Upgraded upstream socket as a frame transport.
//!
//! # Data Flow
//! ```text
//! Gateway ←──── WebSocket frames ────→ Relay (UpstreamHub)
//! ```
//!
//! # Design Decisions
//! - Frame-level forwarding (no message buffering)
//! - Ping/pong handled by axum; close ends the stream

use axum::extract::ws::{Message, WebSocket};
use futures_util::{future, SinkExt, StreamExt};

use crate::link::transport::{Frame, Transport, TransportError};

/// Wrap an accepted socket as a frame transport.
pub fn from_socket(socket: WebSocket) -> Transport {
    let (ws_sink, ws_stream) = socket.split();

    let sink = ws_sink
        .sink_map_err(TransportError::from)
        .with(|frame: Frame| {
            future::ready(Ok::<_, TransportError>(match frame {
                Frame::Text(text) => Message::Text(text.into()),
                Frame::Binary(data) => Message::Binary(data.into()),
            }))
        });

    let stream = ws_stream.filter_map(|message| {
        future::ready(match message {
            Ok(Message::Text(text)) => Some(Ok(Frame::Text(text.as_str().to_owned()))),
            Ok(Message::Binary(data)) => Some(Ok(Frame::Binary(data.to_vec()))),
            Ok(Message::Close(_)) => Some(Err(TransportError::Closed)),
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => None,
            Err(e) => Some(Err(e.into())),
        })
    });

    Transport {
        sink: Box::pin(sink),
        stream: Box::pin(stream),
    }
}

//! WebSocket transport.
//!
//! One task per connection reads frames and hands them to the context. A
//! second task per connection drains that session's outbound queue into the
//! socket, so match tasks never wait on a slow client.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use rts_core::data::ContentTables;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::context::ServerContext;
use crate::error::ServerError;
use crate::protocol::parse_frame;

/// Frames buffered per connection before new ones are dropped.
const OUTBOUND_BUFFER: usize = 256;

/// Bind and serve until Ctrl-C.
pub async fn run(config: ServerConfig) -> Result<(), ServerError> {
    let content = Arc::new(ContentTables::standard()?);
    let address = config.socket_address();
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|source| ServerError::Bind {
            address: address.clone(),
            source,
        })?;
    info!(%address, tick_rate = config.tick_rate, "server listening");
    serve(listener, Arc::new(ServerContext::new(content, config))).await
}

/// Accept connections on `listener` until Ctrl-C.
pub async fn serve(listener: TcpListener, ctx: Arc<ServerContext>) -> Result<(), ServerError> {
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(serve_connection(Arc::clone(&ctx), stream, peer));
                }
                Err(e) => error!(error = %e, "accept failed"),
            },
            signal = tokio::signal::ctrl_c() => {
                signal?;
                info!("shutdown signal received");
                return Ok(());
            }
        }
    }
}

async fn serve_connection(ctx: Arc<ServerContext>, stream: TcpStream, peer: SocketAddr) {
    let socket = match accept_async(stream).await {
        Ok(socket) => socket,
        Err(e) => {
            warn!(%peer, error = %e, "websocket handshake failed");
            return;
        }
    };
    let (mut sink, mut source) = socket.split();
    let (outbound, mut queued) = mpsc::channel::<String>(OUTBOUND_BUFFER);
    let session = ctx.connect(outbound).await;
    info!(session, %peer, "client connected");

    let writer = tokio::spawn(async move {
        while let Some(text) = queued.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(message) = source.next().await {
        match message {
            Ok(Message::Text(text)) => match parse_frame(&text) {
                Ok(frame) => ctx.handle(session, frame).await,
                Err(e) => warn!(session, error = %e, "malformed frame"),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(session, error = %e, "connection error");
                break;
            }
        }
    }

    ctx.disconnect(session).await;
    writer.abort();
    info!(session, %peer, "client disconnected");
}

//! Relay server implementation.

use crate::protocol::{self, Route};
use chatwire_core::{Envelope, UserId};
use futures_util::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{RwLock, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;

/// Live connections, per user. A user may be connected more than once.
#[derive(Default)]
struct Relay {
    users: RwLock<HashMap<UserId, HashMap<u64, mpsc::UnboundedSender<String>>>>,
    next_connection: AtomicU64,
}

impl Relay {
    async fn join(&self, user: &UserId) -> (u64, mpsc::UnboundedReceiver<String>) {
        let id = self.next_connection.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.users
            .write()
            .await
            .entry(user.clone())
            .or_default()
            .insert(id, tx);
        (id, rx)
    }

    async fn leave(&self, user: &UserId, id: u64) {
        let mut users = self.users.write().await;
        if let Some(connections) = users.get_mut(user) {
            connections.remove(&id);
            if connections.is_empty() {
                users.remove(user);
            }
        }
    }

    /// Returns how many connections received the frame.
    async fn deliver(&self, to: &UserId, frame: &str) -> usize {
        let users = self.users.read().await;
        users.get(to).map_or(0, |connections| {
            connections
                .values()
                .filter(|tx| tx.send(frame.to_string()).is_ok())
                .count()
        })
    }
}

pub async fn run(addr: SocketAddr) -> anyhow::Result<()> {
    let relay = Arc::new(Relay::default());

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Listening on ws://{}", addr);

    loop {
        let (stream, client_addr) = listener.accept().await?;
        let relay = relay.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, client_addr, relay).await {
                tracing::warn!("Connection error from {}: {}", client_addr, e);
            }
        });
    }
}

fn reject(status: StatusCode) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some("missing token".to_string()));
    *response.status_mut() = status;
    response
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    relay: Arc<Relay>,
) -> anyhow::Result<()> {
    let mut user = None;
    let ws = tokio_tungstenite::accept_hdr_async(
        stream,
        |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            let token = request.uri().query().and_then(protocol::token_from_query);
            match token.as_deref().map(str::parse::<UserId>) {
                Some(Ok(id)) => {
                    user = Some(id);
                    Ok(response)
                }
                _ => Err(reject(StatusCode::UNAUTHORIZED)),
            }
        },
    )
    .await?;
    let user = user.ok_or_else(|| anyhow::anyhow!("handshake accepted without a user"))?;
    let (mut sink, mut stream) = ws.split();

    let (connection, mut inbox) = relay.join(&user).await;
    tracing::info!("{} connected from {}", user, addr);

    loop {
        tokio::select! {
            msg = stream.next() => {
                let msg = match msg {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        tracing::debug!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => {
                        let envelope = match Envelope::decode(text.as_str()) {
                            Ok(envelope) => envelope,
                            Err(e) => {
                                tracing::warn!("Invalid message from {}: {}", user, e);
                                continue;
                            }
                        };
                        match protocol::route(&user, envelope) {
                            Route::Reply(reply) => {
                                sink.send(Message::Text(reply.encode()?.into())).await?;
                            }
                            Route::Forward { to, envelope } => {
                                let delivered = relay.deliver(&to, &envelope.encode()?).await;
                                tracing::debug!(
                                    "{} {} -> {} ({} connections)",
                                    envelope.tag, user, to, delivered
                                );
                            }
                            Route::Drop(reason) => {
                                tracing::debug!("Dropping frame from {}: {}", user, reason);
                            }
                        }
                    }
                    Message::Close(frame) => {
                        tracing::debug!("{} closed: {:?}", user, frame);
                        break;
                    }
                    _ => {}
                }
            }

            frame = inbox.recv() => {
                if let Some(frame) = frame {
                    sink.send(Message::Text(frame.into())).await?;
                }
            }
        }
    }

    relay.leave(&user, connection).await;
    tracing::info!("{} disconnected", user);
    Ok(())
}

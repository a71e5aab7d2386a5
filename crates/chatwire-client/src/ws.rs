//! WebSocket channels over tokio-tungstenite.

use crate::transport::{Channel, ChannelEvents, CloseReason, Connector, OpenRequest};
use chatwire_core::TransportError;
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// Opens one socket task per channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

enum Outgoing {
    Frame(String),
    Close(CloseReason),
}

struct WsChannel {
    outgoing: mpsc::UnboundedSender<Outgoing>,
}

impl Channel for WsChannel {
    fn send(&self, frame: String) -> Result<(), TransportError> {
        self.outgoing
            .send(Outgoing::Frame(frame))
            .map_err(|_| TransportError::SendRejected("socket task has exited".to_string()))
    }

    fn close(&self, reason: CloseReason) {
        let _ = self.outgoing.send(Outgoing::Close(reason));
    }
}

impl Connector for WsConnector {
    fn open(
        &self,
        request: OpenRequest,
        events: ChannelEvents,
    ) -> Result<Box<dyn Channel>, TransportError> {
        let (outgoing, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_socket(request.url(), rx, events));
        Ok(Box::new(WsChannel { outgoing }))
    }
}

fn close_frame(reason: CloseReason) -> CloseFrame {
    CloseFrame {
        code: if reason.is_clean() {
            CloseCode::Normal
        } else {
            CloseCode::Away
        },
        reason: reason.as_str().into(),
    }
}

async fn run_socket(
    url: Url,
    mut outgoing: mpsc::UnboundedReceiver<Outgoing>,
    events: ChannelEvents,
) {
    let connect = tokio_tungstenite::connect_async(url.as_str());
    tokio::pin!(connect);

    let ws = loop {
        tokio::select! {
            result = &mut connect => match result {
                Ok((ws, _response)) => break ws,
                Err(e) => {
                    events.error(&e);
                    events.closed(false);
                    return;
                }
            },
            cmd = outgoing.recv() => match cmd {
                Some(Outgoing::Frame(_)) => {
                    tracing::debug!(channel = %events.id(), "dropping frame queued before open");
                }
                Some(Outgoing::Close(reason)) => {
                    events.closed(reason.is_clean());
                    return;
                }
                None => return,
            },
        }
    };

    events.opened();
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            cmd = outgoing.recv() => match cmd {
                Some(Outgoing::Frame(text)) => {
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        events.error(&e);
                        events.closed(false);
                        return;
                    }
                }
                Some(Outgoing::Close(reason)) => {
                    let _ = sink.send(Message::Close(Some(close_frame(reason)))).await;
                    let _ = sink.close().await;
                    events.closed(reason.is_clean());
                    return;
                }
                None => {
                    // Handle dropped without an explicit close.
                    let _ = sink.send(Message::Close(Some(close_frame(CloseReason::Superseded)))).await;
                    return;
                }
            },
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => events.frame(text.as_str()),
                Some(Ok(Message::Close(frame))) => {
                    let clean = frame.as_ref().is_some_and(|f| f.code == CloseCode::Normal);
                    tracing::debug!(channel = %events.id(), ?frame, "peer closed channel");
                    events.closed(clean);
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    events.error(&e);
                    events.closed(false);
                    return;
                }
                None => {
                    events.closed(false);
                    return;
                }
            },
        }
    }
}

//! Scripted transports for driving the client without a network.

#![allow(dead_code)]

use async_trait::async_trait;
use chatwire_client::{
    Channel, ChannelEvents, ClientConfig, CloseReason, Connector, FallbackApi, OpenRequest,
    RealtimeClient, SessionSource, SessionStore, SessionToken,
};
use chatwire_core::{ConversationSummary, FallbackError, TransportError, UserId};
use reqwest::Url;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ME: &str = "1";
pub const PEER: &str = "2";

/// One channel handed out by [`ScriptedConnector`].
pub struct FakeChannel {
    pub url: Url,
    pub events: ChannelEvents,
    frames: Mutex<Vec<String>>,
    closes: Mutex<Vec<CloseReason>>,
    fail_writes: AtomicBool,
}

impl FakeChannel {
    /// Everything written, heartbeats included.
    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().unwrap().clone()
    }

    /// Frames other than heartbeats.
    pub fn payload_frames(&self) -> Vec<serde_json::Value> {
        self.frames()
            .iter()
            .map(|f| serde_json::from_str::<serde_json::Value>(f).unwrap())
            .filter(|v| v["type"] != "PING")
            .collect()
    }

    pub fn ping_count(&self) -> usize {
        self.frames().iter().filter(|f| f.contains(r#""type":"PING""#)).count()
    }

    pub fn closes(&self) -> Vec<CloseReason> {
        self.closes.lock().unwrap().clone()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

struct Handle(Arc<FakeChannel>);

impl Channel for Handle {
    fn send(&self, frame: String) -> Result<(), TransportError> {
        if self.0.fail_writes.load(Ordering::SeqCst) {
            return Err(TransportError::SendRejected("scripted failure".to_string()));
        }
        self.0.frames.lock().unwrap().push(frame);
        Ok(())
    }

    fn close(&self, reason: CloseReason) {
        self.0.closes.lock().unwrap().push(reason);
    }
}

/// Records every open and lets the test decide what each channel does.
#[derive(Default)]
pub struct ScriptedConnector {
    channels: Mutex<Vec<Arc<FakeChannel>>>,
    unsupported: AtomicBool,
    refuse_open: AtomicBool,
    auto_open: AtomicBool,
}

impl ScriptedConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Channels report `Opened` as soon as they are created.
    pub fn auto_opening() -> Arc<Self> {
        let connector = Self::default();
        connector.auto_open.store(true, Ordering::SeqCst);
        Arc::new(connector)
    }

    pub fn set_supported(&self, supported: bool) {
        self.unsupported.store(!supported, Ordering::SeqCst);
    }

    pub fn set_refuse_open(&self, refuse: bool) {
        self.refuse_open.store(refuse, Ordering::SeqCst);
    }

    pub fn opens(&self) -> usize {
        self.channels.lock().unwrap().len()
    }

    pub fn channel(&self, index: usize) -> Arc<FakeChannel> {
        self.channels.lock().unwrap()[index].clone()
    }

    pub fn last(&self) -> Arc<FakeChannel> {
        self.channels
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no channel opened")
    }
}

impl Connector for ScriptedConnector {
    fn is_supported(&self) -> bool {
        !self.unsupported.load(Ordering::SeqCst)
    }

    fn open(
        &self,
        request: OpenRequest,
        events: ChannelEvents,
    ) -> Result<Box<dyn Channel>, TransportError> {
        let channel = Arc::new(FakeChannel {
            url: request.url(),
            events: events.clone(),
            frames: Mutex::default(),
            closes: Mutex::default(),
            fail_writes: AtomicBool::new(false),
        });
        self.channels.lock().unwrap().push(channel.clone());
        if self.refuse_open.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("scripted refusal".to_string()));
        }
        if self.auto_open.load(Ordering::SeqCst) {
            events.opened();
        }
        Ok(Box::new(Handle(channel)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FallbackCall {
    SendChat { receiver: UserId, content: String },
    MarkRead { sender: UserId },
    UnreadCount,
    Conversations,
}

/// In-memory [`FallbackApi`] that records calls.
#[derive(Default)]
pub struct FakeFallback {
    calls: Mutex<Vec<FallbackCall>>,
    failure: Mutex<Option<FallbackError>>,
    unread: AtomicU64,
    conversations: Mutex<Vec<ConversationSummary>>,
}

impl FakeFallback {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<FallbackCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn fail_with(&self, error: FallbackError) {
        *self.failure.lock().unwrap() = Some(error);
    }

    pub fn set_unread(&self, count: u64, conversations: Vec<ConversationSummary>) {
        self.unread.store(count, Ordering::SeqCst);
        *self.conversations.lock().unwrap() = conversations;
    }

    fn record(&self, call: FallbackCall) -> Result<(), FallbackError> {
        self.calls.lock().unwrap().push(call);
        match self.failure.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl FallbackApi for FakeFallback {
    async fn send_chat(&self, receiver: &UserId, content: &str) -> Result<(), FallbackError> {
        self.record(FallbackCall::SendChat {
            receiver: receiver.clone(),
            content: content.to_string(),
        })
    }

    async fn mark_read(&self, sender: &UserId) -> Result<(), FallbackError> {
        self.record(FallbackCall::MarkRead {
            sender: sender.clone(),
        })
    }

    async fn unread_count(&self) -> Result<u64, FallbackError> {
        self.record(FallbackCall::UnreadCount)?;
        Ok(self.unread.load(Ordering::SeqCst))
    }

    async fn conversations(&self) -> Result<Vec<ConversationSummary>, FallbackError> {
        self.record(FallbackCall::Conversations)?;
        Ok(self.conversations.lock().unwrap().clone())
    }
}

pub fn conversation(partner: &str, unread: i64) -> ConversationSummary {
    let mut fields = serde_json::Map::new();
    fields.insert("partnerId".to_string(), partner.into());
    ConversationSummary {
        unread_count: unread,
        fields,
    }
}

pub fn logged_in_session() -> Arc<SessionStore> {
    Arc::new(SessionStore::logged_in(
        SessionToken::new("secret"),
        UserId::new(ME),
    ))
}

pub struct Harness {
    pub client: RealtimeClient,
    pub session: Arc<SessionStore>,
    pub connector: Arc<ScriptedConnector>,
    pub fallback: Arc<FakeFallback>,
}

impl Harness {
    pub fn start(session: Arc<SessionStore>, connector: Arc<ScriptedConnector>) -> Self {
        Self::with_config(ClientConfig::default(), session, connector)
    }

    pub fn with_config(
        config: ClientConfig,
        session: Arc<SessionStore>,
        connector: Arc<ScriptedConnector>,
    ) -> Self {
        let fallback = FakeFallback::new();
        let client = RealtimeClient::with_transports(
            config,
            session.clone() as Arc<dyn SessionSource>,
            connector.clone(),
            fallback.clone(),
        )
        .unwrap();
        Self {
            client,
            session,
            connector,
            fallback,
        }
    }
}

/// Let every ready task run. Advances paused time by a millisecond.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

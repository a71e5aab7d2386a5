mod support;

use chatwire_client::{PollOutcome, SessionStore};
use chatwire_core::{
    ConnectionState, FallbackError, Inbound, Intent, IntentData, SendFailure, SendOutcome, Tag,
    UserId,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use support::{
    FallbackCall, Harness, PEER, ScriptedConnector, conversation, logged_in_session, settle,
};
use tokio::time::Instant;

fn peer() -> UserId {
    UserId::new(PEER)
}

/// Logged in, but the channel can never open.
async fn offline() -> Harness {
    let connector = ScriptedConnector::new();
    connector.set_supported(false);
    let h = Harness::start(logged_in_session(), connector);
    settle().await;
    h
}

async fn online() -> Harness {
    let h = Harness::start(logged_in_session(), ScriptedConnector::auto_opening());
    settle().await;
    assert!(h.client.is_connected());
    h
}

#[tokio::test(start_paused = true)]
async fn chat_goes_over_the_channel_when_connected() {
    let h = online().await;
    let outcome = h.client.send(Intent::chat(peer(), "hi")).await;
    assert_eq!(outcome, SendOutcome::SentViaChannel);

    let frames = h.connector.last().payload_frames();
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["type"], "CHAT");
    assert_eq!(frames[0]["from"], "1");
    assert_eq!(frames[0]["to"], "2");
    assert_eq!(frames[0]["content"], "hi");
    assert!(frames[0]["timestamp"].as_u64().unwrap() > 0);
    assert!(h.fallback.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn chat_falls_back_when_disconnected() {
    let h = offline().await;
    assert_eq!(h.client.state(), ConnectionState::Disconnected);

    let outcome = h.client.send(Intent::chat(peer(), "hi")).await;
    assert_eq!(outcome, SendOutcome::SentViaFallback);
    assert_eq!(
        h.fallback.calls(),
        vec![FallbackCall::SendChat {
            receiver: peer(),
            content: "hi".to_string()
        }]
    );
}

#[tokio::test(start_paused = true)]
async fn mark_read_falls_back_to_the_sender() {
    let h = offline().await;
    let outcome = h.client.send(Intent::mark_read(peer())).await;
    assert_eq!(outcome, SendOutcome::SentViaFallback);
    assert_eq!(
        h.fallback.calls(),
        vec![FallbackCall::MarkRead { sender: peer() }]
    );
}

#[tokio::test(start_paused = true)]
async fn typing_is_dropped_without_a_channel() {
    let h = offline().await;
    let outcome = h.client.send(Intent::typing(peer())).await;
    assert_eq!(outcome, SendOutcome::Ignored);
    assert!(!outcome.is_delivered());
    assert!(h.fallback.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn typing_carries_a_marker_over_the_channel() {
    let h = online().await;
    let outcome = h.client.send(Intent::typing(peer())).await;
    assert_eq!(outcome, SendOutcome::SentViaChannel);
    let frames = h.connector.last().payload_frames();
    assert_eq!(frames[0]["type"], "TYPING");
    assert_eq!(frames[0]["content"], "typing");
}

#[tokio::test(start_paused = true)]
async fn new_messages_has_no_fallback() {
    let h = offline().await;
    let outcome = h.client.send(Intent::new_messages(peer(), "3")).await;
    assert_eq!(
        outcome,
        SendOutcome::Failed(SendFailure::Unsupported(Tag::NewMessages))
    );
    assert!(h.fallback.calls().is_empty());

    let h = online().await;
    let outcome = h.client.send(Intent::new_messages(peer(), "3")).await;
    assert_eq!(outcome, SendOutcome::SentViaChannel);
}

#[tokio::test(start_paused = true)]
async fn nothing_is_sent_without_a_user() {
    let h = Harness::start(Arc::new(SessionStore::new()), ScriptedConnector::new());
    let outcome = h.client.send(Intent::chat(peer(), "hi")).await;
    assert_eq!(outcome, SendOutcome::Invalid);
    assert!(h.fallback.calls().is_empty());
    assert_eq!(h.connector.opens(), 0);
}

#[tokio::test(start_paused = true)]
async fn incomplete_intents_are_rejected() {
    let h = online().await;
    let intent = Intent {
        tag: Tag::Chat,
        data: IntentData {
            receiver_id: Some(peer()),
            ..Default::default()
        },
    };
    assert_eq!(h.client.send(intent).await, SendOutcome::Invalid);
    assert!(h.connector.last().payload_frames().is_empty());
    assert!(h.fallback.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn waits_for_a_connecting_channel() {
    let h = Harness::start(logged_in_session(), ScriptedConnector::new());
    settle().await;
    assert_eq!(h.client.state(), ConnectionState::Connecting);

    let client = h.client.clone();
    let sending = tokio::spawn(async move { client.send(Intent::chat(peer(), "soon")).await });
    tokio::time::sleep(Duration::from_millis(200)).await;
    h.connector.last().events.opened();

    assert_eq!(sending.await.unwrap(), SendOutcome::SentViaChannel);
    assert_eq!(h.connector.last().payload_frames()[0]["content"], "soon");
    assert!(h.fallback.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn gives_up_on_a_slow_channel_after_the_grace_period() {
    let h = Harness::start(logged_in_session(), ScriptedConnector::new());
    settle().await;

    let started = Instant::now();
    let outcome = h.client.send(Intent::chat(peer(), "late")).await;
    assert_eq!(outcome, SendOutcome::SentViaFallback);
    assert!(started.elapsed() >= Duration::from_millis(500));
    assert_eq!(h.client.state(), ConnectionState::Connecting);
}

#[tokio::test(start_paused = true)]
async fn failed_channel_write_falls_back() {
    let h = online().await;
    h.connector.last().fail_writes(true);

    let outcome = h.client.send(Intent::chat(peer(), "hi")).await;
    assert_eq!(outcome, SendOutcome::SentViaFallback);
    assert_eq!(h.fallback.calls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn fallback_errors_are_reported() {
    let h = offline().await;
    h.fallback.fail_with(FallbackError::Server(503));

    let outcome = h.client.send(Intent::chat(peer(), "hi")).await;
    assert_eq!(
        outcome,
        SendOutcome::Failed(SendFailure::Fallback(FallbackError::Server(503)))
    );
}

#[tokio::test(start_paused = true)]
async fn polling_is_skipped_while_connected() {
    let h = online().await;
    assert_eq!(h.client.poll_missed_messages().await, PollOutcome::Skipped);
    assert!(h.fallback.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn polling_stops_when_nothing_is_unread() {
    let h = offline().await;
    assert_eq!(
        h.client.poll_missed_messages().await,
        PollOutcome::NothingUnread
    );
    assert_eq!(h.fallback.calls(), vec![FallbackCall::UnreadCount]);
}

#[tokio::test(start_paused = true)]
async fn polling_notifies_with_unread_conversations() {
    let h = offline().await;
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = seen.clone();
        h.client.register(Tag::NewMessages, move |inbound: &Inbound| {
            if let Inbound::UnreadConversations(conversations) = inbound {
                seen.lock().unwrap().push(conversations.clone());
            }
        });
    }
    h.fallback.set_unread(
        3,
        vec![
            conversation("2", 2),
            conversation("3", 0),
            conversation("4", 1),
        ],
    );

    assert_eq!(
        h.client.poll_missed_messages().await,
        PollOutcome::Notified(2)
    );
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0][0].fields["partnerId"], "2");
    assert_eq!(seen[0][1].fields["partnerId"], "4");
    assert_eq!(
        h.fallback.calls(),
        vec![FallbackCall::UnreadCount, FallbackCall::Conversations]
    );
}

#[tokio::test(start_paused = true)]
async fn polling_without_a_listener_changes_nothing() {
    let h = offline().await;
    h.fallback.set_unread(1, vec![conversation("2", 1)]);
    assert_eq!(
        h.client.poll_missed_messages().await,
        PollOutcome::Unhandled(1)
    );
    assert_eq!(h.connector.opens(), 0);
}

#[tokio::test(start_paused = true)]
async fn polling_failures_are_swallowed() {
    let h = offline().await;
    h.fallback.fail_with(FallbackError::Timeout);
    assert_eq!(h.client.poll_missed_messages().await, PollOutcome::Failed);
    assert_eq!(h.client.state(), ConnectionState::Disconnected);
}

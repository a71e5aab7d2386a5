use chatwire_client::{FallbackApi, HttpFallback, SessionSource, SessionStore, SessionToken};
use chatwire_core::{FallbackError, UserId};
use reqwest::Url;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn fallback(server: &MockServer, session: Arc<SessionStore>) -> HttpFallback {
    let base = Url::parse(&format!("{}/api", server.uri())).unwrap();
    HttpFallback::new(
        base,
        Duration::from_millis(300),
        session as Arc<dyn SessionSource>,
    )
    .unwrap()
}

fn session() -> Arc<SessionStore> {
    Arc::new(SessionStore::logged_in(
        SessionToken::new("secret"),
        UserId::new("1"),
    ))
}

#[tokio::test]
async fn send_chat_posts_json_with_bearer_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/messages/send"))
        .and(header("authorization", "Bearer secret"))
        .and(body_json(json!({ "receiverId": "2", "content": "hi" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    fallback(&server, session())
        .send_chat(&UserId::new("2"), "hi")
        .await
        .unwrap();
}

#[tokio::test]
async fn mark_read_names_the_sender_in_the_path() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/messages/read/42"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    fallback(&server, session())
        .mark_read(&UserId::new("42"))
        .await
        .unwrap();
}

#[tokio::test]
async fn unread_count_and_conversations() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/messages/unread"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(4)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/messages/conversations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "partnerId": "2", "unreadCount": 3, "lastMessage": "hey" },
            { "partnerId": "3" }
        ])))
        .mount(&server)
        .await;

    let api = fallback(&server, session());
    assert_eq!(api.unread_count().await.unwrap(), 4);

    let conversations = api.conversations().await.unwrap();
    assert_eq!(conversations.len(), 2);
    assert_eq!(conversations[0].unread_count, 3);
    assert_eq!(conversations[0].fields["lastMessage"], "hey");
    assert!(!conversations[1].has_unread());
}

#[tokio::test]
async fn negative_unread_count_reads_as_zero() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/messages/unread"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(-1)))
        .mount(&server)
        .await;

    assert_eq!(fallback(&server, session()).unread_count().await.unwrap(), 0);
}

#[tokio::test]
async fn omits_authorization_without_a_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/messages/unread"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(0)))
        .mount(&server)
        .await;

    let api = fallback(&server, Arc::new(SessionStore::new()));
    api.unread_count().await.unwrap();

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}

#[tokio::test]
async fn status_codes_are_classified() {
    let server = MockServer::start().await;
    for (status, user) in [(401, "401"), (503, "503"), (404, "404")] {
        Mock::given(method("POST"))
            .and(path(format!("/api/messages/read/{user}")))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
    }

    let api = fallback(&server, session());
    assert_eq!(
        api.mark_read(&UserId::new("401")).await,
        Err(FallbackError::Unauthorized)
    );
    assert_eq!(
        api.mark_read(&UserId::new("503")).await,
        Err(FallbackError::Server(503))
    );
    assert_eq!(
        api.mark_read(&UserId::new("404")).await,
        Err(FallbackError::Status(404))
    );
}

#[tokio::test]
async fn bad_bodies_are_decode_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/messages/conversations"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let result = fallback(&server, session()).conversations().await;
    assert!(matches!(result, Err(FallbackError::Decode(_))));
}

#[tokio::test]
async fn slow_responses_time_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/messages/unread"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!(1))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let result = fallback(&server, session()).unread_count().await;
    assert_eq!(result, Err(FallbackError::Timeout));
}

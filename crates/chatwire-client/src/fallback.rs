//! Request/response delivery for when the channel is unavailable.

use crate::session::SessionSource;
use async_trait::async_trait;
use chatwire_core::{ConversationSummary, FallbackError, UserId};
use reqwest::{RequestBuilder, Response, StatusCode, Url};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// The request/response calls the client relies on.
#[async_trait]
pub trait FallbackApi: Send + Sync {
    async fn send_chat(&self, receiver: &UserId, content: &str) -> Result<(), FallbackError>;

    /// Mark everything from `sender` as read.
    async fn mark_read(&self, sender: &UserId) -> Result<(), FallbackError>;

    async fn unread_count(&self) -> Result<u64, FallbackError>;

    async fn conversations(&self) -> Result<Vec<ConversationSummary>, FallbackError>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendChatBody<'a> {
    receiver_id: &'a UserId,
    content: &'a str,
}

/// [`FallbackApi`] over HTTP with bearer authentication.
pub struct HttpFallback {
    http: reqwest::Client,
    base: Url,
    session: Arc<dyn SessionSource>,
}

impl HttpFallback {
    pub fn new(
        base: Url,
        timeout: Duration,
        session: Arc<dyn SessionSource>,
    ) -> Result<Self, FallbackError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| FallbackError::Network(e.to_string()))?;
        Ok(Self {
            http,
            base: with_trailing_slash(base),
            session,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, FallbackError> {
        self.base
            .join(path)
            .map_err(|e| FallbackError::Network(format!("bad endpoint {path}: {e}")))
    }

    async fn execute(&self, request: RequestBuilder) -> Result<Response, FallbackError> {
        let request = match self.session.token() {
            Some(token) => request.bearer_auth(token.expose()),
            None => request,
        };
        let response = request.send().await.map_err(classify)?;
        check_status(response.status())?;
        Ok(response)
    }
}

#[async_trait]
impl FallbackApi for HttpFallback {
    async fn send_chat(&self, receiver: &UserId, content: &str) -> Result<(), FallbackError> {
        let url = self.endpoint("messages/send")?;
        let body = SendChatBody {
            receiver_id: receiver,
            content,
        };
        self.execute(self.http.post(url).json(&body)).await?;
        Ok(())
    }

    async fn mark_read(&self, sender: &UserId) -> Result<(), FallbackError> {
        let mut url = self.endpoint("messages/read")?;
        url.path_segments_mut()
            .map_err(|()| FallbackError::Network(format!("{} cannot take a path", self.base)))?
            .push(sender.as_str());
        self.execute(self.http.post(url)).await?;
        Ok(())
    }

    async fn unread_count(&self) -> Result<u64, FallbackError> {
        let url = self.endpoint("messages/unread")?;
        let count: i64 = self
            .execute(self.http.get(url))
            .await?
            .json()
            .await
            .map_err(|e| FallbackError::Decode(e.to_string()))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn conversations(&self) -> Result<Vec<ConversationSummary>, FallbackError> {
        let url = self.endpoint("messages/conversations")?;
        self.execute(self.http.get(url))
            .await?
            .json()
            .await
            .map_err(|e| FallbackError::Decode(e.to_string()))
    }
}

/// `Url::join` replaces the last segment unless the base ends in `/`.
fn with_trailing_slash(mut base: Url) -> Url {
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

fn classify(error: reqwest::Error) -> FallbackError {
    if error.is_timeout() {
        FallbackError::Timeout
    } else if error.is_decode() {
        FallbackError::Decode(error.to_string())
    } else {
        FallbackError::Network(error.to_string())
    }
}

fn check_status(status: StatusCode) -> Result<(), FallbackError> {
    if status == StatusCode::UNAUTHORIZED {
        Err(FallbackError::Unauthorized)
    } else if status.is_server_error() {
        Err(FallbackError::Server(status.as_u16()))
    } else if !status.is_success() {
        Err(FallbackError::Status(status.as_u16()))
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_path_gains_trailing_slash() {
        let base = with_trailing_slash(Url::parse("http://localhost:8080/api").unwrap());
        assert_eq!(
            base.join("messages/send").unwrap().as_str(),
            "http://localhost:8080/api/messages/send"
        );
    }

    #[test]
    fn status_classification() {
        assert_eq!(check_status(StatusCode::OK), Ok(()));
        assert_eq!(
            check_status(StatusCode::UNAUTHORIZED),
            Err(FallbackError::Unauthorized)
        );
        assert_eq!(
            check_status(StatusCode::BAD_GATEWAY),
            Err(FallbackError::Server(502))
        );
        assert_eq!(
            check_status(StatusCode::NOT_FOUND),
            Err(FallbackError::Status(404))
        );
    }
}

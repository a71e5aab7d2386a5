//! What the relay does with each envelope.

use chatwire_core::{Envelope, Tag, UserId, now_millis};

/// Decision for one inbound envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Answer the sending connection only.
    Reply(Envelope),
    /// Deliver to every connection of `to`.
    Forward { to: UserId, envelope: Envelope },
    Drop(&'static str),
}

/// Route `envelope` received from the authenticated `sender`.
///
/// `from` is always overwritten with the sender; clients cannot speak for
/// someone else.
pub fn route(sender: &UserId, mut envelope: Envelope) -> Route {
    match envelope.tag {
        Tag::Ping => Route::Reply(Envelope {
            tag: Tag::Pong,
            from: None,
            to: None,
            content: None,
            timestamp: now_millis(),
        }),
        Tag::Pong => Route::Drop("unsolicited pong"),
        Tag::Chat | Tag::Typing | Tag::MarkRead | Tag::NewMessages => {
            let Some(to) = envelope.to.clone() else {
                return Route::Drop("no recipient");
            };
            envelope.from = Some(sender.clone());
            Route::Forward { to, envelope }
        }
    }
}

/// The decoded `token` query parameter. Demo tokens are plain user ids.
pub fn token_from_query(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "token")
        .map(|(_, token)| token.into_owned())
        .filter(|token| !token.is_empty())
}

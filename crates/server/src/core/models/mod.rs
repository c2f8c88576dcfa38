use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::core::error::{Error, Result};

/// Opaque user identifier issued by the identity service.
pub type UserId = String;

/// Opaque message identifier (UUID v4, string form).
pub type MessageId = String;

/// User record as owned by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

/// Content of a message: exactly one of text, image or video.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type", content = "data")]
pub enum Payload {
    Text(String),
    Image(String),
    Video(String),
}

impl Payload {
    /// Check the payload is storable: non-blank text, or an absolute
    /// http(s) URL for media.
    pub fn validate(&self) -> Result<()> {
        match self {
            Payload::Text(text) => {
                if text.trim().is_empty() {
                    return Err(Error::validation("message text is empty"));
                }
                Ok(())
            }
            Payload::Image(url) => validate_media_url("image", url),
            Payload::Video(url) => validate_media_url("video", url),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Text(_) => "text",
            Payload::Image(_) => "image",
            Payload::Video(_) => "video",
        }
    }
}

fn validate_media_url(kind: &str, raw: &str) -> Result<()> {
    let parsed = url::Url::parse(raw)
        .map_err(|e| Error::validation(format!("{} reference is not a URL: {}", kind, e)))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(Error::validation(format!(
            "{} reference must be an http(s) URL, got scheme '{}'",
            kind, other
        ))),
    }
}

/// A persisted direct message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub payload: Payload,
    pub seen: bool,
    pub created_at: DateTime<Utc>,
}

/// Event pushed to a live connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "event", content = "data")]
pub enum ServerEvent {
    NewMessage(Message),
    OnlineUsers(BTreeSet<UserId>),
}

/// Input for creating a message.
///
/// Mirrors the client form: whichever field is filled in is the payload.
#[derive(Debug, Default, Deserialize)]
pub struct SendMessageInput {
    pub text: Option<String>,
    pub image: Option<String>,
    pub video: Option<String>,
}

impl SendMessageInput {
    /// Select the single payload variant. Empty strings count as absent.
    pub fn into_payload(self) -> Result<Payload> {
        let present = |v: Option<String>| v.filter(|s| !s.is_empty());

        let mut candidates = [
            present(self.text).map(Payload::Text),
            present(self.image).map(Payload::Image),
            present(self.video).map(Payload::Video),
        ]
        .into_iter()
        .flatten();

        match (candidates.next(), candidates.next()) {
            (None, _) => Err(Error::validation("message payload is empty")),
            (Some(payload), None) => Ok(payload),
            (Some(_), Some(_)) => Err(Error::validation(
                "message payload must carry exactly one of text, image or video",
            )),
        }
    }
}

/// Sidebar entry: a user plus whether they are connected right now.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidebarUser {
    #[serde(flatten)]
    pub user: User,
    pub online: bool,
}

/// Response of the sidebar listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SidebarResponse {
    pub users: Vec<SidebarUser>,
    pub unseen: HashMap<UserId, u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn input(text: Option<&str>, image: Option<&str>, video: Option<&str>) -> SendMessageInput {
        SendMessageInput {
            text: text.map(str::to_string),
            image: image.map(str::to_string),
            video: video.map(str::to_string),
        }
    }

    #[test]
    fn test_single_field_selects_variant() {
        let payload = input(Some("hi"), None, None).into_payload().unwrap();
        assert_eq!(payload, Payload::Text("hi".into()));

        let payload = input(None, None, Some("https://cdn.test/v.mp4"))
            .into_payload()
            .unwrap();
        assert_eq!(payload, Payload::Video("https://cdn.test/v.mp4".into()));
    }

    #[test]
    fn test_empty_input_rejected() {
        let err = input(None, None, None).into_payload().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));

        // Empty strings are the same as missing fields
        let err = input(Some(""), Some(""), None).into_payload().unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_ambiguous_input_rejected() {
        let err = input(Some("caption"), Some("https://cdn.test/a.png"), None)
            .into_payload()
            .unwrap_err();
        assert!(err.to_string().contains("exactly one"));
    }

    #[test]
    fn test_empty_string_beside_real_field_is_ignored() {
        let payload = input(Some(""), Some("https://cdn.test/a.png"), None)
            .into_payload()
            .unwrap();
        assert_eq!(payload.kind(), "image");
    }

    #[test]
    fn test_validate() {
        assert_ok!(Payload::Text("hello".into()).validate());
        assert_err!(Payload::Text("   ".into()).validate());
        assert_ok!(Payload::Image("https://cdn.test/a.png".into()).validate());
        assert_err!(Payload::Image("not a url".into()).validate());
        assert_err!(Payload::Video("data:video/mp4;base64,AAAA".into()).validate());
        assert_err!(Payload::Video("ftp://cdn.test/v.mp4".into()).validate());
    }

    #[test]
    fn test_event_wire_format() {
        let mut online = BTreeSet::new();
        online.insert("alice".to_string());
        let json = serde_json::to_value(ServerEvent::OnlineUsers(online)).unwrap();
        assert_eq!(json["event"], "online_users");
        assert_eq!(json["data"][0], "alice");
    }
}

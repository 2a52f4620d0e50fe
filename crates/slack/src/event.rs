//! Events API payloads and webhook classification.

use serde::Deserialize;

/// `url_verification` handshake sent when the request URL is configured.
#[derive(Debug, Clone, Deserialize)]
pub struct UrlVerification {
    #[serde(rename = "type")]
    pub kind: String,
    pub challenge: String,
}

/// Outer Events API envelope.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub event: Option<InnerEvent>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InnerEvent {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub channel: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub subtype: Option<String>,
    #[serde(default)]
    pub bot_id: Option<String>,
}

impl InnerEvent {
    /// Bot posts and edits never trigger a notification.
    pub fn is_bot_or_edit(&self) -> bool {
        let from_bot = self.bot_id.as_deref().is_some_and(|id| !id.is_empty());
        let skipped_subtype = matches!(
            self.subtype.as_deref(),
            Some("message_changed" | "bot_message")
        );
        from_bot || skipped_subtype
    }
}

/// A human message posted in a channel of a registered team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEvent {
    pub team_id: String,
    pub channel_id: String,
    pub sender_id: Option<String>,
    pub text: String,
}

impl ChannelEvent {
    /// Plain-text notification body.
    pub fn notification_body(&self) -> String {
        format!(
            "New Slack message received in channel from user {}:\n\n{}",
            self.sender_id.as_deref().unwrap_or("unknown"),
            self.text
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    NotCallback(String),
    NotMessage(String),
    BotOrEdit,
}

/// What to do with one webhook body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Echo the challenge back.
    Challenge(String),
    /// Acknowledge and do nothing.
    Ignored(IgnoreReason),
    /// Reject with a client error.
    Malformed(String),
    Message(ChannelEvent),
}

/// Classify a raw webhook body. Never fails: garbage is `Malformed`.
pub fn classify(body: &[u8]) -> Classification {
    // Checked first: the handshake shape is not a valid callback envelope.
    if let Ok(challenge) = serde_json::from_slice::<UrlVerification>(body)
        && challenge.kind == "url_verification"
    {
        return Classification::Challenge(challenge.challenge);
    }

    let envelope: EventEnvelope = match serde_json::from_slice(body) {
        Ok(envelope) => envelope,
        Err(e) => return Classification::Malformed(format!("invalid event JSON: {e}")),
    };

    if envelope.kind != "event_callback" {
        return Classification::Ignored(IgnoreReason::NotCallback(envelope.kind));
    }

    let event = envelope.event.unwrap_or_default();
    if event.kind != "message" {
        return Classification::Ignored(IgnoreReason::NotMessage(event.kind));
    }
    if event.is_bot_or_edit() {
        return Classification::Ignored(IgnoreReason::BotOrEdit);
    }

    let Some(team_id) = envelope.team_id.filter(|t| !t.is_empty()) else {
        return Classification::Malformed("no team ID in event".into());
    };
    let Some(channel_id) = event.channel.filter(|c| !c.is_empty()) else {
        return Classification::Malformed("no channel ID in event".into());
    };

    Classification::Message(ChannelEvent {
        team_id,
        channel_id,
        sender_id: event.user.filter(|u| !u.is_empty()),
        text: event.text.unwrap_or_default(),
    })
}

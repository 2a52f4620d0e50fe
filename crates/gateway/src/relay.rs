//! Webhook entry point: classify, find the owner, hand off to the
//! detached resolve-and-send pipeline.

use std::{sync::Arc, time::Duration};

use {
    axum::{
        Json,
        http::StatusCode,
        response::{IntoResponse, Response},
    },
    serde_json::{Value, json},
    tokio::time::Instant,
    tracing::{debug, error, info, warn},
};

use {
    beacon_common::TeamMappingStore,
    beacon_gmail::{Notification, NotificationDispatcher},
    beacon_slack::{ChannelEvent, Classification, RecipientResolver, Resolution, classify},
};

/// What the webhook caller gets back.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookReply {
    pub status: StatusCode,
    pub body: Value,
}

impl WebhookReply {
    fn ok(body: Value) -> Self {
        Self {
            status: StatusCode::OK,
            body,
        }
    }

    fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": message.into() }),
        }
    }
}

impl IntoResponse for WebhookReply {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

pub struct Relay {
    teams: Arc<dyn TeamMappingStore>,
    resolver: Arc<RecipientResolver>,
    dispatcher: Arc<NotificationDispatcher>,
    subject: String,
    event_deadline: Duration,
}

impl Relay {
    pub fn new(
        teams: Arc<dyn TeamMappingStore>,
        resolver: Arc<RecipientResolver>,
        dispatcher: Arc<NotificationDispatcher>,
        subject: impl Into<String>,
        event_deadline: Duration,
    ) -> Self {
        Self {
            teams,
            resolver,
            dispatcher,
            subject: subject.into(),
            event_deadline,
        }
    }

    /// Answer a webhook delivery.
    ///
    /// Never waits on resolution or delivery: accepted messages are handed
    /// to a detached task and the caller is answered immediately.
    pub async fn handle(&self, body: &[u8]) -> WebhookReply {
        let received = Instant::now();
        let event = match classify(body) {
            Classification::Challenge(challenge) => {
                info!("answering url verification challenge");
                return WebhookReply::ok(json!({ "challenge": challenge }));
            },
            Classification::Ignored(reason) => {
                debug!(?reason, "ignoring event");
                return WebhookReply::ok(json!({ "status": "ignored" }));
            },
            Classification::Malformed(message) => {
                warn!(%message, "rejecting malformed event");
                return WebhookReply::error(StatusCode::BAD_REQUEST, message);
            },
            Classification::Message(event) => event,
        };

        let owner_id = match self.teams.lookup(&event.team_id).await {
            Ok(Some(owner)) => owner,
            Ok(None) => {
                warn!(team_id = %event.team_id, "no integration registered for team");
                return WebhookReply::error(StatusCode::NOT_FOUND, "Integration not found");
            },
            Err(e) => {
                error!(team_id = %event.team_id, error = %e, "team mapping lookup failed");
                return WebhookReply::error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Error looking up integration",
                );
            },
        };

        info!(
            team_id = %event.team_id,
            owner = %owner_id,
            channel = %event.channel_id,
            "accepted message event"
        );
        self.spawn_pipeline(owner_id, event, received + self.event_deadline);
        WebhookReply::ok(json!({ "status": "accepted" }))
    }

    /// Resolve and deliver on a task nobody joins. Outcomes surface only in
    /// logs and the dispatcher's observer.
    fn spawn_pipeline(&self, owner_id: String, event: ChannelEvent, deadline: Instant) {
        let resolver = Arc::clone(&self.resolver);
        let dispatcher = Arc::clone(&self.dispatcher);
        let subject = self.subject.clone();
        tokio::spawn(async move {
            let resolved = resolver
                .resolve(
                    &owner_id,
                    &event.channel_id,
                    event.sender_id.as_deref(),
                    deadline,
                )
                .await;
            let recipients = match resolved {
                Ok(Resolution::Recipients(recipients)) => recipients,
                Ok(Resolution::NoRecipients) => {
                    info!(owner = %owner_id, channel = %event.channel_id, "no recipients left after exclusions");
                    return;
                },
                Err(e) => {
                    error!(owner = %owner_id, channel = %event.channel_id, error = %e, "recipient resolution failed");
                    return;
                },
            };
            dispatcher
                .deliver(Notification {
                    owner_id,
                    recipients,
                    subject,
                    body: event.notification_body(),
                })
                .await;
        });
    }
}

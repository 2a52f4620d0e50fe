//! Detached notification delivery with bounded retries.

use std::sync::Arc;

use {
    tokio::task::JoinHandle,
    tracing::{error, info},
};

use beacon_common::RetryPolicy;

use crate::{
    error::{Error, Result},
    mime::MailMessage,
    transport::MailTransport,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// User whose mailbox sends the notification.
    pub owner_id: String,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Terminal state of one delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered { message_id: String },
    Failed { error: String },
}

/// Receives every terminal outcome. Nothing else sees delivery results.
pub trait DeliveryObserver: Send + Sync {
    fn delivery_finished(&self, notification: &Notification, outcome: &DeliveryOutcome);
}

pub struct NotificationDispatcher {
    transport: Arc<dyn MailTransport>,
    retry: RetryPolicy,
    observer: Option<Arc<dyn DeliveryObserver>>,
}

impl NotificationDispatcher {
    pub fn new(transport: Arc<dyn MailTransport>, retry: RetryPolicy) -> Self {
        Self {
            transport,
            retry,
            observer: None,
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn DeliveryObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Acquire a token, look up the sender and submit the message.
    ///
    /// Token acquisition and submission each get their own retry budget.
    pub async fn send(&self, notification: &Notification) -> Result<String> {
        if notification.recipients.is_empty() {
            return Err(Error::NoRecipients);
        }
        let owner = notification.owner_id.as_str();

        let token = self
            .retry
            .run("gmail token acquisition", |_| self.transport.access_token(owner))
            .await?;
        let from = self.transport.sender_address(&token).await?;

        let raw = MailMessage {
            from,
            to: notification.recipients.clone(),
            subject: notification.subject.clone(),
            body: notification.body.clone(),
        }
        .encode_raw();

        self.retry
            .run("gmail send", |_| self.transport.submit(&token, &raw))
            .await
    }

    /// Run [`send`](Self::send) to completion, log the result and report it
    /// to the observer.
    pub async fn deliver(&self, notification: Notification) -> DeliveryOutcome {
        let outcome = match self.send(&notification).await {
            Ok(message_id) => {
                info!(
                    owner = %notification.owner_id,
                    recipients = notification.recipients.len(),
                    message_id = %message_id,
                    "notification delivered"
                );
                DeliveryOutcome::Delivered { message_id }
            },
            Err(e) => {
                error!(
                    owner = %notification.owner_id,
                    recipients = notification.recipients.len(),
                    error = %e,
                    "notification delivery failed"
                );
                DeliveryOutcome::Failed {
                    error: e.to_string(),
                }
            },
        };
        if let Some(observer) = &self.observer {
            observer.delivery_finished(&notification, &outcome);
        }
        outcome
    }

    /// Deliver on a detached task. Dropping the handle does not cancel it.
    pub fn spawn(self: &Arc<Self>, notification: Notification) -> JoinHandle<DeliveryOutcome> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.deliver(notification).await })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Mutex,
            atomic::{AtomicU32, Ordering},
        },
        time::Duration,
    };

    use {async_trait::async_trait, secrecy::Secret, tokio::time::Instant};

    use super::*;

    #[derive(Default)]
    struct FakeTransport {
        token_failures: AtomicU32,
        submit_failures: AtomicU32,
        token_calls: AtomicU32,
        submit_calls: AtomicU32,
        submitted: Mutex<Vec<String>>,
    }

    impl FakeTransport {
        fn failing(token_failures: u32, submit_failures: u32) -> Self {
            Self {
                token_failures: AtomicU32::new(token_failures),
                submit_failures: AtomicU32::new(submit_failures),
                ..Default::default()
            }
        }
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    #[async_trait]
    impl MailTransport for FakeTransport {
        async fn access_token(&self, owner_id: &str) -> Result<Secret<String>> {
            self.token_calls.fetch_add(1, Ordering::SeqCst);
            if take_failure(&self.token_failures) {
                return Err(Error::MissingRefreshToken {
                    user_id: owner_id.into(),
                });
            }
            Ok(Secret::new("access".into()))
        }

        async fn sender_address(&self, _access_token: &Secret<String>) -> Result<String> {
            Ok("owner@x.com".into())
        }

        async fn submit(&self, _access_token: &Secret<String>, raw: &str) -> Result<String> {
            self.submit_calls.fetch_add(1, Ordering::SeqCst);
            if take_failure(&self.submit_failures) {
                return Err(Error::Api {
                    operation: "messages.send",
                    status: 503,
                    body: "backend error".into(),
                });
            }
            self.submitted.lock().unwrap().push(raw.to_string());
            Ok("msg-1".into())
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<DeliveryOutcome>>);

    impl DeliveryObserver for Recorder {
        fn delivery_finished(&self, _notification: &Notification, outcome: &DeliveryOutcome) {
            self.0.lock().unwrap().push(outcome.clone());
        }
    }

    fn notification() -> Notification {
        Notification {
            owner_id: "owner1".into(),
            recipients: vec!["b@x.com".into()],
            subject: "New Slack Message in Channel".into(),
            body: "hi".into(),
        }
    }

    fn dispatcher(transport: Arc<FakeTransport>) -> NotificationDispatcher {
        NotificationDispatcher::new(transport, RetryPolicy::default())
    }

    #[tokio::test]
    async fn delivers_first_time() {
        let transport = Arc::new(FakeTransport::default());
        let outcome = dispatcher(Arc::clone(&transport))
            .deliver(notification())
            .await;

        assert_eq!(outcome, DeliveryOutcome::Delivered {
            message_id: "msg-1".into()
        });
        let raw = transport.submitted.lock().unwrap()[0].clone();
        let expected = MailMessage {
            from: "owner@x.com".into(),
            to: vec!["b@x.com".into()],
            subject: "New Slack Message in Channel".into(),
            body: "hi".into(),
        };
        assert_eq!(raw, expected.encode_raw());
    }

    #[tokio::test(start_paused = true)]
    async fn token_acquisition_retries_with_backoff() {
        let transport = Arc::new(FakeTransport::failing(2, 0));
        let start = Instant::now();

        let outcome = dispatcher(Arc::clone(&transport))
            .deliver(notification())
            .await;

        assert!(matches!(outcome, DeliveryOutcome::Delivered { .. }));
        assert_eq!(transport.token_calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn token_acquisition_gives_up_after_three_attempts() {
        let transport = Arc::new(FakeTransport::failing(u32::MAX, 0));

        let outcome = dispatcher(Arc::clone(&transport))
            .deliver(notification())
            .await;

        assert!(matches!(outcome, DeliveryOutcome::Failed { ref error } if error.contains("refresh token")));
        assert_eq!(transport.token_calls.load(Ordering::SeqCst), 3);
        assert_eq!(transport.submit_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn submission_has_its_own_budget() {
        let transport = Arc::new(FakeTransport::failing(2, u32::MAX));
        let start = Instant::now();

        let outcome = dispatcher(Arc::clone(&transport))
            .deliver(notification())
            .await;

        assert!(matches!(outcome, DeliveryOutcome::Failed { .. }));
        assert_eq!(transport.token_calls.load(Ordering::SeqCst), 3);
        assert_eq!(transport.submit_calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(6));
    }

    #[tokio::test]
    async fn empty_recipient_list_is_not_sent() {
        let transport = Arc::new(FakeTransport::default());
        let mut n = notification();
        n.recipients.clear();

        let outcome = dispatcher(Arc::clone(&transport)).deliver(n).await;

        assert!(matches!(outcome, DeliveryOutcome::Failed { .. }));
        assert_eq!(transport.token_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_delivery_reports_to_observer() {
        let transport = Arc::new(FakeTransport::failing(0, 1));
        let recorder = Arc::new(Recorder::default());
        let dispatcher = Arc::new(
            dispatcher(transport).with_observer(Arc::clone(&recorder) as Arc<dyn DeliveryObserver>),
        );

        let handle = dispatcher.spawn(notification());
        let outcome = handle.await.unwrap();

        assert_eq!(outcome, DeliveryOutcome::Delivered {
            message_id: "msg-1".into()
        });
        assert_eq!(*recorder.0.lock().unwrap(), vec![outcome]);
    }
}

//! Channel member → email resolution with bounded fan-out.

use std::{collections::HashSet, sync::Arc, time::Duration};

use {
    secrecy::Secret,
    tokio::{
        sync::Semaphore,
        task::JoinSet,
        time::{Instant, timeout_at},
    },
    tracing::{debug, info, warn},
};

use {beacon_config::RelayConfig, beacon_oauth::CredentialStore};

use crate::{
    api::SlackDirectory,
    error::{Error, Result},
};

/// Fan-out bounds for one resolution.
#[derive(Debug, Clone, Copy)]
pub struct ResolverLimits {
    /// Members beyond this many are dropped without paging.
    pub member_cap: usize,
    pub max_in_flight: usize,
    pub member_timeout: Duration,
}

impl Default for ResolverLimits {
    fn default() -> Self {
        Self::from(&RelayConfig::default())
    }
}

impl From<&RelayConfig> for ResolverLimits {
    fn from(cfg: &RelayConfig) -> Self {
        Self {
            member_cap: cfg.member_cap,
            max_in_flight: cfg.max_in_flight.max(1),
            member_timeout: cfg.member_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Unique addresses in arrival order, sender excluded.
    Recipients(Vec<String>),
    /// Nobody left to notify after exclusions.
    NoRecipients,
}

#[derive(Debug)]
enum Lookup {
    Email(String),
    NoEmail,
    Failed(Error),
    TimedOut,
}

pub struct RecipientResolver {
    directory: Arc<dyn SlackDirectory>,
    credentials: Arc<CredentialStore>,
    limits: ResolverLimits,
}

impl RecipientResolver {
    pub fn new(
        directory: Arc<dyn SlackDirectory>,
        credentials: Arc<CredentialStore>,
        limits: ResolverLimits,
    ) -> Self {
        Self {
            directory,
            credentials,
            limits,
        }
    }

    /// Resolve the members of `channel_id` to email addresses using
    /// `owner_id`'s bot token.
    ///
    /// Never runs past `deadline`: lookups still pending at that point are
    /// aborted and whatever arrived is returned. Individual member failures
    /// are logged and skipped. Failing to list the channel is an error.
    pub async fn resolve(
        &self,
        owner_id: &str,
        channel_id: &str,
        sender_id: Option<&str>,
        deadline: Instant,
    ) -> Result<Resolution> {
        let token = Arc::new(self.credentials.slack_token(owner_id)?);

        let sender_email = match sender_id {
            Some(sender) => self.sender_email(&token, sender, deadline).await,
            None => None,
        };

        let mut members = match timeout_at(
            deadline,
            self.directory.channel_members(&token, channel_id),
        )
        .await
        {
            Ok(members) => members?,
            Err(_) => return Err(Error::DeadlineExceeded("listing channel members")),
        };
        if members.len() > self.limits.member_cap {
            debug!(
                channel = %channel_id,
                total = members.len(),
                cap = self.limits.member_cap,
                "channel exceeds member cap, truncating"
            );
            members.truncate(self.limits.member_cap);
        }

        let emails = self.fan_out(token, members, deadline).await;

        let mut seen = HashSet::new();
        let recipients: Vec<String> = emails
            .into_iter()
            .filter(|email| sender_email.as_deref() != Some(email.as_str()))
            .filter(|email| seen.insert(email.clone()))
            .collect();

        info!(
            owner = %owner_id,
            channel = %channel_id,
            recipients = recipients.len(),
            "resolved channel recipients"
        );
        if recipients.is_empty() {
            Ok(Resolution::NoRecipients)
        } else {
            Ok(Resolution::Recipients(recipients))
        }
    }

    async fn sender_email(
        &self,
        token: &Secret<String>,
        sender_id: &str,
        deadline: Instant,
    ) -> Option<String> {
        let call_deadline = deadline.min(Instant::now() + self.limits.member_timeout);
        match timeout_at(call_deadline, self.directory.user_email(token, sender_id)).await {
            Ok(Ok(email)) => email,
            Ok(Err(e)) => {
                warn!(sender = %sender_id, error = %e, "could not resolve sender email, sender will not be excluded");
                None
            },
            Err(_) => {
                warn!(sender = %sender_id, "sender email lookup timed out, sender will not be excluded");
                None
            },
        }
    }

    /// Look up every member concurrently, at most `max_in_flight` at once.
    /// Returns emails in arrival order.
    async fn fan_out(
        &self,
        token: Arc<Secret<String>>,
        members: Vec<String>,
        deadline: Instant,
    ) -> Vec<String> {
        let gate = Arc::new(Semaphore::new(self.limits.max_in_flight.max(1)));
        let mut tasks = JoinSet::new();

        for member in members {
            let gate = Arc::clone(&gate);
            let directory = Arc::clone(&self.directory);
            let token = Arc::clone(&token);
            let member_timeout = self.limits.member_timeout;
            tasks.spawn(async move {
                let Ok(Ok(_permit)) = timeout_at(deadline, gate.acquire_owned()).await else {
                    return (member, Lookup::TimedOut);
                };
                let call_deadline = deadline.min(Instant::now() + member_timeout);
                let outcome =
                    match timeout_at(call_deadline, directory.user_email(&token, &member)).await {
                        Ok(Ok(Some(email))) => Lookup::Email(email),
                        Ok(Ok(None)) => Lookup::NoEmail,
                        Ok(Err(e)) => Lookup::Failed(e),
                        Err(_) => Lookup::TimedOut,
                    };
                (member, outcome)
            });
        }

        let mut emails = Vec::new();
        loop {
            match timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((member, outcome)))) => match outcome {
                    Lookup::Email(email) => emails.push(email),
                    Lookup::NoEmail => debug!(member = %member, "member has no email"),
                    Lookup::Failed(e) => {
                        warn!(member = %member, error = %e, "member email lookup failed")
                    },
                    Lookup::TimedOut => warn!(member = %member, "member email lookup timed out"),
                },
                Ok(Some(Err(e))) => warn!(error = %e, "member lookup task failed"),
                Ok(None) => break,
                Err(_) => {
                    warn!(pending = tasks.len(), "resolution deadline reached, abandoning lookups");
                    tasks.abort_all();
                    break;
                },
            }
        }
        emails
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use {async_trait::async_trait, beacon_oauth::UserCredentials};

    use super::*;

    #[derive(Default)]
    struct FakeDirectory {
        members: Vec<String>,
        emails: HashMap<String, String>,
        failing: HashSet<String>,
        fail_once: Mutex<HashSet<String>>,
        list_error: Option<String>,
        delay: Duration,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    struct InFlight<'a>(&'a AtomicUsize);

    impl Drop for InFlight<'_> {
        fn drop(&mut self) {
            self.0.fetch_sub(1, Ordering::SeqCst);
        }
    }

    impl FakeDirectory {
        fn with_members(members: &[&str]) -> Self {
            Self {
                members: members.iter().map(|m| m.to_string()).collect(),
                ..Default::default()
            }
        }

        fn with_ids(ids: &[String]) -> Self {
            Self {
                members: ids.to_vec(),
                ..Default::default()
            }
        }

        fn email(mut self, user: &str, email: &str) -> Self {
            self.emails.insert(user.into(), email.into());
            self
        }
    }

    #[async_trait]
    impl SlackDirectory for FakeDirectory {
        async fn channel_members(
            &self,
            _token: &Secret<String>,
            _channel_id: &str,
        ) -> Result<Vec<String>> {
            match &self.list_error {
                Some(error) => Err(Error::Api {
                    method: "conversations.members",
                    error: error.clone(),
                }),
                None => Ok(self.members.clone()),
            }
        }

        async fn user_email(
            &self,
            _token: &Secret<String>,
            user_id: &str,
        ) -> Result<Option<String>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let _guard = InFlight(&self.in_flight);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.failing.contains(user_id) || self.fail_once.lock().unwrap().remove(user_id) {
                return Err(Error::Api {
                    method: "users.info",
                    error: "user_not_found".into(),
                });
            }
            Ok(self
                .emails
                .get(user_id)
                .filter(|e| !e.is_empty())
                .cloned())
        }
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        credentials: Arc<CredentialStore>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let credentials = Arc::new(CredentialStore::open(dir.path().join("creds.json")).unwrap());
        credentials
            .save(UserCredentials {
                user_id: "owner1".into(),
                slack_bot_token: Secret::new("xoxb-owner".into()),
                gmail_client_id: "client".into(),
                gmail_secret: Secret::new("secret".into()),
                gmail_refresh_token: None,
            })
            .unwrap();
        Fixture {
            _dir: dir,
            credentials,
        }
    }

    fn resolver(fx: &Fixture, directory: Arc<FakeDirectory>) -> RecipientResolver {
        RecipientResolver::new(directory, Arc::clone(&fx.credentials), ResolverLimits::default())
    }

    fn deadline() -> Instant {
        Instant::now() + Duration::from_secs(25)
    }

    #[tokio::test]
    async fn excludes_sender_and_emailless_members() {
        let fx = fixture();
        let dir = Arc::new(
            FakeDirectory::with_members(&["U1", "U2", "U3"])
                .email("U1", "a@x.com")
                .email("U2", "b@x.com")
                .email("U3", ""),
        );

        let got = resolver(&fx, dir)
            .resolve("owner1", "C1", Some("U1"), deadline())
            .await
            .unwrap();

        assert_eq!(got, Resolution::Recipients(vec!["b@x.com".into()]));
    }

    #[tokio::test]
    async fn duplicate_addresses_collapse() {
        let fx = fixture();
        let dir = Arc::new(
            FakeDirectory::with_members(&["U1", "U2", "U3"])
                .email("U1", "shared@x.com")
                .email("U2", "shared@x.com")
                .email("U3", "c@x.com"),
        );

        let Resolution::Recipients(mut got) = resolver(&fx, dir)
            .resolve("owner1", "C1", None, deadline())
            .await
            .unwrap()
        else {
            panic!("expected recipients");
        };
        got.sort();

        assert_eq!(got, vec!["c@x.com", "shared@x.com"]);
    }

    #[tokio::test]
    async fn only_sender_left_means_no_recipients() {
        let fx = fixture();
        let dir = Arc::new(FakeDirectory::with_members(&["U1", "U2"]).email("U1", "a@x.com"));

        let got = resolver(&fx, dir)
            .resolve("owner1", "C1", Some("U1"), deadline())
            .await
            .unwrap();

        assert_eq!(got, Resolution::NoRecipients);
    }

    #[tokio::test]
    async fn failed_member_lookups_are_skipped() {
        let fx = fixture();
        let mut dir = FakeDirectory::with_members(&["U1", "U2", "U3"])
            .email("U1", "a@x.com")
            .email("U2", "b@x.com")
            .email("U3", "c@x.com");
        dir.failing.insert("U2".into());

        let Resolution::Recipients(mut got) = resolver(&fx, Arc::new(dir))
            .resolve("owner1", "C1", None, deadline())
            .await
            .unwrap()
        else {
            panic!("expected recipients");
        };
        got.sort();

        assert_eq!(got, vec!["a@x.com", "c@x.com"]);
    }

    #[tokio::test]
    async fn sender_lookup_failure_is_tolerated() {
        let fx = fixture();
        let dir = FakeDirectory::with_members(&["U1", "U2"])
            .email("U1", "a@x.com")
            .email("U2", "b@x.com");
        dir.fail_once.lock().unwrap().insert("U1".into());

        let Resolution::Recipients(mut got) = resolver(&fx, Arc::new(dir))
            .resolve("owner1", "C1", Some("U1"), deadline())
            .await
            .unwrap()
        else {
            panic!("expected recipients");
        };
        got.sort();

        // The sender could not be identified, so they are notified too.
        assert_eq!(got, vec!["a@x.com", "b@x.com"]);
    }

    #[tokio::test]
    async fn member_listing_error_propagates() {
        let fx = fixture();
        let dir = FakeDirectory {
            list_error: Some("channel_not_found".into()),
            ..Default::default()
        };

        let err = resolver(&fx, Arc::new(dir))
            .resolve("owner1", "C404", None, deadline())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Api { ref error, .. } if error == "channel_not_found"));
    }

    #[tokio::test]
    async fn unknown_owner_is_a_credentials_error() {
        let fx = fixture();
        let dir = Arc::new(FakeDirectory::with_members(&["U1"]));

        let err = resolver(&fx, dir)
            .resolve("ghost", "C1", None, deadline())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Credentials(beacon_oauth::Error::NotFound { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn never_more_than_five_lookups_in_flight() {
        let fx = fixture();
        let ids: Vec<String> = (0..40).map(|i| format!("U{i}")).collect();
        let mut dir = FakeDirectory::with_ids(&ids);
        for id in &ids {
            dir.emails.insert(id.clone(), format!("{id}@x.com"));
        }
        dir.delay = Duration::from_millis(200);
        let dir = Arc::new(dir);

        let got = resolver(&fx, Arc::clone(&dir))
            .resolve("owner1", "C1", None, deadline())
            .await
            .unwrap();

        assert!(matches!(got, Resolution::Recipients(ref r) if r.len() == 40));
        assert_eq!(dir.peak.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn large_channels_are_capped_at_fifty() {
        let fx = fixture();
        let ids: Vec<String> = (0..60).map(|i| format!("U{i:02}")).collect();
        let mut dir = FakeDirectory::with_ids(&ids);
        for id in &ids {
            dir.emails.insert(id.clone(), format!("{id}@x.com"));
        }
        let dir = Arc::new(dir);

        let Resolution::Recipients(got) = resolver(&fx, Arc::clone(&dir))
            .resolve("owner1", "C1", None, deadline())
            .await
            .unwrap()
        else {
            panic!("expected recipients");
        };

        assert_eq!(dir.calls.load(Ordering::SeqCst), 50);
        assert_eq!(got.len(), 50);
        for i in 50..60 {
            assert!(!got.contains(&format!("U{i}@x.com")));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_members_time_out_individually() {
        let fx = fixture();
        let mut dir = FakeDirectory::with_members(&["U1"]).email("U1", "a@x.com");
        dir.delay = Duration::from_secs(10);

        let start = Instant::now();
        let got = resolver(&fx, Arc::new(dir))
            .resolve("owner1", "C1", None, deadline())
            .await
            .unwrap();

        assert_eq!(got, Resolution::NoRecipients);
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn overall_deadline_bounds_resolution() {
        let fx = fixture();
        let ids: Vec<String> = (0..50).map(|i| format!("U{i}")).collect();
        let mut dir = FakeDirectory::with_ids(&ids);
        dir.delay = Duration::from_secs(10);

        let start = Instant::now();
        let got = resolver(&fx, Arc::new(dir))
            .resolve("owner1", "C1", None, start + Duration::from_secs(25))
            .await
            .unwrap();

        assert_eq!(got, Resolution::NoRecipients);
        assert_eq!(start.elapsed(), Duration::from_secs(25));
    }
}

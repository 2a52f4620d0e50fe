//! Durable per-user credential storage.
//!
//! The whole map is rewritten to a single JSON file on every save. Writes go
//! to a sibling temp file which is then renamed over the live one, so a crash
//! never leaves a half-written snapshot behind.

use std::{
    collections::HashMap,
    io::Write,
    path::PathBuf,
    sync::RwLock,
};

use {
    secrecy::Secret,
    serde::{Deserialize, Serialize},
    tracing::{debug, info},
};

use crate::{
    Error, Result,
    types::{deserialize_option_secret, serialize_option_secret, serialize_secret},
};

/// Credentials owned by one registered user.
#[derive(Clone, Serialize, Deserialize)]
pub struct UserCredentials {
    pub user_id: String,
    #[serde(serialize_with = "serialize_secret")]
    pub slack_bot_token: Secret<String>,
    pub gmail_client_id: String,
    #[serde(serialize_with = "serialize_secret")]
    pub gmail_secret: Secret<String>,
    /// Absent until the mail authorization callback completes.
    #[serde(
        default,
        serialize_with = "serialize_option_secret",
        deserialize_with = "deserialize_option_secret"
    )]
    pub gmail_refresh_token: Option<Secret<String>>,
}

impl std::fmt::Debug for UserCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCredentials")
            .field("user_id", &self.user_id)
            .field("slack_bot_token", &"[REDACTED]")
            .field("gmail_client_id", &self.gmail_client_id)
            .field("gmail_secret", &"[REDACTED]")
            .field(
                "gmail_refresh_token",
                &self.gmail_refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

/// File-backed credential map guarded by a single lock.
#[derive(Debug)]
pub struct CredentialStore {
    path: PathBuf,
    users: RwLock<HashMap<String, UserCredentials>>,
}

impl CredentialStore {
    /// Open the store at `path`. A missing file yields an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let users = match std::fs::read_to_string(&path) {
            Ok(data) => {
                let users: HashMap<String, UserCredentials> = serde_json::from_str(&data)
                    .map_err(|source| Error::CorruptSnapshot {
                        path: path.clone(),
                        source,
                    })?;
                info!(path = %path.display(), count = users.len(), "loaded user credentials");
                users
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no credentials file yet, starting empty");
                HashMap::new()
            },
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            users: RwLock::new(users),
        })
    }

    pub fn get(&self, user_id: &str) -> Result<UserCredentials> {
        let users = self.users.read().unwrap_or_else(|e| e.into_inner());
        users
            .get(user_id)
            .cloned()
            .ok_or_else(|| Error::not_found(user_id))
    }

    pub fn slack_token(&self, user_id: &str) -> Result<Secret<String>> {
        self.get(user_id).map(|c| c.slack_bot_token)
    }

    /// Insert or replace a user's record and persist the full snapshot.
    pub fn save(&self, creds: UserCredentials) -> Result<()> {
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        let mut next = users.clone();
        let user_id = creds.user_id.clone();
        next.insert(user_id.clone(), creds);
        self.persist(&next)?;
        *users = next;
        info!(user_id = %user_id, "saved credentials");
        Ok(())
    }

    /// Apply `f` to an existing record under the write lock and persist.
    pub fn update<F>(&self, user_id: &str, f: F) -> Result<UserCredentials>
    where
        F: FnOnce(&mut UserCredentials),
    {
        let mut users = self.users.write().unwrap_or_else(|e| e.into_inner());
        let mut record = users
            .get(user_id)
            .cloned()
            .ok_or_else(|| Error::not_found(user_id))?;
        f(&mut record);
        let mut next = users.clone();
        next.insert(user_id.to_string(), record.clone());
        self.persist(&next)?;
        *users = next;
        debug!(user_id, "updated credentials");
        Ok(record)
    }

    fn persist(&self, users: &HashMap<String, UserCredentials>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let data = serde_json::to_vec_pretty(users)?;
        let mut tmp_name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "credentials.json".into());
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);

        let mut options = std::fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&tmp_path)?;
        file.write_all(&data)?;
        file.sync_all()?;
        drop(file);

        // Covers a pre-existing temp file created with looser permissions.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600))?;
        }

        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    fn creds(user_id: &str) -> UserCredentials {
        UserCredentials {
            user_id: user_id.into(),
            slack_bot_token: Secret::new(format!("xoxb-{user_id}")),
            gmail_client_id: "client.apps.googleusercontent.com".into(),
            gmail_secret: Secret::new("shh".into()),
            gmail_refresh_token: None,
        }
    }

    fn user_ids(store: &CredentialStore) -> Vec<String> {
        let mut ids: Vec<_> = store.users.read().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }

    #[test]
    fn missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::open(dir.path().join("creds.json")).unwrap();
        assert!(user_ids(&store).is_empty());
    }

    #[test]
    fn unknown_user_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::open(dir.path().join("creds.json")).unwrap();
        let err = store.get("ghost").unwrap_err();
        assert!(matches!(err, Error::NotFound { ref user_id } if user_id == "ghost"));
    }

    #[test]
    fn save_persists_full_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        let store = CredentialStore::open(&path).unwrap();
        store.save(creds("alice")).unwrap();
        store.save(creds("bob")).unwrap();

        let reopened = CredentialStore::open(&path).unwrap();
        assert_eq!(user_ids(&reopened), vec!["alice", "bob"]);
        assert_eq!(
            reopened.slack_token("bob").unwrap().expose_secret(),
            "xoxb-bob"
        );
        assert!(!dir.path().join("creds.json.tmp").exists());
    }

    #[test]
    fn update_merges_refresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        let store = CredentialStore::open(&path).unwrap();
        store.save(creds("alice")).unwrap();

        store
            .update("alice", |c| {
                c.gmail_refresh_token = Some(Secret::new("1//refresh".into()));
            })
            .unwrap();

        let reopened = CredentialStore::open(&path).unwrap();
        let alice = reopened.get("alice").unwrap();
        assert_eq!(alice.gmail_client_id, "client.apps.googleusercontent.com");
        assert_eq!(
            alice.gmail_refresh_token.unwrap().expose_secret(),
            "1//refresh"
        );
    }

    #[test]
    fn update_unknown_user_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::open(dir.path().join("creds.json")).unwrap();
        assert!(store.update("ghost", |_| {}).is_err());
    }

    #[test]
    fn reads_legacy_empty_refresh_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        std::fs::write(
            &path,
            r#"{"u1":{"user_id":"u1","gmail_client_id":"cid","gmail_secret":"s","gmail_refresh_token":"","slack_bot_token":"xoxb"}}"#,
        )
        .unwrap();

        let store = CredentialStore::open(&path).unwrap();
        assert!(store.get("u1").unwrap().gmail_refresh_token.is_none());
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            CredentialStore::open(&path),
            Err(Error::CorruptSnapshot { .. })
        ));
    }

    #[cfg(unix)]
    #[test]
    fn snapshot_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("creds.json");
        let store = CredentialStore::open(&path).unwrap();
        store.save(creds("alice")).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn debug_redacts_secrets() {
        let rendered = format!("{:?}", creds("alice"));
        assert!(!rendered.contains("xoxb-alice"));
        assert!(!rendered.contains("shh"));
    }
}

//! Team → owning-user mapping.
//!
//! A Slack workspace (team) is registered by exactly one owning user whose
//! credentials are used to act on that team's events.

use std::{collections::HashMap, sync::RwLock};

use {anyhow::Result, async_trait::async_trait, serde::Serialize};

/// A persisted team registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeamMapping {
    pub team_id: String,
    pub user_id: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Persistent storage for team registrations.
#[async_trait]
pub trait TeamMappingStore: Send + Sync {
    /// Owning user for `team_id`, if the team has been registered.
    async fn lookup(&self, team_id: &str) -> Result<Option<String>>;
    /// Insert or replace the owner of `team_id`.
    async fn register(&self, team_id: &str, user_id: &str) -> Result<()>;
    async fn list(&self) -> Result<Vec<TeamMapping>>;
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Process-local mapping store, used when no database is configured and in tests.
#[derive(Default)]
pub struct InMemoryTeamMappingStore {
    teams: RwLock<HashMap<String, TeamMapping>>,
}

impl InMemoryTeamMappingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TeamMappingStore for InMemoryTeamMappingStore {
    async fn lookup(&self, team_id: &str) -> Result<Option<String>> {
        let teams = self.teams.read().unwrap_or_else(|e| e.into_inner());
        Ok(teams.get(team_id).map(|m| m.user_id.clone()))
    }

    async fn register(&self, team_id: &str, user_id: &str) -> Result<()> {
        let now = unix_now();
        let mut teams = self.teams.write().unwrap_or_else(|e| e.into_inner());
        teams
            .entry(team_id.to_string())
            .and_modify(|m| {
                m.user_id = user_id.to_string();
                m.updated_at = now;
            })
            .or_insert_with(|| TeamMapping {
                team_id: team_id.to_string(),
                user_id: user_id.to_string(),
                created_at: now,
                updated_at: now,
            });
        Ok(())
    }

    async fn list(&self) -> Result<Vec<TeamMapping>> {
        let teams = self.teams.read().unwrap_or_else(|e| e.into_inner());
        let mut all: Vec<_> = teams.values().cloned().collect();
        all.sort_by(|a, b| a.team_id.cmp(&b.team_id));
        Ok(all)
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_unknown_team_is_none() {
        let store = InMemoryTeamMappingStore::new();
        assert!(store.lookup("T404").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn register_replaces_owner() {
        let store = InMemoryTeamMappingStore::new();
        store.register("T1", "owner1").await.unwrap();
        store.register("T1", "owner2").await.unwrap();

        assert_eq!(
            store.lookup("T1").await.unwrap().as_deref(),
            Some("owner2")
        );
        assert_eq!(store.list().await.unwrap().len(), 1);
    }
}

use anyhow::Result;

use {
    beacon_common::TeamMappingStore,
    beacon_config::BeaconConfig,
    beacon_gateway::{
        SqliteTeamMappingStore,
        team_store::{connect_with_retry, run_migrations},
    },
};

/// Print every registered team and its owning user.
pub async fn list(config: &BeaconConfig) -> Result<()> {
    let pool = connect_with_retry(&config.database).await?;
    run_migrations(&pool).await?;
    let mappings = SqliteTeamMappingStore::new(pool).list().await?;

    if mappings.is_empty() {
        eprintln!("No integrations registered.");
        return Ok(());
    }

    let width = mappings
        .iter()
        .map(|m| m.team_id.len())
        .max()
        .unwrap_or(0)
        .max("TEAM".len());
    println!("{:<width$}  USER", "TEAM");
    for m in &mappings {
        println!("{:<width$}  {}", m.team_id, m.user_id);
    }
    eprintln!("\n{} integration(s)", mappings.len());
    Ok(())
}

use clap::Subcommand;

use inbox_config::InboxConfig;

#[derive(Subcommand)]
pub enum DbAction {
    /// Run all pending database migrations.
    Migrate,
    /// Delete all messages and conversations but keep the schema intact.
    Clear,
}

pub async fn handle_db(config: &InboxConfig, action: &DbAction) -> anyhow::Result<()> {
    let url = &config.database.url;
    let pool = inbox_store::connect(url, config.database.max_connections).await?;
    match action {
        DbAction::Migrate => {
            inbox_store::run_migrations(&pool).await?;
            println!("Migrations applied to {url}.");
        },
        DbAction::Clear => {
            inbox_store::run_migrations(&pool).await?;
            let cleared = inbox_store::clear(&pool).await?;
            println!(
                "Cleared {} message(s) and {} conversation(s) from {url}.",
                cleared.messages, cleared.conversations
            );
        },
    }
    pool.close().await;
    Ok(())
}

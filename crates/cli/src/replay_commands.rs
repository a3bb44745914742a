use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use {
    anyhow::Context,
    inbox_config::InboxConfig,
    inbox_messages::{Inbox, IngestReport, NoopBroadcaster},
    tracing::warn,
};

/// Replay webhook files against the configured database. Nobody is
/// connected, so updates are not broadcast.
pub async fn handle_replay(config: &InboxConfig, files: &[PathBuf]) -> anyhow::Result<()> {
    let pool = inbox_store::connect(&config.database.url, config.database.max_connections).await?;
    inbox_store::run_migrations(&pool).await?;
    let inbox = inbox_gateway::sqlite_inbox(pool.clone(), Arc::new(NoopBroadcaster), &config.inbox);

    let mut failed_files = 0;
    for path in files {
        match replay_file(&inbox, path).await {
            Ok(report) => println!("{}", summary_line(path, &report)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "replay failed");
                println!("{}: error: {e:#}", path.display());
                failed_files += 1;
            },
        }
    }
    pool.close().await;

    if failed_files > 0 {
        anyhow::bail!("{failed_files} of {} file(s) could not be replayed", files.len());
    }
    Ok(())
}

async fn replay_file(inbox: &Inbox, path: &Path) -> anyhow::Result<IngestReport> {
    let body = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(inbox.ingest_webhook(&body).await?)
}

fn summary_line(path: &Path, report: &IngestReport) -> String {
    format!(
        "{}: {} processed ({} created, {} updated), {} skipped, {} failed [{}]",
        path.display(),
        report.processed(),
        report.created,
        report.updated,
        report.skipped.len(),
        report.failed,
        report.shape.unwrap_or("unknown shape"),
    )
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    fn delivery(id: &str, body: &str) -> String {
        json!({
            "entry": [{
                "changes": [{
                    "field": "messages",
                    "value": {
                        "messages": [{
                            "from": "111",
                            "id": id,
                            "timestamp": "1700000000",
                            "type": "text",
                            "text": { "body": body }
                        }]
                    }
                }]
            }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn replays_files_into_the_configured_database() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.json");
        let again = dir.path().join("again.json");
        std::fs::write(&first, delivery("wamid.R1", "hello")).unwrap();
        std::fs::write(&again, delivery("wamid.R1", "hello")).unwrap();

        let mut config = InboxConfig::default();
        config.database.url = format!("sqlite://{}", dir.path().join("inbox.db").display());

        handle_replay(&config, &[first, again]).await.unwrap();

        let pool = inbox_store::connect(&config.database.url, 1).await.unwrap();
        let inbox = inbox_gateway::sqlite_inbox(pool, Arc::new(NoopBroadcaster), &config.inbox);
        let page = inbox.history("111", None, None).await.unwrap();
        assert_eq!(page.messages.len(), 1);
        assert_eq!(page.messages[0].message_body, "hello");
    }

    #[tokio::test]
    async fn unreadable_file_fails_the_run_after_processing_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.json");
        let bad = dir.path().join("bad.json");
        std::fs::write(&good, delivery("wamid.G", "ok")).unwrap();
        std::fs::write(&bad, "{ truncated").unwrap();

        let mut config = InboxConfig::default();
        config.database.url = format!("sqlite://{}", dir.path().join("inbox.db").display());

        let err = handle_replay(&config, &[bad, good]).await.unwrap_err();
        assert!(err.to_string().contains("1 of 2"));

        let pool = inbox_store::connect(&config.database.url, 1).await.unwrap();
        let inbox = inbox_gateway::sqlite_inbox(pool, Arc::new(NoopBroadcaster), &config.inbox);
        assert_eq!(inbox.conversations().await.unwrap().len(), 1);
    }

    #[test]
    fn summary_line_reports_counts() {
        let report = IngestReport {
            shape: Some("direct"),
            created: 2,
            ..Default::default()
        };
        let line = summary_line(Path::new("x.json"), &report);
        assert!(line.starts_with("x.json: 0 processed (2 created, 0 updated)"));
        assert!(line.ends_with("[direct]"));
    }
}

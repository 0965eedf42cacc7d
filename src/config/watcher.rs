//! Config file watching for hot reload of the guard chain.
//!
//! The parent directory is watched rather than the file itself, so editors
//! that save by renaming a temp file over the original still trigger a
//! reload. Only events touching the config file are acted on.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::GatewayConfig;

/// Sends each successfully loaded and validated config to the server.
pub struct ConfigWatcher {
    path: PathBuf,
    update_tx: mpsc::UnboundedSender<GatewayConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiving end the server listens on.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<GatewayConfig>) {
        let (update_tx, update_rx) = mpsc::unbounded_channel();
        let watcher = Self {
            path: path.to_path_buf(),
            update_tx,
        };
        (watcher, update_rx)
    }

    /// Start watching. Dropping the returned handle stops the watch.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self { path, update_tx } = self;
        let file_name = path.file_name().map(|n| n.to_os_string());
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let reload_path = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                let event = match res {
                    Ok(event) => event,
                    Err(e) => {
                        tracing::error!(error = %e, "Config watch error");
                        return;
                    }
                };
                if !matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_)) {
                    return;
                }
                let touches_config = event
                    .paths
                    .iter()
                    .any(|p| p.file_name().map(|n| n.to_os_string()) == file_name);
                if !touches_config {
                    return;
                }

                match load_config(&reload_path) {
                    Ok(config) => {
                        tracing::info!(path = %reload_path.display(), "Config change loaded");
                        if update_tx.send(config).is_err() {
                            tracing::debug!("Server no longer accepting config updates");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Ignoring invalid config change");
                    }
                }
            },
            Config::default().with_poll_interval(Duration::from_secs(2)),
        )?;

        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        tracing::info!(path = %path.display(), "Watching config for changes");
        Ok(watcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_valid_edit_is_delivered() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        std::fs::write(&path, "[guards.rate_limit]\nrate = 5.0\n").unwrap();

        let (watcher, mut updates) = ConfigWatcher::new(&path);
        let _handle = watcher.run().unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[guards.rate_limit]\nrate = 7.0").unwrap();
        file.sync_all().unwrap();
        drop(file);

        // Truncation can surface as its own event, so wait for the final content.
        let rate = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let config = updates.recv().await.expect("channel closed");
                if config.guards.rate_limit.rate == 7.0 {
                    return config.guards.rate_limit.rate;
                }
            }
        })
        .await
        .expect("no reload within 5s");
        assert_eq!(rate, 7.0);
    }
}

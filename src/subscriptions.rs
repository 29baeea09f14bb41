//! Subscription store backed by a line-delimited text file.
//!
//! One feed URL per line. The file is the only source of truth: nothing is
//! cached in memory, and every polling cycle re-reads it. All access goes
//! through one async mutex so a `subscribe`/`unsubscribe` command can never
//! interleave with a cycle reading the list.
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Lines shorter than this are treated as noise (stray blank or partial lines).
const MIN_LINE_LEN: usize = 3;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read subscription file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write subscription file '{}': {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug)]
pub struct SubscriptionStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SubscriptionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the subscribed URLs in file order, skipping noise lines.
    pub async fn list(&self) -> Result<Vec<String>, StoreError> {
        let _guard = self.lock.lock().await;
        let content = self.read().await?;
        Ok(parse_lines(&content))
    }

    /// Appends `url` as a new line, creating the file if needed.
    ///
    /// If the existing content lacks a trailing newline, one is written first
    /// so the URL never gets glued onto the previous line.
    pub async fn add(&self, url: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;

        let needs_separator = match tokio::fs::read(&self.path).await {
            Ok(bytes) => !bytes.is_empty() && !bytes.ends_with(b"\n"),
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let mut line = String::with_capacity(url.len() + 2);
        if needs_separator {
            line.push('\n');
        }
        line.push_str(url);
        line.push('\n');

        let write_err = |source| StoreError::Write {
            path: self.path.clone(),
            source,
        };
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(write_err)?;
        file.write_all(line.as_bytes()).await.map_err(write_err)?;
        file.flush().await.map_err(write_err)?;

        tracing::info!(url = %url, path = %self.path.display(), "Subscribed");
        Ok(())
    }

    /// Removes every line that is exactly `url`. Returns how many were removed.
    ///
    /// Blank lines are dropped in the same pass, so the rewritten file never
    /// starts with or contains an empty line. Calling this again with the same
    /// URL leaves the file untouched.
    pub async fn remove(&self, url: &str) -> Result<usize, StoreError> {
        let _guard = self.lock.lock().await;
        let content = self.read().await?;

        let (rewritten, removed) = remove_line(&content, url);
        if rewritten != content {
            write_atomic(&self.path, rewritten.as_bytes())
                .await
                .map_err(|source| StoreError::Write {
                    path: self.path.clone(),
                    source,
                })?;
        }

        tracing::info!(url = %url, removed, path = %self.path.display(), "Unsubscribed");
        Ok(removed)
    }

    async fn read(&self) -> Result<String, StoreError> {
        tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| StoreError::Read {
                path: self.path.clone(),
                source,
            })
    }
}

fn parse_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .filter(|line| line.len() >= MIN_LINE_LEN)
        .map(str::to_owned)
        .collect()
}

/// Whole-line removal of `url`; blank lines are dropped along the way.
fn remove_line(content: &str, url: &str) -> (String, usize) {
    let mut removed = 0;
    let mut out = String::with_capacity(content.len());

    for line in content.lines() {
        if line == url {
            removed += 1;
        } else if !line.trim().is_empty() {
            out.push_str(line);
            out.push('\n');
        }
    }

    (out, removed)
}

/// Write-to-temp-then-rename so a crash never leaves a truncated list behind.
async fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let suffix: u64 = rand::random();
    let temp_path = path.with_extension(format!("tmp.{:016x}", suffix));

    let result = async {
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&temp_path, path).await
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&temp_path).await;
    }
    result
}

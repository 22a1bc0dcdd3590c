//! Reference-list persistence.
//!
//! Each feed keeps one text file listing the source references of its live
//! records, one per line. Writes are coalesced through a watch channel so a
//! burst of merges produces at most one pending write.

use std::path::{Path, PathBuf};

use metrics::counter;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use bulletin_common::{FeedError, FeedResult};

/// The snapshot file for one feed.
#[derive(Debug, Clone)]
pub struct ReferenceFile {
    path: PathBuf,
}

impl ReferenceFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the file with `references`.
    ///
    /// Writes a sibling temp file and renames it into place.
    pub async fn save(&self, references: &[String]) -> FeedResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        tokio::fs::write(&tmp, references.join("\n")).await?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            FeedError::Persistence(format!("rename {}: {}", self.path.display(), e))
        })?;
        Ok(())
    }

    /// Read the persisted references.
    ///
    /// A missing, empty or non-UTF-8 file yields an empty list.
    pub async fn load(&self) -> Vec<String> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to read state file");
                return Vec::new();
            }
        };

        match String::from_utf8(bytes) {
            Ok(text) => parse_references(&text),
            Err(_) => {
                warn!(path = %self.path.display(), "State file is not UTF-8, ignoring");
                Vec::new()
            }
        }
    }
}

fn parse_references(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

enum Pending {
    Write(Vec<String>),
    /// Last write; the writer exits once it lands.
    Final(Vec<String>),
}

/// Requests a write of the latest reference list.
#[derive(Clone)]
pub struct PersistTrigger {
    tx: watch::Sender<Option<Pending>>,
}

impl PersistTrigger {
    /// Queue `references` for writing, replacing any write still pending.
    ///
    /// Ignored once [`finish`](Self::finish) has been called.
    pub fn request(&self, references: Vec<String>) {
        self.tx.send_if_modified(|pending| {
            if matches!(pending, Some(Pending::Final(_))) {
                return false;
            }
            *pending = Some(Pending::Write(references));
            true
        });
    }

    /// Queue the final list and tell the writer to stop after writing it.
    pub fn finish(&self, references: Vec<String>) {
        self.tx.send_replace(Some(Pending::Final(references)));
    }
}

/// Spawn the coalescing writer for `file`.
///
/// The task ends after a [`PersistTrigger::finish`] write, or once every
/// trigger clone is dropped.
pub fn spawn_writer(file: ReferenceFile, feed: &'static str) -> (PersistTrigger, JoinHandle<()>) {
    let (tx, mut rx) = watch::channel::<Option<Pending>>(None);

    let handle = tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            let (references, last) = match &*rx.borrow_and_update() {
                Some(Pending::Write(references)) => (references.clone(), false),
                Some(Pending::Final(references)) => (references.clone(), true),
                None => continue,
            };

            match file.save(&references).await {
                Ok(()) => {
                    debug!(feed, path = %file.path().display(), count = references.len(), "Persisted references");
                    counter!("feed_persist_writes_total", "feed" => feed).increment(1);
                }
                Err(e) => {
                    warn!(feed, path = %file.path().display(), error = %e, "Failed to persist references");
                    counter!("feed_persist_failures_total", "feed" => feed).increment(1);
                }
            }

            if last {
                break;
            }
        }
    });

    (PersistTrigger { tx }, handle)
}

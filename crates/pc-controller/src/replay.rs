//! Startup recovery of replay recordings
//!
//! A session's replay is written to `REPLAY_DIR/<date>/<session-id>.<ext>.gz`
//! and uploaded when the session ends. Files still on disk at startup are
//! uploads that failed last time; this sweep retries them one by one.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use pc_core::traits::ReplayUploader;

/// Pause between two uploads
pub const UPLOAD_DELAY: Duration = Duration::from_secs(1);

const SESSION_ID_LEN: usize = 36;

/// Session id of a replay file name, or `None` if the file is not a replay.
///
/// The id is everything before the first `.`; the final extension must be
/// `gz` and the id must be as long as a hyphenated UUID.
pub fn replay_session_id(filename: &str) -> Option<&str> {
    let (id, _) = filename.split_once('.')?;
    let suffix = filename.rsplit('.').next()?;
    if suffix != "gz" || id.chars().count() != SESSION_ID_LEN {
        return None;
    }
    Some(id)
}

/// A replay file found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReplay {
    pub session_id: String,
    pub path: PathBuf,
    /// `<date>/<filename>`
    pub target: String,
}

/// Outcome of one sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryReport {
    pub uploaded: usize,
    pub failed: usize,
    /// Sweep ended early because shutdown began
    pub interrupted: bool,
}

/// List every pending replay under `root`, sorted by target.
///
/// A missing root yields an empty list; any other failure to open the root is
/// an error. Partitions are followed through symlinks. Entries that are not
/// directories are skipped, and a partition that cannot be read is logged and
/// skipped so the rest are still found.
pub async fn find_pending(root: &Path) -> std::io::Result<Vec<PendingReplay>> {
    let mut pending = Vec::new();

    let mut partitions = match tokio::fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(pending),
        Err(e) => return Err(e),
    };

    loop {
        let partition = match partitions.next_entry().await {
            Ok(Some(partition)) => partition,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(root = %root.display(), error = %e, "Replay directory listing cut short");
                break;
            }
        };

        let path = partition.path();
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(partition = %path.display(), error = %e, "Skipping unreadable replay partition");
                continue;
            }
        }

        let date = partition.file_name().to_string_lossy().into_owned();
        if let Err(e) = scan_partition(&path, &date, &mut pending).await {
            tracing::warn!(partition = %path.display(), error = %e, "Skipping unreadable replay partition");
        }
    }

    pending.sort_by(|a, b| a.target.cmp(&b.target));
    Ok(pending)
}

async fn scan_partition(
    dir: &Path,
    date: &str,
    pending: &mut Vec<PendingReplay>,
) -> std::io::Result<()> {
    let mut files = tokio::fs::read_dir(dir).await?;
    while let Some(file) = files.next_entry().await? {
        let filename = file.file_name().to_string_lossy().into_owned();
        let Some(session_id) = replay_session_id(&filename) else {
            continue;
        };
        pending.push(PendingReplay {
            session_id: session_id.to_string(),
            path: file.path(),
            target: format!("{}/{}", date, filename),
        });
    }
    Ok(())
}

/// Re-uploads replays left behind by a previous run
pub struct ReplayRecovery {
    uploader: Arc<dyn ReplayUploader>,
    delay: Duration,
}

impl ReplayRecovery {
    pub fn new(uploader: Arc<dyn ReplayUploader>) -> Self {
        Self {
            uploader,
            delay: UPLOAD_DELAY,
        }
    }

    /// Override the pause between uploads
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Upload every pending replay under `root` in sequence
    pub async fn sweep(&self, root: &Path, stop: &CancellationToken) -> RecoveryReport {
        let mut report = RecoveryReport::default();

        let pending = match find_pending(root).await {
            Ok(pending) => pending,
            Err(e) => {
                tracing::error!(root = %root.display(), error = %e, "Failed to scan replay directory");
                return report;
            }
        };

        if pending.is_empty() {
            return report;
        }
        tracing::info!(count = pending.len(), "Retrying failed replay uploads");

        for replay in pending {
            if stop.is_cancelled() {
                report.interrupted = true;
                break;
            }

            tracing::debug!(target_name = %replay.target, "Retry upload retained replay");
            match self
                .uploader
                .upload(&replay.session_id, &replay.path, &replay.target)
                .await
            {
                Ok(()) => report.uploaded += 1,
                Err(e) => {
                    tracing::error!(
                        session_id = %replay.session_id,
                        error = %e,
                        "Replay upload failed"
                    );
                    report.failed += 1;
                }
            }

            tokio::select! {
                _ = stop.cancelled() => {
                    report.interrupted = true;
                    break;
                }
                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        tracing::info!(
            uploaded = report.uploaded,
            failed = report.failed,
            "Replay recovery finished"
        );
        report
    }
}

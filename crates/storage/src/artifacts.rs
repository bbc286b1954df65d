// SPDX-License-Identifier: MIT

//! On-disk artifact layout for workflow tasks (spec.md §3, §4.D):
//! `<root>/YYYY/MM/DD/HH/<suffix>/`, with nested `<jobName>/` and
//! `<jobName>/<stepIndex>/` directories, each holding `status`/`begin`/
//! `error.log` (steps additionally hold `log`).
//!
//! Reads are tolerant of a missing file (the zero value, not an error)
//! except [`ArtifactStore::read_origin`], which propagates I/O errors —
//! `origin` is written once at task acceptance and its absence means the
//! task was never actually created.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;

use zallet_core::{RunStatus, TaskId};

use crate::error::StorageError;

#[cfg(unix)]
const DIR_MODE: u32 = 0o755;
#[cfg(unix)]
const FILE_MODE: u32 = 0o644;

/// Root-relative path computation plus read/write primitives for a single
/// artifact directory, shared by task-, job-, and step-level directories
/// (they all hold the same three or four files).
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/YYYY/MM/DD/HH/<suffix>/`.
    pub fn task_dir(&self, task_id: &TaskId) -> PathBuf {
        let path = task_id.date_path();
        self.root
            .join(path.year)
            .join(path.month)
            .join(path.day)
            .join(path.hour)
            .join(path.suffix)
    }

    pub fn job_dir(&self, task_id: &TaskId, job_name: &str) -> PathBuf {
        self.task_dir(task_id).join(job_name)
    }

    pub fn step_dir(&self, task_id: &TaskId, job_name: &str, step_index: usize) -> PathBuf {
        self.job_dir(task_id, job_name).join(step_index.to_string())
    }

    /// Creates the task directory and writes `origin`, the one file this
    /// store never recreates later. Called exactly once, at task
    /// acceptance.
    pub async fn create_task(&self, task_id: &TaskId, origin: &[u8]) -> Result<(), StorageError> {
        let dir = self.task_dir(task_id);
        create_dir(&dir).await?;
        write_file(&dir.join("origin"), origin).await
    }

    /// Propagates I/O errors rather than treating a missing file as the
    /// zero value — the one exception to this store's tolerant-read rule.
    pub async fn read_origin(&self, task_id: &TaskId) -> Result<Vec<u8>, StorageError> {
        tokio::fs::read(self.task_dir(task_id).join("origin"))
            .await
            .map_err(StorageError::from)
    }

    pub async fn ensure_dir(&self, dir: &Path) -> Result<(), StorageError> {
        create_dir(dir).await
    }

    pub async fn write_status(
        &self,
        dir: &Path,
        status: RunStatus,
        duration_millis: u64,
    ) -> Result<(), StorageError> {
        let body = zallet_core::task::format_status_line(status, duration_millis);
        write_file(&dir.join("status"), body.as_bytes()).await
    }

    /// Tolerant: a missing or malformed status file reads back as
    /// `(None, 0)`, matching [`zallet_core::task::parse_status_line`]'s
    /// fallback.
    pub async fn read_status(&self, dir: &Path) -> Result<(Option<RunStatus>, u64), StorageError> {
        match read_optional(&dir.join("status")).await? {
            Some(body) => Ok(zallet_core::task::parse_status_line(&body)),
            None => Ok((None, 0)),
        }
    }

    pub async fn write_begin(&self, dir: &Path, epoch_millis: u64) -> Result<(), StorageError> {
        write_file(&dir.join("begin"), epoch_millis.to_string().as_bytes()).await
    }

    pub async fn read_begin(&self, dir: &Path) -> Result<u64, StorageError> {
        Ok(read_optional(&dir.join("begin"))
            .await?
            .and_then(|body| body.trim().parse().ok())
            .unwrap_or(0))
    }

    pub async fn write_error_log(&self, dir: &Path, text: &str) -> Result<(), StorageError> {
        write_file(&dir.join("error.log"), text.as_bytes()).await
    }

    pub async fn read_error_log(&self, dir: &Path) -> Result<Option<String>, StorageError> {
        read_optional(&dir.join("error.log")).await
    }

    /// Opens a step's `log` file for append, creating it if absent. Callers
    /// (the executor's `StepOutput` plumbing) hold the writer for the
    /// lifetime of the step and buffer before flushing.
    pub async fn open_log_appender(&self, dir: &Path) -> Result<tokio::fs::File, StorageError> {
        let path = dir.join("log");
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        #[cfg(unix)]
        set_mode(&path, FILE_MODE).await?;
        Ok(file)
    }

    pub async fn read_log(&self, dir: &Path) -> Result<Vec<u8>, StorageError> {
        match tokio::fs::read(dir.join("log")).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn append_log(&self, dir: &Path, bytes: &[u8]) -> Result<(), StorageError> {
        let mut file = self.open_log_appender(dir).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        Ok(())
    }
}

async fn create_dir(dir: &Path) -> Result<(), StorageError> {
    tokio::fs::create_dir_all(dir).await?;
    #[cfg(unix)]
    set_mode(dir, DIR_MODE).await?;
    Ok(())
}

async fn write_file(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    tokio::fs::write(path, contents).await?;
    #[cfg(unix)]
    set_mode(path, FILE_MODE).await?;
    Ok(())
}

async fn read_optional(path: &Path) -> Result<Option<String>, StorageError> {
    match tokio::fs::read_to_string(path).await {
        Ok(body) => Ok(Some(body)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> Result<(), StorageError> {
    use std::os::unix::fs::PermissionsExt;
    let perms = std::fs::Permissions::from_mode(mode);
    tokio::fs::set_permissions(path, perms).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use zallet_core::TaskId;

    fn task_id() -> TaskId {
        TaskId::parse("2024010100aaaaaaaaaaaaaaaaaaaaaa").expect("valid fixture id")
    }

    #[tokio::test]
    async fn task_dir_follows_date_path_layout() {
        let store = ArtifactStore::new("/base/workflow/action");
        let dir = store.task_dir(&task_id());
        assert_eq!(
            dir,
            PathBuf::from("/base/workflow/action/2024/01/01/00/aaaaaaaaaaaaaaaaaaaaaa")
        );
    }

    #[tokio::test]
    async fn create_and_read_origin_round_trips() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(tmp.path());
        let id = task_id();
        store.create_task(&id, b"jobs: {}").await.expect("create");
        let origin = store.read_origin(&id).await.expect("read origin");
        assert_eq!(origin, b"jobs: {}");
    }

    #[tokio::test]
    async fn read_origin_propagates_missing_file_as_error() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(tmp.path());
        let err = store.read_origin(&task_id()).await.unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
    }

    #[tokio::test]
    async fn read_status_is_tolerant_of_a_missing_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(tmp.path());
        let dir = tmp.path().join("nope");
        let (status, duration) = store.read_status(&dir).await.expect("tolerant read");
        assert_eq!(status, None);
        assert_eq!(duration, 0);
    }

    #[tokio::test]
    async fn status_round_trips_through_the_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(tmp.path());
        let dir = tmp.path().join("job");
        store.ensure_dir(&dir).await.expect("ensure dir");
        store
            .write_status(&dir, RunStatus::Success, 42)
            .await
            .expect("write status");
        let (status, duration) = store.read_status(&dir).await.expect("read status");
        assert_eq!(status, Some(RunStatus::Success));
        assert_eq!(duration, 42);
    }

    #[tokio::test]
    async fn log_appends_across_multiple_writes() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(tmp.path());
        let dir = tmp.path().join("job").join("0");
        store.ensure_dir(&dir).await.expect("ensure dir");
        store.append_log(&dir, b"first\n").await.expect("append");
        store.append_log(&dir, b"second\n").await.expect("append");
        let log = store.read_log(&dir).await.expect("read log");
        assert_eq!(log, b"first\nsecond\n");
    }

    #[tokio::test]
    async fn read_log_is_tolerant_of_a_missing_file() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let store = ArtifactStore::new(tmp.path());
        let log = store.read_log(&tmp.path().join("job")).await.expect("tolerant read");
        assert!(log.is_empty());
    }
}

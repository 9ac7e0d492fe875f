//! Runs one partition through the external verifier binary.
//!
//! The verifier's stdout and stderr are streamed line by line as they are
//! produced, echoed with a `[partition n]` prefix, and the last
//! [`TAIL_LINES`] lines are kept for the failure report. No timeout is
//! applied: a replay may legitimately run for many hours.

use crate::artifacts::{prepare_partition_dir, METADATA_CACHE_DIR, TARGET_DB_DIR};
use crate::errors::{Result, VerifyError};
use crate::partition::PartitionSpec;
use async_trait::async_trait;
use std::borrow::Cow;
use std::collections::VecDeque;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

pub const TAIL_LINES: usize = 10;
/// Longer output lines are split into chunks of this many bytes.
pub const MAX_LINE_BYTES: usize = 64 * 1024;
pub const CONCURRENT_DOWNLOADS: u32 = 8;
pub const REPLAY_CONCURRENCY_LEVEL: u32 = 2;
/// Reported when the verifier could not be started or died from a signal.
pub const UNKNOWN_EXIT_CODE: i32 = -1;

/// Fixed-capacity ring buffer over output lines.
#[derive(Debug, Clone)]
pub struct TailBuffer {
    lines: VecDeque<String>,
    capacity: usize,
}

impl TailBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, line: String) {
        if self.capacity == 0 {
            return;
        }
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        Vec::from(self.lines).join("\n").into_bytes()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionResult {
    pub index: u32,
    pub exit_code: i32,
    pub tail_output: Vec<u8>,
}

impl PartitionResult {
    pub fn tail_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.tail_output)
    }
}

/// Runs a single verification attempt for a partition.
#[async_trait]
pub trait PartitionRunner: Send + Sync {
    async fn run(&self, spec: &PartitionSpec) -> PartitionResult;
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub verifier_bin: PathBuf,
    pub work_dir: PathBuf,
    pub backup_config: PathBuf,
    pub txns_to_skip: Vec<u64>,
    /// Extra environment for the verifier (the backup config template
    /// expands `$BUCKET` and `$SUB_DIR`).
    pub env: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub struct VerificationWorker {
    settings: WorkerSettings,
}

impl VerificationWorker {
    pub fn new(settings: WorkerSettings) -> Self {
        Self { settings }
    }

    pub fn partition_dir(&self, spec: &PartitionSpec) -> PathBuf {
        self.settings.work_dir.join(&spec.name)
    }

    pub fn verifier_args(&self, spec: &PartitionSpec) -> Vec<OsString> {
        let dir = self.partition_dir(spec);
        let mut args: Vec<OsString> = vec!["aptos-db".into(), "replay-verify".into()];
        args.extend(
            self.settings
                .txns_to_skip
                .iter()
                .map(|txn| OsString::from(format!("--txns-to-skip={txn}"))),
        );
        args.extend([
            "--concurrent-downloads".into(),
            CONCURRENT_DOWNLOADS.to_string().into(),
            "--replay-concurrency-level".into(),
            REPLAY_CONCURRENCY_LEVEL.to_string().into(),
            "--metadata-cache-dir".into(),
            dir.join(METADATA_CACHE_DIR).into_os_string(),
            "--target-db-dir".into(),
            dir.join(TARGET_DB_DIR).into_os_string(),
            "--start-version".into(),
            spec.start.to_string().into(),
            "--end-version".into(),
            spec.end.to_string().into(),
            "--lazy-quit".into(),
            "--command-adapter-config".into(),
            self.settings.backup_config.clone().into_os_string(),
        ]);
        args
    }

    async fn try_run(&self, spec: &PartitionSpec) -> Result<PartitionResult> {
        let work_dir = self.settings.work_dir.clone();
        let name = spec.name.clone();
        tokio::task::spawn_blocking(move || prepare_partition_dir(&work_dir, &name))
            .await
            .map_err(|e| {
                VerifyError::io(self.partition_dir(spec), std::io::Error::other(e))
            })??;

        tracing::info!(partition = spec.index, name = %spec.name, "spawning verifier");
        let mut child = Command::new(&self.settings.verifier_bin)
            .args(self.verifier_args(spec))
            .envs(self.settings.env.iter().cloned())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| VerifyError::io(&self.settings.verifier_bin, e))?;

        let (tx, mut rx) = mpsc::channel::<String>(256);
        let mut forwarders = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            forwarders.push(tokio::spawn(forward_lines(stdout, tx.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            forwarders.push(tokio::spawn(forward_lines(stderr, tx.clone())));
        }
        drop(tx);

        let mut tail = TailBuffer::new(TAIL_LINES);
        while let Some(line) = rx.recv().await {
            println!("[partition {}] {}", spec.index, line);
            tail.push(line);
        }
        for forwarder in forwarders {
            if let Ok(Err(e)) = forwarder.await {
                tracing::warn!(partition = spec.index, error = %e, "output stream read failed");
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| VerifyError::io(&self.settings.verifier_bin, e))?;
        let exit_code = status.code().unwrap_or_else(|| {
            tracing::warn!(partition = spec.index, %status, "verifier terminated without exit code");
            UNKNOWN_EXIT_CODE
        });

        Ok(PartitionResult {
            index: spec.index,
            exit_code,
            tail_output: tail.into_bytes(),
        })
    }
}

#[async_trait]
impl PartitionRunner for VerificationWorker {
    async fn run(&self, spec: &PartitionSpec) -> PartitionResult {
        match self.try_run(spec).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(partition = spec.index, error = %e, "verifier invocation failed");
                PartitionResult {
                    index: spec.index,
                    exit_code: UNKNOWN_EXIT_CODE,
                    tail_output: e.to_string().into_bytes(),
                }
            }
        }
    }
}

/// Forward lines until EOF, at most [`MAX_LINE_BYTES`] per line. Output is
/// not required to be UTF-8.
async fn forward_lines<R>(reader: R, tx: mpsc::Sender<String>) -> std::io::Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let read = (&mut reader)
            .take(MAX_LINE_BYTES as u64)
            .read_until(b'\n', &mut buf)
            .await?;
        if read == 0 {
            return Ok(());
        }
        let line = String::from_utf8_lossy(&buf)
            .trim_end_matches(['\n', '\r'])
            .to_string();
        if tx.send(line).await.is_err() {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> PartitionSpec {
        PartitionSpec {
            index: 3,
            total: 16,
            start: 200,
            end: 300,
            name: "run_3_200_300".into(),
        }
    }

    fn worker(bin: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> VerificationWorker {
        VerificationWorker::new(WorkerSettings {
            verifier_bin: bin.into(),
            work_dir: work_dir.into(),
            backup_config: PathBuf::from("/etc/backup/s3.yaml"),
            txns_to_skip: vec![46_552_012, 7],
            env: Vec::new(),
        })
    }

    #[test]
    fn tail_buffer_keeps_most_recent_lines() {
        let mut tail = TailBuffer::new(TAIL_LINES);
        for i in 0..25 {
            tail.push(format!("line {i}"));
        }
        assert_eq!(tail.len(), TAIL_LINES);
        let text = String::from_utf8(tail.into_bytes()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.first(), Some(&"line 15"));
        assert_eq!(lines.last(), Some(&"line 24"));
    }

    #[test]
    fn zero_capacity_tail_stays_empty() {
        let mut tail = TailBuffer::new(0);
        tail.push("ignored".into());
        assert!(tail.is_empty());
        assert!(tail.into_bytes().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn verifier_args_follow_invocation_contract() {
        let w = worker("aptos-debugger", "/work");
        let args: Vec<String> = w
            .verifier_args(&spec())
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "aptos-db",
                "replay-verify",
                "--txns-to-skip=46552012",
                "--txns-to-skip=7",
                "--concurrent-downloads",
                "8",
                "--replay-concurrency-level",
                "2",
                "--metadata-cache-dir",
                "/work/run_3_200_300/metadata-cache",
                "--target-db-dir",
                "/work/run_3_200_300/db",
                "--start-version",
                "200",
                "--end-version",
                "300",
                "--lazy-quit",
                "--command-adapter-config",
                "/etc/backup/s3.yaml",
            ]
        );
    }

    #[tokio::test]
    async fn overlong_lines_are_split() {
        let mut input = vec![b'a'; 2 * MAX_LINE_BYTES + 100];
        input.extend_from_slice(b"\nend\n");
        let (tx, mut rx) = mpsc::channel(16);
        forward_lines(std::io::Cursor::new(input), tx).await.unwrap();

        let mut lines = Vec::new();
        while let Some(line) = rx.recv().await {
            lines.push(line);
        }
        let lens: Vec<usize> = lines.iter().map(String::len).collect();
        assert_eq!(lens, vec![MAX_LINE_BYTES, MAX_LINE_BYTES, 100, 3]);
        assert_eq!(lines[3], "end");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn killed_verifier_is_retried_to_the_ceiling() {
        use crate::retry::{PartitionOutcome, RetryPolicy, MAX_ATTEMPTS};
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let bin = tmp.path().join("killed-debugger");
        std::fs::write(&bin, "#!/bin/sh\necho \"replaying\"\nkill -9 $$\n").unwrap();
        std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755)).unwrap();
        let w = worker(bin, tmp.path());

        let result = w.run(&spec()).await;
        assert_eq!(result.exit_code, UNKNOWN_EXIT_CODE);

        let retried = RetryPolicy::default().run(&w, &spec()).await;
        assert_eq!(retried.attempts, MAX_ATTEMPTS);
        assert_eq!(retried.result.exit_code, UNKNOWN_EXIT_CODE);
        assert_eq!(
            retried.outcome(),
            PartitionOutcome::RetryExhausted {
                code: UNKNOWN_EXIT_CODE
            }
        );
    }

    #[tokio::test]
    async fn missing_binary_reports_unknown_exit_code() {
        let tmp = tempfile::tempdir().unwrap();
        let w = worker(tmp.path().join("does-not-exist"), tmp.path());
        let result = w.run(&spec()).await;
        assert_eq!(result.index, 3);
        assert_eq!(result.exit_code, UNKNOWN_EXIT_CODE);
        assert!(result.tail_text().contains("does-not-exist"));
        assert!(tmp.path().join("run_3_200_300").is_dir());
    }
}

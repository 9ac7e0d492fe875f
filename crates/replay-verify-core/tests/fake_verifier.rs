//! End-to-end orchestration against a shell script standing in for the verifier.
#![cfg(unix)]

use replay_verify_core::{ConfigInputs, Orchestrator, PartitionOutcome, ReplayConfig, VersionRange};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Fake verifier.
///
/// `backup query` writes a metadata file into the cache dir and reports
/// `latest`. `replay-verify` counts attempts next to its db dir, prints 12
/// progress lines, then exits 2 at `mismatch_at` and 7 for the first two
/// attempts at `flaky_at`.
fn write_fake_verifier(dir: &Path, latest: u64, mismatch_at: u64, flaky_at: u64) -> PathBuf {
    let script = format!(
        r#"#!/bin/sh
if [ "$2" = "backup" ]; then
  cache=""
  while [ $# -gt 0 ]; do
    case "$1" in
      --metadata-cache-dir) cache="$2"; shift;;
    esac
    shift
  done
  mkdir -p "$cache"
  echo "epoch 0" > "$cache/epoch_ending_0.meta"
  echo "BackupStorageState {{ latest_epoch_ending_epoch: Some(1), latest_transaction_version: Some({latest}) }}"
  exit 0
fi
start=""
db=""
skips=""
while [ $# -gt 0 ]; do
  case "$1" in
    --start-version) start="$2"; shift;;
    --target-db-dir) db="$2"; shift;;
    --txns-to-skip=*) skips="$skips ${{1#--txns-to-skip=}}";;
  esac
  shift
done
attempts=$(cat "$db.attempts" 2>/dev/null || echo 0)
attempts=$((attempts + 1))
echo "$attempts" > "$db.attempts"
echo "stderr line for $start" >&2
for i in 1 2 3 4 5 6 7 8 9 10 11 12; do
  echo "progress $start line $i"
done
echo "bucket=$BUCKET sub_dir=$SUB_DIR skip=$skips"
if [ "$start" = "{mismatch_at}" ]; then
  exit 2
fi
if [ "$start" = "{flaky_at}" ] && [ "$attempts" -lt 3 ]; then
  exit 7
fi
exit 0
"#
    );
    let path = dir.join("fake-debugger");
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn inputs(work_dir: &Path, verifier: PathBuf) -> ConfigInputs {
    let template = work_dir.join("local.yaml");
    fs::write(&template, "commands:\n  open_for_read: cat $FILE_HANDLE\n").unwrap();
    ConfigInputs {
        bucket: Some("aptos-testnet-backup".into()),
        sub_dir: Some("e1".into()),
        history_start: Some("0".into()),
        txns_to_skip: Some("11 22".into()),
        backup_config_template_path: Some(template),
        verifier_bin: Some(verifier),
        work_dir: Some(work_dir.to_path_buf()),
        ..Default::default()
    }
}

fn with_range(mut inputs: ConfigInputs, start: u64, end: u64) -> ReplayConfig {
    inputs.start_version = Some(start);
    inputs.end_version = Some(end);
    inputs.resolve().unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn mismatch_is_final_and_flaky_partition_recovers() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let tmp = tempfile::tempdir().unwrap();
    let verifier = write_fake_verifier(tmp.path(), 5_000, 300, 700);
    let cfg = with_range(inputs(tmp.path(), verifier), 0, 1600);

    let report = Orchestrator::new(cfg).run().await.unwrap();

    assert!(!report.success());
    let failed: Vec<u32> = report.failures().map(|p| p.index).collect();
    assert_eq!(failed, vec![4]);

    let mismatch = &report.partitions[3];
    assert_eq!(mismatch.name, "run_4_300_400");
    assert_eq!(mismatch.exit_code, 2);
    assert_eq!(mismatch.attempts, 1);
    assert_eq!(mismatch.outcome, PartitionOutcome::VerifiedMismatch);
    assert_eq!(mismatch.tail.lines().count(), 10);
    assert!(mismatch.tail.contains("progress 300 line 12"));

    let flaky = &report.partitions[7];
    assert_eq!(flaky.exit_code, 0);
    assert_eq!(flaky.attempts, 3);
    let attempts = fs::read_to_string(tmp.path().join("run_8_700_800/db.attempts")).unwrap();
    assert_eq!(attempts.trim(), "3");

    assert!(report.failure_summary().contains("partition 4 (run_4_300_400)"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn partitions_get_private_cache_and_forwarded_settings() {
    let tmp = tempfile::tempdir().unwrap();
    let verifier = write_fake_verifier(tmp.path(), 5_000, u64::MAX, u64::MAX);
    let cfg = with_range(inputs(tmp.path(), verifier), 0, 1605);

    let report = Orchestrator::new(cfg).run().await.unwrap();
    assert!(report.success(), "{}", report.failure_summary());

    let last = &report.partitions[15];
    assert_eq!((last.start, last.end), (1500, 1605));
    assert!(last
        .tail
        .contains("bucket=aptos-testnet-backup sub_dir=e1 skip= 11 22"));

    for p in &report.partitions {
        let copied = tmp
            .path()
            .join(&p.name)
            .join("metadata-cache/epoch_ending_0.meta");
        assert!(copied.is_file(), "{} is missing", copied.display());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn last_runner_range_comes_from_backup_state() {
    let tmp = tempfile::tempdir().unwrap();
    let verifier = write_fake_verifier(tmp.path(), 1_000_001_601, u64::MAX, u64::MAX);
    let mut inputs = inputs(tmp.path(), verifier);
    inputs.runner_index = Some(18);
    inputs.runner_count = Some(19);

    let (range, specs) = Orchestrator::new(inputs.resolve().unwrap())
        .plan()
        .await
        .unwrap();
    assert_eq!(range, VersionRange::new(1_000_000_001, 1_000_001_601).unwrap());
    assert_eq!(specs[0].name, "run_1_1000000001_1000000101");
    assert_eq!(specs[15].end, 1_000_001_601);
    assert!(tmp.path().join("metadata-cache/epoch_ending_0.meta").is_file());
}

//! End-to-end tests for the compile service.
//!
//! The external toolchain is replaced by a small shell script, run through
//! `sh`, that understands the same command shapes as the real one:
//! - records every invocation's argv
//! - prints `# <input>` plus an error and exits 1 if the source contains SYNTAX_ERROR
//! - exits 3 silently if the source contains SILENT_FAILURE
//! - touches a marker and sleeps if the source contains HANG
//! - otherwise copies the input file to the `-o` path

#![cfg(unix)]

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use compile_lane::config::{LaneConfig, ToolchainSection};
use compile_lane::{evict_now, CancelToken, CompileService, JobOutcome, JobRequest};
use filetime::FileTime;
use tempfile::TempDir;

const FAKE_TOOLCHAIN: &str = r##"#!/bin/sh
echo "$@" >> "$LANE_TEST_DIR/invocations"
out=""
input=""
while [ $# -gt 0 ]; do
    case "$1" in
        -o) out="$2"; shift 2 ;;
        -tags|-target) shift 2 ;;
        *) input="$1"; shift ;;
    esac
done
echo "$input" > "$LANE_TEST_DIR/last-input"
if grep -q SYNTAX_ERROR "$input"; then
    echo "# $input"
    echo "main.go:2:1: syntax error: unexpected SYNTAX_ERROR" >&2
    exit 1
fi
if grep -q SILENT_FAILURE "$input"; then
    exit 3
fi
if grep -q HANG "$input"; then
    touch "$LANE_TEST_DIR/started"
    exec sleep 30
fi
cat "$input" > "$out"
"##;

const HELLO: &str = "package main; func main(){}";

struct Harness {
    _temp_dir: TempDir,
    root: PathBuf,
    config: LaneConfig,
}

impl Harness {
    fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();
        let script = root.join("fake-toolchain.sh");
        let script_text = FAKE_TOOLCHAIN.replace("$LANE_TEST_DIR", &root.to_string_lossy());
        fs::write(&script, script_text).unwrap();

        let config = LaneConfig {
            cache_dir: root.join("cache"),
            cache_budget_bytes: 10_000_000,
            evict_every: 100,
            toolchain: ToolchainSection {
                program: "sh".to_string(),
                base_args: vec![script.to_string_lossy().into_owned(), "build".to_string()],
                termination_grace_ms: 500,
                poll_interval_ms: 10,
            },
        };

        Self {
            _temp_dir: temp_dir,
            root,
            config,
        }
    }

    fn start(&self) -> CompileService {
        CompileService::start(&self.config).unwrap()
    }

    fn invocations(&self) -> Vec<String> {
        fs::read_to_string(self.root.join("invocations"))
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn last_input(&self) -> PathBuf {
        PathBuf::from(
            fs::read_to_string(self.root.join("last-input"))
                .unwrap()
                .trim_end(),
        )
    }

    fn cache_files(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&self.config.cache_dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

fn request(source: &str, target: &str, format: &str) -> JobRequest {
    JobRequest::parse(source, target, format).unwrap()
}

fn wait_for(path: &Path, limit: Duration) {
    let start = Instant::now();
    while !path.exists() {
        assert!(start.elapsed() < limit, "timed out waiting for {}", path.display());
        thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn test_wasm_build_then_cache_hit() {
    let harness = Harness::new();
    let service = harness.start();

    let first = service.submit(request(HELLO, "wasm", "wasm")).wait();
    let path = first.artifact().expect("build should succeed").clone();
    assert!(path.is_file());
    assert!(fs::metadata(&path).unwrap().len() > 0);
    assert_eq!(
        path.file_name().unwrap().to_string_lossy(),
        format!("build-wasm-{}.wasm", compile_lane::SourceDigest::of(HELLO.as_bytes()))
    );

    // The artifact is the script's copy of the input file.
    let contents = fs::read(&path).unwrap();
    assert!(contents.starts_with(lane_worker::LINE_DIRECTIVE));
    assert!(contents.ends_with(HELLO.as_bytes()));

    let second = service.submit(request(HELLO, "wasm", "wasm")).wait();
    assert_eq!(second, JobOutcome::Built(path));
    assert_eq!(harness.invocations().len(), 1, "second request must be a cache hit");

    service.shutdown().unwrap();
}

#[test]
fn test_simulate_and_firmware_invocations() {
    let harness = Harness::new();
    let service = harness.start();

    assert!(service
        .submit(request(HELLO, "arduino-nano33", "wasm"))
        .wait()
        .is_built());
    assert!(service
        .submit(request(HELLO, "arduino-nano33", "hex"))
        .wait()
        .is_built());

    let invocations = harness.invocations();
    assert_eq!(invocations.len(), 2);
    assert!(invocations[0].starts_with("build -o "));
    assert!(invocations[0].contains("-tags arduino_nano33 -no-debug"));
    assert!(invocations[1].contains("-target arduino-nano33"));
    assert!(!invocations[1].contains("-tags"));

    let files = harness.cache_files();
    assert_eq!(files.len(), 2);
    assert!(files.iter().any(|f| f.ends_with(".hex")));
    assert!(files.iter().any(|f| f.ends_with(".wasm")));
}

#[test]
fn test_toolchain_failure_returns_cleaned_diagnostics() {
    let harness = Harness::new();
    let service = harness.start();

    let outcome = service
        .submit(request("package main\nSYNTAX_ERROR\n", "wasm", "wasm"))
        .wait();

    assert_eq!(
        outcome,
        JobOutcome::Failed(b"main.go:2:1: syntax error: unexpected SYNTAX_ERROR\n".to_vec())
    );
    assert!(harness.cache_files().is_empty(), "no entry and no temp output may remain");
    assert!(!harness.last_input().exists(), "input file must be removed");
}

#[test]
fn test_silent_failure_reports_exit_status() {
    let harness = Harness::new();
    let service = harness.start();

    let outcome = service
        .submit(request("SILENT_FAILURE", "pico", "uf2"))
        .wait();

    let diagnostics = String::from_utf8(outcome.diagnostics().unwrap().to_vec()).unwrap();
    assert!(diagnostics.contains('3'), "unexpected diagnostics: {diagnostics}");
    assert!(harness.cache_files().is_empty());
}

#[test]
fn test_precancelled_job_never_spawns_toolchain() {
    let harness = Harness::new();
    let service = harness.start();

    let cancel = CancelToken::new();
    cancel.cancel();
    let outcome = service
        .queue()
        .submit_with_cancel(request(HELLO, "wasm", "wasm"), cancel)
        .wait();

    assert!(outcome.is_aborted());
    assert!(harness.invocations().is_empty());
}

#[test]
fn test_cancel_during_run_kills_toolchain() {
    let harness = Harness::new();
    let service = harness.start();

    let job = request("package main\n// HANG\n", "wasm", "wasm");
    let key_name = job.key().file_name();
    let handle = service.submit(job);

    wait_for(&harness.root.join("started"), Duration::from_secs(10));
    let cancelled_at = Instant::now();
    handle.cancel();
    let outcome = handle.wait();

    assert!(outcome.is_aborted());
    assert!(
        cancelled_at.elapsed() < Duration::from_secs(10),
        "toolchain should be killed, not waited out"
    );
    assert!(!harness.cache_files().contains(&key_name));
    assert!(harness.cache_files().is_empty(), "temp output must be removed");
    assert!(!harness.last_input().exists());

    // The worker is free again.
    assert!(service.submit(request(HELLO, "wasm", "wasm")).wait().is_built());
}

#[test]
fn test_concurrent_identical_requests_compile_once() {
    let harness = Harness::new();
    let service = harness.start();

    let handles: Vec<_> = (0..5)
        .map(|_| {
            let queue = service.queue();
            thread::spawn(move || queue.submit(request(HELLO, "pico", "uf2")).wait())
        })
        .collect();

    let outcomes: Vec<JobOutcome> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(outcomes.iter().all(|o| o == &outcomes[0]));
    assert!(outcomes[0].is_built());
    assert_eq!(harness.invocations().len(), 1);
    assert_eq!(service.stats().cache_hits(), 4);
}

#[test]
fn test_missing_toolchain_reports_spawn_error() {
    let mut harness = Harness::new();
    harness.config.toolchain.program = harness
        .root
        .join("no-such-tinygo")
        .to_string_lossy()
        .into_owned();
    let service = harness.start();

    let outcome = service.submit(request(HELLO, "wasm", "wasm")).wait();
    let diagnostics = String::from_utf8_lossy(outcome.diagnostics().unwrap()).into_owned();
    assert!(diagnostics.starts_with("failed to start"), "got: {diagnostics}");
    assert!(harness.cache_files().is_empty());
}

#[test]
fn test_evict_now_removes_oldest_entries() {
    let mut harness = Harness::new();
    harness.config.cache_budget_bytes = 300;
    let cache_dir = harness.config.cache_dir.clone();
    fs::create_dir_all(&cache_dir).unwrap();

    for (i, name) in ["build-a-1.uf2", "build-b-2.uf2", "build-c-3.uf2", "build-d-4.uf2"]
        .iter()
        .enumerate()
    {
        let path = cache_dir.join(name);
        fs::write(&path, vec![1u8; 100]).unwrap();
        filetime::set_file_mtime(&path, FileTime::from_unix_time(1_700_000_000 + i as i64, 0))
            .unwrap();
    }

    let report = evict_now(&harness.config).unwrap();
    assert_eq!(report.deleted, vec!["build-a-1.uf2".to_string()]);
    assert_eq!(report.total_after, 300);
    assert_eq!(
        harness.cache_files(),
        vec!["build-b-2.uf2", "build-c-3.uf2", "build-d-4.uf2"]
    );
}

#[test]
fn test_worker_eviction_runs_after_delivery() {
    let mut harness = Harness::new();
    harness.config.cache_budget_bytes = 1;
    harness.config.evict_every = 1;
    let service = harness.start();

    let outcome = service.submit(request(HELLO, "wasm", "wasm")).wait();
    assert!(outcome.is_built());
    service.shutdown().unwrap();

    // The only entry exceeds the budget on its own, so the pass removes it.
    assert!(harness.cache_files().is_empty());
}

#[test]
fn test_relative_cache_dir_builds() {
    let mut harness = Harness::new();
    let base = tempfile::Builder::new()
        .prefix("rel-cache-")
        .tempdir_in(".")
        .unwrap();
    let relative = PathBuf::from(base.path().file_name().unwrap()).join("cache");
    harness.config.cache_dir = relative.clone();
    let service = harness.start();

    let outcome = service.submit(request(HELLO, "wasm", "wasm")).wait();
    let path = outcome.artifact().expect("build should succeed").clone();
    assert!(path.is_absolute());
    assert!(path.is_file());
    assert_eq!(path.parent().unwrap(), fs::canonicalize(&relative).unwrap());

    // Still a hit through the same relative configuration.
    assert_eq!(
        service.submit(request(HELLO, "wasm", "wasm")).wait(),
        JobOutcome::Built(path)
    );
    assert_eq!(harness.invocations().len(), 1);
}

#[test]
fn test_abandoned_request_is_not_compiled() {
    let harness = Harness::new();
    let service = harness.start();

    let hanging = service.submit(request("package main\n// HANG\n", "wasm", "wasm"));
    wait_for(&harness.root.join("started"), Duration::from_secs(10));

    let abandoned = service.submit(request(HELLO, "pico", "uf2"));
    assert!(abandoned.wait_timeout(Duration::from_millis(50)).is_none());
    drop(abandoned);

    hanging.cancel();
    assert!(hanging.wait().is_aborted());
    service.shutdown().unwrap();

    assert_eq!(harness.invocations().len(), 1);
    assert!(harness.cache_files().is_empty());
}

#![cfg(not(windows))]
use assert_cmd::Command;
use predicates::str::contains;
use std::fs;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::process::Stdio;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::tempdir;

fn ctxd(home: &Path) -> Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("ctxd");
    cmd.current_dir(home)
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env("CTX_CONFIG_PATH", home.join("missing-ctx.toml"))
        .env_remove("CTX_PROJECT_ID")
        .env_remove("CTX_LOG_DIR")
        .env_remove("CTX_REPO_ROOT")
        .env_remove("CTX_STORE_URL")
        .env_remove("RUST_LOG");
    cmd
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names = fs::read_dir(dir)
        .map(|d| {
            d.filter_map(|e| e.ok())
                .filter_map(|e| e.file_name().to_str().map(str::to_string))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    names.sort();
    names
}

#[test]
fn watch_fails_when_log_dir_is_missing() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path();

    ctxd(home)
        .args(["watch", "--project", "p1", "--once", "--skip-verify"])
        .arg("--logs")
        .arg(home.join("no-such-logs"))
        .arg("--repo")
        .arg(home.join("repo"))
        .assert()
        .code(1)
        .stderr(contains("log directory does not exist"));

    assert!(!home.join("repo/thoughts/ledgers").exists());
}

#[test]
fn watch_requires_project_id() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path();
    let logs = home.join("logs");
    fs::create_dir_all(&logs).expect("mkdir logs");

    ctxd(home)
        .args(["watch", "--once", "--skip-verify"])
        .arg("--logs")
        .arg(&logs)
        .assert()
        .code(2)
        .stdout(contains("project id required"));
}

#[test]
fn watch_once_writes_ledger_and_handoffs_when_store_is_down() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path();
    let logs = home.join("logs");
    let repo = home.join("repo");
    fs::create_dir_all(&logs).expect("mkdir logs");

    let filler = "lorem ipsum ".repeat(40);
    fs::write(
        logs.join("session.log"),
        format!(
            "User: set up storage\nAssistant: We decided to use sqlite. TODO: add migrations.\n{filler}\n"
        ),
    )
    .expect("write log");
    fs::write(logs.join("notes.txt"), "Assistant: Going with postgres.").expect("write notes");

    ctxd(home)
        .args(["watch", "--project", "p1", "--once", "--skip-verify"])
        .args(["--store-url", "http://127.0.0.1:9", "--threshold", "100"])
        .arg("--logs")
        .arg(&logs)
        .arg("--repo")
        .arg(&repo)
        .assert()
        .success()
        .stdout(contains("swept_files=1"))
        .stdout(contains("facts.extracted=2"))
        .stdout(contains("facts.push_failures=2"))
        .stdout(contains("handoffs=2"))
        .stdout(contains("final_handoff="));

    let ledgers = files_in(&repo.join("thoughts/ledgers"));
    assert_eq!(ledgers.len(), 1);
    assert!(ledgers[0].starts_with("CONTINUITY_") && ledgers[0].ends_with(".jsonl"));

    let raw = fs::read_to_string(repo.join("thoughts/ledgers").join(&ledgers[0])).expect("read");
    let entry: serde_json::Value =
        serde_json::from_str(raw.lines().next().expect("one line")).expect("json");
    assert_eq!(entry["project_id"], "p1");
    assert_eq!(entry["decisions"][0], "We decided to use sqlite");
    assert_eq!(entry["next_steps"][0], "TODO: add migrations");

    let handoffs = files_in(&repo.join("thoughts/shared/handoffs"));
    assert_eq!(handoffs.len(), 2);
    let body = fs::read_to_string(repo.join("thoughts/shared/handoffs").join(&handoffs[0]))
        .expect("read handoff");
    assert!(body.contains("# Session Handoff"));
    assert!(body.contains("**Project**: p1"));
    assert!(body.contains("- [ ] TODO: add migrations"));
}

#[test]
fn watch_once_basic_mode_skips_ledger() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path();
    let logs = home.join("logs");
    let repo = home.join("repo");
    fs::create_dir_all(&logs).expect("mkdir logs");
    fs::write(logs.join("a.log"), "Assistant: We will use tokio.").expect("write log");

    ctxd(home)
        .args(["--json", "watch", "--project", "p1", "--once", "--skip-verify"])
        .args(["--store-url", "http://127.0.0.1:9", "--no-smart"])
        .arg("--logs")
        .arg(&logs)
        .arg("--repo")
        .arg(&repo)
        .assert()
        .success()
        .stdout(contains("\"command\": \"watch\""))
        .stdout(contains("handoffs=0"));

    assert!(!repo.join("thoughts/ledgers").exists());
}

#[test]
fn watch_fails_when_project_cannot_be_verified() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path();
    let logs = home.join("logs");
    fs::create_dir_all(&logs).expect("mkdir logs");

    ctxd(home)
        .args(["watch", "--project", "p1", "--once"])
        .args(["--store-url", "http://127.0.0.1:9"])
        .arg("--logs")
        .arg(&logs)
        .arg("--repo")
        .arg(home.join("repo"))
        .assert()
        .code(1)
        .stderr(contains("error:"));
}

#[test]
fn watch_daemon_writes_final_handoff_on_sigterm() {
    let tmp = tempdir().expect("tempdir");
    let home = tmp.path();
    let logs = home.join("logs");
    let repo = home.join("repo");
    fs::create_dir_all(&logs).expect("mkdir logs");
    fs::write(
        logs.join("session.log"),
        "User: pick a queue\nAssistant: We decided to use redis streams. TODO: add consumer groups.\n",
    )
    .expect("write log");

    let mut child = std::process::Command::new(env!("CARGO_BIN_EXE_ctxd"))
        .current_dir(home)
        .env("HOME", home)
        .env("XDG_CONFIG_HOME", home.join(".config"))
        .env("CTX_CONFIG_PATH", home.join("missing-ctx.toml"))
        .env_remove("CTX_PROJECT_ID")
        .env_remove("CTX_LOG_DIR")
        .env_remove("CTX_REPO_ROOT")
        .env_remove("CTX_STORE_URL")
        .env_remove("RUST_LOG")
        .args(["watch", "--project", "p1", "--skip-verify"])
        .args(["--store-url", "http://127.0.0.1:9"])
        .arg("--logs")
        .arg(&logs)
        .arg("--repo")
        .arg(&repo)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn ctxd watch");

    // The shutdown handler is installed right before the "watching" log line.
    let stderr = child.stderr.take().expect("stderr pipe");
    let (line_tx, line_rx) = mpsc::channel::<String>();
    thread::spawn(move || {
        for line in BufReader::new(stderr).lines().map_while(Result::ok) {
            let _ = line_tx.send(line);
        }
    });
    let deadline = Instant::now() + Duration::from_secs(20);
    let mut ready = false;
    while Instant::now() < deadline {
        match line_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(line) if line.contains("watching ") => {
                ready = true;
                break;
            }
            Ok(_) | Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    if !ready {
        let _ = child.kill();
    }
    assert!(ready, "daemon never reached the watch loop");

    let status = std::process::Command::new("kill")
        .args(["-TERM", &child.id().to_string()])
        .status()
        .expect("send SIGTERM");
    assert!(status.success());

    let mut exit = None;
    for _ in 0..100 {
        if let Some(code) = child.try_wait().expect("try_wait") {
            exit = Some(code);
            break;
        }
        thread::sleep(Duration::from_millis(100));
    }
    if exit.is_none() {
        let _ = child.kill();
    }
    let exit = exit.expect("daemon did not stop after SIGTERM");
    assert!(exit.success(), "unexpected exit: {exit:?}");

    let mut stdout = String::new();
    if let Some(mut out) = child.stdout.take() {
        std::io::Read::read_to_string(&mut out, &mut stdout).expect("read stdout");
    }
    assert!(stdout.contains("final_handoff="), "{stdout}");

    let handoffs = files_in(&repo.join("thoughts/shared/handoffs"));
    assert_eq!(handoffs.len(), 1, "{handoffs:?}");
    let body = fs::read_to_string(repo.join("thoughts/shared/handoffs").join(&handoffs[0]))
        .expect("read handoff");
    assert!(body.contains("- [ ] TODO: add consumer groups"));
}

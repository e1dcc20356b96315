//! End-to-end tests driving the `trigrep` binary over its framed stdio
//! protocol, the way a tool-calling client does.

use serde_json::{json, Value};
use std::fs;
use std::io::BufReader;
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use trigrep::server::{read_message, write_message};

const APP_JS: &str = "function myFunction() { return true; }";

/// How long to wait for a filesystem change to reach the index
const FOLD_TIMEOUT: Duration = Duration::from_secs(10);

struct Session {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl Session {
    /// Spawn the daemon on `root`; returns the session and its first message
    fn start(root: &Path) -> (Self, Value) {
        let mut child = Command::new(env!("CARGO_BIN_EXE_trigrep"))
            .arg(root)
            .args(["--debounce-ms", "50"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("Failed to spawn trigrep");
        let stdin = child.stdin.take().unwrap();
        let stdout = BufReader::new(child.stdout.take().unwrap());
        let mut session = Session {
            child,
            stdin,
            stdout,
        };
        let first = session.receive();
        (session, first)
    }

    fn receive(&mut self) -> Value {
        let body = read_message(&mut self.stdout)
            .expect("Failed to read response")
            .expect("Daemon closed its output");
        serde_json::from_slice(&body).expect("Response is not JSON")
    }

    fn request(&mut self, request: Value) -> Value {
        write_message(&mut self.stdin, &request).expect("Failed to send request");
        self.receive()
    }

    fn search(&mut self, pattern: &str) -> Value {
        self.request(json!({"command": "search", "pattern": pattern, "max_results": 10}))
    }

    /// Repeat a search until `total_matches` equals `expected` or time runs out
    fn search_until(&mut self, pattern: &str, expected: u64) -> Value {
        let deadline = Instant::now() + FOLD_TIMEOUT;
        loop {
            let response = self.search(pattern);
            if response["total_matches"] == expected || Instant::now() >= deadline {
                return response;
            }
            thread::sleep(Duration::from_millis(50));
        }
    }

    fn shutdown(mut self) {
        let response = self.request(json!({"command": "shutdown"}));
        assert_eq!(response, json!({"status": "shutdown"}));
        let status = self.child.wait().unwrap();
        assert!(status.success());
    }
}

fn project() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(dir.path().join("src/app.js"), APP_JS).unwrap();
    dir
}

fn change(file: &str, search: &str, replace: &str) -> Value {
    json!({
        "command": "apply_changes",
        "changes": format!("```\n{file}\n<<<<<<< SEARCH\n{search}\n=======\n{replace}\n>>>>>>> REPLACE\n```"),
    })
}

fn assert_single_app_match(response: &Value) {
    assert_eq!(response["status"], "success");
    assert_eq!(response["total_matches"], 1);
    assert_eq!(response["returned_matches"], 1);
    let files = response["matches"].as_array().unwrap();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0]["file"], "src/app.js");
    let hit = &files[0]["matches"][0];
    assert_eq!(hit["start"], 9);
    assert_eq!(hit["end"], 19);
    assert_eq!(hit["line"], 1);
}

#[test]
fn test_initialized_announcement() {
    let dir = project();
    let (session, first) = Session::start(dir.path());
    assert_eq!(first["status"], "initialized");
    assert_eq!(first["files_indexed"], 1);
    let canonical = dir.path().canonicalize().unwrap();
    assert_eq!(first["project_path"], &*canonical.to_string_lossy());
    session.shutdown();
}

#[test]
fn test_literal_search() {
    let dir = project();
    let (mut session, _) = Session::start(dir.path());
    assert_single_app_match(&session.search("myFunction"));
    session.shutdown();
}

#[test]
fn test_raw_regex_search() {
    let dir = project();
    let (mut session, _) = Session::start(dir.path());
    assert_single_app_match(&session.search("r:my.*tion"));

    // Without the prefix the metacharacters are literal
    assert_eq!(session.search("my.*tion")["total_matches"], 0);
    session.shutdown();
}

#[test]
fn test_apply_then_search() {
    let dir = project();
    let (mut session, _) = Session::start(dir.path());

    let response = session.request(change("src/app.js", "return true;", "return false;"));
    assert_eq!(
        response,
        json!({"status": "success", "message": "Changes applied successfully"})
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("src/app.js")).unwrap(),
        "function myFunction() { return false; }"
    );

    assert_eq!(session.search_until("return false;", 1)["total_matches"], 1);
    assert_eq!(session.search("return true;")["total_matches"], 0);
    session.shutdown();
}

#[test]
fn test_ambiguous_change_leaves_file_untouched() {
    let dir = project();
    let content = "let a = 1;\nlet a = 1;\n";
    fs::write(dir.path().join("src/dup.js"), content).unwrap();
    let (mut session, _) = Session::start(dir.path());

    // The first group is valid; the second must veto the whole request
    let request = json!({
        "command": "apply_changes",
        "changes": "```\nsrc/app.js\n<<<<<<< SEARCH\nreturn true;\n=======\nreturn 1;\n>>>>>>> REPLACE\n```\n\
                    ```\nsrc/dup.js\n<<<<<<< SEARCH\nlet a = 1;\n=======\nlet a = 2;\n>>>>>>> REPLACE\n```",
    });
    let response = session.request(request);
    assert!(response["error"].as_str().unwrap().contains("src/dup.js"));
    assert_eq!(fs::read_to_string(dir.path().join("src/dup.js")).unwrap(), content);
    assert_eq!(fs::read_to_string(dir.path().join("src/app.js")).unwrap(), APP_JS);
    session.shutdown();
}

#[test]
fn test_deleted_file_disappears_from_results() {
    let dir = project();
    fs::write(dir.path().join("src/gone.js"), "const onlyInGone = 1;\n").unwrap();
    let (mut session, _) = Session::start(dir.path());
    assert_eq!(session.search("onlyInGone")["total_matches"], 1);

    fs::remove_file(dir.path().join("src/gone.js")).unwrap();
    assert_eq!(session.search_until("onlyInGone", 0)["total_matches"], 0);
    session.shutdown();
}

#[test]
fn test_new_file_becomes_searchable() {
    let dir = project();
    let (mut session, _) = Session::start(dir.path());
    fs::write(dir.path().join("src/fresh.js"), "export const freshValue = 7;\n").unwrap();
    assert_eq!(session.search_until("freshValue", 1)["total_matches"], 1);
    session.shutdown();
}

#[test]
fn test_errors_keep_session_open() {
    let dir = project();
    let (mut session, _) = Session::start(dir.path());

    assert_eq!(session.request(json!({"pattern": "x"})), json!({"error": "Missing command"}));
    assert_eq!(
        session.request(json!({"command": "reindex"})),
        json!({"error": "Unknown command: reindex"})
    );
    assert!(session.search("r:(unclosed")["error"].is_string());
    assert!(
        session
            .request(json!({"command": "search", "pattern": "x", "max_results": 0}))["error"]
            .is_string()
    );
    assert!(session.request(change("../outside.txt", "", "x"))["error"].is_string());

    // Still serving
    assert_single_app_match(&session.search("myFunction"));
    session.shutdown();
}

#[test]
fn test_end_of_input_exits_cleanly() {
    let dir = project();
    let (session, _) = Session::start(dir.path());
    let Session {
        mut child, stdin, ..
    } = session;
    drop(stdin);
    assert!(child.wait().unwrap().success());
}

#[test]
fn test_invalid_project_path() {
    let dir = TempDir::new().unwrap();
    let output = Command::new(env!("CARGO_BIN_EXE_trigrep"))
        .arg(dir.path().join("missing"))
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let mut reader = BufReader::new(output.stdout.as_slice());
    let body = read_message(&mut reader).unwrap().unwrap();
    let response: Value = serde_json::from_slice(&body).unwrap();
    assert!(response["error"].as_str().unwrap().contains("Invalid directory"));
}

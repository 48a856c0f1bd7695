// Integration test: a whole owning instance behind its socket.
//
// Editors are stand-in `sleep` processes; the window host is headless.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use kzrnote_common::protocol::jsonrpc::{Request, RequestId, Response};
use kzrnote_daemon::config::Settings;
use kzrnote_daemon::editor::launcher::EditorLauncher;
use kzrnote_daemon::instance::{self, Claim};
use kzrnote_daemon::paths::AppPaths;
use kzrnote_daemon::runtime::{run_owner, Invocation};
use kzrnote_daemon::shell::HeadlessHost;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

struct SleepLauncher;

impl EditorLauncher for SleepLauncher {
    fn spawn_command(&self, _server_id: &str, _: Option<u64>, _: Option<&Path>) -> Command {
        let mut command = Command::new("sleep");
        command.arg("600");
        command
    }

    fn remote_open_command(&self, _server_id: &str, _path: &Path) -> Command {
        Command::new("true")
    }

    fn server_list_command(&self) -> Command {
        Command::new("true")
    }
}

struct Owner {
    _tmp: TempDir,
    paths: AppPaths,
    task: JoinHandle<anyhow::Result<()>>,
}

/// Start an owner under a fresh temp root. `None` when sockets are not
/// permitted here.
async fn start_owner(seed_notes: &[&str]) -> Option<Owner> {
    let tmp = TempDir::new().unwrap();
    let paths = AppPaths::under(tmp.path());
    paths.ensure_runtime_dir().unwrap();
    paths.ensure_data_dirs().unwrap();
    for (index, text) in seed_notes.iter().enumerate() {
        let name = format!("00000000-0000-4000-8000-{index:012}.note");
        fs::write(paths.notes_dir.join(name), text).unwrap();
    }

    // Check socket permissions the way the socket tests do.
    let scratch = tmp.path().join("scratch.sock");
    match std::os::unix::net::UnixListener::bind(&scratch) {
        Ok(_) => {
            let _ = fs::remove_file(&scratch);
        }
        Err(error) if error.kind() == io::ErrorKind::PermissionDenied => {
            eprintln!("skipping unix socket test: bind is not permitted in this environment");
            return None;
        }
        Err(error) => panic!("failed to bind unix socket: {error}"),
    }

    let Claim::Owner(lock) = instance::try_claim(&paths.lock_path).unwrap() else {
        panic!("fresh lock should be free");
    };
    let mut settings = Settings::default();
    settings.preload.slots = 0;

    let task = tokio::spawn(run_owner(
        paths.clone(),
        lock,
        settings,
        Arc::new(SleepLauncher),
        Box::new(HeadlessHost::default()),
        Invocation { argv: vec!["--no-show".to_string()], ..Invocation::default() },
    ));
    Some(Owner { _tmp: tmp, paths, task })
}

impl Owner {
    async fn call(&self, method: &str, params: Option<Value>) -> Response {
        let stream = connect(&self.paths.socket_path).await;
        let (read_half, mut write_half) = stream.into_split();
        let mut encoded =
            serde_json::to_vec(&Request::new(method, params, RequestId::Number(1))).unwrap();
        encoded.push(b'\n');
        write_half.write_all(&encoded).await.unwrap();

        let mut reader = BufReader::new(read_half);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        serde_json::from_str(&line).expect("response should decode")
    }

    async fn result(&self, method: &str, params: Option<Value>) -> Value {
        let response = self.call(method, params).await;
        assert!(response.error.is_none(), "{method} failed: {response:?}");
        response.result.expect("result should be present")
    }

    async fn quit(self) -> TempDir {
        assert_eq!(self.result("app.quit", None).await, json!({ "ok": true }));
        timeout(Duration::from_secs(10), self.task)
            .await
            .expect("owner should stop")
            .expect("owner task should not panic")
            .expect("owner should exit cleanly");
        assert!(!self.paths.socket_path.exists(), "socket should be removed on exit");
        self._tmp
    }

    async fn wait_for(&self, method: &str, params: Value, mut done: impl FnMut(&Value) -> bool) {
        for _ in 0..100 {
            if done(&self.result(method, Some(params.clone())).await) {
                return;
            }
            sleep(Duration::from_millis(50)).await;
        }
        panic!("{method} never reached the expected state");
    }
}

async fn connect(socket_path: &Path) -> UnixStream {
    for _ in 0..100 {
        if let Ok(stream) = UnixStream::connect(socket_path).await {
            return stream;
        }
        sleep(Duration::from_millis(20)).await;
    }
    panic!("owner never started listening");
}

#[tokio::test]
async fn create_title_set_contents_delete() {
    let Some(owner) = start_owner(&["Existing note"]).await else { return };

    let uri = owner.result("note.create", None).await;
    let by_uri = json!({ "uri": uri });
    assert_eq!(owner.result("note.title", Some(by_uri.clone())).await, "Empty Note");

    let set = owner
        .result("note.set_contents", Some(json!({ "uri": uri, "contents": "Hello\nworld" })))
        .await;
    assert_eq!(set, true);
    assert_eq!(owner.result("note.title", Some(by_uri.clone())).await, "Hello");
    assert_eq!(owner.result("note.find", Some(json!({ "title": "Hello" }))).await, uri);

    let listed = owner.result("note.list", None).await;
    assert_eq!(listed.as_array().unwrap().first(), Some(&uri), "newest note lists first");

    assert_eq!(owner.result("note.delete", Some(by_uri.clone())).await, true);
    assert_eq!(owner.result("note.exists", Some(by_uri.clone())).await, false);
    assert_eq!(owner.result("note.title", Some(by_uri)).await, "");

    let attic = owner.paths.attic_dir.clone();
    assert_eq!(fs::read_dir(&attic).unwrap().count(), 1);

    owner.quit().await;
}

#[tokio::test]
async fn bad_uri_is_an_error_but_missing_note_is_not() {
    let Some(owner) = start_owner(&["Existing note"]).await else { return };

    let bad = owner.call("note.exists", Some(json!({ "uri": "note://elsewhere/x" }))).await;
    assert_eq!(bad.error.expect("bad uri should fail").code, -32010);

    let missing = json!({ "uri": "note://kzrnote/ffffffff-0000-4000-8000-000000000000" });
    assert_eq!(owner.result("note.exists", Some(missing.clone())).await, false);
    assert_eq!(owner.result("note.change_date", Some(missing)).await, 0);

    owner.quit().await;
}

#[tokio::test]
async fn first_run_seeds_welcome_notes() {
    let Some(owner) = start_owner(&[]).await else { return };
    let listed = owner.result("note.list", None).await;
    assert_eq!(listed.as_array().unwrap().len(), 2);
    owner.quit().await;
}

#[tokio::test]
async fn second_instance_forwards_its_command_line() {
    let Some(owner) = start_owner(&["Existing note"]).await else { return };
    assert!(matches!(instance::try_claim(&owner.paths.lock_path).unwrap(), Claim::Taken));

    let uri = owner.result("note.create_named", Some(json!({ "title": "Forwarded" }))).await;
    let uri = uri.as_str().unwrap().to_string();

    // Exit code 0 path.
    let output = instance::forward_commandline(&owner.paths.socket_path, &[uri], "", "x_TIME7")
        .await
        .expect("forwarding a note uri should succeed");
    assert!(output.is_empty());

    // Exit code 1 path.
    let error = instance::forward_commandline(
        &owner.paths.socket_path,
        &["note://elsewhere/abc".to_string()],
        "",
        "",
    )
    .await
    .expect_err("foreign uri should be rejected");
    assert!(error.to_string().contains("Invalid argument"), "{error}");

    let lock_path = owner.paths.lock_path.clone();
    let _keep = owner.quit().await;
    assert!(matches!(instance::try_claim(&lock_path).unwrap(), Claim::Owner(_)));
}

#[tokio::test]
async fn external_writes_are_picked_up() {
    let Some(owner) = start_owner(&["Existing note"]).await else { return };

    let id = "0b7f4f36-6a4f-4d3c-9a53-1f1d1b1c1d1e";
    let uri = format!("note://kzrnote/{id}");
    let path = owner.paths.notes_dir.join(format!("{id}.note"));
    fs::write(&path, "Written elsewhere\n").unwrap();

    owner.wait_for("note.title", json!({ "uri": uri }), |title| title == "Written elsewhere").await;
    owner
        .wait_for("note.find", json!({ "title": "Written elsewhere" }), |found| found == &json!(uri))
        .await;

    fs::remove_file(&path).unwrap();
    owner
        .wait_for("note.find", json!({ "title": "Written elsewhere" }), |found| found == "")
        .await;

    owner.quit().await;
}

#[tokio::test]
async fn search_and_version() {
    let Some(owner) = start_owner(&["Groceries\nmilk and eggs", "Work\nnothing here"]).await
    else {
        return;
    };

    let found = owner.result("note.search", Some(json!({ "query": "MILK" }))).await;
    assert_eq!(found, json!(["note://kzrnote/00000000-0000-4000-8000-000000000000"]));
    let exact =
        owner.result("note.search", Some(json!({ "query": "MILK", "case_sensitive": true }))).await;
    assert_eq!(exact, json!([]));

    let version = owner.result("app.version", None).await;
    assert!(version.as_str().unwrap().starts_with("kzrnote "));

    owner.quit().await;
}

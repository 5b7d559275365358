use std::io::Write;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Output, Stdio};
use std::sync::mpsc;
use std::time::Duration;
use tempfile::TempDir;

fn lowe_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("lowe");
    path
}

/// Start `lowe` in `dir` with `stdin` piped in and a scrubbed environment.
fn spawn_lowe(dir: &Path, args: &[&str], stdin: &str) -> Child {
    let mut child = Command::new(lowe_binary())
        .args(args)
        .current_dir(dir)
        .env_remove("MODEL_NAME")
        .env_remove("MODEL_PROVIDER")
        .env_remove("KNOWLEDGE_BASE_URL")
        .env_remove("INDEX_PATH")
        .env_remove("CHROMA_DB_PATH")
        .env("LOWE_LOG", "off")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to start lowe");

    child
        .stdin
        .take()
        .unwrap()
        .write_all(stdin.as_bytes())
        .unwrap();
    child
}

fn run_lowe(dir: &Path, args: &[&str], stdin: &str) -> Output {
    spawn_lowe(dir, args, stdin).wait_with_output().unwrap()
}

/// A local server that accepts connections and never answers. Returns its
/// base URL and a channel that fires on the first accepted connection.
fn silent_server() -> (String, mpsc::Receiver<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut held = Vec::new();
        for stream in listener.incoming().flatten() {
            held.push(stream);
            let _ = tx.send(());
        }
    });
    (url, rx)
}

/// Wait until `lowe` is blocked on the silent server, then send SIGINT.
#[cfg(unix)]
fn interrupt_when_connected(child: Child, connected: mpsc::Receiver<()>) -> Output {
    connected
        .recv_timeout(Duration::from_secs(30))
        .expect("lowe never reached the server");
    std::thread::sleep(Duration::from_millis(300));
    let status = Command::new("kill")
        .args(["-INT", &child.id().to_string()])
        .status()
        .unwrap();
    assert!(status.success());
    child.wait_with_output().unwrap()
}

fn stdout_of(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn exit_keyword_says_goodbye_once() {
    let tmp = TempDir::new().unwrap();
    let output = run_lowe(tmp.path(), &[], "exit\n\n");

    assert!(output.status.success());
    let stdout = stdout_of(&output);
    assert!(stdout.contains("Welcome to LoweCLI!"));
    assert_eq!(stdout.matches("bye bye 💥").count(), 1);
}

#[test]
fn end_of_input_says_goodbye_once() {
    let tmp = TempDir::new().unwrap();
    let output = run_lowe(tmp.path(), &[], "");

    assert!(output.status.success());
    assert_eq!(stdout_of(&output).matches("bye bye 💥").count(), 1);
}

#[test]
fn interactive_session_does_not_create_index() {
    let tmp = TempDir::new().unwrap();
    run_lowe(tmp.path(), &[], "quit\n\n");
    assert!(!tmp.path().join("lowe_index").exists());
}

#[test]
fn empty_one_shot_question_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let output = run_lowe(tmp.path(), &["--docs", "  "], "");

    assert!(!output.status.success());
    assert!(stdout_of(&output).contains("Please enter a valid question for help."));
}

#[test]
fn invalid_config_fails_fast() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("lowe.toml");
    std::fs::write(&config, "[chunking]\nmax_chunk_size = 1\n").unwrap();

    let output = run_lowe(tmp.path(), &["--config", config.to_str().unwrap()], "");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("max_chunk_size"));
}

#[test]
fn one_shot_flags_are_exclusive() {
    let tmp = TempDir::new().unwrap();
    let output = run_lowe(tmp.path(), &["-d", "a", "-l", "b"], "");
    assert!(!output.status.success());
}

#[test]
fn help_lists_flags() {
    let tmp = TempDir::new().unwrap();
    let output = run_lowe(tmp.path(), &["--help"], "");
    let stdout = stdout_of(&output);
    for flag in ["--docs", "--perform", "--lookup", "--config", "--reindex"] {
        assert!(stdout.contains(flag), "missing {} in help", flag);
    }
}

#[cfg(unix)]
#[test]
fn interrupt_during_one_shot_lookup_says_goodbye() {
    let tmp = TempDir::new().unwrap();
    let (url, connected) = silent_server();
    let config = tmp.path().join("lowe.toml");
    std::fs::write(&config, format!("[knowledge_base]\nurl = \"{}/kb.json\"\n", url)).unwrap();

    let child = spawn_lowe(tmp.path(), &["-l", "q"], "");
    let output = interrupt_when_connected(child, connected);

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(stdout_of(&output).matches("bye bye 💥").count(), 1);
    assert!(!tmp.path().join("lowe_index/lowe_collection.indexed").exists());
}

#[cfg(unix)]
#[test]
fn interrupt_during_conversation_says_goodbye() {
    let tmp = TempDir::new().unwrap();
    let (url, connected) = silent_server();
    let config = tmp.path().join("lowe.toml");
    std::fs::write(
        &config,
        format!("[model]\nprovider = \"ollama\"\nname = \"llama3\"\nbase_url = \"{}\"\n", url),
    )
    .unwrap();

    let child = spawn_lowe(tmp.path(), &[], "hello\n\n");
    let output = interrupt_when_connected(child, connected);

    assert_eq!(output.status.code(), Some(0));
    let stdout = stdout_of(&output);
    assert!(stdout.contains("Welcome to LoweCLI!"));
    assert_eq!(stdout.matches("bye bye 💥").count(), 1);
}

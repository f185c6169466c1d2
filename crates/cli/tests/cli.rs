//! Tests that drive the `parley` binary.

use std::path::Path;
use std::process::{Command, Output};

fn parley(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_parley"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env_remove("RUST_LOG")
        .env_remove("PARLEY_MODEL")
        .env_remove("PARLEY_MAX_CONTEXT_TOKENS")
        .output()
        .expect("failed to run parley")
}

fn write(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn stdout_json(output: &Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "parley failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn config_default_prints_template() {
    let dir = tempfile::tempdir().unwrap();
    let output = parley(&dir.path().join("missing.toml"), &["config", "--default"]);
    assert!(output.status.success());
    let text = String::from_utf8(output.stdout).unwrap();
    assert!(text.contains("max_context_tokens = 4000"));
    assert!(text.contains("[inference]"));
}

#[test]
fn config_hides_api_key() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(
        dir.path(),
        "config.toml",
        "[inference]\napi_key = \"sk-very-secret\"\n\n[context]\nmax_context_tokens = 900\n",
    );
    let output = parley(&config, &["config"]);
    assert!(output.status.success());
    let text = String::from_utf8(output.stdout).unwrap();
    assert!(!text.contains("sk-very-secret"));
    assert!(text.contains("max_context_tokens = 900"));
}

#[test]
fn invalid_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = write(dir.path(), "config.toml", "[context]\nretrieval_top_k = 0\n");
    let output = parley(&config, &["config"]);
    assert!(!output.status.success());
}

#[test]
fn chunk_splits_paragraphs() {
    let dir = tempfile::tempdir().unwrap();
    let doc = write(
        dir.path(),
        "doc.txt",
        "First paragraph about sqlite.\n\nSecond paragraph about tokio.",
    );
    let output = parley(
        &dir.path().join("missing.toml"),
        &["chunk", "--document-id", "notes", "--target", "8"],
    );
    // The file argument is required.
    assert!(!output.status.success());

    let output = parley(
        &dir.path().join("missing.toml"),
        &["chunk", "--document-id", "notes", "--target", "8", doc.to_str().unwrap()],
    );
    let chunks = stdout_json(&output);
    let chunks = chunks.as_array().unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0]["source_document_id"], "notes");
    assert_eq!(chunks[0]["chunk_index"], 0);
    assert_eq!(chunks[1]["chunk_index"], 1);
    assert_eq!(chunks[1]["text"], "Second paragraph about tokio.");
}

#[test]
fn chunk_index_then_assemble_from_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("chunks.db");
    let config = write(
        dir.path(),
        "config.toml",
        &format!("[index]\nbackend = \"sqlite\"\npath = {:?}\n", db.to_str().unwrap()),
    );
    let doc = write(
        dir.path(),
        "doc.txt",
        "Tokio is an async runtime.\n\nSQLite stores rows in pages.",
    );
    let output = parley(
        &config,
        &[
            "chunk",
            "--document-id",
            "guide",
            "--target",
            "8",
            "--index",
            doc.to_str().unwrap(),
        ],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert!(db.exists());

    let request = write(
        dir.path(),
        "request.json",
        r#"{"mode": "grounded", "user_text": "how does sqlite store rows", "document_ids": ["guide"]}"#,
    );
    let prompt = stdout_json(&parley(&config, &["assemble", "--request", request.to_str().unwrap()]));
    assert_eq!(prompt["included_chunk_ids"][0]["document_id"], "guide");
    assert_eq!(prompt["included_chunk_ids"][0]["chunk_index"], 1);
    let system = prompt["turns"][0]["text"].as_str().unwrap();
    assert!(system.contains("[Source: guide#1]"));
}

#[test]
fn assemble_open_request() {
    let dir = tempfile::tempdir().unwrap();
    let request = write(
        dir.path(),
        "request.json",
        r#"{
            "conversation_id": "c-1",
            "history": [
                {"role": "user", "text": "hello there", "sequence_number": 1},
                {"role": "assistant", "text": "hi, how can I help?", "sequence_number": 2}
            ],
            "user_text": "tell me more",
            "budget": {"max_context_tokens": 100}
        }"#,
    );
    let prompt = stdout_json(&parley(
        &dir.path().join("missing.toml"),
        &["assemble", "--request", request.to_str().unwrap()],
    ));
    let turns = prompt["turns"].as_array().unwrap();
    assert_eq!(turns.len(), 3);
    assert_eq!(turns[2]["role"], "user");
    assert_eq!(turns[2]["sequence_number"], 3);
    assert_eq!(prompt["metadata"]["budget"], 100);
}

#[test]
fn assemble_rejects_oversized_user_turn() {
    let dir = tempfile::tempdir().unwrap();
    let request = write(
        dir.path(),
        "request.json",
        &format!(
            r#"{{"user_text": "{}", "budget": {{"max_context_tokens": 10}}}}"#,
            "x".repeat(200)
        ),
    );
    let output = parley(
        &dir.path().join("missing.toml"),
        &["assemble", "--request", request.to_str().unwrap()],
    );
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Context too long even after truncation"));
}

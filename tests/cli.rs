use std::{
    path::{Path, PathBuf},
    process::{Command, Output},
};

fn archindex_bin() -> PathBuf {
    if let Some(bin) = option_env!("CARGO_BIN_EXE_archindex") {
        return PathBuf::from(bin);
    }

    let mut path = std::env::current_exe().unwrap();
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.push("archindex");

    if cfg!(windows) {
        path.set_extension("exe");
    }

    path
}

fn run(data_dir: &Path, args: &[&str]) -> Output {
    Command::new(archindex_bin())
        .arg("--data-dir")
        .arg(data_dir)
        .arg("-q")
        .args(args)
        .env_remove("ARCHINDEX_LOG")
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8(output.stdout.clone()).unwrap()
}

#[test]
fn ingest_show_and_descendants() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");
    let batches = tmp.path().join("batches");
    std::fs::create_dir_all(&batches).unwrap();

    std::fs::write(
        batches.join("01.json"),
        r#"{"collections": [{"id": "A"}, {"id": "B", "parent": "A"}]}"#,
    )
    .unwrap();
    std::fs::write(
        batches.join("02.json"),
        r#"{"units": [{"id": "U1", "title": "Deeds", "collections": ["B"]}]}"#,
    )
    .unwrap();
    let dc = tmp.path().join("dc.xml");
    std::fs::write(&dc, "<dc><title>Deeds of sale</title></dc>").unwrap();

    stdout(&run(&data, &["object", "put", "U1-dc", dc.to_str().unwrap()]));
    std::fs::write(
        batches.join("03.json"),
        r#"{"files": [{"id": "F9", "metadata": ["U1-dc"]}]}"#,
    )
    .unwrap();

    let out = stdout(&run(
        &data,
        &["ingest", "--commit-each", batches.to_str().unwrap()],
    ));
    assert!(out.contains("Ingested 3 batch file(s)"), "{out}");

    let shown = stdout(&run(&data, &["show", "U1", "--json"]));
    let doc: serde_json::Value = serde_json::from_str(&shown).unwrap();
    assert_eq!(doc["ancestry"][0]["value"], "B");
    assert_eq!(doc["ancestry"][1]["value"], "A");
    assert_eq!(doc["kind"][0]["value"], "unit");

    let f9 = stdout(&run(&data, &["show", "F9"]));
    assert!(f9.contains("md.dc.title\tDeeds of sale"), "{f9}");

    let below = stdout(&run(&data, &["descendants", "A"]));
    assert_eq!(below.lines().collect::<Vec<_>>(), vec!["B", "U1"]);
}

#[test]
fn remove_and_missing_documents() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");
    let batch = tmp.path().join("batch.json");
    std::fs::write(&batch, r#"{"collections": [{"id": "A"}]}"#).unwrap();

    stdout(&run(&data, &["ingest", batch.to_str().unwrap()]));
    stdout(&run(&data, &["remove", "A"]));

    assert!(!run(&data, &["show", "A"]).status.success());
    assert!(!run(&data, &["remove", "A"]).status.success());
}

#[test]
fn config_round_trip() {
    let tmp = tempfile::tempdir().unwrap();

    let value = stdout(&run(tmp.path(), &["config", "get", "flush_threshold"]));
    assert_eq!(value.trim(), "1000");

    stdout(&run(tmp.path(), &["config", "set", "flush_threshold", "5"]));
    let value = stdout(&run(tmp.path(), &["config", "get", "flush_threshold"]));
    assert_eq!(value.trim(), "5");

    assert!(
        !run(tmp.path(), &["config", "set", "flush_threshold", "0"])
            .status
            .success()
    );
    assert!(
        !run(tmp.path(), &["config", "set", "bogus", "1"])
            .status
            .success()
    );
}

#[test]
fn status_json() {
    let tmp = tempfile::tempdir().unwrap();
    let out = stdout(&run(tmp.path(), &["status", "--json"]));
    let status: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(status["data_dir_source"], "--data-dir");
    assert_eq!(status["documents"], 0);
    assert_eq!(status["objects"], 0);
    assert_eq!(status["settings"]["metadata_prefix"], "md.");
}

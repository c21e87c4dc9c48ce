use std::process::Command;

#[test]
fn init_creates_valid_toml() {
    let dir = tempfile::tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_scry"))
        .arg("init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "scry init failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let config_path = dir.path().join(".scry.toml");
    assert!(config_path.exists(), ".scry.toml should exist");

    let content = std::fs::read_to_string(&config_path).unwrap();
    for section in ["[embedding]", "[vector_store]", "[keywords]", "[ledger]", "[search]"] {
        assert!(content.contains(section), "missing {section}");
    }

    // Every option is commented out, so parsing yields the defaults.
    let config: scry_core::ScryConfig = toml::from_str(&content).unwrap();
    assert_eq!(config.search.candidate_limit, 50);
    assert_eq!(config.ledger.mode, scry_core::LedgerMode::Keyed);
}

#[test]
fn init_refuses_if_exists() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".scry.toml"), "# existing").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_scry"))
        .arg("init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(!output.status.success());
    let kept = std::fs::read_to_string(dir.path().join(".scry.toml")).unwrap();
    assert_eq!(kept, "# existing");
}

#[test]
fn query_without_index_explains_how_to_sync() {
    let dir = tempfile::tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_scry"))
        .args(["query", "how do I show a toast", "--project", "shop"])
        .env("OPENAI_API_KEY", "sk-test")
        .env("NO_COLOR", "1")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("no active project"), "stderr: {stderr}");
    assert!(stderr.contains("scry sync"), "stderr: {stderr}");
}

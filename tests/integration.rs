// tests/integration.rs
use assert_cmd::Command;
use assert_fs::prelude::*;
use predicates::prelude::*;

#[test]
fn test_cli_help() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("timevault")?;
    cmd.arg("--help");
    cmd.assert().success();
    Ok(())
}

#[test]
fn test_cli_version() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("timevault")?;
    cmd.arg("--version");
    cmd.assert()
        .success()
        .stdout(predicates::str::contains("v0.1.0"));
    Ok(())
}

#[test]
fn test_cli_missing_source_is_an_error_not_a_crash() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = assert_fs::TempDir::new()?;
    let backups = temp_dir.child("backups");

    let mut cmd = Command::cargo_bin("timevault")?;
    cmd.args([
        temp_dir.child("no-such-file").path().to_str().unwrap(),
        backups.path().to_str().unwrap(),
    ]);

    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicates::str::contains("source path does not exist"));
    Ok(())
}

#[test]
fn test_cli_missing_backup_on_restore() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = assert_fs::TempDir::new()?;

    let mut cmd = Command::cargo_bin("timevault")?;
    cmd.args([
        "--restore",
        temp_dir.child("ghost_20260830_120000").path().to_str().unwrap(),
        temp_dir.child("target").path().to_str().unwrap(),
    ]);

    cmd.assert()
        .failure()
        .stderr(predicates::str::contains("backup path does not exist"));
    Ok(())
}

#[test]
fn test_cli_info_reports_without_backing_up() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = assert_fs::TempDir::new()?;
    let source = temp_dir.child("report.txt");
    source.write_str("a few bytes of content")?;
    let backups = temp_dir.child("backups");
    backups.create_dir_all()?;

    let mut cmd = Command::cargo_bin("timevault")?;
    cmd.args([
        "--info",
        source.path().to_str().unwrap(),
        backups.path().to_str().unwrap(),
    ]);

    cmd.assert()
        .success()
        .stdout(predicates::str::contains("Space requirement"))
        .stdout(predicates::str::contains("Sufficient: yes"));

    // Info mode must not create anything in the destination
    let entries: Vec<_> = std::fs::read_dir(backups.path())?.collect();
    assert!(entries.is_empty());
    Ok(())
}

#[test]
fn test_cli_destination_from_config() -> Result<(), Box<dyn std::error::Error>> {
    let temp_dir = assert_fs::TempDir::new()?;
    let source = temp_dir.child("notes.txt");
    source.write_str("configured destination")?;
    let backups = temp_dir.child("backups");

    let config_file = temp_dir.child("config.toml");
    config_file.write_str(&format!(
        r#"
[core]
destination = "{}"
"#,
        backups.path().display()
    ))?;

    let mut cmd = Command::cargo_bin("timevault")?;
    cmd.args([
        "--config",
        config_file.path().to_str().unwrap(),
        source.path().to_str().unwrap(),
    ]);

    cmd.assert()
        .success()
        .stdout(predicates::str::contains("Backup created successfully"));

    let entries: Vec<_> = std::fs::read_dir(backups.path())?
        .filter_map(|entry| entry.ok())
        .collect();
    // the backup plus its .meta sidecar
    assert_eq!(entries.len(), 2);
    Ok(())
}

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn git_bin(dir: &Path, home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("git-bin").expect("git-bin binary is built");
    cmd.current_dir(dir)
        .env("HOME", home)
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .env_remove("RUST_LOG");
    cmd
}

fn git(dir: &Path, home: &Path, args: &[&str]) -> bool {
    std::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("HOME", home)
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// A fresh repository with a binstore base configured, or None without git.
fn repository() -> Option<(TempDir, std::path::PathBuf, std::path::PathBuf)> {
    let temp_dir = TempDir::new().unwrap();
    let home = temp_dir.path().join("home");
    let work = temp_dir.path().join("work");
    fs::create_dir_all(&home).unwrap();
    fs::create_dir_all(&work).unwrap();

    if !git(&work, &home, &["init", "-q"]) {
        return None;
    }
    let base = temp_dir.path().join("stores");
    assert!(git(
        &work,
        &home,
        &["config", "git-bin.binstorebase", base.to_str().unwrap()]
    ));
    Some((temp_dir, home, work))
}

#[test]
fn help_lists_verbs() {
    let temp_dir = TempDir::new().unwrap();
    git_bin(temp_dir.path(), temp_dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("add"))
        .stdout(predicate::str::contains("edit"))
        .stdout(predicate::str::contains("reset"))
        .stdout(predicate::str::contains("checkout"))
        .stdout(predicate::str::contains("--compat"));
}

#[test]
fn verbs_require_paths() {
    let temp_dir = TempDir::new().unwrap();
    for verb in ["add", "edit", "reset", "checkout"] {
        git_bin(temp_dir.path(), temp_dir.path())
            .arg(verb)
            .assert()
            .failure();
    }
}

#[test]
fn unknown_verb_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    git_bin(temp_dir.path(), temp_dir.path())
        .arg("commit")
        .assert()
        .failure()
        .stderr(predicate::str::contains("commit"));
}

#[test]
fn outside_a_repository_exits_1() {
    let temp_dir = TempDir::new().unwrap();
    git_bin(temp_dir.path(), temp_dir.path())
        .args(["add", "x.bin"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("error:"))
        .stderr(predicate::str::contains("Not a git repository"));
}

#[test]
fn unconfigured_binstore_exits_1_with_hint() {
    let temp_dir = TempDir::new().unwrap();
    let home = temp_dir.path().join("home");
    let work = temp_dir.path().join("work");
    fs::create_dir_all(&home).unwrap();
    fs::create_dir_all(&work).unwrap();
    if !git(&work, &home, &["init", "-q"]) {
        return;
    }

    git_bin(&work, &home)
        .arg("init")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("git-bin.binstorebase"));
}

#[test]
fn add_then_reset_roundtrip() {
    let Some((_temp_dir, home, work)) = repository() else {
        return;
    };
    let path = work.join("image.bin");
    fs::write(&path, b"\0\x01\x02binary payload").unwrap();

    git_bin(&work, &home)
        .args(["add", "image.bin"])
        .assert()
        .success()
        .stdout(predicate::str::contains("stored image.bin"));

    let meta = fs::symlink_metadata(&path).unwrap();
    assert!(meta.file_type().is_symlink());
    assert_eq!(fs::read(&path).unwrap(), b"\0\x01\x02binary payload");

    git_bin(&work, &home)
        .args(["reset", "image.bin"])
        .assert()
        .success()
        .stdout(predicate::str::contains("content restored"));

    let meta = fs::symlink_metadata(&path).unwrap();
    assert!(meta.file_type().is_file());
    assert_eq!(fs::read(&path).unwrap(), b"\0\x01\x02binary payload");
}

#[test]
fn add_reports_missing_paths() {
    let Some((_temp_dir, home, work)) = repository() else {
        return;
    };
    git_bin(&work, &home)
        .args(["add", "missing.bin"])
        .assert()
        .success()
        .stdout(predicate::str::contains("did not match any files"));
}

#[test]
fn add_json_output() {
    let Some((_temp_dir, home, work)) = repository() else {
        return;
    };
    fs::write(work.join("notes.txt"), "text\n").unwrap();

    let assert = git_bin(&work, &home)
        .args(["--json", "add", "notes.txt"])
        .assert()
        .success();
    let json: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["outcomes"][0]["action"], "staged");
}

#[test]
fn init_reports_store_root() {
    let Some((temp_dir, home, work)) = repository() else {
        return;
    };
    git_bin(&work, &home)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("binstore at"));

    assert!(temp_dir.path().join("stores").join("work").join("config").is_file());
    assert!(
        fs::symlink_metadata(work.join(".git").join("binstore"))
            .unwrap()
            .file_type()
            .is_symlink()
    );
}

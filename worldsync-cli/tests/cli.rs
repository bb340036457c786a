use std::fs;
use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Two machines sharing one folder store.
struct Lab {
    tmp: TempDir,
}

impl Lab {
    fn new() -> Self {
        Self {
            tmp: TempDir::new().unwrap(),
        }
    }

    fn store(&self) -> PathBuf {
        self.tmp.path().join("store")
    }

    fn saves(&self, host: &str) -> PathBuf {
        self.tmp.path().join(host).join("instance/.minecraft/saves")
    }

    fn worldsync(&self, host: &str) -> Command {
        let instance_dir = self.tmp.path().join(host).join("instance");
        fs::create_dir_all(self.saves(host)).unwrap();
        let mut cmd = Command::cargo_bin("worldsync").unwrap();
        cmd.env_remove("RUST_LOG")
            .env("NO_COLOR", "1")
            .env("WORLDSYNC_HOME", self.tmp.path().join(host).join("home"))
            .env("WORLDSYNC_STORE", "folder")
            .env("WORLDSYNC_FOLDER_STORE", self.store())
            .env("WORLDSYNC_HOST", host)
            .env("INST_ID", "1.19.2")
            .env("INST_NAME", "Vanilla")
            .env("INST_DIR", &instance_dir)
            .env("INST_MC_DIR", instance_dir.join(".minecraft"));
        cmd
    }
}

fn write_world(saves: &Path, name: &str) {
    let dir = saves.join(name);
    fs::create_dir_all(dir.join("region")).unwrap();
    fs::write(dir.join("level.dat"), b"level").unwrap();
    fs::write(dir.join("region/r.0.0.mca"), b"chunks").unwrap();
}

#[test]
fn push_then_pull_on_another_host() {
    let lab = Lab::new();
    write_world(&lab.saves("desk"), "Base");

    lab.worldsync("desk")
        .arg("push")
        .assert()
        .success()
        .stdout(predicate::str::contains("Base"))
        .stdout(predicate::str::contains("uploaded"));

    lab.worldsync("laptop")
        .arg("pull")
        .assert()
        .success()
        .stdout(predicate::str::contains("created"));

    let pulled = lab.saves("laptop").join("Base");
    assert_eq!(fs::read(pulled.join("level.dat")).unwrap(), b"level");
    assert_eq!(fs::read(pulled.join("region/r.0.0.mca")).unwrap(), b"chunks");
}

#[test]
fn push_json_reports_each_world() {
    let lab = Lab::new();
    write_world(&lab.saves("desk"), "Base");

    let output = lab
        .worldsync("desk")
        .args(["push", "--json", "--workers", "2"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["direction"], "push");
    assert_eq!(report["instance"], "1.19.2");
    assert_eq!(report["host"], "desk");
    assert_eq!(report["dry_run"], false);
    assert_eq!(report["worlds"][0]["world"], "Base");
    assert_eq!(report["worlds"][0]["outcome"], "uploaded");
    assert_eq!(report["worlds"][0]["master"], "created");
}

#[test]
fn dry_run_writes_nothing_to_the_store() {
    let lab = Lab::new();
    write_world(&lab.saves("desk"), "Base");

    lab.worldsync("desk")
        .args(["push", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[dry-run]"));

    let root = lab.store().join("MinecraftSync");
    let records = fs::read_dir(&root).map(|d| d.count()).unwrap_or(0);
    assert_eq!(records, 0);
}

#[test]
fn failed_world_exits_with_two() {
    let lab = Lab::new();
    write_world(&lab.saves("desk"), "Base");
    lab.worldsync("desk").arg("push").assert().success();

    for entry in fs::read_dir(lab.store().join("MinecraftSync")).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().is_some_and(|e| e == "blob") {
            fs::write(&path, b"not an archive").unwrap();
        }
    }

    lab.worldsync("laptop")
        .arg("pull")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("failed"));
    assert!(!lab.saves("laptop").join("Base").exists());
}

#[test]
fn status_lists_planned_actions() {
    let lab = Lab::new();
    write_world(&lab.saves("desk"), "Base");
    lab.worldsync("desk").arg("push").assert().success();
    write_world(&lab.saves("laptop"), "Solo");

    let output = lab
        .worldsync("laptop")
        .args(["status", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let status: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(status["host"], "laptop");
    assert_eq!(status["name"], "Vanilla");
    let worlds = status["worlds"].as_array().unwrap();
    assert_eq!(worlds.len(), 2);
    assert_eq!(worlds[0]["world"], "Base");
    assert_eq!(worlds[0]["pull"], "create local");
    assert_eq!(worlds[1]["world"], "Solo");
    assert_eq!(worlds[1]["push"], "create proxy, create master");

    lab.worldsync("laptop")
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Vanilla"))
        .stdout(predicate::str::contains("create local"));
}

#[test]
fn missing_instance_environment_is_fatal() {
    let lab = Lab::new();
    lab.worldsync("desk")
        .env_remove("INST_ID")
        .arg("push")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("INST_ID"));
}

#[test]
fn missing_saves_root_is_fatal() {
    let lab = Lab::new();
    let mut cmd = lab.worldsync("desk");
    fs::remove_dir_all(lab.saves("desk")).unwrap();
    cmd.arg("pull")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("saves directory not found"));
}

#[test]
fn missing_drive_token_explains_expiry() {
    let lab = Lab::new();
    lab.worldsync("desk")
        .env("WORLDSYNC_STORE", "drive")
        .env_remove("WORLDSYNC_DRIVE_TOKEN")
        .arg("status")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("no Drive credentials"))
        .stderr(predicate::str::contains("expire after about an hour"));
}

#[test]
fn zero_workers_is_rejected() {
    let lab = Lab::new();
    lab.worldsync("desk")
        .args(["push", "--workers", "0"])
        .assert()
        .failure();
}

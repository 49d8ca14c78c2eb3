// ABOUTME: Integration tests for the ocidrv CLI commands.
// ABOUTME: Runs against the memory driver so no container engine is needed.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

/// CLI command isolated from the caller's config files and env.
fn ocidrv_cmd(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("ocidrv"));
    cmd.current_dir(dir.path())
        .env_remove("OCIDRV_DRIVER")
        .env_remove("OCIDRV_URI");
    cmd
}

#[test]
fn help_shows_commands() {
    let dir = tempfile::tempdir().unwrap();
    ocidrv_cmd(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("drivers"))
        .stdout(predicate::str::contains("pull"))
        .stdout(predicate::str::contains("inspect"))
        .stdout(predicate::str::contains("provision"));
}

#[test]
fn drivers_lists_builtin_drivers() {
    let dir = tempfile::tempdir().unwrap();
    ocidrv_cmd(&dir)
        .arg("drivers")
        .assert()
        .success()
        .stdout("docker\nmemory\npodman\n");
}

#[test]
fn pull_prints_image_id() {
    let dir = tempfile::tempdir().unwrap();
    ocidrv_cmd(&dir)
        .args(["--driver", "memory", "pull", "alpine:3"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("sha256:"));
}

#[test]
fn driver_comes_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("ocidrv.yml"), "driver: memory\n").unwrap();

    ocidrv_cmd(&dir)
        .args(["pull", "alpine:3"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("sha256:"));
}

#[test]
fn env_selects_driver() {
    let dir = tempfile::tempdir().unwrap();
    ocidrv_cmd(&dir)
        .env("OCIDRV_DRIVER", "memory")
        .args(["pull", "alpine:3"])
        .assert()
        .success();
}

#[test]
fn provision_reports_every_resource() {
    let dir = tempfile::tempdir().unwrap();
    ocidrv_cmd(&dir)
        .args([
            "--driver", "memory", "provision", "alpine:3", "--network", "--namespace", "--exec",
            "echo", "hi",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("image: sha256:"))
        .stdout(predicate::str::contains("network: "))
        .stdout(predicate::str::contains("namespace: "))
        .stdout(predicate::str::contains("container: "));
}

#[test]
fn provision_names_the_failed_step() {
    let dir = tempfile::tempdir().unwrap();
    ocidrv_cmd(&dir)
        .args([
            "--driver", "memory", "provision", "alpine:3", "--network", "--exec", "false",
        ])
        .assert()
        .failure()
        .stdout(predicate::str::contains("container: "))
        .stderr(predicate::str::contains("step 5 of 5 (exec) failed"))
        .stderr(predicate::str::contains("command exited with status 1"));
}

#[test]
fn inspect_unknown_container_fails() {
    let dir = tempfile::tempdir().unwrap();
    ocidrv_cmd(&dir)
        .args(["--driver", "memory", "inspect", "container", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no such container: nope"));
}

#[test]
fn failed_inspect_still_closes_connection() {
    let dir = tempfile::tempdir().unwrap();
    ocidrv_cmd(&dir)
        .args(["-v", "--driver", "memory", "inspect", "container", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("connection closed"))
        .stderr(predicate::str::contains("dropped without close").not());
}

#[test]
fn unknown_kind_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    ocidrv_cmd(&dir)
        .args(["--driver", "memory", "inspect", "volume", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown kind"));
}

#[test]
fn foreign_uri_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    ocidrv_cmd(&dir)
        .args(["--driver", "memory", "--uri", "tcp://x:1", "pull", "alpine:3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid uri"));
}

#[test]
fn unregistered_driver_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    ocidrv_cmd(&dir)
        .args(["--driver", "nope", "pull", "alpine:3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unregistered driver: nope"));
}

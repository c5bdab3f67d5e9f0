//! Smoke tests for the launcher's CLI surface, in the style of `uv`'s binary-level tests:
//! drive the compiled binary with `assert_cmd` rather than calling `clap` internals directly.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn help_describes_slots_and_listen_address() {
    Command::cargo_bin("buildcoord")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--total-slots"))
        .stdout(predicate::str::contains("--listen"));
}

#[test]
fn rejects_an_unparseable_listen_address() {
    Command::cargo_bin("buildcoord")
        .unwrap()
        .args(["--listen", "not-an-address"])
        .assert()
        .failure();
}

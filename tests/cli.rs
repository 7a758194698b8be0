//! CLI-level contract tests: drives the compiled binary
//! as a subprocess and asserts on its exit code for each startup failure.
//! The binary never exits on success on its own, so there is no "exit 0"
//! case to assert here — these only cover the three validation failures.

use assert_cmd::Command;

#[test]
fn no_name_exits_with_usage_code() {
    Command::cargo_bin("depot")
        .unwrap()
        .assert()
        .code(1);
}

#[test]
fn invalid_name_exits_with_invalid_name_code() {
    Command::cargo_bin("depot")
        .unwrap()
        .arg("alp ha")
        .assert()
        .code(2);
}

#[test]
fn invalid_quantity_exits_with_invalid_quantity_code() {
    Command::cargo_bin("depot")
        .unwrap()
        .args(["alpha", "widget", "notanumber"])
        .assert()
        .code(3);
}

#[test]
fn negative_quantity_exits_with_invalid_quantity_code() {
    Command::cargo_bin("depot")
        .unwrap()
        .args(["alpha", "widget", "-1"])
        .assert()
        .code(3);
}

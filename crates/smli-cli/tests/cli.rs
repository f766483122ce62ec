use assert_cmd::prelude::*;
use predicates::prelude::PredicateBooleanExt;
use predicates::str::contains;
use smli_ast::ast::Decl;
use smli_ast::derived::*;
use std::io::Write;
use std::process::Command;
use std::rc::Rc;

fn program(decls: Vec<Rc<Decl>>) -> tempfile::NamedTempFile {
    let decls: Vec<&Decl> = decls.iter().map(|d| d.as_ref()).collect();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(serde_json::to_string(&decls).unwrap().as_bytes()).unwrap();
    file
}

#[test]
fn prints_bindings_with_types() {
    let file = program(vec![val_named("x", infix("+", int(1), int(2)))]);
    let mut cmd = Command::cargo_bin("smli-cli").unwrap();
    cmd.arg(file.path());
    cmd.assert().success().stdout(contains("val x = 3 : int\n"));
}

#[test]
fn uncaught_exceptions_are_reported() {
    let file = program(vec![
        val_named("y", raise(var("Div"))),
        val_named("z", string("after")),
    ]);
    let mut cmd = Command::cargo_bin("smli-cli").unwrap();
    cmd.arg(file.path());
    cmd.assert()
        .success()
        .stdout(contains("Uncaught exception: Div").and(contains("val z = \"after\" : string")));
}

#[test]
fn print_goes_to_stdout_and_warnings_to_stderr() {
    let file = program(vec![
        val(p_wild(), app(var("print"), string("hello\n"))),
        fun("f", vec![(vec![p_int(0)], int(1))]),
    ]);
    let mut cmd = Command::cargo_bin("smli-cli").unwrap();
    cmd.arg(file.path());
    cmd.assert()
        .success()
        .stdout(contains("hello\n"))
        .stderr(contains("Pattern matching is not exhaustive."));
}

#[test]
fn no_exhaustiveness_silences_match_warnings() {
    let file = program(vec![fun("f", vec![(vec![p_int(0)], int(1))])]);
    let mut cmd = Command::cargo_bin("smli-cli").unwrap();
    cmd.args([file.path().to_str().unwrap(), "--no-exhaustiveness"]);
    cmd.assert().success().stderr(contains("not exhaustive").not());
}

#[test]
fn type_errors_fail() {
    let file = program(vec![val_named("bad", app(int(1), int(2)))]);
    let mut cmd = Command::cargo_bin("smli-cli").unwrap();
    cmd.arg(file.path());
    cmd.assert().failure();
}

#[test]
fn step_limit_from_options_file() {
    let mut options = tempfile::NamedTempFile::new().unwrap();
    options.write_all(br#"{"max_steps": 50}"#).unwrap();
    let looping = fun("loop", vec![(vec![p_var("n")], app(var("loop"), var("n")))]);
    let file = program(vec![looping, val_named("r", app(var("loop"), int(0)))]);
    let mut cmd = Command::cargo_bin("smli-cli").unwrap();
    cmd.arg(file.path()).arg("--options").arg(options.path());
    cmd.assert().failure().stderr(contains("Evaluation stopped after 50 steps."));
}

#[test]
fn json_output_carries_warnings() {
    let file = program(vec![val_named("w", app(var("printLn"), int(7)))]);
    let mut cmd = Command::cargo_bin("smli-cli").unwrap();
    cmd.args([file.path().to_str().unwrap(), "--format", "json"]);
    cmd.assert()
        .success()
        .stdout(contains("\"Output\"").and(contains("\"type\":\"unit\"")));
}

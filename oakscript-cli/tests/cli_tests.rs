//! Integration tests for the OakScript CLI.
//!
//! These tests invoke the `oakscript` binary as a subprocess and check
//! exit codes, stdout, and stderr.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[allow(deprecated)]
fn oakscript() -> Command {
    Command::cargo_bin("oakscript").unwrap()
}

/// Write a script into `dir` and return its path.
fn script(dir: &TempDir, name: &str, source: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, source).unwrap();
    path
}

// ---- No-args / help ----

#[test]
fn no_args_prints_usage_and_exits_1() {
    oakscript()
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Usage: oakscript"));
}

#[test]
fn help_flag_exits_0() {
    oakscript()
        .arg("--help")
        .assert()
        .success()
        .stderr(predicate::str::contains("Commands:"));
}

#[test]
fn unknown_command_exits_1() {
    oakscript()
        .arg("frobnicate")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("unknown command"));
}

// ---- run: the end-to-end scenarios ----

#[test]
fn run_arithmetic() {
    let dir = TempDir::new().unwrap();
    let path = script(&dir, "s.oak", "print 1 + 2 * 3\n");
    oakscript()
        .args(["run", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout("7\n");
}

#[test]
fn run_while_countdown() {
    let dir = TempDir::new().unwrap();
    let path = script(
        &dir,
        "s.oak",
        "x = 10\nwhile x > 0 do\n  print x\n  x = x - 1\nend\n",
    );
    oakscript()
        .args(["run", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout("10\n9\n8\n7\n6\n5\n4\n3\n2\n1\n");
}

#[test]
fn run_for_loop() {
    let dir = TempDir::new().unwrap();
    let path = script(&dir, "s.oak", "for i = 1 to 5 do print i end\n");
    oakscript()
        .args(["run", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout("1\n2\n3\n4\n5\n");
}

#[test]
fn run_recursive_factorial() {
    let dir = TempDir::new().unwrap();
    let path = script(
        &dir,
        "s.oak",
        "function f(n) if n <= 1 then return 1 else return n * f(n-1) end end\nprint f(5)\n",
    );
    oakscript()
        .args(["run", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout("120\n");
}

#[test]
fn run_catches_division_by_zero() {
    let dir = TempDir::new().unwrap();
    let path = script(
        &dir,
        "s.oak",
        "try\n print 10 / 0\ncatch\n print \"caught\"\nend\n",
    );
    oakscript()
        .args(["run", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout("caught\n");
}

#[test]
fn run_string_coercion() {
    let dir = TempDir::new().unwrap();
    let path = script(&dir, "s.oak", "print \"hi \" + 42\n");
    oakscript()
        .args(["run", path.to_str().unwrap()])
        .assert()
        .success()
        .stdout("hi 42\n");
}

// ---- run: failure modes ----

#[test]
fn run_missing_file_exits_1() {
    oakscript()
        .args(["run", "no_such_script.oak"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("cannot read"));
}

#[test]
fn run_parse_error_exits_1_with_line() {
    let dir = TempDir::new().unwrap();
    let path = script(&dir, "s.oak", "x = 1\nif x\nprint x\nend\n");
    oakscript()
        .args(["run", path.to_str().unwrap()])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("line 2"));
}

#[test]
fn run_runtime_error_exits_3() {
    let dir = TempDir::new().unwrap();
    let path = script(&dir, "s.oak", "print ghost\n");
    oakscript()
        .args(["run", path.to_str().unwrap()])
        .assert()
        .failure()
        .code(3)
        .stderr(predicate::str::contains("runtime error"))
        .stderr(predicate::str::contains("undefined variable 'ghost'"));
}

#[test]
fn run_expands_includes() {
    let dir = TempDir::new().unwrap();
    script(&dir, "lib.oak", "const greeting = \"hello\"\n");
    let main = script(&dir, "main.oak", "#include \"lib.oak\"\nprint greeting\n");
    oakscript()
        .args(["run", main.to_str().unwrap()])
        .assert()
        .success()
        .stdout("hello\n");
}

// ---- compile / runbytecode ----

#[test]
fn compile_then_runbytecode_roundtrip() {
    let dir = TempDir::new().unwrap();
    let src = script(
        &dir,
        "fact.oak",
        "function f(n) if n <= 1 then return 1 else return n * f(n-1) end end\nprint f(5)\n",
    );
    let out = dir.path().join("fact.oakc");

    oakscript()
        .args([
            "compile",
            src.to_str().unwrap(),
            "-o",
            out.to_str().unwrap(),
        ])
        .assert()
        .success()
        .stderr(predicate::str::contains("compiled"));

    assert!(out.exists());
    let bytes = fs::read(&out).unwrap();
    assert_eq!(&bytes[0..8], b"OAKSCODE");

    oakscript()
        .args(["runbytecode", out.to_str().unwrap()])
        .assert()
        .success()
        .stdout("120\n");
}

#[test]
fn compile_default_output_name() {
    let dir = TempDir::new().unwrap();
    let src = script(&dir, "prog.oak", "print 1\n");
    oakscript()
        .args(["compile", src.to_str().unwrap()])
        .assert()
        .success();
    assert!(dir.path().join("prog.oakc").exists());
}

#[test]
fn compile_error_exits_1() {
    let dir = TempDir::new().unwrap();
    let src = script(&dir, "bad.oak", "break\n");
    oakscript()
        .args(["compile", src.to_str().unwrap()])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("break outside of a loop"));
}

#[test]
fn runbytecode_rejects_bad_magic() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bogus.oakc");
    fs::write(&path, b"NOTOAKS!\x01\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00").unwrap();
    oakscript()
        .args(["runbytecode", path.to_str().unwrap()])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("invalid container"));
}

#[test]
fn runbytecode_rejects_truncated_files() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("short.oakc");
    fs::write(&path, b"OAKS").unwrap();
    oakscript()
        .args(["runbytecode", path.to_str().unwrap()])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn runbytecode_rejects_corrupted_sizes() {
    let dir = TempDir::new().unwrap();
    let src = script(&dir, "p.oak", "print 1\n");
    let out = dir.path().join("p.oakc");
    oakscript()
        .args(["compile", src.to_str().unwrap(), "-o", out.to_str().unwrap()])
        .assert()
        .success();

    let mut bytes = fs::read(&out).unwrap();
    bytes[12..16].copy_from_slice(&u32::MAX.to_le_bytes());
    fs::write(&out, &bytes).unwrap();

    oakscript()
        .args(["runbytecode", out.to_str().unwrap()])
        .assert()
        .failure()
        .code(2);
}

// ---- disasm ----

#[test]
fn disasm_lists_mnemonics() {
    let dir = TempDir::new().unwrap();
    let src = script(&dir, "p.oak", "print 1 + 2\n");
    let out = dir.path().join("p.oakc");
    oakscript()
        .args(["compile", src.to_str().unwrap(), "-o", out.to_str().unwrap()])
        .assert()
        .success();

    oakscript()
        .args(["disasm", out.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("PUSH_INT"))
        .stdout(predicate::str::contains("ADD"))
        .stdout(predicate::str::contains("PRINT"))
        .stdout(predicate::str::contains("HALT"));
}

// ---- tracing ----

#[test]
fn trace_env_var_writes_a_log() {
    let dir = TempDir::new().unwrap();
    let src = script(&dir, "p.oak", "print 1\n");
    let log = dir.path().join("trace.log");

    oakscript()
        .args(["run", src.to_str().unwrap()])
        .env("OAKSCRIPT_TRACE_LOG", log.to_str().unwrap())
        .assert()
        .success()
        .stdout("1\n");

    let trace = fs::read_to_string(&log).unwrap();
    assert!(trace.contains("PUSH_INT"));
    assert!(trace.contains("PRINT"));
}

#[test]
fn no_trace_env_var_means_no_log() {
    let dir = TempDir::new().unwrap();
    let src = script(&dir, "p.oak", "print 1\n");
    oakscript()
        .args(["run", src.to_str().unwrap()])
        .env_remove("OAKSCRIPT_TRACE_LOG")
        .assert()
        .success();
    assert!(!dir.path().join("trace.log").exists());
}

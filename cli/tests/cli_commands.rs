use assert_cmd::Command;
use basalt_core::program::{BinaryPrim, PrimitiveOp};
use basalt_core::ProgramBuilder;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

/// `(20 + 22)` written as a typed program JSON file.
fn write_sample(dir: &Path) -> PathBuf {
    let mut pb = ProgramBuilder::new();
    let int32 = pb.std.int32;
    let add = pb.primitive("+", int32, &[("other", int32)], Some(int32), PrimitiveOp::Binary { op: BinaryPrim::Add });
    let lhs = pb.int(20);
    let rhs = pb.int(22);
    let root = pb.call(Some(lhs), "+", vec![rhs], vec![add], Some(int32));
    let program = pb.finish(root);
    let path = dir.join("sample.json");
    fs::write(&path, program.to_json().expect("encode program")).expect("write program");
    path
}

fn stdout_of(cmd: &mut Command) -> String {
    let output = cmd.output().expect("failed to spawn basalt");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn build_prints_the_module() {
    let dir = tempdir().expect("temp dir");
    let sample = write_sample(dir.path());
    let stdout = stdout_of(Command::cargo_bin("basalt").expect("binary").arg("build").arg(&sample));
    assert!(stdout.contains("@basalt_main"), "{}", stdout);
    assert!(stdout.contains("Int32#+<Int32>"), "{}", stdout);
}

#[test]
fn build_writes_the_module_to_a_file() {
    let dir = tempdir().expect("temp dir");
    let sample = write_sample(dir.path());
    let out = dir.path().join("sample.ll");
    let stdout = stdout_of(
        Command::cargo_bin("basalt").expect("binary").arg("build").arg(&sample).arg("-o").arg(&out),
    );
    assert!(stdout.contains("wrote"), "{}", stdout);
    let text = fs::read_to_string(&out).expect("module file");
    assert!(text.starts_with("; ModuleID"), "{}", text);
}

#[test]
fn run_prints_the_result() {
    let dir = tempdir().expect("temp dir");
    let sample = write_sample(dir.path());
    let stdout = stdout_of(Command::cargo_bin("basalt").expect("binary").arg("run").arg(&sample));
    assert_eq!(stdout.trim(), "42");
}

#[test]
fn stats_lists_generated_functions() {
    let dir = tempdir().expect("temp dir");
    let sample = write_sample(dir.path());
    let stdout = stdout_of(Command::cargo_bin("basalt").expect("binary").arg("stats").arg(&sample));
    assert!(stdout.contains("basalt_main"), "{}", stdout);
    assert!(stdout.contains("internal"), "{}", stdout);
}

#[test]
fn stats_can_be_printed_as_json() {
    let dir = tempdir().expect("temp dir");
    let sample = write_sample(dir.path());
    let stdout = stdout_of(Command::cargo_bin("basalt").expect("binary").arg("stats").arg(&sample).arg("--json"));
    let summary: serde_json::Value = serde_json::from_str(&stdout).expect("stats should be JSON");
    let functions = summary["functions"].as_array().expect("function list");
    let main = functions
        .iter()
        .find(|f| f["name"] == "basalt_main")
        .expect("entry function listed");
    assert!(main["blocks"].as_u64().is_some_and(|n| n >= 3));
    assert!(functions.iter().any(|f| f["name"] == "Int32#+<Int32>" && f["linkage"] == "internal"));
    assert!(summary["globals"].is_array());
}

#[test]
fn malformed_program_fails_with_a_report() {
    let dir = tempdir().expect("temp dir");
    let bad = dir.path().join("bad.json");
    fs::write(&bad, "{ not json").expect("write file");
    Command::cargo_bin("basalt")
        .expect("binary")
        .arg("build")
        .arg(&bad)
        .assert()
        .failure()
        .code(1);
}

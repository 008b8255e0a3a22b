//! CLI tests for the `grist-merge` binary.
//!
//! Every case fails before any store answers: configurations point at a
//! closed local port. The tests check the exit code, stderr, and that an
//! existing output file survives a failed run.

use std::path::Path;
use std::process::{Command, Output};

use grist_merge::exit_codes;
use grist_merge::io::store::API_KEY_ENV;
use grist_merge::test_support::ConfigDir;

const HEADER: &str = "grist_root_url: http://127.0.0.1:9\ngrist_doc_id: doc123\n";

fn grist_merge(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_grist-merge"))
        .current_dir(dir)
        .env(API_KEY_ENV, "test-key")
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("run grist-merge")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn missing_config_path_is_a_usage_error() {
    let dir = ConfigDir::new().expect("config dir");
    let output = grist_merge(dir.path(), &[]);
    assert_eq!(output.status.code(), Some(exit_codes::USAGE));
}

#[test]
fn missing_config_file_exits_with_config_code() {
    let dir = ConfigDir::new().expect("config dir");

    let output = grist_merge(dir.path(), &["absent.yml"]);

    assert_eq!(output.status.code(), Some(exit_codes::CONFIG));
    assert!(stderr(&output).contains("config error"), "{}", stderr(&output));
    assert!(stderr(&output).contains("absent.yml"), "{}", stderr(&output));
}

#[test]
fn unknown_config_key_exits_with_config_code() {
    let dir = ConfigDir::new().expect("config dir");
    dir.write(
        "merge.yml",
        &format!("{HEADER}query: SELECT 1\ntemplate: x\ntempalte: y\n"),
    )
    .expect("config");

    let output = grist_merge(dir.path(), &["merge.yml"]);

    assert_eq!(output.status.code(), Some(exit_codes::CONFIG));
    assert!(stderr(&output).contains("tempalte"), "{}", stderr(&output));
}

#[test]
fn parameter_count_mismatch_exits_with_config_code() {
    let dir = ConfigDir::new().expect("config dir");
    dir.write(
        "merge.yml",
        &format!(
            "{HEADER}parameters: [since, team]\nquery: \"SELECT name FROM People WHERE joined > {{{{ since }}}}\"\ntemplate: \"{{{{ name }}}}\"\n"
        ),
    )
    .expect("config");

    let output = grist_merge(dir.path(), &["merge.yml", "2024-01-01"]);

    assert_eq!(output.status.code(), Some(exit_codes::CONFIG));
    assert!(
        stderr(&output).contains("2 parameters required, 1 supplied"),
        "{}",
        stderr(&output)
    );
    assert!(output.stdout.is_empty());
}

#[test]
fn template_syntax_error_exits_with_config_code() {
    let dir = ConfigDir::new().expect("config dir");
    dir.write(
        "merge.yml",
        &format!("{HEADER}query: SELECT name FROM People\ntemplate: \"Hello {{{{ name \"\n"),
    )
    .expect("config");

    let output = grist_merge(dir.path(), &["merge.yml"]);

    assert_eq!(output.status.code(), Some(exit_codes::CONFIG));
}

#[test]
fn missing_api_key_exits_with_config_code() {
    let dir = ConfigDir::new().expect("config dir");
    dir.write(
        "merge.yml",
        &format!("{HEADER}query: SELECT 1\ntemplate: x\n"),
    )
    .expect("config");

    let output = Command::new(env!("CARGO_BIN_EXE_grist-merge"))
        .current_dir(dir.path())
        .env_remove(API_KEY_ENV)
        .args(["--api-key", "no-such-key-file", "merge.yml"])
        .output()
        .expect("run grist-merge");

    assert_eq!(output.status.code(), Some(exit_codes::CONFIG));
    assert!(stderr(&output).contains("api key"), "{}", stderr(&output));
}

#[test]
fn config_error_leaves_existing_output_file_intact() {
    let dir = ConfigDir::new().expect("config dir");
    let report = dir.write("out.txt", "previous report\n").expect("report");
    dir.write(
        "merge.yml",
        &format!(
            "{HEADER}query: SELECT name FROM People\ntemplate: \"Hello {{{{ name \"\noutput: out.txt\n"
        ),
    )
    .expect("config");

    let output = grist_merge(dir.path(), &["merge.yml"]);

    assert_eq!(output.status.code(), Some(exit_codes::CONFIG));
    assert_eq!(
        std::fs::read_to_string(report).expect("read report"),
        "previous report\n"
    );
}

#[test]
fn unreachable_store_leaves_existing_output_file_intact() {
    let dir = ConfigDir::new().expect("config dir");
    let report = dir.write("out.txt", "previous report\n").expect("report");
    dir.write(
        "merge.yml",
        &format!("{HEADER}query: SELECT name FROM People\ntemplate: \"{{{{ name }}}}\"\noutput: out.txt\n"),
    )
    .expect("config");

    let output = grist_merge(dir.path(), &["merge.yml"]);

    assert_eq!(output.status.code(), Some(exit_codes::QUERY));
    assert_eq!(
        std::fs::read_to_string(report).expect("read report"),
        "previous report\n"
    );
}

use std::process::{Command, Output};

fn sqllineage(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_sqllineage"))
        .args(args)
        .output()
        .expect("Cannot run sqllineage binary")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

#[test]
fn test_table_lineage_from_command_line() {
    let output = sqllineage(&["-e", "insert into tab2 select * from tab1"]);
    assert!(output.status.success());
    assert_eq!(
        stdout(&output),
        "Statements(#): 1\nSource Tables:\n    <default>.tab1\nTarget Tables:\n    <default>.tab2\n"
    );
}

#[test]
fn test_column_lineage_from_file() {
    let path = std::env::temp_dir().join("sqllineage_test_column_lineage.sql");
    std::fs::write(
        &path,
        "insert into tab2 select col1 from tab1;\ninsert into tab3 select col1 from tab2;\n",
    )
    .unwrap();
    let output = sqllineage(&["-f", path.to_str().unwrap(), "-l", "column"]);
    assert!(output.status.success());
    assert_eq!(
        stdout(&output),
        "<default>.tab3.col1 <- <default>.tab2.col1 <- <default>.tab1.col1\n"
    );
}

#[test]
fn test_file_takes_precedence_over_sql() {
    let path = std::env::temp_dir().join("sqllineage_test_precedence.sql");
    std::fs::write(&path, "select * from tab_from_file").unwrap();
    let output = sqllineage(&["-e", "select * from tab_from_sql", "-f", path.to_str().unwrap()]);
    assert!(output.status.success());
    assert!(stderr(&output).contains("Both -e and -f options are specified. -e option will be ignored"));
    assert!(stdout(&output).contains("<default>.tab_from_file"));
    assert!(!stdout(&output).contains("<default>.tab_from_sql"));
}

#[test]
fn test_verbose_output() {
    let output = sqllineage(&["-e", "insert into tab2 select * from tab1", "--verbose"]);
    assert!(output.status.success());
    let out = stdout(&output);
    assert!(out.starts_with("Statement #1: insert into tab2 select * from tab1\n"));
    assert!(out.contains("==========\nSummary:\n"));
}

#[test]
fn test_json_output() {
    let output = sqllineage(&[
        "-e",
        "insert into tab2 select col1 from tab1",
        "--json",
        "-l",
        "column",
    ]);
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(json["statements"], 1);
    assert_eq!(json["source_tables"], serde_json::json!(["<default>.tab1"]));
    assert_eq!(json["target_tables"], serde_json::json!(["<default>.tab2"]));
    assert_eq!(
        json["column_lineage"],
        serde_json::json!([["<default>.tab1.col1", "<default>.tab2.col1"]])
    );
}

#[test]
fn test_no_sql_prints_help() {
    let output = sqllineage(&[]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Usage"));
}

#[test]
fn test_missing_file_fails() {
    let output = sqllineage(&["-f", "/nonexistent/sqllineage/missing.sql"]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("/nonexistent/sqllineage/missing.sql"));
}

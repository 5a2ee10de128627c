use assert_cmd::Command;
use predicates::str::contains;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const SOLUTION: &str = "
SELECT id FROM t ORDER BY id;
SELECT COUNT(*) FROM t;
";

fn sqlgrade(dir: &Path) -> anyhow::Result<Command> {
    let mut cmd = Command::cargo_bin("sqlgrade")?;
    cmd.current_dir(dir)
        .env_remove("SQLGRADE_CONFIG")
        .env_remove("SQLGRADE_PRACTICE_DB")
        .env_remove("SQLGRADE_GRADING_DB")
        .env_remove("SQLGRADE_OUT_DIR")
        .env_remove("SQLGRADE_DEV_SECRET");
    Ok(cmd)
}

const DEV_SECRET: &str = "cli-test-secret";

/// Command for a binary built without a secret, keyed for the test run.
fn keyed(dir: &Path) -> anyhow::Result<Command> {
    let mut cmd = sqlgrade(dir)?;
    cmd.env("SQLGRADE_DEV_SECRET", DEV_SECRET);
    Ok(cmd)
}

fn seed_db(path: &Path, rows: &str) -> anyhow::Result<()> {
    rusqlite::Connection::open(path)?.execute_batch(&format!(
        "CREATE TABLE t (id INTEGER); INSERT INTO t VALUES {};",
        rows
    ))?;
    Ok(())
}

#[test]
fn version_prints_package_version() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    sqlgrade(dir.path())?
        .arg("version")
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
    Ok(())
}

#[test]
fn parse_lists_statements_as_json() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    fs::write(dir.path().join("solution.sql"), SOLUTION)?;

    let out = sqlgrade(dir.path())?
        .args(["parse", "solution.sql"])
        .output()?;
    assert!(out.status.success());

    let parsed: serde_json::Value = serde_json::from_slice(&out.stdout)?;
    let items = parsed.as_array().cloned().unwrap_or_default();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["id"], "q1");
    assert_eq!(items[0]["type"], "select");
    assert_eq!(items[1]["features"], serde_json::json!(["aggregate"]));
    Ok(())
}

#[test]
fn parse_rejects_unterminated_statement() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    fs::write(dir.path().join("bad.sql"), "SELECT 'oops FROM t;")?;

    sqlgrade(dir.path())?
        .args(["parse", "bad.sql"])
        .assert()
        .code(2)
        .stderr(contains("fatal:"));
    Ok(())
}

#[test]
fn grade_without_student_id_is_fatal() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    fs::write(dir.path().join("solution.sql"), SOLUTION)?;

    sqlgrade(dir.path())?
        .args(["run", "--grade"])
        .assert()
        .code(2)
        .stderr(contains("student identifier"));
    Ok(())
}

#[test]
fn missing_suite_is_fatal() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    fs::write(dir.path().join("solution.sql"), SOLUTION)?;

    sqlgrade(dir.path())?
        .arg("run")
        .assert()
        .code(2)
        .stderr(contains("sample_tests.enc"));
    Ok(())
}

#[test]
fn config_file_with_unknown_field_is_accepted() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    fs::write(dir.path().join("solution.sql"), SOLUTION)?;
    fs::write(
        dir.path().join("sqlgrade.yaml"),
        "sample_suite: custom_suite.enc\nflavour: mint\n",
    )?;

    // Unknown keys only warn; the configured suite path is what goes missing.
    sqlgrade(dir.path())?
        .arg("run")
        .assert()
        .code(2)
        .stderr(contains("custom_suite.enc"));
    Ok(())
}

#[test]
fn package_run_and_collect_scores() -> anyhow::Result<()> {
    let dir = TempDir::new()?;
    let root = dir.path();
    seed_db(&root.join("practice.db"), "(2), (1)")?;
    seed_db(&root.join("grading.db"), "(5), (4), (6)")?;
    fs::write(root.join("solution.sql"), SOLUTION)?;
    fs::write(
        root.join("lab.yaml"),
        "lab: lab1\nquestions:\n  q1: { score: 2, constraints: [require_order_by] }\n",
    )?;

    let package = |cmd: &mut Command| {
        cmd.args([
            "package",
            "--script",
            "solution.sql",
            "--manifest",
            "lab.yaml",
            "--practice-db",
            "practice.db",
            "--grading-db",
            "grading.db",
        ]);
    };

    let mut cmd = keyed(root)?;
    package(&mut cmd);
    cmd.assert().success();
    assert!(root.join("sample_tests.enc").exists());
    assert!(root.join("eval_tests.enc").exists());

    // Practice run: the student's answers, nothing persisted.
    fs::write(
        root.join("student.sql"),
        "SELECT id FROM t;\nSELECT COUNT(*) FROM t;\n",
    )?;
    keyed(root)?
        .args(["run", "student.sql"])
        .assert()
        .success()
        .stderr(contains("q1"))
        .stderr(contains("require_order_by"));
    assert!(!root.join("2021a7ps0001g_submission").exists());

    keyed(root)?
        .args(["run", "student.sql", "--grade", "--student-id", "2021A7PS0001G"])
        .assert()
        .success()
        .stderr(contains("Submission written"));
    let results = root
        .join("2021a7ps0001g_submission")
        .join("2021a7ps0001g_results.enc");
    assert!(results.exists());

    let out = keyed(root)?
        .args(["scores", "--format", "json", "."])
        .output()?;
    assert_eq!(out.status.code(), Some(0));
    let rows: serde_json::Value = serde_json::from_slice(&out.stdout)?;
    assert_eq!(rows[0]["student_id"], "2021a7ps0001g");
    assert_eq!(rows[0]["total_score"], 1.0);
    assert_eq!(rows[0]["max_score"], 3.0);

    // A flipped byte is reported and makes the exit code non-zero.
    let mut bytes = fs::read(&results)?;
    let last = bytes.len() - 1;
    bytes[last] ^= 0x01;
    fs::write(&results, bytes)?;
    keyed(root)?
        .args(["scores", "."])
        .assert()
        .code(1)
        .stdout(contains("REJECTED"));
    Ok(())
}

#[test]
fn package_without_secret_is_fatal() -> anyhow::Result<()> {
    if option_env!("SQLGRADE_SECRET").is_some_and(|s| !s.is_empty()) {
        return Ok(());
    }
    let dir = TempDir::new()?;
    let root = dir.path();
    seed_db(&root.join("practice.db"), "(1)")?;
    seed_db(&root.join("grading.db"), "(2)")?;
    fs::write(root.join("solution.sql"), SOLUTION)?;

    sqlgrade(root)?
        .args([
            "package",
            "--script",
            "solution.sql",
            "--practice-db",
            "practice.db",
            "--grading-db",
            "grading.db",
        ])
        .assert()
        .code(2)
        .stderr(contains("fatal:"));
    assert!(!root.join("sample_tests.enc").exists());
    Ok(())
}

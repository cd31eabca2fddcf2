use anyhow::Result;
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn toolcage(workspace: &Path) -> Result<Command> {
    let mut cmd = Command::cargo_bin("toolcage")?;
    cmd.env_remove("RUST_LOG");
    cmd.env("HOME", workspace);
    cmd.env("TOOLCAGE_WORKER", env!("CARGO_BIN_EXE_toolcage-worker"));
    cmd.arg("--workspace").arg(workspace);
    Ok(cmd)
}

fn write_sandbox(workspace: &Path, name: &str, body: &str) -> Result<()> {
    let dir = workspace.join(".toolcage").join("sandboxes");
    fs::create_dir_all(&dir)?;
    fs::write(dir.join(format!("{name}.toml")), body)?;
    Ok(())
}

#[test]
fn sandboxes_reports_empty_configuration() -> Result<()> {
    let temp_dir = TempDir::new()?;
    toolcage(temp_dir.path())?
        .arg("sandboxes")
        .assert()
        .success()
        .stdout(predicate::str::contains("No sandboxes configured"));
    Ok(())
}

#[test]
fn sandboxes_lists_definitions_and_marks_active() -> Result<()> {
    let temp_dir = TempDir::new()?;
    write_sandbox(
        temp_dir.path(),
        "dev",
        "name = \"dev\"\ntype = \"bubblewrap\"\npermissions = [\"filesystem\"]\n",
    )?;
    write_sandbox(temp_dir.path(), "mac", "name = \"mac\"\ntype = \"seatbelt\"\n")?;

    toolcage(temp_dir.path())?
        .args(["--sandbox", "dev", "sandboxes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("* dev"))
        .stdout(predicate::str::contains("permissions: filesystem"))
        .stdout(predicate::str::contains("  mac"));
    Ok(())
}

#[test]
fn workspace_must_exist() -> Result<()> {
    let temp_dir = TempDir::new()?;
    toolcage(&temp_dir.path().join("missing"))?
        .arg("sandboxes")
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
    Ok(())
}

#[test]
fn exec_requires_an_active_sandbox() -> Result<()> {
    let temp_dir = TempDir::new()?;
    toolcage(temp_dir.path())?
        .args(["exec", "--module", "os", "--tool", "getpid"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No active sandbox"));
    Ok(())
}

#[test]
fn unknown_sandbox_name_is_reported() -> Result<()> {
    let temp_dir = TempDir::new()?;
    toolcage(temp_dir.path())?
        .args(["--sandbox", "ghost", "exec", "--module", "os", "--tool", "getpid"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown sandbox 'ghost'"));
    Ok(())
}

#[test]
fn run_tool_without_sandbox_runs_in_process() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let output = toolcage(temp_dir.path())?
        .args(["run-tool", "basename", "--args", r#"{"path":"/a/b/c.txt"}"#])
        .output()?;
    assert!(output.status.success());
    let message: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(message["content"], json!("c.txt"));
    Ok(())
}

#[test]
fn run_tool_reports_unknown_tools() -> Result<()> {
    let temp_dir = TempDir::new()?;
    toolcage(temp_dir.path())?
        .args(["run-tool", "does_not_exist"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Tool 'does_not_exist' not found"));
    Ok(())
}

#[test]
fn wrap_mcp_without_sandbox_prints_original_command() -> Result<()> {
    let temp_dir = TempDir::new()?;
    fs::write(
        temp_dir.path().join("toolcage.toml"),
        "[[mcp.servers]]\nname = \"fetch\"\ncommand = \"uvx\"\nargs = [\"mcp-server-fetch\"]\n",
    )?;

    let output = toolcage(temp_dir.path())?.args(["wrap-mcp", "fetch"]).output()?;
    assert!(output.status.success());
    let launch: Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(launch, json!({"command": "uvx", "args": ["mcp-server-fetch"]}));

    toolcage(temp_dir.path())?
        .args(["wrap-mcp", "other"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No MCP server named 'other'"));
    Ok(())
}

/// Runs only where `bwrap` can actually create namespaces.
#[cfg(target_os = "linux")]
#[test]
fn bubblewrap_isolates_the_pid_namespace() -> Result<()> {
    if which::which("bwrap").is_err() {
        eprintln!("bwrap not installed; skipping");
        return Ok(());
    }

    let temp_dir = TempDir::new()?;
    write_sandbox(temp_dir.path(), "dev", "name = \"dev\"\ntype = \"bubblewrap\"\n")?;

    let output = toolcage(temp_dir.path())?
        .args(["--sandbox", "dev", "exec", "--module", "os", "--tool", "getpid"])
        .output()?;
    let value: Value = serde_json::from_slice(&output.stdout)?;
    if value["success"] != json!(true) {
        let error = value["error"].as_str().unwrap_or_default();
        if error.starts_with("bubblewrap failed with code") {
            eprintln!("bwrap cannot create namespaces here; skipping: {error}");
            return Ok(());
        }
        anyhow::bail!("unexpected failure: {value}");
    }

    let pid: u32 = value["content"].as_str().unwrap_or_default().parse()?;
    assert!(pid < 100, "expected a fresh PID namespace, got pid {pid}");
    Ok(())
}

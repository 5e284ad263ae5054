//! amc — command-line front end that launches an aider MCP coding server,
//! resolves its backend configuration from project secrets and CLI
//! overrides, drives one bounded tool invocation, and verifies the produced
//! artifact by executing it.

mod bootstrap_helpers;
mod diagnostics;
mod verify;

use std::{collections::BTreeMap, path::Path, time::Duration};

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::{json, Value};
use tracing::{info, warn};

use amc_cli::{Cli, DEFAULT_EDITOR_MODEL};
use amc_mcp::{text_items, McpServerConfig, McpSession, ToolCallOutcome};
use amc_provider::{choose_editor_model, load_project_secrets};

use crate::bootstrap_helpers::init_tracing;
use crate::verify::{run_artifact, ArtifactError};

const EXIT_FAILURE: i32 = 1;
const EXIT_ARTIFACT_MISSING: i32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionRunOutcome {
    Listed,
    Completed,
    TimedOut,
}

fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("amc: {error:#}");
            EXIT_FAILURE
        }
    };
    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    if cli.doctor {
        print!("{}", diagnostics::render_doctor_report(&cli.current_working_dir));
        return Ok(0);
    }

    preflight_working_dir(&cli.current_working_dir)?;

    // Environment defaults are seeded here, before the runtime starts any
    // session work, so the env table is never written concurrently.
    let suggested_model = load_project_secrets(&cli.project_secrets);
    let editor_model =
        choose_editor_model(&cli.editor_model, DEFAULT_EDITOR_MODEL, suggested_model.as_deref());
    info!("effective editor model: {editor_model}");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let outcome = runtime.block_on(run_session(&cli, &editor_model))?;

    if cli.skip_verify || outcome == SessionRunOutcome::Listed {
        return Ok(0);
    }
    verify_artifact(&cli)
}

fn preflight_working_dir(path: &Path) -> Result<()> {
    if !path.is_dir() {
        bail!(
            "current working dir {} does not exist or is not a directory",
            path.display()
        );
    }
    if !path.join(".git").exists() {
        bail!(
            "current working dir {} is not a git repository",
            path.display()
        );
    }
    Ok(())
}

/// Drive one full session: spawn, handshake, catalog, one bounded tool call.
/// Teardown runs on every path, including handshake and invocation failures.
async fn run_session(cli: &Cli, editor_model: &str) -> Result<SessionRunOutcome> {
    let config = McpServerConfig {
        command: cli.server_command.clone(),
        args: server_args(cli),
        env: BTreeMap::new(),
        cwd: None,
    };
    let mut session =
        McpSession::spawn(&config).context("failed to start mcp server transport")?;
    let driven = drive_session(&mut session, cli, editor_model).await;
    if let Err(error) = session.shutdown().await {
        warn!("mcp server teardown failed: {error}");
    }
    driven
}

async fn drive_session(
    session: &mut McpSession,
    cli: &Cli,
    editor_model: &str,
) -> Result<SessionRunOutcome> {
    session
        .initialize()
        .await
        .context("mcp server handshake failed")?;

    session.list_tools().await;
    if cli.list_tools {
        println!("TOOLS:");
        for tool in session.tools() {
            println!("- {}", tool.name);
        }
        return Ok(SessionRunOutcome::Listed);
    }
    if !session.tools().is_empty() && !session.has_tool(&cli.tool) {
        // Not a local validation failure: the remote side decides. Worth a
        // heads-up before spending the whole invocation deadline.
        warn!("tool '{}' is not in the advertised catalog", cli.tool);
    }

    let arguments = coding_tool_arguments(cli, editor_model);
    let outcome = session
        .call_tool(
            &cli.tool,
            arguments,
            Duration::from_secs(cli.tool_timeout_seconds),
        )
        .await
        .context("mcp tool invocation failed")?;
    match outcome {
        ToolCallOutcome::Completed(items) => {
            for text in text_items(&items) {
                println!("{text}");
            }
            Ok(SessionRunOutcome::Completed)
        }
        ToolCallOutcome::TimedOut { waited } => {
            eprintln!(
                "amc: tool '{}' timed out after {}s",
                cli.tool,
                waited.as_secs()
            );
            Ok(SessionRunOutcome::TimedOut)
        }
    }
}

fn server_args(cli: &Cli) -> Vec<String> {
    let mut args = vec![
        "--current-working-dir".to_string(),
        cli.current_working_dir.display().to_string(),
        "--project-secrets".to_string(),
        cli.project_secrets.display().to_string(),
    ];
    args.extend(cli.server_args.iter().cloned());
    args
}

fn default_coding_prompt(artifact: &Path) -> String {
    format!(
        "Create or replace the file '{}' so that it runs successfully as a \
         standalone script and prints a short summary of what it does.",
        artifact.display()
    )
}

fn coding_tool_arguments(cli: &Cli, editor_model: &str) -> Value {
    let prompt = cli
        .prompt
        .clone()
        .unwrap_or_else(|| default_coding_prompt(&cli.artifact));
    let editable_files = if cli.editable_files.is_empty() {
        vec![cli.artifact.display().to_string()]
    } else {
        cli.editable_files.clone()
    };
    json!({
        "ai_coding_prompt": prompt,
        "relative_editable_files": editable_files,
        "relative_readonly_files": cli.readonly_files,
        "model": editor_model,
    })
}

fn verify_artifact(cli: &Cli) -> Result<i32> {
    let artifact_path = cli.current_working_dir.join(&cli.artifact);
    match run_artifact(&artifact_path, &cli.artifact_runner) {
        Ok(output) => {
            print!("{}", output.stdout);
            if output.exit_code != 0 {
                eprint!("{}", output.stderr);
            }
            Ok(output.exit_code)
        }
        Err(ArtifactError::Missing(path)) => {
            eprintln!("amc: expected artifact {} was not created", path.display());
            Ok(EXIT_ARTIFACT_MISSING)
        }
        Err(error) => Err(error.into()),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use tempfile::tempdir;

    use super::*;

    fn cli_for(args: &[&str]) -> Cli {
        Cli::parse_from(args)
    }

    #[test]
    fn unit_preflight_rejects_missing_and_non_git_directories() {
        let temp = tempdir().expect("tempdir");
        assert!(preflight_working_dir(&temp.path().join("absent")).is_err());

        let plain = temp.path().join("plain");
        std::fs::create_dir_all(&plain).expect("mkdir");
        assert!(preflight_working_dir(&plain).is_err());

        let repo = temp.path().join("repo");
        std::fs::create_dir_all(repo.join(".git")).expect("mkdir .git");
        assert!(preflight_working_dir(&repo).is_ok());
    }

    #[test]
    fn unit_server_args_carry_working_dir_secrets_and_extras_in_order() {
        let cli = cli_for(&[
            "amc",
            "--current-working-dir",
            "/tmp/project",
            "--project-secrets",
            "/tmp/secrets.json",
            "--server-arg",
            "--verbose",
        ]);
        assert_eq!(
            server_args(&cli),
            vec![
                "--current-working-dir",
                "/tmp/project",
                "--project-secrets",
                "/tmp/secrets.json",
                "--verbose",
            ]
        );
    }

    #[test]
    fn unit_coding_tool_arguments_pass_the_model_verbatim() {
        let cli = cli_for(&[
            "amc",
            "--current-working-dir",
            "/tmp/project",
            "--prompt",
            "create greeting.py",
        ]);
        let arguments = coding_tool_arguments(&cli, "openai/gpt-5");
        assert_eq!(arguments["model"], "openai/gpt-5");
        assert_eq!(arguments["ai_coding_prompt"], "create greeting.py");
        assert_eq!(
            arguments["relative_editable_files"],
            serde_json::json!(["output.py"])
        );
        assert_eq!(arguments["relative_readonly_files"], serde_json::json!([]));
    }

    #[test]
    fn unit_explicit_editable_files_replace_the_artifact_default() {
        let cli = cli_for(&[
            "amc",
            "--current-working-dir",
            "/tmp/project",
            "--editable-file",
            "src/lib.rs",
            "--editable-file",
            "src/main.rs",
            "--readonly-file",
            "README.md",
        ]);
        let arguments = coding_tool_arguments(&cli, DEFAULT_EDITOR_MODEL);
        assert_eq!(
            arguments["relative_editable_files"],
            serde_json::json!(["src/lib.rs", "src/main.rs"])
        );
        assert_eq!(
            arguments["relative_readonly_files"],
            serde_json::json!(["README.md"])
        );
    }

    #[test]
    fn unit_default_prompt_names_the_artifact() {
        let prompt = default_coding_prompt(&PathBuf::from("show-system-info.py"));
        assert!(prompt.contains("'show-system-info.py'"));
    }
}

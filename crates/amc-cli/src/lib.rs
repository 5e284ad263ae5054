//! Command-line surface for the amc coding client.

use std::path::PathBuf;

use clap::Parser;

pub const DEFAULT_EDITOR_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_PROJECT_SECRETS_PATH: &str = ".project-secrets.json";
pub const DEFAULT_SERVER_COMMAND: &str = "aider-mcp-server";
pub const DEFAULT_CODING_TOOL: &str = "aider_ai_code";
pub const DEFAULT_ARTIFACT: &str = "output.py";
pub const DEFAULT_ARTIFACT_RUNNER: &str = "python3";
pub const DEFAULT_TOOL_TIMEOUT_SECONDS: u64 = 300;

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "amc",
    about = "Launch an aider MCP coding server and drive one bounded tool invocation against it",
    version
)]
/// Public struct `Cli` used across amc components.
pub struct Cli {
    #[arg(
        long,
        env = "AMC_EDITOR_MODEL",
        default_value = DEFAULT_EDITOR_MODEL,
        help = "Editor model forwarded to the coding tool verbatim (no provider prefix rewriting)"
    )]
    pub editor_model: String,

    #[arg(
        long,
        env = "AMC_CURRENT_WORKING_DIR",
        help = "Project root the coding server edits; must be a valid git repository"
    )]
    pub current_working_dir: PathBuf,

    #[arg(
        long,
        env = "AMC_PROJECT_SECRETS",
        default_value = DEFAULT_PROJECT_SECRETS_PATH,
        help = "Path to the project secrets JSON. If present, sets OPENAI_* env defaults and may suggest an editor model."
    )]
    pub project_secrets: PathBuf,

    #[arg(
        long,
        env = "AMC_SERVER_COMMAND",
        default_value = DEFAULT_SERVER_COMMAND,
        help = "Command used to launch the MCP server transport subprocess"
    )]
    pub server_command: String,

    #[arg(
        long = "server-arg",
        allow_hyphen_values = true,
        help = "Extra argument appended to the server command line (repeatable)"
    )]
    pub server_args: Vec<String>,

    #[arg(
        long,
        env = "AMC_TOOL",
        default_value = DEFAULT_CODING_TOOL,
        help = "Name of the remote tool to invoke"
    )]
    pub tool: String,

    #[arg(
        long,
        help = "Coding prompt sent to the tool. Defaults to a prompt asking the tool to create the artifact."
    )]
    pub prompt: Option<String>,

    #[arg(
        long,
        env = "AMC_ARTIFACT",
        default_value = DEFAULT_ARTIFACT,
        help = "File the tool is expected to produce, relative to the working dir; executed by the verification step"
    )]
    pub artifact: PathBuf,

    #[arg(
        long = "editable-file",
        help = "Relative path the tool may edit (repeatable; defaults to the artifact)"
    )]
    pub editable_files: Vec<String>,

    #[arg(
        long = "readonly-file",
        help = "Relative path the tool may read but not edit (repeatable)"
    )]
    pub readonly_files: Vec<String>,

    #[arg(
        long,
        env = "AMC_TOOL_TIMEOUT_SECONDS",
        default_value_t = DEFAULT_TOOL_TIMEOUT_SECONDS,
        value_parser = parse_positive_u64,
        help = "Maximum seconds to wait for the tool invocation before abandoning it"
    )]
    pub tool_timeout_seconds: u64,

    #[arg(
        long,
        env = "AMC_ARTIFACT_RUNNER",
        default_value = DEFAULT_ARTIFACT_RUNNER,
        help = "Interpreter used to execute the produced artifact during verification"
    )]
    pub artifact_runner: String,

    #[arg(
        long,
        default_value_t = false,
        help = "Skip the post-session artifact verification run"
    )]
    pub skip_verify: bool,

    #[arg(
        long,
        default_value_t = false,
        help = "List the server tool catalog and exit without invoking a tool"
    )]
    pub list_tools: bool,

    #[arg(
        long,
        default_value_t = false,
        help = "Print an environment and project diagnostic report and exit"
    )]
    pub doctor: bool,
}
